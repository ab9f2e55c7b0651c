//! Ball simulation for one tick of a match.
//!
//! The arithmetic here is an exact contract with the browser client, which
//! runs the same rules locally for prediction. Resist the urge to clean up
//! its quirks (the inverted `speed_y` sign, the spinless top paddle): a
//! mismatch shows up as rubber-banding on screen, not as a test failure.

use crate::config::GameConfig;
use crate::state::{PlayerSlot, RoomState};

/// Moves the ball one tick. Horizontal motion stays gated until a player has
/// moved and the ball has touched the bottom paddle once, so an untouched
/// serve always travels straight.
pub fn advance_ball(state: &mut RoomState) {
    state.ball_y += -state.speed_y;
    if state.player_moved && state.paddle_contact {
        state.ball_x += state.speed_x;
    }
}

/// Reflects the ball off the side walls. Only inward-moving balls reflect,
/// so a ball that was pushed outside by a bounce cannot get stuck flipping
/// sign every tick.
pub fn resolve_walls(state: &mut RoomState, config: &GameConfig) {
    if state.ball_x < 0.0 && state.speed_x < 0.0 {
        state.speed_x = -state.speed_x;
    }
    if state.ball_x > config.field_width && state.speed_x > 0.0 {
        state.speed_x = -state.speed_x;
    }
}

/// Bottom paddle contact band, goal line behind it.
///
/// A hit marks `paddle_contact`, escalates |speed_y| by 1 (capped) once the
/// players have started moving, reflects the ball and converts the offset
/// from the paddle center into horizontal speed. A miss that carries the
/// ball past the bottom edge scores for the top player.
pub fn resolve_bottom_paddle(state: &mut RoomState, config: &GameConfig) {
    if state.ball_y > config.field_height - config.paddle_diff {
        let paddle = state.paddle_x[PlayerSlot::Bottom.index()];
        if state.ball_x > paddle && state.ball_x < paddle + config.paddle_width {
            state.paddle_contact = true;
            if state.player_moved {
                state.speed_y -= 1.0;
                if state.speed_y < -config.max_speed {
                    state.speed_y = -config.max_speed;
                }
            }
            state.speed_y = -state.speed_y;
            let trajectory_x = state.ball_x - (paddle + config.paddle_diff);
            state.speed_x = trajectory_x * config.spin_factor;
        } else if state.ball_y > config.field_height {
            reset_ball(state, config);
            state.score[PlayerSlot::Top.index()] += 1;
        }
    }
}

/// Top paddle contact band, goal line behind it.
///
/// Mirrors the bottom paddle except that top bounces never change
/// `speed_x` and never set `paddle_contact`. Both paddles escalate the
/// same shared |speed_y|.
pub fn resolve_top_paddle(state: &mut RoomState, config: &GameConfig) {
    if state.ball_y < config.paddle_diff {
        let paddle = state.paddle_x[PlayerSlot::Top.index()];
        if state.ball_x > paddle && state.ball_x < paddle + config.paddle_width {
            if state.player_moved {
                state.speed_y += 1.0;
                if state.speed_y > config.max_speed {
                    state.speed_y = config.max_speed;
                }
            }
            state.speed_y = -state.speed_y;
        } else if state.ball_y < 0.0 {
            reset_ball(state, config);
            state.score[PlayerSlot::Bottom.index()] += 1;
        }
    }
}

/// Recenters the ball for a fresh serve. `player_moved` survives the reset,
/// `paddle_contact` does not, so every serve starts straight.
pub fn reset_ball(state: &mut RoomState, config: &GameConfig) {
    state.ball_x = config.field_width / 2.0;
    state.ball_y = config.field_height / 2.0;
    state.speed_y = -config.serve_speed;
    state.speed_x = 0.0;
    state.paddle_contact = false;
}

/// One full simulation tick: motion, wall reflection, paddle and goal
/// resolution, then the win check. At most one goal can land per tick.
pub fn step(state: &mut RoomState, config: &GameConfig) {
    advance_ball(state);
    resolve_walls(state, config);
    resolve_bottom_paddle(state, config);
    resolve_top_paddle(state, config);
    if state.winner.is_none() {
        if state.score[PlayerSlot::Bottom.index()] >= config.winning_score {
            state.winner = Some(PlayerSlot::Bottom);
        } else if state.score[PlayerSlot::Top.index()] >= config.winning_score {
            state.winner = Some(PlayerSlot::Top);
        }
    }
}
