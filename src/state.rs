use crate::config::GameConfig;

/// The two seats in a room. `Bottom` serves first and owns score slot 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSlot {
    Bottom,
    Top,
}

impl PlayerSlot {
    pub fn index(self) -> usize {
        match self {
            PlayerSlot::Bottom => 0,
            PlayerSlot::Top => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(PlayerSlot::Bottom),
            1 => Some(PlayerSlot::Top),
            _ => None,
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            PlayerSlot::Bottom => PlayerSlot::Top,
            PlayerSlot::Top => PlayerSlot::Bottom,
        }
    }
}

/// Authoritative state of one match.
///
/// Positions are in field pixels with the origin at the top-left corner;
/// `ball_y` grows toward the bottom paddle. `speed_y` is stored with the
/// opposite sign of the ball's vertical travel, an arithmetic quirk clients
/// never see but the paddle bounce math relies on.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub paddle_x: [f64; 2],
    pub ball_x: f64,
    pub ball_y: f64,
    pub speed_x: f64,
    pub speed_y: f64,
    pub score: [u32; 2],
    /// Set once any paddle input has arrived. Never cleared: it gates both
    /// horizontal ball motion and speed escalation for the rest of the match.
    pub player_moved: bool,
    /// Set on the first paddle bounce, cleared on every serve.
    pub paddle_contact: bool,
    pub winner: Option<PlayerSlot>,
}

impl RoomState {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            paddle_x: [config.paddle_start_x; 2],
            ball_x: config.field_width / 2.0,
            ball_y: config.field_height / 2.0,
            speed_x: 0.0,
            speed_y: -config.serve_speed,
            score: [0, 0],
            player_moved: false,
            paddle_contact: false,
            winner: None,
        }
    }

    /// Applies a paddle update verbatim. The x position is taken on trust;
    /// clients clamp to the field themselves and the bounce math tolerates
    /// any value, so the server does not police it.
    pub fn set_paddle(&mut self, slot: PlayerSlot, x: f64) {
        self.paddle_x[slot.index()] = x;
        self.player_moved = true;
    }

    pub fn is_game_over(&self) -> bool {
        self.winner.is_some()
    }
}
