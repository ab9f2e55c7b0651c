use serde::{Deserialize, Serialize};

use crate::state::RoomState;

// Tag strings and payload keys mirror the event names the browser client
// already listens for, so they are frozen even where the casing is odd.

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "playerAssigned")]
    PlayerAssigned(PlayerAssignedMsg),
    #[serde(rename = "startGame")]
    StartGame(StartGameMsg),
    #[serde(rename = "gameState")]
    GameState(GameStateMsg),
    #[serde(rename = "paddleMove")]
    PaddleMove(PaddleMoveMsg),
    #[serde(rename = "roomClosed")]
    RoomClosed(RoomClosedMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAssignedMsg {
    pub player_index: usize,
}

/// Sent to both players when their room fills. `referee_id` is the
/// connection id of the player whose `ready` completed the pairing; clients
/// use it to decide which side runs the countdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameMsg {
    pub referee_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateMsg {
    pub ball_x: f64,
    pub ball_y: f64,
    pub score: [u32; 2],
    pub paddle_x: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomClosedMsg {
    pub reason: String,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "paddleMove")]
    PaddleMove(PaddleMoveMsg),
}

/// Travels in both directions: clients report their own paddle with it and
/// receive their opponent's moves as the same message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddleMoveMsg {
    pub x_position: f64,
    pub player_index: usize,
}

// === Conversion helpers ===

impl GameStateMsg {
    pub fn from_state(state: &RoomState) -> Self {
        Self {
            ball_x: state.ball_x,
            ball_y: state.ball_y,
            score: state.score,
            paddle_x: state.paddle_x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    #[test]
    fn game_state_uses_frozen_field_names() {
        let state = RoomState::new(&GameConfig::default());
        let msg = ServerMsg::GameState(GameStateMsg::from_state(&state));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"gameState\""));
        assert!(json.contains("\"ballX\":250.0"));
        assert!(json.contains("\"ballY\":350.0"));
        assert!(json.contains("\"score\":[0,0]"));
        assert!(json.contains("\"paddleX\":[255.0,255.0]"));
    }

    #[test]
    fn ready_parses_from_bare_tag() {
        let parsed: ClientMsg = serde_json::from_str("{\"type\":\"ready\"}").unwrap();
        assert!(matches!(parsed, ClientMsg::Ready));
    }

    #[test]
    fn paddle_move_roundtrip() {
        let msg = ClientMsg::PaddleMove(PaddleMoveMsg {
            x_position: -42.5,
            player_index: 1,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"paddleMove\""));
        assert!(json.contains("\"xPosition\":-42.5"));
        assert!(json.contains("\"playerIndex\":1"));
        let parsed: ClientMsg = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientMsg::PaddleMove(m) => {
                assert_eq!(m.x_position, -42.5);
                assert_eq!(m.player_index, 1);
            }
            _ => panic!("Expected PaddleMove"),
        }
    }

    #[test]
    fn start_and_close_tags_are_stable() {
        let start = serde_json::to_string(&ServerMsg::StartGame(StartGameMsg { referee_id: 7 }))
            .unwrap();
        assert!(start.contains("\"type\":\"startGame\""));
        assert!(start.contains("\"refereeId\":7"));

        let closed = serde_json::to_string(&ServerMsg::RoomClosed(RoomClosedMsg {
            reason: "idle".to_string(),
        }))
        .unwrap();
        assert!(closed.contains("\"type\":\"roomClosed\""));
        assert!(closed.contains("\"reason\":\"idle\""));
    }

    #[test]
    fn unknown_client_tags_are_rejected() {
        assert!(serde_json::from_str::<ClientMsg>("{\"type\":\"ballMove\"}").is_err());
        assert!(serde_json::from_str::<ClientMsg>("not json").is_err());
    }
}
