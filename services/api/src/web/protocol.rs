//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the game client and the API server.

use bubble_words_core::domain::{BubbleId, ContentType, Difficulty, Phase, SoundEffect};
use bubble_words_core::game::Bubble;
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a new game at a word level (1 to 3).
    StartGame { level: u8, hard_mode: bool },

    /// The player tapped a bubble, e.g. `"12_en"`.
    Tap { bubble_id: BubbleId },

    /// Replays the finished round as a listening pass.
    ContinueListening,

    /// Abandons the current game.
    ReturnToMenu,

    /// Changes the narration voice for the rest of the connection.
    SetVoice { voice_id: String },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================
// NOTE: Narration audio for tapped English bubbles is sent as raw Binary frames,
// not as part of this enum.
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameStarted {
        level: u8,
        difficulty: Difficulty,
        bubbles: Vec<Bubble>,
    },

    Selected { bubble_id: BubbleId },

    Deselected { bubble_id: BubbleId },

    /// Two bubbles matched. They stay on the board until `WordRemoved`.
    Matched {
        first_id: BubbleId,
        second_id: BubbleId,
        english: String,
        chinese: String,
        points: u32,
        round_score: f64,
    },

    WordRemoved { word_id: String },

    /// The board is empty. The score has been saved.
    RoundCompleted {
        phase: Phase,
        score: f64,
        elapsed_secs: f64,
        is_final: bool,
    },

    /// The completion animation is over; the client may show its next-step buttons.
    ContinueOptions { can_listen: bool },

    ListeningStarted { bubbles: Vec<Bubble> },

    PlaySound { effect: SoundEffect },

    /// The requested content needs a membership.
    AccessDenied { content: ContentType },

    /// Reports an error to the client, which should display a message or a retry prompt.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_messages_parse_bubble_ids() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"tap","bubble_id":"b3_cn"}"#).unwrap();
        match msg {
            ClientMessage::Tap { bubble_id } => assert_eq!(bubble_id, BubbleId::chinese("b3")),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn malformed_bubble_ids_are_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"tap","bubble_id":"b3"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn server_messages_are_tagged() {
        let json = serde_json::to_value(ServerMessage::PlaySound {
            effect: SoundEffect::Match,
        })
        .unwrap();
        assert_eq!(json["type"], "play_sound");
        assert_eq!(json["effect"], "match");
    }
}
