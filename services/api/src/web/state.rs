//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use crate::config::GameTimings;
use bubble_words_core::domain::Difficulty;
use bubble_words_core::ports::{
    AccountStore, Narrator, PhoneticLookup, PortResult, PurchaseLedger, WordSource,
};
use bubble_words_core::{EntitlementGate, FavoriteBook, GameSession, LearnedWordStore, ScoreLedger};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub scores: Arc<ScoreLedger>,
    pub learned: Arc<LearnedWordStore>,
    pub favorites: Arc<FavoriteBook>,
    pub purchases: Arc<dyn PurchaseLedger>,
    pub words: Arc<dyn WordSource>,
    pub narrator: Arc<dyn Narrator>,
    pub phonetics: Arc<dyn PhoneticLookup>,
    pub timings: GameTimings,
    /// Voice used until a connection picks another one.
    pub default_voice: String,
}

//=========================================================================================
// SessionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active WebSocket connection.
pub struct SessionState {
    pub user_id: Uuid,
    pub game: GameSession,
    pub entitlements: EntitlementGate,
    pub voice_id: String,
    /// Cancels the timers of the current game. Replaced whenever a game starts or ends.
    pub cancellation_token: CancellationToken,
    /// The narration in flight. Only the latest English tap is spoken.
    narration: Option<CancellationToken>,
}

impl SessionState {
    /// Creates a new `SessionState`, loading the user's entitlements.
    pub async fn new(app_state: &AppState, user_id: Uuid) -> PortResult<Self> {
        let entitlements = EntitlementGate::for_user(app_state.purchases.clone(), user_id).await?;
        Ok(Self {
            user_id,
            game: GameSession::new(Difficulty::Normal),
            entitlements,
            voice_id: app_state.default_voice.clone(),
            cancellation_token: CancellationToken::new(),
            narration: None,
        })
    }

    /// Cancels outstanding timers and hands out a fresh token for the next game.
    pub fn renew_token(&mut self) -> CancellationToken {
        self.cancellation_token.cancel();
        self.cancellation_token = CancellationToken::new();
        self.cancellation_token.clone()
    }

    /// Cancels the previous narration and returns the token for the next one.
    /// It is a child of the game token, so ending the game silences it too.
    pub fn next_narration(&mut self) -> CancellationToken {
        if let Some(previous) = self.narration.take() {
            previous.cancel();
        }
        let token = self.cancellation_token.child_token();
        self.narration = Some(token.clone());
        token
    }
}
