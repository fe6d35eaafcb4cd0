//! services/api/src/web/game_task.rs
//!
//! Drives one player's `GameSession` from WebSocket messages.
//!
//! The session itself is synchronous. This module owns the timers the client
//! animates against: a settle timer after each match and a continue timer after
//! each round. Both race the session's `CancellationToken`, and the tickets they
//! redeem are generation-checked by the session, so a timer that fires after a
//! reset does nothing.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, SessionState},
};
use async_trait::async_trait;
use bubble_words_core::domain::{BubbleId, BubbleSide, Difficulty, SoundEffect, WordLevel};
use bubble_words_core::game::{ContinueTicket, SettleTicket};
use bubble_words_core::ports::{PortError, PortResult, SoundEffects};
use bubble_words_core::{SettleOutcome, TapOutcome};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const NO_WORDS_MESSAGE: &str = "No words are available right now. Please try again.";

/// A frame queued for the socket writer.
#[derive(Debug)]
pub enum Outbound {
    Message(ServerMessage),
    Audio(Vec<u8>),
}

/// Frames a connection may queue before the game waits on the socket writer.
/// Narration audio is dropped instead of waited on.
pub const OUTBOUND_CAPACITY: usize = 64;

pub type OutboundSender = mpsc::Sender<Outbound>;

//=========================================================================================
// Sound Effects Over the Socket
//=========================================================================================

/// Plays sound effects by telling the client which one to play.
pub struct ChannelSoundEffects {
    outbound: OutboundSender,
}

impl ChannelSoundEffects {
    pub fn new(outbound: OutboundSender) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl SoundEffects for ChannelSoundEffects {
    async fn play(&self, effect: SoundEffect) -> PortResult<()> {
        self.outbound
            .send(Outbound::Message(ServerMessage::PlaySound { effect }))
            .await
            .map_err(|_| PortError::Unavailable("the client has disconnected".to_string()))
    }
}

//=========================================================================================
// GameConnection
//=========================================================================================

#[derive(Clone)]
pub struct GameConnection {
    app_state: Arc<AppState>,
    session: Arc<Mutex<SessionState>>,
    outbound: OutboundSender,
    sounds: Arc<dyn SoundEffects>,
}

impl GameConnection {
    pub fn new(app_state: Arc<AppState>, session: SessionState, outbound: OutboundSender) -> Self {
        let sounds = Arc::new(ChannelSoundEffects::new(outbound.clone()));
        Self {
            app_state,
            session: Arc::new(Mutex::new(session)),
            outbound,
            sounds,
        }
    }

    pub async fn handle(&self, message: ClientMessage) {
        match message {
            ClientMessage::StartGame { level, hard_mode } => self.start_game(level, hard_mode).await,
            ClientMessage::Tap { bubble_id } => self.tap(bubble_id).await,
            ClientMessage::ContinueListening => self.continue_listening().await,
            ClientMessage::ReturnToMenu => self.return_to_menu().await,
            ClientMessage::SetVoice { voice_id } => {
                debug!("Switching narration voice to {}", voice_id);
                self.session.lock().await.voice_id = voice_id;
            }
        }
    }

    /// Cancels every pending timer. Called when the socket closes.
    pub async fn shutdown(&self) {
        self.session.lock().await.cancellation_token.cancel();
    }

    /// Queues a message, waiting while the client is behind.
    pub async fn send(&self, message: ServerMessage) {
        if self.outbound.send(Outbound::Message(message)).await.is_err() {
            debug!("Dropping a message for a closed connection");
        }
    }

    async fn play(&self, effect: SoundEffect) {
        if let Err(e) = self.sounds.play(effect).await {
            debug!("Could not play {:?}: {}", effect, e);
        }
    }

    // --- Client Commands ---

    async fn start_game(&self, level: u8, hard_mode: bool) {
        let Some(level) = WordLevel::from_number(level) else {
            self.send(ServerMessage::Error {
                message: format!("Unknown word level {}", level),
            })
            .await;
            return;
        };

        {
            let mut session = self.session.lock().await;
            let user_id = session.user_id;
            // Purchases made over REST since the socket opened are picked up here.
            if let Err(e) = session.entitlements.log_in(user_id).await {
                warn!("Could not refresh entitlements for user {}: {}", user_id, e);
            }
            if !session.entitlements.can_access(level.content_type()) {
                info!("User {} has no access to level {}", user_id, level.number());
                self.send(ServerMessage::AccessDenied {
                    content: level.content_type(),
                })
                .await;
                return;
            }
        }

        let pool = match self.app_state.words.load_words(level).await {
            Ok(words) if !words.is_empty() => words,
            Ok(_) => {
                warn!("Word source returned no words for level {}", level.number());
                self.send(ServerMessage::Error {
                    message: NO_WORDS_MESSAGE.to_string(),
                })
                .await;
                return;
            }
            Err(e) => {
                error!("Failed to load words for level {}: {}", level.number(), e);
                self.send(ServerMessage::Error {
                    message: NO_WORDS_MESSAGE.to_string(),
                })
                .await;
                return;
            }
        };

        let mut session = self.session.lock().await;
        session.renew_token();
        session.game.set_difficulty(Difficulty::from_hard_mode(hard_mode));
        session.game.start_new_game(level, pool, &mut rand::rng());
        info!(
            "User {} started a level {} game with {} words",
            session.user_id,
            level.number(),
            session.game.current_words().len()
        );
        self.send(ServerMessage::GameStarted {
            level: level.number(),
            difficulty: session.game.difficulty(),
            bubbles: session.game.bubbles().cloned().collect(),
        })
        .await;
    }

    async fn tap(&self, bubble_id: BubbleId) {
        let mut session = self.session.lock().await;

        if bubble_id.side == BubbleSide::English {
            if let Some(label) = session.game.bubble(&bubble_id).map(|b| b.label.clone()) {
                let token = session.next_narration();
                self.narrate(label, session.voice_id.clone(), token);
            }
        }

        let outcome = session.game.select_bubble(&bubble_id);
        match outcome {
            TapOutcome::Ignored => debug!("Ignoring a tap on {}", bubble_id),
            TapOutcome::Selected(id) => {
                self.play(SoundEffect::Pop).await;
                self.send(ServerMessage::Selected { bubble_id: id }).await;
            }
            TapOutcome::Deselected(id) => self.send(ServerMessage::Deselected { bubble_id: id }).await,
            TapOutcome::Matched(resolution) => {
                let user_id = session.user_id;
                if let Err(e) = self
                    .app_state
                    .learned
                    .record_learned(&resolution.word, Some(user_id))
                    .await
                {
                    error!(
                        "Failed to record learned word '{}' for user {}: {}",
                        resolution.word.english, user_id, e
                    );
                }

                self.play(SoundEffect::Match).await;
                self.send(ServerMessage::Matched {
                    first_id: resolution.pair.first_id,
                    second_id: resolution.pair.second_id,
                    english: resolution.word.english,
                    chinese: resolution.word.chinese,
                    points: resolution.points,
                    round_score: session.game.round_score(),
                })
                .await;
                self.spawn_settle(resolution.ticket, session.cancellation_token.clone());
            }
        }
    }

    async fn continue_listening(&self) {
        let mut session = self.session.lock().await;
        if !session.game.continue_to_listening() {
            self.send(ServerMessage::Error {
                message: "There is no finished round to replay.".to_string(),
            })
            .await;
            return;
        }
        session.renew_token();
        info!("User {} started the listening round", session.user_id);
        self.send(ServerMessage::ListeningStarted {
            bubbles: session.game.bubbles().cloned().collect(),
        })
        .await;
    }

    async fn return_to_menu(&self) {
        let mut session = self.session.lock().await;
        session.renew_token();
        session.game.reset();
        debug!("User {} returned to the menu", session.user_id);
    }

    // --- Timed Transitions ---

    fn spawn_settle(&self, ticket: SettleTicket, token: CancellationToken) {
        let this = self.clone();
        let delay = self.app_state.timings.settle_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Settle of '{}' cancelled", ticket.word_id()),
                _ = tokio::time::sleep(delay) => this.settle(ticket, token).await,
            }
        });
    }

    async fn settle(&self, ticket: SettleTicket, token: CancellationToken) {
        let mut session = self.session.lock().await;
        let outcome = session.game.settle_match(&ticket);
        match outcome {
            SettleOutcome::Stale => debug!("Stale settle ticket for '{}'", ticket.word_id()),
            SettleOutcome::Removed { word_id } => self.send(ServerMessage::WordRemoved { word_id }).await,
            SettleOutcome::RoundComplete { word_id, summary } => {
                self.send(ServerMessage::WordRemoved { word_id }).await;

                let user_id = session.user_id;
                if let Err(e) = self
                    .app_state
                    .scores
                    .record_round_today(summary.score, summary.difficulty, summary.elapsed, Some(user_id))
                    .await
                {
                    error!("Failed to save the score of user {}: {}", user_id, e);
                }

                self.play(SoundEffect::Complete).await;
                info!(
                    "User {} finished a {:?} round with {} points",
                    user_id, summary.phase, summary.score
                );
                self.send(ServerMessage::RoundCompleted {
                    phase: summary.phase,
                    score: summary.score,
                    elapsed_secs: summary.elapsed.as_secs_f64(),
                    is_final: summary.is_final,
                })
                .await;
                self.spawn_continue(summary.continue_ticket, token);
            }
        }
    }

    fn spawn_continue(&self, ticket: ContinueTicket, token: CancellationToken) {
        let this = self.clone();
        let delay = self.app_state.timings.continue_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Continue timer cancelled"),
                _ = tokio::time::sleep(delay) => this.reveal_continue(ticket).await,
            }
        });
    }

    async fn reveal_continue(&self, ticket: ContinueTicket) {
        let mut session = self.session.lock().await;
        if session.game.reveal_continue_options(ticket) {
            self.send(ServerMessage::ContinueOptions {
                can_listen: !session.game.is_game_completed(),
            })
            .await;
        } else {
            debug!("Stale continue ticket");
        }
    }

    // --- Narration ---

    fn narrate(&self, text: String, voice_id: String, token: CancellationToken) {
        let narrator = self.app_state.narrator.clone();
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = narrator.speak(&text, &voice_id) => match result {
                    Ok(audio) if !audio.is_empty() => match outbound.try_send(Outbound::Audio(audio)) {
                        Ok(()) | Err(TrySendError::Closed(_)) => {}
                        Err(TrySendError::Full(_)) => debug!("Dropping narration of '{}' for a slow client", text),
                    },
                    Ok(_) => {}
                    Err(e) => warn!("Narration failed: {}", e),
                },
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameTimings;
    use crate::adapters::DisabledStoreVerifier;
    use bubble_words_core::domain::{Phase, Product, VerifiedTransaction, WordPair};
    use bubble_words_core::ports::{Narrator, PhoneticLookup, TransactionStore, WordSource};
    use bubble_words_core::{
        FavoriteBook, LearnedWordStore, MemoryStore, ScoreLedger, VerifiedPurchases,
    };
    use std::time::Duration;
    use tokio::sync::mpsc::Receiver;
    use uuid::Uuid;

    struct FixedWords(Vec<WordPair>);

    #[async_trait]
    impl WordSource for FixedWords {
        async fn load_words(&self, _level: WordLevel) -> PortResult<Vec<WordPair>> {
            Ok(self.0.clone())
        }
    }

    struct EchoNarrator;

    #[async_trait]
    impl Narrator for EchoNarrator {
        async fn speak(&self, text: &str, _voice_id: &str) -> PortResult<Vec<u8>> {
            Ok(text.as_bytes().to_vec())
        }
    }

    /// Takes a while to answer, like a real TTS service.
    struct SlowNarrator;

    #[async_trait]
    impl Narrator for SlowNarrator {
        async fn speak(&self, text: &str, _voice_id: &str) -> PortResult<Vec<u8>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(text.as_bytes().to_vec())
        }
    }

    struct NoPhonetics;

    #[async_trait]
    impl PhoneticLookup for NoPhonetics {
        async fn lookup_phonetic(&self, _english: &str) -> PortResult<Option<String>> {
            Ok(None)
        }
    }

    fn app_state(store: Arc<MemoryStore>, words: Vec<WordPair>) -> Arc<AppState> {
        app_state_with(store, words, Arc::new(EchoNarrator))
    }

    fn app_state_with(
        store: Arc<MemoryStore>,
        words: Vec<WordPair>,
        narrator: Arc<dyn Narrator>,
    ) -> Arc<AppState> {
        Arc::new(AppState {
            accounts: store.clone(),
            scores: Arc::new(ScoreLedger::new(store.clone())),
            learned: Arc::new(LearnedWordStore::new(store.clone())),
            favorites: Arc::new(FavoriteBook::new(store.clone())),
            purchases: Arc::new(VerifiedPurchases::new(Arc::new(DisabledStoreVerifier), store)),
            words: Arc::new(FixedWords(words)),
            narrator,
            phonetics: Arc::new(NoPhonetics),
            timings: GameTimings::default(),
            default_voice: "alloy".to_string(),
        })
    }

    async fn connect(app: Arc<AppState>, user_id: Uuid) -> (GameConnection, Receiver<Outbound>) {
        connect_with_capacity(app, user_id, OUTBOUND_CAPACITY).await
    }

    async fn connect_with_capacity(
        app: Arc<AppState>,
        user_id: Uuid,
        capacity: usize,
    ) -> (GameConnection, Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let session = SessionState::new(&app, user_id).await.unwrap();
        (GameConnection::new(app, session, tx), rx)
    }

    /// Lets spawned tasks run, then collects the text messages sent so far.
    async fn messages(rx: &mut Receiver<Outbound>, wait: Duration) -> Vec<ServerMessage> {
        tokio::time::sleep(wait).await;
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Outbound::Message(message) = frame {
                out.push(message);
            }
        }
        out
    }

    /// Lets spawned tasks run, then collects the narration audio sent so far.
    async fn audio(rx: &mut Receiver<Outbound>, wait: Duration) -> Vec<Vec<u8>> {
        tokio::time::sleep(wait).await;
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Outbound::Audio(bytes) = frame {
                out.push(bytes);
            }
        }
        out
    }

    fn apple() -> Vec<WordPair> {
        vec![WordPair::new("1", "apple", "苹果")]
    }

    async fn play_one_word_round(connection: &GameConnection) {
        connection.handle(ClientMessage::Tap { bubble_id: BubbleId::english("1") }).await;
        connection.handle(ClientMessage::Tap { bubble_id: BubbleId::chinese("1") }).await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_one_word_game_is_scored_and_offers_listening() {
        let store = Arc::new(MemoryStore::new());
        let app = app_state(store, apple());
        let user = Uuid::new_v4();
        let (connection, mut rx) = connect(app.clone(), user).await;

        connection.handle(ClientMessage::StartGame { level: 1, hard_mode: false }).await;
        let started = messages(&mut rx, Duration::ZERO).await;
        assert!(matches!(&started[..], [ServerMessage::GameStarted { bubbles, .. }] if bubbles.len() == 2));

        play_one_word_round(&connection).await;
        let tapped = messages(&mut rx, Duration::from_millis(100)).await;
        assert!(matches!(
            &tapped[..],
            [
                ServerMessage::PlaySound { effect: SoundEffect::Pop },
                ServerMessage::Selected { .. },
                ServerMessage::PlaySound { effect: SoundEffect::Match },
                ServerMessage::Matched { points: 5, .. },
            ]
        ));

        let settled = messages(&mut rx, Duration::from_millis(500)).await;
        assert!(matches!(
            &settled[..],
            [
                ServerMessage::WordRemoved { .. },
                ServerMessage::PlaySound { effect: SoundEffect::Complete },
                ServerMessage::RoundCompleted { phase: Phase::FirstRound, is_final: false, .. },
            ]
        ));

        let scores = app.scores.query(Some(user)).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 50);

        let learned = app.learned.query(Some(user), 30).await.unwrap();
        assert_eq!(learned.len(), 1);
        assert_eq!(learned[0].english, "apple");

        let options = messages(&mut rx, Duration::from_millis(2500)).await;
        assert!(matches!(&options[..], [ServerMessage::ContinueOptions { can_listen: true }]));
    }

    #[tokio::test(start_paused = true)]
    async fn tapping_an_english_bubble_narrates_it() {
        let app = app_state(Arc::new(MemoryStore::new()), apple());
        let (connection, mut rx) = connect(app, Uuid::new_v4()).await;

        connection.handle(ClientMessage::StartGame { level: 1, hard_mode: false }).await;
        connection.handle(ClientMessage::Tap { bubble_id: BubbleId::english("1") }).await;

        assert_eq!(audio(&mut rx, Duration::from_millis(10)).await, vec![b"apple".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_latest_english_tap_is_narrated() {
        let words = vec![WordPair::new("1", "apple", "苹果"), WordPair::new("2", "pear", "梨")];
        let app = app_state_with(Arc::new(MemoryStore::new()), words, Arc::new(SlowNarrator));
        let (connection, mut rx) = connect(app, Uuid::new_v4()).await;

        connection.handle(ClientMessage::StartGame { level: 1, hard_mode: false }).await;
        connection.handle(ClientMessage::Tap { bubble_id: BubbleId::english("1") }).await;
        connection.handle(ClientMessage::Tap { bubble_id: BubbleId::english("2") }).await;

        assert_eq!(audio(&mut rx, Duration::from_millis(300)).await, vec![b"pear".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn narration_is_dropped_while_the_client_is_behind() {
        let app = app_state(Arc::new(MemoryStore::new()), apple());
        let (connection, mut rx) = connect_with_capacity(app, Uuid::new_v4(), 1).await;

        connection.send(ServerMessage::ContinueOptions { can_listen: true }).await;
        connection.narrate("apple".to_string(), "alloy".to_string(), CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(matches!(rx.try_recv(), Ok(Outbound::Message(_))));
        assert!(rx.try_recv().is_err());

        connection.narrate("apple".to_string(), "alloy".to_string(), CancellationToken::new());
        assert_eq!(audio(&mut rx, Duration::from_millis(10)).await, vec![b"apple".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn the_listening_round_is_final_and_adds_to_the_day() {
        let app = app_state(Arc::new(MemoryStore::new()), apple());
        let user = Uuid::new_v4();
        let (connection, mut rx) = connect(app.clone(), user).await;

        connection.handle(ClientMessage::StartGame { level: 1, hard_mode: false }).await;
        play_one_word_round(&connection).await;
        // The continue timer fires at exactly three seconds.
        messages(&mut rx, Duration::from_millis(3100)).await;

        connection.handle(ClientMessage::ContinueListening).await;
        let started = messages(&mut rx, Duration::ZERO).await;
        assert!(matches!(&started[..], [ServerMessage::ListeningStarted { .. }]));

        play_one_word_round(&connection).await;
        let round = messages(&mut rx, Duration::from_millis(3100)).await;
        assert!(round
            .iter()
            .any(|m| matches!(m, ServerMessage::Matched { points: 7, .. })));
        assert!(round.iter().any(|m| matches!(
            m,
            ServerMessage::RoundCompleted { phase: Phase::Listening, is_final: true, .. }
        )));
        assert!(round
            .iter()
            .any(|m| matches!(m, ServerMessage::ContinueOptions { can_listen: false })));

        let scores = app.scores.query(Some(user)).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 120);

        let learned = app.learned.query(Some(user), 30).await.unwrap();
        assert_eq!(learned.len(), 1);
        assert_eq!(learned[0].review_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn returning_to_the_menu_cancels_pending_timers() {
        let app = app_state(Arc::new(MemoryStore::new()), apple());
        let user = Uuid::new_v4();
        let (connection, mut rx) = connect(app.clone(), user).await;

        connection.handle(ClientMessage::StartGame { level: 1, hard_mode: true }).await;
        play_one_word_round(&connection).await;
        connection.handle(ClientMessage::ReturnToMenu).await;

        let after = messages(&mut rx, Duration::from_secs(5)).await;
        assert!(!after
            .iter()
            .any(|m| matches!(m, ServerMessage::WordRemoved { .. } | ServerMessage::RoundCompleted { .. })));
        assert!(app.scores.query(Some(user)).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn advanced_levels_need_a_membership() {
        let store = Arc::new(MemoryStore::new());
        let app = app_state(store.clone(), apple());
        let user = Uuid::new_v4();
        let (connection, mut rx) = connect(app, user).await;

        connection.handle(ClientMessage::StartGame { level: 2, hard_mode: false }).await;
        let denied = messages(&mut rx, Duration::ZERO).await;
        assert!(matches!(&denied[..], [ServerMessage::AccessDenied { .. }]));

        let yearly = VerifiedTransaction {
            product_id: Product::Yearly.id(),
            original_transaction_id: "1000".to_string(),
        };
        store.claim_transaction(user, &yearly).await.unwrap();
        connection.handle(ClientMessage::StartGame { level: 2, hard_mode: false }).await;
        let started = messages(&mut rx, Duration::ZERO).await;
        assert!(matches!(&started[..], [ServerMessage::GameStarted { level: 2, .. }]));
    }

    #[tokio::test(start_paused = true)]
    async fn an_empty_word_list_asks_the_client_to_retry() {
        let app = app_state(Arc::new(MemoryStore::new()), Vec::new());
        let (connection, mut rx) = connect(app, Uuid::new_v4()).await;

        connection.handle(ClientMessage::StartGame { level: 1, hard_mode: false }).await;
        let sent = messages(&mut rx, Duration::ZERO).await;
        assert!(matches!(&sent[..], [ServerMessage::Error { .. }]));
    }

    #[tokio::test(start_paused = true)]
    async fn listening_cannot_start_before_the_first_round_ends() {
        let app = app_state(Arc::new(MemoryStore::new()), apple());
        let (connection, mut rx) = connect(app, Uuid::new_v4()).await;

        connection.handle(ClientMessage::StartGame { level: 1, hard_mode: false }).await;
        messages(&mut rx, Duration::ZERO).await;
        connection.handle(ClientMessage::ContinueListening).await;
        let sent = messages(&mut rx, Duration::ZERO).await;
        assert!(matches!(&sent[..], [ServerMessage::Error { .. }]));
    }
}
