//! crates/bubble_words_core/src/ports.rs
//!
//! Defines the service contracts (traits) the game logic depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the database, the purchase platform and the speech backend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{
    Difficulty, LearnedWordRecord, ProductId, PurchaseReceipt, ScoreEntry, SoundEffect, User,
    UserCredentials, VerifiedTransaction, WordLevel, WordPair,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Why a purchase did not go through.
#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("The purchase was cancelled by the user")]
    UserCancelled,
    #[error("The purchase is pending approval")]
    Pending,
    #[error("The transaction failed verification")]
    FailedVerification,
    #[error("A logged-in account is required to purchase")]
    NotLoggedIn,
    #[error("The store is not configured for this product")]
    NotConfigured,
    #[error(transparent)]
    Port(#[from] PortError),
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence for daily scores and learned words.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    // --- Scores ---
    async fn find_score(
        &self,
        user_id: Option<Uuid>,
        day: NaiveDate,
        level: Difficulty,
    ) -> PortResult<Option<ScoreEntry>>;

    async fn insert_score(&self, entry: ScoreEntry) -> PortResult<()>;

    async fn update_score(&self, id: Uuid, score: i64, total_time: f64) -> PortResult<()>;

    /// All score entries for a user (or every user when `None`), newest day first.
    async fn list_scores(&self, user_id: Option<Uuid>) -> PortResult<Vec<ScoreEntry>>;

    // --- Learned Words ---
    /// Deletes learned words of every user whose learning day is before `cutoff`.
    async fn purge_learned_before(&self, cutoff: NaiveDate) -> PortResult<u64>;

    async fn find_learned(
        &self,
        user_id: Option<Uuid>,
        english: &str,
        day: NaiveDate,
    ) -> PortResult<Option<LearnedWordRecord>>;

    /// The most recent record of a word for a user, on any day.
    async fn latest_learned(
        &self,
        user_id: Option<Uuid>,
        english: &str,
    ) -> PortResult<Option<LearnedWordRecord>>;

    async fn insert_learned(&self, record: LearnedWordRecord) -> PortResult<()>;

    async fn increment_review_count(&self, id: Uuid) -> PortResult<()>;

    /// Learned words on or after `since`, newest first.
    async fn list_learned(
        &self,
        user_id: Option<Uuid>,
        since: NaiveDate,
    ) -> PortResult<Vec<LearnedWordRecord>>;

    // --- Account Deletion ---
    /// Removes every score entry and learned word of the user atomically.
    async fn purge_user(&self, user_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    /// Deletes the user row together with its auth sessions.
    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;
}

/// Storage for the per-user favorites map, kept as a single serialized blob.
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    async fn load_favorites(&self, user_id: Uuid) -> PortResult<Option<String>>;

    async fn save_favorites(&self, user_id: Uuid, blob: &str) -> PortResult<()>;

    async fn delete_favorites(&self, user_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait WordSource: Send + Sync {
    /// Loads every word available for a level.
    async fn load_words(&self, level: WordLevel) -> PortResult<Vec<WordPair>>;
}

/// The platform's record of what a user has bought.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    async fn current_entitlements(&self, user_id: Uuid) -> PortResult<HashSet<ProductId>>;

    /// Grants `product` to the user once the store has confirmed `receipt`.
    async fn purchase(
        &self,
        user_id: Uuid,
        product: &ProductId,
        receipt: &PurchaseReceipt,
    ) -> Result<(), PurchaseError>;
}

/// Asks the store whether a receipt proves a real transaction.
#[async_trait]
pub trait StoreVerifier: Send + Sync {
    async fn verify(&self, receipt: &PurchaseReceipt) -> Result<VerifiedTransaction, PurchaseError>;
}

/// Durable list of confirmed store transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn products_of(&self, user_id: Uuid) -> PortResult<HashSet<ProductId>>;

    /// Records the transaction for `user_id` unless another account already holds it.
    /// Returns whoever owns the transaction afterwards.
    async fn claim_transaction(
        &self,
        user_id: Uuid,
        transaction: &VerifiedTransaction,
    ) -> PortResult<Uuid>;
}

#[async_trait]
pub trait Narrator: Send + Sync {
    /// Generates spoken audio for `text` using the given voice.
    async fn speak(&self, text: &str, voice_id: &str) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait SoundEffects: Send + Sync {
    async fn play(&self, effect: SoundEffect) -> PortResult<()>;
}

#[async_trait]
pub trait PhoneticLookup: Send + Sync {
    async fn lookup_phonetic(&self, english: &str) -> PortResult<Option<String>>;
}
