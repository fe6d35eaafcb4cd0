pub mod domain;
pub mod entitlement;
pub mod favorites;
pub mod game;
pub mod history;
pub mod learned;
pub mod ledger;
pub mod memory;
pub mod ports;
pub mod purchases;
pub mod words;

pub use domain::{
    AuthSession, BubbleId, BubbleSide, ContentType, Difficulty, LearnedWordRecord, MatchedPair,
    MembershipLevel, Phase, Product, ProductId, PurchaseReceipt, ScoreEntry, SoundEffect, User,
    UserCredentials, VerifiedTransaction, WordLevel, WordPair,
};
pub use entitlement::EntitlementGate;
pub use favorites::FavoriteBook;
pub use game::{GameSession, RoundSummary, SettleOutcome, TapOutcome};
pub use learned::LearnedWordStore;
pub use ledger::ScoreLedger;
pub use memory::MemoryStore;
pub use ports::{
    AccountStore, FavoriteStore, Narrator, PhoneticLookup, PortError, PortResult, ProgressStore,
    PurchaseError, PurchaseLedger, SoundEffects, StoreVerifier, TransactionStore, WordSource,
};
pub use purchases::VerifiedPurchases;
pub use words::{BundledWords, FallbackWordSource};
