//! crates/bubble_words_core/src/domain.rs
//!
//! Defines the pure, core data structures for the game.
//! These structs are independent of any database or transport format.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Words and Bubbles
//=========================================================================================

/// A single English/Chinese vocabulary pair. Identity is the `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordPair {
    pub id: String,
    #[serde(deserialize_with = "trimmed")]
    pub english: String,
    #[serde(deserialize_with = "trimmed")]
    pub chinese: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub phonetic: Option<String>,
}

impl WordPair {
    pub fn new(id: impl Into<String>, english: impl Into<String>, chinese: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            english: english.into(),
            chinese: chinese.into(),
            phonetic: None,
        }
    }

    pub fn with_phonetic(mut self, phonetic: impl Into<String>) -> Self {
        self.phonetic = Some(phonetic.into());
        self
    }
}

impl PartialEq for WordPair {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WordPair {}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

fn trimmed_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|s| s.trim().to_string()))
}

/// Which half of a word pair a bubble shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BubbleSide {
    English,
    Chinese,
}

impl BubbleSide {
    fn suffix(self) -> &'static str {
        match self {
            BubbleSide::English => "_en",
            BubbleSide::Chinese => "_cn",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            BubbleSide::English => BubbleSide::Chinese,
            BubbleSide::Chinese => BubbleSide::English,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid bubble id: {0}")]
pub struct InvalidBubbleId(pub String);

/// Key of a single bubble on the board: `"{word_id}_en"` or `"{word_id}_cn"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BubbleId {
    pub word_id: String,
    pub side: BubbleSide,
}

impl BubbleId {
    pub fn new(word_id: impl Into<String>, side: BubbleSide) -> Self {
        Self {
            word_id: word_id.into(),
            side,
        }
    }

    pub fn english(word_id: impl Into<String>) -> Self {
        Self::new(word_id, BubbleSide::English)
    }

    pub fn chinese(word_id: impl Into<String>) -> Self {
        Self::new(word_id, BubbleSide::Chinese)
    }

    /// Two bubbles match when they belong to the same word and show opposite sides.
    pub fn matches(&self, other: &BubbleId) -> bool {
        self.word_id == other.word_id && self.side == other.side.opposite()
    }
}

impl fmt::Display for BubbleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.word_id, self.side.suffix())
    }
}

impl FromStr for BubbleId {
    type Err = InvalidBubbleId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = if let Some(word_id) = s.strip_suffix("_en") {
            BubbleId::english(word_id)
        } else if let Some(word_id) = s.strip_suffix("_cn") {
            BubbleId::chinese(word_id)
        } else {
            return Err(InvalidBubbleId(s.to_string()));
        };
        if parsed.word_id.is_empty() {
            return Err(InvalidBubbleId(s.to_string()));
        }
        Ok(parsed)
    }
}

impl TryFrom<String> for BubbleId {
    type Error = InvalidBubbleId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BubbleId> for String {
    fn from(id: BubbleId) -> Self {
        id.to_string()
    }
}

/// The two bubbles of a successful match, kept until the match settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedPair {
    pub first_id: BubbleId,
    pub second_id: BubbleId,
}

//=========================================================================================
// Game Modes
//=========================================================================================

/// Game difficulty. Persisted as the score entry's `level` flag (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub fn from_hard_mode(hard_mode: bool) -> Self {
        if hard_mode {
            Difficulty::Hard
        } else {
            Difficulty::Normal
        }
    }

    pub fn flag(self) -> i64 {
        match self {
            Difficulty::Normal => 0,
            Difficulty::Hard => 1,
        }
    }

    pub fn from_flag(flag: i64) -> Self {
        if flag == 0 {
            Difficulty::Normal
        } else {
            Difficulty::Hard
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Reading pass: both halves of each pair are visible.
    FirstRound,
    /// Replay of the same words where the English side is heard, not read.
    Listening,
    /// The listening pass finished; nothing is left to play.
    Completed,
}

/// Word-list tiers shipped with the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordLevel {
    Basic,
    Intermediate,
    Advanced,
}

impl WordLevel {
    pub fn from_number(level: u8) -> Option<Self> {
        match level {
            1 => Some(WordLevel::Basic),
            2 => Some(WordLevel::Intermediate),
            3 => Some(WordLevel::Advanced),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            WordLevel::Basic => 1,
            WordLevel::Intermediate => 2,
            WordLevel::Advanced => 3,
        }
    }

    /// The content tier a player must be entitled to before playing this level.
    pub fn content_type(self) -> ContentType {
        match self {
            WordLevel::Basic => ContentType::BasicWords,
            WordLevel::Intermediate | WordLevel::Advanced => ContentType::AdvancedFeatures,
        }
    }
}

/// Audible cues emitted by the game flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundEffect {
    Pop,
    Match,
    Complete,
}

//=========================================================================================
// Persistent Records
//=========================================================================================

/// Converts a displayed score to the ×10 fixed-point value that is persisted.
pub fn encode_score(display_score: f64) -> i64 {
    (display_score * 10.0).round() as i64
}

/// One day's accumulated score for a user at a given difficulty.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub id: Uuid,
    pub date: NaiveDate,
    pub level: Difficulty,
    /// Fixed-point score, ten times the displayed value.
    pub score: i64,
    /// Seconds spent playing, summed over the day's rounds.
    pub total_time: f64,
    pub user_id: Option<Uuid>,
}

impl ScoreEntry {
    pub fn display_score(&self) -> f64 {
        self.score as f64 / 10.0
    }
}

/// A word the user matched on a given day.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedWordRecord {
    pub id: Uuid,
    pub english: String,
    pub chinese: String,
    pub phonetic: Option<String>,
    pub learning_date: DateTime<Utc>,
    pub review_count: i64,
    pub user_id: Option<Uuid>,
}

impl LearnedWordRecord {
    pub fn day(&self) -> NaiveDate {
        self.learning_date.date_naive()
    }
}

//=========================================================================================
// Membership
//=========================================================================================

/// A platform product identifier, as reported by the purchase ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The products offered for sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Monthly,
    Yearly,
    Lifetime,
}

impl Product {
    pub const ALL: [Product; 3] = [Product::Monthly, Product::Yearly, Product::Lifetime];

    pub fn id(self) -> ProductId {
        ProductId::new(match self {
            Product::Monthly => "com.kewan.subscription.qiu1.monthly",
            Product::Yearly => "com.kewan.subscription.qiu2.yearly",
            Product::Lifetime => "com.qiuzx.kewan.lifetime",
        })
    }

    pub fn from_id(id: &ProductId) -> Option<Self> {
        Product::ALL.into_iter().find(|p| p.id() == *id)
    }

    pub fn membership(self) -> MembershipLevel {
        match self {
            Product::Monthly => MembershipLevel::Monthly,
            Product::Yearly => MembershipLevel::Yearly,
            Product::Lifetime => MembershipLevel::Lifetime,
        }
    }
}

/// Membership tiers, ordered by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipLevel {
    Free,
    Monthly,
    Yearly,
    Lifetime,
}

impl MembershipLevel {
    pub fn has_access(self) -> bool {
        self != MembershipLevel::Free
    }
}

/// What the client received from the store when a purchase went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub transaction_id: String,
    /// The store's signed receipt, handed to the verifier as is.
    pub receipt_data: String,
}

/// A transaction the store has confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransaction {
    pub product_id: ProductId,
    /// Stable across subscription renewals, so it identifies the purchase itself.
    pub original_transaction_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    BasicWords,
    DailyPhrase,
    /// Intermediate and advanced word lists.
    AdvancedFeatures,
}

//=========================================================================================
// Accounts
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bubble_ids_parse_and_print() {
        let id: BubbleId = "42_en".parse().unwrap();
        assert_eq!(id, BubbleId::english("42"));
        assert_eq!(id.to_string(), "42_en");
        assert_eq!("word_7_cn".parse::<BubbleId>().unwrap(), BubbleId::chinese("word_7"));
        assert!("42".parse::<BubbleId>().is_err());
        assert!("_en".parse::<BubbleId>().is_err());
    }

    #[test]
    fn matching_needs_same_word_and_opposite_sides() {
        let en = BubbleId::english("1");
        assert!(en.matches(&BubbleId::chinese("1")));
        assert!(!en.matches(&BubbleId::english("1")));
        assert!(!en.matches(&BubbleId::chinese("2")));
    }

    #[test]
    fn word_pairs_are_trimmed_on_decode() {
        let word: WordPair = serde_json::from_str(
            r#"{"id":"1","english":" Apple ","chinese":"苹果 ","phonetic":" /ˈæp.əl/"}"#,
        )
        .unwrap();
        assert_eq!(word.english, "Apple");
        assert_eq!(word.chinese, "苹果");
        assert_eq!(word.phonetic.as_deref(), Some("/ˈæp.əl/"));

        let bare: WordPair =
            serde_json::from_str(r#"{"id":"2","english":"Pear","chinese":"梨"}"#).unwrap();
        assert_eq!(bare.phonetic, None);
    }

    #[test]
    fn scores_round_to_tenths() {
        assert_eq!(encode_score(5.0), 50);
        assert_eq!(encode_score(7.25), 73);
        let entry = ScoreEntry {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            level: Difficulty::Hard,
            score: 155,
            total_time: 3.0,
            user_id: None,
        };
        assert_eq!(entry.display_score(), 15.5);
    }

    #[test]
    fn products_map_to_membership() {
        assert_eq!(
            Product::from_id(&ProductId::new("com.qiuzx.kewan.lifetime")),
            Some(Product::Lifetime)
        );
        assert_eq!(Product::from_id(&ProductId::new("unknown")), None);
        assert!(MembershipLevel::Lifetime > MembershipLevel::Yearly);
        assert!(MembershipLevel::Yearly > MembershipLevel::Monthly);
        assert!(!MembershipLevel::Free.has_access());
    }
}
