//! crates/bubble_words_core/src/learned.rs
//!
//! Learned-word bookkeeping with a rolling retention window.
//! Days and the window are counted in UTC.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{LearnedWordRecord, WordPair};
use crate::ports::{PortResult, ProgressStore};

/// Days a learned-word record is kept.
pub const RETENTION_DAYS: i64 = 30;

/// First day still inside a window of `within_days` ending on `today`.
fn window_start(today: NaiveDate, within_days: i64) -> NaiveDate {
    today - ChronoDuration::days(within_days)
}

pub struct LearnedWordStore {
    store: Arc<dyn ProgressStore>,
    write_lock: Mutex<()>,
}

impl LearnedWordStore {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn record_learned(
        &self,
        word: &WordPair,
        user_id: Option<Uuid>,
    ) -> PortResult<LearnedWordRecord> {
        self.record_learned_at(word, user_id, Utc::now()).await
    }

    /// Records that `word` was matched at `at`.
    ///
    /// Expired records of every user are purged first. A second match of the same
    /// word on the same day bumps its review count instead of adding a record.
    pub async fn record_learned_at(
        &self,
        word: &WordPair,
        user_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> PortResult<LearnedWordRecord> {
        let day = at.date_naive();

        let _guard = self.write_lock.lock().await;
        let purged = self
            .store
            .purge_learned_before(window_start(day, RETENTION_DAYS))
            .await?;
        if purged > 0 {
            info!("Cleaned up {} expired learned-word records", purged);
        }

        if let Some(mut existing) = self.store.find_learned(user_id, &word.english, day).await? {
            self.store.increment_review_count(existing.id).await?;
            existing.review_count += 1;
            debug!("Review count of '{}' is now {}", existing.english, existing.review_count);
            return Ok(existing);
        }

        let phonetic = match &word.phonetic {
            Some(phonetic) => Some(phonetic.clone()),
            None => self
                .store
                .latest_learned(user_id, &word.english)
                .await?
                .and_then(|previous| previous.phonetic),
        };

        let record = LearnedWordRecord {
            id: Uuid::new_v4(),
            english: word.english.clone(),
            chinese: word.chinese.clone(),
            phonetic,
            learning_date: at,
            review_count: 1,
            user_id,
        };
        self.store.insert_learned(record.clone()).await?;
        debug!("Created learned-word record for '{}'", record.english);
        Ok(record)
    }

    pub async fn query(
        &self,
        user_id: Option<Uuid>,
        within_days: i64,
    ) -> PortResult<Vec<LearnedWordRecord>> {
        self.query_at(user_id, within_days, Utc::now()).await
    }

    /// Records inside the window ending at `now`, newest first.
    pub async fn query_at(
        &self,
        user_id: Option<Uuid>,
        within_days: i64,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<LearnedWordRecord>> {
        let since = window_start(now.date_naive(), within_days.clamp(0, RETENTION_DAYS));
        let mut records = self.store.list_learned(user_id, since).await?;
        records.sort_by(|a, b| b.learning_date.cmp(&a.learning_date));
        Ok(records)
    }

    /// Deletes all scores and learned words of a user; used when an account is removed.
    pub async fn purge_user(&self, user_id: Uuid) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.purge_user(user_id).await?;
        info!("Purged progress data for user {}", user_id);
        Ok(())
    }
}
