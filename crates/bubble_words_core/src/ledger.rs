//! crates/bubble_words_core/src/ledger.rs
//!
//! Daily score aggregation on top of the `ProgressStore` port.
//!
//! Days are UTC calendar days. The server never sees the player's time zone,
//! so a round played late in the evening may land on the next day's entry.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{encode_score, Difficulty, ScoreEntry};
use crate::ports::{PortResult, ProgressStore};

/// Accumulates round scores into one entry per (user, day, difficulty).
pub struct ScoreLedger {
    store: Arc<dyn ProgressStore>,
    write_lock: Mutex<()>,
}

impl ScoreLedger {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Adds a finished round to the entry of the current UTC day.
    pub async fn record_round_today(
        &self,
        score: f64,
        difficulty: Difficulty,
        elapsed: Duration,
        user_id: Option<Uuid>,
    ) -> PortResult<ScoreEntry> {
        let today = Utc::now().date_naive();
        self.record_round(score, difficulty, elapsed, user_id, today).await
    }

    /// Adds a finished round to the entry for `day`, creating it if needed.
    ///
    /// `score` is the displayed value; it is stored multiplied by ten.
    pub async fn record_round(
        &self,
        score: f64,
        difficulty: Difficulty,
        elapsed: Duration,
        user_id: Option<Uuid>,
        day: NaiveDate,
    ) -> PortResult<ScoreEntry> {
        let stored = encode_score(score);
        let seconds = elapsed.as_secs_f64();

        let _guard = self.write_lock.lock().await;
        match self.store.find_score(user_id, day, difficulty).await? {
            Some(mut entry) => {
                entry.score += stored;
                entry.total_time += seconds;
                self.store
                    .update_score(entry.id, entry.score, entry.total_time)
                    .await?;
                debug!("Added {} to score entry {} ({})", stored, entry.id, day);
                Ok(entry)
            }
            None => {
                let entry = ScoreEntry {
                    id: Uuid::new_v4(),
                    date: day,
                    level: difficulty,
                    score: stored,
                    total_time: seconds,
                    user_id,
                };
                self.store.insert_score(entry.clone()).await?;
                debug!("Created score entry {} for {}", entry.id, day);
                Ok(entry)
            }
        }
    }

    /// All entries for a user, or for every user when `None`, newest day first.
    pub async fn query(&self, user_id: Option<Uuid>) -> PortResult<Vec<ScoreEntry>> {
        let mut entries = self.store.list_scores(user_id).await?;
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, d).unwrap()
    }

    #[tokio::test]
    async fn same_day_rounds_are_summed_into_one_entry() {
        let ledger = ScoreLedger::new(Arc::new(MemoryStore::new()));
        let user = Some(Uuid::new_v4());

        ledger
            .record_round(5.0, Difficulty::Normal, Duration::from_secs(20), user, day(3))
            .await
            .unwrap();
        let entry = ledger
            .record_round(7.0, Difficulty::Normal, Duration::from_secs(15), user, day(3))
            .await
            .unwrap();

        let entries = ledger.query(user).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, entry.id);
        assert_eq!(entries[0].score, 120);
        assert_eq!(entries[0].display_score(), 12.0);
        assert_eq!(entries[0].total_time, 35.0);
    }

    #[tokio::test]
    async fn difficulty_day_and_user_each_split_entries() {
        let ledger = ScoreLedger::new(Arc::new(MemoryStore::new()));
        let alice = Some(Uuid::new_v4());
        let bob = Some(Uuid::new_v4());
        let secs = Duration::from_secs(1);

        ledger.record_round(5.0, Difficulty::Normal, secs, alice, day(3)).await.unwrap();
        ledger.record_round(10.0, Difficulty::Hard, secs, alice, day(3)).await.unwrap();
        ledger.record_round(5.0, Difficulty::Normal, secs, alice, day(4)).await.unwrap();
        ledger.record_round(5.0, Difficulty::Normal, secs, bob, day(3)).await.unwrap();

        let alice_entries = ledger.query(alice).await.unwrap();
        assert_eq!(alice_entries.len(), 3);
        assert_eq!(alice_entries[0].date, day(4));
        assert!(alice_entries.windows(2).all(|w| w[0].date >= w[1].date));

        assert_eq!(ledger.query(bob).await.unwrap().len(), 1);
        assert_eq!(ledger.query(None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn single_word_round_is_stored_as_fifty() {
        let ledger = ScoreLedger::new(Arc::new(MemoryStore::new()));
        let user = Some(Uuid::new_v4());
        ledger
            .record_round_today(5.0, Difficulty::Normal, Duration::from_millis(1500), user)
            .await
            .unwrap();

        let entries = ledger.query(user).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].score, 50);
        assert_eq!(entries[0].level, Difficulty::Normal);
        assert_eq!(entries[0].date, Utc::now().date_naive());
    }
}
