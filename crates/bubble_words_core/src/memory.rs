//! crates/bubble_words_core/src/memory.rs
//!
//! An in-process implementation of the storage ports. Everything lives behind a
//! single lock, so multi-table operations are atomic. Used by tests and by
//! throwaway sessions that do not need durability.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Difficulty, LearnedWordRecord, ProductId, ScoreEntry, User, UserCredentials,
    VerifiedTransaction,
};
use crate::ports::{
    AccountStore, FavoriteStore, PortError, PortResult, ProgressStore, TransactionStore,
};

#[derive(Default)]
struct Tables {
    scores: Vec<ScoreEntry>,
    learned: Vec<LearnedWordRecord>,
    users: HashMap<Uuid, UserCredentials>,
    auth_sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    favorites: HashMap<Uuid, String>,
    /// Original transaction id to its owner and product.
    purchases: HashMap<String, (Uuid, ProductId)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

//=========================================================================================
// `ProgressStore` Implementation
//=========================================================================================

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn find_score(
        &self,
        user_id: Option<Uuid>,
        day: NaiveDate,
        level: Difficulty,
    ) -> PortResult<Option<ScoreEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .scores
            .iter()
            .find(|s| s.user_id == user_id && s.date == day && s.level == level)
            .cloned())
    }

    async fn insert_score(&self, entry: ScoreEntry) -> PortResult<()> {
        self.tables.write().await.scores.push(entry);
        Ok(())
    }

    async fn update_score(&self, id: Uuid, score: i64, total_time: f64) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .scores
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| PortError::NotFound(format!("Score entry {} not found", id)))?;
        entry.score = score;
        entry.total_time = total_time;
        Ok(())
    }

    async fn list_scores(&self, user_id: Option<Uuid>) -> PortResult<Vec<ScoreEntry>> {
        let tables = self.tables.read().await;
        let mut scores: Vec<ScoreEntry> = tables
            .scores
            .iter()
            .filter(|s| user_id.is_none() || s.user_id == user_id)
            .cloned()
            .collect();
        scores.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(scores)
    }

    async fn purge_learned_before(&self, cutoff: NaiveDate) -> PortResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.learned.len();
        tables.learned.retain(|w| w.day() >= cutoff);
        Ok((before - tables.learned.len()) as u64)
    }

    async fn find_learned(
        &self,
        user_id: Option<Uuid>,
        english: &str,
        day: NaiveDate,
    ) -> PortResult<Option<LearnedWordRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .learned
            .iter()
            .find(|w| w.user_id == user_id && w.english == english && w.day() == day)
            .cloned())
    }

    async fn latest_learned(
        &self,
        user_id: Option<Uuid>,
        english: &str,
    ) -> PortResult<Option<LearnedWordRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .learned
            .iter()
            .filter(|w| w.user_id == user_id && w.english == english)
            .max_by_key(|w| w.learning_date)
            .cloned())
    }

    async fn insert_learned(&self, record: LearnedWordRecord) -> PortResult<()> {
        self.tables.write().await.learned.push(record);
        Ok(())
    }

    async fn increment_review_count(&self, id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let record = tables
            .learned
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| PortError::NotFound(format!("Learned word {} not found", id)))?;
        record.review_count += 1;
        Ok(())
    }

    async fn list_learned(
        &self,
        user_id: Option<Uuid>,
        since: NaiveDate,
    ) -> PortResult<Vec<LearnedWordRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<LearnedWordRecord> = tables
            .learned
            .iter()
            .filter(|w| w.day() >= since && (user_id.is_none() || w.user_id == user_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.learning_date.cmp(&a.learning_date));
        Ok(records)
    }

    async fn purge_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        tables.scores.retain(|s| s.user_id != Some(user_id));
        tables.learned.retain(|w| w.user_id != Some(user_id));
        Ok(())
    }
}

//=========================================================================================
// `AccountStore` Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == email) {
            return Err(PortError::Unexpected(format!("Email {} is already registered", email)));
        }
        let user_id = Uuid::new_v4();
        tables.users.insert(
            user_id,
            UserCredentials {
                user_id,
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
            },
        );
        Ok(User {
            user_id,
            email: Some(email.to_string()),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let tables = self.tables.read().await;
        tables
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.tables
            .write()
            .await
            .auth_sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let tables = self.tables.read().await;
        match tables.auth_sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.write().await.auth_sessions.remove(session_id);
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        tables.auth_sessions.retain(|_, (owner, _)| *owner != user_id);
        tables.users.remove(&user_id);
        Ok(())
    }
}

//=========================================================================================
// `FavoriteStore` and `TransactionStore` Implementations
//=========================================================================================

#[async_trait]
impl FavoriteStore for MemoryStore {
    async fn load_favorites(&self, user_id: Uuid) -> PortResult<Option<String>> {
        Ok(self.tables.read().await.favorites.get(&user_id).cloned())
    }

    async fn save_favorites(&self, user_id: Uuid, blob: &str) -> PortResult<()> {
        self.tables
            .write()
            .await
            .favorites
            .insert(user_id, blob.to_string());
        Ok(())
    }

    async fn delete_favorites(&self, user_id: Uuid) -> PortResult<()> {
        self.tables.write().await.favorites.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn products_of(&self, user_id: Uuid) -> PortResult<HashSet<ProductId>> {
        Ok(self
            .tables
            .read()
            .await
            .purchases
            .values()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, product)| product.clone())
            .collect())
    }

    async fn claim_transaction(
        &self,
        user_id: Uuid,
        transaction: &VerifiedTransaction,
    ) -> PortResult<Uuid> {
        let mut tables = self.tables.write().await;
        let (owner, _) = tables
            .purchases
            .entry(transaction.original_transaction_id.clone())
            .or_insert_with(|| (user_id, transaction.product_id.clone()));
        Ok(*owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn expired_auth_sessions_are_rejected() {
        let store = MemoryStore::new();
        let user = store.create_user_with_email("a@b.c", "hash").await.unwrap();
        store
            .create_auth_session("live", user.user_id, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        store
            .create_auth_session("old", user.user_id, Utc::now() - Duration::days(1))
            .await
            .unwrap();

        assert_eq!(store.validate_auth_session("live").await.unwrap(), user.user_id);
        assert!(matches!(
            store.validate_auth_session("old").await,
            Err(PortError::Unauthorized)
        ));

        store.delete_user(user.user_id).await.unwrap();
        assert!(store.validate_auth_session("live").await.is_err());
        assert!(store.get_user_by_email("a@b.c").await.is_err());
    }

    #[tokio::test]
    async fn the_first_claim_on_a_transaction_wins() {
        let store = MemoryStore::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let transaction = VerifiedTransaction {
            product_id: ProductId::new("com.qiuzx.kewan.lifetime"),
            original_transaction_id: "1000".to_string(),
        };

        assert_eq!(store.claim_transaction(alice, &transaction).await.unwrap(), alice);
        assert_eq!(store.claim_transaction(bob, &transaction).await.unwrap(), alice);
        assert_eq!(store.products_of(alice).await.unwrap().len(), 1);
        assert!(store.products_of(bob).await.unwrap().is_empty());
    }
}
