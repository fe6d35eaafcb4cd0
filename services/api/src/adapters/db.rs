//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! storage ports from the `core` crate. It handles all interactions with the
//! SQLite database using `sqlx`.

use async_trait::async_trait;
use bubble_words_core::domain::{
    Difficulty, LearnedWordRecord, ProductId, ScoreEntry, User, UserCredentials,
    VerifiedTransaction,
};
use bubble_words_core::ports::{
    AccountStore, FavoriteStore, PortError, PortResult, ProgressStore, TransactionStore,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ScoreRecord {
    id: Uuid,
    date: NaiveDate,
    level: i64,
    score: i64,
    total_time: f64,
    user_id: Option<Uuid>,
}
impl ScoreRecord {
    fn to_domain(self) -> ScoreEntry {
        ScoreEntry {
            id: self.id,
            date: self.date,
            level: Difficulty::from_flag(self.level),
            score: self.score,
            total_time: self.total_time,
            user_id: self.user_id,
        }
    }
}

#[derive(FromRow)]
struct LearnedWordRow {
    id: Uuid,
    english: String,
    chinese: String,
    phonetic: Option<String>,
    learning_date: DateTime<Utc>,
    review_count: i64,
    user_id: Option<Uuid>,
}
impl LearnedWordRow {
    fn to_domain(self) -> LearnedWordRecord {
        LearnedWordRecord {
            id: self.id,
            english: self.english,
            chinese: self.chinese,
            phonetic: self.phonetic,
            learning_date: self.learning_date,
            review_count: self.review_count,
            user_id: self.user_id,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct AuthSessionRecord {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

const SCORE_COLUMNS: &str = "id, date, level, score, total_time, user_id";
const LEARNED_COLUMNS: &str =
    "id, english, chinese, phonetic, learning_date, review_count, user_id";

//=========================================================================================
// `ProgressStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgressStore for DbAdapter {
    async fn find_score(
        &self,
        user_id: Option<Uuid>,
        day: NaiveDate,
        level: Difficulty,
    ) -> PortResult<Option<ScoreEntry>> {
        let record = sqlx::query_as::<_, ScoreRecord>(&format!(
            "SELECT {SCORE_COLUMNS} FROM game_scores WHERE user_id IS ? AND date = ? AND level = ? LIMIT 1"
        ))
        .bind(user_id)
        .bind(day)
        .bind(level.flag())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ScoreRecord::to_domain))
    }

    async fn insert_score(&self, entry: ScoreEntry) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO game_scores (id, date, level, score, total_time, user_id) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id)
        .bind(entry.date)
        .bind(entry.level.flag())
        .bind(entry.score)
        .bind(entry.total_time)
        .bind(entry.user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn update_score(&self, id: Uuid, score: i64, total_time: f64) -> PortResult<()> {
        let result = sqlx::query("UPDATE game_scores SET score = ?, total_time = ? WHERE id = ?")
            .bind(score)
            .bind(total_time)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Score entry {} not found", id)));
        }
        Ok(())
    }

    async fn list_scores(&self, user_id: Option<Uuid>) -> PortResult<Vec<ScoreEntry>> {
        let records = match user_id {
            Some(user_id) => {
                sqlx::query_as::<_, ScoreRecord>(&format!(
                    "SELECT {SCORE_COLUMNS} FROM game_scores WHERE user_id = ? ORDER BY date DESC"
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ScoreRecord>(&format!(
                    "SELECT {SCORE_COLUMNS} FROM game_scores ORDER BY date DESC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(unexpected)?;

        Ok(records.into_iter().map(ScoreRecord::to_domain).collect())
    }

    async fn purge_learned_before(&self, cutoff: NaiveDate) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM learned_words WHERE learning_day < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn find_learned(
        &self,
        user_id: Option<Uuid>,
        english: &str,
        day: NaiveDate,
    ) -> PortResult<Option<LearnedWordRecord>> {
        let record = sqlx::query_as::<_, LearnedWordRow>(&format!(
            "SELECT {LEARNED_COLUMNS} FROM learned_words WHERE user_id IS ? AND english = ? AND learning_day = ? LIMIT 1"
        ))
        .bind(user_id)
        .bind(english)
        .bind(day)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(LearnedWordRow::to_domain))
    }

    async fn latest_learned(
        &self,
        user_id: Option<Uuid>,
        english: &str,
    ) -> PortResult<Option<LearnedWordRecord>> {
        let record = sqlx::query_as::<_, LearnedWordRow>(&format!(
            "SELECT {LEARNED_COLUMNS} FROM learned_words WHERE user_id IS ? AND english = ? ORDER BY learning_date DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(english)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(LearnedWordRow::to_domain))
    }

    async fn insert_learned(&self, record: LearnedWordRecord) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO learned_words (id, english, chinese, phonetic, learning_date, learning_day, review_count, user_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(&record.english)
        .bind(&record.chinese)
        .bind(&record.phonetic)
        .bind(record.learning_date)
        .bind(record.day())
        .bind(record.review_count)
        .bind(record.user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn increment_review_count(&self, id: Uuid) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE learned_words SET review_count = review_count + 1 WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Learned word {} not found", id)));
        }
        Ok(())
    }

    async fn list_learned(
        &self,
        user_id: Option<Uuid>,
        since: NaiveDate,
    ) -> PortResult<Vec<LearnedWordRecord>> {
        let records = match user_id {
            Some(user_id) => {
                sqlx::query_as::<_, LearnedWordRow>(&format!(
                    "SELECT {LEARNED_COLUMNS} FROM learned_words WHERE learning_day >= ? AND user_id = ? ORDER BY learning_date DESC"
                ))
                .bind(since)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, LearnedWordRow>(&format!(
                    "SELECT {LEARNED_COLUMNS} FROM learned_words WHERE learning_day >= ? ORDER BY learning_date DESC"
                ))
                .bind(since)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(unexpected)?;

        Ok(records.into_iter().map(LearnedWordRow::to_domain).collect())
    }

    async fn purge_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("DELETE FROM game_scores WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query("DELETE FROM learned_words WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (user_id, email, hashed_password) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(email)
            .bind(hashed_password)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(User {
            user_id,
            email: Some(email.to_string()),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = ? AND hashed_password IS NOT NULL",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT user_id, expires_at FROM auth_sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match record {
            Some(session) if session.expires_at > Utc::now() => Ok(session.user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("DELETE FROM auth_sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `FavoriteStore` and `TransactionStore` Trait Implementations
//=========================================================================================

#[async_trait]
impl FavoriteStore for DbAdapter {
    async fn load_favorites(&self, user_id: Uuid) -> PortResult<Option<String>> {
        let blob: Option<(String,)> =
            sqlx::query_as("SELECT favorites_data FROM word_favorites WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(blob.map(|(data,)| data))
    }

    async fn save_favorites(&self, user_id: Uuid, blob: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO word_favorites (user_id, favorites_data) VALUES (?, ?) ON CONFLICT (user_id) DO UPDATE SET favorites_data = excluded.favorites_data",
        )
        .bind(user_id)
        .bind(blob)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_favorites(&self, user_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM word_favorites WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

/// One row per store transaction the verifier has confirmed. The transaction id is
/// the primary key, so a receipt can never be attached to a second account.
#[async_trait]
impl TransactionStore for DbAdapter {
    async fn products_of(&self, user_id: Uuid) -> PortResult<HashSet<ProductId>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT product_id FROM purchases WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(rows.into_iter().map(|(id,)| ProductId(id)).collect())
    }

    async fn claim_transaction(
        &self,
        user_id: Uuid,
        transaction: &VerifiedTransaction,
    ) -> PortResult<Uuid> {
        sqlx::query(
            "INSERT INTO purchases (transaction_id, user_id, product_id, purchased_at) VALUES (?, ?, ?, ?) ON CONFLICT (transaction_id) DO NOTHING",
        )
        .bind(&transaction.original_transaction_id)
        .bind(user_id)
        .bind(transaction.product_id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        let (owner,): (Uuid,) =
            sqlx::query_as("SELECT user_id FROM purchases WHERE transaction_id = ?")
                .bind(&transaction.original_transaction_id)
                .fetch_one(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(owner)
    }
}
