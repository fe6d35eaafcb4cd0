//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    auth::{AuthResponse, LoginRequest, SignupRequest, CLEARED_SESSION_COOKIE},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use bubble_words_core::domain::{
    Difficulty, LearnedWordRecord, MembershipLevel, Product, ProductId, PurchaseReceipt,
    ScoreEntry,
};
use bubble_words_core::favorites::FavoriteMap;
use bubble_words_core::history::{daily_history, DayHistory};
use bubble_words_core::learned::RETENTION_DAYS;
use bubble_words_core::ports::{PortError, PurchaseError};
use bubble_words_core::EntitlementGate;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        crate::web::ws_handler::ws_handler,
        list_scores_handler,
        score_history_handler,
        learned_words_handler,
        membership_handler,
        purchase_handler,
        list_favorites_handler,
        update_favorite_handler,
        phonetic_handler,
        delete_account_handler,
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            AuthResponse,
            ScoreResponse,
            DayScoreResponse,
            DayHistoryResponse,
            LearnedWordResponse,
            MembershipResponse,
            PurchaseRequest,
            FavoritesResponse,
            UpdateFavoriteRequest,
            PhoneticResponse,
        )
    ),
    tags(
        (name = "Bubble Words API", description = "Scores, learned words, membership and the game WebSocket.")
    )
)]
pub struct ApiDoc;

type RestError = (StatusCode, String);

fn internal(context: &str, e: PortError) -> RestError {
    error!("{}: {:?}", context, e);
    (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
}

fn difficulty_name(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Normal => "normal",
        Difficulty::Hard => "hard",
    }
}

fn membership_name(level: MembershipLevel) -> &'static str {
    match level {
        MembershipLevel::Free => "free",
        MembershipLevel::Monthly => "monthly",
        MembershipLevel::Yearly => "yearly",
        MembershipLevel::Lifetime => "lifetime",
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// One day's accumulated score at one difficulty.
#[derive(Serialize, ToSchema)]
pub struct ScoreResponse {
    id: Uuid,
    date: NaiveDate,
    /// `normal` or `hard`.
    difficulty: String,
    score: f64,
    /// Seconds spent playing that day.
    total_time: f64,
}

impl From<ScoreEntry> for ScoreResponse {
    fn from(entry: ScoreEntry) -> Self {
        Self {
            id: entry.id,
            date: entry.date,
            difficulty: difficulty_name(entry.level).to_string(),
            score: entry.display_score(),
            total_time: entry.total_time,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DayScoreResponse {
    difficulty: String,
    score: f64,
    total_time: f64,
}

#[derive(Serialize, ToSchema)]
pub struct DayHistoryResponse {
    date: NaiveDate,
    total_score: f64,
    scores: Vec<DayScoreResponse>,
    /// Words matched that day.
    words: Vec<String>,
}

impl From<DayHistory> for DayHistoryResponse {
    fn from(day: DayHistory) -> Self {
        Self {
            date: day.date,
            total_score: day.total_score(),
            scores: day
                .scores
                .into_iter()
                .map(|s| DayScoreResponse {
                    difficulty: difficulty_name(s.difficulty).to_string(),
                    score: s.score,
                    total_time: s.total_time,
                })
                .collect(),
            words: day.words,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LearnedWordResponse {
    id: Uuid,
    english: String,
    chinese: String,
    phonetic: Option<String>,
    learning_date: DateTime<Utc>,
    review_count: i64,
}

impl From<LearnedWordRecord> for LearnedWordResponse {
    fn from(record: LearnedWordRecord) -> Self {
        Self {
            id: record.id,
            english: record.english,
            chinese: record.chinese,
            phonetic: record.phonetic,
            learning_date: record.learning_date,
            review_count: record.review_count,
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct LearnedWordsQuery {
    /// Days to look back, at most 30.
    within_days: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct MembershipResponse {
    /// `free`, `monthly`, `yearly` or `lifetime`.
    level: String,
    products: Vec<String>,
    advanced_features: bool,
}

impl From<&EntitlementGate> for MembershipResponse {
    fn from(gate: &EntitlementGate) -> Self {
        let mut products: Vec<String> = gate
            .purchased_products()
            .iter()
            .map(|p| p.to_string())
            .collect();
        products.sort();
        Self {
            level: membership_name(gate.membership_level()).to_string(),
            products,
            advanced_features: gate.membership_level().has_access(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PurchaseRequest {
    /// A store product id such as `com.qiuzx.kewan.lifetime`.
    product_id: String,
    /// The store transaction the client completed.
    transaction_id: String,
    /// The base64 App Store receipt, checked with the store before anything is granted.
    receipt_data: String,
}

#[derive(Serialize, ToSchema)]
pub struct FavoritesResponse {
    /// Word to star level (1 to 3).
    favorites: FavoriteMap,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateFavoriteRequest {
    word: String,
    /// 0 removes the word; repeating the current level also removes it.
    stars: u8,
}

#[derive(Serialize, ToSchema)]
pub struct PhoneticResponse {
    english: String,
    phonetic: Option<String>,
}

//=========================================================================================
// Scores and Learned Words
//=========================================================================================

/// List the user's daily scores, newest first.
#[utoipa::path(
    get,
    path = "/scores",
    responses(
        (status = 200, description = "Daily scores", body = [ScoreResponse]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_scores_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<ScoreResponse>>, RestError> {
    let scores = app_state
        .scores
        .query(Some(user_id))
        .await
        .map_err(|e| internal("Failed to load scores", e))?;
    Ok(Json(scores.into_iter().map(ScoreResponse::from).collect()))
}

/// Scores grouped by day together with the words learned on each day.
#[utoipa::path(
    get,
    path = "/scores/history",
    responses(
        (status = 200, description = "Per-day history", body = [DayHistoryResponse]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn score_history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<DayHistoryResponse>>, RestError> {
    let scores = app_state
        .scores
        .query(Some(user_id))
        .await
        .map_err(|e| internal("Failed to load scores", e))?;
    let words = app_state
        .learned
        .query(Some(user_id), RETENTION_DAYS)
        .await
        .map_err(|e| internal("Failed to load learned words", e))?;

    let history = daily_history(&scores, &words);
    Ok(Json(history.into_iter().map(DayHistoryResponse::from).collect()))
}

/// Words the user matched recently, newest first.
#[utoipa::path(
    get,
    path = "/learned-words",
    params(LearnedWordsQuery),
    responses(
        (status = 200, description = "Learned words", body = [LearnedWordResponse]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn learned_words_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<LearnedWordsQuery>,
) -> Result<Json<Vec<LearnedWordResponse>>, RestError> {
    let within_days = query.within_days.unwrap_or(RETENTION_DAYS);
    let words = app_state
        .learned
        .query(Some(user_id), within_days)
        .await
        .map_err(|e| internal("Failed to load learned words", e))?;
    Ok(Json(words.into_iter().map(LearnedWordResponse::from).collect()))
}

//=========================================================================================
// Membership
//=========================================================================================

#[utoipa::path(
    get,
    path = "/membership",
    responses(
        (status = 200, description = "Current membership", body = MembershipResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn membership_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<MembershipResponse>, RestError> {
    let gate = EntitlementGate::for_user(app_state.purchases.clone(), user_id)
        .await
        .map_err(|e| internal("Failed to load entitlements", e))?;
    Ok(Json(MembershipResponse::from(&gate)))
}

fn purchase_status(e: &PurchaseError) -> StatusCode {
    match e {
        PurchaseError::UserCancelled => StatusCode::CONFLICT,
        PurchaseError::Pending => StatusCode::ACCEPTED,
        PurchaseError::FailedVerification => StatusCode::PAYMENT_REQUIRED,
        PurchaseError::NotLoggedIn => StatusCode::UNAUTHORIZED,
        PurchaseError::NotConfigured => StatusCode::BAD_REQUEST,
        PurchaseError::Port(PortError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        PurchaseError::Port(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Verify a store receipt, record the purchase and return the new membership.
#[utoipa::path(
    post,
    path = "/purchases",
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Purchase recorded", body = MembershipResponse),
        (status = 202, description = "The purchase is pending"),
        (status = 400, description = "Unknown product or purchases are not configured"),
        (status = 402, description = "The receipt failed verification"),
        (status = 409, description = "The purchase was cancelled or refunded"),
        (status = 422, description = "The receipt is missing"),
        (status = 503, description = "The store could not be reached")
    )
)]
pub async fn purchase_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<MembershipResponse>, RestError> {
    let product = Product::from_id(&ProductId::new(req.product_id.trim())).ok_or((
        StatusCode::BAD_REQUEST,
        format!("Unknown product {}", req.product_id),
    ))?;

    let receipt = PurchaseReceipt {
        transaction_id: req.transaction_id.trim().to_string(),
        receipt_data: req.receipt_data,
    };

    let mut gate = EntitlementGate::for_user(app_state.purchases.clone(), user_id)
        .await
        .map_err(|e| internal("Failed to load entitlements", e))?;
    gate.purchase(product, &receipt).await.map_err(|e| {
        error!("Purchase of {:?} by user {} failed: {}", product, user_id, e);
        (purchase_status(&e), e.to_string())
    })?;

    Ok(Json(MembershipResponse::from(&gate)))
}

//=========================================================================================
// Favorites and Dictionary
//=========================================================================================

#[utoipa::path(
    get,
    path = "/favorites",
    responses(
        (status = 200, description = "Favorite words", body = FavoritesResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_favorites_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<FavoritesResponse>, RestError> {
    let favorites = app_state
        .favorites
        .favorites(user_id)
        .await
        .map_err(|e| internal("Failed to load favorites", e))?;
    Ok(Json(FavoritesResponse { favorites }))
}

/// Set or toggle the star level of a word.
#[utoipa::path(
    put,
    path = "/favorites",
    request_body = UpdateFavoriteRequest,
    responses(
        (status = 200, description = "Updated favorites", body = FavoritesResponse),
        (status = 400, description = "Empty word")
    )
)]
pub async fn update_favorite_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<UpdateFavoriteRequest>,
) -> Result<Json<FavoritesResponse>, RestError> {
    let word = req.word.trim();
    if word.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "word must not be empty".to_string()));
    }
    let favorites = app_state
        .favorites
        .update_favorite(user_id, word, req.stars)
        .await
        .map_err(|e| internal("Failed to save favorites", e))?;
    Ok(Json(FavoritesResponse { favorites }))
}

/// Look up the phonetic transcription of an English word.
#[utoipa::path(
    get,
    path = "/words/{english}/phonetic",
    params(("english" = String, Path, description = "The English word")),
    responses(
        (status = 200, description = "Phonetic, or null when the dictionary has none", body = PhoneticResponse),
        (status = 502, description = "The dictionary could not be reached")
    )
)]
pub async fn phonetic_handler(
    State(app_state): State<Arc<AppState>>,
    Path(english): Path<String>,
) -> Result<Json<PhoneticResponse>, RestError> {
    let phonetic = app_state
        .phonetics
        .lookup_phonetic(&english)
        .await
        .map_err(|e| {
            error!("Phonetic lookup for '{}' failed: {:?}", english, e);
            (StatusCode::BAD_GATEWAY, "Dictionary lookup failed".to_string())
        })?;
    Ok(Json(PhoneticResponse { english, phonetic }))
}

//=========================================================================================
// Account
//=========================================================================================

/// Delete the account with its scores, learned words, favorites and sessions.
#[utoipa::path(
    delete,
    path = "/account",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn delete_account_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, RestError> {
    app_state
        .learned
        .purge_user(user_id)
        .await
        .map_err(|e| internal("Failed to delete progress", e))?;
    app_state
        .favorites
        .clear(user_id)
        .await
        .map_err(|e| internal("Failed to delete favorites", e))?;
    app_state
        .accounts
        .delete_user(user_id)
        .await
        .map_err(|e| internal("Failed to delete account", e))?;

    info!("Deleted account {}", user_id);
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, CLEARED_SESSION_COOKIE.to_string())],
    ))
}
