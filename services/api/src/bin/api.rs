//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        db::DbAdapter,
        dictionary::DictionaryAdapter,
        store::{AppStoreVerifier, DisabledStoreVerifier},
        tts::{parse_voice, OpenAiTtsAdapter, SilentNarrator},
        words::FileWordSource,
    },
    config::{Config, ConfigError},
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        delete_account_handler, learned_words_handler, list_favorites_handler,
        list_scores_handler, membership_handler, phonetic_handler, purchase_handler,
        require_auth,
        rest::ApiDoc,
        score_history_handler,
        state::AppState,
        update_favorite_handler, ws_handler,
    },
};
use async_openai::{config::OpenAIConfig, types::audio::SpeechModel, Client};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use bubble_words_core::ports::{Narrator, StoreVerifier, WordSource};
use bubble_words_core::{
    BundledWords, FallbackWordSource, FavoriteBook, LearnedWordStore, ScoreLedger,
    VerifiedPurchases,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(30));
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let narrator: Arc<dyn Narrator> = match &config.openai_api_key {
        Some(api_key) => {
            let voice = parse_voice(&config.tts_voice).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "TTS_VOICE".to_string(),
                    format!("'{}' is not a supported voice", config.tts_voice),
                )
            })?;
            let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
            let adapter = OpenAiTtsAdapter::new(client, SpeechModel::Tts1, voice)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            Arc::new(adapter)
        }
        None => {
            warn!("OPENAI_API_KEY is not set; words will not be narrated");
            Arc::new(SilentNarrator)
        }
    };

    let bundled = BundledWords::new()?;
    let words: Arc<dyn WordSource> = Arc::new(FallbackWordSource::new(
        Arc::new(FileWordSource::new(config.words_path.clone())),
        Arc::new(bundled),
    ));

    let http = reqwest::Client::new();
    let phonetics = Arc::new(
        DictionaryAdapter::new(http.clone(), &config.dictionary_api_url).map_err(|e| {
            ConfigError::InvalidValue("DICTIONARY_API_URL".to_string(), e.to_string())
        })?,
    );

    let verifier: Arc<dyn StoreVerifier> = match &config.app_store_shared_secret {
        Some(secret) => Arc::new(AppStoreVerifier::new(
            http,
            secret.clone(),
            config.app_store_bundle_id.clone(),
        )),
        None => {
            warn!("APP_STORE_SHARED_SECRET is not set; purchases will be refused");
            Arc::new(DisabledStoreVerifier)
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        accounts: db_adapter.clone(),
        scores: Arc::new(ScoreLedger::new(db_adapter.clone())),
        learned: Arc::new(LearnedWordStore::new(db_adapter.clone())),
        favorites: Arc::new(FavoriteBook::new(db_adapter.clone())),
        purchases: Arc::new(VerifiedPurchases::new(verifier, db_adapter)),
        words,
        narrator,
        phonetics,
        timings: config.timings,
        default_voice: config.tts_voice.clone(),
    });

    // --- 5. Configure CORS ---
    let allowed_origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ConfigError::InvalidValue("ALLOWED_ORIGIN".to_string(), e.to_string())
    })?;
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/ws", get(ws_handler))
        .route("/scores", get(list_scores_handler))
        .route("/scores/history", get(score_history_handler))
        .route("/learned-words", get(learned_words_handler))
        .route("/membership", get(membership_handler))
        .route("/purchases", post(purchase_handler))
        .route("/favorites", get(list_favorites_handler).put(update_favorite_handler))
        .route("/words/{english}/phonetic", get(phonetic_handler))
        .route("/account", delete(delete_account_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
