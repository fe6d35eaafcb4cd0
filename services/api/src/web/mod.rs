pub mod auth;
pub mod game_task;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use middleware::require_auth;
pub use rest::{
    delete_account_handler, learned_words_handler, list_favorites_handler, list_scores_handler,
    membership_handler, phonetic_handler, purchase_handler, score_history_handler,
    update_favorite_handler,
};
pub use ws_handler::ws_handler;
