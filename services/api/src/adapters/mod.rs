pub mod db;
pub mod dictionary;
pub mod store;
pub mod tts;
pub mod words;

pub use db::DbAdapter;
pub use dictionary::DictionaryAdapter;
pub use store::{AppStoreVerifier, DisabledStoreVerifier};
pub use tts::{OpenAiTtsAdapter, SilentNarrator};
pub use words::FileWordSource;
