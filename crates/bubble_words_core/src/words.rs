//! crates/bubble_words_core/src/words.rs
//!
//! Word sources and the fallback chain used to fill a round.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{WordLevel, WordPair};
use crate::ports::{PortError, PortResult, WordSource};

const BASIC_WORDS: &str = include_str!("../data/basic_words.json");

/// The basic word list compiled into the binary. Every level resolves to it.
#[derive(Clone)]
pub struct BundledWords {
    words: Vec<WordPair>,
}

impl BundledWords {
    pub fn new() -> PortResult<Self> {
        let words = serde_json::from_str(BASIC_WORDS)
            .map_err(|e| PortError::Unexpected(format!("bundled word list is invalid: {}", e)))?;
        Ok(Self { words })
    }
}

#[async_trait]
impl WordSource for BundledWords {
    async fn load_words(&self, _level: WordLevel) -> PortResult<Vec<WordPair>> {
        Ok(self.words.clone())
    }
}

/// Tries `primary` first and degrades to `fallback`.
///
/// A level the primary source cannot serve, or serves empty, is retried as the
/// basic level before giving up on the primary source altogether.
pub struct FallbackWordSource {
    primary: Arc<dyn WordSource>,
    fallback: Arc<dyn WordSource>,
}

impl FallbackWordSource {
    pub fn new(primary: Arc<dyn WordSource>, fallback: Arc<dyn WordSource>) -> Self {
        Self { primary, fallback }
    }

    async fn try_primary(&self, level: WordLevel) -> Option<Vec<WordPair>> {
        match self.primary.load_words(level).await {
            Ok(words) if !words.is_empty() => Some(words),
            Ok(_) => {
                warn!("No words available for level {}", level.number());
                None
            }
            Err(e) => {
                warn!("Failed to load words for level {}: {}", level.number(), e);
                None
            }
        }
    }
}

#[async_trait]
impl WordSource for FallbackWordSource {
    async fn load_words(&self, level: WordLevel) -> PortResult<Vec<WordPair>> {
        if let Some(words) = self.try_primary(level).await {
            return Ok(words);
        }
        if level != WordLevel::Basic {
            if let Some(words) = self.try_primary(WordLevel::Basic).await {
                warn!("Using level 1 words in place of level {}", level.number());
                return Ok(words);
            }
        }
        warn!("Falling back to the bundled word list");
        self.fallback.load_words(level).await
    }
}
