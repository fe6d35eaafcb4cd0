//! services/api/src/adapters/words.rs
//!
//! Loads word lists from `level{n}.json` files in a directory.

use async_trait::async_trait;
use bubble_words_core::domain::{WordLevel, WordPair};
use bubble_words_core::ports::{PortError, PortResult, WordSource};
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Clone)]
pub struct FileWordSource {
    dir: PathBuf,
}

impl FileWordSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn level_path(&self, level: WordLevel) -> PathBuf {
        self.dir.join(format!("level{}.json", level.number()))
    }
}

#[async_trait]
impl WordSource for FileWordSource {
    async fn load_words(&self, level: WordLevel) -> PortResult<Vec<WordPair>> {
        let path = self.level_path(level);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortError::NotFound(path.display().to_string()),
            _ => PortError::Unavailable(format!("{}: {}", path.display(), e)),
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| PortError::Unexpected(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bubble_words_{}_{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn reads_the_level_file() {
        let dir = scratch_dir("levels");
        std::fs::write(
            dir.join("level2.json"),
            r#"[{"id": "i1", "english": " bridge ", "chinese": "桥"}]"#,
        )
        .unwrap();

        let words = FileWordSource::new(&dir)
            .load_words(WordLevel::Intermediate)
            .await
            .unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].english, "bridge");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn missing_level_is_not_found() {
        let dir = scratch_dir("missing");
        let result = FileWordSource::new(&dir).load_words(WordLevel::Advanced).await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
