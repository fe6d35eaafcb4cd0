//! crates/bubble_words_core/src/favorites.rs
//!
//! Star ratings a player gives to words, keyed by the English spelling.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ports::{FavoriteStore, PortError, PortResult};

/// Highest star level a word can be given.
pub const MAX_STARS: u8 = 3;

pub type FavoriteMap = BTreeMap<String, u8>;

pub struct FavoriteBook {
    store: Arc<dyn FavoriteStore>,
    /// Held across each load-modify-save so concurrent updates are not lost.
    write_lock: Mutex<()>,
}

impl FavoriteBook {
    pub fn new(store: Arc<dyn FavoriteStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn favorites(&self, user_id: Uuid) -> PortResult<FavoriteMap> {
        let Some(blob) = self.store.load_favorites(user_id).await? else {
            return Ok(FavoriteMap::new());
        };
        match serde_json::from_str(&blob) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!("Discarding unreadable favorites of user {}: {}", user_id, e);
                Ok(FavoriteMap::new())
            }
        }
    }

    /// Star level of a word, 0 when it is not a favorite.
    pub async fn favorite_level(&self, user_id: Uuid, word: &str) -> PortResult<u8> {
        Ok(self.favorites(user_id).await?.get(word).copied().unwrap_or(0))
    }

    /// Sets a word's stars. Setting the level it already has removes it instead.
    pub async fn update_favorite(&self, user_id: Uuid, word: &str, stars: u8) -> PortResult<FavoriteMap> {
        let stars = stars.min(MAX_STARS);
        let _guard = self.write_lock.lock().await;
        let mut map = self.favorites(user_id).await?;
        if stars == 0 || map.get(word) == Some(&stars) {
            map.remove(word);
            debug!("Removed favorite '{}'", word);
        } else {
            map.insert(word.to_string(), stars);
            debug!("Set favorite '{}' to {} stars", word, stars);
        }

        let blob = serde_json::to_string(&map).map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.store.save_favorites(user_id, &blob).await?;
        Ok(map)
    }

    pub async fn clear(&self, user_id: Uuid) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.delete_favorites(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Reads slowly, so two updates overlap unless they are serialized.
    struct SlowReads(MemoryStore);

    #[async_trait]
    impl FavoriteStore for SlowReads {
        async fn load_favorites(&self, user_id: Uuid) -> PortResult<Option<String>> {
            let blob = self.0.load_favorites(user_id).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            blob
        }

        async fn save_favorites(&self, user_id: Uuid, blob: &str) -> PortResult<()> {
            self.0.save_favorites(user_id, blob).await
        }

        async fn delete_favorites(&self, user_id: Uuid) -> PortResult<()> {
            self.0.delete_favorites(user_id).await
        }
    }

    #[tokio::test]
    async fn setting_the_same_level_twice_toggles_it_off() {
        let book = FavoriteBook::new(Arc::new(MemoryStore::new()));
        let user = Uuid::new_v4();

        book.update_favorite(user, "apple", 2).await.unwrap();
        assert_eq!(book.favorite_level(user, "apple").await.unwrap(), 2);

        book.update_favorite(user, "apple", 3).await.unwrap();
        assert_eq!(book.favorite_level(user, "apple").await.unwrap(), 3);

        let map = book.update_favorite(user, "apple", 3).await.unwrap();
        assert!(map.is_empty());
        assert_eq!(book.favorite_level(user, "apple").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn favorites_are_per_user() {
        let book = FavoriteBook::new(Arc::new(MemoryStore::new()));
        let alice = Uuid::new_v4();
        book.update_favorite(alice, "pear", 1).await.unwrap();
        assert_eq!(book.favorite_level(Uuid::new_v4(), "pear").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_blobs_read_as_empty() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.save_favorites(user, "not json").await.unwrap();
        let book = FavoriteBook::new(store);
        assert!(book.favorites(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clearing_drops_every_favorite() {
        let book = FavoriteBook::new(Arc::new(MemoryStore::new()));
        let user = Uuid::new_v4();
        book.update_favorite(user, "pear", 2).await.unwrap();
        book.clear(user).await.unwrap();
        assert!(book.favorites(user).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_updates_are_both_kept() {
        let book = FavoriteBook::new(Arc::new(SlowReads(MemoryStore::new())));
        let user = Uuid::new_v4();

        let (apple, pear) = tokio::join!(
            book.update_favorite(user, "apple", 2),
            book.update_favorite(user, "pear", 3),
        );
        apple.unwrap();
        pear.unwrap();

        let favorites = book.favorites(user).await.unwrap();
        assert_eq!(favorites.get("apple"), Some(&2));
        assert_eq!(favorites.get("pear"), Some(&3));
    }
}
