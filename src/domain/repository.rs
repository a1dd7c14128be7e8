use crate::domain::models::CachedState;
use crate::error::SyncError;
use async_trait::async_trait;

pub type RepoResult<T> = Result<T, SyncError>;

pub const HISTORY_KEY: &str = "balloon_history";
// Owned by the bookmarking feature; the sync engine never reads it.
pub const FAVORITES_KEY: &str = "favorite_streamers";

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> RepoResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> RepoResult<()>;
}

pub async fn load_state(store: &dyn CacheStore) -> RepoResult<Option<CachedState>> {
    match store.get(HISTORY_KEY).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn save_state(store: &dyn CacheStore, state: &CachedState) -> RepoResult<()> {
    let raw = serde_json::to_string(state)?;
    store.set(HISTORY_KEY, &raw).await
}
