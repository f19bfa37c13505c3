//! Persisted key-value store backing bundle metadata and device state.
//!
//! Grounded on `config/storage.rs`'s `ConfigStore`: load once on
//! construction, write atomically (temp file + rename) on every mutation
//! that must survive a crash. Unlike that config store this one keeps no
//! rotating backups; this state is cheap to reconstruct from the remote
//! service, so the extra durability isn't worth the complexity.

mod model;

pub use model::{BundleInfo, BundleStatus, DelayState, StoreData, BUILTIN_ID};

use crate::error::StoreError;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Process-wide persisted store, single JSON file on disk.
pub struct Store {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl Store {
    /// Load the store from `path`. Both a missing file and a corrupt one
    /// fall back to an empty in-memory store (fresh-install semantics) —
    /// a storage file is a cache of server-confirmed state, never the
    /// sole copy, so corruption is recoverable rather than fatal.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => StoreData::default(),
        };
        Self {
            path,
            data: RwLock::new(data),
        }
    }

    /// Atomic write: serialize to a temp file beside the target, then
    /// rename over it, so a crash mid-write never leaves a half-written
    /// storage file behind.
    pub async fn save(&self) -> Result<(), StoreError> {
        let data = self.data.read().await;
        let json = serde_json::to_string_pretty(&*data)?;
        drop(data);

        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::Save)?;
        }
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(StoreError::Save)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(StoreError::Save)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // -- Bundle registry -----------------------------------------------

    pub async fn get_bundle(&self, id: &str) -> Option<BundleInfo> {
        self.data.read().await.bundles.get(id).cloned()
    }

    pub async fn set_bundle(&self, info: BundleInfo) {
        self.data.write().await.bundles.insert(info.id.clone(), info);
    }

    pub async fn delete_bundle(&self, id: &str) {
        self.data.write().await.bundles.remove(id);
    }

    pub async fn list_bundles(&self) -> Vec<BundleInfo> {
        self.data.read().await.bundles.values().cloned().collect()
    }

    // -- Pointers --------------------------------------------------------

    pub async fn current_bundle_id(&self) -> Option<String> {
        self.data.read().await.current_bundle_id.clone()
    }

    pub async fn set_current_bundle_id(&self, id: Option<String>) {
        self.data.write().await.current_bundle_id = id;
    }

    pub async fn next_bundle_id(&self) -> Option<String> {
        self.data.read().await.next_bundle_id.clone()
    }

    pub async fn set_next_bundle_id(&self, id: Option<String>) {
        self.data.write().await.next_bundle_id = id;
    }

    pub async fn fallback_bundle_id(&self) -> Option<String> {
        self.data.read().await.fallback_bundle_id.clone()
    }

    pub async fn set_fallback_bundle_id(&self, id: Option<String>) {
        self.data.write().await.fallback_bundle_id = id;
    }

    // -- Identity ----------------------------------------------------------

    /// Device id, lazily generated and persisted on first read.
    pub async fn get_device_id(&self) -> String {
        {
            if let Some(id) = self.data.read().await.device_id.clone() {
                return id;
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.data.write().await.device_id = Some(id.clone());
        id
    }

    pub async fn get_custom_id(&self) -> Option<String> {
        self.data.read().await.custom_id.clone()
    }

    pub async fn set_custom_id(&self, id: Option<String>) {
        self.data.write().await.custom_id = id;
    }

    // -- Channel -------------------------------------------------------

    pub async fn get_channel(&self) -> Option<String> {
        self.data.read().await.channel.clone()
    }

    pub async fn set_channel(&self, channel: Option<String>) {
        self.data.write().await.channel = channel;
    }

    // -- Mutable config --------------------------------------------------

    pub async fn get_update_url(&self) -> Option<String> {
        self.data.read().await.update_url.clone()
    }

    pub async fn set_update_url(&self, url: Option<String>) {
        self.data.write().await.update_url = url;
    }

    pub async fn get_channel_url(&self) -> Option<String> {
        self.data.read().await.channel_url.clone()
    }

    pub async fn set_channel_url(&self, url: Option<String>) {
        self.data.write().await.channel_url = url;
    }

    pub async fn get_stats_url(&self) -> Option<String> {
        self.data.read().await.stats_url.clone()
    }

    pub async fn set_stats_url(&self, url: Option<String>) {
        self.data.write().await.stats_url = url;
    }

    pub async fn get_app_id(&self) -> Option<String> {
        self.data.read().await.app_id.clone()
    }

    pub async fn set_app_id(&self, id: Option<String>) {
        self.data.write().await.app_id = id;
    }

    // -- Native version tracking -----------------------------------------

    pub async fn get_last_native_version(&self) -> Option<String> {
        self.data.read().await.last_native_version.clone()
    }

    pub async fn set_last_native_version(&self, version: Option<String>) {
        self.data.write().await.last_native_version = version;
    }

    // -- Delay gate --------------------------------------------------------

    pub async fn get_delay_state(&self) -> DelayState {
        self.data.read().await.delay.clone()
    }

    pub async fn set_delay_state(&self, state: DelayState) {
        self.data.write().await.delay = state;
    }

    /// Snapshot the whole persisted shape, for round-trip tests.
    pub async fn snapshot(&self) -> StoreData {
        self.data.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fresh_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = Store::load(dir.path().join("storage.json")).await;
        assert!(store.list_bundles().await.is_empty());
        assert!(store.current_bundle_id().await.is_none());
    }

    #[tokio::test]
    async fn save_then_reload_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");

        let store = Store::load(&path).await;
        store
            .set_bundle(BundleInfo {
                id: "abc".into(),
                version: "1.0.0".into(),
                downloaded: chrono::Utc::now(),
                checksum: "deadbeef".into(),
                status: BundleStatus::Success,
            })
            .await;
        store.set_current_bundle_id(Some("abc".into())).await;
        store.save().await.unwrap();

        let reloaded = Store::load(&path).await;
        assert_eq!(reloaded.current_bundle_id().await, Some("abc".into()));
        let bundle = reloaded.get_bundle("abc").await.unwrap();
        assert_eq!(bundle.checksum, "deadbeef");
        assert_eq!(bundle.status, BundleStatus::Success);
    }

    #[tokio::test]
    async fn device_id_is_generated_once_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");

        let store = Store::load(&path).await;
        let id1 = store.get_device_id().await;
        let id2 = store.get_device_id().await;
        assert_eq!(id1, id2);

        store.save().await.unwrap();
        let reloaded = Store::load(&path).await;
        assert_eq!(reloaded.get_device_id().await, id1);
    }

    #[tokio::test]
    async fn corrupt_file_on_disk_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = Store::load(&path).await;
        assert!(store.list_bundles().await.is_empty());
    }

    #[tokio::test]
    async fn delete_bundle_removes_entry() {
        let dir = TempDir::new().unwrap();
        let store = Store::load(dir.path().join("storage.json")).await;
        store
            .set_bundle(BundleInfo::new_downloading("x", "1.0.0"))
            .await;
        assert!(store.get_bundle("x").await.is_some());
        store.delete_bundle("x").await;
        assert!(store.get_bundle("x").await.is_none());
    }
}
