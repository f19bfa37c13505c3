//! Persisted data shapes for the Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable id reserved for the bundle shipped in the host installer.
pub const BUILTIN_ID: &str = "builtin";

/// Status of a bundle's lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    Downloading,
    Pending,
    Error,
    Success,
    Deleted,
}

/// Immutable identity plus mutable status for one bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleInfo {
    pub id: String,
    pub version: String,
    pub downloaded: DateTime<Utc>,
    pub checksum: String,
    pub status: BundleStatus,
}

impl BundleInfo {
    pub fn new_downloading(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            downloaded: Utc::now(),
            checksum: String::new(),
            status: BundleStatus::Downloading,
        }
    }
}

/// Delay-gate state persisted across restarts, see [`crate::delay`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DelayState {
    pub background: bool,
    pub kill: bool,
    pub kill_armed: bool,
    pub date: Option<DateTime<Utc>>,
    pub native_version: Option<String>,
}

/// The full on-disk shape of `<userData>/electron-updater-storage.json`.
///
/// `#[serde(default)]` on every field added after v1 so an older file on
/// disk still deserializes, mirroring the `AppConfig` migration pattern in
/// `config/storage.rs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreData {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub bundles: HashMap<String, BundleInfo>,

    #[serde(default)]
    pub current_bundle_id: Option<String>,
    #[serde(default)]
    pub next_bundle_id: Option<String>,
    #[serde(default)]
    pub fallback_bundle_id: Option<String>,

    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,

    #[serde(default)]
    pub update_url: Option<String>,
    #[serde(default)]
    pub channel_url: Option<String>,
    #[serde(default)]
    pub stats_url: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,

    #[serde(default)]
    pub delay: DelayState,

    /// The host's native version as of the last `initialize()`, used to
    /// detect an upgrade/downgrade of the surrounding app between runs.
    #[serde(default)]
    pub last_native_version: Option<String>,
}

fn default_version() -> u32 {
    1
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            version: default_version(),
            bundles: HashMap::new(),
            current_bundle_id: None,
            next_bundle_id: None,
            fallback_bundle_id: None,
            device_id: None,
            custom_id: None,
            channel: None,
            update_url: None,
            channel_url: None,
            stats_url: None,
            app_id: None,
            delay: DelayState::default(),
            last_native_version: None,
        }
    }
}
