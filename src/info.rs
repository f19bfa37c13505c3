//! The device/app info payload sent with every update, channel and stats
//! request. Factored into its own module since three callers build the
//! identical structure — avoids redeclaring the field list three times.

use crate::config::UpdaterConfig;
use crate::crypto;
use crate::store::Store;
use serde::Serialize;

/// The remote update service only recognizes mobile platform tags, so
/// every request claims to be Android regardless of the actual host OS.
/// Preserve this wire constant unless the server is updated in tandem.
const PLATFORM: &str = "android";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    pub platform: &'static str,
    pub device_id: String,
    pub app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    pub version_build: String,
    pub version_code: String,
    pub version_os: String,
    pub version_name: String,
    pub plugin_version: String,
    pub is_emulator: bool,
    pub is_prod: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

impl RequestInfo {
    pub async fn build(config: &UpdaterConfig, store: &Store) -> Self {
        let app_id = store.get_app_id().await.unwrap_or_else(|| config.app_id.clone());
        let key_id = config
            .public_key
            .as_deref()
            .and_then(crypto::derive_key_id);

        Self {
            platform: PLATFORM,
            device_id: store.get_device_id().await,
            app_id,
            custom_id: store.get_custom_id().await,
            version_build: config.version_build.clone(),
            version_code: config.version_code.clone(),
            version_os: config.version_os.clone(),
            version_name: config.version_name.clone(),
            plugin_version: config.plugin_version.clone(),
            is_emulator: false,
            is_prod: config.is_prod,
            default_channel: config.default_channel.clone(),
            key_id,
        }
    }
}
