//! Updater configuration
//!
//! A single plain struct with a `Default` impl, in the shape of
//! `ConfigStoreConfig`/`AppConfig` (see `config/storage.rs`) — no builder
//! macro, every option lives as a field here.

use std::path::PathBuf;
use std::time::Duration;

/// `directUpdate` modes. `AtInstall`/`OnLaunch` are reserved: they behave
/// like `Never` until first-launch-after-install tracking is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectUpdate {
    /// Stage the update via `next`; apply only through the delay gate.
    Never,
    /// Promote immediately via `set` as soon as the download completes.
    Always,
    /// Reserved, currently behaves like `Never`.
    AtInstall,
    /// Reserved, currently behaves like `Never`.
    OnLaunch,
}

impl DirectUpdate {
    /// Whether a freshly downloaded bundle should be applied immediately
    /// rather than staged behind the delay gate.
    pub fn is_immediate(self) -> bool {
        matches!(self, DirectUpdate::Always)
    }
}

/// Full configuration for the updater.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Directory under which `<id>/www/...` bundle trees are extracted.
    pub bundles_root: PathBuf,
    /// Path to the persisted storage JSON file.
    pub storage_path: PathBuf,
    /// Path to the built-in bundle's `index.html`, supplied by the host.
    pub builtin_path: PathBuf,

    /// Remote endpoint queried by `checkForUpdates`.
    pub update_url: String,
    /// Remote endpoint used by the channel client.
    pub channel_url: String,
    /// Remote endpoint used by the stats client; empty disables telemetry.
    pub stats_url: String,
    /// Application id reported in the info payload.
    pub app_id: String,

    /// PEM-encoded public key, used only to derive a key id.
    pub public_key: Option<String>,

    /// ms the app-ready watchdog waits before rolling back.
    pub app_ready_timeout: Duration,
    /// Timeout applied to every HTTP call.
    pub response_timeout: Duration,

    /// Enable periodic background checks.
    pub auto_update: bool,
    /// Interval between periodic checks; values under 600s disable scheduling.
    pub period_check_delay: Duration,

    /// Prune bundles that transition to `error`.
    pub auto_delete_failed: bool,
    /// Prune the fallback bundle once a new current bundle confirms itself.
    pub auto_delete_previous: bool,
    /// Reset to builtin (or latest success) when the native version changes.
    pub reset_when_update: bool,

    /// Allow hosts to call `setBundleError` directly.
    pub allow_manual_bundle_error: bool,
    /// Persist `customId` across restarts.
    pub persist_custom_id: bool,
    /// Persist `updateUrl`/`channelUrl`/`statsUrl`/`appId` across restarts.
    pub persist_modify_url: bool,
    /// Allow hosts to change `updateUrl`/`channelUrl`/`statsUrl` at runtime.
    pub allow_modify_url: bool,
    /// Allow hosts to change `appId` at runtime.
    pub allow_modify_app_id: bool,

    /// How a freshly downloaded bundle should be promoted.
    pub direct_update: DirectUpdate,

    /// Fields below feed the info payload sent with every request.
    pub plugin_version: String,
    pub version_build: String,
    pub version_code: String,
    pub version_os: String,
    pub version_name: String,
    pub is_prod: bool,
    pub default_channel: Option<String>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        let base = directories::BaseDirs::new()
            .map(|d| d.data_local_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            bundles_root: base.join("capgo-bundles"),
            storage_path: base.join("electron-updater-storage.json"),
            builtin_path: PathBuf::from("www/index.html"),

            update_url: String::new(),
            channel_url: String::new(),
            stats_url: String::new(),
            app_id: String::new(),

            public_key: None,

            app_ready_timeout: Duration::from_millis(10_000),
            response_timeout: Duration::from_secs(20),

            auto_update: true,
            period_check_delay: Duration::from_secs(600),

            auto_delete_failed: true,
            auto_delete_previous: false,
            reset_when_update: false,

            allow_manual_bundle_error: false,
            persist_custom_id: false,
            persist_modify_url: false,
            allow_modify_url: false,
            allow_modify_app_id: false,

            direct_update: DirectUpdate::Never,

            plugin_version: env!("CARGO_PKG_VERSION").to_string(),
            version_build: String::new(),
            version_code: String::new(),
            version_os: std::env::consts::OS.to_string(),
            version_name: String::new(),
            is_prod: true,
            default_channel: None,
        }
    }
}

impl UpdaterConfig {
    /// Whether the periodic background-check timer should be armed at
    /// all; an interval under 600s disables scheduling entirely.
    pub fn scheduling_enabled(&self) -> bool {
        self.auto_update && self.period_check_delay >= Duration::from_secs(600)
    }

    /// `User-Agent` sent on every HTTP request:
    /// `CapacitorUpdater/<plugin-version> (<app-id-or-"missing-app-id">) electron/<os-release>`.
    pub fn user_agent(&self) -> String {
        let app_id = if self.app_id.is_empty() {
            "missing-app-id"
        } else {
            &self.app_id
        };
        format!(
            "CapacitorUpdater/{} ({}) electron/{}",
            self.plugin_version, app_id, self.version_os
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_timeouts() {
        let cfg = UpdaterConfig::default();
        assert_eq!(cfg.app_ready_timeout, Duration::from_millis(10_000));
        assert_eq!(cfg.response_timeout, Duration::from_secs(20));
        assert!(cfg.auto_update);
        assert!(!cfg.persist_modify_url);
    }

    #[test]
    fn scheduling_disabled_below_600s() {
        let mut cfg = UpdaterConfig::default();
        cfg.period_check_delay = Duration::from_secs(30);
        assert!(!cfg.scheduling_enabled());

        cfg.period_check_delay = Duration::from_secs(600);
        assert!(cfg.scheduling_enabled());
    }

    #[test]
    fn direct_update_immediacy() {
        assert!(!DirectUpdate::Never.is_immediate());
        assert!(DirectUpdate::Always.is_immediate());
        assert!(!DirectUpdate::AtInstall.is_immediate());
        assert!(!DirectUpdate::OnLaunch.is_immediate());
    }

    #[test]
    fn user_agent_falls_back_to_missing_app_id() {
        let mut cfg = UpdaterConfig::default();
        cfg.plugin_version = "1.2.3".to_string();
        cfg.version_os = "linux".to_string();
        assert_eq!(cfg.user_agent(), "CapacitorUpdater/1.2.3 (missing-app-id) electron/linux");

        cfg.app_id = "com.example.app".to_string();
        assert_eq!(
            cfg.user_agent(),
            "CapacitorUpdater/1.2.3 (com.example.app) electron/linux"
        );
    }
}
