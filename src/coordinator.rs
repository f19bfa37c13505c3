//! Orchestrates every other component: periodic checks, auto-download,
//! apply-on-gate, and the app-ready watchdog with rollback.
//!
//! Grounded on `update/self_update.rs`'s `UpdateCoordinator`, which owns a
//! lower-level updater and exposes `check_and_download`, `perform_update`,
//! `apply_pending_update`. Generalized here to own every component in this
//! crate, and to run the app-ready watchdog as an in-process
//! `tokio::time::sleep` race rather than an external supervisor process
//! (`watchdog/` + `bin/watchdog.rs`) — that process watchdog has no
//! counterpart in this crate's deadline-timer model and is not carried
//! forward.

use crate::channel::{ChannelClient, ChannelDescriptor, ChannelMutationResult, ChannelState};
use crate::config::UpdaterConfig;
use crate::delay::DelayController;
use crate::downloader::{DownloadRequest, Downloader, ManifestEntry};
use crate::error::{RegistryError, Result, UpdaterError};
use crate::events::{HostEvents, HostWindow, UpdaterEvent};
use crate::info::RequestInfo;
use crate::registry::BundleRegistry;
use crate::stats::{StatsAction, StatsClient};
use crate::store::Store;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCheckResponse {
    #[serde(default)]
    version: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    session_key: Option<String>,
    #[serde(default)]
    manifest: Option<Vec<ManifestEntry>>,
    #[serde(default)]
    breaking: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// Components built at `initialize()` time, once the persisted URL/appId
/// overlay (if configured) has been applied to the base configuration.
struct Inner {
    config: UpdaterConfig,
    http: reqwest::Client,
    downloader: Downloader,
    registry: BundleRegistry,
    delay: DelayController,
    channel: ChannelClient,
    stats: StatsClient,
}

pub struct Coordinator {
    store: Arc<Store>,
    host_events: Arc<dyn HostEvents>,
    host_window: Arc<dyn HostWindow>,
    base_config: UpdaterConfig,
    initialized: AtomicBool,
    inner: RwLock<Option<Inner>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub async fn new(
        base_config: UpdaterConfig,
        host_events: Arc<dyn HostEvents>,
        host_window: Arc<dyn HostWindow>,
    ) -> Arc<Self> {
        let store = Arc::new(Store::load(base_config.storage_path.clone()).await);
        Arc::new(Self {
            store,
            host_events,
            host_window,
            base_config,
            initialized: AtomicBool::new(false),
            inner: RwLock::new(None),
            watchdog: Mutex::new(None),
            periodic: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Single-shot and idempotent: a second call observes the same state
    /// as the first and does nothing.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut config = self.base_config.clone();
        if config.persist_modify_url {
            if let Some(url) = self.store.get_update_url().await {
                config.update_url = url;
            }
            if let Some(url) = self.store.get_channel_url().await {
                config.channel_url = url;
            }
            if let Some(url) = self.store.get_stats_url().await {
                config.stats_url = url;
            }
            if let Some(app_id) = self.store.get_app_id().await {
                config.app_id = app_id;
            }
        }

        let user_agent = config.user_agent();
        let http = reqwest::Client::builder()
            .timeout(config.response_timeout)
            .user_agent(&user_agent)
            .build()
            .expect("reqwest client configuration is static and valid");
        let downloader = Downloader::new(
            config.bundles_root.clone(),
            self.store.clone(),
            config.response_timeout,
            &user_agent,
        );
        let registry = BundleRegistry::new(
            self.store.clone(),
            config.bundles_root.clone(),
            config.builtin_path.clone(),
        );

        let last_native_version = self.store.get_last_native_version().await;
        if config.reset_when_update {
            if let Some(previous) = &last_native_version {
                if previous != &config.version_name {
                    tracing::info!(
                        from = %previous,
                        to = %config.version_name,
                        "native version changed, resetting to latest bundle"
                    );
                    if let Err(e) = registry.reset(false).await {
                        tracing::warn!(error = %e, "reset on native version change failed");
                    }
                }
            }
        }
        self.store
            .set_last_native_version(Some(config.version_name.clone()))
            .await;
        self.store.save().await?;

        let delay = DelayController::new(self.store.clone(), Some(config.version_name.clone()));
        let channel = ChannelClient::new(
            self.store.clone(),
            config.channel_url.clone(),
            config.default_channel.clone(),
            config.response_timeout,
            &user_agent,
        );
        let stats = StatsClient::new(config.stats_url.clone(), config.response_timeout, &user_agent);

        delay.on_app_start().await;

        let auto_update = config.auto_update;
        let scheduling_enabled = config.scheduling_enabled();
        let period = config.period_check_delay;

        {
            let mut guard = self.inner.write().await;
            *guard = Some(Inner {
                config,
                http,
                downloader,
                registry,
                delay,
                channel,
                stats,
            });
        }

        let gate_open = self.are_conditions_satisfied().await;
        if let Err(e) = self.try_apply_pending_update(gate_open).await {
            tracing::warn!(error = %e, "failed to apply pending update during initialize");
        }

        if auto_update && scheduling_enabled {
            let me = self.clone();
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    me.check_for_updates().await;
                }
            });
            *self.periodic.lock().await = Some(handle);
        }

        Ok(())
    }

    async fn are_conditions_satisfied(&self) -> bool {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(inner) => inner.delay.are_conditions_satisfied().await,
            None => false,
        }
    }

    async fn try_apply_pending_update(&self, gate_open: bool) -> Result<bool> {
        let guard = self.inner.read().await;
        let inner = guard
            .as_ref()
            .ok_or(UpdaterError::NotInitialized)?;
        Ok(inner.registry.apply_pending_update(gate_open).await?)
    }

    /// Poll the update endpoint and act on the response. Every error is
    /// logged and swallowed — background auto-update must never crash the
    /// host.
    pub async fn check_for_updates(self: &Arc<Self>) {
        if let Err(e) = self.check_for_updates_inner().await {
            tracing::warn!(error = %e, "checkForUpdates failed");
        }
    }

    async fn check_for_updates_inner(self: &Arc<Self>) -> Result<()> {
        let guard = self.inner.read().await;
        let inner = guard
            .as_ref()
            .ok_or(UpdaterError::NotInitialized)?;

        let info = RequestInfo::build(&inner.config, &self.store).await;
        let response = inner
            .http
            .post(&inner.config.update_url)
            .json(&info)
            .send()
            .await
            .map_err(|e| UpdaterError::Channel(crate::error::ChannelError::Network(e)))?
            .json::<UpdateCheckResponse>()
            .await
            .map_err(|e| UpdaterError::Channel(crate::error::ChannelError::Network(e)))?;

        if response.error.as_deref() == Some("no_new_version_available") {
            self.host_events.emit(UpdaterEvent::NoNeedUpdate);
            return Ok(());
        }

        self.host_events.emit(UpdaterEvent::UpdateAvailable);

        if response.breaking.unwrap_or(false) {
            self.host_events.emit(UpdaterEvent::BreakingAvailable);
            self.host_events.emit(UpdaterEvent::MajorAvailable);
            return Ok(());
        }

        let Some(url) = response.url.clone() else {
            return Ok(());
        };
        let session_key = response
            .session_key
            .as_deref()
            .and_then(|s| {
                use base64::{engine::general_purpose::STANDARD, Engine};
                STANDARD.decode(s).ok()
            });

        let events = self.host_events.clone();
        let progress: crate::downloader::ProgressCallback = Box::new(move |percent| {
            events.emit(UpdaterEvent::Download { percent });
        });

        let req = DownloadRequest {
            url,
            version: response.version.clone(),
            checksum: response.checksum.clone(),
            session_key,
            manifest: response.manifest.clone(),
        };

        match inner.downloader.download_bundle(req, Some(&progress)).await {
            Ok(bundle) => {
                self.host_events.emit(UpdaterEvent::DownloadComplete);
                inner
                    .stats
                    .send(
                        RequestInfo::build(&inner.config, &self.store).await,
                        StatsAction::DownloadComplete,
                        &bundle.version,
                        None,
                        Some(&bundle.id),
                        None,
                    )
                    .await;

                let promotion = if inner.config.direct_update.is_immediate() {
                    inner.registry.set(&bundle.id).await
                } else {
                    inner.registry.next(&bundle.id).await
                };
                if let Err(e) = promotion {
                    tracing::warn!(error = %e, "failed to stage downloaded bundle");
                }
            }
            Err(e) => {
                self.host_events.emit(UpdaterEvent::DownloadFailed {
                    message: e.to_string(),
                });
                inner
                    .stats
                    .send(
                        RequestInfo::build(&inner.config, &self.store).await,
                        StatsAction::DownloadFail,
                        &response.version,
                        None,
                        None,
                        Some(&e.to_string()),
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Instructs the host to reload the current bundle path and arms the
    /// app-ready watchdog.
    pub async fn reload(self: &Arc<Self>) -> Result<()> {
        let path = {
            let guard = self.inner.read().await;
            let inner = guard
                .as_ref()
                .ok_or(UpdaterError::NotInitialized)?;
            inner.registry.get_current_bundle_path().await
        };

        self.host_window.reload(&path);
        self.host_events.emit(UpdaterEvent::AppReloaded);
        self.arm_watchdog().await;
        Ok(())
    }

    async fn arm_watchdog(self: &Arc<Self>) {
        let timeout = {
            let guard = self.inner.read().await;
            guard.as_ref().map(|i| i.config.app_ready_timeout)
        };
        let Some(timeout) = timeout else { return };

        let mut slot = self.watchdog.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let me = self.clone();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            me.on_watchdog_timeout().await;
        }));
    }

    async fn on_watchdog_timeout(self: &Arc<Self>) {
        tracing::warn!("app-ready watchdog fired, rolling back");
        let guard = self.inner.read().await;
        let Some(inner) = guard.as_ref() else { return };

        let failed = inner.registry.current().await;
        if let Err(e) = inner.registry.rollback().await {
            tracing::warn!(error = %e, "rollback failed");
            return;
        }

        inner
            .stats
            .send(
                RequestInfo::build(&inner.config, &self.store).await,
                StatsAction::SetFail,
                &failed.version,
                None,
                Some(&failed.id),
                Some("app-ready timeout"),
            )
            .await;
        self.host_events.emit(UpdaterEvent::UpdateFailed {
            message: format!("bundle {} failed to report app-ready in time", failed.id),
        });

        let restored_path = inner.registry.get_current_bundle_path().await;
        self.host_window.reload(&restored_path);
    }

    /// Cancels the watchdog, confirms the current bundle, emits `appReady`.
    pub async fn notify_app_ready(self: &Arc<Self>) -> Result<()> {
        if let Some(handle) = self.watchdog.lock().await.take() {
            handle.abort();
        }

        let guard = self.inner.read().await;
        let inner = guard
            .as_ref()
            .ok_or(UpdaterError::NotInitialized)?;

        inner
            .registry
            .mark_bundle_successful(inner.config.auto_delete_previous)
            .await?;

        let current = inner.registry.current().await;
        self.host_events.emit(UpdaterEvent::AppReady);
        inner
            .stats
            .send(
                RequestInfo::build(&inner.config, &self.store).await,
                StatsAction::Set,
                &current.version,
                None,
                Some(&current.id),
                None,
            )
            .await;
        Ok(())
    }

    // -- Thin explicit-operation wrappers; these propagate errors to the
    // caller rather than swallowing them — the host asked for these
    // directly and needs to know when they fail.

    pub async fn set_channel(
        &self,
        channel: &str,
        trigger_auto_update: Option<bool>,
    ) -> Result<ChannelMutationResult> {
        let guard = self.inner.read().await;
        let inner = guard
            .as_ref()
            .ok_or(UpdaterError::NotInitialized)?;
        let info = RequestInfo::build(&inner.config, &self.store).await;
        Ok(inner.channel.set_channel(info, channel, trigger_auto_update).await?)
    }

    pub async fn unset_channel(&self, trigger_auto_update: Option<bool>) -> Result<()> {
        let guard = self.inner.read().await;
        let inner = guard
            .as_ref()
            .ok_or(UpdaterError::NotInitialized)?;
        let info = RequestInfo::build(&inner.config, &self.store).await;
        inner.channel.unset_channel(info, trigger_auto_update).await;
        Ok(())
    }

    pub async fn get_channel(&self) -> Result<ChannelState> {
        let guard = self.inner.read().await;
        let inner = guard
            .as_ref()
            .ok_or(UpdaterError::NotInitialized)?;
        let info = RequestInfo::build(&inner.config, &self.store).await;
        Ok(inner.channel.get_channel(info).await)
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelDescriptor>> {
        let guard = self.inner.read().await;
        let inner = guard
            .as_ref()
            .ok_or(UpdaterError::NotInitialized)?;
        let info = RequestInfo::build(&inner.config, &self.store).await;
        Ok(inner.channel.list_channels(info).await)
    }

    pub async fn on_window_blur(self: &Arc<Self>) {
        let guard = self.inner.read().await;
        if let Some(inner) = guard.as_ref() {
            inner.delay.on_background();
        }
        drop(guard);
        let gate_open = self.are_conditions_satisfied().await;
        if let Err(e) = self.try_apply_pending_update(gate_open).await {
            tracing::warn!(error = %e, "failed to apply pending update on window blur");
        }
    }

    pub async fn on_window_focus(&self) {
        let guard = self.inner.read().await;
        if let Some(inner) = guard.as_ref() {
            inner.delay.on_foreground();
        }
    }

    /// Cancel the periodic-check and watchdog timers. Call this on process
    /// exit so neither task outlives the `Coordinator`.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.periodic.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.watchdog.lock().await.take() {
            handle.abort();
        }
    }

    /// Change the update-check endpoint at runtime, refused unless the
    /// host was configured with `allowModifyUrl`.
    pub async fn set_update_url(&self, url: String) -> Result<()> {
        let mut guard = self.inner.write().await;
        let inner = guard.as_mut().ok_or(UpdaterError::NotInitialized)?;
        if !inner.config.allow_modify_url {
            return Err(UpdaterError::Registry(RegistryError::NotAllowed(
                "updateUrl change requires allowModifyUrl".to_string(),
            )));
        }
        inner.config.update_url = url.clone();
        self.store.set_update_url(Some(url)).await;
        if inner.config.persist_modify_url {
            self.store.save().await?;
        }
        Ok(())
    }

    /// Change the channel endpoint at runtime, refused unless the host
    /// was configured with `allowModifyUrl`.
    pub async fn set_channel_url(&self, url: String) -> Result<()> {
        let mut guard = self.inner.write().await;
        let inner = guard.as_mut().ok_or(UpdaterError::NotInitialized)?;
        if !inner.config.allow_modify_url {
            return Err(UpdaterError::Registry(RegistryError::NotAllowed(
                "channelUrl change requires allowModifyUrl".to_string(),
            )));
        }
        inner.config.channel_url = url.clone();
        inner.channel.set_channel_url(url.clone());
        self.store.set_channel_url(Some(url)).await;
        if inner.config.persist_modify_url {
            self.store.save().await?;
        }
        Ok(())
    }

    /// Change the stats endpoint at runtime, refused unless the host was
    /// configured with `allowModifyUrl`.
    pub async fn set_stats_url(&self, url: String) -> Result<()> {
        let mut guard = self.inner.write().await;
        let inner = guard.as_mut().ok_or(UpdaterError::NotInitialized)?;
        if !inner.config.allow_modify_url {
            return Err(UpdaterError::Registry(RegistryError::NotAllowed(
                "statsUrl change requires allowModifyUrl".to_string(),
            )));
        }
        inner.config.stats_url = url.clone();
        inner.stats.set_stats_url(url.clone());
        self.store.set_stats_url(Some(url)).await;
        if inner.config.persist_modify_url {
            self.store.save().await?;
        }
        Ok(())
    }

    /// Change the reported app id at runtime, refused unless the host was
    /// configured with `allowModifyAppId`.
    pub async fn set_app_id(&self, app_id: String) -> Result<()> {
        let mut guard = self.inner.write().await;
        let inner = guard.as_mut().ok_or(UpdaterError::NotInitialized)?;
        if !inner.config.allow_modify_app_id {
            return Err(UpdaterError::Registry(RegistryError::NotAllowed(
                "appId change requires allowModifyAppId".to_string(),
            )));
        }
        inner.config.app_id = app_id.clone();
        self.store.set_app_id(Some(app_id)).await;
        if inner.config.persist_modify_url {
            self.store.save().await?;
        }
        Ok(())
    }

    /// Set the host-supplied custom id reported alongside every request.
    /// Persisted across restarts only when `persistCustomId` is set.
    pub async fn set_custom_id(&self, custom_id: Option<String>) -> Result<()> {
        let guard = self.inner.read().await;
        let inner = guard.as_ref().ok_or(UpdaterError::NotInitialized)?;
        self.store.set_custom_id(custom_id).await;
        if inner.config.persist_custom_id {
            self.store.save().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectUpdate;
    use crate::events::{NullHostEvents, RecordingHostEvents, RecordingHostWindow};
    use crate::store::BUILTIN_ID;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, contents).unwrap();
        }
        writer.finish().unwrap();
        buf.into_inner()
    }

    async fn hash_bytes(bytes: &[u8]) -> String {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tmp.bin");
        tokio::fs::write(&path, bytes).await.unwrap();
        crate::crypto::hash_file(&path).await.unwrap()
    }

    fn base_config(dir: &TempDir, update_url: String) -> UpdaterConfig {
        let mut cfg = UpdaterConfig::default();
        cfg.bundles_root = dir.path().join("bundles");
        cfg.storage_path = dir.path().join("storage.json");
        cfg.builtin_path = dir.path().join("builtin").join("index.html");
        cfg.update_url = update_url;
        cfg.channel_url = String::new();
        cfg.stats_url = String::new();
        cfg.auto_update = false;
        cfg.direct_update = DirectUpdate::Always;
        cfg.version_name = "1.0.0".to_string();
        cfg
    }

    async fn new_coordinator(
        cfg: UpdaterConfig,
        events: Arc<dyn HostEvents>,
        window: Arc<dyn HostWindow>,
    ) -> Arc<Coordinator> {
        let coordinator = Coordinator::new(cfg, events, window).await;
        coordinator.initialize().await.unwrap();
        coordinator
    }

    #[tokio::test]
    async fn happy_path_update_downloads_and_promotes() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let zip_bytes = make_zip(&[("index.html", b"v2")]);
        let checksum = hash_bytes(&zip_bytes).await;

        Mock::given(method("GET"))
            .and(path("/bundle.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": "2.0.0",
                "url": format!("{}/bundle.zip", server.uri()),
                "checksum": checksum,
            })))
            .mount(&server)
            .await;

        let cfg = base_config(&dir, format!("{}/update", server.uri()));
        let events = Arc::new(RecordingHostEvents::default());
        let coordinator = new_coordinator(
            cfg,
            events.clone(),
            Arc::new(RecordingHostWindow::default()),
        )
        .await;

        coordinator.check_for_updates().await;

        let recorded = events.events.lock().unwrap();
        assert!(recorded.contains(&UpdaterEvent::UpdateAvailable));
        assert!(recorded.contains(&UpdaterEvent::DownloadComplete));
        drop(recorded);

        let current = coordinator
            .inner
            .read()
            .await
            .as_ref()
            .unwrap()
            .registry
            .current()
            .await;
        assert_eq!(current.version, "2.0.0");
        assert_ne!(current.id, BUILTIN_ID);
    }

    #[tokio::test]
    async fn checksum_mismatch_leaves_builtin_current() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let zip_bytes = make_zip(&[("index.html", b"v2")]);

        Mock::given(method("GET"))
            .and(path("/bundle.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": "2.0.0",
                "url": format!("{}/bundle.zip", server.uri()),
                "checksum": "0".repeat(64),
            })))
            .mount(&server)
            .await;

        let cfg = base_config(&dir, format!("{}/update", server.uri()));
        let events = Arc::new(RecordingHostEvents::default());
        let coordinator = new_coordinator(
            cfg,
            events.clone(),
            Arc::new(RecordingHostWindow::default()),
        )
        .await;

        coordinator.check_for_updates().await;

        let recorded = events.events.lock().unwrap();
        assert!(recorded
            .iter()
            .any(|e| matches!(e, UpdaterEvent::DownloadFailed { .. })));
        drop(recorded);

        let current = coordinator
            .inner
            .read()
            .await
            .as_ref()
            .unwrap()
            .registry
            .current()
            .await;
        assert_eq!(current.id, BUILTIN_ID);
    }

    #[tokio::test]
    async fn app_ready_timeout_rolls_back_to_builtin() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let zip_bytes = make_zip(&[("index.html", b"v2")]);
        let checksum = hash_bytes(&zip_bytes).await;

        Mock::given(method("GET"))
            .and(path("/bundle.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": "2.0.0",
                "url": format!("{}/bundle.zip", server.uri()),
                "checksum": checksum,
            })))
            .mount(&server)
            .await;

        let mut cfg = base_config(&dir, format!("{}/update", server.uri()));
        cfg.app_ready_timeout = std::time::Duration::from_millis(30);
        let events = Arc::new(RecordingHostEvents::default());
        let window = Arc::new(RecordingHostWindow::default());
        let coordinator = new_coordinator(cfg, events.clone(), window.clone()).await;

        coordinator.check_for_updates().await;
        coordinator.reload().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let recorded = events.events.lock().unwrap();
        assert!(recorded
            .iter()
            .any(|e| matches!(e, UpdaterEvent::UpdateFailed { .. })));
        drop(recorded);

        let current = coordinator
            .inner
            .read()
            .await
            .as_ref()
            .unwrap()
            .registry
            .current()
            .await;
        assert_eq!(current.id, BUILTIN_ID);
        assert_eq!(window.reloads.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delta_manifest_entry_already_extracted_skips_download() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let asset_contents = b"console.log(1)";
        let asset_hash = hash_bytes(asset_contents).await;
        let zip_bytes = make_zip(&[("index.html", b"v2"), ("asset.js", asset_contents)]);
        let checksum = hash_bytes(&zip_bytes).await;

        Mock::given(method("GET"))
            .and(path("/bundle.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": "2.0.0",
                "url": format!("{}/bundle.zip", server.uri()),
                "checksum": checksum,
                "manifest": [{
                    "fileName": "asset.js",
                    "downloadUrl": format!("{}/never-fetched.js", server.uri()),
                    "fileHash": asset_hash,
                }],
            })))
            .mount(&server)
            .await;

        let cfg = base_config(&dir, format!("{}/update", server.uri()));
        let events = Arc::new(RecordingHostEvents::default());
        let coordinator = new_coordinator(
            cfg,
            events,
            Arc::new(RecordingHostWindow::default()),
        )
        .await;

        coordinator.check_for_updates().await;

        let current = coordinator
            .inner
            .read()
            .await
            .as_ref()
            .unwrap()
            .registry
            .current()
            .await;
        assert_eq!(current.version, "2.0.0");
    }

    #[tokio::test]
    async fn shutdown_aborts_periodic_and_watchdog_tasks() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": "no_new_version_available",
            })))
            .mount(&server)
            .await;

        let mut cfg = base_config(&dir, format!("{}/update", server.uri()));
        cfg.auto_update = true;
        cfg.period_check_delay = std::time::Duration::from_secs(600);
        let coordinator = new_coordinator(
            cfg,
            Arc::new(NullHostEvents),
            Arc::new(RecordingHostWindow::default()),
        )
        .await;

        assert!(coordinator.periodic.lock().await.is_some());
        coordinator.shutdown().await;
        assert!(coordinator.periodic.lock().await.is_none());
        assert!(coordinator.watchdog.lock().await.is_none());
    }
}
