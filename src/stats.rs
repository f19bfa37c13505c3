//! Fire-and-forget telemetry for download/update success and failure.
//!
//! Grounded on `telemetry/mod.rs`'s `TelemetrySystem`: consent
//! (here, a non-empty `statsUrl`) gates whether anything is sent at all,
//! and every dispatch error is swallowed — telemetry must never affect the
//! update path.

use crate::info::RequestInfo;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsAction {
    DownloadComplete,
    DownloadFail,
    Set,
    SetFail,
}

impl StatsAction {
    fn as_str(self) -> &'static str {
        match self {
            StatsAction::DownloadComplete => "download_complete",
            StatsAction::DownloadFail => "download_fail",
            StatsAction::Set => "set",
            StatsAction::SetFail => "set_fail",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsEvent<'a> {
    action: &'static str,
    version_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_version_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bundle_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(flatten)]
    info: RequestInfo,
}

pub struct StatsClient {
    client: reqwest::Client,
    stats_url: String,
}

impl StatsClient {
    pub fn new(stats_url: String, response_timeout: Duration, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(response_timeout)
            .user_agent(user_agent)
            .build()
            .expect("reqwest client configuration is static and valid");
        Self { client, stats_url }
    }

    pub fn set_stats_url(&mut self, stats_url: String) {
        self.stats_url = stats_url;
    }

    pub fn is_enabled(&self) -> bool {
        !self.stats_url.is_empty()
    }

    /// Send a telemetry event; failures are swallowed unconditionally.
    pub async fn send(
        &self,
        info: RequestInfo,
        action: StatsAction,
        version_name: &str,
        old_version_name: Option<&str>,
        bundle_id: Option<&str>,
        message: Option<&str>,
    ) {
        if !self.is_enabled() {
            return;
        }
        let body = StatsEvent {
            action: action.as_str(),
            version_name,
            old_version_name,
            bundle_id,
            message,
            info,
        };
        if let Err(e) = self.client.post(&self.stats_url).json(&body).send().await {
            tracing::debug!(error = %e, "stats dispatch failed, ignoring");
        }
    }
}
