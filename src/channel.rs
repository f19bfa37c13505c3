//! Remote channel selection with local-cache fallback.
//!
//! Grounded on `other_examples/..._web_update.rs.rs`'s `fetch_manifest`/
//! `check` request/response pattern — a small `reqwest` client issuing
//! GET/POST JSON calls against a configurable endpoint, parsed into
//! explicit, defaulted structs since the server's response shape isn't
//! a fixed schema.

use crate::error::ChannelError;
use crate::info::RequestInfo;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetChannelRequest<'a> {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trigger_auto_update: Option<bool>,
    #[serde(flatten)]
    info: RequestInfo,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChannelMutationResult {
    pub status: String,
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GetChannelResponse {
    channel: Option<String>,
    #[serde(default = "default_true")]
    allow_set: bool,
    #[serde(default)]
    status: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelDescriptor {
    pub id: String,
    pub name: String,
    pub public: bool,
    pub allow_self_set: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ListChannelsResponse {
    #[serde(default)]
    channels: Vec<ChannelDescriptor>,
}

/// `{channel, allowSet, status}` as returned to callers of `get_channel`.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub channel: Option<String>,
    pub allow_set: bool,
    pub status: String,
}

pub struct ChannelClient {
    client: reqwest::Client,
    store: Arc<Store>,
    channel_url: String,
    default_channel: Option<String>,
}

impl ChannelClient {
    pub fn new(
        store: Arc<Store>,
        channel_url: String,
        default_channel: Option<String>,
        response_timeout: Duration,
        user_agent: &str,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(response_timeout)
            .user_agent(user_agent)
            .build()
            .expect("reqwest client configuration is static and valid");
        Self {
            client,
            store,
            channel_url,
            default_channel,
        }
    }

    pub fn set_channel_url(&mut self, channel_url: String) {
        self.channel_url = channel_url;
    }

    pub async fn set_channel(
        &self,
        info: RequestInfo,
        channel: &str,
        trigger_auto_update: Option<bool>,
    ) -> Result<ChannelMutationResult, ChannelError> {
        let body = SetChannelRequest {
            action: "set",
            channel: Some(channel),
            trigger_auto_update,
            info,
        };
        let response = self
            .client
            .post(&self.channel_url)
            .json(&body)
            .send()
            .await?
            .json::<ChannelMutationResult>()
            .await?;

        if matches!(response.status.as_str(), "ok" | "success") {
            self.store.set_channel(Some(channel.to_string())).await;
            let _ = self.store.save().await;
        }
        Ok(response)
    }

    pub async fn unset_channel(&self, info: RequestInfo, trigger_auto_update: Option<bool>) {
        let body = SetChannelRequest {
            action: "unset",
            channel: None,
            trigger_auto_update,
            info,
        };
        let _ = self.client.post(&self.channel_url).json(&body).send().await;
        self.store.set_channel(None).await;
        let _ = self.store.save().await;
    }

    /// Query the remote channel. Any transport failure falls back to the
    /// locally cached channel (or the configured default).
    pub async fn get_channel(&self, info: RequestInfo) -> ChannelState {
        let local_fallback = || async {
            let local = self.store.get_channel().await;
            ChannelState {
                channel: local.or_else(|| self.default_channel.clone()),
                allow_set: true,
                status: "ok".to_string(),
            }
        };

        let response = match self.client.get(&self.channel_url).query(&info).send().await {
            Ok(r) => r,
            Err(_) => return local_fallback().await,
        };
        match response.json::<GetChannelResponse>().await {
            Ok(parsed) => ChannelState {
                channel: parsed.channel,
                allow_set: parsed.allow_set,
                status: parsed.status,
            },
            Err(_) => local_fallback().await,
        }
    }

    pub async fn list_channels(&self, info: RequestInfo) -> Vec<ChannelDescriptor> {
        let response = self
            .client
            .get(&self.channel_url)
            .query(&[("action", "list")])
            .query(&info)
            .send()
            .await;

        match response {
            Ok(r) => r
                .json::<ListChannelsResponse>()
                .await
                .map(|r| r.channels)
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }
}
