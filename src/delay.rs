//! Gating conditions that defer applying a staged update.
//!
//! No single file gates anything directly comparable; built fresh in the
//! struct-with-locked-state idiom of `ModelDownloader`'s
//! `cancelled: Arc<RwLock<bool>>` in `update/model.rs`, persisted through
//! the [`crate::store::Store`] rather than held only in memory, so the
//! gate survives a restart.

use crate::store::{DelayState, Store};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One gating condition, as accepted by `setMultiDelay`.
#[derive(Debug, Clone)]
pub enum DelayCondition {
    /// Withhold until the host window is blurred/hidden.
    Background,
    /// Withhold until the app has exited and relaunched since arming.
    Kill,
    /// Withhold until the given instant has passed.
    Date(DateTime<Utc>),
    /// Withhold unless the app's build version equals this literal.
    NativeVersion(String),
}

pub struct DelayController {
    store: Arc<Store>,
    /// Whether the host window currently holds focus; toggled by
    /// `on_foreground`/`on_background`, not persisted (it's live UI state).
    foregrounded: std::sync::atomic::AtomicBool,
    /// The running build's own version, compared against a `nativeVersion`
    /// condition.
    current_native_version: Option<String>,
}

impl DelayController {
    pub fn new(store: Arc<Store>, current_native_version: Option<String>) -> Self {
        Self {
            store,
            foregrounded: std::sync::atomic::AtomicBool::new(true),
            current_native_version,
        }
    }

    /// Arm one or more conditions; every condition must hold before an
    /// update will be applied.
    pub async fn set_multi_delay(&self, conditions: &[DelayCondition]) {
        let mut state = DelayState::default();
        for condition in conditions {
            match condition {
                DelayCondition::Background => state.background = true,
                DelayCondition::Kill => {
                    state.kill = true;
                    state.kill_armed = true;
                }
                DelayCondition::Date(at) => state.date = Some(*at),
                DelayCondition::NativeVersion(v) => state.native_version = Some(v.clone()),
            }
        }
        self.store.set_delay_state(state).await;
        let _ = self.store.save().await;
    }

    pub async fn cancel_delay(&self) {
        self.store.set_delay_state(DelayState::default()).await;
        let _ = self.store.save().await;
    }

    /// Whether every active condition is currently satisfied — an update
    /// may be applied only when this returns `true`.
    pub async fn are_conditions_satisfied(&self) -> bool {
        let state = self.store.get_delay_state().await;

        if state.background && self.foregrounded.load(std::sync::atomic::Ordering::SeqCst) {
            return false;
        }
        if state.kill && state.kill_armed {
            return false;
        }
        if let Some(at) = state.date {
            if Utc::now() < at {
                return false;
            }
        }
        if let Some(required) = &state.native_version {
            // Compared against the running build's own version string by
            // the caller's config, passed in here rather than read from a
            // global so this component stays free of host-config coupling.
            return self
                .current_native_version
                .as_deref()
                .map(|v| v == required)
                .unwrap_or(false);
        }
        true
    }

    /// Consumes the one-shot `kill` flag: called once per process start.
    pub async fn on_app_start(&self) {
        let mut state = self.store.get_delay_state().await;
        if state.kill_armed {
            state.kill_armed = false;
            self.store.set_delay_state(state).await;
            let _ = self.store.save().await;
        }
    }

    pub fn on_foreground(&self) {
        self.foregrounded
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn on_background(&self) {
        self.foregrounded
            .store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use tempfile::TempDir;

    async fn new_controller(dir: &TempDir, native_version: Option<&str>) -> DelayController {
        let store = Arc::new(Store::load(dir.path().join("storage.json")).await);
        DelayController::new(store, native_version.map(String::from))
    }

    #[tokio::test]
    async fn no_conditions_armed_is_always_satisfied() {
        let dir = TempDir::new().unwrap();
        let ctl = new_controller(&dir, None).await;
        assert!(ctl.are_conditions_satisfied().await);
    }

    #[tokio::test]
    async fn background_condition_blocks_while_foregrounded() {
        let dir = TempDir::new().unwrap();
        let ctl = new_controller(&dir, None).await;
        ctl.set_multi_delay(&[DelayCondition::Background]).await;

        assert!(!ctl.are_conditions_satisfied().await);
        ctl.on_background();
        assert!(ctl.are_conditions_satisfied().await);
        ctl.on_foreground();
        assert!(!ctl.are_conditions_satisfied().await);
    }

    #[tokio::test]
    async fn kill_condition_clears_after_app_start() {
        let dir = TempDir::new().unwrap();
        let ctl = new_controller(&dir, None).await;
        ctl.set_multi_delay(&[DelayCondition::Kill]).await;

        assert!(!ctl.are_conditions_satisfied().await);
        ctl.on_app_start().await;
        assert!(ctl.are_conditions_satisfied().await);
    }

    #[tokio::test]
    async fn date_condition_blocks_until_past() {
        let dir = TempDir::new().unwrap();
        let ctl = new_controller(&dir, None).await;
        let future = Utc::now() + chrono::Duration::days(1);
        ctl.set_multi_delay(&[DelayCondition::Date(future)]).await;
        assert!(!ctl.are_conditions_satisfied().await);

        let past = Utc::now() - chrono::Duration::days(1);
        ctl.set_multi_delay(&[DelayCondition::Date(past)]).await;
        assert!(ctl.are_conditions_satisfied().await);
    }

    #[tokio::test]
    async fn native_version_condition_requires_exact_match() {
        let dir = TempDir::new().unwrap();
        let ctl = new_controller(&dir, Some("2.0.0")).await;
        ctl.set_multi_delay(&[DelayCondition::NativeVersion("1.0.0".to_string())])
            .await;
        assert!(!ctl.are_conditions_satisfied().await);

        ctl.set_multi_delay(&[DelayCondition::NativeVersion("2.0.0".to_string())])
            .await;
        assert!(ctl.are_conditions_satisfied().await);
    }

    #[tokio::test]
    async fn cancel_delay_clears_all_conditions() {
        let dir = TempDir::new().unwrap();
        let ctl = new_controller(&dir, None).await;
        ctl.set_multi_delay(&[DelayCondition::Background]).await;
        assert!(!ctl.are_conditions_satisfied().await);

        ctl.cancel_delay().await;
        assert!(ctl.are_conditions_satisfied().await);
    }
}
