//! Bundle lifecycle state machine: selection of current/next/fallback,
//! pruning, path resolution.
//!
//! Grounded on the *shape* of `update/self_update.rs`'s
//! `UpdateCoordinator`/`UpdateState` — a state enum plus a coordinator
//! wrapping a lower-level updater — generalized to the full bundle
//! lifecycle this crate tracks instead of that file's simpler
//! `Idle..RolledBack` chain.

use crate::error::RegistryError;
use crate::store::{BundleInfo, BundleStatus, Store, BUILTIN_ID};
use chrono::TimeZone;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The synthesized descriptor for the immutable builtin bundle — it is
/// never stored in the registry's bundle map (invariant 1).
fn builtin_descriptor() -> BundleInfo {
    BundleInfo {
        id: BUILTIN_ID.to_string(),
        version: "builtin".to_string(),
        downloaded: chrono::Utc.timestamp_opt(0, 0).unwrap(),
        checksum: String::new(),
        status: BundleStatus::Success,
    }
}

pub struct BundleRegistry {
    store: Arc<Store>,
    bundles_root: PathBuf,
    builtin_path: PathBuf,
}

impl BundleRegistry {
    pub fn new(store: Arc<Store>, bundles_root: PathBuf, builtin_path: PathBuf) -> Self {
        Self {
            store,
            bundles_root,
            builtin_path,
        }
    }

    /// The bundle referenced by `currentBundleId`, or the builtin
    /// descriptor when unset.
    pub async fn current(&self) -> BundleInfo {
        match self.store.current_bundle_id().await {
            Some(id) if id != BUILTIN_ID => {
                self.store.get_bundle(&id).await.unwrap_or_else(builtin_descriptor)
            }
            _ => builtin_descriptor(),
        }
    }

    /// All known bundles; `include_builtin` prepends the synthesized
    /// builtin descriptor (the stored bundle map never contains it).
    pub async fn list(&self, include_builtin: bool) -> Vec<BundleInfo> {
        let mut bundles = self.store.list_bundles().await;
        if include_builtin {
            bundles.insert(0, builtin_descriptor());
        }
        bundles
    }

    pub async fn get_next_bundle(&self) -> Option<BundleInfo> {
        let id = self.store.next_bundle_id().await?;
        self.store.get_bundle(&id).await
    }

    /// Stage `id` as the pending successor, requiring it to be `success`,
    /// and mark it `pending` until it is actually promoted.
    pub async fn next(&self, id: &str) -> Result<(), RegistryError> {
        let mut info = self.require_success(id).await?;
        info.status = BundleStatus::Pending;
        self.store.set_bundle(info).await;
        self.store.set_next_bundle_id(Some(id.to_string())).await;
        self.store.save().await?;
        Ok(())
    }

    /// Promote `id` to current immediately, demoting the prior current
    /// bundle to fallback. Accepts a bundle already staged as `pending`
    /// and restores its status to `success` once it becomes current.
    pub async fn set(&self, id: &str) -> Result<(), RegistryError> {
        let mut info = self.require_promotable(id).await?;
        info.status = BundleStatus::Success;
        self.store.set_bundle(info).await;

        let prior = self.store.current_bundle_id().await;
        if let Some(prior_id) = prior {
            if prior_id != id {
                self.store.set_fallback_bundle_id(Some(prior_id)).await;
            }
        }
        self.store.set_current_bundle_id(Some(id.to_string())).await;
        self.store.save().await?;
        tracing::info!(bundle_id = %id, "promoted bundle to current");
        Ok(())
    }

    /// `applyPendingUpdate`: promotes the staged `next` bundle when the
    /// gate is open. Returns `false` (not an error) when the precondition
    /// isn't met — no `next` bundle, or the gate is closed.
    pub async fn apply_pending_update(&self, gate_open: bool) -> Result<bool, RegistryError> {
        if !gate_open {
            return Ok(false);
        }
        let Some(next_id) = self.store.next_bundle_id().await else {
            return Ok(false);
        };
        self.set(&next_id).await?;
        self.store.set_next_bundle_id(None).await;
        self.store.save().await?;
        Ok(true)
    }

    /// Called on app-ready: prunes the fallback bundle when configured.
    pub async fn mark_bundle_successful(&self, auto_delete_previous: bool) -> Result<(), RegistryError> {
        if !auto_delete_previous {
            return Ok(());
        }
        if let Some(fallback_id) = self.store.fallback_bundle_id().await {
            self.purge_bundle(&fallback_id).await?;
            self.store.set_fallback_bundle_id(None).await;
            self.store.save().await?;
        }
        Ok(())
    }

    /// The app-ready watchdog fired: roll the current bundle back to the
    /// fallback (or builtin), marking the failed bundle `error`.
    pub async fn rollback(&self) -> Result<(), RegistryError> {
        if let Some(current_id) = self.store.current_bundle_id().await {
            if current_id != BUILTIN_ID {
                if let Some(mut info) = self.store.get_bundle(&current_id).await {
                    info.status = BundleStatus::Error;
                    self.store.set_bundle(info).await;
                }
                self.remove_bundle_dir(&current_id).await?;
                self.store.delete_bundle(&current_id).await;
            }
        }

        let restore_to = self.store.fallback_bundle_id().await;
        self.store.set_current_bundle_id(restore_to).await;
        self.store.set_fallback_bundle_id(None).await;
        self.store.save().await?;
        tracing::warn!("rolled back to previous bundle after watchdog timeout");
        Ok(())
    }

    /// Remove a bundle's files and registry record. Refuses to delete the
    /// builtin, current, or staged-next bundle.
    pub async fn delete_bundle(&self, id: &str) -> Result<(), RegistryError> {
        if id == BUILTIN_ID {
            return Err(RegistryError::CannotDelete(
                id.to_string(),
                "builtin is immutable".to_string(),
            ));
        }
        if self.store.current_bundle_id().await.as_deref() == Some(id) {
            return Err(RegistryError::CannotDelete(
                id.to_string(),
                "bundle is current".to_string(),
            ));
        }
        if self.store.next_bundle_id().await.as_deref() == Some(id) {
            return Err(RegistryError::CannotDelete(
                id.to_string(),
                "bundle is staged as next".to_string(),
            ));
        }
        self.purge_bundle(id).await
    }

    /// Mark `id` as `error`, gated by `allowManualBundleError`.
    pub async fn set_bundle_error(
        &self,
        id: &str,
        allow_manual: bool,
        auto_delete_failed: bool,
    ) -> Result<(), RegistryError> {
        if !allow_manual {
            return Err(RegistryError::NotAllowed(
                "manual bundle error requires allowManualBundleError".to_string(),
            ));
        }
        let mut info = self
            .store
            .get_bundle(id)
            .await
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        info.status = BundleStatus::Error;
        self.store.set_bundle(info).await;
        self.store.save().await?;

        if auto_delete_failed {
            self.purge_bundle(id).await?;
        }
        Ok(())
    }

    /// Reset `currentBundleId` to builtin, or to the latest `success`
    /// bundle; clears any staged `next`.
    pub async fn reset(&self, to_builtin: bool) -> Result<(), RegistryError> {
        let target = if to_builtin {
            None
        } else {
            let mut candidates: Vec<BundleInfo> = self
                .store
                .list_bundles()
                .await
                .into_iter()
                .filter(|b| b.status == BundleStatus::Success)
                .collect();
            candidates.sort_by_key(|b| b.downloaded);
            candidates.last().map(|b| b.id.clone())
        };
        self.store.set_current_bundle_id(target).await;
        self.store.set_next_bundle_id(None).await;
        self.store.save().await?;
        Ok(())
    }

    /// Path to the `index.html` the host should reload, for the current
    /// bundle (or the externally supplied builtin path).
    pub async fn get_current_bundle_path(&self) -> PathBuf {
        match self.store.current_bundle_id().await {
            Some(id) if id != BUILTIN_ID => {
                self.bundles_root.join(&id).join("www").join("index.html")
            }
            _ => self.builtin_path.clone(),
        }
    }

    async fn require_success(&self, id: &str) -> Result<BundleInfo, RegistryError> {
        let info = self
            .store
            .get_bundle(id)
            .await
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if info.status != BundleStatus::Success {
            return Err(RegistryError::NotSuccess(id.to_string()));
        }
        Ok(info)
    }

    async fn require_promotable(&self, id: &str) -> Result<BundleInfo, RegistryError> {
        let info = self
            .store
            .get_bundle(id)
            .await
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if info.status != BundleStatus::Success && info.status != BundleStatus::Pending {
            return Err(RegistryError::NotSuccess(id.to_string()));
        }
        Ok(info)
    }

    async fn remove_bundle_dir(&self, id: &str) -> Result<(), RegistryError> {
        let dir = self.bundles_root.join(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::Io(e)),
        }
    }

    async fn purge_bundle(&self, id: &str) -> Result<(), RegistryError> {
        self.remove_bundle_dir(id).await?;
        self.store.delete_bundle(id).await;
        self.store.save().await?;
        Ok(())
    }

    pub fn bundle_www_dir(&self, id: &str) -> PathBuf {
        self.bundles_root.join(id).join("www")
    }

    pub fn builtin_path(&self) -> &Path {
        &self.builtin_path
    }
}
