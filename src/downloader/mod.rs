//! HTTP fetch, zip-slip-safe extraction and manifest delta pass.
//!
//! Grounded on `update/model.rs`'s `download_file` (streamed
//! `bytes_stream`, `reqwest::Client` with a configured timeout and a bounded
//! redirect policy) and `update/self_update.rs::download_update`. Zip
//! extraction and the path-safety policy are grounded on
//! `other_examples/..._web_update.rs.rs`'s `extract_zip_bytes`, hardened to
//! a canonicalize-and-prefix-check rule instead of that file's plain
//! `name.contains("..")` check.

use crate::crypto;
use crate::error::DownloadError;
use crate::store::{BundleInfo, BundleStatus, Store};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// One entry of a manifest (delta) update.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub file_name: String,
    pub download_url: String,
    #[serde(default)]
    pub file_hash: Option<String>,
}

/// Everything needed to fetch and install one candidate bundle.
pub struct DownloadRequest {
    pub url: String,
    pub version: String,
    pub checksum: Option<String>,
    pub session_key: Option<Vec<u8>>,
    pub manifest: Option<Vec<ManifestEntry>>,
}

/// Percent-complete progress callback, invoked for the zip fetch and again
/// (per-entry) for the manifest pass.
pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

pub struct Downloader {
    client: reqwest::Client,
    bundles_root: PathBuf,
    store: Arc<Store>,
}

impl Downloader {
    pub fn new(
        bundles_root: PathBuf,
        store: Arc<Store>,
        response_timeout: Duration,
        user_agent: &str,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(response_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(user_agent)
            .build()
            .expect("reqwest client configuration is static and valid");
        Self {
            client,
            bundles_root,
            store,
        }
    }

    /// Run the full download/verify/decrypt/extract/manifest pipeline.
    /// On any failure the partially-created bundle directory and registry
    /// record are removed before the error is returned.
    pub async fn download_bundle(
        &self,
        req: DownloadRequest,
        progress: Option<&ProgressCallback>,
    ) -> Result<BundleInfo, DownloadError> {
        let id = crypto::generate_bundle_id();
        let bundle_dir = self.bundles_root.join(&id);
        tokio::fs::create_dir_all(&bundle_dir).await?;

        self.store
            .set_bundle(BundleInfo::new_downloading(&id, &req.version))
            .await;
        self.store.save().await.map_err(|e| {
            DownloadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;

        match self.run_pipeline(&id, &bundle_dir, &req, progress).await {
            Ok(checksum) => {
                let info = BundleInfo {
                    id: id.clone(),
                    version: req.version,
                    downloaded: chrono::Utc::now(),
                    checksum,
                    status: BundleStatus::Success,
                };
                self.store.set_bundle(info.clone()).await;
                let _ = self.store.save().await;
                tracing::info!(bundle_id = %id, "bundle download succeeded");
                Ok(info)
            }
            Err(err) => {
                tracing::warn!(bundle_id = %id, error = %err, "bundle download failed, cleaning up");
                let _ = tokio::fs::remove_dir_all(&bundle_dir).await;
                self.store.delete_bundle(&id).await;
                let _ = self.store.save().await;
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        id: &str,
        bundle_dir: &Path,
        req: &DownloadRequest,
        progress: Option<&ProgressCallback>,
    ) -> Result<String, DownloadError> {
        let zip_path = bundle_dir.join("bundle.zip");
        self.fetch_to_file(&req.url, &zip_path, progress).await?;

        let expected = match (&req.checksum, &req.session_key) {
            (Some(encrypted), Some(key)) => {
                crypto::decrypt_checksum(encrypted, key).or_else(|| Some(encrypted.clone()))
            }
            (Some(plain), None) => Some(plain.clone()),
            (None, _) => None,
        };

        let checksum = if let Some(expected) = expected {
            if !crypto::verify_file(&zip_path, &expected).await? {
                let actual = crypto::hash_file(&zip_path).await.unwrap_or_default();
                return Err(DownloadError::ChecksumFailed { expected, actual });
            }
            expected
        } else {
            crypto::hash_file(&zip_path).await?
        };

        if let Some(key) = &req.session_key {
            crypto::decrypt_file(&zip_path, key)
                .await
                .map_err(|_| DownloadError::DecryptionFailed)?;
        }

        let www_dir = bundle_dir.join("www");
        tokio::fs::create_dir_all(&www_dir).await?;
        extract_zip(&zip_path, &www_dir).await?;
        tokio::fs::remove_file(&zip_path).await?;

        if let Some(manifest) = &req.manifest {
            if !manifest.is_empty() {
                self.run_manifest_pass(&www_dir, manifest, progress).await?;
            }
        }

        tracing::info!(bundle_id = %id, "extraction and manifest pass complete");
        Ok(checksum)
    }

    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), DownloadError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout { url: url.to_string() }
            } else if e.is_redirect() {
                DownloadError::TooManyRedirects { url: url.to_string() }
            } else {
                DownloadError::Network(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(DownloadError::BadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let total = response.content_length();
        let mut received: u64 = 0;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(DownloadError::Network)?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            if let (Some(cb), Some(total)) = (progress, total) {
                if total > 0 {
                    cb(((received * 100) / total) as u8);
                }
            }
        }
        file.flush().await?;
        Ok(())
    }

    async fn run_manifest_pass(
        &self,
        extract_dir: &Path,
        manifest: &[ManifestEntry],
        progress: Option<&ProgressCallback>,
    ) -> Result<(), DownloadError> {
        let count = manifest.len().max(1) as u64;
        for (i, entry) in manifest.iter().enumerate() {
            let target = safe_join(extract_dir, &entry.file_name)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let cache_hit = if target.exists() {
                match &entry.file_hash {
                    None => true,
                    Some(expected) => crypto::verify_file(&target, expected).await?,
                }
            } else {
                false
            };

            if !cache_hit {
                let response = self
                    .client
                    .get(&entry.download_url)
                    .send()
                    .await
                    .map_err(DownloadError::Network)?;
                if !response.status().is_success() {
                    return Err(DownloadError::BadStatus {
                        url: entry.download_url.clone(),
                        status: response.status().as_u16(),
                    });
                }
                let bytes = response.bytes().await.map_err(DownloadError::Network)?;
                let decoded = crypto::try_decompress_brotli(&bytes);

                let tmp_path = target.with_extension("part");
                tokio::fs::write(&tmp_path, &decoded).await?;
                tokio::fs::rename(&tmp_path, &target).await?;

                if let Some(expected) = &entry.file_hash {
                    let actual = crypto::hash_file(&target).await?;
                    if &actual != expected {
                        return Err(DownloadError::HashFailed {
                            file_name: entry.file_name.clone(),
                            expected: expected.clone(),
                            actual,
                        });
                    }
                }
            }

            if let Some(cb) = progress {
                cb((((i + 1) as u64 * 100) / count) as u8);
            }
        }
        Ok(())
    }
}

/// Reject an absolute entry name or one containing a literal `..` segment,
/// then join and lexically normalize against `extract_dir` without
/// requiring the target to exist yet (it doesn't, until we write it).
fn safe_join(extract_dir: &Path, entry_name: &str) -> Result<PathBuf, DownloadError> {
    let zip_slip = || DownloadError::ZipSlip {
        entry: entry_name.to_string(),
    };

    if Path::new(entry_name).is_absolute() {
        return Err(zip_slip());
    }
    if entry_name.split(['/', '\\']).any(|seg| seg == "..") {
        return Err(zip_slip());
    }

    let joined = extract_dir.join(entry_name);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => return Err(zip_slip()),
            std::path::Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized != extract_dir && !normalized.starts_with(extract_dir) {
        return Err(zip_slip());
    }
    Ok(normalized)
}

async fn extract_zip(zip_path: &Path, extract_dir: &Path) -> Result<(), DownloadError> {
    let zip_path = zip_path.to_path_buf();
    let extract_dir = extract_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip_blocking(&zip_path, &extract_dir))
        .await
        .map_err(|e| DownloadError::BadArchive(e.to_string()))?
}

fn extract_zip_blocking(zip_path: &Path, extract_dir: &Path) -> Result<(), DownloadError> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| DownloadError::BadArchive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| DownloadError::BadArchive(e.to_string()))?;
        let name = match entry.enclosed_name() {
            Some(p) => p.to_string_lossy().to_string(),
            None => entry.name().to_string(),
        };
        let target = safe_join(extract_dir, &name)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}
