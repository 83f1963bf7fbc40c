use std::path::{Path, PathBuf};

use crate::config::LauncherConfig;
use crate::errors::{LauncherError, Result};
use crate::models::{FullGameEntry, ProgressEvent, TransferProgress};
use crate::services::{DownloadManager, ManifestService};
use crate::utils::digest;
use crate::utils::file::{
    ensure_free_space, files_with_suffix, relocate_tree, remove_dir_logged, remove_file_logged,
};
use crate::utils::paths::resolve_entry_path;

const SCRATCH_DIR: &str = ".full-install-tmp";
const FIRST_VOLUME_SUFFIX: &str = ".7z.001";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FullInstallReport {
    pub parts: usize,
    pub downloaded: usize,
    pub reused: usize,
    pub relocated: usize,
}

/// First-time install from a split archive: every volume is fetched and
/// verified, then the set is extracted once and moved into the root.
#[derive(Clone)]
pub struct FullInstaller {
    root: PathBuf,
    manifests: ManifestService,
    downloads: DownloadManager,
    top_level_dir: Option<String>,
    launcher_executable: String,
    game_executable: String,
    required_free_bytes: u64,
}

impl FullInstaller {
    pub fn new(
        root: impl Into<PathBuf>,
        manifests: ManifestService,
        downloads: DownloadManager,
        config: &LauncherConfig,
    ) -> Self {
        Self {
            root: root.into(),
            manifests,
            downloads,
            top_level_dir: config.full_install_root_dir.clone(),
            launcher_executable: config.launcher_executable.clone(),
            game_executable: config.game_executable.clone(),
            required_free_bytes: config.required_free_bytes,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.root.join(&self.game_executable).is_file()
    }

    /// Volumes left behind by an interrupted install.
    pub fn has_partial_install(&self) -> bool {
        !files_with_suffix(&self.root, FIRST_VOLUME_SUFFIX).is_empty()
    }

    pub fn ensure_free_space(&self) -> Result<()> {
        ensure_free_space(&self.root, self.required_free_bytes)
    }

    /// Any failure aborts the whole install; nothing is extracted unless
    /// every volume verified.
    pub async fn install<F>(&self, identity: Option<&str>, mut on_progress: F) -> Result<FullInstallReport>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let identity = identity
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(LauncherError::IdentityUnavailable)?;

        let parts = self.manifests.fetch_full_game_links(identity).await?;
        if parts.is_empty() {
            return Err(LauncherError::Http(
                "full game manifest lists no files".to_string(),
            ));
        }

        let mut report = FullInstallReport {
            parts: parts.len(),
            ..FullInstallReport::default()
        };
        let mut volumes = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let path = resolve_entry_path(&self.root, &part.file)?;
            if verify_part(&path, &part.hash).await.unwrap_or(false) {
                tracing::info!("{} already downloaded", part.file);
                report.reused += 1;
            } else {
                self.download_part(part, &path, index, parts.len(), &mut on_progress)
                    .await?;
                report.downloaded += 1;
            }
            volumes.push(path);
        }

        volumes.sort();
        let first = volumes
            .first()
            .cloned()
            .ok_or_else(|| LauncherError::Config("no volumes to extract".to_string()))?;
        report.relocated = self.extract_and_relocate(&first).await?;

        for volume in &volumes {
            remove_file_logged(volume);
        }
        tracing::info!(
            "full install finished: {} parts, {} files placed",
            report.parts,
            report.relocated
        );
        Ok(report)
    }

    async fn download_part<F>(
        &self,
        part: &FullGameEntry,
        path: &Path,
        index: usize,
        total: usize,
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        tracing::info!("downloading {} ({}/{})", part.file, index + 1, total);
        let file = part.file.clone();
        self.downloads
            .fetch_raw(&part.link, path, |progress: TransferProgress| {
                on_progress(ProgressEvent {
                    phase: progress.phase,
                    completed: index,
                    total,
                    percent: ((index as f64 + progress.percent / 100.0) / total as f64 * 100.0)
                        .clamp(0.0, 100.0),
                    speed_mbps: progress.speed_bps / (1024.0 * 1024.0),
                    file: file.clone(),
                })
            })
            .await?;

        let actual = digest_blocking(path, &part.hash).await?;
        if !digest::digests_match(&part.hash, &actual) {
            remove_file_logged(path);
            return Err(LauncherError::Integrity {
                path: part.file.clone(),
                expected: part.hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    async fn extract_and_relocate(&self, first_volume: &Path) -> Result<usize> {
        let scratch = self.root.join(SCRATCH_DIR);
        if scratch.exists() {
            remove_dir_logged(&scratch);
        }
        tokio::fs::create_dir_all(&scratch).await?;

        let result = self.extract_into(first_volume, &scratch).await;
        remove_dir_logged(&scratch);
        result
    }

    async fn extract_into(&self, first_volume: &Path, scratch: &Path) -> Result<usize> {
        self.downloads
            .extraction()
            .extract_to(first_volume, scratch)
            .await?;

        let source = top_level_dir(scratch, self.top_level_dir.as_deref());
        tracing::info!("moving {} into {}", source.display(), self.root.display());
        let root = self.root.clone();
        let skip = self.launcher_executable.clone();
        tokio::task::spawn_blocking(move || relocate_tree(&source, &root, Some(&skip)))
            .await
            .map_err(|err| LauncherError::Config(err.to_string()))?
    }
}

/// The directory whose contents belong in the root: the configured one if
/// extraction produced it, else a lone subdirectory, else the scratch dir.
fn top_level_dir(scratch: &Path, configured: Option<&str>) -> PathBuf {
    if let Some(name) = configured {
        let candidate = scratch.join(name);
        if candidate.is_dir() {
            return candidate;
        }
    }
    let entries: Vec<PathBuf> = std::fs::read_dir(scratch)
        .map(|entries| entries.flatten().map(|entry| entry.path()).collect())
        .unwrap_or_default();
    match entries.as_slice() {
        [only] if only.is_dir() => only.clone(),
        _ => scratch.to_path_buf(),
    }
}

async fn digest_blocking(path: &Path, expected: &str) -> Result<String> {
    let path = path.to_path_buf();
    let expected = expected.to_string();
    tokio::task::spawn_blocking(move || digest::digest_for(&path, &expected))
        .await
        .map_err(|err| LauncherError::Config(err.to_string()))?
}

async fn verify_part(path: &Path, expected: &str) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let actual = digest_blocking(path, expected).await?;
    Ok(digest::digests_match(expected, &actual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::extraction::tests::test_config;
    use crate::services::extraction::ArchiveExtractor;
    use crate::services::{ApiClient, ExtractionService};
    use crate::testing::{temp_root, Route, TestServer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Produces `ClassicCounter/{csgo.exe, csgo/pak01_dir.vpk, launcher.exe}`.
    #[derive(Default)]
    struct TreeExtractor {
        calls: AtomicUsize,
    }

    impl ArchiveExtractor for TreeExtractor {
        fn extract(&self, _tool: &Path, archive: &Path, target: &Path) -> Result<()> {
            let name = archive.to_string_lossy().to_string();
            assert!(name.ends_with(".7z.001") || name.ends_with(".7z"), "{name}");
            assert!(target.ends_with(SCRATCH_DIR), "extracts into scratch only");
            self.calls.fetch_add(1, Ordering::SeqCst);
            let top = target.join("ClassicCounter");
            std::fs::create_dir_all(top.join("csgo"))?;
            std::fs::write(top.join("csgo.exe"), b"game")?;
            std::fs::write(top.join("csgo").join("pak01_dir.vpk"), b"dir")?;
            std::fs::write(top.join("launcher.exe"), b"packaged launcher")?;
            Ok(())
        }
    }

    const VOLUME_ONE: &[u8] = b"volume one";
    const VOLUME_TWO: &[u8] = b"volume two";

    fn md5_hex(bytes: &[u8]) -> String {
        format!("{:x}", md5::compute(bytes))
    }

    fn installer(
        root: &Path,
        api: &TestServer,
        extractor: Arc<TreeExtractor>,
    ) -> FullInstaller {
        let config = LauncherConfig {
            launcher_executable: "launcher.exe".to_string(),
            ..test_config(Vec::new())
        };
        std::fs::write(root.join("7za"), b"tool").expect("tool");
        let client = reqwest::Client::new();
        let extraction =
            ExtractionService::with_extractor(root, client.clone(), &config, extractor);
        let downloads = DownloadManager::new(client, extraction, &config);
        let manifests = ManifestService::new(ApiClient::new(api.url("/api"), &config));
        FullInstaller::new(root, manifests, downloads, &config)
    }

    fn manifest_json(cdn: &TestServer, parts: &[(&str, &[u8])]) -> String {
        let files: Vec<serde_json::Value> = parts
            .iter()
            .map(|(name, bytes)| {
                serde_json::json!({
                    "file": name,
                    "link": cdn.url(&format!("/cdn/{name}")),
                    "hash": md5_hex(bytes),
                })
            })
            .collect();
        serde_json::json!({ "files": files }).to_string()
    }

    #[tokio::test]
    async fn installs_from_verified_volumes_and_relocates_tree() {
        let root = temp_root("full-install");
        let cdn = TestServer::start(vec![
            Route::bytes("/cdn/game.7z.001", VOLUME_ONE),
            Route::bytes("/cdn/game.7z.002", VOLUME_TWO),
        ]);
        let api = TestServer::start(vec![Route::json(
            "/api/game/full",
            &manifest_json(
                &cdn,
                &[("game.7z.002", VOLUME_TWO), ("game.7z.001", VOLUME_ONE)],
            ),
        )]);
        std::fs::write(root.join("game.7z.002"), VOLUME_TWO).expect("reused part");
        let extractor = Arc::new(TreeExtractor::default());
        let installer = installer(&root, &api, extractor.clone());
        assert!(!installer.is_installed());
        assert!(!installer.has_partial_install());

        let report = installer
            .install(Some("76561198000000000"), |_| {})
            .await
            .expect("install");

        assert_eq!(report.parts, 2);
        assert_eq!(report.reused, 1);
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.relocated, 2);
        assert_eq!(cdn.hits("/cdn/game.7z.002"), 0);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert!(installer.is_installed());
        assert!(root.join("csgo").join("pak01_dir.vpk").is_file());
        assert!(!root.join("launcher.exe").exists());
        assert!(!root.join(SCRATCH_DIR).exists());
        assert!(!root.join("game.7z.001").exists());
        assert!(!root.join("game.7z.002").exists());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_identity_is_fatal_before_any_request() {
        let root = temp_root("full-identity");
        let api = TestServer::start(Vec::new());
        let installer = installer(&root, &api, Arc::new(TreeExtractor::default()));

        let err = installer.install(None, |_| {}).await.expect_err("no identity");

        assert!(matches!(err, LauncherError::IdentityUnavailable));
        assert!(err.is_fatal());
        assert!(api.requests().is_empty());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn corrupted_volume_aborts_without_extracting() {
        let root = temp_root("full-integrity");
        let cdn = TestServer::start(vec![
            Route::bytes("/cdn/game.7z.001", b"tampered".to_vec()),
            Route::bytes("/cdn/game.7z.002", VOLUME_TWO),
        ]);
        let api = TestServer::start(vec![Route::json(
            "/api/game/full",
            &manifest_json(
                &cdn,
                &[("game.7z.001", VOLUME_ONE), ("game.7z.002", VOLUME_TWO)],
            ),
        )]);
        let extractor = Arc::new(TreeExtractor::default());
        let installer = installer(&root, &api, extractor.clone());

        let err = installer
            .install(Some("76561198000000000"), |_| {})
            .await
            .expect_err("integrity");

        assert!(matches!(err, LauncherError::Integrity { .. }));
        assert!(!root.join("game.7z.001").exists());
        assert_eq!(cdn.hits("/cdn/game.7z.002"), 0);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn single_volume_is_verified_before_extraction() {
        let root = temp_root("full-single");
        let cdn = TestServer::start(vec![Route::bytes("/cdn/game.7z", VOLUME_ONE)]);
        let api = TestServer::start(vec![Route::json(
            "/api/game/full",
            &manifest_json(&cdn, &[("game.7z", VOLUME_ONE)]),
        )]);
        let extractor = Arc::new(TreeExtractor::default());
        let installer = installer(&root, &api, extractor.clone());

        let report = installer
            .install(Some("76561198000000000"), |_| {})
            .await
            .expect("install");

        assert_eq!(report.parts, 1);
        assert_eq!(report.downloaded, 1);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert!(installer.is_installed());
        assert!(!root.join("game.7z").exists());
        assert!(!root.join("ClassicCounter").exists());
        assert!(!root.join(SCRATCH_DIR).exists());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn failed_volume_download_aborts_without_extracting() {
        let root = temp_root("full-transport");
        let cdn = TestServer::start(vec![
            Route::bytes("/cdn/game.7z.001", VOLUME_ONE),
            Route::status("/cdn/game.7z.002", 500, "broken"),
        ]);
        let api = TestServer::start(vec![Route::json(
            "/api/game/full",
            &manifest_json(
                &cdn,
                &[("game.7z.001", VOLUME_ONE), ("game.7z.002", VOLUME_TWO)],
            ),
        )]);
        let extractor = Arc::new(TreeExtractor::default());
        let installer = installer(&root, &api, extractor.clone());

        let err = installer
            .install(Some("76561198000000000"), |_| {})
            .await
            .expect_err("transport");

        assert!(err.is_transport(), "{err}");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert!(!root.join(SCRATCH_DIR).exists());
        assert!(!root.join("game.7z.002").exists());
        assert!(!root.join("game.7z.002.part").exists());
        assert!(!installer.is_installed());
        assert!(installer.has_partial_install(), "verified volume is kept for resume");
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn detects_partial_install_volumes() {
        let root = temp_root("full-partial");
        std::fs::write(root.join("game.7z.001"), b"x").expect("volume");
        let api = TestServer::start(Vec::new());
        let installer = installer(&root, &api, Arc::new(TreeExtractor::default()));
        assert!(installer.has_partial_install());
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn configured_top_level_dir_wins_over_lone_directory() {
        let root = temp_root("full-top");
        std::fs::create_dir_all(root.join("A")).expect("a");
        assert_eq!(top_level_dir(&root, None), root.join("A"));
        std::fs::create_dir_all(root.join("B")).expect("b");
        assert_eq!(top_level_dir(&root, Some("B")), root.join("B"));
        assert_eq!(top_level_dir(&root, None), root);
        let _ = std::fs::remove_dir_all(root);
    }
}
