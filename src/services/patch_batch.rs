use std::path::PathBuf;

use crate::config::LauncherConfig;
use crate::errors::{LauncherError, Result};
use crate::models::{BatchResult, ManifestEntry, Plan, ProgressEvent, TransferProgress};
use crate::services::DownloadManager;
use crate::utils::paths::resolve_entry_path;

/// Drives a plan through the download manager one entry at a time.
#[derive(Clone)]
pub struct PatchBatch {
    root: PathBuf,
    patch_host: String,
    game_host: String,
    downloads: DownloadManager,
}

impl PatchBatch {
    pub fn new(root: impl Into<PathBuf>, downloads: DownloadManager, config: &LauncherConfig) -> Self {
        Self {
            root: root.into(),
            patch_host: config.patch_host.clone(),
            game_host: config.game_host.clone(),
            downloads,
        }
    }

    pub fn entry_url(&self, entry: &ManifestEntry, game_files: bool) -> String {
        let host = if game_files {
            &self.game_host
        } else {
            &self.patch_host
        };
        format!(
            "{}/{}",
            host.trim_end_matches('/'),
            entry.path.replace('\\', "/").trim_start_matches('/')
        )
    }

    /// Fetches missing entries, then outdated ones. Per-entry failures are
    /// counted and logged; only fatal errors (the extraction tool being
    /// unobtainable) end the batch early.
    pub async fn run<F>(
        &self,
        plan: &Plan,
        game_files: bool,
        progress_offset: usize,
        mut on_progress: F,
    ) -> Result<BatchResult>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let work = plan.work_list();
        let total = progress_offset + work.len();
        let mut completed = progress_offset;
        let mut failed = 0;

        for entry in &work {
            match self
                .fetch_entry(entry, game_files, completed, total, &mut on_progress)
                .await
            {
                Ok(()) => completed += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    failed += 1;
                    tracing::warn!("couldn't update {}: {}", entry.path, err);
                }
            }
        }

        if failed > 0 {
            tracing::warn!(
                "{} of {} {} failed to update",
                failed,
                work.len(),
                if work.len() == 1 { "file" } else { "files" }
            );
        }
        Ok(BatchResult {
            completed,
            failed,
            total,
        })
    }

    async fn fetch_entry<F>(
        &self,
        entry: &ManifestEntry,
        game_files: bool,
        completed: usize,
        total: usize,
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let destination = resolve_entry_path(&self.root, &entry.path)?;
        if destination == self.root {
            return Err(LauncherError::UnsafePath(entry.path.clone()));
        }
        let url = self.entry_url(entry, game_files);
        tracing::debug!("fetching {} from {}", entry.path, url);

        let file = entry.path.clone();
        self.downloads
            .fetch(&url, &destination, |progress: TransferProgress| {
                on_progress(ProgressEvent {
                    phase: progress.phase,
                    completed,
                    total,
                    percent: overall_percent(completed, total, progress.percent),
                    speed_mbps: progress.speed_bps / (1024.0 * 1024.0),
                    file: file.clone(),
                })
            })
            .await
    }
}

fn overall_percent(completed: usize, total: usize, current_percent: f64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let current = (current_percent / 100.0).clamp(0.0, 1.0);
    ((completed as f64 + current) / total as f64 * 100.0).clamp(0.0, 100.0)
}
