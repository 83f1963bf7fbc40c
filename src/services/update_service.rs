use std::path::PathBuf;
use std::process::Command;

use serde::Deserialize;

use crate::config::LauncherConfig;
use crate::errors::{LauncherError, Result};
use crate::services::download_manager::stream_to_file;
use crate::services::ApiClient;
use crate::utils::file::remove_file_logged;

const UPDATER_FILE_NAME: &str = "updater.exe";

#[derive(Deserialize, Debug)]
struct LatestRelease {
    #[serde(default)]
    tag_name: Option<String>,
}

pub fn current_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

fn normalize_version(value: &str) -> &str {
    value.trim().trim_start_matches(['v', 'V'])
}

/// Launcher self-update: release lookup and updater hand-off.
#[derive(Clone)]
pub struct UpdateService {
    root: PathBuf,
    github: ApiClient,
    client: reqwest::Client,
    release_repo: String,
    updater_url: String,
}

impl UpdateService {
    pub fn new(root: impl Into<PathBuf>, client: reqwest::Client, config: &LauncherConfig) -> Self {
        Self {
            root: root.into(),
            github: ApiClient::new(config.github_api_url.clone(), config),
            client,
            release_repo: config.release_repo.clone(),
            updater_url: config.updater_url.clone(),
        }
    }

    /// Tag of the latest release, or the running version when the lookup
    /// fails for any reason.
    pub async fn latest_version(&self) -> String {
        let path = format!("repos/{}/releases/latest", self.release_repo);
        match self.github.get::<LatestRelease>(&path).await {
            Ok(LatestRelease {
                tag_name: Some(tag),
            }) if !tag.trim().is_empty() => tag.trim().to_string(),
            Ok(_) => {
                tracing::debug!("latest release has no tag_name");
                current_version().to_string()
            }
            Err(err) => {
                tracing::debug!("couldn't get latest version: {}", err);
                current_version().to_string()
            }
        }
    }

    /// `Some(tag)` when a release other than the running one is published.
    pub async fn available_update(&self) -> Option<String> {
        let latest = self.latest_version().await;
        if normalize_version(&latest) == normalize_version(current_version()) {
            None
        } else {
            Some(latest)
        }
    }

    pub fn updater_path(&self) -> PathBuf {
        self.root.join(UPDATER_FILE_NAME)
    }

    pub fn remove_stale_updater(&self) -> bool {
        let path = self.updater_path();
        if !path.exists() {
            return false;
        }
        tracing::debug!("found and deleting {}", path.display());
        remove_file_logged(&path)
    }

    pub async fn download_updater(&self) -> Result<PathBuf> {
        let path = self.updater_path();
        stream_to_file(&self.client, &self.updater_url, &path).await?;
        if !path.is_file() {
            return Err(LauncherError::Config(format!(
                "downloaded updater is missing at {}",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Starts the updater with `--version=<tag>` followed by the launcher's
    /// own arguments. The caller is expected to exit afterwards.
    pub fn spawn_updater(&self, version: &str, launcher_args: &[String]) -> Result<()> {
        let mut command = Command::new(self.updater_path());
        command
            .arg(format!("--version={version}"))
            .args(launcher_args)
            .current_dir(&self.root);
        command.spawn()?;
        Ok(())
    }
}
