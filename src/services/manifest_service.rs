use crate::errors::{LauncherError, Result};
use crate::models::{FullGameEntry, ManifestEntry, ManifestFetch, ManifestPayload, ManifestView};
use crate::services::ApiClient;

const FULL_GAME_DOWNLOAD_ENDPOINT: &str = "game/full";

#[derive(Clone)]
pub struct ManifestService {
    api: ApiClient,
}

impl ManifestService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetches one manifest view. Transport and parse failures are logged
    /// and reported as an empty, unsuccessful fetch.
    pub async fn fetch(&self, view: ManifestView) -> ManifestFetch {
        match self
            .api
            .get::<ManifestPayload<ManifestEntry>>(view.endpoint())
            .await
        {
            Ok(payload) => {
                tracing::info!(
                    "fetched {:?} manifest with {} entries",
                    view,
                    payload.files.len()
                );
                ManifestFetch {
                    entries: payload.files,
                    success: true,
                }
            }
            Err(err) => {
                tracing::warn!("couldn't get {:?} manifest: {}", view, err);
                ManifestFetch::default()
            }
        }
    }

    /// Volume parts of the full install, each with its own download link.
    /// Unlike [`fetch`](Self::fetch) this fails hard.
    pub async fn fetch_full_game_links(&self, identity: &str) -> Result<Vec<FullGameEntry>> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(LauncherError::IdentityUnavailable);
        }
        let payload = self
            .api
            .get_with_query::<ManifestPayload<FullGameEntry>>(
                FULL_GAME_DOWNLOAD_ENDPOINT,
                &[("steam_id", identity)],
            )
            .await?;
        tracing::info!("full game manifest lists {} parts", payload.files.len());
        Ok(payload.files)
    }
}
