use serde::{Deserialize, Serialize};

/// One record of a remote manifest. `path` is relative to the install root
/// and may carry the archive suffix of its download form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    #[serde(rename = "file")]
    pub path: String,
    #[serde(rename = "hash")]
    pub expected_digest: String,
}

impl ManifestEntry {
    pub fn new(path: impl Into<String>, expected_digest: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expected_digest: expected_digest.into(),
        }
    }
}

/// A full-install volume part with its own resolved download link.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FullGameEntry {
    pub file: String,
    pub link: String,
    pub hash: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ManifestPayload<T> {
    #[serde(default = "Vec::new")]
    pub files: Vec<T>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestView {
    Patch,
    FullGame,
}

impl ManifestView {
    pub fn endpoint(self) -> &'static str {
        match self {
            ManifestView::Patch => "patch/get",
            ManifestView::FullGame => "game/get",
        }
    }

    pub fn is_game_files(self) -> bool {
        matches!(self, ManifestView::FullGame)
    }
}

/// Result of a fail-soft manifest fetch. `success == false` means the
/// manifest was unavailable, not that nothing needs doing.
#[derive(Clone, Debug, Default)]
pub struct ManifestFetch {
    pub entries: Vec<ManifestEntry>,
    pub success: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub missing: Vec<ManifestEntry>,
    pub outdated: Vec<ManifestEntry>,
    pub success: bool,
}

impl Plan {
    pub fn is_synchronized(&self) -> bool {
        self.missing.is_empty() && self.outdated.is_empty()
    }

    pub fn len(&self) -> usize {
        self.missing.len() + self.outdated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Missing entries followed by outdated ones, in plan order.
    pub fn work_list(&self) -> Vec<ManifestEntry> {
        self.missing
            .iter()
            .chain(self.outdated.iter())
            .cloned()
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferPhase {
    Downloading,
    Extracting,
}

impl TransferPhase {
    pub fn verb(self) -> &'static str {
        match self {
            TransferPhase::Downloading => "Downloading",
            TransferPhase::Extracting => "Extracting",
        }
    }
}

/// Byte-level progress of a single transfer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
    pub speed_bps: f64,
    pub phase: TransferPhase,
}

/// Batch-level progress; the presentation layer turns this into a status line.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub phase: TransferPhase,
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
    pub speed_mbps: f64,
    pub file: String,
}
