use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::LauncherConfig;
use crate::errors::{LauncherError, Result};
use crate::models::{ManifestEntry, ManifestFetch, Plan};
use crate::utils::digest;
use crate::utils::file::remove_file_logged;
use crate::utils::paths::{file_name_of, normalized_relative, resolve_entry_path, strip_archive_suffix};

#[derive(Debug, PartialEq, Eq)]
enum LocalState {
    Missing,
    Outdated,
    Current,
    Unreadable,
}

/// Diffs manifest entries against the files under the install root.
#[derive(Clone, Debug)]
pub struct PatchPlanner {
    root: PathBuf,
    archive_suffix: String,
    container_descriptor: String,
    container_dir: String,
    container_member_prefix: String,
}

impl PatchPlanner {
    pub fn new(root: impl Into<PathBuf>, config: &LauncherConfig) -> Self {
        let container_descriptor = normalized_relative(&config.container_descriptor);
        let container_dir = parent_of(&container_descriptor).to_string();
        Self {
            root: root.into(),
            archive_suffix: config.archive_suffix.clone(),
            container_descriptor,
            container_dir,
            container_member_prefix: config.container_member_prefix.to_ascii_lowercase(),
        }
    }

    /// Plans a fetched manifest; an unavailable manifest yields an empty,
    /// unsuccessful plan without touching the disk.
    pub async fn plan_fetch(&self, fetch: ManifestFetch, validate_all: bool) -> Result<Plan> {
        if !fetch.success {
            return Ok(Plan::default());
        }
        self.plan(fetch.entries, validate_all).await
    }

    pub async fn plan(&self, entries: Vec<ManifestEntry>, validate_all: bool) -> Result<Plan> {
        let planner = self.clone();
        tokio::task::spawn_blocking(move || planner.plan_blocking(&entries, validate_all))
            .await
            .map_err(|err| LauncherError::Config(err.to_string()))
    }

    /// Classifies every entry as missing, outdated or current. Outdated files
    /// are deleted before they are classified. The container descriptor, when
    /// it needs fetching, is placed last so members land before it.
    pub fn plan_blocking(&self, entries: &[ManifestEntry], validate_all: bool) -> Plan {
        let mut plan = Plan {
            success: true,
            ..Plan::default()
        };
        let mut seen = HashSet::new();
        let entries: Vec<&ManifestEntry> = entries
            .iter()
            .filter(|entry| seen.insert(entry.path.clone()))
            .collect();

        let descriptor = entries
            .iter()
            .position(|entry| self.is_descriptor(entry))
            .map(|index| (index, self.check(entries[index])));
        let skip_members =
            matches!(descriptor, Some((_, LocalState::Current))) && !validate_all;
        if skip_members {
            tracing::debug!("container descriptor is current; member digests skipped");
        }

        for (index, entry) in entries.iter().enumerate() {
            if matches!(descriptor, Some((descriptor_index, _)) if descriptor_index == index) {
                continue;
            }
            let state = if skip_members && self.is_member(entry) {
                self.check_exists(entry)
            } else {
                self.check(entry)
            };
            self.classify(&mut plan, entry, state);
        }

        if let Some((index, state)) = descriptor {
            self.classify(&mut plan, entries[index], state);
        }

        tracing::info!(
            "plan ready: {} missing, {} outdated",
            plan.missing.len(),
            plan.outdated.len()
        );
        plan
    }

    fn classify(&self, plan: &mut Plan, entry: &ManifestEntry, state: LocalState) {
        match state {
            LocalState::Missing => {
                tracing::debug!("missing file: {}", entry.path);
                plan.missing.push(entry.clone());
            }
            LocalState::Outdated => {
                tracing::debug!("outdated file: {}", entry.path);
                plan.outdated.push(entry.clone());
            }
            LocalState::Current | LocalState::Unreadable => {}
        }
    }

    fn target_name<'a>(&self, entry: &'a ManifestEntry) -> &'a str {
        strip_archive_suffix(&entry.path, &self.archive_suffix)
    }

    /// Only the entry at the configured relative path counts; same-named
    /// files elsewhere are ordinary entries.
    fn is_descriptor(&self, entry: &ManifestEntry) -> bool {
        normalized_relative(self.target_name(entry)) == self.container_descriptor
    }

    fn is_member(&self, entry: &ManifestEntry) -> bool {
        let target = normalized_relative(self.target_name(entry));
        parent_of(&target) == self.container_dir
            && file_name_of(&target).starts_with(&self.container_member_prefix)
    }

    fn target_path(&self, entry: &ManifestEntry) -> Option<PathBuf> {
        match resolve_entry_path(&self.root, self.target_name(entry)) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::warn!("{}", err);
                None
            }
        }
    }

    fn check_exists(&self, entry: &ManifestEntry) -> LocalState {
        match self.target_path(entry) {
            Some(path) if path.is_file() => LocalState::Current,
            _ => LocalState::Missing,
        }
    }

    fn check(&self, entry: &ManifestEntry) -> LocalState {
        let Some(path) = self.target_path(entry) else {
            return LocalState::Missing;
        };
        if !path.is_file() {
            return LocalState::Missing;
        }
        match digest::digest_for(&path, &entry.expected_digest) {
            Ok(actual) if digest::digests_match(&entry.expected_digest, &actual) => {
                LocalState::Current
            }
            Ok(actual) => {
                tracing::debug!(
                    "digest mismatch for {}: expected {}, got {}",
                    entry.path,
                    entry.expected_digest,
                    actual
                );
                remove_file_logged(&path);
                LocalState::Outdated
            }
            Err(err) => {
                tracing::warn!("couldn't hash {}: {}", path.display(), err);
                LocalState::Unreadable
            }
        }
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}
