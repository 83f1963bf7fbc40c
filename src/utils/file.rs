use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sysinfo::Disks;

use crate::errors::{LauncherError, Result};

/// Removes a file if it exists. Failures are logged and swallowed.
pub fn remove_file_logged(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::warn!("failed to delete {}: {}", path.display(), err);
            false
        }
    }
}

pub fn remove_dir_logged(path: &Path) -> bool {
    match fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::warn!("failed to delete directory {}: {}", path.display(), err);
            false
        }
    }
}

/// All regular files below `dir`, depth first. Unreadable directories are
/// skipped with a warning.
pub fn walk_files(dir: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("failed to read directory {}: {}", dir.display(), err);
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => walk(&path, out),
                Ok(kind) if kind.is_file() => out.push(path),
                _ => {}
            }
        }
    }

    let mut out = Vec::new();
    walk(dir, &mut out);
    out
}

/// Files directly inside `dir` whose names end with `suffix`, sorted by name.
pub fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let suffix = suffix.to_ascii_lowercase();
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .filter(|path| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().to_ascii_lowercase().ends_with(&suffix))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    found.sort();
    found
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if to.exists() {
        fs::remove_file(to)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// Moves every file under `source` into `dest`, keeping relative layout.
/// Files named `skip_name` (case-insensitive) are left behind. Returns the
/// number of files moved.
pub fn relocate_tree(source: &Path, dest: &Path, skip_name: Option<&str>) -> Result<usize> {
    let skip = skip_name.map(|name| name.to_ascii_lowercase());
    let mut moved = 0;
    for file in walk_files(source) {
        let relative = file
            .strip_prefix(source)
            .map_err(|err| LauncherError::Config(err.to_string()))?;
        let skipped = match (&skip, file.file_name()) {
            (Some(skip), Some(name)) => name.to_string_lossy().to_ascii_lowercase() == *skip,
            _ => false,
        };
        if skipped {
            tracing::info!("skipping {} during relocation", relative.display());
            continue;
        }
        move_file(&file, &dest.join(relative))?;
        moved += 1;
    }
    Ok(moved)
}

fn nearest_existing_path(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    while !candidate.exists() {
        if !candidate.pop() {
            return PathBuf::from(".");
        }
    }
    candidate
}

pub fn available_disk_space(path: &Path) -> Option<u64> {
    let target = nearest_existing_path(path);
    let target = fs::canonicalize(&target).unwrap_or(target);
    let disks = Disks::new_with_refreshed_list();

    let mut best: Option<(usize, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if target.starts_with(mount) {
            let score = mount.as_os_str().len();
            match best {
                Some((best_score, _)) if best_score >= score => {}
                _ => best = Some((score, disk.available_space())),
            }
        }
    }

    best.map(|(_, available)| available)
}

/// Fails with `InsufficientSpace` when the volume holding `path` has less
/// than `required` bytes free. An unknown volume is not treated as full.
pub fn ensure_free_space(path: &Path, required: u64) -> Result<()> {
    if required == 0 {
        return Ok(());
    }
    match available_disk_space(path) {
        Some(available) if available < required => {
            Err(LauncherError::InsufficientSpace { required, available })
        }
        Some(_) => Ok(()),
        None => {
            tracing::warn!("could not determine free space for {}", path.display());
            Ok(())
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let value = bytes as f64;
    if value >= GB {
        format!("{:.2} GB", value / GB)
    } else if value >= MB {
        format!("{:.0} MB", value / MB)
    } else if value >= KB {
        format!("{:.0} KB", value / KB)
    } else {
        format!("{} B", bytes)
    }
}
