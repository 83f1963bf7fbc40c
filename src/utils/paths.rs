use std::path::{Component, Path, PathBuf};

use crate::errors::{LauncherError, Result};

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

fn env_dir(key: &str) -> Option<PathBuf> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    ensure_dir(&PathBuf::from(trimmed))
}

/// The installation root: `LAUNCHER_ROOT_DIR`, else the directory holding the
/// launcher executable, else the working directory.
pub fn resolve_root_dir() -> PathBuf {
    if let Some(dir) = env_dir("LAUNCHER_ROOT_DIR") {
        return dir;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if !dir.as_os_str().is_empty() {
                return dir.to_path_buf();
            }
        }
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

pub fn resolve_log_dir(root: &Path) -> PathBuf {
    if let Some(dir) = env_dir("LAUNCHER_LOG_DIR") {
        return dir;
    }

    let root_logs = root.join("logs");
    if let Some(found) = ensure_dir(&root_logs) {
        return found;
    }

    std::env::temp_dir().join("patch-launcher-logs")
}

pub fn is_safe_relative_path(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }
    path.components().all(|component| {
        !matches!(
            component,
            Component::Prefix(_) | Component::RootDir | Component::ParentDir
        )
    })
}

/// Joins a manifest path onto the root, refusing anything that would land
/// outside of it. Backslashes are treated as separators.
pub fn resolve_entry_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let normalized = relative.trim().replace('\\', "/");
    let trimmed = normalized.trim_start_matches("./");
    let candidate = Path::new(trimmed);
    if !is_safe_relative_path(candidate) {
        return Err(LauncherError::UnsafePath(relative.to_string()));
    }
    Ok(root.join(candidate))
}

/// Manifest path with the archive suffix removed, if present.
pub fn strip_archive_suffix<'a>(path: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() {
        return path;
    }
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(&suffix.to_ascii_lowercase()) {
        &path[..path.len() - suffix.len()]
    } else {
        path
    }
}

pub fn has_archive_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(&suffix.to_ascii_lowercase())
        })
        .unwrap_or(false)
}

pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Forward-slash form used for directive prefix matching.
pub fn normalized_relative(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches("./").to_ascii_lowercase()
}
