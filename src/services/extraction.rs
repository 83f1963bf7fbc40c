use std::fs::File;
use std::io;
#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zip::ZipArchive;

use crate::config::{DirectiveRule, LauncherConfig};
use crate::errors::{LauncherError, Result};
use crate::services::download_manager::stream_to_file;
use crate::utils::file::{remove_file_logged, walk_files};
use crate::utils::paths::{normalized_relative, strip_archive_suffix};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;
const OUTPUT_SNIPPET_CHARS: usize = 400;

#[inline]
fn hide_console_window(command: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        command.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = command;
    }
}

/// Unpacks `archive` into `target` using the bootstrapped tool at `tool`.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, tool: &Path, archive: &Path, target: &Path) -> Result<()>;
}

/// Runs the 7-Zip command line tool: `x -y -o<target> <archive>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SevenZipCli;

impl ArchiveExtractor for SevenZipCli {
    fn extract(&self, tool: &Path, archive: &Path, target: &Path) -> Result<()> {
        let mut command = Command::new(tool);
        command
            .arg("x")
            .arg("-y")
            .arg(format!("-o{}", target.display()))
            .arg(archive)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        hide_console_window(&mut command);

        let output = command.output().map_err(|err| LauncherError::Extraction {
            archive: archive.to_path_buf(),
            code: None,
            message: format!("couldn't start {}: {}", tool.display(), err),
        })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = trim_output_snippet(&output.stderr);
        let message = if stderr.is_empty() {
            trim_output_snippet(&output.stdout)
        } else {
            stderr
        };
        Err(LauncherError::Extraction {
            archive: archive.to_path_buf(),
            code: output.status.code(),
            message,
        })
    }
}

fn trim_output_snippet(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    trimmed.chars().take(OUTPUT_SNIPPET_CHARS).collect()
}

struct ExtractionInner {
    root: PathBuf,
    client: reqwest::Client,
    tool_file_name: String,
    mirrors: Vec<String>,
    max_attempts: usize,
    retry_delay: Duration,
    archive_suffix: String,
    rules: Vec<DirectiveRule>,
    extractor: Arc<dyn ArchiveExtractor>,
    tool: tokio::sync::Mutex<Option<PathBuf>>,
    directives: Mutex<Vec<String>>,
}

/// Bootstraps the extraction tool, unpacks archives in place and collects
/// the launch directives that extracted content calls for.
#[derive(Clone)]
pub struct ExtractionService {
    inner: Arc<ExtractionInner>,
}

impl ExtractionService {
    pub fn new(root: impl Into<PathBuf>, client: reqwest::Client, config: &LauncherConfig) -> Self {
        Self::with_extractor(root, client, config, Arc::new(SevenZipCli))
    }

    pub fn with_extractor(
        root: impl Into<PathBuf>,
        client: reqwest::Client,
        config: &LauncherConfig,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            inner: Arc::new(ExtractionInner {
                root: root.into(),
                client,
                tool_file_name: config.tool_file_name.clone(),
                mirrors: config.tool_mirrors.clone(),
                max_attempts: config.tool_max_attempts,
                retry_delay: config.tool_retry_delay,
                archive_suffix: config.archive_suffix.clone(),
                rules: config.directive_rules.clone(),
                extractor,
                tool: tokio::sync::Mutex::new(None),
                directives: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn tool_path(&self) -> PathBuf {
        self.inner.root.join(&self.inner.tool_file_name)
    }

    pub fn archive_suffix(&self) -> &str {
        &self.inner.archive_suffix
    }

    /// Makes sure the tool is on disk, downloading it if needed. Concurrent
    /// callers wait for a single acquisition.
    pub async fn ensure_tool(&self) -> Result<PathBuf> {
        let mut slot = self.inner.tool.lock().await;
        if let Some(path) = slot.as_ref() {
            if path.is_file() {
                return Ok(path.clone());
            }
        }
        let path = self.tool_path();
        if !path.is_file() {
            self.acquire_tool(&path).await?;
        }
        *slot = Some(path.clone());
        Ok(path)
    }

    async fn acquire_tool(&self, path: &Path) -> Result<()> {
        let inner = &self.inner;
        let attempts = inner.max_attempts.max(1);
        if inner.mirrors.is_empty() {
            return Err(LauncherError::ToolUnavailable { attempts: 0 });
        }

        for attempt in 0..attempts {
            let mirror = &inner.mirrors[attempt % inner.mirrors.len()];
            tracing::info!(
                "downloading {} from {} (attempt {}/{})",
                inner.tool_file_name,
                mirror,
                attempt + 1,
                attempts
            );
            match self.download_tool(mirror, path).await {
                Ok(()) => {
                    tracing::info!("extraction tool ready at {}", path.display());
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!("couldn't download extraction tool from {}: {}", mirror, err);
                    remove_file_logged(path);
                    if attempt + 1 < attempts && !inner.retry_delay.is_zero() {
                        tokio::time::sleep(inner.retry_delay).await;
                    }
                }
            }
        }

        Err(LauncherError::ToolUnavailable { attempts })
    }

    async fn download_tool(&self, mirror: &str, path: &Path) -> Result<()> {
        if !mirror.to_ascii_lowercase().ends_with(".zip") {
            stream_to_file(&self.inner.client, mirror, path).await?;
            return mark_executable(path);
        }

        let zip_path = path.with_extension("download.zip");
        stream_to_file(&self.inner.client, mirror, &zip_path).await?;
        let tool_name = self.inner.tool_file_name.clone();
        let target = path.to_path_buf();
        let archive = zip_path.clone();
        let unpacked =
            tokio::task::spawn_blocking(move || unpack_tool(&archive, &tool_name, &target))
                .await
                .map_err(|err| LauncherError::Config(err.to_string()))?;
        remove_file_logged(&zip_path);
        unpacked?;
        mark_executable(path)
    }

    /// Extracts an archive next to itself.
    pub async fn extract(&self, archive: &Path) -> Result<()> {
        let target = archive
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.inner.root.clone());
        self.extract_to(archive, &target).await
    }

    /// Extracts `archive` into `target`, registers any matching launch
    /// directives, then deletes the archive.
    pub async fn extract_to(&self, archive: &Path, target: &Path) -> Result<()> {
        let tool = self.ensure_tool().await?;
        tracing::info!("extracting {} into {}", archive.display(), target.display());

        let extractor = Arc::clone(&self.inner.extractor);
        let archive_path = archive.to_path_buf();
        let target_path = target.to_path_buf();
        tokio::task::spawn_blocking(move || {
            extractor.extract(&tool, &archive_path, &target_path)
        })
        .await
        .map_err(|err| LauncherError::Config(err.to_string()))??;

        self.register_directives_for(archive);
        remove_file_logged(archive);
        Ok(())
    }

    fn register_directives_for(&self, archive: &Path) {
        let relative = archive
            .strip_prefix(&self.inner.root)
            .unwrap_or(archive)
            .to_string_lossy()
            .to_string();
        let extracted = normalized_relative(strip_archive_suffix(
            &relative,
            &self.inner.archive_suffix,
        ));
        for rule in &self.inner.rules {
            if extracted.starts_with(&normalized_relative(&rule.path_prefix)) {
                self.register_directive(&rule.directive);
            }
        }
    }

    pub fn register_directive(&self, directive: &str) {
        let directive = directive.trim().to_ascii_lowercase();
        if directive.is_empty() {
            return;
        }
        let mut directives = self.lock_directives();
        if !directives.contains(&directive) {
            tracing::debug!("registered launch directive {}", directive);
            directives.push(directive);
        }
    }

    pub fn directives(&self) -> Vec<String> {
        self.lock_directives().clone()
    }

    fn lock_directives(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        match self.inner.directives.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Removes leftover archives, partial downloads and the tool below the
    /// root. Split-archive volumes are kept so a full install can resume.
    /// Returns the number of files removed.
    pub fn cleanup_archives(&self) -> usize {
        let suffix = self.inner.archive_suffix.to_ascii_lowercase();
        let partial_suffix = format!("{suffix}.part");
        let tool_path = self.tool_path();
        let mut removed = 0;
        for path in walk_files(&self.inner.root) {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            let leftover = name.ends_with(&suffix) || name.ends_with(&partial_suffix);
            if (leftover || path == tool_path) && remove_file_logged(&path) {
                tracing::debug!("removed leftover {}", path.display());
                removed += 1;
            }
        }
        removed
    }

    /// Deletes the bootstrapped tool; it is fetched again when next needed.
    pub fn remove_tool(&self) -> bool {
        remove_file_logged(&self.tool_path())
    }
}

fn unpack_tool(archive_path: &Path, tool_name: &str, target: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| LauncherError::Config(err.to_string()))?;

    let mut chosen = None;
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|err| LauncherError::Config(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().replace('\\', "/");
        let file_name = name.rsplit('/').next().unwrap_or(&name).to_string();
        if file_name.eq_ignore_ascii_case(tool_name) {
            chosen = Some(index);
            break;
        }
    }

    let index = chosen.ok_or_else(|| {
        LauncherError::Config(format!(
            "{} does not contain {}",
            archive_path.display(),
            tool_name
        ))
    })?;
    let mut entry = archive
        .by_index(index)
        .map_err(|err| LauncherError::Config(err.to_string()))?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = File::create(target)?;
    io::copy(&mut entry, &mut out)?;
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
