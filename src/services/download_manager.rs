use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::config::LauncherConfig;
use crate::errors::{LauncherError, Result};
use crate::models::{TransferPhase, TransferProgress};
use crate::services::ExtractionService;
use crate::utils::file::remove_file_logged;
use crate::utils::paths::has_archive_suffix;

const PART_SUFFIX: &str = "part";
const REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Fetches one remote file to a local path. Archives are extracted before
/// [`fetch`](Self::fetch) returns.
#[derive(Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    extraction: ExtractionService,
    chunk_count: usize,
    min_chunked_bytes: u64,
}

#[derive(Clone, Copy, Debug)]
struct RemoteInfo {
    length: Option<u64>,
    ranges: bool,
}

enum ChunkResult {
    Progress { bytes: u64 },
    Done,
    Error { error: LauncherError },
}

#[derive(Clone, Copy, Debug)]
struct ChunkJob {
    index: usize,
    start: u64,
    end: u64,
}

impl ChunkJob {
    fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

struct ProgressReporter {
    started: Instant,
    last_sent: Option<Instant>,
    downloaded: u64,
    total: u64,
}

impl ProgressReporter {
    fn new(total: u64) -> Self {
        Self {
            started: Instant::now(),
            last_sent: None,
            downloaded: 0,
            total,
        }
    }

    fn snapshot(&self, phase: TransferPhase) -> TransferProgress {
        let percent = if self.total == 0 {
            0.0
        } else {
            ((self.downloaded as f64 / self.total as f64) * 100.0).clamp(0.0, 100.0)
        };
        let elapsed = self.started.elapsed().as_secs_f64();
        let speed_bps = if elapsed > 0.0 {
            self.downloaded as f64 / elapsed
        } else {
            0.0
        };
        TransferProgress {
            downloaded_bytes: self.downloaded,
            total_bytes: self.total,
            percent,
            speed_bps,
            phase,
        }
    }

    fn add_bytes<F: FnMut(TransferProgress)>(&mut self, bytes: u64, on_progress: &mut F) {
        self.downloaded = self.downloaded.saturating_add(bytes);
        let now = Instant::now();
        let due = self
            .last_sent
            .map(|last| now.duration_since(last) >= REPORT_INTERVAL)
            .unwrap_or(true);
        if due {
            self.last_sent = Some(now);
            on_progress(self.snapshot(TransferPhase::Downloading));
        }
    }

    fn finish<F: FnMut(TransferProgress)>(&mut self, on_progress: &mut F) {
        if self.total < self.downloaded {
            self.total = self.downloaded;
        }
        on_progress(self.snapshot(TransferPhase::Downloading));
    }
}

impl DownloadManager {
    pub fn new(client: reqwest::Client, extraction: ExtractionService, config: &LauncherConfig) -> Self {
        Self {
            client,
            extraction,
            chunk_count: config.chunk_count.max(1),
            min_chunked_bytes: config.min_chunked_bytes,
        }
    }

    pub fn extraction(&self) -> &ExtractionService {
        &self.extraction
    }

    /// Downloads `url` to `destination`. Byte counts passed to `on_progress`
    /// never decrease. No retries happen here.
    pub async fn fetch<F>(&self, url: &str, destination: &Path, on_progress: F) -> Result<()>
    where
        F: FnMut(TransferProgress) + Send,
    {
        self.transfer(url, destination, true, on_progress).await
    }

    /// Like [`fetch`](Self::fetch), but archives are left untouched.
    pub async fn fetch_raw<F>(&self, url: &str, destination: &Path, on_progress: F) -> Result<()>
    where
        F: FnMut(TransferProgress) + Send,
    {
        self.transfer(url, destination, false, on_progress).await
    }

    async fn transfer<F>(
        &self,
        url: &str,
        destination: &Path,
        extract: bool,
        mut on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(TransferProgress) + Send,
    {
        let is_archive =
            extract && has_archive_suffix(destination, self.extraction.archive_suffix());
        if is_archive && destination.exists() {
            tracing::debug!("removing stale archive {}", destination.display());
            remove_file_logged(destination);
        }
        let part_path = part_path_for(destination);
        if part_path.exists() {
            remove_file_logged(&part_path);
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let remote = self.remote_info(url).await;
        let chunked = remote.ranges
            && self.chunk_count > 1
            && remote
                .length
                .map(|length| length >= self.min_chunked_bytes.max(self.chunk_count as u64))
                .unwrap_or(false);

        let mut reporter = ProgressReporter::new(remote.length.unwrap_or(0));
        let result = match (chunked, remote.length) {
            (true, Some(length)) => {
                self.fetch_chunked(url, &part_path, length, &mut reporter, &mut on_progress)
                    .await
            }
            _ => {
                stream_body(
                    &self.client,
                    url,
                    &part_path,
                    &mut reporter,
                    &mut on_progress,
                )
                .await
            }
        };
        if let Err(err) = result {
            remove_file_logged(&part_path);
            return Err(err);
        }

        finalize(&part_path, destination).await?;
        reporter.finish(&mut on_progress);
        tracing::debug!("downloaded {} -> {}", url, destination.display());

        if is_archive {
            on_progress(reporter.snapshot(TransferPhase::Extracting));
            self.extraction.extract(destination).await?;
        }
        Ok(())
    }

    async fn remote_info(&self, url: &str) -> RemoteInfo {
        let response = match self.client.head(url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!("HEAD {} returned {}", url, response.status());
                return RemoteInfo {
                    length: None,
                    ranges: false,
                };
            }
            Err(err) => {
                tracing::debug!("HEAD {} failed: {}", url, err);
                return RemoteInfo {
                    length: None,
                    ranges: false,
                };
            }
        };
        let headers = response.headers();
        let length = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);
        RemoteInfo { length, ranges }
    }

    async fn fetch_chunked<F>(
        &self,
        url: &str,
        part_path: &Path,
        length: u64,
        reporter: &mut ProgressReporter,
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(TransferProgress) + Send,
    {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(part_path)
            .await?;
        file.set_len(length).await?;
        drop(file);

        let jobs = plan_chunks(length, self.chunk_count);
        tracing::debug!("fetching {} in {} ranged chunks", url, jobs.len());
        let (tx, mut rx) = mpsc::channel::<ChunkResult>(256);
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs.iter().copied() {
            let tx = tx.clone();
            let client = self.client.clone();
            let url = url.to_string();
            let path = part_path.to_path_buf();
            handles.push(tokio::spawn(async move {
                let outcome = download_chunk(&client, &url, &path, job, &tx).await;
                let message = match outcome {
                    Ok(()) => ChunkResult::Done,
                    Err(error) => ChunkResult::Error { error },
                };
                let _ = tx.send(message).await;
            }));
        }
        drop(tx);

        let mut done = 0;
        let mut failure = None;
        while let Some(message) = rx.recv().await {
            match message {
                ChunkResult::Progress { bytes } => reporter.add_bytes(bytes, on_progress),
                ChunkResult::Done => done += 1,
                ChunkResult::Error { error } => {
                    failure = Some(error);
                    for handle in &handles {
                        handle.abort();
                    }
                    break;
                }
            }
        }

        if let Some(error) = failure {
            return Err(error);
        }
        if done != jobs.len() {
            return Err(LauncherError::Http(format!(
                "only {done} of {} chunks finished for {url}",
                jobs.len()
            )));
        }
        Ok(())
    }
}

/// Splits `length` bytes into at most `count` contiguous inclusive ranges.
fn plan_chunks(length: u64, count: usize) -> Vec<ChunkJob> {
    if length == 0 {
        return Vec::new();
    }
    let count = (count.max(1) as u64).min(length);
    let size = (length + count - 1) / count;
    let mut jobs = Vec::with_capacity(count as usize);
    let mut start = 0;
    while start < length {
        let end = (start + size).min(length) - 1;
        jobs.push(ChunkJob {
            index: jobs.len(),
            start,
            end,
        });
        start = end + 1;
    }
    jobs
}

async fn download_chunk(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    job: ChunkJob,
    progress_tx: &mpsc::Sender<ChunkResult>,
) -> Result<()> {
    let response = client
        .get(url)
        .header(RANGE, format!("bytes={}-{}", job.start, job.end))
        .send()
        .await?;
    if response.status() != StatusCode::PARTIAL_CONTENT {
        return Err(LauncherError::Http(format!(
            "HTTP {} for chunk {} of {}",
            response.status().as_u16(),
            job.index,
            url
        )));
    }

    let mut file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.seek(std::io::SeekFrom::Start(job.start)).await?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(next) = stream.next().await {
        let bytes = next?;
        let room = job.len().saturating_sub(written);
        let take = (bytes.len() as u64).min(room) as usize;
        if take == 0 {
            break;
        }
        file.write_all(&bytes[..take]).await?;
        written += take as u64;
        let _ = progress_tx
            .send(ChunkResult::Progress {
                bytes: take as u64,
            })
            .await;
    }
    file.flush().await?;

    if written != job.len() {
        return Err(LauncherError::Http(format!(
            "chunk {} of {} ended after {} of {} bytes",
            job.index,
            url,
            written,
            job.len()
        )));
    }
    Ok(())
}

async fn stream_body<F>(
    client: &reqwest::Client,
    url: &str,
    part_path: &Path,
    reporter: &mut ProgressReporter,
    on_progress: &mut F,
) -> Result<()>
where
    F: FnMut(TransferProgress) + Send,
{
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(LauncherError::Http(format!(
            "HTTP {} for {}",
            response.status().as_u16(),
            url
        )));
    }
    if let Some(length) = response.content_length() {
        reporter.total = length;
    }
    let expected = response.content_length();

    let mut file = tokio::fs::File::create(part_path).await?;
    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(next) = stream.next().await {
        let bytes = next?;
        file.write_all(&bytes).await?;
        written += bytes.len() as u64;
        reporter.add_bytes(bytes.len() as u64, on_progress);
    }
    file.flush().await?;

    if let Some(expected) = expected {
        if written != expected {
            return Err(LauncherError::Http(format!(
                "{url} ended after {written} of {expected} bytes"
            )));
        }
    }
    Ok(())
}

/// Single streamed GET into `<destination>.part`, renamed into place.
pub(crate) async fn stream_to_file(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let part_path = part_path_for(destination);
    let mut reporter = ProgressReporter::new(0);
    let mut ignore = |_: TransferProgress| {};
    if let Err(err) = stream_body(client, url, &part_path, &mut reporter, &mut ignore).await {
        remove_file_logged(&part_path);
        return Err(err);
    }
    finalize(&part_path, destination).await?;
    Ok(reporter.downloaded)
}

fn part_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PART_SUFFIX);
    destination.with_file_name(name)
}

async fn finalize(part_path: &Path, destination: &Path) -> Result<()> {
    if destination.exists() {
        tokio::fs::remove_file(destination).await?;
    }
    tokio::fs::rename(part_path, destination).await?;
    Ok(())
}
