use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};

use patch_launcher::cli::Cli;
use patch_launcher::config::LauncherConfig;
use patch_launcher::errors::{LauncherError, Result};
use patch_launcher::logging;
use patch_launcher::models::{BatchResult, ManifestView, Plan, ProgressEvent};
use patch_launcher::progress::StatusLine;
use patch_launcher::services::{
    build_game_arguments, transfer_client, ApiClient, DownloadManager, ExtractionService,
    FullInstaller, GameRuntimeService, ManifestService, PatchBatch, PatchPlanner, UpdateService,
};
use patch_launcher::utils::file::format_bytes;
use patch_launcher::utils::paths::{resolve_log_dir, resolve_root_dir};

struct Launcher {
    cli: Cli,
    root: PathBuf,
    manifests: ManifestService,
    planner: PatchPlanner,
    batch: PatchBatch,
    extraction: ExtractionService,
    installer: FullInstaller,
    updates: UpdateService,
    runtime: GameRuntimeService,
}

impl Launcher {
    fn new(cli: Cli, root: PathBuf, config: &LauncherConfig) -> Self {
        let client = transfer_client(config);
        let manifests = ManifestService::new(ApiClient::new(config.api_base_url.clone(), config));
        let extraction = ExtractionService::new(&root, client.clone(), config);
        let downloads = DownloadManager::new(client.clone(), extraction.clone(), config);
        Self {
            planner: PatchPlanner::new(&root, config),
            batch: PatchBatch::new(&root, downloads.clone(), config),
            installer: FullInstaller::new(&root, manifests.clone(), downloads, config),
            updates: UpdateService::new(&root, client, config),
            runtime: GameRuntimeService::new(&root, config.game_executable.clone()),
            manifests,
            extraction,
            root,
            cli,
        }
    }

    async fn run(&self) -> Result<()> {
        let swept = self.extraction.cleanup_archives();
        if swept > 0 {
            tracing::info!("removed {} leftover archive files", swept);
        }
        self.updates.remove_stale_updater();

        if !self.cli.skip_updates && self.start_updater_if_outdated().await? {
            return Ok(());
        }

        if !self.installer.is_installed() {
            self.install_game().await?;
        }

        if !self.cli.skip_validating {
            self.validate_installation().await?;
        }
        self.extraction.remove_tool();

        if self.cli.patch_only {
            println!("{}", style("Patching finished.").green());
            return Ok(());
        }

        self.extraction.cleanup_archives();
        self.launch_game().await
    }

    /// True when the updater took over and the launcher should exit.
    async fn start_updater_if_outdated(&self) -> Result<bool> {
        let Some(version) = self.updates.available_update().await else {
            return Ok(false);
        };
        println!("Found new version {}. Downloading updater...", style(&version).cyan());
        tracing::info!("launcher update available: {}", version);

        self.updates.download_updater().await?;
        self.updates
            .spawn_updater(&version, &self.cli.forwarded_flags())?;
        Ok(true)
    }

    async fn install_game(&self) -> Result<()> {
        if self.installer.has_partial_install() {
            println!("Resuming the interrupted game download.");
        } else {
            if !confirm_install(&self.root)? {
                return Err(LauncherError::Config(
                    "game files are required to play".to_string(),
                ));
            }
            self.installer.ensure_free_space()?;
        }

        let bar = status_bar();
        let mut status = StatusLine::new();
        let progress = bar.clone();
        let report = self
            .installer
            .install(self.cli.client_id.as_deref(), move |event: ProgressEvent| {
                progress.set_message(status.render(&event));
            })
            .await;
        bar.finish_and_clear();

        let report = report?;
        println!(
            "Installed game files: {} downloaded, {} reused, {} files placed.",
            report.downloaded, report.reused, report.relocated
        );
        Ok(())
    }

    async fn validate_installation(&self) -> Result<()> {
        let mut offset = 0;

        if self.cli.validate_all {
            let fetch = self.manifests.fetch(ManifestView::FullGame).await;
            if fetch.success {
                let plan = self.planner.plan_fetch(fetch, true).await?;
                let result = self.run_batch(&plan, true, offset).await?;
                report_batch("game files", &result);
                offset += plan.len();
            } else {
                eprintln!("{}", style("Couldn't fetch the game file list.").red());
            }
        }

        let fetch = self.manifests.fetch(ManifestView::Patch).await;
        if !fetch.success {
            if self.cli.patch_only {
                return Err(LauncherError::Http(
                    "patch list is unavailable".to_string(),
                ));
            }
            println!(
                "{}",
                style("Couldn't fetch the patch list, launching anyway.").yellow()
            );
            return Ok(());
        }

        let plan = self
            .planner
            .plan_fetch(fetch, self.cli.validate_all)
            .await?;
        if plan.is_synchronized() && offset == 0 {
            tracing::info!("installation is up to date");
            return Ok(());
        }
        let result = self.run_batch(&plan, false, offset).await?;
        report_batch("patches", &result);
        Ok(())
    }

    async fn run_batch(
        &self,
        plan: &Plan,
        game_files: bool,
        offset: usize,
    ) -> Result<BatchResult> {
        let bar = status_bar();
        let mut status = StatusLine::new();
        let progress = bar.clone();
        let result = self
            .batch
            .run(plan, game_files, offset, move |event: ProgressEvent| {
                progress.set_message(status.render(&event));
            })
            .await;
        bar.finish_and_clear();
        result
    }

    async fn launch_game(&self) -> Result<()> {
        let arguments = build_game_arguments(&self.cli.game_args, &self.extraction.directives());
        tracing::info!("launching game with {:?}", arguments);
        let (running, mut child) = self.runtime.launch(&arguments)?;
        println!("{} (pid {})", style("Game started").green(), running.pid);

        if self.cli.disable_rpc {
            return Ok(());
        }
        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .map_err(|err| LauncherError::Config(format!("game watcher failed: {err}")))??;
        tracing::info!("game exited with {}", status);
        Ok(())
    }
}

fn status_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{msg}") {
        bar.set_style(spinner_style);
    }
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn confirm_install(root: &Path) -> Result<bool> {
    let term = Term::stdout();
    term.write_line(&format!(
        "Game files were not found in {}. Download them now? (y/n)",
        root.display()
    ))?;
    let answer = term.read_line()?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn report_batch(label: &str, result: &BatchResult) {
    if result.failed > 0 {
        println!(
            "{}",
            style(format!(
                "Updated {}: {} failed, see the log for details.",
                label, result.failed
            ))
            .yellow()
        );
    } else {
        println!("Updated {}: {}/{}.", label, result.completed, result.total);
    }
}

fn report_fatal(err: &LauncherError, delay: Duration) {
    tracing::error!("{}", err);
    eprintln!("{} {}", style("error:").red().bold(), err);
    if let LauncherError::InsufficientSpace { required, available } = err {
        eprintln!(
            "Free at least {} on this drive ({} available).",
            format_bytes(*required),
            format_bytes(*available)
        );
    }
    if !delay.is_zero() {
        eprintln!("Closing in {} seconds.", delay.as_secs());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = LauncherConfig::from_env();
    let root = resolve_root_dir();

    if let Err(err) = logging::init(&resolve_log_dir(&root), cli.debug_mode) {
        eprintln!("failed to initialize logging: {err}");
    }
    tracing::info!(
        "patch-launcher {} starting in {}",
        env!("CARGO_PKG_VERSION"),
        root.display()
    );

    let launcher = Launcher::new(cli, root, &config);
    match launcher.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_fatal(&err, config.fatal_exit_delay);
            tokio::time::sleep(config.fatal_exit_delay).await;
            ExitCode::FAILURE
        }
    }
}
