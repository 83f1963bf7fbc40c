pub mod api_client;
pub mod download_manager;
pub mod extraction;
pub mod full_install;
pub mod game_runtime_service;
pub mod manifest_service;
pub mod patch_batch;
pub mod patch_planner;
pub mod update_service;

pub use api_client::{transfer_client, ApiClient};
pub use download_manager::DownloadManager;
pub use extraction::{ArchiveExtractor, ExtractionService, SevenZipCli};
pub use full_install::{FullInstallReport, FullInstaller};
pub use game_runtime_service::{build_game_arguments, GameRuntimeService, RunningGame};
pub use manifest_service::ManifestService;
pub use patch_batch::PatchBatch;
pub use patch_planner::PatchPlanner;
pub use update_service::UpdateService;
