pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod progress;
pub mod services;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::LauncherConfig;
pub use errors::{LauncherError, Result};
