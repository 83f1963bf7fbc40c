use std::path::PathBuf;
use std::process::{Child, Command};

use crate::cli::is_launcher_flag;
use crate::errors::{LauncherError, Result};

#[derive(Clone, Debug)]
pub struct RunningGame {
    pub executable: PathBuf,
    pub pid: u32,
    pub arguments: Vec<String>,
}

/// Game arguments: the launcher's passthrough arguments without launcher
/// flags or `*.exe` tokens, lowercased, followed by the launch directives.
pub fn build_game_arguments(passthrough: &[String], directives: &[String]) -> Vec<String> {
    let mut arguments: Vec<String> = passthrough
        .iter()
        .filter(|arg| !is_launcher_flag(arg))
        .filter(|arg| !arg.to_ascii_lowercase().ends_with(".exe"))
        .map(|arg| arg.to_ascii_lowercase())
        .collect();
    for directive in directives {
        let directive = directive.to_ascii_lowercase();
        if !arguments.contains(&directive) {
            arguments.push(directive);
        }
    }
    arguments
}

#[derive(Clone, Debug)]
pub struct GameRuntimeService {
    root: PathBuf,
    executable: String,
}

impl GameRuntimeService {
    pub fn new(root: impl Into<PathBuf>, executable: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            executable: executable.into(),
        }
    }

    pub fn executable_path(&self) -> PathBuf {
        self.root.join(&self.executable)
    }

    /// Starts the game from the install root. Monitoring is left to the caller.
    pub fn launch(&self, arguments: &[String]) -> Result<(RunningGame, Child)> {
        let executable = self.executable_path();
        if !executable.is_file() {
            return Err(LauncherError::Config(format!(
                "{} not found in {}",
                self.executable,
                self.root.display()
            )));
        }
        let child = Command::new(&executable)
            .args(arguments)
            .current_dir(&self.root)
            .spawn()?;
        let running = RunningGame {
            executable,
            pid: child.id(),
            arguments: arguments.to_vec(),
        };
        tracing::info!("launched {} (pid {})", running.executable.display(), running.pid);
        Ok((running, child))
    }
}
