use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Extraction of {} failed{}: {message}", .archive.display(), exit_suffix(.code))]
    Extraction {
        archive: PathBuf,
        code: Option<i32>,
        message: String,
    },
    #[error("Couldn't obtain the extraction tool after {attempts} attempts")]
    ToolUnavailable { attempts: usize },
    #[error("Client identity is unavailable; the full game download is not authorized")]
    IdentityUnavailable,
    #[error("Integrity check failed for {path}: expected {expected}, got {actual}")]
    Integrity {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("Unsafe manifest path: {0}")]
    UnsafePath(String),
    #[error("Not enough disk space: required {required} bytes, available {available} bytes")]
    InsufficientSpace { required: u64, available: u64 },
    #[error("Config error: {0}")]
    Config(String),
}

impl LauncherError {
    /// Errors that leave the installation unusable; the process should stop
    /// instead of carrying on to launch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LauncherError::ToolUnavailable { .. }
                | LauncherError::IdentityUnavailable
                | LauncherError::Integrity { .. }
                | LauncherError::InsufficientSpace { .. }
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, LauncherError::Network(_) | LauncherError::Http(_))
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    code.map(|value| format!(" (exit code {value})"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, LauncherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_fatal_errors() {
        assert!(LauncherError::ToolUnavailable { attempts: 10 }.is_fatal());
        assert!(LauncherError::IdentityUnavailable.is_fatal());
        assert!(!LauncherError::Http("HTTP 404".to_string()).is_fatal());
        assert!(LauncherError::Http("HTTP 500".to_string()).is_transport());
    }

    #[test]
    fn extraction_message_carries_exit_code() {
        let err = LauncherError::Extraction {
            archive: PathBuf::from("csgo/pak01_003.vpk.7z"),
            code: Some(2),
            message: "tool reported a fatal error".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("exit code 2"), "{text}");
        assert!(text.contains("pak01_003.vpk.7z"), "{text}");
    }
}
