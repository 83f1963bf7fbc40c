use clap::Parser;

/// Flags the launcher consumes itself; never forwarded to the game.
pub const LAUNCHER_FLAGS: &[&str] = &[
    "--skip-updates",
    "--skip-validating",
    "--validate-all",
    "--patch-only",
    "--disable-rpc",
    "--debug-mode",
];

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "patch-launcher", version, about = "Keeps the game installation patched, then launches it")]
pub struct Cli {
    /// Do not check for a newer launcher release.
    #[arg(long, env = "LAUNCHER_ARG_SKIP_UPDATES")]
    pub skip_updates: bool,

    /// Skip validating game files against the manifest.
    #[arg(long, env = "LAUNCHER_ARG_SKIP_VALIDATING")]
    pub skip_validating: bool,

    /// Validate every file, including container members.
    #[arg(long, env = "LAUNCHER_ARG_VALIDATE_ALL")]
    pub validate_all: bool,

    /// Patch the installation and exit without launching.
    #[arg(long, env = "LAUNCHER_ARG_PATCH_ONLY")]
    pub patch_only: bool,

    #[arg(long, env = "LAUNCHER_ARG_DISABLE_RPC")]
    pub disable_rpc: bool,

    /// Verbose diagnostics on stderr and in the log file.
    #[arg(long, env = "LAUNCHER_ARG_DEBUG_MODE")]
    pub debug_mode: bool,

    /// Identity required for the full game download.
    #[arg(long, env = "LAUNCHER_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Arguments forwarded to the game.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub game_args: Vec<String>,
}

impl Cli {
    /// Launcher flags as they appeared, for re-spawning through the updater.
    pub fn forwarded_flags(&self) -> Vec<String> {
        let enabled = [
            self.skip_updates,
            self.skip_validating,
            self.validate_all,
            self.patch_only,
            self.disable_rpc,
            self.debug_mode,
        ];
        let mut out: Vec<String> = LAUNCHER_FLAGS
            .iter()
            .zip(enabled)
            .filter(|(_, on)| *on)
            .map(|(flag, _)| flag.to_string())
            .collect();
        out.extend(self.game_args.iter().cloned());
        out
    }
}

pub fn is_launcher_flag(arg: &str) -> bool {
    let lower = arg.trim().to_ascii_lowercase();
    LAUNCHER_FLAGS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_passthrough_arguments() {
        let cli = Cli::try_parse_from([
            "patch-launcher",
            "--validate-all",
            "--client-id",
            "76561198000000000",
            "-novid",
            "+fps_max",
            "300",
        ])
        .expect("parse");
        assert!(cli.validate_all);
        assert!(!cli.patch_only);
        assert_eq!(cli.client_id.as_deref(), Some("76561198000000000"));
        assert_eq!(cli.game_args, vec!["-novid", "+fps_max", "300"]);
    }

    #[test]
    fn forwarded_flags_keep_enabled_flags_then_game_args() {
        let cli = Cli {
            skip_validating: true,
            debug_mode: true,
            game_args: vec!["-console".to_string()],
            ..Cli::default()
        };
        assert_eq!(
            cli.forwarded_flags(),
            vec!["--skip-validating", "--debug-mode", "-console"]
        );
    }

    #[test]
    fn recognizes_launcher_flags_case_insensitively() {
        assert!(is_launcher_flag("--Patch-Only"));
        assert!(!is_launcher_flag("-novid"));
    }
}
