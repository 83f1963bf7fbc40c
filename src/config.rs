use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "https://classiccounter.cc/api";
const DEFAULT_PATCH_HOST: &str = "https://patch.classiccounter.cc";
const DEFAULT_GAME_HOST: &str = "https://game.classiccounter.cc";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_RELEASE_REPO: &str = "ClassicCounter/launcher";
const DEFAULT_UPDATER_URL: &str =
    "https://github.com/ClassicCounter/updater/releases/download/updater/updater.exe";

#[cfg(target_os = "windows")]
const DEFAULT_TOOL_FILE_NAME: &str = "7za.exe";
#[cfg(not(target_os = "windows"))]
const DEFAULT_TOOL_FILE_NAME: &str = "7za";

const DEFAULT_REQUIRED_FREE_BYTES: u64 = 24 * 1024 * 1024 * 1024;

/// A directive appended to the game's argument list once an archive whose
/// extracted path starts with `path_prefix` has been unpacked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectiveRule {
    pub path_prefix: String,
    pub directive: String,
}

#[derive(Clone, Debug)]
pub struct LauncherConfig {
    pub api_base_url: String,
    pub patch_host: String,
    pub game_host: String,
    pub github_api_url: String,
    pub release_repo: String,
    pub updater_url: String,
    pub tool_file_name: String,
    pub tool_mirrors: Vec<String>,
    pub tool_max_attempts: usize,
    pub tool_retry_delay: Duration,
    pub archive_suffix: String,
    pub container_descriptor: String,
    pub container_member_prefix: String,
    pub chunk_count: usize,
    pub min_chunked_bytes: u64,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub required_free_bytes: u64,
    pub full_install_root_dir: Option<String>,
    pub launcher_executable: String,
    pub game_executable: String,
    pub directive_rules: Vec<DirectiveRule>,
    pub fatal_exit_delay: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            patch_host: DEFAULT_PATCH_HOST.to_string(),
            game_host: DEFAULT_GAME_HOST.to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            release_repo: DEFAULT_RELEASE_REPO.to_string(),
            updater_url: DEFAULT_UPDATER_URL.to_string(),
            tool_file_name: DEFAULT_TOOL_FILE_NAME.to_string(),
            tool_mirrors: default_tool_mirrors(DEFAULT_PATCH_HOST, DEFAULT_GAME_HOST),
            tool_max_attempts: 10,
            tool_retry_delay: Duration::from_millis(1000),
            archive_suffix: ".7z".to_string(),
            container_descriptor: "csgo/pak01_dir.vpk".to_string(),
            container_member_prefix: "pak01_".to_string(),
            chunk_count: 4,
            min_chunked_bytes: 4 * 1024 * 1024,
            request_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
            required_free_bytes: DEFAULT_REQUIRED_FREE_BYTES,
            full_install_root_dir: None,
            launcher_executable: current_executable_name(),
            game_executable: "csgo.exe".to_string(),
            directive_rules: vec![DirectiveRule {
                path_prefix: "csgo/sound/".to_string(),
                directive: "+snd_rebuildaudiocache".to_string(),
            }],
            fatal_exit_delay: Duration::from_secs(10),
        }
    }
}

impl LauncherConfig {
    /// Defaults with `LAUNCHER_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = env_string("LAUNCHER_API_BASE_URL") {
            config.api_base_url = value;
        }
        let mut hosts_changed = false;
        if let Some(value) = env_string("LAUNCHER_PATCH_HOST") {
            config.patch_host = value;
            hosts_changed = true;
        }
        if let Some(value) = env_string("LAUNCHER_GAME_HOST") {
            config.game_host = value;
            hosts_changed = true;
        }
        if let Some(value) = env_string("LAUNCHER_GITHUB_API_URL") {
            config.github_api_url = value;
        }
        if let Some(value) = env_string("LAUNCHER_RELEASE_REPO") {
            config.release_repo = value;
        }
        if let Some(value) = env_string("LAUNCHER_UPDATER_URL") {
            config.updater_url = value;
        }
        if let Some(value) = env_string("LAUNCHER_TOOL_FILE_NAME") {
            config.tool_file_name = value;
            hosts_changed = true;
        }
        if let Some(value) = env_string("LAUNCHER_TOOL_MIRRORS") {
            config.tool_mirrors = parse_list(&value);
        } else if hosts_changed {
            config.tool_mirrors = tool_mirrors_for(&config);
        }
        if let Some(value) = env_usize("LAUNCHER_TOOL_MAX_ATTEMPTS") {
            config.tool_max_attempts = value.clamp(1, 50);
        }
        if let Some(value) = env_usize("LAUNCHER_TOOL_RETRY_WAIT_MS") {
            config.tool_retry_delay = Duration::from_millis(value.clamp(0, 60_000) as u64);
        }
        if let Some(value) = env_usize("LAUNCHER_HTTP_CHUNK_COUNT") {
            config.chunk_count = value.clamp(1, 16);
        }
        if let Some(value) = env_usize("LAUNCHER_HTTP_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(value.clamp(10, 3600) as u64);
        }
        if let Some(value) = env_string("LAUNCHER_FULL_INSTALL_ROOT_DIR") {
            config.full_install_root_dir = Some(value);
        }
        if let Some(value) = env_string("LAUNCHER_GAME_EXECUTABLE") {
            config.game_executable = value;
        }
        if env_truthy("LAUNCHER_SKIP_SPACE_CHECK") {
            config.required_free_bytes = 0;
        }

        config
    }
}

fn tool_mirrors_for(config: &LauncherConfig) -> Vec<String> {
    vec![
        format!(
            "{}/{}",
            config.patch_host.trim_end_matches('/'),
            config.tool_file_name
        ),
        format!(
            "{}/{}",
            config.game_host.trim_end_matches('/'),
            config.tool_file_name
        ),
    ]
}

fn default_tool_mirrors(patch_host: &str, game_host: &str) -> Vec<String> {
    vec![
        format!("{patch_host}/{DEFAULT_TOOL_FILE_NAME}"),
        format!("{game_host}/{DEFAULT_TOOL_FILE_NAME}"),
    ]
}

fn current_executable_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().to_string()))
        .unwrap_or_else(|| "launcher.exe".to_string())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|ch| ch == ',' || ch == ';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn env_truthy(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
        })
        .unwrap_or(false)
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
}
