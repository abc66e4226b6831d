//! Configuration handling for modship.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. built-in defaults (the StatusMod release on Fabric 1.21.10),
//! 2. an optional `.modship.toml` in the project directory,
//! 3. environment variables, read exactly once by [`resolve_from_env`].
//!
//! Credentials are only ever taken from the environment.
//!
//! # Example
//!
//! ```
//! use modship_config::{load_config, resolve};
//! use std::collections::HashMap;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("/nonexistent")).expect("load config");
//! let env: HashMap<&str, &str> = HashMap::from([("MAX_ATTEMPTS", "3")]);
//! let settings = resolve(config, |key| env.get(key).map(|v| v.to_string())).expect("resolve");
//! assert_eq!(settings.config.retry.max_attempts, 3);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use modship_retry::BackoffConfig;
use modship_types::{EvaluationOrder, Platform};
use serde::{Deserialize, Serialize};

/// Default configuration file name
pub const CONFIG_FILE: &str = ".modship.toml";

/// Default directory for the event log
pub const DEFAULT_STATE_DIR: &str = ".modship";

pub const MODRINTH_TOKEN_ENV: &str = "MODRINTH_TOKEN";
pub const MODRINTH_PROJECT_ID_ENV: &str = "MODRINTH_PROJECT_ID";
pub const CURSEFORGE_API_KEY_ENV: &str = "CURSEFORGE_API_KEY";
pub const CURSEFORGE_TOKEN_ENV: &str = "CURSEFORGE_TOKEN";
pub const CURSEFORGE_PROJECT_ID_ENV: &str = "CURSEFORGE_PROJECT_ID";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const GITHUB_REPOSITORY_ENV: &str = "GITHUB_REPOSITORY";
pub const MAX_ATTEMPTS_ENV: &str = "MAX_ATTEMPTS";
pub const BASE_BACKOFF_SECONDS_ENV: &str = "BASE_BACKOFF_SECONDS";
pub const CURSEFORGE_JAVA_VERSION_ENV: &str = "CURSEFORGE_JAVA_VERSION";
pub const CURSEFORGE_ENVIRONMENT_ENV: &str = "CURSEFORGE_ENVIRONMENT";
pub const JAVA_HOME_ENV: &str = "JAVA_HOME";
pub const VERSION_ENV: &str = "VERSION";

/// Get the config file path for a directory
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Complete modship configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where the event log is written, relative to the project directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Release metadata sent to both platforms
    #[serde(default)]
    pub release: ReleaseConfig,
    /// How the artifact is built and found
    #[serde(default)]
    pub build: BuildConfig,
    /// Attempt budget and backoff schedule
    #[serde(default)]
    pub retry: BackoffConfig,
    /// Orchestration policy switches
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub modrinth: ModrinthConfig,
    #[serde(default)]
    pub curseforge: CurseForgeConfig,
    #[serde(default)]
    pub github: GitHubConfig,
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }
}

/// Release metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default = "default_game_versions")]
    pub game_versions: Vec<String>,
    #[serde(default = "default_loaders")]
    pub loaders: Vec<String>,
    /// Prefix of the human-readable release name ("StatusMod 1.2.3")
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default = "default_changelog")]
    pub changelog: String,
    /// CurseForge release channel (`release`, `beta`, `alpha`)
    #[serde(default = "default_release_type")]
    pub release_type: String,
}

fn default_game_versions() -> Vec<String> {
    vec!["1.21.10".to_string()]
}
fn default_loaders() -> Vec<String> {
    vec!["fabric".to_string()]
}
fn default_display_name() -> String {
    "StatusMod".to_string()
}
fn default_changelog() -> String {
    "Automated upload from GitHub Actions".to_string()
}
fn default_release_type() -> String {
    "release".to_string()
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            game_versions: default_game_versions(),
            loaders: default_loaders(),
            display_name: default_display_name(),
            changelog: default_changelog(),
            release_type: default_release_type(),
        }
    }
}

/// Build configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build program, relative to the project directory when it contains a slash
    #[serde(default = "default_build_command")]
    pub command: String,
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,
    /// Project version file, the one that gets bumped
    #[serde(default = "default_version_file")]
    pub version_file: PathBuf,
    /// Version file written by the build
    #[serde(default = "default_build_version_file")]
    pub build_version_file: PathBuf,
    /// Directory holding the built JARs
    #[serde(default = "default_libs_dir")]
    pub libs_dir: PathBuf,
    /// Preferred artifact base names, tried in order as `<name>-<version>.jar`
    #[serde(default = "default_artifact_names")]
    pub artifact_names: Vec<String>,
}

fn default_build_command() -> String {
    "./gradlew".to_string()
}
fn default_build_args() -> Vec<String> {
    ["clean", "build", "writeVersion", "--no-daemon"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_version_file() -> PathBuf {
    PathBuf::from("version.txt")
}
fn default_build_version_file() -> PathBuf {
    PathBuf::from("build/version.txt")
}
fn default_libs_dir() -> PathBuf {
    PathBuf::from("build/libs")
}
fn default_artifact_names() -> Vec<String> {
    vec!["statusmod".to_string(), "status-mod".to_string()]
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            args: default_build_args(),
            version_file: default_version_file(),
            build_version_file: default_build_version_file(),
            libs_dir: default_libs_dir(),
            artifact_names: default_artifact_names(),
        }
    }
}

/// Orchestration policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub order: EvaluationOrder,
    /// Treat a platform without credentials as a configuration error instead
    /// of a transient failure
    #[serde(default)]
    pub fail_fast_on_missing_credentials: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModrinthConfig {
    #[serde(default = "default_modrinth_api")]
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

fn default_modrinth_api() -> String {
    "https://api.modrinth.com".to_string()
}

impl Default for ModrinthConfig {
    fn default() -> Self {
        Self {
            api_base: default_modrinth_api(),
            project_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurseForgeConfig {
    #[serde(default = "default_curseforge_api")]
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<String>,
    /// `client`, `server` or `both`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

fn default_curseforge_api() -> String {
    "https://api.curseforge.com".to_string()
}

impl Default for CurseForgeConfig {
    fn default() -> Self {
        Self {
            api_base: default_curseforge_api(),
            project_id: None,
            java_version: None,
            environment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,
    /// `owner/name` of the repository issues are filed on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            repository: None,
        }
    }
}

/// Secrets taken from the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub modrinth_token: Option<String>,
    pub curseforge_token: Option<String>,
    pub github_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("Credentials")
            .field("modrinth_token", &mask(&self.modrinth_token))
            .field("curseforge_token", &mask(&self.curseforge_token))
            .field("github_token", &mask(&self.github_token))
            .finish()
    }
}

impl Credentials {
    pub fn token(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Modrinth => self.modrinth_token.as_deref(),
            Platform::CurseForge => self.curseforge_token.as_deref(),
        }
    }

    /// Every configured secret value, for redaction.
    pub fn secrets(&self) -> Vec<String> {
        [
            &self.modrinth_token,
            &self.curseforge_token,
            &self.github_token,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

/// Fully resolved, immutable settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub credentials: Credentials,
    /// Forwarded to the build as the Gradle JVM
    pub java_home: Option<String>,
    /// Explicit release version for one-shot uploads
    pub version: Option<String>,
}

impl Settings {
    pub fn project_id(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Modrinth => self.config.modrinth.project_id.as_deref(),
            Platform::CurseForge => self.config.curseforge.project_id.as_deref(),
        }
    }

    /// Whether both the project id and the token are present.
    pub fn has_credentials(&self, platform: Platform) -> bool {
        self.project_id(platform).is_some() && self.credentials.token(platform).is_some()
    }
}

/// Apply environment overrides to `config` using `lookup` for variables.
///
/// Empty values count as unset.
pub fn resolve<F>(mut config: Config, lookup: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(raw) = get(MAX_ATTEMPTS_ENV) {
        config.retry.max_attempts = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {MAX_ATTEMPTS_ENV} value: {raw:?}"))?;
    }
    if let Some(raw) = get(BASE_BACKOFF_SECONDS_ENV) {
        let secs: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {BASE_BACKOFF_SECONDS_ENV} value: {raw:?}"))?;
        config.retry.base_delay = Duration::from_secs(secs);
    }

    if let Some(id) = get(MODRINTH_PROJECT_ID_ENV) {
        config.modrinth.project_id = Some(id);
    }
    if let Some(id) = get(CURSEFORGE_PROJECT_ID_ENV) {
        config.curseforge.project_id = Some(id);
    }
    if let Some(v) = get(CURSEFORGE_JAVA_VERSION_ENV) {
        config.curseforge.java_version = Some(v);
    }
    if let Some(v) = get(CURSEFORGE_ENVIRONMENT_ENV) {
        config.curseforge.environment = Some(v);
    }
    if let Some(repo) = get(GITHUB_REPOSITORY_ENV) {
        config.github.repository = Some(repo);
    }

    let credentials = Credentials {
        modrinth_token: get(MODRINTH_TOKEN_ENV),
        curseforge_token: get(CURSEFORGE_API_KEY_ENV).or_else(|| get(CURSEFORGE_TOKEN_ENV)),
        github_token: get(GITHUB_TOKEN_ENV),
    };

    Ok(Settings {
        config,
        credentials,
        java_home: get(JAVA_HOME_ENV),
        version: get(VERSION_ENV),
    })
}

/// [`resolve`] against the process environment.
pub fn resolve_from_env(config: Config) -> Result<Settings> {
    resolve(config, |key| std::env::var(key).ok())
}

/// Load configuration from a directory
pub fn load_config(dir: &Path) -> Result<Config> {
    load_config_from_file(&config_path(dir))
}

/// Load configuration from a specific file path
pub fn load_config_from_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    Ok(config)
}
