use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_APP_TITLE, DEFAULT_HISTORY_TABLE, DEFAULT_LOCAL_HISTORY_DIR, DEFAULT_LOCAL_PROFILE,
    DEFAULT_MAX_SELECTED_MODELS, DEFAULT_MAX_TOKENS, DEFAULT_OPENROUTER_BASE_URL,
    DEFAULT_OPENROUTER_KEY_ENV, DEFAULT_REFERER, DEFAULT_REVEAL_CHARS_PER_TICK,
    DEFAULT_REVEAL_TICK_MS, DEFAULT_SUPABASE_ANON_KEY_ENV, DEFAULT_SUPABASE_URL_ENV,
    DEFAULT_TEMPERATURE, HTTP_REQUEST_TIMEOUT_SECS,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Routing API configuration
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Progressive reveal of completed responses
    #[serde(default)]
    pub reveal: RevealConfig,

    /// Where prompt turns are persisted
    #[serde(default)]
    pub history: HistoryConfig,

    /// UI configuration
    #[serde(default)]
    pub ui: UIConfig,
}

/// OpenRouter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Inline API key (takes precedence over `api_key_env`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable containing API key
    pub api_key_env: String,
    pub base_url: String,
    /// Sent as `HTTP-Referer` for attribution
    pub referer: String,
    /// Sent as `X-Title` for attribution
    pub title: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: DEFAULT_OPENROUTER_KEY_ENV.to_string(),
            base_url: DEFAULT_OPENROUTER_BASE_URL.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_APP_TITLE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: HTTP_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl OpenRouterConfig {
    /// Resolve the routing credential: explicit flag, then inline config,
    /// then the configured environment variable. A blank source is skipped
    /// rather than shadowing the next one.
    pub fn resolve_api_key(&self, cli_key: Option<&str>) -> Option<String> {
        fn usable(key: &str) -> Option<String> {
            let key = key.trim();
            (!key.is_empty()).then(|| key.to_string())
        }

        cli_key
            .and_then(usable)
            .or_else(|| self.api_key.as_deref().and_then(usable))
            .or_else(|| std::env::var(&self.api_key_env).ok().as_deref().and_then(usable))
    }
}

/// Reveal animation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealConfig {
    pub enabled: bool,
    pub chars_per_tick: usize,
    pub tick_interval_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chars_per_tick: DEFAULT_REVEAL_CHARS_PER_TICK,
            tick_interval_ms: DEFAULT_REVEAL_TICK_MS,
        }
    }
}

impl RevealConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Which history store backs the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    Supabase,
    Local,
    Disabled,
}

/// History configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,
    pub supabase_url_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_anon_key: Option<String>,
    pub supabase_anon_key_env: String,
    pub table: String,
    pub local_dir: PathBuf,
    /// Identity used by the local store
    pub local_profile: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::Supabase,
            supabase_url: None,
            supabase_url_env: DEFAULT_SUPABASE_URL_ENV.to_string(),
            supabase_anon_key: None,
            supabase_anon_key_env: DEFAULT_SUPABASE_ANON_KEY_ENV.to_string(),
            table: DEFAULT_HISTORY_TABLE.to_string(),
            local_dir: PathBuf::from(DEFAULT_LOCAL_HISTORY_DIR),
            local_profile: DEFAULT_LOCAL_PROFILE.to_string(),
        }
    }
}

impl HistoryConfig {
    /// Project URL and anon key for the hosted backend, if both are known
    pub fn supabase_credentials(&self) -> Option<(String, String)> {
        let url = self
            .supabase_url
            .clone()
            .or_else(|| std::env::var(&self.supabase_url_env).ok())
            .filter(|u| !u.trim().is_empty())?;
        let key = self
            .supabase_anon_key
            .clone()
            .or_else(|| std::env::var(&self.supabase_anon_key_env).ok())
            .filter(|k| !k.trim().is_empty())?;
        Some((url.trim().to_string(), key.trim().to_string()))
    }
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIConfig {
    /// Upper bound on simultaneously selected models
    pub max_models: usize,
    /// Selection used when neither the CLI nor the session state names one
    pub default_models: Vec<String>,
    pub show_token_estimate: bool,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            max_models: DEFAULT_MAX_SELECTED_MODELS,
            default_models: vec!["gpt".to_string(), "claude".to_string()],
            show_token_estimate: true,
        }
    }
}

/// Load configuration from multiple sources
pub fn load_config() -> Result<Config> {
    let global_config = get_config_dir()?.join("config.toml");
    let local_config = PathBuf::from(".chorus/config.toml");

    let files: Vec<PathBuf> = [global_config, local_config]
        .into_iter()
        .filter(|p| p.exists())
        .collect();

    layered(&files)
        .merge(Env::prefixed("CHORUS_").split("__"))
        .extract()
        .context("Failed to load configuration")
}

/// Load configuration from one explicit file, still honoring the environment
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    layered(&[path.to_path_buf()])
        .merge(Env::prefixed("CHORUS_").split("__"))
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

fn layered(files: &[PathBuf]) -> Figment {
    files
        .iter()
        .fold(Figment::from(Serialized::defaults(Config::default())), |figment, file| {
            figment.merge(Toml::file(file))
        })
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "chorus") {
        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        Ok(config_dir.to_path_buf())
    } else {
        // Fallback to home directory
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        let config_dir = PathBuf::from(home).join(".config").join("chorus");
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }
}

/// Get the data directory (log file lives here)
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = match ProjectDirs::from("", "", "chorus") {
        Some(proj_dirs) => proj_dirs.data_dir().to_path_buf(),
        None => get_config_dir()?,
    };
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = if let Some(p) = path {
        p
    } else {
        get_config_dir()?.join("config.toml")
    };

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default configuration file if it doesn't exist
pub fn init_config() -> Result<()> {
    let config_file = get_config_dir()?.join("config.toml");

    if !config_file.exists() {
        save_config(&Config::default(), Some(config_file.clone()))?;
        println!("Created default configuration at: {}", config_file.display());
    } else {
        println!("Configuration already exists at: {}", config_file.display());
    }

    // Create example local config
    let local_example = PathBuf::from(".chorus/config.toml.example");
    if !local_example.exists() {
        if let Some(parent) = local_example.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let example_config = r#"# Chorus Project Configuration
# This file overrides global settings for this project

[ui]
default_models = ["gpt", "claude", "gemini"]

[history]
backend = "local"
local_dir = ".chorus/history"

[reveal]
chars_per_tick = 4
"#;
        std::fs::write(&local_example, example_config)?;
        println!("Created example configuration at: {}", local_example.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.openrouter.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.openrouter.max_tokens, 1000);
        assert_eq!(config.history.backend, HistoryBackend::Supabase);
        assert_eq!(config.history.table, "chat_history");
        assert_eq!(config.ui.max_models, 5);
        assert!(config.reveal.enabled);
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[history]
backend = "local"

[reveal]
chars_per_tick = 8

[ui]
default_models = ["deepseek"]
"#,
        )
        .unwrap();

        let config: Config = layered(&[path]).extract().unwrap();
        assert_eq!(config.history.backend, HistoryBackend::Local);
        assert_eq!(config.reveal.chars_per_tick, 8);
        assert_eq!(config.reveal.tick_interval_ms, 1);
        assert_eq!(config.ui.default_models, vec!["deepseek".to_string()]);
        assert_eq!(config.openrouter.title, "AI Model Comparison Tool");
    }

    #[test]
    fn test_save_round_trips_through_layers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.openrouter.temperature = 0.2;
        config.history.backend = HistoryBackend::Disabled;
        save_config(&config, Some(path.clone())).unwrap();

        let loaded: Config = layered(&[path]).extract().unwrap();
        assert!((loaded.openrouter.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(loaded.history.backend, HistoryBackend::Disabled);
    }

    #[test]
    fn test_api_key_precedence() {
        let mut config = OpenRouterConfig {
            api_key_env: "CHORUS_TEST_UNSET_KEY_VAR".to_string(),
            ..OpenRouterConfig::default()
        };
        assert_eq!(config.resolve_api_key(None), None);

        config.api_key = Some("from-config".to_string());
        assert_eq!(config.resolve_api_key(None).as_deref(), Some("from-config"));
        assert_eq!(config.resolve_api_key(Some(" from-flag ")).as_deref(), Some("from-flag"));
        assert_eq!(config.resolve_api_key(Some("   ")).as_deref(), Some("from-config"));
    }

    #[test]
    fn test_blank_api_key_sources_fall_through() {
        std::env::set_var("CHORUS_TEST_FALLBACK_KEY_VAR", " from-env ");
        let mut config = OpenRouterConfig {
            api_key: Some(String::new()),
            api_key_env: "CHORUS_TEST_FALLBACK_KEY_VAR".to_string(),
            ..OpenRouterConfig::default()
        };
        assert_eq!(config.resolve_api_key(Some("")).as_deref(), Some("from-env"));

        config.api_key_env = "CHORUS_TEST_UNSET_BLANK_VAR".to_string();
        config.api_key = Some("  ".to_string());
        assert_eq!(config.resolve_api_key(None), None);
    }

    #[test]
    fn test_supabase_credentials_need_both_parts() {
        let mut history = HistoryConfig {
            supabase_url_env: "CHORUS_TEST_UNSET_URL_VAR".to_string(),
            supabase_anon_key_env: "CHORUS_TEST_UNSET_ANON_VAR".to_string(),
            ..HistoryConfig::default()
        };
        assert!(history.supabase_credentials().is_none());

        history.supabase_url = Some("https://project.supabase.co".to_string());
        assert!(history.supabase_credentials().is_none());

        history.supabase_anon_key = Some("anon".to_string());
        assert_eq!(
            history.supabase_credentials(),
            Some(("https://project.supabase.co".to_string(), "anon".to_string()))
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_config_from(&dir.path().join("absent.toml")).is_err());
    }
}
