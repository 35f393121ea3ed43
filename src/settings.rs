//! Client configuration
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. `TENTO_*` environment variables
//! 2. `Settings.toml` at the path named by `TENTO_CONFIG` (if set)
//! 3. `Settings.toml` in the current directory (if present)
//! 4. Built-in defaults

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TentoSettings {
    pub api: ApiSettings,
    pub session: SessionSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the Tento backend.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Redirect URI registered with the GitHub OAuth application.
    pub oauth_redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Proactive renewal fires when the access token has at most this many
    /// minutes of lifetime left.
    pub refresh_buffer_minutes: u64,
    /// How often the renewal loop re-checks the token's remaining lifetime.
    pub renewal_check_secs: u64,
    /// Idle time after which the session expires regardless of token validity.
    pub inactivity_timeout_minutes: u64,
    /// Interval between server-side identity probes.
    pub validation_interval_minutes: u64,
    /// Whether in-progress answers are cached as a recovery aid.
    pub attempt_cache_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Path of the persisted session document.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
            oauth_redirect_uri: "http://localhost:5173/auth/callback".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_buffer_minutes: 5,
            renewal_check_secs: 60,
            inactivity_timeout_minutes: 30,
            validation_interval_minutes: 5,
            attempt_cache_enabled: true,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: "tento-session.json".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TentoSettings {
    /// Load settings from configuration files and environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or
    /// parsed as TOML.
    pub fn load() -> anyhow::Result<Self> {
        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Initialize the global logger from the configured level.
    ///
    /// Safe to call more than once; later calls are no-ops.
    pub fn initialize_logging(&self) {
        let _ = env_logger::Builder::new()
            .parse_filters(&self.logging.level)
            .try_init();
    }

    fn load_base_settings() -> anyhow::Result<Self> {
        let mut settings = Self::default();

        let default_path = PathBuf::from("Settings.toml");
        if default_path.exists() {
            let toml_content = fs::read_to_string(&default_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            log::debug!("loaded base settings from {}", default_path.display());
        }

        if let Ok(config_path) = std::env::var("TENTO_CONFIG") {
            let path = PathBuf::from(&config_path);
            if path.exists() {
                let toml_content = fs::read_to_string(&path)?;
                settings = basic_toml::from_str(&toml_content)?;
                log::debug!("overriding settings from {}", path.display());
            } else {
                log::warn!("TENTO_CONFIG set but no file found at: {config_path}");
            }
        }

        Ok(settings)
    }

    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_api_env_overrides(&mut settings.api);
        Self::apply_session_env_overrides(&mut settings.session);
        if let Ok(path) = std::env::var("TENTO_STORAGE_PATH") {
            settings.storage.path = path;
        }
        if let Ok(level) = std::env::var("TENTO_LOG_LEVEL") {
            settings.logging.level = level;
        }
    }

    fn apply_api_env_overrides(api: &mut ApiSettings) {
        if let Ok(base_url) = std::env::var("TENTO_API_BASE_URL") {
            api.base_url = base_url;
        }
        if let Ok(redirect_uri) = std::env::var("TENTO_OAUTH_REDIRECT_URI") {
            api.oauth_redirect_uri = redirect_uri;
        }
        Self::apply_numeric_env_override("TENTO_API_TIMEOUT_SECS", &mut api.timeout_secs);
    }

    fn apply_session_env_overrides(session: &mut SessionSettings) {
        Self::apply_numeric_env_override(
            "TENTO_REFRESH_BUFFER_MINUTES",
            &mut session.refresh_buffer_minutes,
        );
        Self::apply_numeric_env_override(
            "TENTO_RENEWAL_CHECK_SECS",
            &mut session.renewal_check_secs,
        );
        Self::apply_numeric_env_override(
            "TENTO_INACTIVITY_TIMEOUT_MINUTES",
            &mut session.inactivity_timeout_minutes,
        );
        Self::apply_numeric_env_override(
            "TENTO_VALIDATION_INTERVAL_MINUTES",
            &mut session.validation_interval_minutes,
        );
        if let Ok(enabled) = std::env::var("TENTO_ATTEMPT_CACHE_ENABLED") {
            if let Ok(enabled) = enabled.parse::<bool>() {
                session.attempt_cache_enabled = enabled;
            }
        }
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }
}
