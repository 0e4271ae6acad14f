//! Client configuration management for `tandem.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section    # [server] [retry] [cache] [state] [poll]
//! ├── error      # ConfigError
//! ├── handle     # Global config handle
//! └── mod.rs     # AppConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section     | Purpose                                    |
//! |-------------|--------------------------------------------|
//! | `[server]`  | Base URL, request timeout, user agent      |
//! | `[retry]`   | Retry delays and attempt budget            |
//! | `[cache]`   | Response cache directory, default lifetime |
//! | `[state]`   | Persisted stack directory, initial page    |
//! | `[poll]`    | Background polling                         |

mod error;
mod handle;
mod section;

pub use error::ConfigError;
pub use handle::{cfg, init_config};
pub use section::{CacheConfig, PollConfig, RetryConfig, ServerConfig, StateConfig};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::log;

/// Default config file name
pub const CONFIG_FILE: &str = "tandem.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing tandem.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory relative paths resolve against (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub poll: PollConfig,
}

impl AppConfig {
    /// Load `config_name`, searching upward from the working directory.
    ///
    /// A missing file yields the defaults rooted at the working directory.
    pub fn load(config_name: &Path) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()
            .map_err(|e| ConfigError::Io(config_name.to_path_buf(), e))?;

        let mut config = match find_config_file(&cwd, config_name) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.config_path = path;
                config
            }
            None => {
                crate::debug!("config"; "{} not found, using defaults", config_name.display());
                Self::default()
            }
        };

        let root = config
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(cwd);
        config.finalize(&root);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring: {}", display_path, fields.join(", "));
    }

    /// Resolve relative directories against `root`.
    fn finalize(&mut self, root: &Path) {
        self.root = root.to_path_buf();
        self.cache.dir = root.join(&self.cache.dir);
        self.state.dir = root.join(&self.state.dir);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.delays_ms.is_empty() {
            return Err(ConfigError::Validation(
                "[retry] delays_ms must not be empty".into(),
            ));
        }
        self.base_url()?;
        Ok(())
    }

    /// `[server] url` as an absolute http(s) URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.server.url).map_err(|e| {
            ConfigError::Validation(format!("[server] url `{}`: {}", self.server.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "[server] url `{}` must be http or https",
                self.server.url
            )));
        }
        Ok(url)
    }
}

/// Find config file by searching upward from `start`.
///
/// ```text
/// /home/user/app/sub/     ← cwd
/// /home/user/app/tandem.toml  ← found!
/// ```
fn find_config_file(start: &Path, config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let mut current = start;
    loop {
        let candidate = current.join(config_name);
        if candidate.exists() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_str("").unwrap();
        assert_eq!(config.server.url, "http://127.0.0.1:8000/");
        assert_eq!(config.retry.delays_ms, [100, 1000, 5000]);
        assert_eq!(config.cache.default_max_age_secs, 0);
        assert_eq!(config.state.initial_page.as_str(), "/");
        assert!(config.poll.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sections_parse() {
        let config = AppConfig::from_str(
            r#"
            [server]
            url = "https://ui.example.com/app/"
            timeout_ms = 2500

            [retry]
            delays_ms = [50]
            max_attempts = 0

            [state]
            initial_page = "home"

            [poll]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.server.timeout().as_millis(), 2500);
        assert_eq!(config.retry.policy().max_attempts(), None);
        assert_eq!(config.state.initial_page.as_str(), "/home");
        assert!(!config.poll.enabled);
        assert_eq!(config.base_url().unwrap().path(), "/app/");
    }

    #[test]
    fn test_validation() {
        let empty_delays = AppConfig::from_str("[retry]\ndelays_ms = []").unwrap();
        assert!(matches!(empty_delays.validate(), Err(ConfigError::Validation(_))));

        let relative = AppConfig::from_str("[server]\nurl = \"/app\"").unwrap();
        assert!(relative.validate().is_err());

        let ftp = AppConfig::from_str("[server]\nurl = \"ftp://example.com/\"").unwrap();
        assert!(ftp.validate().is_err());
    }

    #[test]
    fn test_unknown_fields_are_collected() {
        let (config, ignored) =
            AppConfig::parse_with_ignored("[server]\nport = 1\n[extra]\nx = 1").unwrap();
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(ignored, ["server.port", "extra"]);
    }

    #[test]
    fn test_find_config_upward_and_resolve_dirs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[cache]\ndir = \"c\"").unwrap();

        let found = find_config_file(&nested, Path::new(CONFIG_FILE)).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE));

        let mut config = AppConfig::from_path(&found).unwrap();
        config.finalize(dir.path());
        assert_eq!(config.cache.dir, dir.path().join("c"));
        assert_eq!(config.state.dir, dir.path().join(".tandem/state"));
    }
}
