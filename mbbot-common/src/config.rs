//! Configuration loading and credentials resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (or its environment variable, handled by clap)
//! 2. TOML config file
//! 3. Compiled default
//!
//! A missing TOML file is not an error: the compiled defaults are used and
//! the binary reports it once logging is up.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Server used when nothing else is configured. Edits go to the test
/// server unless the production server is requested explicitly.
pub const DEFAULT_SERVER_URL: &str = "https://test.musicbrainz.org";

/// https://musicbrainz.org/doc/MusicBrainz_API/Rate_Limiting
pub const DEFAULT_MAX_QPS: u32 = 1;

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "MBBOT_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the MusicBrainz server, e.g. "https://musicbrainz.org"
    #[serde(default)]
    pub server_url: Option<String>,

    /// File containing whitespace-separated username and password
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,

    /// Maximum requests per second sent to the server
    #[serde(default)]
    pub max_qps: Option<u32>,

    /// User-Agent override
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Standard User-Agent string for requests to MusicBrainz
pub fn get_user_agent() -> String {
    format!(
        "mbbot/{} ( https://github.com/derat/mbbot )",
        env!("CARGO_PKG_VERSION")
    )
}

/// Locate the TOML config file.
///
/// Returns `None` when no candidate could be determined (no CLI argument,
/// no environment variable and no home directory).
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("mbbot").join("config.toml"))
}

/// Load the TOML config file at `path`.
///
/// A file that doesn't exist yields the default config; a file that exists
/// but can't be read or parsed is an error. Nothing is logged here since
/// logging is configured from the result.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    Ok(config)
}

/// Default credentials file: ~/.mbbot
pub fn default_credentials_path() -> PathBuf {
    dirs::home_dir()
        .map(|d| d.join(".mbbot"))
        .unwrap_or_else(|| PathBuf::from(".mbbot"))
}

/// Values supplied on the command line (or via their environment variables)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub max_qps: Option<u32>,
}

/// Fully-resolved runtime settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Server base URL without a trailing slash
    pub server_url: String,
    pub credentials_file: PathBuf,
    pub max_qps: u32,
    pub user_agent: String,
    pub log_level: String,
}

impl Settings {
    /// Merge CLI overrides, TOML values and compiled defaults.
    pub fn resolve(cli: CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let server_url = cli
            .server_url
            .or_else(|| toml_config.server_url.clone())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let server_url = server_url.trim_end_matches('/').to_string();
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "Server URL must start with http:// or https://: {:?}",
                server_url
            )));
        }

        let max_qps = cli
            .max_qps
            .or(toml_config.max_qps)
            .unwrap_or(DEFAULT_MAX_QPS);
        if max_qps == 0 {
            return Err(Error::Config("max_qps must be positive".to_string()));
        }

        let credentials_file = cli
            .credentials_file
            .or_else(|| toml_config.credentials_file.clone())
            .unwrap_or_else(default_credentials_path);

        let user_agent = toml_config
            .user_agent
            .clone()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(get_user_agent);

        Ok(Self {
            server_url,
            credentials_file,
            max_qps,
            user_agent,
            log_level: toml_config.logging.level.clone(),
        })
    }
}

/// MusicBrainz account credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Parse a whitespace-separated username and password.
    pub fn parse(content: &str) -> Result<Self> {
        let parts: Vec<&str> = content.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(Error::Credentials(format!(
                "expected 2 fields; got {}",
                parts.len()
            )));
        }
        Ok(Self {
            username: parts[0].to_string(),
            password: parts[1].to_string(),
        })
    }

    /// Read credentials from the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Credentials(format!("reading {} failed: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        assert_eq!(LoggingConfig::default().level, "info");
    }

    #[test]
    fn test_credentials_parse() {
        let creds = Credentials::parse("someuser  secret123\n").unwrap();
        assert_eq!(creds.username, "someuser");
        assert_eq!(creds.password, "secret123");
    }

    #[test]
    fn test_credentials_wrong_field_count() {
        assert!(Credentials::parse("onlyuser").is_err());
        assert!(Credentials::parse("a b c").is_err());
        assert!(Credentials::parse("").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::parse("someuser secret123").unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("someuser"));
        assert!(!debug.contains("secret123"));
    }

    #[test]
    fn test_user_agent_format() {
        let ua = get_user_agent();
        assert!(ua.starts_with("mbbot/"));
        assert!(ua.contains("github.com/derat/mbbot"));
    }
}
