use anyhow::{Context, Result};
use chrono::FixedOffset;
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for ritornello.
///
/// Configuration is loaded once at startup from multiple sources with
/// the following priority:
/// 1. Environment variables (RITO_* prefix)
/// 2. Config file (~/.config/ritornello/config.toml)
/// 3. Built-in defaults (lowest priority)
///
/// A run's behavior is not parameterized beyond this; there are no
/// per-invocation flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scrobble provider API key.
    ///
    /// Can be set via:
    /// - ENV: RITO_LASTFM_API_KEY
    /// - Config: lastfm_api_key = "..."
    pub lastfm_api_key: Option<String>,

    /// Scrobble provider username whose history is synced.
    pub lastfm_user: Option<String>,

    /// Catalog provider client id.
    pub spotify_client_id: Option<String>,

    /// Catalog provider client secret.
    pub spotify_client_secret: Option<String>,

    /// Reusable credential produced by the out-of-band authorization
    /// flow; exchanged for an access token at startup.
    pub spotify_refresh_token: Option<String>,

    /// Path to the CSV history store.
    ///
    /// Default: ~/.local/share/ritornello/history.csv
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Path to the gzipped JSON snapshot copy of the store.
    ///
    /// Default: ~/.local/share/ritornello/history.json.gz
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// UTC offset of the local reference zone used for timestamping,
    /// e.g. "+05:30". Stored timestamps are naive in this zone.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lastfm_api_key: None,
            lastfm_user: None,
            spotify_client_id: None,
            spotify_client_secret: None,
            spotify_refresh_token: None,
            history_path: default_history_path(),
            snapshot_path: default_snapshot_path(),
            utc_offset: default_utc_offset(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/ritornello/config.toml
    /// Reads environment variables with RITO_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("rito");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;

        Ok(config)
    }

    /// The fixed local reference zone for "current time" stamping.
    pub fn reference_zone(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.utc_offset)
            .ok_or_else(|| anyhow::anyhow!("Invalid utc_offset: {:?}", self.utc_offset))
    }
}

/// Parse a "+HH:MM" / "-HH:MM" offset string.
fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => (1, value),
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ritornello")
        .join("history.csv")
}

fn default_snapshot_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ritornello")
        .join("history.json.gz")
}

fn default_utc_offset() -> String {
    "+00:00".to_string()
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/ritornello/config.toml
/// - macOS: ~/Library/Application Support/ritornello/config.toml
/// - Windows: %APPDATA%\ritornello\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ritornello")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Ritornello Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. Environment variables (RITO_* prefix)
# 2. This config file
# 3. Built-in defaults (lowest priority)

# Scrobble provider (Last.fm) credentials
#
# Register for a free API key at: https://www.last.fm/api/account/create
#
# Can also be set via:
# - Environment: RITO_LASTFM_API_KEY=your-key-here
lastfm_api_key = "your-lastfm-api-key-here"

# Username whose listening history is synced
lastfm_user = "your-lastfm-username"

# Catalog provider (Spotify) credentials
#
# The refresh token comes from the one-time interactive authorization
# flow; ritornello only exchanges it for access tokens.
spotify_client_id = "your-spotify-client-id"
spotify_client_secret = "your-spotify-client-secret"
spotify_refresh_token = "your-spotify-refresh-token"

# UTC offset of the local reference zone used for timestamps
#utc_offset = "+05:30"

# Path to the CSV history store
#
# A pre-existing store is required: the sync refuses to start from zero.
#
# Default: Platform-specific data directory
#history_path = "/path/to/history.csv"

# Path to the gzipped JSON snapshot of the store
#snapshot_path = "/path/to/history.json.gz"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.lastfm_api_key.is_none());
        assert!(!config.history_path.as_os_str().is_empty());
        assert_eq!(config.utc_offset, "+00:00");
    }

    #[test]
    fn test_reference_zone_parses_offsets() {
        let mut config = Config::default();
        assert_eq!(
            config.reference_zone().unwrap(),
            FixedOffset::east_opt(0).unwrap()
        );

        config.utc_offset = "+05:30".to_string();
        assert_eq!(
            config.reference_zone().unwrap(),
            FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
        );

        config.utc_offset = "-08:00".to_string();
        assert_eq!(
            config.reference_zone().unwrap(),
            FixedOffset::east_opt(-8 * 3600).unwrap()
        );
    }

    #[test]
    fn test_reference_zone_rejects_garbage() {
        let mut config = Config::default();
        for bad in ["", "0530", "+5", "+25:00", "+05:75", "UTC"] {
            config.utc_offset = bad.to_string();
            assert!(config.reference_zone().is_err(), "accepted {bad:?}");
        }
    }
}
