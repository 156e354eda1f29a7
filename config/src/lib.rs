//! Configuration loading for Weft.
//!
//! Reads `~/.weft/config.toml` (or the file named by `WEFT_CONFIG`). Every
//! section and field is optional; anything absent falls back to the
//! built-in defaults of the component it configures.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;
use toml::de::Error as TomlError;

use weft_context::SanitizeLimits;
use weft_core::{FeedLimits, ResolverWeights};
use weft_utils::DiffLimits;

pub const CONFIG_ENV: &str = "WEFT_CONFIG";
const DEFAULT_START_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeftConfig {
    pub feed: Option<FeedConfig>,
    pub diff: Option<DiffConfig>,
    pub persistence: Option<PersistenceConfig>,
    pub session: Option<SessionConfig>,
    /// Scoring weights used to find model and effort controls.
    pub resolver: Option<ResolverWeights>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedConfig {
    pub terminal_max_lines: Option<usize>,
    pub terminal_slack: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiffConfig {
    pub context_radius: Option<usize>,
    pub max_preview_lines: Option<usize>,
    pub max_exact_lines: Option<usize>,
    pub max_exact_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PersistenceConfig {
    /// Database path. `${VAR}` references are expanded.
    pub database: Option<String>,
    pub max_text_chars: Option<usize>,
    pub max_diff_chars: Option<usize>,
    pub max_terminal_chars: Option<usize>,
    /// Replaces the default raw-input allow-list when set.
    pub raw_input_keys: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    pub start_timeout_secs: Option<u64>,
    /// Reported as `providerId` on persisted envelopes.
    pub provider_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse { path: PathBuf, source: TomlError },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}

/// `$WEFT_CONFIG` when set, else `~/.weft/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|path| !path.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".weft").join("config.toml"))
}

/// `~/.weft/feed.db`, falling back to a relative `.weft/feed.db`.
#[must_use]
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .map_or_else(|| PathBuf::from(".weft"), |home| home.join(".weft"))
        .join("feed.db")
}

/// Replace `${VAR}` with the variable's value; unset variables expand to
/// nothing and an unterminated `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        if !name.is_empty() {
            out.push_str(&env::var(name).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

impl WeftConfig {
    /// Load from [`config_path`]. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), %source, "failed to read config");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&content)
            .map(Some)
            .map_err(|source| {
                tracing::warn!(path = %path.display(), %source, "failed to parse config");
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })
    }

    pub fn parse(content: &str) -> Result<Self, TomlError> {
        toml::from_str(content)
    }

    #[must_use]
    pub fn feed_limits(&self) -> FeedLimits {
        let defaults = FeedLimits::default();
        let Some(feed) = &self.feed else {
            return defaults;
        };
        FeedLimits {
            terminal_max_lines: feed
                .terminal_max_lines
                .unwrap_or(defaults.terminal_max_lines)
                .max(1),
            terminal_slack: feed.terminal_slack.unwrap_or(defaults.terminal_slack),
        }
    }

    #[must_use]
    pub fn diff_limits(&self) -> DiffLimits {
        let defaults = DiffLimits::default();
        let Some(diff) = &self.diff else {
            return defaults;
        };
        DiffLimits {
            context_radius: diff.context_radius.unwrap_or(defaults.context_radius),
            // Room for at least one change plus an elision marker.
            max_preview_lines: diff
                .max_preview_lines
                .unwrap_or(defaults.max_preview_lines)
                .max(3),
            max_exact_lines: diff.max_exact_lines.unwrap_or(defaults.max_exact_lines),
            max_exact_bytes: diff.max_exact_bytes.unwrap_or(defaults.max_exact_bytes),
        }
    }

    #[must_use]
    pub fn sanitize_limits(&self) -> SanitizeLimits {
        let defaults = SanitizeLimits::default();
        let Some(persistence) = &self.persistence else {
            return defaults;
        };
        SanitizeLimits {
            max_text_chars: persistence.max_text_chars.unwrap_or(defaults.max_text_chars),
            max_diff_chars: persistence.max_diff_chars.unwrap_or(defaults.max_diff_chars),
            max_terminal_chars: persistence
                .max_terminal_chars
                .unwrap_or(defaults.max_terminal_chars),
            raw_input_keys: persistence
                .raw_input_keys
                .clone()
                .unwrap_or(defaults.raw_input_keys),
        }
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.persistence
            .as_ref()
            .and_then(|persistence| persistence.database.as_deref())
            .map(expand_env_vars)
            .filter(|path| !path.trim().is_empty())
            .map_or_else(default_database_path, PathBuf::from)
    }

    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        let secs = self
            .session
            .as_ref()
            .and_then(|session| session.start_timeout_secs)
            .unwrap_or(DEFAULT_START_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|session| session.provider_id.as_deref())
    }

    #[must_use]
    pub fn resolver_weights(&self) -> ResolverWeights {
        self.resolver.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = WeftConfig::parse("").unwrap();
        assert_eq!(config.feed_limits(), FeedLimits::default());
        assert_eq!(config.diff_limits(), DiffLimits::default());
        assert_eq!(config.sanitize_limits(), SanitizeLimits::default());
        assert_eq!(config.resolver_weights(), ResolverWeights::default());
        assert_eq!(config.start_timeout(), Duration::from_secs(30));
        assert!(config.provider_id().is_none());
    }

    #[test]
    fn sections_override_individual_fields() {
        let config = WeftConfig::parse(
            r#"
            [feed]
            terminal_max_lines = 50

            [diff]
            max_preview_lines = 1

            [persistence]
            max_text_chars = 100
            raw_input_keys = ["path"]

            [session]
            start_timeout_secs = 5
            provider_id = "claude"

            [resolver]
            threshold = 9
            "#,
        )
        .unwrap();

        let feed = config.feed_limits();
        assert_eq!(feed.terminal_max_lines, 50);
        assert_eq!(feed.terminal_slack, FeedLimits::default().terminal_slack);
        assert_eq!(config.diff_limits().max_preview_lines, 3);
        let sanitize = config.sanitize_limits();
        assert_eq!(sanitize.max_text_chars, 100);
        assert_eq!(sanitize.raw_input_keys, vec!["path".to_string()]);
        assert_eq!(config.start_timeout(), Duration::from_secs(5));
        assert_eq!(config.provider_id(), Some("claude"));
        let weights = config.resolver_weights();
        assert_eq!(weights.threshold, 9);
        assert_eq!(weights.id_match, ResolverWeights::default().id_match);
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(WeftConfig::parse("[mystery]\nx = 1").is_err());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = WeftConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn bad_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[feed\n").unwrap();
        let err = WeftConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), path.as_path());
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn expands_env_references() {
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(expand_env_vars("a ${} b"), "a  b");
        assert_eq!(expand_env_vars("keep ${OPEN"), "keep ${OPEN");
        let home = env::var("HOME").unwrap_or_default();
        assert_eq!(expand_env_vars("${HOME}/feed.db"), format!("{home}/feed.db"));
    }

    #[test]
    fn database_path_expands_and_defaults() {
        let config = WeftConfig::parse("[persistence]\ndatabase = \"/tmp/x/feed.db\"").unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x/feed.db"));
        let config = WeftConfig::parse("").unwrap();
        assert!(config.database_path().ends_with("feed.db"));
    }
}
