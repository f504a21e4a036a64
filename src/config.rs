//! Configuration for the kennel tracker.
//!
//! Settings come from an optional `kennel.toml`, then environment variables
//! (a `.env` file is loaded at startup), then built-in defaults:
//!
//! ```toml
//! [store]
//! backend = "supabase"          # or "sqlite"
//! url = "https://xyz.supabase.co"
//! anon_key = "..."
//! db_path = ".kennel/kennel.db"
//!
//! [realtime]
//! channel = "cells-changes"
//! heartbeat_secs = 25
//! join_timeout_secs = 10
//!
//! [dashboard]
//! notes_quiescence_ms = 500
//! default_cage_count = 21
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "kennel.toml";

pub const ENV_BACKEND: &str = "KENNEL_STORE";
pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_DB_PATH: &str = "KENNEL_DB_PATH";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Supabase,
    Sqlite,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "supabase" => Ok(Self::Supabase),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("Invalid store backend: {}", other)),
        }
    }
}

/// Which store to talk to and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: Backend,
    /// Hosted store endpoint (project URL, without `/rest/v1`)
    #[serde(default)]
    pub url: Option<String>,
    /// Anonymous access key for the hosted store
    #[serde(default)]
    pub anon_key: Option<String>,
    /// Database file for the sqlite backend
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".kennel/kennel.db")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            url: None,
            anon_key: None,
            db_path: default_db_path(),
        }
    }
}

/// Change-feed settings for the hosted store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSection {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
}

fn default_channel() -> String {
    "cells-changes".to_string()
}

fn default_heartbeat_secs() -> u64 {
    25
}

fn default_join_timeout_secs() -> u64 {
    10
}

impl Default for RealtimeSection {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            heartbeat_secs: default_heartbeat_secs(),
            join_timeout_secs: default_join_timeout_secs(),
        }
    }
}

impl RealtimeSection {
    /// Heartbeat period, never shorter than one second.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSection {
    /// Quiet period after the last keystroke before notes are saved
    #[serde(default = "default_notes_quiescence_ms")]
    pub notes_quiescence_ms: u64,
    /// Number of cages seeded by `kennel seed`
    #[serde(default = "default_cage_count")]
    pub default_cage_count: i32,
}

fn default_notes_quiescence_ms() -> u64 {
    500
}

fn default_cage_count() -> i32 {
    21
}

impl Default for DashboardSection {
    fn default() -> Self {
        Self {
            notes_quiescence_ms: default_notes_quiescence_ms(),
            default_cage_count: default_cage_count(),
        }
    }
}

impl DashboardSection {
    pub fn notes_quiescence(&self) -> Duration {
        Duration::from_millis(self.notes_quiescence_ms)
    }
}

/// The complete kennel.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KennelToml {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub realtime: RealtimeSection,
    #[serde(default)]
    pub dashboard: DashboardSection,
}

impl KennelToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse kennel.toml")
    }

    /// Load from `path` if given (it must exist), else from `./kennel.toml`
    /// when present, else defaults. Environment overrides are applied last.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`. Empty values are
    /// treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(backend) = lookup(ENV_BACKEND) {
            self.store.backend = backend
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid {}", ENV_BACKEND))?;
        }
        if let Some(url) = lookup(ENV_URL) {
            self.store.url = Some(url);
        }
        if let Some(key) = lookup(ENV_ANON_KEY) {
            self.store.anon_key = Some(key);
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.store.db_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.store.backend == Backend::Supabase {
            if self.store.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                warnings.push(format!("{} is not set; the store is unconfigured", ENV_URL));
            }
            if self
                .store
                .anon_key
                .as_deref()
                .is_none_or(|k| k.trim().is_empty())
            {
                warnings.push(format!(
                    "{} is not set; the store is unconfigured",
                    ENV_ANON_KEY
                ));
            }
        }
        if self.realtime.heartbeat_secs == 0 {
            warnings.push("realtime.heartbeat_secs is 0; using 1".to_string());
        }
        if self.dashboard.default_cage_count < 1 {
            warnings.push(format!(
                "dashboard.default_cage_count must be positive, got {}",
                self.dashboard.default_cage_count
            ));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = KennelToml::default();
        assert_eq!(config.store.backend, Backend::Supabase);
        assert_eq!(config.store.db_path, PathBuf::from(".kennel/kennel.db"));
        assert_eq!(config.realtime.channel, "cells-changes");
        assert_eq!(config.realtime.heartbeat(), Duration::from_secs(25));
        assert_eq!(config.dashboard.notes_quiescence(), Duration::from_millis(500));
        assert_eq!(config.dashboard.default_cage_count, 21);
    }

    #[test]
    fn test_zero_heartbeat_is_clamped() {
        let config = KennelToml::parse("[realtime]\nheartbeat_secs = 0\n").unwrap();
        assert_eq!(config.realtime.heartbeat(), Duration::from_secs(1));
        assert!(
            config
                .validate()
                .iter()
                .any(|w| w.contains("heartbeat_secs is 0"))
        );
    }

    #[test]
    fn test_parse_partial_file() {
        let content = r#"
[store]
backend = "sqlite"
db_path = "/var/lib/kennel.db"

[dashboard]
notes_quiescence_ms = 250
"#;
        let config = KennelToml::parse(content).unwrap();
        assert_eq!(config.store.backend, Backend::Sqlite);
        assert_eq!(config.store.db_path, PathBuf::from("/var/lib/kennel.db"));
        assert_eq!(config.dashboard.notes_quiescence_ms, 250);
        assert_eq!(config.dashboard.default_cage_count, 21);
        assert_eq!(config.realtime.join_timeout_secs, 10);
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        let content = r#"
[store]
backend = "mysql"
"#;
        assert!(KennelToml::parse(content).is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = KennelToml::parse(
            r#"
[store]
url = "https://file.example.co"
"#,
        )
        .unwrap();
        config
            .apply_env(env(&[
                (ENV_URL, "https://env.example.co"),
                (ENV_ANON_KEY, "anon"),
                (ENV_BACKEND, "SQLite"),
            ]))
            .unwrap();
        assert_eq!(config.store.url.as_deref(), Some("https://env.example.co"));
        assert_eq!(config.store.anon_key.as_deref(), Some("anon"));
        assert_eq!(config.store.backend, Backend::Sqlite);
    }

    #[test]
    fn test_env_empty_values_are_ignored() {
        let mut config = KennelToml::default();
        config.apply_env(env(&[(ENV_URL, "  "), (ENV_DB_PATH, "")])).unwrap();
        assert!(config.store.url.is_none());
        assert_eq!(config.store.db_path, PathBuf::from(".kennel/kennel.db"));
    }

    #[test]
    fn test_env_invalid_backend_errors() {
        let mut config = KennelToml::default();
        assert!(config.apply_env(env(&[(ENV_BACKEND, "postgres")])).is_err());
    }

    #[test]
    fn test_validate_warns_on_missing_credentials() {
        let config = KennelToml::default();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains(ENV_URL));

        let mut sqlite = KennelToml::default();
        sqlite.store.backend = Backend::Sqlite;
        assert!(sqlite.validate().is_empty());
    }

    #[test]
    fn test_resolve_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[realtime]\nchannel = \"kennel\"\n").unwrap();
        let config = KennelToml::resolve(Some(&path)).unwrap();
        assert_eq!(config.realtime.channel, "kennel");
    }

    #[test]
    fn test_resolve_missing_explicit_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(KennelToml::resolve(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
