//! Configuration loader and whitelist persistence for the WAT bot.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Environment variable consulted for the config path when `--config` is not given.
pub const CONFIG_ENV: &str = "WATBOT_CONF";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("no config path given and {CONFIG_ENV} is not set")]
    NoPath,
}

/// Failure while flushing the config back to disk. The whole file is rewritten
/// on every whitelist change; there is no partial update.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to render config: {0}")]
    Render(#[from] serde_yaml::Error),
    #[error("failed to write config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub tg: Telegram,
    /// Path to the SQLite file holding the WAT records.
    pub db: String,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub token: String,
    pub owner: i64,
    pub use_whitelist: bool,
    #[serde(default)]
    pub whitelist: BTreeMap<String, i64>,
}

/// Resolve the config path: an explicit path wins, then the environment.
pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    match std::env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => Ok(PathBuf::from(value)),
        _ => Err(ConfigError::NoPath),
    }
}

/// Load configuration from a YAML file and validate it. Any failure here is
/// fatal for startup.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.tg.token.trim().is_empty() {
        return Err(ConfigError::Invalid("tg.token must be non-empty"));
    }
    if cfg.tg.owner == 0 {
        return Err(ConfigError::Invalid("tg.owner must be a Telegram user id"));
    }
    if cfg.db.trim().is_empty() {
        return Err(ConfigError::Invalid("db must be non-empty"));
    }
    Ok(())
}

/// Serialize a config to the bytes that `persist` would write. Pure, so the
/// on-disk representation is testable without touching the filesystem.
pub fn render(cfg: &Config) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(cfg)
}

/// Overwrite the config file with the full current state. Writes a sibling
/// temp file first and renames it over the target so a crash mid-write leaves
/// the previous file intact.
pub fn persist(cfg: &Config, path: &Path) -> Result<(), PersistenceError> {
    let rendered = render(cfg)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, rendered)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Process-wide handle to the loaded config. The whitelist is the only field
/// mutated at runtime; every mutation is a read-modify-persist sequence under
/// this single lock, so there is at most one writer at a time.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<Mutex<State>>,
}

struct State {
    config: Config,
    path: PathBuf,
}

impl SharedConfig {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State { config, path })),
        }
    }

    /// Run a read-only closure against the current config.
    pub async fn with<R>(&self, f: impl FnOnce(&Config) -> R) -> R {
        let state = self.inner.lock().await;
        f(&state.config)
    }

    /// Snapshot of the whitelist for display.
    pub async fn whitelist(&self) -> BTreeMap<String, i64> {
        self.with(|cfg| cfg.tg.whitelist.clone()).await
    }

    /// Insert a whitelist entry and flush the file. Returns false without
    /// mutating anything if the name is already present. If the flush fails
    /// the insert is rolled back so memory and disk stay consistent.
    pub async fn add_whitelist_entry(
        &self,
        name: &str,
        user_id: i64,
    ) -> Result<bool, PersistenceError> {
        let mut state = self.inner.lock().await;
        if state.config.tg.whitelist.contains_key(name) {
            return Ok(false);
        }
        state.config.tg.whitelist.insert(name.to_string(), user_id);
        if let Err(err) = persist(&state.config, &state.path) {
            state.config.tg.whitelist.remove(name);
            return Err(err);
        }
        Ok(true)
    }

    /// Remove a whitelist entry and flush the file. Returns false without
    /// mutating anything if the name is absent.
    pub async fn remove_whitelist_entry(&self, name: &str) -> Result<bool, PersistenceError> {
        let mut state = self.inner.lock().await;
        let Some(user_id) = state.config.tg.whitelist.remove(name) else {
            return Ok(false);
        };
        if let Err(err) = persist(&state.config, &state.path) {
            state.config.tg.whitelist.insert(name.to_string(), user_id);
            return Err(err);
        }
        Ok(true)
    }
}

/// Example config, used by tests and as a template for new deployments.
pub fn example() -> &'static str {
    r#"tg:
  token: "YOUR_TELEGRAM_BOT_TOKEN"
  owner: 123456789
  use_whitelist: false
  whitelist:
    alice: 123456788

db: "./watbot.db"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_config() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_config();
        validate(&cfg).unwrap();
        assert_eq!(cfg.tg.owner, 123456789);
        assert_eq!(cfg.tg.whitelist.get("alice"), Some(&123456788));
    }

    #[test]
    fn invalid_token() {
        let mut cfg = example_config();
        cfg.tg.token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("tg.token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_owner() {
        let mut cfg = example_config();
        cfg.tg.owner = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_db_path() {
        let mut cfg = example_config();
        cfg.db = "  ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(&p).unwrap();
        assert_eq!(cfg.db, "./watbot.db");
    }

    #[test]
    fn load_missing_file_fails() {
        let td = tempdir().unwrap();
        let p = td.path().join("nope.yaml");
        assert!(matches!(load(&p), Err(ConfigError::Io(_))));
    }

    #[test]
    fn render_roundtrips() {
        let cfg = example_config();
        let rendered = render(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn resolve_path_prefers_explicit() {
        let p = resolve_path(Some(PathBuf::from("/tmp/cfg.yaml"))).unwrap();
        assert_eq!(p, PathBuf::from("/tmp/cfg.yaml"));
    }

    #[tokio::test]
    async fn add_whitelist_entry_persists_and_rejects_duplicates() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.yaml");
        fs::write(&path, example()).unwrap();
        let shared = SharedConfig::new(load(&path).unwrap(), path.clone());

        assert!(shared.add_whitelist_entry("bob", 42).await.unwrap());
        assert!(!shared.add_whitelist_entry("bob", 43).await.unwrap());

        let on_disk = load(&path).unwrap();
        assert_eq!(on_disk.tg.whitelist.get("bob"), Some(&42));
        assert_eq!(shared.whitelist().await.len(), 2);
    }

    #[tokio::test]
    async fn remove_whitelist_entry_persists() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.yaml");
        fs::write(&path, example()).unwrap();
        let shared = SharedConfig::new(load(&path).unwrap(), path.clone());

        assert!(shared.remove_whitelist_entry("alice").await.unwrap());
        assert!(!shared.remove_whitelist_entry("alice").await.unwrap());

        let on_disk = load(&path).unwrap();
        assert!(on_disk.tg.whitelist.is_empty());
    }
}
