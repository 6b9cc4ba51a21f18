use crate::service::AuthUser;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const URL_ENV: &str = "PINBOARD_URL";
pub const ANON_KEY_ENV: &str = "PINBOARD_ANON_KEY";

/// Where pinboard keeps its files on this machine.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_file: PathBuf,
    pub session_file: PathBuf,
    pub log_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    /// Write column order back after a column drag. When off, column
    /// reorders only live for the current board session.
    #[serde(default = "default_true")]
    pub persist_column_order: bool,
    #[serde(default)]
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Paths {
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "pinboard").context("locating data directory")?;
        Ok(Paths {
            config_file: dirs.config_dir().join("config.yml"),
            session_file: dirs.data_dir().join("session.yml"),
            log_dir: dirs.data_dir().join("logs"),
        })
    }

    #[cfg(test)]
    pub fn in_dir(root: &Path) -> Self {
        Paths {
            config_file: root.join("config.yml"),
            session_file: root.join("session.yml"),
            log_dir: root.join("logs"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            url: None,
            anon_key: None,
            persist_column_order: true,
            log_filter: None,
        }
    }
}

impl Config {
    pub fn service(&self) -> Result<ServiceConfig> {
        let url = self
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "no data service URL configured (run `pinboard configure --url <url>` or set {})",
                    URL_ENV
                )
            })?;
        let anon_key = self
            .anon_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "no anon key configured (run `pinboard configure --anon-key <key>` or set {})",
                    ANON_KEY_ENV
                )
            })?;
        Ok(ServiceConfig { url, anon_key })
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(URL_ENV) {
            self.url = Some(url);
        }
        if let Some(key) = lookup(ANON_KEY_ENV) {
            self.anon_key = Some(key);
        }
    }
}

impl StoredSession {
    /// Treats tokens within a minute of expiry as already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(60) <= now
    }
}

pub fn load_config(paths: &Paths) -> Result<Config> {
    let mut config = read_config_file(&paths.config_file)?;
    config.apply_overrides(|key| env::var(key).ok().filter(|v| !v.is_empty()));
    Ok(config)
}

/// The config as written on disk, without environment overrides.
pub fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let data = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    serde_yaml::from_str(&data).context("parsing config file")
}

pub fn save_config(paths: &Paths, config: &Config) -> Result<()> {
    write_yaml(&paths.config_file, config).context("saving config")
}

pub fn load_session(paths: &Paths) -> Result<Option<StoredSession>> {
    if !paths.session_file.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(&paths.session_file)
        .with_context(|| format!("reading {:?}", paths.session_file))?;
    let session = serde_yaml::from_str(&data).context("parsing session file")?;
    Ok(Some(session))
}

pub fn save_session(paths: &Paths, session: &StoredSession) -> Result<()> {
    write_yaml(&paths.session_file, session).context("saving session")
}

/// Returns whether a session file was removed.
pub fn clear_session(paths: &Paths) -> Result<bool> {
    if !paths.session_file.exists() {
        return Ok(false);
    }
    fs::remove_file(&paths.session_file)
        .with_context(|| format!("removing {:?}", paths.session_file))?;
    Ok(true)
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(value).context("serializing")?;
    fs::write(path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}

fn default_true() -> bool {
    true
}
