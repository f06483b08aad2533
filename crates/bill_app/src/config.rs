use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bill_domain::config::ReminderConfig;
use chrono::NaiveTime;
use serde::Deserialize;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "bills.db";

/// Optional `config.toml` in the home directory.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    db: Option<PathBuf>,
    reminders: Option<ReminderConfig>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub reminders: ReminderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_home(default_home())
    }
}

impl AppConfig {
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            db_path: home.join(DB_FILE),
            home,
            reminders: ReminderConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from `BILLMINDER_*` variables supplied by
    /// `lookup`, layered over `config.toml` and the defaults. Malformed
    /// values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("BILLMINDER_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(default_home);
        let mut config = Self::with_home(home);
        config.merge_file()?;

        if let Some(db) = lookup("BILLMINDER_DB") {
            config.db_path = PathBuf::from(db);
        }
        if let Some(hour) = lookup("BILLMINDER_NOTIFY_HOUR") {
            match hour.trim().parse::<u32>().ok().and_then(|h| NaiveTime::from_hms_opt(h, 0, 0)) {
                Some(time) => config.reminders.notify_time = time,
                None => warn!(value = %hour, "ignoring invalid BILLMINDER_NOTIFY_HOUR"),
            }
        }
        if let Some(days) = lookup("BILLMINDER_RECOVERY_DAYS") {
            match days.trim().parse::<u32>() {
                Ok(value) => config.reminders.recovery_window_days = value,
                Err(_) => warn!(value = %days, "ignoring invalid BILLMINDER_RECOVERY_DAYS"),
            }
        }
        if let Some(currency) = lookup("BILLMINDER_CURRENCY") {
            config.reminders.currency_suffix = currency.trim().to_string();
        }
        Ok(config)
    }

    fn merge_file(&mut self) -> Result<()> {
        let path = self.home.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(());
        }
        let file = load_file(&path)?;
        debug!(path = %path.display(), "loaded config file");
        if let Some(db) = file.db {
            self.db_path = if db.is_relative() {
                self.home.join(db)
            } else {
                db
            };
        }
        if let Some(mut reminders) = file.reminders {
            for rejected in reminders.sanitize() {
                warn!(path = %path.display(), %rejected, "ignoring invalid reminder setting");
            }
            self.reminders = reminders;
        }
        Ok(())
    }
}

fn load_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn default_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".billminder"))
        .unwrap_or_else(|| PathBuf::from(".billminder"))
}
