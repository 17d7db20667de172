use std::{env, fs, io, path::Path, str::FromStr};

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::ledger::{LedgerSettings, NewChild, StreakRule};
use carrot_shared::domain::ChildId;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_DB_PATH: &str = "data/carrot.db";

/// Commented starting point written by `carrot init-config`.
pub const EXAMPLE_CONFIG: &str = include_str!("../config.yaml.example");

/// Upper bound for `streak.bonus_delay_ms`: one day.
pub const MAX_BONUS_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub children: Vec<ChildConfig>,
    pub approval: ApprovalConfig,
    pub rewards: RewardsConfig,
    pub streak: StreakConfig,
    pub timer: TimerConfig,
    /// IANA zone name used for day boundaries.
    pub timezone: Option<String>,
    pub db_path: Option<String>,
    /// How many snapshots to keep after each save (default 50); 0 keeps all
    /// of them.
    pub snapshot_history: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            children: Vec::new(),
            approval: ApprovalConfig::default(),
            rewards: RewardsConfig::default(),
            streak: StreakConfig::default(),
            timer: TimerConfig::default(),
            timezone: None,
            db_path: None,
            snapshot_history: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub avatar_id: Option<String>,
    #[serde(default)]
    pub daily_limit_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub require_approval: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        ApprovalConfig {
            require_approval: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    pub time_ratio: u32,
    pub default_credit_minutes: u32,
    pub default_daily_limit_minutes: u32,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        RewardsConfig {
            time_ratio: 1,
            default_credit_minutes: 10,
            default_daily_limit_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakConfig {
    pub every: u32,
    pub bonus_minutes: u32,
    pub bonus_delay_ms: u64,
}

impl Default for StreakConfig {
    fn default() -> Self {
        StreakConfig {
            every: 3,
            bonus_minutes: 5,
            bonus_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub keep_elapsed_on_pause: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    /// Loads `CONFIG_PATH` (default `config.yaml`). A missing file means
    /// defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_or_default(path)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load_from_path(&path) {
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path=%path.as_ref().display(), "config file not found, using defaults");
                Ok(AppConfig::default())
            }
            other => other,
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rewards.time_ratio == 0 {
            return Err(ConfigError::Invalid("rewards.time_ratio must be at least 1".into()));
        }
        if self.rewards.default_credit_minutes == 0 {
            return Err(ConfigError::Invalid(
                "rewards.default_credit_minutes must be at least 1".into(),
            ));
        }
        if self.streak.every == 0 {
            return Err(ConfigError::Invalid("streak.every must be at least 1".into()));
        }
        self.bonus_delay()?;
        if let Some(c) = self.children.iter().find(|c| c.display_name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "child {:?} has an empty display_name",
                c.id
            )));
        }
        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        match self.timezone.as_deref() {
            None => Ok(Tz::UTC),
            Some(name) => Tz::from_str(name)
                .map_err(|e| ConfigError::Invalid(format!("timezone {name}: {e}"))),
        }
    }

    fn bonus_delay(&self) -> Result<Duration, ConfigError> {
        let ms = self.streak.bonus_delay_ms;
        if ms > MAX_BONUS_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "streak.bonus_delay_ms must be at most {MAX_BONUS_DELAY_MS}"
            )));
        }
        i64::try_from(ms)
            .map(Duration::milliseconds)
            .map_err(|_| ConfigError::Invalid("streak.bonus_delay_ms is too large".into()))
    }

    /// `DB_PATH` env wins over `db_path` in the file.
    pub fn resolve_db_path(&self) -> String {
        env::var("DB_PATH")
            .ok()
            .or_else(|| self.db_path.clone())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
    }

    pub fn ledger_settings(&self) -> Result<LedgerSettings, ConfigError> {
        Ok(LedgerSettings {
            require_approval: self.approval.require_approval,
            time_ratio: self.rewards.time_ratio,
            default_credit_minutes: self.rewards.default_credit_minutes,
            default_daily_limit_minutes: self.rewards.default_daily_limit_minutes,
            keep_elapsed_on_pause: self.timer.keep_elapsed_on_pause,
            streak: StreakRule {
                every: self.streak.every,
                bonus_minutes: self.streak.bonus_minutes,
                bonus_delay: self.bonus_delay()?,
            },
            timezone: self.timezone()?,
        })
    }

    /// Children to upsert on startup.
    pub fn seed_children(&self) -> Vec<NewChild> {
        self.children
            .iter()
            .map(|c| NewChild {
                id: c.id.as_deref().map(ChildId::from),
                display_name: c.display_name.clone(),
                age: c.age,
                avatar_id: c.avatar_id.clone(),
                daily_limit_minutes: c.daily_limit_minutes,
                is_locked: false,
            })
            .collect()
    }
}
