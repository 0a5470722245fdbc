use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;
use crate::session::Timing;

/// User configuration, stored as TOML. Missing keys fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: String,
    pub countdown_ticks: u32,
    pub set_feedback_ms: u64,
    pub exercise_complete_ms: u64,
    pub personal_record_ms: u64,
    pub companion_elapsed_secs: u64,
    pub haptics: bool,
    pub log_level: String,
    /// `pretty`, `compact` or `json`.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "./repline.db".into(),
            countdown_ticks: 3,
            set_feedback_ms: 1_200,
            exercise_complete_ms: 2_000,
            personal_record_ms: 3_000,
            companion_elapsed_secs: 5,
            haptics: true,
            log_level: "info".into(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Config {
    /// `<config dir>/repline/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join("repline").join("config.toml"))
            .context("Could not determine config directory")
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let cfg: Self = toml::from_str(&raw)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to save config to {}", path.display()))
    }

    /// Feedback delays must be ordered PR > exercise complete > regular set.
    pub fn validate(&self) -> Result<()> {
        if self.countdown_ticks == 0 {
            bail!("countdown_ticks must be at least 1");
        }
        if self.companion_elapsed_secs == 0 {
            bail!("companion_elapsed_secs must be at least 1");
        }
        if self.set_feedback_ms == 0 {
            bail!("set_feedback_ms must be positive");
        }
        if !(self.personal_record_ms > self.exercise_complete_ms
            && self.exercise_complete_ms > self.set_feedback_ms)
        {
            bail!(
                "delays must satisfy personal_record_ms ({}) > exercise_complete_ms ({}) > set_feedback_ms ({})",
                self.personal_record_ms,
                self.exercise_complete_ms,
                self.set_feedback_ms
            );
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        Timing {
            countdown_ticks: self.countdown_ticks,
            set_feedback: Duration::from_millis(self.set_feedback_ms),
            exercise_complete: Duration::from_millis(self.exercise_complete_ms),
            personal_record: Duration::from_millis(self.personal_record_ms),
            companion_elapsed_secs: self.companion_elapsed_secs,
        }
    }

    /// All keys with their current values, in declaration order.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        let table = self.to_table()?;
        Ok(Self::keys()
            .iter()
            .filter_map(|k| table.get(*k).map(|v| (k.to_string(), render(v))))
            .collect())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let table = self.to_table()?;
        Ok(table.get(key).map(render))
    }

    /// Sets `key` from its textual form, keeping the value's type.
    pub fn set(&mut self, key: &str, val: &str) -> Result<()> {
        let mut table = self.to_table()?;
        let current = table
            .get(key)
            .with_context(|| format!("unknown config key `{key}`"))?;

        let parsed = match current {
            toml::Value::Integer(_) => toml::Value::Integer(
                val.parse()
                    .with_context(|| format!("`{key}` expects an integer, got `{val}`"))?,
            ),
            toml::Value::Boolean(_) => toml::Value::Boolean(
                val.parse()
                    .with_context(|| format!("`{key}` expects true or false, got `{val}`"))?,
            ),
            _ => toml::Value::String(val.to_string()),
        };
        table.insert(key.to_string(), parsed);

        let updated = Self::from_table(table)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Restores `key` to its default. Returns `false` for unknown keys.
    pub fn unset(&mut self, key: &str) -> Result<bool> {
        let defaults = Self::default().to_table()?;
        let Some(default) = defaults.get(key) else {
            return Ok(false);
        };

        let mut table = self.to_table()?;
        table.insert(key.to_string(), default.clone());
        let updated = Self::from_table(table)?;
        updated.validate()?;
        *self = updated;
        Ok(true)
    }

    fn to_table(&self) -> Result<toml::Table> {
        match toml::Value::try_from(self)? {
            toml::Value::Table(t) => Ok(t),
            _ => bail!("config did not serialize to a table"),
        }
    }

    fn from_table(table: toml::Table) -> Result<Self> {
        Ok(toml::Value::Table(table).try_into()?)
    }

    fn keys() -> &'static [&'static str] {
        &[
            "database",
            "countdown_ticks",
            "set_feedback_ms",
            "exercise_complete_ms",
            "personal_record_ms",
            "companion_elapsed_secs",
            "haptics",
            "log_level",
            "log_format",
        ]
    }
}

fn render(v: &toml::Value) -> String {
    match v {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
