//! Trawl configuration file
//!
//! Config file: ~/.config/trawl/config.toml or /etc/trawl/config.toml.
//! Every setting is optional; whatever is present is seeded into the fact
//! table before command-line values are applied on top.

use crate::error::{Result, TrawlError};
use crate::facts::{check_timeout, FactTable, FactValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Color display mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Color when writing to a terminal
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    pub fn parse(mode: &str) -> Result<Self> {
        match mode.to_lowercase().as_str() {
            "auto" => Ok(ColorMode::Auto),
            "always" | "on" | "yes" | "true" => Ok(ColorMode::Always),
            "never" | "off" | "no" | "false" | "none" => Ok(ColorMode::Never),
            _ => Err(TrawlError::Config(format!(
                "Invalid color mode: '{}'. Valid values: auto, always, never",
                mode
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMode::Auto => "auto",
            ColorMode::Always => "always",
            ColorMode::Never => "never",
        }
    }
}

/// Main trawl configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrawlConfig {
    /// Phase budget in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncate: Option<bool>,

    /// Report to render with when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_list: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_list: Vec<String>,

    #[serde(default)]
    pub color: ColorMode,

    /// Extra seed facts
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facts: BTreeMap<String, toml::Value>,
}

impl TrawlConfig {
    /// Get default user config path: ~/.config/trawl/config.toml
    pub fn user_config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            if !dir.is_empty() {
                return Some(Path::new(&dir).join("trawl").join("config.toml"));
            }
        }
        let home = std::env::var("HOME").ok()?;
        Some(Path::new(&home).join(".config").join("trawl").join("config.toml"))
    }

    /// Get system config path: /etc/trawl/config.toml
    pub fn system_config_path() -> PathBuf {
        PathBuf::from("/etc/trawl/config.toml")
    }

    /// Load configuration
    ///
    /// Priority:
    /// 1. `explicit` path (must exist)
    /// 2. User config (~/.config/trawl/config.toml)
    /// 3. System config (/etc/trawl/config.toml)
    /// 4. Defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let candidates = Self::user_config_path()
            .into_iter()
            .chain(std::iter::once(Self::system_config_path()));
        for path in candidates {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Parse one config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            TrawlError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: TrawlConfig = toml::from_str(&contents).map_err(|e| {
            TrawlError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        if let Some(timeout) = config.timeout {
            check_timeout(timeout)
                .map_err(|e| TrawlError::Config(format!("{}: {}", path.display(), e)))?;
        }
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Seed every setting present in this file into `facts`
    pub fn apply(&self, facts: &mut FactTable) {
        if let Some(timeout) = self.timeout {
            facts.set("timeout", number(timeout));
        }
        if let Some(verbose) = self.verbose {
            facts.set("verbose", verbose);
        }
        if let Some(truncate) = self.truncate {
            facts.set("truncate", truncate);
        }
        if let Some(dir) = &self.plugin_dir {
            facts.set("plugin_dir", dir.display().to_string());
        }
        if !self.allow_list.is_empty() {
            facts.set("allow_list", self.allow_list.clone());
        }
        if !self.deny_list.is_empty() {
            facts.set("deny_list", self.deny_list.clone());
        }
        if self.color != ColorMode::Auto {
            facts.set("color", self.color.as_str());
        }
        for (name, value) in &self.facts {
            facts.set(name, fact_value(value));
        }
    }
}

/// Whole numbers stay integers so `timeout = 600` reads back as 600
fn number(value: f64) -> FactValue {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        FactValue::Int(value as i64)
    } else {
        FactValue::Float(value)
    }
}

fn fact_value(value: &toml::Value) -> FactValue {
    match value {
        toml::Value::String(s) => FactValue::coerce(s),
        toml::Value::Integer(n) => FactValue::Int(*n),
        toml::Value::Float(f) => FactValue::Float(*f),
        toml::Value::Boolean(b) => FactValue::Bool(*b),
        toml::Value::Array(items) => FactValue::List(items.iter().map(fact_value).collect()),
        other => FactValue::Text(other.to_string()),
    }
}
