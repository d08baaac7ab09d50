//! Fact table shared by every unit of a run.
//!
//! Names are case-insensitive: `Pid`, `pid` and `PID` are the same fact, and
//! the first spelling seen is kept for display. The table only ever grows
//! while facts are being resolved; an existing name is never silently
//! replaced.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Default wall-clock budget for one phase, in seconds
pub const DEFAULT_TIMEOUT_SECS: i64 = 600;

/// Longest budget a phase may be given, in seconds (one week)
pub const MAX_TIMEOUT_SECS: i64 = 7 * 24 * 3600;

/// Validate a phase budget given in seconds
pub fn check_timeout(secs: f64) -> std::result::Result<f64, String> {
    if secs.is_finite() && (0.0..=MAX_TIMEOUT_SECS as f64).contains(&secs) {
        Ok(secs)
    } else {
        Err(format!(
            "timeout must be between 0 and {} seconds, got {}",
            MAX_TIMEOUT_SECS, secs
        ))
    }
}

/// A single fact value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FactValue>),
}

impl FactValue {
    /// Convert text to the simplest type it represents.
    ///
    /// `true`/`false` (any case) become booleans, then integers and floats are
    /// tried; everything else stays text.
    pub fn coerce(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            return FactValue::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return FactValue::Bool(false);
        }
        if let Ok(n) = raw.parse::<i64>() {
            return FactValue::Int(n);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return FactValue::Float(f);
        }
        FactValue::Text(raw.to_string())
    }

    /// Truthiness in the usual scripting sense
    pub fn is_truthy(&self) -> bool {
        match self {
            FactValue::Bool(b) => *b,
            FactValue::Int(n) => *n != 0,
            FactValue::Float(f) => *f != 0.0,
            FactValue::Text(s) => !s.is_empty(),
            FactValue::List(items) => !items.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FactValue::Int(n) => Some(*n as f64),
            FactValue::Float(f) => Some(*f),
            FactValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FactValue::Int(n) => Some(*n),
            FactValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            FactValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FactValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Bool(b) => write!(f, "{}", b),
            FactValue::Int(n) => write!(f, "{}", n),
            FactValue::Float(x) => write!(f, "{}", x),
            FactValue::Text(s) => write!(f, "{}", s),
            FactValue::List(items) => {
                let joined: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", joined.join(","))
            }
        }
    }
}

impl From<bool> for FactValue {
    fn from(b: bool) -> Self {
        FactValue::Bool(b)
    }
}

impl From<i64> for FactValue {
    fn from(n: i64) -> Self {
        FactValue::Int(n)
    }
}

impl From<f64> for FactValue {
    fn from(f: f64) -> Self {
        FactValue::Float(f)
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        FactValue::Text(s.to_string())
    }
}

impl From<String> for FactValue {
    fn from(s: String) -> Self {
        FactValue::Text(s)
    }
}

impl From<Vec<String>> for FactValue {
    fn from(items: Vec<String>) -> Self {
        FactValue::List(items.into_iter().map(FactValue::Text).collect())
    }
}

/// Two different values offered for the same fact name
#[derive(Debug, Clone, PartialEq)]
pub struct FactCollision {
    pub name: String,
    /// Value present before the offer
    pub existing: FactValue,
    pub offered: FactValue,
    /// True when the offered value replaced the kept one
    pub replaced: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct FactEntry {
    /// Spelling used the first time this fact was added
    name: String,
    value: FactValue,
}

/// Case-insensitive name -> value map
#[derive(Debug, Clone, PartialEq)]
pub struct FactTable {
    entries: BTreeMap<String, FactEntry>,
    collisions: Vec<FactCollision>,
}

impl Default for FactTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FactTable {
    /// New table seeded with the default timeout
    pub fn new() -> Self {
        let mut table = Self::empty();
        table.set("timeout", FactValue::Int(DEFAULT_TIMEOUT_SECS));
        table
    }

    /// New table without any seed facts
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            collisions: Vec::new(),
        }
    }

    fn fold(name: &str) -> String {
        name.to_lowercase()
    }

    /// Set a fact, replacing any existing value.
    ///
    /// This is the path for seed values (defaults, config, command line).
    /// Replacing a different value is logged and recorded.
    pub fn set(&mut self, name: &str, value: impl Into<FactValue>) {
        let value = value.into();
        let key = Self::fold(name);

        if let Some(existing) = self.entries.get_mut(&key) {
            if existing.value != value {
                warn!(
                    "Fact {} with value of {} is being replaced with {}",
                    existing.name, existing.value, value
                );
                self.collisions.push(FactCollision {
                    name: existing.name.clone(),
                    existing: existing.value.clone(),
                    offered: value.clone(),
                    replaced: true,
                });
            }
            existing.value = value;
            debug!("Updated fact {} with value of {}", existing.name, existing.value);
            return;
        }

        debug!("Added fact {} with value of {}", name, value);
        self.entries.insert(
            key,
            FactEntry {
                name: name.to_string(),
                value,
            },
        );
    }

    /// Set a fact from text, converting numbers and booleans to their types
    pub fn set_coerced(&mut self, name: &str, raw: &str) {
        self.set(name, FactValue::coerce(raw));
    }

    /// Add a fact found while resolving. Never overwrites.
    ///
    /// Returns true only when the name was new. A different value for an
    /// existing name is rejected, logged and recorded.
    pub fn insert_discovered(&mut self, name: &str, value: FactValue) -> bool {
        let key = Self::fold(name);

        if let Some(existing) = self.entries.get(&key) {
            if existing.value == value {
                debug!("Fact {} already known with the same value", existing.name);
            } else {
                warn!(
                    "Fact {} keeps value {}, rejected new value {}",
                    existing.name, existing.value, value
                );
                self.collisions.push(FactCollision {
                    name: existing.name.clone(),
                    existing: existing.value.clone(),
                    offered: value,
                    replaced: false,
                });
            }
            return false;
        }

        debug!("Discovered fact {} with value of {}", name, value);
        self.entries.insert(
            key,
            FactEntry {
                name: name.to_string(),
                value,
            },
        );
        true
    }

    pub fn get(&self, name: &str) -> Option<&FactValue> {
        self.entries.get(&Self::fold(name)).map(|e| &e.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&Self::fold(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate (display name, value) ordered by folded name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FactValue)> {
        self.entries.values().map(|e| (e.name.as_str(), &e.value))
    }

    /// Every replaced or rejected value seen so far
    pub fn collisions(&self) -> &[FactCollision] {
        &self.collisions
    }

    /// Truthiness of a fact; missing facts are false
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).map(FactValue::is_truthy).unwrap_or(false)
    }

    pub fn verbose(&self) -> bool {
        self.flag("verbose")
    }

    /// Phase budget from the `timeout` fact (seconds, fractions allowed).
    ///
    /// Unusable values fall back to the default; values past the maximum
    /// are capped at it.
    pub fn timeout(&self) -> Duration {
        let secs = self
            .get("timeout")
            .and_then(FactValue::as_f64)
            .filter(|s| !s.is_nan() && *s >= 0.0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS as f64)
            .min(MAX_TIMEOUT_SECS as f64);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS as u64))
    }

    /// A fact read as a list of names: lists as-is, text split on commas
    pub fn names(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(FactValue::List(items)) => items
                .iter()
                .map(|v| v.to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(FactValue::Text(s)) => s
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
            Some(other) => vec![other.to_string()],
            None => Vec::new(),
        }
    }

    /// JSON object of display name -> value
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .iter()
            .map(|(name, value)| {
                let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                (name.to_string(), json)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_simple_types() {
        assert_eq!(FactValue::coerce("false"), FactValue::Bool(false));
        assert_eq!(FactValue::coerce("False"), FactValue::Bool(false));
        assert_eq!(FactValue::coerce("TRUE"), FactValue::Bool(true));
        assert_eq!(FactValue::coerce("1"), FactValue::Int(1));
        assert_eq!(FactValue::coerce("1.0"), FactValue::Float(1.0));
        assert_eq!(FactValue::coerce("foo"), FactValue::Text("foo".to_string()));
        assert_eq!(FactValue::coerce(""), FactValue::Text(String::new()));
    }

    #[test]
    fn test_new_table_has_default_timeout() {
        let table = FactTable::new();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("timeout"), Some(&FactValue::Int(600)));
        assert_eq!(table.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut table = FactTable::empty();
        table.set("Pid", 42i64);
        assert!(table.contains("pid"));
        assert!(table.contains("PID"));
        assert_eq!(table.get("pId"), Some(&FactValue::Int(42)));

        // First spelling is kept for display
        table.set("PID", 43i64);
        let names: Vec<&str> = table.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Pid"]);
    }

    #[test]
    fn test_set_records_replacement() {
        let mut table = FactTable::new();
        table.set("timeout", 5i64);
        assert_eq!(table.timeout(), Duration::from_secs(5));
        assert_eq!(table.collisions().len(), 1);
        assert!(table.collisions()[0].replaced);

        // Same value again is not a collision
        table.set("timeout", 5i64);
        assert_eq!(table.collisions().len(), 1);
    }

    #[test]
    fn test_insert_discovered_never_overwrites() {
        let mut table = FactTable::empty();
        assert!(table.insert_discovered("Hostname", FactValue::from("a.example")));
        assert!(!table.insert_discovered("hostname", FactValue::from("a.example")));
        assert!(table.collisions().is_empty());

        assert!(!table.insert_discovered("HOSTNAME", FactValue::from("b.example")));
        assert_eq!(table.get("hostname"), Some(&FactValue::from("a.example")));
        assert_eq!(table.len(), 1);

        let collision = &table.collisions()[0];
        assert_eq!(collision.existing, FactValue::from("a.example"));
        assert_eq!(collision.offered, FactValue::from("b.example"));
        assert!(!collision.replaced);
    }

    #[test]
    fn test_fractional_and_bad_timeouts() {
        let mut table = FactTable::new();
        table.set_coerced("timeout", "1.5");
        assert_eq!(table.timeout(), Duration::from_millis(1500));

        table.set_coerced("timeout", "soon");
        assert_eq!(table.timeout(), Duration::from_secs(600));

        table.set_coerced("timeout", "1e20");
        assert_eq!(table.timeout(), Duration::from_secs(MAX_TIMEOUT_SECS as u64));
        table.set_coerced("timeout", "inf");
        assert_eq!(table.timeout(), Duration::from_secs(MAX_TIMEOUT_SECS as u64));
        table.set_coerced("timeout", "-3");
        assert_eq!(table.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_check_timeout_bounds() {
        assert_eq!(check_timeout(0.0), Ok(0.0));
        assert_eq!(check_timeout(2.5), Ok(2.5));
        assert!(check_timeout(MAX_TIMEOUT_SECS as f64).is_ok());
        assert!(check_timeout(1e20).is_err());
        assert!(check_timeout(-1.0).is_err());
        assert!(check_timeout(f64::NAN).is_err());
    }

    #[test]
    fn test_names_from_list_or_text() {
        let mut table = FactTable::empty();
        table.set("allow_list", vec!["LoadAvg".to_string(), "hostname".to_string()]);
        table.set("deny_list", "DiskUsage, MemUsage,");
        assert_eq!(table.names("allow_list"), vec!["LoadAvg", "hostname"]);
        assert_eq!(table.names("deny_list"), vec!["DiskUsage", "MemUsage"]);
        assert!(table.names("missing").is_empty());
    }

    #[test]
    fn test_flags() {
        let mut table = FactTable::empty();
        assert!(!table.verbose());
        table.set_coerced("verbose", "True");
        assert!(table.verbose());
        table.set("verbose", 0i64);
        assert!(!table.verbose());
    }

    #[test]
    fn test_to_json_uses_display_names() {
        let mut table = FactTable::empty();
        table.set("Pid", 7i64);
        table.set("verbose", true);
        let json = table.to_json();
        assert_eq!(json["Pid"], serde_json::json!(7));
        assert_eq!(json["verbose"], serde_json::json!(true));
    }
}
