//! Rotation configuration loaded from `rotor.toml`.
//!
//! ```toml
//! enabled = true
//! threshold = 3
//! injection_budget = 0.15
//! recent_pairs = 5
//! notify = true
//! context_capacity = 200000
//!
//! [archive]
//! retain = 0            # 0 keeps every archive
//!
//! [cooldown]
//! min_compactions = 2
//! min_minutes = 30
//!
//! [circuit_breaker]
//! max_rotations = 3
//! window_minutes = 60
//! ```
//!
//! Every key is optional; a missing file yields [`RotationConfig::default`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the configuration inside the state directory.
pub const CONFIG_FILE_NAME: &str = "rotor.toml";

/// Upper bound for every minute-valued setting (one year).
pub const MAX_MINUTES: i64 = 525_600;

/// Immutable rotation settings for one load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Kill switch for automatic rotation.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Cumulative degradation count at which rotation becomes eligible.
    #[serde(default = "default_threshold")]
    pub threshold: u64,
    /// Fraction of `context_capacity` the injection payload may occupy.
    #[serde(default = "default_injection_budget")]
    pub injection_budget: f64,
    /// Number of recent user/assistant exchanges carried into the new context.
    #[serde(default = "default_recent_pairs")]
    pub recent_pairs: usize,
    /// Whether the host should notify the user when a rotation lands.
    #[serde(default = "default_notify")]
    pub notify: bool,
    /// Context window of the host model in estimated token units.
    #[serde(default = "default_context_capacity")]
    pub context_capacity: usize,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// What happens to archived transcripts over time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Number of archives to keep after a rotation; 0 keeps all of them.
    #[serde(default)]
    pub retain: usize,
}

/// Floors that must both clear before another rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Degradation events required since the last rotation's trigger count.
    #[serde(default = "default_min_compactions")]
    pub min_compactions: u64,
    /// Minutes required since the last rotation.
    #[serde(default = "default_min_minutes")]
    pub min_minutes: i64,
}

/// Hard stop on rotations within a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_max_rotations")]
    pub max_rotations: usize,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
}

fn default_enabled() -> bool {
    true
}

fn default_threshold() -> u64 {
    3
}

fn default_injection_budget() -> f64 {
    0.15
}

fn default_recent_pairs() -> usize {
    5
}

fn default_notify() -> bool {
    true
}

fn default_context_capacity() -> usize {
    200_000
}

fn default_min_compactions() -> u64 {
    2
}

fn default_min_minutes() -> i64 {
    30
}

fn default_max_rotations() -> usize {
    3
}

fn default_window_minutes() -> i64 {
    60
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            threshold: default_threshold(),
            injection_budget: default_injection_budget(),
            recent_pairs: default_recent_pairs(),
            notify: default_notify(),
            context_capacity: default_context_capacity(),
            archive: ArchiveConfig::default(),
            cooldown: CooldownConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            min_compactions: default_min_compactions(),
            min_minutes: default_min_minutes(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_rotations: default_max_rotations(),
            window_minutes: default_window_minutes(),
        }
    }
}

impl RotationConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse rotor.toml")
    }

    /// Load `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check the configuration and return a list of problems.
    ///
    /// An empty list means the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.threshold == 0 {
            problems.push("threshold must be at least 1".to_string());
        }
        if !(self.injection_budget > 0.0 && self.injection_budget <= 1.0) {
            problems.push(format!(
                "injection_budget must be in (0, 1], got {}",
                self.injection_budget
            ));
        }
        if self.context_capacity == 0 {
            problems.push("context_capacity cannot be zero".to_string());
        }
        if self.cooldown.min_minutes < 0 {
            problems.push(format!(
                "cooldown.min_minutes cannot be negative, got {}",
                self.cooldown.min_minutes
            ));
        } else if self.cooldown.min_minutes > MAX_MINUTES {
            problems.push(format!(
                "cooldown.min_minutes cannot exceed {}, got {}",
                MAX_MINUTES, self.cooldown.min_minutes
            ));
        }
        if self.circuit_breaker.max_rotations == 0 {
            problems.push("circuit_breaker.max_rotations must be at least 1".to_string());
        }
        if self.circuit_breaker.window_minutes <= 0 {
            problems.push(format!(
                "circuit_breaker.window_minutes must be positive, got {}",
                self.circuit_breaker.window_minutes
            ));
        } else if self.circuit_breaker.window_minutes > MAX_MINUTES {
            problems.push(format!(
                "circuit_breaker.window_minutes cannot exceed {}, got {}",
                MAX_MINUTES, self.circuit_breaker.window_minutes
            ));
        }

        problems
    }

    /// Token budget for the injection payload before backoff.
    pub fn base_budget(&self) -> f64 {
        self.context_capacity as f64 * self.injection_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let cfg = RotationConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.threshold, 3);
        assert_eq!(cfg.recent_pairs, 5);
        assert_eq!(cfg.cooldown.min_minutes, 30);
        assert_eq!(cfg.circuit_breaker.max_rotations, 3);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_uses_defaults() {
        let cfg = RotationConfig::parse(
            r#"
threshold = 5

[cooldown]
min_minutes = 10
"#,
        )
        .unwrap();

        assert_eq!(cfg.threshold, 5);
        assert_eq!(cfg.cooldown.min_minutes, 10);
        assert_eq!(cfg.cooldown.min_compactions, 2);
        assert_eq!(cfg.context_capacity, 200_000);
        assert_eq!(cfg.archive.retain, 0);
    }

    #[test]
    fn test_parse_full() {
        let cfg = RotationConfig::parse(
            r#"
enabled = false
threshold = 4
injection_budget = 0.2
recent_pairs = 8
notify = false
context_capacity = 100000

[archive]
retain = 10

[cooldown]
min_compactions = 3
min_minutes = 45

[circuit_breaker]
max_rotations = 2
window_minutes = 90
"#,
        )
        .unwrap();

        assert!(!cfg.enabled);
        assert!(!cfg.notify);
        assert_eq!(cfg.recent_pairs, 8);
        assert_eq!(cfg.archive.retain, 10);
        assert_eq!(cfg.circuit_breaker.window_minutes, 90);
        assert!((cfg.base_budget() - 20_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        assert!(RotationConfig::parse("threshold = \"three\"").is_err());
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let cfg = RotationConfig {
            threshold: 0,
            injection_budget: 1.5,
            context_capacity: 0,
            circuit_breaker: CircuitBreakerConfig {
                max_rotations: 0,
                window_minutes: 0,
            },
            ..Default::default()
        };
        let problems = cfg.validate();
        assert_eq!(problems.len(), 5);
        assert!(problems.iter().any(|p| p.contains("injection_budget")));
    }

    #[test]
    fn test_validate_rejects_oversized_minutes() {
        let mut cfg = RotationConfig::default();
        cfg.cooldown.min_minutes = MAX_MINUTES;
        cfg.circuit_breaker.window_minutes = MAX_MINUTES;
        assert!(cfg.validate().is_empty());

        cfg.cooldown.min_minutes = i64::MAX;
        cfg.circuit_breaker.window_minutes = MAX_MINUTES + 1;
        let problems = cfg.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("cooldown.min_minutes cannot exceed")));
        assert!(problems.iter().any(|p| p.contains("window_minutes cannot exceed")));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let cfg = RotationConfig::load_or_default(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(cfg, RotationConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "recent_pairs = 2\n").unwrap();
        let cfg = RotationConfig::load_or_default(&path).unwrap();
        assert_eq!(cfg.recent_pairs, 2);
    }
}
