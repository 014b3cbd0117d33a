//! Transaction manager configuration
//!
//! ## Loading
//!
//! ```
//! use tessel_core::StmConfig;
//!
//! let config = StmConfig::from_toml_str(
//!     r#"
//!     validate_interval = 64
//!     conflict_warn_threshold = 10
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.validate_interval, 64);
//! ```
//!
//! Missing keys fall back to [`StmConfig::default`].

use crate::error::ConfigError;
use serde::Deserialize;

/// Default number of interpreter steps between mid-evaluation validations
pub const DEFAULT_VALIDATE_INTERVAL: u32 = 128;

/// Default number of conflicts for one commit before a warning is logged
pub const DEFAULT_CONFLICT_WARN_THRESHOLD: u32 = 64;

/// Tunables of a `TransactionManager`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StmConfig {
    /// Interpreter steps between journal revalidations during evaluation
    ///
    /// An attempt that observes an inconsistent snapshot is abandoned early
    /// instead of running to completion. `0` disables periodic validation;
    /// the journal is still validated at commit and before blocking.
    pub validate_interval: u32,

    /// Conflicts a single commit may suffer before a warning is logged
    ///
    /// Retries are never bounded; this only controls diagnostics.
    pub conflict_warn_threshold: u32,
}

impl Default for StmConfig {
    fn default() -> Self {
        StmConfig {
            validate_interval: DEFAULT_VALIDATE_INTERVAL,
            conflict_warn_threshold: DEFAULT_CONFLICT_WARN_THRESHOLD,
        }
    }
}

impl StmConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: StmConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the validation interval
    pub fn with_validate_interval(mut self, steps: u32) -> Self {
        self.validate_interval = steps;
        self
    }

    /// Set the conflict warning threshold
    pub fn with_conflict_warn_threshold(mut self, conflicts: u32) -> Self {
        self.conflict_warn_threshold = conflicts;
        self
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conflict_warn_threshold == 0 {
            return Err(ConfigError::Invalid(
                "conflict_warn_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether mid-evaluation validation is due after `steps` interpreter steps
    #[inline]
    pub fn validation_due(&self, steps: u64) -> bool {
        self.validate_interval != 0 && steps % u64::from(self.validate_interval) == 0
    }
}
