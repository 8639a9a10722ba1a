//! Engine configuration.
//!
//! # Responsibility
//! - Hold integrator-selected policy variants and listing limits.
//! - Parse configuration documents (JSON) with strict key checking.
//!
//! # Invariants
//! - Every field has a default; an empty document yields `EngineConfig::default()`.
//! - `list_default_limit` never exceeds `list_max_limit` after validation.

use crate::policy::access::ManagerReadScope;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_LIST_LIMIT: u32 = 20;
const DEFAULT_LIST_MAX_LIMIT: u32 = 100;

/// Whether a missing task may be distinguished from a forbidden one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceDisclosure {
    /// Existence is checked before authorization; absent tasks report
    /// `NotFound` to every caller.
    #[default]
    RevealMissing,
    /// Denied access to an existing task also reports `NotFound`.
    Conceal,
}

/// Configuration for `TaskService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub manager_read_scope: ManagerReadScope,
    pub existence_disclosure: ExistenceDisclosure,
    /// Page size used when a listing request carries no limit.
    pub list_default_limit: u32,
    /// Upper bound for requested page sizes.
    pub list_max_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manager_read_scope: ManagerReadScope::default(),
            existence_disclosure: ExistenceDisclosure::default(),
            list_default_limit: DEFAULT_LIST_LIMIT,
            list_max_limit: DEFAULT_LIST_MAX_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.list_max_limit == 0 {
            return Err(ConfigError::InvalidLimit(
                "list_max_limit must be greater than zero",
            ));
        }
        if self.list_default_limit == 0 || self.list_default_limit > self.list_max_limit {
            return Err(ConfigError::InvalidLimit(
                "list_default_limit must be within 1..=list_max_limit",
            ));
        }
        Ok(())
    }

    /// Clamps a requested page size into `1..=list_max_limit`.
    ///
    /// `None` and `Some(0)` fall back to `list_default_limit`. Zero limits in a
    /// config that skipped `validate` still yield at least one row.
    pub fn normalize_limit(&self, requested: Option<u32>) -> u32 {
        let max = self.list_max_limit.max(1);
        match requested {
            None | Some(0) => self.list_default_limit.clamp(1, max),
            Some(value) => value.min(max),
        }
    }
}

/// Configuration parse/validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    InvalidLimit(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid engine config: {message}"),
            Self::InvalidLimit(message) => write!(f, "invalid engine config: {message}"),
        }
    }
}

impl Error for ConfigError {}
