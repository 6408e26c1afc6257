// Read-only engine configuration, shared between evaluators

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::datetime::{self, DateTimeError};

/// Default nesting limit for node evaluation.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 302;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Timezone(#[from] DateTimeError),
}

/// Engine configuration.
///
/// ```json
/// {"timezone": "Europe/Oslo", "disabledOperations": ["core:wait"], "maxRecursionDepth": 500}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// IANA timezone used by the clock built-ins.
    pub timezone: String,
    /// Operations that raise `OPERATION_DISABLED`, as `namespace:name` or a
    /// bare `name` matching every namespace.
    pub disabled_operations: Vec<String>,
    pub max_recursion_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timezone: "UTC".to_string(),
            disabled_operations: Vec::new(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl Config {
    /// Load from JSON; the timezone is validated.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, DateTimeError> {
        datetime::parse_timezone(&self.timezone)
    }

    pub fn with_timezone(mut self, timezone: &str) -> Result<Self, ConfigError> {
        datetime::parse_timezone(timezone)?;
        self.timezone = timezone.to_string();
        Ok(self)
    }

    pub fn disable(mut self, operation: &str) -> Self {
        self.disabled_operations.push(operation.to_string());
        self
    }

    pub fn is_disabled(&self, namespace: &str, name: &str) -> bool {
        self.disabled_operations.iter().any(|op| match op.split_once(':') {
            Some((ns, n)) => ns == namespace && n == name,
            None => op == name,
        })
    }
}
