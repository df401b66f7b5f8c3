//! Configuration accepted by [`crate::dispatch::Core::init`].

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};

/// The single recognized set of options.
///
/// Parsing a `Config` out of a particular file format (TOML, JSON, env) is
/// an application concern; this type only defines the shape, via `serde`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of concurrent in-flight requests plus established
    /// calls. Must be at least 1.
    pub max_active_calls: u32,
}

impl Config {
    /// Build a config, checking `max_active_calls >= 1` immediately.
    pub fn new(max_active_calls: u32) -> Result<Self> {
        let cfg = Config { max_active_calls };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate the options, matching the original `max_active_call < 1`
    /// rejection performed by `CallManager::init`.
    pub fn validate(&self) -> Result<()> {
        if self.max_active_calls < 1 {
            return Err(CoreError::InvalidConfig(
                "max_active_calls must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
