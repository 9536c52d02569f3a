//! Simulation configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Switches controlling diagnostics of a simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Log formula invocations that read non-default inputs, and accept
    /// results containing NaN.
    pub debug: bool,
    /// With `debug`, log every invocation.
    pub debug_all: bool,
    /// Keep trace entries and invocation records.
    pub trace: bool,
}

impl SimulationConfig {
    /// Validate the configuration.
    ///
    /// This is called when constructing a `Simulation`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if `debug_all` is set without
    /// `debug`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.debug_all && !self.debug {
            return Err(ValidationError::InvalidConfig {
                reason: "debug_all requires debug".to_string(),
            });
        }
        Ok(())
    }

    /// Default-argument bookkeeping is needed to filter debug logs or fill
    /// trace entries.
    #[must_use]
    pub fn tracks_default_arguments(&self) -> bool {
        (self.debug && !self.debug_all) || self.trace
    }
}
