//! Prioritized alternative formulas.

use tracing::debug;

use crate::error::{CalcResult, ValidationError};
use crate::simulation::{RequestTracker, Simulation};
use crate::time::Period;
use crate::variable::Variable;

use super::{Formula, Resolution};

/// Candidates tried in priority order; the first that resolves wins.
///
/// Each candidate is tried lazily. When none resolves and the request is not
/// lazy, the first candidate is computed in full.
#[derive(Debug, Clone)]
pub struct AlternativeFormulas {
    candidates: Vec<Formula>,
}

impl AlternativeFormulas {
    /// Creates the group.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidDefinition` if `candidates` is empty.
    pub fn new(candidates: Vec<Formula>) -> Result<Self, ValidationError> {
        if candidates.is_empty() {
            return Err(ValidationError::InvalidDefinition {
                name: "alternatives".to_string(),
                reason: "at least one alternative formula is required".to_string(),
            });
        }
        Ok(Self { candidates })
    }

    pub fn candidates(&self) -> &[Formula] {
        &self.candidates
    }

    pub(crate) fn compute(
        &self,
        sim: &mut Simulation,
        variable: &Variable,
        period: Period,
        lazy: bool,
        tracker: &mut RequestTracker,
    ) -> CalcResult<Resolution> {
        let mut last = None;
        for (index, candidate) in self.candidates.iter().enumerate() {
            let resolution = candidate.compute(sim, variable, period, true, tracker)?;
            if resolution.array.is_some() {
                debug!(variable = variable.name(), period = %period, alternative = index, "alternative resolved");
                return Ok(resolution.used_at(index));
            }
            last = Some(resolution);
        }
        if lazy {
            return Ok(last.unwrap_or_else(|| Resolution::absent(period)));
        }
        debug!(variable = variable.name(), period = %period, "no alternative resolved, computing the first one");
        let resolution = self.candidates[0].compute(sim, variable, period, false, tracker)?;
        Ok(resolution.used_at(0))
    }
}
