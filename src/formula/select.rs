//! Formulas selected by which input variable is already known.

use tracing::debug;

use crate::error::{CalcResult, ValidationError};
use crate::simulation::{RequestTracker, Simulation};
use crate::time::Period;
use crate::variable::Variable;

use super::{Formula, Resolution};

/// Ordered pairs of a main input variable and the formula to use when that
/// input already has a value for the requested period.
///
/// Falls back to the first pair when no main input is present.
#[derive(Debug, Clone)]
pub struct SelectFormula {
    choices: Vec<(String, Formula)>,
}

impl SelectFormula {
    /// Creates the selection.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidDefinition` if `choices` is empty or
    /// names a main variable twice.
    pub fn new(choices: Vec<(String, Formula)>) -> Result<Self, ValidationError> {
        if choices.is_empty() {
            return Err(ValidationError::InvalidDefinition {
                name: "select".to_string(),
                reason: "at least one main variable is required".to_string(),
            });
        }
        for (i, (main, _)) in choices.iter().enumerate() {
            if choices[..i].iter().any(|(other, _)| other == main) {
                return Err(ValidationError::InvalidDefinition {
                    name: main.clone(),
                    reason: "main variable listed twice".to_string(),
                });
            }
        }
        Ok(Self { choices })
    }

    pub fn choices(&self) -> &[(String, Formula)] {
        &self.choices
    }

    pub fn main_variables(&self) -> impl Iterator<Item = &str> {
        self.choices.iter().map(|(main, _)| main.as_str())
    }

    pub(crate) fn compute(
        &self,
        sim: &mut Simulation,
        variable: &Variable,
        period: Period,
        lazy: bool,
        tracker: &mut RequestTracker,
    ) -> CalcResult<Resolution> {
        let mut selected = 0;
        for (index, (main, _)) in self.choices.iter().enumerate() {
            if sim.compute_variable(main, period, true, tracker)?.is_some() {
                selected = index;
                break;
            }
        }
        let (main, formula) = &self.choices[selected];
        debug!(variable = variable.name(), period = %period, main = main.as_str(), "formula selected");
        let resolution = formula.compute(sim, variable, period, lazy, tracker)?;
        Ok(resolution.used_at(selected))
    }
}
