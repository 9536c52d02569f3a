//! Time-sliced formulas: one formula per validity range.

use tracing::debug;

use crate::error::{CalcResult, ValidationError};
use crate::simulation::{RequestTracker, Simulation};
use crate::time::{Instant, Period, PeriodUnit};
use crate::variable::Variable;

use super::{Formula, Resolution};

/// A formula in force over `[start, stop]`.
#[derive(Debug, Clone)]
pub struct DatedSlice {
    /// First day the formula applies.
    pub start: Instant,
    /// Last day the formula applies.
    pub stop: Instant,
    /// The formula.
    pub formula: Formula,
}

/// Sequence of formulas by validity range, sorted by start.
///
/// A request is delegated to the first slice that intersects it, at the
/// intersection. Periods no slice resolves are filled with the variable's
/// default value.
#[derive(Debug, Clone)]
pub struct DatedFormula {
    slices: Vec<DatedSlice>,
}

impl DatedFormula {
    #[must_use]
    pub fn builder() -> DatedFormulaBuilder {
        DatedFormulaBuilder::default()
    }

    pub fn slices(&self) -> &[DatedSlice] {
        &self.slices
    }

    pub(crate) fn compute(
        &self,
        sim: &mut Simulation,
        variable: &Variable,
        period: Period,
        lazy: bool,
        tracker: &mut RequestTracker,
    ) -> CalcResult<Resolution> {
        let stop = period.stop();
        let mut lazy_miss = false;
        for (index, slice) in self.slices.iter().enumerate() {
            if slice.start > stop {
                break;
            }
            let Some(output) = period.intersection(Some(slice.start), Some(slice.stop)) else {
                continue;
            };
            let resolution = slice.formula.compute(sim, variable, output, lazy, tracker)?;
            if resolution.array.is_some() {
                return Ok(resolution.used_at(index));
            }
            lazy_miss = true;
            break;
        }

        debug!(variable = variable.name(), period = %period, "no formula slice resolved, using default");
        let array = sim.default_array(variable)?;
        if !lazy_miss {
            sim.store(variable, period, array.clone());
        }
        Ok(Resolution::present(period, array))
    }
}

/// Builder for [`DatedFormula`].
#[derive(Debug, Default)]
pub struct DatedFormulaBuilder {
    slices: Vec<(Instant, Option<Instant>, Formula)>,
}

impl DatedFormulaBuilder {
    /// Adds a slice starting at `start`. Without `stop`, the slice ends the
    /// day before the next slice starts, or never for the last one.
    #[must_use]
    pub fn slice(mut self, start: Instant, stop: Option<Instant>, formula: impl Into<Formula>) -> Self {
        self.slices.push((start, stop, formula.into()));
        self
    }

    /// Builds the formula.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidDefinition` when no slice is given, a
    /// slice ends before it starts, or two slices overlap.
    pub fn build(mut self) -> Result<DatedFormula, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidDefinition {
            name: "dated formula".to_string(),
            reason,
        };
        if self.slices.is_empty() {
            return Err(invalid("at least one dated formula is required".to_string()));
        }
        self.slices.sort_by_key(|(start, _, _)| *start);

        let next_starts: Vec<Option<Instant>> = self
            .slices
            .iter()
            .skip(1)
            .map(|(start, _, _)| Some(*start))
            .chain(std::iter::once(None))
            .collect();
        let mut slices: Vec<DatedSlice> = Vec::with_capacity(self.slices.len());
        for ((start, stop, formula), next_start) in self.slices.into_iter().zip(next_starts) {
            let stop = match (stop, next_start) {
                (Some(stop), _) => stop,
                (None, Some(next)) => next.offset(PeriodUnit::Day, -1),
                (None, None) => Instant::MAX,
            };
            if stop < start {
                return Err(invalid(format!("slice starting {start} ends on {stop}")));
            }
            if let Some(previous) = slices.last() {
                if previous.stop >= start {
                    return Err(invalid(format!(
                        "slices [{}, {}] and [{start}, {stop}] overlap",
                        previous.start, previous.stop
                    )));
                }
            }
            slices.push(DatedSlice { start, stop, formula });
        }
        Ok(DatedFormula { slices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::DirectFormula;
    use crate::value::Array;

    fn d(y: i32, m: u32, day: u32) -> Instant {
        Instant::new(y, m, day).unwrap()
    }

    fn leaf() -> Formula {
        DirectFormula::builder(|_| Ok(Array::Float(Vec::new())))
            .build()
            .unwrap()
            .into()
    }

    #[test]
    fn test_missing_stops_filled_from_next_start() {
        let dated = DatedFormula::builder()
            .slice(d(2018, 1, 1), None, leaf())
            .slice(d(2015, 1, 1), None, leaf())
            .build()
            .unwrap();
        let slices = dated.slices();
        assert_eq!(slices[0].start, d(2015, 1, 1));
        assert_eq!(slices[0].stop, d(2017, 12, 31));
        assert_eq!(slices[1].stop, Instant::MAX);
    }

    #[test]
    fn test_overlapping_slices_rejected() {
        let result = DatedFormula::builder()
            .slice(d(2015, 1, 1), Some(d(2016, 6, 30)), leaf())
            .slice(d(2016, 1, 1), None, leaf())
            .build();
        assert!(matches!(result, Err(ValidationError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_inverted_slice_rejected() {
        let result = DatedFormula::builder()
            .slice(d(2015, 1, 1), Some(d(2014, 1, 1)), leaf())
            .build();
        assert!(result.is_err());
        assert!(DatedFormula::builder().build().is_err());
    }
}
