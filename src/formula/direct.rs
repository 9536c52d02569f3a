//! Direct formulas: one function over declared inputs and parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, trace};

use crate::error::{CalcResult, ContractViolation, EvaluationError, ValidationError};
use crate::legislation::ParameterPath;
use crate::simulation::{RequestTracker, Simulation};
use crate::time::{Instant, Period, PeriodUnit};
use crate::value::Array;
use crate::variable::Variable;

use super::context::FormulaContext;
use super::Resolution;

/// Computation function of a direct formula.
pub type FormulaFn = Arc<dyn Fn(&FormulaContext<'_>) -> CalcResult<Array> + Send + Sync>;

/// Period at which an input variable is read, relative to the output period.
#[derive(Clone, Default)]
pub enum PeriodRule {
    /// The output period itself.
    #[default]
    Same,
    /// The output period shifted by this many of its own units.
    Offset(i64),
    /// Any mapping of the output period.
    Custom(Arc<dyn Fn(Period) -> Period + Send + Sync>),
}

impl PeriodRule {
    #[must_use]
    pub fn apply(&self, output: Period) -> Period {
        match self {
            Self::Same => output,
            Self::Offset(delta) => output.offset(*delta),
            Self::Custom(rule) => rule(output),
        }
    }
}

impl fmt::Debug for PeriodRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Same => f.write_str("Same"),
            Self::Offset(delta) => f.debug_tuple("Offset").field(delta).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Output period computed from a requested period.
#[derive(Clone, Default)]
pub enum OutputPeriodRule {
    /// One declared unit containing the requested start, aligned to the unit.
    #[default]
    Base,
    /// One year starting at the first day of the requested month.
    YearFromMonth,
    /// Any mapping of the requested period and declared unit.
    Custom(Arc<dyn Fn(Period, PeriodUnit) -> Period + Send + Sync>),
}

impl OutputPeriodRule {
    #[must_use]
    pub fn apply(&self, requested: Period, unit: PeriodUnit) -> Period {
        match self {
            Self::Base => Period::base(unit, requested.start()),
            Self::YearFromMonth => {
                Period::single(PeriodUnit::Year, requested.start().align(PeriodUnit::Month))
            }
            Self::Custom(rule) => rule(requested, unit),
        }
    }
}

impl fmt::Debug for OutputPeriodRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Base => "Base",
            Self::YearFromMonth => "YearFromMonth",
            Self::Custom(_) => "Custom",
        })
    }
}

/// Instant at which a legislation parameter is read.
#[derive(Clone, Default)]
pub enum LawInstant {
    /// First day of the output period.
    #[default]
    OutputStart,
    /// Any mapping of the output period.
    Custom(Arc<dyn Fn(Period) -> Instant + Send + Sync>),
}

impl LawInstant {
    #[must_use]
    pub fn apply(&self, output: Period) -> Instant {
        match self {
            Self::OutputStart => output.start(),
            Self::Custom(rule) => rule(output),
        }
    }
}

impl fmt::Debug for LawInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OutputStart => "OutputStart",
            Self::Custom(_) => "Custom",
        })
    }
}

/// A declared input variable.
#[derive(Debug, Clone)]
pub struct FormulaInput {
    /// Input variable name.
    pub name: String,
    /// Period the input is read at.
    pub period: PeriodRule,
}

/// A declared legislation parameter.
#[derive(Debug, Clone)]
pub struct FormulaParameter {
    /// Name the function reads the parameter under.
    pub name: String,
    /// Location in the legislation tree.
    pub path: ParameterPath,
    /// Instant the parameter is read at.
    pub law_instant: LawInstant,
}

/// Leaf formula computing a variable from declared inputs and parameters.
///
/// # Examples
///
/// ```
/// use legiscalc::formula::DirectFormula;
/// use legiscalc::Array;
///
/// let formula = DirectFormula::builder(|ctx| {
///     let salary = ctx.floats("salary")?;
///     let rate = ctx.parameter_f64("rate")?;
///     Ok(Array::Float(salary.iter().map(|s| s * rate).collect()))
/// })
/// .input("salary")
/// .parameter("rate", "taxes.rate")
/// .build()
/// .unwrap();
/// assert_eq!(formula.input_names().collect::<Vec<_>>(), vec!["salary"]);
/// ```
#[derive(Clone)]
pub struct DirectFormula {
    function: FormulaFn,
    inputs: Vec<FormulaInput>,
    parameters: Vec<FormulaParameter>,
    output_period: OutputPeriodRule,
    comment: Option<String>,
}

impl fmt::Debug for DirectFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectFormula")
            .field("inputs", &self.inputs)
            .field("parameters", &self.parameters)
            .field("output_period", &self.output_period)
            .field("comment", &self.comment)
            .finish_non_exhaustive()
    }
}

impl DirectFormula {
    /// Starts a builder around `function`.
    pub fn builder<F>(function: F) -> DirectFormulaBuilder
    where
        F: Fn(&FormulaContext<'_>) -> CalcResult<Array> + Send + Sync + 'static,
    {
        DirectFormulaBuilder {
            function: Arc::new(function),
            inputs: Vec::new(),
            parameters: Vec::new(),
            output_period: OutputPeriodRule::default(),
            comment: None,
        }
    }

    pub fn inputs(&self) -> &[FormulaInput] {
        &self.inputs
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|input| input.name.as_str())
    }

    pub fn parameters(&self) -> &[FormulaParameter] {
        &self.parameters
    }

    pub fn output_period_rule(&self) -> &OutputPeriodRule {
        &self.output_period
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Output period for `requested`, checked against the declared unit.
    ///
    /// # Errors
    ///
    /// Returns `UnitMismatch` if the rule yields another unit than the
    /// variable declares, and `PeriodCoverage` if the output period does not
    /// contain the requested start.
    pub fn output_period(&self, variable: &Variable, requested: Period) -> Result<Period, ContractViolation> {
        let output = self.output_period.apply(requested, variable.period_unit());
        if output.unit() != variable.period_unit() {
            return Err(ContractViolation::UnitMismatch {
                variable: variable.name().to_string(),
                declared: variable.period_unit(),
                output_period: output,
            });
        }
        if !output.contains_instant(requested.start()) {
            return Err(ContractViolation::PeriodCoverage {
                variable: variable.name().to_string(),
                output_period: output,
                requested,
            });
        }
        Ok(output)
    }

    pub(crate) fn compute(
        &self,
        sim: &mut Simulation,
        variable: &Variable,
        period: Period,
        lazy: bool,
        tracker: &mut RequestTracker,
    ) -> CalcResult<Resolution> {
        let output = self.output_period(variable, period)?;
        let Some(output) = output.intersection(variable.start_date(), variable.end_date()) else {
            debug!(variable = variable.name(), period = %output, "outside validity window, using default");
            return Ok(Resolution::present(output, sim.default_array(variable)?));
        };
        if let Some(array) = sim.cached(variable, output) {
            trace!(variable = variable.name(), period = %output, "cache hit");
            return Ok(Resolution::present(output, array));
        }

        let mut arguments = Vec::with_capacity(self.inputs.len());
        let tracks_defaults = sim.config().tracks_default_arguments();
        let mut only_default = true;
        for input in &self.inputs {
            let input_period = input.period.apply(output);
            let Some(array) = sim.compute_variable(&input.name, input_period, lazy, tracker)? else {
                if lazy {
                    debug!(
                        variable = variable.name(),
                        input = input.name.as_str(),
                        period = %input_period,
                        "input absent in lazy mode"
                    );
                    return Ok(Resolution::absent(output));
                }
                return Err(ContractViolation::MissingInput {
                    variable: variable.name().to_string(),
                    input: input.name.clone(),
                    period: input_period,
                }
                .into());
            };
            if tracks_defaults && only_default && array.differs_from(sim.rules().variable(&input.name)?.default()) {
                only_default = false;
            }
            arguments.push((input.name.clone(), array));
        }

        let parameters: BTreeMap<String, Option<serde_json::Value>> = self
            .parameters
            .iter()
            .map(|parameter| {
                let instant = parameter.law_instant.apply(output);
                let value = sim.rules().legislation().lookup(&parameter.path, instant).cloned();
                (parameter.name.clone(), value)
            })
            .collect();

        let result = {
            let context = FormulaContext::new(
                variable,
                output,
                &arguments,
                &parameters,
                sim.rules().legislation(),
                sim.rules().reference_legislation(),
                sim.population(),
            );
            (self.function)(&context)
        };
        let array = match result {
            Ok(array) => array,
            Err(err) => {
                error!(
                    entity = variable.entity(),
                    variable = variable.name(),
                    period = %output,
                    arguments = %format_arguments(&arguments),
                    "formula function failed"
                );
                return Err(err);
            }
        };
        let array = Self::validate(sim, variable, output, &arguments, array)?;

        let config = sim.config();
        if config.debug && (config.debug_all || !only_default) {
            info!(
                "<=> {}@{}[{}]({}) --> {}",
                variable.entity(),
                variable.name(),
                output,
                format_arguments(&arguments),
                array
            );
        }
        let array = Arc::new(array);
        sim.record_invocation(variable, output, only_default, &arguments, &array);
        sim.store(variable, output, Arc::clone(&array));
        Ok(Resolution::present(output, array))
    }

    fn validate(
        sim: &Simulation,
        variable: &Variable,
        output: Period,
        arguments: &[(String, Arc<Array>)],
        array: Array,
    ) -> CalcResult<Array> {
        let expected = sim.population().count(variable.entity())?;
        if array.len() != expected {
            return Err(ContractViolation::ShapeMismatch {
                context: format!(
                    "{}@{}[{}]({})",
                    variable.entity(),
                    variable.name(),
                    output,
                    format_arguments(arguments)
                ),
                expected,
                actual: array.len(),
            }
            .into());
        }
        if !sim.config().debug {
            let indices = array.nan_indices();
            if !indices.is_empty() {
                return Err(EvaluationError::Nan {
                    variable: variable.name().to_string(),
                    entity: variable.entity().to_string(),
                    indices,
                }
                .into());
            }
        }
        let actual = array.type_name();
        array.cast(variable.value_type()).map_err(|_| {
            ContractViolation::WrongType {
                variable: variable.name().to_string(),
                expected: variable.value_type(),
                actual: actual.to_string(),
            }
            .into()
        })
    }
}

fn format_arguments(arguments: &[(String, Arc<Array>)]) -> String {
    arguments
        .iter()
        .map(|(name, array)| format!("{name} = {array}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builder for [`DirectFormula`].
pub struct DirectFormulaBuilder {
    function: FormulaFn,
    inputs: Vec<FormulaInput>,
    parameters: Vec<(String, String, LawInstant)>,
    output_period: OutputPeriodRule,
    comment: Option<String>,
}

impl DirectFormulaBuilder {
    /// Declares an input read at the output period.
    #[must_use]
    pub fn input(self, name: impl Into<String>) -> Self {
        self.input_at(name, PeriodRule::Same)
    }

    /// Declares an input read at a period derived from the output period.
    #[must_use]
    pub fn input_at(mut self, name: impl Into<String>, period: PeriodRule) -> Self {
        self.inputs.push(FormulaInput {
            name: name.into(),
            period,
        });
        self
    }

    /// Declares a parameter read at the start of the output period.
    #[must_use]
    pub fn parameter(self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.parameter_at(name, path, LawInstant::OutputStart)
    }

    /// Declares a parameter read at a custom law instant.
    #[must_use]
    pub fn parameter_at(mut self, name: impl Into<String>, path: impl Into<String>, law_instant: LawInstant) -> Self {
        self.parameters.push((name.into(), path.into(), law_instant));
        self
    }

    /// Sets the output-period rule (default: [`OutputPeriodRule::Base`]).
    #[must_use]
    pub fn output_period(mut self, rule: OutputPeriodRule) -> Self {
        self.output_period = rule;
        self
    }

    /// Free-text description shown in formula descriptions.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Builds the formula.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDefinition` when an input or parameter name is
    /// declared twice, and `UnknownParameterPath` for a malformed path.
    pub fn build(self) -> Result<DirectFormula, ValidationError> {
        let mut seen = std::collections::BTreeSet::new();
        for name in self
            .inputs
            .iter()
            .map(|input| input.name.as_str())
            .chain(self.parameters.iter().map(|(name, _, _)| name.as_str()))
        {
            if name.trim().is_empty() {
                return Err(ValidationError::InvalidDefinition {
                    name: name.to_string(),
                    reason: "argument names must not be empty".to_string(),
                });
            }
            if !seen.insert(name) {
                return Err(ValidationError::InvalidDefinition {
                    name: name.to_string(),
                    reason: "argument declared twice".to_string(),
                });
            }
        }
        let parameters = self
            .parameters
            .into_iter()
            .map(|(name, path, law_instant)| {
                Ok(FormulaParameter {
                    name,
                    path: path.parse()?,
                    law_instant,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;
        Ok(DirectFormula {
            function: self.function,
            inputs: self.inputs,
            parameters,
            output_period: self.output_period,
            comment: self.comment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ValueType};
    use crate::variable::VariableBuilder;

    fn constant() -> DirectFormulaBuilder {
        DirectFormula::builder(|ctx| Ok(Array::Float(vec![1.0; ctx.count()?])))
    }

    fn monthly() -> Variable {
        VariableBuilder::new("rent", "household")
            .value_type(ValueType::Float)
            .default_value(Value::Float(0.0))
            .period_unit(PeriodUnit::Month)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_rejects_duplicate_arguments() {
        let err = constant().input("a").parameter("a", "x.y").build().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDefinition { .. }));
        assert!(constant().parameter("p", "x..y").build().is_err());
    }

    #[test]
    fn test_output_period_base() {
        let formula = constant().build().unwrap();
        let requested: Period = "2015-03-12".parse().unwrap();
        let output = formula.output_period(&monthly(), requested).unwrap();
        assert_eq!(output, Period::month(2015, 3).unwrap());
    }

    #[test]
    fn test_output_period_unit_mismatch() {
        let formula = constant()
            .output_period(OutputPeriodRule::YearFromMonth)
            .build()
            .unwrap();
        let err = formula
            .output_period(&monthly(), Period::month(2015, 3).unwrap())
            .unwrap_err();
        assert!(matches!(err, ContractViolation::UnitMismatch { .. }));
    }

    #[test]
    fn test_output_period_coverage() {
        let formula = constant()
            .output_period(OutputPeriodRule::Custom(Arc::new(|requested: Period, unit| {
                Period::base(unit, requested.start()).offset(1)
            })))
            .build()
            .unwrap();
        let err = formula
            .output_period(&monthly(), Period::month(2015, 3).unwrap())
            .unwrap_err();
        assert!(matches!(err, ContractViolation::PeriodCoverage { .. }));
    }

    #[test]
    fn test_year_from_month_rule() {
        let output = OutputPeriodRule::YearFromMonth.apply("2015-03-12".parse().unwrap(), PeriodUnit::Year);
        assert_eq!(output.to_string(), "year:2015-03-01:1");
        assert_eq!(output.stop(), Instant::new(2016, 2, 29).unwrap());
    }

    #[test]
    fn test_period_rules() {
        let output = Period::year(2015).unwrap();
        assert_eq!(PeriodRule::Same.apply(output), output);
        assert_eq!(PeriodRule::Offset(-1).apply(output), Period::year(2014).unwrap());
    }
}
