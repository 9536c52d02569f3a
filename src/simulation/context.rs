//! Simulation context: memoized, cycle-checked evaluation of variables.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::entity::Population;
use crate::error::{CalcError, CalcResult, ContractViolation, EvaluationError};
use crate::formula::DirectFormula;
use crate::holder::{Holder, PeriodKey};
use crate::rules::RuleSet;
use crate::time::Period;
use crate::trace::{DependencyGraph, FormulaDescription, InvocationRecord, Trace};
use crate::value::Array;
use crate::variable::Variable;

use super::config::SimulationConfig;
use super::tracker::RequestTracker;

/// Stable identifier for a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationId(Uuid);

impl SimulationId {
    /// Create a new random simulation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SimulationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One evaluation of a rule set over a population.
///
/// Results are cached per variable and period for the lifetime of the
/// simulation: asking twice for the same variable and period returns the same
/// array without running any formula again. Evaluation is single-threaded;
/// every top-level request carries its own [`RequestTracker`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use legiscalc::formula::DirectFormula;
/// use legiscalc::time::Period;
/// use legiscalc::{Array, Population, RuleSet, Simulation, SimulationConfig, VariableBuilder};
///
/// let double = DirectFormula::builder(|ctx| {
///     Ok(Array::Float(ctx.floats("salary")?.iter().map(|s| s * 2.0).collect()))
/// })
/// .input("salary")
/// .build()
/// .unwrap();
///
/// let rules = RuleSet::builder("demo")
///     .variable(VariableBuilder::new("salary", "person").build().unwrap())
///     .variable(VariableBuilder::new("double", "person").formula(double).build().unwrap())
///     .build()
///     .unwrap();
///
/// let mut sim = Simulation::new(Arc::new(rules), Population::new("person", 2), SimulationConfig::default()).unwrap();
/// let year = Period::year(2015).unwrap();
/// sim.set_input("salary", year, Array::Float(vec![10.0, 20.0])).unwrap();
/// assert_eq!(*sim.calculate("double", year).unwrap(), Array::Float(vec![20.0, 40.0]));
/// ```
#[derive(Debug, Clone)]
pub struct Simulation {
    /// Simulation identity.
    pub id: SimulationId,
    rules: Arc<RuleSet>,
    population: Arc<Population>,
    config: SimulationConfig,
    holders: BTreeMap<String, Holder>,
    invocations: Vec<InvocationRecord>,
}

impl Simulation {
    /// Create a new simulation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for an invalid configuration
    /// and `EvaluationError::UnknownEntity` if a variable is attached to an
    /// entity missing from the population.
    pub fn new(rules: Arc<RuleSet>, population: Population, config: SimulationConfig) -> CalcResult<Self> {
        config.validate()?;
        for variable in rules.variables() {
            population.count(variable.entity())?;
        }
        let id = SimulationId::new();
        info!(simulation = %id, rules = rules.name(), persons = population.person_count(), "simulation created");
        Ok(Self {
            id,
            rules,
            population: Arc::new(population),
            config,
            holders: BTreeMap::new(),
            invocations: Vec::new(),
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Holder of `name`, once the variable has been requested or set.
    pub fn holder(&self, name: &str) -> Option<&Holder> {
        self.holders.get(name)
    }

    /// Value of `name` for `period`, computing it and its dependencies if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns `Cycle` when the variable depends on itself for the same
    /// period, a contract violation or NaN error for a faulty formula, and
    /// any error raised by a formula function. Nothing is cached for the
    /// failing variable.
    pub fn calculate(&mut self, name: &str, period: Period) -> CalcResult<Arc<Array>> {
        let mut tracker = RequestTracker::new();
        self.compute_variable(name, period, false, &mut tracker)?
            .ok_or_else(|| CalcError::internal(format!("{name} resolved to nothing for {period} outside lazy mode")))
    }

    /// Like [`calculate`](Self::calculate), but returns `None` instead of
    /// failing when an input is missing or a cycle is met.
    ///
    /// # Errors
    ///
    /// Returns contract violations, NaN errors and formula errors.
    pub fn calculate_lazy(&mut self, name: &str, period: Period) -> CalcResult<Option<Arc<Array>>> {
        let mut tracker = RequestTracker::new();
        self.compute_variable(name, period, true, &mut tracker)
    }

    /// Sets the value of `name` for `period`, replacing any cached value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownVariable`, `ShapeMismatch` when `array` does not have
    /// one element per entity member, and `WrongType` when it cannot be cast
    /// to the variable's element type.
    pub fn set_input(&mut self, name: &str, period: Period, array: Array) -> CalcResult<()> {
        let variable = Arc::clone(self.rules.variable(name)?);
        let expected = self.population.count(variable.entity())?;
        if array.len() != expected {
            return Err(ContractViolation::ShapeMismatch {
                context: format!("input {name} for {period}"),
                expected,
                actual: array.len(),
            }
            .into());
        }
        let actual = array.type_name();
        let array = array
            .cast(variable.value_type())
            .map_err(|_| ContractViolation::WrongType {
                variable: name.to_string(),
                expected: variable.value_type(),
                actual: actual.to_string(),
            })?;
        debug!(variable = name, period = %period, "input set");
        self.holders
            .entry(name.to_string())
            .or_default()
            .set(PeriodKey::of(&variable, period), Arc::new(array));
        Ok(())
    }

    /// Cached value of `name` for exactly `period`, without computing.
    #[must_use]
    pub fn get_cached(&self, name: &str, period: Period) -> Option<Arc<Array>> {
        let variable = self.rules.get(name)?;
        self.holders.get(name)?.get(PeriodKey::of(variable, period))
    }

    /// Independent copy sharing already computed arrays. Later computations
    /// in either simulation are invisible to the other.
    #[must_use]
    pub fn fork(&self) -> Self {
        let id = SimulationId::new();
        debug!(simulation = %self.id, fork = %id, "simulation forked");
        Self {
            id,
            rules: Arc::clone(&self.rules),
            population: Arc::clone(&self.population),
            config: self.config,
            holders: self.holders.clone(),
            invocations: Vec::new(),
        }
    }

    /// The direct formula that produced the latest result of `name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownVariable` if `name` is not defined.
    pub fn used_formula(&self, name: &str) -> CalcResult<Option<&DirectFormula>> {
        let variable = self.rules.variable(name)?;
        let used = self.holders.get(name).map_or(&[][..], Holder::used);
        Ok(variable.formula().and_then(|formula| formula.real_formula(used)))
    }

    /// Trace entries of computed variables and recorded invocations.
    #[must_use]
    pub fn trace(&self) -> Trace {
        let entries = self
            .holders
            .iter()
            .filter(|(_, holder)| holder.trace_entry().is_computed || !holder.used().is_empty())
            .map(|(name, holder)| (name.clone(), holder.trace_entry().clone()))
            .collect();
        Trace {
            entries,
            invocations: self.invocations.clone(),
        }
    }

    /// Dependency graph rooted at `name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownVariable` if `name` is not defined.
    pub fn graph(&self, name: &str) -> CalcResult<DependencyGraph> {
        DependencyGraph::build(&self.rules, name)
    }

    /// Description of the formula of `name`; `None` for input variables.
    ///
    /// # Errors
    ///
    /// Returns `UnknownVariable` if `name` is not defined.
    pub fn describe(&self, name: &str) -> CalcResult<Option<FormulaDescription>> {
        Ok(self.rules.variable(name)?.formula().map(|formula| formula.describe()))
    }

    /// Resolves `name` for `period` within one request.
    pub(crate) fn compute_variable(
        &mut self,
        name: &str,
        period: Period,
        lazy: bool,
        tracker: &mut RequestTracker,
    ) -> CalcResult<Option<Arc<Array>>> {
        let variable = Arc::clone(self.rules.variable(name)?);
        let key = PeriodKey::of(&variable, period);
        if let Some(array) = self.cached_at(name, key) {
            trace!(variable = name, period = %key, "cache hit");
            return Ok(Some(array));
        }
        let Some(formula) = variable.formula() else {
            if lazy {
                return Ok(None);
            }
            return self.default_array(&variable).map(Some);
        };
        if let Some(array) = variable
            .natural_period(period)
            .and_then(|natural| self.cached(&variable, natural))
        {
            trace!(variable = name, period = %period, "cache hit at output period");
            return Ok(Some(array));
        }

        if !tracker.enter(key, name) {
            if lazy {
                debug!(variable = name, period = %key, "lazy request met a variable in progress");
                return Ok(self.cached_at(name, key));
            }
            return Err(EvaluationError::Cycle {
                variable: name.to_string(),
                period: key.to_string(),
                in_progress: tracker.in_progress(key),
            }
            .into());
        }
        let result = formula.compute(self, &variable, period, lazy, tracker);
        tracker.exit(key, name);

        let resolution = result?;
        if resolution.array.is_some() {
            if !resolution.used.is_empty() {
                trace!(variable = name, period = %resolution.period, used = ?resolution.used, "formula used");
            }
            self.holders
                .entry(name.to_string())
                .or_default()
                .set_used(resolution.used);
        }
        Ok(resolution.array)
    }

    fn cached_at(&self, name: &str, key: PeriodKey) -> Option<Arc<Array>> {
        self.holders.get(name)?.get(key)
    }

    pub(crate) fn cached(&self, variable: &Variable, period: Period) -> Option<Arc<Array>> {
        self.cached_at(variable.name(), PeriodKey::of(variable, period))
    }

    pub(crate) fn store(&mut self, variable: &Variable, period: Period, array: Arc<Array>) -> Arc<Array> {
        self.holders
            .entry(variable.name().to_string())
            .or_default()
            .put(PeriodKey::of(variable, period), array)
    }

    pub(crate) fn default_array(&self, variable: &Variable) -> CalcResult<Arc<Array>> {
        let len = self.population.count(variable.entity())?;
        Ok(Arc::new(variable.default_array(len)))
    }

    pub(crate) fn record_invocation(
        &mut self,
        variable: &Variable,
        period: Period,
        default_arguments: bool,
        arguments: &[(String, Arc<Array>)],
        output: &Array,
    ) {
        if !self.config.trace {
            return;
        }
        self.holders
            .entry(variable.name().to_string())
            .or_default()
            .mark_computed(default_arguments);
        self.invocations.push(InvocationRecord {
            variable: variable.name().to_string(),
            entity: variable.entity().to_string(),
            period,
            default_arguments,
            inputs: arguments
                .iter()
                .map(|(name, array)| (name.clone(), array.as_ref().clone()))
                .collect(),
            output: output.clone(),
            recorded_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;
    use crate::variable::VariableBuilder;

    fn simulation() -> Simulation {
        let rules = RuleSet::builder("test")
            .variable(
                VariableBuilder::new("age", "person")
                    .value_type(ValueType::Int)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        Simulation::new(Arc::new(rules), Population::new("person", 3), SimulationConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config_and_unknown_entity() {
        let rules = Arc::new(
            RuleSet::builder("test")
                .variable(VariableBuilder::new("rent", "household").build().unwrap())
                .build()
                .unwrap(),
        );
        let err = Simulation::new(Arc::clone(&rules), Population::new("person", 1), SimulationConfig::default())
            .unwrap_err();
        assert!(matches!(err, CalcError::Evaluation(EvaluationError::UnknownEntity { .. })));

        let config = SimulationConfig {
            debug_all: true,
            ..SimulationConfig::default()
        };
        assert!(Simulation::new(
            Arc::new(RuleSet::builder("empty").build().unwrap()),
            Population::new("person", 1),
            config
        )
        .unwrap_err()
        .is_validation());
    }

    #[test]
    fn test_set_input_casts_and_validates() {
        let mut sim = simulation();
        let year = Period::year(2015).unwrap();
        sim.set_input("age", year, Array::Float(vec![30.0, 40.5, 2.0])).unwrap();
        assert_eq!(*sim.get_cached("age", year).unwrap(), Array::Int(vec![30, 40, 2]));

        let err = sim.set_input("age", year, Array::Int(vec![1])).unwrap_err();
        assert!(matches!(
            err.as_contract_violation(),
            Some(ContractViolation::ShapeMismatch { expected: 3, actual: 1, .. })
        ));
        assert!(sim.set_input("unknown", year, Array::Int(vec![1, 2, 3])).is_err());
    }

    #[test]
    fn test_input_variable_without_value() {
        let mut sim = simulation();
        let year = Period::year(2015).unwrap();
        assert_eq!(sim.calculate_lazy("age", year).unwrap(), None);
        assert_eq!(*sim.calculate("age", year).unwrap(), Array::Int(vec![0, 0, 0]));
        assert!(sim.get_cached("age", year).is_none());
    }

    #[test]
    fn test_fork_is_independent() {
        let mut sim = simulation();
        let year = Period::year(2015).unwrap();
        sim.set_input("age", year, Array::Int(vec![1, 2, 3])).unwrap();
        let mut fork = sim.fork();
        assert_ne!(fork.id, sim.id);
        fork.set_input("age", year, Array::Int(vec![7, 8, 9])).unwrap();
        assert_eq!(*sim.get_cached("age", year).unwrap(), Array::Int(vec![1, 2, 3]));
        assert_eq!(*fork.get_cached("age", year).unwrap(), Array::Int(vec![7, 8, 9]));
    }
}
