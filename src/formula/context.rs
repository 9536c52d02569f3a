//! Arguments handed to a formula function.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::entity::Population;
use crate::error::{CalcError, CalcResult, EvaluationError};
use crate::legislation::{LegislationTree, ParameterPath};
use crate::roles::Role;
use crate::time::Period;
use crate::value::{Array, Value};
use crate::variable::Variable;

/// Everything a formula function may read while computing one output period.
///
/// Inputs are the arrays of the declared input variables, already resolved by
/// the engine at their own periods. Parameters are the declared legislation
/// values at the formula's law instant; an undefined parameter is `None`.
pub struct FormulaContext<'a> {
    variable: &'a Variable,
    period: Period,
    inputs: &'a [(String, Arc<Array>)],
    parameters: &'a BTreeMap<String, Option<Json>>,
    legislation: &'a LegislationTree,
    reference: &'a LegislationTree,
    population: &'a Population,
}

impl<'a> FormulaContext<'a> {
    pub(crate) fn new(
        variable: &'a Variable,
        period: Period,
        inputs: &'a [(String, Arc<Array>)],
        parameters: &'a BTreeMap<String, Option<Json>>,
        legislation: &'a LegislationTree,
        reference: &'a LegislationTree,
        population: &'a Population,
    ) -> Self {
        Self {
            variable,
            period,
            inputs,
            parameters,
            legislation,
            reference,
            population,
        }
    }

    /// The variable being computed.
    pub fn variable(&self) -> &Variable {
        self.variable
    }

    /// The output period.
    pub fn period(&self) -> Period {
        self.period
    }

    /// Number of members of the computed variable's entity.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::UnknownEntity` if the entity is not part of
    /// the population.
    pub fn count(&self) -> CalcResult<usize> {
        self.population.count(self.variable.entity())
    }

    pub fn population(&self) -> &Population {
        self.population
    }

    /// Array of the declared input `name`.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::UnknownVariable` if `name` is not a declared
    /// input of the formula.
    pub fn input(&self, name: &str) -> CalcResult<&Array> {
        self.inputs
            .iter()
            .find(|(input, _)| input == name)
            .map(|(_, array)| array.as_ref())
            .ok_or_else(|| {
                EvaluationError::UnknownVariable {
                    name: format!("{name} (not an input of {})", self.variable.name()),
                }
                .into()
            })
    }

    /// Input `name` widened to floats.
    ///
    /// # Errors
    ///
    /// Same as [`input`](Self::input).
    pub fn floats(&self, name: &str) -> CalcResult<Vec<f64>> {
        Ok(self.input(name)?.to_floats())
    }

    /// Declared inputs in declaration order.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &Array)> {
        self.inputs.iter().map(|(name, array)| (name.as_str(), array.as_ref()))
    }

    /// Declared parameter `name`, `None` if the legislation leaves it undefined.
    pub fn parameter(&self, name: &str) -> Option<&Json> {
        self.parameters.get(name).and_then(Option::as_ref)
    }

    /// Declared numeric parameter `name`.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::MissingParameter` if the parameter is
    /// undefined or not a number.
    pub fn parameter_f64(&self, name: &str) -> CalcResult<f64> {
        self.parameter(name)
            .and_then(Json::as_f64)
            .ok_or_else(|| self.missing_parameter(name))
    }

    fn missing_parameter(&self, parameter: &str) -> CalcError {
        EvaluationError::MissingParameter {
            variable: self.variable.name().to_string(),
            parameter: parameter.to_string(),
            instant: self.period.start(),
        }
        .into()
    }

    /// Current legislation at the start of the output period.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `path` is malformed.
    pub fn legislation(&self, path: &str) -> CalcResult<Option<&Json>> {
        let path: ParameterPath = path.parse()?;
        Ok(self.legislation.lookup(&path, self.period.start()))
    }

    /// Reference legislation (the rule set a reform was derived from) at the
    /// start of the output period. Equal to the current legislation outside
    /// reforms.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `path` is malformed.
    pub fn reference_legislation(&self, path: &str) -> CalcResult<Option<&Json>> {
        let path: ParameterPath = path.parse()?;
        Ok(self.reference.lookup(&path, self.period.start()))
    }

    /// Sums a persons column into the rows of group entity `group`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown group, role or mismatched length.
    pub fn sum_by_entity(&self, group: &str, persons: &Array, roles: Option<&[Role]>) -> CalcResult<Array> {
        self.population.group(group)?.sum_by_entity(persons, roles)
    }

    /// Per group row, whether any member with one of `roles` is non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown group, role or mismatched length.
    pub fn any_by_roles(&self, group: &str, persons: &Array, roles: Option<&[Role]>) -> CalcResult<Array> {
        self.population.group(group)?.any_by_roles(persons, roles)
    }

    /// Broadcasts a group column to its members holding one of `roles`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown group, role or mismatched length.
    pub fn cast_from_entity_to_roles(
        &self,
        group: &str,
        groups: &Array,
        roles: Option<&[Role]>,
        default: Value,
    ) -> CalcResult<Array> {
        self.population
            .group(group)?
            .cast_from_entity_to_roles(groups, roles, default)
    }

    /// Group column holding the value of the member with `role`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown group, role, duplicated role or
    /// mismatched length.
    pub fn filter_role(&self, group: &str, persons: &Array, role: Role, default: Value) -> CalcResult<Array> {
        self.population.group(group)?.filter_role(persons, role, default)
    }

    /// One group column per role.
    ///
    /// # Errors
    ///
    /// Same as [`filter_role`](Self::filter_role).
    pub fn split_by_roles(
        &self,
        group: &str,
        persons: &Array,
        roles: Option<&[Role]>,
        default: Value,
    ) -> CalcResult<BTreeMap<Role, Array>> {
        self.population
            .group(group)?
            .split_by_roles(persons, roles, default)
    }
}
