//! Rule sets: variables plus the legislation they read, and reforms of them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value as Json;
use tracing::debug;

use crate::error::{CalcResult, EvaluationError, ValidationError};
use crate::formula::Formula;
use crate::legislation::LegislationTree;
use crate::time::Instant;
use crate::variable::Variable;

/// Immutable set of variable definitions and legislation.
///
/// A reform is a rule set derived from another one, its reference. Formulas
/// asking for reference legislation read the tree of the outermost reference.
///
/// # Examples
///
/// ```
/// use legiscalc::{RuleSet, VariableBuilder};
///
/// let rules = RuleSet::builder("base")
///     .variable(VariableBuilder::new("salary", "person").build().unwrap())
///     .build()
///     .unwrap();
/// assert!(rules.get("salary").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct RuleSet {
    name: String,
    variables: BTreeMap<String, Arc<Variable>>,
    consumers: BTreeMap<String, BTreeSet<String>>,
    legislation: LegislationTree,
    reference: Option<Arc<RuleSet>>,
}

impl RuleSet {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> RuleSetBuilder {
        RuleSetBuilder {
            name: name.into(),
            variables: Vec::new(),
            legislation: LegislationTree::default(),
        }
    }

    fn assemble(
        name: String,
        variables: BTreeMap<String, Arc<Variable>>,
        legislation: LegislationTree,
        reference: Option<Arc<RuleSet>>,
    ) -> Result<Self, ValidationError> {
        let mut consumers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for variable in variables.values() {
            let Some(formula) = variable.formula() else {
                continue;
            };
            for input in formula.input_names() {
                if !variables.contains_key(&input) {
                    return Err(ValidationError::UnknownDependency {
                        variable: variable.name().to_string(),
                        input,
                    });
                }
                consumers
                    .entry(input)
                    .or_default()
                    .insert(variable.name().to_string());
            }
        }
        debug!(rules = name.as_str(), variables = variables.len(), "rule set assembled");
        Ok(Self {
            name,
            variables,
            consumers,
            legislation,
            reference,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable `name`.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::UnknownVariable` if no such variable exists.
    pub fn variable(&self, name: &str) -> CalcResult<&Arc<Variable>> {
        self.variables.get(name).ok_or_else(|| {
            EvaluationError::UnknownVariable {
                name: name.to_string(),
            }
            .into()
        })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Variable>> {
        self.variables.get(name)
    }

    /// Variables in name order.
    pub fn variables(&self) -> impl Iterator<Item = &Arc<Variable>> {
        self.variables.values()
    }

    /// Variables whose formulas read `name`.
    pub fn consumers(&self, name: &str) -> impl Iterator<Item = &str> {
        self.consumers
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn legislation(&self) -> &LegislationTree {
        &self.legislation
    }

    /// The rule set this one was derived from.
    pub fn reference(&self) -> Option<&Arc<RuleSet>> {
        self.reference.as_ref()
    }

    /// The outermost reference; `self` for a rule set that is not a reform.
    #[must_use]
    pub fn root_reference(&self) -> &RuleSet {
        let mut current = self;
        while let Some(reference) = current.reference.as_deref() {
            current = reference;
        }
        current
    }

    /// Legislation of the outermost reference.
    pub fn reference_legislation(&self) -> &LegislationTree {
        &self.root_reference().legislation
    }

    /// Starts a reform of this rule set. The original is never modified.
    #[must_use]
    pub fn reform(self: &Arc<Self>, name: impl Into<String>) -> ReformBuilder {
        ReformBuilder {
            name: name.into(),
            variables: self.variables.clone(),
            legislation: self.legislation.clone(),
            base: Arc::clone(self),
        }
    }
}

/// Builder for [`RuleSet`].
#[derive(Debug)]
pub struct RuleSetBuilder {
    name: String,
    variables: Vec<Variable>,
    legislation: LegislationTree,
}

impl RuleSetBuilder {
    /// Adds a variable.
    #[must_use]
    pub fn variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    /// Sets the legislation (default: empty).
    #[must_use]
    pub fn legislation(mut self, legislation: LegislationTree) -> Self {
        self.legislation = legislation;
        self
    }

    /// Builds the rule set.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateVariable` if two variables share a name, and
    /// `UnknownDependency` if a formula reads an undefined variable.
    pub fn build(self) -> Result<RuleSet, ValidationError> {
        let mut variables = BTreeMap::new();
        for variable in self.variables {
            let name = variable.name().to_string();
            if variables.insert(name.clone(), Arc::new(variable)).is_some() {
                return Err(ValidationError::DuplicateVariable { name });
            }
        }
        RuleSet::assemble(self.name, variables, self.legislation, None)
    }
}

/// Builder for a reform of a [`RuleSet`].
#[derive(Debug)]
pub struct ReformBuilder {
    name: String,
    base: Arc<RuleSet>,
    variables: BTreeMap<String, Arc<Variable>>,
    legislation: LegislationTree,
}

impl ReformBuilder {
    /// Overlays `value` on `[start, stop]` of the timeline at `path`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownParameterPath` if `path` is malformed or not a
    /// timeline, and `InvalidInterval` if `start > stop`.
    pub fn update_legislation(
        mut self,
        path: &str,
        start: Instant,
        stop: Instant,
        value: Json,
    ) -> Result<Self, ValidationError> {
        self.legislation = self.legislation.update(&path.parse()?, start, stop, value)?;
        Ok(self)
    }

    /// Adds a variable or replaces the one with the same name.
    #[must_use]
    pub fn variable(mut self, variable: Variable) -> Self {
        self.variables
            .insert(variable.name().to_string(), Arc::new(variable));
        self
    }

    /// Swaps the formula of an existing variable, keeping its metadata.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidDefinition` if `name` is not defined.
    pub fn formula(mut self, name: &str, formula: impl Into<Formula>) -> Result<Self, ValidationError> {
        let variable = self
            .variables
            .get(name)
            .ok_or_else(|| ValidationError::InvalidDefinition {
                name: name.to_string(),
                reason: "a reform can only replace the formula of an existing variable".to_string(),
            })?;
        let replaced = variable.with_formula(Some(formula.into()));
        self.variables.insert(name.to_string(), Arc::new(replaced));
        Ok(self)
    }

    /// Builds the reformed rule set, whose reference is the original.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDependency` if a formula reads an undefined variable.
    pub fn build(self) -> Result<RuleSet, ValidationError> {
        RuleSet::assemble(self.name, self.variables, self.legislation, Some(self.base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::DirectFormula;
    use crate::legislation::ParameterPath;
    use crate::value::Array;
    use crate::variable::VariableBuilder;
    use serde_json::json;

    fn input(name: &str) -> Variable {
        VariableBuilder::new(name, "person").build().unwrap()
    }

    fn computed(name: &str, inputs: &[&str]) -> Variable {
        let formula = inputs
            .iter()
            .fold(DirectFormula::builder(|ctx| Ok(Array::Float(vec![0.0; ctx.count()?]))), |b, name| {
                b.input(*name)
            })
            .build()
            .unwrap();
        VariableBuilder::new(name, "person").formula(formula).build().unwrap()
    }

    #[test]
    fn test_build_computes_consumers() {
        let rules = RuleSet::builder("base")
            .variable(input("salary"))
            .variable(computed("tax", &["salary"]))
            .variable(computed("net", &["salary", "tax"]))
            .build()
            .unwrap();
        assert_eq!(rules.consumers("salary").collect::<Vec<_>>(), vec!["net", "tax"]);
        assert_eq!(rules.consumers("net").count(), 0);
    }

    #[test]
    fn test_build_rejects_duplicates_and_unknown_inputs() {
        let duplicate = RuleSet::builder("base")
            .variable(input("salary"))
            .variable(input("salary"))
            .build();
        assert!(matches!(duplicate, Err(ValidationError::DuplicateVariable { .. })));

        let unknown = RuleSet::builder("base").variable(computed("tax", &["salary"])).build();
        assert!(matches!(unknown, Err(ValidationError::UnknownDependency { .. })));
    }

    #[test]
    fn test_reform_keeps_original() {
        let legislation =
            LegislationTree::from_json(&json!({"rate": [{"start": "2010-01-01", "stop": "2020-12-31", "value": 0.1}]}))
                .unwrap();
        let base = Arc::new(
            RuleSet::builder("base")
                .variable(input("salary"))
                .variable(computed("tax", &["salary"]))
                .legislation(legislation)
                .build()
                .unwrap(),
        );
        let d = |y| Instant::new(y, 1, 1).unwrap();
        let reform = base
            .reform("higher rate")
            .update_legislation("rate", d(2015), Instant::new(2015, 12, 31).unwrap(), json!(0.2))
            .unwrap()
            .formula("tax", DirectFormula::builder(|ctx| Ok(Array::Float(vec![1.0; ctx.count()?]))).build().unwrap())
            .unwrap()
            .build()
            .unwrap();

        let path: ParameterPath = "rate".parse().unwrap();
        assert_eq!(base.legislation().lookup(&path, d(2015)), Some(&json!(0.1)));
        assert_eq!(reform.legislation().lookup(&path, d(2015)), Some(&json!(0.2)));
        assert_eq!(reform.reference_legislation().lookup(&path, d(2015)), Some(&json!(0.1)));
        assert_eq!(reform.root_reference().name(), "base");
        assert!(reform.variable("tax").unwrap().formula().unwrap().input_names().is_empty());
        assert_eq!(base.variable("tax").unwrap().formula().unwrap().input_names().len(), 1);
    }

    #[test]
    fn test_reform_rejects_unknown_formula_target() {
        let base = Arc::new(RuleSet::builder("base").build().unwrap());
        let formula = DirectFormula::builder(|_| Ok(Array::Float(Vec::new()))).build().unwrap();
        assert!(base.reform("r").formula("missing", formula).is_err());
    }
}
