//! Variable metadata.

use std::fmt;

use crate::error::ValidationError;
use crate::formula::Formula;
use crate::time::{Instant, Period, PeriodUnit};
use crate::value::{Array, Value, ValueType};

/// A named, time-dependent quantity attached to one entity kind.
///
/// Variables are immutable once built. A variable without a formula is an
/// input variable: its values can only be set on a simulation.
#[derive(Clone)]
pub struct Variable {
    name: String,
    entity: String,
    value_type: ValueType,
    default: Value,
    start_date: Option<Instant>,
    end_date: Option<Instant>,
    period_unit: PeriodUnit,
    period_invariant: bool,
    label: Option<String>,
    formula: Option<Formula>,
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("value_type", &self.value_type)
            .field("default", &self.default)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("period_unit", &self.period_unit)
            .field("period_invariant", &self.period_invariant)
            .field("has_formula", &self.formula.is_some())
            .finish_non_exhaustive()
    }
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the entity the variable is attached to.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn default(&self) -> Value {
        self.default
    }

    /// First day the variable is defined, if bounded.
    pub fn start_date(&self) -> Option<Instant> {
        self.start_date
    }

    /// Last day the variable is defined, if bounded.
    pub fn end_date(&self) -> Option<Instant> {
        self.end_date
    }

    pub fn period_unit(&self) -> PeriodUnit {
        self.period_unit
    }

    /// Whether one value holds for every period.
    pub fn is_period_invariant(&self) -> bool {
        self.period_invariant
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn formula(&self) -> Option<&Formula> {
        self.formula.as_ref()
    }

    #[must_use]
    pub fn is_input(&self) -> bool {
        self.formula.is_none()
    }

    /// The period a request resolves to before any formula runs: one declared
    /// unit containing the requested start, clipped to the validity window.
    #[must_use]
    pub fn natural_period(&self, requested: Period) -> Option<Period> {
        Period::base(self.period_unit, requested.start()).intersection(self.start_date, self.end_date)
    }

    /// `len` copies of the default value.
    #[must_use]
    pub fn default_array(&self, len: usize) -> Array {
        Array::filled(self.value_type, self.default, len)
    }

    /// Copy of this variable computed by `formula` instead.
    #[must_use]
    pub fn with_formula(&self, formula: Option<Formula>) -> Self {
        Self {
            formula,
            ..self.clone()
        }
    }
}

/// Builder for [`Variable`].
///
/// # Examples
///
/// ```
/// use legiscalc::time::PeriodUnit;
/// use legiscalc::{Value, ValueType, VariableBuilder};
///
/// let salary = VariableBuilder::new("salary", "person")
///     .value_type(ValueType::Float)
///     .default_value(Value::Float(0.0))
///     .period_unit(PeriodUnit::Month)
///     .label("Monthly gross salary")
///     .build()
///     .unwrap();
/// assert!(salary.is_input());
/// ```
#[derive(Debug, Clone)]
pub struct VariableBuilder {
    name: String,
    entity: String,
    value_type: ValueType,
    default: Option<Value>,
    start_date: Option<Instant>,
    end_date: Option<Instant>,
    period_unit: PeriodUnit,
    period_invariant: bool,
    label: Option<String>,
    formula: Option<Formula>,
}

impl VariableBuilder {
    /// Starts a float variable with a yearly unit on entity `entity`.
    pub fn new(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            value_type: ValueType::Float,
            default: None,
            start_date: None,
            end_date: None,
            period_unit: PeriodUnit::Year,
            period_invariant: false,
            label: None,
            formula: None,
        }
    }

    /// Set the element type (default: float).
    #[must_use]
    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Set the default element (default: zero of the element type).
    #[must_use]
    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the first day the variable is defined.
    #[must_use]
    pub fn start_date(mut self, start: Instant) -> Self {
        self.start_date = Some(start);
        self
    }

    /// Set the last day the variable is defined.
    #[must_use]
    pub fn end_date(mut self, end: Instant) -> Self {
        self.end_date = Some(end);
        self
    }

    /// Set the unit of the variable's output periods (default: year).
    #[must_use]
    pub fn period_unit(mut self, unit: PeriodUnit) -> Self {
        self.period_unit = unit;
        self
    }

    /// Mark the variable as holding one value for every period.
    #[must_use]
    pub fn period_invariant(mut self, invariant: bool) -> Self {
        self.period_invariant = invariant;
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the formula computing the variable.
    #[must_use]
    pub fn formula(mut self, formula: impl Into<Formula>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Build the variable.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidDefinition` if the name or entity is
    /// empty, the validity window is inverted, or the default value does not
    /// fit the element type.
    pub fn build(self) -> Result<Variable, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidDefinition {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("variable name must not be empty"));
        }
        if self.entity.trim().is_empty() {
            return Err(invalid("entity key must not be empty"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(invalid("end date is before start date"));
            }
        }
        let default = match (self.default, self.value_type) {
            (None, ValueType::Float) => Value::Float(0.0),
            (None, ValueType::Int | ValueType::Enum) => Value::Int(0),
            (None, ValueType::Bool) => Value::Bool(false),
            (Some(Value::Float(v)), ValueType::Int | ValueType::Enum) if v.fract() != 0.0 || !v.is_finite() => {
                return Err(invalid("default value is not an integer"));
            }
            (Some(Value::Float(v)), _) if v.is_nan() => {
                return Err(invalid("default value is NaN"));
            }
            (Some(value), ValueType::Float) => Value::Float(value.as_f64()),
            (Some(value), ValueType::Int | ValueType::Enum) => Value::Int(value.as_i64()),
            (Some(value), ValueType::Bool) => Value::Bool(value.as_bool()),
        };
        Ok(Variable {
            name: self.name,
            entity: self.entity,
            value_type: self.value_type,
            default,
            start_date: self.start_date,
            end_date: self.end_date,
            period_unit: self.period_unit,
            period_invariant: self.period_invariant,
            label: self.label,
            formula: self.formula,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Instant {
        Instant::new(y, m, day).unwrap()
    }

    #[test]
    fn test_defaults_follow_value_type() {
        let v = VariableBuilder::new("flag", "person")
            .value_type(ValueType::Bool)
            .build()
            .unwrap();
        assert_eq!(v.default(), Value::Bool(false));
        assert_eq!(v.default_array(2), Array::Bool(vec![false, false]));

        let v = VariableBuilder::new("n", "person")
            .value_type(ValueType::Int)
            .default_value(3.0)
            .build()
            .unwrap();
        assert_eq!(v.default(), Value::Int(3));
    }

    #[test]
    fn test_build_validates() {
        assert!(VariableBuilder::new("", "person").build().is_err());
        assert!(VariableBuilder::new("x", " ").build().is_err());
        assert!(VariableBuilder::new("x", "person")
            .start_date(d(2016, 1, 1))
            .end_date(d(2015, 1, 1))
            .build()
            .is_err());
        assert!(VariableBuilder::new("x", "person")
            .value_type(ValueType::Int)
            .default_value(1.5)
            .build()
            .is_err());
    }

    #[test]
    fn test_natural_period_clips_to_validity_window() {
        let v = VariableBuilder::new("benefit", "person")
            .start_date(d(2015, 7, 1))
            .build()
            .unwrap();
        let clipped = v.natural_period(Period::year(2015).unwrap()).unwrap();
        assert_eq!(clipped.start(), d(2015, 7, 1));
        assert_eq!(clipped.stop(), d(2015, 12, 31));
        assert!(v.natural_period(Period::year(2014).unwrap()).is_none());
    }
}
