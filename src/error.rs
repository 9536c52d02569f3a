//! Error types for legiscalc.
//!
//! All errors are strongly typed using thiserror. Definition problems surface
//! as [`ValidationError`] when rule sets, timelines or periods are built;
//! runtime failures surface as [`EvaluationError`] while a simulation resolves
//! variables. Contract violations are bugs in a formula definition and are
//! never retried.

use thiserror::Error;

use crate::time::{Instant, Period, PeriodUnit};
use crate::value::ValueType;

/// Validation errors raised while constructing periods, timelines, variables,
/// rule sets and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid period: {reason}")]
    InvalidPeriod {
        reason: String,
    },

    #[error("Invalid interval: start ({start}) must not be after stop ({stop})")]
    InvalidInterval {
        start: Instant,
        stop: Instant,
    },

    #[error("Invalid timeline: {reason}")]
    InvalidTimeline {
        reason: String,
    },

    #[error("Invalid definition of '{name}': {reason}")]
    InvalidDefinition {
        name: String,
        reason: String,
    },

    #[error("Variable '{name}' is defined twice")]
    DuplicateVariable {
        name: String,
    },

    #[error("Variable '{variable}' depends on unknown variable '{input}'")]
    UnknownDependency {
        variable: String,
        input: String,
    },

    #[error("Unknown legislation path: {path}")]
    UnknownParameterPath {
        path: String,
    },

    #[error("Invalid legislation: {reason}")]
    InvalidLegislation {
        reason: String,
    },

    #[error("Invalid simulation config: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// A bug in a formula definition detected at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("{variable} declares a {declared} period unit but returns output period {output_period}")]
    UnitMismatch {
        variable: String,
        declared: PeriodUnit,
        output_period: Period,
    },

    #[error("{variable} returns output period {output_period} that doesn't include the start of requested period {requested}")]
    PeriodCoverage {
        variable: String,
        output_period: Period,
        requested: Period,
    },

    #[error("{context}: expected an array of size {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("{variable} returned {actual} values that cannot be cast to {expected}")]
    WrongType {
        variable: String,
        expected: ValueType,
        actual: String,
    },

    #[error("Role {role} is out of range for entity '{entity}' ({roles_count} roles)")]
    UnknownRole {
        entity: String,
        role: u32,
        roles_count: u32,
    },

    #[error("Group row {group_row} has more than one member with role {role}")]
    DuplicateRole {
        group_row: usize,
        role: u32,
    },

    #[error("Entity '{entity}' is not a group entity")]
    NotAGroupEntity {
        entity: String,
    },

    #[error("When computing {variable}, input {input} is absent for period {period} outside lazy mode")]
    MissingInput {
        variable: String,
        input: String,
        period: Period,
    },
}

/// Errors raised while evaluating variables in a simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("Infinite loop in formula {variable} for period {period}. Missing values for variables: {}", .in_progress.join(", "))]
    Cycle {
        variable: String,
        period: String,
        in_progress: Vec<String>,
    },

    #[error(
        "{} NaN value(s) are present in {entity} variable {variable} at indices {}",
        .indices.len(),
        format_indices(.indices)
    )]
    Nan {
        variable: String,
        entity: String,
        indices: Vec<usize>,
    },

    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("Unknown variable: {name}")]
    UnknownVariable {
        name: String,
    },

    #[error("Unknown entity: {key}")]
    UnknownEntity {
        key: String,
    },

    #[error("Formula {variable} requires parameter '{parameter}' which is undefined at {instant}")]
    MissingParameter {
        variable: String,
        parameter: String,
        instant: Instant,
    },

    #[error("Formula {variable} failed for period {period}: {message}")]
    FormulaFailed {
        variable: String,
        period: Period,
        message: String,
    },
}

/// At most ten indices, then the total.
fn format_indices(indices: &[usize]) -> String {
    const SHOWN: usize = 10;
    let shown: Vec<String> = indices.iter().take(SHOWN).map(ToString::to_string).collect();
    if indices.len() > SHOWN {
        format!("[{}, ... ({} total)]", shown.join(", "), indices.len())
    } else {
        format!("[{}]", shown.join(", "))
    }
}

/// Top-level error type for legiscalc.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl From<ContractViolation> for CalcError {
    fn from(err: ContractViolation) -> Self {
        Self::Evaluation(EvaluationError::Contract(err))
    }
}

impl CalcError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a dependency cycle.
    #[must_use]
    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::Evaluation(EvaluationError::Cycle { .. }))
    }

    /// Returns true if a formula produced NaN values.
    #[must_use]
    pub const fn is_nan(&self) -> bool {
        matches!(self, Self::Evaluation(EvaluationError::Nan { .. }))
    }

    /// Returns the contract violation, if this is one.
    #[must_use]
    pub const fn as_contract_violation(&self) -> Option<&ContractViolation> {
        match self {
            Self::Evaluation(EvaluationError::Contract(v)) => Some(v),
            _ => None,
        }
    }

    /// Returns true if this error is an authoring error in a formula
    /// definition (cycle, contract violation or NaN result).
    #[must_use]
    pub const fn is_definition_bug(&self) -> bool {
        matches!(
            self,
            Self::Evaluation(
                EvaluationError::Cycle { .. }
                    | EvaluationError::Nan { .. }
                    | EvaluationError::Contract(_)
            )
        )
    }
}

/// Result type alias for legiscalc operations.
pub type CalcResult<T> = Result<T, CalcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_in_progress_variables() {
        let err = EvaluationError::Cycle {
            variable: "a".to_string(),
            period: "2015".to_string(),
            in_progress: vec!["a".to_string(), "b".to_string()],
        };
        let msg = format!("{err}");
        assert!(msg.contains("Infinite loop in formula a"));
        assert!(msg.contains("a, b"));
    }

    #[test]
    fn test_nan_message_reports_indices() {
        let err = EvaluationError::Nan {
            variable: "salary".to_string(),
            entity: "person".to_string(),
            indices: vec![1, 4],
        };
        assert_eq!(
            format!("{err}"),
            "2 NaN value(s) are present in person variable salary at indices [1, 4]"
        );

        let err = EvaluationError::Nan {
            variable: "salary".to_string(),
            entity: "person".to_string(),
            indices: (0..12).collect(),
        };
        assert!(format!("{err}").ends_with("at indices [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, ... (12 total)]"));
    }

    #[test]
    fn test_contract_violation_converts_to_calc_error() {
        let err: CalcError = ContractViolation::DuplicateRole {
            group_row: 3,
            role: 0,
        }
        .into();
        assert!(err.is_definition_bug());
        assert!(matches!(
            err.as_contract_violation(),
            Some(ContractViolation::DuplicateRole { group_row: 3, .. })
        ));
    }

    #[test]
    fn test_validation_error_is_not_definition_bug() {
        let err: CalcError = ValidationError::InvalidConfig {
            reason: "x".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_definition_bug());
        assert!(!err.is_cycle());
    }

    #[test]
    fn test_internal_error() {
        let err = CalcError::internal("unexpected state");
        assert!(format!("{err}").contains("unexpected state"));
    }
}
