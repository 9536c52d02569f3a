//! Trace records.
//!
//! When a simulation runs with tracing enabled, every direct formula
//! invocation leaves an [`InvocationRecord`] holding the arrays it read and
//! produced, and every variable keeps a [`TraceEntry`] summarizing how it was
//! resolved. Together with the dependency graph this explains a result.

pub mod graph;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::Period;
use crate::value::Array;

pub use graph::{
    ChoiceDescription, DependencyGraph, FormulaDescription, GraphEdge, GraphNode, InputDescription,
    SliceDescription,
};

/// How a variable was resolved in a simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// At least one formula invocation produced a value.
    pub is_computed: bool,

    /// The last invocation read only default-valued inputs.
    pub default_arguments: bool,

    /// Candidate indices of the formula last used, from the root formula.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used: Vec<usize>,
}

/// One direct formula invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Computed variable.
    pub variable: String,

    /// Entity of the computed variable.
    pub entity: String,

    /// Output period.
    pub period: Period,

    /// Every input held only its variable's default value.
    pub default_arguments: bool,

    /// Inputs in declaration order.
    pub inputs: Vec<(String, Array)>,

    /// Produced array, after the cast to the declared type.
    pub output: Array,

    /// Wall-clock time of the invocation.
    pub recorded_at: DateTime<Utc>,
}

/// Trace of a simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Per-variable entries, for variables computed by a formula.
    pub entries: BTreeMap<String, TraceEntry>,

    /// Invocations in evaluation order.
    pub invocations: Vec<InvocationRecord>,
}

impl Trace {
    /// Invocations of `variable`.
    pub fn invocations_of<'a>(&'a self, variable: &'a str) -> impl Iterator<Item = &'a InvocationRecord> + 'a {
        self.invocations
            .iter()
            .filter(move |record| record.variable == variable)
    }

    /// Invocations that read at least one non-default input.
    pub fn non_default_invocations(&self) -> impl Iterator<Item = &InvocationRecord> {
        self.invocations.iter().filter(|record| !record.default_arguments)
    }
}
