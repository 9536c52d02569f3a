//! # Legiscalc - Memoized evaluation of legislated formulas
//!
//! Legiscalc computes named, time-dependent quantities ("variables") over a
//! population of individuals and the groups they form. Each variable is
//! either set as input or computed by a formula that reads other variables
//! and legislated parameters; results are cached per variable and period.
//!
//! ## Core Concepts
//!
//! - **Period**: a run of days expressed as a unit, a start and a size
//! - **Timeline**: the non-overlapping history of one legislated parameter
//! - **Formula**: a direct function, or prioritized alternatives, time
//!   slices, or a selection driven by known inputs
//! - **Simulation**: the memoized, cycle-checked evaluation engine
//! - **Reform**: a rule set derived from another by patching legislation or
//!   swapping formulas
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use legiscalc::formula::DirectFormula;
//! use legiscalc::legislation::LegislationTree;
//! use legiscalc::time::Period;
//! use legiscalc::{Array, Population, RuleSet, Simulation, SimulationConfig, VariableBuilder};
//!
//! let tax = DirectFormula::builder(|ctx| {
//!     let rate = ctx.parameter_f64("rate")?;
//!     Ok(Array::Float(ctx.floats("salary")?.iter().map(|s| s * rate).collect()))
//! })
//! .input("salary")
//! .parameter("rate", "tax.rate")
//! .build()?;
//!
//! let legislation = LegislationTree::from_json(&serde_json::json!({
//!     "tax": { "rate": [{ "start": "2010-01-01", "stop": "2020-12-31", "value": 0.25 }] }
//! }))?;
//! let rules = RuleSet::builder("demo")
//!     .variable(VariableBuilder::new("salary", "person").build()?)
//!     .variable(VariableBuilder::new("tax", "person").formula(tax).build()?)
//!     .legislation(legislation)
//!     .build()?;
//!
//! let mut sim = Simulation::new(Arc::new(rules), Population::new("person", 2), SimulationConfig::default())?;
//! let year = Period::year(2015)?;
//! sim.set_input("salary", year, Array::Float(vec![1000.0, 2000.0]))?;
//! assert_eq!(*sim.calculate("tax", year)?, Array::Float(vec![250.0, 500.0]));
//! # Ok::<(), legiscalc::CalcError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod entity;
pub mod error;
pub mod formula;
pub mod holder;
pub mod legislation;
pub mod roles;
pub mod rules;
pub mod simulation;
pub mod time;
pub mod trace;
pub mod value;
pub mod variable;

// Re-export primary types at crate root for convenience
pub use entity::{GroupEntity, Population};
pub use error::{CalcError, CalcResult, ContractViolation, EvaluationError, ValidationError};
pub use formula::{
    AlternativeFormulas, DatedFormula, DirectFormula, Formula, FormulaContext, SelectFormula,
};
pub use holder::{Holder, PeriodKey};
pub use legislation::{LegislationTree, ParameterPath, Timeline, TimelineItem};
pub use roles::{Role, RoleIndex};
pub use rules::{ReformBuilder, RuleSet};
pub use simulation::{RequestTracker, Simulation, SimulationConfig, SimulationId};
pub use time::{Instant, Period, PeriodUnit};
pub use trace::{DependencyGraph, FormulaDescription, Trace, TraceEntry};
pub use value::{Array, Value, ValueType};
pub use variable::{Variable, VariableBuilder};
