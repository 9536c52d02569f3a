//! Evaluation engine.
//!
//! A [`Simulation`] evaluates the variables of a rule set over one
//! population, caching every result per variable and period. Configuration
//! lives in [`SimulationConfig`]; cycle detection state of a single request
//! in [`RequestTracker`].

pub mod config;
pub mod context;
pub mod tracker;

pub use config::SimulationConfig;
pub use context::{Simulation, SimulationId};
pub use tracker::RequestTracker;
