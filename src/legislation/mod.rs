//! Legislated parameters.
//!
//! Each parameter's history is a [`Timeline`] of non-overlapping dated
//! values. Parameters are organised in an immutable [`LegislationTree`];
//! reforms derive new trees by patching one timeline at a time, sharing every
//! untouched subtree with the original.

pub mod timeline;
pub mod tree;

pub use timeline::{Timeline, TimelineItem};
pub use tree::{LegislationNode, LegislationTree, ParameterPath, PathSegment};
