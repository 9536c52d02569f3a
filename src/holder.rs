//! Per-variable result cache.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::time::Period;
use crate::trace::TraceEntry;
use crate::value::Array;
use crate::variable::Variable;

/// Cache key of a result: the exact period, or one shared key for
/// period-invariant variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeriodKey {
    /// Any period of a period-invariant variable.
    Invariant,
    /// One exact period.
    At(Period),
}

impl PeriodKey {
    /// Key of `variable` for `period`.
    #[must_use]
    pub fn of(variable: &Variable, period: Period) -> Self {
        if variable.is_period_invariant() {
            Self::Invariant
        } else {
            Self::At(period)
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invariant => f.write_str("eternity"),
            Self::At(period) => write!(f, "{period}"),
        }
    }
}

/// Computed and input arrays of one variable in one simulation, plus the
/// explanatory state of its formula.
///
/// Entries are never evicted during a run. Arrays are shared by reference
/// count, so cloning a holder for a forked simulation copies no data and the
/// two holders evolve independently afterwards.
#[derive(Debug, Clone, Default)]
pub struct Holder {
    arrays: BTreeMap<PeriodKey, Arc<Array>>,
    entry: TraceEntry,
}

impl Holder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached array at `key`.
    #[must_use]
    pub fn get(&self, key: PeriodKey) -> Option<Arc<Array>> {
        self.arrays.get(&key).cloned()
    }

    /// Caches `array` at `key` unless an array is already there; returns the
    /// array held at `key` afterwards.
    pub fn put(&mut self, key: PeriodKey, array: Arc<Array>) -> Arc<Array> {
        Arc::clone(self.arrays.entry(key).or_insert(array))
    }

    /// Replaces the array at `key`.
    pub fn set(&mut self, key: PeriodKey, array: Arc<Array>) {
        self.arrays.insert(key, array);
    }

    #[must_use]
    pub fn contains(&self, key: PeriodKey) -> bool {
        self.arrays.contains_key(&key)
    }

    /// Cached keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = PeriodKey> + '_ {
        self.arrays.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Candidate path of the formula that produced the latest result.
    pub fn used(&self) -> &[usize] {
        &self.entry.used
    }

    pub(crate) fn set_used(&mut self, used: Vec<usize>) {
        self.entry.used = used;
    }

    pub fn trace_entry(&self) -> &TraceEntry {
        &self.entry
    }

    pub(crate) fn mark_computed(&mut self, default_arguments: bool) {
        self.entry.is_computed = true;
        self.entry.default_arguments = default_arguments;
    }
}
