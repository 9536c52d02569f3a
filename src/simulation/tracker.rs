//! In-progress markers of one top-level request.

use std::collections::{BTreeMap, BTreeSet};

use crate::holder::PeriodKey;

/// Variables currently being evaluated, per period key.
///
/// One tracker lives for one top-level request and is threaded through every
/// recursive evaluation it triggers. Requesting a variable already marked for
/// the same key is a dependency cycle.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    in_progress: BTreeMap<PeriodKey, BTreeSet<String>>,
}

impl RequestTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `variable` in progress for `key`. Returns false if it already was.
    pub fn enter(&mut self, key: PeriodKey, variable: &str) -> bool {
        self.in_progress
            .entry(key)
            .or_default()
            .insert(variable.to_string())
    }

    /// Removes the mark set by [`enter`](Self::enter).
    pub fn exit(&mut self, key: PeriodKey, variable: &str) {
        if let Some(set) = self.in_progress.get_mut(&key) {
            set.remove(variable);
            if set.is_empty() {
                self.in_progress.remove(&key);
            }
        }
    }

    #[must_use]
    pub fn is_in_progress(&self, key: PeriodKey, variable: &str) -> bool {
        self.in_progress
            .get(&key)
            .is_some_and(|set| set.contains(variable))
    }

    /// Variables in progress for `key`, sorted by name.
    #[must_use]
    pub fn in_progress(&self, key: PeriodKey) -> Vec<String> {
        self.in_progress
            .get(&key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True when no variable is in progress.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_progress.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Period;

    #[test]
    fn test_enter_exit() {
        let mut tracker = RequestTracker::new();
        let key = PeriodKey::At(Period::year(2015).unwrap());
        assert!(tracker.enter(key, "b"));
        assert!(tracker.enter(key, "a"));
        assert!(!tracker.enter(key, "a"));
        assert!(tracker.is_in_progress(key, "a"));
        assert!(!tracker.is_in_progress(PeriodKey::Invariant, "a"));
        assert_eq!(tracker.in_progress(key), vec!["a", "b"]);
        tracker.exit(key, "a");
        tracker.exit(key, "b");
        assert!(tracker.is_idle());
    }
}
