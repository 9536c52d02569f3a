//! Interval timelines of legislated values.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::{Instant, Period, PeriodUnit};

/// A value in force over the closed range `[start, stop]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem<V = serde_json::Value> {
    pub start: Instant,
    pub stop: Instant,
    pub value: V,
}

impl<V> TimelineItem<V> {
    /// Creates an item.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if `start > stop`.
    pub fn new(start: Instant, stop: Instant, value: V) -> Result<Self, ValidationError> {
        if start > stop {
            return Err(ValidationError::InvalidInterval { start, stop });
        }
        Ok(Self { start, stop, value })
    }

    #[must_use]
    pub fn contains(&self, instant: Instant) -> bool {
        self.start <= instant && instant <= self.stop
    }
}

/// Ordered, non-overlapping history of one parameter.
///
/// Gaps are legal and resolve to "undefined at that instant".
///
/// # Examples
///
/// ```
/// use legiscalc::legislation::{Timeline, TimelineItem};
/// use legiscalc::time::Instant;
///
/// let d = |y, m, day| Instant::new(y, m, day).unwrap();
/// let timeline = Timeline::new(vec![
///     TimelineItem::new(d(2010, 1, 1), d(2012, 12, 31), 10).unwrap(),
/// ]).unwrap();
///
/// let patched = timeline.patch(d(2011, 1, 1), d(2011, 12, 31), 20).unwrap();
/// assert_eq!(patched.items().len(), 3);
/// assert_eq!(patched.value_at(d(2011, 6, 1)), Some(&20));
/// assert_eq!(patched.value_at(d(2012, 6, 1)), Some(&10));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline<V = serde_json::Value> {
    items: Vec<TimelineItem<V>>,
}

impl<V> Default for Timeline<V> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<V> Timeline<V> {
    /// Builds a timeline, sorting items by start.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTimeline` if an item is inverted or
    /// two items overlap.
    pub fn new(mut items: Vec<TimelineItem<V>>) -> Result<Self, ValidationError> {
        items.sort_by_key(|item| item.start);
        for item in &items {
            if item.start > item.stop {
                return Err(ValidationError::InvalidTimeline {
                    reason: format!("item [{}, {}] ends before it starts", item.start, item.stop),
                });
            }
        }
        for pair in items.windows(2) {
            if pair[0].stop >= pair[1].start {
                return Err(ValidationError::InvalidTimeline {
                    reason: format!(
                        "items [{}, {}] and [{}, {}] overlap",
                        pair[0].start, pair[0].stop, pair[1].start, pair[1].stop
                    ),
                });
            }
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[TimelineItem<V>] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Value in force at `instant`; `None` inside a gap.
    #[must_use]
    pub fn value_at(&self, instant: Instant) -> Option<&V> {
        self.items
            .iter()
            .find(|item| item.contains(instant))
            .map(|item| &item.value)
    }

    /// Item in force at `instant`.
    ///
    /// When no item covers `instant` but `nearest_in` contains it, falls back
    /// to the earliest item (instant before the whole timeline) or the latest
    /// item (instant after the whole timeline).
    #[must_use]
    pub fn find_item_at(&self, instant: Instant, nearest_in: Option<&Period>) -> Option<&TimelineItem<V>> {
        if let Some(item) = self.items.iter().find(|item| item.contains(instant)) {
            return Some(item);
        }
        if !nearest_in.is_some_and(|p| p.contains_instant(instant)) {
            return None;
        }
        let earliest = self.items.iter().min_by_key(|item| item.start)?;
        if instant < earliest.start {
            return Some(earliest);
        }
        let latest = self.items.iter().max_by_key(|item| item.stop)?;
        if instant > latest.stop {
            return Some(latest);
        }
        None
    }
}

impl<V: Clone> Timeline<V> {
    /// Overlays `value` on `[start, stop]`, returning a new timeline.
    ///
    /// Existing items are passed through when disjoint, truncated when they
    /// overlap an edge, split when they contain the new interval and dropped
    /// when the new interval contains them. The new item is inserted exactly
    /// once. Patching twice with the same interval and value is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if `start > stop`.
    pub fn patch(&self, start: Instant, stop: Instant, value: V) -> Result<Self, ValidationError> {
        let new_item = TimelineItem::new(start, stop, value)?;
        let mut items = Vec::with_capacity(self.items.len() + 2);
        let mut inserted = false;

        for item in &self.items {
            if item.stop < start || item.start > stop {
                items.push(item.clone());
                continue;
            }
            if item.start == start && item.stop == stop {
                if !inserted {
                    items.push(new_item.clone());
                    inserted = true;
                }
                continue;
            }
            if item.start < start {
                items.push(TimelineItem {
                    start: item.start,
                    stop: start.offset(PeriodUnit::Day, -1),
                    value: item.value.clone(),
                });
            }
            if !inserted {
                items.push(new_item.clone());
                inserted = true;
            }
            if item.stop > stop {
                items.push(TimelineItem {
                    start: stop.offset(PeriodUnit::Day, 1),
                    stop: item.stop,
                    value: item.value.clone(),
                });
            }
        }
        if !inserted {
            items.push(new_item);
        }

        items.sort_by_key(|item| item.start);
        Ok(Self { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Instant {
        Instant::new(y, m, day).unwrap()
    }

    fn item(start: Instant, stop: Instant, value: i32) -> TimelineItem<i32> {
        TimelineItem::new(start, stop, value).unwrap()
    }

    fn base() -> Timeline<i32> {
        Timeline::new(vec![item(d(2010, 1, 1), d(2012, 12, 31), 10)]).unwrap()
    }

    #[test]
    fn test_patch_splits_containing_item() {
        let patched = base().patch(d(2011, 1, 1), d(2011, 12, 31), 20).unwrap();
        assert_eq!(
            patched.items(),
            &[
                item(d(2010, 1, 1), d(2010, 12, 31), 10),
                item(d(2011, 1, 1), d(2011, 12, 31), 20),
                item(d(2012, 1, 1), d(2012, 12, 31), 10),
            ]
        );
    }

    #[test]
    fn test_patch_is_idempotent() {
        let once = base().patch(d(2011, 1, 1), d(2011, 12, 31), 20).unwrap();
        let twice = once.patch(d(2011, 1, 1), d(2011, 12, 31), 20).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_patch_left_and_right_overlap() {
        let timeline = Timeline::new(vec![
            item(d(2010, 1, 1), d(2010, 12, 31), 1),
            item(d(2011, 1, 1), d(2011, 12, 31), 2),
            item(d(2012, 1, 1), d(2012, 12, 31), 3),
        ])
        .unwrap();
        let patched = timeline.patch(d(2010, 7, 1), d(2012, 6, 30), 9).unwrap();
        assert_eq!(
            patched.items(),
            &[
                item(d(2010, 1, 1), d(2010, 6, 30), 1),
                item(d(2010, 7, 1), d(2012, 6, 30), 9),
                item(d(2012, 7, 1), d(2012, 12, 31), 3),
            ]
        );
    }

    #[test]
    fn test_patch_into_gap_and_outside() {
        let timeline = Timeline::new(vec![
            item(d(2010, 1, 1), d(2010, 12, 31), 1),
            item(d(2013, 1, 1), d(2013, 12, 31), 3),
        ])
        .unwrap();
        let gap = timeline.patch(d(2011, 1, 1), d(2011, 12, 31), 2).unwrap();
        assert_eq!(gap.items().len(), 3);
        assert_eq!(gap.items()[1], item(d(2011, 1, 1), d(2011, 12, 31), 2));

        let after = timeline.patch(d(2020, 1, 1), d(2020, 12, 31), 5).unwrap();
        assert_eq!(after.items().last(), Some(&item(d(2020, 1, 1), d(2020, 12, 31), 5)));

        let empty = Timeline::<i32>::default().patch(d(2020, 1, 1), d(2020, 1, 1), 5).unwrap();
        assert_eq!(empty.items().len(), 1);
    }

    #[test]
    fn test_patch_shared_edges() {
        let left = base().patch(d(2010, 1, 1), d(2010, 6, 30), 7).unwrap();
        assert_eq!(
            left.items(),
            &[item(d(2010, 1, 1), d(2010, 6, 30), 7), item(d(2010, 7, 1), d(2012, 12, 31), 10)]
        );
        let right = base().patch(d(2012, 7, 1), d(2012, 12, 31), 7).unwrap();
        assert_eq!(
            right.items(),
            &[item(d(2010, 1, 1), d(2012, 6, 30), 10), item(d(2012, 7, 1), d(2012, 12, 31), 7)]
        );
    }

    #[test]
    fn test_patch_covering_everything() {
        let patched = base().patch(d(2000, 1, 1), d(2030, 12, 31), 0).unwrap();
        assert_eq!(patched.items(), &[item(d(2000, 1, 1), d(2030, 12, 31), 0)]);
    }

    #[test]
    fn test_patch_rejects_inverted_interval() {
        assert!(base().patch(d(2012, 1, 1), d(2011, 1, 1), 0).is_err());
    }

    #[test]
    fn test_new_rejects_overlap() {
        let result = Timeline::new(vec![
            item(d(2010, 1, 1), d(2011, 6, 30), 1),
            item(d(2011, 1, 1), d(2011, 12, 31), 2),
        ]);
        assert!(matches!(result, Err(ValidationError::InvalidTimeline { .. })));
    }

    #[test]
    fn test_value_at_gap_is_none() {
        let timeline = Timeline::new(vec![
            item(d(2010, 1, 1), d(2010, 12, 31), 1),
            item(d(2012, 1, 1), d(2012, 12, 31), 3),
        ])
        .unwrap();
        assert_eq!(timeline.value_at(d(2010, 12, 31)), Some(&1));
        assert_eq!(timeline.value_at(d(2011, 6, 1)), None);
        assert_eq!(timeline.value_at(d(2009, 6, 1)), None);
    }

    #[test]
    fn test_find_item_at_nearest() {
        let timeline = base();
        let period = Period::new(PeriodUnit::Year, d(2005, 1, 1), 20).unwrap();
        assert_eq!(timeline.find_item_at(d(2008, 1, 1), None), None);
        assert_eq!(timeline.find_item_at(d(2008, 1, 1), Some(&period)).map(|i| i.value), Some(10));
        assert_eq!(timeline.find_item_at(d(2020, 1, 1), Some(&period)).map(|i| i.value), Some(10));
        assert_eq!(timeline.find_item_at(d(2030, 1, 1), Some(&period)), None);
    }
}
