use proptest::prelude::*;

use legiscalc::time::PeriodUnit;
use legiscalc::{Instant, Timeline, TimelineItem};

fn origin() -> Instant {
    Instant::new(2000, 1, 1).unwrap()
}

fn at(days: i64) -> Instant {
    origin().offset(PeriodUnit::Day, days)
}

/// Non-overlapping items built from alternating gaps and lengths.
fn timeline_strategy() -> impl Strategy<Value = Timeline<i64>> {
    prop::collection::vec((0i64..30, 0i64..60, any::<i64>()), 0..8).prop_map(|spans| {
        let mut cursor = 0;
        let items = spans
            .into_iter()
            .map(|(gap, len, value)| {
                let start = cursor + gap;
                let stop = start + len;
                cursor = stop + 1;
                TimelineItem::new(at(start), at(stop), value).unwrap()
            })
            .collect();
        Timeline::new(items).unwrap()
    })
}

fn interval_strategy() -> impl Strategy<Value = (i64, i64)> {
    (0i64..400, 0i64..120).prop_map(|(start, len)| (start, start + len))
}

fn assert_well_formed(timeline: &Timeline<i64>) {
    for pair in timeline.items().windows(2) {
        assert!(pair[0].start <= pair[0].stop);
        assert!(pair[0].stop < pair[1].start, "items overlap or are unsorted");
    }
}

proptest! {
    #[test]
    fn patch_keeps_items_sorted_and_disjoint(
        timeline in timeline_strategy(),
        (start, stop) in interval_strategy(),
        value in any::<i64>(),
    ) {
        let patched = timeline.patch(at(start), at(stop), value).unwrap();
        assert_well_formed(&patched);
    }

    #[test]
    fn patched_interval_holds_new_value(
        timeline in timeline_strategy(),
        (start, stop) in interval_strategy(),
        value in any::<i64>(),
        day in 0i64..600,
    ) {
        let patched = timeline.patch(at(start), at(stop), value).unwrap();
        let instant = at(day);
        if (start..=stop).contains(&day) {
            prop_assert_eq!(patched.value_at(instant), Some(&value));
        } else {
            prop_assert_eq!(patched.value_at(instant), timeline.value_at(instant));
        }
        prop_assert_eq!(
            patched.items().iter().filter(|item| item.start == at(start) && item.stop == at(stop)).count(),
            1
        );
    }

    #[test]
    fn patch_is_idempotent(
        timeline in timeline_strategy(),
        (start, stop) in interval_strategy(),
        value in any::<i64>(),
    ) {
        let once = timeline.patch(at(start), at(stop), value).unwrap();
        let twice = once.patch(at(start), at(stop), value).unwrap();
        prop_assert_eq!(once.items(), twice.items());
    }
}

#[test]
fn inverted_patch_is_rejected() {
    let timeline: Timeline<i64> = Timeline::default();
    assert!(timeline.patch(at(10), at(5), 1).is_err());
}
