//! Pure check-in streak math: no I/O, no clock -- callers hand in the set
//! of dates a user checked in on and get back the same numbers every time,
//! which is what makes this the easiest module in the crate to property-test.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate, Weekday};

fn week_start(date: NaiveDate) -> NaiveDate {
    date.week(Weekday::Mon).first_day()
}

/// Length of the maximal consecutive-day sequence ending at `as_of` in
/// which `dates` has at least one entry.
pub fn current_daily_streak(dates: &BTreeSet<NaiveDate>, as_of: NaiveDate) -> u32 {
    let mut streak = 0u32;
    let mut day = as_of;
    while dates.contains(&day) {
        streak += 1;
        day = match day.checked_sub_days(Days::new(1)) {
            Some(d) => d,
            None => break,
        };
    }
    streak
}

/// Maximal run over all of `dates`' history.
pub fn longest_daily_streak(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0u32;
    let mut current = 0u32;
    let mut prev: Option<NaiveDate> = None;
    for &d in dates {
        current = match prev {
            Some(p) if d == p + chrono::Duration::days(1) => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        prev = Some(d);
    }
    longest
}

/// Analogous to [`current_daily_streak`] but over ISO weeks: a user's
/// streak survives as long as every ISO week up to and including `as_of`'s
/// week has at least one entry.
pub fn current_weekly_streak(dates: &BTreeSet<NaiveDate>, as_of: NaiveDate) -> u32 {
    let weeks: BTreeSet<NaiveDate> = dates.iter().copied().map(week_start).collect();
    let mut streak = 0u32;
    let mut week = week_start(as_of);
    loop {
        if !weeks.contains(&week) {
            break;
        }
        streak += 1;
        week -= chrono::Duration::days(7);
    }
    streak
}

/// `(to - from).days + 1 - distinct days with a check-in in [from, to]`.
pub fn missed_days(dates: &BTreeSet<NaiveDate>, from: NaiveDate, to: NaiveDate) -> i64 {
    if to < from {
        return 0;
    }
    let total_days = (to - from).num_days() + 1;
    let present = dates.range(from..=to).count() as i64;
    total_days - present
}

/// `distinct check-in days / partnership-active days`, clamped to [0, 1].
pub fn completion_rate(distinct_checkin_days: usize, active_days: i64) -> f64 {
    if active_days <= 0 {
        return 0.0;
    }
    (distinct_checkin_days as f64 / active_days as f64).clamp(0.0, 1.0)
}

/// Whether a check-in on `next` breaks a streak whose most recent entry
/// was `previous`, per cadence: a gap over 1 day (DAILY) or 1 ISO week
/// (WEEKLY) breaks it.
pub fn breaks_daily_streak(previous: NaiveDate, next: NaiveDate) -> bool {
    (next - previous).num_days() > 1
}

pub fn breaks_weekly_streak(previous: NaiveDate, next: NaiveDate) -> bool {
    week_start(next) - week_start(previous) > chrono::Duration::days(7)
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn arb_dates(as_of: NaiveDate) -> impl Strategy<Value = BTreeSet<NaiveDate>> {
        proptest::collection::btree_set(0i64..60, 0..40)
            .prop_map(move |offsets| offsets.into_iter().map(|o| as_of - chrono::Duration::days(o)).collect())
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    proptest! {
        #[test]
        fn current_streak_never_exceeds_longest_streak_prop(dates in arb_dates(as_of())) {
            prop_assert!(current_daily_streak(&dates, as_of()) <= longest_daily_streak(&dates));
        }

        #[test]
        fn current_streak_is_zero_when_as_of_has_no_entry(dates in arb_dates(as_of())) {
            if !dates.contains(&as_of()) {
                prop_assert_eq!(current_daily_streak(&dates, as_of()), 0);
            }
        }

        #[test]
        fn missed_days_is_never_negative_for_a_valid_range(dates in arb_dates(as_of()), span in 0i64..60) {
            let to = as_of();
            let from = to - chrono::Duration::days(span);
            prop_assert!(missed_days(&dates, from, to) >= 0);
        }

        #[test]
        fn completion_rate_never_leaves_the_unit_interval(distinct in 0usize..200, active in -5i64..200) {
            let rate = completion_rate(distinct, active);
            prop_assert!((0.0..=1.0).contains(&rate));
        }
    }
}
