//! Pure helper functions: point accounting and recruiting-filter date arithmetic. Nothing in
//! here touches the database.
use chrono::{Days, Months, NaiveDate};
use mmp_common::{base_hourly_rate, Points};

use crate::db_types::AgeRange;

/// Shortest meetup a guest may propose, in minutes.
pub const MIN_DURATION_MINUTES: i64 = 30;
/// Longest meetup a guest may propose, in minutes.
pub const MAX_DURATION_MINUTES: i64 = 480;
/// Extensions are sold in blocks of this many minutes.
pub const EXTENSION_STEP_MINUTES: i64 = 30;

/// Converts a duration at an hourly rate into points, rounding half-up to the nearest point.
///
/// The same formula prices the initial offer and every extension block, so a 60-minute extension
/// always costs exactly one hour at the rate in force.
pub fn points_for(duration_minutes: i64, hourly_rate: Points) -> Points {
    let raw = duration_minutes * hourly_rate.value();
    Points::from((raw + 30) / 60)
}

/// The upfront budget for a group offer: per-cast base-rate points times the requested head
/// count. Deliberately independent of which casts end up accepting.
pub fn group_total_points(duration_minutes: i64, requested_cast_count: i64) -> Points {
    points_for(duration_minutes, base_hourly_rate()) * requested_cast_count
}

/// The cost of extending a group session, priced the same way the group budget was.
pub fn group_extension_points(extension_minutes: i64, requested_cast_count: i64) -> Points {
    points_for(extension_minutes, base_hourly_rate()) * requested_cast_count
}

pub fn is_valid_duration(duration_minutes: i64) -> bool {
    (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_minutes)
}

/// Translates an inclusive age band into the birth-date window that satisfies it on `today`.
/// Returns `(earliest, latest)`, both inclusive: a cast is eligible when
/// `earliest <= birth_date <= latest`.
pub fn birth_date_window(range: &AgeRange, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let latest = today
        .checked_sub_months(Months::new(u32::from(range.min) * 12))
        .unwrap_or(today);
    let earliest = today
        .checked_sub_months(Months::new((u32::from(range.max) + 1) * 12))
        .and_then(|d| d.checked_add_days(Days::new(1)))
        .unwrap_or(today);
    (earliest, latest)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn one_hour_at_rate_r_costs_r() {
        for rate in [1_500, 3_000, 5_000, 10_000] {
            assert_eq!(points_for(60, Points::from(rate)), Points::from(rate));
        }
    }

    #[test]
    fn rounding_is_half_up() {
        // 90 minutes at 3000/h is exactly 4500
        assert_eq!(points_for(90, Points::from(3_000)), Points::from(4_500));
        // 50 minutes at 1000/h is 833.33..., rounds down
        assert_eq!(points_for(50, Points::from(1_000)), Points::from(833));
        // 45 minutes at 1000/h is 750 exactly
        assert_eq!(points_for(45, Points::from(1_000)), Points::from(750));
        // 35 minutes at 1001/h is 583.91..., rounds up
        assert_eq!(points_for(35, Points::from(1_001)), Points::from(584));
        // half a point rounds up
        assert_eq!(points_for(30, Points::from(1_001)), Points::from(501));
    }

    #[test]
    fn group_budget_scales_with_requested_count_only() {
        assert_eq!(group_total_points(60, 3), Points::from(9_000));
        assert_eq!(group_total_points(120, 2), Points::from(12_000));
        assert_eq!(group_extension_points(30, 3), Points::from(4_500));
    }

    #[test]
    fn duration_bounds() {
        assert!(!is_valid_duration(0));
        assert!(!is_valid_duration(29));
        assert!(is_valid_duration(30));
        assert!(is_valid_duration(480));
        assert!(!is_valid_duration(481));
        assert!(!is_valid_duration(-60));
    }

    #[test]
    fn birth_window_brackets_the_band() {
        let today = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        let range = AgeRange::new(20, 29);
        let (earliest, latest) = birth_date_window(&range, today);
        assert_eq!(latest, NaiveDate::from_ymd_opt(2004, 9, 1).unwrap());
        assert_eq!(earliest, NaiveDate::from_ymd_opt(1994, 9, 2).unwrap());
        // Someone born on `latest` turns exactly 20 today; someone born the day before
        // `earliest` turned 30 yesterday.
    }
}
