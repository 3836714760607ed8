// Attendance hour derivation
// Pure functions turning raw "HH:MM" clock times into payroll fields.

use crate::remote::AttendanceStatus;

/// Shift start used for lateness, until per-site schedules exist.
pub const EXPECTED_START: &str = "08:00";

/// Daily cap on regular hours; everything above is overtime.
pub const REGULAR_HOURS_CAP: f64 = 8.0;

/// Minutes of lateness tolerated before the status flips to late.
pub const LATE_THRESHOLD_MINUTES: i64 = 15;

/// Parse "HH:MM" into minutes since midnight.
fn parse_minutes(hhmm: &str) -> Option<i64> {
    let (h, m) = hhmm.split_once(':')?;
    let hours: i64 = h.parse().ok()?;
    let minutes: i64 = m.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Hours between two "HH:MM" times. An end before the start is read as an
/// overnight shift and gets 24h added. Unparseable input yields 0.
pub fn hours_between(start: &str, end: &str) -> f64 {
    let (Some(start_min), Some(end_min)) = (parse_minutes(start), parse_minutes(end)) else {
        return 0.0;
    };

    let mut diff = end_min - start_min;
    if diff < 0 {
        diff += 24 * 60;
    }
    diff as f64 / 60.0
}

/// Minutes late relative to the expected shift start; never negative.
pub fn late_minutes(clock_in: &str, expected_start: &str) -> i64 {
    let (Some(actual), Some(expected)) = (parse_minutes(clock_in), parse_minutes(expected_start))
    else {
        return 0;
    };
    (actual - expected).max(0)
}

/// Split total hours into (regular, overtime) with the daily cap.
pub fn hours_breakdown(total: f64) -> (f64, f64) {
    let regular = total.min(REGULAR_HOURS_CAP);
    let overtime = (total - REGULAR_HOURS_CAP).max(0.0);
    (regular, overtime)
}

/// Derive the attendance status from clock times and computed figures.
pub fn derive_status(
    clock_in: &str,
    clock_out: &str,
    late_minutes: i64,
    total_hours: f64,
) -> AttendanceStatus {
    if clock_in.is_empty() && clock_out.is_empty() {
        return AttendanceStatus::Absent;
    }
    if total_hours > 0.0 && total_hours < 4.0 {
        return AttendanceStatus::HalfDay;
    }
    if late_minutes > LATE_THRESHOLD_MINUTES {
        return AttendanceStatus::Late;
    }
    AttendanceStatus::Present
}

/// Round to 2 decimal places before persistence.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_between_regular_day() {
        assert_eq!(hours_between("08:15", "17:00"), 8.75);
        assert_eq!(hours_between("08:00", "16:00"), 8.0);
        assert_eq!(hours_between("09:00", "09:00"), 0.0);
    }

    #[test]
    fn test_hours_between_overnight_shift() {
        assert_eq!(hours_between("22:00", "06:00"), 8.0);
        assert_eq!(hours_between("23:30", "00:30"), 1.0);
    }

    #[test]
    fn test_hours_between_is_never_negative() {
        for (start, end) in [("00:00", "23:59"), ("23:59", "00:00"), ("12:00", "11:59")] {
            assert!(hours_between(start, end) >= 0.0, "{} -> {}", start, end);
        }
    }

    #[test]
    fn test_hours_between_bad_input_yields_zero() {
        assert_eq!(hours_between("", "17:00"), 0.0);
        assert_eq!(hours_between("8am", "17:00"), 0.0);
        assert_eq!(hours_between("25:00", "17:00"), 0.0);
        assert_eq!(hours_between("08:61", "17:00"), 0.0);
    }

    #[test]
    fn test_late_minutes_on_time_or_early() {
        assert_eq!(late_minutes("08:00", EXPECTED_START), 0);
        assert_eq!(late_minutes("07:30", EXPECTED_START), 0);
    }

    #[test]
    fn test_late_minutes_monotonic_after_start() {
        let mut previous = 0;
        for clock_in in ["08:01", "08:15", "08:30", "09:00", "12:00"] {
            let late = late_minutes(clock_in, EXPECTED_START);
            assert!(late >= previous);
            previous = late;
        }
        assert_eq!(late_minutes("08:15", EXPECTED_START), 15);
    }

    #[test]
    fn test_hours_breakdown_sums_and_caps() {
        for total in [0.0, 3.5, 8.0, 8.75, 12.0] {
            let (regular, overtime) = hours_breakdown(total);
            assert!((regular + overtime - total).abs() < 1e-9);
            assert!(regular <= REGULAR_HOURS_CAP);
            assert!(overtime >= 0.0);
        }
        assert_eq!(hours_breakdown(8.75), (8.0, 0.75));
    }

    #[test]
    fn test_derive_status() {
        assert_eq!(derive_status("", "", 0, 0.0), AttendanceStatus::Absent);
        assert_eq!(derive_status("08:00", "11:00", 0, 3.0), AttendanceStatus::HalfDay);
        assert_eq!(derive_status("08:30", "17:00", 30, 8.5), AttendanceStatus::Late);
        // 15 minutes is not strictly over the threshold
        assert_eq!(derive_status("08:15", "17:00", 15, 8.75), AttendanceStatus::Present);
        assert_eq!(derive_status("08:00", "17:00", 0, 9.0), AttendanceStatus::Present);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(8.748), 8.75);
        assert_eq!(round2(0.004), 0.0);
        assert_eq!(round2(7.0 + 1.0 / 3.0), 7.33);
    }
}
