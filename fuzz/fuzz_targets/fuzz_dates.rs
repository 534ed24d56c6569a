#![no_main]

//! Fuzz target for the date and weekday parsers fed by command-line flags.
//!
//! Any string must either parse or produce an error, never panic, and a
//! parsed value must survive formatting and parsing again.

use libfuzzer_sys::fuzz_target;

use taskmap::dates::{
    format_date, month_bounds, parse_date, parse_month, parse_weekdays, week_bounds,
};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(date) = parse_date(s) {
        assert_eq!(parse_date(&format_date(date)).ok(), Some(date));
        let (start, end) = week_bounds(date);
        assert!(start <= date && date <= end);
    }

    if let Ok((year, month)) = parse_month(s) {
        assert!(month_bounds(year, month).is_some());
    }

    if let Ok(days) = parse_weekdays(s) {
        assert!(days.iter().all(|d| *d <= 6));
        assert!(days.windows(2).all(|w| w[0] < w[1]));
    }
});
