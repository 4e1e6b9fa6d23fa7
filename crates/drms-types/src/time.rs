//! Time parsing and slot arithmetic (spec §4.9).
//!
//! Time values are real numbers of SI seconds past the DRMS epoch,
//! 1977.01.01_00:00:00_TAI, matching the companion-constant convention used
//! by time-equal slotted keywords throughout the corpus (spec §3 S1/S2).
//! Internally every [`crate::Value::Time`] is TAI seconds since that epoch;
//! civil/UTC/zone handling only happens at the parse/format boundary.
//!
//! Full calendrical parsing (Roman-numeral months, every historical zone
//! abbreviation) is explicitly out of scope (spec §1: "a well-studied
//! sub-library"); this module implements the contract the slotting logic
//! needs: the three textual forms, the documented zone tags, leap-second
//! adjustment, and the `JULIAN_DAY_ZERO` sentinel for unparseable input.

use crate::error::{DrmsError, Result};
use chrono::{Datelike, NaiveDate};

/// TDT (Terrestrial Dynamical Time) runs this many seconds ahead of TAI,
/// fixed by definition.
const TDT_MINUS_TAI: f64 = 32.184;

/// A fixed table of TAI-UTC offsets (seconds), one entry per date a leap
/// second took effect, through the dates known at the time this module was
/// written. `tai_adjustment` uses the entry in effect on the given date.
const LEAP_SECONDS: &[(i32, u32, u32, f64)] = &[
    (1972, 1, 1, 10.0),
    (1972, 7, 1, 11.0),
    (1973, 1, 1, 12.0),
    (1974, 1, 1, 13.0),
    (1975, 1, 1, 14.0),
    (1976, 1, 1, 15.0),
    (1977, 1, 1, 16.0),
    (1978, 1, 1, 17.0),
    (1979, 1, 1, 18.0),
    (1980, 1, 1, 19.0),
    (1981, 7, 1, 20.0),
    (1982, 7, 1, 21.0),
    (1983, 7, 1, 22.0),
    (1985, 7, 1, 23.0),
    (1988, 1, 1, 24.0),
    (1990, 1, 1, 25.0),
    (1991, 1, 1, 26.0),
    (1992, 7, 1, 27.0),
    (1993, 7, 1, 28.0),
    (1994, 7, 1, 29.0),
    (1996, 1, 1, 30.0),
    (1997, 7, 1, 31.0),
    (1999, 1, 1, 32.0),
    (2006, 1, 1, 33.0),
    (2009, 1, 1, 34.0),
    (2012, 7, 1, 35.0),
    (2015, 7, 1, 36.0),
    (2017, 1, 1, 37.0),
];

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1977, 1, 1).expect("1977-01-01 is representable")
}

/// `JULIAN_DAY_ZERO`: the fixed invalid-time sentinel `sscan_time` returns
/// when given an indecipherable string (spec §9, testable property 9).
/// Distinct from [`crate::value::MISSING_TIME`] by design — the original
/// source explicitly notes they are not the same constant.
pub fn julian_day_zero() -> f64 {
    // Astronomical Julian Day zero is proleptic-Julian-calendar noon,
    // -4712-01-01 12:00 TT. chrono's NaiveDate is proleptic Gregorian, which
    // is an acceptable approximation for this rarely-exercised sentinel —
    // full calendar reconciliation is outside this module's contract.
    let jd_epoch = NaiveDate::from_ymd_opt(-4712, 1, 1).expect("proleptic date representable");
    let days = jd_epoch.signed_duration_since(epoch()).num_days() as f64;
    let seconds = days * 86_400.0 + 12.0 * 3600.0;
    seconds - TDT_MINUS_TAI // stored value is TAI; JD zero is quoted in TT
}

/// A time zone / clock-system tag, as accepted by the textual time grammar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    Utc,
    Tai,
    /// TDT, a.k.a. TT.
    Tdt,
    /// Signed offset from UTC, in minutes (covers `±HHMM` and single-letter
    /// military zones, which this module resolves to a fixed offset).
    Offset(i32),
}

impl Zone {
    fn parse(tag: &str) -> Result<Zone> {
        let upper = tag.to_ascii_uppercase();
        match upper.as_str() {
            "" | "UTC" | "UT" => Ok(Zone::Utc),
            "TAI" => Ok(Zone::Tai),
            "TDT" | "TT" => Ok(Zone::Tdt),
            _ => {
                if let Some(minutes) = parse_numeric_offset(&upper) {
                    Ok(Zone::Offset(minutes))
                } else if upper.len() == 1 {
                    military_zone_offset(upper.chars().next().unwrap())
                        .map(Zone::Offset)
                        .ok_or_else(|| DrmsError::InvalidData(format!("unknown time zone '{tag}'")))
                } else {
                    Err(DrmsError::InvalidData(format!("unknown time zone '{tag}'")))
                }
            }
        }
    }
}

fn parse_numeric_offset(s: &str) -> Option<i32> {
    let (sign, digits) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hh: i32 = digits[0..2].parse().ok()?;
    let mm: i32 = digits[2..4].parse().ok()?;
    Some(sign * (hh * 60 + mm))
}

/// Standard single-letter military time zone designations, offset in
/// minutes from UTC. `J` ("local") is intentionally unmapped.
fn military_zone_offset(letter: char) -> Option<i32> {
    let hour = |h: i32| Some(h * 60);
    match letter {
        'Z' => hour(0),
        'A' => hour(1),
        'B' => hour(2),
        'C' => hour(3),
        'D' => hour(4),
        'E' => hour(5),
        'F' => hour(6),
        'G' => hour(7),
        'H' => hour(8),
        'I' => hour(9),
        'K' => hour(10),
        'L' => hour(11),
        'M' => hour(12),
        'N' => hour(-1),
        'O' => hour(-2),
        'P' => hour(-3),
        'Q' => hour(-4),
        'R' => hour(-5),
        'S' => hour(-6),
        'T' => hour(-7),
        'U' => hour(-8),
        'V' => hour(-9),
        'W' => hour(-10),
        'X' => hour(-11),
        'Y' => hour(-12),
        _ => None,
    }
}

/// `tai_adjustment(t, zone)`: the signed delta to add to a parsed civil-time
/// value (in the given zone, read as if it were already TAI seconds since
/// the epoch) to get true TAI seconds since the epoch.
pub fn tai_adjustment(t: f64, zone: Zone) -> f64 {
    match zone {
        Zone::Tai => 0.0,
        Zone::Tdt => -TDT_MINUS_TAI,
        Zone::Utc => leap_second_offset_at(t),
        Zone::Offset(minutes) => leap_second_offset_at(t) - minutes as f64 * 60.0,
    }
}

fn leap_second_offset_at(t_since_epoch: f64) -> f64 {
    let date = epoch() + chrono::Duration::seconds(t_since_epoch as i64);
    let mut offset = LEAP_SECONDS[0].3;
    for &(y, m, d, o) in LEAP_SECONDS {
        let entry = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        if entry <= date {
            offset = o;
        } else {
            break;
        }
    }
    offset
}

fn month_from_name(s: &str) -> Option<u32> {
    let lower = s.to_ascii_lowercase();
    const NAMES: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    NAMES
        .iter()
        .position(|n| lower.starts_with(n))
        .map(|i| i as u32 + 1)
}

fn parse_month(s: &str) -> Option<u32> {
    if let Ok(n) = s.parse::<u32>() {
        if (1..=12).contains(&n) {
            return Some(n);
        }
    }
    month_from_name(s)
}

/// `sscanf_value` for the `Time` type (spec §4.1/§4.9). Accepts calendar
/// (`year.month.fracday[_type]`), calendar-clock
/// (`year.month.day_hour:minute[:second][_type]`), and Julian-day
/// (`{JD|MJD}_julday[_type]`) forms. On any parse failure, returns
/// [`julian_day_zero`] rather than an error, matching the original
/// `sscan_time` contract.
pub fn parse_time(s: &str) -> Result<f64> {
    Ok(try_parse_time(s).unwrap_or_else(|| julian_day_zero()))
}

fn try_parse_time(s: &str) -> Option<f64> {
    let s = s.trim();
    let upper = s.to_ascii_uppercase();

    if let Some(rest) = upper.strip_prefix("JD_").or_else(|| upper.strip_prefix("MJD_")) {
        let is_mjd = upper.starts_with("MJD_");
        let (value_part, zone_tag) = split_zone(rest);
        let jd: f64 = value_part.parse().ok()?;
        // Per the original sscan_time contract, an absent zone on a Julian
        // day form defaults to TDT (calendar forms default to UTC instead).
        let zone = if zone_tag.is_empty() {
            Zone::Tdt
        } else {
            Zone::parse(zone_tag).ok()?
        };
        let jd = if is_mjd { jd + 2_400_000.5 } else { jd };
        // `epoch_jd` is the JD value such that `seconds = (jd - epoch_jd) * 86400`;
        // see `julian_day_zero` for the matching derivation.
        let days_epoch_after_jd_epoch =
            epoch().signed_duration_since(NaiveDate::from_ymd_opt(-4712, 1, 1)?).num_days() as f64;
        let epoch_jd = days_epoch_after_jd_epoch - 0.5;
        let seconds = (jd - epoch_jd) * 86_400.0;
        return Some(seconds + tai_adjustment(seconds, zone));
    }

    // Calendar / calendar-clock forms: "Y.M.D[_type]" where D may itself
    // contain "_hour:minute[:second]".
    let (body, zone_tag) = split_zone(s);
    let zone = Zone::parse(zone_tag).ok()?;

    let mut parts = body.splitn(3, '.');
    let year: i32 = parts.next()?.parse().ok()?;
    let month = parse_month(parts.next()?)?;
    let day_and_time = parts.next()?;

    let (day_str, time_str) = match day_and_time.split_once('_') {
        Some((d, t)) => (d, Some(t)),
        None => (day_and_time, None),
    };

    let (day, frac_seconds) = match time_str {
        Some(clock) => {
            let day: u32 = day_str.parse().ok()?;
            let mut clock_parts = clock.split(':');
            let hour: f64 = clock_parts.next()?.parse().ok()?;
            let minute: f64 = clock_parts.next().unwrap_or("0").parse().ok()?;
            let second: f64 = clock_parts.next().unwrap_or("0").parse().ok()?;
            (day, hour * 3600.0 + minute * 60.0 + second)
        }
        None => {
            let fracday: f64 = day_str.parse().ok()?;
            let day = fracday.trunc() as u32;
            ((day.max(1)), (fracday.fract()) * 86_400.0)
        }
    };

    let date = NaiveDate::from_ymd_opt(year, month, day.max(1))?;
    let days_since_epoch = date.signed_duration_since(epoch()).num_days() as f64;
    let civil_seconds = days_since_epoch * 86_400.0 + frac_seconds;

    Some(civil_seconds + tai_adjustment(civil_seconds, zone))
}

/// Splits a trailing `_TYPE` zone tag off a time string, if the tail after
/// the last underscore looks like one (all-alphabetic, or a signed 4-digit
/// offset). Otherwise the whole string is the body and the zone is empty.
fn split_zone(s: &str) -> (&str, &str) {
    let Some((body, tag)) = s.rsplit_once('_') else {
        return (s, "");
    };
    let is_zone = (!tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphabetic()))
        || parse_numeric_offset(&tag.to_ascii_uppercase()).is_some();
    if is_zone {
        (body, tag)
    } else {
        (s, "")
    }
}

/// `sprintf_value` for the `Time` type: renders TAI-seconds-since-epoch as
/// a calendar-clock string in the given zone, with `precision` fractional
/// seconds digits (negative values are clamped to 0, matching the
/// convention that the sign only distinguishes format "slots" upstream).
pub fn format_time(secs_since_epoch: f64, precision: i32, zone: Zone) -> String {
    let adj = -tai_adjustment(secs_since_epoch, zone);
    let civil = secs_since_epoch + adj;
    let days = (civil / 86_400.0).floor();
    let remainder = civil - days * 86_400.0;

    let date = epoch() + chrono::Duration::days(days as i64);
    let hour = (remainder / 3600.0).floor();
    let minute = ((remainder - hour * 3600.0) / 60.0).floor();
    let second = remainder - hour * 3600.0 - minute * 60.0;

    let zone_name = match zone {
        Zone::Utc => "UTC",
        Zone::Tai => "TAI",
        Zone::Tdt => "TDT",
        Zone::Offset(_) => "UT",
    };

    let digits = precision.max(0) as usize;
    if digits == 0 {
        format!(
            "{:04}.{:02}.{:02}_{:02}:{:02}:{:02.0}_{}",
            date.year(),
            date.month(),
            date.day(),
            hour as i64,
            minute as i64,
            second,
            zone_name
        )
    } else {
        format!(
            "{:04}.{:02}.{:02}_{:02}:{:02}:{:0width$.prec$}_{}",
            date.year(),
            date.month(),
            date.day(),
            hour as i64,
            minute as i64,
            second,
            zone_name,
            width = digits + 3,
            prec = digits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tai_epoch_is_zero() {
        let t = parse_time("1977.01.01_00:00:00_TAI").unwrap();
        assert_eq!(t, 0.0);
    }

    #[test]
    fn thirty_seconds_after_epoch() {
        let t = parse_time("1977.01.01_00:00:30_TAI").unwrap();
        assert_eq!(t, 30.0);
    }

    #[test]
    fn ninety_seconds_after_epoch() {
        let t = parse_time("1977.01.01_00:01:30_TAI").unwrap();
        assert_eq!(t, 90.0);
    }

    #[test]
    fn unparseable_time_yields_julian_day_zero() {
        let t = parse_time("not a time").unwrap();
        assert_eq!(t, julian_day_zero());
    }

    #[test]
    fn jd_0_0_is_julian_day_zero() {
        let t = parse_time("JD_0.0").unwrap();
        assert!((t - julian_day_zero()).abs() < 1e-6);
    }
}
