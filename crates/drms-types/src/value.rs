//! The typed-value layer (spec §4.1): a concrete runtime value tagged with
//! its type, total conversions between any pair of types, lossless
//! comparison, and pretty-printing via a restricted printf-style grammar.

use crate::error::{DrmsError, Result};
use crate::time;
use serde::{Deserialize, Serialize};

/// `DRMS_MISSING_TIME`: the fixed negative sentinel for a missing time value.
/// Carried over verbatim from the original implementation rather than
/// invented, since any other choice would silently diverge from archived
/// data that already encodes this constant.
pub const MISSING_TIME: f64 = -211087684800.0;

/// The fixed scalar universe (spec §3 "Types").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Time,
    String,
}

impl ValueType {
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Char | Self::Short | Self::Int | Self::Long)
    }

    pub fn is_real(self) -> bool {
        matches!(self, Self::Float | Self::Double | Self::Time)
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Time => "time",
            Self::String => "string",
        };
        f.write_str(s)
    }
}

/// A runtime-tagged value. Unlike the original's `(enum, union)` pair, every
/// value already carries its own type via the variant, so conversions are
/// exhaustive match arms rather than unchecked unions (spec §9 design note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Char(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Time(f64),
    String(Vec<u8>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Char(_) => ValueType::Char,
            Self::Short(_) => ValueType::Short,
            Self::Int(_) => ValueType::Int,
            Self::Long(_) => ValueType::Long,
            Self::Float(_) => ValueType::Float,
            Self::Double(_) => ValueType::Double,
            Self::Time(_) => ValueType::Time,
            Self::String(_) => ValueType::String,
        }
    }

    /// The type-specific missing sentinel (spec §3 "Missing values").
    pub fn missing(t: ValueType) -> Self {
        match t {
            ValueType::Char => Self::Char(i8::MIN),
            ValueType::Short => Self::Short(i16::MIN),
            ValueType::Int => Self::Int(i32::MIN),
            ValueType::Long => Self::Long(i64::MIN),
            ValueType::Float => Self::Float(f32::NAN),
            ValueType::Double => Self::Double(f64::NAN),
            ValueType::Time => Self::Time(MISSING_TIME),
            ValueType::String => Self::String(Vec::new()),
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Self::Char(v) => *v == i8::MIN,
            Self::Short(v) => *v == i16::MIN,
            Self::Int(v) => *v == i32::MIN,
            Self::Long(v) => *v == i64::MIN,
            Self::Float(v) => v.is_nan(),
            Self::Double(v) => v.is_nan(),
            Self::Time(v) => v.is_nan() || *v == MISSING_TIME,
            Self::String(s) => s.is_empty(),
        }
    }

    /// Widens any non-string numeric value to `f64`, for use as a bridge
    /// during conversion. Panics if called on a `String`; callers must
    /// handle strings separately (they convert via parse/format, not cast).
    fn as_f64_raw(&self) -> f64 {
        match self {
            Self::Char(v) => *v as f64,
            Self::Short(v) => *v as f64,
            Self::Int(v) => *v as f64,
            Self::Long(v) => *v as f64,
            Self::Float(v) => *v as f64,
            Self::Double(v) => *v,
            Self::Time(v) => *v,
            Self::String(_) => unreachable!("string values convert via parse, not cast"),
        }
    }

    fn as_i64_bits(&self) -> Option<i64> {
        match self {
            Self::Char(v) => Some(*v as i64),
            Self::Short(v) => Some(*v as i64),
            Self::Int(v) => Some(*v as i64),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::String(s) => s,
            _ => &[],
        }
    }
}

fn saturate_i64(f: f64, lo: i64, hi: i64) -> i64 {
    if f.is_nan() {
        0
    } else if f <= lo as f64 {
        lo
    } else if f >= hi as f64 {
        hi
    } else {
        f as i64
    }
}

fn int_from_f64(dst: ValueType, f: f64) -> Value {
    match dst {
        ValueType::Char => Value::Char(saturate_i64(f, i8::MIN as i64, i8::MAX as i64) as i8),
        ValueType::Short => Value::Short(saturate_i64(f, i16::MIN as i64, i16::MAX as i64) as i16),
        ValueType::Int => Value::Int(saturate_i64(f, i32::MIN as i64, i32::MAX as i64) as i32),
        ValueType::Long => Value::Long(saturate_i64(f, i64::MIN, i64::MAX)),
        _ => unreachable!(),
    }
}

/// `convert(src_type, src, dst_type) -> dst`. Always succeeds: NaN/MIN
/// propagates to the destination's missing sentinel, narrowing saturates at
/// destination bounds, and strings parse with the destination type's
/// recognized grammar (spec §4.1, testable property 7).
pub fn convert(dst: ValueType, src: &Value) -> Value {
    if src.is_missing() {
        return Value::missing(dst);
    }

    match (src, dst) {
        (Value::String(s), ValueType::String) => Value::String(s.clone()),
        (Value::String(s), _) => {
            let text = String::from_utf8_lossy(s);
            sscanf_value(dst, &text).unwrap_or_else(|_| Value::missing(dst))
        }
        (_, ValueType::String) => Value::String(default_print(src).into_bytes()),
        (_, ValueType::Time) => Value::Time(src.as_f64_raw()),
        (_, ValueType::Float) => Value::Float(src.as_f64_raw() as f32),
        (_, ValueType::Double) => Value::Double(src.as_f64_raw()),
        (_, dst) if dst.is_integer() => int_from_f64(dst, src.as_f64_raw()),
        _ => unreachable!(),
    }
}

fn default_print(v: &Value) -> String {
    match v {
        Value::Char(n) => n.to_string(),
        Value::Short(n) => n.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Long(n) => n.to_string(),
        Value::Float(n) => format!("{n}"),
        Value::Double(n) => format!("{n}"),
        Value::Time(t) => time::format_time(*t, 0, time::Zone::Utc),
        Value::String(s) => String::from_utf8_lossy(s).into_owned(),
    }
}

/// `equal(type, a, b)`: bit-exact for ints, IEEE-equal for floats/time with
/// the one deliberate asymmetry that two missing (NaN) values compare
/// equal, byte-equal for strings (spec §4.1, testable property 8's sibling).
pub fn equal(t: ValueType, a: &Value, b: &Value) -> bool {
    match t {
        ValueType::String => a.as_bytes() == b.as_bytes(),
        ValueType::Float | ValueType::Double | ValueType::Time => {
            let (fa, fb) = (a.as_f64_raw(), b.as_f64_raw());
            if a.is_missing() && b.is_missing() {
                true
            } else {
                fa == fb
            }
        }
        _ => a.as_i64_bits() == b.as_i64_bits(),
    }
}

/// One printf-style conversion specifier, validated against the restricted
/// grammar in spec §4.1: exactly one specifier, no unsigned/pointer/Unicode
/// conversions, no bare `l` length modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    pub flags: String,
    pub width: Option<usize>,
    pub precision: Option<usize>,
    pub length: Length,
    pub conv: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    None,
    H,
    HH,
    LL,
}

const ALLOWED_FLAGS: &str = "-+ 0#";
const ALLOWED_CONVS: &str = "dif esEgGs";

/// Parses and validates a non-time format string. A time-type format is a
/// different, much simpler grammar handled by [`parse_time_precision`].
pub fn parse_format(spec: &str) -> Result<FormatSpec> {
    let bytes = spec.as_bytes();
    let pct = spec
        .find('%')
        .ok_or_else(|| DrmsError::InvalidData(format!("format '{spec}' has no conversion")))?;
    if spec[pct + 1..].find('%').is_some() {
        return Err(DrmsError::InvalidData(format!(
            "format '{spec}' has more than one conversion"
        )));
    }

    let mut i = pct + 1;
    let mut flags = String::new();
    while i < bytes.len() && ALLOWED_FLAGS.contains(bytes[i] as char) {
        flags.push(bytes[i] as char);
        i += 1;
    }

    let start_width = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let width = if i > start_width {
        Some(spec[start_width..i].parse().unwrap())
    } else {
        None
    };

    let mut precision = None;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        precision = Some(spec[start..i].parse().unwrap_or(0));
    }

    let length = if spec[i..].starts_with("ll") {
        i += 2;
        Length::LL
    } else if spec[i..].starts_with("hh") {
        i += 2;
        Length::HH
    } else if spec[i..].starts_with('h') {
        i += 1;
        Length::H
    } else if spec[i..].starts_with('l') {
        return Err(DrmsError::InvalidData(
            "bare 'l' length modifier is platform-ambiguous and not allowed".into(),
        ));
    } else {
        Length::None
    };

    let conv = spec[i..]
        .chars()
        .next()
        .ok_or_else(|| DrmsError::InvalidData(format!("format '{spec}' is missing a conversion character")))?;
    if "uxXop".contains(conv) {
        return Err(DrmsError::InvalidData(format!(
            "conversion '{conv}' is unsigned/pointer and not allowed"
        )));
    }
    if !ALLOWED_CONVS.contains(conv) {
        return Err(DrmsError::InvalidData(format!(
            "conversion '{conv}' is not recognized"
        )));
    }

    Ok(FormatSpec {
        flags,
        width,
        precision,
        length,
        conv,
    })
}

/// Validates that a format string's conversion is compatible with a
/// declared keyword type. Mismatches are a parse-time warning, not a
/// runtime error (spec §4.1/§7), so callers decide how to surface `Err`.
pub fn validate_format_for_type(t: ValueType, spec: &FormatSpec) -> Result<()> {
    let ok = match t {
        ValueType::String => spec.conv == 's',
        ValueType::Time => false, // Time formats use parse_time_precision, not this grammar.
        _ if t.is_integer() => "di".contains(spec.conv),
        ValueType::Float | ValueType::Double => "feEgG".contains(spec.conv),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(DrmsError::InvalidData(format!(
            "format conversion '{}' is incompatible with type {t}",
            spec.conv
        )))
    }
}

/// Parses a time-type format: a signed single digit giving seconds-field
/// precision, -9..=9 (spec §4.1).
pub fn parse_time_precision(spec: &str) -> Result<i32> {
    let spec = spec.trim();
    let n: i32 = spec
        .parse()
        .map_err(|_| DrmsError::InvalidData(format!("invalid time format '{spec}'")))?;
    if !(-9..=9).contains(&n) {
        return Err(DrmsError::InvalidData(format!(
            "time format precision {n} out of range -9..=9"
        )));
    }
    Ok(n)
}

fn apply_width(s: String, spec: &FormatSpec) -> String {
    let Some(width) = spec.width else {
        return s;
    };
    if s.len() >= width {
        return s;
    }
    let pad = width - s.len();
    if spec.flags.contains('-') {
        format!("{s}{}", " ".repeat(pad))
    } else if spec.flags.contains('0') && !matches!(spec.conv, 's') {
        let (sign, rest) = if s.starts_with('-') || s.starts_with('+') {
            (&s[..1], &s[1..])
        } else {
            ("", s.as_str())
        };
        format!("{sign}{}{rest}", "0".repeat(pad))
    } else {
        format!("{}{s}", " ".repeat(pad))
    }
}

fn apply_sign(magnitude: String, negative: bool, spec: &FormatSpec) -> String {
    if negative {
        format!("-{magnitude}")
    } else if spec.flags.contains('+') {
        format!("+{magnitude}")
    } else if spec.flags.contains(' ') {
        format!(" {magnitude}")
    } else {
        magnitude
    }
}

/// `sprintf_value(type, value, format) -> string`. `format` must already
/// have passed [`parse_format`]/[`validate_format_for_type`] (or
/// [`parse_time_precision`] for `Time`).
pub fn sprintf_value(t: ValueType, value: &Value, format: &str) -> Result<String> {
    if t == ValueType::Time {
        let precision = parse_time_precision(format)?;
        let Value::Time(secs) = value else {
            return Err(DrmsError::InvalidData("value is not a Time".into()));
        };
        return Ok(time::format_time(*secs, precision, time::Zone::Utc));
    }

    let spec = parse_format(format)?;
    validate_format_for_type(t, &spec)?;

    let rendered = match (value, spec.conv) {
        (_, 's') => {
            let Value::String(bytes) = value else {
                return Err(DrmsError::InvalidData("value is not a String".into()));
            };
            let mut text = String::from_utf8_lossy(bytes).into_owned();
            if let Some(prec) = spec.precision {
                text.truncate(prec);
            }
            text
        }
        (_, 'd') | (_, 'i') => {
            let n = value
                .as_i64_bits()
                .ok_or_else(|| DrmsError::InvalidData("value is not an integer".into()))?;
            apply_sign(n.unsigned_abs().to_string(), n < 0, &spec)
        }
        (_, conv) if "feEgG".contains(conv) => {
            let f = value.as_f64_raw();
            let prec = spec.precision.unwrap_or(6);
            let body = match conv {
                'f' => format!("{:.*}", prec, f.abs()),
                'e' => format!("{:.*e}", prec, f.abs()),
                'E' => format!("{:.*E}", prec, f.abs()),
                _ => format!("{}", f.abs()),
            };
            apply_sign(body, f < 0.0, &spec)
        }
        _ => unreachable!(),
    };

    Ok(apply_width(rendered, &spec))
}

/// `sscanf_value(type, string) -> value`. For strings, a leading quote
/// (`'` or `"`) causes the matching trailing quote to be stripped and the
/// interior preserved verbatim, embedded delimiters included; unquoted
/// strings are taken as-is. For times, delegates to the time parser.
pub fn sscanf_value(t: ValueType, s: &str) -> Result<Value> {
    let s = s.trim();
    match t {
        ValueType::Char => Ok(Value::Char(
            s.parse::<i64>()
                .map(|n| saturate_i64(n as f64, i8::MIN as i64, i8::MAX as i64) as i8)
                .unwrap_or(i8::MIN),
        )),
        ValueType::Short => Ok(Value::Short(
            s.parse::<i64>()
                .map(|n| saturate_i64(n as f64, i16::MIN as i64, i16::MAX as i64) as i16)
                .unwrap_or(i16::MIN),
        )),
        ValueType::Int => Ok(Value::Int(
            s.parse::<i64>()
                .map(|n| saturate_i64(n as f64, i32::MIN as i64, i32::MAX as i64) as i32)
                .unwrap_or(i32::MIN),
        )),
        ValueType::Long => Ok(Value::Long(s.parse::<i64>().unwrap_or(i64::MIN))),
        ValueType::Float => Ok(Value::Float(s.parse::<f32>().unwrap_or(f32::NAN))),
        ValueType::Double => Ok(Value::Double(s.parse::<f64>().unwrap_or(f64::NAN))),
        ValueType::Time => Ok(Value::Time(time::parse_time(s)?)),
        ValueType::String => Ok(Value::String(unquote(s).into_bytes())),
    }
}

fn unquote(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_propagates_on_convert() {
        let missing_int = Value::missing(ValueType::Int);
        let as_double = convert(ValueType::Double, &missing_int);
        assert!(as_double.is_missing());
    }

    #[test]
    fn narrowing_saturates() {
        let big = Value::Long(1_000_000);
        let as_char = convert(ValueType::Char, &big);
        assert_eq!(as_char, Value::Char(i8::MAX));
    }

    #[test]
    fn roundtrip_widening_then_narrowing() {
        // short -> int -> short is lossless for in-range values (property 7).
        let v = Value::Short(-1234);
        let widened = convert(ValueType::Int, &v);
        let back = convert(ValueType::Short, &widened);
        assert_eq!(back, v);
    }

    #[test]
    fn nan_equals_nan_as_missing() {
        let a = Value::Double(f64::NAN);
        let b = Value::Double(f64::NAN);
        assert!(equal(ValueType::Double, &a, &b));
    }

    #[test]
    fn format_rejects_unsigned_conversion() {
        assert!(parse_format("%u").is_err());
    }

    #[test]
    fn format_rejects_bare_l() {
        assert!(parse_format("%ld").is_err());
    }

    #[test]
    fn format_allows_ll() {
        assert!(parse_format("%lld").is_ok());
    }

    #[test]
    fn sprintf_int_with_width() {
        let v = Value::Int(42);
        let s = sprintf_value(ValueType::Int, &v, "%5d").unwrap();
        assert_eq!(s, "   42");
    }

    #[test]
    fn quoted_string_preserves_embedded_delimiters() {
        let v = sscanf_value(ValueType::String, "\"a, b\"").unwrap();
        assert_eq!(v.as_bytes(), b"a, b");
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Time(a), Self::Time(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}
