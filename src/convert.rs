//! Stateless coercion between dynamically typed values and semantic types.
//!
//! Config values are usually small, human-authored numbers, so the numeric
//! matrix is deliberately permissive: any numeric input converts to any
//! numeric target by widening or two's-complement truncation, and no overflow
//! error is ever raised. The only hard numeric failure is a negative input
//! for an unsigned target. Strings parse with base-10 grammar; booleans
//! accept a fixed alias table; durations accept the humantime grammar.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::value::Value;

/// Convert a value to a signed 64-bit integer.
///
/// # Errors
///
/// Fails for null, unparsable strings, and non-numeric variants.
pub fn to_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Int(n) => Ok(*n),
        Value::Uint(n) => Ok(*n as i64),
        Value::Float(f) => Ok(*f as i64),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|err| Error::conversion("integer", format!("cannot parse {s:?}: {err}"))),
        other => Err(cannot_convert("integer", other)),
    }
}

/// Convert a value to an unsigned 64-bit integer.
///
/// # Errors
///
/// Fails for negative inputs, null, unparsable strings, and non-numeric
/// variants.
pub fn to_u64(value: &Value) -> Result<u64> {
    match value {
        Value::Bool(b) => Ok(u64::from(*b)),
        Value::Int(n) => {
            if *n < 0 {
                Err(Error::conversion(
                    "unsigned integer",
                    format!("cannot convert negative value {n}"),
                ))
            } else {
                Ok(*n as u64)
            }
        }
        Value::Uint(n) => Ok(*n),
        Value::Float(f) => {
            if *f < 0.0 {
                Err(Error::conversion(
                    "unsigned integer",
                    format!("cannot convert negative value {f}"),
                ))
            } else {
                Ok(*f as u64)
            }
        }
        Value::String(s) => s.parse::<u64>().map_err(|err| {
            Error::conversion("unsigned integer", format!("cannot parse {s:?}: {err}"))
        }),
        other => Err(cannot_convert("unsigned integer", other)),
    }
}

/// Convert a value to a 64-bit float.
///
/// # Errors
///
/// Fails for null, unparsable strings, and non-numeric variants.
pub fn to_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Int(n) => Ok(*n as f64),
        Value::Uint(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|err| Error::conversion("float", format!("cannot parse {s:?}: {err}"))),
        other => Err(cannot_convert("float", other)),
    }
}

/// Convert a value to a boolean.
///
/// Numbers are truthy when nonzero. Strings try the strict forms
/// (`true`/`t`/`1`, `false`/`f`/`0`) first and then a fixed alias table:
/// `yes`/`y`/`on` are true; `no`/`n`/`off` and the empty string are false.
/// Note the empty string is parseable falsity here, while
/// [`crate::Config::is_set`] treats it as absent; the two are distinct
/// properties and deliberately not unified.
///
/// # Errors
///
/// Fails for null, unrecognized strings, and composite variants.
pub fn to_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(n) => Ok(*n != 0),
        Value::Uint(n) => Ok(*n != 0),
        Value::Float(f) => Ok(*f != 0.0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "f" | "0" | "no" | "n" | "off" | "" => Ok(false),
            _ => Err(Error::conversion(
                "bool",
                format!("cannot parse {s:?} as a boolean"),
            )),
        },
        other => Err(cannot_convert("bool", other)),
    }
}

/// Convert a value to a duration.
///
/// Integers are whole seconds, floats are fractional seconds, and strings
/// use the humantime grammar ("2m", "45s", "1h30m"). Negative counts fail:
/// `std::time::Duration` cannot represent them.
///
/// # Errors
///
/// Fails for null, negative counts, unparsable strings, and composite
/// variants.
pub fn to_duration(value: &Value) -> Result<Duration> {
    match value {
        Value::Duration(d) => Ok(*d),
        Value::Int(n) => u64::try_from(*n).map(Duration::from_secs).map_err(|_| {
            Error::conversion("duration", format!("cannot convert negative value {n}"))
        }),
        Value::Uint(n) => Ok(Duration::from_secs(*n)),
        Value::Float(f) => Duration::try_from_secs_f64(*f).map_err(|err| {
            Error::conversion("duration", format!("invalid second count {f}: {err}"))
        }),
        Value::String(s) => humantime::parse_duration(s)
            .map_err(|err| Error::conversion("duration", format!("cannot parse {s:?}: {err}"))),
        other => Err(cannot_convert("duration", other)),
    }
}

/// Convert a value to a point in time.
///
/// Strings accept RFC 3339, the weak form with a space separator, and bare
/// dates (midnight UTC). Integers and floats are UNIX seconds.
///
/// # Errors
///
/// Fails for null, unparsable strings, out-of-range seconds, and composite
/// variants.
pub fn to_timestamp(value: &Value) -> Result<SystemTime> {
    match value {
        Value::Timestamp(t) => Ok(*t),
        Value::String(s) => parse_timestamp(s),
        Value::Int(n) => {
            if *n >= 0 {
                Ok(UNIX_EPOCH + Duration::from_secs(*n as u64))
            } else {
                UNIX_EPOCH
                    .checked_sub(Duration::from_secs(n.unsigned_abs()))
                    .ok_or_else(|| {
                        Error::conversion("timestamp", format!("seconds out of range: {n}"))
                    })
            }
        }
        Value::Uint(n) => Ok(UNIX_EPOCH + Duration::from_secs(*n)),
        Value::Float(f) => {
            let magnitude = Duration::try_from_secs_f64(f.abs()).map_err(|err| {
                Error::conversion("timestamp", format!("invalid second count {f}: {err}"))
            })?;
            if *f >= 0.0 {
                Ok(UNIX_EPOCH + magnitude)
            } else {
                UNIX_EPOCH.checked_sub(magnitude).ok_or_else(|| {
                    Error::conversion("timestamp", format!("seconds out of range: {f}"))
                })
            }
        }
        other => Err(cannot_convert("timestamp", other)),
    }
}

fn parse_timestamp(s: &str) -> Result<SystemTime> {
    if let Ok(t) = humantime::parse_rfc3339(s) {
        return Ok(t);
    }
    if let Ok(t) = humantime::parse_rfc3339_weak(s) {
        return Ok(t);
    }
    // Bare dates resolve to midnight UTC.
    if let Ok(t) = humantime::parse_rfc3339_weak(&format!("{s} 00:00:00")) {
        return Ok(t);
    }
    Err(Error::conversion(
        "timestamp",
        format!("cannot parse {s:?} as a timestamp"),
    ))
}

/// Render any value as a string. Never fails: null is the empty string,
/// numbers use their decimal form, durations and timestamps use the
/// humantime forms, and composites fall back to their JSON rendering.
#[must_use]
pub fn to_string_lossy(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Uint(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::Duration(d) => humantime::format_duration(*d).to_string(),
        Value::Timestamp(t) => humantime::format_rfc3339(*t).to_string(),
        composite @ (Value::Array(_) | Value::Table(_)) => {
            serde_json::to_string(composite).unwrap_or_default()
        }
    }
}

/// Size-unit suffix table. Two-letter units precede one-letter units so the
/// longest suffix wins ("10MB" must not match "B").
const SIZE_UNITS: &[(&str, u64)] = &[
    ("KB", 1 << 10),
    ("MB", 1 << 20),
    ("GB", 1 << 30),
    ("TB", 1 << 40),
    ("PB", 1 << 50),
    ("B", 1),
    ("K", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
];

/// Convert a value to a size in bytes.
///
/// Non-negative numerics pass through as bytes. Strings are trimmed,
/// upper-cased, and matched against the binary units `B,KB,MB,GB,TB,PB`
/// (1024ⁿ) and the decimal units `K,M,G,T,P` (1000ⁿ); the numeric prefix may
/// be fractional ("1.5GB"); without a suffix the whole string parses as a
/// plain unsigned integer.
///
/// # Errors
///
/// Fails for negative numbers, null, empty or unparsable strings, and
/// composite variants.
pub fn to_size_in_bytes(value: &Value) -> Result<u64> {
    match value {
        Value::Uint(n) => Ok(*n),
        Value::Int(n) => u64::try_from(*n)
            .map_err(|_| Error::conversion("size in bytes", format!("size cannot be negative: {n}"))),
        Value::Float(f) => {
            if *f < 0.0 {
                Err(Error::conversion(
                    "size in bytes",
                    format!("size cannot be negative: {f}"),
                ))
            } else {
                Ok(*f as u64)
            }
        }
        Value::String(s) => parse_size(s),
        other => Err(cannot_convert("size in bytes", other)),
    }
}

fn parse_size(raw: &str) -> Result<u64> {
    let s = raw.trim().to_ascii_uppercase();
    if s.is_empty() {
        return Err(Error::conversion("size in bytes", "empty size string"));
    }
    for (unit, multiplier) in SIZE_UNITS {
        if let Some(prefix) = s.strip_suffix(unit) {
            let number = prefix.trim().parse::<f64>().map_err(|err| {
                Error::conversion("size in bytes", format!("invalid size format {raw:?}: {err}"))
            })?;
            if number < 0.0 {
                return Err(Error::conversion(
                    "size in bytes",
                    format!("size cannot be negative: {raw:?}"),
                ));
            }
            return Ok((number * (*multiplier as f64)) as u64);
        }
    }
    s.parse::<u64>().map_err(|err| {
        Error::conversion("size in bytes", format!("invalid size format {raw:?}: {err}"))
    })
}

/// Split a comma-separated scalar into trimmed parts.
///
/// The converter itself never comma-splits; callers that want CSV semantics
/// (typically for environment-sourced strings) opt in through this helper.
#[must_use]
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',').map(|part| part.trim().to_owned()).collect()
}

/// Conversion from a [`Value`] into a concrete semantic type.
///
/// Implemented for every integer width (narrowing wraps, never errors), the
/// float widths, `bool`, `String`, `Duration`, `SystemTime`, and the common
/// slice forms. This is the trait behind [`crate::Config::get_as`].
pub trait FromValue: Sized {
    /// Attempt the coercion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conversion`] when the value cannot represent the
    /// target type.
    fn from_value(value: &Value) -> Result<Self>;
}

macro_rules! from_value_signed {
    ($($ty:ty),*) => {$(
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                to_i64(value).map(|n| n as $ty)
            }
        }
    )*};
}

macro_rules! from_value_unsigned {
    ($($ty:ty),*) => {$(
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                to_u64(value).map(|n| n as $ty)
            }
        }
    )*};
}

from_value_signed!(i8, i16, i32, i64, isize);
from_value_unsigned!(u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        to_f64(value)
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        to_f64(value).map(|f| f as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        to_bool(value)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(to_string_lossy(value))
    }
}

impl FromValue for Duration {
    fn from_value(value: &Value) -> Result<Self> {
        to_duration(value)
    }
}

impl FromValue for SystemTime {
    fn from_value(value: &Value) -> Result<Self> {
        to_timestamp(value)
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for Vec<String> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(items.iter().map(to_string_lossy).collect()),
            // A lone scalar string promotes to a one-element slice.
            Value::String(s) => Ok(vec![s.clone()]),
            other => Err(cannot_convert("string slice", other)),
        }
    }
}

macro_rules! from_value_slice {
    ($($elem:ty => $target:literal),*) => {$(
        impl FromValue for Vec<$elem> {
            fn from_value(value: &Value) -> Result<Self> {
                let Value::Array(items) = value else {
                    return Err(cannot_convert($target, value));
                };
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        <$elem>::from_value(item).map_err(|err| {
                            Error::conversion($target, format!("cannot convert element {i}: {err}"))
                        })
                    })
                    .collect()
            }
        }
    )*};
}

from_value_slice!(
    i64 => "integer slice",
    u64 => "unsigned integer slice",
    f64 => "float slice",
    bool => "bool slice"
);

fn cannot_convert(target: &'static str, value: &Value) -> Error {
    Error::conversion(target, format!("cannot convert {}", value.type_name()))
}

/// Serde adapter for humantime-formatted duration fields.
///
/// ```
/// use std::time::Duration;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Timeouts {
///     #[serde(with = "confmap::convert::human_duration")]
///     connect: Duration,
/// }
///
/// let t: Timeouts = serde_json::from_str(r#"{"connect": "1h30m"}"#).unwrap();
/// assert_eq!(t.connect, Duration::from_secs(5400));
/// ```
pub mod human_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Serialize a duration in the humantime form ("1h 30m").
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserialize a duration from the humantime grammar.
    ///
    /// # Errors
    ///
    /// Fails when the string does not parse as a duration.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Int(42), 42)]
    #[case(Value::Uint(42), 42)]
    #[case(Value::Float(42.9), 42)]
    #[case(Value::Bool(true), 1)]
    #[case(Value::Bool(false), 0)]
    #[case(Value::from("123"), 123)]
    #[case(Value::from("-7"), -7)]
    fn converts_to_i64(#[case] input: Value, #[case] expected: i64) {
        assert_eq!(to_i64(&input).unwrap(), expected);
    }

    #[test]
    fn narrowing_wraps_instead_of_erroring() {
        // 1000 does not fit in 8 bits; the documented rule is
        // two's-complement truncation, not an overflow error.
        assert_eq!(i8::from_value(&Value::Int(1000)).unwrap(), -24);
        assert_eq!(u8::from_value(&Value::Uint(300)).unwrap(), 44);
        assert_eq!(i16::from_value(&Value::Int(1000)).unwrap(), 1000);
    }

    #[rstest]
    #[case(Value::Int(-1))]
    #[case(Value::Float(-0.5))]
    #[case(Value::from("-3"))]
    fn negative_to_unsigned_fails(#[case] input: Value) {
        assert!(matches!(
            to_u64(&input),
            Err(crate::Error::Conversion { .. })
        ));
    }

    #[rstest]
    #[case(Value::Null)]
    #[case(Value::from("not a number"))]
    #[case(Value::Array(vec![]))]
    fn unconvertible_to_i64_fails(#[case] input: Value) {
        assert!(to_i64(&input).is_err());
    }

    #[rstest]
    #[case("true", true)]
    #[case("TRUE", true)]
    #[case("1", true)]
    #[case("yes", true)]
    #[case("y", true)]
    #[case("on", true)]
    #[case("false", false)]
    #[case("0", false)]
    #[case("no", false)]
    #[case("n", false)]
    #[case("off", false)]
    #[case("", false)]
    fn bool_alias_table(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(to_bool(&Value::from(input)).unwrap(), expected);
    }

    #[test]
    fn bool_rejects_unknown_strings_and_accepts_numbers() {
        assert!(to_bool(&Value::from("maybe")).is_err());
        assert!(to_bool(&Value::Int(2)).unwrap());
        assert!(!to_bool(&Value::Uint(0)).unwrap());
        assert!(to_bool(&Value::Float(0.1)).unwrap());
    }

    #[rstest]
    #[case(Value::from("2m"), Duration::from_secs(120))]
    #[case(Value::from("45s"), Duration::from_secs(45))]
    #[case(Value::from("1h30m"), Duration::from_secs(5400))]
    #[case(Value::Int(30), Duration::from_secs(30))]
    #[case(Value::Uint(5), Duration::from_secs(5))]
    #[case(Value::Float(1.5), Duration::from_millis(1500))]
    #[case(Value::Duration(Duration::from_secs(7)), Duration::from_secs(7))]
    fn duration_conversions(#[case] input: Value, #[case] expected: Duration) {
        assert_eq!(to_duration(&input).unwrap(), expected);
    }

    #[test]
    fn negative_durations_fail() {
        assert!(to_duration(&Value::Int(-1)).is_err());
        assert!(to_duration(&Value::Float(-0.1)).is_err());
    }

    #[rstest]
    #[case(Value::from("10KB"), 10_240)]
    #[case(Value::from("1K"), 1_000)]
    #[case(Value::from("1.5GB"), 1_610_612_736)]
    #[case(Value::from("2MB"), 2_097_152)]
    #[case(Value::from("1M"), 1_000_000)]
    #[case(Value::from("512B"), 512)]
    #[case(Value::from("1024"), 1_024)]
    #[case(Value::from(" 10 KB "), 10_240)]
    #[case(Value::from("10kb"), 10_240)]
    #[case(Value::Uint(4_096), 4_096)]
    #[case(Value::Int(100), 100)]
    fn size_in_bytes(#[case] input: Value, #[case] expected: u64) {
        assert_eq!(to_size_in_bytes(&input).unwrap(), expected);
    }

    #[rstest]
    #[case(Value::from(""))]
    #[case(Value::from("garbage"))]
    #[case(Value::from("-5KB"))]
    #[case(Value::Int(-1))]
    #[case(Value::Null)]
    fn invalid_sizes_fail(#[case] input: Value) {
        assert!(to_size_in_bytes(&input).is_err());
    }

    #[test]
    fn string_rendering_never_fails() {
        assert_eq!(to_string_lossy(&Value::Null), "");
        assert_eq!(to_string_lossy(&Value::Int(-3)), "-3");
        assert_eq!(to_string_lossy(&Value::Bool(true)), "true");
        assert_eq!(
            to_string_lossy(&Value::Duration(Duration::from_secs(5))),
            "5s"
        );
        assert_eq!(
            to_string_lossy(&Value::Array(vec![Value::Int(1), Value::Int(2)])),
            "[1,2]"
        );
    }

    #[test]
    fn timestamp_parsing_accepts_common_forms() {
        let rfc = to_timestamp(&Value::from("2024-05-01T12:30:45Z")).unwrap();
        let weak = to_timestamp(&Value::from("2024-05-01 12:30:45")).unwrap();
        assert_eq!(rfc, weak);
        let date_only = to_timestamp(&Value::from("2024-05-01")).unwrap();
        assert!(date_only < rfc);
        let epoch = to_timestamp(&Value::Int(0)).unwrap();
        assert_eq!(epoch, UNIX_EPOCH);
        assert!(to_timestamp(&Value::from("not a time")).is_err());
    }

    #[test]
    fn string_slices_promote_scalars() {
        let items = Vec::<String>::from_value(&Value::from("solo")).unwrap();
        assert_eq!(items, vec!["solo".to_owned()]);
        let mixed = Vec::<String>::from_value(&Value::Array(vec![
            Value::from("a"),
            Value::Int(2),
            Value::Bool(true),
        ]))
        .unwrap();
        assert_eq!(mixed, vec!["a".to_owned(), "2".to_owned(), "true".to_owned()]);
    }

    #[test]
    fn typed_slices_fail_on_any_bad_element() {
        let ok = Vec::<i64>::from_value(&Value::Array(vec![
            Value::Int(1),
            Value::from("2"),
            Value::Bool(true),
        ]))
        .unwrap();
        assert_eq!(ok, vec![1, 2, 1]);
        let bad = Vec::<i64>::from_value(&Value::Array(vec![Value::Int(1), Value::from("x")]));
        assert!(bad.is_err());
        // Scalar promotion is string-slice only.
        assert!(Vec::<i64>::from_value(&Value::from("5")).is_err());
    }

    #[test]
    fn csv_helper_trims_parts() {
        assert_eq!(
            split_csv("a, b ,c"),
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]
        );
    }
}
