//! Validation combinators.
//!
//! # Responsibilities
//! - Pure predicates over JSON-shaped request input (`serde_json::Value`)
//! - Exact-match pattern validators compiled once per process
//! - The async `parameters` guard that turns failures into typed errors
//!
//! # Design Decisions
//! - Predicates never allocate on the happy path and never suspend
//! - Malformed combinator configuration (zero bit width, inverted bounds)
//!   panics: that is a bug in validation wiring, not a validation failure
//! - Zero latitude/longitude is "unset", not the equator or prime meridian,
//!   and is rejected on purpose

pub mod guard;
pub mod password;

pub use guard::{errors_to_string, parameters, Findings};
pub use password::{
    evaluate_complexity, password, password_rules, ComplexityEvaluation, CriterionOutcome,
    PasswordOutcome, PasswordRequirements,
};

use chrono::{DateTime, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());
static FLOAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d*(?:\.(?:\d+)?)?$").unwrap());
static BOOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:t|f|true|false|0|1)$").unwrap());
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .unwrap()
});
static HEX_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#([A-Fa-f0-9]{6}|[A-Fa-f0-9]{3})$").unwrap());
static OBJECT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").unwrap());
static IP: Lazy<Regex> = Lazy::new(|| {
    let octet = "(25[0-5]|2[0-4][0-9]|[01]?[0-9]?[0-9])";
    Regex::new(&format!(r"^{octet}\.{octet}\.{octet}\.{octet}$")).unwrap()
});
static HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9])\.)*([A-Za-z0-9]|[A-Za-z0-9][A-Za-z0-9\-]*[A-Za-z0-9])$",
    )
    .unwrap()
});

/// The value as an integer, accepting whole numbers and digit-only strings.
fn as_integer(val: &Value) -> Option<i128> {
    match val {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i128::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(i128::from(u))
            } else {
                let f = n.as_f64()?;
                (f.is_finite() && f.fract() == 0.0).then_some(f as i128)
            }
        }
        Value::String(s) => {
            if INT.is_match(s) {
                s.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Integer reading with truncation: fractional numbers drop their fraction,
/// strings must be whole integers. Used by the geo validators.
fn as_truncated_integer(val: &Value) -> Option<i128> {
    match val {
        Value::Number(n) => {
            let f = n.as_f64()?;
            f.is_finite().then_some(f.trunc() as i128)
        }
        Value::String(s) => {
            if INT.is_match(s) {
                s.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

fn as_float(val: &Value) -> Option<f64> {
    match val {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Whether `val` is or can be converted to a boolean: a boolean literal,
/// a 0/1 number, or a `t|f|true|false|0|1` string (case-insensitive).
pub fn boolean(val: &Value) -> bool {
    match val {
        Value::Bool(_) => true,
        Value::String(s) => BOOL.is_match(s),
        Value::Number(_) => int_in_range(val, 0, 1),
        _ => false,
    }
}

/// Whether `val` is a string matching `pattern`.
pub fn custom_pattern(val: &Value, pattern: &Regex) -> bool {
    val.as_str().is_some_and(|s| pattern.is_match(s))
}

/// Whether `val` is a valid email address.
pub fn email(val: &Value) -> bool {
    custom_pattern(val, &EMAIL)
}

/// Whether `val` is or can be converted to a finite floating-point number.
pub fn float(val: &Value) -> bool {
    match val {
        Value::Number(n) => n.as_f64().is_some_and(f64::is_finite),
        Value::String(s) => FLOAT.is_match(s) && s.parse::<f64>().is_ok_and(f64::is_finite),
        _ => false,
    }
}

/// Whether `val` is a valid compass heading, 0 through 360 inclusive.
pub fn heading(val: &Value) -> bool {
    matches!(as_truncated_integer(val), Some(h) if (0..=360).contains(&h))
}

/// Whether `val` is a hexadecimal RGB color, `#` plus 3 or 6 hex digits.
pub fn hex_color(val: &Value) -> bool {
    custom_pattern(val, &HEX_COLOR)
}

/// Whether `val` is a valid hostname.
///
/// An IP address qualifies; the label pattern cannot reject shapes such as
/// `333.333.33.333`, which are valid hostnames even though they look like
/// bad addresses.
pub fn host(val: &Value) -> bool {
    ip(val) || custom_pattern(val, &HOST)
}

pub fn int8(val: &Value) -> bool {
    int_in_bits_range(val, 8, true)
}

pub fn int16(val: &Value) -> bool {
    int_in_bits_range(val, 16, true)
}

pub fn int32(val: &Value) -> bool {
    int_in_bits_range(val, 32, true)
}

/// Alias for [`int32`].
pub fn int(val: &Value) -> bool {
    int32(val)
}

/// Whether `val` is an integer representable in `bits` bits.
///
/// The range is `[-2^(bits-1), 2^(bits-1) - 1]` when signed, `[0, 2^bits - 1]`
/// otherwise, boundaries inclusive. Panics unless `1 <= bits <= 64`.
pub fn int_in_bits_range(val: &Value, bits: u32, signed: bool) -> bool {
    assert!((1..=64).contains(&bits), "bits must be between 1 and 64");

    let (min, max) = if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };

    int_in_range(val, min, max)
}

/// Whether `val` is an integer inclusively contained in `[min, max]`.
/// Panics when `min > max`.
pub fn int_in_range(val: &Value, min: i128, max: i128) -> bool {
    assert!(min <= max, "min must be less than max");
    matches!(as_integer(val), Some(i) if i >= min && i <= max)
}

/// Whether `val` is a dotted-quad IPv4 address, each octet 0 through 255.
pub fn ip(val: &Value) -> bool {
    custom_pattern(val, &IP)
}

/// Whether `val` is null or an empty representation of its type.
pub fn is_null_or_empty(val: &Value) -> bool {
    match val {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

/// Whether `val` is a strictly formatted `YYYY-MM-DD` date. Strict means the
/// value round-trips losslessly through the format, so `2015-1-1` fails.
pub fn iso_date(val: &Value) -> bool {
    let Some(s) = val.as_str() else { return false };
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(date) => date.format("%Y-%m-%d").to_string() == s,
        Err(_) => false,
    }
}

/// Whether `val` is a strictly formatted `HH:mm:ss` time.
pub fn iso_time(val: &Value) -> bool {
    let Some(s) = val.as_str() else { return false };
    match NaiveTime::parse_from_str(s, "%H:%M:%S") {
        Ok(time) => time.format("%H:%M:%S").to_string() == s,
        Err(_) => false,
    }
}

/// Whether `val` is a string containing well-formed JSON.
pub fn json(val: &str) -> bool {
    serde_json::from_str::<Value>(val).is_ok()
}

/// Whether `points` is a valid latitude or a list of them: integer part in
/// `(-90, 90)` exclusive and not 0 (zero is "unset", not the equator).
pub fn lat(points: &Value) -> bool {
    each_point(points, |p| p != 0 && -90 < p && p < 90)
}

/// Whether `points` is a valid longitude or a list of them: integer part in
/// `(-180, 180)` exclusive, with the same zero-exclusion rule as [`lat`].
pub fn lon(points: &Value) -> bool {
    each_point(points, |p| p != 0 && -180 < p && p < 180)
}

fn each_point(points: &Value, accept: impl Fn(i128) -> bool) -> bool {
    let items = match points {
        Value::Array(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };
    items
        .iter()
        .all(|point| matches!(as_truncated_integer(point), Some(p) if accept(p)))
}

/// Whether `coord` is an object carrying a usable location: both `lat` and
/// `lon` present, each inside its open range, and not both exactly 0
/// (0/0 means "no location", not a point in the Gulf of Guinea).
pub fn coordinate(coord: &Value) -> bool {
    let (Some(lat_val), Some(lon_val)) = (coord.get("lat"), coord.get("lon")) else {
        return false;
    };
    if lat_val.is_null() || lon_val.is_null() {
        return false;
    }
    let (Some(lat), Some(lon)) = (
        as_truncated_integer(lat_val),
        as_truncated_integer(lon_val),
    ) else {
        return false;
    };

    if lat <= -90 || 90 <= lat {
        false
    } else if lon <= -180 || 180 <= lon {
        false
    } else {
        !(lat == 0 && lon == 0)
    }
}

/// Whether `val` is a valid database identifier: a 24-hex-character or
/// 12-raw-character object id, or a plain integer id.
pub fn db_identifier(val: &Value) -> bool {
    object_id(val) || int(val)
}

/// Whether `val` is a valid object id: 12 raw characters, 24 hex characters,
/// or an integral number.
pub fn object_id(val: &Value) -> bool {
    match val {
        Value::Number(_) => as_integer(val).is_some(),
        Value::String(s) => s.chars().count() == 12 || (s.len() == 24 && OBJECT_ID.is_match(s)),
        _ => false,
    }
}

/// Absent or null fields pass trivially; present values are handed to the
/// supplied predicate.
pub fn optional_field<F>(val: Option<&Value>, predicate: F) -> bool
where
    F: FnOnce(&Value) -> bool,
{
    match val {
        None | Some(Value::Null) => true,
        Some(v) => predicate(v),
    }
}

/// Whether `val` is a plain JSON object.
pub fn plain_object(val: &Value) -> bool {
    val.is_object()
}

/// Whether `val` is a valid port number.
pub fn port(val: &Value) -> bool {
    uint16(val)
}

/// Whether `timestamp` is a valid UNIX timestamp, in seconds or, when
/// `in_milli` is set, milliseconds. Validity means the integer part lands in
/// the representable calendar range.
pub fn timestamp(val: &Value, in_milli: bool) -> bool {
    if !float(val) {
        return false;
    }
    let Some(f) = as_float(val) else { return false };
    let whole = f.trunc();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return false;
    }
    let whole = whole as i64;
    if in_milli {
        DateTime::from_timestamp_millis(whole).is_some()
    } else {
        DateTime::from_timestamp(whole, 0).is_some()
    }
}

pub fn uint8(val: &Value) -> bool {
    int_in_bits_range(val, 8, false)
}

pub fn uint16(val: &Value) -> bool {
    int_in_bits_range(val, 16, false)
}

pub fn uint32(val: &Value) -> bool {
    int_in_bits_range(val, 32, false)
}

/// Alias for [`uint32`].
pub fn uint(val: &Value) -> bool {
    uint32(val)
}
