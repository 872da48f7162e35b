mod map;
mod string;

pub use map::AwkMap;
pub use string::AwkStr;

use std::borrow::Cow;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::interpreter::format::format_number;

/// Shared handle to an associative array. Arrays are passed to functions by
/// reference, so every variable holding one shares the same map.
pub type MapRef = Rc<RefCell<AwkMap>>;

/// Conversion format used when no CONVFMT is at hand
pub const DEFAULT_CONVFMT: &str = "%.6g";

/// AWK value type with dynamic typing and automatic coercion
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Uninitialized value - coerces to "" or 0 depending on context
    #[default]
    Uninitialized,
    /// Numeric value
    Number(f64),
    /// String value
    String(AwkStr),
    /// Numeric string - input that looks like a number
    /// (used for comparison semantics)
    NumericString(AwkStr, f64),
    /// Associative array
    Map(MapRef),
    /// Function parameter whose role is not known yet. It owns an empty map
    /// so that a callee that indexes it fills the caller's variable.
    Undecided(MapRef),
    /// Compiled regex literal used as an operand of `~` or a builtin
    Regex(Rc<Regex>),
}

impl Value {
    /// Create a string value from input data, detecting numeric strings
    #[inline]
    pub fn from_string(s: impl Into<AwkStr>) -> Self {
        let s = s.into();
        match parse_numeric_string(&s) {
            Some(num) => Value::NumericString(s, num),
            None => Value::String(s),
        }
    }

    /// Create a plain string value (program constants, results of string ops)
    #[inline]
    pub fn str(s: impl Into<AwkStr>) -> Self {
        Value::String(s.into())
    }

    pub fn new_map() -> Self {
        Value::Map(Rc::new(RefCell::new(AwkMap::new())))
    }

    pub fn new_undecided() -> Self {
        Value::Undecided(Rc::new(RefCell::new(AwkMap::new())))
    }

    /// Check if this value is "true" in boolean context
    /// - Uninitialized is false
    /// - Number 0 is false
    /// - Empty string is false
    /// - A numeric string is true when its number is non-zero
    #[inline]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Uninitialized => false,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::NumericString(_, n) => *n != 0.0,
            Value::Map(m) | Value::Undecided(m) => !m.borrow().is_empty(),
            Value::Regex(_) => true,
        }
    }

    /// Coerce to numeric value
    #[inline]
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Uninitialized => 0.0,
            Value::Number(n) => *n,
            Value::String(s) => parse_leading_number(s),
            Value::NumericString(_, n) => *n,
            Value::Map(_) | Value::Undecided(_) | Value::Regex(_) => 0.0,
        }
    }

    /// String form, numbers converted with `convfmt`
    #[inline]
    pub fn as_str_with(&self, convfmt: &str) -> Cow<'_, str> {
        match self {
            Value::Uninitialized => Cow::Borrowed(""),
            Value::Number(n) => Cow::Owned(format_number(*n, convfmt)),
            Value::String(s) | Value::NumericString(s, _) => Cow::Borrowed(s.as_str()),
            Value::Map(_) | Value::Undecided(_) => Cow::Borrowed(""),
            Value::Regex(re) => Cow::Borrowed(re.as_str()),
        }
    }

    /// Get string as Cow, numbers formatted with the default CONVFMT
    #[inline]
    pub fn as_str(&self) -> Cow<'_, str> {
        self.as_str_with(DEFAULT_CONVFMT)
    }

    /// Shared string form; reuses the buffer of string values
    pub fn to_awkstr(&self, convfmt: &str) -> AwkStr {
        match self {
            Value::String(s) | Value::NumericString(s, _) => s.clone(),
            other => AwkStr::from(other.as_str_with(convfmt).into_owned()),
        }
    }

    /// Consuming form of [`Value::to_awkstr`]
    pub fn into_awkstr(self, convfmt: &str) -> AwkStr {
        match self {
            Value::String(s) | Value::NumericString(s, _) => s,
            other => other.to_awkstr(convfmt),
        }
    }

    /// Check if this value should compare as a number
    #[inline]
    pub fn compares_as_number(&self) -> bool {
        matches!(
            self,
            Value::Number(_) | Value::NumericString(_, _) | Value::Uninitialized
        )
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Map(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Compare two AWK values according to AWK comparison rules
#[inline]
pub fn compare_values(left: &Value, right: &Value, convfmt: &str) -> Ordering {
    if left.compares_as_number() && right.compares_as_number() {
        let l = left.to_number();
        let r = right.to_number();
        l.partial_cmp(&r).unwrap_or(Ordering::Equal)
    } else {
        left.as_str_with(convfmt).cmp(&right.as_str_with(convfmt))
    }
}

/// Parse the leading numeric portion of a string
/// "42abc" -> 42.0
/// "  3.14  " -> 3.14
/// "abc" -> 0.0
#[inline]
pub fn parse_leading_number(s: &str) -> f64 {
    let bytes = s.as_bytes();
    let mut i = 0;

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    if i >= bytes.len() {
        return 0.0;
    }

    let start = i;

    if bytes[i] == b'+' || bytes[i] == b'-' {
        i += 1;
    }

    let mut has_digits = false;

    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        has_digits = true;
    }

    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            has_digits = true;
        }
    }

    if !has_digits {
        return 0.0;
    }

    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let exp_start = i;
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        if i < bytes.len() && bytes[i].is_ascii_digit() {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        } else {
            i = exp_start;
        }
    }

    let num_str = &s[start..i];
    if !num_str.contains(['.', 'e', 'E']) {
        if let Ok(n) = num_str.parse::<i64>() {
            return n as f64;
        }
    }

    num_str.parse().unwrap_or(0.0)
}

/// Check if a string is a numeric string (looks entirely like a number,
/// surrounding blanks allowed)
#[inline]
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let trimmed = s.trim_matches(|c| c == ' ' || c == '\t' || c == '\n');
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse().ok();
    }

    let check = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
    if check.is_empty() {
        return None;
    }

    let mut has_dot = false;
    let mut has_e = false;
    let mut has_digit = false;
    let bytes = check.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => has_digit = true,
            b'.' if !has_dot && !has_e => has_dot = true,
            b'e' | b'E' if !has_e && has_digit => {
                has_e = true;
                if matches!(bytes.get(i + 1), Some(b'+' | b'-')) {
                    i += 1;
                }
                if !matches!(bytes.get(i + 1), Some(b'0'..=b'9')) {
                    return None;
                }
            }
            _ => return None,
        }
        i += 1;
    }

    if !has_digit {
        return None;
    }
    trimmed.parse().ok()
}
