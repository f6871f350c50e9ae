//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::rc::Rc;

use super::format::format_float;

/// A scalar value. A value is a number and a string at the same time; which
/// view an operation uses is decided by the coercion rules below.
///
/// `NumStr` marks strings that came from the outside world (input fields,
/// getline targets, ARGV/ENVIRON, command-line assignments): when such a
/// string parses cleanly as a number it takes part in numeric comparisons.
/// `Null` is the value of an uninitialized variable, distinguishable from
/// the empty string.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Num(f64),
    Str(Rc<str>),
    NumStr(Rc<str>),
}

impl Value {
    pub fn numstr<S: Into<Rc<str>>>(value: S) -> Self {
        Value::NumStr(value.into())
    }

    /// The numeric view. Strings are parsed with `strtod` semantics: a
    /// non-numeric prefix yields 0.
    pub fn num(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Num(value) => *value,
            Value::Str(value) | Value::NumStr(value) => strtod(value),
        }
    }

    /// The string view. Numbers with an exact integer value print without
    /// decimals, everything else goes through the given conversion format
    /// (`CONVFMT` or, in print context, `OFMT`).
    pub fn to_str(&self, float_format: &str) -> Result<Rc<str>, String> {
        match self {
            Value::Null => Ok(Rc::from("")),
            Value::Num(value) => {
                let as_int = *value as i64;
                if as_int as f64 == *value {
                    Ok(Rc::from(as_int.to_string()))
                } else {
                    format_float(float_format, *value).map(Rc::from)
                }
            }
            Value::Str(value) | Value::NumStr(value) => Ok(value.clone()),
        }
    }

    /// The truth value: numbers are tested against zero, true strings
    /// against the empty string. A numeric string that parses cleanly is a
    /// number for this purpose.
    pub fn boolean(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Num(value) => *value != 0.0,
            Value::Str(value) => !value.is_empty(),
            Value::NumStr(value) => {
                if is_valid_number(value) {
                    strtod(value) != 0.0
                } else {
                    !value.is_empty()
                }
            }
        }
    }

    /// The parsed numeric value together with the "true string" flag used
    /// by the comparison rules.
    pub fn is_true_str(&self) -> (f64, bool) {
        (self.num(), matches!(self, Value::Str(_)))
    }

    /// `Some(number)` if this value takes the numeric side in comparisons:
    /// numbers, null, and numeric strings that parse cleanly.
    fn num_if_numeric(&self) -> Option<f64> {
        match self {
            Value::Null => Some(0.0),
            Value::Num(value) => Some(*value),
            Value::NumStr(value) if is_valid_number(value) => Some(strtod(value)),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Num(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Num(if value { 1.0 } else { 0.0 })
    }
}

impl From<Rc<str>> for Value {
    fn from(value: Rc<str>) -> Self {
        Value::Str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

/// Compare two values with the comparison rules: numeric when both sides
/// are numbers, null, or cleanly-parsing numeric strings; lexicographic
/// otherwise, converting the non-string side through `CONVFMT`. `None` means
/// unordered (NaN on the numeric path).
pub fn compare_values(
    lhs: &Value,
    rhs: &Value,
    convfmt: &str,
) -> Result<Option<Ordering>, String> {
    match (lhs.num_if_numeric(), rhs.num_if_numeric()) {
        (Some(left), Some(right)) => Ok(left.partial_cmp(&right)),
        _ => {
            let left = lhs.to_str(convfmt)?;
            let right = rhs.to_str(convfmt)?;
            Ok(Some(left.as_ref().cmp(right.as_ref())))
        }
    }
}

/// Parse a numeric prefix: optional leading whitespace and sign, then a
/// decimal, scientific, or `0x` hexadecimal literal. Returns the value and
/// the number of bytes consumed, or `None` if no digits were found.
pub fn parse_number_prefix(s: &str) -> Option<(f64, usize)> {
    let trimmed = s.trim_start();
    let whitespace_len = s.len() - trimmed.len();
    let (sign, rest, sign_len) = match trimmed.as_bytes().first() {
        Some(b'+') => (1.0, &trimmed[1..], 1),
        Some(b'-') => (-1.0, &trimmed[1..], 1),
        _ => (1.0, trimmed, 0),
    };

    let bytes = rest.as_bytes();
    if bytes.len() > 2
        && (bytes.starts_with(b"0x") || bytes.starts_with(b"0X"))
        && bytes[2].is_ascii_hexdigit()
    {
        let digits = rest[2..]
            .bytes()
            .take_while(|b| b.is_ascii_hexdigit())
            .count();
        let value = rest[2..2 + digits]
            .bytes()
            .fold(0.0f64, |acc, b| acc * 16.0 + hex_digit(b) as f64);
        return Some((sign * value, whitespace_len + sign_len + 2 + digits));
    }

    lexical::parse_partial_with_options::<f64, _, { lexical::format::C_STRING }>(
        rest,
        &lexical::ParseFloatOptions::default(),
    )
    .ok()
    .filter(|(_, consumed)| *consumed > 0)
    .map(|(value, consumed)| (sign * value, whitespace_len + sign_len + consumed))
}

fn hex_digit(b: u8) -> u32 {
    (b as char).to_digit(16).expect("not a hex digit")
}

pub fn strtod(s: &str) -> f64 {
    parse_number_prefix(s).map(|(value, _)| value).unwrap_or(0.0)
}

/// Whether the whole string (modulo surrounding whitespace) is a number.
/// This is the test that decides if a numeric string takes the numeric side
/// in comparisons.
pub fn is_valid_number(s: &str) -> bool {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return false;
    }
    match parse_number_prefix(trimmed) {
        Some((_, consumed)) => consumed == trimmed.len(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_coerces_to_zero_and_empty_string() {
        assert_eq!(Value::Null.num(), 0.0);
        assert_eq!(Value::Null.to_str("%.6g").unwrap().as_ref(), "");
        assert!(!Value::Null.boolean());
    }

    #[test]
    fn integer_numbers_print_without_decimals() {
        assert_eq!(Value::Num(3.0).to_str("%.6g").unwrap().as_ref(), "3");
        assert_eq!(Value::Num(-42.0).to_str("%.6g").unwrap().as_ref(), "-42");
    }

    #[test]
    fn fractional_numbers_use_the_conversion_format() {
        assert_eq!(Value::Num(0.25).to_str("%.6g").unwrap().as_ref(), "0.25");
        assert_eq!(Value::Num(0.5).to_str("%.2f").unwrap().as_ref(), "0.50");
    }

    #[test]
    fn strtod_parses_prefixes() {
        assert_eq!(strtod("12abc"), 12.0);
        assert_eq!(strtod("  -3.5e2xyz"), -350.0);
        assert_eq!(strtod("abc"), 0.0);
        assert_eq!(strtod(""), 0.0);
        assert_eq!(strtod("0x1A"), 26.0);
        assert_eq!(strtod("-0x10"), -16.0);
    }

    #[test]
    fn valid_numbers() {
        assert!(is_valid_number("12"));
        assert!(is_valid_number(" +12.5e3 "));
        assert!(is_valid_number(".5"));
        assert!(is_valid_number("0x1f"));
        assert!(!is_valid_number("12abc"));
        assert!(!is_valid_number(""));
        assert!(!is_valid_number(" "));
        assert!(!is_valid_number("e5"));
    }

    #[test]
    fn numeric_strings_compare_numerically() {
        let lhs = Value::numstr("10");
        let rhs = Value::numstr("9");
        assert_eq!(
            compare_values(&lhs, &rhs, "%.6g").unwrap(),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn true_strings_compare_lexicographically() {
        let lhs = Value::from("10");
        let rhs = Value::from("9");
        assert_eq!(
            compare_values(&lhs, &rhs, "%.6g").unwrap(),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn non_numeric_numstr_falls_back_to_string_comparison() {
        let lhs = Value::numstr("abc");
        let rhs = Value::Num(0.0);
        // "abc" vs "0"
        assert_eq!(
            compare_values(&lhs, &rhs, "%.6g").unwrap(),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn null_compares_equal_to_zero_and_empty() {
        assert_eq!(
            compare_values(&Value::Null, &Value::Num(0.0), "%.6g").unwrap(),
            Some(Ordering::Equal)
        );
        assert_eq!(
            compare_values(&Value::Null, &Value::from(""), "%.6g").unwrap(),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn zero_valued_numeric_string_is_false() {
        assert!(!Value::numstr("0").boolean());
        assert!(Value::numstr("0a").boolean());
        assert!(Value::from("0").boolean());
    }
}
