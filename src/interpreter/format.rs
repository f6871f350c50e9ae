//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The `printf`/`sprintf` formatter.
//!
//! Format strings are parsed once into a list of segments so the VM can keep
//! a bounded cache of parsed formats. Supported conversions: `d`, `i`, `u`,
//! `o`, `x`, `X`, `c`, `s`, `e`, `E`, `f`, `F`, `g`, `G` and `%%`, with the
//! `-`, `+`, space, `#` and `0` flags plus width and precision.

use std::rc::Rc;
use std::str::Chars;

use super::value::Value;

const BASE_8_DIGITS: [char; 8] = ['0', '1', '2', '3', '4', '5', '6', '7'];
const BASE_10_DIGITS: [char; 10] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
const BASE_16_DIGITS_LOWER: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];
const BASE_16_DIGITS_UPPER: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatArgs {
    pub left_justified: bool,
    pub signed: bool,
    pub prefix_space: bool,
    pub alternative_form: bool,
    pub zero_padded: bool,
    pub width: usize,
    pub precision: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormatSegment {
    Literal(Rc<str>),
    Conversion(char, FormatArgs),
}

/// Parse the conversion specifier arguments from the format string.
/// `iter` has to be positioned after the `%` that starts the specifier.
fn parse_conversion_specifier_args(iter: &mut Chars) -> Result<(char, FormatArgs), String> {
    let iter_next = |iter: &mut Chars| iter.next().ok_or("invalid format string".to_string());

    let parse_number = |next: &mut char, iter: &mut Chars| -> Result<usize, String> {
        let mut number = 0;
        while let Some(digit) = next.to_digit(10) {
            number = number * 10 + digit as usize;
            *next = iter_next(iter)?;
        }
        Ok(number)
    };

    let mut result = FormatArgs::default();
    let mut next = iter_next(iter)?;
    loop {
        match next {
            '-' => result.left_justified = true,
            '+' => result.signed = true,
            ' ' => result.prefix_space = true,
            '#' => result.alternative_form = true,
            '0' => result.zero_padded = true,
            _ => break,
        }
        next = iter_next(iter)?;
    }

    result.width = parse_number(&mut next, iter)?;

    result.precision = if next == '.' {
        next = iter_next(iter)?;
        Some(parse_number(&mut next, iter)?)
    } else {
        None
    };

    Ok((next, result))
}

/// Parse a whole format string into segments. `%%` folds into the
/// surrounding literal text.
pub fn parse_format(format: &str) -> Result<Vec<FormatSegment>, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut iter = format.chars();
    while let Some(c) = iter.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        let (specifier, args) = parse_conversion_specifier_args(&mut iter)?;
        if specifier == '%' {
            literal.push('%');
            continue;
        }
        match specifier {
            'd' | 'i' | 'u' | 'o' | 'x' | 'X' | 'c' | 's' | 'e' | 'E' | 'f' | 'F' | 'g'
            | 'G' => {
                if !literal.is_empty() {
                    segments.push(FormatSegment::Literal(std::mem::take(&mut literal).into()));
                }
                segments.push(FormatSegment::Conversion(specifier, args));
            }
            other => return Err(format!("unsupported format specifier '{}'", other)),
        }
    }
    if !literal.is_empty() {
        segments.push(FormatSegment::Literal(literal.into()));
    }
    Ok(segments)
}

/// Format `values` through parsed segments. Values beyond the conversions in
/// the format are ignored; running out of values is an error.
pub fn apply_format(
    segments: &[FormatSegment],
    values: &[Value],
    convfmt: &str,
    bytes: bool,
) -> Result<String, String> {
    let mut result = String::new();
    let mut next_value = values.iter();
    for segment in segments {
        let (specifier, args) = match segment {
            FormatSegment::Literal(text) => {
                result.push_str(text);
                continue;
            }
            FormatSegment::Conversion(specifier, args) => (*specifier, args),
        };
        let value = next_value
            .next()
            .ok_or_else(|| "not enough arguments for format string".to_string())?;
        match specifier {
            'd' | 'i' => {
                fmt_write_signed(&mut result, value.num() as i64, args);
            }
            'u' | 'o' | 'x' | 'X' => {
                let int_value = value.num() as i64;
                if int_value.is_negative() {
                    return Err("negative value for unsigned format specifier".to_string());
                }
                let format = match specifier {
                    'u' => IntegerFormat::Decimal,
                    'o' => IntegerFormat::Octal,
                    'x' => IntegerFormat::HexLower,
                    'X' => IntegerFormat::HexUpper,
                    _ => unreachable!(),
                };
                fmt_write_unsigned(&mut result, int_value as u64, format, args);
            }
            'f' | 'F' => {
                fmt_write_decimal_float(&mut result, value.num(), specifier == 'f', args);
            }
            'e' | 'E' => {
                fmt_write_scientific_float(&mut result, value.num(), specifier == 'e', args);
            }
            'g' | 'G' => {
                fmt_write_float_general(&mut result, value.num(), specifier == 'g', args);
            }
            'c' => match value {
                Value::Str(s) | Value::NumStr(s) if !s.is_empty() => {
                    if bytes {
                        result.push(s.as_bytes()[0] as char);
                    } else {
                        result.push(s.chars().next().unwrap());
                    }
                }
                Value::Str(_) | Value::NumStr(_) => {}
                other => {
                    let code = other.num() as i64;
                    if bytes {
                        result.push((code as u8) as char);
                    } else if let Some(c) = char::from_u32(code as u32) {
                        result.push(c);
                    }
                }
            },
            's' => {
                let text = value.to_str(convfmt)?;
                fmt_write_string(&mut result, &text, args);
            }
            _ => unreachable!("parse_format admitted specifier '{}'", specifier),
        }
    }
    Ok(result)
}

/// Format a single float through a printf-style format. Used for
/// `CONVFMT`/`OFMT` conversions.
pub fn format_float(format: &str, value: f64) -> Result<String, String> {
    let segments = parse_format(format)?;
    apply_format(&segments, &[Value::Num(value)], "%.6g", false)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum IntegerFormat {
    Decimal,
    Octal,
    HexLower,
    HexUpper,
}

fn insert_hex_identifier(target: &mut String, integer_format: IntegerFormat, args: &FormatArgs) {
    if args.alternative_form && integer_format == IntegerFormat::HexLower {
        target.push_str("0x");
    } else if args.alternative_form && integer_format == IntegerFormat::HexUpper {
        target.push_str("0X");
    }
}

fn copy_buffer_to_target(buffer: &[u8], target: &mut String) {
    for c in buffer.iter() {
        target.push(*c as char);
    }
}

fn pad_target(target: &mut String, padding: usize, byte: u8) {
    for _ in 0..padding {
        target.push(byte as char);
    }
}

fn fmt_write_unsigned(
    target: &mut String,
    value: u64,
    integer_format: IntegerFormat,
    args: &FormatArgs,
) {
    let (base, digits): (u64, &[char]) = match integer_format {
        IntegerFormat::Decimal => (10, &BASE_10_DIGITS),
        IntegerFormat::Octal => (8, &BASE_8_DIGITS),
        IntegerFormat::HexLower => (16, &BASE_16_DIGITS_LOWER),
        IntegerFormat::HexUpper => (16, &BASE_16_DIGITS_UPPER),
    };

    let mut value = value;
    // 22 = ceil(log8(u64::MAX)), enough digits for the lowest base
    let mut buffer = [0u8; 22];
    let mut index = buffer.len();
    while value != 0 {
        index -= 1;
        buffer[index] = digits[(value % base) as usize] as u8;
        value /= base;
    }

    let mut precision = args.precision.unwrap_or(1);

    // for the o conversion the alternative form increases the precision to
    // force a leading zero
    if args.alternative_form
        && integer_format == IntegerFormat::Octal
        && precision < buffer.len() - index + 1
    {
        precision = buffer.len() - index + 1;
    }

    let buffer_length = buffer.len() - index;
    let number_length = match integer_format {
        IntegerFormat::HexLower | IntegerFormat::HexUpper if args.alternative_form => {
            buffer_length.max(precision) + 2
        }
        _ => buffer_length.max(precision),
    };

    if args.left_justified {
        insert_hex_identifier(target, integer_format, args);
        if precision > buffer_length {
            pad_target(target, precision - buffer_length, b'0');
        }
        copy_buffer_to_target(&buffer[index..], target);
        pad_target(target, args.width.saturating_sub(number_length), b' ');
    } else if args.zero_padded {
        insert_hex_identifier(target, integer_format, args);
        pad_target(target, args.width.saturating_sub(number_length), b'0');
        if precision > buffer_length {
            pad_target(target, precision - buffer_length, b'0');
        }
        copy_buffer_to_target(&buffer[index..], target);
    } else {
        pad_target(target, args.width.saturating_sub(number_length), b' ');
        insert_hex_identifier(target, integer_format, args);
        if precision > buffer_length {
            pad_target(target, precision - buffer_length, b'0');
        }
        copy_buffer_to_target(&buffer[index..], target);
    }
}

fn fmt_write_signed(target: &mut String, value: i64, args: &FormatArgs) {
    let mut unsigned_value = value.unsigned_abs();
    // 20 digits are enough for u64::MAX in base 10
    let mut buffer = [0u8; 20];
    let mut index = buffer.len();
    while unsigned_value != 0 {
        index -= 1;
        buffer[index] = BASE_10_DIGITS[(unsigned_value % 10) as usize] as u8;
        unsigned_value /= 10;
    }

    let precision = args.precision.unwrap_or(1);
    let buffer_length = buffer.len() - index;
    let sign = sign_prefix(value < 0, args);
    let number_length = buffer_length.max(precision) + sign.len();

    if args.left_justified {
        target.push_str(sign);
        if precision > buffer_length {
            pad_target(target, precision - buffer_length, b'0');
        }
        copy_buffer_to_target(&buffer[index..], target);
        pad_target(target, args.width.saturating_sub(number_length), b' ');
    } else if args.zero_padded {
        target.push_str(sign);
        pad_target(target, args.width.saturating_sub(number_length), b'0');
        if precision > buffer_length {
            pad_target(target, precision - buffer_length, b'0');
        }
        copy_buffer_to_target(&buffer[index..], target);
    } else {
        pad_target(target, args.width.saturating_sub(number_length), b' ');
        target.push_str(sign);
        if precision > buffer_length {
            pad_target(target, precision - buffer_length, b'0');
        }
        copy_buffer_to_target(&buffer[index..], target);
    }
}

fn fmt_write_string(target: &mut String, value: &str, args: &FormatArgs) {
    let precision = args.precision.unwrap_or(usize::MAX);
    let str_len = value.len().min(precision);
    let padding = args.width.saturating_sub(str_len);
    if args.left_justified {
        target.push_str(&value[..str_len]);
        pad_target(target, padding, b' ');
    } else {
        pad_target(target, padding, b' ');
        target.push_str(&value[..str_len]);
    }
}

fn sign_prefix(negative: bool, args: &FormatArgs) -> &'static str {
    if negative {
        "-"
    } else if args.signed {
        "+"
    } else if args.prefix_space {
        " "
    } else {
        ""
    }
}

/// Lay out an already formatted float body with its sign, honoring width,
/// zero padding, and justification.
fn fmt_write_float_body(target: &mut String, negative: bool, body: &str, args: &FormatArgs) {
    let sign = sign_prefix(negative, args);
    let number_length = body.len() + sign.len();
    if args.left_justified {
        target.push_str(sign);
        target.push_str(body);
        pad_target(target, args.width.saturating_sub(number_length), b' ');
    } else if args.zero_padded {
        target.push_str(sign);
        pad_target(target, args.width.saturating_sub(number_length), b'0');
        target.push_str(body);
    } else {
        pad_target(target, args.width.saturating_sub(number_length), b' ');
        target.push_str(sign);
        target.push_str(body);
    }
}

fn fmt_write_nonfinite(target: &mut String, value: f64, lower: bool, args: &FormatArgs) {
    let body = match (value.is_nan(), lower) {
        (true, true) => "nan",
        (true, false) => "NAN",
        (false, true) => "inf",
        (false, false) => "INF",
    };
    let padded = FormatArgs {
        zero_padded: false,
        ..args.clone()
    };
    fmt_write_float_body(target, value.is_sign_negative() && !value.is_nan(), body, &padded);
}

fn fmt_write_decimal_float(target: &mut String, value: f64, lower: bool, args: &FormatArgs) {
    if !value.is_finite() {
        return fmt_write_nonfinite(target, value, lower, args);
    }
    let precision = args.precision.unwrap_or(6);
    let mut body = format!("{:.*}", precision, value.abs());
    if args.alternative_form && precision == 0 {
        body.push('.');
    }
    fmt_write_float_body(target, value.is_sign_negative(), &body, args);
}

/// Split Rust's `{:e}` output (`"1.5e2"`) into mantissa digits and exponent.
fn mantissa_and_exponent(value: f64, precision: usize) -> (String, i32) {
    let formatted = format!("{:.*e}", precision, value);
    let (mantissa, exponent) = formatted
        .split_once('e')
        .expect("float in scientific notation has no exponent");
    (
        mantissa.to_string(),
        exponent.parse().expect("invalid exponent"),
    )
}

fn fmt_write_scientific_float(target: &mut String, value: f64, lower: bool, args: &FormatArgs) {
    if !value.is_finite() {
        return fmt_write_nonfinite(target, value, lower, args);
    }
    let precision = args.precision.unwrap_or(6);
    let (mut mantissa, exponent) = mantissa_and_exponent(value.abs(), precision);
    if args.alternative_form && precision == 0 {
        mantissa.push('.');
    }
    let body = format!(
        "{}{}{}{:02}",
        mantissa,
        if lower { 'e' } else { 'E' },
        if exponent < 0 { '-' } else { '+' },
        exponent.abs()
    );
    fmt_write_float_body(target, value.is_sign_negative(), &body, args);
}

fn fmt_write_float_general(target: &mut String, value: f64, lower: bool, args: &FormatArgs) {
    if !value.is_finite() {
        return fmt_write_nonfinite(target, value, lower, args);
    }
    let precision = args.precision.unwrap_or(6).max(1);
    let (_, exponent) = mantissa_and_exponent(value.abs(), precision - 1);
    let strip = |mut body: String| -> String {
        if !args.alternative_form && body.contains('.') {
            while body.ends_with('0') {
                body.pop();
            }
            if body.ends_with('.') {
                body.pop();
            }
        }
        body
    };
    if exponent < -4 || exponent >= precision as i32 {
        let (mantissa, exponent) = mantissa_and_exponent(value.abs(), precision - 1);
        let body = format!(
            "{}{}{}{:02}",
            strip(mantissa),
            if lower { 'e' } else { 'E' },
            if exponent < 0 { '-' } else { '+' },
            exponent.abs()
        );
        fmt_write_float_body(target, value.is_sign_negative(), &body, args);
    } else {
        let decimals = (precision as i32 - 1 - exponent) as usize;
        let body = strip(format!("{:.*}", decimals, value.abs()));
        fmt_write_float_body(target, value.is_sign_negative(), &body, args);
    }
}
