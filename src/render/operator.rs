//! Arithmetic on [`Value`].
//!
//! Booleans take part in arithmetic as `0` and `1`. Integer arithmetic stays
//! in integers and reports overflow, while any float operand makes the
//! result a float. Division with `/` always produces a float.
use crate::{
    compile::tree::{BinOp, UnaryOp},
    log::{error_types, Error, ErrorKind},
    render::{pipe::escape, value::format_float, Value},
    security::check_size,
};
use std::sync::Arc;

/// Apply a binary operator to two values.
///
/// `and` and `or` short circuit, so they are evaluated by the caller and
/// never reach this function.
///
/// # Errors
///
/// Returns an [`Error`] if the operator does not support the operand types,
/// an integer overflows, the right side of a division is zero, or a
/// repetition would build a value larger than [`MAX_SIZE`][`crate::security::MAX_SIZE`].
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, Error> {
    if left.is_undefined() || right.is_undefined() {
        return Err(Error::new(
            ErrorKind::Undefined,
            format!("undefined value used with operator `{op}`"),
        ));
    }

    match (op, left, right) {
        (BinOp::Add, Value::String(a), Value::String(b)) => Ok(Value::from(format!("{a}{b}"))),
        (BinOp::Add, Value::Markup(a), b) if b.as_str().is_some() => {
            Ok(Value::markup(format!("{a}{}", b.to_output(true))))
        }
        (BinOp::Add, a, Value::Markup(b)) if a.as_str().is_some() => {
            Ok(Value::markup(format!("{}{b}", a.to_output(true))))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::from(a.iter().chain(b.iter()).cloned().collect::<Vec<_>>()))
        }
        (BinOp::Mul, Value::String(_) | Value::Markup(_), n)
        | (BinOp::Mul, n, Value::String(_) | Value::Markup(_))
            if n.as_int().is_some() =>
        {
            let (text, markup) = match (left, right) {
                (Value::String(s), _) | (_, Value::String(s)) => (s, false),
                (Value::Markup(s), _) | (_, Value::Markup(s)) => (s, true),
                _ => return Err(unsupported(op, left, right)),
            };
            let times = n.as_int().unwrap_or_default().max(0) as usize;
            check_size(text.len().saturating_mul(times))?;
            let repeated: Arc<str> = text.repeat(times).into();
            Ok(match markup {
                true => Value::Markup(repeated),
                false => Value::String(repeated),
            })
        }
        (BinOp::Mul, Value::List(l), n) | (BinOp::Mul, n, Value::List(l)) if n.as_int().is_some() => {
            let times = n.as_int().unwrap_or_default().max(0) as usize;
            let mut items = Vec::with_capacity(check_size(l.len().saturating_mul(times))?);
            for _ in 0..times {
                items.extend(l.iter().cloned());
            }
            Ok(Value::from(items))
        }
        (BinOp::Mod, Value::String(fmt) | Value::Markup(fmt), args) => {
            let text = format(fmt, args, left.is_markup())?;
            Ok(match left.is_markup() {
                true => Value::markup(text),
                false => Value::from(text),
            })
        }
        (op, a, b) => match (numeric(a), numeric(b)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => integer(op, a, b),
            (Some(a), Some(b)) => float(op, a.to_f64(), b.to_f64()),
            _ => Err(unsupported(op, left, right)),
        },
    }
}

/// Apply a unary `-` or `+` to a value.
///
/// # Errors
///
/// Returns an [`Error`] if the operand is not numeric.
pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, Error> {
    let Some(number) = numeric(operand) else {
        let symbol = match op {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Not => "not",
        };
        return Err(error_types(format!(
            "unary `{symbol}` is not supported on `{}`",
            operand.kind()
        )));
    };

    match (op, number) {
        (UnaryOp::Neg, Number::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOp::Neg, Number::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.is_truthy())),
        (UnaryOp::Pos, Number::Int(i)) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Number::Float(f)) => Ok(Value::Float(f)),
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn numeric(value: &Value) -> Option<Number> {
    match value {
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Bool(b) => Some(Number::Int(*b as i64)),
        Value::Float(f) => Some(Number::Float(*f)),
        _ => None,
    }
}

fn integer(op: BinOp, a: i64, b: i64) -> Result<Value, Error> {
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => return float(op, a as f64, b as f64),
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division());
            }
            a.checked_div(b).map(|q| match a % b != 0 && ((a < 0) != (b < 0)) {
                true => q - 1,
                false => q,
            })
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero_division());
            }
            a.checked_rem(b).map(|r| match r != 0 && ((r < 0) != (b < 0)) {
                true => r + b,
                false => r,
            })
        }
        BinOp::Pow => match u32::try_from(b) {
            Ok(exponent) => a.checked_pow(exponent),
            Err(_) if b < 0 => return float(op, a as f64, b as f64),
            Err(_) => None,
        },
        BinOp::And | BinOp::Or => return Err(unsupported_logic(op)),
    };

    result.map(Value::Int).ok_or_else(overflow)
}

fn float(op: BinOp, a: f64, b: f64) -> Result<Value, Error> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => return Err(zero_division()),
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => {
            let r = a % b;
            match r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                true => r + b,
                false => r,
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division());
            }
            a.powf(b)
        }
        BinOp::And | BinOp::Or => return Err(unsupported_logic(op)),
    };

    Ok(Value::Float(result))
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> Error {
    error_types(format!(
        "operator `{op}` is not supported between `{}` and `{}`",
        left.kind(),
        right.kind()
    ))
}

fn unsupported_logic(op: BinOp) -> Error {
    Error::build(format!("operator `{op}` must be evaluated lazily"))
}

fn overflow() -> Error {
    Error::build("integer overflow")
        .with_help("use a float literal, such as `2.0`, for very large numbers")
}

fn zero_division() -> Error {
    Error::new(ErrorKind::ZeroDivision, "division by zero")
}

/// Format a string with printf style placeholders.
///
/// Supports `%s`, `%r`, `%d`, `%i`, `%f` (with optional precision such as
/// `%.2f`), `%x`, `%o`, `%e` and `%%`. Placeholders may name a key of a map
/// argument, as in `%(name)s`. A list argument supplies one value per
/// placeholder; any other argument is used for a single placeholder.
///
/// When `escape_args` is set, string arguments are escaped before they
/// are inserted.
///
/// # Errors
///
/// Returns an [`Error`] if there are too few or too many arguments, or a
/// numeric placeholder receives a non-numeric value.
pub fn format(fmt: &str, args: &Value, escape_args: bool) -> Result<String, Error> {
    let positional: Vec<Value> = match args {
        Value::List(l) => l.to_vec(),
        Value::Map(_) => vec![],
        other => vec![other.clone()],
    };
    let mut next = positional.iter();
    let mut output = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            output.push(c);
            continue;
        }

        let key = match chars.peek() {
            Some('%') => {
                chars.next();
                output.push('%');
                continue;
            }
            Some('(') => {
                chars.next();
                let key: String = chars.by_ref().take_while(|c| *c != ')').collect();
                Some(key)
            }
            _ => None,
        };

        let mut flags = String::new();
        while let Some(c) = chars.peek().copied() {
            match c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | ' ' | '#') {
                true => {
                    flags.push(c);
                    chars.next();
                }
                false => break,
            }
        }
        let Some(conversion) = chars.next() else {
            return Err(Error::build("incomplete format"));
        };

        let value = match &key {
            Some(key) => args.get_item(&Value::from(key.as_str())),
            None => match next.next() {
                Some(value) => value.clone(),
                None => return Err(Error::build("not enough arguments for format string")),
            },
        };
        if key.is_some() && value.is_undefined() {
            return Err(Error::build(format!(
                "format string requires key `{}`",
                key.unwrap_or_default()
            )));
        }

        let text = convert(conversion, &flags, &value)?;
        match escape_args && !value.is_markup() {
            true => output.push_str(&escape(&text)),
            false => output.push_str(&text),
        }
    }

    if next.next().is_some() {
        return Err(Error::build(
            "not all arguments converted during string formatting",
        ));
    }

    Ok(output)
}

/// Convert one value for a printf placeholder.
fn convert(conversion: char, flags: &str, value: &Value) -> Result<String, Error> {
    let (left_align, rest) = match flags.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, flags),
    };
    let (width, precision) = match rest.split_once('.') {
        Some((width, precision)) => (width, precision.parse::<usize>().ok()),
        None => (rest, None),
    };
    let zero_pad = width.starts_with('0') && !left_align;
    let width = width
        .trim_start_matches(['+', ' ', '#'])
        .parse::<usize>()
        .unwrap_or(0);
    if let Some(precision) = precision {
        check_size(precision)?;
    }

    let number = |value: &Value| {
        value.as_float().ok_or_else(|| {
            error_types(format!(
                "`%{conversion}` format requires a number, not `{}`",
                value.kind()
            ))
        })
    };

    let text = match conversion {
        's' => {
            let text = value.to_string();
            match precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            }
        }
        'r' => value.repr(),
        'd' | 'i' | 'u' => match value.as_int() {
            Some(i) => i.to_string(),
            None => (number(value)?.trunc() as i64).to_string(),
        },
        'f' | 'F' => format!("{:.*}", precision.unwrap_or(6), number(value)?),
        'e' | 'E' => {
            let text = format!("{:.*e}", precision.unwrap_or(6), number(value)?);
            exponent(&text, conversion == 'E')
        }
        'g' | 'G' => {
            let mut text = String::new();
            // Writing to a String does not fail.
            let _ = format_float(number(value)?, &mut text);
            text
        }
        'x' => format!("{:x}", number(value)? as i64),
        'X' => format!("{:X}", number(value)? as i64),
        'o' => format!("{:o}", number(value)? as i64),
        other => return Err(Error::build(format!("unsupported format character `{other}`"))),
    };

    let padding = check_size(width)?.saturating_sub(text.chars().count());
    Ok(match (left_align, zero_pad) {
        _ if padding == 0 => text,
        (true, _) => format!("{text}{}", " ".repeat(padding)),
        (false, true) => match text.strip_prefix('-') {
            Some(digits) => format!("-{}{digits}", "0".repeat(padding)),
            None => format!("{}{text}", "0".repeat(padding)),
        },
        (false, false) => format!("{}{text}", " ".repeat(padding)),
    })
}

/// Return the length that `left * right` builds when one side is a string
/// or list and the other an integer: bytes for a string, items for a list.
///
/// The length saturates at `usize::MAX`.
pub fn repeat_len(op: BinOp, left: &Value, right: &Value) -> Option<usize> {
    if op != BinOp::Mul {
        return None;
    }
    let (unit, times) = match (left, right) {
        (Value::String(s) | Value::Markup(s), n) | (n, Value::String(s) | Value::Markup(s)) => {
            (s.len(), n.as_int()?)
        }
        (Value::List(l), n) | (n, Value::List(l)) => (l.len(), n.as_int()?),
        _ => return None,
    };

    Some(unit.saturating_mul(times.max(0) as usize))
}

/// Rewrite a Rust exponent, such as `1.5e2`, as `1.5e+02`.
fn exponent(text: &str, upper: bool) -> String {
    let Some((mantissa, exp)) = text.split_once('e') else {
        return text.to_string();
    };
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exp),
    };
    let e = if upper { 'E' } else { 'e' };

    format!("{mantissa}{e}{sign}{digits:0>2}")
}

#[cfg(test)]
mod tests {
    use super::{binary, format, repeat_len, unary};
    use crate::{
        compile::tree::{BinOp, UnaryOp},
        log::ErrorKind,
        render::Value,
    };
    use serde_json::json;

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(binary(BinOp::Add, &Value::Int(2), &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(binary(BinOp::Pow, &Value::Int(2), &Value::Int(10)).unwrap(), Value::Int(1024));
        assert_eq!(binary(BinOp::Add, &Value::Bool(true), &Value::Int(1)).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_division_is_float() {
        let result = binary(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap();
        assert!(matches!(result, Value::Float(f) if f == 3.5));
    }

    #[test]
    fn test_floor_division_and_modulo() {
        assert_eq!(binary(BinOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(binary(BinOp::FloorDiv, &Value::Int(7), &Value::Int(-2)).unwrap(), Value::Int(-4));
        assert_eq!(binary(BinOp::Mod, &Value::Int(-7), &Value::Int(3)).unwrap(), Value::Int(2));
        assert_eq!(binary(BinOp::Mod, &Value::Int(7), &Value::Int(-3)).unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_division_by_zero() {
        for op in [BinOp::Div, BinOp::FloorDiv, BinOp::Mod] {
            let error = binary(op, &Value::Int(10), &Value::Int(0)).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::ZeroDivision);
        }
        let error = binary(BinOp::Div, &Value::Float(1.0), &Value::Float(0.0)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ZeroDivision);
    }

    #[test]
    fn test_overflow() {
        assert!(binary(BinOp::Mul, &Value::Int(i64::MAX), &Value::Int(2)).is_err());
        assert!(unary(UnaryOp::Neg, &Value::Int(i64::MIN)).is_err());
    }

    #[test]
    fn test_sequences() {
        let list = binary(BinOp::Add, &Value::from(json!([1])), &Value::from(json!([2]))).unwrap();
        assert_eq!(list, Value::from(json!([1, 2])));

        let repeated = binary(BinOp::Mul, &Value::from("ab"), &Value::Int(3)).unwrap();
        assert_eq!(repeated, Value::from("ababab"));

        let concat = binary(BinOp::Add, &Value::from("a"), &Value::from("b")).unwrap();
        assert_eq!(concat, Value::from("ab"));
    }

    #[test]
    fn test_repetition_limit() {
        let error = binary(BinOp::Mul, &Value::from("a"), &Value::Int(99_999_999_999)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Security);

        let error = binary(BinOp::Mul, &Value::Int(1 << 62), &Value::from(json!([1, 2]))).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Security);

        assert_eq!(
            binary(BinOp::Mul, &Value::from(json!([1])), &Value::Int(-3)).unwrap(),
            Value::from(json!([]))
        );
    }

    #[test]
    fn test_repeat_len() {
        assert_eq!(repeat_len(BinOp::Mul, &Value::from("ab"), &Value::Int(3)), Some(6));
        assert_eq!(repeat_len(BinOp::Mul, &Value::Int(2), &Value::from(json!([1, 2]))), Some(4));
        assert_eq!(repeat_len(BinOp::Mul, &Value::from("a"), &Value::Int(i64::MAX)), Some(i64::MAX as usize));
        assert_eq!(repeat_len(BinOp::Mul, &Value::from(json!([1])), &Value::Int(1 << 62)), Some(1 << 62));
        assert_eq!(repeat_len(BinOp::Mul, &Value::Int(2), &Value::Int(3)), None);
        assert_eq!(repeat_len(BinOp::Add, &Value::from("a"), &Value::Int(3)), None);
    }

    #[test]
    fn test_markup_escapes_plain_operand() {
        let result = binary(BinOp::Add, &Value::markup("<b>"), &Value::from("<i>")).unwrap();
        assert!(matches!(result, Value::Markup(ref s) if &**s == "<b>&lt;i&gt;"));
    }

    #[test]
    fn test_mismatched_types() {
        let error = binary(BinOp::Add, &Value::from("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Type);
        assert!(binary(BinOp::Sub, &Value::Undefined, &Value::Int(1)).is_err());
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Neg, &Value::Float(1.5)).unwrap(), Value::Float(-1.5));
        assert!(unary(UnaryOp::Neg, &Value::from("a")).is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format("%s is %d", &Value::from(json!(["a", 3])), false).unwrap(), "a is 3");
        assert_eq!(format("%.2f%%", &Value::Float(3.14159), false).unwrap(), "3.14%");
        assert_eq!(format("%(x)s!", &Value::from(json!({"x": "hi"})), false).unwrap(), "hi!");
        assert_eq!(format("%05d|%-3s|", &Value::from(json!([42, "a"])), false).unwrap(), "00042|a  |");
        assert_eq!(format("%s", &Value::from("<"), true).unwrap(), "&lt;");
        assert_eq!(format("%e", &Value::Float(150.0), false).unwrap(), "1.500000e+02");
    }

    #[test]
    fn test_format_argument_count() {
        assert!(format("%s %s", &Value::from("a"), false).is_err());
        assert!(format("%s", &Value::from(json!(["a", "b"])), false).is_err());
    }

    #[test]
    fn test_format_width_limit() {
        let error = format("%99999999999d", &Value::Int(1), false).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Security);
        assert!(format("%.99999999999f", &Value::Float(1.0), false).is_err());
    }

    #[test]
    fn test_modulo_operator_formats() {
        let result = binary(BinOp::Mod, &Value::from("%s-%s"), &Value::from(json!([1, 2]))).unwrap();
        assert_eq!(result, Value::from("1-2"));
    }
}
