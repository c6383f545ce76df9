use crate::{
    compile::tree::CompareOp,
    log::{error_types, Error, ErrorKind},
    render::Value,
};
use std::cmp::Ordering;

/// Return true if the given [`Value`] is truthy.
///
/// False, none, undefined, zero, and empty strings, lists and maps are falsy.
/// Everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::None => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::String(s) | Value::Markup(s) => !s.is_empty(),
        Value::List(l) => !l.is_empty(),
        Value::Map(m) => !m.is_empty(),
        _ => true,
    }
}

/// Compare the two [`Value`] instances with the given [`CompareOp`].
///
/// # Errors
///
/// Returns an [`Error`] if the two types cannot be ordered, or the right
/// side of `in` is not a container.
pub fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, Error> {
    let result = match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        CompareOp::In => contains(right, left)?,
        CompareOp::NotIn => !contains(right, left)?,
        CompareOp::Gt => ordered(op, left, right, |o| o == Ordering::Greater)?,
        CompareOp::Ge => ordered(op, left, right, |o| o != Ordering::Less)?,
        CompareOp::Lt => ordered(op, left, right, |o| o == Ordering::Less)?,
        CompareOp::Le => ordered(op, left, right, |o| o != Ordering::Greater)?,
    };

    Ok(result)
}

/// Order two values and check the result, which is false when the
/// values are unordered (NaN).
fn ordered<F>(op: CompareOp, left: &Value, right: &Value, check: F) -> Result<bool, Error>
where
    F: Fn(Ordering) -> bool,
{
    let order = order(left, right).map_err(|e| {
        e.with_help(format!(
            "`{op}` is not supported between `{}` and `{}`",
            left.kind(),
            right.kind()
        ))
    })?;

    Ok(order.is_some_and(check))
}

/// Order two values.
///
/// Numbers (including booleans) order against each other, strings order
/// against strings, and lists order lexicographically. Returns `None` when
/// a float comparison involves NaN.
///
/// # Errors
///
/// Returns an [`Error`] for any other pair of types.
pub fn order(left: &Value, right: &Value) -> Result<Option<Ordering>, Error> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::String(a) | Value::Markup(a), Value::String(b) | Value::Markup(b)) => {
            Ok(Some(a.cmp(b)))
        }
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match order(x, y)? {
                    Some(Ordering::Equal) => continue,
                    other => return Ok(other),
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        (Value::Undefined, _) | (_, Value::Undefined) => Err(Error::new(
            ErrorKind::Undefined,
            "undefined value cannot be ordered",
        )),
        (a, b) => match (number(a), number(b)) {
            (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
            _ => Err(error_types(format!(
                "types `{}` and `{}` cannot be ordered",
                a.kind(),
                b.kind()
            ))),
        },
    }
}

/// Return true if `container` holds `item`.
///
/// # Errors
///
/// Returns an [`Error`] if the container is not a string, list or map,
/// or a non-string is searched for within a string.
pub fn contains(container: &Value, item: &Value) -> Result<bool, Error> {
    match container {
        Value::String(s) | Value::Markup(s) => match item.as_str() {
            Some(needle) => Ok(s.contains(needle)),
            None => Err(error_types(format!(
                "`in <string>` requires a string on the left, not `{}`",
                item.kind()
            ))),
        },
        Value::List(l) => Ok(l.iter().any(|v| v == item)),
        Value::Map(m) => Ok(match item {
            Value::String(k) | Value::Markup(k) => m.contains_key(&**k),
            Value::Int(_) => m.contains_key(&item.to_string()),
            _ => false,
        }),
        Value::Namespace(n) => Ok(item.as_str().is_some_and(|k| n.get(k).is_some())),
        Value::Undefined => Ok(false),
        other => Err(error_types(format!(
            "argument of type `{}` is not a container",
            other.kind()
        ))),
    }
}

/// Return the value as a number for ordering, treating booleans as integers.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => value.as_float(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{compare, contains, is_truthy, order};
    use crate::{compile::tree::CompareOp, log::ErrorKind, render::Value};
    use serde_json::json;
    use std::cmp::Ordering;

    #[test]
    fn test_truthy() {
        let true_values = vec![
            json!("lorem"),
            json!(12),
            json!(114.4),
            json!(true),
            json!(vec!["lorem", "ipsum"]),
            json!({"lorem": "ipsum"}),
            json!(-1),
        ];
        let false_values = vec![
            json!(""),
            json!(0),
            json!(0.0),
            json!(false),
            json!([]),
            json!({}),
            json!(null),
        ];

        for value in true_values {
            assert!(is_truthy(&Value::from(value)));
        }
        for value in false_values {
            assert!(!is_truthy(&Value::from(value)));
        }
        assert!(!is_truthy(&Value::Undefined));
    }

    #[test]
    fn test_compare_numbers() {
        assert!(compare(CompareOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap());
        assert!(compare(CompareOp::Ge, &Value::Int(2), &Value::Bool(true)).unwrap());
        assert!(!compare(CompareOp::Gt, &Value::Float(f64::NAN), &Value::Int(1)).unwrap());
    }

    #[test]
    fn test_compare_strings() {
        assert!(compare(CompareOp::Lt, &Value::from("apple"), &Value::from("banana")).unwrap());
        assert!(compare(CompareOp::Eq, &Value::from("a"), &Value::from("a")).unwrap());
    }

    #[test]
    fn test_compare_mixed_fails() {
        let error = compare(CompareOp::Lt, &Value::from("1"), &Value::Int(1)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Type);
        assert!(error.help().unwrap().contains("`<`"));
    }

    #[test]
    fn test_mixed_equality_is_false() {
        assert!(compare(CompareOp::Ne, &Value::from("1"), &Value::Int(1)).unwrap());
    }

    #[test]
    fn test_order_lists() {
        let a = Value::from(json!([1, 2, 3]));
        let b = Value::from(json!([1, 3]));
        assert_eq!(order(&a, &b).unwrap(), Some(Ordering::Less));
        assert_eq!(order(&a, &a).unwrap(), Some(Ordering::Equal));
    }

    #[test]
    fn test_contains() {
        assert!(contains(&Value::from("hello"), &Value::from("ell")).unwrap());
        assert!(contains(&Value::from(json!([1, 2])), &Value::Float(2.0)).unwrap());
        assert!(contains(&Value::from(json!({"a": 1})), &Value::from("a")).unwrap());
        assert!(!contains(&Value::Undefined, &Value::from("a")).unwrap());
        assert!(contains(&Value::Int(1), &Value::Int(1)).is_err());
        assert!(contains(&Value::from("1"), &Value::Int(1)).is_err());
    }
}
