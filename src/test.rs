//! Contains the `Test` trait and the tests available in every engine.
//!
//! A test is used with the `is` operator, and answers a yes or no question
//! about a value:
//!
//! ```text
//! {% if count is divisibleby(3) %}...{% endif %}
//! {% if user is not defined %}...{% endif %}
//! ```
//!
//! You can assign a test to an [`Engine`][`crate::Engine`] with the
//! [`add_test`][`crate::Engine::add_test()`] method.
//!
//! # Examples
//!
//! ```rust
//! use kiln::{
//!     filter::{Arguments, Error},
//!     Engine, Store, Value,
//! };
//!
//! fn short(value: &Value, _: &Arguments) -> Result<bool, Error> {
//!     Ok(value.len().is_some_and(|len| len < 4))
//! }
//!
//! let engine = Engine::default().with_test_must("short", short);
//! let template = engine.compile("{{ name is short }}").unwrap();
//! let result = engine.render(&template, &Store::new().with_must("name", "Ana"));
//!
//! assert_eq!(result.unwrap(), "True");
//! ```
use crate::{
    compile::tree::CompareOp,
    filter::Arguments,
    log::{error_types, Error, ErrorKind},
    render::{
        compare::{compare, contains},
        Value,
    },
};
use std::{collections::HashMap, sync::Arc};

/// Describes a type which can be used with the `is` operator.
pub trait Test: Sync + Send {
    /// Return true if the value passes the test.
    fn test(&self, value: &Value, args: &Arguments) -> Result<bool, Error>;
}

/// Allows assignment of any function matching the signature of `test` as a
/// `Test` to `Engine`, instead of requiring a struct be created.
impl<F> Test for F
where
    F: Fn(&Value, &Arguments) -> Result<bool, Error> + Sync + Send,
{
    fn test(&self, value: &Value, args: &Arguments) -> Result<bool, Error> {
        self(value, args)
    }
}

/// Add every builtin test to the given registry.
///
/// `filter` and `test`, which ask whether a name is registered, are
/// answered by the renderer.
pub(crate) fn register(tests: &mut HashMap<String, Box<dyn Test>>) {
    let builtins: [(&str, fn(&Value, &Arguments) -> Result<bool, Error>); 37] = [
        ("boolean", boolean),
        ("callable", callable),
        ("defined", defined),
        ("divisibleby", divisibleby),
        ("eq", eq),
        ("equalto", eq),
        ("==", eq),
        ("escaped", escaped),
        ("even", even),
        ("false", is_false),
        ("float", float),
        ("ge", ge),
        (">=", ge),
        ("gt", gt),
        ("greaterthan", gt),
        (">", gt),
        ("in", is_in),
        ("integer", integer),
        ("iterable", iterable),
        ("le", le),
        ("<=", le),
        ("lower", lower),
        ("lt", lt),
        ("lessthan", lt),
        ("<", lt),
        ("mapping", mapping),
        ("ne", ne),
        ("!=", ne),
        ("none", none),
        ("number", number),
        ("odd", odd),
        ("sameas", sameas),
        ("sequence", sequence),
        ("string", string),
        ("true", is_true),
        ("undefined", undefined),
        ("upper", upper),
    ];

    for (name, test) in builtins {
        tests.insert(name.to_string(), Box::new(test));
    }
}

/// Return the single operand a comparison test is called with.
fn operand<'a>(name: &str, args: &'a Arguments) -> Result<&'a Value, Error> {
    args.check(&format!("test `{name}`"), &["other"])?;
    args.get(0, "other").ok_or_else(|| {
        Error::new(
            ErrorKind::Arguments,
            format!("test `{name}` requires a value to compare with"),
        )
    })
}

fn boolean(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(value, Value::Bool(_)))
}

fn callable(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(value.is_callable())
}

fn defined(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(!value.is_undefined())
}

fn undefined(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(value.is_undefined())
}

fn divisibleby(value: &Value, args: &Arguments) -> Result<bool, Error> {
    args.check("test `divisibleby`", &["num"])?;
    let Some(divisor) = args.get_int(0, "num")? else {
        return Err(error_types("test `divisibleby` requires a divisor"));
    };
    if divisor == 0 {
        return Err(Error::new(
            ErrorKind::ZeroDivision,
            "integer division or modulo by zero",
        ));
    }

    match value {
        Value::Float(f) => Ok(f % divisor as f64 == 0.0),
        value => match value.as_int() {
            Some(i) => Ok(i.rem_euclid(divisor) == 0),
            None => Err(error_types(format!(
                "test `divisibleby` requires a number, not `{}`",
                value.kind()
            ))),
        },
    }
}

fn eq(value: &Value, args: &Arguments) -> Result<bool, Error> {
    compare(CompareOp::Eq, value, operand("eq", args)?)
}

fn ne(value: &Value, args: &Arguments) -> Result<bool, Error> {
    compare(CompareOp::Ne, value, operand("ne", args)?)
}

fn ge(value: &Value, args: &Arguments) -> Result<bool, Error> {
    compare(CompareOp::Ge, value, operand("ge", args)?)
}

fn gt(value: &Value, args: &Arguments) -> Result<bool, Error> {
    compare(CompareOp::Gt, value, operand("gt", args)?)
}

fn le(value: &Value, args: &Arguments) -> Result<bool, Error> {
    compare(CompareOp::Le, value, operand("le", args)?)
}

fn lt(value: &Value, args: &Arguments) -> Result<bool, Error> {
    compare(CompareOp::Lt, value, operand("lt", args)?)
}

fn is_in(value: &Value, args: &Arguments) -> Result<bool, Error> {
    args.check("test `in`", &["seq"])?;
    match args.get(0, "seq") {
        Some(seq) => contains(seq, value),
        None => Err(error_types("test `in` requires a container")),
    }
}

fn escaped(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(value.is_markup())
}

fn even(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(value, Value::Int(i) if i % 2 == 0))
}

fn odd(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(value, Value::Int(i) if i % 2 != 0))
}

fn is_false(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(value, Value::Bool(false)))
}

fn is_true(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(value, Value::Bool(true)))
}

fn float(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(value, Value::Float(_)))
}

fn integer(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(value, Value::Int(_)))
}

fn number(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(value.is_number())
}

fn none(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(value.is_none())
}

fn iterable(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(!value.is_undefined() && value.try_iter().is_some())
}

fn mapping(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(value, Value::Map(_) | Value::Namespace(_)))
}

fn sequence(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(
        value,
        Value::List(_) | Value::Map(_) | Value::String(_) | Value::Markup(_)
    ))
}

fn string(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(matches!(value, Value::String(_) | Value::Markup(_)))
}

fn lower(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(value
        .as_str()
        .is_some_and(|s| s.chars().any(char::is_alphabetic) && s.to_lowercase() == s))
}

fn upper(value: &Value, _: &Arguments) -> Result<bool, Error> {
    Ok(value
        .as_str()
        .is_some_and(|s| s.chars().any(char::is_alphabetic) && s.to_uppercase() == s))
}

/// True when both sides are the same object, or equal scalars of the
/// same type.
fn sameas(value: &Value, args: &Arguments) -> Result<bool, Error> {
    let other = operand("sameas", args)?;
    Ok(match (value, other) {
        (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
        (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
        (Value::Undefined, Value::Undefined) | (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (a @ (Value::Namespace(_) | Value::Macro(_) | Value::Object(_)), b) => a == b,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with(value: impl Into<Value>) -> Arguments {
        Arguments::new().with_positional(value)
    }

    #[test]
    fn test_divisibleby() {
        assert!(divisibleby(&Value::Int(9), &with(3)).unwrap());
        assert!(!divisibleby(&Value::Int(10), &with(3)).unwrap());
        assert!(divisibleby(&Value::Int(1), &with(0)).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert!(eq(&Value::Int(1), &with(1.0)).unwrap());
        assert!(gt(&Value::Int(2), &with(1)).unwrap());
        assert!(!lt(&Value::from("b"), &with("a")).unwrap());
        assert!(lt(&Value::Int(1), &with("a")).is_err());
        assert!(eq(&Value::Int(1), &Arguments::new()).is_err());
    }

    #[test]
    fn test_in() {
        let list = Value::from(json!([1, 2]));
        assert!(is_in(&Value::Int(2), &with(list.clone())).unwrap());
        assert!(!is_in(&Value::Int(3), &with(list)).unwrap());
        assert!(is_in(&Value::from("ell"), &with("hello")).unwrap());
    }

    #[test]
    fn test_types() {
        let none = Arguments::new();
        assert!(boolean(&Value::Bool(true), &none).unwrap());
        assert!(!number(&Value::Bool(true), &none).unwrap());
        assert!(integer(&Value::Int(1), &none).unwrap());
        assert!(!integer(&Value::Float(1.0), &none).unwrap());
        assert!(mapping(&Value::from(json!({})), &none).unwrap());
        assert!(sequence(&Value::from("abc"), &none).unwrap());
        assert!(iterable(&Value::from(json!([])), &none).unwrap());
        assert!(!iterable(&Value::Int(1), &none).unwrap());
        assert!(escaped(&Value::markup("x"), &none).unwrap());
    }

    #[test]
    fn test_case() {
        let none = Arguments::new();
        assert!(lower(&Value::from("abc 1"), &none).unwrap());
        assert!(!lower(&Value::from("Abc"), &none).unwrap());
        assert!(upper(&Value::from("ABC"), &none).unwrap());
        assert!(!upper(&Value::from("123"), &none).unwrap());
    }

    #[test]
    fn test_sameas() {
        let list = Value::from(json!([1]));
        assert!(sameas(&list, &with(list.clone())).unwrap());
        assert!(!sameas(&list, &with(Value::from(json!([1])))).unwrap());
        assert!(sameas(&Value::None, &with(Value::None)).unwrap());
        assert!(!sameas(&Value::Int(1), &with(true)).unwrap());
    }

    #[test]
    fn test_even_odd() {
        assert!(even(&Value::Int(-4), &Arguments::new()).unwrap());
        assert!(odd(&Value::Int(3), &Arguments::new()).unwrap());
        assert!(!odd(&Value::from("3"), &Arguments::new()).unwrap());
    }

    #[test]
    fn test_register() {
        let mut tests = HashMap::new();
        register(&mut tests);
        assert!(tests.contains_key("divisibleby"));
        assert!(tests.contains_key("undefined"));
        assert!(!tests.contains_key("filter"));
    }
}
