//! Contains the `Filter` trait and other types useful for creating and using filters.
//!
//! A filter is any type which implements the [`Filter`][`crate::filter::Filter`] trait.
//! You can assign a filter to an [`Engine`][`crate::Engine`] with the
//! [`add_filter`][`crate::Engine::add_filter()`] method, and it will be available in any
//! [`Template`][`crate::Template`] rendered by that engine.
//!
//! Given this expression:
//!
//! ```text
//! {{ name | replace("a", "o", count=1) | upper }}
//! ```
//!
//! The "name" value is not quoted, and so it is perceived to be a variable and not a
//! literal string. Upon rendering this expression, Kiln will search the
//! [`Store`][`crate::Store`] for "name" and use that value as the input for the first
//! filter in the chain.
//!
//! The pipe "|" denotes that the following identifier is the name of a filter.
//! Kiln will search for a filter with the name of "replace" and execute it with whatever
//! "name" evaluated to, along with the [`Arguments`] given in parentheses. Arguments
//! are either positional, like "a" and "o" above, or named, like `count=1`.
//!
//! Filters are resolved when the template is rendered, not when it is compiled, so
//! a template may use a filter that is registered after it was compiled.
//!
//! # Examples
//!
//! We'll create a filter that reverses the words in a string.
//!
//! You can either create a struct and implement the trait on that, or just create
//! a function matching the trait signature. Kiln will accept both.
//!
//! ```rust
//! use kiln::{
//!     filter::{Arguments, Error},
//!     Engine, Store, Value,
//! };
//!
//! fn reverse_words(value: &Value, _: &Arguments) -> Result<Value, Error> {
//!     match value.as_str() {
//!         Some(text) => Ok(Value::from(
//!             text.split_whitespace().rev().collect::<Vec<_>>().join(" "),
//!         )),
//!         None => Err(Error::build("filter `reverse_words` requires string input")
//!             .with_help("use quotes to coerce data to string")),
//!     }
//! }
//!
//! let engine = Engine::default().with_filter_must("reverse_words", reverse_words);
//! let template = engine.compile("{{ name | reverse_words }}").unwrap();
//! let result = engine.render(&template, &Store::new().with_must("name", "one two"));
//!
//! assert_eq!(result.unwrap(), "two one");
//! ```
//!
//! If you return an [`Error`][`crate::filter::Error`] in your filter without pointing
//! it somewhere yourself, Kiln will automatically generate a visualization that points
//! to the filter.
//!
//! If you were to pass a number to the filter and print the error with `{:#}`,
//! you would see:
//!
//! ```text
//! error: filter `reverse_words` requires string input
//!   --> ?:1:4
//!    |
//!  1 | {{ name | reverse_words }}
//!    |    ^^^^^^^^^^^^^^^^^^^^
//!    |
//!   = help: use quotes to coerce data to string
//! ```
mod builtin;

pub mod visual {
    //! Contains the `Visual` trait and different types which implement `Visual`.
    pub use crate::log::{Pointer, Visual};
}

pub use crate::{
    log::{Error, ErrorKind},
    region::Region,
    render::Value,
};
pub(crate) use builtin::{capitalize, register, text_of, title};

use indexmap::IndexMap;

/// Describes a type which can be used to transform input in an expression.
pub trait Filter: Sync + Send {
    /// Execute the filter with the given input and return a new Value as output.
    fn apply(&self, input: &Value, args: &Arguments) -> Result<Value, Error>;
}

/// Allows assignment of any function matching the signature of `apply` as a `Filter`
/// to `Engine`, instead of requiring a struct be created.
impl<F> Filter for F
where
    F: Fn(&Value, &Arguments) -> Result<Value, Error> + Sync + Send,
{
    fn apply(&self, value: &Value, args: &Arguments) -> Result<Value, Error> {
        self(value, args)
    }
}

/// Arguments given to a filter, test, function or macro at the call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    /// Arguments given without a name, in order.
    pub positional: Vec<Value>,
    /// Arguments given as `name=value`, in order.
    pub named: IndexMap<String, Value>,
}

impl Arguments {
    /// Create a new, empty [`Arguments`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a positional argument.
    ///
    /// Returns the `Arguments`, so additional methods may be chained.
    pub fn with_positional<T>(mut self, value: T) -> Self
    where
        T: Into<Value>,
    {
        self.positional.push(value.into());
        self
    }

    /// Add a named argument.
    ///
    /// Returns the `Arguments`, so additional methods may be chained.
    pub fn with_named<S, T>(mut self, name: S, value: T) -> Self
    where
        S: Into<String>,
        T: Into<Value>,
    {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Return the total number of arguments.
    #[inline]
    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    /// Return true if there are no arguments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the argument at the given position, or with the given name.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.named.get(name))
    }

    /// Return the argument at the given position or with the given name
    /// as a string.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the argument is present but not a string.
    pub fn get_str(&self, index: usize, name: &str) -> Result<Option<&str>, Error> {
        match self.get(index, name) {
            None | Some(Value::Undefined | Value::None) => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| wrong_type(name, "a string", value)),
        }
    }

    /// Return the argument at the given position or with the given name
    /// as an integer.
    ///
    /// Floats are truncated.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the argument is present but not numeric.
    pub fn get_int(&self, index: usize, name: &str) -> Result<Option<i64>, Error> {
        match self.get(index, name) {
            None | Some(Value::Undefined | Value::None) => Ok(None),
            Some(Value::Float(f)) => Ok(Some(f.trunc() as i64)),
            Some(value) => value
                .as_int()
                .map(Some)
                .ok_or_else(|| wrong_type(name, "an integer", value)),
        }
    }

    /// Return the argument at the given position or with the given name
    /// as a float.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the argument is present but not numeric.
    pub fn get_float(&self, index: usize, name: &str) -> Result<Option<f64>, Error> {
        match self.get(index, name) {
            None | Some(Value::Undefined | Value::None) => Ok(None),
            Some(value) => value
                .as_float()
                .map(Some)
                .ok_or_else(|| wrong_type(name, "a number", value)),
        }
    }

    /// Return the truthiness of the argument at the given position or with
    /// the given name.
    pub fn get_bool(&self, index: usize, name: &str) -> Option<bool> {
        self.get(index, name)
            .filter(|v| !v.is_undefined())
            .map(Value::is_truthy)
    }

    /// Check the arguments against a list of accepted parameter names.
    ///
    /// Positional arguments are matched to names in order. The `callee`
    /// text is used in error messages, such as "filter `truncate`".
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if there are more positional arguments than
    /// names, a named argument is not accepted, or an argument is given
    /// both by position and by name.
    pub fn check(&self, callee: &str, names: &[&str]) -> Result<(), Error> {
        if self.positional.len() > names.len() {
            return Err(Error::new(
                ErrorKind::Arguments,
                format!(
                    "{callee} takes at most {} argument{}, {} given",
                    names.len(),
                    if names.len() == 1 { "" } else { "s" },
                    self.positional.len()
                ),
            ));
        }

        for name in self.named.keys() {
            match names.iter().position(|n| n == name) {
                None => {
                    return Err(Error::new(
                        ErrorKind::Arguments,
                        format!("{callee} got an unexpected argument `{name}`"),
                    ))
                }
                Some(index) if index < self.positional.len() => {
                    return Err(Error::new(
                        ErrorKind::Arguments,
                        format!("{callee} got multiple values for argument `{name}`"),
                    ))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

fn wrong_type(name: &str, expected: &str, value: &Value) -> Error {
    Error::new(
        ErrorKind::Type,
        format!(
            "argument `{name}` must be {expected}, not `{}`",
            value.kind()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::Arguments;
    use crate::{engine::Engine, log::Error, render::Value, store::Store};

    #[test]
    fn test_call_chain() {
        let engine = get_test_engine();
        let result = engine.render(
            &engine.compile("{{ name | to_lowercase | left(3) }}").unwrap(),
            &Store::new().with_must("name", "TAYLOR"),
        );

        assert_eq!(result.unwrap(), "tay");
    }

    #[test]
    fn test_call_chain_error() {
        let engine = get_test_engine();
        let result = engine.render(
            &engine.compile("{{ name | to_lowercase | left(\"10\") }}").unwrap(),
            &Store::new().with_must("name", "TAYLOR"),
        );

        let error = result.unwrap_err();
        assert!(error.reason().contains("must be an integer"));
        assert!(error.position().is_some());
    }

    #[test]
    fn test_late_binding() {
        let mut engine = Engine::default();
        let template = engine.compile("{{ 'x' | shout }}").unwrap();
        assert!(engine.render(&template, &Store::new()).is_err());

        engine.add_filter_must("shout", |v: &Value, _: &Arguments| -> Result<Value, Error> {
            Ok(Value::from(format!("{v}!")))
        });
        assert_eq!(engine.render(&template, &Store::new()).unwrap(), "x!");
    }

    #[test]
    fn test_check() {
        let args = Arguments::new().with_positional(1).with_named("b", 2);
        assert!(args.check("filter `f`", &["a", "b"]).is_ok());
        assert!(args.check("filter `f`", &["a"]).is_err());
        assert!(args.check("filter `f`", &[]).is_err());

        let twice = Arguments::new().with_positional(1).with_named("a", 2);
        let error = twice.check("filter `f`", &["a"]).unwrap_err();
        assert!(error.reason().contains("multiple values"));
    }

    #[test]
    fn test_get() {
        let args = Arguments::new().with_positional("x").with_named("width", 3.7);
        assert_eq!(args.get_str(0, "text").unwrap(), Some("x"));
        assert_eq!(args.get_int(1, "width").unwrap(), Some(3));
        assert!(args.get_int(0, "text").is_err());
        assert_eq!(args.get_bool(2, "missing"), None);
    }

    /// Return a new Engine equipped with test filters.
    fn get_test_engine() -> Engine {
        Engine::default()
            .with_filter_must("to_lowercase", to_lowercase)
            .with_filter_must("left", left)
    }

    /// Lowercase the given value.
    ///
    /// # Errors
    ///
    /// Returns an Error if the Value is not a string.
    fn to_lowercase(value: &Value, _: &Arguments) -> Result<Value, Error> {
        match value.as_str() {
            Some(text) => Ok(Value::from(text.to_lowercase())),
            _ => Err(Error::build("filter `to_lowercase` requires string input")),
        }
    }

    /// Return the first n characters of the input Value from the left,
    /// where n is the value of the argument.
    ///
    /// Similar to TSQL `LEFT`.
    fn left(value: &Value, args: &Arguments) -> Result<Value, Error> {
        args.check("filter `left`", &["n"])?;
        let n = args.get_int(0, "n")?.unwrap_or(0).max(0) as usize;
        match value.as_str() {
            Some(text) => Ok(Value::from(text.chars().take(n).collect::<String>())),
            None => Err(Error::build("filter `left` expects string input")),
        }
    }
}
