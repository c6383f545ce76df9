//! Contains the `Function` trait and the globals available in every engine.
//!
//! A function is called by name from an expression, `{{ range(3) }}`.
//! Functions are looked up when they are called, after variables and
//! globals, so a variable with the same name hides a function.
//!
//! # Examples
//!
//! ```rust
//! use kiln::{
//!     filter::{Arguments, Error},
//!     Engine, Store, Value,
//! };
//!
//! fn answer(_: &Arguments) -> Result<Value, Error> {
//!     Ok(Value::Int(42))
//! }
//!
//! let engine = Engine::default().with_function_must("answer", answer);
//! let template = engine.compile("{{ answer() }}").unwrap();
//!
//! assert_eq!(engine.render(&template, &Store::new()).unwrap(), "42");
//! ```
use crate::{
    filter::Arguments,
    i18n::Translator,
    log::{Error, ErrorKind},
    render::{
        operator::format,
        value::{Namespace, Object},
        Value,
    },
};
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

/// Largest number of items `range` produces.
pub const MAX_RANGE: i64 = 1_000_000;

/// Describes a type which can be called by name from a template.
pub trait Function: Sync + Send {
    /// Call the function with the given arguments.
    fn call(&self, args: &Arguments) -> Result<Value, Error>;
}

/// Allows assignment of any function matching the signature of `call` as a
/// `Function` to `Engine`, instead of requiring a struct be created.
impl<F> Function for F
where
    F: Fn(&Arguments) -> Result<Value, Error> + Sync + Send,
{
    fn call(&self, args: &Arguments) -> Result<Value, Error> {
        self(args)
    }
}

/// Add every builtin function to the given registry, with the gettext
/// family bound to the given [`Translator`].
pub(crate) fn register(
    functions: &mut HashMap<String, Box<dyn Function>>,
    translator: Arc<dyn Translator>,
) {
    let builtins: [(&str, fn(&Arguments) -> Result<Value, Error>); 6] = [
        ("range", range),
        ("dict", dict),
        ("namespace", namespace),
        ("cycler", cycler),
        ("joiner", joiner),
        ("lipsum", lipsum),
    ];

    for (name, function) in builtins {
        functions.insert(name.to_string(), Box::new(function));
    }
    register_gettext(functions, translator);
}

/// Bind the gettext family of functions to the given [`Translator`].
pub(crate) fn register_gettext(
    functions: &mut HashMap<String, Box<dyn Function>>,
    translator: Arc<dyn Translator>,
) {
    let gettext = Gettext {
        translator: translator.clone(),
    };
    functions.insert("_".to_string(), Box::new(gettext.clone()));
    functions.insert("gettext".to_string(), Box::new(gettext));
    functions.insert(
        "ngettext".to_string(),
        Box::new(Ngettext {
            translator: translator.clone(),
        }),
    );
    functions.insert("pgettext".to_string(), Box::new(Pgettext { translator }));
}

fn int_arg(args: &Arguments, index: usize, name: &str) -> Result<Option<i64>, Error> {
    match args.positional.get(index) {
        Some(Value::Float(_)) => Err(Error::new(
            ErrorKind::Type,
            format!("argument `{name}` of `range` must be an integer, not `float`"),
        )),
        _ => args.get_int(index, name),
    }
}

fn range(args: &Arguments) -> Result<Value, Error> {
    args.check("function `range`", &["start", "stop", "step"])?;
    let (start, stop) = match args.positional.len() {
        0 | 1 => (0, int_arg(args, 0, "stop")?),
        _ => (int_arg(args, 0, "start")?.unwrap_or(0), int_arg(args, 1, "stop")?),
    };
    let Some(stop) = stop else {
        return Err(Error::new(
            ErrorKind::Arguments,
            "function `range` requires at least one argument",
        ));
    };
    let step = int_arg(args, 2, "step")?.unwrap_or(1);
    if step == 0 {
        return Err(Error::new(
            ErrorKind::Arguments,
            "argument `step` of `range` must not be zero",
        ));
    }

    let span = match step > 0 {
        true => stop.saturating_sub(start),
        false => start.saturating_sub(stop),
    };
    let count = match span > 0 {
        true => (span - 1) / step.saturating_abs() + 1,
        false => 0,
    };
    if count > MAX_RANGE {
        return Err(Error::new(
            ErrorKind::Security,
            format!("range of {count} items is larger than the limit of {MAX_RANGE}"),
        ));
    }

    Ok(Value::from(
        (0..count)
            .map(|i| Value::Int(start + i * step))
            .collect::<Vec<_>>(),
    ))
}

fn dict(args: &Arguments) -> Result<Value, Error> {
    let mut map = IndexMap::new();
    for value in &args.positional {
        match value.as_map() {
            Some(pairs) => map.extend(pairs.iter().map(|(k, v)| (k.clone(), v.clone()))),
            None => {
                return Err(Error::new(
                    ErrorKind::Type,
                    format!("function `dict` requires a map, not `{}`", value.kind()),
                ))
            }
        }
    }
    map.extend(args.named.iter().map(|(k, v)| (k.clone(), v.clone())));

    Ok(Value::from(map))
}

fn namespace(args: &Arguments) -> Result<Value, Error> {
    let Value::Map(attrs) = dict(args)? else {
        return Ok(Value::Namespace(Arc::default()));
    };

    Ok(Value::Namespace(Arc::new(Namespace::new(
        attrs.as_ref().clone(),
    ))))
}

/// Cycles through a set of values with `next()`.
#[derive(Debug)]
struct Cycler {
    items: Vec<Value>,
    position: Mutex<usize>,
}

impl Object for Cycler {
    fn type_name(&self) -> &str {
        "cycler"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "current" => {
                let position = *self.position.lock().unwrap_or_else(PoisonError::into_inner);
                self.items.get(position).cloned()
            }
            _ => None,
        }
    }

    fn call_method(&self, name: &str, args: &Arguments) -> Result<Value, Error> {
        args.check(&format!("method `{name}`"), &[])?;
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        match name {
            "next" => {
                let current = self.items.get(*position).cloned().unwrap_or_default();
                *position = (*position + 1) % self.items.len().max(1);
                Ok(current)
            }
            "reset" => {
                *position = 0;
                Ok(Value::None)
            }
            _ => Err(Error::build(format!("`cycler` object has no method `{name}`"))),
        }
    }
}

fn cycler(args: &Arguments) -> Result<Value, Error> {
    if args.positional.is_empty() {
        return Err(Error::new(
            ErrorKind::Arguments,
            "function `cycler` requires at least one item",
        ));
    }

    Ok(Value::Object(Arc::new(Cycler {
        items: args.positional.clone(),
        position: Mutex::new(0),
    })))
}

/// Returns an empty string the first time it is called, and the separator
/// every time after.
#[derive(Debug)]
struct Joiner {
    separator: Value,
    used: Mutex<bool>,
}

impl Object for Joiner {
    fn type_name(&self) -> &str {
        "joiner"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: &Arguments) -> Result<Value, Error> {
        args.check("joiner", &[])?;
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *used, true) {
            true => Ok(self.separator.clone()),
            false => Ok(Value::from("")),
        }
    }
}

fn joiner(args: &Arguments) -> Result<Value, Error> {
    args.check("function `joiner`", &["sep"])?;
    let separator = args
        .get(0, "sep")
        .cloned()
        .unwrap_or_else(|| Value::from(", "));

    Ok(Value::Object(Arc::new(Joiner {
        separator,
        used: Mutex::new(false),
    })))
}

const LOREM: [&str; 64] = [
    "a", "ac", "accumsan", "ad", "adipiscing", "aenean", "aliquam", "amet", "ante", "aptent",
    "arcu", "at", "auctor", "augue", "bibendum", "blandit", "class", "commodo", "condimentum",
    "congue", "consectetuer", "consequat", "conubia", "convallis", "cras", "cubilia", "curae",
    "cursus", "dapibus", "diam", "dictum", "dignissim", "dis", "dolor", "donec", "dui", "duis",
    "egestas", "eget", "eleifend", "elementum", "elit", "enim", "erat", "eros", "est", "et",
    "etiam", "eu", "euismod", "facilisi", "fames", "faucibus", "felis", "fermentum", "feugiat",
    "fringilla", "fusce", "gravida", "habitant", "hendrerit", "iaculis", "id", "ipsum",
];

/// A small linear congruential generator, so the same arguments always
/// produce the same text.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound.max(1)
    }

    fn between(&mut self, low: usize, high: usize) -> usize {
        low + self.next(high.saturating_sub(low) + 1)
    }
}

fn lipsum(args: &Arguments) -> Result<Value, Error> {
    args.check("function `lipsum`", &["n", "html", "min", "max"])?;
    let n = args.get_int(0, "n")?.unwrap_or(5).clamp(0, 100) as usize;
    let html = args.get_bool(1, "html").unwrap_or(true);
    let min = args.get_int(2, "min")?.unwrap_or(20).clamp(1, 1000) as usize;
    let max = (args.get_int(3, "max")?.unwrap_or(100).clamp(1, 1000) as usize).max(min);

    let mut rng = Lcg(0x2545_F491_4F6C_DD1D);
    let mut paragraphs = Vec::with_capacity(n);
    for _ in 0..n {
        let mut paragraph = String::new();
        let mut capitalize = true;
        let mut since_comma = 0;
        let mut since_period = 0;
        let words = rng.between(min, max);
        let mut last = usize::MAX;
        for i in 0..words {
            let mut index = rng.next(LOREM.len());
            if index == last {
                index = (index + 1) % LOREM.len();
            }
            last = index;
            let word = LOREM[index];

            if i > 0 {
                paragraph.push(' ');
            }
            if capitalize {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    paragraph.extend(first.to_uppercase());
                    paragraph.push_str(chars.as_str());
                }
                capitalize = false;
            } else {
                paragraph.push_str(word);
            }

            since_comma += 1;
            since_period += 1;
            if since_comma > rng.between(3, 8) {
                paragraph.push(',');
                since_comma = 0;
            }
            if since_period > rng.between(10, 20) {
                paragraph.push('.');
                since_comma = 0;
                since_period = 0;
                capitalize = true;
            }
        }
        if paragraph.ends_with(',') {
            paragraph.pop();
        }
        if !paragraph.ends_with('.') {
            paragraph.push('.');
        }
        paragraphs.push(paragraph);
    }

    Ok(match html {
        true => Value::markup(
            paragraphs
                .iter()
                .map(|p| format!("<p>{p}</p>"))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        false => Value::from(paragraphs.join("\n\n")),
    })
}

/// Apply `%(name)s` variables to a translated message.
fn interpolate(message: String, vars: &IndexMap<String, Value>) -> Result<Value, Error> {
    match vars.is_empty() || !message.contains('%') {
        true => Ok(Value::from(message)),
        false => Ok(Value::from(format(&message, &Value::from(vars.clone()), false)?)),
    }
}

fn message_arg<'a>(args: &'a Arguments, index: usize, callee: &str) -> Result<&'a str, Error> {
    match args.positional.get(index) {
        Some(value) => value.as_str().ok_or_else(|| {
            Error::new(
                ErrorKind::Type,
                format!("{callee} requires string messages, not `{}`", value.kind()),
            )
        }),
        None => Err(Error::new(
            ErrorKind::Arguments,
            format!("{callee} is missing a message"),
        )),
    }
}

/// `gettext(message, **vars)`, also available as `_`.
#[derive(Clone)]
struct Gettext {
    translator: Arc<dyn Translator>,
}

impl Function for Gettext {
    fn call(&self, args: &Arguments) -> Result<Value, Error> {
        if args.positional.len() > 1 {
            return Err(Error::new(
                ErrorKind::Arguments,
                "function `gettext` takes one message",
            ));
        }
        let message = message_arg(args, 0, "function `gettext`")?;
        interpolate(self.translator.gettext(message), &args.named)
    }
}

/// `ngettext(singular, plural, n, **vars)`, where `num` is bound to `n`.
struct Ngettext {
    translator: Arc<dyn Translator>,
}

impl Function for Ngettext {
    fn call(&self, args: &Arguments) -> Result<Value, Error> {
        let singular = message_arg(args, 0, "function `ngettext`")?;
        let plural = message_arg(args, 1, "function `ngettext`")?;
        let Some(n) = args.get_int(2, "n")? else {
            return Err(Error::new(
                ErrorKind::Arguments,
                "function `ngettext` requires a count",
            ));
        };

        let mut vars = IndexMap::new();
        vars.insert("num".to_string(), Value::Int(n));
        vars.extend(
            args.named
                .iter()
                .filter(|(k, _)| k.as_str() != "n")
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        interpolate(self.translator.ngettext(singular, plural, n), &vars)
    }
}

/// `pgettext(context, message, **vars)`.
struct Pgettext {
    translator: Arc<dyn Translator>,
}

impl Function for Pgettext {
    fn call(&self, args: &Arguments) -> Result<Value, Error> {
        let context = message_arg(args, 0, "function `pgettext`")?;
        let message = message_arg(args, 1, "function `pgettext`")?;
        interpolate(self.translator.pgettext(context, message), &args.named)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::{Catalog, Identity};
    use serde_json::json;

    #[test]
    fn test_range() {
        let one = Arguments::new().with_positional(3);
        assert_eq!(range(&one).unwrap(), Value::from(json!([0, 1, 2])));

        let stepped = Arguments::new()
            .with_positional(10)
            .with_positional(0)
            .with_positional(-3);
        assert_eq!(range(&stepped).unwrap(), Value::from(json!([10, 7, 4, 1])));

        let empty = Arguments::new().with_positional(5).with_positional(2);
        assert_eq!(range(&empty).unwrap(), Value::from(json!([])));

        let zero = Arguments::new().with_positional(0).with_positional(5).with_positional(0);
        assert!(range(&zero).is_err());
        assert!(range(&Arguments::new().with_positional(i64::MAX)).is_err());
    }

    #[test]
    fn test_dict_and_namespace() {
        let args = Arguments::new().with_named("a", 1).with_named("b", "x");
        assert_eq!(dict(&args).unwrap(), Value::from(json!({"a": 1, "b": "x"})));

        let ns = namespace(&args).unwrap();
        assert_eq!(ns.get_attr("b"), Value::from("x"));
    }

    #[test]
    fn test_cycler() {
        let cycle = cycler(&Arguments::new().with_positional("odd").with_positional("even")).unwrap();
        let Value::Object(cycle) = cycle else {
            panic!("expected object");
        };
        let none = Arguments::new();

        assert_eq!(cycle.call_method("next", &none).unwrap(), Value::from("odd"));
        assert_eq!(cycle.get_attr("current"), Some(Value::from("even")));
        assert_eq!(cycle.call_method("next", &none).unwrap(), Value::from("even"));
        assert_eq!(cycle.call_method("next", &none).unwrap(), Value::from("odd"));
        cycle.call_method("reset", &none).unwrap();
        assert_eq!(cycle.get_attr("current"), Some(Value::from("odd")));
    }

    #[test]
    fn test_joiner() {
        let Value::Object(join) = joiner(&Arguments::new().with_positional("|")).unwrap() else {
            panic!("expected object");
        };
        let none = Arguments::new();

        assert_eq!(join.call(&none).unwrap(), Value::from(""));
        assert_eq!(join.call(&none).unwrap(), Value::from("|"));
        assert_eq!(join.call(&none).unwrap(), Value::from("|"));
    }

    #[test]
    fn test_lipsum_is_deterministic() {
        let args = Arguments::new().with_positional(2).with_positional(false);
        let first = lipsum(&args).unwrap();
        assert_eq!(first, lipsum(&args).unwrap());

        let text = first.to_string();
        assert_eq!(text.split("\n\n").count(), 2);
        assert!(text.ends_with('.'));
        assert!(lipsum(&Arguments::new()).unwrap().is_markup());
    }

    #[test]
    fn test_gettext() {
        let mut functions: HashMap<String, Box<dyn Function>> = HashMap::new();
        let catalog = Catalog::new()
            .with_message("Hello %(name)s", "Hallo %(name)s")
            .with_plural("%(num)d apple", ["%(num)d Apfel", "%(num)d Äpfel"]);
        register_gettext(&mut functions, Arc::new(catalog));

        let hello = Arguments::new()
            .with_positional("Hello %(name)s")
            .with_named("name", "Ana");
        assert_eq!(functions["_"].call(&hello).unwrap(), Value::from("Hallo Ana"));

        let apples = Arguments::new()
            .with_positional("%(num)d apple")
            .with_positional("%(num)d apples")
            .with_positional(3);
        assert_eq!(functions["ngettext"].call(&apples).unwrap(), Value::from("3 Äpfel"));
    }

    #[test]
    fn test_pgettext_identity() {
        let mut functions: HashMap<String, Box<dyn Function>> = HashMap::new();
        register_gettext(&mut functions, Arc::new(Identity));

        let args = Arguments::new().with_positional("menu").with_positional("Open");
        assert_eq!(functions["pgettext"].call(&args).unwrap(), Value::from("Open"));
    }
}
