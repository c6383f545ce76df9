//! The runtime value model.
//!
//! Data given to a render through a [`Store`][`crate::Store`] is converted
//! into [`Value`] once, so every filter, test and operator works on the same
//! closed set of types.
use crate::{
    compile::{tree, Template},
    filter::Arguments,
    log::Error,
    render::{compare::is_truthy, pipe::escape},
};
use indexmap::IndexMap;
use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult, Write},
    sync::{Arc, Mutex, PoisonError},
};

/// A value produced while rendering a template.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The result of looking up a name or attribute that does not exist.
    #[default]
    Undefined,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    /// A string that is safe to write without escaping.
    Markup(Arc<str>),
    /// Lists and tuples.
    List(Arc<Vec<Value>>),
    /// Insertion ordered map with string keys.
    Map(Arc<IndexMap<String, Value>>),
    /// A mutable attribute bag created by `namespace()`.
    Namespace(Arc<Namespace>),
    Macro(Arc<MacroRef>),
    /// A global function, resolved by name when called.
    Function(Arc<str>),
    /// The `loop` variable inside of a `for` statement.
    Loop(Arc<Loop>),
    /// A block that can be called to render it, from `super()` or `self.name()`.
    Block(Arc<BlockRef>),
    /// The `self` variable, which exposes the blocks of the rendering template.
    SelfRef,
    /// A host object, such as a cycler or joiner.
    Object(Arc<dyn Object>),
}

impl Value {
    /// Create a new [`Value::Markup`].
    pub fn markup<T>(text: T) -> Self
    where
        T: Into<Arc<str>>,
    {
        Value::Markup(text.into())
    }

    /// Create a new [`Value::Map`] from the given pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(Arc::new(
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Return a short name for the type of the value, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::None => "none",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Markup(_) => "markup",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Namespace(_) => "namespace",
            Value::Macro(_) => "macro",
            Value::Function(_) => "function",
            Value::Loop(_) => "loop",
            Value::Block(_) => "block",
            Value::SelfRef => "template",
            Value::Object(_) => "object",
        }
    }

    /// Return true if the value is truthy.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        is_truthy(self)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    #[inline]
    pub fn is_markup(&self) -> bool {
        matches!(self, Value::Markup(_))
    }

    /// Return true for integers and floats, but not booleans.
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Return true if the value can be called.
    pub fn is_callable(&self) -> bool {
        match self {
            Value::Macro(_) | Value::Function(_) | Value::Block(_) => true,
            Value::Loop(l) => l.recurse.is_some(),
            Value::Object(o) => o.is_callable(),
            _ => false,
        }
    }

    /// Return the text of a string or markup value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Markup(s) => Some(s),
            _ => None,
        }
    }

    /// Return the value as an integer, if it is an integer or boolean.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Return the value as a float, if it is numeric.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    /// Return the items of a list value.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Return the entries of a map value.
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Return the number of items in the value, if it has a length.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) | Value::Markup(s) => Some(s.chars().count()),
            Value::List(l) => Some(l.len()),
            Value::Map(m) => Some(m.len()),
            Value::Namespace(n) => Some(n.to_map().len()),
            Value::Object(o) => o.try_iter().map(|items| items.len()),
            _ => None,
        }
    }

    /// Return the items produced by iterating over the value.
    ///
    /// Maps produce their keys, strings produce their characters, and
    /// undefined produces nothing. Returns `None` for values that cannot
    /// be iterated.
    pub fn try_iter(&self) -> Option<Vec<Value>> {
        let items = match self {
            Value::Undefined => vec![],
            Value::List(l) => l.to_vec(),
            Value::Map(m) => m.keys().map(|k| Value::from(k.as_str())).collect(),
            Value::String(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
            Value::Markup(s) => s.chars().map(|c| Value::markup(c.to_string())).collect(),
            Value::Namespace(n) => n.to_map().keys().map(|k| Value::from(k.as_str())).collect(),
            Value::Object(o) => return o.try_iter(),
            _ => return None,
        };

        Some(items)
    }

    /// Look up an attribute.
    ///
    /// Falls back to item lookup, so `map.key` and `map["key"]` agree.
    pub fn get_attr(&self, name: &str) -> Value {
        match self {
            Value::Map(m) => m.get(name).cloned().unwrap_or_default(),
            Value::Namespace(n) => n.get(name).unwrap_or_default(),
            Value::Loop(l) => l.get(name),
            Value::Object(o) => o.get_attr(name).unwrap_or_default(),
            Value::Block(b) => match name {
                "name" => Value::from(b.name.as_str()),
                _ => Value::Undefined,
            },
            Value::SelfRef => Value::Block(Arc::new(BlockRef {
                name: name.to_string(),
                index: 0,
            })),
            Value::Macro(m) => match name {
                "name" => Value::from(m.node.name.as_str()),
                "arguments" => Value::from(
                    m.node
                        .params
                        .positional
                        .iter()
                        .map(|p| Value::from(p.name.as_str()))
                        .collect::<Vec<_>>(),
                ),
                "caller" => Value::Bool(m.node.uses_caller),
                "catch_varargs" => Value::Bool(m.node.uses_varargs),
                "catch_kwargs" => Value::Bool(m.node.uses_kwargs),
                _ => Value::Undefined,
            },
            Value::List(_) | Value::String(_) | Value::Markup(_) => match name.parse::<i64>() {
                Ok(index) => self.get_item(&Value::Int(index)),
                Err(_) => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    /// Look up an item by key or index.
    ///
    /// Negative indices count from the end. Falls back to attribute lookup
    /// for string keys.
    pub fn get_item(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::List(l), key) => match key.as_int() {
                Some(index) => resolve_index(index, l.len())
                    .and_then(|i| l.get(i))
                    .cloned()
                    .unwrap_or_default(),
                None => Value::Undefined,
            },
            (Value::String(s) | Value::Markup(s), key) => match key.as_int() {
                Some(index) => {
                    let count = s.chars().count();
                    match resolve_index(index, count).and_then(|i| s.chars().nth(i)) {
                        Some(c) => Value::from(c.to_string()),
                        None => Value::Undefined,
                    }
                }
                None => Value::Undefined,
            },
            (Value::Map(m), Value::String(k) | Value::Markup(k)) => {
                m.get(&**k).cloned().unwrap_or_default()
            }
            (Value::Map(m), Value::Int(_) | Value::Bool(_) | Value::Float(_)) => {
                m.get(&key.to_string()).cloned().unwrap_or_default()
            }
            (Value::Object(o), Value::Int(index)) => o
                .try_iter()
                .and_then(|items| {
                    resolve_index(*index, items.len()).and_then(|i| items.into_iter().nth(i))
                })
                .unwrap_or_default(),
            (_, Value::String(k)) => self.get_attr(k),
            _ => Value::Undefined,
        }
    }

    /// Follow a dotted attribute path, such as `user.address.city`.
    ///
    /// Numeric segments index into lists.
    pub fn get_path(&self, path: &str) -> Value {
        let mut current = self.clone();
        for segment in path.split('.') {
            current = match segment.parse::<i64>() {
                Ok(index) if current.as_list().is_some() => current.get_item(&Value::Int(index)),
                _ => current.get_item(&Value::from(segment)),
            };
            if current.is_undefined() {
                break;
            }
        }

        current
    }

    /// Return the value rendered for output, escaped when `autoescape` is set.
    pub fn to_output(&self, autoescape: bool) -> String {
        match self {
            Value::Markup(s) => s.to_string(),
            value if autoescape => escape(&value.to_string()),
            value => value.to_string(),
        }
    }

    /// Convert the value into markup, escaping it unless it is already safe.
    pub fn to_markup(&self) -> Value {
        match self {
            Value::Markup(_) => self.clone(),
            value => Value::markup(escape(&value.to_string())),
        }
    }

    /// Convert the value into a [`serde_json::Value`].
    ///
    /// Values with no data representation, such as macros, become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) | Value::Markup(s) => Json::String(s.to_string()),
            Value::List(l) => Json::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => Json::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Namespace(n) => Value::Map(Arc::new(n.to_map())).to_json(),
            _ => Json::Null,
        }
    }

    /// Write the value the way it would appear inside of a list.
    ///
    /// Strings are quoted, everything else uses [`Display`].
    pub fn write_repr(&self, f: &mut impl Write) -> FmtResult {
        match self {
            Value::String(s) | Value::Markup(s) => {
                let quote = match s.contains('\'') && !s.contains('"') {
                    true => '"',
                    false => '\'',
                };
                f.write_char(quote)?;
                for c in s.chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c if c == quote => {
                            f.write_char('\\')?;
                            f.write_char(c)?
                        }
                        c => f.write_char(c)?,
                    }
                }
                f.write_char(quote)
            }
            Value::Undefined => f.write_str("Undefined"),
            value => write!(f, "{value}"),
        }
    }

    /// Return the value formatted the way it would appear inside of a list.
    pub fn repr(&self) -> String {
        let mut buffer = String::new();
        // Writing to a String does not fail.
        let _ = self.write_repr(&mut buffer);
        buffer
    }
}

/// Resolve a possibly negative index against a length.
pub(crate) fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = match index < 0 {
        true => len as i64 + index,
        false => index,
    };

    match resolved >= 0 && (resolved as usize) < len {
        true => Some(resolved as usize),
        false => None,
    }
}

/// Format a float the way the template language prints it.
///
/// Whole numbers keep a trailing `.0`, so `1.0` does not print as `1`.
pub(crate) fn format_float(f: f64, w: &mut impl Write) -> FmtResult {
    if f.is_nan() {
        return w.write_str("nan");
    }
    if f.is_infinite() {
        return w.write_str(if f > 0.0 { "inf" } else { "-inf" });
    }
    if f.fract() == 0.0 && f.abs() < 1e16 {
        return write!(w, "{f:.1}");
    }

    write!(w, "{f}")
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Value::Undefined => Ok(()),
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(n) => format_float(*n, f),
            Value::String(s) | Value::Markup(s) => f.write_str(s),
            Value::List(l) => {
                f.write_char('[')?;
                for (i, item) in l.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_repr(f)?;
                }
                f.write_char(']')
            }
            Value::Map(m) => write_map(f, m),
            Value::Namespace(n) => {
                f.write_str("<Namespace ")?;
                write_map(f, &n.to_map())?;
                f.write_char('>')
            }
            Value::Macro(m) => write!(f, "<Macro '{}'>", m.node.name),
            Value::Function(name) => write!(f, "<function {name}>"),
            Value::Loop(l) => write!(f, "<LoopContext {}/{}>", l.index0 + 1, l.length),
            Value::Block(b) => write!(f, "<BlockReference '{}'>", b.name),
            Value::SelfRef => f.write_str("<TemplateReference>"),
            Value::Object(o) => f.write_str(&o.render()),
        }
    }
}

fn write_map(f: &mut Formatter<'_>, map: &IndexMap<String, Value>) -> FmtResult {
    f.write_char('{')?;
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        Value::from(key.as_str()).write_repr(f)?;
        f.write_str(": ")?;
        value.write_repr(f)?;
    }
    f.write_char('}')
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::None, Value::None) => true,
            (
                Value::String(a) | Value::Markup(a),
                Value::String(b) | Value::Markup(b),
            ) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Namespace(a), Value::Namespace(b)) => Arc::ptr_eq(a, b),
            (Value::Macro(a), Value::Macro(b)) => Arc::ptr_eq(&a.node, &b.node),
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Block(a), Value::Block(b)) => a.name == b.name && a.index == b.index,
            (Value::SelfRef, Value::SelfRef) => true,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => match (a.as_float(), b.as_float()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(Arc::new(value))
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(value: IndexMap<String, Value>) -> Self {
        Value::Map(Arc::new(value))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Json::Null => Value::None,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::from(s),
            Json::Array(a) => Value::from(a.into_iter().map(Value::from).collect::<Vec<_>>()),
            Json::Object(o) => Value::from(
                o.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<IndexMap<_, _>>(),
            ),
        }
    }
}

/// A mutable attribute bag.
///
/// Unlike other values, a namespace may be changed after it is created,
/// through `{% set ns.attr = value %}`.
#[derive(Debug, Default)]
pub struct Namespace {
    attrs: Mutex<IndexMap<String, Value>>,
}

impl Namespace {
    /// Create a new [`Namespace`] holding the given attributes.
    pub fn new(attrs: IndexMap<String, Value>) -> Self {
        Self {
            attrs: Mutex::new(attrs),
        }
    }

    /// Return the value of an attribute.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.attrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Set the value of an attribute.
    pub fn set(&self, name: &str, value: Value) {
        self.attrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }

    /// Return a copy of every attribute.
    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.attrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A macro bound to the place it was defined.
#[derive(Debug)]
pub struct MacroRef {
    pub node: Arc<tree::Macro>,
    /// Template that defined the macro, used for error positions and autoescaping.
    pub template: Arc<Template>,
    /// Local names visible where the macro was defined.
    pub closure: IndexMap<String, Value>,
    /// Top level names of the template the macro was imported from.
    pub module: Option<Arc<IndexMap<String, Value>>>,
    /// Index of the frame that name lookups fall back to.
    pub root: usize,
}

/// State of the `loop` variable for one iteration.
#[derive(Debug)]
pub struct Loop {
    pub index0: usize,
    pub length: usize,
    pub depth0: usize,
    pub previtem: Option<Value>,
    pub nextitem: Option<Value>,
    /// Last arguments given to `loop.changed()`, shared by all iterations.
    pub changed: Arc<Mutex<Option<Vec<Value>>>>,
    /// The loop itself, when declared `recursive`.
    pub recurse: Option<Arc<tree::For>>,
}

impl Loop {
    /// Return the value of a loop attribute.
    pub fn get(&self, name: &str) -> Value {
        match name {
            "index" => Value::from(self.index0 + 1),
            "index0" => Value::from(self.index0),
            "revindex" => Value::from(self.length - self.index0),
            "revindex0" => Value::from(self.length - self.index0 - 1),
            "first" => Value::Bool(self.index0 == 0),
            "last" => Value::Bool(self.index0 + 1 == self.length),
            "length" => Value::from(self.length),
            "depth" => Value::from(self.depth0 + 1),
            "depth0" => Value::from(self.depth0),
            "previtem" => self.previtem.clone().unwrap_or_default(),
            "nextitem" => self.nextitem.clone().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Return the argument at the position of the current iteration,
    /// wrapping around.
    pub fn cycle(&self, args: &Arguments) -> Result<Value, Error> {
        match args.positional.len() {
            0 => Err(Error::build("no items for cycling given")),
            n => Ok(args.positional[self.index0 % n].clone()),
        }
    }

    /// Return true if the arguments differ from the previous call.
    pub fn changed(&self, args: &Arguments) -> bool {
        let mut last = self.changed.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(&args.positional[..]) {
            return false;
        }
        *last = Some(args.positional.clone());

        true
    }
}

/// A reference to one definition of a block in the inheritance chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub name: String,
    /// Position in the chain, where `0` is the most derived definition.
    pub index: usize,
}

/// Describes a host object that templates can use as a value.
pub trait Object: Debug + Send + Sync {
    /// Return the name of the type, used in error messages.
    fn type_name(&self) -> &str;

    /// Return the value of an attribute.
    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Call a method on the object.
    fn call_method(&self, name: &str, _args: &Arguments) -> Result<Value, Error> {
        Err(Error::build(format!(
            "`{}` object has no method `{name}`",
            self.type_name()
        )))
    }

    /// Return true if the object can be called like a function.
    fn is_callable(&self) -> bool {
        false
    }

    /// Call the object like a function.
    fn call(&self, _args: &Arguments) -> Result<Value, Error> {
        Err(Error::build(format!(
            "`{}` object is not callable",
            self.type_name()
        )))
    }

    /// Return the items produced by iterating over the object, if it can
    /// be iterated.
    fn try_iter(&self) -> Option<Vec<Value>> {
        None
    }

    /// Return the text written when the object is printed.
    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_index, Value};
    use indexmap::IndexMap;
    use serde_json::json;

    #[test]
    fn test_display() {
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
        assert_eq!(Value::Undefined.to_string(), "");
    }

    #[test]
    fn test_display_list() {
        let list = Value::from(vec![Value::from("a"), Value::Int(1), Value::None]);
        assert_eq!(list.to_string(), "['a', 1, None]");
    }

    #[test]
    fn test_display_map() {
        let map = Value::from(json!({"k": "v", "n": [1.5]}));
        assert_eq!(map.to_string(), "{'k': 'v', 'n': [1.5]}");
    }

    #[test]
    fn test_repr_quotes() {
        assert_eq!(Value::from("it's").repr(), "\"it's\"");
        assert_eq!(Value::from("a\\b").repr(), "'a\\\\b'");
    }

    #[test]
    fn test_numeric_equality() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::from("1"), Value::Int(1));
        assert_eq!(Value::from("a"), Value::markup("a"));
    }

    #[test]
    fn test_get_item() {
        let list = Value::from(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(list.get_item(&Value::Int(-1)), Value::Int(3));
        assert!(list.get_item(&Value::Int(3)).is_undefined());

        let map = Value::from(json!({"a": {"b": [10, 20]}}));
        assert_eq!(map.get_path("a.b.1"), Value::Int(20));
        assert!(map.get_path("a.c.d").is_undefined());
    }

    #[test]
    fn test_get_attr_index_on_list() {
        let list = Value::from(vec![Value::from("x")]);
        assert_eq!(list.get_attr("0"), Value::from("x"));
    }

    #[test]
    fn test_to_output_escapes() {
        assert_eq!(Value::from("<b>").to_output(true), "&lt;b&gt;");
        assert_eq!(Value::markup("<b>").to_output(true), "<b>");
        assert_eq!(Value::from("<b>").to_output(false), "<b>");
    }

    #[test]
    fn test_json_round_trip_keeps_order() {
        let value = Value::from(json!({"z": 1, "a": [true, null]}));
        assert_eq!(value.to_json().to_string(), r#"{"z":1,"a":[true,null]}"#);
    }

    #[test]
    fn test_iterate_map_keys() {
        let mut map = IndexMap::new();
        map.insert("b".to_string(), Value::Int(1));
        map.insert("a".to_string(), Value::Int(2));
        let keys = Value::from(map).try_iter().unwrap();

        assert_eq!(keys, vec![Value::from("b"), Value::from("a")]);
        assert!(Value::Int(1).try_iter().is_none());
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(-4, 3), None);
        assert_eq!(resolve_index(2, 3), Some(2));
    }
}
