//! Filters available in every [`Engine`][`crate::Engine`].
//!
//! Filters that call other filters or tests, such as `map` and `select`,
//! are applied by the renderer.
use super::{Arguments, Filter};
use crate::{
    compile::tree::BinOp,
    log::{error_types, Error, ErrorKind},
    render::{
        compare::order,
        operator::{binary, format as printf},
        pipe::escape,
        value::Object,
        Value,
    },
    security::check_size,
};
use regex::Regex;
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, OnceLock},
};

/// Add every builtin filter to the given registry.
pub(crate) fn register(filters: &mut HashMap<String, Box<dyn Filter>>) {
    let builtins: [(&str, fn(&Value, &Arguments) -> Result<Value, Error>); 46] = [
        ("abs", abs),
        ("batch", batch),
        ("capitalize", capitalize),
        ("center", center),
        ("count", length),
        ("d", default),
        ("default", default),
        ("dictsort", dictsort),
        ("e", escape_filter),
        ("escape", escape_filter),
        ("filesizeformat", filesizeformat),
        ("first", first),
        ("float", float),
        ("forceescape", forceescape),
        ("format", format),
        ("groupby", groupby),
        ("indent", indent),
        ("int", int),
        ("items", items),
        ("join", join),
        ("last", last),
        ("length", length),
        ("list", list),
        ("lower", lower),
        ("max", max),
        ("min", min),
        ("pprint", pprint),
        ("replace", replace),
        ("reverse", reverse),
        ("round", round),
        ("safe", safe),
        ("slice", slice),
        ("sort", sort),
        ("string", string),
        ("striptags", striptags),
        ("sum", sum),
        ("title", title),
        ("tojson", tojson),
        ("trim", trim),
        ("truncate", truncate),
        ("unique", unique),
        ("upper", upper),
        ("urlencode", urlencode),
        ("wordcount", wordcount),
        ("wordwrap", wordwrap),
        ("xmlattr", xmlattr),
    ];

    for (name, filter) in builtins {
        filters.insert(name.to_string(), Box::new(filter));
    }
}

/// Return the text of a value, where undefined is empty.
pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::Undefined => String::new(),
        value => value.to_string(),
    }
}

/// Wrap the text as markup if the input was markup.
fn keep_markup(input: &Value, text: String) -> Value {
    match input.is_markup() {
        true => Value::markup(text),
        false => Value::from(text),
    }
}

/// Return the items of an iterable input.
fn iterate(filter: &str, value: &Value) -> Result<Vec<Value>, Error> {
    value.try_iter().ok_or_else(|| {
        error_types(format!(
            "filter `{filter}` requires an iterable, not `{}`",
            value.kind()
        ))
    })
}

/// Return a function that extracts the value to sort or compare by.
fn key_fn(attribute: Option<&str>, case_sensitive: bool) -> impl Fn(&Value) -> Value + '_ {
    move |value| {
        let value = match attribute {
            Some(path) => value.get_path(path),
            None => value.clone(),
        };
        match (&value, case_sensitive) {
            (Value::String(s) | Value::Markup(s), false) => Value::from(s.to_lowercase()),
            _ => value,
        }
    }
}

/// Sort values by a key, reporting the first pair that cannot be ordered.
fn sort_by_key<F>(items: &mut [Value], key: F) -> Result<(), Error>
where
    F: Fn(&Value) -> Value,
{
    let mut failure = None;
    items.sort_by(|a, b| match order(&key(a), &key(b)) {
        Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn abs(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `abs`", &[])?;
    match value {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| Error::build("integer overflow")),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        other => Err(error_types(format!(
            "filter `abs` requires a number, not `{}`",
            other.kind()
        ))),
    }
}

fn batch(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `batch`", &["linecount", "fill_with"])?;
    let size = args.get_int(0, "linecount")?.unwrap_or(1);
    if size < 1 {
        return Err(Error::new(ErrorKind::Arguments, "batch size must be positive"));
    }
    let fill = args.get(1, "fill_with").filter(|v| !v.is_undefined());
    if fill.is_some() {
        check_size(size as usize)?;
    }

    let items = iterate("batch", value)?;
    let batches = items
        .chunks(size as usize)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            if let Some(fill) = fill {
                chunk.resize(size as usize, fill.clone());
            }
            Value::from(chunk)
        })
        .collect::<Vec<_>>();

    Ok(Value::from(batches))
}

pub(crate) fn capitalize(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `capitalize`", &[])?;
    let text = text_of(value);
    let mut chars = text.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    };

    Ok(keep_markup(value, capitalized))
}

fn center(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `center`", &["width"])?;
    let width = check_size(args.get_int(0, "width")?.unwrap_or(80).max(0) as usize)?;
    let text = text_of(value);
    let len = text.chars().count();
    if len >= width {
        return Ok(keep_markup(value, text));
    }

    let total = width - len;
    // Odd padding favors the right side, unless the total is odd and the
    // width is even.
    let left = total / 2 + (total & width & 1);
    let right = total - left;

    Ok(keep_markup(
        value,
        format!("{}{text}{}", " ".repeat(left), " ".repeat(right)),
    ))
}

fn default(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `default`", &["default_value", "boolean"])?;
    let fallback = args
        .get(0, "default_value")
        .cloned()
        .unwrap_or_else(|| Value::from(""));
    let boolean = args.get_bool(1, "boolean").unwrap_or(false);

    match value.is_undefined() || (boolean && !value.is_truthy()) {
        true => Ok(fallback),
        false => Ok(value.clone()),
    }
}

fn dictsort(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `dictsort`", &["case_sensitive", "by", "reverse"])?;
    let case_sensitive = args.get_bool(0, "case_sensitive").unwrap_or(false);
    let by = args.get_str(1, "by")?.unwrap_or("key");
    let reverse = args.get_bool(2, "reverse").unwrap_or(false);
    let position = match by {
        "key" => 0,
        "value" => 1,
        _ => {
            return Err(Error::new(
                ErrorKind::Arguments,
                "you can only sort by either `key` or `value`",
            ))
        }
    };

    let Some(map) = value.as_map() else {
        return Err(error_types(format!(
            "filter `dictsort` requires a map, not `{}`",
            value.kind()
        )));
    };
    let mut pairs = map
        .iter()
        .map(|(k, v)| Value::from(vec![Value::from(k.as_str()), v.clone()]))
        .collect::<Vec<_>>();
    let key = key_fn(None, case_sensitive);
    sort_by_key(&mut pairs, |pair| key(&pair.get_item(&Value::Int(position))))?;
    if reverse {
        pairs.reverse();
    }

    Ok(Value::from(pairs))
}

fn escape_filter(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `escape`", &[])?;
    Ok(match value {
        Value::Undefined => Value::markup(""),
        value => value.to_markup(),
    })
}

fn forceescape(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `forceescape`", &[])?;
    Ok(Value::markup(escape(&text_of(value))))
}

fn filesizeformat(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `filesizeformat`", &["binary"])?;
    let binary = args.get_bool(0, "binary").unwrap_or(false);
    let bytes = match value {
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        other => other.as_float().ok_or_else(|| {
            error_types(format!(
                "filter `filesizeformat` requires a number, not `{}`",
                other.kind()
            ))
        })?,
    };

    let (base, prefixes) = match binary {
        true => (1024.0, ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"]),
        false => (1000.0, ["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"]),
    };
    if bytes == 1.0 {
        return Ok(Value::from("1 Byte"));
    }
    if bytes < base {
        return Ok(Value::from(format!("{} Bytes", bytes as i64)));
    }

    let mut unit = base;
    for (i, prefix) in prefixes.iter().enumerate() {
        unit = base.powi(i as i32 + 2);
        if bytes < unit {
            return Ok(Value::from(format!("{:.1} {prefix}", base * bytes / unit)));
        }
    }

    Ok(Value::from(format!(
        "{:.1} {}",
        base * bytes / unit,
        prefixes[prefixes.len() - 1]
    )))
}

fn first(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `first`", &[])?;
    Ok(iterate("first", value)?.into_iter().next().unwrap_or_default())
}

fn last(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `last`", &[])?;
    Ok(iterate("last", value)?.pop().unwrap_or_default())
}

fn float(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `float`", &["default"])?;
    let fallback = args.get_float(0, "default")?.unwrap_or(0.0);
    let parsed = match value {
        Value::String(s) | Value::Markup(s) => s.trim().replace('_', "").parse::<f64>().ok(),
        other => other.as_float(),
    };

    Ok(Value::Float(parsed.unwrap_or(fallback)))
}

fn format(value: &Value, args: &Arguments) -> Result<Value, Error> {
    let Some(fmt) = value.as_str() else {
        return Err(error_types(format!(
            "filter `format` requires a string, not `{}`",
            value.kind()
        )));
    };
    if !args.positional.is_empty() && !args.named.is_empty() {
        return Err(Error::new(
            ErrorKind::Arguments,
            "filter `format` can't handle positional and keyword arguments at the same time",
        ));
    }

    let params = match args.named.is_empty() {
        true => Value::from(args.positional.clone()),
        false => Value::from(args.named.clone()),
    };
    let text = printf(fmt, &params, value.is_markup())?;

    Ok(keep_markup(value, text))
}

/// A group produced by the `groupby` filter.
///
/// Unpacks into `grouper, list` and exposes both as attributes.
#[derive(Debug)]
struct Group {
    grouper: Value,
    list: Value,
}

impl Object for Group {
    fn type_name(&self) -> &str {
        "group"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "grouper" => Some(self.grouper.clone()),
            "list" => Some(self.list.clone()),
            _ => None,
        }
    }

    fn try_iter(&self) -> Option<Vec<Value>> {
        Some(vec![self.grouper.clone(), self.list.clone()])
    }

    fn render(&self) -> String {
        format!("({}, {})", self.grouper.repr(), self.list)
    }
}

fn groupby(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `groupby`", &["attribute", "default", "case_sensitive"])?;
    let Some(attribute) = args.get(0, "attribute").map(text_of) else {
        return Err(Error::new(
            ErrorKind::Arguments,
            "filter `groupby` requires an attribute",
        ));
    };
    let fallback = args.get(1, "default").cloned();
    let case_sensitive = args.get_bool(2, "case_sensitive").unwrap_or(false);

    let grouper = |item: &Value| {
        let key = item.get_path(&attribute);
        match (key.is_undefined(), &fallback) {
            (true, Some(fallback)) => fallback.clone(),
            _ => key,
        }
    };
    let key = key_fn(None, case_sensitive);

    let mut items = iterate("groupby", value)?;
    sort_by_key(&mut items, |item| key(&grouper(item)))?;

    let mut groups: Vec<(Value, Value, Vec<Value>)> = vec![];
    for item in items {
        let group = grouper(&item);
        let folded = key(&group);
        match groups.last_mut() {
            Some((_, last, members)) if *last == folded => members.push(item),
            _ => groups.push((group, folded, vec![item])),
        }
    }

    Ok(Value::from(
        groups
            .into_iter()
            .map(|(grouper, _, list)| {
                Value::Object(Arc::new(Group {
                    grouper,
                    list: Value::from(list),
                }))
            })
            .collect::<Vec<_>>(),
    ))
}

fn indent(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `indent`", &["width", "first", "blank"])?;
    let prefix = match args.get(0, "width") {
        Some(Value::String(s) | Value::Markup(s)) => s.to_string(),
        _ => " ".repeat(check_size(
            args.get_int(0, "width")?.unwrap_or(4).max(0) as usize,
        )?),
    };
    let first = args.get_bool(1, "first").unwrap_or(false);
    let blank = args.get_bool(2, "blank").unwrap_or(false);

    let text = text_of(value);
    let lines = text.matches('\n').count() + 1;
    check_size(prefix.len().saturating_mul(lines).saturating_add(text.len()))?;
    let mut output = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            output.push('\n');
        }
        let indent = (i > 0 || first) && (blank || !line.trim().is_empty());
        if indent {
            output.push_str(&prefix);
        }
        output.push_str(line);
    }

    Ok(keep_markup(value, output))
}

fn int(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `int`", &["default", "base"])?;
    let fallback = args.get_int(0, "default")?.unwrap_or(0);
    let base = args.get_int(1, "base")?.unwrap_or(10);
    if !(2..=36).contains(&base) {
        return Err(Error::new(ErrorKind::Arguments, "base must be between 2 and 36"));
    }

    let parsed = match value {
        Value::String(s) | Value::Markup(s) => {
            let text = s.trim().replace('_', "");
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest.to_string()),
                None => (false, text.trim_start_matches('+').to_string()),
            };
            let digits = match base {
                16 => digits.trim_start_matches("0x").trim_start_matches("0X").to_string(),
                8 => digits.trim_start_matches("0o").trim_start_matches("0O").to_string(),
                2 => digits.trim_start_matches("0b").trim_start_matches("0B").to_string(),
                _ => digits,
            };
            i64::from_str_radix(&digits, base as u32)
                .ok()
                .map(|i| if negative { -i } else { i })
                .or_else(|| match base {
                    10 => text.parse::<f64>().ok().map(|f| f.trunc() as i64),
                    _ => None,
                })
        }
        Value::Float(f) => Some(f.trunc() as i64),
        other => other.as_int(),
    };

    Ok(Value::Int(parsed.unwrap_or(fallback)))
}

fn items(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `items`", &[])?;
    let pairs = match value {
        Value::Undefined => vec![],
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| Value::from(vec![Value::from(k.as_str()), v.clone()]))
            .collect(),
        Value::Namespace(ns) => ns
            .to_map()
            .into_iter()
            .map(|(k, v)| Value::from(vec![Value::from(k), v]))
            .collect(),
        other => {
            return Err(error_types(format!(
                "filter `items` requires a map, not `{}`",
                other.kind()
            )))
        }
    };

    Ok(Value::from(pairs))
}

fn join(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `join`", &["d", "attribute"])?;
    let separator = args.get(0, "d").cloned().unwrap_or_else(|| Value::from(""));
    let attribute = args.get_str(1, "attribute")?;

    let mut items = iterate("join", value)?;
    if let Some(path) = attribute {
        items = items.iter().map(|item| item.get_path(path)).collect();
    }

    if separator.is_markup() || items.iter().any(Value::is_markup) {
        let joined = items
            .iter()
            .map(|item| item.to_output(true))
            .collect::<Vec<_>>()
            .join(&separator.to_output(true));
        return Ok(Value::markup(joined));
    }

    Ok(Value::from(
        items
            .iter()
            .map(text_of)
            .collect::<Vec<_>>()
            .join(&text_of(&separator)),
    ))
}

fn length(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `length`", &[])?;
    match value {
        Value::Undefined => Ok(Value::Int(0)),
        value => value.len().map(Value::from).ok_or_else(|| {
            error_types(format!("object of type `{}` has no length", value.kind()))
        }),
    }
}

fn list(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `list`", &[])?;
    Ok(Value::from(iterate("list", value)?))
}

fn lower(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `lower`", &[])?;
    Ok(keep_markup(value, text_of(value).to_lowercase()))
}

fn upper(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `upper`", &[])?;
    Ok(keep_markup(value, text_of(value).to_uppercase()))
}

fn extreme(name: &str, value: &Value, args: &Arguments, wanted: Ordering) -> Result<Value, Error> {
    args.check(&format!("filter `{name}`"), &["case_sensitive", "attribute"])?;
    let case_sensitive = args.get_bool(0, "case_sensitive").unwrap_or(false);
    let attribute = args.get_str(1, "attribute")?;
    let key = key_fn(attribute, case_sensitive);

    let mut best: Option<(Value, Value)> = None;
    for item in iterate(name, value)? {
        let k = key(&item);
        let replace = match &best {
            None => true,
            Some((best_key, _)) => order(&k, best_key)? == Some(wanted),
        };
        if replace {
            best = Some((k, item));
        }
    }

    Ok(best.map(|(_, item)| item).unwrap_or_default())
}

fn max(value: &Value, args: &Arguments) -> Result<Value, Error> {
    extreme("max", value, args, Ordering::Greater)
}

fn min(value: &Value, args: &Arguments) -> Result<Value, Error> {
    extreme("min", value, args, Ordering::Less)
}

fn pprint(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `pprint`", &[])?;
    Ok(Value::from(value.repr()))
}

fn replace(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `replace`", &["old", "new", "count"])?;
    let old = args.get(0, "old").map(text_of).unwrap_or_default();
    let new = args.get(1, "new").map(text_of).unwrap_or_default();
    let count = args.get_int(2, "count")?;
    let text = text_of(value);

    // Replacing into markup must not smuggle in unescaped text.
    let (old, new) = match value.is_markup() {
        true => (
            args.get(0, "old").map(|v| v.to_output(true)).unwrap_or(old),
            args.get(1, "new").map(|v| v.to_output(true)).unwrap_or(new),
        ),
        false => (old, new),
    };

    let replaced = match count {
        Some(n) if n >= 0 => text.replacen(&old, &new, n as usize),
        _ => text.replace(&old, &new),
    };

    Ok(keep_markup(value, replaced))
}

fn reverse(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `reverse`", &[])?;
    match value {
        Value::String(_) | Value::Markup(_) => {
            Ok(keep_markup(value, text_of(value).chars().rev().collect()))
        }
        value => {
            let mut items = iterate("reverse", value)?;
            items.reverse();
            Ok(Value::from(items))
        }
    }
}

fn round(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `round`", &["precision", "method"])?;
    let precision = args.get_int(0, "precision")?.unwrap_or(0);
    let method = args.get_str(1, "method")?.unwrap_or("common");
    let Some(number) = value.as_float() else {
        return Err(error_types(format!(
            "filter `round` requires a number, not `{}`",
            value.kind()
        )));
    };

    let factor = 10f64.powi(precision.clamp(-300, 300) as i32);
    let scaled = number * factor;
    let rounded = match method {
        "common" => scaled.round(),
        "ceil" => scaled.ceil(),
        "floor" => scaled.floor(),
        _ => {
            return Err(Error::new(
                ErrorKind::Arguments,
                "method must be `common`, `ceil` or `floor`",
            ))
        }
    };

    Ok(Value::Float(rounded / factor))
}

fn safe(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `safe`", &[])?;
    Ok(Value::markup(text_of(value)))
}

fn slice(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `slice`", &["slices", "fill_with"])?;
    let slices = args.get_int(0, "slices")?.unwrap_or(1);
    if slices < 1 {
        return Err(Error::new(ErrorKind::Arguments, "number of slices must be positive"));
    }
    let slices = check_size(slices as usize)?;
    let fill = args.get(1, "fill_with").filter(|v| !v.is_undefined());

    let items = iterate("slice", value)?;
    let per_slice = items.len() / slices;
    let with_extra = items.len() % slices;
    let mut offset = 0;
    let mut output = Vec::with_capacity(slices);
    for index in 0..slices {
        let start = offset + index * per_slice;
        if index < with_extra {
            offset += 1;
        }
        let end = offset + (index + 1) * per_slice;
        let mut column = items[start..end].to_vec();
        if let (Some(fill), true) = (fill, index >= with_extra) {
            column.push(fill.clone());
        }
        output.push(Value::from(column));
    }

    Ok(Value::from(output))
}

fn sort(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `sort`", &["reverse", "case_sensitive", "attribute"])?;
    let reverse = args.get_bool(0, "reverse").unwrap_or(false);
    let case_sensitive = args.get_bool(1, "case_sensitive").unwrap_or(false);
    let attribute = args.get_str(2, "attribute")?;

    let mut items = iterate("sort", value)?;
    let paths = attribute.map(|a| a.split(',').map(str::trim).collect::<Vec<_>>());
    match paths.as_deref() {
        Some(paths) if paths.len() > 1 => {
            let keys = paths.iter().map(|p| key_fn(Some(*p), case_sensitive)).collect::<Vec<_>>();
            sort_by_key(&mut items, |item| {
                Value::from(keys.iter().map(|k| k(item)).collect::<Vec<_>>())
            })?
        }
        _ => sort_by_key(&mut items, key_fn(attribute, case_sensitive))?,
    }
    if reverse {
        items.reverse();
    }

    Ok(Value::from(items))
}

fn string(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `string`", &[])?;
    Ok(match value {
        Value::Markup(_) => value.clone(),
        value => Value::from(text_of(value)),
    })
}

fn striptags(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `striptags`", &[])?;
    let text = text_of(value);
    let stripped = tags()?.replace_all(&text, "");

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(Value::from(unescape(&collapsed)))
}

/// Return the pattern matching HTML comments and tags.
fn tags() -> Result<&'static Regex, Error> {
    static TAGS: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>"))
        .as_ref()
        .map_err(|e| Error::build(format!("invalid tag pattern: {e}")))
}

/// Replace the common HTML entities with the characters they stand for.
fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#34;", "\"")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn sum(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `sum`", &["attribute", "start"])?;
    let attribute = args.get_str(0, "attribute")?;
    let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));

    for item in iterate("sum", value)? {
        let item = match attribute {
            Some(path) => item.get_path(path),
            None => item,
        };
        total = binary(BinOp::Add, &total, &item)?;
    }

    Ok(total)
}

pub(crate) fn title(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `title`", &[])?;
    let text = text_of(value);
    let mut output = String::with_capacity(text.len());
    let mut start = true;
    for c in text.chars() {
        match start {
            true => output.extend(c.to_uppercase()),
            false => output.extend(c.to_lowercase()),
        }
        start = !c.is_alphanumeric() && c != '\'';
    }

    Ok(keep_markup(value, output))
}

fn tojson(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `tojson`", &["indent"])?;
    let indent = args.get_int(0, "indent")?;
    let json = value.to_json();
    let text = match indent {
        Some(width) => {
            let indent = " ".repeat(check_size(width.max(0) as usize)?);
            let mut buffer = vec![];
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
            serde::Serialize::serialize(&json, &mut serializer)
                .map_err(|e| Error::build(format!("value cannot be serialized: {e}")))?;
            String::from_utf8(buffer)
                .map_err(|e| Error::build(format!("value cannot be serialized: {e}")))?
        }
        None => serde_json::to_string(&json)
            .map_err(|e| Error::build(format!("value cannot be serialized: {e}")))?,
    };

    // Safe to place inside of a script tag or an HTML attribute.
    let safe = text
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\'', "\\u0027");

    Ok(Value::markup(safe))
}

fn trim(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `trim`", &["chars"])?;
    let text = text_of(value);
    let trimmed = match args.get_str(0, "chars")? {
        Some(chars) => text.trim_matches(|c| chars.contains(c)).to_string(),
        None => text.trim().to_string(),
    };

    Ok(keep_markup(value, trimmed))
}

fn truncate(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `truncate`", &["length", "killwords", "end", "leeway"])?;
    let length = args.get_int(0, "length")?.unwrap_or(255).max(0) as usize;
    let killwords = args.get_bool(1, "killwords").unwrap_or(false);
    let end = args.get(2, "end").map(text_of).unwrap_or_else(|| "...".to_string());
    let leeway = args.get_int(3, "leeway")?.unwrap_or(5).max(0) as usize;

    let text = text_of(value);
    let count = text.chars().count();
    if count <= length + leeway {
        return Ok(keep_markup(value, text));
    }

    let keep = length.saturating_sub(end.chars().count());
    let head: String = text.chars().take(keep).collect();
    let head = match killwords {
        true => head,
        false => match head.rfind(' ') {
            Some(space) => head[..space].to_string(),
            None => head,
        },
    };

    Ok(keep_markup(value, format!("{head}{end}")))
}

fn unique(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `unique`", &["case_sensitive", "attribute"])?;
    let case_sensitive = args.get_bool(0, "case_sensitive").unwrap_or(false);
    let attribute = args.get_str(1, "attribute")?;
    let key = key_fn(attribute, case_sensitive);

    let mut seen: Vec<Value> = vec![];
    let mut output = vec![];
    for item in iterate("unique", value)? {
        let k = key(&item);
        if !seen.contains(&k) {
            seen.push(k);
            output.push(item);
        }
    }

    Ok(Value::from(output))
}

fn urlencode(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `urlencode`", &[])?;
    let encoded = match value {
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", quote(k, ""), quote(&text_of(v), "")))
            .collect::<Vec<_>>()
            .join("&"),
        Value::List(pairs) => pairs
            .iter()
            .map(|pair| {
                format!(
                    "{}={}",
                    quote(&text_of(&pair.get_item(&Value::Int(0))), ""),
                    quote(&text_of(&pair.get_item(&Value::Int(1))), "")
                )
            })
            .collect::<Vec<_>>()
            .join("&"),
        value => quote(&text_of(value), "/"),
    };

    Ok(Value::from(encoded))
}

/// Percent encode text, leaving unreserved characters and `safe` alone.
fn quote(text: &str, safe: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for byte in text.bytes() {
        let c = byte as char;
        if c.is_ascii_alphanumeric() || "_.-~".contains(c) || (c.is_ascii() && safe.contains(c)) {
            output.push(c);
        } else {
            output.push_str(&format!("%{byte:02X}"));
        }
    }

    output
}

fn wordcount(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `wordcount`", &[])?;
    let text = text_of(value);
    let count = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\'' || c == '-'))
        .filter(|word| !word.is_empty())
        .count();

    Ok(Value::from(count))
}

fn wordwrap(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check(
        "filter `wordwrap`",
        &["width", "break_long_words", "wrapstring", "break_on_hyphens"],
    )?;
    let width = args.get_int(0, "width")?.unwrap_or(79).max(1) as usize;
    let break_long = args.get_bool(1, "break_long_words").unwrap_or(true);
    let wrapstring = args.get_str(2, "wrapstring")?.unwrap_or("\n").to_string();
    let break_on_hyphens = args.get_bool(3, "break_on_hyphens").unwrap_or(true);

    let text = text_of(value);
    let paragraphs = text
        .split('\n')
        .map(|line| wrap_line(line, width, break_long, break_on_hyphens).join(&wrapstring))
        .collect::<Vec<_>>();

    Ok(Value::from(paragraphs.join(&wrapstring)))
}

/// Greedily wrap a single line of text.
fn wrap_line(line: &str, width: usize, break_long: bool, break_on_hyphens: bool) -> Vec<String> {
    let mut words: Vec<String> = vec![];
    for word in line.split_whitespace() {
        match break_on_hyphens && word.contains('-') {
            true => {
                let parts = word.split_inclusive('-').map(String::from);
                words.extend(parts);
            }
            false => words.push(word.to_string()),
        }
    }

    let mut lines = vec![];
    let mut current = String::new();
    for word in words {
        let joiner = match current.is_empty() || current.ends_with('-') {
            true => "",
            false => " ",
        };
        if current.chars().count() + joiner.len() + word.chars().count() <= width {
            current.push_str(joiner);
            current.push_str(&word);
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        let mut word = word;
        while break_long && word.chars().count() > width {
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            lines.push(head);
        }
        current = word;
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }

    lines
}

fn xmlattr(value: &Value, args: &Arguments) -> Result<Value, Error> {
    args.check("filter `xmlattr`", &["autospace"])?;
    let autospace = args.get_bool(0, "autospace").unwrap_or(true);
    let Some(map) = value.as_map() else {
        return Err(error_types(format!(
            "filter `xmlattr` requires a map, not `{}`",
            value.kind()
        )));
    };

    let mut output = String::new();
    for (key, value) in map.iter() {
        if value.is_none() || value.is_undefined() {
            continue;
        }
        if key.is_empty() || key.chars().any(|c| c.is_whitespace() || "/>=".contains(c)) {
            return Err(Error::build(format!("invalid character in attribute name `{key}`")));
        }
        if !output.is_empty() || autospace {
            output.push(' ');
        }
        output.push_str(&format!("{}=\"{}\"", escape(key), value.to_output(true)));
    }

    Ok(Value::markup(output))
}
