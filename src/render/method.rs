//! Methods callable on strings, lists and maps, such as `name.upper()`.
use super::Value;
use crate::{
    filter::{capitalize, text_of, title, Arguments},
    log::{Error, ErrorKind},
};

/// Call the named method on a value.
///
/// # Errors
///
/// Returns an [`Error`] if the value has no such method, or the arguments
/// do not fit it.
pub fn call_method(value: &Value, name: &str, args: &Arguments) -> Result<Value, Error> {
    match value {
        Value::String(text) | Value::Markup(text) => {
            string_method(text, value.is_markup(), name, args)
        }
        Value::List(list) => match name {
            "index" => {
                args.check("method `index`", &["value"])?;
                let needle = args.get(0, "value").cloned().unwrap_or_default();
                match list.iter().position(|item| *item == needle) {
                    Some(index) => Ok(Value::from(index)),
                    None => Err(Error::build(format!("{} is not in list", needle.repr()))),
                }
            }
            "count" => {
                args.check("method `count`", &["value"])?;
                let needle = args.get(0, "value").cloned().unwrap_or_default();
                Ok(Value::from(list.iter().filter(|item| **item == needle).count()))
            }
            _ => Err(no_method(value, name)),
        },
        Value::Map(map) => match name {
            "items" => {
                args.check("method `items`", &[])?;
                Ok(Value::from(
                    map.iter()
                        .map(|(k, v)| Value::from(vec![Value::from(k.as_str()), v.clone()]))
                        .collect::<Vec<_>>(),
                ))
            }
            "keys" => {
                args.check("method `keys`", &[])?;
                Ok(Value::from(
                    map.keys().map(|k| Value::from(k.as_str())).collect::<Vec<_>>(),
                ))
            }
            "values" => {
                args.check("method `values`", &[])?;
                Ok(Value::from(map.values().cloned().collect::<Vec<_>>()))
            }
            "get" => {
                args.check("method `get`", &["key", "default"])?;
                let key = args.get(0, "key").map(text_of).unwrap_or_default();
                Ok(map
                    .get(&key)
                    .cloned()
                    .or_else(|| args.get(1, "default").cloned())
                    .unwrap_or(Value::None))
            }
            _ => Err(no_method(value, name)),
        },
        _ => Err(no_method(value, name)),
    }
}

fn no_method(value: &Value, name: &str) -> Error {
    Error::new(
        ErrorKind::Runtime,
        format!("`{}` has no method `{name}`", value.kind()),
    )
}

fn string_method(text: &str, markup: bool, name: &str, args: &Arguments) -> Result<Value, Error> {
    let wrap = |text: String| match markup {
        true => Value::markup(text),
        false => Value::from(text),
    };
    let callee = format!("method `{name}`");

    match name {
        "upper" => {
            args.check(&callee, &[])?;
            Ok(wrap(text.to_uppercase()))
        }
        "lower" => {
            args.check(&callee, &[])?;
            Ok(wrap(text.to_lowercase()))
        }
        "title" => title(&wrap(text.to_string()), args),
        "capitalize" => capitalize(&wrap(text.to_string()), args),
        "strip" | "lstrip" | "rstrip" => {
            args.check(&callee, &["chars"])?;
            let chars = args.get_str(0, "chars")?;
            let matches = |c: char| match chars {
                Some(chars) => chars.contains(c),
                None => c.is_whitespace(),
            };
            let stripped = match name {
                "lstrip" => text.trim_start_matches(matches),
                "rstrip" => text.trim_end_matches(matches),
                _ => text.trim_matches(matches),
            };
            Ok(wrap(stripped.to_string()))
        }
        "startswith" | "endswith" => {
            args.check(&callee, &["prefix"])?;
            let candidates = match args.get(0, "prefix") {
                Some(Value::List(list)) => list.iter().map(text_of).collect(),
                Some(value) => vec![text_of(value)],
                None => {
                    return Err(Error::new(
                        ErrorKind::Arguments,
                        format!("{callee} requires an argument"),
                    ))
                }
            };
            let found = candidates.iter().any(|c| match name {
                "startswith" => text.starts_with(c.as_str()),
                _ => text.ends_with(c.as_str()),
            });
            Ok(Value::Bool(found))
        }
        "split" => {
            args.check(&callee, &["sep", "maxsplit"])?;
            let limit = args
                .get_int(1, "maxsplit")?
                .filter(|n| *n >= 0)
                .map(|n| n as usize);
            let parts = match args.get_str(0, "sep")? {
                Some("") => return Err(Error::build("empty separator")),
                Some(sep) => match limit {
                    Some(n) => text.splitn(n + 1, sep).map(String::from).collect(),
                    None => text.split(sep).map(String::from).collect(),
                },
                None => split_whitespace(text, limit),
            };
            Ok(Value::from(
                parts.into_iter().map(Value::from).collect::<Vec<_>>(),
            ))
        }
        "splitlines" => {
            args.check(&callee, &[])?;
            Ok(Value::from(
                text.lines().map(Value::from).collect::<Vec<_>>(),
            ))
        }
        "replace" => {
            args.check(&callee, &["old", "new", "count"])?;
            let old = args.get_str(0, "old")?.unwrap_or_default();
            let new = args.get_str(1, "new")?.unwrap_or_default();
            let replaced = match args.get_int(2, "count")? {
                Some(count) if count >= 0 => text.replacen(old, new, count as usize),
                _ => text.replace(old, new),
            };
            Ok(wrap(replaced))
        }
        "find" => {
            args.check(&callee, &["sub"])?;
            let sub = args.get_str(0, "sub")?.unwrap_or_default();
            let index = text
                .find(sub)
                .map(|i| text[..i].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::Int(index))
        }
        "count" => {
            args.check(&callee, &["sub"])?;
            let count = match args.get_str(0, "sub")?.unwrap_or_default() {
                "" => text.chars().count() + 1,
                sub => text.matches(sub).count(),
            };
            Ok(Value::from(count))
        }
        "join" => {
            args.check(&callee, &["iterable"])?;
            let items = args
                .get(0, "iterable")
                .and_then(Value::try_iter)
                .ok_or_else(|| Error::new(ErrorKind::Type, format!("{callee} requires an iterable")))?;
            Ok(wrap(
                items.iter().map(text_of).collect::<Vec<_>>().join(text),
            ))
        }
        "format" => format(text, args).map(wrap),
        "isdigit" => Ok(Value::Bool(
            !text.is_empty() && text.chars().all(|c| c.is_numeric()),
        )),
        "isalpha" => Ok(Value::Bool(
            !text.is_empty() && text.chars().all(char::is_alphabetic),
        )),
        "isspace" => Ok(Value::Bool(
            !text.is_empty() && text.chars().all(char::is_whitespace),
        )),
        "isupper" => Ok(Value::Bool(
            text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase),
        )),
        "islower" => Ok(Value::Bool(
            text.chars().any(char::is_lowercase) && !text.chars().any(char::is_uppercase),
        )),
        _ => Err(no_method(&Value::from(text), name)),
    }
}

/// Split on runs of whitespace, stopping after `limit` splits and keeping
/// the rest of the text as the last part.
fn split_whitespace(text: &str, limit: Option<usize>) -> Vec<String> {
    let Some(limit) = limit else {
        return text.split_whitespace().map(String::from).collect();
    };

    let mut parts = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() && parts.len() < limit {
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(rest.to_string());
                rest = "";
            }
        }
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }

    parts
}

/// Replace `{}`, `{0}` and `{name}` fields with the arguments.
///
/// `{{` and `}}` produce literal braces.
fn format(text: &str, args: &Arguments) -> Result<String, Error> {
    let mut output = String::with_capacity(text.len());
    let mut next = 0;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(Error::build("single `{` encountered in format string")),
                    }
                }

                let value = match field.as_str() {
                    "" => {
                        next += 1;
                        args.positional.get(next - 1)
                    }
                    field => match field.parse::<usize>() {
                        Ok(index) => args.positional.get(index),
                        Err(_) => args.named.get(field),
                    },
                };
                match value {
                    Some(value) => output.push_str(&text_of(value)),
                    None => {
                        return Err(Error::new(
                            ErrorKind::Arguments,
                            format!("no argument for field `{{{field}}}`"),
                        ))
                    }
                }
            }
            '}' => return Err(Error::build("single `}` encountered in format string")),
            c => output.push(c),
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::{call_method, split_whitespace};
    use crate::{filter::Arguments, render::Value};
    use serde_json::json;

    #[test]
    fn test_string_methods() {
        let text = Value::from("  Hello World  ");
        let none = Arguments::new();
        assert_eq!(
            call_method(&text, "strip", &none).unwrap(),
            Value::from("Hello World")
        );
        assert_eq!(
            call_method(&Value::from("xxhixx"), "strip", &Arguments::new().with_positional("x"))
                .unwrap(),
            Value::from("hi")
        );
        assert_eq!(
            call_method(&Value::from("abc"), "upper", &none).unwrap(),
            Value::from("ABC")
        );
        assert_eq!(
            call_method(&Value::from("a-b-c"), "find", &Arguments::new().with_positional("b"))
                .unwrap(),
            Value::Int(2)
        );
        assert!(call_method(&Value::from("abc"), "nope", &none).is_err());
    }

    #[test]
    fn test_split() {
        let args = Arguments::new().with_positional(",").with_positional(1);
        assert_eq!(
            call_method(&Value::from("a,b,c"), "split", &args).unwrap(),
            Value::from(json!(["a", "b,c"]))
        );
        assert_eq!(split_whitespace(" a  b c ", Some(1)), vec!["a", "b c "]);
        assert_eq!(split_whitespace(" a  b ", None), vec!["a", "b"]);
    }

    #[test]
    fn test_format() {
        let args = Arguments::new()
            .with_positional("x")
            .with_positional(2)
            .with_named("name", "n");
        assert_eq!(
            call_method(&Value::from("{} {1} {name} {{}}"), "format", &args).unwrap(),
            Value::from("x 2 n {}")
        );
    }

    #[test]
    fn test_markup_is_kept() {
        let result = call_method(&Value::markup("<b>"), "upper", &Arguments::new()).unwrap();
        assert!(result.is_markup());
    }

    #[test]
    fn test_map_methods() {
        let map = Value::from(json!({"a": 1, "b": 2}));
        assert_eq!(
            call_method(&map, "keys", &Arguments::new()).unwrap(),
            Value::from(json!(["a", "b"]))
        );
        assert_eq!(
            call_method(&map, "get", &Arguments::new().with_positional("z").with_positional(0))
                .unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            call_method(&map, "get", &Arguments::new().with_positional("z")).unwrap(),
            Value::None
        );
    }

    #[test]
    fn test_list_methods() {
        let list = Value::from(json!([1, 2, 2]));
        let two = Arguments::new().with_positional(2);
        assert_eq!(call_method(&list, "index", &two).unwrap(), Value::Int(1));
        assert_eq!(call_method(&list, "count", &two).unwrap(), Value::Int(2));
    }
}
