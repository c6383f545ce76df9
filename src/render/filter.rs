//! Filter and test dispatch.
//!
//! Registered filters and tests are looked up on the engine when they are
//! applied. Filters that call other filters or tests, and `attr`, which is
//! subject to the attribute policy, are handled here.
use super::{compare::is_truthy, Renderer, Value};
use crate::{
    compile::tree::{Filter, Test},
    engine::UndefinedBehavior,
    filter::{text_of, Arguments},
    log::{error_security, Error, ErrorKind},
};

/// Filters provided by the renderer rather than the filter registry.
const HIGHER_ORDER: [&str; 6] = ["map", "select", "reject", "selectattr", "rejectattr", "attr"];

impl Renderer<'_> {
    /// Apply a filter node to the given input.
    pub(super) fn apply_filter(&mut self, node: &Filter, input: Value) -> Result<Value, Error> {
        let args = self.args(&node.args)?;
        self.call_filter(&node.name, &input, &args)
            .map_err(|e| self.locate(e, node.region))
    }

    fn call_filter(&mut self, name: &str, input: &Value, args: &Arguments) -> Result<Value, Error> {
        if !self.engine.policy().filter_allowed(name) {
            return Err(error_security(format!("filter `{name}` is not allowed")));
        }
        if input.is_undefined()
            && self.engine.undefined() == UndefinedBehavior::Strict
            && !matches!(name, "default" | "d")
        {
            return Err(Error::new(
                ErrorKind::Undefined,
                format!("value given to filter `{name}` is undefined"),
            )
            .with_help("use the `default` filter to provide a fallback"));
        }

        let engine = self.engine;
        if let Some(filter) = engine.get_filter(name) {
            return filter.apply(input, args);
        }

        match name {
            "map" => self.map(input, args),
            "select" => self.select(input, args, true, "select"),
            "reject" => self.select(input, args, false, "reject"),
            "selectattr" => self.select_attr(input, args, true, "selectattr"),
            "rejectattr" => self.select_attr(input, args, false, "rejectattr"),
            "attr" => {
                args.check("filter `attr`", &["name"])?;
                let name = args.get_str(0, "name")?.ok_or_else(|| {
                    Error::new(ErrorKind::Arguments, "filter `attr` requires a name")
                })?;
                self.path(input, name)
            }
            _ => Err(Error::new(
                ErrorKind::UnknownFilter,
                format!("filter `{name}` not found"),
            )
            .with_help("check the spelling, or register it with `.add_filter`")),
        }
    }

    /// Return true if a filter with the given name can be applied.
    fn has_filter(&self, name: &str) -> bool {
        self.engine.get_filter(name).is_some() || HIGHER_ORDER.contains(&name)
    }

    fn has_test(&self, name: &str) -> bool {
        self.engine.get_test(name).is_some() || matches!(name, "filter" | "test")
    }

    /// Evaluate a test node.
    pub(super) fn test(&mut self, node: &Test) -> Result<bool, Error> {
        let value = self.eval(&node.target)?;
        let args = self.args(&node.args)?;
        self.run_test(&node.name, &value, &args)
            .map_err(|e| self.locate(e, node.region))
    }

    fn run_test(&mut self, name: &str, value: &Value, args: &Arguments) -> Result<bool, Error> {
        match name {
            "filter" => Ok(value.as_str().is_some_and(|n| self.has_filter(n))),
            "test" => Ok(value.as_str().is_some_and(|n| self.has_test(n))),
            name => match self.engine.get_test(name) {
                Some(test) => test.test(value, args),
                None => Err(Error::new(
                    ErrorKind::UnknownTest,
                    format!("test `{name}` not found"),
                )
                .with_help("check the spelling, or register it with `.add_test`")),
            },
        }
    }

    /// Follow a dotted attribute path, checking each step against the
    /// attribute policy.
    fn path(&self, value: &Value, path: &str) -> Result<Value, Error> {
        let mut current = value.clone();
        for segment in path.split('.') {
            if !self.engine.policy().attribute_allowed(&current, segment) {
                return Err(error_security(format!(
                    "access to attribute `{segment}` of `{}` is not allowed",
                    current.kind()
                )));
            }
            current = match segment.parse::<i64>() {
                Ok(index) if current.as_list().is_some() => current.get_item(&Value::Int(index)),
                _ => current.get_attr(segment),
            };
            if current.is_undefined() {
                break;
            }
        }

        Ok(current)
    }

    /// `map(attribute='name', default=x)` or `map('filter', args...)`
    fn map(&mut self, input: &Value, args: &Arguments) -> Result<Value, Error> {
        let items = items(input, "map")?;
        if let Some(attribute) = args.named.get("attribute") {
            let path = text_of(attribute);
            let default = args.named.get("default");
            let mut mapped = Vec::with_capacity(items.len());
            for item in &items {
                let value = self.path(item, &path)?;
                mapped.push(match (value.is_undefined(), default) {
                    (true, Some(default)) => default.clone(),
                    _ => value,
                });
            }
            return Ok(Value::from(mapped));
        }

        let Some((name, rest)) = args.positional.split_first() else {
            return Err(Error::new(
                ErrorKind::Arguments,
                "filter `map` requires a filter name or `attribute=`",
            ));
        };
        let name = filter_name(name, "map")?;
        let rest = Arguments {
            positional: rest.to_vec(),
            named: args.named.clone(),
        };

        let mut mapped = Vec::with_capacity(items.len());
        for item in &items {
            mapped.push(self.call_filter(name, item, &rest)?);
        }
        Ok(Value::from(mapped))
    }

    /// `select('test', args...)` and `reject`, which keep items for which
    /// the test passes or fails. Without a test, items are tested for
    /// truthiness.
    fn select(
        &mut self,
        input: &Value,
        args: &Arguments,
        keep: bool,
        callee: &str,
    ) -> Result<Value, Error> {
        let items = items(input, callee)?;
        let (test, rest) = split_test(args, 0, callee)?;

        let mut selected = Vec::new();
        for item in items {
            let passed = match test {
                Some(test) => self.run_test(test, &item, &rest)?,
                None => is_truthy(&item),
            };
            if passed == keep {
                selected.push(item);
            }
        }
        Ok(Value::from(selected))
    }

    /// `selectattr('path', 'test', args...)` and `rejectattr`, which test an
    /// attribute of each item.
    fn select_attr(
        &mut self,
        input: &Value,
        args: &Arguments,
        keep: bool,
        callee: &str,
    ) -> Result<Value, Error> {
        let items = items(input, callee)?;
        let attribute = match args.positional.first() {
            Some(attribute) => text_of(attribute),
            None => {
                return Err(Error::new(
                    ErrorKind::Arguments,
                    format!("filter `{callee}` requires an attribute"),
                ))
            }
        };
        let (test, rest) = split_test(args, 1, callee)?;

        let mut selected = Vec::new();
        for item in items {
            let value = self.path(&item, &attribute)?;
            let passed = match test {
                Some(test) => self.run_test(test, &value, &rest)?,
                None => is_truthy(&value),
            };
            if passed == keep {
                selected.push(item);
            }
        }
        Ok(Value::from(selected))
    }
}

fn items(input: &Value, callee: &str) -> Result<Vec<Value>, Error> {
    input.try_iter().ok_or_else(|| {
        Error::new(
            ErrorKind::Type,
            format!(
                "filter `{callee}` requires an iterable, not `{}`",
                input.kind()
            ),
        )
    })
}

fn filter_name<'a>(value: &'a Value, callee: &str) -> Result<&'a str, Error> {
    value.as_str().ok_or_else(|| {
        Error::new(
            ErrorKind::Type,
            format!(
                "filter `{callee}` expects a name, not `{}`",
                value.kind()
            ),
        )
    })
}

/// Split the optional test name at the given position from the arguments
/// that follow it.
fn split_test<'a>(
    args: &'a Arguments,
    index: usize,
    callee: &str,
) -> Result<(Option<&'a str>, Arguments), Error> {
    match args.positional.get(index) {
        Some(name) => Ok((
            Some(filter_name(name, callee)?),
            Arguments {
                positional: args.positional[index + 1..].to_vec(),
                named: args.named.clone(),
            },
        )),
        None => Ok((None, Arguments::new())),
    }
}

#[cfg(test)]
mod tests {
    use crate::{engine::UndefinedBehavior, security::Sandbox, Engine, ErrorKind, Store};
    use serde_json::json;

    #[test]
    fn test_map() {
        let store = Store::new().with_must(
            "users",
            json!([{"name": "ann", "age": 30}, {"name": "bo"}]),
        );
        assert_eq!(
            render("{{ users|map(attribute='name')|join(',') }}", &store),
            "ann,bo"
        );
        assert_eq!(
            render("{{ users|map(attribute='age', default=0)|list }}", &store),
            "[30, 0]"
        );
        assert_eq!(
            render("{{ ['a', 'b']|map('upper')|join }}", &store),
            "AB"
        );
    }

    #[test]
    fn test_select_reject() {
        let store = Store::new().with_must("n", vec![0, 1, 2, 3, 4]);
        assert_eq!(render("{{ n|select('odd')|list }}", &store), "[1, 3]");
        assert_eq!(render("{{ n|reject('odd')|list }}", &store), "[0, 2, 4]");
        assert_eq!(render("{{ n|select|list }}", &store), "[1, 2, 3, 4]");
        assert_eq!(
            render("{{ n|select('greaterthan', 2)|list }}", &store),
            "[3, 4]"
        );
    }

    #[test]
    fn test_selectattr() {
        let store = Store::new().with_must(
            "users",
            json!([
                {"name": "ann", "active": true, "age": 30},
                {"name": "bo", "active": false, "age": 20}
            ]),
        );
        assert_eq!(
            render("{{ users|selectattr('active')|map(attribute='name')|join }}", &store),
            "ann"
        );
        assert_eq!(
            render(
                "{{ users|rejectattr('age', 'gt', 25)|map(attribute='name')|join }}",
                &store
            ),
            "bo"
        );
    }

    #[test]
    fn test_attr() {
        let store = Store::new().with_must("user", json!({"name": "ann"}));
        assert_eq!(render("{{ user|attr('name') }}", &store), "ann");
    }

    #[test]
    fn test_filter_and_test_tests() {
        let store = Store::new();
        assert_eq!(
            render(
                "{{ 'upper' is filter }}{{ 'map' is filter }}{{ 'nope' is filter }}{{ 'odd' is test }}",
                &store
            ),
            "TrueTrueFalseTrue"
        );
    }

    #[test]
    fn test_unknown_filter() {
        let engine = Engine::default();
        let template = engine.compile("{{ 1|nope }}").unwrap();
        let error = engine.render(&template, &Store::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnknownFilter);
        assert!(error.position().is_some());

        let template = engine.compile("{{ 1 is nope }}").unwrap();
        let error = engine.render(&template, &Store::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnknownTest);
    }

    #[test]
    fn test_strict_filter_input() {
        let engine = Engine::default().with_undefined(UndefinedBehavior::Strict);
        let template = engine.compile("{{ missing|upper }}").unwrap();
        let error = engine.render(&template, &Store::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Undefined);
    }

    #[test]
    fn test_denied_filter() {
        let engine = Engine::default().with_policy(Sandbox::new().deny_filter("upper"));
        let template = engine.compile("{{ 'a'|upper }}").unwrap();
        let error = engine.render(&template, &Store::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Security);
    }

    fn render(text: &str, store: &Store) -> String {
        let engine = Engine::default();
        let template = engine.compile(text).unwrap();
        engine.render(&template, store).unwrap()
    }
}
