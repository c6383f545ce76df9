//! Expression evaluation and calls.
use super::{
    compare::{compare, is_truthy},
    context::{Frame, FrameKind},
    method,
    operator::{binary, repeat_len, unary},
    value::MacroRef,
    Renderer, Value,
};
use crate::{
    compile::tree::{Args, BinOp, Call, Expr, Macro, Slice, UnaryOp},
    engine::UndefinedBehavior,
    filter::{text_of, Arguments},
    log::{error_security, Error, ErrorKind},
    region::Region,
    security::grow_stack,
};
use indexmap::IndexMap;
use std::sync::Arc;

impl Renderer<'_> {
    /// Evaluate an expression.
    ///
    /// Errors that do not point anywhere yet are pointed at the expression.
    pub(super) fn eval(&mut self, expr: &Expr) -> Result<Value, Error> {
        grow_stack(|| self.eval_inner(expr)).map_err(|e| self.locate(e, expr.region()))
    }

    fn eval_inner(&mut self, expr: &Expr) -> Result<Value, Error> {
        match expr {
            Expr::Const(c) => Ok(c.value.clone()),
            Expr::Name(name) => Ok(self.lookup(&name.name)),
            Expr::TemplateData(data) => Ok(self.wrap_output(data.text.clone())),
            Expr::List(list) => self.eval_items(&list.items),
            Expr::Tuple(tuple) => self.eval_items(&tuple.items),
            Expr::Dict(dict) => {
                let mut map = IndexMap::with_capacity(dict.pairs.len());
                for pair in &dict.pairs {
                    let key = match self.eval(&pair.key)? {
                        Value::String(s) | Value::Markup(s) => s.to_string(),
                        key => key.to_string(),
                    };
                    let value = self.eval(&pair.value)?;
                    map.insert(key, value);
                }
                Ok(Value::from(map))
            }
            Expr::Bin(bin) => {
                let left = self.eval(&bin.left)?;
                match bin.op {
                    BinOp::And | BinOp::Or => {
                        self.check_defined(&left, bin.left.region())?;
                        match (bin.op, is_truthy(&left)) {
                            (BinOp::And, false) | (BinOp::Or, true) => Ok(left),
                            _ => self.eval(&bin.right),
                        }
                    }
                    op => {
                        let right = self.eval(&bin.right)?;
                        self.check_defined(&left, bin.left.region())?;
                        self.check_defined(&right, bin.right.region())?;
                        if let Some(len) = repeat_len(op, &left, &right) {
                            if !self.engine.policy().memory_ok(len) {
                                return Err(error_security(format!(
                                    "repetition of {len} items exceeds the item limit"
                                )));
                            }
                        }
                        binary(op, &left, &right)
                    }
                }
            }
            Expr::Unary(node) => match node.op {
                UnaryOp::Not => Ok(Value::Bool(!self.truthy(&node.operand)?)),
                op => {
                    let operand = self.eval(&node.operand)?;
                    unary(op, &operand)
                }
            },
            Expr::Call(call) => self.call(call, None),
            Expr::Getattr(node) => {
                let target = self.eval(&node.target)?;
                self.attribute(&target, &node.attr, node.target.region())
            }
            Expr::Getitem(node) => {
                let target = self.eval(&node.target)?;
                if target.is_undefined() {
                    return self.undefined_target(node.target.region());
                }
                match &node.key {
                    Expr::Slice(slice) => self.slice(&target, slice),
                    key => {
                        let key = self.eval(key)?;
                        if let Some(name) = key.as_str() {
                            self.check_attribute(&target, name)?;
                        }
                        Ok(target.get_item(&key))
                    }
                }
            }
            Expr::Slice(_) => Err(Error::new(
                ErrorKind::Syntax,
                "a slice is only allowed inside of `[]`",
            )),
            Expr::Concat(concat) => {
                let mut parts = Vec::with_capacity(concat.items.len());
                for item in &concat.items {
                    let value = self.eval(item)?;
                    self.check_defined(&value, item.region())?;
                    parts.push(value);
                }

                match parts.iter().any(Value::is_markup) {
                    true => Ok(Value::markup(
                        parts.iter().map(|p| p.to_output(true)).collect::<String>(),
                    )),
                    false => Ok(Value::from(
                        parts.iter().map(text_of).collect::<String>(),
                    )),
                }
            }
            Expr::Compare(node) => {
                let mut left = self.eval(&node.first)?;
                self.check_defined(&left, node.first.region())?;
                for operand in &node.ops {
                    let right = self.eval(&operand.expr)?;
                    self.check_defined(&right, operand.expr.region())?;
                    if !compare(operand.op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Cond(node) => match self.truthy(&node.test)? {
                true => self.eval(&node.then),
                false => match &node.otherwise {
                    Some(otherwise) => self.eval(otherwise),
                    None => Ok(Value::Undefined),
                },
            },
            Expr::Filter(node) => {
                let input = match &node.target {
                    Some(target) => self.eval(target)?,
                    None => Value::Undefined,
                };
                self.apply_filter(node, input)
            }
            Expr::Test(node) => self.test(node).map(Value::Bool),
            Expr::NsRef(node) => {
                let target = self.lookup(&node.name);
                self.attribute(&target, &node.attr, node.region)
            }
            Expr::Await(node) => self.eval(&node.operand),
            Expr::MarkSafe(inner, _) => {
                let value = self.eval(inner)?;
                Ok(mark_safe(value))
            }
            Expr::MarkSafeIfAutoescape(inner, _) => {
                let value = self.eval(inner)?;
                match self.state.autoescape {
                    true => Ok(mark_safe(value)),
                    false => Ok(value),
                }
            }
        }
    }

    fn eval_items(&mut self, items: &[Expr]) -> Result<Value, Error> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            values.push(self.eval(item)?);
        }

        Ok(Value::from(values))
    }

    /// Evaluate an expression for its truthiness.
    pub(super) fn truthy(&mut self, expr: &Expr) -> Result<bool, Error> {
        let value = self.eval(expr)?;
        self.check_defined(&value, expr.region())?;

        Ok(is_truthy(&value))
    }

    /// Return the items of a value that a loop iterates over.
    pub(super) fn iterate(&self, value: &Value, region: Region) -> Result<Vec<Value>, Error> {
        self.check_defined(value, region)?;
        value.try_iter().ok_or_else(|| {
            Error::new(
                ErrorKind::Type,
                format!("`{}` is not iterable", value.kind()),
            )
            .with_help("loops accept lists, maps and strings")
        })
    }

    /// Resolve a name against the context, then the globals and functions
    /// of the engine.
    pub(super) fn lookup(&self, name: &str) -> Value {
        if let Some(value) = self.state.context.get(name) {
            return value.clone();
        }
        if name == "self" {
            return Value::SelfRef;
        }
        if let Some(value) = self.engine.get_global(name) {
            return value.clone();
        }
        match self.engine.get_function(name) {
            Some(_) => Value::Function(Arc::from(name)),
            None => Value::Undefined,
        }
    }

    /// Read an attribute, following the undefined behavior of the engine.
    fn attribute(&self, target: &Value, attr: &str, region: Region) -> Result<Value, Error> {
        if target.is_undefined() {
            return self.undefined_target(region);
        }
        self.check_attribute(target, attr)?;

        Ok(target.get_attr(attr))
    }

    fn check_attribute(&self, target: &Value, attr: &str) -> Result<(), Error> {
        match self.engine.policy().attribute_allowed(target, attr) {
            true => Ok(()),
            false => Err(error_security(format!(
                "access to attribute `{attr}` of `{}` is not allowed",
                target.kind()
            ))),
        }
    }

    /// Return the result of reading from an undefined value.
    fn undefined_target(&self, region: Region) -> Result<Value, Error> {
        match self.engine.undefined() {
            UndefinedBehavior::Chainable => Ok(Value::Undefined),
            _ => Err(self.undefined(region)),
        }
    }

    fn slice(&mut self, target: &Value, slice: &Slice) -> Result<Value, Error> {
        let mut bound = |expr: &Option<Expr>| -> Result<Option<i64>, Error> {
            let Some(expr) = expr else { return Ok(None) };
            match self.eval(expr)? {
                Value::Undefined | Value::None => Ok(None),
                value => value.as_int().map(Some).ok_or_else(|| {
                    Error::new(
                        ErrorKind::Type,
                        format!("slice indices must be integers, not `{}`", value.kind()),
                    )
                }),
            }
        };
        let start = bound(&slice.start)?;
        let stop = bound(&slice.stop)?;
        let step = bound(&slice.step)?.unwrap_or(1);
        if step == 0 {
            return Err(Error::new(ErrorKind::Runtime, "slice step cannot be zero"));
        }

        match target {
            Value::List(list) => Ok(Value::from(
                slice_indices(list.len(), start, stop, step)
                    .into_iter()
                    .map(|i| list[i].clone())
                    .collect::<Vec<_>>(),
            )),
            Value::String(text) | Value::Markup(text) => {
                let chars = text.chars().collect::<Vec<_>>();
                let sliced = slice_indices(chars.len(), start, stop, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect::<String>();
                match target.is_markup() {
                    true => Ok(Value::markup(sliced)),
                    false => Ok(Value::from(sliced)),
                }
            }
            other => Err(Error::new(
                ErrorKind::Type,
                format!("`{}` cannot be sliced", other.kind()),
            )),
        }
    }

    /// Evaluate a call expression.
    ///
    /// `caller` is passed to the callee as a named argument, and is given
    /// by `{% call %}`.
    pub(super) fn call(&mut self, call: &Call, caller: Option<Value>) -> Result<Value, Error> {
        let mut args = self.args(&call.args)?;
        if let Some(caller) = caller {
            args.named.insert("caller".to_string(), caller);
        }

        let Expr::Getattr(getattr) = &call.callee else {
            let callee = self.eval(&call.callee)?;
            return self.invoke(callee, args, call.callee.region());
        };

        let target = self.eval(&getattr.target)?;
        if target.is_undefined() {
            return Err(self.undefined(getattr.target.region()));
        }
        let name = getattr.attr.as_str();
        let attr = self.attribute(&target, name, getattr.target.region())?;
        if attr.is_callable() {
            return self.invoke(attr, args, call.callee.region());
        }
        if !self.engine.policy().method_call_allowed(&target, name) {
            return Err(error_security(format!(
                "calling method `{name}` of `{}` is not allowed",
                target.kind()
            )));
        }

        match (&target, name) {
            (Value::Loop(state), "cycle") => state.cycle(&args),
            (Value::Loop(state), "changed") => Ok(Value::Bool(state.changed(&args))),
            (Value::Object(object), name) => object.call_method(name, &args),
            (target, name) => method::call_method(target, name, &args),
        }
    }

    /// Evaluate the arguments at a call site.
    pub(super) fn args(&mut self, args: &Args) -> Result<Arguments, Error> {
        let mut arguments = Arguments::new();
        for expr in &args.positional {
            let value = self.eval(expr)?;
            arguments.positional.push(value);
        }
        for keyword in &args.named {
            let value = self.eval(&keyword.value)?;
            arguments.named.insert(keyword.name.clone(), value);
        }

        if let Some(spread) = &args.spread {
            let value = self.eval(spread)?;
            let items = value.try_iter().ok_or_else(|| {
                Error::new(
                    ErrorKind::Type,
                    format!("`*` requires an iterable, not `{}`", value.kind()),
                )
            })?;
            arguments.positional.extend(items);
        }
        if let Some(spread) = &args.spread_named {
            match self.eval(spread)? {
                Value::Map(map) => arguments
                    .named
                    .extend(map.iter().map(|(k, v)| (k.clone(), v.clone()))),
                other => {
                    return Err(Error::new(
                        ErrorKind::Type,
                        format!("`**` requires a map, not `{}`", other.kind()),
                    ))
                }
            }
        }

        Ok(arguments)
    }

    /// Call a value with evaluated arguments.
    fn invoke(&mut self, callee: Value, args: Arguments, region: Region) -> Result<Value, Error> {
        match callee {
            Value::Macro(m) => self.call_macro(&m, args),
            Value::Function(name) => {
                if !self.engine.policy().function_allowed(&name) {
                    return Err(error_security(format!(
                        "calling function `{name}` is not allowed"
                    )));
                }
                let engine = self.engine;
                match engine.get_function(&name) {
                    Some(function) => function.call(&args),
                    None => Err(Error::new(
                        ErrorKind::UnknownFunction,
                        format!("function `{name}` not found"),
                    )),
                }
            }
            Value::Block(block) => {
                self.descend()?;
                let mut buffer = String::new();
                let result = self.render_block_at(&block.name, block.index, &mut buffer);
                self.depth -= 1;
                result?;
                Ok(self.wrap_output(buffer))
            }
            Value::Loop(state) => {
                let Some(node) = &state.recurse else {
                    return Err(Error::new(
                        ErrorKind::Type,
                        "`loop` is only callable in a recursive loop",
                    ));
                };
                args.check("`loop`", &["iterable"])?;
                let iterable = args.get(0, "iterable").cloned().unwrap_or_default();

                self.descend()?;
                let mut buffer = String::new();
                let result = self.render_for(node, iterable, state.depth0 + 1, &mut buffer);
                self.depth -= 1;
                result?;

                Ok(self.wrap_output(buffer))
            }
            Value::Object(object) if object.is_callable() => object.call(&args),
            Value::Undefined => {
                let text = region.literal(self.state.template.source());
                Err(Error::new(
                    ErrorKind::UnknownFunction,
                    format!("`{text}` is not defined"),
                )
                .with_help("register it as a function or global, or define a macro"))
            }
            other => Err(Error::new(
                ErrorKind::Type,
                format!("`{}` is not callable", other.kind()),
            )),
        }
    }

    /// Call a macro, returning its rendered body.
    fn call_macro(&mut self, m: &Arc<MacroRef>, args: Arguments) -> Result<Value, Error> {
        log::trace!("calling macro `{}`", m.node.name);
        self.descend()?;
        let depth = self.state.context.depth();
        let saved = self.enter(m.template.clone());

        let result = self.bind_macro(m, args).and_then(|_| {
            let mut buffer = String::new();
            self.render_body(&m.node.body, &mut buffer)?;
            Ok(self.wrap_output(buffer))
        });

        self.leave(saved);
        self.state.context.truncate(depth);
        self.depth -= 1;

        result
    }

    /// Push the frames a macro body renders in, binding its parameters.
    fn bind_macro(&mut self, m: &Arc<MacroRef>, args: Arguments) -> Result<(), Error> {
        let (root, closure) = match &m.module {
            Some(module) => {
                let vars = module
                    .iter()
                    .map(|(k, v)| (k.clone(), rebind(v, module)))
                    .collect();
                self.state
                    .context
                    .push(Frame::with_vars(FrameKind::Root, vars));
                let closure = m
                    .closure
                    .iter()
                    .map(|(k, v)| (k.clone(), rebind(v, module)))
                    .collect();
                (self.state.context.depth() - 1, closure)
            }
            None => (m.root, m.closure.clone()),
        };
        self.state
            .context
            .push(Frame::with_vars(FrameKind::Barrier { root }, closure));

        let node = &m.node;
        if node.name != "caller" {
            self.state
                .context
                .set(node.name.clone(), Value::Macro(m.clone()));
        }

        let params = &node.params;
        let mut positional = args.positional.into_iter();
        let mut named = args.named;
        for param in &params.positional {
            let value = match (positional.next(), named.shift_remove(&param.name)) {
                (Some(_), Some(_)) => {
                    return Err(Error::new(
                        ErrorKind::Arguments,
                        format!(
                            "macro `{}` got multiple values for argument `{}`",
                            node.name, param.name
                        ),
                    ))
                }
                (Some(value), None) | (None, Some(value)) => value,
                (None, None) => match &param.default {
                    Some(default) => self.eval(default)?,
                    None => Value::Undefined,
                },
            };
            self.state.context.set(param.name.clone(), value);
        }

        for param in &params.keyword_only {
            let value = match (named.shift_remove(&param.name), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval(default)?,
                (None, None) => {
                    return Err(Error::new(
                        ErrorKind::Arguments,
                        format!(
                            "macro `{}` is missing keyword argument `{}`",
                            node.name, param.name
                        ),
                    ))
                }
            };
            self.state.context.set(param.name.clone(), value);
        }

        let rest = positional.collect::<Vec<_>>();
        match params
            .varargs
            .as_deref()
            .or(node.uses_varargs.then_some("varargs"))
        {
            Some(name) => self.state.context.set(name, Value::from(rest)),
            None if !rest.is_empty() => {
                return Err(Error::new(
                    ErrorKind::Arguments,
                    format!(
                        "macro `{}` takes {} positional argument{}, {} given",
                        node.name,
                        params.positional.len(),
                        if params.positional.len() == 1 { "" } else { "s" },
                        params.positional.len() + rest.len()
                    ),
                ))
            }
            None => {}
        }

        if !params.declares("caller") {
            let caller = named.shift_remove("caller");
            if node.uses_caller {
                self.state.context.set("caller", caller.unwrap_or_default());
            }
        }

        match params
            .kwargs
            .as_deref()
            .or(node.uses_kwargs.then_some("kwargs"))
        {
            Some(name) => self.state.context.set(name, Value::from(named)),
            None => {
                if let Some(name) = named.keys().next() {
                    return Err(Error::new(
                        ErrorKind::Arguments,
                        format!("macro `{}` got an unexpected argument `{name}`", node.name),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Bind a macro definition to the current template and scope.
    pub(super) fn define_macro(&self, node: Arc<Macro>) -> Value {
        Value::Macro(Arc::new(MacroRef {
            node,
            template: self.state.template.clone(),
            closure: self.state.context.locals(),
            module: None,
            root: self.state.context.current_root(),
        }))
    }
}

/// Bind a macro exported from a module to the top level names of that
/// module, so it keeps resolving them wherever it is called.
pub(super) fn rebind(value: &Value, environment: &Arc<IndexMap<String, Value>>) -> Value {
    match value {
        Value::Macro(m) if m.module.is_none() => Value::Macro(Arc::new(MacroRef {
            node: m.node.clone(),
            template: m.template.clone(),
            closure: m.closure.clone(),
            module: Some(environment.clone()),
            root: 0,
        })),
        other => other.clone(),
    }
}

fn mark_safe(value: Value) -> Value {
    match value {
        Value::Markup(_) => value,
        value => Value::markup(text_of(&value)),
    }
}

/// Return the indices selected by a slice over a sequence of the given
/// length, with negative bounds counting from the end.
fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let mut indices = Vec::new();
    if step > 0 {
        let clamp = |bound: Option<i64>, default: i64| match bound {
            None => default,
            Some(b) if b < 0 => (b + len).max(0),
            Some(b) => b.min(len),
        };
        let mut index = clamp(start, 0);
        let stop = clamp(stop, len);
        while index < stop {
            indices.push(index as usize);
            index += step;
        }
    } else {
        let clamp = |bound: Option<i64>, default: i64| match bound {
            None => default,
            Some(b) if b < 0 => (b + len).max(-1),
            Some(b) => b.min(len - 1),
        };
        let mut index = clamp(start, len - 1);
        let stop = clamp(stop, -1);
        while index > stop {
            indices.push(index as usize);
            index += step;
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::slice_indices;
    use crate::{engine::UndefinedBehavior, security::Sandbox, Engine, ErrorKind, Store};

    #[test]
    fn test_slice_indices() {
        assert_eq!(slice_indices(5, None, None, 1), vec![0, 1, 2, 3, 4]);
        assert_eq!(slice_indices(5, Some(1), Some(-1), 1), vec![1, 2, 3]);
        assert_eq!(slice_indices(5, None, None, -2), vec![4, 2, 0]);
        assert_eq!(slice_indices(5, Some(-2), None, 1), vec![3, 4]);
        assert_eq!(slice_indices(3, Some(10), None, 1), Vec::<usize>::new());
    }

    #[test]
    fn test_eval_precedence() {
        assert_eq!(render("{{ 1 + 2 * 3 }}", &Store::new()), "7");
        assert_eq!(render("{{ (1 + 2) * 3 }}", &Store::new()), "9");
        assert_eq!(render("{{ 2 ** 3 ** 2 }}", &Store::new()), "512");
        assert_eq!(render("{{ not 1 == 2 }}", &Store::new()), "True");
        assert_eq!(render("{{ -2 ** 2 }}", &Store::new()), "4");
    }

    #[test]
    fn test_eval_logic_returns_operand() {
        let store = Store::new().with_must("name", "");
        assert_eq!(render("{{ name or 'anonymous' }}", &store), "anonymous");
        assert_eq!(render("{{ 0 and 1 }}", &store), "0");
    }

    #[test]
    fn test_eval_compare_chain() {
        let store = Store::new().with_must("x", 5);
        assert_eq!(render("{{ 1 < x <= 5 }}", &store), "True");
        assert_eq!(render("{{ 1 < x < 5 }}", &store), "False");
        assert_eq!(render("{{ 'a' in 'cat' }}{{ 3 not in [1, 2] }}", &store), "TrueTrue");
    }

    #[test]
    fn test_eval_access() {
        let store = Store::new().with_must(
            "user",
            serde_json::json!({"name": "Ann", "tags": ["a", "b", "c"]}),
        );
        assert_eq!(
            render("{{ user.name }}{{ user['name'] }}{{ user.tags[-1] }}", &store),
            "AnnAnnc"
        );
        assert_eq!(render("{{ user.tags[1:] }}", &store), "['b', 'c']");
        assert_eq!(render("{{ 'hello'[::-1] }}", &store), "olleh");
        assert_eq!(render("[{{ user.missing }}]", &store), "[]");
    }

    #[test]
    fn test_eval_concat_and_conditional() {
        let store = Store::new().with_must("n", 3);
        assert_eq!(render("{{ 'n=' ~ n ~ '!' }}", &store), "n=3!");
        assert_eq!(render("{{ 'big' if n > 2 else 'small' }}", &store), "big");
        assert_eq!(render("[{{ 'x' if false }}]", &store), "[]");
    }

    #[test]
    fn test_eval_literals() {
        assert_eq!(
            render("{{ [1, 'a', none, true] }} {{ {'k': (1, 2)} }}", &Store::new()),
            "[1, 'a', None, True] {'k': [1, 2]}"
        );
    }

    #[test]
    fn test_eval_methods() {
        let store = Store::new().with_must("text", " Hi There ");
        assert_eq!(
            render("{{ text.strip().lower() }}|{{ text.split()|join('-') }}", &store),
            "hi there|Hi-There"
        );
        assert_eq!(render("{{ '{} and {}'.format(1, 2) }}", &store), "1 and 2");
    }

    #[test]
    fn test_eval_spread_arguments() {
        let template = "{% macro add(a, b) %}{{ a + b }}{% endmacro %}\
            {{ add(*[1, 2]) }} {{ add(**{'a': 3, 'b': 4}) }}";
        assert_eq!(render(template, &Store::new()), "3 7");
    }

    #[test]
    fn test_eval_functions_and_globals() {
        let engine = Engine::default().with_global("site", "kiln");
        let template = engine
            .compile("{{ site }} {{ range(3)|list }} {{ dict(a=1).a }}")
            .unwrap();
        assert_eq!(
            engine.render(&template, &Store::new()).unwrap(),
            "kiln [0, 1, 2] 1"
        );
    }

    #[test]
    fn test_eval_unknown_function() {
        let engine = Engine::default();
        let template = engine.compile("{{ nothing(1) }}").unwrap();
        let error = engine.render(&template, &Store::new()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::UnknownFunction);
        assert!(error.reason().contains("`nothing` is not defined"));
    }

    #[test]
    fn test_eval_strict_undefined() {
        let engine = Engine::default().with_undefined(UndefinedBehavior::Strict);
        for text in ["{{ missing + 1 }}", "{% if missing %}{% endif %}", "{% for i in missing %}{% endfor %}"] {
            let template = engine.compile(text).unwrap();
            let error = engine.render(&template, &Store::new()).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Undefined);
        }

        let template = engine.compile("{{ missing is defined }}").unwrap();
        assert_eq!(engine.render(&template, &Store::new()).unwrap(), "False");
    }

    #[test]
    fn test_eval_sandbox_attributes() {
        let engine = Engine::default().with_policy(Sandbox::new());
        let template = engine.compile("{{ user._secret }}").unwrap();
        let store = Store::new().with_must("user", serde_json::json!({"_secret": 1}));
        let error = engine.render(&template, &store).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Security);
    }

    #[test]
    fn test_eval_sandbox_functions() {
        let engine = Engine::default().with_policy(Sandbox::new().deny_function("range"));
        let template = engine.compile("{{ range(3) }}").unwrap();
        let error = engine.render(&template, &Store::new()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Security);
    }

    fn render(text: &str, store: &Store) -> String {
        let engine = Engine::default();
        let template = engine.compile(text).unwrap();
        engine.render(&template, store).unwrap()
    }
}
