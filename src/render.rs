//! Kiln renderer.
//!
//! Walks the tree of a compiled [`Template`] against a [`Store`], writing
//! output as it goes. Statements are rendered here, expressions and calls
//! in the `expression` module, and filter and test dispatch in `filter`.
pub(crate) mod compare;
pub(crate) mod context;
pub(crate) mod operator;
pub(crate) mod pipe;
pub(crate) mod value;

mod expression;
mod filter;
mod method;

pub use value::Value;

use crate::{
    compile::{
        tree::{Expr, For, Stmt, Trans},
        BlockChain, Template,
    },
    engine::UndefinedBehavior,
    log::{error_security, error_write, Error, ErrorKind},
    region::Region,
    security::grow_stack,
    Engine, Store,
};
use context::{Context, Frame, FrameKind};
use indexmap::IndexMap;
use pipe::Pipe;
use std::{
    mem,
    sync::{Arc, Mutex},
    time::Instant,
};
use value::{BlockRef, Loop, Namespace};

/// Render a [`Template`].
///
/// Provides a shortcut to quickly render a `Template` when no advanced features
/// are needed.
///
/// You may also prefer to create an [`Engine`][`crate::Engine`] if you intend to
/// use custom filters in your templates.
///
/// # Examples
///
/// ```
/// use kiln::{compile, render, Store};
///
/// let template = compile("hello, {{ name }}!");
/// assert!(template.is_ok());
///
/// let output = render(&template.unwrap(), &Store::new().with_must("name", "taylor"));
/// assert_eq!(output.unwrap(), "hello, taylor!");
/// ```
pub fn render(template: &Arc<Template>, store: &Store) -> Result<String, Error> {
    Engine::default().render(template, store)
}

/// How a statement list finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Everything that changes when the renderer moves into another template
/// through an include or import.
struct State {
    context: Context,
    /// The template whose statements are being rendered.
    template: Arc<Template>,
    /// Every block along the inheritance chain, most derived first.
    blocks: Arc<IndexMap<String, BlockChain>>,
    /// An `extends` tag was rendered, so output is discarded.
    extended: bool,
    /// Names given to `export`, if any.
    exported: Option<Vec<String>>,
    autoescape: bool,
}

impl State {
    fn new(vars: IndexMap<String, Value>, template: Arc<Template>) -> Self {
        Self {
            context: Context::new(vars),
            autoescape: template.autoescape(),
            template,
            blocks: Arc::default(),
            extended: false,
            exported: None,
        }
    }
}

/// The parts of [`State`] swapped while rendering a block or macro from
/// another template.
struct Saved {
    template: Arc<Template>,
    autoescape: bool,
    extended: bool,
}

pub(crate) struct Renderer<'engine> {
    /// An engine containing the registries and collaborators.
    engine: &'engine Engine,
    state: State,
    /// Number of macro calls, includes, imports and recursive loops that
    /// are active.
    depth: usize,
    started: Instant,
    /// Number of bytes produced so far.
    written: usize,
}

impl<'engine> Renderer<'engine> {
    /// Create a new Renderer.
    pub fn new(engine: &'engine Engine, template: Arc<Template>, store: &Store) -> Self {
        Self {
            engine,
            state: State::new(store.data().clone(), template),
            depth: 0,
            started: Instant::now(),
            written: 0,
        }
    }

    /// Render the [`Template`] stored inside the [`Renderer`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if any statement within the `Template` cannot be
    /// rendered.
    pub fn render(mut self) -> Result<String, Error> {
        log::debug!(
            "rendering template `{}`",
            self.state.template.name().unwrap_or("?")
        );
        let mut buffer = String::with_capacity(self.state.template.source().len());
        self.render_template(&mut buffer)?;

        Ok(buffer)
    }

    /// Render a single block of the [`Template`], resolved through its
    /// inheritance chain.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the block does not exist, or cannot be rendered.
    pub fn render_block(mut self, name: &str) -> Result<String, Error> {
        let template = self.state.template.clone();
        let chain = self.load_chain(&template)?;
        self.state.blocks = Arc::new(block_chains(&chain));
        if !self.state.blocks.contains_key(name) {
            return Err(Error::build(format!("block `{name}` not found"))
                .named(template.name())
                .with_help(format!(
                    "the template defines these blocks: {}",
                    self.state
                        .blocks
                        .keys()
                        .map(|k| format!("`{k}`"))
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
        }

        let mut buffer = String::new();
        self.render_block_at(name, 0, &mut buffer)?;
        Ok(buffer)
    }

    /// Evaluate a standalone expression against the store.
    pub fn evaluate(mut self, expr: &Expr) -> Result<Value, Error> {
        self.eval(expr)
    }

    /// Render the current template and every template it extends.
    fn render_template(&mut self, out: &mut String) -> Result<(), Error> {
        let template = self.state.template.clone();
        let chain = self.load_chain(&template)?;
        self.state.blocks = Arc::new(block_chains(&chain));

        for template in chain {
            self.state.autoescape = template.autoescape();
            self.state.template = template.clone();
            self.state.extended = false;
            self.render_body(&template.root().body, out)?;
            if !self.state.extended {
                break;
            }
        }

        Ok(())
    }

    /// Load every template along the inheritance chain of the given one,
    /// most derived first.
    fn load_chain(&self, template: &Arc<Template>) -> Result<Vec<Arc<Template>>, Error> {
        let mut chain = vec![template.clone()];
        let mut names = vec![template.name().unwrap_or("?").to_string()];
        let mut current = template.clone();

        while let Some((parent, region)) = current.root().extends.clone() {
            let locate = |e: Error| e.located(current.source(), region).named(current.name());
            if names.contains(&parent) {
                names.push(parent);
                return Err(locate(Error::new(
                    ErrorKind::CircularExtends,
                    format!("circular inheritance: {}", names.join(" -> ")),
                )));
            }

            let next = self.engine.get_template(&parent).map_err(locate)?;
            log::trace!("`{}` extends `{parent}`", names[names.len() - 1]);
            names.push(parent);
            chain.push(next.clone());
            current = next;
        }

        Ok(chain)
    }

    /// Render a list of statements, stopping early on `break` or `continue`.
    fn render_body(&mut self, body: &[Stmt], out: &mut String) -> Result<Flow, Error> {
        grow_stack(|| -> Result<Flow, Error> {
            for stmt in body {
                let flow = self
                    .render_stmt(stmt, out)
                    .map_err(|e| self.locate(e, stmt.region()))?;
                if flow != Flow::Normal {
                    return Ok(flow);
                }
            }

            Ok(Flow::Normal)
        })
    }

    fn render_stmt(&mut self, stmt: &Stmt, out: &mut String) -> Result<Flow, Error> {
        match stmt {
            Stmt::Output(output) => {
                for node in &output.nodes {
                    match node {
                        Expr::TemplateData(data) => self.write(out, &data.text)?,
                        expr => {
                            let value = self.eval(expr)?;
                            self.write_value(out, &value, expr.region())?;
                        }
                    }
                }
            }
            Stmt::If(node) => {
                for (test, body) in &node.branches {
                    if self.truthy(test)? {
                        return self.render_body(body, out);
                    }
                }
                if let Some(otherwise) = &node.otherwise {
                    return self.render_body(otherwise, out);
                }
            }
            Stmt::For(node) => {
                let iterable = self.eval(&node.iter)?;
                self.render_for(node, iterable, 0, out)?;
            }
            Stmt::Block(block) => {
                if !self.state.extended {
                    self.render_block_at(&block.name, 0, out)?;
                }
            }
            Stmt::Macro(node) => {
                let value = self.define_macro(node.clone());
                self.state.context.set(node.name.clone(), value);
            }
            Stmt::CallBlock(node) => {
                let caller = self.define_macro(node.caller.clone());
                let Expr::Call(call) = &node.call else {
                    return Err(Error::new(ErrorKind::Syntax, "expected a call"));
                };
                let value = self.call(call, Some(caller))?;
                self.write_value(out, &value, node.region)?;
            }
            Stmt::FilterBlock(node) => {
                let (mut value, flow) = self.capture(&node.body)?;
                for filter in &node.filters {
                    value = self.apply_filter(filter, value)?;
                }
                self.write_value(out, &value, node.region)?;
                return Ok(flow);
            }
            Stmt::With(node) => {
                let mut values = Vec::with_capacity(node.values.len());
                for value in &node.values {
                    values.push(self.eval(value)?);
                }

                return self.scoped(out, |r, out| {
                    for (target, value) in node.targets.iter().zip(values) {
                        r.bind(target, value)?;
                    }
                    r.render_body(&node.body, out)
                });
            }
            Stmt::Namespace(node) => {
                let depth = self.state.context.depth();
                self.state.context.push(Frame::new(FrameKind::Scope));
                let result = self.render_body(&node.body, out);
                let vars = self.state.context.innermost().clone();
                self.state.context.truncate(depth);
                result?;

                let namespace = Value::Namespace(Arc::new(Namespace::new(vars)));
                self.state.context.set(node.name.clone(), namespace);
            }
            Stmt::Export(node) => {
                self.state
                    .exported
                    .get_or_insert_with(Vec::new)
                    .extend(node.names.iter().map(|(name, _)| name.clone()));
            }
            Stmt::Assign(node) => {
                let value = self.eval(&node.value)?;
                self.bind(&node.target, value)?;
            }
            Stmt::AssignBlock(node) => {
                let (mut value, _) = self.capture(&node.body)?;
                for filter in &node.filters {
                    value = self.apply_filter(filter, value)?;
                }
                self.bind(&node.target, value)?;
            }
            Stmt::Import(node) => {
                let module = self.import(&node.template, node.with_context)?;
                self.state
                    .context
                    .set(node.alias.clone(), Value::from(module));
            }
            Stmt::FromImport(node) => {
                let module = self.import(&node.template, node.with_context)?;
                for (name, alias, _) in &node.names {
                    let value = module.get(name).cloned().unwrap_or_default();
                    let alias = alias.as_ref().unwrap_or(name);
                    self.state.context.set(alias.clone(), value);
                }
            }
            Stmt::Include(node) => {
                if !self.state.extended {
                    self.include(&node.template, node.ignore_missing, node.with_context, out)?;
                }
            }
            Stmt::Extends(_) => self.state.extended = true,
            Stmt::Trans(node) => {
                let value = self.translate(node)?;
                self.write_value(out, &value, node.region)?;
            }
            Stmt::Break(_) => return Ok(Flow::Break),
            Stmt::Continue(_) => return Ok(Flow::Continue),
            Stmt::Do(node) => {
                self.eval(&node.expr)?;
            }
            Stmt::Spaceless(node) => {
                let (text, flow) = self.capture_text(&node.body)?;
                self.write(out, &spaceless(&text))?;
                return Ok(flow);
            }
            Stmt::Scope(node) => return self.scoped(out, |r, out| r.render_body(&node.body, out)),
            Stmt::Autoescape(node) => {
                let enabled = self.truthy(&node.enabled)?;
                let autoescape = mem::replace(&mut self.state.autoescape, enabled);
                let result = self.render_body(&node.body, out);
                self.state.autoescape = autoescape;
                return result;
            }
        }

        Ok(Flow::Normal)
    }

    /// Run `f` inside of a new scope frame, removing the frame afterward.
    fn scoped<F>(&mut self, out: &mut String, f: F) -> Result<Flow, Error>
    where
        F: FnOnce(&mut Self, &mut String) -> Result<Flow, Error>,
    {
        let depth = self.state.context.depth();
        self.state.context.push(Frame::new(FrameKind::Scope));
        let result = f(self, out);
        self.state.context.truncate(depth);

        result
    }

    /// Render a loop over the given iterable.
    ///
    /// `depth0` is zero for a loop statement, and increases each time a
    /// recursive loop calls itself.
    fn render_for(
        &mut self,
        node: &Arc<For>,
        iterable: Value,
        depth0: usize,
        out: &mut String,
    ) -> Result<(), Error> {
        let items = self.iterate(&iterable, node.iter.region())?;
        let items = match &node.filter {
            Some(filter) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    let depth = self.state.context.depth();
                    self.state.context.push(Frame::new(FrameKind::Scope));
                    let keep = self
                        .bind(&node.target, item.clone())
                        .and_then(|_| self.truthy(filter));
                    self.state.context.truncate(depth);
                    if keep? {
                        kept.push(item);
                    }
                }
                kept
            }
            None => items,
        };

        if !self.engine.policy().memory_ok(items.len()) {
            return Err(error_security(format!(
                "loop over {} items exceeds the item limit",
                items.len()
            )));
        }
        if items.is_empty() {
            if let Some(otherwise) = &node.otherwise {
                self.render_body(otherwise, out)?;
            }
            return Ok(());
        }

        let changed = Arc::new(Mutex::new(None));
        let recurse = node.recursive.then(|| node.clone());
        let length = items.len();
        for (index, item) in items.iter().enumerate() {
            self.check_time()?;
            let state = Loop {
                index0: index,
                length,
                depth0,
                previtem: index.checked_sub(1).map(|i| items[i].clone()),
                nextitem: items.get(index + 1).cloned(),
                changed: changed.clone(),
                recurse: recurse.clone(),
            };

            let flow = self.scoped(out, |r, out| {
                r.state.context.set("loop", Value::Loop(Arc::new(state)));
                r.bind(&node.target, item.clone())?;
                r.render_body(&node.body, out)
            })?;
            if flow == Flow::Break {
                break;
            }
        }

        Ok(())
    }

    /// Render the definition of a block at the given position in its chain.
    fn render_block_at(&mut self, name: &str, index: usize, out: &mut String) -> Result<(), Error> {
        let blocks = self.state.blocks.clone();
        let Some(chain) = blocks.get(name) else {
            return Err(Error::build(format!("block `{name}` is not defined")));
        };
        let Some((template, block)) = chain.get(index) else {
            return Err(Error::build(format!("block `{name}` has no parent definition"))
                .with_help("`super()` is only available when a parent template defines the block"));
        };
        if block.required {
            return Err(Error::build(format!("required block `{name}` not found"))
                .with_help("templates extending this one must override the block"));
        }
        log::trace!(
            "rendering block `{name}` ({} of {}) from `{}`",
            index + 1,
            chain.len(),
            template.name().unwrap_or("?")
        );

        let depth = self.state.context.depth();
        let kind = match block.scoped {
            true => FrameKind::Scope,
            false => FrameKind::Barrier {
                root: self.state.context.current_root(),
            },
        };
        self.state.context.push(Frame::new(kind));
        if index + 1 < chain.len() {
            let parent = BlockRef {
                name: name.to_string(),
                index: index + 1,
            };
            self.state.context.set("super", Value::Block(Arc::new(parent)));
        }

        let saved = self.enter(template.clone());
        let result = self.render_body(&block.body, out);
        self.leave(saved);
        self.state.context.truncate(depth);

        result.map(|_| ())
    }

    /// Render a template in place, with its own state.
    fn include(
        &mut self,
        names: &Expr,
        ignore_missing: bool,
        with_context: bool,
        out: &mut String,
    ) -> Result<(), Error> {
        let names = self.eval(names)?;
        let template = match self.resolve_template(&names) {
            Err(e)
                if ignore_missing
                    && matches!(
                        e.kind(),
                        ErrorKind::TemplateNotFound | ErrorKind::TemplatesNotFound
                    ) =>
            {
                return Ok(())
            }
            result => result?,
        };
        let vars = match with_context {
            true => self.state.context.flatten(),
            false => IndexMap::new(),
        };

        self.descend()?;
        let saved = mem::replace(&mut self.state, State::new(vars, template));
        let result = self.render_template(out);
        self.state = saved;
        self.depth -= 1;

        result
    }

    /// Render a template as a module, returning the names it exports.
    fn import(&mut self, name: &Expr, with_context: bool) -> Result<IndexMap<String, Value>, Error> {
        let name = self.eval(name)?;
        let template = self.resolve_template(&name)?;
        let vars = match with_context {
            true => self.state.context.flatten(),
            false => IndexMap::new(),
        };
        log::debug!("importing `{}`", template.name().unwrap_or("?"));

        self.descend()?;
        let mut state = State::new(vars, template);
        state.context.push(Frame::new(FrameKind::Scope));
        let saved = mem::replace(&mut self.state, state);
        let result = self.render_template(&mut String::new());
        let module = mem::replace(&mut self.state, saved);
        self.depth -= 1;
        result?;

        let environment = Arc::new(module.context.flatten());
        let exports = module
            .context
            .innermost()
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .filter(|(name, _)| {
                module
                    .exported
                    .as_ref()
                    .map_or(true, |exported| exported.contains(*name))
            })
            .map(|(name, value)| (name.clone(), expression::rebind(value, &environment)))
            .collect();

        Ok(exports)
    }

    /// Resolve a template name, or a list of names where the first one
    /// found is used.
    fn resolve_template(&self, names: &Value) -> Result<Arc<Template>, Error> {
        match names {
            Value::String(name) | Value::Markup(name) => self.engine.get_template(name),
            Value::List(list) => {
                let names = list
                    .iter()
                    .map(|n| match n.as_str() {
                        Some(name) => Ok(name.to_string()),
                        None => Err(template_name_error(n)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.engine.select_template(&names)
            }
            other => Err(template_name_error(other)),
        }
    }

    /// Render a `trans` statement.
    fn translate(&mut self, node: &Trans) -> Result<Value, Error> {
        let mut vars = IndexMap::new();
        for (name, expr) in &node.variables {
            let value = self.eval(expr)?;
            vars.insert(name.clone(), value);
        }
        for name in &node.referenced {
            let value = self.lookup(name);
            vars.insert(name.clone(), value);
        }

        let translator = self.engine.translator();
        let message = match (&node.plural, &node.count) {
            (Some(plural), Some(count)) => {
                let n = match vars.get(count) {
                    Some(Value::Float(f)) => f.trunc() as i64,
                    Some(value) => value.as_int().ok_or_else(|| {
                        Error::new(
                            ErrorKind::Type,
                            format!("count `{count}` must be a number, not `{}`", value.kind()),
                        )
                    })?,
                    None => 0,
                };
                match &node.context {
                    Some(context) => translator.npgettext(context, &node.singular, plural, n),
                    None => translator.ngettext(&node.singular, plural, n),
                }
            }
            _ => match &node.context {
                Some(context) => translator.pgettext(context, &node.singular),
                None => translator.gettext(&node.singular),
            },
        };

        let text = operator::format(&message, &Value::from(vars), self.state.autoescape)?;
        Ok(self.wrap_output(text))
    }

    /// Render statements into a new buffer, returning the output as a value.
    ///
    /// Output is markup when autoescaping is active.
    fn capture(&mut self, body: &[Stmt]) -> Result<(Value, Flow), Error> {
        let (text, flow) = self.capture_text(body)?;
        Ok((self.wrap_output(text), flow))
    }

    fn capture_text(&mut self, body: &[Stmt]) -> Result<(String, Flow), Error> {
        let extended = mem::take(&mut self.state.extended);
        let mut buffer = String::new();
        let result = self.render_body(body, &mut buffer);
        self.state.extended = extended;

        Ok((buffer, result?))
    }

    /// Convert rendered output into a value.
    fn wrap_output(&self, text: String) -> Value {
        match self.state.autoescape {
            true => Value::markup(text),
            false => Value::from(text),
        }
    }

    /// Bind a value to an assignment target in the innermost frame.
    fn bind(&mut self, target: &Expr, value: Value) -> Result<(), Error> {
        match target {
            Expr::Name(name) => {
                self.state.context.set(name.name.clone(), value);
                Ok(())
            }
            Expr::Tuple(tuple) => self.unpack(&tuple.items, value),
            Expr::List(list) => self.unpack(&list.items, value),
            Expr::NsRef(reference) => match self.lookup(&reference.name) {
                Value::Namespace(namespace) => {
                    namespace.set(&reference.attr, value);
                    Ok(())
                }
                other => Err(Error::new(
                    ErrorKind::Type,
                    format!(
                        "cannot assign attribute on `{}` of type `{}`",
                        reference.name,
                        other.kind()
                    ),
                )
                .with_help("only namespace objects support attribute assignment")),
            },
            other => Err(Error::new(ErrorKind::Syntax, "cannot assign to expression")
                .located(self.state.template.source(), other.region())),
        }
    }

    fn unpack(&mut self, targets: &[Expr], value: Value) -> Result<(), Error> {
        let items = value.try_iter().ok_or_else(|| {
            Error::new(
                ErrorKind::Type,
                format!("cannot unpack `{}` into {} names", value.kind(), targets.len()),
            )
        })?;
        if items.len() != targets.len() {
            return Err(Error::new(
                ErrorKind::Type,
                format!(
                    "expected {} values to unpack, found {}",
                    targets.len(),
                    items.len()
                ),
            ));
        }

        for (target, item) in targets.iter().zip(items) {
            self.bind(target, item)?;
        }
        Ok(())
    }

    /// Switch to rendering statements that belong to another template.
    fn enter(&mut self, template: Arc<Template>) -> Saved {
        let autoescape = template.autoescape();
        Saved {
            template: mem::replace(&mut self.state.template, template),
            autoescape: mem::replace(&mut self.state.autoescape, autoescape),
            extended: mem::take(&mut self.state.extended),
        }
    }

    fn leave(&mut self, saved: Saved) {
        self.state.template = saved.template;
        self.state.autoescape = saved.autoescape;
        self.state.extended = saved.extended;
    }

    /// Enter a macro call, include, import or recursive loop.
    fn descend(&mut self) -> Result<(), Error> {
        let depth = self.depth + 1;
        if depth > self.engine.max_recursion() {
            return Err(Error::new(
                ErrorKind::Recursion,
                format!(
                    "maximum recursion depth of {} exceeded",
                    self.engine.max_recursion()
                ),
            )
            .with_help("check for a macro or include that calls itself without stopping"));
        }
        if !self.engine.policy().recursion_ok(depth) {
            return Err(error_security(format!(
                "recursion depth of {depth} is not allowed"
            )));
        }
        self.check_time()?;

        self.depth = depth;
        Ok(())
    }

    fn check_time(&self) -> Result<(), Error> {
        match self.engine.policy().time_ok(self.started.elapsed()) {
            true => Ok(()),
            false => Err(error_security("render exceeded the time limit")),
        }
    }

    /// Write template text.
    fn write(&mut self, out: &mut String, text: &str) -> Result<(), Error> {
        if self.state.extended {
            return Ok(());
        }
        out.push_str(text);
        self.account(text.len())
    }

    /// Write a value, escaping it when autoescaping is active.
    fn write_value(&mut self, out: &mut String, value: &Value, region: Region) -> Result<(), Error> {
        self.check_defined(value, region)?;
        if self.state.extended {
            return Ok(());
        }

        let mut pipe = Pipe::new(out);
        pipe.write_value(value, self.state.autoescape)
            .map_err(|_| error_write())?;
        let written = pipe.written();
        self.account(written)
    }

    fn account(&mut self, bytes: usize) -> Result<(), Error> {
        self.written += bytes;
        match self.engine.policy().output_ok(self.written) {
            true => Ok(()),
            false => Err(error_security(format!(
                "output of {} bytes exceeds the size limit",
                self.written
            ))),
        }
    }

    /// Return an error for an undefined value under the strict policy.
    fn check_defined(&self, value: &Value, region: Region) -> Result<(), Error> {
        match value.is_undefined() && self.engine.undefined() == UndefinedBehavior::Strict {
            true => Err(self.undefined(region)),
            false => Ok(()),
        }
    }

    /// Return an error describing the undefined expression at the region.
    fn undefined(&self, region: Region) -> Error {
        let text = region.literal(self.state.template.source());
        Error::new(ErrorKind::Undefined, format!("`{text}` is undefined"))
            .with_help("add it to the store, or check for it with `is defined`")
            .with_pointer(self.state.template.source(), region)
            .named(self.state.template.name())
    }

    /// Point an error at the region of the current template, unless it
    /// already points somewhere.
    fn locate(&self, error: Error, region: Region) -> Error {
        error
            .located(self.state.template.source(), region)
            .named(self.state.template.name())
    }
}

/// Collect the definitions of every block along an inheritance chain.
fn block_chains(chain: &[Arc<Template>]) -> IndexMap<String, BlockChain> {
    let mut blocks: IndexMap<String, BlockChain> = IndexMap::new();
    for template in chain {
        for (name, block) in &template.root().blocks {
            blocks
                .entry(name.clone())
                .or_default()
                .push(template.clone(), block.clone());
        }
    }

    blocks
}

fn template_name_error(value: &Value) -> Error {
    Error::new(
        ErrorKind::Type,
        format!("template names must be strings, not `{}`", value.kind()),
    )
}

/// Remove whitespace between markup tags, and around the text.
fn spaceless(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text.trim();
    while let Some(index) = rest.find('>') {
        result.push_str(&rest[..=index]);
        rest = &rest[index + 1..];
        let trimmed = rest.trim_start();
        if trimmed.starts_with('<') {
            rest = trimmed;
        }
    }
    result.push_str(rest);

    result
}
