use crate::{
    compile::{tree::Expr, Options, Parser, Template},
    filter::{self, Filter},
    function::{self, Function},
    i18n::{Identity, Translator},
    loader::{Cache, Loader, MemoryCache},
    log::{error_missing_template, error_missing_templates, error_write, Error, ErrorKind},
    render::{Renderer, Value},
    security::{AllowAll, Policy},
    syntax::Syntax,
    test::{self, Test},
    Store,
};
use indexmap::IndexMap;
use std::{collections::HashMap, io::Write, sync::Arc, time::SystemTime};

/// Decides whether output of a template is escaped by default.
#[derive(Debug, Clone, Default)]
pub enum Autoescape {
    /// Output is never escaped unless a filter does it.
    #[default]
    Disabled,
    /// Output of every template is escaped.
    Enabled,
    /// Output is escaped for templates whose name ends with one of the
    /// extensions, such as `html` or `xml`.
    Extensions(Vec<String>),
    /// Output is escaped when the function returns true for the template
    /// name. Templates without a name are given `""`.
    Custom(fn(&str) -> bool),
}

impl Autoescape {
    /// Return true if a template with the given name is escaped.
    pub fn resolve(&self, name: Option<&str>) -> bool {
        match self {
            Autoescape::Disabled => false,
            Autoescape::Enabled => true,
            Autoescape::Extensions(extensions) => name.is_some_and(|name| {
                extensions.iter().any(|e| {
                    let extension = e.trim_start_matches('.');
                    name.rsplit_once('.')
                        .is_some_and(|(_, found)| found.eq_ignore_ascii_case(extension))
                })
            }),
            Autoescape::Custom(decide) => decide(name.unwrap_or("")),
        }
    }
}

/// Decides what happens when an undefined value is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndefinedBehavior {
    /// Undefined values print as nothing, are falsy and iterate as empty.
    /// Reading an attribute of one is an error.
    #[default]
    Lenient,
    /// Like `Lenient`, but reading an attribute of an undefined value
    /// produces another undefined value.
    Chainable,
    /// Any use other than `is defined` and the `default` filter is an error.
    Strict,
}

/// Facilitates compiling and rendering templates, and provides storage
/// for filters, tests, functions, globals and templates.
///
/// # Examples
///
/// ```
/// use kiln::{Engine, Store};
///
/// let engine = Engine::default();
/// let template = engine.compile("hello, {{ name }}!").unwrap();
/// let result = engine.render(&template, &Store::new().with_must("name", "taylor"));
///
/// assert_eq!(result.unwrap(), "hello, taylor!");
/// ```
pub struct Engine {
    /// Options given to the Parser.
    options: Options,
    autoescape: Autoescape,
    undefined: UndefinedBehavior,
    /// Number of macro calls, includes, imports and recursive loops that
    /// may be active at once.
    max_recursion: usize,
    /// Filters that this engine is aware of.
    filters: HashMap<String, Box<dyn Filter>>,
    tests: HashMap<String, Box<dyn Test>>,
    functions: HashMap<String, Box<dyn Function>>,
    /// Values visible to every template.
    globals: IndexMap<String, Value>,
    /// Templates that this Engine is aware of.
    templates: HashMap<String, Arc<Template>>,
    loader: Option<Box<dyn Loader>>,
    cache: Box<dyn Cache>,
    policy: Box<dyn Policy>,
    translator: Arc<dyn Translator>,
}

impl Engine {
    /// Create a new [`Engine`] with every builtin filter, test and function.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a new [`Template`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when compilation fails, which most likely means the source
    /// contains invalid syntax.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Engine;
    ///
    /// let engine = Engine::default();
    /// let template = engine.compile("hello, {{ name }}!");
    /// assert!(template.is_ok());
    /// ```
    #[inline]
    pub fn compile(&self, text: &str) -> Result<Arc<Template>, Error> {
        self.build(None, text.to_string(), None).map(Arc::new)
    }

    /// Compile a new [`Template`] with a name, without storing it.
    ///
    /// The name is used in error messages, and to decide autoescaping.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when compilation fails.
    #[inline]
    pub fn compile_named(&self, name: &str, text: &str) -> Result<Arc<Template>, Error> {
        self.build(Some(name), text.to_string(), None).map(Arc::new)
    }

    /// Compile a standalone expression, such as `user.age >= 18`, which can
    /// be evaluated against a [`Store`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the text is not a single valid expression.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{Engine, Store, Value};
    ///
    /// let engine = Engine::default();
    /// let expression = engine.compile_expression("age >= 18").unwrap();
    /// let result = expression.evaluate(&Store::new().with_must("age", 21));
    ///
    /// assert_eq!(result.unwrap(), Value::Bool(true));
    /// ```
    pub fn compile_expression(&self, text: &str) -> Result<Expression<'_>, Error> {
        let expr = Parser::expression(text, &self.options).parse_standalone()?;
        let template = Template::new(
            None,
            text.to_string(),
            Default::default(),
            self.autoescape.resolve(None),
            None,
        );

        Ok(Expression {
            engine: self,
            expr,
            template: Arc::new(template),
        })
    }

    fn build(
        &self,
        name: Option<&str>,
        text: String,
        modified: Option<SystemTime>,
    ) -> Result<Template, Error> {
        log::debug!("compiling template `{}`", name.unwrap_or("?"));
        let root = Parser::new(&text, &self.options)
            .parse()
            .map_err(|e| e.named(name))?;
        let autoescape = self.autoescape.resolve(name);

        Ok(Template::new(
            name.map(String::from),
            text,
            root,
            autoescape,
            modified,
        ))
    }

    /// Render a [`Template`] with the given [`Store`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if rendering fails, which may happen when a [`Filter`] returns
    /// an `Error` itself, or the template cannot be rendered for a reason that will
    /// be described by the `Error`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{Store, Engine};
    ///
    /// let engine = Engine::default();
    /// let template = engine.compile("hello, {{ name }}!").unwrap();
    /// let result = engine.render(&template, &Store::new().with_must("name", "taylor"));
    ///
    /// assert_eq!(result.unwrap(), "hello, taylor!")
    /// ```
    #[inline]
    pub fn render(&self, template: &Arc<Template>, store: &Store) -> Result<String, Error> {
        Renderer::new(self, template.clone(), store).render()
    }

    /// Render a [`Template`] into the given writer.
    ///
    /// Nothing is written unless the whole render succeeds.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if rendering fails, or the writer returns an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{Engine, Store};
    ///
    /// let engine = Engine::default();
    /// let mut sink = Vec::new();
    ///
    /// let failing = engine.compile("partial {{ 1 / 0 }}").unwrap();
    /// assert!(engine.render_to(&failing, &Store::new(), &mut sink).is_err());
    /// assert!(sink.is_empty());
    ///
    /// let template = engine.compile("done").unwrap();
    /// engine.render_to(&template, &Store::new(), &mut sink).unwrap();
    /// assert_eq!(sink, b"done");
    /// ```
    pub fn render_to<W>(
        &self,
        template: &Arc<Template>,
        store: &Store,
        writer: &mut W,
    ) -> Result<(), Error>
    where
        W: Write,
    {
        let output = self.render(template, store)?;
        writer.write_all(output.as_bytes()).map_err(|e| {
            log::debug!("writing rendered output failed: {e}");
            error_write()
        })
    }

    /// Render a single block of a [`Template`], resolved through the
    /// templates it extends.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the block does not exist, or rendering fails.
    pub fn render_block(
        &self,
        template: &Arc<Template>,
        name: &str,
        store: &Store,
    ) -> Result<String, Error> {
        Renderer::new(self, template.clone(), store).render_block(name)
    }

    /// Render the [`Template`] with the given name.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the template cannot be found or compiled,
    /// or rendering fails.
    pub fn render_named(&self, name: &str, store: &Store) -> Result<String, Error> {
        let template = self.get_template(name)?;
        self.render(&template, store)
    }

    /// Compile and store a new [`Template`] with the given name.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when a `Template` with the given name already exists,
    /// or when compilation fails, which most likely means the source contains invalid
    /// syntax.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Engine;
    ///
    /// let mut engine = Engine::default();
    /// let result = engine.add_template("template_name", "hello, {{ name }}!");
    /// assert!(result.is_ok());
    ///
    /// let second = engine.add_template("template_name", "hello again");
    /// assert!(second.is_err());
    /// ```
    pub fn add_template<S, T>(&mut self, name: S, text: T) -> Result<(), Error>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(Error::build(format!(
                "template with name `{name}` already exists in engine, \
                overwrite it with `.add_template_must`"
            )));
        }

        self.add_template_must(name, text)
    }

    /// Compile and store a new [`Template`] with the given name.
    ///
    /// If a `Template` with the given name already exists in the [`Engine`],
    /// it is overwritten.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when compilation fails, which most likely means the source
    /// contains invalid syntax.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Engine;
    ///
    /// let mut engine = Engine::default();
    /// engine.add_template_must("template_name", "hello, {{ name }}!").unwrap();
    /// ```
    pub fn add_template_must<S, T>(&mut self, name: S, text: T) -> Result<(), Error>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let name = name.into();
        let template = self.build(Some(&name), text.into(), None)?;

        self.templates.insert(name, Arc::new(template));
        Ok(())
    }

    /// Compile and store a new [`Template`] with the given name.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when a `Template` with the given name already exists,
    /// or when compilation fails.
    pub fn with_template<S, T>(mut self, name: S, text: T) -> Result<Self, Error>
    where
        S: Into<String>,
        T: Into<String>,
    {
        self.add_template(name, text)?;
        Ok(self)
    }

    /// Return the named [`Template`].
    ///
    /// Templates added with [`add_template`][`Engine::add_template()`] are
    /// searched first, then the cache, then the loader.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::TemplateNotFound`] [`Error`] if no template has
    /// the name, or an `Error` from the loader or compiler.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Engine;
    ///
    /// let mut engine = Engine::default();
    /// engine.add_template_must("template_name", "hello, {{ name }}!").unwrap();
    ///
    /// let template = engine.get_template("template_name");
    /// assert!(template.is_ok());
    /// ```
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>, Error> {
        if let Some(template) = self.templates.get(name) {
            return Ok(template.clone());
        }
        let Some(loader) = &self.loader else {
            return Err(error_missing_template(name));
        };

        if let Some(cached) = self.cache.get(name) {
            match loader.modified(name) {
                Some(modified) if cached.modified() != Some(modified) => {
                    log::debug!("template `{name}` changed, reloading");
                    self.cache.invalidate(name);
                }
                _ => {
                    log::debug!("cache hit for template `{name}`");
                    return Ok(cached);
                }
            }
        }

        let source = loader
            .load(name)?
            .ok_or_else(|| error_missing_template(name))?;
        log::debug!("loaded template `{name}`");
        let template = Arc::new(self.build(Some(name), source.text, source.modified)?);
        self.cache.put(name, template.clone());

        Ok(template)
    }

    /// Return the first [`Template`] found among the given names.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::TemplatesNotFound`] [`Error`] if none of the
    /// names can be found, or the first other `Error` encountered.
    pub fn select_template(&self, names: &[String]) -> Result<Arc<Template>, Error> {
        for name in names {
            match self.get_template(name) {
                Err(e) if e.kind() == ErrorKind::TemplateNotFound => continue,
                result => return result,
            }
        }

        Err(error_missing_templates(names))
    }

    /// Add a [`Filter`].
    ///
    /// # Errors
    ///
    /// If a `Filter` with the given name already exists in the engine, an [`Error`] is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{
    ///     filter::{Arguments, Error},
    ///     Engine, Value,
    /// };
    ///
    /// fn to_lowercase(value: &Value, _: &Arguments) -> Result<Value, Error> {
    ///     match value.as_str() {
    ///         Some(text) => Ok(Value::from(text.to_lowercase())),
    ///         None => Err(Error::build("filter `to_lowercase` requires string input")
    ///             .with_help("use quotes to coerce data to string")),
    ///     }
    /// }
    ///
    /// let mut engine = Engine::default();
    /// let result = engine.add_filter("to_lowercase", to_lowercase);
    ///
    /// assert!(result.is_ok());
    /// ```
    pub fn add_filter<T>(&mut self, name: &str, filter: T) -> Result<(), Error>
    where
        T: Filter + 'static,
    {
        if self.filters.contains_key(name) {
            return Err(duplicate("filter", name));
        }
        self.add_filter_must(name, filter);
        Ok(())
    }

    /// Add a [`Filter`].
    ///
    /// If a `Filter` with the given name already exists in the [`Engine`], it is overwritten.
    #[inline]
    pub fn add_filter_must<T>(&mut self, name: &str, filter: T)
    where
        T: Filter + 'static,
    {
        self.filters.insert(name.to_string(), Box::new(filter));
    }

    /// Add a [`Filter`].
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// If a `Filter` with the given name already exists in the engine, an [`Error`] is returned.
    #[inline]
    pub fn with_filter<T>(mut self, name: &str, filter: T) -> Result<Self, Error>
    where
        T: Filter + 'static,
    {
        self.add_filter(name, filter)?;
        Ok(self)
    }

    /// Add a [`Filter`].
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// If a `Filter` with the given name already exists in the engine, it is overwritten.
    #[inline]
    pub fn with_filter_must<T>(mut self, name: &str, filter: T) -> Self
    where
        T: Filter + 'static,
    {
        self.add_filter_must(name, filter);
        self
    }

    /// Return the filter with the given name, if it exists in Engine.
    #[inline]
    pub fn get_filter(&self, name: &str) -> Option<&dyn Filter> {
        self.filters.get(name).map(Box::as_ref)
    }

    /// Add a [`Test`].
    ///
    /// # Errors
    ///
    /// If a `Test` with the given name already exists in the engine, an [`Error`] is returned.
    pub fn add_test<T>(&mut self, name: &str, test: T) -> Result<(), Error>
    where
        T: Test + 'static,
    {
        if self.tests.contains_key(name) {
            return Err(duplicate("test", name));
        }
        self.add_test_must(name, test);
        Ok(())
    }

    /// Add a [`Test`], overwriting any with the same name.
    #[inline]
    pub fn add_test_must<T>(&mut self, name: &str, test: T)
    where
        T: Test + 'static,
    {
        self.tests.insert(name.to_string(), Box::new(test));
    }

    /// Add a [`Test`].
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// If a `Test` with the given name already exists in the engine, an [`Error`] is returned.
    #[inline]
    pub fn with_test<T>(mut self, name: &str, test: T) -> Result<Self, Error>
    where
        T: Test + 'static,
    {
        self.add_test(name, test)?;
        Ok(self)
    }

    /// Add a [`Test`], overwriting any with the same name.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    #[inline]
    pub fn with_test_must<T>(mut self, name: &str, test: T) -> Self
    where
        T: Test + 'static,
    {
        self.add_test_must(name, test);
        self
    }

    /// Return the test with the given name, if it exists in Engine.
    #[inline]
    pub fn get_test(&self, name: &str) -> Option<&dyn Test> {
        self.tests.get(name).map(Box::as_ref)
    }

    /// Add a [`Function`].
    ///
    /// # Errors
    ///
    /// If a `Function` with the given name already exists in the engine, an [`Error`]
    /// is returned.
    pub fn add_function<T>(&mut self, name: &str, function: T) -> Result<(), Error>
    where
        T: Function + 'static,
    {
        if self.functions.contains_key(name) {
            return Err(duplicate("function", name));
        }
        self.add_function_must(name, function);
        Ok(())
    }

    /// Add a [`Function`], overwriting any with the same name.
    #[inline]
    pub fn add_function_must<T>(&mut self, name: &str, function: T)
    where
        T: Function + 'static,
    {
        self.functions.insert(name.to_string(), Box::new(function));
    }

    /// Add a [`Function`].
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// If a `Function` with the given name already exists in the engine, an [`Error`]
    /// is returned.
    #[inline]
    pub fn with_function<T>(mut self, name: &str, function: T) -> Result<Self, Error>
    where
        T: Function + 'static,
    {
        self.add_function(name, function)?;
        Ok(self)
    }

    /// Add a [`Function`], overwriting any with the same name.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    #[inline]
    pub fn with_function_must<T>(mut self, name: &str, function: T) -> Self
    where
        T: Function + 'static,
    {
        self.add_function_must(name, function);
        self
    }

    /// Return the function with the given name, if it exists in Engine.
    #[inline]
    pub fn get_function(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(name).map(Box::as_ref)
    }

    /// Add a value visible to every template, overwriting any with the
    /// same name.
    ///
    /// Variables in the [`Store`] hide globals with the same name.
    pub fn add_global<S, T>(&mut self, name: S, value: T)
    where
        S: Into<String>,
        T: Into<Value>,
    {
        self.globals.insert(name.into(), value.into());
    }

    /// Add a value visible to every template.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    #[inline]
    pub fn with_global<S, T>(mut self, name: S, value: T) -> Self
    where
        S: Into<String>,
        T: Into<Value>,
    {
        self.add_global(name, value);
        self
    }

    /// Return the global with the given name, if any.
    #[inline]
    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Set the delimiters used by templates compiled after this call.
    pub fn set_syntax(&mut self, syntax: Syntax) {
        self.options.syntax = syntax;
    }

    /// Set the delimiters used by templates compiled after this call.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{Builder, Engine, Store};
    ///
    /// let syntax = Builder::new().with_variable("((", "))").to_syntax();
    /// let engine = Engine::default().with_syntax(syntax);
    /// let template = engine.compile("(( 1 + 1 ))").unwrap();
    ///
    /// assert_eq!(engine.render(&template, &Store::new()).unwrap(), "2");
    /// ```
    #[inline]
    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.set_syntax(syntax);
        self
    }

    /// Remove the first newline after a block tag.
    pub fn set_trim_blocks(&mut self, enabled: bool) {
        self.options.trim_blocks = enabled;
    }

    #[inline]
    pub fn with_trim_blocks(mut self, enabled: bool) -> Self {
        self.set_trim_blocks(enabled);
        self
    }

    /// Strip tabs and spaces from the start of a line up to a block tag.
    pub fn set_lstrip_blocks(&mut self, enabled: bool) {
        self.options.lstrip_blocks = enabled;
    }

    #[inline]
    pub fn with_lstrip_blocks(mut self, enabled: bool) -> Self {
        self.set_lstrip_blocks(enabled);
        self
    }

    /// Keep a single trailing newline at the end of templates.
    pub fn set_keep_trailing_newline(&mut self, enabled: bool) {
        self.options.keep_trailing_newline = enabled;
    }

    #[inline]
    pub fn with_keep_trailing_newline(mut self, enabled: bool) -> Self {
        self.set_keep_trailing_newline(enabled);
        self
    }

    /// Accept `async for`, `async with` and `await` in templates.
    pub fn set_enable_async(&mut self, enabled: bool) {
        self.options.enable_async = enabled;
    }

    #[inline]
    pub fn with_enable_async(mut self, enabled: bool) -> Self {
        self.set_enable_async(enabled);
        self
    }

    /// Set the sequence that newlines in template data are replaced with.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] unless the sequence is `\n`, `\r\n` or `\r`.
    pub fn set_newline_sequence<T>(&mut self, sequence: T) -> Result<(), Error>
    where
        T: Into<String>,
    {
        let sequence = sequence.into();
        if !matches!(sequence.as_str(), "\n" | "\r\n" | "\r") {
            return Err(Error::build(format!(
                "invalid newline sequence {sequence:?}"
            ))
            .with_help("use one of \"\\n\", \"\\r\\n\" or \"\\r\""));
        }

        self.options.newline_sequence = sequence;
        Ok(())
    }

    /// Set the sequence that newlines in template data are replaced with.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] unless the sequence is `\n`, `\r\n` or `\r`.
    #[inline]
    pub fn with_newline_sequence<T>(mut self, sequence: T) -> Result<Self, Error>
    where
        T: Into<String>,
    {
        self.set_newline_sequence(sequence)?;
        Ok(self)
    }

    /// Set the autoescape policy of templates compiled after this call.
    pub fn set_autoescape(&mut self, autoescape: Autoescape) {
        self.autoescape = autoescape;
    }

    #[inline]
    pub fn with_autoescape(mut self, autoescape: Autoescape) -> Self {
        self.set_autoescape(autoescape);
        self
    }

    pub fn set_undefined(&mut self, undefined: UndefinedBehavior) {
        self.undefined = undefined;
    }

    #[inline]
    pub fn with_undefined(mut self, undefined: UndefinedBehavior) -> Self {
        self.set_undefined(undefined);
        self
    }

    /// Set how many macro calls, includes, imports and recursive loops may
    /// be active at once.
    pub fn set_max_recursion(&mut self, depth: usize) {
        self.max_recursion = depth;
    }

    #[inline]
    pub fn with_max_recursion(mut self, depth: usize) -> Self {
        self.set_max_recursion(depth);
        self
    }

    /// Set the [`Loader`] used to resolve template names.
    pub fn set_loader<T>(&mut self, loader: T)
    where
        T: Loader + 'static,
    {
        self.loader = Some(Box::new(loader));
    }

    #[inline]
    pub fn with_loader<T>(mut self, loader: T) -> Self
    where
        T: Loader + 'static,
    {
        self.set_loader(loader);
        self
    }

    /// Set the [`Cache`] that templates from the loader are kept in.
    pub fn set_cache<T>(&mut self, cache: T)
    where
        T: Cache + 'static,
    {
        self.cache = Box::new(cache);
    }

    #[inline]
    pub fn with_cache<T>(mut self, cache: T) -> Self
    where
        T: Cache + 'static,
    {
        self.set_cache(cache);
        self
    }

    /// Set the [`Policy`] consulted while rendering.
    pub fn set_policy<T>(&mut self, policy: T)
    where
        T: Policy + 'static,
    {
        self.policy = Box::new(policy);
    }

    #[inline]
    pub fn with_policy<T>(mut self, policy: T) -> Self
    where
        T: Policy + 'static,
    {
        self.set_policy(policy);
        self
    }

    /// Set the [`Translator`] used by `trans` blocks and the gettext
    /// functions.
    pub fn set_translator<T>(&mut self, translator: T)
    where
        T: Translator + 'static,
    {
        let translator: Arc<dyn Translator> = Arc::new(translator);
        function::register_gettext(&mut self.functions, translator.clone());
        self.translator = translator;
    }

    #[inline]
    pub fn with_translator<T>(mut self, translator: T) -> Self
    where
        T: Translator + 'static,
    {
        self.set_translator(translator);
        self
    }

    #[inline]
    pub(crate) fn policy(&self) -> &dyn Policy {
        self.policy.as_ref()
    }

    #[inline]
    pub(crate) fn translator(&self) -> &dyn Translator {
        self.translator.as_ref()
    }

    #[inline]
    pub(crate) fn undefined(&self) -> UndefinedBehavior {
        self.undefined
    }

    #[inline]
    pub(crate) fn max_recursion(&self) -> usize {
        self.max_recursion
    }
}

impl Default for Engine {
    fn default() -> Self {
        let translator: Arc<dyn Translator> = Arc::new(Identity);
        let mut filters = HashMap::new();
        filter::register(&mut filters);
        let mut tests = HashMap::new();
        test::register(&mut tests);
        let mut functions = HashMap::new();
        function::register(&mut functions, translator.clone());

        Self {
            options: Options::default(),
            autoescape: Autoescape::default(),
            undefined: UndefinedBehavior::default(),
            max_recursion: 100,
            filters,
            tests,
            functions,
            globals: IndexMap::new(),
            templates: HashMap::new(),
            loader: None,
            cache: Box::new(MemoryCache::new()),
            policy: Box::new(AllowAll),
            translator,
        }
    }
}

/// A compiled standalone expression, returned by
/// [`compile_expression`][`Engine::compile_expression()`].
pub struct Expression<'engine> {
    engine: &'engine Engine,
    expr: Expr,
    /// Holds the source text for error messages.
    template: Arc<Template>,
}

impl Expression<'_> {
    /// Evaluate the expression against the given [`Store`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if evaluation fails.
    pub fn evaluate(&self, store: &Store) -> Result<Value, Error> {
        Renderer::new(self.engine, self.template.clone(), store).evaluate(&self.expr)
    }
}

fn duplicate(kind: &str, name: &str) -> Error {
    Error::new(
        ErrorKind::Arguments,
        format!("{kind} with name `{name}` already exists in engine"),
    )
    .with_help(format!("overwrite it with `.add_{kind}_must`"))
}

#[cfg(test)]
mod tests {
    use super::{Autoescape, Engine};
    use crate::{
        filter::Arguments,
        i18n::Catalog,
        loader::{Cache, Loader, MemoryCache, MemoryLoader, Source},
        log::Error,
        render::Value,
        ErrorKind, Store,
    };
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, SystemTime},
    };

    #[test]
    fn test_add() {
        let mut engine = Engine::default();
        engine.add_filter_must("faux", faux_filter_a);

        assert!(engine.get_filter("faux").is_some());
        assert!(engine.get_filter("ghost").is_none())
    }

    #[test]
    fn test_add_fluent() {
        assert!(Engine::default()
            .with_filter("faux", faux_filter_a)
            .unwrap()
            .get_filter("faux")
            .is_some());
        assert!(Engine::default().get_filter("ghost").is_none());
    }

    #[test]
    fn test_add_duplicate() {
        assert!(Engine::default()
            .with_filter_must("faux", faux_filter_a)
            .with_filter("faux", faux_filter_a)
            .is_err());
        assert!(Engine::default().with_test("odd", |_: &Value, _: &Arguments| -> Result<bool, Error> { Ok(true) }).is_err());
    }

    #[test]
    fn test_add_overwrite() {
        let value = Value::None;
        let arguments = Arguments::new();

        let mut engine = Engine::default().with_filter_must("faux", faux_filter_a);
        assert!(engine.get_filter("faux").is_some_and(|f| f
            .apply(&value, &arguments)
            .is_ok_and(|v| v == Value::from("a"))));

        engine.add_filter_must("faux", faux_filter_b);
        assert!(engine.get_filter("faux").is_some_and(|f| f
            .apply(&value, &arguments)
            .is_ok_and(|v| v == Value::from("b"))));
    }

    #[test]
    fn test_add_template() {
        let mut engine = Engine::default();
        engine.add_template("a", "{{ 1 }}").unwrap();
        assert!(engine.add_template("a", "{{ 2 }}").is_err());
        engine.add_template_must("a", "{{ 3 }}").unwrap();

        assert_eq!(engine.render_named("a", &Store::new()).unwrap(), "3");
        let error = engine.render_named("b", &Store::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TemplateNotFound);
    }

    #[test]
    fn test_compile_error_is_named() {
        let mut engine = Engine::default();
        let error = engine.add_template("broken", "{{ name").unwrap_err();

        assert!(error.kind().is_compile_error());
        assert_eq!(error.name(), Some("broken"));
    }

    #[test]
    fn test_select_template() {
        let engine = Engine::default().with_template("b", "B").unwrap();
        let names = ["a".to_string(), "b".to_string()];
        assert_eq!(engine.select_template(&names).unwrap().name(), Some("b"));

        let error = engine.select_template(&names[..1]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TemplatesNotFound);
    }

    #[test]
    fn test_autoescape_resolve() {
        let extensions = Autoescape::Extensions(vec!["html".into(), ".xml".into()]);
        assert!(extensions.resolve(Some("page.html")));
        assert!(extensions.resolve(Some("feed.XML")));
        assert!(!extensions.resolve(Some("notes.txt")));
        assert!(!extensions.resolve(None));

        let custom = Autoescape::Custom(|name| name.starts_with("safe/"));
        assert!(custom.resolve(Some("safe/a")));
        assert!(!custom.resolve(None));
    }

    #[test]
    fn test_autoescape_by_name() {
        let engine = Engine::default()
            .with_autoescape(Autoescape::Extensions(vec!["html".into()]))
            .with_loader(
                MemoryLoader::new()
                    .with_template("a.html", "{{ v }}")
                    .with_template("a.txt", "{{ v }}"),
            );
        let store = Store::new().with_must("v", "<b>");

        assert_eq!(engine.render_named("a.html", &store).unwrap(), "&lt;b&gt;");
        assert_eq!(engine.render_named("a.txt", &store).unwrap(), "<b>");
    }

    #[test]
    fn test_newline_sequence() {
        let engine = Engine::default().with_newline_sequence("\r\n").unwrap();
        let template = engine.compile("a\nb").unwrap();
        assert_eq!(engine.render(&template, &Store::new()).unwrap(), "a\r\nb");
        assert!(Engine::default().with_newline_sequence("\t").is_err());
    }

    #[test]
    fn test_compile_expression() {
        let engine = Engine::default();
        let expression = engine.compile_expression("items|length > 1").unwrap();
        let store = Store::new().with_must("items", vec![1, 2]);

        assert_eq!(expression.evaluate(&store).unwrap(), Value::Bool(true));
        assert!(engine.compile_expression("1 +").is_err());
    }

    #[test]
    fn test_translator() {
        let engine = Engine::default()
            .with_translator(Catalog::new().with_message("Hello", "Hallo"));
        let template = engine
            .compile("{{ _('Hello') }} {% trans %}Hello{% endtrans %}")
            .unwrap();

        assert_eq!(
            engine.render(&template, &Store::new()).unwrap(),
            "Hallo Hallo"
        );
    }

    #[test]
    fn test_cache_reloads_stale_templates() {
        let loader = Versioned::default();
        let versions = loader.versions.clone();
        let engine = Engine::default().with_loader(loader);

        assert_eq!(engine.render_named("page", &Store::new()).unwrap(), "v1");
        assert_eq!(engine.render_named("page", &Store::new()).unwrap(), "v1");
        versions.lock().unwrap().push("v2");
        assert_eq!(engine.render_named("page", &Store::new()).unwrap(), "v2");
    }

    #[test]
    fn test_custom_cache() {
        let cache = Arc::new(MemoryCache::new());
        let engine = Engine::default()
            .with_loader(MemoryLoader::new().with_template("x", "x"))
            .with_cache(Shared(cache.clone()));

        engine.get_template("x").unwrap();
        assert_eq!(cache.len(), 1);
    }

    /// A Loader whose template changes each time a version is pushed.
    #[derive(Default)]
    struct Versioned {
        versions: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Versioned {
        fn current(&self) -> (usize, &'static str) {
            let versions = self.versions.lock().unwrap();
            (versions.len(), versions.last().copied().unwrap_or("v1"))
        }
    }

    impl Loader for Versioned {
        fn load(&self, _: &str) -> Result<Option<Source>, Error> {
            let (version, text) = self.current();
            Ok(Some(Source {
                text: text.to_string(),
                modified: self.modified_at(version),
            }))
        }

        fn modified(&self, _: &str) -> Option<SystemTime> {
            self.modified_at(self.current().0)
        }
    }

    impl Versioned {
        fn modified_at(&self, version: usize) -> Option<SystemTime> {
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(version as u64))
        }
    }

    struct Shared(Arc<MemoryCache>);

    impl Cache for Shared {
        fn get(&self, name: &str) -> Option<Arc<crate::Template>> {
            self.0.get(name)
        }

        fn put(&self, name: &str, template: Arc<crate::Template>) {
            self.0.put(name, template)
        }

        fn invalidate(&self, name: &str) {
            self.0.invalidate(name)
        }
    }

    /// A Filter used to test Engine.
    fn faux_filter_a(_: &Value, _: &Arguments) -> Result<Value, Error> {
        Ok(Value::from("a"))
    }

    /// A Filter used to test Engine.
    fn faux_filter_b(_: &Value, _: &Arguments) -> Result<Value, Error> {
        Ok(Value::from("b"))
    }
}
