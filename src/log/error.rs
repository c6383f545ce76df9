use super::{Pointer, RED, RESET};
use crate::{
    log::Visual,
    region::{Position, Region},
};
use std::fmt::{Debug, Display, Formatter, Result};

/// Describes the category of an [`Error`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ErrorKind {
    /// Malformed source at the character level.
    Lex,
    /// The token stream does not match the grammar.
    Syntax,
    /// Grammatically valid, but semantically disallowed.
    Assertion,
    /// A loader could not resolve a template name.
    TemplateNotFound,
    /// None of several candidate template names could be resolved.
    TemplatesNotFound,
    /// An undefined value was used in a way the undefined policy forbids.
    Undefined,
    /// An operation was applied to values of the wrong type.
    Type,
    /// A filter was not found in the engine.
    UnknownFilter,
    /// A test was not found in the engine.
    UnknownTest,
    /// A function was not found in the engine.
    UnknownFunction,
    /// Arguments could not be bound to a macro, filter, test or function.
    Arguments,
    /// The configured maximum call depth was exceeded.
    Recursion,
    /// A template extends itself through its parents.
    CircularExtends,
    /// The security policy denied an operation.
    Security,
    /// Division or modulo by zero.
    ZeroDivision,
    /// Any other failure during rendering.
    Runtime,
    /// Writing rendered output failed.
    Write,
}

impl ErrorKind {
    /// Return true if the kind is raised while compiling a template.
    pub fn is_compile_error(&self) -> bool {
        matches!(self, Self::Lex | Self::Syntax | Self::Assertion)
    }

    /// Return true if the kind is raised while rendering a template.
    pub fn is_runtime_error(&self) -> bool {
        !self.is_compile_error()
            && !matches!(self, Self::TemplateNotFound | Self::TemplatesNotFound)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let text = match self {
            ErrorKind::Lex => "lex error",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Assertion => "assertion error",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::TemplatesNotFound => "templates not found",
            ErrorKind::Undefined => "undefined error",
            ErrorKind::Type => "type error",
            ErrorKind::UnknownFilter => "unknown filter",
            ErrorKind::UnknownTest => "unknown test",
            ErrorKind::UnknownFunction => "unknown function",
            ErrorKind::Arguments => "argument error",
            ErrorKind::Recursion => "recursion error",
            ErrorKind::CircularExtends => "circular extends",
            ErrorKind::Security => "security violation",
            ErrorKind::ZeroDivision => "division by zero",
            ErrorKind::Runtime => "runtime error",
            ErrorKind::Write => "write error",
        };
        write!(f, "{text}")
    }
}

/// Describes an error, and allows adding a contextual help text and visualization.
///
/// # Examples
///
/// Creating an [`Error`] that includes a [`Visual`] of type [`Pointer`]:
///
/// ```
/// use kiln::{Error, ErrorKind, Position, Region};
///
/// let source = "{% update name %}";
/// Error::new(ErrorKind::Syntax, "unknown tag `update`")
///     .with_pointer(source, Region::new(3..9, Position::new(1, 4)))
///     .with_name("template.txt")
///     .with_help(r#"expected one of "if", "set", "for""#);
/// ```
///
/// When printed with `println!("{:#}", error)` the [`Error`] produces this output:
///
/// ```text
/// error: unknown tag `update`
///   --> template.txt:1:4
///    |
///  1 | {% update name %}
///    |    ^^^^^^
///    |
///   = help: expected one of "if", "set", "for"
/// ```
pub struct Error {
    inner: Box<Inner>,
}

/// Fields of an [`Error`], boxed so results stay small on deep render stacks.
struct Inner {
    /// Category of the [`Error`].
    kind: ErrorKind,
    /// Describes the cause of the [`Error`].
    reason: String,
    /// A visualization to help illustrate the [`Error`].
    visual: Option<Box<dyn Visual + Send + Sync>>,
    /// Additional information to display with the [`Error`].
    help: Option<String>,
    /// The name of the Template that the [`Error`] comes from.
    name: Option<String>,
    /// Line and column the [`Error`] points at.
    position: Option<Position>,
}

impl Error {
    /// Create a new [`Error`] of the given kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{Error, ErrorKind};
    ///
    /// let error = Error::new(ErrorKind::Type, "cannot add string and number");
    /// assert_eq!(error.kind(), ErrorKind::Type);
    /// ```
    pub fn new<T>(kind: ErrorKind, reason: T) -> Self
    where
        T: Into<String>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                reason: reason.into(),
                visual: None,
                help: None,
                name: None,
                position: None,
            }),
        }
    }

    /// Create a new [`ErrorKind::Runtime`] [`Error`] with the given reason text.
    ///
    /// The additional fields may be populated using the various methods
    /// defined on `Error`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Error;
    ///
    /// Error::build("filter `left` requires string input")
    ///     .with_help("use quotes to coerce data to string");
    /// ```
    #[inline]
    pub fn build<T>(reason: T) -> Self
    where
        T: Into<String>,
    {
        Self::new(ErrorKind::Runtime, reason)
    }

    /// Set the [`ErrorKind`].
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.inner.kind = kind;

        self
    }

    /// Set the reason text, which is a short summary of the [`Error`].
    pub fn with_reason<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.inner.reason = text.into();

        self
    }

    /// Set the name text, which is the name of the [`Template`][`crate::Template`]
    /// that the [`Error`] is related to.
    pub fn with_name<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.inner.name = Some(text.into());

        self
    }

    /// Set the [`Visual`], which is a visualization that helps illustrate the
    /// cause of the error.
    pub fn with_visual(mut self, visual: impl Visual + Send + Sync + 'static) -> Self {
        self.inner.visual = Some(Box::new(visual));

        self
    }

    /// Set the visualization to a new [`Pointer`] with the given source text and
    /// [`Region`], and record the position of the `Region`.
    pub fn with_pointer(mut self, source: &str, region: Region) -> Self {
        self.inner.position = Some(region.position);
        self.inner.visual = Some(Box::new(Pointer::new(source, region)));

        self
    }

    /// Set the position without a visualization.
    pub fn with_position(mut self, position: Position) -> Self {
        self.inner.position = Some(position);

        self
    }

    /// Set the help text, which is contextual information to accompany the
    /// reason text.
    pub fn with_help<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.inner.help = Some(text.into());

        self
    }

    /// Point the [`Error`] at the given [`Region`], unless it already points
    /// somewhere more specific.
    pub fn located(self, source: &str, region: Region) -> Self {
        if self.inner.position.is_some() {
            return self;
        }

        self.with_pointer(source, region)
    }

    /// Attach a template name, unless one is already present.
    pub fn named(mut self, name: Option<&str>) -> Self {
        if self.inner.name.is_none() {
            self.inner.name = name.map(String::from);
        }

        self
    }

    /// Return the [`ErrorKind`].
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    /// Return the reason text.
    #[inline]
    pub fn reason(&self) -> &str {
        &self.inner.reason
    }

    /// Return the help text, if any.
    #[inline]
    pub fn help(&self) -> Option<&str> {
        self.inner.help.as_deref()
    }

    /// Return the name of the `Template` that the error is related to.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Return the line and column the error points at, if known.
    #[inline]
    pub fn position(&self) -> Option<Position> {
        self.inner.position
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if !f.alternate() {
            writeln!(f, "{self:#}")?;
        }
        f.debug_struct("Error")
            .field("kind", &self.inner.kind)
            .field("reason", &self.inner.reason)
            .field("name", &self.inner.name)
            .field("position", &self.inner.position)
            .field("visual", &self.inner.visual)
            .field("help", &self.inner.help)
            .finish()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if !f.alternate() {
            write!(f, "error: {}", self.inner.reason)?;
            if let Some(position) = self.inner.position {
                let name = self.inner.name.as_deref().unwrap_or("?");
                write!(f, " ({name}:{position})")?;
            }
            return Ok(());
        }

        write!(f, "{RED}error{RESET}: {}", self.inner.reason)?;
        match &self.inner.visual {
            Some(visual) => visual.display(f, self.name(), self.help()),
            None => {
                if let Some(help) = self.help() {
                    write!(f, "\n  = help: {help}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.inner.kind == other.inner.kind
            && self.inner.reason == other.inner.reason
            && self.inner.help == other.inner.help
            && self.inner.name == other.inner.name
    }
}
