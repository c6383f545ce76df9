use super::Syntax;

/// Provides methods to build a `Syntax`.
///
/// # Example
///
/// ```
/// use kiln::Builder;
///
/// let syntax = Builder::new()
///     .with_variable("${", "}")
///     .with_block("<%", "%>")
///     .with_line_statement("#")
///     .to_syntax();
/// ```
pub struct Builder<'marker> {
    variable: (&'marker str, &'marker str),
    block: (&'marker str, &'marker str),
    comment: (&'marker str, &'marker str),
    line_statement: Option<&'marker str>,
    line_comment: Option<&'marker str>,
}

impl<'marker> Builder<'marker> {
    /// Create a new [`Builder`].
    ///
    /// The `Builder` has default markers:
    ///
    /// ```text
    /// Variables: {{ name }}
    /// Blocks: {% if ... %}
    /// Comments: {# ... #}
    /// Whitespace:
    ///     Variable: {{- name -}}
    ///     Block:  {%- if ... -%}
    /// ```
    ///
    /// Line statements and line comments are disabled until a prefix is set.
    ///
    /// To proceed with these defaults, you may immediately call `to_syntax` to receive the
    /// [`Syntax`] instance.
    #[inline]
    pub fn new() -> Self {
        Self {
            variable: ("{{", "}}"),
            block: ("{%", "%}"),
            comment: ("{#", "#}"),
            line_statement: None,
            line_comment: None,
        }
    }

    /// Set the variable markers.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Builder;
    ///
    /// let mut builder = Builder::new();
    /// builder.set_variable("((", "))");
    /// ```
    #[inline]
    pub fn set_variable(&mut self, begin: &'marker str, end: &'marker str) {
        self.variable = (begin, end);
    }

    /// Set the variable markers.
    ///
    /// Returns the [`Builder`], so additional methods may be chained.
    #[inline]
    pub fn with_variable(mut self, begin: &'marker str, end: &'marker str) -> Self {
        self.set_variable(begin, end);

        self
    }

    /// Set the block markers.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Builder;
    ///
    /// let mut builder = Builder::new();
    /// builder.set_block("(*", "*)");
    /// ```
    #[inline]
    pub fn set_block(&mut self, begin: &'marker str, end: &'marker str) {
        self.block = (begin, end);
    }

    /// Set the block markers.
    ///
    /// Returns the [`Builder`], so additional methods may be chained.
    #[inline]
    pub fn with_block(mut self, begin: &'marker str, end: &'marker str) -> Self {
        self.set_block(begin, end);

        self
    }

    /// Set the comment markers.
    #[inline]
    pub fn set_comment(&mut self, begin: &'marker str, end: &'marker str) {
        self.comment = (begin, end);
    }

    /// Set the comment markers.
    ///
    /// Returns the [`Builder`], so additional methods may be chained.
    #[inline]
    pub fn with_comment(mut self, begin: &'marker str, end: &'marker str) -> Self {
        self.set_comment(begin, end);

        self
    }

    /// Set the line statement prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Builder;
    ///
    /// let mut builder = Builder::new();
    /// builder.set_line_statement("#");
    /// ```
    #[inline]
    pub fn set_line_statement(&mut self, prefix: &'marker str) {
        self.line_statement = Some(prefix);
    }

    /// Set the line statement prefix.
    ///
    /// Returns the [`Builder`], so additional methods may be chained.
    #[inline]
    pub fn with_line_statement(mut self, prefix: &'marker str) -> Self {
        self.set_line_statement(prefix);

        self
    }

    /// Set the line comment prefix.
    #[inline]
    pub fn set_line_comment(&mut self, prefix: &'marker str) {
        self.line_comment = Some(prefix);
    }

    /// Set the line comment prefix.
    ///
    /// Returns the [`Builder`], so additional methods may be chained.
    #[inline]
    pub fn with_line_comment(mut self, prefix: &'marker str) -> Self {
        self.set_line_comment(prefix);

        self
    }

    /// Return a Syntax instance from the markers in this [`Builder`].
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Builder;
    ///
    /// let syntax = Builder::new()
    ///     .with_variable("((", "))")
    ///     .with_block("(*", "*)")
    ///     .to_syntax();
    ///
    /// assert_eq!(syntax.variable.0, "((");
    /// ```
    pub fn to_syntax(self) -> Syntax {
        let pair = |(begin, end): (&str, &str)| (begin.to_string(), end.to_string());

        Syntax {
            variable: pair(self.variable),
            block: pair(self.block),
            comment: pair(self.comment),
            line_statement: self.line_statement.map(String::from),
            line_comment: self.line_comment.map(String::from),
        }
    }
}

impl Default for Builder<'_> {
    fn default() -> Self {
        Self::new()
    }
}
