/// Describes the internal state of a [`Lexer`][`super::Lexer`].
///
/// The lexer keeps these on a stack; the bottom entry is the state the
/// lexer was created in.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CursorState {
    /// Indicates the [`Lexer`][`super::Lexer`] is reading template data.
    Root,
    /// Inside of a variable, `{{ }}` by default.
    Variable,
    /// Inside of a block, `{% %}` by default.
    Block,
    /// Inside of a comment, `{# #}` by default.
    Comment,
    /// Inside of a `raw` or `verbatim` block, waiting for the named end tag.
    Raw(RawKind),
    /// Inside of a line statement, which ends at the next newline outside
    /// of brackets.
    LineStatement,
    /// Inside of a line comment, which ends at the next newline.
    LineComment,
}

/// Which tag opened a raw block, and so which tag closes it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RawKind {
    Raw,
    Verbatim,
}

impl RawKind {
    /// Return the name of the tag that opens this kind of raw block.
    pub fn begin(&self) -> &'static str {
        match self {
            RawKind::Raw => "raw",
            RawKind::Verbatim => "verbatim",
        }
    }

    /// Return the name of the tag that closes this kind of raw block.
    pub fn end(&self) -> &'static str {
        match self {
            RawKind::Raw => "endraw",
            RawKind::Verbatim => "endverbatim",
        }
    }
}

/// Whitespace handling owed to the next piece of template data.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum PendingTrim {
    /// Leave the data alone.
    #[default]
    None,
    /// Remove a single leading newline (`trim_blocks`).
    Newline,
    /// Remove all leading whitespace (a `-` sign on the previous tag).
    All,
}
