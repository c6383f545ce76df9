mod lex;
mod parse;
mod template;

pub use crate::compile::{
    lex::token,
    parse::{tree, Parser},
    template::{BlockChain, Template},
};

use crate::{log::Error, syntax::Syntax, Engine};
use std::{fmt::Display, sync::Arc};

/// Compile a [`Template`] from the given text.
///
/// Provides a shortcut to quickly compile a `Template` without creating
/// an `Engine`. Templates compiled this way cannot extend, include or
/// import other templates, because there is nothing to load them from.
///
/// # Examples
///
/// ```
/// use kiln::compile;
///
/// let template = compile("{{ name }}");
/// assert!(template.is_ok())
/// ```
pub fn compile(text: &str) -> Result<Arc<Template>, Error> {
    Engine::default().compile(text)
}

/// Options that change how source text is turned into tokens and nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Delimiters used to find tags in template data.
    pub syntax: Syntax,
    /// Remove the first newline after a block tag.
    pub trim_blocks: bool,
    /// Strip tabs and spaces from the start of a line up to a block tag.
    pub lstrip_blocks: bool,
    /// Keep a single trailing newline at the end of the template.
    pub keep_trailing_newline: bool,
    /// Sequence that every newline in template data is replaced with.
    pub newline_sequence: String,
    /// Accept `async for`, `async with` and `await`.
    pub enable_async: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            syntax: Syntax::default(),
            trim_blocks: false,
            lstrip_blocks: false,
            keep_trailing_newline: false,
            newline_sequence: "\n".to_string(),
            enable_async: false,
        }
    }
}

/// Statement tags recognized by the Parser.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Keyword {
    If,
    For,
    Block,
    Extends,
    Print,
    Macro,
    Include,
    From,
    Import,
    Set,
    With,
    Autoescape,
    Filter,
    Call,
    Trans,
    Blocktrans,
    Do,
    Break,
    Continue,
    Spaceless,
    Namespace,
    Export,
    Scope,
    Raw,
    Verbatim,
    Async,
}

impl Keyword {
    /// Return the [`Keyword`] with the given tag name, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        let keyword = match name {
            "if" => Keyword::If,
            "for" => Keyword::For,
            "block" => Keyword::Block,
            "extends" => Keyword::Extends,
            "print" => Keyword::Print,
            "macro" => Keyword::Macro,
            "include" => Keyword::Include,
            "from" => Keyword::From,
            "import" => Keyword::Import,
            "set" => Keyword::Set,
            "with" => Keyword::With,
            "autoescape" => Keyword::Autoescape,
            "filter" => Keyword::Filter,
            "call" => Keyword::Call,
            "trans" => Keyword::Trans,
            "blocktrans" => Keyword::Blocktrans,
            "do" => Keyword::Do,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "spaceless" => Keyword::Spaceless,
            "namespace" => Keyword::Namespace,
            "export" => Keyword::Export,
            "scope" => Keyword::Scope,
            "raw" => Keyword::Raw,
            "verbatim" => Keyword::Verbatim,
            "async" => Keyword::Async,
            _ => return None,
        };

        Some(keyword)
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Keyword::If => "if",
            Keyword::For => "for",
            Keyword::Block => "block",
            Keyword::Extends => "extends",
            Keyword::Print => "print",
            Keyword::Macro => "macro",
            Keyword::Include => "include",
            Keyword::From => "from",
            Keyword::Import => "import",
            Keyword::Set => "set",
            Keyword::With => "with",
            Keyword::Autoescape => "autoescape",
            Keyword::Filter => "filter",
            Keyword::Call => "call",
            Keyword::Trans => "trans",
            Keyword::Blocktrans => "blocktrans",
            Keyword::Do => "do",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Spaceless => "spaceless",
            Keyword::Namespace => "namespace",
            Keyword::Export => "export",
            Keyword::Scope => "scope",
            Keyword::Raw => "raw",
            Keyword::Verbatim => "verbatim",
            Keyword::Async => "async",
        };
        write!(f, "{text}")
    }
}

/// Operators and punctuation recognized by the Lexer and Parser.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Operator {
    /// +
    Add,
    /// -
    Subtract,
    /// *
    Multiply,
    /// /
    Divide,
    /// //
    FloorDivide,
    /// **
    Power,
    /// %
    Modulo,
    /// ~
    Tilde,
    /// >
    Greater,
    /// <
    Lesser,
    /// ==
    Equal,
    /// !=
    NotEqual,
    /// >=
    GreaterOrEqual,
    /// <=
    LesserOrEqual,
    /// =
    Assign,
    /// .
    Period,
    /// :
    Colon,
    /// |
    Pipe,
    /// ,
    Comma,
    /// ;
    Semicolon,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// {
    LeftBrace,
    /// }
    RightBrace,
}

impl Operator {
    /// Return the closing bracket for an opening bracket.
    pub fn closing(&self) -> Option<Operator> {
        match self {
            Operator::LeftParen => Some(Operator::RightParen),
            Operator::LeftBracket => Some(Operator::RightBracket),
            Operator::LeftBrace => Some(Operator::RightBrace),
            _ => None,
        }
    }

    /// Return true if the operator closes a bracket.
    pub fn is_closing(&self) -> bool {
        matches!(
            self,
            Operator::RightParen | Operator::RightBracket | Operator::RightBrace
        )
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::FloorDivide => "//",
            Operator::Power => "**",
            Operator::Modulo => "%",
            Operator::Tilde => "~",
            Operator::Greater => ">",
            Operator::Lesser => "<",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::GreaterOrEqual => ">=",
            Operator::LesserOrEqual => "<=",
            Operator::Assign => "=",
            Operator::Period => ".",
            Operator::Colon => ":",
            Operator::Pipe => "|",
            Operator::Comma => ",",
            Operator::Semicolon => ";",
            Operator::LeftParen => "(",
            Operator::RightParen => ")",
            Operator::LeftBracket => "[",
            Operator::RightBracket => "]",
            Operator::LeftBrace => "{",
            Operator::RightBrace => "}",
        };
        write!(f, "{text}")
    }
}
