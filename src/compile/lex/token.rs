use crate::compile::Operator;
use std::fmt::Display;

/// Types emitted by the Lexer.
///
/// A token never owns text; the [`Region`][`crate::Region`] emitted next to it
/// points into the template source, so concatenating the regions of every
/// token reproduces the source when no whitespace control is applied.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token {
    /// Template data outside of any tag.
    Data,
    /// Whitespace within a tag.
    Whitespace,
    /// Body of a comment.
    Comment,
    /// A whole line comment, including its prefix.
    LineComment,
    /// Beginning of a variable - {{ by default.
    VariableBegin,
    /// End of a variable - }} by default.
    VariableEnd,
    /// Beginning of a block - {% by default.
    BlockBegin,
    /// End of a block - %} by default.
    BlockEnd,
    /// Beginning of a comment - {# by default.
    CommentBegin,
    /// End of a comment - #} by default.
    CommentEnd,
    /// Indentation and prefix of a line statement.
    LineStatementBegin,
    /// Newline that ends a line statement, empty at the end of source.
    LineStatementEnd,
    /// Identifier (unquoted string) within a tag.
    Name,
    /// String literal within a tag, including the quotes.
    String,
    /// Integer literal within a tag.
    Integer,
    /// Float literal within a tag.
    Float,
    /// Describes an action taken on one or two values, or punctuation.
    Operator(Operator),
}

impl Token {
    /// Return true if the parser should never see this token.
    #[inline]
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            Token::Whitespace
                | Token::Comment
                | Token::LineComment
                | Token::CommentBegin
                | Token::CommentEnd
        )
    }

    /// Return true if the token closes a statement.
    #[inline]
    pub fn is_block_end(&self) -> bool {
        matches!(self, Token::BlockEnd | Token::LineStatementEnd)
    }

    /// Return true if the token opens a statement.
    #[inline]
    pub fn is_block_begin(&self) -> bool {
        matches!(self, Token::BlockBegin | Token::LineStatementBegin)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Data => write!(f, "template data"),
            Token::Whitespace => write!(f, "whitespace"),
            Token::Comment => write!(f, "comment"),
            Token::LineComment => write!(f, "line comment"),
            Token::VariableBegin => write!(f, "begin of print statement"),
            Token::VariableEnd => write!(f, "end of print statement"),
            Token::BlockBegin => write!(f, "begin of statement block"),
            Token::BlockEnd => write!(f, "end of statement block"),
            Token::CommentBegin => write!(f, "begin of comment"),
            Token::CommentEnd => write!(f, "end of comment"),
            Token::LineStatementBegin => write!(f, "begin of line statement"),
            Token::LineStatementEnd => write!(f, "end of line statement"),
            Token::Name => write!(f, "name"),
            Token::String => write!(f, "string"),
            Token::Integer => write!(f, "integer"),
            Token::Float => write!(f, "float"),
            Token::Operator(operator) => write!(f, "`{operator}`"),
        }
    }
}
