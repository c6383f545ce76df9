//! Kiln uses a type known as a Syntax to understand what delimiters
//! you would like to use in your templates. This module defines the
//! Builder type, which provides methods to easily generate a `Syntax`.
//!
//! After a Syntax has been created, it can be passed to an Engine
//! and used to compile templates.
mod builder;

pub use builder::Builder;

/// Markers that identify variables, blocks, comments and line statements
/// within text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    /// Beginning and end of a variable, `{{ }}` by default.
    pub variable: (String, String),
    /// Beginning and end of a block, `{% %}` by default.
    pub block: (String, String),
    /// Beginning and end of a comment, `{# #}` by default.
    pub comment: (String, String),
    /// Prefix that turns a whole line into a block statement.
    pub line_statement: Option<String>,
    /// Prefix that turns the rest of a line into a comment.
    pub line_comment: Option<String>,
}

impl Default for Syntax {
    fn default() -> Self {
        Builder::new().to_syntax()
    }
}

/// Identifies the kind of opening delimiter found in template data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Beginning of a variable.
    Variable,
    /// Beginning of a block.
    Block,
    /// Beginning of a comment.
    Comment,
}

impl Syntax {
    /// Return the opening delimiters in priority order.
    ///
    /// When two delimiters match at the same offset, the longer one wins.
    /// Ties between equal lengths are broken by this order, so blocks
    /// take precedence over comments, and comments over variables.
    pub(crate) fn openers(&self) -> [(Marker, &str); 3] {
        let mut openers = [
            (Marker::Block, self.block.0.as_str()),
            (Marker::Comment, self.comment.0.as_str()),
            (Marker::Variable, self.variable.0.as_str()),
        ];
        // Stable sort keeps the priority order for equal lengths.
        openers.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        openers
    }
}

#[cfg(test)]
mod tests {
    use super::{Builder, Marker};

    #[test]
    fn test_openers_priority() {
        let syntax = Builder::new()
            .with_variable("<%", "%>")
            .with_block("<%", "%>")
            .to_syntax();
        let openers = syntax.openers();

        assert_eq!(openers[0].0, Marker::Block);
        assert_eq!(openers[1].0, Marker::Comment);
        assert_eq!(openers[2].0, Marker::Variable);
    }
}
