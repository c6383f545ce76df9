//! Kiln parser.
//!
//! Pulls tokens from a [`Lexer`] and builds the nodes described in [`tree`].
//! Statement tags are handled in the `statement` module and expressions in
//! the `expression` module; this module owns the token stream and the loop
//! that splits template data from tags.
pub mod constant;
pub mod tree;
pub mod visit;

mod expression;
mod statement;

use crate::{
    compile::{
        lex::{token::Token, Lexer, TokenResult},
        Operator, Options,
    },
    log::{one_of, Error, ErrorKind, UNEXPECTED_EOF, UNEXPECTED_TOKEN},
    region::{LineIndex, Region},
    security::grow_stack,
};
use indexmap::IndexMap;
use std::{collections::VecDeque, sync::Arc};
use tree::{Block, Data, Expr, Macro, Output, Stmt};

/// Tag names that close a construct the parser is inside of.
type EndTokens = &'static [&'static str];

/// Every tag that closes or continues another one, used to explain stray
/// end tags.
const END_TAGS: [(&str, &str); 19] = [
    ("endif", "if"),
    ("elif", "if"),
    ("else", "if"),
    ("endfor", "for"),
    ("endblock", "block"),
    ("endmacro", "macro"),
    ("endcall", "call"),
    ("endfilter", "filter"),
    ("endset", "set"),
    ("endwith", "with"),
    ("endautoescape", "autoescape"),
    ("endtrans", "trans"),
    ("endblocktrans", "blocktrans"),
    ("pluralize", "trans"),
    ("endspaceless", "spaceless"),
    ("endnamespace", "namespace"),
    ("endscope", "scope"),
    ("endraw", "raw"),
    ("endverbatim", "verbatim"),
];

pub struct Parser<'source> {
    /// Lexer used to pull from source as tokens instead of raw text.
    lexer: Lexer<'source>,
    /// Source text of the template.
    source: &'source str,
    options: &'source Options,
    /// Peeked tokens, never containing ignored tokens.
    buffer: VecDeque<(Token, Region)>,
    /// Tags that would close the constructs currently open, innermost last,
    /// paired with the tag that opened them.
    end_tokens: Vec<(&'static str, EndTokens)>,
    /// Every block seen so far.
    blocks: IndexMap<String, Arc<Block>>,
    /// Macros defined at the top level.
    macros: IndexMap<String, Arc<Macro>>,
    extends: Option<(String, Region)>,
    /// Number of statement bodies the parser is inside of.
    depth: usize,
    /// Number of loop bodies the parser is inside of, reset by macros.
    loops: usize,
}

impl<'source> Parser<'source> {
    /// Create a new Parser over a template.
    #[inline]
    pub fn new(source: &'source str, options: &'source Options) -> Self {
        Self::with_lexer(Lexer::new(source, options), options)
    }

    /// Create a new Parser over a standalone expression.
    #[inline]
    pub fn expression(source: &'source str, options: &'source Options) -> Self {
        Self::with_lexer(Lexer::expression(source, options), options)
    }

    fn with_lexer(lexer: Lexer<'source>, options: &'source Options) -> Self {
        Self {
            source: lexer.source,
            lexer,
            options,
            buffer: VecDeque::new(),
            end_tokens: Vec::new(),
            blocks: IndexMap::new(),
            macros: IndexMap::new(),
            extends: None,
            depth: 0,
            loops: 0,
        }
    }

    /// Parse the whole template.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the source does not match the grammar.
    pub fn parse(mut self) -> Result<tree::Template, Error> {
        let (body, _) = self.subparse(None)?;
        log::trace!(
            "parsed {} top level statements and {} blocks",
            body.len(),
            self.blocks.len()
        );

        Ok(tree::Template {
            body,
            blocks: self.blocks,
            macros: self.macros,
            extends: self.extends,
        })
    }

    /// Parse a standalone expression, which must make up the whole source.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the source is not a single expression.
    pub fn parse_standalone(mut self) -> Result<Expr, Error> {
        let expr = self.parse_tuple(false, true, &[], false)?;
        match self.next()? {
            None => Ok(expr),
            Some((token, region)) => Err(self.unexpected(token, region, "end of expression")),
        }
    }

    /// Parse statements and data until one of the given end tags is found.
    ///
    /// The name of the end tag is left in the stream, and returned along with
    /// the statements.
    fn subparse(
        &mut self,
        end_tokens: Option<EndTokens>,
    ) -> Result<(Vec<Stmt>, Option<(String, Region)>), Error> {
        let mut body: Vec<Stmt> = vec![];
        let mut output: Vec<Expr> = vec![];

        while let Some((token, region)) = self.next()? {
            match token {
                Token::Data => {
                    let text = self.data(region);
                    output.push(Expr::TemplateData(Data { text, region }));
                }
                Token::VariableBegin => {
                    let expr = self.parse_tuple(false, true, &[], false)?;
                    self.next_must(Token::VariableEnd)?;
                    output.push(expr);
                }
                token if token.is_block_begin() => {
                    flush(&mut output, &mut body);
                    if let Some(end_tokens) = end_tokens {
                        if let Some((Token::Name, name_region)) = self.peek()? {
                            let name = self.text(name_region);
                            if end_tokens.contains(&name) {
                                return Ok((body, Some((name.to_string(), name_region))));
                            }
                        }
                    }

                    let stmt = self.parse_statement(region)?;
                    self.next_block_end()?;
                    body.push(stmt);
                }
                _ => return Err(self.unexpected(token, region, "template data or a tag")),
            }
        }
        flush(&mut output, &mut body);

        match end_tokens {
            None => Ok((body, None)),
            Some(end_tokens) => Err(self.error_eof(end_tokens)),
        }
    }

    /// Parse the body of a statement up to one of the given end tags.
    ///
    /// Expects the end of the opening tag first. When `drop_needle` is true,
    /// the name of the end tag is consumed.
    fn parse_statements(
        &mut self,
        opened_by: &'static str,
        end_tokens: EndTokens,
        drop_needle: bool,
    ) -> Result<(Vec<Stmt>, String), Error> {
        self.skip_if(Token::Operator(Operator::Colon))?;
        self.next_block_end()?;

        self.end_tokens.push((opened_by, end_tokens));
        self.depth += 1;
        let result = grow_stack(|| self.subparse(Some(end_tokens)));
        self.depth -= 1;
        self.end_tokens.pop();

        let (body, needle) = result?;
        let Some((needle, _)) = needle else {
            return Err(self.error_eof(end_tokens));
        };
        if drop_needle {
            self.next()?;
        }

        Ok((body, needle))
    }

    /// Build the text of a data token, with newlines normalized.
    fn data(&self, region: Region) -> String {
        normalize_newlines(self.text(region), &self.options.newline_sequence)
    }

    /// Return the source text of a [`Region`].
    #[inline]
    fn text(&self, region: Region) -> &'source str {
        region.literal(self.source)
    }

    /// Return a [`Region`] at the end of the source.
    fn eof_region(&self) -> Region {
        let end = self.source.len();

        LineIndex::new(self.source).region(self.source, end..end)
    }

    /// Make sure enough tokens are buffered to peek `count` ahead.
    fn fill(&mut self, count: usize) -> Result<(), Error> {
        while self.buffer.len() < count {
            match self.lexer.next()? {
                Some((token, _)) if token.is_ignored() => continue,
                Some(next) => self.buffer.push_back(next),
                None => break,
            }
        }

        Ok(())
    }

    /// Peek the next token.
    ///
    /// # Errors
    ///
    /// Propagates any error reported by the underlying Lexer.
    fn peek(&mut self) -> TokenResult {
        self.peek_nth(0)
    }

    /// Peek the token `n` places ahead, where `0` is the next token.
    fn peek_nth(&mut self, n: usize) -> TokenResult {
        self.fill(n + 1)?;

        Ok(self.buffer.get(n).copied())
    }

    /// Get the next token.
    ///
    /// Prefers to pull a token from the internal buffer first, but will pull
    /// from the lexer when the buffer is empty.
    fn next(&mut self) -> TokenResult {
        self.fill(1)?;

        Ok(self.buffer.pop_front())
    }

    /// Returns true if the given token matches the upcoming token.
    fn next_is(&mut self, expect: Token) -> Result<bool, Error> {
        Ok(self.peek()?.is_some_and(|(token, _)| token == expect))
    }

    /// Returns true if the upcoming token is the given operator.
    #[inline]
    fn next_is_operator(&mut self, operator: Operator) -> Result<bool, Error> {
        self.next_is(Token::Operator(operator))
    }

    /// Returns true if the upcoming token is a name with the given text.
    fn next_is_name(&mut self, name: &str) -> Result<bool, Error> {
        self.nth_is_name(0, name)
    }

    /// Returns true if the token `n` places ahead is a name with the given text.
    fn nth_is_name(&mut self, n: usize, name: &str) -> Result<bool, Error> {
        Ok(match self.peek_nth(n)? {
            Some((Token::Name, region)) => self.text(region) == name,
            _ => false,
        })
    }

    /// Consume the next token if it matches.
    fn skip_if(&mut self, expect: Token) -> Result<Option<Region>, Error> {
        if self.next_is(expect)? {
            return Ok(self.next()?.map(|(_, region)| region));
        }

        Ok(None)
    }

    /// Consume the next token if it is a name with the given text.
    fn skip_name(&mut self, name: &str) -> Result<Option<Region>, Error> {
        if self.next_is_name(name)? {
            return Ok(self.next()?.map(|(_, region)| region));
        }

        Ok(None)
    }

    /// Get the next token, and compare it to the given token.
    ///
    /// # Errors
    ///
    /// An error is returned if the next token does not match the given token,
    /// or when no tokens are left.
    fn next_must(&mut self, expect: Token) -> Result<Region, Error> {
        match self.next()? {
            Some((token, region)) if token == expect => Ok(region),
            Some((token, region)) => Err(self.unexpected(token, region, &expect.to_string())),
            None => Err(self.error_eof_expecting(&expect.to_string())),
        }
    }

    /// Require the next token to be the given operator.
    #[inline]
    fn next_must_operator(&mut self, operator: Operator) -> Result<Region, Error> {
        self.next_must(Token::Operator(operator))
    }

    /// Require the next token to be a name with the given text.
    fn next_must_name(&mut self, name: &str) -> Result<Region, Error> {
        match self.next()? {
            Some((Token::Name, region)) if self.text(region) == name => Ok(region),
            Some((token, region)) => Err(self.unexpected(token, region, &format!("`{name}`"))),
            None => Err(self.error_eof_expecting(&format!("`{name}`"))),
        }
    }

    /// Get the next token, which must exist.
    ///
    /// # Errors
    ///
    /// An error is returned if no more tokens are left.
    fn next_any_must(&mut self) -> Result<(Token, Region), Error> {
        match self.next()? {
            Some(next) => Ok(next),
            None => Err(self.error_eof_expecting("additional tokens")),
        }
    }

    /// Require the end of a block tag or line statement.
    fn next_block_end(&mut self) -> Result<Region, Error> {
        match self.next()? {
            Some((token, region)) if token.is_block_end() => Ok(region),
            Some((token, region)) => Err(self.unexpected(token, region, "end of statement block")),
            None => Err(self.error_eof_expecting("end of statement block")),
        }
    }

    /// Return true if the next token ends a block tag or line statement.
    fn next_is_block_end(&mut self) -> Result<bool, Error> {
        Ok(self.peek()?.is_some_and(|(token, _)| token.is_block_end()))
    }

    /// Parse an identifier.
    fn parse_identifier(&mut self) -> Result<(String, Region), Error> {
        let region = self.next_must(Token::Name)?;

        Ok((self.text(region).to_string(), region))
    }

    /// Describe a token for an error message, showing its text when useful.
    fn describe(&self, token: Token, region: Region) -> String {
        match token {
            Token::Name | Token::String | Token::Integer | Token::Float => {
                format!("`{}`", self.text(region))
            }
            Token::Data => "template data".to_string(),
            token => token.to_string(),
        }
    }

    /// Build an [`ErrorKind::Syntax`] [`Error`] pointing at the region.
    fn error(&self, reason: impl Into<String>, region: Region) -> Error {
        Error::new(ErrorKind::Syntax, reason).with_pointer(self.source, region)
    }

    /// Build an [`ErrorKind::Assertion`] [`Error`] pointing at the region.
    fn assertion(&self, reason: impl Into<String>, region: Region) -> Error {
        Error::new(ErrorKind::Assertion, reason).with_pointer(self.source, region)
    }

    /// Build an [`Error`] for a token that does not fit the grammar.
    fn unexpected(&self, token: Token, region: Region, expected: &str) -> Error {
        self.error(UNEXPECTED_TOKEN, region).with_help(format!(
            "expected {expected}, found {}",
            self.describe(token, region)
        ))
    }

    /// Build an [`Error`] for the end of source while expecting something.
    fn error_eof_expecting(&self, expected: &str) -> Error {
        self.error(UNEXPECTED_EOF, self.eof_region())
            .with_help(format!("expected {expected}"))
    }

    /// Build an [`Error`] for the end of source inside of a construct.
    fn error_eof(&self, end_tokens: EndTokens) -> Error {
        let mut error = self.error(
            format!("{UNEXPECTED_EOF}, expected {}", one_of(end_tokens)),
            self.eof_region(),
        );
        if let Some((opened_by, _)) = self.end_tokens.last() {
            error = error.with_help(format!(
                "the innermost block that needs to be closed is `{opened_by}`"
            ));
        }

        error
    }

    /// Build an [`Error`] for a tag name the parser does not recognize.
    fn error_unknown_tag(&self, name: &str, region: Region) -> Error {
        let mut expected: Vec<&str> = vec![];
        for (_, tokens) in self.end_tokens.iter().rev() {
            for token in tokens.iter() {
                if !expected.contains(token) {
                    expected.push(token);
                }
            }
        }

        let stray = END_TAGS.iter().find(|(end, _)| *end == name);
        let error = match stray {
            Some((_, opener)) if self.end_tokens.is_empty() => self.error(
                format!("unexpected tag `{name}`"),
                region,
            )
            .with_help(format!(
                "`{name}` closes a `{opener}` block, but no block is open"
            )),
            _ => self.error(format!("unknown tag `{name}`"), region),
        };

        match self.end_tokens.last() {
            Some((opened_by, _)) => error.with_help(format!(
                "expected {}, the innermost block that needs to be closed is `{opened_by}`",
                one_of(&expected)
            )),
            None => error,
        }
    }
}

/// Move pending output nodes into a single [`Output`] statement.
fn flush(output: &mut Vec<Expr>, body: &mut Vec<Stmt>) {
    if output.is_empty() {
        return;
    }

    let nodes = std::mem::take(output)
        .into_iter()
        .map(constant::optimize)
        .collect::<Vec<_>>();
    let first = nodes[0].region();
    let region = nodes
        .iter()
        .skip(1)
        .fold(first, |region, node| region.combine(node.region()));
    body.push(Stmt::Output(Output { nodes, region }));
}

/// Replace every newline in the text with the given sequence.
pub(crate) fn normalize_newlines(text: &str, sequence: &str) -> String {
    if sequence == "\n" && !text.contains('\r') {
        return text.to_string();
    }

    let mut normalized = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                normalized.push_str(sequence);
            }
            '\n' => normalized.push_str(sequence),
            c => normalized.push(c),
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::{normalize_newlines, Parser};
    use crate::{
        compile::{
            lex::token::Token,
            tree::{BinOp, Expr, Stmt},
            Options,
        },
        log::ErrorKind,
    };

    #[test]
    fn test_parser_lexer_integration() {
        let options = Options::default();
        let mut parser = Parser::new("hello", &options);
        assert_eq!(parser.next().unwrap().map(|(t, _)| t), Some(Token::Data));
        assert_eq!(parser.next().unwrap(), None);
    }

    #[test]
    fn test_peek_multiple() {
        let options = Options::default();
        let mut parser = Parser::new("{{ one two", &options);
        assert!(parser.next().is_ok());
        let first = parser.peek().unwrap();
        assert_eq!(parser.peek().unwrap(), first);
        assert_eq!(first.map(|(t, r)| (t, r.begin..r.end)), Some((Token::Name, 3..6)));
        assert_eq!(
            parser.peek_nth(1).unwrap().map(|(_, r)| r.begin..r.end),
            Some(7..10)
        );
    }

    #[test]
    fn test_output_merges_data_and_expressions() {
        let body = parse("a {{ b }} c");

        assert_eq!(body.len(), 1);
        let Stmt::Output(output) = &body[0] else {
            panic!("expected output");
        };
        assert_eq!(output.nodes.len(), 3);
    }

    #[test]
    fn test_precedence() {
        let body = parse("{{ a + b * c }}");
        let Stmt::Output(output) = &body[0] else {
            panic!("expected output");
        };
        let Expr::Bin(add) = &output.nodes[0] else {
            panic!("expected binary expression");
        };

        assert_eq!(add.op, BinOp::Add);
        assert!(matches!(&add.right, Expr::Bin(mul) if mul.op == BinOp::Mul));
    }

    #[test]
    fn test_unknown_tag() {
        let error = parse_err("{% unknown %}");

        assert_eq!(error.kind(), ErrorKind::Syntax);
        assert!(error.reason().contains("unknown tag `unknown`"));
    }

    #[test]
    fn test_unknown_tag_lists_expected() {
        let error = parse_err("{% for x in y %}{% bogus %}{% endfor %}");
        let help = error.help().unwrap_or_default();

        assert!(help.contains("`endfor`"));
        assert!(help.contains("`else`"));
        assert!(help.contains("`for`"));
    }

    #[test]
    fn test_stray_end_tag() {
        let error = parse_err("{% endif %}");

        assert!(error.reason().contains("unexpected tag `endif`"));
    }

    #[test]
    fn test_unclosed_block() {
        let error = parse_err("{% if x %}open");

        assert!(error.reason().contains("`elif`, `else` or `endif`"));
    }

    #[test]
    fn test_unclosed_variable() {
        let error = parse_err("{{ name");

        assert!(error.reason().contains("missing"));
    }

    #[test]
    fn test_standalone_expression() {
        let options = Options::default();
        let expr = Parser::expression("1 + 2 * 3", &options).parse_standalone();

        assert!(expr.is_ok());
        assert!(Parser::expression("1 +", &options)
            .parse_standalone()
            .is_err());
    }

    #[test]
    fn test_newline_sequence() {
        assert_eq!(normalize_newlines("a\r\nb\nc\rd", "\n"), "a\nb\nc\nd");
        assert_eq!(normalize_newlines("a\nb", "\r\n"), "a\r\nb");
    }

    fn parse(source: &str) -> Vec<Stmt> {
        let options = Options::default();
        Parser::new(source, &options).parse().unwrap().body
    }

    fn parse_err(source: &str) -> crate::log::Error {
        let options = Options::default();
        Parser::new(source, &options).parse().unwrap_err()
    }
}
