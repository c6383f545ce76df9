pub mod state;
pub mod token;

use crate::{
    compile::{Operator, Options},
    log::{Error, ErrorKind, UNEXPECTED_CHARACTER, UNEXPECTED_EOF},
    region::{LineIndex, Region},
    syntax::Marker,
};
use state::{CursorState, PendingTrim, RawKind};
use std::collections::VecDeque;
use token::Token;

/// Result of reading a single [`Token`].
pub type TokenResult = Result<Option<(Token, Region)>, Error>;

/// Read the entire source as a list of [`Token`] and [`Region`] pairs.
///
/// # Errors
///
/// Returns an [`Error`] when the source contains malformed tags.
#[cfg(test)]
pub(crate) fn tokenize(source: &str, options: &Options) -> Result<Vec<(Token, Region)>, Error> {
    let mut lexer = Lexer::new(source, options);
    let mut tokens = Vec::new();
    while let Some(next) = lexer.next()? {
        tokens.push(next);
    }

    Ok(tokens)
}

/// Provides methods to read a source string as [`Token`] instances.
pub struct Lexer<'source> {
    /// Reference to the source text.
    pub source: &'source str,
    /// Position within source.
    pub cursor: usize,
    /// Delimiters and whitespace rules.
    options: &'source Options,
    /// Maps byte offsets to lines and columns.
    index: LineIndex,
    /// Stack of states, paired with the region of the delimiter that
    /// entered them. The bottom entry is never popped.
    states: Vec<(CursorState, Region)>,
    /// Open brackets within the current tag.
    balance: Vec<(Operator, Region)>,
    /// Trim owed to the next piece of template data.
    pending: PendingTrim,
    /// Set when the block tag being read opens a raw block.
    raw: Option<RawKind>,
    /// Tokens produced ahead of time, returned before reading more source.
    buffer: VecDeque<(Token, Region)>,
}

impl<'source> Lexer<'source> {
    /// Create a new [`Lexer`] that begins reading template data.
    #[inline]
    pub fn new(source: &'source str, options: &'source Options) -> Self {
        Self::with_state(source, options, CursorState::Root)
    }

    /// Create a new [`Lexer`] that reads the whole source as the inside of
    /// a variable tag, which is how standalone expressions are compiled.
    #[inline]
    pub fn expression(source: &'source str, options: &'source Options) -> Self {
        Self::with_state(source, options, CursorState::Variable)
    }

    fn with_state(source: &'source str, options: &'source Options, state: CursorState) -> Self {
        let index = LineIndex::new(source);
        let bottom = index.region(source, 0..0);

        Self {
            source,
            cursor: 0,
            options,
            index,
            states: vec![(state, bottom)],
            balance: Vec::new(),
            pending: PendingTrim::None,
            raw: None,
            buffer: VecDeque::new(),
        }
    }

    /// Return the current state.
    #[inline]
    pub fn state(&self) -> CursorState {
        self.states.last().map(|(state, _)| *state).unwrap_or(CursorState::Root)
    }

    /// Return the next [`Token`] and [`Region`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when an unexpected character is found, or the
    /// source ends inside of a tag.
    pub fn next(&mut self) -> TokenResult {
        loop {
            if let Some(next) = self.buffer.pop_front() {
                return Ok(Some(next));
            }
            if self.cursor >= self.source.len() {
                match self.lex_eof()? {
                    Some(token) => return Ok(Some(token)),
                    None if self.states.len() > 1 => continue,
                    None => return Ok(None),
                }
            }

            match self.state() {
                CursorState::Root => self.lex_root()?,
                CursorState::Comment => self.lex_comment()?,
                CursorState::Raw(kind) => self.lex_raw(kind)?,
                CursorState::LineComment => self.lex_line_comment(),
                state => self.lex_tag(state)?,
            }
        }
    }

    /// Handle the end of source in the current state.
    ///
    /// Line statements and line comments are closed implicitly. Every other
    /// state other than the bottom one is an error.
    fn lex_eof(&mut self) -> TokenResult {
        let end = self.source.len();
        if let Some((operator, region)) = self.balance.last() {
            let closing = operator.closing().unwrap_or(*operator);
            return Err(self
                .error(format!("unclosed `{operator}`"), *region)
                .with_help(format!("expected `{closing}` before the end of the template")));
        }
        if self.states.len() == 1 {
            return Ok(None);
        }

        let (state, opened) = self.states[self.states.len() - 1];
        let syntax = &self.options.syntax;
        let missing = match state {
            CursorState::LineStatement => {
                self.states.pop();
                return Ok(Some((Token::LineStatementEnd, self.region(end..end))));
            }
            CursorState::LineComment | CursorState::Root => {
                self.states.pop();
                return Ok(None);
            }
            CursorState::Variable => format!("missing `{}` to close the variable", syntax.variable.1),
            CursorState::Block => format!("missing `{}` to close the block", syntax.block.1),
            CursorState::Comment => format!("missing `{}` to close the comment", syntax.comment.1),
            CursorState::Raw(kind) => format!(
                "missing `{} {} {}` to close the {} block",
                syntax.block.0,
                kind.end(),
                syntax.block.1,
                kind.begin()
            ),
        };

        Err(
            Error::new(ErrorKind::Lex, format!("{UNEXPECTED_EOF}, {missing}"))
                .with_pointer(self.source, opened),
        )
    }

    /// Read template data up to the next tag or line prefix.
    fn lex_root(&mut self) -> Result<(), Error> {
        let from = self.cursor;
        let opener = self.find_opener(from);
        let line = self.find_line_prefix(from);

        match (opener, line) {
            (Some((_, _, at)), Some((comment, begin, prefix))) if begin <= at => {
                self.begin_line(from, comment, begin, prefix)
            }
            (None, Some((comment, begin, prefix))) => self.begin_line(from, comment, begin, prefix),
            (Some((marker, length, at)), _) => self.begin_tag(from, marker, length, at),
            (None, None) => {
                let (begin, mut end) = self.take_pending(from, self.source.len());
                if !self.options.keep_trailing_newline {
                    let data = &self.source[begin..end];
                    if let Some(stripped) = data
                        .strip_suffix("\r\n")
                        .or_else(|| data.strip_suffix('\n'))
                    {
                        end = begin + stripped.len();
                    }
                }
                self.push_data(begin, end);
                self.cursor = self.source.len();
            }
        }

        Ok(())
    }

    /// Emit data before an opening delimiter, then the delimiter itself.
    fn begin_tag(&mut self, from: usize, marker: Marker, length: usize, at: usize) {
        let after = at + length;
        let sign = match self.source[after..].chars().next() {
            Some(c @ ('-' | '+')) => Some(c),
            _ => None,
        };

        let (begin, mut end) = self.take_pending(from, at);
        match sign {
            Some('-') => end = begin + self.source[begin..end].trim_end().len(),
            Some(_) => {}
            None if self.options.lstrip_blocks && marker != Marker::Variable => {
                end = self.lstrip(begin, end)
            }
            None => {}
        }
        self.push_data(begin, end);

        let tag_end = after + sign.map_or(0, |c| c.len_utf8());
        let region = self.region(at..tag_end);
        let (token, state) = match marker {
            Marker::Variable => (Token::VariableBegin, CursorState::Variable),
            Marker::Block => {
                self.raw = self.detect_raw(tag_end);
                (Token::BlockBegin, CursorState::Block)
            }
            Marker::Comment => (Token::CommentBegin, CursorState::Comment),
        };
        self.buffer.push_back((token, region));
        log::trace!("lexer entering {state:?} at {}", region.position);
        self.states.push((state, region));
        self.cursor = tag_end;
    }

    /// Emit data before a line prefix, then enter the line statement or
    /// line comment.
    fn begin_line(&mut self, from: usize, comment: bool, begin: usize, prefix: usize) {
        let (data_begin, data_end) = self.take_pending(from, begin);
        self.push_data(data_begin, data_end);

        if comment {
            let region = self.region(begin..begin);
            self.states.push((CursorState::LineComment, region));
            self.cursor = begin;
            return;
        }

        let length = self
            .options
            .syntax
            .line_statement
            .as_ref()
            .map_or(0, |s| s.len());
        let region = self.region(begin..prefix + length);
        self.buffer.push_back((Token::LineStatementBegin, region));
        self.states.push((CursorState::LineStatement, region));
        self.cursor = prefix + length;
    }

    /// Read the body and closing delimiter of a comment.
    fn lex_comment(&mut self) -> Result<(), Error> {
        let from = self.cursor;
        let closer = self.options.syntax.comment.1.as_str();
        let Some(offset) = self.source[from..].find(closer) else {
            self.cursor = self.source.len();
            return Ok(());
        };

        let at = from + offset;
        let sign = match self.source[from..at].chars().last() {
            Some(c @ ('-' | '+')) => Some(c),
            _ => None,
        };
        let body_end = at - sign.map_or(0, |c| c.len_utf8());
        if from < body_end {
            let region = self.region(from..body_end);
            self.buffer.push_back((Token::Comment, region));
        }
        let region = self.region(body_end..at + closer.len());
        self.buffer.push_back((Token::CommentEnd, region));

        self.close(sign, true);
        self.cursor = at + closer.len();

        Ok(())
    }

    /// Read the remainder of a line comment, leaving the newline as data.
    fn lex_line_comment(&mut self) {
        let from = self.cursor;
        let end = self.source[from..]
            .find('\n')
            .map_or(self.source.len(), |offset| from + offset);
        let end = match self.source[..end].ends_with('\r') {
            true => end - 1,
            false => end,
        };

        let region = self.region(from..end);
        self.buffer.push_back((Token::LineComment, region));
        self.states.pop();
        self.cursor = end;
    }

    /// Read raw data up to the matching end tag, then emit the beginning of
    /// that tag so it is read as a regular block.
    fn lex_raw(&mut self, kind: RawKind) -> Result<(), Error> {
        let from = self.cursor;
        let (opener, closer) = &self.options.syntax.block;
        let mut search = from;

        while let Some(offset) = self.source[search..].find(opener.as_str()) {
            let at = search + offset;
            let after = at + opener.len();
            let rest = &self.source[after..];
            let sign = usize::from(rest.starts_with('-') || rest.starts_with('+'));

            if is_tag(&rest[sign..], kind.end(), closer) {
                self.push_data(from, at);
                let region = self.region(at..after + sign);
                self.buffer.push_back((Token::BlockBegin, region));
                self.states.pop();
                self.states.push((CursorState::Block, region));
                self.cursor = after + sign;

                return Ok(());
            }
            search = after;
        }

        self.cursor = self.source.len();

        Ok(())
    }

    /// Read the next token inside of a variable, block or line statement.
    fn lex_tag(&mut self, state: CursorState) -> Result<(), Error> {
        let from = self.cursor;
        let rest = &self.source[from..];

        if self.balance.is_empty() {
            if state == CursorState::LineStatement {
                let newline = match rest {
                    r if r.starts_with("\r\n") => 2,
                    r if r.starts_with('\n') => 1,
                    _ => 0,
                };
                if newline > 0 {
                    let region = self.region(from..from + newline);
                    self.buffer.push_back((Token::LineStatementEnd, region));
                    self.states.pop();
                    self.cursor = from + newline;
                    return Ok(());
                }
            } else if let Some((sign, length)) = self.find_closer(state, rest) {
                let token = match state {
                    CursorState::Variable => Token::VariableEnd,
                    _ => Token::BlockEnd,
                };
                let region = self.region(from..from + length);
                self.buffer.push_back((token, region));
                self.cursor = from + length;

                // A standalone expression has no closing delimiter to find,
                // so this only happens inside of template data.
                if self.states.len() > 1 {
                    self.close(sign, state == CursorState::Block);
                    if state == CursorState::Block {
                        if let Some(kind) = self.raw.take() {
                            self.pending = PendingTrim::None;
                            log::trace!("lexer entering raw data at {}", region.position);
                            self.states.push((CursorState::Raw(kind), region));
                        }
                    }
                }
                return Ok(());
            }
        }

        let Some(c) = rest.chars().next() else {
            return Ok(());
        };
        let (token, end) = match c {
            c if c.is_whitespace() => (Token::Whitespace, self.scan_whitespace(from, state)),
            '0'..='9' => self.scan_number(from)?,
            '"' | '\'' => (Token::String, self.scan_string(from, c)?),
            c if is_ident_start(c) => (Token::Name, self.scan_name(from)),
            c if unicode_ident::is_xid_continue(c) => {
                let region = self.region(from..from + c.len_utf8());
                return Err(self
                    .error("invalid identifier", region)
                    .with_help(format!("`{c}` cannot begin an identifier")));
            }
            _ => {
                let (operator, length) = self.scan_operator(from, c)?;
                (Token::Operator(operator), from + length)
            }
        };

        let region = self.region(from..end);
        if let Token::Operator(operator) = token {
            self.track_balance(operator, region)?;
        }
        self.buffer.push_back((token, region));
        self.cursor = end;

        Ok(())
    }

    /// Pop the current tag state and record the trim owed to the data that
    /// follows it.
    fn close(&mut self, sign: Option<char>, is_statement: bool) {
        self.states.pop();
        self.pending = match sign {
            Some('-') => PendingTrim::All,
            Some(_) => PendingTrim::None,
            None if is_statement && self.options.trim_blocks => PendingTrim::Newline,
            None => PendingTrim::None,
        };
    }

    /// Return the sign and total length of a closing delimiter at the start
    /// of `rest`, if one is there.
    fn find_closer(&self, state: CursorState, rest: &str) -> Option<(Option<char>, usize)> {
        let closer = match state {
            CursorState::Variable => &self.options.syntax.variable.1,
            _ => &self.options.syntax.block.1,
        };

        for sign in ['-', '+'] {
            if rest.starts_with(sign) && rest[1..].starts_with(closer.as_str()) {
                return Some((Some(sign), closer.len() + 1));
            }
        }
        rest.starts_with(closer.as_str())
            .then_some((None, closer.len()))
    }

    /// Find the nearest opening delimiter at or after `from`.
    ///
    /// Returns the marker, the delimiter length and its offset.
    fn find_opener(&self, from: usize) -> Option<(Marker, usize, usize)> {
        let mut found: Option<(Marker, usize, usize)> = None;
        for (marker, opener) in self.options.syntax.openers() {
            if opener.is_empty() {
                continue;
            }
            if let Some(offset) = self.source[from..].find(opener) {
                let at = from + offset;
                if found.map_or(true, |(_, _, best)| at < best) {
                    found = Some((marker, opener.len(), at));
                }
            }
        }

        found
    }

    /// Find the nearest line statement or line comment prefix at or after
    /// `from` that is only preceded by spaces and tabs on its line.
    ///
    /// Returns whether it is a comment, the offset of the line start and
    /// the offset of the prefix.
    fn find_line_prefix(&self, from: usize) -> Option<(bool, usize, usize)> {
        let syntax = &self.options.syntax;
        let mut candidates = [
            (true, syntax.line_comment.as_deref()),
            (false, syntax.line_statement.as_deref()),
        ];
        // Longer prefixes are checked first, so `##` beats `#`.
        candidates.sort_by_key(|(_, prefix)| std::cmp::Reverse(prefix.map_or(0, str::len)));

        let mut found: Option<(bool, usize, usize)> = None;
        for (comment, prefix) in candidates {
            let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
                continue;
            };
            let mut search = from;
            while let Some(offset) = self.source[search..].find(prefix) {
                let at = search + offset;
                let line = self.source[..at].rfind('\n').map_or(0, |i| i + 1);
                if line >= from && is_blank(&self.source[line..at]) {
                    if found.map_or(true, |(_, best, _)| line < best) {
                        found = Some((comment, line, at));
                    }
                    break;
                }
                search = at + prefix.len();
            }
        }

        found
    }

    /// Return true if the block tag starting at `from` is `raw` or
    /// `verbatim`, and which.
    fn detect_raw(&self, from: usize) -> Option<RawKind> {
        let closer = &self.options.syntax.block.1;
        let rest = &self.source[from..];

        [RawKind::Raw, RawKind::Verbatim]
            .into_iter()
            .find(|kind| is_tag(rest, kind.begin(), closer))
    }

    /// Apply the pending trim to the data between `begin` and `end`.
    fn take_pending(&mut self, mut begin: usize, end: usize) -> (usize, usize) {
        let data = &self.source[begin..end];
        match std::mem::take(&mut self.pending) {
            PendingTrim::All => begin += data.len() - data.trim_start().len(),
            PendingTrim::Newline if data.starts_with("\r\n") => begin += 2,
            PendingTrim::Newline if data.starts_with('\n') => begin += 1,
            _ => {}
        }

        (begin, end)
    }

    /// Strip spaces and tabs between the last line start and `end`, as long
    /// as nothing else is on that line.
    fn lstrip(&self, begin: usize, end: usize) -> usize {
        let data = &self.source[begin..end];
        match data.rfind('\n') {
            Some(newline) if is_blank(&data[newline + 1..]) => begin + newline + 1,
            Some(_) => end,
            None => {
                let line_start = begin == 0 || self.source[..begin].ends_with('\n');
                match line_start && is_blank(data) {
                    true => begin,
                    false => end,
                }
            }
        }
    }

    /// Buffer template data if the range is not empty.
    fn push_data(&mut self, begin: usize, end: usize) {
        if begin < end {
            let region = self.region(begin..end);
            self.buffer.push_back((Token::Data, region));
        }
    }

    /// Return the end of a whitespace run.
    ///
    /// Within a line statement with no open brackets, the run stops before
    /// a newline so the statement can end there.
    fn scan_whitespace(&self, from: usize, state: CursorState) -> usize {
        let stop_at_newline = state == CursorState::LineStatement && self.balance.is_empty();
        let rest = &self.source[from..];
        let mut end = from;
        for (index, c) in rest.char_indices() {
            if !c.is_whitespace() {
                break;
            }
            if stop_at_newline && (c == '\n' || rest[index..].starts_with("\r\n")) && index > 0 {
                break;
            }
            end = from + index + c.len_utf8();
        }

        end
    }

    /// Return the kind and end of a number literal.
    fn scan_number(&self, from: usize) -> Result<(Token, usize), Error> {
        let bytes = self.source.as_bytes();
        let len = bytes.len();
        let digits = |mut at: usize| {
            while at < len && (bytes[at].is_ascii_digit() || bytes[at] == b'_') {
                at += 1;
            }
            at
        };

        if bytes[from] == b'0' && from + 1 < len {
            let radix: Option<fn(u8) -> bool> = match bytes[from + 1] {
                b'b' | b'B' => Some(|b| matches!(b, b'0' | b'1')),
                b'o' | b'O' => Some(|b| matches!(b, b'0'..=b'7')),
                b'x' | b'X' => Some(|b: u8| b.is_ascii_hexdigit()),
                _ => None,
            };
            if let Some(is_digit) = radix {
                let mut at = from + 2;
                while at < len && (is_digit(bytes[at]) || bytes[at] == b'_') {
                    at += 1;
                }
                if at > from + 2 {
                    self.check_separators(from, at, true)?;
                    return Ok((Token::Integer, at));
                }
            }
        }

        let mut end = digits(from);
        let mut token = Token::Integer;
        // `a.0.1` is two integer lookups, not a float.
        if from > 0 && bytes[from - 1] == b'.' {
            self.check_separators(from, end, false)?;
            return Ok((token, end));
        }
        if end + 1 < len && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
            end = digits(end + 1);
            token = Token::Float;
        }
        if end < len && matches!(bytes[end], b'e' | b'E') {
            let mut at = end + 1;
            if at < len && matches!(bytes[at], b'+' | b'-') {
                at += 1;
            }
            if at < len && bytes[at].is_ascii_digit() {
                end = digits(at);
                token = Token::Float;
            }
        }

        self.check_separators(from, end, false)?;
        Ok((token, end))
    }

    /// Return an error if a `_` in the number at `from..end` does not sit
    /// between two digits. A radix prefix such as `0x` may be followed by one.
    fn check_separators(&self, from: usize, end: usize, radix: bool) -> Result<(), Error> {
        let bytes = &self.source.as_bytes()[from..end];
        let is_digit = |b: u8| match radix {
            true => b.is_ascii_hexdigit(),
            false => b.is_ascii_digit(),
        };

        for (index, _) in bytes.iter().enumerate().filter(|(_, b)| **b == b'_') {
            let leads = (radix && index == 2) || (index > 0 && is_digit(bytes[index - 1]));
            let trails = bytes.get(index + 1).is_some_and(|b| is_digit(*b));
            if !leads || !trails {
                let region = self.region(from + index..from + index + 1);
                return Err(self
                    .error("invalid number", region)
                    .with_help("`_` may only appear between digits"));
            }
        }

        Ok(())
    }

    /// Return the end of a string literal, including the closing quote.
    fn scan_string(&self, from: usize, quote: char) -> Result<usize, Error> {
        let mut escaped = false;
        for (index, c) in self.source[from + 1..].char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                c if c == quote => return Ok(from + 1 + index + 1),
                _ => {}
            }
        }

        let region = self.region(from..from + 1);
        Err(self
            .error("unterminated string", region)
            .with_help(format!("this might be an undelimited string, try closing it with `{quote}`")))
    }

    /// Return the end of an identifier.
    fn scan_name(&self, from: usize) -> usize {
        self.source[from..]
            .char_indices()
            .find(|(_, c)| !unicode_ident::is_xid_continue(*c))
            .map_or(self.source.len(), |(index, _)| from + index)
    }

    /// Return the operator at `from` and its length.
    fn scan_operator(&self, from: usize, c: char) -> Result<(Operator, usize), Error> {
        let rest = &self.source[from..];
        let double = [
            ("//", Operator::FloorDivide),
            ("**", Operator::Power),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            (">=", Operator::GreaterOrEqual),
            ("<=", Operator::LesserOrEqual),
        ];
        if let Some((text, operator)) = double.iter().find(|(text, _)| rest.starts_with(text)) {
            return Ok((*operator, text.len()));
        }

        let operator = match c {
            '+' => Operator::Add,
            '-' => Operator::Subtract,
            '*' => Operator::Multiply,
            '/' => Operator::Divide,
            '%' => Operator::Modulo,
            '~' => Operator::Tilde,
            '>' => Operator::Greater,
            '<' => Operator::Lesser,
            '=' => Operator::Assign,
            '.' => Operator::Period,
            ':' => Operator::Colon,
            '|' => Operator::Pipe,
            ',' => Operator::Comma,
            ';' => Operator::Semicolon,
            '(' => Operator::LeftParen,
            ')' => Operator::RightParen,
            '[' => Operator::LeftBracket,
            ']' => Operator::RightBracket,
            '{' => Operator::LeftBrace,
            '}' => Operator::RightBrace,
            _ => {
                let region = self.region(from..from + c.len_utf8());
                return Err(self.error(UNEXPECTED_CHARACTER, region).with_help(format!(
                    "`{c}` is not an operator, identifier, number or string"
                )));
            }
        };

        Ok((operator, 1))
    }

    /// Push opening brackets and check closing brackets against them.
    fn track_balance(&mut self, operator: Operator, region: Region) -> Result<(), Error> {
        if operator.closing().is_some() {
            self.balance.push((operator, region));
            return Ok(());
        }
        if !operator.is_closing() {
            return Ok(());
        }

        match self.balance.pop() {
            Some((open, _)) if open.closing() == Some(operator) => Ok(()),
            Some((open, _)) => Err(self
                .error(format!("unexpected `{operator}`"), region)
                .with_help(format!("expected `{}`", open.closing().unwrap_or(open)))),
            None => Err(self.error(format!("unexpected `{operator}`"), region)),
        }
    }

    #[inline]
    fn region(&self, range: std::ops::Range<usize>) -> Region {
        self.index.region(self.source, range)
    }

    fn error(&self, reason: impl Into<String>, region: Region) -> Error {
        Error::new(ErrorKind::Lex, reason).with_pointer(self.source, region)
    }
}

/// Return true if `rest` begins with optional whitespace, the given tag
/// name, optional whitespace, an optional sign and the closing delimiter.
fn is_tag(rest: &str, name: &str, closer: &str) -> bool {
    let Some(after) = rest.trim_start().strip_prefix(name) else {
        return false;
    };
    let after = after.trim_start();
    let after = after
        .strip_prefix('-')
        .or_else(|| after.strip_prefix('+'))
        .unwrap_or(after);

    after.starts_with(closer)
}

/// Return true if the text is only spaces and tabs.
#[inline]
fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c == ' ' || c == '\t')
}

/// Return true if the given character is a recognized beginning identifier,
/// meaning '_' or an `xid_start`.
#[inline]
fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

#[cfg(test)]
mod tests {
    use super::{token::Token, tokenize, Lexer};
    use crate::{
        compile::{Operator, Options},
        log::ErrorKind,
        syntax::Builder,
    };
    use std::ops::Range;

    #[test]
    fn test_lex_data_only() {
        helper_lex("lorem ipsum", vec![(Token::Data, 0..11)]);
    }

    #[test]
    fn test_lex_variable() {
        helper_lex(
            "hi {{ name }}!",
            vec![
                (Token::Data, 0..3),
                (Token::VariableBegin, 3..5),
                (Token::Whitespace, 5..6),
                (Token::Name, 6..10),
                (Token::Whitespace, 10..11),
                (Token::VariableEnd, 11..13),
                (Token::Data, 13..14),
            ],
        );
    }

    #[test]
    fn test_lex_operators() {
        helper_lex(
            "{{a//b**c!=d}}",
            vec![
                (Token::VariableBegin, 0..2),
                (Token::Name, 2..3),
                (Token::Operator(Operator::FloorDivide), 3..5),
                (Token::Name, 5..6),
                (Token::Operator(Operator::Power), 6..8),
                (Token::Name, 8..9),
                (Token::Operator(Operator::NotEqual), 9..11),
                (Token::Name, 11..12),
                (Token::VariableEnd, 12..14),
            ],
        );
    }

    #[test]
    fn test_lex_numbers() {
        helper_lex(
            "{{0x1F 1_000 1.5e3 2e}}",
            vec![
                (Token::VariableBegin, 0..2),
                (Token::Integer, 2..6),
                (Token::Whitespace, 6..7),
                (Token::Integer, 7..12),
                (Token::Whitespace, 12..13),
                (Token::Float, 13..18),
                (Token::Whitespace, 18..19),
                (Token::Integer, 19..20),
                (Token::Name, 20..21),
                (Token::VariableEnd, 21..23),
            ],
        );
    }

    #[test]
    fn test_lex_subscript_chain_is_not_float() {
        helper_lex(
            "{{a.0.1}}",
            vec![
                (Token::VariableBegin, 0..2),
                (Token::Name, 2..3),
                (Token::Operator(Operator::Period), 3..4),
                (Token::Integer, 4..5),
                (Token::Operator(Operator::Period), 5..6),
                (Token::Integer, 6..7),
                (Token::VariableEnd, 7..9),
            ],
        );
    }

    #[test]
    fn test_lex_string_escape() {
        helper_lex(
            r#"{{ 'it\'s' }}"#,
            vec![
                (Token::VariableBegin, 0..2),
                (Token::Whitespace, 2..3),
                (Token::String, 3..10),
                (Token::Whitespace, 10..11),
                (Token::VariableEnd, 11..13),
            ],
        );
    }

    #[test]
    fn test_lex_closer_inside_brackets() {
        helper_lex(
            "{{ {'a': 1}}}",
            vec![
                (Token::VariableBegin, 0..2),
                (Token::Whitespace, 2..3),
                (Token::Operator(Operator::LeftBrace), 3..4),
                (Token::String, 4..7),
                (Token::Operator(Operator::Colon), 7..8),
                (Token::Whitespace, 8..9),
                (Token::Integer, 9..10),
                (Token::Operator(Operator::RightBrace), 10..11),
                (Token::VariableEnd, 11..13),
            ],
        );
    }

    #[test]
    fn test_lex_trim_signs() {
        helper_lex(
            "a  {{- x -}}  b",
            vec![
                (Token::Data, 0..1),
                (Token::VariableBegin, 3..6),
                (Token::Whitespace, 6..7),
                (Token::Name, 7..8),
                (Token::Whitespace, 8..9),
                (Token::VariableEnd, 9..12),
                (Token::Data, 14..15),
            ],
        );
    }

    #[test]
    fn test_lex_comment() {
        helper_lex(
            "a{# note #}b",
            vec![
                (Token::Data, 0..1),
                (Token::CommentBegin, 1..3),
                (Token::Comment, 3..9),
                (Token::CommentEnd, 9..11),
                (Token::Data, 11..12),
            ],
        );
    }

    #[test]
    fn test_lex_raw() {
        helper_lex(
            "{% raw %}{{ x }}{% endraw %}",
            vec![
                (Token::BlockBegin, 0..2),
                (Token::Whitespace, 2..3),
                (Token::Name, 3..6),
                (Token::Whitespace, 6..7),
                (Token::BlockEnd, 7..9),
                (Token::Data, 9..16),
                (Token::BlockBegin, 16..18),
                (Token::Whitespace, 18..19),
                (Token::Name, 19..25),
                (Token::Whitespace, 25..26),
                (Token::BlockEnd, 26..28),
            ],
        );
    }

    #[test]
    fn test_lex_trim_blocks() {
        let options = Options {
            trim_blocks: true,
            lstrip_blocks: true,
            ..Default::default()
        };
        let source = "  {% if x %}\nyes\n  {% endif %}\n";
        let data: Vec<&str> = tokenize(source, &options)
            .unwrap()
            .into_iter()
            .filter(|(token, _)| *token == Token::Data)
            .map(|(_, region)| region.literal(source))
            .collect();

        assert_eq!(data, vec!["yes\n"]);
    }

    #[test]
    fn test_lex_plus_disables_lstrip() {
        let options = Options {
            lstrip_blocks: true,
            ..Default::default()
        };
        let source = "  {%+ if x %}";
        let tokens = tokenize(source, &options).unwrap();

        assert_eq!(tokens[0].0, Token::Data);
        assert_eq!(tokens[0].1.literal(source), "  ");
    }

    #[test]
    fn test_lex_keep_trailing_newline() {
        let source = "a\n";
        let stripped = tokenize(source, &Options::default()).unwrap();
        let kept = tokenize(
            source,
            &Options {
                keep_trailing_newline: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(stripped[0].1.literal(source), "a");
        assert_eq!(kept[0].1.literal(source), "a\n");
    }

    #[test]
    fn test_lex_line_statement() {
        let options = Options {
            syntax: Builder::new()
                .with_line_statement("#")
                .with_line_comment("##")
                .to_syntax(),
            keep_trailing_newline: true,
            ..Default::default()
        };
        let source = "## note\n  # for x in y\nz\n";
        let tokens: Vec<(Token, Range<usize>)> = tokenize(source, &options)
            .unwrap()
            .into_iter()
            .map(|(token, region)| (token, region.into()))
            .collect();

        assert_eq!(
            tokens,
            vec![
                (Token::LineComment, 0..7),
                (Token::Data, 7..8),
                (Token::LineStatementBegin, 8..11),
                (Token::Whitespace, 11..12),
                (Token::Name, 12..15),
                (Token::Whitespace, 15..16),
                (Token::Name, 16..17),
                (Token::Whitespace, 17..18),
                (Token::Name, 18..20),
                (Token::Whitespace, 20..21),
                (Token::Name, 21..22),
                (Token::LineStatementEnd, 22..23),
                (Token::Data, 23..25),
            ]
        );
    }

    #[test]
    fn test_lex_line_statement_spans_brackets() {
        let options = Options {
            syntax: Builder::new().with_line_statement("%").to_syntax(),
            ..Default::default()
        };
        let source = "% set x = [1,\n2]\n";
        let tokens = tokenize(source, &options).unwrap();
        let ends = tokens
            .iter()
            .filter(|(token, _)| *token == Token::LineStatementEnd)
            .count();

        assert_eq!(ends, 1);
        assert_eq!(tokens.last().map(|(t, _)| *t), Some(Token::LineStatementEnd));
    }

    #[test]
    fn test_lex_round_trip() {
        let options = Options {
            keep_trailing_newline: true,
            ..Default::default()
        };
        let source = "<p>{{ user.name|upper }}</p>\n{% for x in [1, 2] %}{# c #}{{ x }}{% endfor %}\n";
        let text: String = tokenize(source, &options)
            .unwrap()
            .into_iter()
            .map(|(_, region)| region.literal(source))
            .collect();

        assert_eq!(text, source);
    }

    #[test]
    fn test_lex_expression_mode() {
        let options = Options::default();
        let mut lexer = Lexer::expression("1 + x", &options);
        let mut tokens = Vec::new();
        while let Some((token, _)) = lexer.next().unwrap() {
            tokens.push(token);
        }

        assert_eq!(
            tokens,
            vec![
                Token::Integer,
                Token::Whitespace,
                Token::Operator(Operator::Add),
                Token::Whitespace,
                Token::Name,
            ]
        );
    }

    #[test]
    fn test_error_unclosed_variable() {
        let error = tokenize("hello {{ name", &Options::default()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Lex);
        assert!(error.reason().contains("missing `}}`"));
    }

    #[test]
    fn test_error_number_separator() {
        for text in ["{{ 1_ }}", "{{ 1__0 }}", "{{ 1_.5 }}", "{{ 0x_ }}"] {
            let error = tokenize(text, &Options::default()).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Lex, "{text}");
        }
        for text in ["{{ 1_000 }}", "{{ 0x_ff }}", "{{ 1_0.2_5 }}"] {
            assert!(tokenize(text, &Options::default()).is_ok(), "{text}");
        }
    }

    #[test]
    fn test_error_unbalanced_bracket() {
        assert!(tokenize("{{ (a] }}", &Options::default()).is_err());
        assert!(tokenize("{{ a) }}", &Options::default()).is_err());
    }

    #[test]
    fn test_error_unterminated_string() {
        assert!(tokenize("{{ 'abc }}", &Options::default()).is_err());
    }

    #[test]
    fn test_error_invalid_identifier() {
        let error = tokenize("{{ \u{0301}a }}", &Options::default()).unwrap_err();

        assert_eq!(error.reason(), "invalid identifier");
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("a\n  {{ b }}", &Options::default()).unwrap();
        let name = tokens
            .iter()
            .find(|(token, _)| *token == Token::Name)
            .map(|(_, region)| region.position);

        assert_eq!(name.map(|p| (p.line, p.column)), Some((2, 6)));
    }

    /// Lex the source with default options and compare every token.
    fn helper_lex(source: &str, expect: Vec<(Token, Range<usize>)>) {
        let options = Options {
            keep_trailing_newline: true,
            ..Default::default()
        };
        let mut lexer = Lexer::new(source, &options);
        for (token, range) in expect {
            let (next, region) = lexer.next().unwrap().unwrap();
            assert_eq!((next, region.begin..region.end), (token, range));
        }

        assert_eq!(lexer.next().unwrap(), None);
        assert_eq!(lexer.next().unwrap(), None);
    }
}
