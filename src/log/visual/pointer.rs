use std::{
    cmp::max,
    fmt::{Formatter, Result},
};

use super::{
    super::{RESET, YELLOW},
    {get_width, Visual, BLANK, EQUAL, HIGHLIGHT, PIPE},
};
use crate::region::Region;

/// A type of `Visual` that points to a specific location within source text.
#[derive(Debug, PartialEq)]
pub struct Pointer {
    /// The line that the Pointer is pointing to, one indexed.
    line: usize,
    /// Display column that the Pointer is pointing to, zero indexed.
    column: usize,
    /// The display width of the object being highlighted.
    length: usize,
    /// The actual line of text that is being pointed to.
    text: String,
}

impl Pointer {
    /// Create a new Visual over the given source text and Region.
    pub fn new(source: &str, region: Region) -> Self {
        let line = region.position.line.max(1);
        let text = source
            .split_terminator('\n')
            .nth(line - 1)
            .or_else(|| source.split_terminator('\n').last())
            .unwrap_or_default()
            .trim_end_matches('\r')
            .to_string();

        // Width of everything before the region on its line, so wide
        // characters shift the underline correctly.
        let prefix: String = text
            .chars()
            .take(region.position.column.saturating_sub(1))
            .collect();
        let column = get_width(&prefix);

        // Only underline up to the end of the first line of the region.
        let highlighted = region.literal(source).split('\n').next().unwrap_or("");
        let length = max(1, get_width(highlighted));

        Self {
            line,
            column,
            length,
            text,
        }
    }
}

impl Visual for Pointer {
    fn display(
        &self,
        formatter: &mut Formatter<'_>,
        template: Option<&str>,
        help: Option<&str>,
    ) -> Result {
        let num = self.line.to_string();
        let col = self.column + 1;
        let pad = get_width(&num);
        let align = self.column + self.length;

        let name = template.unwrap_or("?");
        let text = &self.text;
        let underline = HIGHLIGHT.repeat(self.length);

        write!(
            formatter,
            "\n {BLANK:pad$}--> {name}:{num}:{col}\
             \n {BLANK:pad$} {PIPE}\
             \n {num:>} {PIPE} {text}\
             \n {BLANK:pad$} {PIPE} {YELLOW}{underline:>align$}{RESET}\
             \n {BLANK:pad$} {PIPE}\n",
        )?;

        if let Some(help) = help {
            writeln!(formatter, "{BLANK:pad$} {EQUAL} help: {help}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Pointer;
    use crate::region::{Position, Region};

    #[test]
    fn test_pointer_second_line() {
        let source = "hello\n{{ name ) }}\nbye";
        let pointer = Pointer::new(source, Region::new(14..15, Position::new(2, 9)));

        assert_eq!(pointer.line, 2);
        assert_eq!(pointer.column, 8);
        assert_eq!(pointer.length, 1);
        assert_eq!(pointer.text, "{{ name ) }}");
    }

    #[test]
    fn test_pointer_empty_region() {
        let source = "{{ name";
        let pointer = Pointer::new(source, Region::new(7..7, Position::new(1, 8)));

        assert_eq!(pointer.length, 1);
        assert_eq!(pointer.column, 7);
    }
}
