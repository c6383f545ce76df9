mod pointer;

pub use pointer::Pointer;

use std::fmt::{Debug, Formatter, Result};

const BLANK: &str = "";
const PIPE: &str = "|";
const EQUAL: &str = "=";
const HIGHLIGHT: &str = "^";

/// Describes a type that can be associated with an Error and used
/// to print a visualization.
pub trait Visual: Debug {
    /// Display the visualization by writing to the given Formatter.
    fn display(
        &self,
        formatter: &mut Formatter<'_>,
        template: Option<&str>,
        help: Option<&str>,
    ) -> Result;
}

/// Wrapper for UnicodeWidthStr::width.
fn get_width(s: &str) -> usize {
    unicode_width::UnicodeWidthStr::width(s)
}
