use crate::render::Value;
use std::fmt::{Arguments, Result, Write};

/// Wraps some underlying buffer by providing methods that write to it
/// in different formats.
pub struct Pipe<'buffer> {
    buffer: &'buffer mut (dyn Write + 'buffer),
    /// Number of bytes written through the Pipe.
    written: usize,
}

impl<'buffer> Pipe<'buffer> {
    /// Create a new Pipe that writes to the given buffer.
    pub fn new(buffer: &'buffer mut String) -> Self {
        Self { buffer, written: 0 }
    }

    /// Write the given Value to the Pipe buffer.
    ///
    /// Markup is written as it is, everything else is escaped when
    /// `autoescape` is set.
    ///
    /// # Errors
    ///
    /// The Pipe supports all Value types, so the only error that will
    /// be returned is propagated from the [write!] macro itself.
    pub fn write_value(&mut self, value: &Value, autoescape: bool) -> Result {
        match value {
            Value::Markup(markup) => self.write_str(markup),
            Value::String(string) if !autoescape => self.write_str(string),
            Value::String(string) => self.write_escaped(string),
            value if autoescape => self.write_escaped(&value.to_string()),
            value => write!(self, "{value}"),
        }
    }

    /// Write the text with HTML special characters replaced by entities.
    pub fn write_escaped(&mut self, text: &str) -> Result {
        let mut last = 0;
        for (index, byte) in text.bytes().enumerate() {
            let entity = match byte {
                b'&' => "&amp;",
                b'<' => "&lt;",
                b'>' => "&gt;",
                b'"' => "&#34;",
                b'\'' => "&#39;",
                _ => continue,
            };
            self.write_str(&text[last..index])?;
            self.write_str(entity)?;
            last = index + 1;
        }

        self.write_str(&text[last..])
    }

    /// Return the number of bytes written through the Pipe.
    #[inline]
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Write for Pipe<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> Result {
        self.written += s.len();
        Write::write_str(self.buffer, s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> Result {
        self.written += c.len_utf8();
        Write::write_char(self.buffer, c)
    }

    #[inline]
    fn write_fmt(&mut self, args: Arguments<'_>) -> Result {
        std::fmt::write(self, args)
    }
}

/// Return the text with HTML special characters replaced by entities.
pub fn escape(text: &str) -> String {
    let mut buffer = String::with_capacity(text.len());
    // Writing to a String does not fail.
    let _ = Pipe::new(&mut buffer).write_escaped(text);

    buffer
}

#[cfg(test)]
mod tests {
    use super::{escape, Pipe};
    use crate::render::Value;
    use serde_json::json;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&#34;x&#34;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_write_value() {
        let mut buffer = String::new();
        let mut pipe = Pipe::new(&mut buffer);
        pipe.write_value(&Value::from("<b>"), true).unwrap();
        pipe.write_value(&Value::markup("<i>"), true).unwrap();
        pipe.write_value(&Value::from(json!(["<"])), true).unwrap();
        pipe.write_value(&Value::Float(2.0), false).unwrap();
        let written = pipe.written();

        assert_eq!(buffer, "&lt;b&gt;<i>[&#39;&lt;&#39;]2.0");
        assert_eq!(written, buffer.len());
    }
}
