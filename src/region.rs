use std::{
    cmp::Ordering,
    fmt::Display,
    ops::{Index, Range},
};

/// A line and column within source text.
///
/// Both values are one indexed, so the first character in a template
/// is at `1:1`.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Create a new [`Position`].
    #[inline]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Represents an area within source text.
///
/// The [`Position`] of the first character is carried along with the byte
/// range, so tokens and nodes can report a line and column without going
/// back to the source.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, Default)]
pub struct Region {
    /// The beginning of the range, inclusive.
    pub begin: usize,
    /// The ending of the range, exclusive.
    pub end: usize,
    /// Line and column of `begin`.
    pub position: Position,
}

impl Region {
    /// Create a new Region from the given range and position.
    #[inline]
    pub fn new(range: Range<usize>, position: Position) -> Self {
        Self {
            begin: range.start,
            end: range.end,
            position,
        }
    }

    /// Combine will merge the indices of two [`Region`] instances.
    ///
    /// The position of whichever `Region` begins first is kept.
    pub fn combine(self, other: Self) -> Self {
        let position = match self.begin.cmp(&other.begin) {
            Ordering::Greater => other.position,
            _ => self.position,
        };

        Self {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
            position,
        }
    }

    /// Return the number of bytes covered by the [`Region`].
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    /// Return true if the [`Region`] covers no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Access the literal value of a [`Region`].
    ///
    /// Returns an empty string if the `Region` is out of bounds or does not
    /// fall on character boundaries.
    pub fn literal<'source>(&self, source: &'source str) -> &'source str {
        source.get(self.begin..self.end).unwrap_or_default()
    }
}

impl Index<Region> for str {
    type Output = str;

    fn index(&self, region: Region) -> &Self::Output {
        let Region { begin, end, .. } = region;

        &self[begin..end]
    }
}

impl From<Region> for Range<usize> {
    fn from(value: Region) -> Self {
        value.begin..value.end
    }
}

/// Maps byte offsets within source text to a [`Position`].
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the first character of every line.
    starts: Vec<usize>,
}

impl LineIndex {
    /// Build a [`LineIndex`] over the given source.
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );

        Self { starts }
    }

    /// Return the [`Position`] of the given byte offset.
    ///
    /// Columns are counted in characters, not bytes.
    pub fn position(&self, source: &str, offset: usize) -> Position {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line - 1,
        };
        let start = self.starts[line];
        let column = source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);

        Position::new(line + 1, column + 1)
    }

    /// Build a [`Region`] over the given range.
    #[inline]
    pub fn region(&self, source: &str, range: Range<usize>) -> Region {
        let position = self.position(source, range.start);

        Region::new(range, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine() {
        let combined = Region::new(5..10, Position::new(1, 6))
            .combine(Region::new(8..15, Position::new(1, 9)));

        assert_eq!(combined.begin, 5);
        assert_eq!(combined.end, 15);
        assert_eq!(combined.position, Position::new(1, 6));
    }

    #[test]
    fn test_literal() {
        let source = "Hello, Taylor!";
        let region = Region::new(7..13, Position::new(1, 8));

        assert_eq!(region.literal(source), "Taylor");
    }

    #[test]
    fn test_out_of_bounds_literal() {
        let source = "Hello, Taylor!";
        let region = Region::new(7..15, Position::new(1, 8));

        assert_eq!(region.literal(source), "");
    }

    #[test]
    fn test_line_index() {
        let source = "one\ntwo\nthrée four";
        let index = LineIndex::new(source);

        assert_eq!(index.position(source, 0), Position::new(1, 1));
        assert_eq!(index.position(source, 4), Position::new(2, 1));
        assert_eq!(index.position(source, 6), Position::new(2, 3));
        // "thrée " is six characters but seven bytes.
        assert_eq!(index.position(source, 15), Position::new(3, 7));
    }
}
