//! Source file spans and locations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// A unique identifier for a source file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    /// Creates a file id from its raw index
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// A byte offset span in a source file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start offset
    pub start: u32,
    /// Exclusive end offset
    pub end: u32,
}

impl Span {
    /// Creates a span from start and end offsets
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Creates an empty span at `offset`
    #[must_use]
    pub const fn point(offset: u32) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Creates a span from a byte range, saturating offsets that do not fit in `u32`
    #[must_use]
    pub fn from_range(range: Range<usize>) -> Self {
        let start = u32::try_from(range.start).unwrap_or(u32::MAX);
        let end = u32::try_from(range.end).unwrap_or(u32::MAX);
        Self { start, end }
    }

    /// Byte range covered by this span
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }

    /// Length in bytes
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `offset` lies inside the span (end exclusive)
    #[must_use]
    pub const fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Smallest span covering both `self` and `other`
    #[must_use]
    pub fn cover(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}..{}", self.start, self.end)
    }
}

/// A span with associated file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileSpan {
    /// File the span belongs to
    pub file: FileId,
    /// Byte span within the file
    pub span: Span,
}

impl FileSpan {
    /// Creates a file span
    #[must_use]
    pub const fn new(file: FileId, span: Span) -> Self {
        Self { file, span }
    }

    /// Byte range covered by this span
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.span.range()
    }

    /// Whether `offset` lies inside the span
    #[must_use]
    pub const fn contains(&self, offset: u32) -> bool {
        self.span.contains(offset)
    }
}

impl fmt::Display for FileSpan {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "file{}:{}", self.file.0, self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover_and_contains() {
        let left = Span::new(4, 8);
        let right = Span::new(10, 12);
        let covered = left.cover(right);

        assert_eq!(covered, Span::new(4, 12));
        assert!(covered.contains(11));
        assert!(!covered.contains(12));
        assert_eq!(covered.len(), 8);
    }

    #[test]
    fn test_point_is_empty() {
        let point = Span::point(7);
        assert!(point.is_empty());
        assert!(!point.contains(7));
        assert_eq!(point.to_string(), "7..7");
    }
}
