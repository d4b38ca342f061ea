//! Source span and position tracking for diagnostics and editor queries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Unique identifier for a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    pub const INVALID: FileId = FileId(u32::MAX);

    pub fn new(id: u32) -> Self {
        FileId(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file:{}", self.0)
    }
}

/// Byte offset in a source file (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteOffset(pub u32);

impl ByteOffset {
    pub fn new(offset: u32) -> Self {
        ByteOffset(offset)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// A contiguous region of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file: FileId,
    pub start: ByteOffset,
    pub end: ByteOffset,
}

impl Span {
    pub fn new(file: FileId, start: ByteOffset, end: ByteOffset) -> Self {
        Span { file, start, end }
    }

    /// A span that points nowhere, for synthesized trees
    pub fn synthetic() -> Self {
        Span::new(FileId::INVALID, ByteOffset(0), ByteOffset(0))
    }

    pub fn contains(&self, offset: ByteOffset) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> u32 {
        self.end.0.saturating_sub(self.start.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trait for tree nodes that carry a span
pub trait HasSpan {
    fn span(&self) -> Span;
}

/// Line/column position (0-based internally, 1-based for display)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// An in-memory source file with offset/position conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: FileId,
    /// Path normalized to forward-slash form so rendered positions match
    /// on every platform
    pub path: String,
    pub content: String,
    /// Byte offset of the start of each line
    line_starts: Vec<u32>,
}

impl SourceFile {
    pub fn new(id: FileId, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        let content = content.into();
        let path = normalize_path(path.as_ref());
        let mut line_starts = vec![0u32];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        SourceFile { id, path, content, line_starts }
    }

    /// Convert a byte offset into a line/column position
    pub fn position(&self, offset: ByteOffset) -> Position {
        let off = offset.as_u32().min(self.content.len() as u32);
        let line = match self.line_starts.binary_search(&off) {
            Ok(l) => l,
            Err(l) => l - 1,
        };
        Position::new(line as u32, off - self.line_starts[line])
    }

    /// Convert a line/column position back into a byte offset
    pub fn offset(&self, pos: Position) -> Option<ByteOffset> {
        let start = *self.line_starts.get(pos.line as usize)?;
        Some(ByteOffset(start + pos.column))
    }

    /// The text of the (0-based) line, without the trailing newline
    pub fn line_text(&self, line: u32) -> Option<&str> {
        let start = *self.line_starts.get(line as usize)? as usize;
        let end = self
            .line_starts
            .get(line as usize + 1)
            .map(|&o| o as usize - 1)
            .unwrap_or(self.content.len());
        self.content.get(start..end)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_contains() {
        let span = Span::new(FileId::new(0), ByteOffset(2), ByteOffset(5));
        assert!(span.contains(ByteOffset(2)));
        assert!(span.contains(ByteOffset(4)));
        assert!(!span.contains(ByteOffset(5)));
        assert!(!span.contains(ByteOffset(1)));
    }

    #[test]
    fn test_position_conversion() {
        let file = SourceFile::new(FileId::new(0), "demo.mica", "let x = 1\nlet y = 2\n");
        assert_eq!(file.position(ByteOffset(0)), Position::new(0, 0));
        assert_eq!(file.position(ByteOffset(4)), Position::new(0, 4));
        assert_eq!(file.position(ByteOffset(10)), Position::new(1, 0));
        assert_eq!(file.position(ByteOffset(14)), Position::new(1, 4));
        assert_eq!(file.offset(Position::new(1, 4)), Some(ByteOffset(14)));
    }

    #[test]
    fn test_line_text() {
        let file = SourceFile::new(FileId::new(0), "demo.mica", "first\nsecond");
        assert_eq!(file.line_text(0), Some("first"));
        assert_eq!(file.line_text(1), Some("second"));
        assert_eq!(file.line_text(2), None);
    }

    #[test]
    fn test_path_normalization() {
        let file = SourceFile::new(FileId::new(0), "dir\\sub\\demo.mica", "");
        assert_eq!(file.path, "dir/sub/demo.mica");
    }
}
