//! Source files attached to compiled programs

use serde::{Deserialize, Serialize};

/// 1-based line and column of a byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line number, starting at 1
    pub line: u32,
    /// Column in bytes, starting at 1
    pub column: u32,
}

/// Original text of a compiled script
///
/// `line_offsets` holds the byte offset of every scanned line start, the
/// first entry being 0. The scanner may stop early (`last_scanned_offset`);
/// both fields are persisted so incremental compilation can resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    name: String,
    text: String,
    last_scanned_offset: u32,
    line_offsets: Vec<u32>,
}

impl SourceFile {
    /// Create a source file, scanning the whole text for line starts
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_offsets = vec![0];
        line_offsets.extend(
            text.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| (i + 1) as u32),
        );

        Self {
            name: name.into(),
            last_scanned_offset: text.len() as u32,
            text,
            line_offsets,
        }
    }

    /// Restore a source file from persisted fields, verbatim
    pub fn from_parts(
        name: impl Into<String>,
        text: impl Into<String>,
        last_scanned_offset: u32,
        line_offsets: Vec<u32>,
    ) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            last_scanned_offset,
            line_offsets,
        }
    }

    /// Logical path or identifier
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw source text
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Offset the scanner reached
    #[inline]
    pub fn last_scanned_offset(&self) -> u32 {
        self.last_scanned_offset
    }

    /// Byte offsets of line starts
    #[inline]
    pub fn line_offsets(&self) -> &[u32] {
        &self.line_offsets
    }

    /// Line and column of a byte offset
    pub fn position(&self, offset: u32) -> Position {
        let line = match self.line_offsets.binary_search(&offset) {
            Ok(idx) => idx,
            Err(0) => {
                return Position {
                    line: 1,
                    column: offset.saturating_add(1),
                };
            }
            Err(idx) => idx - 1,
        };
        Position {
            line: (line as u32).saturating_add(1),
            column: (offset - self.line_offsets[line]).saturating_add(1),
        }
    }

    /// Byte offset of a 1-based line and column, if the line is known and
    /// the offset fits in a `u32`
    pub fn offset_of(&self, position: Position) -> Option<u32> {
        let line = position.line.checked_sub(1)?;
        let start = *self.line_offsets.get(line as usize)?;
        start.checked_add(position.column.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_line_offsets() {
        let src = SourceFile::new("a.js", "let a = 1;\nlet b = 2;\n\nb");
        assert_eq!(src.line_offsets(), &[0, 11, 22, 23]);
        assert_eq!(src.last_scanned_offset(), 24);

        let single = SourceFile::new("test.js", "1+1");
        assert_eq!(single.line_offsets(), &[0]);
    }

    #[test]
    fn test_position() {
        let src = SourceFile::new("a.js", "let a = 1;\nlet b = 2;\n\nb");
        assert_eq!(src.position(0), Position { line: 1, column: 1 });
        assert_eq!(src.position(4), Position { line: 1, column: 5 });
        assert_eq!(src.position(11), Position { line: 2, column: 1 });
        assert_eq!(src.position(15), Position { line: 2, column: 5 });
        assert_eq!(src.position(23), Position { line: 4, column: 1 });
    }

    #[test]
    fn test_offset_of() {
        let src = SourceFile::new("a.js", "let a = 1;\nlet b = 2;\n");
        assert_eq!(src.offset_of(Position { line: 2, column: 5 }), Some(15));
        assert_eq!(src.offset_of(Position { line: 9, column: 1 }), None);
        assert_eq!(src.offset_of(Position { line: 0, column: 1 }), None);
        assert_eq!(
            src.offset_of(Position {
                line: 2,
                column: u32::MAX
            }),
            None
        );
    }

    #[test]
    fn test_position_at_max_offset() {
        let src = SourceFile::new("a.js", "a\nb");
        assert_eq!(
            src.position(u32::MAX),
            Position {
                line: 2,
                column: u32::MAX - 1
            }
        );

        let raw = SourceFile::from_parts("raw.js", "", 0, Vec::new());
        assert_eq!(
            raw.position(u32::MAX),
            Position {
                line: 1,
                column: u32::MAX
            }
        );
    }

    #[test]
    fn test_position_without_line_table() {
        let src = SourceFile::from_parts("raw.js", "abc", 0, Vec::new());
        assert_eq!(src.position(2), Position { line: 1, column: 3 });
    }
}
