//! Document text model.
//!
//! Positions are `(line, character)` pairs where `character` counts UTF-16
//! code units from the start of the line, the editor's default encoding. Changes follow the incremental sync model of
//! the editor: an optional range plus replacement text, applied in order.

use std::fmt;

use thiserror::Error;

/// A zero-based `(line, character)` coordinate in a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Zero-based line.
    pub line: u32,
    /// Zero-based UTF-16 offset within the line.
    pub character: u32,
}

impl Position {
    /// Creates a new position.
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// A half-open `[start, end)` span of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Range {
    /// Inclusive start.
    pub start: Position,
    /// Exclusive end.
    pub end: Position,
}

impl Range {
    /// Creates a new range.
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Returns true if the range covers no text.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One content change within a change-set batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    /// Replaced range. `None` replaces the whole document.
    pub range: Option<Range>,
    /// Inserted text (empty for a pure deletion).
    pub text: String,
}

impl TextChange {
    /// A change that inserts `text` at `at`.
    pub fn insert(at: Position, text: impl Into<String>) -> Self {
        Self {
            range: Some(Range::new(at, at)),
            text: text.into(),
        }
    }

    /// A change that deletes `range`.
    pub fn delete(range: Range) -> Self {
        Self {
            range: Some(range),
            text: String::new(),
        }
    }

    /// A change that replaces `range` with `text`.
    pub fn replace(range: Range, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }

    /// A full-document replacement.
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }
}

/// Errors raised when a position doesn't exist in the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    /// Position past the end of the document.
    #[error("position {0} is outside the document")]
    PositionOutOfRange(Position),
    /// Range whose end precedes its start.
    #[error("range {0} is inverted")]
    InvertedRange(Range),
}

/// What an applied change removed and where its inserted text ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Range that was replaced, in pre-change coordinates. `None` for full sync.
    pub range: Option<Range>,
    /// Text that was removed.
    pub removed: String,
    /// Position right after the inserted text, in post-change coordinates.
    pub end: Position,
}

/// Owned document content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentText {
    content: String,
}

impl DocumentText {
    /// Wraps `content`.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Returns the full content.
    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// Converts a position to a byte offset.
    ///
    /// A character past the end of a line clamps to the line end; one inside
    /// a surrogate pair clamps to the start of that character.
    pub fn offset_at(&self, position: Position) -> Result<usize, TextError> {
        let mut line_start = 0usize;
        for (line, text) in (0u32..).zip(self.content.split('\n')) {
            if line == position.line {
                let text = text.strip_suffix('\r').unwrap_or(text);
                return Ok(line_start + line_offset(text, position.character));
            }
            line_start += text.len() + 1;
        }
        Err(TextError::PositionOutOfRange(position))
    }

    /// Converts a byte offset to a position.
    pub fn position_at(&self, offset: usize) -> Position {
        let mut line = 0u32;
        let mut col = 0u32;
        for (i, c) in self.content.char_indices() {
            if i >= offset {
                break;
            }
            if c == '\n' {
                line += 1;
                col = 0;
            } else {
                col = col.saturating_add(utf16_width(c));
            }
        }
        Position::new(line, col)
    }

    /// Returns the text covered by `range`.
    pub fn slice(&self, range: Range) -> Result<&str, TextError> {
        let (start, end) = self.offsets(range)?;
        Ok(&self.content[start..end])
    }

    /// Returns line `line` without its terminator.
    pub fn line(&self, line: u32) -> Option<&str> {
        self.content
            .split('\n')
            .nth(line as usize)
            .map(|text| text.strip_suffix('\r').unwrap_or(text))
    }

    /// Returns the range of line `line`, including its terminator when it has one.
    pub fn line_range(&self, line: u32) -> Option<Range> {
        let text = self.content.split('\n').nth(line as usize)?;
        let start = Position::new(line, 0);
        let has_next = self.content.split('\n').nth(line as usize + 1).is_some();
        let end = if has_next {
            Position::new(line + 1, 0)
        } else {
            let text = text.strip_suffix('\r').unwrap_or(text);
            Position::new(line, utf16_len(text))
        };
        Some(Range::new(start, end))
    }

    /// Applies a single change in place.
    pub fn apply(&mut self, change: &TextChange) -> Result<Applied, TextError> {
        let Some(range) = change.range else {
            let removed = std::mem::replace(&mut self.content, change.text.clone());
            let end = self.position_at(self.content.len());
            return Ok(Applied {
                range: None,
                removed,
                end,
            });
        };

        let (start, end) = self.offsets(range)?;
        let removed = self.content[start..end].to_string();
        let mut next = String::with_capacity(
            self.content.len().saturating_sub(end - start) + change.text.len(),
        );
        next.push_str(&self.content[..start]);
        next.push_str(&change.text);
        next.push_str(&self.content[end..]);
        self.content = next;

        Ok(Applied {
            range: Some(range),
            removed,
            end: advance(range.start, &change.text),
        })
    }

    fn offsets(&self, range: Range) -> Result<(usize, usize), TextError> {
        let start = self.offset_at(range.start)?;
        let end = self.offset_at(range.end)?;
        if start > end {
            return Err(TextError::InvertedRange(range));
        }
        Ok((start, end))
    }
}

/// Position reached by writing `text` starting at `start`.
pub fn advance(start: Position, text: &str) -> Position {
    let mut position = start;
    for c in text.chars() {
        if c == '\n' {
            position.line += 1;
            position.character = 0;
        } else {
            position.character = position.character.saturating_add(utf16_width(c));
        }
    }
    position
}

/// Length of `text` in UTF-16 code units.
pub fn utf16_len(text: &str) -> u32 {
    text.chars()
        .fold(0u32, |len, c| len.saturating_add(utf16_width(c)))
}

/// Byte offset of UTF-16 column `character` within a single line.
///
/// Columns past the end clamp to the line length.
pub fn line_offset(line: &str, character: u32) -> usize {
    let mut column = 0u32;
    for (index, c) in line.char_indices() {
        let width = utf16_width(c);
        if column.saturating_add(width) > character {
            return index;
        }
        column = column.saturating_add(width);
    }
    line.len()
}

/// Width of `c` in UTF-16 code units.
pub fn utf16_width(c: char) -> u32 {
    if c.len_utf16() == 2 {
        2
    } else {
        1
    }
}
