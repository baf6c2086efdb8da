use std::fmt;
use std::sync::Arc;

use tether_core::{Line, LineIndex, Position, Range, TextEdit, TextRange, TextSize};

/// An LSP-style content change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    /// The range of text to replace. If `None`, the entire document is replaced.
    pub range: Option<Range>,
    /// Replacement text.
    pub text: String,
}

impl ContentChange {
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }

    pub fn replace(range: Range, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }

    /// Inserts `text` at the start of `line`.
    pub fn insert_at_line_start(line: Line, text: impl Into<String>) -> Self {
        let position = Position::new(line, 0);
        Self::replace(Range::new(position, position), text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    DocumentNotOpen,
    InvalidRange,
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::DocumentNotOpen => write!(f, "document not open"),
            DocumentError::InvalidRange => write!(f, "invalid range"),
        }
    }
}

impl std::error::Error for DocumentError {}

/// An in-memory document with versioning and incremental edits.
#[derive(Debug, Clone)]
pub struct Document {
    text: Arc<String>,
    version: i32,
    index: Arc<LineIndex>,
}

impl Document {
    pub fn new(text: Arc<String>, version: i32) -> Self {
        let index = Arc::new(LineIndex::new(&text));
        Self {
            text,
            version,
            index,
        }
    }

    pub fn new_string(text: impl Into<String>, version: i32) -> Self {
        Self::new(Arc::new(text.into()), version)
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    pub fn text_arc(&self) -> Arc<String> {
        Arc::clone(&self.text)
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Line start/end offsets for the current text.
    pub fn index(&self) -> &Arc<LineIndex> {
        &self.index
    }

    pub fn line_count(&self) -> u32 {
        self.index.line_count()
    }

    /// Text of `line` without its terminator, or `None` past the end.
    pub fn line_text(&self, line: Line) -> Option<&str> {
        let start = u32::from(self.index.line_start(line)?) as usize;
        let end = u32::from(self.index.line_end(line)?) as usize;
        Some(&self.text[start..end])
    }

    /// Applies a sequence of incremental LSP changes in order and returns the
    /// normalized edits, each expressed in the coordinates of the text it was
    /// applied to.
    pub fn apply_changes(
        &mut self,
        new_version: i32,
        changes: &[ContentChange],
    ) -> Result<Vec<TextEdit>, DocumentError> {
        let mut edits = Vec::with_capacity(changes.len());

        for change in changes {
            let edit = self.apply_change(change)?;
            edits.push(edit);
        }

        self.version = new_version;
        Ok(edits)
    }

    fn apply_change(&mut self, change: &ContentChange) -> Result<TextEdit, DocumentError> {
        let (start, end) = match &change.range {
            Some(range) => (
                self.position_to_offset(range.start),
                self.position_to_offset(range.end),
            ),
            None => (0, self.text.len()),
        };
        if start > end || end > self.text.len() {
            return Err(DocumentError::InvalidRange);
        }

        let text = Arc::make_mut(&mut self.text);
        text.replace_range(start..end, &change.text);
        self.index = Arc::new(LineIndex::new(text));

        let start = u32::try_from(start).map_err(|_| DocumentError::InvalidRange)?;
        let end = u32::try_from(end).map_err(|_| DocumentError::InvalidRange)?;
        Ok(TextEdit::new(
            TextRange::new(TextSize::from(start), TextSize::from(end)),
            change.text.clone(),
        ))
    }

    fn position_to_offset(&self, position: Position) -> usize {
        let Some(line_start) = self.index.line_start(position.line) else {
            return self.text.len();
        };
        let line_end = self
            .index
            .line_end(position.line)
            .unwrap_or(self.index.text_len());

        let line_start = u32::from(line_start) as usize;
        let line_end = u32::from(line_end) as usize;

        // Columns are UTF-16 code units over the line text, excluding the
        // terminator. Out-of-range and mid-surrogate columns are clamped.
        let line_slice = &self.text[line_start..line_end];
        let rel = utf16_column_to_byte_offset_clamped(line_slice, position.character);
        line_start + rel
    }
}

/// Converts a UTF-16 code unit column into a byte offset into `line`.
///
/// The conversion is *clamped*:
/// - columns past the end of the line map to the line end
/// - columns that split a multi-code-unit character map to the start of that character
fn utf16_column_to_byte_offset_clamped(line: &str, column_utf16: u32) -> usize {
    let mut col: u32 = 0;
    for (idx, ch) in line.char_indices() {
        let ch_len = ch.len_utf16() as u32;
        if col >= column_utf16 {
            return idx;
        }
        if col + ch_len > column_utf16 {
            return idx;
        }
        col = col.saturating_add(ch_len);
    }
    line.len()
}
