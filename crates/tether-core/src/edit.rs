//! Text edit primitives.

use crate::{TextRange, TextSize};

/// A textual edit described by a range replacement.
///
/// `range` is expressed in the coordinates of the text *before* the edit;
/// a batch of edits is applied (and must be interpreted) sequentially.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TextEdit {
    pub range: TextRange,
    pub replacement: String,
}

impl TextEdit {
    pub fn new(range: TextRange, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }

    pub fn insert(offset: TextSize, text: impl Into<String>) -> Self {
        Self::new(TextRange::new(offset, offset), text)
    }

    /// Length of the replacement text.
    #[inline]
    pub fn new_len(&self) -> TextSize {
        TextSize::from(self.replacement.len() as u32)
    }
}
