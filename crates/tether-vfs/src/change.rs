use std::sync::Arc;

use tether_core::{FileId, LineIndex, TextEdit};

use crate::file_id::DocPath;

/// A change event emitted by the [`crate::DocumentStore`].
///
/// Events are delivered synchronously on the mutating thread, after the store
/// state has been updated, in submission order.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A document was opened (or re-opened after a close).
    Opened { file: FileId, path: DocPath },
    /// An open document changed via incremental edits.
    Edited {
        file: FileId,
        version: i32,
        /// Line table of the text the first edit was applied to. Position
        /// tracking uses this to capture a snapshot of the state being left
        /// behind when a document is first dirtied.
        pre_edit_index: Arc<LineIndex>,
        /// Normalized edits, sequential coordinates.
        edits: Vec<TextEdit>,
    },
    /// The buffer was written back; buffer and disk agree again.
    Saved { file: FileId },
    /// The buffer was replaced wholesale from disk.
    Reloaded { file: FileId, version: i32 },
    /// The document moved to a new path; the id is unchanged.
    Renamed {
        file: FileId,
        from: DocPath,
        to: DocPath,
    },
    /// The document is no longer viewable.
    Closed { file: FileId },
}

impl ChangeEvent {
    pub fn file(&self) -> FileId {
        match self {
            ChangeEvent::Opened { file, .. }
            | ChangeEvent::Edited { file, .. }
            | ChangeEvent::Saved { file }
            | ChangeEvent::Reloaded { file, .. }
            | ChangeEvent::Renamed { file, .. }
            | ChangeEvent::Closed { file } => *file,
        }
    }
}
