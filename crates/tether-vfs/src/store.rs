use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use tether_core::{FileId, Line, LineIndex, Subscribers, SubscriptionId};

use crate::change::ChangeEvent;
use crate::document::{ContentChange, Document, DocumentError};
use crate::file_id::{DocPath, FileIdRegistry};

/// Open-document table with stable ids and synchronous change events.
///
/// All mutation happens under one lock; events are emitted after the lock is
/// released so subscribers can read back through the store.
#[derive(Debug, Default)]
pub struct DocumentStore {
    inner: Mutex<StoreInner>,
    subscribers: Subscribers<ChangeEvent>,
}

#[derive(Debug, Default)]
struct StoreInner {
    ids: FileIdRegistry,
    docs: HashMap<FileId, Document>,
    dirty: HashSet<FileId>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id);
    }

    /// Returns the stable id for `path`, allocating one if needed.
    pub fn file_id(&self, path: DocPath) -> FileId {
        self.inner.lock().ids.file_id(path)
    }

    pub fn get_id(&self, path: &DocPath) -> Option<FileId> {
        self.inner.lock().ids.get_id(path)
    }

    pub fn path_for_id(&self, file: FileId) -> Option<DocPath> {
        self.inner.lock().ids.get_path(file).cloned()
    }

    /// Opens an in-memory document and returns its id. The buffer starts out
    /// clean (agreeing with disk).
    pub fn open_document(&self, path: DocPath, text: impl Into<String>, version: i32) -> FileId {
        let file = {
            let mut inner = self.inner.lock();
            let file = inner.ids.file_id(path.clone());
            inner.docs.insert(file, Document::new_string(text, version));
            inner.dirty.remove(&file);
            file
        };
        self.subscribers.emit(&ChangeEvent::Opened { file, path });
        file
    }

    pub fn close_document(&self, file: FileId) {
        let was_open = {
            let mut inner = self.inner.lock();
            inner.dirty.remove(&file);
            inner.docs.remove(&file).is_some()
        };
        if was_open {
            self.subscribers.emit(&ChangeEvent::Closed { file });
        }
    }

    pub fn is_open(&self, file: FileId) -> bool {
        self.inner.lock().docs.contains_key(&file)
    }

    pub fn open_files(&self) -> Vec<FileId> {
        let mut files: Vec<FileId> = self.inner.lock().docs.keys().copied().collect();
        files.sort();
        files
    }

    /// Applies incremental edits to an open document and emits
    /// [`ChangeEvent::Edited`].
    pub fn apply_changes(
        &self,
        file: FileId,
        new_version: i32,
        changes: &[ContentChange],
    ) -> Result<(), DocumentError> {
        let event = {
            let mut inner = self.inner.lock();
            let doc = inner
                .docs
                .get_mut(&file)
                .ok_or(DocumentError::DocumentNotOpen)?;
            let pre_edit_index = Arc::clone(doc.index());
            let edits = doc.apply_changes(new_version, changes)?;
            inner.dirty.insert(file);
            ChangeEvent::Edited {
                file,
                version: new_version,
                pre_edit_index,
                edits,
            }
        };
        self.subscribers.emit(&event);
        Ok(())
    }

    /// Marks the buffer as written back; buffer and disk agree again.
    pub fn save(&self, file: FileId) {
        let was_open = {
            let mut inner = self.inner.lock();
            inner.dirty.remove(&file);
            inner.docs.contains_key(&file)
        };
        if was_open {
            self.subscribers.emit(&ChangeEvent::Saved { file });
        }
    }

    /// Replaces the buffer wholesale (e.g. after an external change on disk).
    pub fn reload(&self, file: FileId, text: impl Into<String>, new_version: i32) {
        let reloaded = {
            let mut inner = self.inner.lock();
            if !inner.docs.contains_key(&file) {
                false
            } else {
                inner
                    .docs
                    .insert(file, Document::new_string(text, new_version));
                inner.dirty.remove(&file);
                true
            }
        };
        if reloaded {
            self.subscribers.emit(&ChangeEvent::Reloaded {
                file,
                version: new_version,
            });
        } else {
            tracing::debug!(
                target = "tether.vfs",
                file = file.to_raw(),
                "reload of a document that is not open; ignored"
            );
        }
    }

    /// Moves a document to a new path, keeping its id.
    pub fn rename(&self, from: &DocPath, to: DocPath) -> FileId {
        let file = self.inner.lock().ids.rename(from, to.clone());
        self.subscribers.emit(&ChangeEvent::Renamed {
            file,
            from: from.clone(),
            to,
        });
        file
    }

    pub fn text(&self, file: FileId) -> Option<Arc<String>> {
        Some(self.inner.lock().docs.get(&file)?.text_arc())
    }

    pub fn line_index(&self, file: FileId) -> Option<Arc<LineIndex>> {
        Some(Arc::clone(self.inner.lock().docs.get(&file)?.index()))
    }

    pub fn line_count(&self, file: FileId) -> Option<u32> {
        Some(self.inner.lock().docs.get(&file)?.line_count())
    }

    /// Text of `line` without its terminator; `None` for closed documents and
    /// lines past the end.
    pub fn line_text(&self, file: FileId, line: Line) -> Option<String> {
        let inner = self.inner.lock();
        let doc = inner.docs.get(&file)?;
        doc.line_text(line).map(str::to_string)
    }

    pub fn is_dirty(&self, file: FileId) -> bool {
        self.inner.lock().dirty.contains(&file)
    }

    /// Ids of every open document with unsaved modifications.
    pub fn dirty_files(&self) -> Vec<FileId> {
        let mut files: Vec<FileId> = self.inner.lock().dirty.iter().copied().collect();
        files.sort();
        files
    }
}
