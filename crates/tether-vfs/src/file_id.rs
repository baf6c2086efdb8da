use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tether_core::FileId;

/// A document address, usually a `file:` URL.
///
/// Paths are compared verbatim; normalization is the embedder's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(Arc<str>);

impl DocPath {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Arc::from(path.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Allocates stable `FileId`s for paths and supports reverse lookup.
#[derive(Debug, Default)]
pub struct FileIdRegistry {
    path_to_id: HashMap<DocPath, FileId>,
    id_to_path: Vec<DocPath>,
}

impl FileIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stable id for `path`, allocating a new one if necessary.
    pub fn file_id(&mut self, path: DocPath) -> FileId {
        if let Some(&id) = self.path_to_id.get(&path) {
            return id;
        }

        let raw = u32::try_from(self.id_to_path.len()).expect("too many file ids allocated");
        let id = FileId::from_raw(raw);
        self.id_to_path.push(path.clone());
        self.path_to_id.insert(path, id);
        id
    }

    /// Returns the id for `path` if it has been interned.
    pub fn get_id(&self, path: &DocPath) -> Option<FileId> {
        self.path_to_id.get(path).copied()
    }

    /// Returns the path for `id`.
    pub fn get_path(&self, id: FileId) -> Option<&DocPath> {
        self.id_to_path.get(id.to_raw() as usize)
    }

    /// Moves `from` to `to`, keeping the id. When `from` was never interned
    /// the id is freshly allocated for `to`.
    pub fn rename(&mut self, from: &DocPath, to: DocPath) -> FileId {
        let Some(id) = self.path_to_id.remove(from) else {
            return self.file_id(to);
        };
        self.id_to_path[id.to_raw() as usize] = to.clone();
        self.path_to_id.insert(to, id);
        id
    }
}
