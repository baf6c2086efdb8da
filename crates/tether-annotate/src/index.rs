use tether_core::{FileId, Line};

/// A field of a concrete class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub class: String,
    pub field: String,
}

/// A method of a concrete class, optionally narrowed by signature. All
/// overloads match when `signature` is `None`, so a resolution may produce
/// several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub class: String,
    pub method: String,
    pub signature: Option<String>,
}

/// A concrete class, for class load/unload breakpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub class: String,
}

/// Continuation invoked exactly once when a lookup completes.
///
/// `None` means the descriptor could not be resolved in that document (the
/// class is not there, the index gave up, ...). The callback may run on any
/// thread, synchronously from the resolve call when the answer is already
/// indexed, or arbitrarily later; it may also never run at all if the index
/// is dropped first. Callers must not rely on delivery.
pub type LookupCallback = Box<dyn FnOnce(Option<Vec<Line>>) + Send>;

/// The structural source index boundary: descriptor in, source line(s) out,
/// asynchronously.
///
/// Resolutions race freely with further edits; consumers revalidate their
/// world before acting on a completion.
pub trait StructuralIndex: Send + Sync {
    fn resolve_field(&self, file: FileId, descriptor: &FieldDescriptor, done: LookupCallback);

    fn resolve_method(&self, file: FileId, descriptor: &MethodDescriptor, done: LookupCallback);

    fn resolve_class(&self, file: FileId, descriptor: &ClassDescriptor, done: LookupCallback);
}
