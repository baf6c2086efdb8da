//! Marker synchronization: keeping the visual annotations for every
//! trackable breakpoint correct across all open documents.
//!
//! The [`AnnotationController`] owns the breakpoint→marker-set table and
//! serializes every recomputation through two single-worker queues: the
//! primary refresh queue (breakpoint add/remove/change, global toggles) and
//! the lookup-completion queue (continuations of asynchronous
//! [`StructuralIndex`] resolutions). A marker is never mutated in place; a
//! change of appearance is always detach-old + attach-new.

mod controller;
mod index;
mod marker;

pub use controller::AnnotationController;
pub use index::{ClassDescriptor, FieldDescriptor, LookupCallback, MethodDescriptor, StructuralIndex};
pub use marker::{
    marker_style, HostError, Marker, MarkerHost, MarkerId, MarkerKind, MarkerOverlay, MarkerStyle,
    MarkerVariant,
};
