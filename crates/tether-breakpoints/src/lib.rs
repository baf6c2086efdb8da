//! The breakpoint model Tether tracks against.
//!
//! Breakpoints are owned and mutated by the embedder (the debugger UI); this
//! subsystem reads them, listens for property-granular change events, and
//! writes back exactly one thing: the stored line of a line breakpoint, via
//! the debounced re-anchoring path ([`BreakpointRegistry::set_line_internal`]).

mod breakpoint;
mod registry;

pub use breakpoint::{
    Breakpoint, BreakpointId, BreakpointKind, ClassTarget, FieldTarget, LineLocation, MethodTarget,
    Validity,
};
pub use registry::{BreakpointChange, BreakpointEvent, BreakpointRegistry, LineChangeSource};
