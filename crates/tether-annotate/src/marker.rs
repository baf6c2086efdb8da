use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tether_breakpoints::{Breakpoint, BreakpointId, BreakpointKind, Validity};
use tether_core::{FileId, Line};

/// Handle to one rendered marker, as issued by the [`MarkerHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(u64);

impl MarkerId {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Line,
    Field,
    Method,
    Class,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerVariant {
    Plain,
    Conditional,
    Disabled,
    DisabledConditional,
}

/// Overlays combine multiplicatively with the kind/variant rather than
/// forming categories of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerOverlay {
    None,
    Invalid,
    Inactive,
}

/// The closed set of visual categories a marker can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerStyle {
    pub kind: MarkerKind,
    pub variant: MarkerVariant,
    pub overlay: MarkerOverlay,
}

/// Selects the visual category for a breakpoint. Pure; the session-wide
/// "breakpoints active" toggle arrives as an argument.
///
/// When breakpoints are inactive every marker shows the Inactive overlay,
/// taking precedence over Invalid: the toggle is a global visual mode.
pub fn marker_style(breakpoint: &Breakpoint, breakpoints_active: bool) -> MarkerStyle {
    let kind = match &breakpoint.kind {
        BreakpointKind::Line(_) => MarkerKind::Line,
        BreakpointKind::Field(_) => MarkerKind::Field,
        BreakpointKind::Method(_) => MarkerKind::Method,
        BreakpointKind::Class(_) => MarkerKind::Class,
    };
    let variant = match (breakpoint.enabled, breakpoint.is_conditional()) {
        (true, false) => MarkerVariant::Plain,
        (true, true) => MarkerVariant::Conditional,
        (false, false) => MarkerVariant::Disabled,
        (false, true) => MarkerVariant::DisabledConditional,
    };
    let overlay = if !breakpoints_active {
        MarkerOverlay::Inactive
    } else if matches!(breakpoint.validity, Validity::Invalid { .. }) {
        MarkerOverlay::Invalid
    } else {
        MarkerOverlay::None
    };
    MarkerStyle {
        kind,
        variant,
        overlay,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("document is not available for markers")]
    DocumentUnavailable,
    #[error("line {0} is out of range")]
    LineOutOfRange(Line),
}

/// The rendering boundary. Implementations draw a marker on a line of a
/// document and remove it on demand; nothing else about rendering leaks in.
pub trait MarkerHost: Send + Sync {
    fn attach(
        &self,
        file: FileId,
        line: Line,
        style: MarkerStyle,
        breakpoint: BreakpointId,
    ) -> Result<MarkerId, HostError>;

    fn detach(&self, marker: MarkerId);
}

/// A lightweight handle binding one breakpoint to one line of one document.
///
/// Immutable after creation; appearance changes are modeled as detach-old +
/// attach-new. [`Marker::detach`] is idempotent, and dropping an attached
/// marker detaches it as a safety net.
pub struct Marker {
    host: Arc<dyn MarkerHost>,
    id: MarkerId,
    file: FileId,
    line: Line,
    style: MarkerStyle,
    breakpoint: BreakpointId,
    detached: AtomicBool,
}

impl Marker {
    pub fn attach(
        host: Arc<dyn MarkerHost>,
        file: FileId,
        line: Line,
        style: MarkerStyle,
        breakpoint: BreakpointId,
    ) -> Result<Self, HostError> {
        let id = host.attach(file, line, style, breakpoint)?;
        Ok(Self {
            host,
            id,
            file,
            line,
            style,
            breakpoint,
            detached: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> MarkerId {
        self.id
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn line(&self) -> Line {
        self.line
    }

    pub fn style(&self) -> MarkerStyle {
        self.style
    }

    pub fn breakpoint(&self) -> BreakpointId {
        self.breakpoint
    }

    pub fn detach(&self) {
        if !self.detached.swap(true, Ordering::SeqCst) {
            self.host.detach(self.id);
        }
    }
}

impl Drop for Marker {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marker")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("line", &self.line)
            .field("style", &self.style)
            .field("breakpoint", &self.breakpoint)
            .finish()
    }
}
