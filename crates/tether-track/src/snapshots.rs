use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use tether_breakpoints::{BreakpointChange, BreakpointId, BreakpointRegistry};
use tether_core::{FileId, Line, SubscriptionId};
use tether_vfs::{ChangeEvent, DocumentStore};

use crate::line_set::LineSet;

/// An opaque token denoting "the document state as of the moment this token
/// was created". Owned by the caller (typically a debugger session) and
/// explicitly disposed when the session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StampId(u64);

#[derive(Debug)]
struct MemoEntry {
    line: Line,
    stale: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_stamp: u64,
    /// Per-stamp tables of line sets, filled lazily as documents dirty.
    stamps: HashMap<StampId, HashMap<FileId, LineSet>>,
    /// "Current" line sets for dirty documents, used for stamp-less
    /// translation. Cleared when buffer and disk agree again.
    baseline: HashMap<FileId, LineSet>,
    /// Memoized `original_line_of` results, invalidated lazily.
    memo: HashMap<(StampId, BreakpointId), MemoEntry>,
    store_subscription: Option<SubscriptionId>,
}

struct RegistryShared {
    store: Arc<DocumentStore>,
    breakpoints: Arc<BreakpointRegistry>,
    state: Mutex<RegistryState>,
}

/// Maps time-stamp tokens to per-document [`LineSet`] tables and answers
/// best-effort line translation through them.
///
/// Documents are registered lazily: a stamp captures the line sets of every
/// currently-dirty document at creation, and any document that becomes dirty
/// afterwards is added the moment its first edit arrives (the edit event
/// carries the pre-edit line table, which is exactly the state the stamp
/// wants to remember). The document-store subscription exists only while at
/// least one stamp is alive.
pub struct SnapshotRegistry {
    shared: Arc<RegistryShared>,
    breakpoint_subscription: SubscriptionId,
}

impl SnapshotRegistry {
    pub fn new(store: Arc<DocumentStore>, breakpoints: Arc<BreakpointRegistry>) -> Self {
        let shared = Arc::new(RegistryShared {
            store,
            breakpoints: Arc::clone(&breakpoints),
            state: Mutex::new(RegistryState::default()),
        });

        // Memoized breakpoint lines go stale when the breakpoint moves and
        // are recomputed on the next read, not eagerly.
        let weak = Arc::downgrade(&shared);
        let breakpoint_subscription = breakpoints.subscribe(move |event| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut state = shared.state.lock();
            match &event.change {
                BreakpointChange::Line { .. } | BreakpointChange::Path { .. } => {
                    for ((_, bp), entry) in state.memo.iter_mut() {
                        if *bp == event.id {
                            entry.stale = true;
                        }
                    }
                }
                BreakpointChange::Removed => {
                    state.memo.retain(|(_, bp), _| *bp != event.id);
                }
                _ => {}
            }
        });

        Self {
            shared,
            breakpoint_subscription,
        }
    }

    /// Captures the current state of every dirty document under a fresh
    /// stamp and arranges for later-dirtied documents to join it lazily.
    pub fn create_time_stamp(&self) -> StampId {
        let mut state = self.shared.state.lock();
        state.next_stamp += 1;
        let stamp = StampId(state.next_stamp);

        let mut table = HashMap::new();
        for file in self.shared.store.dirty_files() {
            if let Some(index) = self.shared.store.line_index(file) {
                table.insert(file, LineSet::capture(&index));
            }
        }
        state.stamps.insert(stamp, table);

        if state.store_subscription.is_none() {
            let weak = Arc::downgrade(&self.shared);
            let id = self.shared.store.subscribe(move |event| {
                if let Some(shared) = weak.upgrade() {
                    on_store_event(&shared, event);
                }
            });
            state.store_subscription = Some(id);
        }

        stamp
    }

    /// Drops the stamp's tables and memo entries. Disposing the last stamp
    /// also drops the store subscription and the baseline tables, which are
    /// meaningless without it.
    pub fn dispose_time_stamp(&self, stamp: StampId) {
        let subscription = {
            let mut state = self.shared.state.lock();
            state.stamps.remove(&stamp);
            state.memo.retain(|(s, _), _| *s != stamp);
            if state.stamps.is_empty() {
                state.baseline.clear();
                state.store_subscription.take()
            } else {
                None
            }
        };
        if let Some(id) = subscription {
            self.shared.store.unsubscribe(id);
        }
    }

    /// Translates `line` (current coordinates) back to the original line as
    /// of `stamp`, or through the baseline when `stamp` is `None`.
    ///
    /// Best-effort by design: unknown stamps, untracked documents, and lines
    /// past the end of the capture all return the input unchanged, so a
    /// stale breakpoint location degrades instead of erroring.
    pub fn translate(&self, file: FileId, line: Line, stamp: Option<StampId>) -> Line {
        let Some(index) = self.shared.store.line_index(file) else {
            return line;
        };
        let state = self.shared.state.lock();
        let set = match stamp {
            Some(stamp) => state.stamps.get(&stamp).and_then(|table| table.get(&file)),
            None => state.baseline.get(&file),
        };
        set.and_then(|set| set.original_of(&index, line))
            .unwrap_or(line)
    }

    /// The forward direction: where does `line` (original coordinates as of
    /// `stamp`) sit in the current document? Same fallback rules as
    /// [`SnapshotRegistry::translate`].
    pub fn current_line(&self, file: FileId, line: Line, stamp: Option<StampId>) -> Line {
        let Some(index) = self.shared.store.line_index(file) else {
            return line;
        };
        let state = self.shared.state.lock();
        let set = match stamp {
            Some(stamp) => state.stamps.get(&stamp).and_then(|table| table.get(&file)),
            None => state.baseline.get(&file),
        };
        set.and_then(|set| set.current_of(&index, line))
            .unwrap_or(line)
    }

    /// Stamp-original line of a line breakpoint, memoized per
    /// (stamp, breakpoint).
    ///
    /// Returns `None` for unknown ids and non-line breakpoints.
    pub fn original_line_of(&self, id: BreakpointId, stamp: StampId) -> Option<Line> {
        {
            let state = self.shared.state.lock();
            if let Some(entry) = state.memo.get(&(stamp, id)) {
                if !entry.stale {
                    return Some(entry.line);
                }
            }
        }

        let breakpoint = self.shared.breakpoints.get(id)?;
        let location = breakpoint.line_location()?;
        let line = match self.shared.store.get_id(&location.path) {
            Some(file) => self.translate(file, location.line, Some(stamp)),
            None => location.line,
        };

        self.shared
            .state
            .lock()
            .memo
            .insert((stamp, id), MemoEntry { line, stale: false });
        Some(line)
    }

    /// Drops every memo entry for a breakpoint. Also happens automatically
    /// when the breakpoint model reports the removal.
    pub fn forget_breakpoint(&self, id: BreakpointId) {
        self.shared
            .state
            .lock()
            .memo
            .retain(|(_, bp), _| *bp != id);
    }
}

fn on_store_event(shared: &RegistryShared, event: &ChangeEvent) {
    let mut state = shared.state.lock();
    match event {
        ChangeEvent::Edited {
            file,
            pre_edit_index,
            edits,
            ..
        } => {
            let state = &mut *state;
            for table in state
                .stamps
                .values_mut()
                .chain(std::iter::once(&mut state.baseline))
            {
                let set = table
                    .entry(*file)
                    .or_insert_with(|| LineSet::capture(pre_edit_index));
                for edit in edits {
                    set.apply_edit(edit.range, edit.new_len());
                }
            }
        }
        ChangeEvent::Saved { file } => {
            // Buffer and disk agree again; stamp tables keep tracking since
            // their reference point is stamp creation, not the disk state.
            state.baseline.remove(file);
        }
        ChangeEvent::Reloaded { file, .. } | ChangeEvent::Closed { file } => {
            for table in state.stamps.values_mut() {
                table.remove(file);
            }
            state.baseline.remove(file);
        }
        ChangeEvent::Opened { .. } | ChangeEvent::Renamed { .. } => {}
    }
}

impl Drop for SnapshotRegistry {
    fn drop(&mut self) {
        self.shared
            .breakpoints
            .unsubscribe(self.breakpoint_subscription);
        let subscription = self.shared.state.lock().store_subscription.take();
        if let Some(id) = subscription {
            self.shared.store.unsubscribe(id);
        }
    }
}

impl std::fmt::Debug for SnapshotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SnapshotRegistry")
            .field("stamps", &state.stamps.len())
            .field("memo_entries", &state.memo.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_breakpoints::Breakpoint;
    use tether_core::{Position, Range};
    use tether_vfs::{ContentChange, DocPath};

    fn open(store: &DocumentStore, path: &str, text: &str) -> FileId {
        store.open_document(DocPath::new(path), text, 1)
    }

    fn insert_lines(store: &DocumentStore, file: FileId, line: Line, text: &str) {
        store
            .apply_changes(file, 0, &[ContentChange::insert_at_line_start(line, text)])
            .unwrap();
    }

    fn registry(store: &Arc<DocumentStore>) -> (SnapshotRegistry, Arc<BreakpointRegistry>) {
        let breakpoints = Arc::new(BreakpointRegistry::new());
        (
            SnapshotRegistry::new(Arc::clone(store), Arc::clone(&breakpoints)),
            breakpoints,
        )
    }

    #[test]
    fn translation_is_identity_before_any_edit() {
        let store = Arc::new(DocumentStore::new());
        let file = open(&store, "file:///t/A.java", "a\nb\nc\nd\n");
        let (registry, _) = registry(&store);

        let stamp = registry.create_time_stamp();
        for line in 0..4 {
            assert_eq!(registry.translate(file, line, Some(stamp)), line);
        }
        registry.dispose_time_stamp(stamp);
    }

    #[test]
    fn lazily_registered_document_translates_through_the_stamp() {
        let store = Arc::new(DocumentStore::new());
        let file = open(&store, "file:///t/B.java", "l0\nl1\nl2\nl3\nl4\n");
        let (registry, _) = registry(&store);

        // The document is clean when the stamp is created; it joins the
        // stamp's table at its first edit.
        let stamp = registry.create_time_stamp();
        insert_lines(&store, file, 1, "x\ny\nz\n");

        assert_eq!(registry.translate(file, 4, Some(stamp)), 1);
        assert_eq!(registry.translate(file, 0, Some(stamp)), 0);
        assert_eq!(registry.current_line(file, 1, Some(stamp)), 4);
        // Lines that only exist in the new state fall back to the input.
        assert_eq!(registry.translate(file, 2, Some(stamp)), 2);
    }

    #[test]
    fn dirty_documents_are_captured_at_stamp_creation() {
        let store = Arc::new(DocumentStore::new());
        let file = open(&store, "file:///t/C.java", "a\nb\nc\n");
        let (registry, _) = registry(&store);

        // Dirty the document before the stamp exists; the pre-stamp edit must
        // not be visible through the stamp.
        let pre_stamp = registry.create_time_stamp();
        insert_lines(&store, file, 0, "early\n");
        registry.dispose_time_stamp(pre_stamp);

        let stamp = registry.create_time_stamp();
        insert_lines(&store, file, 0, "late\n");

        // One line of post-stamp insertion shifts everything by exactly one.
        assert_eq!(registry.translate(file, 2, Some(stamp)), 1);
        assert_eq!(registry.current_line(file, 1, Some(stamp)), 2);
    }

    #[test]
    fn stampless_translation_tracks_unsaved_edits_and_resets_on_save() {
        let store = Arc::new(DocumentStore::new());
        let file = open(&store, "file:///t/D.java", "a\nb\nc\n");
        let (registry, _) = registry(&store);
        let _stamp = registry.create_time_stamp();

        // Clean document: identity.
        assert_eq!(registry.translate(file, 1, None), 1);

        insert_lines(&store, file, 0, "inserted\n");
        assert_eq!(registry.translate(file, 2, None), 1);

        store.save(file);
        assert_eq!(registry.translate(file, 2, None), 2);
    }

    #[test]
    fn unknown_stamp_and_out_of_range_lines_fall_back_to_the_input() {
        let store = Arc::new(DocumentStore::new());
        let file = open(&store, "file:///t/E.java", "a\nb\n");
        let (registry, _) = registry(&store);

        let stamp = registry.create_time_stamp();
        registry.dispose_time_stamp(stamp);

        assert_eq!(registry.translate(file, 1, Some(stamp)), 1);
        assert_eq!(registry.translate(file, 999, Some(stamp)), 999);
        assert_eq!(
            registry.translate(FileId::from_raw(4040), 7, Some(stamp)),
            7
        );
    }

    #[test]
    fn reload_drops_the_tables_for_that_document() {
        let store = Arc::new(DocumentStore::new());
        let file = open(&store, "file:///t/F.java", "a\nb\nc\n");
        let (registry, _) = registry(&store);

        let stamp = registry.create_time_stamp();
        insert_lines(&store, file, 0, "x\n");
        store.reload(file, "completely\ndifferent\n", 9);

        assert_eq!(registry.translate(file, 1, Some(stamp)), 1);
        assert_eq!(registry.translate(file, 1, None), 1);
    }

    #[test]
    fn original_line_of_memoizes_and_recomputes_after_moves() {
        let store = Arc::new(DocumentStore::new());
        let file = open(&store, "file:///t/G.java", "a\nb\nc\nd\ne\nf\n");
        let (registry, breakpoints) = registry(&store);

        let bp = breakpoints.add(Breakpoint::line(DocPath::new("file:///t/G.java"), 3));
        let stamp = registry.create_time_stamp();

        assert_eq!(registry.original_line_of(bp, stamp), Some(3));

        // Two inserted lines shift the breakpoint; the memo entry is stale
        // after the model reports the move and recomputes on the next read.
        insert_lines(&store, file, 0, "x\ny\n");
        breakpoints.set_line_internal(bp, 5);
        assert_eq!(registry.original_line_of(bp, stamp), Some(3));

        registry.dispose_time_stamp(stamp);
        assert_eq!(registry.original_line_of(bp, stamp), Some(5));
    }

    #[test]
    fn original_line_of_rejects_unknown_and_non_line_breakpoints() {
        let store = Arc::new(DocumentStore::new());
        let (registry, breakpoints) = registry(&store);
        let stamp = registry.create_time_stamp();

        assert_eq!(
            registry.original_line_of(BreakpointId::from_raw(999), stamp),
            None
        );
        let field = breakpoints.add(Breakpoint::field("com.example.A", "x"));
        assert_eq!(registry.original_line_of(field, stamp), None);
    }

    #[test]
    fn closed_documents_translate_to_the_input() {
        let store = Arc::new(DocumentStore::new());
        let file = open(&store, "file:///t/H.java", "a\nb\nc\n");
        let (registry, _) = registry(&store);

        let stamp = registry.create_time_stamp();
        insert_lines(&store, file, 0, "x\n");
        store.close_document(file);

        assert_eq!(registry.translate(file, 2, Some(stamp)), 2);
    }

    #[test]
    fn edits_keep_position_and_range_types_honest() {
        // Mid-line edits travel through the same event path as line edits.
        let store = Arc::new(DocumentStore::new());
        let file = open(&store, "file:///t/I.java", "hello\nworld\n");
        let (registry, _) = registry(&store);
        let stamp = registry.create_time_stamp();

        store
            .apply_changes(
                file,
                2,
                &[ContentChange::replace(
                    Range::new(Position::new(0, 5), Position::new(0, 5)),
                    " there",
                )],
            )
            .unwrap();

        assert_eq!(registry.translate(file, 1, Some(stamp)), 1);
    }
}
