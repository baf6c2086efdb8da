use tether_core::{Line, LineIndex, TextRange, TextSize};

/// One sticky mark per original line.
///
/// A mark rides at (or after) the byte offset where its line started when
/// the set was captured. Edits shift marks instead of invalidating line
/// numbers wholesale; a mark inside a replaced span is absorbed to the span
/// start and flagged deleted so it can never answer a reverse lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mark {
    offset: TextSize,
    deleted: bool,
}

/// An immutable-per-version mapping between "original" line numbers (as of
/// capture) and "current" line numbers (as of now) for one document.
///
/// Invariant: `original_of(current_of(L)) == L` for every original line L
/// that still exists as its own line. Deleted lines translate to the nearest
/// surviving line in the forward direction and never match in reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSet {
    marks: Vec<Mark>,
}

impl LineSet {
    /// Captures one mark per line of the given text snapshot.
    pub fn capture(index: &LineIndex) -> Self {
        let marks = (0..index.line_count())
            .filter_map(|line| index.line_start(line))
            .map(|offset| Mark {
                offset,
                deleted: false,
            })
            .collect();
        Self { marks }
    }

    /// Number of lines the capture saw.
    pub fn original_line_count(&self) -> u32 {
        self.marks.len() as u32
    }

    /// Shifts marks through one edit: `range` (old coordinates) replaced by
    /// `new_len` bytes. Marks before the span keep their offset, marks at or
    /// past its end shift by the length delta, marks inside are absorbed.
    pub fn apply_edit(&mut self, range: TextRange, new_len: TextSize) {
        let removed = u32::from(range.len());
        let inserted = u32::from(new_len);
        for mark in &mut self.marks {
            if mark.offset < range.start() {
                continue;
            }
            if mark.offset >= range.end() {
                mark.offset = TextSize::from(u32::from(mark.offset) - removed + inserted);
            } else {
                mark.offset = range.start();
                mark.deleted = true;
            }
        }
    }

    /// Current line of `original`, given the document's current line table.
    ///
    /// Absorbed marks resolve to the nearest surviving position. Returns
    /// `None` only for lines the capture never saw (callers fall back to the
    /// input line).
    pub fn current_of(&self, index: &LineIndex, original: Line) -> Option<Line> {
        let mark = self.marks.get(original as usize)?;
        Some(index.line_at(mark.offset))
    }

    /// Original line that now sits at `current`, given the document's current
    /// line table. Deleted marks never match; `None` when no surviving mark
    /// is on the line (callers fall back to the input line).
    pub fn original_of(&self, index: &LineIndex, current: Line) -> Option<Line> {
        let start = index.line_start(current)?;
        let end = match index.line_start(current + 1) {
            Some(next) => next,
            // The last line owns every offset up to and including EOF.
            None => index.text_len() + TextSize::from(1),
        };

        let first = self.marks.partition_point(|mark| mark.offset < start);
        self.marks[first..]
            .iter()
            .take_while(|mark| mark.offset < end)
            .position(|mark| !mark.deleted)
            .map(|found| (first + found) as Line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::TextEdit;

    fn apply(set: &mut LineSet, text: &mut String, edit: TextEdit) -> LineIndex {
        set.apply_edit(edit.range, edit.new_len());
        let start = u32::from(edit.range.start()) as usize;
        let end = u32::from(edit.range.end()) as usize;
        text.replace_range(start..end, &edit.replacement);
        LineIndex::new(text)
    }

    #[test]
    fn identity_before_any_edit() {
        let text = "a\nb\nc\nd";
        let index = LineIndex::new(text);
        let set = LineSet::capture(&index);

        for line in 0..index.line_count() {
            assert_eq!(set.current_of(&index, line), Some(line));
            assert_eq!(set.original_of(&index, line), Some(line));
        }
    }

    #[test]
    fn insertion_shifts_lines_at_or_after_the_insertion_point() {
        let mut text = String::from("l0\nl1\nl2\nl3\n");
        let index = LineIndex::new(&text);
        let mut set = LineSet::capture(&index);

        // Insert two lines at the start of line 1.
        let at = index.line_start(1).unwrap();
        let index = apply(&mut set, &mut text, TextEdit::insert(at, "x\ny\n"));

        assert_eq!(set.current_of(&index, 0), Some(0));
        assert_eq!(set.current_of(&index, 1), Some(3));
        assert_eq!(set.current_of(&index, 2), Some(4));
        assert_eq!(set.current_of(&index, 3), Some(5));

        assert_eq!(set.original_of(&index, 0), Some(0));
        assert_eq!(set.original_of(&index, 1), None);
        assert_eq!(set.original_of(&index, 2), None);
        assert_eq!(set.original_of(&index, 3), Some(1));
        assert_eq!(set.original_of(&index, 5), Some(3));
    }

    #[test]
    fn round_trip_survives_interleaved_edits() {
        let mut text = String::from("a\nb\nc\nd\ne\n");
        let index = LineIndex::new(&text);
        let mut set = LineSet::capture(&index);

        let at = index.line_start(2).unwrap();
        let index = apply(&mut set, &mut text, TextEdit::insert(at, "one\ntwo\n"));
        let at = index.line_start(0).unwrap();
        let index = apply(&mut set, &mut text, TextEdit::insert(at, "zero\n"));

        for original in 0..set.original_line_count() {
            let current = set.current_of(&index, original).unwrap();
            assert_eq!(set.original_of(&index, current), Some(original));
        }
    }

    #[test]
    fn deleted_lines_fall_back_to_the_nearest_survivor() {
        let mut text = String::from("a\nb\nc\nd\n");
        let index = LineIndex::new(&text);
        let mut set = LineSet::capture(&index);

        // Delete lines 1..3 wholesale.
        let start = index.line_start(1).unwrap();
        let end = index.line_start(3).unwrap();
        let index = apply(
            &mut set,
            &mut text,
            TextEdit::new(TextRange::new(start, end), ""),
        );
        assert_eq!(text, "a\nd\n");

        // The deleted originals resolve forward to the line that replaced them.
        assert_eq!(set.current_of(&index, 1), Some(1));
        assert_eq!(set.current_of(&index, 2), Some(1));
        // The survivor keeps its identity through the reverse mapping.
        assert_eq!(set.original_of(&index, 1), Some(3));
        assert_eq!(set.current_of(&index, 3), Some(1));
    }

    #[test]
    fn whole_document_replacement_degrades_every_reverse_lookup() {
        let mut text = String::from("a\nb\nc");
        let index = LineIndex::new(&text);
        let mut set = LineSet::capture(&index);

        let index = apply(
            &mut set,
            &mut text,
            TextEdit::new(TextRange::new(TextSize::from(0), TextSize::from(5)), "x\ny\nz"),
        );

        for line in 0..index.line_count() {
            assert_eq!(set.original_of(&index, line), None);
        }
    }

    #[test]
    fn lines_past_the_capture_are_unknown() {
        let text = "a\nb";
        let index = LineIndex::new(text);
        let set = LineSet::capture(&index);

        assert_eq!(set.current_of(&index, 17), None);
        assert_eq!(set.original_of(&index, 17), None);
    }

    #[test]
    fn edit_within_a_line_does_not_move_it() {
        let mut text = String::from("hello\nworld\n");
        let index = LineIndex::new(&text);
        let mut set = LineSet::capture(&index);

        // Replace "ello" with "i" inside line 0.
        let index = apply(
            &mut set,
            &mut text,
            TextEdit::new(TextRange::new(TextSize::from(1), TextSize::from(5)), "i"),
        );
        assert_eq!(text, "hi\nworld\n");

        assert_eq!(set.current_of(&index, 0), Some(0));
        assert_eq!(set.current_of(&index, 1), Some(1));
        assert_eq!(set.original_of(&index, 1), Some(1));
    }
}
