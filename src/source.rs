//! Source files, lines, and locations.
//!
//! This is spec.md §4.1's location store: an append-only table mapping a
//! compact index to a [`SourceLoc`], each of which refers to a
//! [`SourceLine`]. Reimplemented natively from the teacher's
//! `source.rs` (`File`, `Location`, `SourceLocation`, `SourceRange`),
//! which queried libclang for the same facts this module computes
//! directly; the indexed-graph-not-pointer-graph design follows spec.md
//! §9.

use std::ops::Range;
use std::sync::Arc;

use crate::intern::Symbol;

/// Index into [`SourceLocStore`]'s line table. `0` never denotes "no
/// line" (unlike [`LocId`]) — every line that exists has a real id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LineId(u32);

/// Index into [`SourceLocStore`]'s location table. `0` is the sentinel
/// used by [`SourceLine::parent`] and [`SourceLoc::expansion`] to mean
/// "none" (spec.md §3: "parent source-location index (0 = none)").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocId(u32);

impl LocId {
    pub const NONE: LocId = LocId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// What produced a [`SourceLoc`]: direct text in a file, or a macro
/// expansion's synthesized span.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LocKind {
    File,
    Macro,
}

/// A physical line in a file, or a synthetic line backing a macro
/// expansion. Never mutated after creation (spec.md invariant 1).
#[derive(Clone)]
pub struct SourceLine {
    pub filepath: Symbol,
    pub line: u32,
    buffer: Arc<str>,
    range: Range<usize>,
    /// Index of the expansion-site [`SourceLoc`] this line was produced
    /// from, or [`LocId::NONE`] for an ordinary file line.
    pub parent: LocId,
}

impl SourceLine {
    /// The line's text, as a zero-copy slice of the file's buffer.
    pub fn text(&self) -> &str {
        &self.buffer[self.range.clone()]
    }

    /// Synthetic files (macro expansion backing lines, command-line
    /// defines) are named with a leading `<`, e.g. `<temp>` (spec.md
    /// §4.1 design decision, generalized per DESIGN.md open question a).
    pub fn is_synthetic(&self) -> bool {
        self.filepath.as_str().starts_with('<')
    }
}

/// A span inside a [`SourceLine`]. Immutable after creation.
#[derive(Clone)]
pub struct SourceLoc {
    pub line: LineId,
    pub column: u32,
    pub length: u32,
    pub kind: LocKind,
    /// For [`LocKind::Macro`] locations, the location of the `#define`'s
    /// name that produced this expansion (spec.md §4.3 step 4).
    pub expansion: LocId,
}

/// The `(file, line, column, offset)` of a location, with a nicer file
/// handle for display (spec.md §3 `Location`, via the teacher's
/// `source::Location`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: Symbol,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

/// Append-only store of [`SourceLine`]s and [`SourceLoc`]s, shared by a
/// single [`crate::token::TokenStream`] for its entire lifetime.
#[derive(Default)]
pub struct SourceLocStore {
    lines: Vec<SourceLine>,
    locs: Vec<SourceLoc>,
}

impl SourceLocStore {
    pub fn new() -> SourceLocStore {
        // Index 0 of `locs` is the permanent LocId::NONE sentinel; push a
        // throwaway entry so real locations start at index 1.
        SourceLocStore {
            lines: Vec::new(),
            locs: vec![SourceLoc {
                line: LineId(0),
                column: 0,
                length: 0,
                kind: LocKind::File,
                expansion: LocId::NONE,
            }],
        }
    }

    /// Registers a physical or synthetic line. Deduplication is not
    /// required (spec.md §4.1): equal lines from two includes are
    /// distinct handles.
    pub fn intern_line(
        &mut self,
        filepath: Symbol,
        line_number: u32,
        buffer: Arc<str>,
        range: Range<usize>,
        parent: LocId,
    ) -> LineId {
        let id = LineId(self.lines.len() as u32);
        self.lines.push(SourceLine {
            filepath,
            line: line_number,
            buffer,
            range,
            parent,
        });
        id
    }

    pub fn make_loc(
        &mut self,
        line: LineId,
        column: u32,
        length: u32,
        kind: LocKind,
        expansion: LocId,
    ) -> LocId {
        let id = LocId(self.locs.len() as u32);
        self.locs.push(SourceLoc {
            line,
            column,
            length,
            kind,
            expansion,
        });
        id
    }

    pub fn get_loc(&self, id: LocId) -> &SourceLoc {
        &self.locs[id.0 as usize]
    }

    pub fn get_line(&self, id: LineId) -> &SourceLine {
        &self.lines[id.0 as usize]
    }

    /// Follows `SourceLine.parent` until a line with no parent is found
    /// (spec.md invariant 2: the expansion graph is a forest).
    pub fn root_line(&self, mut line: LineId) -> LineId {
        loop {
            let parent = self.get_line(line).parent;
            if parent.is_none() {
                return line;
            }
            line = self.get_loc(parent).line;
        }
    }

    /// The `(file, line, column, offset)` a [`LocId`] resolves to,
    /// following macro-expansion parents to the nearest non-synthetic
    /// display location (spec.md §4.1: "synthetic files... are skipped
    /// when walking up to find a nicer display location").
    pub fn display_location(&self, mut id: LocId) -> Location {
        loop {
            let loc = self.get_loc(id);
            let line = self.get_line(loc.line);
            if !line.is_synthetic() || line.parent.is_none() {
                return Location {
                    file: line.filepath.clone(),
                    line: line.line,
                    column: loc.column,
                    offset: loc.column,
                };
            }
            id = line.parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn location_forest_terminates() {
        let interner = Interner::new();
        let mut store = SourceLocStore::new();
        let buf: Arc<str> = Arc::from("int y = SQR(SQR(1));\n");
        let file_line = store.intern_line(interner.intern("a.c"), 2, buf, 0..21, LocId::NONE);
        let file_loc = store.make_loc(file_line, 8, 3, LocKind::File, LocId::NONE);

        let synth: Arc<str> = Arc::from("SQR(1)*SQR(1)");
        let macro_line = store.intern_line(interner.intern("<temp>"), 2, synth, 0..13, file_loc);
        let macro_loc = store.make_loc(macro_line, 0, 13, LocKind::Macro, file_loc);

        assert_eq!(store.root_line(macro_line), file_line);
        let display = store.display_location(macro_loc);
        assert_eq!(display.file.as_str(), "a.c");
    }
}
