//! The host-editor interface boundary.
//!
//! The collaborative-editing runtime that owns the document is an external
//! collaborator: this engine consumes a fixed contract from it (an attribute
//! store, a line-scoped mutation API, a read API over text and rendered DOM,
//! and a selection) and never holds a reference to a line across operations.
//! Line indices shift under concurrent edits and DOM node identity is
//! unreliable across composition boundaries, so every access re-resolves.
//!
//! Exclusive access is modeled with `&mut`: each mutating engine entry point
//! borrows the host mutably for the duration of one synchronous operation,
//! the Rust rendition of the host's "run with exclusive access" callback.
//! Anything the engine wants to do *after* the browser settles goes through
//! the deferred task queue instead, and re-derives its state from scratch.

mod memory;

pub use memory::{AttrSpan, MemoryDoc};

use std::ops::Range;

use crate::error::EngineError;

/// A caret endpoint: host-native line/column coordinates (char columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

impl Position {
    pub fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }
}

/// The host's current selection. `start` and `end` are in document order
/// after [`Selection::ordered`]; raw selections may be inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: Position,
    pub end: Position,
}

impl Selection {
    pub fn caret(line: usize, ch: usize) -> Self {
        let pos = Position::new(line, ch);
        Self { start: pos, end: pos }
    }

    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn is_multiline(&self) -> bool {
        self.start.line != self.end.line
    }

    /// Endpoints in document order.
    pub fn ordered(&self) -> (Position, Position) {
        if self.end < self.start {
            (self.end, self.start)
        } else {
            (self.start, self.end)
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::caret(0, 0)
    }
}

/// One styled run of text inside a rendered cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyledRun {
    pub text: String,
    /// Author-style attributes on this run, e.g. `("bold", "true")`. Identity
    /// attributes (`tblCell`) never appear here.
    pub attribs: Vec<(String, String)>,
}

/// A rendered table cell: the concatenation of its runs is the cell's text
/// as the browser currently shows it, which may disagree with the model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DomCell {
    pub runs: Vec<StyledRun>,
}

impl DomCell {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            runs: vec![StyledRun {
                text: text.into(),
                attribs: Vec::new(),
            }],
        }
    }

    /// The cell's visible text content.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// The rendered `<table>` element of one line, when that line renders one.
#[derive(Debug, Clone, PartialEq)]
pub struct DomTable {
    pub tbl_id: String,
    pub row: u32,
    pub cells: Vec<DomCell>,
}

/// The engine's view of one line's DOM node. This is deliberately narrow:
/// class tokens (for metadata recovery) and the rendered table, nothing else.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DomLine {
    pub class_tokens: Vec<String>,
    pub table: Option<DomTable>,
}

impl DomLine {
    /// Whether this line's DOM renders the given table row.
    pub fn renders_row(&self, tbl_id: &str, row: u32) -> bool {
        self.table
            .as_ref()
            .is_some_and(|t| t.tbl_id == tbl_id && t.row == row)
    }
}

/// The fixed contract this engine consumes from the host editor.
///
/// All ranges are char ranges within a single line. Mutations on a missing
/// line return [`EngineError::LineOutOfRange`]; reads return `None`. A
/// `dom_line` of `None` for a line the attribute store claims is a table line
/// is the signature of a host node-index desync and is counted toward the
/// safe-mode latch by callers.
pub trait DocModel {
    fn line_count(&self) -> usize;

    fn line_text(&self, line: usize) -> Option<String>;

    fn get_attribute(&self, line: usize, name: &str) -> Option<String>;

    fn set_attribute(&mut self, line: usize, name: &str, value: &str) -> Result<(), EngineError>;

    fn remove_attribute(&mut self, line: usize, name: &str) -> Result<(), EngineError>;

    /// Replace a char range of one line with new text. The host shifts its
    /// own range attributes and selection through the edit.
    fn replace_range(
        &mut self,
        line: usize,
        range: Range<usize>,
        text: &str,
    ) -> Result<(), EngineError>;

    /// Apply a named attribute to a char range of one line.
    fn apply_range_attribute(
        &mut self,
        line: usize,
        range: Range<usize>,
        name: &str,
        value: &str,
    ) -> Result<(), EngineError>;

    /// Remove every range attribute with the given name from one line.
    fn strip_range_attribute(&mut self, line: usize, name: &str) -> Result<(), EngineError>;

    fn selection(&self) -> Selection;

    fn set_selection(&mut self, selection: Selection);

    /// Insert a fresh line before index `at` (so `at == line_count()`
    /// appends).
    fn insert_line(&mut self, at: usize, text: &str) -> Result<(), EngineError>;

    fn delete_line(&mut self, line: usize) -> Result<(), EngineError>;

    /// The rendered DOM view of a line, if the host has one.
    fn dom_line(&self, line: usize) -> Option<&DomLine>;
}
