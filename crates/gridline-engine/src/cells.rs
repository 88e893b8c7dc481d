//! Cell boundary resolution over delimiter-joined row text.
//!
//! A cell is not a stored entity: it is a derived half-open char range within
//! one line's text, where cells are joined by [`CELL_DELIMITER`]. Every other
//! component resolves offsets through this module rather than splitting text
//! ad hoc, so the boundary policy (delimiter offsets belong to the *following*
//! cell) is decided in exactly one place.
//!
//! All offsets in this module, and throughout the engine, are char offsets:
//! the delimiter is a single scalar value and the host selection model is
//! column-based, not byte-based.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// The reserved cell separator: U+001F UNIT SEPARATOR. Non-printing, never
/// produced by ordinary typing, and stripped from any user content that tries
/// to smuggle it in.
pub const CELL_DELIMITER: char = '\u{001F}';

/// Placeholder content for an empty cell. Zero-length cells cannot be
/// unambiguously bounded once adjacent to a delimiter, so an "empty" cell is
/// always a single space.
pub const EMPTY_CELL: &str = " ";

/// Inline embedded-object placeholder (object replacement character). Its
/// zero-width companions are the one kind of invisible character the
/// sanitizer must not strip.
pub const OBJECT_PLACEHOLDER: char = '\u{FFFC}';

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("whitespace-run pattern is valid"));

/// Where a char offset landed within a row's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellHit {
    /// 0-based cell index.
    pub cell: usize,
    /// Char offset of the cell's first character.
    pub cell_start: usize,
    /// Char offset one past the cell's last character (exclusive).
    pub cell_end: usize,
    /// Offset relative to `cell_start`, clamped into the cell.
    pub rel: usize,
}

impl CellHit {
    /// Char length of the cell.
    pub fn len(&self) -> usize {
        self.cell_end - self.cell_start
    }

    pub fn is_empty(&self) -> bool {
        self.cell_start == self.cell_end
    }

    /// Whether the hit sits exactly on the cell's leading edge.
    pub fn at_start(&self) -> bool {
        self.rel == 0
    }

    /// Whether the hit sits exactly on the cell's trailing edge.
    pub fn at_end(&self) -> bool {
        self.rel == self.len()
    }

    pub fn range(&self) -> Range<usize> {
        self.cell_start..self.cell_end
    }
}

/// Split row text into its cell strings. Always yields at least one segment.
pub fn split_cells(text: &str) -> Vec<&str> {
    text.split(CELL_DELIMITER).collect()
}

/// Join cell strings back into row text.
pub fn join_cells<S: AsRef<str>>(cells: &[S]) -> String {
    let mut out = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(CELL_DELIMITER);
        }
        out.push_str(cell.as_ref());
    }
    out
}

/// Number of delimiters in a line's text.
pub fn delimiter_count(text: &str) -> usize {
    text.chars().filter(|&c| c == CELL_DELIMITER).count()
}

/// Resolve a char offset to the cell containing it.
///
/// An offset exactly on a delimiter resolves to the *following* cell at
/// relative position 0; left-association is never used, so Tab and Backspace
/// semantics stay predictable at boundaries. An offset past the end of the
/// text resolves to the last cell at its end.
pub fn locate(text: &str, offset: usize) -> CellHit {
    let cells = split_cells(text);
    let last = cells.len() - 1;
    let mut start = 0;

    for (i, cell) in cells.iter().enumerate() {
        let len = cell.chars().count();
        let end = start + len;
        // An offset equal to `end` sits on the delimiter and falls through to
        // the next iteration, resolving to the following cell at rel 0.
        if offset < end || i == last {
            let rel = offset.saturating_sub(start).min(len);
            return CellHit {
                cell: i,
                cell_start: start,
                cell_end: end,
                rel,
            };
        }
        start = end + 1;
    }
    unreachable!("split always yields at least one cell");
}

/// Inverse of [`locate`]: the absolute char range of cell `index`.
///
/// An index past the last cell clamps to the last cell, mirroring `locate`'s
/// clamping of oversized offsets.
pub fn range_of<S: AsRef<str>>(cells: &[S], index: usize) -> Range<usize> {
    debug_assert!(!cells.is_empty());
    let index = index.min(cells.len().saturating_sub(1));
    let mut start = 0;
    for cell in cells.iter().take(index) {
        start += cell.as_ref().chars().count() + 1;
    }
    let len = cells[index].as_ref().chars().count();
    start..start + len
}

/// Clamp a selection to a single cell.
///
/// A boundary endpoint that merely grazes a delimiter is pulled inside the
/// adjacent cell; a selection that still spans two cells after clamping is
/// unrecoverable and yields `None`, which callers must treat as "reject the
/// edit". Cross-cell edits are never applied verbatim.
pub fn clamp_to_cell(text: &str, start: usize, end: usize) -> Option<(usize, Range<usize>)> {
    let (start, end) = if start <= end { (start, end) } else { (end, start) };
    let start_hit = locate(text, start);
    let end_hit = locate(text, end);

    if start_hit.cell == end_hit.cell {
        let lo = start.max(start_hit.cell_start);
        let hi = end.min(start_hit.cell_end);
        return Some((start_hit.cell, lo..hi.max(lo)));
    }

    // The end landed exactly on the next cell's leading edge (i.e. the
    // selection included the delimiter): clamp it back into the start cell.
    if end_hit.cell == start_hit.cell + 1 && end_hit.at_start() {
        let lo = start.max(start_hit.cell_start);
        let hi = start_hit.cell_end;
        return Some((start_hit.cell, lo..hi.max(lo)));
    }

    None
}

/// Sanitize one cell's content to its canonical form.
///
/// Soft whitespace (NBSP, CR, LF, tab) becomes a plain space and runs of
/// spaces collapse to one. The delimiter itself becomes a space so pasted
/// content can never change the cell count. Zero-width marks are stripped
/// unless they sit next to an embedded-object placeholder, whose invisible
/// companions carry meaning. An empty result becomes the single-space
/// placeholder.
///
/// Idempotent: sanitizing already-sanitized text returns it unchanged, which
/// is what makes the canonical rewriter idempotent in turn.
pub fn sanitize_cell(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\u{00A0}' | '\r' | '\n' | '\t' => out.push(' '),
            CELL_DELIMITER => out.push(' '),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => {
                let prev_is_object = i > 0 && chars[i - 1] == OBJECT_PLACEHOLDER;
                let next_is_object = chars.get(i + 1) == Some(&OBJECT_PLACEHOLDER);
                if prev_is_object || next_is_object {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    let collapsed = WHITESPACE_RUN.replace_all(&out, " ");
    if collapsed.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        collapsed.into_owned()
    }
}

/// Whether a line's text already satisfies the at-rest invariant for the
/// declared column count.
pub fn is_canonical(text: &str, cols: usize) -> bool {
    let cells = split_cells(text);
    cells.len() == cols && cells.iter().all(|c| sanitize_cell(c) == **c)
}
