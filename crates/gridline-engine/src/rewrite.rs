//! Canonical rewrite of a table line.
//!
//! Whatever an edit pipeline did to a row, the rewriter drives the line back
//! to its at-rest invariant: exactly `cols` delimiter-joined cells, each
//! sanitized, each tagged with its identity attribute, metadata re-asserted.
//! It is the single funnel every mutating path ends in, and it is idempotent:
//! rewriting a canonical line changes nothing.
//!
//! Styling survives by capture-and-reapply: spans lifted from the rendered
//! DOM (or staged in the [`SpanCache`] by an earlier event) are content-matched
//! back into the sanitized cells after the text is replaced.

use crate::cells::{join_cells, range_of, sanitize_cell, split_cells};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::host::{DocModel, Selection};
use crate::meta::{METADATA_ATTRIBUTE, TableMeta, resolve_meta};
use crate::ops::retag_cells;
use crate::render::reconstruct_segments;
use crate::styling::{SpanCache, StylingSpan, extract_spans, reapply_spans};

/// Rewrite one table line to canonical form.
///
/// The authoritative cell contents are chosen in order of trust: the model
/// text when its segment count matches the declared column count, the
/// rendered DOM cells when *they* match, and otherwise a merge/pad
/// reconstruction of the model segments. `caret_cell` places the caret at
/// the end of that cell afterwards; `None` leaves the selection to the
/// host's own transform.
pub fn canonicalize_line(
    cfg: &EngineConfig,
    spans: &mut SpanCache,
    host: &mut impl DocModel,
    line: usize,
    caret_cell: Option<usize>,
) -> Result<(), EngineError> {
    let meta = resolve_meta(host, line).ok_or(EngineError::NotATableLine { line })?;
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    let cols = meta.cols.max(1) as usize;

    let captured = staged_or_live_spans(cfg, spans, host, line, &meta);

    let model_cells = split_cells(&text);
    let source: Vec<String> = if model_cells.len() == cols {
        model_cells.iter().map(|c| c.to_string()).collect()
    } else if let Some(dom_cells) = dom_cells_if_matching(host, line, cols) {
        log::debug!(
            "line {line}: model has {} segments for {cols} columns, recovering from DOM",
            model_cells.len()
        );
        dom_cells
    } else {
        reconstruct_segments(cols, &model_cells)
    };

    let sanitized: Vec<String> = source.iter().map(|c| sanitize_cell(c)).collect();
    let canonical = join_cells(&sanitized);

    if canonical != text {
        host.replace_range(line, 0..text.chars().count(), &canonical)?;
    }
    retag_cells(host, line)?;

    for applied in reapply_spans(&captured, &sanitized) {
        for (name, value) in &applied.attribs {
            host.apply_range_attribute(line, applied.range.clone(), name, value)?;
        }
    }

    host.set_attribute(line, METADATA_ATTRIBUTE, &meta.encode())?;

    if let Some(cell) = caret_cell {
        let range = range_of(&sanitized, cell.min(cols - 1));
        host.set_selection(Selection::caret(line, range.end));
    }
    Ok(())
}

/// Replace one cell's content in place, touching the narrowest char range
/// that differs.
///
/// This is the composition-commit path: a full-line rewrite under an IME
/// yanks the native caret, so only the changed middle of the composed cell
/// is spliced. Fails with [`EngineError::StructureMismatch`] when the line
/// no longer has the expected cell, in which case the caller falls back to
/// [`canonicalize_line`].
pub fn commit_cell_text(
    host: &mut impl DocModel,
    line: usize,
    cell: usize,
    replacement: &str,
) -> Result<(), EngineError> {
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    let cells = split_cells(&text);
    if cell >= cells.len() {
        return Err(EngineError::StructureMismatch {
            expected: cell + 1,
            found: cells.len(),
        });
    }

    let sanitized = sanitize_cell(replacement);
    let old = cells[cell];
    if old == sanitized {
        return Ok(());
    }

    let (prefix, suffix) = minimal_diff(old, &sanitized);
    let range = range_of(&cells, cell);
    let old_len = old.chars().count();
    let middle: String = sanitized
        .chars()
        .skip(prefix)
        .take(sanitized.chars().count() - prefix - suffix)
        .collect();
    host.replace_range(
        line,
        range.start + prefix..range.start + old_len - suffix,
        &middle,
    )?;
    retag_cells(host, line)
}

/// Common char prefix and suffix lengths of two strings, non-overlapping.
fn minimal_diff(old: &str, new: &str) -> (usize, usize) {
    let old: Vec<char> = old.chars().collect();
    let new: Vec<char> = new.chars().collect();
    let max = old.len().min(new.len());

    let mut prefix = 0;
    while prefix < max && old[prefix] == new[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < max - prefix && old[old.len() - 1 - suffix] == new[new.len() - 1 - suffix] {
        suffix += 1;
    }
    (prefix, suffix)
}

/// Spans staged by an earlier event for this row, falling back to a live
/// capture from the line's current DOM.
fn staged_or_live_spans(
    cfg: &EngineConfig,
    spans: &mut SpanCache,
    host: &impl DocModel,
    line: usize,
    meta: &TableMeta,
) -> Vec<StylingSpan> {
    if let Some(staged) = spans.take(&meta.tbl_id, meta.row, cfg.styling_span_ttl()) {
        return staged;
    }
    host.dom_line(line).map(extract_spans).unwrap_or_default()
}

fn dom_cells_if_matching(host: &impl DocModel, line: usize, cols: usize) -> Option<Vec<String>> {
    let table = host.dom_line(line)?.table.as_ref()?;
    if table.cells.len() == cols {
        Some(table.cells.iter().map(|c| c.text()).collect())
    } else {
        None
    }
}
