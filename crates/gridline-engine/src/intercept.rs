//! The edit interceptor: every input event is classified against table
//! structure before the host editor may apply it.
//!
//! Decisions form a priority chain, first match wins. `Block` means the host
//! must cancel its default handling and do nothing; `Handled` means the
//! engine already applied the edit itself (host cancels too); `Pass` means
//! the edit is structurally harmless and proceeds natively.
//!
//! The delimiter invariant is enforced here, not repaired later: a keystroke
//! that would merge two cells or two lines is refused outright, and any
//! replacement text the engine applies itself goes through the sanitizer
//! first.

use std::ops::Range;

use crate::cells::{
    CELL_DELIMITER, EMPTY_CELL, clamp_to_cell, is_canonical, locate, range_of, sanitize_cell,
    split_cells,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::host::{DocModel, Selection};
use crate::meta::{METADATA_ATTRIBUTE, TableMeta, resolve_meta};
use crate::ops::{self, RowTarget, retag_cells};
use crate::rewrite::{canonicalize_line, commit_cell_text};
use crate::session::{CaretCache, CompositionSnapshot, DeferredTask, Session};
use crate::styling::{SpanCache, extract_spans};

/// Why an edit was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// A multi-line selection touched at least one table line.
    MultilineSelection,
    /// The edit would consume a cell delimiter or a line boundary.
    DelimiterBoundary,
    /// The selection spans more than one cell and cannot be clamped.
    CrossCellSelection,
    /// An incremental notification arrived mid-composition and is suppressed.
    CompositionInProgress,
}

/// Outcome of interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Structurally harmless; the host applies the edit natively.
    Pass,
    /// The host must cancel its default handling.
    Block(BlockReason),
    /// The engine applied the edit itself; the host must cancel its own.
    Handled,
}

/// Classify one key press against the current selection and table structure.
pub fn intercept_key(
    cfg: &EngineConfig,
    session: &mut Session,
    host: &mut impl DocModel,
    input: crate::events::KeyInput,
) -> Result<Decision, EngineError> {
    use crate::events::Key;

    if input.ctrl_or_meta {
        return Ok(Decision::Pass);
    }
    if input.key.is_navigation() {
        // Trusting cached cell context across a real caret move is how stale
        // boundary decisions happen.
        session.invalidate_caret();
        return Ok(Decision::Pass);
    }

    let (lo, hi) = host.selection().ordered();
    if lo.line != hi.line {
        let touches_table = (lo.line..=hi.line).any(|l| resolve_meta(host, l).is_some());
        return Ok(if touches_table {
            Decision::Block(BlockReason::MultilineSelection)
        } else {
            Decision::Pass
        });
    }

    let line = lo.line;
    let Some(meta) = resolve_meta(host, line) else {
        return Ok(Decision::Pass);
    };
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;

    // In-cell selection plus a replacing key: the engine applies the edit
    // itself, scoped to one cell.
    if lo.ch != hi.ch {
        let replacement = match input.key {
            Key::Backspace | Key::Delete => Some(String::new()),
            Key::Char(c) => input.key.printable().map(|_| c.to_string()),
            _ => None,
        };
        if let Some(replacement) = replacement {
            return match clamp_to_cell(&text, lo.ch, hi.ch) {
                None => Ok(Decision::Block(BlockReason::CrossCellSelection)),
                Some((cell, range)) => {
                    let clean = if replacement.is_empty() {
                        replacement
                    } else {
                        sanitize_cell(&replacement)
                    };
                    scoped_replace(session, host, &meta, line, cell, range, &clean)?;
                    Ok(Decision::Handled)
                }
            };
        }
    }

    match input.key {
        Key::Backspace | Key::Delete => {
            let chars: Vec<char> = text.chars().collect();
            let blocked = match input.key {
                Key::Delete => {
                    lo.ch >= chars.len() || chars[lo.ch] == CELL_DELIMITER
                }
                _ => lo.ch == 0 || chars[lo.ch - 1] == CELL_DELIMITER,
            };
            Ok(if blocked {
                Decision::Block(BlockReason::DelimiterBoundary)
            } else {
                Decision::Pass
            })
        }
        Key::Tab => tab_navigate(cfg, session, host, &meta, line, lo.ch, input.shift),
        Key::Enter => enter_navigate(cfg, session, host, &meta, line, lo.ch),
        Key::Char(_) => {
            if input.key.printable().is_none() {
                return Ok(Decision::Pass);
            }
            if session.profile.reliable_before_change() {
                // The structured before-change notification will carry this
                // insert with usable coordinates.
                return Ok(Decision::Pass);
            }
            let cell = effective_cell(session, line, &text, lo.ch);
            // A caret parked on a delimiter reports the raw offset, which
            // sits outside the resolved cell; clamp the splice into it so the
            // character lands where the resolver says it belongs.
            let range = range_of(&split_cells(&text), cell);
            let at = lo.ch.clamp(range.start, range.end);
            let c = input.key.printable().unwrap_or(' ');
            scoped_replace(
                session,
                host,
                &meta,
                line,
                cell,
                at..at,
                &sanitize_cell(&c.to_string()),
            )?;
            Ok(Decision::Handled)
        }
        _ => Ok(Decision::Pass),
    }
}

/// Structured "about to replace this range with this text" notification.
///
/// The one channel through which native edits (autocorrect, predictive text,
/// some paste paths) arrive with coordinates. Reported coordinates are
/// checked against the model and the result feeds the input profile.
pub fn before_change(
    cfg: &EngineConfig,
    session: &mut Session,
    spans: &mut SpanCache,
    host: &mut impl DocModel,
    line: usize,
    range: Range<usize>,
    replacement: &str,
) -> Result<Decision, EngineError> {
    if session.is_composing() {
        return Ok(Decision::Block(BlockReason::CompositionInProgress));
    }
    let Some(meta) = resolve_meta(host, line) else {
        return Ok(Decision::Pass);
    };
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    let len = text.chars().count();

    let accurate = range.start <= range.end && range.end <= len;
    session.profile.observe_before_change(accurate);
    if !accurate {
        // Coordinates cannot be trusted; let the line settle and drive it
        // back to canonical form instead of splicing blind.
        log::debug!(
            "line {line}: before-change range {range:?} exceeds length {len}, canonicalizing"
        );
        stage_spans(spans, host, &meta, line);
        canonicalize_line(cfg, spans, host, line, None)?;
        return Ok(Decision::Handled);
    }

    let Some((cell, clamped)) = clamp_to_cell(&text, range.start, range.end) else {
        return Ok(Decision::Block(BlockReason::CrossCellSelection));
    };

    let clean = if replacement.is_empty() {
        String::new()
    } else {
        sanitize_cell(replacement)
    };
    if clean == replacement && clamped == range && is_canonical(&text, meta.cols.max(1) as usize) {
        // Structurally harmless as reported and the line is at rest; native
        // handling is cheaper.
        return Ok(Decision::Pass);
    }

    stage_spans(spans, host, &meta, line);
    scoped_replace(session, host, &meta, line, cell, clamped, &clean)?;
    Ok(Decision::Handled)
}

/// Clipboard paste (and drag-and-drop text, which shares its semantics).
pub fn paste(
    session: &mut Session,
    host: &mut impl DocModel,
    pasted: &str,
) -> Result<Decision, EngineError> {
    let (lo, hi) = host.selection().ordered();
    if lo.line != hi.line {
        let touches_table = (lo.line..=hi.line).any(|l| resolve_meta(host, l).is_some());
        return Ok(if touches_table {
            Decision::Block(BlockReason::MultilineSelection)
        } else {
            Decision::Pass
        });
    }
    let line = lo.line;
    let Some(meta) = resolve_meta(host, line) else {
        return Ok(Decision::Pass);
    };
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;

    let Some((cell, range)) = clamp_to_cell(&text, lo.ch, hi.ch) else {
        return Ok(Decision::Block(BlockReason::CrossCellSelection));
    };
    scoped_replace(session, host, &meta, line, cell, range, &sanitize_cell(pasted))?;
    Ok(Decision::Handled)
}

/// Cut: allowed only when the selection sits fully inside one cell, in which
/// case native handling (which also populates the clipboard) proceeds.
pub fn cut(host: &impl DocModel) -> Result<Decision, EngineError> {
    let (lo, hi) = host.selection().ordered();
    if lo.line != hi.line {
        let touches_table = (lo.line..=hi.line).any(|l| resolve_meta(host, l).is_some());
        return Ok(if touches_table {
            Decision::Block(BlockReason::MultilineSelection)
        } else {
            Decision::Pass
        });
    }
    let line = lo.line;
    if resolve_meta(host, line).is_none() {
        return Ok(Decision::Pass);
    }
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    match clamp_to_cell(&text, lo.ch, hi.ch) {
        Some((_, range)) if range == (lo.ch..hi.ch) => Ok(Decision::Pass),
        _ => Ok(Decision::Block(BlockReason::CrossCellSelection)),
    }
}

/// Pointer press placed the caret: refresh (or clear) the caret cache.
pub fn pointer_down(session: &mut Session, host: &impl DocModel, line: usize, ch: usize) {
    match resolve_meta(host, line) {
        Some(meta) => {
            let Some(text) = host.line_text(line) else {
                return;
            };
            let hit = locate(&text, ch);
            session.remember_caret(CaretCache {
                line,
                tbl_id: meta.tbl_id,
                cell: hit.cell,
                rel: hit.rel,
            });
        }
        None => session.invalidate_caret(),
    }
}

/// Composition opened: snapshot the cell so the post-commit reconciliation
/// can recognize orphaned duplicates of it later.
pub fn composition_start(session: &mut Session, host: &impl DocModel) {
    let caret = host.selection().start;
    let Some(meta) = resolve_meta(host, caret.line) else {
        return;
    };
    let Some(text) = host.line_text(caret.line) else {
        return;
    };
    let cell = effective_cell(session, caret.line, &text, caret.ch);
    let cells = split_cells(&text);
    session.begin_composition(CompositionSnapshot {
        line: caret.line,
        tbl_id: meta.tbl_id,
        row: meta.row,
        cell,
        cell_text: cells.get(cell).map(|c| c.to_string()).unwrap_or_default(),
    });
}

/// Composition committed.
///
/// Incremental notifications were suppressed for the whole composition, so
/// the committed string may or may not have reached the model: pipelines that
/// mutate the line natively leave it there, pipelines that respect the
/// cancellation never applied it. Either way the composed cell ends up
/// holding the committed text, spliced with the narrowest possible range (a
/// full-line rewrite here yanks the native caret), and the orphan-line
/// reconciliation pass is scheduled. A commit with no open composition is the
/// duplicate-commit signature some pipelines produce and is ignored.
pub fn composition_end(
    cfg: &EngineConfig,
    session: &mut Session,
    spans: &mut SpanCache,
    host: &mut impl DocModel,
    committed: &str,
) -> Result<Decision, EngineError> {
    session.profile.observe_composition_commit(committed);
    let Some(snapshot) = session.end_composition() else {
        log::debug!("ignoring composition commit with no open composition");
        return Ok(Decision::Block(BlockReason::CompositionInProgress));
    };

    // The line may have shifted while composing; re-locate the row.
    let line = if resolve_meta(host, snapshot.line)
        .is_some_and(|m| m.tbl_id == snapshot.tbl_id && m.row == snapshot.row)
    {
        snapshot.line
    } else {
        match ops::find_row(cfg, host, snapshot.line, &snapshot.tbl_id, snapshot.row) {
            Some(line) => line,
            None => {
                session.schedule(DeferredTask::Reconcile {
                    snapshot,
                    delay_ms: cfg.reconcile_delay_ms,
                });
                return Ok(Decision::Handled);
            }
        }
    };

    if let Some(text) = host.line_text(line) {
        let cells = split_cells(&text);
        if let Some(current) = cells.get(snapshot.cell).map(|c| c.to_string()) {
            let target = if committed.is_empty() || current.contains(committed) {
                current
            } else {
                // The host honored the mid-composition cancellations and
                // never applied the committed string itself: splice it in at
                // the cached caret position, or at the cell end without one.
                let len = current.chars().count();
                let rel = session
                    .caret_cache()
                    .filter(|c| c.line == line && c.cell == snapshot.cell)
                    .map_or(len, |c| c.rel.min(len));
                let mut merged: String = current.chars().take(rel).collect();
                merged.push_str(committed);
                merged.extend(current.chars().skip(rel));
                merged
            };
            if commit_cell_text(host, line, snapshot.cell, &target).is_err() {
                canonicalize_line(cfg, spans, host, line, Some(snapshot.cell))?;
            }
        }
    }

    session.schedule(DeferredTask::Reconcile {
        snapshot,
        delay_ms: cfg.reconcile_delay_ms,
    });
    Ok(Decision::Handled)
}

/// The cell an offset belongs to for editing purposes.
///
/// [`locate`] right-associates an offset sitting exactly on a delimiter to
/// the following cell, which is the correct reading for boundary *blocking*
/// but the wrong one for a caret parked at the end of a cell the user was
/// just editing. The caret cache, when it agrees with the offset, carries
/// that prior context and wins.
fn effective_cell(session: &Session, line: usize, text: &str, ch: usize) -> usize {
    if let Some(cache) = session.caret_cache()
        && cache.line == line
    {
        let cells = split_cells(text);
        if cache.cell < cells.len() {
            let range = range_of(&cells, cache.cell);
            if ch >= range.start && ch <= range.end {
                return cache.cell;
            }
        }
    }
    locate(text, ch).cell
}

/// Stash a live styling capture for an imminent rewrite of this row.
fn stage_spans(spans: &mut SpanCache, host: &impl DocModel, meta: &TableMeta, line: usize) {
    if let Some(dom) = host.dom_line(line) {
        let captured = extract_spans(dom);
        if !captured.is_empty() {
            spans.insert(&meta.tbl_id, meta.row, captured);
        }
    }
}

/// Replace a char range inside one cell, restore the placeholder if the cell
/// emptied, re-tag identities, re-assert metadata, and leave the caret after
/// the replacement.
fn scoped_replace(
    session: &mut Session,
    host: &mut impl DocModel,
    meta: &TableMeta,
    line: usize,
    cell: usize,
    range: Range<usize>,
    replacement: &str,
) -> Result<(), EngineError> {
    host.replace_range(line, range.clone(), replacement)?;
    let mut caret = range.start + replacement.chars().count();

    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    let cells = split_cells(&text);
    if cells.get(cell).is_some_and(|c| c.is_empty()) {
        let start = range_of(&cells, cell).start;
        host.replace_range(line, start..start, EMPTY_CELL)?;
        caret = start + 1;
    }

    retag_cells(host, line)?;
    host.set_attribute(line, METADATA_ATTRIBUTE, &meta.encode())?;
    host.set_selection(Selection::caret(line, caret));

    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    let cells = split_cells(&text);
    let rel = caret.saturating_sub(range_of(&cells, cell).start);
    session.remember_caret(CaretCache {
        line,
        tbl_id: meta.tbl_id.clone(),
        cell,
        rel,
    });
    Ok(())
}

/// Tab / Shift+Tab cell navigation, wrapping across rows. Tab past the last
/// cell of the last row appends a fresh row.
fn tab_navigate(
    cfg: &EngineConfig,
    session: &mut Session,
    host: &mut impl DocModel,
    meta: &TableMeta,
    line: usize,
    ch: usize,
    backwards: bool,
) -> Result<Decision, EngineError> {
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    let cell = effective_cell(session, line, &text, ch);
    let cols = meta.cols as usize;

    if backwards {
        if cell > 0 {
            focus_cell_end(session, host, meta, line, cell - 1)?;
        } else if meta.row > 0 {
            if let Some(prev) = ops::find_row(cfg, host, line, &meta.tbl_id, meta.row - 1) {
                focus_cell_end(session, host, meta, prev, cols - 1)?;
            }
        }
        // First cell of the first row: nowhere to go, swallow the key.
        return Ok(Decision::Handled);
    }

    if cell + 1 < cols {
        focus_cell_end(session, host, meta, line, cell + 1)?;
        return Ok(Decision::Handled);
    }
    match ops::find_row(cfg, host, line, &meta.tbl_id, meta.row + 1) {
        Some(next) => focus_cell_end(session, host, meta, next, 0)?,
        None => {
            session.remember_caret(CaretCache {
                line,
                tbl_id: meta.tbl_id.clone(),
                cell,
                rel: 0,
            });
            let new_line = ops::insert_row(cfg, session, host, RowTarget::Below)?;
            focus_cell_end(session, host, meta, new_line, 0)?;
        }
    }
    Ok(Decision::Handled)
}

/// Enter: same column one row below; at the last row, insert a plain line
/// after the table and leave it. That is the designed exit.
fn enter_navigate(
    cfg: &EngineConfig,
    session: &mut Session,
    host: &mut impl DocModel,
    meta: &TableMeta,
    line: usize,
    ch: usize,
) -> Result<Decision, EngineError> {
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    let cell = effective_cell(session, line, &text, ch);

    match ops::find_row(cfg, host, line, &meta.tbl_id, meta.row + 1) {
        Some(next) => focus_cell_end(session, host, meta, next, cell)?,
        None => {
            let last = ops::scan_table(cfg, host, line, &meta.tbl_id)
                .last()
                .map(|(l, _)| *l)
                .unwrap_or(line);
            host.insert_line(last + 1, "")?;
            host.set_selection(Selection::caret(last + 1, 0));
            session.invalidate_caret();
        }
    }
    Ok(Decision::Handled)
}

fn focus_cell_end(
    session: &mut Session,
    host: &mut impl DocModel,
    meta: &TableMeta,
    line: usize,
    cell: usize,
) -> Result<(), EngineError> {
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    let cells = split_cells(&text);
    let cell = cell.min(cells.len() - 1);
    let range = range_of(&cells, cell);
    host.set_selection(Selection::caret(line, range.end));
    session.remember_caret(CaretCache {
        line,
        tbl_id: meta.tbl_id.clone(),
        cell,
        rel: range.end - range.start,
    });
    Ok(())
}
