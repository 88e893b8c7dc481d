//! Structural table operations: row/column insert and delete, table
//! creation, and the outward scan that finds every row of a table.
//!
//! Tables have no central registry; membership is the set of lines whose
//! metadata shares a `tblId`, discovered by scanning outward from an
//! interaction point. The scan is capped and terminates early after several
//! consecutive non-table lines per direction; tables are assumed contiguous.
//! That assumption is a performance heuristic, not a correctness guarantee,
//! and discontiguous tables beyond the miss limit will be missed.
//!
//! Target resolution uses the caret cache rather than the raw caret: a
//! toolbar-triggered command may fire after the caret has already left the
//! table.

use crate::cells::{EMPTY_CELL, join_cells, range_of, split_cells};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::host::{DocModel, Selection};
use crate::meta::{
    CELL_ATTRIBUTE, METADATA_ATTRIBUTE, TableMeta, equal_widths, fresh_table_id, renormalize,
    resolve_meta,
};
use crate::session::{CaretCache, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTarget {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSide {
    Left,
    Right,
}

/// Every line of the table containing `tbl_id`, found by bidirectional
/// bounded scan from `from_line`. Ascending line order.
pub fn scan_table(
    cfg: &EngineConfig,
    host: &impl DocModel,
    from_line: usize,
    tbl_id: &str,
) -> Vec<(usize, TableMeta)> {
    let mut rows = Vec::new();

    let matches = |line: usize| -> Option<TableMeta> {
        resolve_meta(host, line).filter(|meta| meta.tbl_id == tbl_id)
    };

    // Upward from the interaction point (exclusive).
    let mut misses = 0;
    for distance in 1..=cfg.scan_radius {
        let Some(line) = from_line.checked_sub(distance) else {
            break;
        };
        match matches(line) {
            Some(meta) => {
                misses = 0;
                rows.push((line, meta));
            }
            None => {
                misses += 1;
                if misses >= cfg.scan_miss_limit {
                    break;
                }
            }
        }
    }
    rows.reverse();

    if let Some(meta) = matches(from_line) {
        rows.push((from_line, meta));
    }

    let mut misses = 0;
    for distance in 1..=cfg.scan_radius {
        let line = from_line + distance;
        if line >= host.line_count() {
            break;
        }
        match matches(line) {
            Some(meta) => {
                misses = 0;
                rows.push((line, meta));
            }
            None => {
                misses += 1;
                if misses >= cfg.scan_miss_limit {
                    break;
                }
            }
        }
    }

    rows
}

/// Locate the line holding row `row` of the given table, scanning from
/// `near`.
pub fn find_row(
    cfg: &EngineConfig,
    host: &impl DocModel,
    near: usize,
    tbl_id: &str,
    row: u32,
) -> Option<usize> {
    scan_table(cfg, host, near, tbl_id)
        .into_iter()
        .find(|(_, meta)| meta.row == row)
        .map(|(line, _)| line)
}

/// Delimiter-joined blank row text for `cols` columns.
pub fn blank_row_text(cols: u32) -> String {
    join_cells(&vec![EMPTY_CELL; cols.max(1) as usize])
}

/// Strip every per-cell identity attribute from a line and reapply one per
/// current cell boundary. Any structural splice shifts offsets, after which
/// the old spans would overlap boundaries they no longer match.
pub fn retag_cells(host: &mut impl DocModel, line: usize) -> Result<(), EngineError> {
    let text = host
        .line_text(line)
        .ok_or(EngineError::LineOutOfRange { line })?;
    host.strip_range_attribute(line, CELL_ATTRIBUTE)?;
    let cells = split_cells(&text);
    for index in 0..cells.len() {
        let range = range_of(&cells, index);
        host.apply_range_attribute(line, range, CELL_ATTRIBUTE, &index.to_string())?;
    }
    Ok(())
}

/// Rewrite every scanned row's `row` index to its ordinal position within
/// the table. Idempotent; called after any line-level insert or delete.
fn renumber_rows(
    cfg: &EngineConfig,
    host: &mut impl DocModel,
    near: usize,
    tbl_id: &str,
) -> Result<(), EngineError> {
    let rows = scan_table(cfg, host, near, tbl_id);
    for (ordinal, (line, meta)) in rows.into_iter().enumerate() {
        if meta.row as usize != ordinal {
            let renumbered = TableMeta {
                row: ordinal as u32,
                ..meta
            };
            host.set_attribute(line, METADATA_ATTRIBUTE, &renumbered.encode())?;
        }
    }
    Ok(())
}

fn caret_target(
    session: &mut Session,
    host: &impl DocModel,
) -> Result<(CaretCache, TableMeta), EngineError> {
    session.validated_caret(host).ok_or(EngineError::NotATableLine {
        line: host.selection().start.line,
    })
}

/// Insert a blank row above or below the last-focused row. Returns the new
/// line index.
pub fn insert_row(
    cfg: &EngineConfig,
    session: &mut Session,
    host: &mut impl DocModel,
    target: RowTarget,
) -> Result<usize, EngineError> {
    let (cache, meta) = caret_target(session, host)?;
    let new_line = match target {
        RowTarget::Above => cache.line,
        RowTarget::Below => cache.line + 1,
    };

    host.insert_line(new_line, &blank_row_text(meta.cols))?;
    let new_meta = TableMeta {
        tbl_id: meta.tbl_id.clone(),
        row: meta.row, // corrected by renumbering below
        cols: meta.cols,
        column_widths: meta.column_widths.clone(),
    };
    host.set_attribute(new_line, METADATA_ATTRIBUTE, &new_meta.encode())?;
    retag_cells(host, new_line)?;
    renumber_rows(cfg, host, new_line, &meta.tbl_id)?;

    // The focused cell is unchanged but its line may have shifted.
    if target == RowTarget::Above {
        session.remember_caret(CaretCache {
            line: cache.line + 1,
            ..cache
        });
    }
    Ok(new_line)
}

/// Delete the last-focused row.
///
/// Row 0 is special-cased by inserting a blank line first and deleting the
/// old line second: if this was the table's only row, the document never
/// passes through a zero-line state the host would reject.
pub fn delete_row(
    cfg: &EngineConfig,
    session: &mut Session,
    host: &mut impl DocModel,
) -> Result<(), EngineError> {
    let (cache, meta) = caret_target(session, host)?;

    if meta.row == 0 {
        host.insert_line(cache.line, "")?;
        host.delete_line(cache.line + 1)?;
    } else {
        host.delete_line(cache.line)?;
    }
    renumber_rows(cfg, host, cache.line, &meta.tbl_id)?;
    session.invalidate_caret();
    Ok(())
}

/// Insert a blank column left or right of the last-focused cell.
///
/// Metadata for every row is rewritten to the new column count (and a fresh
/// equal width split) *before* any row's text is touched: no intermediate
/// state ever has a row claiming the new count while its text still holds
/// the old delimiter count.
pub fn insert_column(
    cfg: &EngineConfig,
    session: &mut Session,
    host: &mut impl DocModel,
    side: ColumnSide,
) -> Result<(), EngineError> {
    let (cache, meta) = caret_target(session, host)?;
    let rows = scan_table(cfg, host, cache.line, &meta.tbl_id);
    if rows.is_empty() {
        return Err(EngineError::NotATableLine { line: cache.line });
    }

    let new_cols = meta.cols + 1;
    let widths = equal_widths(new_cols as usize);

    for (line, row_meta) in &rows {
        let updated = TableMeta {
            tbl_id: row_meta.tbl_id.clone(),
            row: row_meta.row,
            cols: new_cols,
            column_widths: Some(widths.clone()),
        };
        host.set_attribute(*line, METADATA_ATTRIBUTE, &updated.encode())?;
    }

    for (line, _) in &rows {
        let text = host
            .line_text(*line)
            .ok_or(EngineError::LineOutOfRange { line: *line })?;
        let cells = split_cells(&text);
        let at = cache.cell.min(cells.len() - 1);
        let range = range_of(&cells, at);
        let (offset, blank) = match side {
            ColumnSide::Left => (range.start, format!("{EMPTY_CELL}\u{001F}")),
            ColumnSide::Right => (range.end, format!("\u{001F}{EMPTY_CELL}")),
        };
        host.replace_range(*line, offset..offset, &blank)?;
        retag_cells(host, *line)?;
    }

    // Inserting to the left shifts the focused cell's content one column
    // right.
    let focused_cell = match side {
        ColumnSide::Left => cache.cell + 1,
        ColumnSide::Right => cache.cell,
    };
    session.remember_caret(CaretCache {
        cell: focused_cell,
        ..cache
    });
    Ok(())
}

/// Delete the last-focused column. Refuses to delete the last remaining one.
pub fn delete_column(
    cfg: &EngineConfig,
    session: &mut Session,
    host: &mut impl DocModel,
) -> Result<(), EngineError> {
    let (cache, meta) = caret_target(session, host)?;
    if meta.cols <= 1 {
        return Err(EngineError::LastColumn);
    }
    let rows = scan_table(cfg, host, cache.line, &meta.tbl_id);
    if rows.is_empty() {
        return Err(EngineError::NotATableLine { line: cache.line });
    }

    let removed = cache.cell.min(meta.cols as usize - 1);
    let new_cols = meta.cols - 1;
    let mut widths = meta.normalized_widths();
    widths.remove(removed);
    renormalize(&mut widths);

    for (line, row_meta) in &rows {
        let updated = TableMeta {
            tbl_id: row_meta.tbl_id.clone(),
            row: row_meta.row,
            cols: new_cols,
            column_widths: Some(widths.clone()),
        };
        host.set_attribute(*line, METADATA_ATTRIBUTE, &updated.encode())?;
    }

    for (line, _) in &rows {
        let text = host
            .line_text(*line)
            .ok_or(EngineError::LineOutOfRange { line: *line })?;
        let cells = split_cells(&text);
        if cells.len() <= 1 {
            // Malformed single-segment row: nothing to splice out.
            continue;
        }
        let at = removed.min(cells.len() - 1);
        let range = range_of(&cells, at);
        // Splice out the cell plus one adjacent delimiter.
        let splice = if at == 0 {
            range.start..range.end + 1
        } else {
            range.start - 1..range.end
        };
        host.replace_range(*line, splice, "")?;
        retag_cells(host, *line)?;
    }

    session.remember_caret(CaretCache {
        cell: removed.min(new_cols as usize - 1),
        rel: 0,
        ..cache
    });
    Ok(())
}

/// Create a fresh `rows` × `cols` table below the caret line. Returns the
/// new table's id.
pub fn create_table(
    session: &mut Session,
    host: &mut impl DocModel,
    rows: u32,
    cols: u32,
) -> Result<String, EngineError> {
    let rows = rows.max(1);
    let cols = cols.max(1);
    let tbl_id = fresh_table_id();
    let caret_line = host.selection().start.line.min(host.line_count().saturating_sub(1));
    let first_line = caret_line + 1;

    for row in 0..rows {
        let line = first_line + row as usize;
        host.insert_line(line, &blank_row_text(cols))?;
        let meta = TableMeta::new(tbl_id.clone(), row, cols);
        host.set_attribute(line, METADATA_ATTRIBUTE, &meta.encode())?;
        retag_cells(host, line)?;
    }

    // Focus the end of the first cell's placeholder.
    host.set_selection(Selection::caret(first_line, 1));
    session.remember_caret(CaretCache {
        line: first_line,
        tbl_id: tbl_id.clone(),
        cell: 0,
        rel: 1,
    });
    Ok(tbl_id)
}
