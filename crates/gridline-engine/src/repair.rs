//! Post-composition reconciliation: detecting and removing orphaned
//! duplicate lines.
//!
//! Some composition pipelines commit by inserting a fresh line instead of
//! mutating the composed one, leaving two lines claiming the same table row.
//! The scheduled reconciliation pass finds every claimant, picks the one the
//! DOM actually renders as primary, folds any novel orphan content into it,
//! and deletes the orphans bottom-up, but only when every check agrees.
//! Ambiguity is always resolved by doing nothing: a visible duplicate is
//! recoverable by the user, a silently deleted line is not.
//!
//! Repeated host node-index failures latch the session into safe mode, after
//! which this pass refuses all deletions for the rest of the session.

use crate::cells::split_cells;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::host::DocModel;
use crate::meta::resolve_meta;
use crate::rewrite::{canonicalize_line, commit_cell_text};
use crate::session::{CompositionSnapshot, Session};
use crate::styling::SpanCache;

/// What the reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// One claimant (or none); nothing to repair.
    Clean,
    /// Orphans were handled; `orphans_removed` counts deletions (an orphan
    /// failing its final re-validation is merged but left in place).
    Merged { orphans_removed: usize },
    /// Zero or multiple primary candidates; no destructive action taken.
    SkippedAmbiguous,
    /// The session is latched into safe mode; deletions are refused.
    SkippedSafeMode,
}

/// Run the scheduled post-composition reconciliation for one table row.
///
/// Never returns an error: every failure degrades to a skip, and host index
/// failures are counted on the session health instead.
pub fn reconcile_after_composition(
    cfg: &EngineConfig,
    session: &mut Session,
    spans: &mut SpanCache,
    host: &mut impl DocModel,
    snapshot: &CompositionSnapshot,
) -> RepairOutcome {
    session.profile.composition_settled();
    let outcome = reconcile_inner(cfg, session, spans, host, snapshot);
    session.reconciliation_done();
    outcome
}

fn reconcile_inner(
    cfg: &EngineConfig,
    session: &mut Session,
    spans: &mut SpanCache,
    host: &mut impl DocModel,
    snapshot: &CompositionSnapshot,
) -> RepairOutcome {
    if !session.health().allows_destructive() {
        log::debug!("reconciliation skipped: session is in safe mode");
        return RepairOutcome::SkippedSafeMode;
    }

    let claimants = find_claimants(cfg, host, snapshot);
    if claimants.len() <= 1 {
        return RepairOutcome::Clean;
    }

    // The primary is the line whose DOM actually renders this table row.
    let primaries: Vec<usize> = claimants
        .iter()
        .copied()
        .filter(|&line| {
            host.dom_line(line)
                .is_some_and(|dom| dom.renders_row(&snapshot.tbl_id, snapshot.row))
        })
        .collect();

    let missing_dom: Vec<usize> = claimants
        .iter()
        .copied()
        .filter(|&line| host.dom_line(line).is_none())
        .collect();
    if !missing_dom.is_empty() {
        // A table line with no DOM node is the host node-index desync
        // signature.
        for &line in &missing_dom {
            log::warn!("{}", EngineError::HostIndexDesync { line });
        }
        session.record_desync_error(cfg.max_desync_errors);
        if !session.health().allows_destructive() {
            return RepairOutcome::SkippedSafeMode;
        }
    }

    let [primary] = primaries[..] else {
        log::warn!(
            "reconciliation for ({}, {}) found {} rendered claimants of {}, skipping",
            snapshot.tbl_id,
            snapshot.row,
            primaries.len(),
            claimants.len()
        );
        return RepairOutcome::SkippedAmbiguous;
    };

    let mut primary = primary;
    let mut orphans: Vec<usize> = claimants.into_iter().filter(|&l| l != primary).collect();

    // Bottom-up so earlier deletions cannot shift later targets. Each orphan
    // is re-validated immediately before removal; one that fails is neither
    // merged nor deleted, since its content may be someone else's.
    orphans.sort_unstable();
    let mut removed = 0;
    for orphan in orphans.into_iter().rev() {
        if !validate_orphan(cfg, host, orphan, snapshot) {
            log::warn!("orphan line {orphan} failed re-validation, leaving it in place");
            continue;
        }
        if let Err(err) = merge_orphan_cell(host, primary, orphan, snapshot.cell) {
            log::warn!("failed to merge orphan line {orphan}: {err}");
            continue;
        }
        match host.delete_line(orphan) {
            Ok(()) => {
                removed += 1;
                if orphan < primary {
                    primary -= 1;
                }
            }
            Err(err) => {
                log::warn!("deleting orphan line {orphan} failed: {err}");
                session.record_desync_error(cfg.max_desync_errors);
            }
        }
    }

    // The primary may now hold merged, unsanitized content.
    if let Some(line) = find_primary_after_deletes(cfg, host, snapshot)
        && let Err(err) = canonicalize_line(cfg, spans, host, line, None)
    {
        log::warn!("post-repair canonicalization failed: {err}");
    }

    RepairOutcome::Merged {
        orphans_removed: removed,
    }
}

/// Every line within the scan radius claiming this table row, by attribute
/// or by rendered DOM.
fn find_claimants(
    cfg: &EngineConfig,
    host: &impl DocModel,
    snapshot: &CompositionSnapshot,
) -> Vec<usize> {
    let lo = snapshot.line.saturating_sub(cfg.scan_radius);
    let hi = (snapshot.line + cfg.scan_radius).min(host.line_count().saturating_sub(1));

    (lo..=hi)
        .filter(|&line| {
            let by_attr = resolve_meta(host, line)
                .is_some_and(|m| m.tbl_id == snapshot.tbl_id && m.row == snapshot.row);
            let by_dom = host
                .dom_line(line)
                .is_some_and(|dom| dom.renders_row(&snapshot.tbl_id, snapshot.row));
            by_attr || by_dom
        })
        .collect()
}

/// Append the orphan's composed-cell content to the primary's cell when the
/// primary does not already contain it.
fn merge_orphan_cell(
    host: &mut impl DocModel,
    primary: usize,
    orphan: usize,
    cell: usize,
) -> Result<(), EngineError> {
    let orphan_text = host
        .line_text(orphan)
        .ok_or(EngineError::LineOutOfRange { line: orphan })?;
    let orphan_cells = split_cells(&orphan_text);
    let fragment = orphan_cells.get(cell).copied().unwrap_or("").trim().to_string();
    if fragment.is_empty() {
        return Ok(());
    }

    let primary_text = host
        .line_text(primary)
        .ok_or(EngineError::LineOutOfRange { line: primary })?;
    let primary_cells = split_cells(&primary_text);
    let current = primary_cells.get(cell).copied().unwrap_or("");
    if current.contains(&fragment) {
        return Ok(());
    }

    let merged = format!("{} {}", current.trim_end(), fragment);
    commit_cell_text(host, primary, cell, &merged)
}

/// Final pre-deletion check: the line still claims the snapshot's row and its
/// composed cell is length-similar to what was being composed. A line that
/// drifted too far is someone else's content.
fn validate_orphan(
    cfg: &EngineConfig,
    host: &impl DocModel,
    line: usize,
    snapshot: &CompositionSnapshot,
) -> bool {
    let claims_row = resolve_meta(host, line)
        .is_some_and(|m| m.tbl_id == snapshot.tbl_id && m.row == snapshot.row);
    if !claims_row {
        return false;
    }
    let Some(text) = host.line_text(line) else {
        return false;
    };
    let cells = split_cells(&text);
    let cell_text = cells.get(snapshot.cell).copied().unwrap_or("");
    length_similarity(cell_text.trim(), snapshot.cell_text.trim()) >= cfg.similarity_threshold
}

fn find_primary_after_deletes(
    cfg: &EngineConfig,
    host: &impl DocModel,
    snapshot: &CompositionSnapshot,
) -> Option<usize> {
    find_claimants(cfg, host, snapshot).into_iter().find(|&line| {
        resolve_meta(host, line)
            .is_some_and(|m| m.tbl_id == snapshot.tbl_id && m.row == snapshot.row)
    })
}

/// Ratio of the shorter char length to the longer, in `0.0..=1.0`.
fn length_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (a.chars().count(), b.chars().count());
    if a == 0 && b == 0 {
        return 1.0;
    }
    a.min(b) as f64 / a.max(b) as f64
}
