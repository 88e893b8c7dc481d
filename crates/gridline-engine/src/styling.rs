//! Best-effort preservation of character styling across canonical rewrites.
//!
//! A full-line rewrite replaces the text and would silently discard any
//! bold/font/image attributes the author applied. Immediately before the
//! rewrite we capture styled runs from the live DOM; afterwards we match
//! each captured span back into the new cell texts by content search, since
//! absolute offsets have shifted.
//!
//! This is lossy by design: a span whose text no longer exists anywhere is
//! dropped, and a styled substring duplicated within a cell is resolved by
//! proximity to the cell end. A guess, but a deterministic one.

use std::collections::HashMap;
use std::ops::Range;
use std::time::{Duration, Instant};

use crate::cells::range_of;
use crate::host::DomLine;

/// One styled run captured from the DOM before a rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct StylingSpan {
    /// Cell the run was captured from.
    pub cell: usize,
    /// Char offset of the run within its cell at capture time.
    pub rel_start: usize,
    /// Distance from the cell's end at capture time; drives the duplicate
    /// disambiguation heuristic.
    pub from_end: usize,
    /// The run's text, used as the search needle.
    pub text: String,
    pub attribs: Vec<(String, String)>,
}

/// A span matched back into the rewritten line: an absolute char range plus
/// the attributes to reapply there.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedSpan {
    pub cell: usize,
    pub range: Range<usize>,
    pub attribs: Vec<(String, String)>,
}

/// Capture every styled run of a rendered table line.
pub fn extract_spans(dom: &DomLine) -> Vec<StylingSpan> {
    let Some(table) = dom.table.as_ref() else {
        return Vec::new();
    };

    let mut spans = Vec::new();
    for (cell_index, cell) in table.cells.iter().enumerate() {
        let cell_len: usize = cell.runs.iter().map(|r| r.text.chars().count()).sum();
        let mut rel = 0;
        for run in &cell.runs {
            let run_len = run.text.chars().count();
            if !run.attribs.is_empty() && run_len > 0 {
                spans.push(StylingSpan {
                    cell: cell_index,
                    rel_start: rel,
                    from_end: cell_len - (rel + run_len),
                    text: run.text.clone(),
                    attribs: run.attribs.clone(),
                });
            }
            rel += run_len;
        }
    }
    spans
}

/// Match captured spans back into the rewritten cell texts.
///
/// Per span, in order: exact substring match within the originating cell,
/// case-insensitive match within the originating cell, exact match in any
/// other cell, then give up on that span. Multiple occurrences resolve to
/// the one whose distance from the cell end is closest to the captured
/// distance.
pub fn reapply_spans(spans: &[StylingSpan], new_cells: &[String]) -> Vec<AppliedSpan> {
    let mut applied = Vec::new();

    for span in spans {
        let needle: Vec<char> = span.text.chars().collect();
        if needle.is_empty() {
            continue;
        }

        let matched = match_in_cell(span, &needle, new_cells, span.cell, false)
            .or_else(|| match_in_cell(span, &needle, new_cells, span.cell, true))
            .or_else(|| {
                (0..new_cells.len())
                    .filter(|&c| c != span.cell)
                    .find_map(|c| match_in_cell(span, &needle, new_cells, c, false))
            });

        match matched {
            Some(hit) => applied.push(hit),
            None => {
                log::debug!(
                    "dropping styling span {:?}: no content match after rewrite",
                    span.text
                );
            }
        }
    }

    applied
}

fn match_in_cell(
    span: &StylingSpan,
    needle: &[char],
    new_cells: &[String],
    cell: usize,
    case_insensitive: bool,
) -> Option<AppliedSpan> {
    let cell_text = new_cells.get(cell)?;
    let haystack: Vec<char> = cell_text.chars().collect();
    let occurrences = occurrences(&haystack, needle, case_insensitive);
    if occurrences.is_empty() {
        return None;
    }

    // Duplicate disambiguation: the occurrence whose distance from the cell
    // end best matches where the span sat originally.
    let cell_len = haystack.len();
    let best = occurrences
        .into_iter()
        .min_by_key(|&idx| {
            let from_end = cell_len - (idx + needle.len());
            from_end.abs_diff(span.from_end)
        })
        .expect("occurrences is non-empty");

    let cell_range = range_of(new_cells, cell);
    let start = cell_range.start + best;
    Some(AppliedSpan {
        cell,
        range: start..start + needle.len(),
        attribs: span.attribs.clone(),
    })
}

/// Char indices of every occurrence of `needle` in `haystack`.
fn occurrences(haystack: &[char], needle: &[char], case_insensitive: bool) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    let eq = |a: char, b: char| {
        if case_insensitive {
            a.to_lowercase().eq(b.to_lowercase())
        } else {
            a == b
        }
    };
    (0..=haystack.len() - needle.len())
        .filter(|&i| needle.iter().zip(&haystack[i..]).all(|(&n, &h)| eq(n, h)))
        .collect()
}

/// Short-lived store of captured spans, keyed by line identity.
///
/// The capture and the rewrite that consumes it can be separated by a
/// deferral, during which line numbers may shift, so the key is the stable
/// `(tblId, row)` identity, and entries expire after a bounded TTL rather
/// than lingering to mis-style some future rewrite.
#[derive(Debug, Default)]
pub struct SpanCache {
    entries: HashMap<(String, u32), (Vec<StylingSpan>, Instant)>,
}

impl SpanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tbl_id: &str, row: u32, spans: Vec<StylingSpan>) {
        self.entries
            .insert((tbl_id.to_string(), row), (spans, Instant::now()));
    }

    /// Consume the cached spans for a line, if still fresh. Stale entries are
    /// discarded on access.
    pub fn take(&mut self, tbl_id: &str, row: u32, ttl: Duration) -> Option<Vec<StylingSpan>> {
        let (spans, captured_at) = self.entries.remove(&(tbl_id.to_string(), row))?;
        if captured_at.elapsed() > ttl {
            return None;
        }
        Some(spans)
    }

    /// Drop every expired entry.
    pub fn prune(&mut self, ttl: Duration) {
        self.entries
            .retain(|_, (_, captured_at)| captured_at.elapsed() <= ttl);
    }
}
