//! Column resize engine.
//!
//! A drag on a resize handle transfers width percentage between the dragged
//! column and its right neighbor, and only those two. During the drag nothing
//! is written: the controller produces [`ResizePreview`] geometry for the
//! host's overlay and the document stays untouched until release, so an
//! abandoned drag costs nothing.
//!
//! Release clamps both affected columns to the configured floor, renormalizes
//! the vector to 100 and writes the widths into every row's metadata. A
//! missed release (pointer left the window) is completed by `force_finish`,
//! which the engine schedules as a deferred task when stray pointer events
//! arrive while a drag is live.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::host::DocModel;
use crate::meta::{METADATA_ATTRIBUTE, TableMeta, renormalize, resolve_meta};
use crate::ops::scan_table;

/// Live drag geometry for the host's overlay, percentages of table width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePreview {
    pub col: usize,
    pub left_percent: f64,
    pub right_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum ResizeState {
    Idle,
    Resizing {
        tbl_id: String,
        line: usize,
        col: usize,
        start_x: f64,
        last_x: f64,
        /// Table width in pixels at drag start; converts pointer deltas to
        /// percentage deltas.
        table_width: f64,
        start_widths: Vec<f64>,
    },
}

/// Pointer-driven state machine, `Idle → Resizing → Idle`.
#[derive(Debug)]
pub struct ResizeController {
    state: ResizeState,
}

impl Default for ResizeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ResizeController {
    pub fn new() -> Self {
        Self {
            state: ResizeState::Idle,
        }
    }

    pub fn is_resizing(&self) -> bool {
        matches!(self.state, ResizeState::Resizing { .. })
    }

    /// Pointer press on the handle of column `col`.
    ///
    /// The rightmost column has no handle; a request for it (or any column
    /// without a right neighbor) is refused.
    pub fn begin(
        &mut self,
        host: &impl DocModel,
        line: usize,
        col: usize,
        pointer_x: f64,
        table_width_px: f64,
    ) -> Result<(), EngineError> {
        let meta = resolve_meta(host, line).ok_or(EngineError::NotATableLine { line })?;
        if col + 1 >= meta.cols as usize {
            return Err(EngineError::LastColumn);
        }
        let start_widths = meta.normalized_widths();
        self.state = ResizeState::Resizing {
            tbl_id: meta.tbl_id,
            line,
            col,
            start_x: pointer_x,
            last_x: pointer_x,
            table_width: table_width_px.max(1.0),
            start_widths,
        };
        Ok(())
    }

    /// Pointer move during a drag. Returns overlay geometry; `None` when no
    /// drag is live.
    pub fn update(&mut self, cfg: &EngineConfig, pointer_x: f64) -> Option<ResizePreview> {
        let ResizeState::Resizing {
            col,
            start_x,
            last_x,
            table_width,
            start_widths,
            ..
        } = &mut self.state
        else {
            return None;
        };
        *last_x = pointer_x;
        let (left, right) = clamped_pair(
            cfg,
            start_widths,
            *col,
            (pointer_x - *start_x) / *table_width * 100.0,
        );
        Some(ResizePreview {
            col: *col,
            left_percent: left,
            right_percent: right,
        })
    }

    /// Pointer release: commit the final widths to every row of the table.
    pub fn finish(
        &mut self,
        cfg: &EngineConfig,
        host: &mut impl DocModel,
        pointer_x: f64,
    ) -> Result<(), EngineError> {
        self.update(cfg, pointer_x);
        self.force_finish(cfg, host)
    }

    /// Complete a drag from the last observed pointer position. No-op when
    /// idle, so a stale deferred task is harmless.
    pub fn force_finish(
        &mut self,
        cfg: &EngineConfig,
        host: &mut impl DocModel,
    ) -> Result<(), EngineError> {
        let ResizeState::Resizing {
            tbl_id,
            line,
            col,
            start_x,
            last_x,
            table_width,
            start_widths,
        } = std::mem::replace(&mut self.state, ResizeState::Idle)
        else {
            return Ok(());
        };

        let delta = (last_x - start_x) / table_width * 100.0;
        let (left, right) = clamped_pair(cfg, &start_widths, col, delta);
        let mut widths = start_widths;
        widths[col] = left;
        widths[col + 1] = right;
        renormalize(&mut widths);

        for (row_line, row_meta) in scan_table(cfg, host, line, &tbl_id) {
            let updated = TableMeta {
                column_widths: Some(widths.clone()),
                ..row_meta
            };
            host.set_attribute(row_line, METADATA_ATTRIBUTE, &updated.encode())?;
        }
        Ok(())
    }

    /// Drop the drag without writing anything.
    pub fn cancel(&mut self) {
        self.state = ResizeState::Idle;
    }
}

/// The dragged pair after applying `delta` percent, clamped so neither
/// column drops below the width floor. Total width of the pair is conserved.
fn clamped_pair(cfg: &EngineConfig, widths: &[f64], col: usize, delta: f64) -> (f64, f64) {
    let floor = cfg.min_column_percent;
    let left = widths[col];
    let right = widths[col + 1];

    let min_delta = (floor - left).min(0.0);
    let max_delta = (right - floor).max(0.0);
    let delta = delta.clamp(min_delta, max_delta);
    (left + delta, right - delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::join_cells;
    use crate::host::MemoryDoc;
    use pretty_assertions::assert_eq;

    fn table_doc(rows: usize, cols: u32) -> MemoryDoc {
        let cells: Vec<&str> = vec!["x"; cols as usize];
        let texts: Vec<String> = (0..rows).map(|_| join_cells(&cells)).collect();
        let mut doc = MemoryDoc::from_lines(&texts);
        for row in 0..rows {
            let meta = TableMeta::new("t", row as u32, cols);
            doc.set_attribute(row, METADATA_ATTRIBUTE, &meta.encode()).unwrap();
        }
        doc
    }

    fn widths_of(doc: &MemoryDoc, line: usize) -> Vec<f64> {
        resolve_meta(doc, line).unwrap().normalized_widths()
    }

    #[test]
    fn test_preview_transfers_between_neighbors_only() {
        let doc = table_doc(1, 4);
        let cfg = EngineConfig::default();
        let mut resize = ResizeController::new();

        resize.begin(&doc, 0, 1, 100.0, 1000.0).unwrap();
        // +100px on a 1000px table: ten percent moves from col 2 to col 1.
        let preview = resize.update(&cfg, 200.0).unwrap();
        assert_eq!(preview.col, 1);
        assert!((preview.left_percent - 35.0).abs() < 1e-9);
        assert!((preview.right_percent - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_begin_reads_declared_widths_from_metadata() {
        let mut doc = table_doc(1, 2);
        let mut meta = TableMeta::new("t", 0, 2);
        meta.column_widths = Some(vec![60.0, 40.0]);
        doc.set_attribute(0, METADATA_ATTRIBUTE, &meta.encode()).unwrap();

        let cfg = EngineConfig::default();
        let mut resize = ResizeController::new();
        resize.begin(&doc, 0, 0, 0.0, 100.0).unwrap();
        let preview = resize.update(&cfg, 0.0).unwrap();
        assert!((preview.left_percent - 60.0).abs() < 1e-9);
        assert!((preview.right_percent - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_preview_respects_width_floor() {
        let doc = table_doc(1, 2);
        let cfg = EngineConfig::default(); // 5% floor
        let mut resize = ResizeController::new();

        resize.begin(&doc, 0, 0, 0.0, 100.0).unwrap();
        // Dragging 90px right would leave the neighbor at -40%; it clamps
        // at the floor instead.
        let preview = resize.update(&cfg, 90.0).unwrap();
        assert!((preview.right_percent - 5.0).abs() < 1e-9);
        assert!((preview.left_percent - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_finish_writes_widths_to_every_row() {
        let mut doc = table_doc(3, 2);
        let cfg = EngineConfig::default();
        let mut resize = ResizeController::new();

        resize.begin(&doc, 1, 0, 0.0, 100.0).unwrap();
        resize.finish(&cfg, &mut doc, 20.0).unwrap();
        assert!(!resize.is_resizing());

        for line in 0..3 {
            let widths = widths_of(&doc, line);
            assert!((widths[0] - 70.0).abs() < 1e-9, "line {line}: {widths:?}");
            assert!((widths[1] - 30.0).abs() < 1e-9);
            assert!((widths.iter().sum::<f64>() - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_untouched_columns_keep_their_width() {
        let mut doc = table_doc(1, 3);
        let cfg = EngineConfig::default();
        let mut resize = ResizeController::new();

        resize.begin(&doc, 0, 0, 0.0, 300.0).unwrap();
        resize.finish(&cfg, &mut doc, 30.0).unwrap();

        let widths = widths_of(&doc, 0);
        assert!((widths[2] - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_force_finish_uses_last_observed_position() {
        let mut doc = table_doc(1, 2);
        let cfg = EngineConfig::default();
        let mut resize = ResizeController::new();

        resize.begin(&doc, 0, 0, 0.0, 100.0).unwrap();
        resize.update(&cfg, 10.0);
        resize.force_finish(&cfg, &mut doc).unwrap();

        let widths = widths_of(&doc, 0);
        assert!((widths[0] - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_force_finish_when_idle_is_noop() {
        let mut doc = table_doc(1, 2);
        let cfg = EngineConfig::default();
        let mut resize = ResizeController::new();
        resize.force_finish(&cfg, &mut doc).unwrap();
        assert_eq!(resolve_meta(&doc, 0).unwrap().column_widths, None);
    }

    #[test]
    fn test_begin_on_last_column_is_refused() {
        let doc = table_doc(1, 2);
        let mut resize = ResizeController::new();
        let err = resize.begin(&doc, 0, 1, 0.0, 100.0).unwrap_err();
        assert_eq!(err, EngineError::LastColumn);
        assert!(!resize.is_resizing());
    }

    #[test]
    fn test_cancel_discards_drag() {
        let mut doc = table_doc(1, 2);
        let cfg = EngineConfig::default();
        let mut resize = ResizeController::new();

        resize.begin(&doc, 0, 0, 0.0, 100.0).unwrap();
        resize.update(&cfg, 30.0);
        resize.cancel();
        resize.force_finish(&cfg, &mut doc).unwrap();
        assert_eq!(resolve_meta(&doc, 0).unwrap().column_widths, None);
    }
}
