//! The engine facade: the complete surface an embedder wires to the host
//! editor's notification hooks.
//!
//! One [`Engine`] per editing session. Events go in through
//! [`Engine::handle_event`], deferred work comes back out through
//! [`Engine::drain_deferred`] after the browser settles, and the structural
//! commands back the embedder's toolbar. The engine owns all session state;
//! the document itself stays with the host and is borrowed per call.

use crate::cells::split_cells;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::EditorEvent;
use crate::host::DocModel;
use crate::intercept::{self, BlockReason, Decision};
use crate::meta::resolve_meta;
use crate::ops::{self, ColumnSide, RowTarget};
use crate::repair::{RepairOutcome, reconcile_after_composition};
use crate::resize::{ResizeController, ResizePreview};
use crate::rewrite::canonicalize_line;
use crate::session::{DeferredTask, Health, Session};
use crate::styling::SpanCache;

pub struct Engine {
    config: EngineConfig,
    session: Session,
    spans: SpanCache,
    resize: ResizeController,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            session: Session::new(),
            spans: SpanCache::new(),
            resize: ResizeController::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- event pipeline ----------------------------------------------------

    /// Classify and possibly apply one editor event. The returned [`Decision`]
    /// tells the host whether to cancel its default handling.
    pub fn handle_event(
        &mut self,
        host: &mut impl DocModel,
        event: EditorEvent,
    ) -> Result<Decision, EngineError> {
        match event {
            EditorEvent::KeyDown(input) => {
                intercept::intercept_key(&self.config, &mut self.session, host, input)
            }
            EditorEvent::BeforeChange { line, range, text } => intercept::before_change(
                &self.config,
                &mut self.session,
                &mut self.spans,
                host,
                line,
                range,
                &text,
            ),
            EditorEvent::CompositionStart => {
                intercept::composition_start(&mut self.session, host);
                Ok(Decision::Pass)
            }
            EditorEvent::CompositionUpdate { .. } => Ok(if self.session.is_composing() {
                Decision::Block(BlockReason::CompositionInProgress)
            } else {
                Decision::Pass
            }),
            EditorEvent::CompositionEnd { committed } => intercept::composition_end(
                &self.config,
                &mut self.session,
                &mut self.spans,
                host,
                &committed,
            ),
            EditorEvent::Paste { text } | EditorEvent::Drop { text } => {
                intercept::paste(&mut self.session, host, &text)
            }
            EditorEvent::Cut => intercept::cut(host),
            EditorEvent::PointerDown { line, ch } => {
                intercept::pointer_down(&mut self.session, host, line, ch);
                if self.resize.is_resizing() {
                    // A press while a drag is live means the release was
                    // missed somewhere.
                    self.session.schedule(DeferredTask::ForceFinishResize);
                }
                Ok(Decision::Pass)
            }
        }
    }

    /// Run every queued deferred task against the live document. Embedders
    /// call this once the advisory delays have elapsed.
    pub fn drain_deferred(&mut self, host: &mut impl DocModel) -> Vec<RepairOutcome> {
        let mut outcomes = Vec::new();
        while let Some(task) = self.session.next_task() {
            match task {
                DeferredTask::Reconcile { snapshot, .. } => {
                    outcomes.push(reconcile_after_composition(
                        &self.config,
                        &mut self.session,
                        &mut self.spans,
                        host,
                        &snapshot,
                    ));
                }
                DeferredTask::ForceFinishResize => {
                    if let Err(err) = self.resize.force_finish(&self.config, host) {
                        log::warn!("forced resize completion failed: {err}");
                    }
                }
            }
        }
        // Staged styling captures that no rewrite consumed expire here rather
        // than lingering to mis-style a future rewrite of the same row.
        self.spans.prune(self.config.styling_span_ttl());
        outcomes
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.session.has_pending_tasks()
    }

    // ---- structural commands -----------------------------------------------

    pub fn create_table(
        &mut self,
        host: &mut impl DocModel,
        rows: u32,
        cols: u32,
    ) -> Result<String, EngineError> {
        ops::create_table(&mut self.session, host, rows, cols)
    }

    pub fn insert_row(
        &mut self,
        host: &mut impl DocModel,
        target: RowTarget,
    ) -> Result<usize, EngineError> {
        ops::insert_row(&self.config, &mut self.session, host, target)
    }

    pub fn delete_row(&mut self, host: &mut impl DocModel) -> Result<(), EngineError> {
        ops::delete_row(&self.config, &mut self.session, host)
    }

    pub fn insert_column(
        &mut self,
        host: &mut impl DocModel,
        side: ColumnSide,
    ) -> Result<(), EngineError> {
        ops::insert_column(&self.config, &mut self.session, host, side)
    }

    pub fn delete_column(&mut self, host: &mut impl DocModel) -> Result<(), EngineError> {
        ops::delete_column(&self.config, &mut self.session, host)
    }

    // ---- resize ------------------------------------------------------------

    pub fn begin_resize(
        &mut self,
        host: &impl DocModel,
        line: usize,
        col: usize,
        pointer_x: f64,
        table_width_px: f64,
    ) -> Result<(), EngineError> {
        self.resize.begin(host, line, col, pointer_x, table_width_px)
    }

    pub fn update_resize(&mut self, pointer_x: f64) -> Option<ResizePreview> {
        self.resize.update(&self.config, pointer_x)
    }

    pub fn finish_resize(
        &mut self,
        host: &mut impl DocModel,
        pointer_x: f64,
    ) -> Result<(), EngineError> {
        self.resize.finish(&self.config, host, pointer_x)
    }

    pub fn cancel_resize(&mut self) {
        self.resize.cancel();
    }

    // ---- rendering and repair ----------------------------------------------

    /// Render one table line to its DOM markup, or `None` for a non-table
    /// line. Cell text is HTML-escaped here; callers supplying pre-rendered
    /// HTML segments use [`crate::render::render_row`] directly.
    pub fn render_line(&self, host: &impl DocModel, line: usize) -> Option<String> {
        let meta = resolve_meta(host, line)?;
        let text = host.line_text(line)?;
        let cells = split_cells(&text);
        let escaped: Vec<String> = cells
            .iter()
            .map(|c| html_escape::encode_text(c).into_owned())
            .collect();
        let refs: Vec<&str> = escaped.iter().map(|s| s.as_str()).collect();
        Some(crate::render::render_row(&meta, &refs))
    }

    /// Drive one line back to canonical form immediately.
    pub fn canonicalize(
        &mut self,
        host: &mut impl DocModel,
        line: usize,
    ) -> Result<(), EngineError> {
        canonicalize_line(&self.config, &mut self.spans, host, line, None)
    }

    // ---- health ------------------------------------------------------------

    pub fn health(&self) -> Health {
        self.session.health()
    }

    /// Persistent user-visible warning, if the session has one.
    pub fn warning(&self) -> Option<&'static str> {
        self.session.warning()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Key, KeyInput};
    use crate::host::{MemoryDoc, Selection};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_then_type_then_tab() {
        let mut doc = MemoryDoc::new();
        let mut engine = Engine::default();

        engine.create_table(&mut doc, 1, 2).unwrap();
        doc.sync_dom();
        assert_eq!(doc.selection(), Selection::caret(1, 1));

        // Force the direct-insertion path so the engine applies the edit.
        engine.session.profile.observe_before_change(false);
        let decision = engine
            .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::ch('x')))
            .unwrap();
        assert_eq!(decision, Decision::Handled);
        assert!(doc.line_text(1).unwrap().starts_with(" x"));

        let decision = engine
            .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::plain(Key::Tab)))
            .unwrap();
        assert_eq!(decision, Decision::Handled);
        assert_eq!(doc.selection().start.ch, doc.line_text(1).unwrap().chars().count());
    }

    #[test]
    fn test_drain_runs_scheduled_reconciliation() {
        let mut doc = MemoryDoc::new();
        let mut engine = Engine::default();
        engine.create_table(&mut doc, 1, 2).unwrap();
        doc.sync_dom();

        engine
            .handle_event(&mut doc, EditorEvent::CompositionStart)
            .unwrap();
        engine
            .handle_event(
                &mut doc,
                EditorEvent::CompositionEnd {
                    committed: "か".into(),
                },
            )
            .unwrap();
        assert!(engine.has_pending_tasks());

        let outcomes = engine.drain_deferred(&mut doc);
        assert_eq!(outcomes, vec![RepairOutcome::Clean]);
        assert!(!engine.has_pending_tasks());
        assert!(!engine.session().in_post_composition_cooldown());
    }

    #[test]
    fn test_render_line_escapes_cell_text() {
        let mut doc = MemoryDoc::new();
        let mut engine = Engine::default();
        engine.create_table(&mut doc, 1, 2).unwrap();
        doc.replace_range(1, 0..1, "<b>").unwrap();

        let html = engine.render_line(&doc, 1).unwrap();
        assert!(html.contains("&lt;b&gt;"));
        assert_eq!(engine.render_line(&doc, 0), None);
    }

    #[test]
    fn test_pointer_during_resize_schedules_force_finish() {
        let mut doc = MemoryDoc::new();
        let mut engine = Engine::default();
        engine.create_table(&mut doc, 1, 2).unwrap();
        doc.sync_dom();

        engine.begin_resize(&doc, 1, 0, 0.0, 100.0).unwrap();
        engine.update_resize(25.0);
        engine
            .handle_event(&mut doc, EditorEvent::PointerDown { line: 1, ch: 0 })
            .unwrap();
        assert!(engine.has_pending_tasks());

        engine.drain_deferred(&mut doc);
        let meta = resolve_meta(&doc, 1).unwrap();
        let widths = meta.normalized_widths();
        assert!((widths[0] - 75.0).abs() < 1e-9);
    }
}
