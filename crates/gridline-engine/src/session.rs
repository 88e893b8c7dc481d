//! Per-session engine state.
//!
//! The flags that would otherwise be scattered across closures ("are we
//! composing", "how many desync errors so far", "is safe mode on") live here
//! as two explicit state machines plus the caret cache and the deferred task
//! queue. Every browser event maps to a transition; nothing is encoded as a
//! loose boolean.

use std::collections::VecDeque;

use crate::events::InputProfile;
use crate::host::DocModel;
use crate::meta::{TableMeta, resolve_meta};

/// Last cell the user is known to be editing.
///
/// The host's caret is line/column based and knows nothing about cells; when
/// a later event finds the caret exactly on a delimiter boundary, this cache
/// is the prior context that disambiguates it. It is trusted only after
/// re-validation against the live document ([`Session::validated_caret`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaretCache {
    pub line: usize,
    pub tbl_id: String,
    pub cell: usize,
    pub rel: usize,
}

/// State captured at composition start, consumed by the repair pass after
/// composition end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionSnapshot {
    pub line: usize,
    pub tbl_id: String,
    pub row: u32,
    pub cell: usize,
    /// Full cell content at composition start.
    pub cell_text: String,
}

/// The editing-session state machine:
/// `Idle → Composing → PendingReconciliation → Idle`.
///
/// While `Composing`, the browser's own incremental insert notifications are
/// suppressed (they are unreliable and duplicated across pipelines); while
/// `PendingReconciliation`, destructive opportunistic repairs are skipped
/// until the scheduled reconciliation pass runs. That is the cooldown window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditState {
    #[default]
    Idle,
    Composing(CompositionSnapshot),
    PendingReconciliation(CompositionSnapshot),
}

/// Session health: `Normal → Degraded → SafeMode`, one-way.
///
/// Host node-index failures are symptomatic of a third party mutating the
/// DOM under the editor. After a small number of them the session stops
/// trusting itself with deletions for good: silently destroying a user's
/// line on corrupt state is worse than leaving a visible duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Health {
    #[default]
    Normal,
    Degraded {
        errors: u32,
    },
    SafeMode,
}

impl Health {
    pub fn allows_destructive(&self) -> bool {
        !matches!(self, Health::SafeMode)
    }
}

/// Work the engine wants to do after the browser settles.
///
/// The Rust rendition of `setTimeout(0)`: the engine never blocks or sleeps;
/// it queues a task with an advisory delay and the embedder drains the queue
/// once the deferral has elapsed. Handlers re-derive everything from the live
/// model; state captured before a deferral is exactly the stale data this
/// engine exists to defend against.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredTask {
    /// Post-composition orphan check for the snapshot's table row.
    Reconcile {
        snapshot: CompositionSnapshot,
        delay_ms: u64,
    },
    /// Failsafe completion of a column resize whose release event was missed.
    ForceFinishResize,
}

pub const SAFE_MODE_WARNING: &str = "Table editing has entered safe mode after repeated \
     document/display mismatches (often caused by a browser extension). Automatic table \
     repair is disabled for this session.";

/// All mutable per-session engine state.
#[derive(Debug, Default)]
pub struct Session {
    pub(crate) edit_state: EditState,
    health: Health,
    caret: Option<CaretCache>,
    tasks: VecDeque<DeferredTask>,
    pub(crate) profile: InputProfile,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- caret cache -------------------------------------------------------

    pub fn caret_cache(&self) -> Option<&CaretCache> {
        self.caret.as_ref()
    }

    pub fn remember_caret(&mut self, cache: CaretCache) {
        self.caret = Some(cache);
    }

    pub fn invalidate_caret(&mut self) {
        self.caret = None;
    }

    /// The cached caret, re-validated against the live document: the cached
    /// line must still decode to metadata for the cached table and the cached
    /// cell must still exist. A failed validation invalidates the cache.
    pub fn validated_caret(&mut self, host: &impl DocModel) -> Option<(CaretCache, TableMeta)> {
        let cached = self.caret.clone()?;
        match resolve_meta(host, cached.line) {
            Some(meta) if meta.tbl_id == cached.tbl_id && cached.cell < meta.cols as usize => {
                Some((cached, meta))
            }
            _ => {
                self.caret = None;
                None
            }
        }
    }

    // ---- edit state --------------------------------------------------------

    pub fn edit_state(&self) -> &EditState {
        &self.edit_state
    }

    pub fn is_composing(&self) -> bool {
        matches!(self.edit_state, EditState::Composing(_))
    }

    /// Whether destructive reconciliation outside the scheduled pass must be
    /// skipped right now.
    pub fn in_post_composition_cooldown(&self) -> bool {
        matches!(self.edit_state, EditState::PendingReconciliation(_))
    }

    pub fn begin_composition(&mut self, snapshot: CompositionSnapshot) {
        self.edit_state = EditState::Composing(snapshot);
    }

    /// Composition committed: transition to the cooldown window and return
    /// the snapshot for the scheduled reconciliation.
    pub fn end_composition(&mut self) -> Option<CompositionSnapshot> {
        match std::mem::take(&mut self.edit_state) {
            EditState::Composing(snapshot) => {
                self.edit_state = EditState::PendingReconciliation(snapshot.clone());
                Some(snapshot)
            }
            other => {
                self.edit_state = other;
                None
            }
        }
    }

    /// The scheduled reconciliation ran (or was refused): back to idle.
    pub fn reconciliation_done(&mut self) {
        self.edit_state = EditState::Idle;
    }

    // ---- health ------------------------------------------------------------

    pub fn health(&self) -> Health {
        self.health
    }

    /// Count one host node-index failure. Returns `true` if this failure
    /// latched the session into safe mode. Already-latched sessions stay
    /// latched; there is no way back within a session.
    pub fn record_desync_error(&mut self, threshold: u32) -> bool {
        match self.health {
            Health::SafeMode => false,
            Health::Normal | Health::Degraded { .. } => {
                let errors = match self.health {
                    Health::Degraded { errors } => errors + 1,
                    _ => 1,
                };
                if errors >= threshold {
                    log::warn!(
                        "table engine entering safe mode after {errors} host index failures"
                    );
                    self.health = Health::SafeMode;
                    true
                } else {
                    self.health = Health::Degraded { errors };
                    false
                }
            }
        }
    }

    /// Persistent, non-blocking user-visible warning, if any.
    pub fn warning(&self) -> Option<&'static str> {
        match self.health {
            Health::SafeMode => Some(SAFE_MODE_WARNING),
            _ => None,
        }
    }

    // ---- deferred tasks ----------------------------------------------------

    pub fn schedule(&mut self, task: DeferredTask) {
        // A duplicate force-finish is a no-op; don't let stray global pointer
        // events pile them up.
        if task == DeferredTask::ForceFinishResize
            && self.tasks.contains(&DeferredTask::ForceFinishResize)
        {
            return;
        }
        self.tasks.push_back(task);
    }

    pub fn next_task(&mut self) -> Option<DeferredTask> {
        self.tasks.pop_front()
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDoc;
    use crate::meta::{METADATA_ATTRIBUTE, TableMeta};

    fn snapshot() -> CompositionSnapshot {
        CompositionSnapshot {
            line: 1,
            tbl_id: "t".into(),
            row: 0,
            cell: 1,
            cell_text: "abc".into(),
        }
    }

    #[test]
    fn test_edit_state_lifecycle() {
        let mut session = Session::new();
        assert_eq!(*session.edit_state(), EditState::Idle);

        session.begin_composition(snapshot());
        assert!(session.is_composing());
        assert!(!session.in_post_composition_cooldown());

        let returned = session.end_composition().unwrap();
        assert_eq!(returned, snapshot());
        assert!(session.in_post_composition_cooldown());

        session.reconciliation_done();
        assert_eq!(*session.edit_state(), EditState::Idle);
    }

    #[test]
    fn test_end_composition_without_start_is_noop() {
        let mut session = Session::new();
        assert_eq!(session.end_composition(), None);
        assert_eq!(*session.edit_state(), EditState::Idle);
    }

    #[test]
    fn test_health_escalation_and_latch() {
        let mut session = Session::new();
        assert!(!session.record_desync_error(3));
        assert_eq!(session.health(), Health::Degraded { errors: 1 });
        assert!(!session.record_desync_error(3));
        assert!(session.record_desync_error(3));
        assert_eq!(session.health(), Health::SafeMode);
        assert!(!session.health().allows_destructive());
        assert!(session.warning().is_some());

        // Latched for good.
        assert!(!session.record_desync_error(3));
        assert_eq!(session.health(), Health::SafeMode);
    }

    #[test]
    fn test_validated_caret_checks_live_metadata() {
        let mut doc = MemoryDoc::from_lines(&["A\u{001F}B"]);
        let meta = TableMeta::new("tbl", 0, 2);
        doc.set_attribute(0, METADATA_ATTRIBUTE, &meta.encode()).unwrap();

        let mut session = Session::new();
        session.remember_caret(CaretCache {
            line: 0,
            tbl_id: "tbl".into(),
            cell: 1,
            rel: 0,
        });
        assert!(session.validated_caret(&doc).is_some());

        // Metadata disappears: cache must invalidate, not be trusted.
        doc.remove_attribute(0, METADATA_ATTRIBUTE).unwrap();
        assert!(session.validated_caret(&doc).is_none());
        assert!(session.caret_cache().is_none());
    }

    #[test]
    fn test_validated_caret_rejects_out_of_range_cell() {
        let mut doc = MemoryDoc::from_lines(&["A\u{001F}B"]);
        let meta = TableMeta::new("tbl", 0, 2);
        doc.set_attribute(0, METADATA_ATTRIBUTE, &meta.encode()).unwrap();

        let mut session = Session::new();
        session.remember_caret(CaretCache {
            line: 0,
            tbl_id: "tbl".into(),
            cell: 5,
            rel: 0,
        });
        assert!(session.validated_caret(&doc).is_none());
    }

    #[test]
    fn test_duplicate_force_finish_is_coalesced() {
        let mut session = Session::new();
        session.schedule(DeferredTask::ForceFinishResize);
        session.schedule(DeferredTask::ForceFinishResize);
        assert_eq!(session.next_task(), Some(DeferredTask::ForceFinishResize));
        assert_eq!(session.next_task(), None);
    }
}
