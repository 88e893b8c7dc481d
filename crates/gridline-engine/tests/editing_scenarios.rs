//! End-to-end editing scenarios through the public engine surface, with
//! `MemoryDoc` standing in for the host editor.

use gridline_engine::cells::{CELL_DELIMITER, split_cells};
use gridline_engine::meta::METADATA_ATTRIBUTE;
use gridline_engine::ops::retag_cells;
use gridline_engine::{
    BlockReason, ColumnSide, Decision, DocModel, DomLine, EditorEvent, Engine, EngineError, Key,
    KeyInput, MemoryDoc, Position, RepairOutcome, RowTarget, Selection, TableMeta, resolve_meta,
};

const D: char = CELL_DELIMITER;

fn table_doc(tbl_id: &str, rows: &[&[&str]]) -> MemoryDoc {
    let _ = env_logger::builder().is_test(true).try_init();
    let texts: Vec<String> = rows
        .iter()
        .map(|cells| cells.join(&D.to_string()))
        .collect();
    let mut doc = MemoryDoc::from_lines(&texts);
    for (i, cells) in rows.iter().enumerate() {
        let meta = TableMeta::new(tbl_id, i as u32, cells.len() as u32);
        doc.set_attribute(i, METADATA_ATTRIBUTE, &meta.encode())
            .unwrap();
        retag_cells(&mut doc, i).unwrap();
    }
    doc.sync_dom();
    doc
}

/// Place the caret (and the engine's cell cache) via a pointer press.
fn click(engine: &mut Engine, doc: &mut MemoryDoc, line: usize, ch: usize) {
    doc.set_selection(Selection::caret(line, ch));
    engine
        .handle_event(doc, EditorEvent::PointerDown { line, ch })
        .unwrap();
}

/// Mark the input pipeline unreliable so keystrokes take the engine's direct
/// insertion path instead of passing through to the host.
fn degrade_pipeline(engine: &mut Engine, doc: &mut MemoryDoc) {
    let decision = engine
        .handle_event(
            doc,
            EditorEvent::BeforeChange {
                line: 0,
                range: 500..501,
                text: "x".into(),
            },
        )
        .unwrap();
    assert_eq!(decision, Decision::Handled);
}

#[test]
fn typing_at_cell_start_keeps_both_cells() {
    let mut doc = table_doc("t", &[&["A", "B"]]);
    let mut engine = Engine::default();
    degrade_pipeline(&mut engine, &mut doc);

    click(&mut engine, &mut doc, 0, 0);
    let decision = engine
        .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::ch('X')))
        .unwrap();

    assert_eq!(decision, Decision::Handled);
    assert_eq!(doc.line_text(0).unwrap(), format!("XA{D}B"));
    assert_eq!(doc.selection(), Selection::caret(0, 1));
}

#[test]
fn reliable_pipeline_lets_clean_edits_through() {
    let mut doc = table_doc("t", &[&["abc", "def"]]);
    let mut engine = Engine::default();

    let decision = engine
        .handle_event(
            &mut doc,
            EditorEvent::BeforeChange {
                line: 0,
                range: 1..1,
                text: "Z".into(),
            },
        )
        .unwrap();
    assert_eq!(decision, Decision::Pass);
}

#[test]
fn boundary_destructive_keys_are_blocked() {
    let mut doc = table_doc("t", &[&["AB", "CD"]]);
    let mut engine = Engine::default();

    // Backspace at the start of the second cell.
    click(&mut engine, &mut doc, 0, 3);
    let decision = engine
        .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::plain(Key::Backspace)))
        .unwrap();
    assert_eq!(decision, Decision::Block(BlockReason::DelimiterBoundary));

    // Delete with the caret on the delimiter.
    click(&mut engine, &mut doc, 0, 2);
    let decision = engine
        .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::plain(Key::Delete)))
        .unwrap();
    assert_eq!(decision, Decision::Block(BlockReason::DelimiterBoundary));

    assert_eq!(doc.line_text(0).unwrap(), format!("AB{D}CD"));
}

#[test]
fn tab_walks_cells_and_appends_a_row_at_the_end() {
    let mut doc = table_doc("t", &[&["a", "b"]]);
    let mut engine = Engine::default();

    click(&mut engine, &mut doc, 0, 0);
    let tab = EditorEvent::KeyDown(KeyInput::plain(Key::Tab));

    engine.handle_event(&mut doc, tab.clone()).unwrap();
    assert_eq!(doc.selection(), Selection::caret(0, 3));

    // Tab from the last cell of the last row grows the table.
    engine.handle_event(&mut doc, tab).unwrap();
    assert_eq!(doc.line_count(), 2);
    assert_eq!(doc.line_text(1).unwrap(), format!(" {D} "));
    let meta = resolve_meta(&doc, 1).unwrap();
    assert_eq!((meta.row, meta.cols), (1, 2));
    assert_eq!(doc.selection(), Selection::caret(1, 1));
}

#[test]
fn enter_at_last_row_exits_below_the_table() {
    let mut doc = table_doc("t", &[&["a", "b"]]);
    let mut engine = Engine::default();

    click(&mut engine, &mut doc, 0, 1);
    engine
        .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::plain(Key::Enter)))
        .unwrap();

    assert_eq!(doc.line_count(), 2);
    assert_eq!(doc.line_text(1).unwrap(), "");
    assert_eq!(resolve_meta(&doc, 1), None);
    assert_eq!(doc.selection(), Selection::caret(1, 0));
}

#[test]
fn paste_is_sanitized_and_scoped_to_the_cell() {
    let mut doc = table_doc("t", &[&["ab", "cd"]]);
    let mut engine = Engine::default();

    click(&mut engine, &mut doc, 0, 1);
    let decision = engine
        .handle_event(
            &mut doc,
            EditorEvent::Paste {
                text: format!("foo\nbar{D}baz"),
            },
        )
        .unwrap();

    assert_eq!(decision, Decision::Handled);
    let text = doc.line_text(0).unwrap();
    assert_eq!(split_cells(&text).len(), 2);
    assert_eq!(text, format!("afoo bar bazb{D}cd"));
}

#[test]
fn multiline_selection_over_a_table_is_refused() {
    let mut doc = table_doc("t", &[&["a", "b"], &["c", "d"]]);
    let mut engine = Engine::default();

    doc.set_selection(Selection::new(Position::new(0, 1), Position::new(1, 1)));
    let decision = engine
        .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::plain(Key::Backspace)))
        .unwrap();
    assert_eq!(decision, Decision::Block(BlockReason::MultilineSelection));
}

#[test]
fn column_insert_then_delete_restores_the_table() {
    let mut doc = table_doc("t", &[&["a", "b"], &["c", "d"]]);
    let mut engine = Engine::default();

    click(&mut engine, &mut doc, 0, 0);
    engine.insert_column(&mut doc, ColumnSide::Right).unwrap();
    for line in 0..2 {
        assert_eq!(resolve_meta(&doc, line).unwrap().cols, 3);
        assert_eq!(split_cells(&doc.line_text(line).unwrap()).len(), 3);
    }

    click(&mut engine, &mut doc, 0, 2); // middle (new) column
    engine.delete_column(&mut doc).unwrap();
    assert_eq!(doc.line_text(0).unwrap(), format!("a{D}b"));
    assert_eq!(doc.line_text(1).unwrap(), format!("c{D}d"));
    for line in 0..2 {
        assert_eq!(resolve_meta(&doc, line).unwrap().cols, 2);
    }
}

#[test]
fn row_insert_then_delete_restores_numbering() {
    let mut doc = table_doc("t", &[&["a", "b"], &["c", "d"]]);
    let mut engine = Engine::default();

    click(&mut engine, &mut doc, 0, 0);
    engine.insert_row(&mut doc, RowTarget::Below).unwrap();
    assert_eq!(doc.line_count(), 3);
    for line in 0..3 {
        assert_eq!(resolve_meta(&doc, line).unwrap().row, line as u32);
    }

    click(&mut engine, &mut doc, 1, 0);
    engine.delete_row(&mut doc).unwrap();
    assert_eq!(doc.line_count(), 2);
    assert!(doc.line_text(1).unwrap().starts_with('c'));
    assert_eq!(resolve_meta(&doc, 1).unwrap().row, 1);
}

#[test]
fn deleting_the_last_column_is_refused() {
    let mut doc = table_doc("t", &[&["only"]]);
    let mut engine = Engine::default();

    click(&mut engine, &mut doc, 0, 0);
    let err = engine.delete_column(&mut doc).unwrap_err();
    assert_eq!(err, EngineError::LastColumn);
    assert_eq!(doc.line_text(0).unwrap(), "only");
}

#[test]
fn composition_orphan_is_repaired_after_the_deferred_pass() {
    let mut doc = table_doc("t", &[&["ab", "cd"]]);
    let mut engine = Engine::default();

    click(&mut engine, &mut doc, 0, 1);
    engine
        .handle_event(&mut doc, EditorEvent::CompositionStart)
        .unwrap();

    // The pipeline commits by inserting a duplicate line instead of mutating
    // the composed one: same metadata, fragment text, no table DOM.
    doc.replace_range(0, 1..1, "か").unwrap();
    doc.sync_dom_line(0);
    doc.insert_line(1, "aかb").unwrap();
    doc.set_attribute(1, METADATA_ATTRIBUTE, &TableMeta::new("t", 0, 2).encode())
        .unwrap();
    doc.set_dom(1, DomLine::default());

    engine
        .handle_event(
            &mut doc,
            EditorEvent::CompositionEnd {
                committed: "か".into(),
            },
        )
        .unwrap();

    let outcomes = engine.drain_deferred(&mut doc);
    assert_eq!(outcomes, vec![RepairOutcome::Merged { orphans_removed: 1 }]);
    assert_eq!(doc.line_count(), 1);
    assert_eq!(doc.line_text(0).unwrap(), format!("aかb{D}cd"));
}

#[test]
fn composition_commit_survives_blocked_change_notifications() {
    // The host honors every mid-composition Block, so the composed text never
    // reaches the model on its own; the commit must carry it in.
    let mut doc = table_doc("t", &[&["ab", "cd"]]);
    let mut engine = Engine::default();

    click(&mut engine, &mut doc, 0, 1);
    engine
        .handle_event(&mut doc, EditorEvent::CompositionStart)
        .unwrap();
    let decision = engine
        .handle_event(
            &mut doc,
            EditorEvent::BeforeChange {
                line: 0,
                range: 1..1,
                text: "か".into(),
            },
        )
        .unwrap();
    assert_eq!(decision, Decision::Block(BlockReason::CompositionInProgress));
    assert_eq!(doc.line_text(0).unwrap(), format!("ab{D}cd"));

    engine
        .handle_event(
            &mut doc,
            EditorEvent::CompositionEnd {
                committed: "か".into(),
            },
        )
        .unwrap();
    let outcomes = engine.drain_deferred(&mut doc);
    assert_eq!(outcomes, vec![RepairOutcome::Clean]);
    assert_eq!(doc.line_text(0).unwrap(), format!("aかb{D}cd"));
}

#[test]
fn repeated_desyncs_latch_safe_mode_and_stop_repairs() {
    let mut engine = Engine::default();

    for round in 0..3 {
        let mut doc = table_doc("t", &[&["ab", "cd"]]);
        click(&mut engine, &mut doc, 0, 1);
        engine
            .handle_event(&mut doc, EditorEvent::CompositionStart)
            .unwrap();

        // Duplicate claimant, then every DOM node vanishes from under the
        // engine before the deferred pass runs.
        doc.insert_line(1, "ab").unwrap();
        doc.set_attribute(1, METADATA_ATTRIBUTE, &TableMeta::new("t", 0, 2).encode())
            .unwrap();
        engine
            .handle_event(
                &mut doc,
                EditorEvent::CompositionEnd {
                    committed: "x".into(),
                },
            )
            .unwrap();
        doc.detach_dom(0);
        doc.detach_dom(1);

        let outcomes = engine.drain_deferred(&mut doc);
        assert_eq!(doc.line_count(), 2, "round {round}: nothing deleted");
        assert_ne!(outcomes, vec![RepairOutcome::Clean]);
    }

    assert!(engine.warning().is_some());
    assert!(!engine.health().allows_destructive());
}

#[test]
fn resize_release_writes_normalized_widths_to_all_rows() {
    let mut doc = table_doc("t", &[&["a", "b"], &["c", "d"]]);
    let mut engine = Engine::default();

    engine.begin_resize(&doc, 0, 0, 0.0, 200.0).unwrap();
    let preview = engine.update_resize(50.0).unwrap();
    assert!((preview.left_percent - 75.0).abs() < 1e-9);

    engine.finish_resize(&mut doc, 50.0).unwrap();
    for line in 0..2 {
        let widths = resolve_meta(&doc, line).unwrap().normalized_widths();
        assert!((widths[0] - 75.0).abs() < 1e-9);
        assert!((widths.iter().sum::<f64>() - 100.0).abs() < 1e-9);
    }
}

#[test]
fn delimiter_count_is_invariant_across_a_busy_session() {
    let mut doc = table_doc("t", &[&["hello", "world", "x"]]);
    let mut engine = Engine::default();
    degrade_pipeline(&mut engine, &mut doc);

    click(&mut engine, &mut doc, 0, 0);
    engine
        .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::ch('A')))
        .unwrap();
    engine
        .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::plain(Key::Tab)))
        .unwrap();
    engine
        .handle_event(
            &mut doc,
            EditorEvent::Paste {
                text: "multi\nline".into(),
            },
        )
        .unwrap();
    doc.set_selection(Selection::new(Position::new(0, 1), Position::new(0, 3)));
    engine
        .handle_event(&mut doc, EditorEvent::KeyDown(KeyInput::plain(Key::Backspace)))
        .unwrap();

    let text = doc.line_text(0).unwrap();
    assert_eq!(split_cells(&text).len(), 3);
}
