//! In-memory reference implementation of the host contract.
//!
//! `MemoryDoc` is what every test drives the engine against, and what an
//! embedder without a live editor can use directly. It stores per-line text,
//! the line attribute map, and range-attribute spans (shifted through edits
//! the same way selections are), and can re-render its own DOM views from the
//! model on demand. Tests also use it to *desync* the DOM deliberately: that
//! is the failure mode the repair engine exists for.

use std::collections::HashMap;
use std::ops::Range;

use crate::cells::split_cells;
use crate::error::EngineError;
use crate::host::{DocModel, DomCell, DomLine, DomTable, Position, Selection, StyledRun};
use crate::meta::{CELL_ATTRIBUTE, METADATA_ATTRIBUTE, TableMeta};

/// One range attribute on a line: `range` is a char range of the line text.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSpan {
    pub range: Range<usize>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
struct Line {
    text: String,
    attributes: HashMap<String, String>,
    spans: Vec<AttrSpan>,
    dom: Option<DomLine>,
}

/// In-memory document model. See the module docs.
#[derive(Debug, Clone, Default)]
pub struct MemoryDoc {
    lines: Vec<Line>,
    selection: Selection,
}

impl MemoryDoc {
    /// A document with a single empty line (hosts never have zero lines).
    pub fn new() -> Self {
        Self {
            lines: vec![Line::default()],
            selection: Selection::default(),
        }
    }

    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let lines = lines
            .iter()
            .map(|text| Line {
                text: text.as_ref().to_string(),
                ..Line::default()
            })
            .collect();
        Self {
            lines,
            selection: Selection::default(),
        }
    }

    fn line(&self, index: usize) -> Result<&Line, EngineError> {
        self.lines
            .get(index)
            .ok_or(EngineError::LineOutOfRange { line: index })
    }

    fn line_mut(&mut self, index: usize) -> Result<&mut Line, EngineError> {
        self.lines
            .get_mut(index)
            .ok_or(EngineError::LineOutOfRange { line: index })
    }

    /// Re-render the DOM view of every line from the current model state.
    /// After this, model and DOM agree; tests then introduce divergence with
    /// the hooks below.
    pub fn sync_dom(&mut self) {
        for index in 0..self.lines.len() {
            self.sync_dom_line(index);
        }
    }

    /// Re-render a single line's DOM view.
    pub fn sync_dom_line(&mut self, index: usize) {
        let Some(line) = self.lines.get(index) else {
            return;
        };
        let meta = line
            .attributes
            .get(METADATA_ATTRIBUTE)
            .and_then(|token| TableMeta::decode(token));

        let dom = match meta {
            None => DomLine {
                class_tokens: vec!["ace-line".to_string()],
                table: None,
            },
            Some(meta) => {
                let cells = render_dom_cells(&line.text, &line.spans);
                DomLine {
                    class_tokens: vec!["ace-line".to_string(), meta.class_token()],
                    table: Some(DomTable {
                        tbl_id: meta.tbl_id.clone(),
                        row: meta.row,
                        cells,
                    }),
                }
            }
        };
        self.lines[index].dom = Some(dom);
    }

    /// Test hook: drop a line's DOM view entirely, simulating a third-party
    /// mutation that destroyed the host's node-index entry.
    pub fn detach_dom(&mut self, line: usize) {
        if let Some(line) = self.lines.get_mut(line) {
            line.dom = None;
        }
    }

    /// Test hook: install an arbitrary DOM view for a line, model be damned.
    pub fn set_dom(&mut self, line: usize, dom: DomLine) {
        if let Some(line) = self.lines.get_mut(line) {
            line.dom = Some(dom);
        }
    }

    /// Range-attribute spans of a line, for assertions.
    pub fn spans(&self, line: usize) -> &[AttrSpan] {
        self.lines.get(line).map(|l| l.spans.as_slice()).unwrap_or(&[])
    }

    fn transform_position(pos: usize, range: &Range<usize>, inserted: usize) -> usize {
        if pos <= range.start {
            pos
        } else if pos >= range.end {
            pos - range.len() + inserted
        } else {
            // Inside the replaced range: collapse to the edit start. Inserted
            // text never inherits membership of a span it replaced.
            range.start
        }
    }
}

impl DocModel for MemoryDoc {
    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line_text(&self, line: usize) -> Option<String> {
        self.lines.get(line).map(|l| l.text.clone())
    }

    fn get_attribute(&self, line: usize, name: &str) -> Option<String> {
        self.lines.get(line)?.attributes.get(name).cloned()
    }

    fn set_attribute(&mut self, line: usize, name: &str, value: &str) -> Result<(), EngineError> {
        self.line_mut(line)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_attribute(&mut self, line: usize, name: &str) -> Result<(), EngineError> {
        self.line_mut(line)?.attributes.remove(name);
        Ok(())
    }

    fn replace_range(
        &mut self,
        line_index: usize,
        range: Range<usize>,
        text: &str,
    ) -> Result<(), EngineError> {
        let line = self.line_mut(line_index)?;
        let char_len = line.text.chars().count();
        let start = range.start.min(char_len);
        let end = range.end.min(char_len).max(start);
        let range = start..end;

        let byte_start = byte_index(&line.text, start);
        let byte_end = byte_index(&line.text, end);
        line.text.replace_range(byte_start..byte_end, text);

        let inserted = text.chars().count();
        line.spans.retain_mut(|span| {
            span.range.start = Self::transform_position(span.range.start, &range, inserted);
            span.range.end = Self::transform_position(span.range.end, &range, inserted);
            span.range.start < span.range.end
        });

        if self.selection.start.line == line_index {
            self.selection.start.ch =
                Self::transform_position(self.selection.start.ch, &range, inserted);
        }
        if self.selection.end.line == line_index {
            self.selection.end.ch =
                Self::transform_position(self.selection.end.ch, &range, inserted);
        }
        Ok(())
    }

    fn apply_range_attribute(
        &mut self,
        line: usize,
        range: Range<usize>,
        name: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        if range.is_empty() {
            return Ok(());
        }
        self.line_mut(line)?.spans.push(AttrSpan {
            range,
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn strip_range_attribute(&mut self, line: usize, name: &str) -> Result<(), EngineError> {
        self.line_mut(line)?.spans.retain(|span| span.name != name);
        Ok(())
    }

    fn selection(&self) -> Selection {
        self.selection
    }

    fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    fn insert_line(&mut self, at: usize, text: &str) -> Result<(), EngineError> {
        if at > self.lines.len() {
            return Err(EngineError::LineOutOfRange { line: at });
        }
        self.lines.insert(
            at,
            Line {
                text: text.to_string(),
                ..Line::default()
            },
        );
        if self.selection.start.line >= at {
            self.selection.start.line += 1;
        }
        if self.selection.end.line >= at {
            self.selection.end.line += 1;
        }
        Ok(())
    }

    fn delete_line(&mut self, line: usize) -> Result<(), EngineError> {
        if line >= self.lines.len() {
            return Err(EngineError::LineOutOfRange { line });
        }
        self.lines.remove(line);
        if self.lines.is_empty() {
            self.lines.push(Line::default());
        }
        for pos in [&mut self.selection.start, &mut self.selection.end] {
            if pos.line > line {
                pos.line -= 1;
            } else if pos.line == line {
                *pos = Position::new(line.min(self.lines.len() - 1), 0);
            }
        }
        Ok(())
    }

    fn dom_line(&self, line: usize) -> Option<&DomLine> {
        self.line(line).ok()?.dom.as_ref()
    }
}

/// Char offset → byte offset within one line.
fn byte_index(text: &str, ch: usize) -> usize {
    text.char_indices()
        .nth(ch)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

/// Build the rendered cells for a table line: split the text, then slice each
/// cell into styled runs at the span boundaries that fall inside it.
fn render_dom_cells(text: &str, spans: &[AttrSpan]) -> Vec<DomCell> {
    let cells = split_cells(text);
    let mut out = Vec::with_capacity(cells.len());
    let mut cell_start = 0;

    for cell_text in cells {
        let cell_len = cell_text.chars().count();
        let cell_end = cell_start + cell_len;

        let mut cuts: Vec<usize> = vec![cell_start, cell_end];
        for span in spans {
            if span.name == CELL_ATTRIBUTE {
                continue;
            }
            for edge in [span.range.start, span.range.end] {
                if edge > cell_start && edge < cell_end {
                    cuts.push(edge);
                }
            }
        }
        cuts.sort_unstable();
        cuts.dedup();

        let chars: Vec<char> = cell_text.chars().collect();
        let mut runs = Vec::new();
        for window in cuts.windows(2) {
            let (abs_start, abs_end) = (window[0], window[1]);
            let run_text: String = chars[abs_start - cell_start..abs_end - cell_start]
                .iter()
                .collect();
            let attribs: Vec<(String, String)> = spans
                .iter()
                .filter(|span| {
                    span.name != CELL_ATTRIBUTE
                        && span.range.start <= abs_start
                        && span.range.end >= abs_end
                })
                .map(|span| (span.name.clone(), span.value.clone()))
                .collect();
            runs.push(StyledRun {
                text: run_text,
                attribs,
            });
        }
        if runs.is_empty() {
            runs.push(StyledRun::default());
        }

        out.push(DomCell { runs });
        cell_start = cell_end + 1;
    }
    out
}
