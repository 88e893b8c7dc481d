//! Per-row table metadata and its codec.
//!
//! Each table row is one document line; the structural facts about that line
//! (which table it belongs to, its row index, how many columns it has, the
//! column widths) live in a single JSON blob stored as a line attribute. The
//! blob is base64url-encoded so the same token can also survive inside a DOM
//! class attribute, which is how metadata gets recovered when the line
//! attribute has gone missing.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::host::DocModel;

/// Line attribute carrying the encoded [`TableMeta`] blob.
pub const METADATA_ATTRIBUTE: &str = "tbljson";

/// Range attribute tagging each cell's text with its cell index.
pub const CELL_ATTRIBUTE: &str = "tblCell";

/// Prefix of the DOM class token form of the metadata attribute.
pub const METADATA_CLASS_PREFIX: &str = "tbljson-";

/// Structural metadata for one table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    /// Opaque random token shared by every row of the same logical table.
    #[serde(rename = "tblId")]
    pub tbl_id: String,
    /// 0-based position of this line within the table.
    pub row: u32,
    /// Declared column count. Must match the delimiter-segment count of the
    /// line text whenever no edit is in flight.
    pub cols: u32,
    /// Column widths as percentages summing to 100, when the table has been
    /// resized. Absent means an equal split.
    #[serde(rename = "columnWidths", skip_serializing_if = "Option::is_none")]
    pub column_widths: Option<Vec<f64>>,
}

impl TableMeta {
    pub fn new(tbl_id: impl Into<String>, row: u32, cols: u32) -> Self {
        Self {
            tbl_id: tbl_id.into(),
            row,
            cols,
            column_widths: None,
        }
    }

    /// Serialize to the attribute/DOM token form: JSON, then base64url
    /// without padding (padding characters are not class-name safe).
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).expect("TableMeta serialization cannot fail");
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    /// Decode an attribute/DOM token. Returns `None` (never an error) on
    /// malformed base64, malformed JSON, or a blob missing any required
    /// field. Callers must treat `None` as "not a table line".
    pub fn decode(token: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).ok()?;
        let meta: TableMeta = serde_json::from_slice(&bytes).ok()?;
        if meta.tbl_id.is_empty() || meta.cols == 0 {
            return None;
        }
        Some(meta)
    }

    /// The DOM class token form, `tbljson-<b64>`.
    pub fn class_token(&self) -> String {
        format!("{}{}", METADATA_CLASS_PREFIX, self.encode())
    }

    /// Recover metadata from a whitespace-separated class attribute value.
    pub fn from_class_tokens(classes: &str) -> Option<Self> {
        classes
            .split_whitespace()
            .find_map(|token| Self::decode(token.strip_prefix(METADATA_CLASS_PREFIX)?))
    }

    /// Width vector padded/truncated to exactly `cols` entries and rescaled
    /// to sum to 100. Used by the renderer and the resize engine, which both
    /// need a full-length vector even when the stored one is stale.
    pub fn normalized_widths(&self) -> Vec<f64> {
        let cols = self.cols as usize;
        match &self.column_widths {
            None => equal_widths(cols),
            Some(stored) => {
                let mut widths = stored.clone();
                widths.truncate(cols);
                let fill = 100.0 / cols as f64;
                widths.resize(cols, fill);
                renormalize(&mut widths);
                widths
            }
        }
    }
}

/// Equal-split width vector for `cols` columns.
pub fn equal_widths(cols: usize) -> Vec<f64> {
    debug_assert!(cols > 0);
    vec![100.0 / cols.max(1) as f64; cols.max(1)]
}

/// Rescale a width vector in place so it sums to exactly 100. A degenerate
/// vector (zero or negative total) falls back to an equal split.
pub fn renormalize(widths: &mut [f64]) {
    let total: f64 = widths.iter().copied().filter(|w| *w > 0.0).sum();
    if total <= 0.0 {
        let fill = 100.0 / widths.len().max(1) as f64;
        widths.iter_mut().for_each(|w| *w = fill);
        return;
    }
    for w in widths.iter_mut() {
        if *w < 0.0 {
            *w = 0.0;
        }
        *w = *w / total * 100.0;
    }
}

/// Fresh opaque table identifier.
pub fn fresh_table_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Resolve the table metadata for a line, preferring the model attribute and
/// falling back to the rendered DOM.
///
/// This is the single narrow accessor through which structural facts are
/// read: the attribute store first, then the `tbljson-*` class token left in
/// the DOM, then the rendered `<table>` element itself (from which everything
/// except widths can be reconstructed). Returns `None` for non-table lines.
pub fn resolve_meta(host: &impl DocModel, line: usize) -> Option<TableMeta> {
    if let Some(token) = host.get_attribute(line, METADATA_ATTRIBUTE)
        && let Some(meta) = TableMeta::decode(&token)
    {
        return Some(meta);
    }

    let dom = host.dom_line(line)?;
    for classes in &dom.class_tokens {
        if let Some(meta) = TableMeta::from_class_tokens(classes) {
            return Some(meta);
        }
    }
    dom.table.as_ref().map(|table| TableMeta {
        tbl_id: table.tbl_id.clone(),
        row: table.row,
        cols: table.cells.len().max(1) as u32,
        column_widths: None,
    })
}
