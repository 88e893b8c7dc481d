//! Expansion of one table row into its DOM markup.
//!
//! Input is the row metadata plus one HTML-segment string per cell, already
//! delimiter-split from the line's rendered content by the host. Segments may
//! be malformed (wrong count); the renderer reconstructs a best-effort layout
//! rather than failing, because a row the user cannot see is a row the user
//! cannot fix.
//!
//! The produced markup is the contract the host's content-collection and the
//! repair engine read back: `data-tblid`/`data-row` on the `<table>`, a
//! `tblCell-<n>` class per `<td>`, a hidden delimiter marker before every
//! cell but the first, a caret anchor trailing every cell's content, and a
//! resize handle on all but the last cell.

use std::fmt::Write as _;

use crate::meta::TableMeta;

/// Reconcile a segment list with the declared column count.
///
/// Exactly one segment for a multi-column row: the delimiters were lost in
/// rendering, pad the rest out. More segments than columns: extra delimiters
/// were rendered, merge the excess into the last column. Anything else:
/// pad or truncate to length.
pub fn reconstruct_segments(cols: usize, segments: &[&str]) -> Vec<String> {
    let cols = cols.max(1);
    if segments.len() == cols {
        return segments.iter().map(|s| s.to_string()).collect();
    }

    log::warn!(
        "segment/column mismatch: {} segments for {} columns, reconstructing",
        segments.len(),
        cols
    );

    if segments.len() > cols {
        let mut out: Vec<String> = segments[..cols - 1].iter().map(|s| s.to_string()).collect();
        out.push(segments[cols - 1..].join(" "));
        return out;
    }

    let mut out: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
    out.resize(cols, String::new());
    out
}

/// Render one table row to its line markup.
pub fn render_row(meta: &TableMeta, segments: &[&str]) -> String {
    let cols = meta.cols.max(1) as usize;
    let cells = reconstruct_segments(cols, segments);
    let widths = meta.normalized_widths();

    let mut html = String::with_capacity(256);
    write!(
        html,
        "<table class=\"grid-table\" data-tblid=\"{}\" data-row=\"{}\"><tbody><tr>",
        html_escape::encode_double_quoted_attribute(&meta.tbl_id),
        meta.row,
    )
    .expect("writing to a String cannot fail");

    for (i, cell) in cells.iter().enumerate() {
        write!(
            html,
            "<td class=\"tblCell-{i}\" style=\"width:{}%;\">",
            format_percent(widths[i]),
        )
        .expect("writing to a String cannot fail");

        if i > 0 {
            // Hidden but present: content collection reconstructs the line
            // text, delimiters included, from the DOM.
            html.push_str(
                "<span class=\"cell-delim\" contenteditable=\"false\" aria-hidden=\"true\">&#31;</span>",
            );
        }

        html.push_str("<span class=\"cell-content\">");
        if cell.trim().is_empty() {
            // A breaking-space placeholder keeps empty cells clickable.
            html.push_str("&nbsp;");
        } else {
            html.push_str(cell);
        }
        html.push_str("</span>");

        // A stable non-editable node for the browser to park focus on at
        // end-of-cell.
        html.push_str("<span class=\"caret-anchor\" contenteditable=\"false\"></span>");

        if i + 1 < cols {
            write!(
                html,
                "<span class=\"col-resize-handle\" contenteditable=\"false\" data-col=\"{i}\"></span>",
            )
            .expect("writing to a String cannot fail");
        }

        html.push_str("</td>");
    }

    html.push_str("</tr></tbody></table>");
    html
}

/// Percentages render with at most two decimals and no trailing zeros:
/// `50`, `33.33`, `12.5`.
fn format_percent(value: f64) -> String {
    let formatted = format!("{value:.2}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_reconstruct_exact_count_passes_through() {
        assert_eq!(reconstruct_segments(2, &["a", "b"]), vec!["a", "b"]);
    }

    #[test]
    fn test_reconstruct_single_segment_pads() {
        assert_eq!(reconstruct_segments(3, &["a"]), vec!["a", "", ""]);
    }

    #[test]
    fn test_reconstruct_excess_segments_merge_into_last_column() {
        assert_eq!(
            reconstruct_segments(2, &["a", "b", "c", "d"]),
            vec!["a", "b c d"]
        );
    }

    #[test]
    fn test_reconstruct_short_list_pads() {
        assert_eq!(reconstruct_segments(4, &["a", "b"]), vec!["a", "b", "", ""]);
    }

    #[rstest]
    #[case(50.0, "50")]
    #[case(33.333333, "33.33")]
    #[case(12.5, "12.5")]
    #[case(100.0, "100")]
    fn test_format_percent(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(format_percent(value), expected);
    }

    #[test]
    fn test_render_row_structure() {
        let meta = TableMeta::new("abc", 1, 2);
        let html = render_row(&meta, &["<b>A</b>", "B"]);

        assert!(html.starts_with("<table class=\"grid-table\" data-tblid=\"abc\" data-row=\"1\">"));
        assert_eq!(html.matches("<td ").count(), 2);
        assert!(html.contains("class=\"tblCell-0\""));
        assert!(html.contains("class=\"tblCell-1\""));
        // Segments are already HTML and pass through unescaped.
        assert!(html.contains("<b>A</b>"));
        // Delimiter marker only before the second cell.
        assert_eq!(html.matches("cell-delim").count(), 1);
        // Caret anchor per cell, resize handle on all but the last.
        assert_eq!(html.matches("caret-anchor").count(), 2);
        assert_eq!(html.matches("col-resize-handle").count(), 1);
        assert!(html.ends_with("</tr></tbody></table>"));
    }

    #[test]
    fn test_render_row_empty_cell_gets_placeholder() {
        let meta = TableMeta::new("t", 0, 2);
        let html = render_row(&meta, &["A", " "]);
        assert!(html.contains("<span class=\"cell-content\">&nbsp;</span>"));
    }

    #[test]
    fn test_render_row_equal_width_default() {
        let meta = TableMeta::new("t", 0, 4);
        let html = render_row(&meta, &["a", "b", "c", "d"]);
        assert_eq!(html.matches("width:25%;").count(), 4);
    }

    #[test]
    fn test_render_row_uses_stored_widths_padded_to_cols() {
        let mut meta = TableMeta::new("t", 0, 2);
        meta.column_widths = Some(vec![75.0, 25.0]);
        let html = render_row(&meta, &["a", "b"]);
        assert!(html.contains("width:75%;"));
        assert!(html.contains("width:25%;"));
    }

    #[test]
    fn test_render_row_escapes_table_id_attribute() {
        let meta = TableMeta::new("a\"b", 0, 1);
        let html = render_row(&meta, &["x"]);
        assert!(html.contains("data-tblid=\"a&quot;b\""));
    }

    #[test]
    fn test_render_row_reconstructs_mismatched_segments() {
        let meta = TableMeta::new("t", 0, 3);
        let html = render_row(&meta, &["only"]);
        assert_eq!(html.matches("<td ").count(), 3);
        assert_eq!(html.matches("&nbsp;").count(), 2);
    }
}
