//! Best-effort table detection from positioned text spans.
//!
//! Spans are grouped into rows by baseline, each row is cut into cells
//! wherever the horizontal gap is wider than `min_column_gap`, and any run
//! of consecutive rows sharing the same cell count becomes a table. No
//! ruling lines are consulted, so borderless tables are found too, and a
//! page without tables simply yields an empty list.

use super::spans::TextSpan;
use crate::model::Table;
use tracing::debug;

/// Table detector configuration.
#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    /// Minimum rows (including the header) for a run to count as a table.
    pub min_rows: usize,
    pub min_columns: usize,
    /// More cells than this usually means word-level splitting, not a table.
    pub max_columns: usize,
    /// Baseline tolerance as a fraction of the font size.
    pub y_tolerance_factor: f32,
    /// Horizontal gap (points) that separates two cells.
    pub min_column_gap: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 12,
            y_tolerance_factor: 0.4,
            min_column_gap: 15.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableDetector {
    config: TableDetectorConfig,
}

#[derive(Debug, Clone)]
struct Row {
    cells: Vec<String>,
}

impl TableDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables found on the page, top to bottom, header row first.
    pub fn detect(&self, spans: &[TextSpan]) -> Vec<Table> {
        let rows = self.group_into_rows(spans);
        let mut tables = Vec::new();
        let mut start = 0;

        while start < rows.len() {
            let width = rows[start].cells.len();
            let mut end = start + 1;
            while end < rows.len() && rows[end].cells.len() == width {
                end += 1;
            }

            let run = &rows[start..end];
            if self.is_table(run) {
                tables.push(run.iter().map(|r| r.cells.clone()).collect());
            }
            start = end;
        }

        debug!("TableDetector: {} rows → {} tables", rows.len(), tables.len());
        tables
    }

    fn is_table(&self, run: &[Row]) -> bool {
        let Some(first) = run.first() else {
            return false;
        };
        let columns = first.cells.len();
        if run.len() < self.config.min_rows
            || columns < self.config.min_columns
            || columns > self.config.max_columns
        {
            return false;
        }
        // A run whose first column is all bullets or numbers is a list.
        !run.iter().all(|r| is_list_marker(&r.cells[0]))
    }

    /// Groups spans into rows (top to bottom) and each row into cells.
    fn group_into_rows(&self, spans: &[TextSpan]) -> Vec<Row> {
        let mut sorted: Vec<&TextSpan> = spans.iter().collect();
        sorted.sort_by(|a, b| {
            b.y.partial_cmp(&a.y)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut lines: Vec<Vec<&TextSpan>> = Vec::new();
        let mut current_y: Option<f32> = None;
        for span in sorted {
            let tolerance = span.font_size * self.config.y_tolerance_factor;
            match (current_y, lines.last_mut()) {
                (Some(y), Some(line)) if (span.y - y).abs() <= tolerance => line.push(span),
                _ => {
                    current_y = Some(span.y);
                    lines.push(vec![span]);
                }
            }
        }

        lines
            .into_iter()
            .map(|mut line| {
                line.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
                Row {
                    cells: self.split_cells(&line),
                }
            })
            .collect()
    }

    fn split_cells(&self, line: &[&TextSpan]) -> Vec<String> {
        let mut cells: Vec<String> = Vec::new();
        let mut prev_right: Option<f32> = None;
        for span in line {
            let text = span.text.trim();
            let gap = prev_right.map(|r| span.x - r);
            match (gap, cells.last_mut()) {
                (Some(g), Some(cell)) if g < self.config.min_column_gap => {
                    if !cell.is_empty() && !text.is_empty() {
                        cell.push(' ');
                    }
                    cell.push_str(text);
                }
                _ => cells.push(text.to_string()),
            }
            prev_right = Some(span.right());
        }
        cells
    }
}

fn is_list_marker(text: &str) -> bool {
    let t = text.trim();
    if matches!(t, "-" | "–" | "—" | "•" | "·" | "*" | "○" | "▪" | "◦" | "■" | "●") {
        return true;
    }
    let cleaned: String = t.chars().filter(|c| !c.is_whitespace()).collect();
    match cleaned.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) if pos > 0 => matches!(&cleaned[pos..], "." | ")"),
        _ => false,
    }
}
