//! Collected result sets and their text-table rendering.

use crate::value::SqlValue;
use tokio_postgres::Row;

const NULL_TEXT: &str = "NULL";

/// Rows and column names read from one query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSetCollector {
    columns: Vec<String>,
    rows: Vec<Vec<Option<SqlValue>>>,
}

impl ResultSetCollector {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Collect every row of a query result.
    ///
    /// Column names come from the first row; an empty result has none.
    pub fn from_rows(rows: &[Row]) -> Self {
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| SqlValue::from_row(row, i)).collect())
            .collect();
        Self { columns, rows }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Name of column `idx` (0-based).
    pub fn column_name(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).map(String::as_str)
    }

    pub fn rows(&self) -> &[Vec<Option<SqlValue>>] {
        &self.rows
    }

    /// Append one row; `None` cells are SQL `NULL`.
    pub fn add_row(&mut self, row: Vec<Option<SqlValue>>) {
        self.rows.push(row);
    }

    /// Drop collected rows, keeping the columns.
    pub fn reset(&mut self) {
        self.rows.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0xAC00..=0xD7AF // Hangul Syllables
        | 0x1100..=0x11FF // Hangul Jamo
        | 0x3130..=0x318F) // Hangul Compatibility Jamo
}

/// Terminal width of `s`: 1 per character, 1.7 for Hangul, rounded down.
pub fn display_width(s: &str) -> usize {
    let tenths: usize = s.chars().map(|c| if is_wide(c) { 17 } else { 10 }).sum();
    tenths / 10
}

fn pad_right(out: &mut String, s: &str, width: usize) {
    out.push_str(s);
    for _ in display_width(s)..width {
        out.push(' ');
    }
}

fn boundary_line(widths: &[usize]) -> String {
    let mut line = String::from("|");
    for &w in widths {
        line.extend(std::iter::repeat_n('-', w));
        line.push('|');
    }
    line.push('\n');
    line
}

/// Render the collected rows as a text table and reset the collector.
///
/// ```text
///
/// |---|-----|
/// |id |name |
/// |---|-----|
/// |1  |Ann  |
/// |2  |NULL |
/// |---|-----|
/// ```
pub fn render_table(collector: &mut ResultSetCollector) -> String {
    let mut widths: Vec<usize> = collector.columns.iter().map(|c| display_width(c)).collect();

    let cell_texts: Vec<Vec<String>> = collector
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Some(value) => value.to_string(),
                    None => NULL_TEXT.to_string(),
                })
                .collect()
        })
        .collect();

    for row in &cell_texts {
        for (i, text) in row.iter().enumerate() {
            match widths.get_mut(i) {
                Some(w) => *w = (*w).max(display_width(text)),
                None => widths.push(display_width(text)),
            }
        }
    }
    for w in &mut widths {
        *w += 1;
    }

    let boundary = boundary_line(&widths);
    let mut table = String::from("\n");
    table.push_str(&boundary);
    table.push('|');
    for (i, name) in collector.columns.iter().enumerate() {
        pad_right(&mut table, name, widths[i]);
        table.push('|');
    }
    table.push('\n');
    table.push_str(&boundary);

    for row in &cell_texts {
        table.push('|');
        for (i, text) in row.iter().enumerate() {
            pad_right(&mut table, text, widths[i]);
            table.push('|');
        }
        table.push('\n');
    }
    table.push_str(&boundary);

    collector.reset();
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> ResultSetCollector {
        let mut c = ResultSetCollector::new(["id", "name"]);
        c.add_row(vec![Some(SqlValue::Int(1)), Some(SqlValue::from("Ann"))]);
        c.add_row(vec![Some(SqlValue::Int(2)), None]);
        c
    }

    #[test]
    fn renders_header_and_null_cells() {
        let mut c = people();
        let table = render_table(&mut c);
        assert_eq!(
            table,
            "\n|---|-----|\n|id |name |\n|---|-----|\n|1  |Ann  |\n|2  |NULL |\n|---|-----|\n"
        );
    }

    #[test]
    fn rendering_resets_the_collector() {
        let mut c = people();
        render_table(&mut c);
        assert!(c.is_empty());
        assert_eq!(c.column_count(), 2);
        assert_eq!(c.column_name(1), Some("name"));
    }

    #[test]
    fn boundary_length_is_one_plus_padded_widths() {
        let widths = [3usize, 5, 1];
        let line = boundary_line(&widths);
        // Excluding the newline.
        assert_eq!(line.len() - 1, 1 + widths.iter().map(|w| w + 1).sum::<usize>());
    }

    #[test]
    fn null_cell_counts_as_four_wide() {
        let mut c = ResultSetCollector::new(["x"]);
        c.add_row(vec![None]);
        let table = render_table(&mut c);
        assert!(table.contains("|x    |"));
        assert!(table.contains("|NULL |"));
    }

    #[test]
    fn hangul_width_is_seventeen_tenths() {
        assert_eq!(display_width("abc"), 3);
        assert_eq!(display_width("가"), 1);
        assert_eq!(display_width("가나"), 3);
        assert_eq!(display_width("가나다"), 5);
        assert_eq!(display_width("ㄱㄴ"), 3);
        assert_eq!(display_width("\u{1100}\u{1100}"), 3);
        assert_eq!(display_width(""), 0);
    }

    #[test]
    fn mixed_width_rows_align() {
        let mut c = ResultSetCollector::new(["name"]);
        c.add_row(vec![Some(SqlValue::from("가나다"))]);
        c.add_row(vec![Some(SqlValue::from("abc"))]);
        let table = render_table(&mut c);
        let lines: Vec<&str> = table.lines().skip(1).collect();
        // Width of "가나다" is 5, padded to 6.
        assert_eq!(lines[0], "|------|");
        assert_eq!(lines[3], "|가나다 |");
        assert_eq!(lines[4], "|abc   |");
    }

    #[test]
    fn empty_collector_renders_frame_only() {
        let mut c = ResultSetCollector::new(["a"]);
        assert_eq!(render_table(&mut c), "\n|--|\n|a |\n|--|\n|--|\n");
    }
}
