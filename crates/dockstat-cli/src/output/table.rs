//! Column-aligned plain text tables.

use std::io::{self, Write};

use unicode_width::UnicodeWidthStr;

const COLUMN_GAP: &str = "   ";

/// A table whose columns are padded to their widest cell.
///
/// Widths are measured in terminal columns, so names containing wide
/// characters still line up.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row. Missing cells render empty; surplus cells are dropped.
    pub(crate) fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells
            .into_iter()
            .take(self.header.len())
            .map(Into::into)
            .collect();
        row.resize(self.header.len(), String::new());
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.header.iter().map(|cell| cell.width()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.width());
            }
        }
        widths
    }

    /// Writes the header and every row, one line each.
    pub(crate) fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let widths = self.widths();
        write_line(out, &self.header, &widths)?;
        for row in &self.rows {
            write_line(out, row, &widths)?;
        }
        Ok(())
    }
}

fn write_line<W: Write>(out: &mut W, cells: &[String], widths: &[usize]) -> io::Result<()> {
    let mut line = String::new();
    let last = cells.len().saturating_sub(1);
    for (index, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if index > 0 {
            line.push_str(COLUMN_GAP);
        }
        line.push_str(cell);
        if index < last {
            let padding = width.saturating_sub(cell.width());
            line.extend(std::iter::repeat_n(' ', padding));
        }
    }
    writeln!(out, "{}", line.trim_end())
}

/// Writes `label: value` pairs with the values aligned in one column.
pub(crate) fn write_fields<W: Write>(out: &mut W, fields: &[(&str, String)]) -> io::Result<()> {
    let label_width = fields
        .iter()
        .map(|(label, _)| label.width())
        .max()
        .unwrap_or(0);
    for (label, value) in fields {
        let padding = label_width.saturating_sub(label.width());
        writeln!(out, "{label}:{}  {value}", " ".repeat(padding))?;
    }
    Ok(())
}
