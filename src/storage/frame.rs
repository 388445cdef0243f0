//! Minimal in-memory table of text cells.
//!
//! Cells keep the exact text found in the delimited file; typing happens in
//! the warehouse, either by autodetection or by an explicit load schema.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{FerryError, Result};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(FerryError::InvalidSchema(format!(
                "Row has {} cells but frame has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Reads delimited text whose first record is the header.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(|s| s.to_string()).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(|s| s.to_string()).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn read_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_csv(File::open(path)?)
    }

    /// Header plus rows, comma separated.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.into_inner().map_err(|e| FerryError::Io(e.into_error()))
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_csv()?)?;
        Ok(())
    }

    /// Stacks frames in order. Columns are the union of all inputs in
    /// first-seen order; cells a frame does not have are left empty.
    pub fn concat(frames: impl IntoIterator<Item = Frame>) -> Frame {
        let frames: Vec<Frame> = frames.into_iter().collect();

        let mut columns: Vec<String> = Vec::new();
        for frame in &frames {
            for column in &frame.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let total = frames.iter().map(Frame::num_rows).sum();
        let mut rows = Vec::with_capacity(total);
        for frame in frames {
            let positions: Vec<Option<usize>> = columns
                .iter()
                .map(|c| frame.columns.iter().position(|fc| fc == c))
                .collect();

            for row in frame.rows {
                rows.push(
                    positions
                        .iter()
                        .map(|p| p.map(|i| row[i].clone()).unwrap_or_default())
                        .collect(),
                );
            }
        }

        Frame { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    pub fn head(&self, n: usize) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_read_csv_keeps_text() {
        let frame = Frame::read_csv("id,name\n1,\"a, b\"\n2,c\n".as_bytes()).unwrap();
        assert_eq!(frame.columns(), &cols(&["id", "name"])[..]);
        assert_eq!(frame.column("name").unwrap(), vec!["a, b", "c"]);
    }

    #[test]
    fn test_read_csv_header_only() {
        let frame = Frame::read_csv("id,name\n".as_bytes()).unwrap();
        assert_eq!(frame.num_columns(), 2);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_read_csv_rejects_ragged_rows() {
        assert!(matches!(
            Frame::read_csv("a,b\n1,2,3\n".as_bytes()),
            Err(FerryError::Csv(_))
        ));
    }

    #[test]
    fn test_to_csv_quotes_when_needed() {
        let frame = Frame::from_rows(cols(&["id", "note"]), vec![row(&["1", "x,y"])]).unwrap();
        assert_eq!(String::from_utf8(frame.to_csv().unwrap()).unwrap(), "id,note\n1,\"x,y\"\n");
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut frame = Frame::new(cols(&["a", "b"]));
        assert!(frame.push_row(row(&["1"])).is_err());
    }

    #[test]
    fn test_concat_unions_columns() {
        let a = Frame::from_rows(cols(&["id", "x"]), vec![row(&["1", "a"])]).unwrap();
        let b = Frame::from_rows(cols(&["y", "id"]), vec![row(&["b", "2"])]).unwrap();

        let merged = Frame::concat([a, b]);
        assert_eq!(merged.columns(), &cols(&["id", "x", "y"])[..]);
        assert_eq!(merged.rows(), &[row(&["1", "a", ""]), row(&["2", "", "b"])][..]);
    }

    #[test]
    fn test_concat_empty() {
        let merged = Frame::concat(Vec::new());
        assert_eq!(merged.num_columns(), 0);
        assert_eq!(merged.num_rows(), 0);
    }
}
