//! CSV loading for record sheets.
//!
//! A sheet is a header row followed by data rows. Column names and cell values are
//! trimmed, a leading UTF-8 byte-order marker is ignored, and cells missing from a
//! short row read as empty strings.

use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One data row, keeping the column order of the header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
  cells: Vec<(String, String)>,
}

impl Row {
  /// Value of `column`, or `None` if the sheet has no such column.
  ///
  /// A column name that appears twice in the header resolves to its last cell.
  pub fn get(&self, column: &str) -> Option<&str> {
    self
      .cells
      .iter()
      .rev()
      .find(|(name, _)| name == column)
      .map(|(_, value)| value.as_str())
  }

  /// Value of `column`, with absent columns reading as the empty string.
  pub fn value(&self, column: &str) -> &str {
    self.get(column).unwrap_or_default()
  }
}

impl<K, V> FromIterator<(K, V)> for Row
where
  K: Into<String>,
  V: Into<String>,
{
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self {
      cells: iter
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect(),
    }
  }
}

/// A loaded sheet: the trimmed header and every data row in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
  pub header: Vec<String>,
  pub rows: Vec<Row>,
}

impl Table {
  /// Reads and parses the sheet at `path`.
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
    #[cfg(feature = "tracing")]
    debug!("Loading CSV from {:?}", path.as_ref());

    let bytes = std::fs::read(path).map_err(TableError::Io)?;
    Self::try_from(bytes.as_slice())
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }
}

impl TryFrom<&[u8]> for Table {
  type Error = TableError;

  fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
      .has_headers(true)
      .flexible(true)
      .from_reader(bytes);

    let header: Vec<String> = reader
      .headers()?
      .iter()
      .map(|name| name.trim().to_string())
      .collect();

    if header.is_empty() {
      return Err(TableError::MissingHeader);
    }

    #[cfg(feature = "tracing")]
    trace!("CSV header: {:?}", header);

    let mut rows = Vec::new();
    for record in reader.records() {
      let record = record?;
      let row: Row = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), record.get(i).unwrap_or_default().trim()))
        .collect();
      rows.push(row);
    }

    #[cfg(feature = "tracing")]
    debug!("Parsed {} CSV rows", rows.len());

    Ok(Self { header, rows })
  }
}

impl TryFrom<&str> for Table {
  type Error = TableError;

  fn try_from(s: &str) -> Result<Self, Self::Error> {
    Self::try_from(s.as_bytes())
  }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
  #[error("CSV file IO error: {0}")]
  Io(std::io::Error),
  #[error("CSV parse error: {0}")]
  Csv(#[from] csv::Error),
  #[error("CSV has no header. Expecting at least 'Name' or 'VAddr,DBAddr'")]
  MissingHeader,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_load_simple() {
    let table = Table::try_from("Name,Units\nA,V\nB,A").unwrap();

    assert_eq!(table.header, vec!["Name", "Units"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0].value("Name"), "A");
    assert_eq!(table.rows[1].value("Units"), "A");
  }

  #[test]
  fn test_trims_names_and_values() {
    let table = Table::try_from(" Name , Units \n  A  ,\tV ").unwrap();

    assert_eq!(table.header, vec!["Name", "Units"]);
    assert_eq!(table.rows[0].get("Name"), Some("A"));
    assert_eq!(table.rows[0].get("Units"), Some("V"));
  }

  #[test]
  fn test_strips_byte_order_mark() {
    let table = Table::try_from(b"\xEF\xBB\xBFName,VAddr\nA,1".as_slice()).unwrap();

    assert_eq!(table.header[0], "Name");
    assert_eq!(table.rows[0].value("Name"), "A");
  }

  #[test]
  fn test_short_and_long_rows() {
    let table = Table::try_from("Name,Units,Mask\nA\nB,V,1,extra").unwrap();

    assert_eq!(table.rows[0].get("Units"), Some(""));
    assert_eq!(table.rows[0].get("Mask"), Some(""));
    assert_eq!(table.rows[1].value("Mask"), "1");
    assert_eq!(table.rows[1].cells.len(), 3);
  }

  #[test]
  fn test_missing_column_reads_empty() {
    let table = Table::try_from("Name\nA").unwrap();

    assert_eq!(table.rows[0].get("Units"), None);
    assert_eq!(table.rows[0].value("Units"), "");
  }

  #[test]
  fn test_quoted_values() {
    let table = Table::try_from("Name,Units\n\"A, B\",\"deg \"\"C\"\"\"").unwrap();

    assert_eq!(table.rows[0].value("Name"), "A, B");
    assert_eq!(table.rows[0].value("Units"), "deg \"C\"");
  }

  #[test]
  fn test_header_only() {
    let table = Table::try_from("Name,Units\n").unwrap();

    assert_eq!(table.header.len(), 2);
    assert!(table.is_empty());
  }

  #[test]
  fn test_missing_header() {
    assert!(matches!(
      Table::try_from(""),
      Err(TableError::MissingHeader)
    ));
    assert!(matches!(
      Table::try_from(b"\xEF\xBB\xBF".as_slice()),
      Err(TableError::MissingHeader)
    ));
  }

  #[test]
  fn test_duplicate_column_last_wins() {
    let table = Table::try_from("Name,Units,Units\nA,V,mV").unwrap();

    assert_eq!(table.rows[0].value("Units"), "mV");
  }
}
