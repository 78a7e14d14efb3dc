//! Wholesale replacement of every record with one record per CSV row.

use std::fmt;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::error::ValidationError;
use crate::schema::Schema;
use crate::table::{Row, Table};
use crate::xml::Element;

/// Write policy for a full replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullReplace {
  /// Write blank cells as empty fields instead of leaving them out.
  pub write_empty: bool,
}

impl Default for FullReplace {
  fn default() -> Self {
    Self { write_empty: true }
  }
}

impl FullReplace {
  /// Drops every record under `container` and rebuilds them from `table`.
  ///
  /// A table without data rows is rejected before any record is removed. Keys play no
  /// part here: rows sharing a key simply produce records sharing a key.
  pub fn apply(
    &self,
    container: &mut Element,
    schema: &Schema,
    table: &Table,
  ) -> Result<ReplaceReport, ValidationError> {
    if table.is_empty() {
      return Err(ValidationError::EmptyCsv);
    }

    let removed = container.remove_elements(&schema.record_tag);

    #[cfg(feature = "tracing")]
    debug!("Removed {} {} records", removed, schema.record_tag);

    for row in &table.rows {
      container.push_element(self.build_record(&schema.record_tag, &table.header, row));
    }

    Ok(ReplaceReport {
      record_tag: schema.record_tag.clone(),
      removed,
      added: table.rows.len(),
    })
  }

  /// One field per header column, in header order.
  fn build_record(&self, record_tag: &str, header: &[String], row: &Row) -> Element {
    let mut record = Element::new(record_tag);
    for column in header.iter().filter(|column| !column.is_empty()) {
      let value = row.value(column);
      if !self.write_empty && value.is_empty() {
        continue;
      }
      record.push_element(Element::with_text(column.as_str(), value));
    }
    record
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceReport {
  pub record_tag: String,
  pub removed: usize,
  pub added: usize,
}

impl fmt::Display for ReplaceReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "- Removed {}: {}", self.record_tag, self.removed)?;
    writeln!(f, "- Added {}:   {}", self.record_tag, self.added)
  }
}
