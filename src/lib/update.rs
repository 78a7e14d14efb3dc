//! Selective update of existing records from CSV rows.
//!
//! Each row is matched to a record by its key. Only fields named both by the CSV header
//! and by the include list (or the schema's field set) are written, and a field is
//! only touched when its value actually changes.
//!
//! # Row handling
//!
//! 1. Rows with an empty key are skipped.
//! 2. Rows whose key matches an indexed record update that record.
//! 3. Unmatched rows are skipped, or appended as new records when `allow_add` is set.
//!    A new record keyed by name carries that name. One keyed by address without a
//!    `Name` gets `<tag>_<VAddr>_<DBAddr>`.
//! 4. Blank cells leave the record untouched unless `update_empty` is set.

use std::fmt;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::error::ValidationError;
use crate::key::{Key, KeyMode, NAME_FIELD, RecordIndex, find_duplicate_keys};
use crate::schema::Schema;
use crate::table::{Row, Table};
use crate::xml::Element;

const MAX_LISTED_CHANGES: usize = 20;

/// Matching and write policy for a selective update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectiveUpdate {
  pub key_mode: KeyMode,
  /// Restricts updates to these fields, in this order. `None` means the schema fields.
  pub include_fields: Option<Vec<String>>,
  /// Append unmatched rows as new records instead of skipping them.
  pub allow_add: bool,
  /// Let blank cells overwrite existing values.
  pub update_empty: bool,
}

impl SelectiveUpdate {
  /// Applies `table` to the records under `container`.
  ///
  /// Duplicate keys in the CSV are rejected before anything is modified.
  pub fn apply(
    &self,
    container: &mut Element,
    schema: &Schema,
    table: &Table,
  ) -> Result<UpdateReport, ValidationError> {
    let duplicates = find_duplicate_keys(&table.rows, self.key_mode);
    if !duplicates.is_empty() {
      return Err(ValidationError::DuplicateKeys {
        mode: self.key_mode,
        keys: duplicates,
      });
    }

    let fields = self.fields_to_update(&table.header, schema);

    #[cfg(feature = "tracing")]
    debug!("Updating fields {:?} matched by {}", fields, self.key_mode);

    let mut index = RecordIndex::build(container, &schema.record_tag, self.key_mode);
    let mut report = UpdateReport::new(&schema.record_tag);

    for row in &table.rows {
      let key = self.key_mode.derive(row);
      if key.is_empty() {
        #[cfg(feature = "tracing")]
        trace!("Skipping row with empty key");

        report.outcomes.push(RowOutcome::SkippedEmptyKey);
        continue;
      }

      let mut created_name = None;
      let position = match index.get(&key) {
        Some(position) => {
          report.outcomes.push(RowOutcome::Matched);
          position
        }
        None if !self.allow_add => {
          #[cfg(feature = "tracing")]
          trace!("No record for key {}, skipping", key);

          report.outcomes.push(RowOutcome::SkippedNotFound);
          continue;
        }
        None => {
          #[cfg(feature = "tracing")]
          trace!("No record for key {}, adding", key);

          let mut record = Element::new(&schema.record_tag);
          if let Some(name) = self.name_for_new_record(&schema.record_tag, &key, row) {
            record.set_child_text(NAME_FIELD, name.as_str());
            report.record_change(&key, NAME_FIELD, "", &name);
            created_name = Some(name);
          }

          let position = container.push_element(record);
          index.insert(key.clone(), position);
          report.outcomes.push(RowOutcome::Added);
          position
        }
      };

      let Some(record) = container.element_at_mut(position) else {
        continue;
      };

      for field in &fields {
        let new_value = match &created_name {
          Some(name) if field == NAME_FIELD => name.as_str(),
          _ => row.value(field),
        };

        if !self.update_empty && new_value.is_empty() {
          continue;
        }

        let old_value = record.child_text(field).unwrap_or_default();
        if old_value != new_value {
          #[cfg(feature = "tracing")]
          trace!("{}: {} {:?} -> {:?}", key, field, old_value, new_value);

          record.set_child_text(field, new_value);
          report.record_change(&key, field, &old_value, new_value);
        }
      }
    }

    #[cfg(feature = "tracing")]
    debug!(
      "Selective update done: {} changes, {} added, {} skipped",
      report.changes.len(),
      report.added(),
      report.skipped()
    );

    Ok(report)
  }

  /// The header columns this run may write, in the order of whichever list drives the
  /// selection.
  ///
  /// Without an include list, the match key `Name` is never rewritten on matched records.
  pub fn fields_to_update(&self, header: &[String], schema: &Schema) -> Vec<String> {
    match &self.include_fields {
      Some(include) => include
        .iter()
        .filter(|field| header.contains(field))
        .cloned()
        .collect(),
      None => header
        .iter()
        .filter(|column| schema.recognizes(column))
        .filter(|column| !(self.key_mode == KeyMode::Name && column.as_str() == NAME_FIELD))
        .cloned()
        .collect(),
    }
  }

  /// `Name` written when a record is created: the key itself in `Name` mode, or
  /// `<tag>_<VAddr>_<DBAddr>` for an address key whose row has no name.
  fn name_for_new_record(&self, record_tag: &str, key: &Key, row: &Row) -> Option<String> {
    match key {
      Key::Name(name) => Some(name.clone()),
      Key::Address { vaddr, dbaddr } if row.value(NAME_FIELD).is_empty() => {
        Some(format!("{}_{}_{}", record_tag, vaddr, dbaddr))
      }
      Key::Address { .. } => None,
    }
  }
}

/// What happened to one CSV row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
  Matched,
  Added,
  SkippedEmptyKey,
  SkippedNotFound,
}

/// One field whose value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
  pub key: String,
  pub field: String,
  pub old: String,
  pub new: String,
}

impl fmt::Display for Change {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}: {}: '{}' -> '{}'",
      self.key, self.field, self.old, self.new
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateReport {
  pub record_tag: String,
  /// Field changes in the order they were made.
  pub changes: Vec<Change>,
  /// One entry per CSV row, in row order.
  pub outcomes: Vec<RowOutcome>,
}

impl UpdateReport {
  fn new(record_tag: &str) -> Self {
    Self {
      record_tag: record_tag.to_string(),
      ..Self::default()
    }
  }

  fn record_change(&mut self, key: &Key, field: &str, old: &str, new: &str) {
    self.changes.push(Change {
      key: key.to_string(),
      field: field.to_string(),
      old: old.to_string(),
      new: new.to_string(),
    });
  }

  pub fn added(&self) -> usize {
    self.count(|outcome| outcome == RowOutcome::Added)
  }

  /// Rows skipped for an empty key or a missing record.
  pub fn skipped(&self) -> usize {
    self.count(|outcome| {
      matches!(
        outcome,
        RowOutcome::SkippedEmptyKey | RowOutcome::SkippedNotFound
      )
    })
  }

  fn count(&self, predicate: impl Fn(RowOutcome) -> bool) -> usize {
    self
      .outcomes
      .iter()
      .filter(|outcome| predicate(**outcome))
      .count()
  }
}

impl fmt::Display for UpdateReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "Changed fields: {}; Added {}: {}; Skipped rows: {}",
      self.changes.len(),
      self.record_tag,
      self.added(),
      self.skipped()
    )?;
    for change in self.changes.iter().take(MAX_LISTED_CHANGES) {
      writeln!(f, "- {}", change)?;
    }
    if self.changes.len() > MAX_LISTED_CHANGES {
      writeln!(
        f,
        "... {} more changes",
        self.changes.len() - MAX_LISTED_CHANGES
      )?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::xml::Document;

  const NODE: &str = "<Node>\
      <BNObj><Name>Voltage</Name><VAddr>40001</VAddr><DBAddr>0</DBAddr><Units>V</Units><DSize>2</DSize></BNObj>\
      <BNObj><Name>Current</Name><VAddr>40002</VAddr><DBAddr>0</DBAddr><Units>A</Units></BNObj>\
    </Node>";

  fn container() -> Element {
    Document::try_from(NODE).unwrap().root
  }

  fn record<'a>(container: &'a Element, name: &str) -> &'a Element {
    container
      .elements()
      .find(|r| r.child_text("Name").as_deref() == Some(name))
      .unwrap()
  }

  #[test]
  fn test_updates_only_changed_fields() {
    let mut node = container();
    let table = Table::try_from("Name,Units,DSize\nVoltage,mV,2\nCurrent,A,4").unwrap();

    let report = SelectiveUpdate::default()
      .apply(&mut node, &Schema::default(), &table)
      .unwrap();

    assert_eq!(
      report.changes,
      vec![
        Change {
          key: "Voltage".into(),
          field: "Units".into(),
          old: "V".into(),
          new: "mV".into()
        },
        Change {
          key: "Current".into(),
          field: "DSize".into(),
          old: "".into(),
          new: "4".into()
        },
      ]
    );
    assert_eq!(record(&node, "Voltage").child_text("Units").as_deref(), Some("mV"));
    assert_eq!(record(&node, "Current").child_text("DSize").as_deref(), Some("4"));
    assert_eq!(report.added(), 0);
    assert_eq!(report.skipped(), 0);
  }

  #[test]
  fn test_field_scoping_by_header() {
    let mut node = container();
    let table = Table::try_from("Name,Units,Comment\nVoltage,kV,ignored").unwrap();

    let report = SelectiveUpdate::default()
      .apply(&mut node, &Schema::default(), &table)
      .unwrap();

    assert_eq!(report.changes.len(), 1);
    let voltage = record(&node, "Voltage");
    assert_eq!(voltage.child_text("Units").as_deref(), Some("kV"));
    assert_eq!(voltage.child_text("DSize").as_deref(), Some("2"));
    assert_eq!(voltage.child_text("Comment"), None);
  }

  #[test]
  fn test_include_fields_order_and_filter() {
    let update = SelectiveUpdate {
      include_fields: Some(vec!["Units".into(), "Mask".into(), "Float".into()]),
      ..SelectiveUpdate::default()
    };
    let header = vec!["Float".to_string(), "Name".to_string(), "Units".to_string()];

    assert_eq!(
      update.fields_to_update(&header, &Schema::default()),
      vec!["Units", "Float"]
    );
    assert_eq!(
      SelectiveUpdate::default().fields_to_update(&header, &Schema::default()),
      vec!["Float", "Units"]
    );

    let by_address = SelectiveUpdate {
      key_mode: KeyMode::VAddrDBAddr,
      ..SelectiveUpdate::default()
    };
    assert_eq!(
      by_address.fields_to_update(&header, &Schema::default()),
      vec!["Float", "Name", "Units"]
    );
  }

  #[test]
  fn test_name_key_is_not_rewritten() {
    let mut node = Document::try_from(
      "<Node><BNObj><Name> A </Name><Units>V</Units></BNObj></Node>",
    )
    .unwrap()
    .root;
    let table = Table::try_from("Name,Units
A,mV").unwrap();

    let report = SelectiveUpdate::default()
      .apply(&mut node, &Schema::default(), &table)
      .unwrap();

    assert_eq!(
      report.changes,
      vec![Change {
        key: "A".into(),
        field: "Units".into(),
        old: "V".into(),
        new: "mV".into()
      }]
    );
    let record = node.elements().next().unwrap();
    assert_eq!(record.child_text("Name").as_deref(), Some(" A "));
    assert_eq!(record.child_text("Units").as_deref(), Some("mV"));
  }

  #[test]
  fn test_blank_cells_skipped_unless_update_empty() {
    let table = Table::try_from("Name,Units\nVoltage,").unwrap();

    let mut node = container();
    let report = SelectiveUpdate::default()
      .apply(&mut node, &Schema::default(), &table)
      .unwrap();
    assert!(report.changes.is_empty());
    assert_eq!(record(&node, "Voltage").child_text("Units").as_deref(), Some("V"));

    let mut node = container();
    let update = SelectiveUpdate {
      update_empty: true,
      ..SelectiveUpdate::default()
    };
    let report = update.apply(&mut node, &Schema::default(), &table).unwrap();
    assert_eq!(report.changes.len(), 1);
    assert_eq!(record(&node, "Voltage").child_text("Units").as_deref(), Some(""));
  }

  #[test]
  fn test_skips_empty_and_unknown_keys() {
    let mut node = container();
    let table = Table::try_from("Name,Units\n,V\nPower,W").unwrap();

    let report = SelectiveUpdate::default()
      .apply(&mut node, &Schema::default(), &table)
      .unwrap();

    assert_eq!(
      report.outcomes,
      vec![RowOutcome::SkippedEmptyKey, RowOutcome::SkippedNotFound]
    );
    assert_eq!(report.skipped(), 2);
    assert_eq!(node.elements().count(), 2);
  }

  #[test]
  fn test_add_by_name() {
    let mut node = container();
    let table = Table::try_from("Name,Units\nPower,W").unwrap();
    let update = SelectiveUpdate {
      allow_add: true,
      ..SelectiveUpdate::default()
    };

    let report = update.apply(&mut node, &Schema::default(), &table).unwrap();

    assert_eq!(report.added(), 1);
    let power = record(&node, "Power");
    let fields: Vec<&str> = power.elements().map(|e| e.name.as_str()).collect();
    assert_eq!(fields, vec!["Name", "Units"]);
  }

  #[test]
  fn test_add_by_address_synthesizes_name() {
    let mut node = container();
    let table = Table::try_from("VAddr,DBAddr,Units\n40003,0,W").unwrap();
    let update = SelectiveUpdate {
      key_mode: KeyMode::VAddrDBAddr,
      allow_add: true,
      ..SelectiveUpdate::default()
    };

    let report = update.apply(&mut node, &Schema::default(), &table).unwrap();

    assert_eq!(report.added(), 1);
    let added = record(&node, "BNObj_40003_0");
    assert_eq!(added.child_text("VAddr").as_deref(), Some("40003"));
    assert_eq!(added.child_text("Units").as_deref(), Some("W"));
    assert_eq!(report.changes[0].field, "Name");
    assert_eq!(report.changes[0].key, "40003+0");
  }

  #[test]
  fn test_synthesized_name_beats_blank_name_cell() {
    let mut node = container();
    let table = Table::try_from("Name,VAddr,DBAddr\n,40003,1").unwrap();
    let update = SelectiveUpdate {
      key_mode: KeyMode::VAddrDBAddr,
      allow_add: true,
      update_empty: true,
      ..SelectiveUpdate::default()
    };

    let report = update.apply(&mut node, &Schema::default(), &table).unwrap();

    assert_eq!(report.added(), 1);
    let names: Vec<_> = report
      .changes
      .iter()
      .filter(|c| c.field == "Name")
      .collect();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].new, "BNObj_40003_1");
  }

  #[test]
  fn test_match_by_address_updates_name() {
    let mut node = container();
    let table = Table::try_from("VAddr,DBAddr,Name\n40002,0,Amps").unwrap();
    let update = SelectiveUpdate {
      key_mode: KeyMode::VAddrDBAddr,
      ..SelectiveUpdate::default()
    };

    let report = update.apply(&mut node, &Schema::default(), &table).unwrap();

    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].old, "Current");
    assert_eq!(record(&node, "Amps").child_text("VAddr").as_deref(), Some("40002"));
  }

  #[test]
  fn test_duplicate_keys_rejected_before_mutation() {
    let mut node = container();
    let original = node.clone();
    let table = Table::try_from("Name,Units\nVoltage,mV\nVoltage,kV").unwrap();

    let result = SelectiveUpdate::default().apply(&mut node, &Schema::default(), &table);

    assert!(matches!(
      result,
      Err(ValidationError::DuplicateKeys { ref keys, .. }) if keys == &vec![Key::Name("Voltage".into())]
    ));
    assert_eq!(node, original);
  }

  #[test]
  fn test_second_run_makes_no_changes() {
    let mut node = container();
    let table = Table::try_from("VAddr,DBAddr,Units,Mask\n40001,0,kV,1\n40009,2,W,").unwrap();
    let update = SelectiveUpdate {
      key_mode: KeyMode::VAddrDBAddr,
      allow_add: true,
      ..SelectiveUpdate::default()
    };

    let first = update.apply(&mut node, &Schema::default(), &table).unwrap();
    assert!(!first.changes.is_empty());

    let second = update.apply(&mut node, &Schema::default(), &table).unwrap();
    assert!(second.changes.is_empty());
    assert_eq!(second.added(), 0);
  }

  #[test]
  fn test_report_display_truncates() {
    let mut report = UpdateReport::new("BNObj");
    for i in 0..22 {
      report.record_change(&Key::Name(format!("P{}", i)), "Units", "V", "mV");
    }
    report.outcomes.push(RowOutcome::SkippedNotFound);

    let text = report.to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Changed fields: 22; Added BNObj: 0; Skipped rows: 1");
    assert_eq!(lines[1], "- P0: Units: 'V' -> 'mV'");
    assert_eq!(lines.len(), 22);
    assert_eq!(lines[21], "... 2 more changes");
  }
}
