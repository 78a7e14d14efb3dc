//! Record keys: how a CSV row or an existing record is identified for matching.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::table::Row;
use crate::xml::Element;

pub const NAME_FIELD: &str = "Name";
pub const VADDR_FIELD: &str = "VAddr";
pub const DBADDR_FIELD: &str = "DBAddr";

/// Which field(s) identify a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
  #[default]
  Name,
  VAddrDBAddr,
}

impl KeyMode {
  /// Derives the key of anything that exposes named fields.
  pub fn derive<F: FieldLookup + ?Sized>(self, fields: &F) -> Key {
    match self {
      KeyMode::Name => Key::Name(fields.field(NAME_FIELD).trim().to_string()),
      KeyMode::VAddrDBAddr => Key::Address {
        vaddr: fields.field(VADDR_FIELD).trim().to_string(),
        dbaddr: fields.field(DBADDR_FIELD).trim().to_string(),
      },
    }
  }
}

impl fmt::Display for KeyMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyMode::Name => write!(f, "Name"),
      KeyMode::VAddrDBAddr => write!(f, "VAddr+DBAddr"),
    }
  }
}

impl FromStr for KeyMode {
  type Err = KeyModeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "name" => Ok(KeyMode::Name),
      "vaddr+dbaddr" | "vaddrdbaddr" => Ok(KeyMode::VAddrDBAddr),
      _ => Err(KeyModeError(s.to_string())),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("key mode must be 'Name' or 'VAddr+DBAddr', got {0:?}")]
pub struct KeyModeError(pub String);

/// A derived record key. Components are already trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
  Name(String),
  Address { vaddr: String, dbaddr: String },
}

impl Key {
  /// A key is empty when every component is the empty string; such keys never match.
  pub fn is_empty(&self) -> bool {
    match self {
      Key::Name(name) => name.is_empty(),
      Key::Address { vaddr, dbaddr } => vaddr.is_empty() && dbaddr.is_empty(),
    }
  }
}

impl fmt::Display for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Key::Name(name) => write!(f, "{}", name),
      Key::Address { vaddr, dbaddr } => write!(f, "{}+{}", vaddr, dbaddr),
    }
  }
}

/// Read access to named text fields, shared by CSV rows and record elements.
pub trait FieldLookup {
  /// Value of `name`, or the empty string if the field is absent.
  fn field(&self, name: &str) -> Cow<'_, str>;
}

impl FieldLookup for Row {
  fn field(&self, name: &str) -> Cow<'_, str> {
    Cow::Borrowed(self.value(name))
  }
}

impl FieldLookup for Element {
  fn field(&self, name: &str) -> Cow<'_, str> {
    Cow::Owned(self.child_text(name).unwrap_or_default())
  }
}

pub fn derive_key<F: FieldLookup + ?Sized>(fields: &F, mode: KeyMode) -> Key {
  mode.derive(fields)
}

/// Returns every non-empty key shared by more than one row, in first-seen order.
pub fn find_duplicate_keys(rows: &[Row], mode: KeyMode) -> Vec<Key> {
  let mut counts: HashMap<Key, usize> = HashMap::new();
  let mut order = Vec::new();

  for row in rows {
    let key = mode.derive(row);
    if key.is_empty() {
      continue;
    }
    let count = counts.entry(key.clone()).or_insert(0);
    *count += 1;
    if *count == 2 {
      order.push(key);
    }
  }

  #[cfg(feature = "tracing")]
  debug!("Found {} duplicate keys in CSV", order.len());

  order
}

/// Lookup from key to the position of a record among its container's children.
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
  positions: HashMap<Key, usize>,
}

impl RecordIndex {
  /// Indexes the direct `record_tag` children of `container`.
  ///
  /// Records with an empty key are skipped. When two records share a key, the later one
  /// in document order takes the slot and the earlier one stays in the tree unindexed.
  pub fn build(container: &Element, record_tag: &str, mode: KeyMode) -> Self {
    let mut positions = HashMap::new();

    for (position, record) in container.positions_of(record_tag) {
      let key = mode.derive(record);
      if key.is_empty() {
        continue;
      }
      if let Some(_shadowed) = positions.insert(key, position) {
        #[cfg(feature = "tracing")]
        trace!(
          "Record at position {} shadows record at position {}",
          position, _shadowed
        );
      }
    }

    #[cfg(feature = "tracing")]
    debug!("Indexed {} records by {}", positions.len(), mode);

    Self { positions }
  }

  pub fn get(&self, key: &Key) -> Option<usize> {
    self.positions.get(key).copied()
  }

  pub fn insert(&mut self, key: Key, position: usize) {
    self.positions.insert(key, position);
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.positions.len()
  }
}

pub fn index_records(container: &Element, record_tag: &str, mode: KeyMode) -> RecordIndex {
  RecordIndex::build(container, record_tag, mode)
}
