//! Where records live in the project file and which fields they carry.

use std::fmt;
use std::str::FromStr;

use crate::xml::Element;

pub const DEFAULT_CONTAINER_PATH: &str = "Dev/Config/Port/Node";
pub const DEFAULT_RECORD_TAG: &str = "BNObj";
pub const DEFAULT_FIELDS: [&str; 8] = [
  "Name", "VAddr", "DBAddr", "DSize", "Float", "Signed", "Units", "Mask",
];

const PATH_SEPARATOR: char = '/';

/// Slash-separated element path from the document root to the record container.
///
/// A leading `./` and `.` segments are accepted and dropped, so `./Dev/Config` and
/// `Dev/Config` name the same container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPath(Vec<String>);

impl ContainerPath {
  pub fn segments(&self) -> &[String] {
    &self.0
  }
}

impl Default for ContainerPath {
  fn default() -> Self {
    Self(
      DEFAULT_CONTAINER_PATH
        .split(PATH_SEPARATOR)
        .map(str::to_string)
        .collect(),
    )
  }
}

impl FromStr for ContainerPath {
  type Err = SchemaError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let segments: Vec<String> = s
      .split(PATH_SEPARATOR)
      .map(str::trim)
      .filter(|segment| !segment.is_empty() && *segment != ".")
      .map(str::to_string)
      .collect();

    if segments.is_empty() {
      return Err(SchemaError::EmptyPath(s.to_string()));
    }

    Ok(Self(segments))
  }
}

impl fmt::Display for ContainerPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "./{}", self.0.join("/"))
  }
}

/// Run-scoped description of the record layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
  /// Path to the element whose direct children are the records.
  pub container_path: ContainerPath,
  /// Tag of a record element.
  pub record_tag: String,
  /// Fields the selective updater touches when no include list is given.
  pub fields: Vec<String>,
}

impl Default for Schema {
  fn default() -> Self {
    Self {
      container_path: ContainerPath::default(),
      record_tag: DEFAULT_RECORD_TAG.to_string(),
      fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
    }
  }
}

impl Schema {
  pub fn recognizes(&self, field: &str) -> bool {
    self.fields.iter().any(|f| f == field)
  }

  pub fn locate_container<'a>(&self, root: &'a mut Element) -> Option<&'a mut Element> {
    root.find_path_mut(self.container_path.segments())
  }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
  #[error("Container path is empty: {0:?}")]
  EmptyPath(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_container_path() {
    let path: ContainerPath = "./Dev/Config/Port/Node".parse().unwrap();
    assert_eq!(path, ContainerPath::default());
    assert_eq!(path.to_string(), "./Dev/Config/Port/Node");

    let path: ContainerPath = "Station/ Points /".parse().unwrap();
    assert_eq!(path.segments(), ["Station", "Points"]);
  }

  #[test]
  fn test_empty_container_path() {
    assert!("".parse::<ContainerPath>().is_err());
    assert!("./".parse::<ContainerPath>().is_err());
  }

  #[test]
  fn test_default_schema() {
    let schema = Schema::default();

    assert_eq!(schema.record_tag, "BNObj");
    assert!(schema.recognizes("Units"));
    assert!(!schema.recognizes("Comment"));
  }
}
