//! File-level synchronization runs.
//!
//! This module wires the loaders, the record logic and the writer together for the two
//! run modes:
//!
//! - [`BnObjSync::update_with_options`] edits matching records in place, optionally
//!   adding records for unmatched rows.
//! - [`BnObjSync::replace_with_options`] throws every record away and rebuilds them
//!   from the CSV.
//!
//! # Run Order
//!
//! 1. Copy the input to `<input>.<ext>.bak` when backups are enabled
//! 2. Parse the XML and locate the record container
//! 3. Load and validate the CSV
//! 4. Apply the rows to the in-memory tree
//! 5. Serialize and write the output file
//!
//! Every failure is detected before step 5, so a failed run leaves no output file
//! behind. The backup is the only file that may be written by a failed run.
//!
//! # Examples
//!
//! ```rust,no_run
//! use bnobj_sync::sync::{BnObjSync, UpdateOptions};
//! use std::path::PathBuf;
//!
//! let options = UpdateOptions::new(
//!   PathBuf::from("ICC Eaton9155_good.xml"),
//!   PathBuf::from("points.csv"),
//! );
//!
//! let outcome = BnObjSync::update_with_options(options).unwrap();
//! println!("{}", outcome);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::replace::{FullReplace, ReplaceReport};
use crate::schema::{ContainerPath, Schema};
use crate::table::{Table, TableError};
use crate::update::{SelectiveUpdate, UpdateReport};
use crate::xml::{Document, Element, XmlError};

const OUTPUT_SUFFIX: &str = "_updated";
const BACKUP_EXTENSION: &str = "bak";

/// Entry points for the two run modes.
pub struct BnObjSync;

impl BnObjSync {
  /// Updates existing records from the CSV rows.
  pub fn update_with_options(options: UpdateOptions) -> Result<SyncOutcome<UpdateReport>, SyncError> {
    #[cfg(feature = "tracing")]
    info!("Starting selective update");

    let UpdateOptions {
      xml_file,
      csv_file,
      output_file,
      update,
      schema,
      pretty,
      backup,
    } = options;

    let run = Run {
      xml_file,
      csv_file,
      output_file,
      schema,
      pretty,
      backup,
    };

    run.execute(|container, schema, table| update.apply(container, schema, table))
  }

  /// Replaces all records with records built from the CSV rows.
  pub fn replace_with_options(
    options: ReplaceOptions,
  ) -> Result<SyncOutcome<ReplaceReport>, SyncError> {
    #[cfg(feature = "tracing")]
    info!("Starting full replace");

    let ReplaceOptions {
      xml_file,
      csv_file,
      output_file,
      replace,
      schema,
      pretty,
      backup,
    } = options;

    let run = Run {
      xml_file,
      csv_file,
      output_file,
      schema,
      pretty,
      backup,
    };

    run.execute(|container, schema, table| replace.apply(container, schema, table))
  }

  /// `<dir>/<stem>_updated.<ext>` next to the input.
  pub fn default_output_path<P: AsRef<Path>>(xml_file: P) -> PathBuf {
    let xml_file = xml_file.as_ref();
    let stem = xml_file
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    let file_name = match xml_file.extension() {
      Some(ext) => format!("{}{}.{}", stem, OUTPUT_SUFFIX, ext.to_string_lossy()),
      None => format!("{}{}", stem, OUTPUT_SUFFIX),
    };
    xml_file.with_file_name(file_name)
  }

  /// `a.xml` backs up to `a.xml.bak`; a file without extension to `a.bak`.
  pub fn backup_path<P: AsRef<Path>>(xml_file: P) -> PathBuf {
    let xml_file = xml_file.as_ref();
    match xml_file.extension() {
      Some(ext) => {
        xml_file.with_extension(format!("{}.{}", ext.to_string_lossy(), BACKUP_EXTENSION))
      }
      None => xml_file.with_extension(BACKUP_EXTENSION),
    }
  }
}

/// Paths and switches shared by both modes.
struct Run {
  xml_file: PathBuf,
  csv_file: PathBuf,
  output_file: Option<PathBuf>,
  schema: Schema,
  pretty: bool,
  backup: bool,
}

impl Run {
  fn execute<R, F>(self, apply: F) -> Result<SyncOutcome<R>, SyncError>
  where
    F: FnOnce(&mut Element, &Schema, &Table) -> Result<R, ValidationError>,
  {
    let Run {
      xml_file,
      csv_file,
      output_file,
      schema,
      pretty,
      backup,
    } = self;

    let output_path = output_file.unwrap_or_else(|| BnObjSync::default_output_path(&xml_file));

    #[cfg(feature = "tracing")]
    debug!(?xml_file, ?csv_file, ?output_path, "Resolved file paths");

    if !xml_file.exists() {
      return Err(SyncError::XmlNotFound(xml_file));
    }

    let backup_path = if backup {
      let backup_path = BnObjSync::backup_path(&xml_file);
      std::fs::copy(&xml_file, &backup_path).map_err(SyncError::Backup)?;

      #[cfg(feature = "tracing")]
      debug!("Wrote backup to {:?}", backup_path);

      Some(backup_path)
    } else {
      None
    };

    let xml_str = std::fs::read_to_string(&xml_file).map_err(SyncError::XmlIo)?;
    let mut document = Document::try_from(xml_str.as_str()).map_err(SyncError::XmlParse)?;

    let container = schema
      .locate_container(&mut document.root)
      .ok_or_else(|| SyncError::ContainerNotFound(schema.container_path.clone()))?;

    #[cfg(feature = "tracing")]
    debug!(
      "Located container {} with {} children",
      schema.container_path,
      container.children.len()
    );

    let table = Table::load(&csv_file).map_err(SyncError::Csv)?;

    #[cfg(feature = "tracing")]
    debug!("Loaded {} CSV rows", table.rows.len());

    let report = apply(container, &schema, &table).map_err(SyncError::Validation)?;

    let content = document.to_xml(pretty).map_err(SyncError::Serialize)?;
    std::fs::write(&output_path, content).map_err(SyncError::Write)?;

    #[cfg(feature = "tracing")]
    info!("Wrote {:?}", output_path);

    Ok(SyncOutcome {
      output_path,
      backup_path,
      report,
    })
  }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome<R> {
  pub output_path: PathBuf,
  pub backup_path: Option<PathBuf>,
  pub report: R,
}

impl<R: fmt::Display> fmt::Display for SyncOutcome<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Output written to: {}", self.output_path.display())?;
    if let Some(backup_path) = &self.backup_path {
      writeln!(f, "Backup written to: {}", backup_path.display())?;
    }
    write!(f, "{}", self.report)
  }
}

/// Errors that can occur during a synchronization run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  /// The input XML file does not exist
  #[error("XML file not found: {0}")]
  XmlNotFound(PathBuf),
  /// Error copying the input to its backup path
  #[error("Backup error: {0}")]
  Backup(std::io::Error),
  /// Error reading the input XML file
  #[error("XML file IO error: {0}")]
  XmlIo(std::io::Error),
  /// Error parsing the input XML file
  #[error("XML file parse error: {0}")]
  XmlParse(XmlError),
  /// The record container is missing from the document
  #[error("Could not locate record container at '{0}'. Adjust the container path for your XML structure")]
  ContainerNotFound(ContainerPath),
  /// Error loading the CSV file, including a missing header
  #[error("{0}")]
  Csv(TableError),
  /// The CSV rows cannot be applied
  #[error("{0}")]
  Validation(ValidationError),
  /// Error serializing the updated document
  #[error("XML serialize error: {0}")]
  Serialize(XmlError),
  /// Error writing the output file
  #[error("Write error: {0}")]
  Write(std::io::Error),
}

/// Configuration for a selective update run.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
  /// XML project file to read.
  pub xml_file: PathBuf,
  /// CSV sheet with one row per record.
  pub csv_file: PathBuf,
  /// Output path. If None, defaults to `<stem>_updated.<ext>` next to the input.
  pub output_file: Option<PathBuf>,
  pub update: SelectiveUpdate,
  pub schema: Schema,
  /// Indent the output.
  pub pretty: bool,
  /// Copy the input to its `.bak` path before reading it.
  pub backup: bool,
}

impl UpdateOptions {
  pub fn new(xml_file: PathBuf, csv_file: PathBuf) -> Self {
    Self {
      xml_file,
      csv_file,
      output_file: None,
      update: SelectiveUpdate::default(),
      schema: Schema::default(),
      pretty: true,
      backup: true,
    }
  }
}

/// Configuration for a full replace run.
#[derive(Debug, Clone)]
pub struct ReplaceOptions {
  /// XML project file to read.
  pub xml_file: PathBuf,
  /// CSV sheet with one row per record.
  pub csv_file: PathBuf,
  /// Output path. If None, defaults to `<stem>_updated.<ext>` next to the input.
  pub output_file: Option<PathBuf>,
  pub replace: FullReplace,
  pub schema: Schema,
  /// Indent the output.
  pub pretty: bool,
  /// Copy the input to its `.bak` path before reading it.
  pub backup: bool,
}

impl ReplaceOptions {
  pub fn new(xml_file: PathBuf, csv_file: PathBuf) -> Self {
    Self {
      xml_file,
      csv_file,
      output_file: None,
      replace: FullReplace::default(),
      schema: Schema::default(),
      pretty: true,
      backup: true,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_output_path() {
    assert_eq!(
      BnObjSync::default_output_path("dir/ICC Eaton9155_good.xml"),
      PathBuf::from("dir/ICC Eaton9155_good_updated.xml")
    );
    assert_eq!(
      BnObjSync::default_output_path("project"),
      PathBuf::from("project_updated")
    );
  }

  #[test]
  fn test_backup_path() {
    assert_eq!(
      BnObjSync::backup_path("dir/project.xml"),
      PathBuf::from("dir/project.xml.bak")
    );
    assert_eq!(
      BnObjSync::backup_path("project"),
      PathBuf::from("project.bak")
    );
  }

  #[test]
  fn test_xml_not_found() {
    let options = UpdateOptions::new(
      PathBuf::from("nonexistent.xml"),
      PathBuf::from("nonexistent.csv"),
    );

    let result = BnObjSync::update_with_options(options);

    match result.unwrap_err() {
      SyncError::XmlNotFound(path) => {
        assert_eq!(path, PathBuf::from("nonexistent.xml"));
      }
      other => panic!("Expected XmlNotFound error, got {:?}", other),
    }
  }
}
