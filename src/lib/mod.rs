//! BNObj record synchronization library.
//!
//! This library keeps the `BNObj` records of an XML project file in line with a CSV
//! sheet. Two run modes are provided:
//!
//! - **Selective update**: records are matched by `Name` or by the `VAddr`+`DBAddr`
//!   pair and only the fields present in the CSV are rewritten. Unmatched rows can
//!   optionally be added as new records.
//! - **Full replace**: every record is removed and one record per CSV row is built,
//!   with exactly the CSV columns as fields.
//!
//! # Features
//!
//! - **Explicit schema**: container path, record tag and field set are run options
//! - **All-or-nothing output**: validation happens before the tree is modified and the
//!   output file is only written on success
//! - **Backups**: the input is copied to `<file>.bak` before anything else happens
//! - **Optional tracing**: Detailed logging when the `tracing` feature is enabled
//!
//! # Example
//!
//! ```rust,no_run
//! use bnobj_sync::key::KeyMode;
//! use bnobj_sync::sync::{BnObjSync, UpdateOptions};
//! use std::path::PathBuf;
//!
//! let mut options = UpdateOptions::new(
//!   PathBuf::from("project.xml"),
//!   PathBuf::from("points.csv"),
//! );
//! options.update.key_mode = KeyMode::VAddrDBAddr;
//! options.update.allow_add = true;
//!
//! BnObjSync::update_with_options(options).unwrap();
//! ```

pub mod error;
pub mod key;
pub mod replace;
pub mod schema;
pub mod sync;
pub mod table;
pub mod update;
pub mod xml;
