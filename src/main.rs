use bnobj_sync::key::KeyMode;
use bnobj_sync::replace::FullReplace;
use bnobj_sync::schema::{ContainerPath, DEFAULT_CONTAINER_PATH, DEFAULT_RECORD_TAG, Schema};
use bnobj_sync::sync::{BnObjSync, ReplaceOptions, UpdateOptions};
use bnobj_sync::update::SelectiveUpdate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
  name = "bnobj-sync",
  about = "Update or replace BNObj records in an XML project file from a CSV sheet",
  version,
  author
)]
struct Cli {
  #[command(subcommand)]
  command: Command,

  /// Verbose output (-v for verbose, -vv for very verbose)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,
}

#[derive(Subcommand)]
enum Command {
  /// Update matching records field by field
  Update {
    #[command(flatten)]
    files: FileArgs,

    /// Field(s) identifying a record: Name or VAddr+DBAddr
    #[arg(short, long, default_value = "Name")]
    key_mode: KeyMode,

    /// Only update these fields (comma separated or repeated)
    #[arg(short, long, value_delimiter = ',')]
    include: Vec<String>,

    /// Add records for rows that match nothing
    #[arg(long)]
    allow_add: bool,

    /// Let blank cells overwrite existing values
    #[arg(long)]
    update_empty: bool,
  },

  /// Replace every record with one record per CSV row
  Replace {
    #[command(flatten)]
    files: FileArgs,

    /// Leave out fields whose cell is blank
    #[arg(long)]
    skip_empty: bool,
  },
}

#[derive(Args)]
struct FileArgs {
  /// Path to the XML project file
  #[arg(short, long)]
  xml: PathBuf,

  /// Path to the CSV file
  #[arg(short, long)]
  csv: PathBuf,

  /// Output path (defaults to <stem>_updated.<ext> next to the XML file)
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Element path from the root to the node holding the records
  #[arg(long, default_value = DEFAULT_CONTAINER_PATH)]
  container_path: ContainerPath,

  /// Tag of a record element
  #[arg(long, default_value = DEFAULT_RECORD_TAG)]
  record_tag: String,

  /// Write the XML without indentation
  #[arg(long)]
  no_pretty: bool,

  /// Do not copy the input to a .bak file first
  #[arg(long)]
  no_backup: bool,
}

impl FileArgs {
  fn schema(&self) -> Schema {
    Schema {
      container_path: self.container_path.clone(),
      record_tag: self.record_tag.clone(),
      ..Schema::default()
    }
  }
}

fn setup_tracing(verbose: u8) {
  use tracing_subscriber::fmt;
  use tracing_subscriber::prelude::*;

  let log_level = match verbose {
    1 => "debug",
    2 => "trace",
    _ => "info",
  };

  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(tracing_subscriber::EnvFilter::new(
      std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    ))
    .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cli = Cli::parse();

  setup_tracing(cli.verbose);

  match cli.command {
    Command::Update {
      files,
      key_mode,
      include,
      allow_add,
      update_empty,
    } => {
      let options = UpdateOptions {
        schema: files.schema(),
        xml_file: files.xml,
        csv_file: files.csv,
        output_file: files.output,
        update: SelectiveUpdate {
          key_mode,
          include_fields: (!include.is_empty()).then_some(include),
          allow_add,
          update_empty,
        },
        pretty: !files.no_pretty,
        backup: !files.no_backup,
      };

      let outcome = BnObjSync::update_with_options(options)?;
      print!("{}", outcome);
    }
    Command::Replace { files, skip_empty } => {
      let options = ReplaceOptions {
        schema: files.schema(),
        xml_file: files.xml,
        csv_file: files.csv,
        output_file: files.output,
        replace: FullReplace {
          write_empty: !skip_empty,
        },
        pretty: !files.no_pretty,
        backup: !files.no_backup,
      };

      let outcome = BnObjSync::replace_with_options(options)?;
      print!("{}", outcome);
    }
  }

  Ok(())
}
