use crate::key::{Key, KeyMode};

const MAX_REPORTED_KEYS: usize = 5;

/// The CSV is unusable for the requested run. Raised before the tree is touched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
  #[error(
    "CSV contains duplicate keys for key mode {mode}: {}",
    preview_keys(.keys)
  )]
  DuplicateKeys { mode: KeyMode, keys: Vec<Key> },
  #[error("CSV contains no data rows; refusing to replace records with nothing")]
  EmptyCsv,
}

fn preview_keys(keys: &[Key]) -> String {
  let shown = keys
    .iter()
    .take(MAX_REPORTED_KEYS)
    .map(|key| format!("'{}'", key))
    .collect::<Vec<_>>()
    .join(", ");

  match keys.len().saturating_sub(MAX_REPORTED_KEYS) {
    0 => shown,
    rest => format!("{} (and {} more)", shown, rest),
  }
}
