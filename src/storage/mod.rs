//! Persistence: text files for data exchange, binary snapshots for models.

mod format;
mod snapshot;

pub use format::{Annotation, SparseRow, TextFormat};
pub use snapshot::Model;

use crate::error::{CartographerError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Opens `path` for writing, refusing to replace an existing file unless
/// `overwrite` is set.
pub(crate) fn create_output(path: &Path, overwrite: bool) -> Result<BufWriter<File>> {
    if !overwrite && path.exists() {
        return Err(CartographerError::OutputExists(path.to_path_buf()));
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Opens `path` for buffered reading.
pub(crate) fn open_input(path: &Path) -> Result<BufReader<File>> {
    if !path.exists() {
        return Err(CartographerError::FileNotFound(path.to_path_buf()));
    }
    Ok(BufReader::new(File::open(path)?))
}
