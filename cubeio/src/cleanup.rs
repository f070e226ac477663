use std::fs;
use std::path::Path;

use tracing::debug;

use crate::errors::Result;

/// Remove intermediate files and directories once they are no longer needed.
///
/// Directories are removed with everything in them. Paths that are neither a file nor a directory,
/// including paths that don't exist, are skipped. `files` is passed through untouched so this can
/// sit at the end of a chain of steps that each return the files they produced.
///
pub fn cleanup<T, P: AsRef<Path>>(files: T, remove: &[P]) -> Result<T> {
    for path in remove {
        let path = path.as_ref();
        if path.is_dir() {
            debug!("Removing directory {}", path.display());
            fs::remove_dir_all(path)?;
        } else if path.is_file() {
            debug!("Removing file {}", path.display());
            fs::remove_file(path)?;
        }
    }

    Ok(files)
}
