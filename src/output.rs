//! Writing rendered Markdown to a validated location.
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::util::ValidatedOutputPath;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to replace '{path}': {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write to standard output: {0}")]
    Stdout(#[source] io::Error),
}

/// Writes `contents` to `target`, creating parent directories as needed.
///
/// The data goes to a uniquely named sibling first, is synced, then renamed
/// over the target, so readers never see a partially written file.
pub fn write_atomic(target: &ValidatedOutputPath, contents: &str) -> Result<(), OutputError> {
    let dst = target.as_path();

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|source| OutputError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = temp_sibling(dst);
    if let Err(source) = write_synced(&temp_path, contents.as_bytes()) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(OutputError::Write {
            path: temp_path,
            source,
        });
    }

    // rename does not replace an existing file on Windows
    #[cfg(windows)]
    if dst.exists() {
        if let Err(source) = std::fs::remove_file(dst) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(OutputError::Rename {
                path: dst.to_path_buf(),
                source,
            });
        }
    }

    if let Err(source) = std::fs::rename(&temp_path, dst) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(OutputError::Rename {
            path: dst.to_path_buf(),
            source,
        });
    }

    tracing::info!(path = %dst.display(), bytes = contents.len(), "Wrote Markdown");
    Ok(())
}

/// Writes `contents` to standard output.
pub fn write_stdout(contents: &str) -> Result<(), OutputError> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(contents.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(OutputError::Stdout)
}

/// `out.md` becomes `out.md.tmp.<nanos>` in the same directory.
fn temp_sibling(dst: &Path) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut name = dst.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp.{suffix:016x}"));
    dst.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    // create_new refuses to follow a pre-planted file or symlink at the temp path
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
