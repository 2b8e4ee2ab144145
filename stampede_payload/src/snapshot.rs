//! Durable JSON snapshots.
//!
//! A snapshot is written in full to a sibling temporary file, flushed to
//! disk and only then renamed over its destination. Readers of the
//! destination path therefore see either the previous complete snapshot or
//! the new complete snapshot, never a partial write.

use std::{
    ffi::OsString,
    fs,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

/// Errors produced by [`save`] and [`load`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Could not serialize or deserialize the snapshot.
    #[error("Snapshot {path:?} could not be encoded or decoded: {source}")]
    Json {
        /// Snapshot path
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
    /// Filesystem operation failed.
    #[error("Snapshot {path:?} IO failure: {source}")]
    Io {
        /// Path the failing operation touched
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

impl Error {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source: Box::new(source),
        }
    }
}

/// The temporary sibling a snapshot of `path` is staged in.
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `data` to `path` as pretty-printed JSON, atomically.
///
/// The encoding is UTF-8 with two space indentation and non-ASCII characters
/// emitted as-is.
///
/// # Errors
///
/// Returns an error if the staging file cannot be written or flushed, or if
/// the rename over `path` fails. On error `path` is left untouched.
pub fn save<T>(data: &T, path: &Path) -> Result<(), Error>
where
    T: Serialize + ?Sized,
{
    persist(path, |writer, staging| {
        serde_json::to_writer_pretty(writer, data).map_err(|source| Error::Json {
            path: staging.to_path_buf(),
            source,
        })
    })
}

/// Read a JSON document from `path`.
///
/// # Errors
///
/// Returns an error if `path` cannot be opened or does not hold a valid
/// encoding of `T`.
pub fn load<T>(path: &Path) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    let file = fs::File::open(path).map_err(|err| Error::io(path, err))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Stage the output of `write` next to `path`, then install it.
pub(crate) fn persist<F>(path: &Path, write: F) -> Result<(), Error>
where
    F: FnOnce(&mut BufWriter<fs::File>, &Path) -> Result<(), Error>,
{
    let staging = staging_path(path);
    let result = stage(&staging, write).and_then(|()| {
        fs::rename(&staging, path).map_err(|err| Error::io(path, err))
    });

    match result {
        Ok(()) => {
            debug!("installed snapshot {}", path.display());
            Ok(())
        }
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(&staging) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(
                        "could not remove staging file {}: {cleanup}",
                        staging.display()
                    );
                }
            }
            Err(err)
        }
    }
}

fn stage<F>(staging: &Path, write: F) -> Result<(), Error>
where
    F: FnOnce(&mut BufWriter<fs::File>, &Path) -> Result<(), Error>,
{
    let file = fs::File::create(staging).map_err(|err| Error::io(staging, err))?;
    let mut writer = BufWriter::new(file);
    write(&mut writer, staging)?;
    writer.flush().map_err(|err| Error::io(staging, err))?;
    let file = writer
        .into_inner()
        .map_err(|err| Error::io(staging, err.into_error()))?;
    file.sync_all().map_err(|err| Error::io(staging, err))
}
