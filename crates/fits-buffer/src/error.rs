//! Errors reported by [`ImageLoader`](crate::ImageLoader) and
//! [`ImageSaver`](crate::ImageSaver).

use std::fmt;
use std::path::{Path, PathBuf};

use log::error;
use thiserror::Error;

use crate::codec;

/// Which step of a load or save failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorKind {
    /// Opening the source file.
    Open,
    /// Reading the axis-length keys, or an unusable shape.
    Metadata,
    /// Decoding pixel data.
    Read,
    /// Creating the destination file or its image.
    Create,
    /// Encoding pixel data.
    Write,
    /// Closing or flushing the file.
    Close,
}

impl fmt::Display for IoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IoErrorKind::Open => "open",
            IoErrorKind::Metadata => "read metadata from",
            IoErrorKind::Read => "read pixels from",
            IoErrorKind::Create => "create",
            IoErrorKind::Write => "write pixels to",
            IoErrorKind::Close => "close",
        };
        f.write_str(s)
    }
}

/// A failed load or save, carrying the codec's status code and message.
#[derive(Debug, Error)]
#[error("failed to {kind} {}: {message} (status {status})", .path.display())]
pub struct IoError {
    pub kind: IoErrorKind,
    pub status: i32,
    pub message: String,
    pub path: PathBuf,
    #[source]
    pub source: codec::Error,
}

/// Log a codec failure and turn it into an [`IoError`].
pub(crate) fn report(kind: IoErrorKind, path: &Path, err: codec::Error) -> IoError {
    let status = err.status();
    let message = err.to_string();
    error!(
        "FITS error {status} while trying to {kind} {}: {message}",
        path.display()
    );
    IoError {
        kind,
        status,
        message,
        path: path.to_path_buf(),
        source: err,
    }
}
