//! The image codec seam.
//!
//! Loading and saving talk to the on-disk format only through [`ImageCodec`],
//! a handle-based capability set: open, read the axis-length keys, decode
//! pixels as `f32`, create an image, encode pixels, close. Every failure is a
//! codec [`Error`] carrying an integer status code in the conventional FITS
//! library numbering, and its `Display` text is the human-readable message
//! for that status.
//!
//! [`NativeCodec`] is the default implementation, backed by `fitsio-pure`.

use std::fmt;
use std::path::{Path, PathBuf};

pub mod native;

pub use fitsio_pure::compat::errors::Error as FitsError;
pub use native::{FitsHandle, NativeCodec};

/// Integer status codes reported by codec errors.
pub mod status {
    pub const FILE_NOT_OPENED: i32 = 104;
    pub const FILE_NOT_CREATED: i32 = 105;
    pub const WRITE_ERROR: i32 = 106;
    pub const END_OF_FILE: i32 = 107;
    pub const READONLY_FILE: i32 = 112;
    pub const HEADER_NOT_EMPTY: i32 = 201;
    pub const KEY_NO_EXIST: i32 = 202;
    pub const BAD_KEYCHAR: i32 = 207;
    pub const BAD_BITPIX: i32 = 211;
    pub const BAD_NAXIS: i32 = 212;
    pub const BAD_NAXES: i32 = 213;
    pub const NOT_IMAGE: i32 = 233;
    pub const UNKNOWN_REC: i32 = 252;
    pub const BAD_PIX_NUM: i32 = 321;
}

/// All errors that can occur inside a codec call.
#[derive(Debug)]
pub enum Error {
    /// The file could not be opened or read.
    Open(FitsError),
    /// `create` was asked for a path that already exists.
    AlreadyExists(PathBuf),
    /// The file could not be created.
    Create(FitsError),
    /// Encoding or flushing the file failed.
    Write(FitsError),
    /// The file ended before the header or data did.
    UnexpectedEof,
    /// A header card carries a keyword with illegal characters.
    InvalidKeyword,
    /// A required keyword was not found in the header.
    MissingKeyword(&'static str),
    /// Unrecognized BITPIX value.
    InvalidBitpix(i64),
    /// NAXIS outside 0..=999.
    InvalidNaxis(i64),
    /// A negative or unrepresentable axis length.
    InvalidNaxes(i64),
    /// The handle has an image already.
    ImageExists,
    /// The handle has no image to read from or write to.
    NoImage,
    /// Attempt to write through a read-only handle.
    ReadOnly,
    /// Any other header or data failure reported by the FITS library.
    Unrecognized(FitsError),
    /// The requested pixel range falls outside the image.
    PixelRange {
        first: usize,
        count: usize,
        total: usize,
    },
}

/// Convenience alias used by codec implementations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The integer status code for this error.
    pub fn status(&self) -> i32 {
        match self {
            Error::Open(_) => status::FILE_NOT_OPENED,
            Error::AlreadyExists(_) | Error::Create(_) => status::FILE_NOT_CREATED,
            Error::Write(_) => status::WRITE_ERROR,
            Error::UnexpectedEof => status::END_OF_FILE,
            Error::InvalidKeyword => status::BAD_KEYCHAR,
            Error::MissingKeyword(_) => status::KEY_NO_EXIST,
            Error::InvalidBitpix(_) => status::BAD_BITPIX,
            Error::InvalidNaxis(_) => status::BAD_NAXIS,
            Error::InvalidNaxes(_) => status::BAD_NAXES,
            Error::ImageExists => status::HEADER_NOT_EMPTY,
            Error::NoImage => status::NOT_IMAGE,
            Error::ReadOnly => status::READONLY_FILE,
            Error::Unrecognized(_) => status::UNKNOWN_REC,
            Error::PixelRange { .. } => status::BAD_PIX_NUM,
        }
    }

    /// Saturating conversion for axis lengths and pixel counts in diagnostics.
    pub(crate) fn invalid_naxes(n: usize) -> Self {
        Error::InvalidNaxes(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<FitsError> for Error {
    fn from(err: FitsError) -> Self {
        match err {
            FitsError::Fits(fitsio_pure::Error::UnexpectedEof) => Error::UnexpectedEof,
            FitsError::Fits(fitsio_pure::Error::InvalidKeyword) => Error::InvalidKeyword,
            FitsError::Fits(fitsio_pure::Error::MissingKeyword(kw)) => Error::MissingKeyword(kw),
            FitsError::Fits(fitsio_pure::Error::InvalidBitpix(v)) => Error::InvalidBitpix(v),
            other => Error::Unrecognized(other),
        }
    }
}

impl From<fitsio_pure::Error> for Error {
    fn from(err: fitsio_pure::Error) -> Self {
        FitsError::Fits(err).into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Open(e) => write!(f, "could not open the named file: {e}"),
            Error::AlreadyExists(p) => {
                write!(f, "could not create the named file: {} exists", p.display())
            }
            Error::Create(e) => write!(f, "could not create the named file: {e}"),
            Error::Write(e) => write!(f, "error writing to FITS file: {e}"),
            Error::UnexpectedEof => write!(f, "tried to move past end of file"),
            Error::InvalidKeyword => write!(f, "illegal character in keyword name"),
            Error::MissingKeyword(kw) => write!(f, "keyword not found in header: {kw}"),
            Error::InvalidBitpix(v) => write!(f, "illegal BITPIX keyword value: {v}"),
            Error::InvalidNaxis(v) => write!(f, "illegal NAXIS keyword value: {v}"),
            Error::InvalidNaxes(v) => write!(f, "illegal NAXISn keyword value: {v}"),
            Error::ImageExists => write!(f, "header already contains an image"),
            Error::NoImage => write!(f, "HDU is not an image"),
            Error::ReadOnly => write!(f, "cannot write to readonly file"),
            Error::Unrecognized(e) => write!(f, "unrecognizable FITS record: {e}"),
            Error::PixelRange {
                first,
                count,
                total,
            } => write!(
                f,
                "illegal pixel range: first pixel {first}, {count} pixels, image has {total}"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Open(e) | Error::Create(e) | Error::Write(e) | Error::Unrecognized(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

/// The capability set the loader and saver need from a FITS implementation.
///
/// Pixel indices are 1-based, following the format's convention.
pub trait ImageCodec {
    /// An open file.
    type Handle;

    /// Open an existing file for reading.
    fn open(&self, path: &Path) -> Result<Self::Handle>;

    /// Read up to `count` axis lengths (`NAXIS1`, `NAXIS2`, ...), stopping at
    /// the first key that is absent.
    fn read_dimension_keys(&self, handle: &Self::Handle, count: usize) -> Result<Vec<usize>>;

    /// Decode `out.len()` pixels starting at `first_pixel` as `f32`.
    ///
    /// A `null_value` of `0.0` disables null checking. Otherwise undefined
    /// pixels are replaced by `null_value`. Returns whether any were found.
    fn read_pixels_as_float(
        &self,
        handle: &Self::Handle,
        first_pixel: usize,
        null_value: f32,
        out: &mut [f32],
    ) -> Result<bool>;

    /// Close a handle, flushing anything written through it.
    fn close(&self, handle: Self::Handle) -> Result<()>;

    /// Create a new, empty file. Fails if `path` exists.
    fn create(&self, path: &Path) -> Result<Self::Handle>;

    /// Define a 32-bit floating-point image with the given axis lengths.
    fn create_image(&self, handle: &mut Self::Handle, naxes: &[usize]) -> Result<()>;

    /// Encode `pixels` into the image starting at `first_pixel`.
    fn write_pixels_as_float(
        &self,
        handle: &mut Self::Handle,
        first_pixel: usize,
        pixels: &[f32],
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let io = || FitsError::Io(std::io::Error::other("x"));
        assert_eq!(Error::Open(io()).status(), 104);
        assert_eq!(Error::AlreadyExists(PathBuf::from("a.fits")).status(), 105);
        assert_eq!(Error::Write(io()).status(), 106);
        assert_eq!(Error::MissingKeyword("NAXIS1").status(), 202);
        assert_eq!(Error::InvalidBitpix(7).status(), 211);
        assert_eq!(
            Error::PixelRange {
                first: 0,
                count: 1,
                total: 1
            }
            .status(),
            321
        );
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::MissingKeyword("NAXIS1").to_string(),
            "keyword not found in header: NAXIS1"
        );
        assert_eq!(
            Error::InvalidBitpix(-99).to_string(),
            "illegal BITPIX keyword value: -99"
        );
        let e = Error::AlreadyExists(PathBuf::from("out.fits"));
        assert!(e.to_string().contains("out.fits exists"));
    }

    #[test]
    fn std_error_source() {
        use std::error::Error as StdError;

        assert!(Error::NoImage.source().is_none());
        let inner = FitsError::Io(std::io::Error::other("inner"));
        assert!(Error::Open(inner).source().is_some());
    }

    #[test]
    fn library_errors_keep_their_status() {
        let eof: Error = fitsio_pure::Error::UnexpectedEof.into();
        assert_eq!(eof.status(), status::END_OF_FILE);

        let missing: Error = FitsError::Fits(fitsio_pure::Error::MissingKeyword("BITPIX")).into();
        assert!(matches!(missing, Error::MissingKeyword("BITPIX")));

        let other: Error = FitsError::Message(String::from("odd record")).into();
        assert_eq!(other.status(), status::UNKNOWN_REC);
        assert!(other.to_string().ends_with("odd record"));
    }

    #[test]
    fn invalid_naxes_saturates() {
        assert!(matches!(Error::invalid_naxes(12), Error::InvalidNaxes(12)));
        assert!(matches!(
            Error::invalid_naxes(usize::MAX),
            Error::InvalidNaxes(i64::MAX)
        ));
    }
}
