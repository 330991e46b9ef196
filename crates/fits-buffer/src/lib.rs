//! FITS images to and from aligned, strided `f32` buffers.
//!
//! [`ImageLoader`] decodes a FITS file into a [`BufferDescriptor`]: owned
//! 32-byte-aligned memory plus the extent, stride and origin of each axis.
//! [`ImageSaver`] writes such a descriptor back out as a new single-precision
//! image. Both talk to the file format only through the
//! [`ImageCodec`](codec::ImageCodec) trait.
//!
//! ```no_run
//! let mut buf = fits_buffer::load_fits("m51.fits")?;
//! if let Some(pixels) = buf.as_f32_mut() {
//!     pixels.iter_mut().for_each(|p| *p *= 1.001);
//! }
//! fits_buffer::save_fits(&buf, "out.fits")?;
//! # Ok::<(), fits_buffer::IoError>(())
//! ```

use std::path::Path;

#[cfg(feature = "array")]
pub mod array;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod saver;

pub use descriptor::{BufferDescriptor, HostBuffer, ShapeError, HOST_ALIGN, MAX_DIMS};
pub use error::{IoError, IoErrorKind};
pub use loader::ImageLoader;
pub use saver::{active_axes, ImageSaver};

/// Load `path` with the native codec and default options.
pub fn load_fits<P: AsRef<Path>>(path: P) -> Result<BufferDescriptor, IoError> {
    ImageLoader::new().load(path)
}

/// Save `buf` to a new file at `path` with the native codec.
///
/// # Panics
///
/// Panics if `buf` does not hold 32-bit elements.
pub fn save_fits<P: AsRef<Path>>(buf: &BufferDescriptor, path: P) -> Result<(), IoError> {
    ImageSaver::new().save(buf, path)
}
