//! Decoding a FITS image into a [`BufferDescriptor`].

use std::mem::size_of;
use std::path::Path;

use log::debug;

use crate::codec::{self, ImageCodec, NativeCodec};
use crate::descriptor::BufferDescriptor;
use crate::error::{report, IoError, IoErrorKind};

/// Number of axis-length keys read from the header.
const LOADED_AXES: usize = 2;

/// Reads a FITS image into freshly allocated, 32-byte-aligned `f32` memory.
///
/// Only the first two axes are read. A file with more axes yields its first
/// plane.
#[derive(Debug, Clone)]
pub struct ImageLoader<C = NativeCodec> {
    codec: C,
    null_value: f32,
}

impl ImageLoader<NativeCodec> {
    pub fn new() -> Self {
        Self::with_codec(NativeCodec)
    }
}

impl Default for ImageLoader<NativeCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ImageCodec> ImageLoader<C> {
    /// Load through a specific codec implementation.
    pub fn with_codec(codec: C) -> Self {
        ImageLoader {
            codec,
            null_value: 0.0,
        }
    }

    /// Value substituted for undefined pixels. The default, `0.0`, turns null
    /// checking off, so undefined pixels keep their stored value.
    pub fn null_value(mut self, value: f32) -> Self {
        self.null_value = value;
        self
    }

    /// Read `path` into a new descriptor.
    ///
    /// The result has `extent = {naxis1, naxis2, 0, 0}` (or `{naxis1, 0, 0, 0}`
    /// for a 1-D file), `stride = {1, naxis1, 0, 0}` and `elem_size = 4`, and
    /// holds the pixels in file order. Any codec failure aborts the load.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<BufferDescriptor, IoError> {
        let path = path.as_ref();
        let handle = self
            .codec
            .open(path)
            .map_err(|e| report(IoErrorKind::Open, path, e))?;

        let naxes = self
            .codec
            .read_dimension_keys(&handle, LOADED_AXES)
            .map_err(|e| report(IoErrorKind::Metadata, path, e))?;
        check_axes(&naxes).map_err(|e| report(IoErrorKind::Metadata, path, e))?;

        let mut buf = BufferDescriptor::allocate(&naxes, size_of::<f32>()).map_err(|_| {
            let pixels = naxes
                .iter()
                .try_fold(1usize, |acc, &n| acc.checked_mul(n))
                .unwrap_or(usize::MAX);
            report(IoErrorKind::Metadata, path, codec::Error::invalid_naxes(pixels))
        })?;

        let pixels = buf.as_f32_mut().unwrap_or_default();
        let any_null = self
            .codec
            .read_pixels_as_float(&handle, 1, self.null_value, pixels)
            .map_err(|e| report(IoErrorKind::Read, path, e))?;
        if any_null {
            debug!("{}: undefined pixels replaced by {}", path.display(), self.null_value);
        }

        self.codec
            .close(handle)
            .map_err(|e| report(IoErrorKind::Close, path, e))?;

        debug!(
            "loaded {}: extent {:?}, stride {:?}",
            path.display(),
            buf.extent(),
            buf.stride()
        );
        Ok(buf)
    }
}

fn check_axes(naxes: &[usize]) -> codec::Result<()> {
    if naxes.is_empty() {
        return Err(codec::Error::MissingKeyword("NAXIS1"));
    }
    for &n in naxes {
        if n == 0 || i32::try_from(n).is_err() {
            return Err(codec::Error::invalid_naxes(n));
        }
    }
    Ok(())
}
