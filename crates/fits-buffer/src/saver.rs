//! Encoding a [`BufferDescriptor`] as a new FITS file.

use std::mem::size_of;
use std::path::Path;

use log::{debug, warn};

use crate::codec::{self, ImageCodec, NativeCodec};
use crate::descriptor::{BufferDescriptor, MAX_DIMS};
use crate::error::{report, IoError, IoErrorKind};

/// Number of leading non-zero extents.
pub fn active_axes(extent: &[i32; MAX_DIMS]) -> usize {
    extent.iter().take_while(|&&e| e != 0).count()
}

/// Writes `f32` descriptors as single-precision FITS images.
#[derive(Debug, Clone)]
pub struct ImageSaver<C = NativeCodec> {
    codec: C,
    overwrite: bool,
}

impl ImageSaver<NativeCodec> {
    pub fn new() -> Self {
        Self::with_codec(NativeCodec)
    }
}

impl Default for ImageSaver<NativeCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ImageCodec> ImageSaver<C> {
    /// Save through a specific codec implementation.
    pub fn with_codec(codec: C) -> Self {
        ImageSaver {
            codec,
            overwrite: false,
        }
    }

    /// Remove an existing destination before creating it. Off by default, in
    /// which case saving onto an existing path fails.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Write `buf` to a new file at `path`.
    ///
    /// The image has one axis per leading non-zero extent. The host memory is
    /// written linearly, so the strides are expected to describe a packed
    /// layout. A partially written file is left in place on failure.
    ///
    /// # Panics
    ///
    /// Panics if `buf` does not hold 32-bit elements.
    pub fn save<P: AsRef<Path>>(&self, buf: &BufferDescriptor, path: P) -> Result<(), IoError> {
        assert_eq!(
            buf.elem_size(),
            size_of::<f32>(),
            "only 32-bit float buffers can be saved"
        );
        let path = path.as_ref();

        let extent = buf.extent();
        let naxis = active_axes(&extent);
        let naxes: Vec<usize> = extent[..naxis].iter().map(|&e| e as usize).collect();
        let count: usize = if naxis == 0 {
            // TODO: decide whether an all-zero extent should be rejected instead.
            warn!("{}: descriptor has no active axes, writing an empty image", path.display());
            0
        } else {
            naxes.iter().product()
        };
        if !buf.is_packed() {
            warn!(
                "{}: stride {:?} is not packed for extent {:?}, writing memory linearly",
                path.display(),
                buf.stride(),
                extent
            );
        }

        if self.overwrite && path.exists() {
            std::fs::remove_file(path)
                .map_err(|e| report(IoErrorKind::Create, path, codec::Error::Create(e.into())))?;
        }

        let mut handle = self
            .codec
            .create(path)
            .map_err(|e| report(IoErrorKind::Create, path, e))?;
        self.codec
            .create_image(&mut handle, &naxes)
            .map_err(|e| report(IoErrorKind::Create, path, e))?;

        if count > 0 {
            let memory = buf.as_f32().unwrap_or_default();
            let pixels = memory.get(..count).ok_or_else(|| {
                let err = codec::Error::PixelRange {
                    first: 1,
                    count,
                    total: memory.len(),
                };
                report(IoErrorKind::Write, path, err)
            })?;
            self.codec
                .write_pixels_as_float(&mut handle, 1, pixels)
                .map_err(|e| report(IoErrorKind::Write, path, e))?;
        }

        self.codec
            .close(handle)
            .map_err(|e| report(IoErrorKind::Close, path, e))?;

        debug!("saved {} with axes {:?}", path.display(), naxes);
        Ok(())
    }
}
