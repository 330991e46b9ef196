//! The buffer descriptor shared with the numeric engine.
//!
//! A [`BufferDescriptor`] is owned host memory plus the per-axis extent,
//! stride and origin that describe how to index it. Axis 0 is the
//! fastest-varying one. Active axes are filled from 0 with no gaps and unused
//! trailing axes have extent 0. The host allocation always starts on a
//! [`HOST_ALIGN`]-byte boundary.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Maximum number of axes a descriptor can describe.
pub const MAX_DIMS: usize = 4;

/// Alignment of the host allocation, in bytes.
pub const HOST_ALIGN: usize = 32;

/// Errors from constructing a descriptor with an impossible shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("{0} axes requested, at most 4 are supported")]
    TooManyAxes(usize),
    #[error("axis {axis} has zero extent")]
    ZeroExtent { axis: usize },
    #[error("axis {axis} extent {extent} does not fit in 32 bits")]
    ExtentTooLarge { axis: usize, extent: usize },
    #[error("invalid element size {0}")]
    InvalidElementSize(usize),
    #[error("buffer size overflows")]
    Overflow,
    #[error("expected {expected} pixels, got {actual}")]
    PixelCountMismatch { expected: usize, actual: usize },
}

/// One alignment unit of host memory.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, align(32))]
struct Lane([u8; HOST_ALIGN]);

/// Zero-initialised host memory starting on a [`HOST_ALIGN`]-byte boundary.
#[derive(Clone)]
pub struct HostBuffer {
    lanes: Vec<Lane>,
    len: usize,
}

impl HostBuffer {
    /// Allocate `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Self {
        HostBuffer {
            lanes: vec![Lane::zeroed(); len.div_ceil(HOST_ALIGN)],
            len,
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.lanes.as_ptr().cast()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<Lane, u8>(&self.lanes)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<Lane, u8>(&mut self.lanes)[..self.len]
    }
}

impl fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len)
            .finish()
    }
}

/// Owned host memory together with the shape that indexes it.
///
/// The memory and the shape are set together by the constructors, so a
/// descriptor can never claim more elements than its allocation holds.
/// `dev`, `host_dirty` and `dev_dirty` belong to the numeric engine; this
/// crate leaves them zeroed and never reads them.
#[derive(Debug, Clone, Default)]
pub struct BufferDescriptor {
    host: Option<HostBuffer>,
    /// Device-side handle. Always 0 here.
    pub dev: u64,
    extent: [i32; MAX_DIMS],
    stride: [i32; MAX_DIMS],
    min: [i32; MAX_DIMS],
    elem_size: i32,
    /// Host memory holds the authoritative data.
    pub host_dirty: bool,
    /// Device memory holds the authoritative data.
    pub dev_dirty: bool,
}

impl BufferDescriptor {
    /// Allocate a zeroed, densely strided buffer.
    ///
    /// `extents` lists the active axes, fastest-varying first. An empty slice
    /// gives a descriptor with no active axes and no pixels.
    pub fn allocate(extents: &[usize], elem_size: usize) -> Result<Self, ShapeError> {
        if extents.len() > MAX_DIMS {
            return Err(ShapeError::TooManyAxes(extents.len()));
        }
        let elem_size_i32 = i32::try_from(elem_size)
            .ok()
            .filter(|&s| s > 0)
            .ok_or(ShapeError::InvalidElementSize(elem_size))?;

        let mut extent = [0i32; MAX_DIMS];
        let mut stride = [0i32; MAX_DIMS];
        let mut step: i32 = 1;
        for (axis, &n) in extents.iter().enumerate() {
            if n == 0 {
                return Err(ShapeError::ZeroExtent { axis });
            }
            let n_i32 =
                i32::try_from(n).map_err(|_| ShapeError::ExtentTooLarge { axis, extent: n })?;
            extent[axis] = n_i32;
            stride[axis] = step;
            // The step past the last axis only has to exist when another axis follows.
            if axis + 1 < extents.len() {
                step = step.checked_mul(n_i32).ok_or(ShapeError::Overflow)?;
            }
        }

        let pixels = if extents.is_empty() {
            0
        } else {
            extents
                .iter()
                .try_fold(1usize, |acc, &n| acc.checked_mul(n))
                .ok_or(ShapeError::Overflow)?
        };
        let bytes = pixels.checked_mul(elem_size).ok_or(ShapeError::Overflow)?;

        Ok(BufferDescriptor {
            host: Some(HostBuffer::zeroed(bytes)),
            extent,
            stride,
            elem_size: elem_size_i32,
            ..Default::default()
        })
    }

    /// Allocate a densely strided `f32` buffer and copy `pixels` into it.
    pub fn from_f32(extents: &[usize], pixels: &[f32]) -> Result<Self, ShapeError> {
        let mut buf = Self::allocate(extents, std::mem::size_of::<f32>())?;
        let expected = buf.pixel_count();
        if pixels.len() != expected {
            return Err(ShapeError::PixelCountMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        if let Some(dst) = buf.as_f32_mut() {
            dst.copy_from_slice(pixels);
        }
        Ok(buf)
    }

    pub fn extent(&self) -> [i32; MAX_DIMS] {
        self.extent
    }

    pub fn stride(&self) -> [i32; MAX_DIMS] {
        self.stride
    }

    pub fn min(&self) -> [i32; MAX_DIMS] {
        self.min
    }

    /// Set the logical starting index of an axis.
    ///
    /// # Panics
    ///
    /// Panics if `axis >= MAX_DIMS`.
    pub fn set_min(&mut self, axis: usize, value: i32) {
        self.min[axis] = value;
    }

    /// Byte size of one element.
    pub fn elem_size(&self) -> usize {
        self.elem_size as usize
    }

    /// Number of active axes: the leading non-zero extents.
    pub fn dimensions(&self) -> usize {
        self.extent.iter().take_while(|&&e| e != 0).count()
    }

    /// Extents of the active axes.
    pub fn shape(&self) -> Vec<usize> {
        self.extent[..self.dimensions()]
            .iter()
            .map(|&e| e as usize)
            .collect()
    }

    /// Number of elements covered by the active axes (0 with no active axes).
    pub fn pixel_count(&self) -> usize {
        let shape = self.shape();
        if shape.is_empty() {
            0
        } else {
            shape.iter().product()
        }
    }

    /// Whether the strides describe a tightly packed layout with axis 0
    /// fastest, i.e. the memory can be walked linearly.
    pub fn is_packed(&self) -> bool {
        let mut expected: i64 = 1;
        for axis in 0..self.dimensions() {
            if self.stride[axis] as i64 != expected {
                return false;
            }
            expected *= self.extent[axis] as i64;
        }
        true
    }

    pub fn host(&self) -> Option<&HostBuffer> {
        self.host.as_ref()
    }

    /// Start address of host memory, or null when unallocated.
    pub fn host_ptr(&self) -> *const u8 {
        self.host
            .as_ref()
            .map_or(std::ptr::null(), |h| h.as_ptr())
    }

    /// Host memory as raw bytes (empty when unallocated).
    pub fn host_bytes(&self) -> &[u8] {
        self.host.as_ref().map(HostBuffer::as_bytes).unwrap_or_default()
    }

    /// Host memory as `f32` elements, when the element size is 4.
    pub fn as_f32(&self) -> Option<&[f32]> {
        if self.elem_size() != std::mem::size_of::<f32>() {
            return None;
        }
        bytemuck::try_cast_slice(self.host.as_ref()?.as_bytes()).ok()
    }

    /// Mutable host memory as `f32` elements, when the element size is 4.
    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        if self.elem_size() != std::mem::size_of::<f32>() {
            return None;
        }
        bytemuck::try_cast_slice_mut(self.host.as_mut()?.as_bytes_mut()).ok()
    }
}
