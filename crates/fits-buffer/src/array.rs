//! `ndarray` views over descriptor memory.
//!
//! Axis `i` of the view is axis `i` of the descriptor, so `view[[x, y]]`
//! addresses `x + y * stride[1]`.

use ndarray::{ArrayViewD, ArrayViewMutD, IxDyn, ShapeBuilder};

use crate::descriptor::BufferDescriptor;

impl BufferDescriptor {
    fn view_layout(&self) -> (Vec<usize>, Vec<usize>) {
        let shape = self.shape();
        let strides = self.stride()[..shape.len()]
            .iter()
            .map(|&s| s as usize)
            .collect();
        (shape, strides)
    }

    /// Borrow an `f32` descriptor as an n-dimensional view.
    ///
    /// Returns `None` for non-`f32` or unallocated descriptors, and for
    /// descriptors with no active axes.
    pub fn view_f32(&self) -> Option<ArrayViewD<'_, f32>> {
        let (shape, strides) = self.view_layout();
        if shape.is_empty() {
            return None;
        }
        let data = self.as_f32()?;
        ArrayViewD::from_shape(IxDyn(&shape).strides(IxDyn(&strides)), data).ok()
    }

    /// Mutable counterpart of [`view_f32`](Self::view_f32).
    pub fn view_f32_mut(&mut self) -> Option<ArrayViewMutD<'_, f32>> {
        let (shape, strides) = self.view_layout();
        if shape.is_empty() {
            return None;
        }
        let data = self.as_f32_mut()?;
        ArrayViewMutD::from_shape(IxDyn(&shape).strides(IxDyn(&strides)), data).ok()
    }
}
