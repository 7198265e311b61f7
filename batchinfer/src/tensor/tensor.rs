//! Three-dimensional tensor container.
//!
//! `Tensor<T>` always stores its values as a `channels x rows x cols` block in
//! row-major order and remembers the logical (1-D, 2-D or 3-D) shape it was
//! created or reshaped with.
use anyhow::{anyhow, bail, ensure, Result};

use super::shape::numel;

/// Owned 3-D tensor with a remembered raw shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    data: Vec<T>,
    channels: usize,
    rows: usize,
    cols: usize,
    raw_shapes: Vec<usize>,
}

impl<T> Default for Tensor<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            channels: 0,
            rows: 0,
            cols: 0,
            raw_shapes: Vec::new(),
        }
    }
}

impl<T: Copy + Default> Tensor<T> {
    /// Create a zero-initialized tensor of `channels x rows x cols`.
    ///
    /// Leading singleton dimensions are dropped from the raw shape, so
    /// `new(1, 1, 3)` is logically 1-D and `new(1, 2, 3)` logically 2-D.
    pub fn new(channels: usize, rows: usize, cols: usize) -> Self {
        let raw_shapes = if channels == 1 && rows == 1 {
            vec![cols]
        } else if channels == 1 {
            vec![rows, cols]
        } else {
            vec![channels, rows, cols]
        };
        Self {
            data: vec![T::default(); channels * rows * cols],
            channels,
            rows,
            cols,
            raw_shapes,
        }
    }

    /// Create a zero-initialized 1-D tensor.
    pub fn new_1d(size: usize) -> Self {
        Self {
            data: vec![T::default(); size],
            channels: 1,
            rows: 1,
            cols: size,
            raw_shapes: vec![size],
        }
    }

    /// Create a zero-initialized 2-D tensor.
    pub fn new_2d(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::default(); rows * cols],
            channels: 1,
            rows,
            cols,
            raw_shapes: vec![rows, cols],
        }
    }

    /// Create a zero-initialized tensor from a 1..=3 component logical shape.
    pub fn from_shapes(shapes: &[usize]) -> Result<Self> {
        match *shapes {
            [size] => Ok(Self::new_1d(size)),
            [rows, cols] => Ok(Self::new_2d(rows, cols)),
            [channels, rows, cols] => {
                let mut tensor = Self::new(channels, rows, cols);
                tensor.raw_shapes = shapes.to_vec();
                Ok(tensor)
            }
            _ => Err(anyhow!(
                "tensor shape {:?} must have between 1 and 3 dimensions",
                shapes
            )),
        }
    }

    /// Build a tensor from flat row-major values and a logical shape.
    ///
    /// # Example
    /// ```
    /// # use batchinfer::Tensor;
    /// # fn main() -> anyhow::Result<()> {
    /// let t = Tensor::from_vec(&[2, 2], vec![1.0f32, 2.0, 3.0, 4.0])?;
    /// assert_eq!(t.at(0, 1, 0), 3.0);
    /// # Ok(()) }
    /// ```
    pub fn from_vec(shapes: &[usize], data: Vec<T>) -> Result<Self> {
        let mut tensor = Self::from_shapes(shapes)?;
        ensure!(
            tensor.size() == data.len(),
            "tensor shape {:?} expects {} values, got {}",
            shapes,
            tensor.size(),
            data.len()
        );
        tensor.data = data;
        Ok(tensor)
    }

    /// Set every element to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Copy `values` into the tensor in flat row-major order.
    pub fn fill_from(&mut self, values: &[T]) -> Result<()> {
        ensure!(
            values.len() == self.data.len(),
            "fill expects {} values, got {}",
            self.data.len(),
            values.len()
        );
        self.data.copy_from_slice(values);
        Ok(())
    }
}

impl Tensor<f32> {
    /// Create a tensor filled with ones.
    pub fn ones(channels: usize, rows: usize, cols: usize) -> Self {
        let mut tensor = Self::new(channels, rows, cols);
        tensor.fill(1.0);
        tensor
    }
}

impl<T> Tensor<T> {
    /// An unallocated tensor slot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total element count.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Physical `[channels, rows, cols]` layout.
    pub fn shapes(&self) -> [usize; 3] {
        [self.channels, self.rows, self.cols]
    }

    /// Logical shape recorded at construction or by the last reshape.
    pub fn raw_shapes(&self) -> &[usize] {
        &self.raw_shapes
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Borrow one channel as a `rows * cols` row-major plane.
    pub fn slice(&self, channel: usize) -> &[T] {
        let plane = self.rows * self.cols;
        &self.data[channel * plane..(channel + 1) * plane]
    }

    pub fn slice_mut(&mut self, channel: usize) -> &mut [T] {
        let plane = self.rows * self.cols;
        &mut self.data[channel * plane..(channel + 1) * plane]
    }

    fn offset(&self, channel: usize, row: usize, col: usize) -> usize {
        assert!(
            channel < self.channels && row < self.rows && col < self.cols,
            "tensor index ({}, {}, {}) out of bounds for shape {:?}",
            channel,
            row,
            col,
            self.shapes()
        );
        (channel * self.rows + row) * self.cols + col
    }

    /// Change the logical shape while keeping the flat element order.
    pub fn reshape(&mut self, shapes: &[usize]) -> Result<()> {
        if shapes.is_empty() || shapes.len() > 3 {
            bail!(
                "reshape target {:?} must have between 1 and 3 dimensions",
                shapes
            );
        }
        let target = numel(shapes);
        ensure!(
            target == self.size(),
            "reshape target {:?} holds {} elements, tensor holds {}",
            shapes,
            target,
            self.size()
        );
        let (channels, rows, cols) = match *shapes {
            [cols] => (1, 1, cols),
            [rows, cols] => (1, rows, cols),
            [channels, rows, cols] => (channels, rows, cols),
            _ => unreachable!(),
        };
        self.channels = channels;
        self.rows = rows;
        self.cols = cols;
        self.raw_shapes = shapes.to_vec();
        Ok(())
    }

    /// Reshape to a single logical dimension.
    pub fn flatten(&mut self) {
        let size = self.size();
        self.channels = 1;
        self.rows = 1;
        self.cols = size;
        self.raw_shapes = vec![size];
    }

    /// Apply `f` to every element in place.
    pub fn transform(&mut self, mut f: impl FnMut(&mut T)) {
        self.data.iter_mut().for_each(|value| f(value));
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Copy> Tensor<T> {
    /// Read the element at `(channel, row, col)`.
    pub fn at(&self, channel: usize, row: usize, col: usize) -> T {
        self.data[self.offset(channel, row, col)]
    }

    pub fn at_mut(&mut self, channel: usize, row: usize, col: usize) -> &mut T {
        let offset = self.offset(channel, row, col);
        &mut self.data[offset]
    }

    /// Read the element at flat row-major `offset`.
    pub fn index(&self, offset: usize) -> T {
        self.data[offset]
    }

    pub fn index_mut(&mut self, offset: usize) -> &mut T {
        &mut self.data[offset]
    }

    /// Copy out all values in flat row-major order.
    pub fn values(&self) -> Vec<T> {
        self.data.clone()
    }

    /// Copy `other` into this tensor when both have the same physical layout.
    pub(crate) fn copy_from(&mut self, other: &Tensor<T>) -> bool {
        if self.shapes() != other.shapes() {
            return false;
        }
        self.data.copy_from_slice(&other.data);
        self.raw_shapes.clone_from(&other.raw_shapes);
        true
    }
}
