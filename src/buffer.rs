//! In-memory N-dimensional buffers
//!
//! An [`ArrayBuffer`] is a C-contiguous block of native-endian element bytes
//! with a known data type and shape. Chunk contents and the caller's
//! source/destination buffers are both represented this way.

use crate::error::{ArrayError, Result};
use crate::types::{DataType, Element, FillValue};
use ndarray::{ArrayD, IxDyn};

/// A C-ordered N-dimensional buffer of native-endian elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayBuffer {
    data_type: DataType,
    shape: Vec<u64>,
    bytes: Vec<u8>,
}

/// Number of elements in a shape
pub fn num_elements(shape: &[u64]) -> u64 {
    shape.iter().product()
}

/// Row-major element strides for a shape
pub fn c_strides(shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

impl ArrayBuffer {
    /// Create a buffer from raw native-endian bytes
    pub fn new(data_type: DataType, shape: Vec<u64>, bytes: Vec<u8>) -> Result<Self> {
        let expected = num_elements(&shape) as usize * data_type.size_in_bytes();
        if bytes.len() != expected {
            return Err(ArrayError::validation(format!(
                "buffer of shape {:?} and type {} needs {} bytes, got {}",
                shape,
                data_type,
                expected,
                bytes.len()
            )));
        }
        Ok(Self {
            data_type,
            shape,
            bytes,
        })
    }

    /// Create a buffer uniformly filled with `fill_value`
    pub fn filled(data_type: DataType, shape: Vec<u64>, fill_value: &FillValue) -> Self {
        let n = num_elements(&shape) as usize;
        let bytes = fill_value.as_ne_bytes().repeat(n);
        Self {
            data_type,
            shape,
            bytes,
        }
    }

    /// Create a buffer from typed elements in C order
    pub fn from_elements<T: Element>(shape: Vec<u64>, elements: &[T]) -> Result<Self> {
        Self::new(T::DATA_TYPE, shape, T::to_ne_bytes_vec(elements))
    }

    /// Create a buffer from an ndarray
    pub fn from_ndarray<T: Element>(array: &ArrayD<T>) -> Result<Self> {
        let shape = array.shape().iter().map(|&s| s as u64).collect();
        let elements: Vec<T> = array.iter().copied().collect();
        Self::from_elements(shape, &elements)
    }

    /// Typed elements in C order
    pub fn to_elements<T: Element>(&self) -> Result<Vec<T>> {
        self.check_type(T::DATA_TYPE)?;
        T::from_ne_bytes_vec(&self.bytes)
    }

    /// Convert to an ndarray of the matching element type
    pub fn to_ndarray<T: Element>(&self) -> Result<ArrayD<T>> {
        let elements = self.to_elements::<T>()?;
        let shape: Vec<usize> = self.shape.iter().map(|&s| s as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), elements)
            .map_err(|e| ArrayError::validation(e.to_string()))
    }

    fn check_type(&self, data_type: DataType) -> Result<()> {
        if self.data_type != data_type {
            return Err(ArrayError::validation(format!(
                "buffer holds {}, requested {}",
                self.data_type, data_type
            )));
        }
        Ok(())
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn num_elements(&self) -> u64 {
        num_elements(&self.shape)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Reinterpret with a new shape holding the same number of elements
    pub fn reshape(self, shape: Vec<u64>) -> Result<Self> {
        if num_elements(&shape) != self.num_elements() {
            return Err(ArrayError::validation(format!(
                "cannot reshape {:?} into {:?}",
                self.shape, shape
            )));
        }
        Ok(Self { shape, ..self })
    }

    /// True if every element equals `fill_value`
    pub fn is_fill(&self, fill_value: &FillValue) -> bool {
        let fill = fill_value.as_ne_bytes();
        if fill.is_empty() {
            return true;
        }
        self.bytes.chunks_exact(fill.len()).all(|e| e == fill)
    }

    /// Copy elements at `src_offsets` into `dst` at `dst_offsets`
    ///
    /// Offsets are linear element indices and are consumed pairwise.
    pub fn copy_elements_to(
        &self,
        src_offsets: impl Iterator<Item = u64>,
        dst: &mut ArrayBuffer,
        dst_offsets: impl Iterator<Item = u64>,
    ) -> Result<()> {
        dst.check_type(self.data_type)?;
        let size = self.data_type.size_in_bytes();
        let src_len = self.bytes.len();
        let dst_len = dst.bytes.len();
        for (s, d) in src_offsets.zip(dst_offsets) {
            let s = s as usize * size;
            let d = d as usize * size;
            if s + size > src_len || d + size > dst_len {
                return Err(ArrayError::index("element offset outside of buffer"));
            }
            dst.bytes[d..d + size].copy_from_slice(&self.bytes[s..s + size]);
        }
        Ok(())
    }
}
