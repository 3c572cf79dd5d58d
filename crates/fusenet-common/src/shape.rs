//! Logical tensor shapes and element types.
//!
//! Shapes follow the `[batch, channel, spatial...]` convention used by
//! pooling and convolution nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of a tensor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DataType {
    F32,
}

impl DataType {
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::F32 => std::mem::size_of::<f32>(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::F32 => write!(f, "f32"),
        }
    }
}

/// Ordered dimension sizes. Dimension 0 is batch, 1 is channel, the rest
/// are spatial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn batch(&self) -> Option<usize> {
        self.0.first().copied()
    }

    pub fn channels(&self) -> Option<usize> {
        self.0.get(1).copied()
    }

    /// Spatial extents; empty when the rank is below 3.
    pub fn spatial(&self) -> &[usize] {
        self.0.get(2..).unwrap_or(&[])
    }

    /// Element count, or `None` when it does not fit in `usize`.
    pub fn num_elements(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Element type plus logical shape of a tensor supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDesc {
    pub data_type: DataType,
    pub shape: TensorShape,
}

impl TensorDesc {
    pub fn f32(dims: impl Into<Vec<usize>>) -> Self {
        Self { data_type: DataType::F32, shape: TensorShape::new(dims) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nchw_accessors() {
        let shape = TensorShape::new(vec![2, 3, 8, 6]);
        assert_eq!(shape.rank(), 4);
        assert_eq!(shape.batch(), Some(2));
        assert_eq!(shape.channels(), Some(3));
        assert_eq!(shape.spatial(), &[8, 6]);
        assert_eq!(shape.num_elements(), Some(2 * 3 * 8 * 6));
    }

    #[test]
    fn low_rank_has_no_spatial_dims() {
        assert!(TensorShape::new(vec![1, 3]).spatial().is_empty());
        assert!(TensorShape::new(vec![]).spatial().is_empty());
        assert_eq!(TensorShape::new(vec![]).channels(), None);
    }

    #[test]
    fn desc_display() {
        let desc = TensorDesc::f32(vec![1, 3, 4, 4]);
        assert_eq!(desc.data_type, DataType::F32);
        assert_eq!(desc.shape.to_string(), "[1, 3, 4, 4]");
    }

    #[test]
    fn element_count_overflow_is_none() {
        assert_eq!(TensorShape::new(vec![usize::MAX / 2, 3, 2, 2]).num_elements(), None);
        assert_eq!(TensorShape::new(vec![usize::MAX, 1, 1, 1]).num_elements(), Some(usize::MAX));
        assert_eq!(TensorShape::new(vec![usize::MAX, 0, 2, 2]).num_elements(), Some(0));
    }
}
