//! Layout conversion between two descriptors of the same logical tensor.

use fusenet_common::{KernelError, Result};

use crate::memory::{FormatTag, MemoryDesc};
use crate::pooling::check_len;

/// Rewrites a buffer from one layout into another, preserving values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reorder {
    from: MemoryDesc,
    to: MemoryDesc,
}

impl Reorder {
    pub fn new(from: MemoryDesc, to: MemoryDesc) -> Result<Self> {
        if from.dims() != to.dims() {
            return Err(KernelError::ShapeMismatch { expected: from.dims().to_vec(), got: to.dims().to_vec() }.into());
        }
        if from.data_type() != to.data_type() {
            return Err(KernelError::invalid("reorder cannot change the element type").into());
        }
        if from.format() == FormatTag::Any || to.format() == FormatTag::Any {
            return Err(KernelError::invalid("reorder endpoints must have concrete layouts").into());
        }
        log::debug!("reorder created: {from} -> {to}");
        Ok(Self { from, to })
    }

    pub fn from_desc(&self) -> &MemoryDesc {
        &self.from
    }

    pub fn to_desc(&self) -> &MemoryDesc {
        &self.to
    }

    /// Copy every logical element; block padding in `dst` is zeroed.
    pub fn execute(&self, src: &[f32], dst: &mut [f32]) -> Result<()> {
        check_len("from", self.from.padded_elements(), src.len())?;
        check_len("to", self.to.padded_elements(), dst.len())?;
        log::debug!("reorder execute: {} -> {}", self.from.format(), self.to.format());

        dst[..self.to.padded_elements()].fill(0.0);
        let spatial = self.from.spatial_len();
        for n in 0..self.from.batch() {
            for c in 0..self.from.channels() {
                for s in 0..spatial {
                    dst[self.to.offset_ncs(n, c, s)] = src[self.from.offset_ncs(n, c, s)];
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusenet_common::{DataType, FusenetError};

    fn desc(dims: &[usize], format: FormatTag) -> MemoryDesc {
        MemoryDesc::new(dims.to_vec(), DataType::F32, format).unwrap()
    }

    #[test]
    fn plain_to_blocked_and_back() {
        let plain = desc(&[1, 3, 2, 2], FormatTag::Nchw);
        let blocked = desc(&[1, 3, 2, 2], FormatTag::NChw8c);
        let src: Vec<f32> = (0..12).map(|v| v as f32).collect();

        let mut mid = vec![f32::NAN; blocked.padded_elements()];
        Reorder::new(plain.clone(), blocked.clone()).unwrap().execute(&src, &mut mid).unwrap();
        // channel 1 of spatial position 0 sits right after channel 0
        assert_eq!(mid[1], 4.0);
        // padding channels are zeroed
        assert_eq!(mid[3], 0.0);

        let mut back = vec![0.0; 12];
        Reorder::new(blocked, plain).unwrap().execute(&mid, &mut back).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn dims_must_match() {
        let err = Reorder::new(desc(&[1, 3, 2, 2], FormatTag::Nchw), desc(&[1, 3, 2, 1], FormatTag::Nchw)).unwrap_err();
        assert!(matches!(err, FusenetError::Kernel(KernelError::ShapeMismatch { .. })));
    }

    #[test]
    fn any_is_rejected() {
        assert!(Reorder::new(desc(&[1, 3, 2, 2], FormatTag::Nchw), desc(&[1, 3, 2, 2], FormatTag::Any)).is_err());
    }

    #[test]
    fn destination_must_hold_padding() {
        let r = Reorder::new(desc(&[1, 3, 2, 2], FormatTag::Nchw), desc(&[1, 3, 2, 2], FormatTag::NChw16c)).unwrap();
        let err = r.execute(&[0.0; 12], &mut [0.0; 12]).unwrap_err();
        assert!(matches!(err, FusenetError::Kernel(KernelError::BufferTooSmall { role: "to", .. })));
    }
}
