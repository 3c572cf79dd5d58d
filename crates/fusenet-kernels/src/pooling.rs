//! Pooling-forward primitive over 2-D and 3-D windows.
//!
//! Works on any layout [`MemoryDesc`] can address. The destination layout
//! may be left as [`FormatTag::Any`], in which case it follows the source.

use fusenet_common::{FusenetError, KernelError, Result};

use crate::memory::{FormatTag, MemoryDesc, unravel};

// ── Configuration ──────────────────────────────────────────────────

/// Reduction applied over each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolingAlgorithm {
    /// Maximum over in-bounds elements; padding never wins.
    Max,
    /// Mean over in-bounds elements only.
    AvgExcludePad,
    /// Sum over in-bounds elements divided by the full window volume.
    AvgIncludePad,
}

impl std::fmt::Display for PoolingAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Max => write!(f, "max"),
            Self::AvgExcludePad => write!(f, "avg_exclude_pad"),
            Self::AvgIncludePad => write!(f, "avg_include_pad"),
        }
    }
}

/// Operation descriptor handed to [`PoolingForward::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolingDesc {
    pub algorithm: PoolingAlgorithm,
    pub src: MemoryDesc,
    pub dst: MemoryDesc,
    pub kernel: Vec<usize>,
    pub strides: Vec<usize>,
    pub pads_begin: Vec<usize>,
    pub pads_end: Vec<usize>,
}

fn invalid_args(reason: impl Into<String>) -> FusenetError {
    FusenetError::Kernel(KernelError::invalid(reason))
}

// ── Primitive ──────────────────────────────────────────────────────

/// Validated pooling primitive with a concrete destination layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolingForward {
    desc: PoolingDesc,
}

impl PoolingForward {
    pub fn new(mut desc: PoolingDesc) -> Result<Self> {
        let spatial_rank = desc.src.rank() - 2;
        if !matches!(spatial_rank, 2 | 3) {
            return Err(invalid_args(format!("pooling supports 2-D and 3-D windows, got {spatial_rank}-D")));
        }
        if desc.src.format() == FormatTag::Any {
            return Err(invalid_args("source layout must be concrete"));
        }
        if desc.src.data_type() != desc.dst.data_type() {
            return Err(invalid_args("source and destination element types differ"));
        }
        for (name, len) in [
            ("kernel", desc.kernel.len()),
            ("strides", desc.strides.len()),
            ("pads_begin", desc.pads_begin.len()),
            ("pads_end", desc.pads_end.len()),
        ] {
            if len != spatial_rank {
                return Err(invalid_args(format!("{name} has {len} entries, expected {spatial_rank}")));
            }
        }

        let mut expected = vec![desc.src.batch(), desc.src.channels()];
        for axis in 0..spatial_rank {
            let (k, s) = (desc.kernel[axis], desc.strides[axis]);
            if k == 0 || s == 0 {
                return Err(invalid_args(format!("kernel and stride on axis {axis} must be > 0")));
            }
            let padded = desc.src.spatial()[axis]
                .checked_add(desc.pads_begin[axis])
                .and_then(|v| v.checked_add(desc.pads_end[axis]))
                .ok_or_else(|| invalid_args(format!("padded extent overflows on axis {axis}")))?;
            if padded < k {
                return Err(invalid_args(format!("window {k} exceeds padded extent {padded} on axis {axis}")));
            }
            expected.push((padded - k) / s + 1);
        }
        if desc.kernel.iter().try_fold(1usize, |acc, &k| acc.checked_mul(k)).is_none() {
            return Err(invalid_args("window element count overflows usize"));
        }
        if desc.dst.dims() != expected.as_slice() {
            return Err(KernelError::ShapeMismatch { expected, got: desc.dst.dims().to_vec() }.into());
        }

        if desc.dst.format() == FormatTag::Any {
            desc.dst = desc.dst.with_format(desc.src.format())?;
        }
        log::debug!(
            "pooling_forward created: {} {} -> {} kernel={:?} strides={:?}",
            desc.algorithm,
            desc.src,
            desc.dst,
            desc.kernel,
            desc.strides
        );
        Ok(Self { desc })
    }

    pub fn algorithm(&self) -> PoolingAlgorithm {
        self.desc.algorithm
    }

    /// Layout the primitive reads.
    pub fn src_desc(&self) -> &MemoryDesc {
        &self.desc.src
    }

    /// Layout the primitive writes, never `Any`.
    pub fn dst_desc(&self) -> &MemoryDesc {
        &self.desc.dst
    }

    pub fn desc(&self) -> &PoolingDesc {
        &self.desc
    }

    pub fn execute(&self, src: &[f32], dst: &mut [f32]) -> Result<()> {
        let d = &self.desc;
        check_len("src", d.src.padded_elements(), src.len())?;
        check_len("dst", d.dst.padded_elements(), dst.len())?;
        log::debug!("pooling_forward execute: {} {}", d.algorithm, d.src);

        let in_spatial = d.src.spatial();
        let out_spatial = d.dst.spatial();
        let out_len = d.dst.spatial_len();
        // checked in `new`
        let window_len: usize = d.kernel.iter().product();
        let rank = in_spatial.len();

        let mut out_pos = [0usize; 3];
        let mut k_pos = [0usize; 3];

        for n in 0..d.src.batch() {
            for c in 0..d.src.channels() {
                for o in 0..out_len {
                    unravel(o, out_spatial, &mut out_pos[..rank]);

                    let mut max = f32::NEG_INFINITY;
                    let mut sum = 0.0f32;
                    let mut count = 0usize;

                    for w in 0..window_len {
                        unravel(w, &d.kernel, &mut k_pos[..rank]);
                        let Some(in_linear) = input_index(
                            &out_pos[..rank],
                            &k_pos[..rank],
                            &d.strides,
                            &d.pads_begin,
                            in_spatial,
                        ) else {
                            continue;
                        };
                        let v = src[d.src.offset_ncs(n, c, in_linear)];
                        max = max.max(v);
                        sum += v;
                        count += 1;
                    }

                    let value = match d.algorithm {
                        PoolingAlgorithm::Max if count == 0 => 0.0,
                        PoolingAlgorithm::Max => max,
                        PoolingAlgorithm::AvgExcludePad if count == 0 => 0.0,
                        PoolingAlgorithm::AvgExcludePad => sum / count as f32,
                        PoolingAlgorithm::AvgIncludePad => sum / window_len as f32,
                    };
                    dst[d.dst.offset_ncs(n, c, o)] = value;
                }
            }
        }
        Ok(())
    }
}

/// Row-major spatial index of the input element under window position
/// `k` of output position `o`, or `None` when it falls in padding.
#[inline]
fn input_index(o: &[usize], k: &[usize], strides: &[usize], pads: &[usize], dims: &[usize]) -> Option<usize> {
    let mut linear = 0;
    for axis in 0..dims.len() {
        let pos = (o[axis] * strides[axis] + k[axis]).checked_sub(pads[axis])?;
        if pos >= dims[axis] {
            return None;
        }
        linear = linear * dims[axis] + pos;
    }
    Some(linear)
}

pub(crate) fn check_len(role: &'static str, elements: usize, actual: usize) -> Result<()> {
    if actual < elements {
        let size = std::mem::size_of::<f32>();
        return Err(KernelError::BufferTooSmall { role, required: elements * size, actual: actual * size }.into());
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────
