//! Output geometry and effective padding of a pooling node.

use fusenet_common::{ConfigError, FusenetError, Result, TensorShape};

use crate::attrs::{AutoPad, PoolingConfig};

/// Window parameters resolved against a concrete input shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolGeometry {
    pub output_shape: TensorShape,
    pub kernel: Vec<usize>,
    pub strides: Vec<usize>,
    pub pads_begin: Vec<usize>,
    pub pads_end: Vec<usize>,
}

/// Compute output shape and resolved pads for `input` under `config`.
///
/// Inputs with fewer than two or more than three spatial dims, or with no
/// elements at all, are unsupported shapes. So are a window that does not
/// fit the (padded) input and extents that overflow `usize`.
pub fn plan_geometry(input: &TensorShape, config: &PoolingConfig) -> Result<PoolGeometry> {
    let dims = input.dims();
    match input.rank() {
        0..=3 => return Err(FusenetError::unsupported_shape(dims, "1D pooling is not supported")),
        4 | 5 => {}
        _ => return Err(FusenetError::unsupported_shape(dims, "pooling supports at most 3 spatial dims")),
    }
    match input.num_elements() {
        None => return Err(FusenetError::unsupported_shape(dims, "element count overflows usize")),
        Some(0) => return Err(FusenetError::unsupported_shape(dims, "input has no elements")),
        Some(_) => {}
    }

    let spatial = input.spatial();
    if config.global {
        let rank = spatial.len();
        let mut out = dims[..2].to_vec();
        out.extend(std::iter::repeat_n(1, rank));
        return Ok(PoolGeometry {
            output_shape: TensorShape::new(out),
            kernel: spatial.to_vec(),
            strides: vec![1; rank],
            pads_begin: vec![0; rank],
            pads_end: vec![0; rank],
        });
    }

    if config.kernel.len() != spatial.len() {
        return Err(ConfigError::SpatialRankMismatch { kernel: config.kernel.len(), input: spatial.len() }.into());
    }

    let mut geometry = PoolGeometry {
        output_shape: TensorShape::default(),
        kernel: config.kernel.clone(),
        strides: config.strides.clone(),
        pads_begin: config.pads_begin.clone(),
        pads_end: config.pads_end.clone(),
    };
    let mut out = dims[..2].to_vec();
    for (axis, &n) in spatial.iter().enumerate() {
        let (k, s) = (config.kernel[axis], config.strides[axis]);
        let overflow = || FusenetError::unsupported_shape(dims, format!("padded extent overflows on axis {axis}"));
        let (head, tail) = match config.auto_pad {
            AutoPad::Explicit => (config.pads_begin[axis], config.pads_end[axis]),
            AutoPad::Valid => (0, 0),
            AutoPad::SameUpper | AutoPad::SameLower => {
                let target = n.div_ceil(s);
                let covered = (target - 1).checked_mul(s).and_then(|v| v.checked_add(k)).ok_or_else(overflow)?;
                let needed = covered.saturating_sub(n);
                let head = if config.auto_pad == AutoPad::SameUpper { needed / 2 } else { needed.div_ceil(2) };
                (head, needed - head)
            }
        };
        let padded = n.checked_add(head).and_then(|v| v.checked_add(tail)).ok_or_else(overflow)?;
        if padded < k {
            return Err(FusenetError::unsupported_shape(
                dims,
                format!("window {k} does not fit padded extent {padded} on axis {axis}"),
            ));
        }
        out.push((padded - k) / s + 1);
        geometry.pads_begin[axis] = head;
        geometry.pads_end[axis] = tail;
    }
    if geometry.kernel.iter().try_fold(1usize, |acc, &k| acc.checked_mul(k)).is_none() {
        return Err(FusenetError::unsupported_shape(dims, "window element count overflows usize"));
    }
    geometry.output_shape = TensorShape::new(out);
    Ok(geometry)
}
