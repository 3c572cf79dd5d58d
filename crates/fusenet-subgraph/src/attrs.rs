//! Pooling operator configuration resolved from node attributes.
//!
//! Validation happens here, once, when a node is added to a chain. A
//! config that makes it out of [`PoolingConfig::from_attributes`] only
//! fails later if the runtime input shape cannot be pooled.

use std::fmt;
use std::str::FromStr;

use fusenet_common::{AttributeReader, ConfigError, NodeAttributes};
use fusenet_kernels::PoolingAlgorithm;

/// Reduction kind of a pooling node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolingKind {
    Max,
    AverageExcludePad,
    AverageIncludePad,
}

impl PoolingKind {
    pub fn algorithm(self) -> PoolingAlgorithm {
        match self {
            PoolingKind::Max => PoolingAlgorithm::Max,
            PoolingKind::AverageExcludePad => PoolingAlgorithm::AvgExcludePad,
            PoolingKind::AverageIncludePad => PoolingAlgorithm::AvgIncludePad,
        }
    }
}

/// How padding is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutoPad {
    /// Use the declared `pads`.
    #[default]
    Explicit,
    Valid,
    SameUpper,
    SameLower,
}

impl FromStr for AutoPad {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "NOTSET" => Ok(AutoPad::Explicit),
            "VALID" => Ok(AutoPad::Valid),
            "SAME_UPPER" => Ok(AutoPad::SameUpper),
            "SAME_LOWER" => Ok(AutoPad::SameLower),
            other => Err(ConfigError::InvalidAutoPad(other.to_string())),
        }
    }
}

impl fmt::Display for AutoPad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AutoPad::Explicit => "NOTSET",
            AutoPad::Valid => "VALID",
            AutoPad::SameUpper => "SAME_UPPER",
            AutoPad::SameLower => "SAME_LOWER",
        };
        f.write_str(s)
    }
}

/// Immutable configuration of one pooling node.
///
/// For global pooling the window vectors are empty; the geometry planner
/// derives them from the input shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolingConfig {
    pub kind: PoolingKind,
    pub global: bool,
    pub kernel: Vec<usize>,
    pub strides: Vec<usize>,
    pub pads_begin: Vec<usize>,
    pub pads_end: Vec<usize>,
    pub auto_pad: AutoPad,
}

impl PoolingConfig {
    /// Resolve `op_type` and its attributes, reading keys as
    /// `prefix + name`.
    pub fn from_attributes(op_type: &str, attrs: &NodeAttributes, prefix: &str) -> Result<Self, ConfigError> {
        let (global, average) = match op_type {
            "MaxPool" => (false, false),
            "AveragePool" => (false, true),
            "GlobalMaxPool" => (true, false),
            "GlobalAveragePool" => (true, true),
            other => return Err(ConfigError::UnsupportedOperator(other.to_string())),
        };

        if global {
            let kind = if average { PoolingKind::AverageExcludePad } else { PoolingKind::Max };
            return Ok(Self::global(kind));
        }

        let reader = attrs.reader(prefix);
        let count_include_pad = reader.int("count_include_pad")?.unwrap_or(0) != 0;
        let kind = match (average, count_include_pad) {
            (false, _) => PoolingKind::Max,
            (true, false) => PoolingKind::AverageExcludePad,
            (true, true) => PoolingKind::AverageIncludePad,
        };

        let kernel = read_kernel(&reader)?;
        let auto_pad = reader.string("auto_pad")?.unwrap_or("").parse::<AutoPad>()?;
        let strides = read_strides(&reader, kernel.len())?;
        let (pads_begin, pads_end) = read_pads(&reader, kernel.len())?;

        for (axis, &k) in kernel.iter().enumerate() {
            for pad in [pads_begin[axis], pads_end[axis]] {
                if pad >= k {
                    return Err(ConfigError::PadNotSmallerThanKernel { axis, pad, kernel: k });
                }
            }
        }

        Ok(Self { kind, global: false, kernel, strides, pads_begin, pads_end, auto_pad })
    }

    fn global(kind: PoolingKind) -> Self {
        Self {
            kind,
            global: true,
            kernel: Vec::new(),
            strides: Vec::new(),
            pads_begin: Vec::new(),
            pads_end: Vec::new(),
            auto_pad: AutoPad::Explicit,
        }
    }
}

fn read_kernel(reader: &AttributeReader<'_>) -> Result<Vec<usize>, ConfigError> {
    let raw = reader.ints("kernel_shape")?.ok_or_else(|| ConfigError::MissingAttribute { name: "kernel_shape".into() })?;
    raw.iter()
        .enumerate()
        .map(|(axis, &value)| match usize::try_from(value) {
            Ok(k) if k > 0 => Ok(k),
            _ => Err(ConfigError::NonPositiveKernel { axis, value }),
        })
        .collect()
}

fn read_strides(reader: &AttributeReader<'_>, rank: usize) -> Result<Vec<usize>, ConfigError> {
    let raw = match reader.ints("strides")? {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(vec![1; rank]),
    };
    if raw.len() != rank {
        return Err(ConfigError::StrideLengthMismatch { strides: raw.len(), kernel: rank });
    }
    raw.iter()
        .enumerate()
        .map(|(axis, &value)| match usize::try_from(value) {
            Ok(s) if s > 0 => Ok(s),
            _ => Err(ConfigError::NonPositiveStride { axis }),
        })
        .collect()
}

fn read_pads(reader: &AttributeReader<'_>, rank: usize) -> Result<(Vec<usize>, Vec<usize>), ConfigError> {
    let Some(mut pads) = reader.usizes("pads")? else {
        return Ok((vec![0; rank], vec![0; rank]));
    };
    if pads.len() != 2 * rank {
        return Err(ConfigError::PadsLength { expected: 2 * rank, got: pads.len() });
    }
    let end = pads.split_off(rank);
    Ok((pads, end))
}
