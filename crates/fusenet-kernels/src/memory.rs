//! Memory descriptors: logical dims, element type and physical layout.
//!
//! Every supported layout can be addressed as `(n, c, spatial)` where
//! `spatial` is the row-major linear index over the spatial dims. Plain
//! layouts store channels outermost per batch; blocked layouts group
//! `block` channels innermost and pad the channel count up to a multiple
//! of the block.

use std::fmt;

use fusenet_common::{DataType, FusenetError, KernelError, Result};

// ── Format tags ────────────────────────────────────────────────────

/// Physical element ordering of a tensor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    /// Let the primitive choose; resolved before execution.
    Any,
    Nchw,
    NChw8c,
    NChw16c,
    Ncdhw,
    NCdhw8c,
    NCdhw16c,
}

impl FormatTag {
    /// Tensor rank the tag describes, `None` for [`FormatTag::Any`].
    pub const fn rank(self) -> Option<usize> {
        match self {
            FormatTag::Any => None,
            FormatTag::Nchw | FormatTag::NChw8c | FormatTag::NChw16c => Some(4),
            FormatTag::Ncdhw | FormatTag::NCdhw8c | FormatTag::NCdhw16c => Some(5),
        }
    }

    /// Channel block size; 1 for unblocked layouts.
    pub const fn block(self) -> usize {
        match self {
            FormatTag::NChw8c | FormatTag::NCdhw8c => 8,
            FormatTag::NChw16c | FormatTag::NCdhw16c => 16,
            FormatTag::Any | FormatTag::Nchw | FormatTag::Ncdhw => 1,
        }
    }

    pub const fn is_blocked(self) -> bool {
        self.block() > 1
    }

    /// Unblocked layout for a rank-4 or rank-5 tensor.
    pub const fn plain(rank: usize) -> Option<FormatTag> {
        match rank {
            4 => Some(FormatTag::Nchw),
            5 => Some(FormatTag::Ncdhw),
            _ => None,
        }
    }

    /// Channel-blocked layout for `rank` with the given block size.
    pub const fn blocked(rank: usize, block: usize) -> Option<FormatTag> {
        match (rank, block) {
            (4, 8) => Some(FormatTag::NChw8c),
            (4, 16) => Some(FormatTag::NChw16c),
            (5, 8) => Some(FormatTag::NCdhw8c),
            (5, 16) => Some(FormatTag::NCdhw16c),
            (r, 1) => FormatTag::plain(r),
            _ => None,
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatTag::Any => "any",
            FormatTag::Nchw => "nchw",
            FormatTag::NChw8c => "nChw8c",
            FormatTag::NChw16c => "nChw16c",
            FormatTag::Ncdhw => "ncdhw",
            FormatTag::NCdhw8c => "nCdhw8c",
            FormatTag::NCdhw16c => "nCdhw16c",
        };
        f.write_str(name)
    }
}

// ── MemoryDesc ─────────────────────────────────────────────────────

/// Logical dims plus physical layout of one buffer.
///
/// Two descriptors are interchangeable without a reorder exactly when
/// they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryDesc {
    dims: Vec<usize>,
    data_type: DataType,
    format: FormatTag,
}

impl MemoryDesc {
    /// Build a descriptor, checking the tag against the rank.
    ///
    /// `Any` accepts rank 4 or 5. Dims whose padded buffer size does not
    /// fit in `usize` are an unsupported shape, so the size accessors
    /// below cannot overflow.
    pub fn new(dims: impl Into<Vec<usize>>, data_type: DataType, format: FormatTag) -> Result<Self> {
        let dims = dims.into();
        let rank_ok = match format.rank() {
            Some(rank) => rank == dims.len(),
            None => matches!(dims.len(), 4 | 5),
        };
        if !rank_ok {
            return Err(KernelError::UnsupportedFormat { format: format.to_string(), rank: dims.len() }.into());
        }
        if padded_byte_size(&dims, data_type, format).is_none() {
            return Err(FusenetError::unsupported_shape(&dims, format!("{format} buffer size overflows usize")));
        }
        Ok(Self { dims, data_type, format })
    }

    /// Unblocked descriptor for a rank-4 or rank-5 tensor.
    pub fn plain(dims: impl Into<Vec<usize>>, data_type: DataType) -> Result<Self> {
        let dims = dims.into();
        let format = FormatTag::plain(dims.len())
            .ok_or_else(|| KernelError::UnsupportedFormat { format: "plain".into(), rank: dims.len() })?;
        Self::new(dims, data_type, format)
    }

    /// Same dims with a different tag.
    pub fn with_format(&self, format: FormatTag) -> Result<Self> {
        Self::new(self.dims.clone(), self.data_type, format)
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn format(&self) -> FormatTag {
        self.format
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn batch(&self) -> usize {
        self.dims[0]
    }

    pub fn channels(&self) -> usize {
        self.dims[1]
    }

    pub fn spatial(&self) -> &[usize] {
        &self.dims[2..]
    }

    /// Product of the spatial dims.
    pub fn spatial_len(&self) -> usize {
        self.spatial().iter().product()
    }

    /// Channel count rounded up to the layout's block.
    pub fn padded_channels(&self) -> usize {
        self.channels().div_ceil(self.format.block()) * self.format.block()
    }

    /// Logical element count.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Elements the backing buffer must hold, including block padding.
    pub fn padded_elements(&self) -> usize {
        self.batch() * self.padded_channels() * self.spatial_len()
    }

    pub fn byte_size(&self) -> usize {
        self.padded_elements() * self.data_type.size_in_bytes()
    }

    /// Element offset of `(n, c, spatial)`, `spatial` being the row-major
    /// index over the spatial dims.
    #[inline]
    pub fn offset_ncs(&self, n: usize, c: usize, spatial: usize) -> usize {
        let block = self.format.block();
        let s = self.spatial_len();
        if block == 1 {
            (n * self.channels() + c) * s + spatial
        } else {
            let blocks = self.padded_channels() / block;
            ((n * blocks + c / block) * s + spatial) * block + c % block
        }
    }
}

impl fmt::Display for MemoryDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{:?}", self.data_type, self.format, self.dims)
    }
}

fn padded_byte_size(dims: &[usize], data_type: DataType, format: FormatTag) -> Option<usize> {
    let block = format.block();
    let spatial = dims[2..].iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))?;
    let channels = dims[1].div_ceil(block).checked_mul(block)?;
    dims[0].checked_mul(channels)?.checked_mul(spatial)?.checked_mul(data_type.size_in_bytes())
}

/// Decode a row-major linear index into `out`, one coordinate per dim.
#[inline]
pub(crate) fn unravel(mut linear: usize, dims: &[usize], out: &mut [usize]) {
    for (slot, &d) in out.iter_mut().zip(dims).rev() {
        *slot = linear % d;
        linear /= d;
    }
}
