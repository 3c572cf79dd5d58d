//! Executable primitives and their argument roles.

use std::fmt;

use fusenet_common::Result;

use crate::memory::MemoryDesc;
use crate::pooling::PoolingForward;
use crate::reorder::Reorder;

/// Argument slot a buffer is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgRole {
    /// Pooling source.
    Src,
    /// Pooling destination.
    Dst,
    /// Reorder input.
    From,
    /// Reorder output.
    To,
}

impl fmt::Display for ArgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgRole::Src => write!(f, "src"),
            ArgRole::Dst => write!(f, "dst"),
            ArgRole::From => write!(f, "from"),
            ArgRole::To => write!(f, "to"),
        }
    }
}

/// One executable step: a single input buffer, a single output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    Reorder(Reorder),
    PoolingForward(PoolingForward),
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Reorder(_) => "reorder",
            Primitive::PoolingForward(_) => "pooling_forward",
        }
    }

    pub fn input_role(&self) -> ArgRole {
        match self {
            Primitive::Reorder(_) => ArgRole::From,
            Primitive::PoolingForward(_) => ArgRole::Src,
        }
    }

    pub fn output_role(&self) -> ArgRole {
        match self {
            Primitive::Reorder(_) => ArgRole::To,
            Primitive::PoolingForward(_) => ArgRole::Dst,
        }
    }

    pub fn input_desc(&self) -> &MemoryDesc {
        match self {
            Primitive::Reorder(r) => r.from_desc(),
            Primitive::PoolingForward(p) => p.src_desc(),
        }
    }

    pub fn output_desc(&self) -> &MemoryDesc {
        match self {
            Primitive::Reorder(r) => r.to_desc(),
            Primitive::PoolingForward(p) => p.dst_desc(),
        }
    }

    pub fn execute(&self, input: &[f32], output: &mut [f32]) -> Result<()> {
        match self {
            Primitive::Reorder(r) => r.execute(input, output),
            Primitive::PoolingForward(p) => p.execute(input, output),
        }
    }
}

impl From<Reorder> for Primitive {
    fn from(r: Reorder) -> Self {
        Primitive::Reorder(r)
    }
}

impl From<PoolingForward> for Primitive {
    fn from(p: PoolingForward) -> Self {
        Primitive::PoolingForward(p)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Reorder(r) => write!(f, "reorder({} -> {})", r.from_desc().format(), r.to_desc().format()),
            Primitive::PoolingForward(p) => {
                write!(f, "pool_{}({} -> {})", p.algorithm(), p.src_desc().format(), p.dst_desc().format())
            }
        }
    }
}
