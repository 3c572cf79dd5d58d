//! SIMD instruction-set tiers.
//!
//! The tier decides which blocked memory layout the layout selector prefers:
//! a blocked layout groups `f32_lanes()` channels so one vector register
//! holds one block.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// SIMD instruction set level available at compile or runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SimdLevel {
    /// No SIMD; scalar fallback only.
    Scalar,
    /// ARM NEON (128-bit).
    Neon,
    /// x86 SSE4.2 (128-bit).
    Sse42,
    /// x86 AVX2 (256-bit).
    Avx2,
    /// x86 AVX-512 (512-bit).
    Avx512,
}

impl SimdLevel {
    /// Number of `f32` lanes in one vector register of this tier.
    pub const fn f32_lanes(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            SimdLevel::Neon | SimdLevel::Sse42 => 4,
            SimdLevel::Avx2 => 8,
            SimdLevel::Avx512 => 16,
        }
    }
}

impl fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimdLevel::Scalar => write!(f, "scalar"),
            SimdLevel::Neon => write!(f, "neon"),
            SimdLevel::Sse42 => write!(f, "sse4.2"),
            SimdLevel::Avx2 => write!(f, "avx2"),
            SimdLevel::Avx512 => write!(f, "avx512"),
        }
    }
}

impl FromStr for SimdLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scalar" | "none" => Ok(SimdLevel::Scalar),
            "neon" => Ok(SimdLevel::Neon),
            "sse4.2" | "sse42" => Ok(SimdLevel::Sse42),
            "avx2" => Ok(SimdLevel::Avx2),
            "avx512" | "avx512f" => Ok(SimdLevel::Avx512),
            other => Err(format!("unknown SIMD level `{other}`")),
        }
    }
}
