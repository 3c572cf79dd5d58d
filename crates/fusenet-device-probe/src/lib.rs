//! CPU capability probing for fused subgraph planning.
//!
//! The probe runs once per process through [`cpu_capabilities`]; planning
//! code never queries hardware itself and instead receives a
//! [`CpuCapabilities`] snapshot by reference.

use std::sync::OnceLock;

pub use fusenet_common::SimdLevel;

/// Environment variable that replaces the detected SIMD flags.
///
/// Accepts any [`SimdLevel`] name (`avx512`, `avx2`, `neon`, `scalar`, ...).
pub const CPU_FAKE_ENV: &str = "FUSENET_CPU_FAKE";

// ── CPU capabilities ─────────────────────────────────────────────────────────

/// CPU capabilities detected at runtime.
///
/// Obtained by calling [`probe_cpu`], or built directly with
/// [`CpuCapabilities::with_simd`] when a fixed snapshot is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuCapabilities {
    /// Logical cores available to the process (always >= 1).
    pub core_count: usize,
    /// AVX2 available (`x86_64` only).
    pub has_avx2: bool,
    /// AVX-512F available (`x86_64` only).
    pub has_avx512: bool,
    /// NEON available (always `true` on `AArch64`).
    pub has_neon: bool,
}

impl CpuCapabilities {
    /// Single-core snapshot whose flags describe exactly `level`.
    ///
    /// An AVX-512 host also runs AVX2 code, so `Avx512` sets both flags.
    pub const fn with_simd(level: SimdLevel) -> Self {
        let (has_avx2, has_avx512, has_neon) = simd_flags(level);
        Self { core_count: 1, has_avx2, has_avx512, has_neon }
    }

    /// Widest vector tier the flags allow.
    pub const fn simd_level(&self) -> SimdLevel {
        if self.has_avx512 {
            SimdLevel::Avx512
        } else if self.has_avx2 {
            SimdLevel::Avx2
        } else if self.has_neon {
            SimdLevel::Neon
        } else {
            SimdLevel::Scalar
        }
    }

    /// Copy of this snapshot with every tier above `cap` cleared.
    #[must_use]
    pub fn capped_at(&self, cap: SimdLevel) -> Self {
        Self {
            core_count: self.core_count,
            has_avx2: self.has_avx2 && cap >= SimdLevel::Avx2,
            has_avx512: self.has_avx512 && cap >= SimdLevel::Avx512,
            has_neon: self.has_neon && cap >= SimdLevel::Neon,
        }
    }
}

const fn simd_flags(level: SimdLevel) -> (bool, bool, bool) {
    match level {
        SimdLevel::Avx512 => (true, true, false),
        SimdLevel::Avx2 => (true, false, false),
        SimdLevel::Neon => (false, false, true),
        _ => (false, false, false),
    }
}

/// Probe the current CPU.
///
/// `core_count` comes from [`std::thread::available_parallelism`]. SIMD
/// flags come from `is_x86_feature_detected!` on `x86_64`, from the target
/// on `aarch64`, or from `FUSENET_CPU_FAKE` when it holds a known level.
///
/// ```
/// use fusenet_device_probe::probe_cpu;
///
/// let caps = probe_cpu();
/// assert!(caps.core_count >= 1);
/// assert!(!(caps.has_avx2 && caps.has_neon));
/// ```
pub fn probe_cpu() -> CpuCapabilities {
    let core_count = std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(1);

    let (has_avx2, has_avx512, has_neon) = match fake_simd_level() {
        Some(level) => simd_flags(level),
        None => native_flags(),
    };

    CpuCapabilities { core_count, has_avx2, has_avx512, has_neon }
}

fn fake_simd_level() -> Option<SimdLevel> {
    std::env::var(CPU_FAKE_ENV).ok()?.parse().ok()
}

#[cfg(target_arch = "x86_64")]
fn native_flags() -> (bool, bool, bool) {
    (is_x86_feature_detected!("avx2"), is_x86_feature_detected!("avx512f"), false)
}

#[cfg(target_arch = "aarch64")]
fn native_flags() -> (bool, bool, bool) {
    (false, false, true)
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn native_flags() -> (bool, bool, bool) {
    (false, false, false)
}

/// Highest SIMD level of the current CPU, ignoring `FUSENET_CPU_FAKE`.
#[allow(clippy::missing_const_for_fn)] // not const on x86_64 (runtime CPUID)
pub fn detect_simd_level() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx512f") {
            SimdLevel::Avx512
        } else if is_x86_feature_detected!("avx2") {
            SimdLevel::Avx2
        } else if is_x86_feature_detected!("sse4.2") {
            SimdLevel::Sse42
        } else {
            SimdLevel::Scalar
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        SimdLevel::Neon
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        SimdLevel::Scalar
    }
}

// ── Process-wide snapshot ────────────────────────────────────────────────────

static CPU_CAPABILITIES: OnceLock<CpuCapabilities> = OnceLock::new();

/// Process-wide snapshot, probed on first call and immutable afterwards.
pub fn cpu_capabilities() -> &'static CpuCapabilities {
    CPU_CAPABILITIES.get_or_init(probe_cpu)
}
