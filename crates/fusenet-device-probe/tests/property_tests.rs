//! Property tests for `fusenet-device-probe`.
//!
//! These tests cover the environment-driven fakes and the capping rules
//! without depending on the host CPU.

use fusenet_device_probe::{CPU_FAKE_ENV, CpuCapabilities, SimdLevel, detect_simd_level, probe_cpu};
use proptest::prelude::*;
use serial_test::serial;

fn any_level() -> impl Strategy<Value = SimdLevel> {
    prop_oneof![
        Just(SimdLevel::Scalar),
        Just(SimdLevel::Neon),
        Just(SimdLevel::Sse42),
        Just(SimdLevel::Avx2),
        Just(SimdLevel::Avx512),
    ]
}

// ── Capping ─────────────────────────────────────────────────────────────────

proptest! {
    /// Capping never raises the effective tier above either input.
    #[test]
    fn capped_level_is_min_of_inputs(host in any_level(), cap in any_level()) {
        let capped = CpuCapabilities::with_simd(host).capped_at(cap);
        prop_assert!(capped.simd_level() <= CpuCapabilities::with_simd(host).simd_level());
        prop_assert!(capped.simd_level() <= cap);
    }

    /// Capping is idempotent.
    #[test]
    fn capping_twice_is_capping_once(host in any_level(), cap in any_level()) {
        let once = CpuCapabilities::with_simd(host).capped_at(cap);
        prop_assert_eq!(once.capped_at(cap), once);
    }
}

// ── FUSENET_CPU_FAKE ────────────────────────────────────────────────────────

#[test]
#[serial(fusenet_env)]
fn fake_avx512_sets_both_x86_flags() {
    temp_env::with_vars([(CPU_FAKE_ENV, Some("avx512"))], || {
        let caps = probe_cpu();
        assert!(caps.has_avx512);
        assert!(caps.has_avx2);
        assert!(!caps.has_neon);
        assert!(caps.core_count >= 1);
    });
}

#[test]
#[serial(fusenet_env)]
fn fake_avx2_only() {
    temp_env::with_vars([(CPU_FAKE_ENV, Some("AVX2"))], || {
        assert_eq!(probe_cpu().simd_level(), SimdLevel::Avx2);
    });
}

#[test]
#[serial(fusenet_env)]
fn fake_scalar_clears_everything() {
    temp_env::with_vars([(CPU_FAKE_ENV, Some("scalar"))], || {
        let caps = probe_cpu();
        assert!(!caps.has_avx2 && !caps.has_avx512 && !caps.has_neon);
    });
}

#[test]
#[serial(fusenet_env)]
fn unknown_fake_falls_back_to_hardware() {
    let real = temp_env::with_var_unset(CPU_FAKE_ENV, probe_cpu);
    temp_env::with_vars([(CPU_FAKE_ENV, Some("quantum"))], || {
        assert_eq!(probe_cpu(), real);
    });
}

#[test]
#[serial(fusenet_env)]
fn detect_simd_level_ignores_fake() {
    let real = detect_simd_level();
    temp_env::with_vars([(CPU_FAKE_ENV, Some("scalar"))], || {
        assert_eq!(detect_simd_level(), real);
    });
}

#[test]
fn fixed_snapshot_debug() {
    let caps = CpuCapabilities::with_simd(SimdLevel::Avx2);
    insta::assert_debug_snapshot!(caps, @r###"
    CpuCapabilities {
        core_count: 1,
        has_avx2: true,
        has_avx512: false,
        has_neon: false,
    }
    "###);
}
