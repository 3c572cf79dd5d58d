//! Internal layout choice for a link's pooling input.

use fusenet_common::{SimdLevel, TensorShape};
use fusenet_device_probe::CpuCapabilities;
use fusenet_kernels::FormatTag;

/// Preferred layout for `shape` on a host with `caps`.
///
/// AVX-512 always takes the 16-channel blocked layout. AVX2 takes the
/// 8-channel blocked layout when the channel count divides evenly.
/// Everything else stays plain. Returns `None` for ranks other than 4
/// and 5.
pub fn select_layout(shape: &TensorShape, caps: &CpuCapabilities) -> Option<FormatTag> {
    let rank = shape.rank();
    let channels = shape.channels()?;
    let block = if caps.has_avx512 {
        SimdLevel::Avx512.f32_lanes()
    } else if caps.has_avx2 && channels % SimdLevel::Avx2.f32_lanes() == 0 {
        SimdLevel::Avx2.f32_lanes()
    } else {
        1
    };
    FormatTag::blocked(rank, block)
}
