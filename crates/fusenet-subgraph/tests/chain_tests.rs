//! End-to-end planning, binding and execution of fused pooling chains.

use fusenet_common::{ConfigError, FusenetError, NodeAttributes, SimdLevel, SubgraphConfig, TensorDesc};
use fusenet_device_probe::CpuCapabilities;
use fusenet_kernels::FormatTag;
use fusenet_subgraph::{BufferSlot, ExecutionContext, FusedChain};
use serial_test::serial;

fn chain(level: SimdLevel) -> FusedChain {
    FusedChain::new(&CpuCapabilities::with_simd(level), &SubgraphConfig::default())
}

fn max_2x2_s2() -> NodeAttributes {
    NodeAttributes::new().with("kernel_shape", vec![2i64, 2]).with("strides", vec![2i64, 2])
}

fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| ((i * 37) % 101) as f32 - 50.0).collect()
}

#[test]
fn stride_two_halves_spatial_dims() {
    let mut c = chain(SimdLevel::Avx512);
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 3, 8, 8]));
    assert_eq!(c.output_shape().unwrap().dims(), &[1, 3, 4, 4]);
}

#[test]
fn same_upper_keeps_spatial_dims() {
    let attrs = NodeAttributes::new().with("kernel_shape", vec![3i64, 3]).with("auto_pad", "SAME_UPPER");
    let mut c = chain(SimdLevel::Scalar);
    c.push("MaxPool", &attrs).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 3, 7, 7]));

    let plan = c.links()[0].status().unwrap();
    assert_eq!(plan.geometry.pads_begin, vec![1, 1]);
    assert_eq!(plan.geometry.pads_end, vec![1, 1]);
    assert_eq!(plan.output_shape.dims(), &[1, 3, 7, 7]);
}

#[test]
fn rank_three_input_fails_at_bind() {
    let attrs = NodeAttributes::new().with("kernel_shape", vec![2i64]);
    let mut c = chain(SimdLevel::Avx512);
    c.push("MaxPool", &attrs).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 3, 8]));

    let input = ramp(24);
    let mut output = vec![0.0; 12];
    let ctx = ExecutionContext::new(&input, vec![1, 3, 8], &mut output);
    let err = c.bind(&ctx).unwrap_err();
    assert!(matches!(err, FusenetError::UnsupportedShape { .. }));
    assert_eq!(c.pool_stats().total_allocations(), 0);

    let err = c.execute(&mut ExecutionContext::new(&input, vec![1, 3, 8], &mut output)).unwrap_err();
    assert!(matches!(err, FusenetError::UnsupportedShape { .. }));
    assert!(output.iter().all(|&v| v == 0.0));
}

#[test]
fn overflowing_pads_fail_at_bind() {
    let attrs = NodeAttributes::new()
        .with("kernel_shape", vec![i64::MAX, 1])
        .with("pads", vec![i64::MAX - 1, 0, i64::MAX - 1, 0]);
    let mut c = chain(SimdLevel::Avx512);
    c.push("MaxPool", &attrs).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 1, 8, 8]));
    assert!(matches!(c.links()[0].status(), Err(FusenetError::UnsupportedShape { .. })));

    let input = ramp(64);
    let mut output = vec![0.0; 64];
    let ctx = ExecutionContext::new(&input, vec![1, 1, 8, 8], &mut output);
    assert!(matches!(c.bind(&ctx), Err(FusenetError::UnsupportedShape { .. })));
    assert_eq!(c.pool_stats().total_allocations(), 0);
}

#[test]
fn oversized_input_shape_fails_at_bind() {
    let mut c = chain(SimdLevel::Avx2);
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.plan(&TensorDesc::f32(vec![usize::MAX / 2, 3, 2, 2]));
    for link in c.links() {
        assert!(matches!(link.status(), Err(FusenetError::UnsupportedShape { .. })));
    }

    let input = ramp(12);
    let mut output = vec![0.0; 3];
    let ctx = ExecutionContext::new(&input, vec![usize::MAX / 2, 3, 2, 2], &mut output);
    let err = c.bind(&ctx).unwrap_err();
    assert!(err.to_string().contains("overflows"));
}

#[test]
fn pad_as_large_as_kernel_is_rejected_on_push() {
    let attrs = NodeAttributes::new().with("kernel_shape", vec![2i64]).with("pads", vec![2i64, 2]);
    let mut c = chain(SimdLevel::Scalar);
    let err = c.push("MaxPool", &attrs).unwrap_err();
    assert!(matches!(err, ConfigError::PadNotSmallerThanKernel { .. }));
    assert!(c.is_empty());
}

#[test]
fn unknown_operator_is_rejected_on_push() {
    let mut c = chain(SimdLevel::Scalar);
    let err = c.push("LpPool", &max_2x2_s2()).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedOperator { .. }));
}

#[test]
fn blocked_layout_flows_between_links() {
    let mut c = chain(SimdLevel::Avx2);
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.push("AveragePool", &max_2x2_s2()).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 16, 8, 8]));

    let first = c.links()[0].status().unwrap();
    let second = c.links()[1].status().unwrap();
    assert_eq!(first.primitive_src_desc.format(), FormatTag::NChw8c);
    assert!(first.needs_input_reorder());
    assert!(!first.needs_output_reorder());

    assert_eq!(&second.source_desc, first.output_desc());
    assert_eq!(second.input_shape.dims(), &[1, 16, 4, 4]);
    assert!(!second.needs_input_reorder());
    assert!(second.needs_output_reorder());
    assert_eq!(c.output_shape().unwrap().dims(), &[1, 16, 2, 2]);
}

#[test]
fn plain_hand_off_reselects_layout() {
    let mut c = chain(SimdLevel::Scalar);
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 3, 8, 8]));

    for link in c.links() {
        let plan = link.status().unwrap();
        assert_eq!(plan.invocations.len(), 1);
        assert_eq!(plan.primitive_src_desc.format(), FormatTag::Nchw);
    }
}

#[test]
fn successor_reads_predecessor_intermediate() {
    let mut c = chain(SimdLevel::Scalar);
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 3, 8, 8]));

    let input = ramp(192);
    let mut output = vec![0.0; 12];
    let ctx = ExecutionContext::new(&input, vec![1, 3, 8, 8], &mut output);
    let report = c.bind(&ctx).unwrap();

    assert_eq!(report.address(0, BufferSlot::LinkInput), Some(input.as_ptr() as usize));
    assert_eq!(report.address(1, BufferSlot::LinkInput), report.address(0, BufferSlot::Intermediate));
    assert_eq!(report.address(1, BufferSlot::ChainOutput), Some(ctx.output().as_ptr() as usize));
    assert_eq!(report.address(0, BufferSlot::ChainOutput), None);
}

#[test]
fn rebinding_reuses_link_buffers() {
    let mut c = chain(SimdLevel::Avx512);
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.push("AveragePool", &max_2x2_s2()).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 3, 8, 8]));

    let input = ramp(192);
    let mut output = vec![0.0; 12];
    let ctx = ExecutionContext::new(&input, vec![1, 3, 8, 8], &mut output);
    let first = c.bind(&ctx).unwrap();
    let allocations = c.pool_stats().total_allocations();
    let second = c.bind(&ctx).unwrap();

    assert_eq!(first, second);
    assert_eq!(c.pool_stats().total_allocations(), allocations);
}

#[test]
fn shape_mismatch_after_plan_is_a_binding_error() {
    let mut c = chain(SimdLevel::Scalar);
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 3, 8, 8]));

    let input = ramp(48);
    let mut output = vec![0.0; 12];
    let ctx = ExecutionContext::new(&input, vec![1, 3, 4, 4], &mut output);
    assert!(matches!(c.bind(&ctx), Err(FusenetError::Binding { .. })));
}

#[test]
fn allocation_limit_surfaces_at_bind() {
    let config = SubgraphConfig { allocation_limit: Some(1024), ..SubgraphConfig::default() };
    let mut c = FusedChain::new(&CpuCapabilities::with_simd(SimdLevel::Avx512), &config);
    c.push("MaxPool", &max_2x2_s2()).unwrap();

    let input = ramp(192);
    let mut output = vec![0.0; 48];
    let err = c.execute(&mut ExecutionContext::new(&input, vec![1, 3, 8, 8], &mut output)).unwrap_err();
    assert!(matches!(err, FusenetError::Allocation { .. }));
    assert!(c.pool_stats().failures > 0);
}

#[test]
fn blocked_and_plain_chains_agree() {
    let attrs = NodeAttributes::new()
        .with("kernel_shape", vec![3i64, 3])
        .with("pads", vec![1i64, 1, 1, 1])
        .with("count_include_pad", 1i64);
    let input = ramp(2 * 16 * 9 * 9);
    let mut outputs = Vec::new();
    for level in [SimdLevel::Scalar, SimdLevel::Avx2, SimdLevel::Avx512] {
        let mut c = chain(level);
        c.push("AveragePool", &attrs).unwrap();
        c.push("MaxPool", &max_2x2_s2()).unwrap();
        let mut output = vec![0.0; 2 * 16 * 4 * 4];
        c.execute(&mut ExecutionContext::new(&input, vec![2, 16, 9, 9], &mut output)).unwrap();
        outputs.push(output);
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn global_average_over_five_dims() {
    let mut c = chain(SimdLevel::Avx512);
    c.push("GlobalAveragePool", &NodeAttributes::new()).unwrap();
    let input: Vec<f32> = (0..2 * 2 * 2 * 2 * 2).map(|i| i as f32).collect();
    let mut output = vec![0.0; 4];
    c.execute(&mut ExecutionContext::new(&input, vec![2, 2, 2, 2, 2], &mut output)).unwrap();
    assert_eq!(output, vec![3.5, 11.5, 19.5, 27.5]);
}

#[test]
fn prefixed_attributes() {
    let attrs = NodeAttributes::new()
        .with("pool1/kernel_shape", vec![2i64, 2])
        .with("pool1/strides", vec![2i64, 2])
        .with("kernel_shape", vec![7i64, 7]);
    let mut c = chain(SimdLevel::Scalar);
    c.push_prefixed("MaxPool", &attrs, "pool1/").unwrap();
    c.plan(&TensorDesc::f32(vec![1, 1, 4, 4]));
    assert_eq!(c.output_shape().unwrap().dims(), &[1, 1, 2, 2]);
}

#[test]
fn plan_display() {
    let mut c = chain(SimdLevel::Avx512);
    c.push("MaxPool", &max_2x2_s2()).unwrap();
    c.plan(&TensorDesc::f32(vec![1, 3, 8, 8]));
    insta::assert_snapshot!(
        c.links()[0].status().unwrap().to_string(),
        @"[1, 3, 8, 8] -> [1, 3, 4, 4]: reorder(nchw -> nChw16c) input->scratch; pool_max(nChw16c -> nChw16c) scratch->intermediate; reorder(nChw16c -> nchw) intermediate->output"
    );
}

#[test]
#[serial(fusenet_env)]
fn env_preference_caps_layout() {
    temp_env::with_vars([("FUSENET_SIMD", Some("scalar"))], || {
        let config = SubgraphConfig::from_env().unwrap();
        let mut c = FusedChain::new(&CpuCapabilities::with_simd(SimdLevel::Avx512), &config);
        c.push("MaxPool", &max_2x2_s2()).unwrap();
        c.plan(&TensorDesc::f32(vec![1, 3, 8, 8]));
        let plan = c.links()[0].status().unwrap();
        assert_eq!(plan.primitive_src_desc.format(), FormatTag::Nchw);
        assert_eq!(plan.invocations.len(), 1);
    });
}
