//! Plan construction: descriptors, primitives and placeholder slots.
//!
//! Planning does no allocation. A [`LinkPlan`] names the buffers each
//! invocation reads and writes as [`BufferSlot`]s; the binder attaches
//! real memory to those slots later.

use std::fmt;

use fusenet_common::{DataType, FusenetError, Result, TensorDesc, TensorShape};
use fusenet_device_probe::CpuCapabilities;
use fusenet_kernels::{ArgRole, FormatTag, MemoryDesc, PoolingDesc, PoolingForward, Primitive, Reorder};
use tracing::debug;

use crate::attrs::PoolingConfig;
use crate::geometry::{PoolGeometry, plan_geometry};
use crate::layout::select_layout;

/// Placeholder for a buffer, resolved at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BufferSlot {
    /// The chain input for the first link, the predecessor's output otherwise.
    LinkInput,
    /// Link-owned buffer holding the input converted to the primitive layout.
    Scratch,
    /// Link-owned buffer holding the primitive's raw output.
    Intermediate,
    /// The caller's output buffer.
    ChainOutput,
}

impl fmt::Display for BufferSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BufferSlot::LinkInput => "input",
            BufferSlot::Scratch => "scratch",
            BufferSlot::Intermediate => "intermediate",
            BufferSlot::ChainOutput => "output",
        };
        f.write_str(s)
    }
}

/// One primitive plus the slots bound to its input and output roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveInvocation {
    pub primitive: Primitive,
    pub input: BufferSlot,
    pub output: BufferSlot,
}

impl PrimitiveInvocation {
    /// Argument role to slot mapping.
    pub fn args(&self) -> [(ArgRole, BufferSlot); 2] {
        [(self.primitive.input_role(), self.input), (self.primitive.output_role(), self.output)]
    }
}

/// Where a link's input comes from while planning.
#[derive(Debug, Clone, Copy)]
pub enum PlanSource<'a> {
    /// First link: the host-supplied input tensor.
    External(&'a TensorDesc),
    /// Interior link: the predecessor's finished plan.
    Chained(&'a LinkPlan),
}

/// Immutable result of planning one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlan {
    pub input_shape: TensorShape,
    pub output_shape: TensorShape,
    pub geometry: PoolGeometry,
    /// Layout the link's input arrives in.
    pub source_desc: MemoryDesc,
    /// Layout the pooling primitive reads.
    pub primitive_src_desc: MemoryDesc,
    /// Layout the pooling primitive writes; successors receive this.
    pub primitive_dst_desc: MemoryDesc,
    /// Plain layout of the output as the host expects it.
    pub external_output_desc: MemoryDesc,
    pub is_last: bool,
    pub invocations: Vec<PrimitiveInvocation>,
}

impl LinkPlan {
    pub fn needs_input_reorder(&self) -> bool {
        self.primitive_src_desc != self.source_desc
    }

    pub fn needs_output_reorder(&self) -> bool {
        self.is_last && self.primitive_dst_desc != self.external_output_desc
    }

    /// Descriptor of the buffer a successor link reads.
    pub fn output_desc(&self) -> &MemoryDesc {
        &self.primitive_dst_desc
    }

    pub fn uses(&self, slot: BufferSlot) -> bool {
        self.invocations.iter().any(|inv| inv.input == slot || inv.output == slot)
    }
}

impl fmt::Display for LinkPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}:", self.input_shape, self.output_shape)?;
        for (i, inv) in self.invocations.iter().enumerate() {
            let sep = if i == 0 { " " } else { "; " };
            write!(f, "{sep}{} {}->{}", inv.primitive, inv.input, inv.output)?;
        }
        Ok(())
    }
}

/// Build the plan of one pooling link.
pub fn build_pooling_plan(
    config: &PoolingConfig,
    source: PlanSource<'_>,
    caps: &CpuCapabilities,
    is_last: bool,
) -> Result<LinkPlan> {
    let input_shape = match source {
        PlanSource::External(desc) => desc.shape.clone(),
        PlanSource::Chained(parent) => parent.output_shape.clone(),
    };
    let geometry = plan_geometry(&input_shape, config)?;

    let (source_desc, src_format) = match source {
        PlanSource::External(desc) => {
            if desc.data_type != DataType::F32 {
                return Err(FusenetError::unsupported_shape(input_shape.dims(), "only f32 tensors are supported"));
            }
            let plain = MemoryDesc::plain(input_shape.dims().to_vec(), desc.data_type)?;
            (plain, preferred_format(&input_shape, caps)?)
        }
        PlanSource::Chained(parent) => {
            let incoming = parent.output_desc().clone();
            let plain = MemoryDesc::plain(input_shape.dims().to_vec(), incoming.data_type())?;
            // a plain hand-off gets the same layout choice as a chain input
            let format = if incoming == plain { preferred_format(&input_shape, caps)? } else { incoming.format() };
            (incoming, format)
        }
    };

    let data_type = source_desc.data_type();
    let src_md = MemoryDesc::new(input_shape.dims().to_vec(), data_type, src_format)?;
    let dst_any = MemoryDesc::new(geometry.output_shape.dims().to_vec(), data_type, FormatTag::Any)?;

    let pooling = PoolingForward::new(PoolingDesc {
        algorithm: config.kind.algorithm(),
        src: src_md,
        dst: dst_any,
        kernel: geometry.kernel.clone(),
        strides: geometry.strides.clone(),
        pads_begin: geometry.pads_begin.clone(),
        pads_end: geometry.pads_end.clone(),
    })?;
    let primitive_src_desc = pooling.src_desc().clone();
    let primitive_dst_desc = pooling.dst_desc().clone();
    let external_output_desc = MemoryDesc::plain(geometry.output_shape.dims().to_vec(), data_type)?;

    let mut invocations = Vec::with_capacity(3);

    let pool_input = if primitive_src_desc != source_desc {
        debug!(from = %source_desc.format(), to = %primitive_src_desc.format(), "inserting input reorder");
        invocations.push(PrimitiveInvocation {
            primitive: Reorder::new(source_desc.clone(), primitive_src_desc.clone())?.into(),
            input: BufferSlot::LinkInput,
            output: BufferSlot::Scratch,
        });
        BufferSlot::Scratch
    } else {
        BufferSlot::LinkInput
    };

    let output_reorder = is_last && primitive_dst_desc != external_output_desc;
    let pool_output = if is_last && !output_reorder { BufferSlot::ChainOutput } else { BufferSlot::Intermediate };
    invocations.push(PrimitiveInvocation { primitive: pooling.into(), input: pool_input, output: pool_output });

    if output_reorder {
        debug!(from = %primitive_dst_desc.format(), to = %external_output_desc.format(), "inserting output reorder");
        invocations.push(PrimitiveInvocation {
            primitive: Reorder::new(primitive_dst_desc.clone(), external_output_desc.clone())?.into(),
            input: BufferSlot::Intermediate,
            output: BufferSlot::ChainOutput,
        });
    }

    debug!(
        input = %input_shape,
        output = %geometry.output_shape,
        layout = %primitive_src_desc.format(),
        steps = invocations.len(),
        "pooling link planned"
    );

    Ok(LinkPlan {
        input_shape,
        output_shape: geometry.output_shape.clone(),
        geometry,
        source_desc,
        primitive_src_desc,
        primitive_dst_desc,
        external_output_desc,
        is_last,
        invocations,
    })
}

fn preferred_format(shape: &TensorShape, caps: &CpuCapabilities) -> Result<FormatTag> {
    select_layout(shape, caps).ok_or_else(|| FusenetError::unsupported_shape(shape.dims(), "no layout for this rank"))
}
