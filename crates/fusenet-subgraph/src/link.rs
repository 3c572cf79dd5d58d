//! Chain links and the operator variants they can hold.

use fusenet_common::{ConfigError, FusenetError, NodeAttributes, Result, TensorShape};
use fusenet_device_probe::CpuCapabilities;

use crate::attrs::PoolingConfig;
use crate::bind::{BufferBinder, LinkBinding, LinkBuffers};
use crate::plan::{BufferSlot, LinkPlan, PlanSource, build_pooling_plan};

/// Operator held by a link. Each variant plans itself; binding and
/// execution only see the resulting [`LinkPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOp {
    Pool(PoolingConfig),
}

impl LinkOp {
    /// Resolve a node into a supported operator.
    pub fn from_node(op_type: &str, attrs: &NodeAttributes, prefix: &str) -> Result<Self, ConfigError> {
        PoolingConfig::from_attributes(op_type, attrs, prefix).map(LinkOp::Pool)
    }

    pub fn plan(&self, source: PlanSource<'_>, caps: &CpuCapabilities, is_last: bool) -> Result<LinkPlan> {
        match self {
            LinkOp::Pool(config) => build_pooling_plan(config, source, caps, is_last),
        }
    }
}

/// One node of a fused chain.
///
/// The link owns its config, its recorded planning status and its
/// scratch and intermediate buffers. It refers to its predecessor by
/// index into the owning chain.
#[derive(Debug)]
pub struct ChainLink {
    name: String,
    op: LinkOp,
    upstream: Option<usize>,
    plan: Option<Result<LinkPlan>>,
    pub(crate) buffers: LinkBuffers,
}

impl ChainLink {
    pub(crate) fn new(name: impl Into<String>, op: LinkOp, upstream: Option<usize>) -> Self {
        Self { name: name.into(), op, upstream, plan: None, buffers: LinkBuffers::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &LinkOp {
        &self.op
    }

    /// Index of the predecessor link, `None` for the first link.
    pub fn upstream(&self) -> Option<usize> {
        self.upstream
    }

    pub fn is_planned(&self) -> bool {
        self.plan.is_some()
    }

    /// The successful plan, or the failure recorded while planning.
    pub fn status(&self) -> Result<&LinkPlan> {
        match &self.plan {
            Some(Ok(plan)) => Ok(plan),
            Some(Err(err)) => Err(err.clone()),
            None => Err(FusenetError::binding(format!("link `{}` has not been planned", self.name))),
        }
    }

    pub fn input_shape(&self) -> Option<&TensorShape> {
        self.plan.as_ref()?.as_ref().ok().map(|p| &p.input_shape)
    }

    pub fn output_shape(&self) -> Option<&TensorShape> {
        self.plan.as_ref()?.as_ref().ok().map(|p| &p.output_shape)
    }

    pub(crate) fn record_plan(&mut self, plan: Result<LinkPlan>) {
        self.plan = Some(plan);
    }

    pub(crate) fn clear_plan(&mut self) {
        self.plan = None;
    }

    pub fn buffers(&self) -> &LinkBuffers {
        &self.buffers
    }

    pub(crate) fn bind(
        &mut self,
        binder: &BufferBinder<'_>,
        input_addr: usize,
        output_addr: Option<usize>,
    ) -> Result<LinkBinding> {
        let plan = match &self.plan {
            Some(Ok(plan)) => plan,
            _ => return self.status().map(|_| LinkBinding::default()),
        };
        binder.bind(plan, &mut self.buffers, input_addr, output_addr)
    }

    /// Run every invocation in plan order. `input` is the chain input and
    /// is only read by the first link; later links read `prev`'s
    /// intermediate buffer.
    pub(crate) fn run(&mut self, prev: Option<&ChainLink>, input: &[f32], output: &mut [f32]) -> Result<()> {
        let plan = match &self.plan {
            Some(Ok(plan)) => plan,
            _ => return self.status().map(|_| ()),
        };
        let link_input: &[f32] = match prev {
            None => input,
            Some(p) => bound(p.buffers.intermediate.as_ref(), BufferSlot::LinkInput)?.as_f32_slice(),
        };
        let LinkBuffers { scratch, intermediate } = &mut self.buffers;

        for inv in &plan.invocations {
            use BufferSlot::*;
            let (src, dst): (&[f32], &mut [f32]) = match (inv.input, inv.output) {
                (LinkInput, ChainOutput) => (link_input, &mut *output),
                (LinkInput, Scratch) => (link_input, bound(scratch.as_mut(), Scratch)?.as_f32_mut_slice()),
                (LinkInput, Intermediate) => (link_input, bound(intermediate.as_mut(), Intermediate)?.as_f32_mut_slice()),
                (Scratch, Intermediate) => (
                    bound(scratch.as_ref(), Scratch)?.as_f32_slice(),
                    bound(intermediate.as_mut(), Intermediate)?.as_f32_mut_slice(),
                ),
                (Scratch, ChainOutput) => (bound(scratch.as_ref(), Scratch)?.as_f32_slice(), &mut *output),
                (Intermediate, ChainOutput) => (bound(intermediate.as_ref(), Intermediate)?.as_f32_slice(), &mut *output),
                (from, to) => return Err(FusenetError::binding(format!("no route from {from} to {to}"))),
            };
            inv.primitive.execute(src, dst)?;
        }
        Ok(())
    }
}

fn bound<B>(buffer: Option<B>, slot: BufferSlot) -> Result<B> {
    buffer.ok_or_else(|| FusenetError::binding(format!("{slot} buffer is unbound")))
}
