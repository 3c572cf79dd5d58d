//! Fused chains of pooling links and their per-call execution.
//!
//! A chain is planned once per input shape. [`FusedChain::plan`] never
//! fails: each link records either its plan or the error that stopped it,
//! and links downstream of a failure inherit that error. The recorded
//! failure is reported by [`FusedChain::bind`], before any buffer is
//! touched.

use fusenet_common::{
    ConfigError, FusenetError, NodeAttributes, PoolStats, Result, ScratchPool, SubgraphConfig, TensorDesc, TensorShape,
};
use fusenet_device_probe::CpuCapabilities;
use tracing::{debug, info, warn};

use crate::bind::{BindingReport, BufferBinder};
use crate::link::{ChainLink, LinkOp};
use crate::plan::{BufferSlot, PlanSource};

/// Caller-owned buffers for one execution.
#[derive(Debug)]
pub struct ExecutionContext<'a> {
    input: &'a [f32],
    input_shape: TensorShape,
    output: &'a mut [f32],
}

impl<'a> ExecutionContext<'a> {
    /// `input` holds `input_shape` in plain NC(D)HW order. `output` receives
    /// the chain output in the same plain order.
    pub fn new(input: &'a [f32], input_shape: impl Into<Vec<usize>>, output: &'a mut [f32]) -> Self {
        Self { input, input_shape: TensorShape::new(input_shape), output }
    }

    pub fn input_shape(&self) -> &TensorShape {
        &self.input_shape
    }

    pub fn input_desc(&self) -> TensorDesc {
        TensorDesc::f32(self.input_shape.dims().to_vec())
    }

    pub fn output(&self) -> &[f32] {
        self.output
    }
}

/// Ordered sequence of links sharing one capability set and scratch pool.
#[derive(Debug)]
pub struct FusedChain {
    links: Vec<ChainLink>,
    caps: CpuCapabilities,
    pool: ScratchPool,
    planned_input: Option<TensorDesc>,
}

impl FusedChain {
    /// Create an empty chain. `config.simd` caps the capabilities used for
    /// layout selection.
    pub fn new(caps: &CpuCapabilities, config: &SubgraphConfig) -> Self {
        let caps = match config.simd.cap() {
            Some(level) => caps.capped_at(level),
            None => *caps,
        };
        info!(simd = %caps.simd_level(), preference = %config.simd, "fused chain created");
        Self {
            links: Vec::new(),
            caps,
            pool: ScratchPool::with_allocation_limit(config.scratch_pool_limit, config.allocation_limit),
            planned_input: None,
        }
    }

    /// Append a node read from unprefixed attributes.
    pub fn push(&mut self, op_type: &str, attrs: &NodeAttributes) -> Result<usize, ConfigError> {
        self.push_prefixed(op_type, attrs, "")
    }

    /// Append a node whose attributes are stored under `prefix`.
    ///
    /// Attribute errors surface here, not at plan time. Any earlier plan
    /// is discarded.
    pub fn push_prefixed(&mut self, op_type: &str, attrs: &NodeAttributes, prefix: &str) -> Result<usize, ConfigError> {
        let op = LinkOp::from_node(op_type, attrs, prefix)
            .inspect_err(|err| warn!(op_type, prefix, %err, "rejecting node"))?;
        let index = self.links.len();
        self.links.push(ChainLink::new(op_type, op, index.checked_sub(1)));
        self.invalidate();
        debug!(index, op_type, "link appended");
        Ok(index)
    }

    fn invalidate(&mut self) {
        self.planned_input = None;
        for link in &mut self.links {
            link.clear_plan();
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn link(&self, index: usize) -> Option<&ChainLink> {
        self.links.get(index)
    }

    /// Capabilities after the configured cap was applied.
    pub fn capabilities(&self) -> &CpuCapabilities {
        &self.caps
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Plan every link against `input`, recording per-link outcomes.
    pub fn plan(&mut self, input: &TensorDesc) {
        let last = self.links.len().saturating_sub(1);
        for index in 0..self.links.len() {
            let (done, rest) = self.links.split_at_mut(index);
            let link = &mut rest[0];
            let result = match link.upstream() {
                None => link.op().plan(PlanSource::External(input), &self.caps, index == last),
                Some(up) => match done[up].status() {
                    Ok(parent) => link.op().plan(PlanSource::Chained(parent), &self.caps, index == last),
                    Err(err) => Err(err),
                },
            };
            if let Err(err) = &result {
                warn!(index, name = link.name(), %err, "planning failed");
            }
            link.record_plan(result);
        }
        self.planned_input = Some(input.clone());
    }

    /// Shape written to the caller's output buffer.
    pub fn output_shape(&self) -> Result<&TensorShape> {
        let last = self.links.last().ok_or_else(|| FusenetError::binding("chain has no links"))?;
        Ok(&last.status()?.output_shape)
    }

    /// Attach buffers to every planned slot.
    ///
    /// Fails without binding anything when planning recorded an error,
    /// when the chain was planned for a different input shape or when the
    /// caller's buffers are too small.
    pub fn bind(&mut self, ctx: &ExecutionContext<'_>) -> Result<BindingReport> {
        if self.links.is_empty() {
            return Err(FusenetError::binding("chain has no links"));
        }
        for link in &self.links {
            link.status()?;
        }
        let planned = self
            .planned_input
            .as_ref()
            .ok_or_else(|| FusenetError::binding("chain has not been planned"))?;
        if planned.shape != ctx.input_shape {
            return Err(FusenetError::binding(format!(
                "input shape {} differs from planned shape {}",
                ctx.input_shape, planned.shape
            )));
        }

        let needed_in = element_count(&ctx.input_shape)?;
        if ctx.input.len() < needed_in {
            return Err(FusenetError::binding(format!(
                "input buffer holds {} elements, {needed_in} needed",
                ctx.input.len()
            )));
        }
        let needed_out = element_count(self.output_shape()?)?;
        if ctx.output.len() < needed_out {
            return Err(FusenetError::binding(format!(
                "output buffer holds {} elements, {needed_out} needed",
                ctx.output.len()
            )));
        }

        let binder = BufferBinder::new(&self.pool);
        let output_addr = ctx.output.as_ptr() as usize;
        let mut input_addr = ctx.input.as_ptr() as usize;
        let last = self.links.len() - 1;
        let mut report = BindingReport::default();
        for (index, link) in self.links.iter_mut().enumerate() {
            let binding = link.bind(&binder, input_addr, (index == last).then_some(output_addr))?;
            if index != last {
                input_addr = binding
                    .address(BufferSlot::Intermediate)
                    .ok_or_else(|| FusenetError::binding(format!("link {index} has no intermediate output")))?;
            }
            report.links.push(binding);
        }
        Ok(report)
    }

    /// Run the chain on `ctx`, re-planning first if the input shape changed.
    pub fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<BindingReport> {
        let desc = ctx.input_desc();
        if self.planned_input.as_ref() != Some(&desc) {
            debug!(shape = %desc.shape, "input shape changed, re-planning");
            self.plan(&desc);
        }
        let report = self.bind(ctx)?;
        for index in 0..self.links.len() {
            let (done, rest) = self.links.split_at_mut(index);
            rest[0].run(done.last(), ctx.input, &mut *ctx.output)?;
        }
        Ok(report)
    }
}

fn element_count(shape: &TensorShape) -> Result<usize> {
    shape
        .num_elements()
        .ok_or_else(|| FusenetError::unsupported_shape(shape.dims(), "element count overflows usize"))
}
