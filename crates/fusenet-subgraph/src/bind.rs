//! Attaching live memory to a link's planned buffer slots.
//!
//! Binding runs on every call. Link-owned buffers persist across calls and
//! are only replaced when the plan needs more room, so re-binding an
//! unchanged plan with the same caller buffers reports the same addresses.

use std::collections::BTreeMap;

use fusenet_common::{FusenetError, PooledBuffer, Result, ScratchPool};
use tracing::{debug, warn};

use crate::plan::{BufferSlot, LinkPlan};

/// Buffers owned by one link.
#[derive(Debug, Default)]
pub struct LinkBuffers {
    pub(crate) scratch: Option<PooledBuffer>,
    pub(crate) intermediate: Option<PooledBuffer>,
}

impl LinkBuffers {
    pub fn scratch(&self) -> Option<&PooledBuffer> {
        self.scratch.as_ref()
    }

    pub fn intermediate(&self) -> Option<&PooledBuffer> {
        self.intermediate.as_ref()
    }
}

/// Addresses bound to one link's slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkBinding {
    slots: BTreeMap<BufferSlot, usize>,
}

impl LinkBinding {
    pub fn address(&self, slot: BufferSlot) -> Option<usize> {
        self.slots.get(&slot).copied()
    }

    pub fn slots(&self) -> impl Iterator<Item = (BufferSlot, usize)> + '_ {
        self.slots.iter().map(|(&slot, &addr)| (slot, addr))
    }
}

/// Bound addresses for every link of a chain, in chain order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindingReport {
    pub links: Vec<LinkBinding>,
}

impl BindingReport {
    pub fn address(&self, link: usize, slot: BufferSlot) -> Option<usize> {
        self.links.get(link)?.address(slot)
    }
}

/// Fills a plan's placeholder slots with real buffers.
#[derive(Debug, Clone, Copy)]
pub struct BufferBinder<'p> {
    pool: &'p ScratchPool,
}

impl<'p> BufferBinder<'p> {
    pub fn new(pool: &'p ScratchPool) -> Self {
        Self { pool }
    }

    /// Bind one link.
    ///
    /// `input_addr` is the address feeding [`BufferSlot::LinkInput`]: the
    /// caller's input for the first link, the predecessor's intermediate
    /// buffer otherwise. `output_addr` is the caller's output buffer and
    /// is required when the plan writes [`BufferSlot::ChainOutput`].
    pub fn bind(
        &self,
        plan: &LinkPlan,
        buffers: &mut LinkBuffers,
        input_addr: usize,
        output_addr: Option<usize>,
    ) -> Result<LinkBinding> {
        let mut slots = BTreeMap::new();
        slots.insert(BufferSlot::LinkInput, input_addr);

        if plan.uses(BufferSlot::Scratch) {
            let addr = self.ensure(&mut buffers.scratch, plan.primitive_src_desc.byte_size(), BufferSlot::Scratch)?;
            slots.insert(BufferSlot::Scratch, addr);
        } else {
            buffers.scratch = None;
        }

        if plan.uses(BufferSlot::Intermediate) {
            let addr =
                self.ensure(&mut buffers.intermediate, plan.primitive_dst_desc.byte_size(), BufferSlot::Intermediate)?;
            slots.insert(BufferSlot::Intermediate, addr);
        } else {
            buffers.intermediate = None;
        }

        if plan.uses(BufferSlot::ChainOutput) {
            let addr = output_addr.ok_or_else(|| FusenetError::binding("last link has no output buffer"))?;
            slots.insert(BufferSlot::ChainOutput, addr);
        }

        Ok(LinkBinding { slots })
    }

    fn ensure(&self, held: &mut Option<PooledBuffer>, bytes: usize, slot: BufferSlot) -> Result<usize> {
        if let Some(buf) = held.as_ref().filter(|buf| buf.capacity() >= bytes) {
            return Ok(buf.addr());
        }
        // hand the undersized buffer back before asking for a larger one
        *held = None;
        let buf = self.pool.allocate(bytes).inspect_err(|err| warn!(%slot, bytes, %err, "bind allocation failed"))?;
        debug!(%slot, bytes, capacity = buf.capacity(), "bound new buffer");
        let addr = buf.addr();
        *held = Some(buf);
        Ok(addr)
    }
}
