//! Fused pooling subgraphs.
//!
//! A [`FusedChain`] holds pooling nodes taken from a host graph. Planning
//! works out shapes, effective padding, internal layouts and the reorders
//! needed between them, without touching memory. Binding then attaches
//! the caller's buffers and link-owned scratch to the planned slots on
//! every call, and execution runs the planned primitives in order.
//!
//! ```no_run
//! use fusenet_common::{NodeAttributes, SubgraphConfig};
//! use fusenet_device_probe::cpu_capabilities;
//! use fusenet_subgraph::{ExecutionContext, FusedChain};
//!
//! let mut chain = FusedChain::new(cpu_capabilities(), &SubgraphConfig::default());
//! let attrs = NodeAttributes::new().with("kernel_shape", vec![2i64, 2]).with("strides", vec![2i64, 2]);
//! chain.push("MaxPool", &attrs)?;
//!
//! let input = vec![0.0f32; 3 * 8 * 8];
//! let mut output = vec![0.0f32; 3 * 4 * 4];
//! chain.execute(&mut ExecutionContext::new(&input, vec![1, 3, 8, 8], &mut output))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod attrs;
pub mod bind;
pub mod chain;
pub mod geometry;
pub mod layout;
pub mod link;
pub mod plan;

pub use attrs::{AutoPad, PoolingConfig, PoolingKind};
pub use bind::{BindingReport, BufferBinder, LinkBinding, LinkBuffers};
pub use chain::{ExecutionContext, FusedChain};
pub use geometry::{PoolGeometry, plan_geometry};
pub use layout::select_layout;
pub use link::{ChainLink, LinkOp};
pub use plan::{BufferSlot, LinkPlan, PlanSource, PrimitiveInvocation, build_pooling_plan};
