//! Primitive-math library for fused subgraph execution.
//!
//! Memory descriptors with plain and channel-blocked layouts, the
//! pooling-forward primitive and the reorder primitive that converts
//! between layouts. All primitives run single-threaded on `f32` slices.

pub mod memory;
pub mod pooling;
pub mod primitive;
pub mod reorder;

pub use memory::{FormatTag, MemoryDesc};
pub use pooling::{PoolingAlgorithm, PoolingDesc, PoolingForward};
pub use primitive::{ArgRole, Primitive};
pub use reorder::Reorder;
