//! Common types for fused subgraph execution.
//!
//! This crate provides the foundational types shared by the fusenet
//! crates: the error taxonomy, logical tensor shapes, the operator
//! attribute dictionary, SIMD tiers, the scratch memory pool and the
//! runtime configuration.

pub mod attributes;
pub mod config;
pub mod error;
pub mod memory_pool;
pub mod shape;
pub mod simd;

pub use attributes::{AttributeReader, AttributeValue, NodeAttributes};
pub use config::{ConfigFileError, SimdPreference, SubgraphConfig};
pub use error::*;
pub use memory_pool::{PoolStats, PooledBuffer, ScratchPool};
pub use shape::{DataType, TensorDesc, TensorShape};
pub use simd::SimdLevel;
