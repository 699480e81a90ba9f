//! Builds AArch64 stage-1 translation tables from a list of virtual-to-
//! physical memory regions and renders them as a binary table image and
//! as AArch64 assembly that programs the same tables at runtime.
//!
//! This crate owns the structural algorithm only: region modelling, MMU
//! geometry derivation, descriptor templating, the recursive table
//! builder, and the two emitters. Reading a memory-map document from
//! disk and wiring up a CLI are left to the `pgtt` binary crate.

pub mod attr;
pub mod descriptor;
pub mod emit;
pub mod error;
pub mod mmu_config;
pub mod region;
pub mod table;

pub use attr::{parse_attr_string, AttrError};
pub use descriptor::{descriptor_template, CompatMode};
pub use emit::{emit_assembly, emit_binary};
pub use error::BuildError;
pub use mmu_config::{ConfigError, ExceptionLevel, Granule, MmuConfig};
pub use region::{MemAttr, MemType, Region};
pub use table::{map, Allocator, Entry, Placement, TableId, TableNode};
