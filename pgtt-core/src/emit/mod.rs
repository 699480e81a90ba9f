//! Renders a built [`crate::table::Allocator`] into its two mandatory
//! forms: a binary table image and AArch64 assembly.

mod asm;
mod binary;

pub use asm::emit_assembly;
pub use binary::emit_binary;
