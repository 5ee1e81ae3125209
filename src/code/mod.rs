//! Wordcode representation, analysis, and generation
//!
//! ### Structure
//!
//! The raw form of a function is a [`RawCode`]: a flat stream of two-byte code units (opcode and
//! 8-bit argument), operand pools, and a line table. Arguments wider than 8 bits are spread over
//! extended-argument prefix units, and jumps are expressed as offsets (absolute or relative,
//! counted in bytes or in code units depending on the [`VersionProfile`]).
//!
//! That form is very hard to edit, since inserting anything shifts offsets and may change operand
//! widths. Instead, code is decoded into a graph of [`Instruction`] nodes, each with a resolved
//! operand (pool _entries_ rather than indices), a successor edge, and an optional branch target.
//! Nodes are owned by a [`CodeArena`] and the whole function is wrapped in a [`CodeUnit`].
//!
//! ### Encoding
//!
//! Getting back to a raw stream happens in stages:
//!
//!   - exception regions declared without setup instructions get them ([`ExceptionTable`])
//!   - the graph is laid out into one sequence, adding jumps where needed ([`linearize`])
//!   - pool operands are interned into the pools ([`assemble`])
//!   - operand widths are fixed by relaxation ([`jump_encoding`])
//!   - the line table is regenerated ([`encode_lines`])
//!
//! ### Analysis
//!
//! Stack dataflow queries ([`trace_producer`], [`trace_consumer`]) and the maximum stack depth are
//! all driven by the per-opcode stack effects from the profile.

mod assembler;
mod binary_format;
mod code_unit;
mod constants;
mod dataflow;
mod decoder;
mod errors;
mod exceptions;
mod instruction;
pub mod jump_encoding;
mod line_table;
mod linearize;
mod listing;
mod opcode;
pub mod opcodes;
mod pools;
mod profile;
mod raw;
mod rewrite;

pub use assembler::*;
pub use binary_format::*;
pub use code_unit::*;
pub use constants::*;
pub use dataflow::*;
pub use decoder::*;
pub use errors::*;
pub use exceptions::*;
pub use instruction::*;
pub use jump_encoding::*;
pub use line_table::*;
pub use linearize::*;
pub use listing::*;
pub use opcode::*;
pub use pools::*;
pub use profile::*;
pub use raw::*;
pub use rewrite::*;
