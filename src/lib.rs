//! Decode, edit, and re-assemble stack machine wordcode
//!
//! Functions of a CPython-style virtual machine are decoded from their raw code objects into an
//! instruction graph ([`code::CodeUnit`]) which can be freely rewired, analysed with stack
//! dataflow queries, and then encoded back. Encoding picks operand widths, fixes up jumps, and
//! regenerates the line table. Code that was not edited comes back byte for byte.
//!
//! Everything that depends on a specific interpreter version (opcode numbers, jump encodings, line
//! table format, stack effects) is described by a [`code::VersionProfile`].

pub mod code;
pub mod util;
