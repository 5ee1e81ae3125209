use super::{Deserialize, Opcode, Pools, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// One fixed-width unit of the code stream
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Word {
    pub opcode: Opcode,
    pub arg: u8,
}

impl Word {
    pub const WIDTH: usize = 2;
}

impl Serialize for Word {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.opcode.0.serialize(writer)?;
        self.arg.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Word {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let opcode = Opcode(reader.read_u8()?);
        let arg = reader.read_u8()?;
        Ok(Word { opcode, arg })
    }
}

/// Everything about a function other than its code, pools and line table
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeHeader {
    pub argcount: u32,
    pub posonlyargcount: u32,
    pub kwonlyargcount: u32,
    pub nlocals: u32,
    pub stacksize: u32,
    pub flags: u32,
    pub filename: String,
    pub name: String,
    pub firstlineno: u32,
}

/// Wire-level function: what the interpreter actually loads
#[derive(Clone, Debug, Default)]
pub struct RawCode {
    pub header: CodeHeader,

    /// Code stream (a whole number of [`Word`]s)
    pub code: Vec<u8>,

    pub pools: Pools,

    /// Line table in the profile's [`crate::code::LineTableFormat`]
    pub line_table: Vec<u8>,
}

impl RawCode {
    /// Function with the given code and pools and otherwise default header fields
    pub fn new(code: Vec<u8>, pools: Pools) -> RawCode {
        RawCode {
            header: CodeHeader {
                name: String::from("<module>"),
                filename: String::from("<unknown>"),
                firstlineno: 1,
                ..CodeHeader::default()
            },
            code,
            pools,
            line_table: vec![],
        }
    }
}
