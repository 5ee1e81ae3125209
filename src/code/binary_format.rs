use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing the fixed-width records of a code stream or line table
///
/// Both the code stream and the line tables are flat sequences of small records with no length
/// prefix and no padding, so a much narrower trait than `serde` does the job.
pub trait Serialize {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Inverse of [`Serialize`]
pub trait Deserialize: Sized {
    /// Read one construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u8()
    }
}

impl Deserialize for i8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_i8()
    }
}

/// Records are written back to back, without any length
impl<A: Serialize> Serialize for [A] {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.as_slice().serialize(writer)
    }
}

/// Read records until the input is exhausted
///
/// The input must contain a whole number of records: trailing bytes are an error.
pub fn deserialize_all<A: Deserialize>(bytes: &[u8], record_width: usize) -> Result<Vec<A>> {
    if bytes.len() % record_width != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "input is not a whole number of records",
        ));
    }
    let mut reader = bytes;
    let mut records = Vec::with_capacity(bytes.len() / record_width);
    while !reader.is_empty() {
        records.push(A::deserialize(&mut reader)?);
    }
    Ok(records)
}
