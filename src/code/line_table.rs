//! Mapping between code offsets and source lines
//!
//! Both supported formats are sequences of `(u8 byte delta, i8 line delta)` pairs, but they are
//! interpreted differently:
//!
//!   - [`LineTableFormat::Lnotab`] records a pair at every point where the line changes. Deltas
//!     that don't fit are split into several pairs (byte deltas first, then line deltas).
//!   - [`LineTableFormat::LineRanges`] records consecutive address ranges, each with its line. A
//!     line delta of `-128` marks a range of instructions that have no line at all.
//!
//! Encoding follows the interpreter's own emission rules exactly, so a table decoded and then
//! re-encoded without edits comes back byte for byte.

use super::{deserialize_all, DecodeError, Deserialize, LineTableFormat, Serialize, Word};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// One record of a line table
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineDelta {
    pub bytes: u8,
    pub lines: i8,
}

impl Serialize for LineDelta {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.bytes.serialize(writer)?;
        self.lines.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for LineDelta {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let bytes = reader.read_u8()?;
        let lines = reader.read_i8()?;
        Ok(LineDelta { bytes, lines })
    }
}

/// Line delta meaning "no line" in [`LineTableFormat::LineRanges`]
const NO_LINE: i8 = -128;

/// Compute the line of every code unit (including extended-argument prefixes)
pub fn decode_lines(
    format: LineTableFormat,
    table: &[u8],
    firstlineno: u32,
    words: usize,
) -> std::result::Result<Vec<Option<u32>>, DecodeError> {
    let entries: Vec<LineDelta> = deserialize_all(table, 2).map_err(|_| {
        DecodeError::MalformedLineTable {
            position: table.len() / 2,
        }
    })?;
    let code_bytes = words * Word::WIDTH;
    let mut lines = vec![None; words];

    let mut fill = |from: usize, to: usize, line: Option<i64>, position: usize| {
        if to > code_bytes {
            return Err(DecodeError::MalformedLineTable { position });
        }
        let line = match line {
            None => None,
            Some(line) if line >= 0 && line <= u32::MAX as i64 => Some(line as u32),
            Some(_) => return Err(DecodeError::MalformedLineTable { position }),
        };
        // Split byte deltas may stop in the middle of a unit
        let mut word = (from + Word::WIDTH - 1) / Word::WIDTH;
        while word * Word::WIDTH < to {
            lines[word] = line;
            word += 1;
        }
        Ok(())
    };

    let mut line = firstlineno as i64;
    let mut address = 0;
    match format {
        LineTableFormat::Lnotab => {
            for (position, entry) in entries.iter().enumerate() {
                if entry.bytes > 0 {
                    let end = address + entry.bytes as usize;
                    fill(address, end, Some(line), position)?;
                    address = end;
                }
                line += entry.lines as i64;
            }
            fill(address, code_bytes, Some(line), entries.len())?;
        }
        LineTableFormat::LineRanges => {
            for (position, entry) in entries.iter().enumerate() {
                let end = address + entry.bytes as usize;
                let range_line = if entry.lines == NO_LINE {
                    None
                } else {
                    line += entry.lines as i64;
                    Some(line)
                };
                fill(address, end, range_line, position)?;
                address = end;
            }
        }
    }

    Ok(lines)
}

/// Build a line table
///
/// `runs` lists the start (in code units, counting prefixes) and line of every instruction, in
/// order. `total_units` is the length of the code stream in code units.
pub fn encode_lines(
    format: LineTableFormat,
    firstlineno: u32,
    runs: impl IntoIterator<Item = (usize, Option<u32>)>,
    total_units: usize,
) -> Result<Vec<u8>> {
    let entries = match format {
        LineTableFormat::Lnotab => encode_lnotab(firstlineno, runs),
        LineTableFormat::LineRanges => encode_line_ranges(firstlineno, runs, total_units),
    };

    let mut table = Vec::with_capacity(entries.len() * 2);
    entries.serialize(&mut table)?;
    Ok(table)
}

fn encode_lnotab(
    firstlineno: u32,
    runs: impl IntoIterator<Item = (usize, Option<u32>)>,
) -> Vec<LineDelta> {
    let mut entries = vec![];
    let mut last_line = firstlineno as i64;
    let mut last_offset = 0;

    for (start, line) in runs {
        // Instructions with no line inherit the previous one
        let line = match line {
            Some(line) => line as i64,
            None => continue,
        };
        let mut line_delta = line - last_line;
        if line_delta == 0 {
            continue;
        }
        let offset = start * Word::WIDTH;
        let mut byte_delta = offset - last_offset;

        if byte_delta > 255 {
            let count = byte_delta / 255;
            for _ in 0..count {
                entries.push(LineDelta {
                    bytes: 255,
                    lines: 0,
                });
            }
            byte_delta -= count * 255;
        }

        if !(-128..=127).contains(&line_delta) {
            let (step, count) = if line_delta < 0 {
                (-128, -line_delta / 128)
            } else {
                (127, line_delta / 127)
            };
            line_delta -= count * step;
            entries.push(LineDelta {
                bytes: byte_delta as u8,
                lines: step as i8,
            });
            byte_delta = 0;
            for _ in 1..count {
                entries.push(LineDelta {
                    bytes: 0,
                    lines: step as i8,
                });
            }
        }

        entries.push(LineDelta {
            bytes: byte_delta as u8,
            lines: line_delta as i8,
        });
        last_line = line;
        last_offset = offset;
    }

    entries
}

/// State of the range-based encoder
struct RangeEncoder {
    entries: Vec<LineDelta>,
    current_line: Option<i64>,
    previous_line: i64,
    range_start: usize,
}

impl RangeEncoder {
    /// Close the range which runs from the last boundary to `offset`
    fn close_range(&mut self, offset: usize) {
        let mut byte_delta = (offset - self.range_start) * Word::WIDTH;
        if byte_delta == 0 {
            return;
        }

        let mut line_delta = match self.current_line {
            None => NO_LINE as i64,
            Some(line) => {
                let mut delta = line - self.previous_line;
                self.previous_line = line;
                while delta > 127 {
                    self.push(0, 127);
                    delta -= 127;
                }
                while delta < -127 {
                    self.push(0, -127);
                    delta += 127;
                }
                delta
            }
        };

        while byte_delta > 254 {
            self.push(254, line_delta);
            line_delta = if self.current_line.is_none() {
                NO_LINE as i64
            } else {
                0
            };
            byte_delta -= 254;
        }
        self.push(byte_delta, line_delta);
        self.range_start = offset;
    }

    fn push(&mut self, bytes: usize, lines: i64) {
        self.entries.push(LineDelta {
            bytes: bytes as u8,
            lines: lines as i8,
        });
    }
}

fn encode_line_ranges(
    firstlineno: u32,
    runs: impl IntoIterator<Item = (usize, Option<u32>)>,
    total_units: usize,
) -> Vec<LineDelta> {
    let mut encoder = RangeEncoder {
        entries: vec![],
        current_line: Some(firstlineno as i64),
        previous_line: firstlineno as i64,
        range_start: 0,
    };

    for (start, line) in runs {
        let line = line.map(|line| line as i64);
        if line == encoder.current_line {
            continue;
        }
        encoder.close_range(start);
        encoder.current_line = line;
    }
    encoder.close_range(total_units);

    encoder.entries
}
