use super::{Opcode, OperandKind};
use std::fmt;

/// Everything that can go wrong while decoding, rewriting, or encoding a code unit
///
/// Every variant is fatal for the operation that produced it. An empty answer from the dataflow
/// queries ("provenance unknown") is _not_ an error and never shows up here.
#[derive(Debug)]
pub enum Error {
    /// The raw stream or one of its tables could not be decoded
    Decode(DecodeError),

    /// The instruction graph is not in a state that can be linearised or encoded (indicates a bug
    /// in whoever last edited the graph)
    GraphConsistency(GraphError),

    /// Operand width relaxation did not reach a fixed point
    RelaxationDivergence {
        iterations: usize,
        unsatisfied: usize,
    },

    /// An instruction carries an operand of the wrong kind for its opcode
    OperandMismatch {
        opcode: Opcode,
        expected: OperandKind,
        found: OperandKind,
    },

    /// A pool index is too large to share the operand with the opcode's flag bits
    OperandOverflow { opcode: Opcode, index: u32 },

    IoError(std::io::Error),
}

/// Which of the four operand pools an index refers to
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PoolKind {
    Constants,
    Names,
    Locals,
    Cells,
}

#[derive(Debug)]
pub enum DecodeError {
    /// The code stream length is not a whole number of code units
    TruncatedStream { length: usize },

    /// There are no instructions at all
    EmptyCode,

    /// An operand refers past the end of its pool
    BadPoolIndex {
        offset: usize,
        pool: PoolKind,
        index: u32,
    },

    /// A jump lands outside of the stream or between two code units
    BadJumpTarget { offset: usize, argument: u32 },

    /// A run of extended-argument prefixes produced an operand wider than 32 bits
    OversizedArgument { offset: usize },

    /// The final instruction would fall through past the end of the code
    FallsOffEnd { offset: usize },

    /// The line table is not consistent with the code stream
    MalformedLineTable { position: usize },
}

#[derive(Debug)]
pub enum GraphError {
    /// A node that neither stops flow nor jumps unconditionally has no successor
    DanglingSuccessor { opcode: Opcode, offset: Option<usize> },

    /// A jump-kind node has no branch target
    MissingBranchTarget { opcode: Opcode, offset: Option<usize> },

    /// A relative jump cannot express the direction of its target
    InvalidJumpDirection { opcode: Opcode, from: usize, to: usize },

    /// Extended-argument slots were left with no instruction following them
    StrayPrefix { offset: usize },

    /// A node was spliced after one that never falls through
    InsertAfterTerminal { opcode: Opcode },

    /// An exception region without setup instruction has zero or several entry points
    RegionEntry { entries: usize },
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Error {
        Error::Decode(err)
    }
}

impl From<GraphError> for Error {
    fn from(err: GraphError) -> Error {
        Error::GraphConsistency(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(err) => write!(f, "decode error: {}", err),
            Error::GraphConsistency(err) => write!(f, "inconsistent instruction graph: {}", err),
            Error::RelaxationDivergence {
                iterations,
                unsatisfied,
            } => write!(
                f,
                "operand relaxation did not converge after {} iterations ({} instructions still too narrow)",
                iterations, unsatisfied
            ),
            Error::OperandMismatch {
                opcode,
                expected,
                found,
            } => write!(
                f,
                "opcode {} expects a {:?} operand but has a {:?} operand",
                opcode.0, expected, found
            ),
            Error::OperandOverflow { opcode, index } => write!(
                f,
                "pool index {} does not fit in the operand of opcode {}",
                index, opcode.0
            ),
            Error::IoError(err) => write!(f, "io error: {}", err),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TruncatedStream { length } => {
                write!(f, "code stream of {} bytes is not a whole number of units", length)
            }
            DecodeError::EmptyCode => f.write_str("code stream is empty"),
            DecodeError::BadPoolIndex {
                offset,
                pool,
                index,
            } => write!(
                f,
                "instruction at {} refers to {:?} entry {} which does not exist",
                offset, pool, index
            ),
            DecodeError::BadJumpTarget { offset, argument } => write!(
                f,
                "jump at {} with argument {} does not land on an instruction",
                offset, argument
            ),
            DecodeError::OversizedArgument { offset } => {
                write!(f, "operand of instruction at {} exceeds 32 bits", offset)
            }
            DecodeError::FallsOffEnd { offset } => {
                write!(f, "instruction at {} falls through past the end", offset)
            }
            DecodeError::MalformedLineTable { position } => {
                write!(f, "line table entry {} is malformed", position)
            }
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DanglingSuccessor { opcode, offset } => write!(
                f,
                "opcode {} (offset {:?}) falls through but has no successor",
                opcode.0, offset
            ),
            GraphError::MissingBranchTarget { opcode, offset } => write!(
                f,
                "jump opcode {} (offset {:?}) has no branch target",
                opcode.0, offset
            ),
            GraphError::InvalidJumpDirection { opcode, from, to } => write!(
                f,
                "relative jump opcode {} cannot jump from {} to {}",
                opcode.0, from, to
            ),
            GraphError::StrayPrefix { offset } => {
                write!(f, "extended argument slot at {} has no instruction", offset)
            }
            GraphError::InsertAfterTerminal { opcode } => {
                write!(f, "cannot insert after opcode {} which never falls through", opcode.0)
            }
            GraphError::RegionEntry { entries } => write!(
                f,
                "exception region must have exactly one entry, found {}",
                entries
            ),
        }
    }
}

impl std::error::Error for Error {}
