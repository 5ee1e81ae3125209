use bitflags::bitflags;
use std::fmt;

/// Numeric opcode as it appears in the code stream
///
/// The meaning of a number is only defined relative to a [`crate::code::VersionProfile`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Opcode(pub u8);

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

bitflags! {
    /// Control flow and encoding properties of an opcode
    pub struct OpcodeFlags: u16 {
        /// The argument byte is meaningful
        const HAS_ARGUMENT = 1 << 0;

        /// Operand is the absolute address of the branch target
        const JUMP_ABSOLUTE = 1 << 1;

        /// Operand is a distance measured from the end of the instruction
        const JUMP_RELATIVE = 1 << 2;

        /// Relative distance is measured backwards (only meaningful with `JUMP_RELATIVE`)
        const JUMP_BACKWARD = 1 << 3;

        /// Jump never falls through
        const UNCONDITIONAL = 1 << 4;

        /// Execution does not continue after this instruction (return, raise)
        const STOPS_FLOW = 1 << 5;

        /// Leaves the function normally (must not be inside a protected block)
        const RETURNS = 1 << 6;

        /// Prefix carrying the high digits of the next instruction's operand
        const EXTENDED_ARG = 1 << 7;

        /// Does nothing at all
        const NO_OP = 1 << 8;

        /// Pushes an exception block whose handler is the branch target
        const HANDLER_SETUP = 1 << 9;

        /// Pops the innermost exception block
        const BLOCK_EXIT = 1 << 10;
    }
}

impl OpcodeFlags {
    /// Is this a jump-kind opcode (one that has a branch target)?
    pub fn is_jump(&self) -> bool {
        self.intersects(OpcodeFlags::JUMP_ABSOLUTE | OpcodeFlags::JUMP_RELATIVE)
    }

    /// Can execution continue at the successor edge?
    pub fn falls_through(&self) -> bool {
        !self.intersects(OpcodeFlags::STOPS_FLOW | OpcodeFlags::UNCONDITIONAL)
    }
}

/// What the operand of an opcode refers to
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OperandKind {
    /// No operand
    None,

    /// Index into the constants pool
    Constant,

    /// Index into the names pool
    Name,

    /// Index into the local variable names pool
    Local,

    /// Index into the cell and free variable pool
    Cell,

    /// Jump distance
    RelativeJump,

    /// Jump address
    AbsoluteJump,

    /// Plain integer (counts, flags, comparison kinds)
    Raw,
}

impl OperandKind {
    pub fn is_jump(&self) -> bool {
        matches!(self, OperandKind::RelativeJump | OperandKind::AbsoluteJump)
    }
}

/// Which outgoing edge of an instruction is being considered
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Edge {
    /// Execution continued to the successor
    Fallthrough,

    /// Execution continued to the branch target
    Branch,
}

/// Stack effect of executing one instruction
///
/// `forwards` describes pushed values which are just copies of values that were already on the
/// stack: entry `d` (counted from the top after the instruction) is the depth (counted from the
/// top before the instruction) of the value it duplicates. This is what lets the dataflow queries
/// see through `dup`/`rot` style instructions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StackEffect {
    pub pushed: u32,
    pub popped: u32,
    pub forwards: &'static [Option<u32>],
}

impl StackEffect {
    pub const NONE: StackEffect = StackEffect::new(0, 0);

    pub const fn new(pushed: u32, popped: u32) -> StackEffect {
        StackEffect {
            pushed,
            popped,
            forwards: &[],
        }
    }

    pub const fn forwarding(
        pushed: u32,
        popped: u32,
        forwards: &'static [Option<u32>],
    ) -> StackEffect {
        StackEffect {
            pushed,
            popped,
            forwards,
        }
    }

    /// Net change in stack height
    pub fn net(&self) -> i64 {
        self.pushed as i64 - self.popped as i64
    }

    /// If the pushed value at `depth` is a copy of an input, the input depth it copies
    pub fn extra_walk_depth(&self, depth: u32) -> Option<u32> {
        self.forwards.get(depth as usize).copied().flatten()
    }

    /// Output depths holding a copy of the input at `depth`
    pub fn forwarded_to(&self, depth: u32) -> impl Iterator<Item = u32> + '_ {
        self.forwards
            .iter()
            .enumerate()
            .filter(move |(_, source)| **source == Some(depth))
            .map(|(out, _)| out as u32)
    }
}

/// How to compute the stack effect of an opcode
#[derive(Copy, Clone)]
pub enum EffectRule {
    /// Same effect whatever the operand or the edge taken
    Fixed(StackEffect),

    /// Effect depends on the operand (eg. number of elements of a collection being built)
    Computed(fn(u32) -> StackEffect),

    /// Effect depends on which outgoing edge is taken
    Branching {
        fallthrough: StackEffect,
        branch: StackEffect,
    },

    /// Opcode is not known to the profile
    Unknown,
}

impl EffectRule {
    /// Resolve the effect given the raw operand value and the edge taken
    pub fn resolve(&self, argument: u32, edge: Edge) -> Option<StackEffect> {
        match self {
            EffectRule::Fixed(effect) => Some(*effect),
            EffectRule::Computed(compute) => Some(compute(argument)),
            EffectRule::Branching {
                fallthrough,
                branch,
            } => Some(match edge {
                Edge::Fallthrough => *fallthrough,
                Edge::Branch => *branch,
            }),
            EffectRule::Unknown => None,
        }
    }
}

impl fmt::Debug for EffectRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectRule::Fixed(effect) => f.debug_tuple("Fixed").field(effect).finish(),
            EffectRule::Computed(_) => f.write_str("Computed"),
            EffectRule::Branching {
                fallthrough,
                branch,
            } => f
                .debug_struct("Branching")
                .field("fallthrough", fallthrough)
                .field("branch", branch)
                .finish(),
            EffectRule::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Interpreter-version specific overloading of an operand
///
/// Some interpreters pack extra flag bits into the operand of a few load instructions. Those bits
/// have to be stripped before the operand can be used as a pool index, and put back on encode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandQuirk {
    None,

    /// Pool index is `arg >> n`, the low `n` bits are flags
    LowFlagBits(u8),

    /// Bit `b` is a flag, the other bits are the pool index
    HighFlagBit(u8),
}

impl OperandQuirk {
    /// Split a raw operand into `(pool index, flags)`
    pub fn split(&self, argument: u32) -> (u32, u32) {
        match *self {
            OperandQuirk::None => (argument, 0),
            OperandQuirk::LowFlagBits(bits) => {
                let mask = (1u32 << bits) - 1;
                (argument >> bits, argument & mask)
            }
            OperandQuirk::HighFlagBit(bit) => {
                let flag = 1u32 << bit;
                (argument & !flag, argument & flag)
            }
        }
    }

    /// Inverse of [`OperandQuirk::split`]
    ///
    /// Returns `None` when the pool index does not fit next to the flag bits.
    pub fn join(&self, index: u32, flags: u32) -> Option<u32> {
        match *self {
            OperandQuirk::None => Some(index),
            OperandQuirk::LowFlagBits(bits) => {
                if index.leading_zeros() < bits as u32 {
                    return None;
                }
                Some((index << bits) | flags)
            }
            OperandQuirk::HighFlagBit(bit) => {
                if index >= 1u32 << bit {
                    return None;
                }
                Some(index | flags)
            }
        }
    }
}
