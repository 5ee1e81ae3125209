use super::opcodes::{py310, py38};
use super::{Edge, EffectRule, Opcode, OpcodeFlags, OperandKind, OperandQuirk, StackEffect};
use std::borrow::Cow;

/// Unit in which jump operands are expressed
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JumpUnit {
    /// Jump operands count bytes
    Bytes,

    /// Jump operands count code units
    Instructions,
}

impl JumpUnit {
    /// Number of bytes represented by one unit of a jump operand
    pub fn bytes(&self) -> usize {
        match self {
            JumpUnit::Bytes => 1,
            JumpUnit::Instructions => 2,
        }
    }
}

/// Format of the table mapping code offsets to source lines
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineTableFormat {
    /// `(byte delta, line delta)` pairs emitted at every line change
    Lnotab,

    /// `(byte delta, line delta)` pairs describing consecutive ranges, `-128` meaning "no line"
    LineRanges,
}

/// Everything a profile knows about one opcode number
#[derive(Clone, Debug)]
pub struct OpcodeInfo {
    pub name: &'static str,
    pub flags: OpcodeFlags,
    pub operand: OperandKind,
    pub effect: EffectRule,
    pub quirk: OperandQuirk,
}

impl OpcodeInfo {
    /// Entry for opcode numbers the profile does not know about
    pub const UNKNOWN: OpcodeInfo = OpcodeInfo {
        name: "",
        flags: OpcodeFlags::HAS_ARGUMENT,
        operand: OperandKind::Raw,
        effect: EffectRule::Unknown,
        quirk: OperandQuirk::None,
    };

    pub fn is_known(&self) -> bool {
        !matches!(self.effect, EffectRule::Unknown)
    }
}

/// Description of one interpreter version's instruction set
///
/// Profiles are built once and then only read, so a single profile can be shared by any number of
/// code units being processed at the same time.
#[derive(Clone, Debug)]
pub struct VersionProfile {
    pub name: &'static str,
    opcodes: Vec<OpcodeInfo>,
    pub jump_unit: JumpUnit,
    pub line_table: LineTableFormat,

    /// Prefix opcode carrying the high digits of an operand
    pub extended_arg: Opcode,

    /// Opcode used for synthesized forward jumps
    pub jump_forward: Opcode,

    /// Opcode used for synthesized jumps in any direction
    pub jump_absolute: Opcode,

    /// Opcode used to open an exception region during flattening
    pub handler_setup: Opcode,

    /// Opcode used to close an exception region during flattening
    pub block_exit: Opcode,
}

impl VersionProfile {
    /// Look up an opcode (unknown numbers get [`OpcodeInfo::UNKNOWN`])
    pub fn info(&self, opcode: Opcode) -> &OpcodeInfo {
        &self.opcodes[opcode.0 as usize]
    }

    pub fn flags(&self, opcode: Opcode) -> OpcodeFlags {
        self.info(opcode).flags
    }

    /// Printable name of an opcode
    pub fn opcode_name(&self, opcode: Opcode) -> Cow<'static, str> {
        let info = self.info(opcode);
        if info.is_known() {
            Cow::Borrowed(info.name)
        } else {
            Cow::Owned(format!("<{}>", opcode.0))
        }
    }

    /// Stack effect of executing `opcode` with raw operand `argument` and leaving along `edge`
    ///
    /// Returns `None` for opcodes whose effect is not known.
    pub fn stack_effect(&self, opcode: Opcode, argument: u32, edge: Edge) -> Option<StackEffect> {
        self.info(opcode).effect.resolve(argument, edge)
    }

    /// Override how the operand of an opcode packs flag bits next to its pool index
    pub fn with_quirk(mut self, opcode: Opcode, quirk: OperandQuirk) -> VersionProfile {
        self.opcodes[opcode.0 as usize].quirk = quirk;
        self
    }

    /// Add or replace the description of one opcode
    ///
    /// This is how instruction sets that differ slightly from a built-in profile are described,
    /// for instance interpreters with relative backward jumps.
    pub fn with_opcode(mut self, opcode: Opcode, info: OpcodeInfo) -> VersionProfile {
        self.opcodes[opcode.0 as usize] = info;
        self
    }

    /// Profile of the 3.8 interpreter (jumps count bytes, `co_lnotab` line table)
    pub fn python38() -> VersionProfile {
        let mut table = OpcodeTable::new();
        table.shared();

        use py38::*;
        table.plain(BEGIN_FINALLY, "BEGIN_FINALLY", StackEffect::new(6, 0));
        table.plain(WITH_CLEANUP_START, "WITH_CLEANUP_START", StackEffect::new(2, 0));
        table.plain(WITH_CLEANUP_FINISH, "WITH_CLEANUP_FINISH", StackEffect::new(0, 3));
        table.plain(END_FINALLY, "END_FINALLY", StackEffect::new(0, 6));
        table.computed(BUILD_LIST_UNPACK, "BUILD_LIST_UNPACK", build);
        table.computed(BUILD_MAP_UNPACK, "BUILD_MAP_UNPACK", build);
        table.computed(BUILD_MAP_UNPACK_WITH_CALL, "BUILD_MAP_UNPACK_WITH_CALL", build);
        table.computed(BUILD_TUPLE_UNPACK, "BUILD_TUPLE_UNPACK", build);
        table.computed(BUILD_SET_UNPACK, "BUILD_SET_UNPACK", build);
        table.computed(BUILD_TUPLE_UNPACK_WITH_CALL, "BUILD_TUPLE_UNPACK_WITH_CALL", build);
        table.jump(
            CALL_FINALLY,
            "CALL_FINALLY",
            OpcodeFlags::JUMP_RELATIVE,
            EffectRule::Branching {
                fallthrough: StackEffect::NONE,
                branch: StackEffect::new(1, 0),
            },
        );
        table.raw(POP_FINALLY, "POP_FINALLY", StackEffect::new(0, 6));

        VersionProfile {
            name: "python38",
            opcodes: table.opcodes,
            jump_unit: JumpUnit::Bytes,
            line_table: LineTableFormat::Lnotab,
            extended_arg: EXTENDED_ARG,
            jump_forward: JUMP_FORWARD,
            jump_absolute: JUMP_ABSOLUTE,
            handler_setup: SETUP_FINALLY,
            block_exit: POP_BLOCK,
        }
    }

    /// Profile of the 3.10 interpreter (jumps count instructions, `co_linetable` line table)
    pub fn python310() -> VersionProfile {
        let mut table = OpcodeTable::new();
        table.shared();

        use py310::*;
        table.plain(GET_LEN, "GET_LEN", StackEffect::forwarding(2, 1, &[None, Some(0)]));
        table.plain(
            MATCH_MAPPING,
            "MATCH_MAPPING",
            StackEffect::forwarding(2, 1, &[None, Some(0)]),
        );
        table.plain(
            MATCH_SEQUENCE,
            "MATCH_SEQUENCE",
            StackEffect::forwarding(2, 1, &[None, Some(0)]),
        );
        table.plain(MATCH_KEYS, "MATCH_KEYS", StackEffect::new(2, 0));
        table.plain(
            COPY_DICT_WITHOUT_KEYS,
            "COPY_DICT_WITHOUT_KEYS",
            StackEffect::new(1, 1),
        );
        table.plain(WITH_EXCEPT_START, "WITH_EXCEPT_START", StackEffect::new(1, 0));
        table.plain(LOAD_ASSERTION_ERROR, "LOAD_ASSERTION_ERROR", StackEffect::new(1, 0));
        table.plain(LIST_TO_TUPLE, "LIST_TO_TUPLE", StackEffect::new(1, 1));
        table.computed(ROT_N, "ROT_N", |n| StackEffect::new(n, n));
        table.raw(IS_OP, "IS_OP", StackEffect::new(1, 2));
        table.raw(CONTAINS_OP, "CONTAINS_OP", StackEffect::new(1, 2));
        table.add(
            RERAISE,
            "RERAISE",
            OpcodeFlags::HAS_ARGUMENT | OpcodeFlags::STOPS_FLOW,
            OperandKind::Raw,
            EffectRule::Fixed(StackEffect::new(0, 3)),
        );
        table.jump(
            JUMP_IF_NOT_EXC_MATCH,
            "JUMP_IF_NOT_EXC_MATCH",
            OpcodeFlags::JUMP_ABSOLUTE,
            EffectRule::Fixed(StackEffect::new(0, 2)),
        );
        table.raw(GEN_START, "GEN_START", StackEffect::new(0, 1));
        table.raw(MATCH_CLASS, "MATCH_CLASS", StackEffect::new(2, 3));
        table.raw(LIST_EXTEND, "LIST_EXTEND", StackEffect::new(0, 1));
        table.raw(SET_UPDATE, "SET_UPDATE", StackEffect::new(0, 1));
        table.raw(DICT_MERGE, "DICT_MERGE", StackEffect::new(0, 1));
        table.raw(DICT_UPDATE, "DICT_UPDATE", StackEffect::new(0, 1));

        VersionProfile {
            name: "python310",
            opcodes: table.opcodes,
            jump_unit: JumpUnit::Instructions,
            line_table: LineTableFormat::LineRanges,
            extended_arg: EXTENDED_ARG,
            jump_forward: JUMP_FORWARD,
            jump_absolute: JUMP_ABSOLUTE,
            handler_setup: SETUP_FINALLY,
            block_exit: POP_BLOCK,
        }
    }

    /// Look up a built-in profile by name (`python38`/`py38`, `python310`/`py310`)
    pub fn by_name(name: &str) -> Option<VersionProfile> {
        match name {
            "python38" | "py38" | "3.8" => Some(VersionProfile::python38()),
            "python310" | "py310" | "3.10" => Some(VersionProfile::python310()),
            _ => None,
        }
    }
}

fn build(count: u32) -> StackEffect {
    StackEffect::new(1, count)
}

/// Mutable opcode table, only used while a profile is being put together
struct OpcodeTable {
    opcodes: Vec<OpcodeInfo>,
}

impl OpcodeTable {
    fn new() -> OpcodeTable {
        OpcodeTable {
            opcodes: vec![OpcodeInfo::UNKNOWN; 256],
        }
    }

    fn add(
        &mut self,
        opcode: Opcode,
        name: &'static str,
        flags: OpcodeFlags,
        operand: OperandKind,
        effect: EffectRule,
    ) {
        self.opcodes[opcode.0 as usize] = OpcodeInfo {
            name,
            flags,
            operand,
            effect,
            quirk: OperandQuirk::None,
        };
    }

    /// Opcode without operand
    fn plain(&mut self, opcode: Opcode, name: &'static str, effect: StackEffect) {
        self.add(
            opcode,
            name,
            OpcodeFlags::empty(),
            OperandKind::None,
            EffectRule::Fixed(effect),
        );
    }

    /// Opcode with a plain integer operand that does not affect the stack
    fn raw(&mut self, opcode: Opcode, name: &'static str, effect: StackEffect) {
        self.add(
            opcode,
            name,
            OpcodeFlags::HAS_ARGUMENT,
            OperandKind::Raw,
            EffectRule::Fixed(effect),
        );
    }

    /// Opcode with a plain integer operand which determines the stack effect
    fn computed(&mut self, opcode: Opcode, name: &'static str, effect: fn(u32) -> StackEffect) {
        self.add(
            opcode,
            name,
            OpcodeFlags::HAS_ARGUMENT,
            OperandKind::Raw,
            EffectRule::Computed(effect),
        );
    }

    /// Opcode whose operand indexes a pool
    fn pooled(
        &mut self,
        opcode: Opcode,
        name: &'static str,
        operand: OperandKind,
        effect: StackEffect,
    ) {
        self.add(
            opcode,
            name,
            OpcodeFlags::HAS_ARGUMENT,
            operand,
            EffectRule::Fixed(effect),
        );
    }

    /// Jump-kind opcode (`flags` must contain the addressing mode)
    fn jump(&mut self, opcode: Opcode, name: &'static str, flags: OpcodeFlags, effect: EffectRule) {
        let operand = if flags.contains(OpcodeFlags::JUMP_ABSOLUTE) {
            OperandKind::AbsoluteJump
        } else {
            OperandKind::RelativeJump
        };
        self.add(
            opcode,
            name,
            flags | OpcodeFlags::HAS_ARGUMENT,
            operand,
            effect,
        );
    }

    /// Opcodes that have the same number and meaning in every built-in profile
    fn shared(&mut self) {
        use py38::*;

        self.plain(POP_TOP, "POP_TOP", StackEffect::new(0, 1));
        self.plain(ROT_TWO, "ROT_TWO", StackEffect::forwarding(2, 2, &[Some(1), Some(0)]));
        self.plain(
            ROT_THREE,
            "ROT_THREE",
            StackEffect::forwarding(3, 3, &[Some(1), Some(2), Some(0)]),
        );
        self.plain(
            ROT_FOUR,
            "ROT_FOUR",
            StackEffect::forwarding(4, 4, &[Some(1), Some(2), Some(3), Some(0)]),
        );
        self.plain(DUP_TOP, "DUP_TOP", StackEffect::forwarding(2, 1, &[Some(0), Some(0)]));
        self.plain(
            DUP_TOP_TWO,
            "DUP_TOP_TWO",
            StackEffect::forwarding(4, 2, &[Some(0), Some(1), Some(0), Some(1)]),
        );
        self.add(
            NOP,
            "NOP",
            OpcodeFlags::NO_OP,
            OperandKind::None,
            EffectRule::Fixed(StackEffect::NONE),
        );

        let unary = StackEffect::new(1, 1);
        for (opcode, name) in [
            (UNARY_POSITIVE, "UNARY_POSITIVE"),
            (UNARY_NEGATIVE, "UNARY_NEGATIVE"),
            (UNARY_NOT, "UNARY_NOT"),
            (UNARY_INVERT, "UNARY_INVERT"),
            (GET_ITER, "GET_ITER"),
            (GET_YIELD_FROM_ITER, "GET_YIELD_FROM_ITER"),
            (GET_AWAITABLE, "GET_AWAITABLE"),
            (GET_AITER, "GET_AITER"),
            (YIELD_VALUE, "YIELD_VALUE"),
        ] {
            self.plain(opcode, name, unary);
        }

        let binary = StackEffect::new(1, 2);
        for (opcode, name) in [
            (BINARY_MATRIX_MULTIPLY, "BINARY_MATRIX_MULTIPLY"),
            (INPLACE_MATRIX_MULTIPLY, "INPLACE_MATRIX_MULTIPLY"),
            (BINARY_POWER, "BINARY_POWER"),
            (BINARY_MULTIPLY, "BINARY_MULTIPLY"),
            (BINARY_MODULO, "BINARY_MODULO"),
            (BINARY_ADD, "BINARY_ADD"),
            (BINARY_SUBTRACT, "BINARY_SUBTRACT"),
            (BINARY_SUBSCR, "BINARY_SUBSCR"),
            (BINARY_FLOOR_DIVIDE, "BINARY_FLOOR_DIVIDE"),
            (BINARY_TRUE_DIVIDE, "BINARY_TRUE_DIVIDE"),
            (INPLACE_FLOOR_DIVIDE, "INPLACE_FLOOR_DIVIDE"),
            (INPLACE_TRUE_DIVIDE, "INPLACE_TRUE_DIVIDE"),
            (INPLACE_ADD, "INPLACE_ADD"),
            (INPLACE_SUBTRACT, "INPLACE_SUBTRACT"),
            (INPLACE_MULTIPLY, "INPLACE_MULTIPLY"),
            (INPLACE_MODULO, "INPLACE_MODULO"),
            (BINARY_LSHIFT, "BINARY_LSHIFT"),
            (BINARY_RSHIFT, "BINARY_RSHIFT"),
            (BINARY_AND, "BINARY_AND"),
            (BINARY_XOR, "BINARY_XOR"),
            (BINARY_OR, "BINARY_OR"),
            (INPLACE_POWER, "INPLACE_POWER"),
            (INPLACE_LSHIFT, "INPLACE_LSHIFT"),
            (INPLACE_RSHIFT, "INPLACE_RSHIFT"),
            (INPLACE_AND, "INPLACE_AND"),
            (INPLACE_XOR, "INPLACE_XOR"),
            (INPLACE_OR, "INPLACE_OR"),
            (YIELD_FROM, "YIELD_FROM"),
        ] {
            self.plain(opcode, name, binary);
        }

        self.plain(GET_ANEXT, "GET_ANEXT", StackEffect::forwarding(2, 1, &[None, Some(0)]));
        self.plain(
            BEFORE_ASYNC_WITH,
            "BEFORE_ASYNC_WITH",
            StackEffect::new(2, 1),
        );
        self.plain(END_ASYNC_FOR, "END_ASYNC_FOR", StackEffect::new(0, 7));
        self.plain(STORE_SUBSCR, "STORE_SUBSCR", StackEffect::new(0, 3));
        self.plain(DELETE_SUBSCR, "DELETE_SUBSCR", StackEffect::new(0, 2));
        self.plain(PRINT_EXPR, "PRINT_EXPR", StackEffect::new(0, 1));
        self.plain(LOAD_BUILD_CLASS, "LOAD_BUILD_CLASS", StackEffect::new(1, 0));
        self.add(
            RETURN_VALUE,
            "RETURN_VALUE",
            OpcodeFlags::STOPS_FLOW | OpcodeFlags::RETURNS,
            OperandKind::None,
            EffectRule::Fixed(StackEffect::new(0, 1)),
        );
        self.plain(IMPORT_STAR, "IMPORT_STAR", StackEffect::new(0, 1));
        self.plain(SETUP_ANNOTATIONS, "SETUP_ANNOTATIONS", StackEffect::NONE);
        self.add(
            POP_BLOCK,
            "POP_BLOCK",
            OpcodeFlags::BLOCK_EXIT,
            OperandKind::None,
            EffectRule::Fixed(StackEffect::NONE),
        );
        self.plain(POP_EXCEPT, "POP_EXCEPT", StackEffect::new(0, 3));

        // Name pool
        self.pooled(STORE_NAME, "STORE_NAME", OperandKind::Name, StackEffect::new(0, 1));
        self.pooled(DELETE_NAME, "DELETE_NAME", OperandKind::Name, StackEffect::NONE);
        self.pooled(STORE_ATTR, "STORE_ATTR", OperandKind::Name, StackEffect::new(0, 2));
        self.pooled(DELETE_ATTR, "DELETE_ATTR", OperandKind::Name, StackEffect::new(0, 1));
        self.pooled(STORE_GLOBAL, "STORE_GLOBAL", OperandKind::Name, StackEffect::new(0, 1));
        self.pooled(DELETE_GLOBAL, "DELETE_GLOBAL", OperandKind::Name, StackEffect::NONE);
        self.pooled(LOAD_NAME, "LOAD_NAME", OperandKind::Name, StackEffect::new(1, 0));
        self.pooled(LOAD_ATTR, "LOAD_ATTR", OperandKind::Name, StackEffect::new(1, 1));
        self.pooled(IMPORT_NAME, "IMPORT_NAME", OperandKind::Name, StackEffect::new(1, 2));
        self.pooled(
            IMPORT_FROM,
            "IMPORT_FROM",
            OperandKind::Name,
            StackEffect::forwarding(2, 1, &[None, Some(0)]),
        );
        self.pooled(LOAD_GLOBAL, "LOAD_GLOBAL", OperandKind::Name, StackEffect::new(1, 0));
        self.pooled(LOAD_METHOD, "LOAD_METHOD", OperandKind::Name, StackEffect::new(2, 1));

        // Constant and local variable pools
        self.pooled(LOAD_CONST, "LOAD_CONST", OperandKind::Constant, StackEffect::new(1, 0));
        self.pooled(LOAD_FAST, "LOAD_FAST", OperandKind::Local, StackEffect::new(1, 0));
        self.pooled(STORE_FAST, "STORE_FAST", OperandKind::Local, StackEffect::new(0, 1));
        self.pooled(DELETE_FAST, "DELETE_FAST", OperandKind::Local, StackEffect::NONE);

        // Cell and free variable pool
        self.pooled(LOAD_CLOSURE, "LOAD_CLOSURE", OperandKind::Cell, StackEffect::new(1, 0));
        self.pooled(LOAD_DEREF, "LOAD_DEREF", OperandKind::Cell, StackEffect::new(1, 0));
        self.pooled(STORE_DEREF, "STORE_DEREF", OperandKind::Cell, StackEffect::new(0, 1));
        self.pooled(DELETE_DEREF, "DELETE_DEREF", OperandKind::Cell, StackEffect::NONE);
        self.pooled(
            LOAD_CLASSDEREF,
            "LOAD_CLASSDEREF",
            OperandKind::Cell,
            StackEffect::new(1, 0),
        );

        // Operand sized
        self.computed(UNPACK_SEQUENCE, "UNPACK_SEQUENCE", |n| StackEffect::new(n, 1));
        self.computed(UNPACK_EX, "UNPACK_EX", |n| {
            StackEffect::new((n & 0xff).saturating_add(n >> 8).saturating_add(1), 1)
        });
        self.computed(BUILD_TUPLE, "BUILD_TUPLE", build);
        self.computed(BUILD_LIST, "BUILD_LIST", build);
        self.computed(BUILD_SET, "BUILD_SET", build);
        self.computed(BUILD_STRING, "BUILD_STRING", build);
        self.computed(BUILD_SLICE, "BUILD_SLICE", build);
        self.computed(BUILD_MAP, "BUILD_MAP", |n| {
            StackEffect::new(1, n.saturating_mul(2))
        });
        self.computed(BUILD_CONST_KEY_MAP, "BUILD_CONST_KEY_MAP", |n| {
            StackEffect::new(1, n.saturating_add(1))
        });
        self.computed(CALL_FUNCTION, "CALL_FUNCTION", |n| {
            StackEffect::new(1, n.saturating_add(1))
        });
        self.computed(CALL_FUNCTION_KW, "CALL_FUNCTION_KW", |n| {
            StackEffect::new(1, n.saturating_add(2))
        });
        self.computed(CALL_METHOD, "CALL_METHOD", |n| {
            StackEffect::new(1, n.saturating_add(2))
        });
        self.computed(CALL_FUNCTION_EX, "CALL_FUNCTION_EX", |n| {
            StackEffect::new(1, 2 + (n & 1))
        });
        self.computed(MAKE_FUNCTION, "MAKE_FUNCTION", |n| {
            StackEffect::new(1, 2 + (n & 0xf).count_ones())
        });
        self.computed(FORMAT_VALUE, "FORMAT_VALUE", |n| {
            StackEffect::new(1, if n & 0x4 != 0 { 2 } else { 1 })
        });
        self.add(
            RAISE_VARARGS,
            "RAISE_VARARGS",
            OpcodeFlags::HAS_ARGUMENT | OpcodeFlags::STOPS_FLOW,
            OperandKind::Raw,
            EffectRule::Computed(|n| StackEffect::new(0, n)),
        );
        self.raw(COMPARE_OP, "COMPARE_OP", StackEffect::new(1, 2));
        self.raw(LIST_APPEND, "LIST_APPEND", StackEffect::new(0, 1));
        self.raw(SET_ADD, "SET_ADD", StackEffect::new(0, 1));
        self.raw(MAP_ADD, "MAP_ADD", StackEffect::new(0, 2));
        self.add(
            EXTENDED_ARG,
            "EXTENDED_ARG",
            OpcodeFlags::HAS_ARGUMENT | OpcodeFlags::EXTENDED_ARG,
            OperandKind::None,
            EffectRule::Fixed(StackEffect::NONE),
        );

        // Jumps
        self.jump(
            FOR_ITER,
            "FOR_ITER",
            OpcodeFlags::JUMP_RELATIVE,
            EffectRule::Branching {
                fallthrough: StackEffect::forwarding(2, 1, &[None, Some(0)]),
                branch: StackEffect::new(0, 1),
            },
        );
        self.jump(
            JUMP_FORWARD,
            "JUMP_FORWARD",
            OpcodeFlags::JUMP_RELATIVE | OpcodeFlags::UNCONDITIONAL,
            EffectRule::Fixed(StackEffect::NONE),
        );
        self.jump(
            JUMP_ABSOLUTE,
            "JUMP_ABSOLUTE",
            OpcodeFlags::JUMP_ABSOLUTE | OpcodeFlags::UNCONDITIONAL,
            EffectRule::Fixed(StackEffect::NONE),
        );
        let or_pop = EffectRule::Branching {
            fallthrough: StackEffect::new(0, 1),
            branch: StackEffect::NONE,
        };
        self.jump(
            JUMP_IF_FALSE_OR_POP,
            "JUMP_IF_FALSE_OR_POP",
            OpcodeFlags::JUMP_ABSOLUTE,
            or_pop,
        );
        self.jump(
            JUMP_IF_TRUE_OR_POP,
            "JUMP_IF_TRUE_OR_POP",
            OpcodeFlags::JUMP_ABSOLUTE,
            or_pop,
        );
        let pop_jump = EffectRule::Fixed(StackEffect::new(0, 1));
        self.jump(
            POP_JUMP_IF_FALSE,
            "POP_JUMP_IF_FALSE",
            OpcodeFlags::JUMP_ABSOLUTE,
            pop_jump,
        );
        self.jump(
            POP_JUMP_IF_TRUE,
            "POP_JUMP_IF_TRUE",
            OpcodeFlags::JUMP_ABSOLUTE,
            pop_jump,
        );

        // Exception blocks (the branch edge is the way into the handler)
        self.jump(
            SETUP_FINALLY,
            "SETUP_FINALLY",
            OpcodeFlags::JUMP_RELATIVE | OpcodeFlags::HANDLER_SETUP,
            EffectRule::Branching {
                fallthrough: StackEffect::NONE,
                branch: StackEffect::new(6, 0),
            },
        );
        self.jump(
            SETUP_WITH,
            "SETUP_WITH",
            OpcodeFlags::JUMP_RELATIVE | OpcodeFlags::HANDLER_SETUP,
            EffectRule::Branching {
                fallthrough: StackEffect::new(2, 1),
                branch: StackEffect::new(7, 1),
            },
        );
        self.jump(
            SETUP_ASYNC_WITH,
            "SETUP_ASYNC_WITH",
            OpcodeFlags::JUMP_RELATIVE | OpcodeFlags::HANDLER_SETUP,
            EffectRule::Branching {
                fallthrough: StackEffect::NONE,
                branch: StackEffect::new(6, 1),
            },
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn operand_dependent_effects() {
        let profile = VersionProfile::python38();
        let effect = |opcode, arg| {
            profile
                .stack_effect(opcode, arg, Edge::Fallthrough)
                .unwrap()
                .net()
        };

        assert_eq!(effect(py38::CALL_FUNCTION, 2), -2);
        assert_eq!(effect(py38::CALL_METHOD, 1), -2);
        assert_eq!(effect(py38::BUILD_MAP, 3), -5);
        assert_eq!(effect(py38::MAKE_FUNCTION, 0x09), -3);
        assert_eq!(effect(py38::UNPACK_EX, 0x0102), 3);
        assert_eq!(effect(py38::FORMAT_VALUE, 0x4), -1);
        assert_eq!(effect(py38::CALL_FUNCTION, u32::MAX), 1 - u32::MAX as i64);
    }

    #[test]
    fn edge_dependent_effects() {
        let profile = VersionProfile::python38();
        let net = |opcode, edge| profile.stack_effect(opcode, 0, edge).unwrap().net();

        assert_eq!(net(py38::FOR_ITER, Edge::Fallthrough), 1);
        assert_eq!(net(py38::FOR_ITER, Edge::Branch), -1);
        assert_eq!(net(py38::JUMP_IF_TRUE_OR_POP, Edge::Branch), 0);
        assert_eq!(net(py38::JUMP_IF_TRUE_OR_POP, Edge::Fallthrough), -1);
        assert_eq!(net(py38::SETUP_FINALLY, Edge::Branch), 6);
        assert_eq!(net(py38::SETUP_FINALLY, Edge::Fallthrough), 0);
    }

    #[test]
    fn profiles_differ() {
        let old = VersionProfile::python38();
        let new = VersionProfile::python310();

        assert_eq!(old.opcode_name(py38::END_FINALLY), "END_FINALLY");
        assert_eq!(new.opcode_name(py38::END_FINALLY), "<88>");
        assert!(!new.info(py38::END_FINALLY).is_known());
        assert!(new
            .flags(py310::RERAISE)
            .contains(OpcodeFlags::STOPS_FLOW));
        assert_eq!(old.jump_unit, JumpUnit::Bytes);
        assert_eq!(new.jump_unit.bytes(), 2);
        assert_eq!(
            new.info(py310::LIST_TO_TUPLE).operand,
            OperandKind::None
        );
    }

    #[test]
    fn quirks_are_per_opcode() {
        let profile =
            VersionProfile::python310().with_quirk(py310::LOAD_GLOBAL, OperandQuirk::LowFlagBits(1));
        assert_eq!(
            profile.info(py310::LOAD_GLOBAL).quirk,
            OperandQuirk::LowFlagBits(1)
        );
        assert_eq!(profile.info(py310::LOAD_NAME).quirk, OperandQuirk::None);
    }

    #[test]
    fn jump_classes() {
        let profile = VersionProfile::python38();
        let flags = profile.flags(py38::FOR_ITER);
        assert!(flags.is_jump());
        assert!(flags.falls_through());
        assert!(!profile.flags(py38::JUMP_ABSOLUTE).falls_through());
        assert!(!profile.flags(py38::RETURN_VALUE).falls_through());
        assert!(!profile.flags(py38::LOAD_CONST).is_jump());
        assert_eq!(
            profile.info(py38::JUMP_FORWARD).operand,
            OperandKind::RelativeJump
        );
    }
}
