//! Opcode numbers of the built-in profiles
//!
//! These are plain constants: the same number may mean different things in different profiles, so
//! always go through the [`crate::code::VersionProfile`] that decoded a code unit when asking
//! questions about an opcode.

/// Opcodes of the 3.8 interpreter
pub mod py38 {
    use crate::code::Opcode;

    pub const POP_TOP: Opcode = Opcode(1);
    pub const ROT_TWO: Opcode = Opcode(2);
    pub const ROT_THREE: Opcode = Opcode(3);
    pub const DUP_TOP: Opcode = Opcode(4);
    pub const DUP_TOP_TWO: Opcode = Opcode(5);
    pub const ROT_FOUR: Opcode = Opcode(6);
    pub const NOP: Opcode = Opcode(9);
    pub const UNARY_POSITIVE: Opcode = Opcode(10);
    pub const UNARY_NEGATIVE: Opcode = Opcode(11);
    pub const UNARY_NOT: Opcode = Opcode(12);
    pub const UNARY_INVERT: Opcode = Opcode(15);
    pub const BINARY_MATRIX_MULTIPLY: Opcode = Opcode(16);
    pub const INPLACE_MATRIX_MULTIPLY: Opcode = Opcode(17);
    pub const BINARY_POWER: Opcode = Opcode(19);
    pub const BINARY_MULTIPLY: Opcode = Opcode(20);
    pub const BINARY_MODULO: Opcode = Opcode(22);
    pub const BINARY_ADD: Opcode = Opcode(23);
    pub const BINARY_SUBTRACT: Opcode = Opcode(24);
    pub const BINARY_SUBSCR: Opcode = Opcode(25);
    pub const BINARY_FLOOR_DIVIDE: Opcode = Opcode(26);
    pub const BINARY_TRUE_DIVIDE: Opcode = Opcode(27);
    pub const INPLACE_FLOOR_DIVIDE: Opcode = Opcode(28);
    pub const INPLACE_TRUE_DIVIDE: Opcode = Opcode(29);
    pub const GET_AITER: Opcode = Opcode(50);
    pub const GET_ANEXT: Opcode = Opcode(51);
    pub const BEFORE_ASYNC_WITH: Opcode = Opcode(52);
    pub const BEGIN_FINALLY: Opcode = Opcode(53);
    pub const END_ASYNC_FOR: Opcode = Opcode(54);
    pub const INPLACE_ADD: Opcode = Opcode(55);
    pub const INPLACE_SUBTRACT: Opcode = Opcode(56);
    pub const INPLACE_MULTIPLY: Opcode = Opcode(57);
    pub const INPLACE_MODULO: Opcode = Opcode(59);
    pub const STORE_SUBSCR: Opcode = Opcode(60);
    pub const DELETE_SUBSCR: Opcode = Opcode(61);
    pub const BINARY_LSHIFT: Opcode = Opcode(62);
    pub const BINARY_RSHIFT: Opcode = Opcode(63);
    pub const BINARY_AND: Opcode = Opcode(64);
    pub const BINARY_XOR: Opcode = Opcode(65);
    pub const BINARY_OR: Opcode = Opcode(66);
    pub const INPLACE_POWER: Opcode = Opcode(67);
    pub const GET_ITER: Opcode = Opcode(68);
    pub const GET_YIELD_FROM_ITER: Opcode = Opcode(69);
    pub const PRINT_EXPR: Opcode = Opcode(70);
    pub const LOAD_BUILD_CLASS: Opcode = Opcode(71);
    pub const YIELD_FROM: Opcode = Opcode(72);
    pub const GET_AWAITABLE: Opcode = Opcode(73);
    pub const INPLACE_LSHIFT: Opcode = Opcode(75);
    pub const INPLACE_RSHIFT: Opcode = Opcode(76);
    pub const INPLACE_AND: Opcode = Opcode(77);
    pub const INPLACE_XOR: Opcode = Opcode(78);
    pub const INPLACE_OR: Opcode = Opcode(79);
    pub const WITH_CLEANUP_START: Opcode = Opcode(81);
    pub const WITH_CLEANUP_FINISH: Opcode = Opcode(82);
    pub const RETURN_VALUE: Opcode = Opcode(83);
    pub const IMPORT_STAR: Opcode = Opcode(84);
    pub const SETUP_ANNOTATIONS: Opcode = Opcode(85);
    pub const YIELD_VALUE: Opcode = Opcode(86);
    pub const POP_BLOCK: Opcode = Opcode(87);
    pub const END_FINALLY: Opcode = Opcode(88);
    pub const POP_EXCEPT: Opcode = Opcode(89);
    pub const STORE_NAME: Opcode = Opcode(90);
    pub const DELETE_NAME: Opcode = Opcode(91);
    pub const UNPACK_SEQUENCE: Opcode = Opcode(92);
    pub const FOR_ITER: Opcode = Opcode(93);
    pub const UNPACK_EX: Opcode = Opcode(94);
    pub const STORE_ATTR: Opcode = Opcode(95);
    pub const DELETE_ATTR: Opcode = Opcode(96);
    pub const STORE_GLOBAL: Opcode = Opcode(97);
    pub const DELETE_GLOBAL: Opcode = Opcode(98);
    pub const LOAD_CONST: Opcode = Opcode(100);
    pub const LOAD_NAME: Opcode = Opcode(101);
    pub const BUILD_TUPLE: Opcode = Opcode(102);
    pub const BUILD_LIST: Opcode = Opcode(103);
    pub const BUILD_SET: Opcode = Opcode(104);
    pub const BUILD_MAP: Opcode = Opcode(105);
    pub const LOAD_ATTR: Opcode = Opcode(106);
    pub const COMPARE_OP: Opcode = Opcode(107);
    pub const IMPORT_NAME: Opcode = Opcode(108);
    pub const IMPORT_FROM: Opcode = Opcode(109);
    pub const JUMP_FORWARD: Opcode = Opcode(110);
    pub const JUMP_IF_FALSE_OR_POP: Opcode = Opcode(111);
    pub const JUMP_IF_TRUE_OR_POP: Opcode = Opcode(112);
    pub const JUMP_ABSOLUTE: Opcode = Opcode(113);
    pub const POP_JUMP_IF_FALSE: Opcode = Opcode(114);
    pub const POP_JUMP_IF_TRUE: Opcode = Opcode(115);
    pub const LOAD_GLOBAL: Opcode = Opcode(116);
    pub const SETUP_FINALLY: Opcode = Opcode(122);
    pub const LOAD_FAST: Opcode = Opcode(124);
    pub const STORE_FAST: Opcode = Opcode(125);
    pub const DELETE_FAST: Opcode = Opcode(126);
    pub const RAISE_VARARGS: Opcode = Opcode(130);
    pub const CALL_FUNCTION: Opcode = Opcode(131);
    pub const MAKE_FUNCTION: Opcode = Opcode(132);
    pub const BUILD_SLICE: Opcode = Opcode(133);
    pub const LOAD_CLOSURE: Opcode = Opcode(135);
    pub const LOAD_DEREF: Opcode = Opcode(136);
    pub const STORE_DEREF: Opcode = Opcode(137);
    pub const DELETE_DEREF: Opcode = Opcode(138);
    pub const CALL_FUNCTION_KW: Opcode = Opcode(141);
    pub const CALL_FUNCTION_EX: Opcode = Opcode(142);
    pub const SETUP_WITH: Opcode = Opcode(143);
    pub const EXTENDED_ARG: Opcode = Opcode(144);
    pub const LIST_APPEND: Opcode = Opcode(145);
    pub const SET_ADD: Opcode = Opcode(146);
    pub const MAP_ADD: Opcode = Opcode(147);
    pub const LOAD_CLASSDEREF: Opcode = Opcode(148);
    pub const BUILD_LIST_UNPACK: Opcode = Opcode(149);
    pub const BUILD_MAP_UNPACK: Opcode = Opcode(150);
    pub const BUILD_MAP_UNPACK_WITH_CALL: Opcode = Opcode(151);
    pub const BUILD_TUPLE_UNPACK: Opcode = Opcode(152);
    pub const BUILD_SET_UNPACK: Opcode = Opcode(153);
    pub const SETUP_ASYNC_WITH: Opcode = Opcode(154);
    pub const FORMAT_VALUE: Opcode = Opcode(155);
    pub const BUILD_CONST_KEY_MAP: Opcode = Opcode(156);
    pub const BUILD_STRING: Opcode = Opcode(157);
    pub const BUILD_TUPLE_UNPACK_WITH_CALL: Opcode = Opcode(158);
    pub const LOAD_METHOD: Opcode = Opcode(160);
    pub const CALL_METHOD: Opcode = Opcode(161);
    pub const CALL_FINALLY: Opcode = Opcode(162);
    pub const POP_FINALLY: Opcode = Opcode(163);
}

/// Opcodes of the 3.10 interpreter
pub mod py310 {
    use crate::code::Opcode;

    pub use super::py38::{
        BEFORE_ASYNC_WITH, BINARY_ADD, BINARY_AND, BINARY_FLOOR_DIVIDE, BINARY_LSHIFT,
        BINARY_MATRIX_MULTIPLY, BINARY_MODULO, BINARY_MULTIPLY, BINARY_OR, BINARY_POWER,
        BINARY_RSHIFT, BINARY_SUBSCR, BINARY_SUBTRACT, BINARY_TRUE_DIVIDE, BINARY_XOR,
        BUILD_CONST_KEY_MAP, BUILD_LIST, BUILD_MAP, BUILD_SET, BUILD_SLICE, BUILD_STRING,
        BUILD_TUPLE, CALL_FUNCTION, CALL_FUNCTION_EX, CALL_FUNCTION_KW, CALL_METHOD, COMPARE_OP,
        DELETE_ATTR, DELETE_DEREF, DELETE_FAST, DELETE_GLOBAL, DELETE_NAME, DELETE_SUBSCR,
        DUP_TOP, DUP_TOP_TWO, END_ASYNC_FOR, EXTENDED_ARG, FORMAT_VALUE, FOR_ITER, GET_AITER,
        GET_ANEXT, GET_AWAITABLE, GET_ITER, GET_YIELD_FROM_ITER, IMPORT_FROM, IMPORT_NAME,
        IMPORT_STAR, INPLACE_ADD, INPLACE_AND, INPLACE_FLOOR_DIVIDE, INPLACE_LSHIFT,
        INPLACE_MATRIX_MULTIPLY, INPLACE_MODULO, INPLACE_MULTIPLY, INPLACE_OR, INPLACE_POWER,
        INPLACE_RSHIFT, INPLACE_SUBTRACT, INPLACE_TRUE_DIVIDE, INPLACE_XOR, JUMP_ABSOLUTE,
        JUMP_FORWARD, JUMP_IF_FALSE_OR_POP, JUMP_IF_TRUE_OR_POP, LIST_APPEND, LOAD_ATTR,
        LOAD_BUILD_CLASS, LOAD_CLASSDEREF, LOAD_CLOSURE, LOAD_CONST, LOAD_DEREF, LOAD_FAST,
        LOAD_GLOBAL, LOAD_METHOD, LOAD_NAME, MAKE_FUNCTION, MAP_ADD, NOP, POP_BLOCK, POP_EXCEPT,
        POP_JUMP_IF_FALSE, POP_JUMP_IF_TRUE, POP_TOP, PRINT_EXPR, RAISE_VARARGS, RETURN_VALUE,
        ROT_FOUR, ROT_THREE, ROT_TWO, SETUP_ANNOTATIONS, SETUP_ASYNC_WITH, SETUP_FINALLY,
        SETUP_WITH, SET_ADD, STORE_ATTR, STORE_DEREF, STORE_FAST, STORE_GLOBAL, STORE_NAME,
        STORE_SUBSCR, UNARY_INVERT, UNARY_NEGATIVE, UNARY_NOT, UNARY_POSITIVE, UNPACK_EX,
        UNPACK_SEQUENCE, YIELD_FROM, YIELD_VALUE,
    };

    pub const GET_LEN: Opcode = Opcode(30);
    pub const MATCH_MAPPING: Opcode = Opcode(31);
    pub const MATCH_SEQUENCE: Opcode = Opcode(32);
    pub const MATCH_KEYS: Opcode = Opcode(33);
    pub const COPY_DICT_WITHOUT_KEYS: Opcode = Opcode(34);
    pub const WITH_EXCEPT_START: Opcode = Opcode(49);
    pub const LOAD_ASSERTION_ERROR: Opcode = Opcode(74);
    pub const LIST_TO_TUPLE: Opcode = Opcode(82);
    pub const ROT_N: Opcode = Opcode(99);
    pub const IS_OP: Opcode = Opcode(117);
    pub const CONTAINS_OP: Opcode = Opcode(118);
    pub const RERAISE: Opcode = Opcode(119);
    pub const JUMP_IF_NOT_EXC_MATCH: Opcode = Opcode(121);
    pub const GEN_START: Opcode = Opcode(129);
    pub const MATCH_CLASS: Opcode = Opcode(152);
    pub const LIST_EXTEND: Opcode = Opcode(162);
    pub const SET_UPDATE: Opcode = Opcode(163);
    pub const DICT_MERGE: Opcode = Opcode(164);
    pub const DICT_UPDATE: Opcode = Opcode(165);
}
