use bytegraph::code::opcodes::py38::*;
use bytegraph::code::{
    decode, decode_stream, CodeArena, Constant, EffectRule, Opcode, OpcodeFlags, OpcodeInfo,
    Operand, OperandKind, OperandQuirk, Pools, RawCode, StackEffect, VersionProfile,
};

/// Unconditional jump whose operand is measured backwards from the end of the instruction
const JUMP_BACKWARD: Opcode = Opcode(200);

fn with_backward_jump() -> VersionProfile {
    VersionProfile::python38().with_opcode(
        JUMP_BACKWARD,
        OpcodeInfo {
            name: "JUMP_BACKWARD",
            flags: OpcodeFlags::HAS_ARGUMENT
                | OpcodeFlags::JUMP_RELATIVE
                | OpcodeFlags::JUMP_BACKWARD
                | OpcodeFlags::UNCONDITIONAL,
            operand: OperandKind::RelativeJump,
            effect: EffectRule::Fixed(StackEffect::NONE),
            quirk: OperandQuirk::None,
        },
    )
}

/// `for i in range(n): i` followed by `return n`, as compiled by the 3.8 interpreter
fn loop_py38() -> RawCode {
    let pools = Pools {
        names: vec!["range".to_owned()],
        locals: vec!["n".to_owned(), "i".to_owned()],
        ..Pools::default()
    };
    let code = vec![
        116, 0, // LOAD_GLOBAL range
        124, 0, // LOAD_FAST n
        131, 1, // CALL_FUNCTION 1
        68, 0, // GET_ITER
        93, 8, // FOR_ITER (to 18)
        125, 1, // STORE_FAST i
        124, 1, // LOAD_FAST i
        1, 0, // POP_TOP
        113, 8, // JUMP_ABSOLUTE 8
        124, 0, // LOAD_FAST n
        83, 0, // RETURN_VALUE
    ];
    let mut raw = RawCode::new(code, pools);
    raw.line_table = vec![0, 1, 10, 1, 8, 1];
    raw
}

#[test]
fn loop_is_identical() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let raw = loop_py38();

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let (encoded, stats) = unit.encode().unwrap();
    assert_eq!(encoded.code, raw.code);
    assert_eq!(encoded.line_table, raw.line_table);
    assert_eq!(encoded.pools, raw.pools);
    assert_eq!(encoded.header.stacksize, 2);
    assert_eq!(encoded.header.nlocals, 2);
    assert_eq!(stats.inserted_prefixes, 0);
}

#[test]
fn wide_constant_index_is_identical() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: (0..300).map(Constant::Int).collect(),
        ..Pools::default()
    };
    // EXTENDED_ARG 1; LOAD_CONST 43 (index 299); RETURN_VALUE
    let raw = RawCode::new(vec![144, 1, 100, 43, 83, 0], pools);

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let load = unit.entry.successor().unwrap();
    assert_eq!(*load.operand(), Operand::Constant(Constant::Int(299)));

    let (encoded, stats) = unit.encode().unwrap();
    assert_eq!(encoded.code, raw.code);
    assert_eq!(stats.inserted_prefixes, 0);
}

#[test]
fn duplicate_pool_entries_keep_their_index() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: vec![Constant::None, Constant::Int(1), Constant::None],
        ..Pools::default()
    };
    // LOAD_CONST 2; RETURN_VALUE
    let raw = RawCode::new(vec![100, 2, 83, 0], pools);

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let (encoded, _) = unit.encode().unwrap();
    assert_eq!(encoded.code, raw.code);
    assert_eq!(encoded.pools, raw.pools);
}

#[test]
fn loop_is_identical_py310() {
    let profile = VersionProfile::python310();
    let arena = CodeArena::new();
    let pools = Pools {
        names: vec!["range".to_owned()],
        locals: vec!["n".to_owned(), "i".to_owned()],
        ..Pools::default()
    };
    let code = vec![
        116, 0, // LOAD_GLOBAL range
        124, 0, // LOAD_FAST n
        131, 1, // CALL_FUNCTION 1
        68, 0, // GET_ITER
        93, 4, // FOR_ITER (to 18, counted in instructions)
        125, 1, // STORE_FAST i
        124, 1, // LOAD_FAST i
        1, 0, // POP_TOP
        113, 4, // JUMP_ABSOLUTE (to 8, counted in instructions)
        124, 0, // LOAD_FAST n
        83, 0, // RETURN_VALUE
    ];
    let mut raw = RawCode::new(code, pools);
    raw.line_table = vec![10, 1, 8, 1, 4, 1];

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let for_iter = unit
        .listing()
        .to_string()
        .lines()
        .any(|line| line.contains("FOR_ITER") && line.ends_with("(to 18)"));
    assert!(for_iter);

    let (encoded, _) = unit.encode().unwrap();
    assert_eq!(encoded.code, raw.code);
    assert_eq!(encoded.line_table, raw.line_table);
}

#[test]
fn edits_shift_jumps() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let raw = loop_py38();

    let mut unit = decode(&raw, &profile, &arena).unwrap();

    // Put a no-op right after `STORE_FAST i`, inside the loop body
    let store = unit
        .predecessors()
        .reachable()
        .iter()
        .copied()
        .find(|node| node.opcode() == STORE_FAST)
        .unwrap();
    let nop = arena.alloc(NOP, Operand::None);
    store.insert_after(&profile, &[nop]).unwrap();

    let (encoded, _) = unit.encode().unwrap();
    assert_eq!(
        encoded.code,
        vec![116, 0, 124, 0, 131, 1, 68, 0, 93, 10, 125, 1, 9, 0, 124, 1, 1, 0, 113, 8, 124, 0, 83, 0]
    );

    // Every jump lands on the instruction it pointed at before the edit
    let check = CodeArena::new();
    let decoded = decode_stream(&encoded.code, &encoded.pools, &profile, &check).unwrap();
    let for_iter = decoded[4];
    assert_eq!(for_iter.opcode(), FOR_ITER);
    let exit = for_iter.branch_target().unwrap();
    assert_eq!(exit.opcode(), LOAD_FAST);
    assert_eq!(exit.offset(), Some(20));
    let back = decoded[9];
    assert_eq!(back.opcode(), JUMP_ABSOLUTE);
    assert_eq!(back.branch_target().unwrap().offset(), Some(8));
}

#[test]
fn inserted_constants_extend_the_pool() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: vec![Constant::Int(5)],
        ..Pools::default()
    };
    let raw = RawCode::new(vec![100, 0, 83, 0], pools);

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let load = arena.alloc(LOAD_CONST, Operand::Constant(Constant::Int(7)));
    let pop = arena.alloc(POP_TOP, Operand::None);
    unit.entry.insert_after(&profile, &[load, pop]).unwrap();

    let (encoded, _) = unit.encode().unwrap();
    assert_eq!(encoded.code, vec![100, 0, 100, 1, 1, 0, 83, 0]);
    assert_eq!(
        encoded.pools.constants,
        vec![Constant::Int(5), Constant::Int(7)]
    );
    assert_eq!(unit.pools, encoded.pools);
}

#[test]
fn pool_growth_adds_prefixes() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: (0..256).map(Constant::Int).collect(),
        ..Pools::default()
    };
    let raw = RawCode::new(vec![100, 5, 83, 0], pools);

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    unit.entry
        .set_operand(Operand::Constant(Constant::Str("fresh".to_owned())));

    let (encoded, stats) = unit.encode().unwrap();
    assert_eq!(encoded.code, vec![144, 1, 100, 0, 83, 0]);
    assert_eq!(stats.inserted_prefixes, 1);
    assert_eq!(
        encoded.pools.constants[256],
        Constant::Str("fresh".to_owned())
    );

    let check = CodeArena::new();
    let decoded = decode_stream(&encoded.code, &encoded.pools, &profile, &check).unwrap();
    assert_eq!(
        *decoded[1].operand(),
        Operand::Constant(Constant::Str("fresh".to_owned()))
    );
}

#[test]
fn padding_reached_only_by_a_jump_is_kept() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: vec![Constant::None],
        locals: vec!["x".to_owned()],
        ..Pools::default()
    };
    let code = vec![
        124, 0, // LOAD_FAST x
        114, 8, // POP_JUMP_IF_FALSE 8
        100, 0, // LOAD_CONST None
        83, 0, // RETURN_VALUE
        144, 0, // EXTENDED_ARG 0
        100, 0, // LOAD_CONST None
        83, 0, // RETURN_VALUE
    ];
    let raw = RawCode::new(code, pools);

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let branch = unit.entry.successor().unwrap();
    assert_eq!(branch.branch_target().unwrap().opcode(), EXTENDED_ARG);

    let (encoded, stats) = unit.encode().unwrap();
    assert_eq!(encoded.code, raw.code);
    assert_eq!(stats.inserted_prefixes, 0);
}

#[test]
fn backward_loop_is_identical() {
    let profile = with_backward_jump();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: vec![Constant::None],
        locals: vec!["n".to_owned(), "i".to_owned()],
        ..Pools::default()
    };
    let code = vec![
        124, 0, // LOAD_FAST n
        68, 0, // GET_ITER
        93, 4, // FOR_ITER (to 10)
        125, 1, // STORE_FAST i
        200, 6, // JUMP_BACKWARD (to 4)
        100, 0, // LOAD_CONST None
        83, 0, // RETURN_VALUE
    ];
    let raw = RawCode::new(code, pools);

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let check = CodeArena::new();
    let decoded = decode_stream(&raw.code, &raw.pools, &profile, &check).unwrap();
    assert_eq!(decoded[4].branch_target().unwrap().opcode(), FOR_ITER);
    assert_eq!(decoded[4].branch_target().unwrap().offset(), Some(4));

    let (encoded, stats) = unit.encode().unwrap();
    assert_eq!(encoded.code, raw.code);
    assert_eq!(encoded.header.stacksize, 2);
    assert_eq!(stats.inserted_prefixes, 0);
}

#[test]
fn backward_jump_widens_when_the_loop_grows() {
    let profile = with_backward_jump();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: (0..256).map(Constant::Int).collect(),
        ..Pools::default()
    };
    let mut code = vec![
        9, 0, // NOP (loop head)
        100, 5, // LOAD_CONST 5
        1, 0, // POP_TOP
    ];
    for _ in 0..123 {
        code.extend([9, 0]);
    }
    // JUMP_BACKWARD (to 0) at offset 252
    code.extend([200, 254]);
    let raw = RawCode::new(code, pools);

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let (encoded, _) = unit.encode().unwrap();
    assert_eq!(encoded.code, raw.code);

    // A constant past index 255 needs a prefix inside the loop, pushing the jump past 255 too
    let load = unit.entry.successor().unwrap();
    assert_eq!(load.opcode(), LOAD_CONST);
    load.set_operand(Operand::Constant(Constant::Str("fresh".to_owned())));

    let (encoded, stats) = unit.encode().unwrap();
    assert_eq!(stats.inserted_prefixes, 2);
    assert_eq!(encoded.code.len(), 258);
    assert_eq!(&encoded.code[..8], &[9, 0, 144, 1, 100, 0, 1, 0]);
    // distance is measured from the end of the jump, after its own prefix
    assert_eq!(&encoded.code[254..], &[144, 1, 200, 2]);

    let check = CodeArena::new();
    let decoded = decode_stream(&encoded.code, &encoded.pools, &profile, &check).unwrap();
    let jump = decoded[128];
    assert_eq!(jump.opcode(), JUMP_BACKWARD);
    assert_eq!(jump.branch_target().unwrap().offset(), Some(0));
}
