use bytegraph::code::opcodes::py38::*;
use bytegraph::code::{
    decode, decode_stream, extra_digits, CodeArena, CodeHeader, CodeUnit, Constant, Error,
    GraphError, Instruction, Operand, Pools, RawCode, VersionProfile,
};
use bytegraph::util::RefId;
use std::collections::HashSet;

fn ids<'a>(nodes: impl IntoIterator<Item = &'a Instruction<'a>>) -> HashSet<usize> {
    nodes.into_iter().map(|node| RefId(node).address()).collect()
}

/// Node of a decoded unit found by its offset
fn at<'a>(unit: &mut CodeUnit<'a>, offset: usize) -> &'a Instruction<'a> {
    let profile = unit.profile;
    unit.predecessors()
        .reachable()
        .iter()
        .copied()
        .find(|node| node.offset() == Some(offset) && !node.is_prefix(profile))
        .unwrap()
}

#[test]
fn return_constant() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: vec![Constant::Int(5)],
        ..Pools::default()
    };
    let raw = RawCode::new(vec![100, 0, 83, 0], pools);

    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let load = unit.entry;
    assert_eq!(load.opcode(), LOAD_CONST);
    assert_eq!(*load.operand(), Operand::Constant(Constant::Int(5)));
    let ret = load.successor().unwrap();
    assert_eq!(ret.opcode(), RETURN_VALUE);
    assert!(ret.successor().is_none());

    let (encoded, _) = unit.encode().unwrap();
    assert_eq!(encoded.code, raw.code);
    assert_eq!(encoded.header.stacksize, 1);
}

#[test]
fn reserved_slots_are_topped_up() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();

    // Two extended-argument slots already in front of an operand needing three
    let first = arena.alloc(EXTENDED_ARG, Operand::None);
    let second = arena.alloc(EXTENDED_ARG, Operand::None);
    let build = arena.alloc(BUILD_TUPLE, Operand::Raw(0x0100_0000));
    let ret = arena.alloc(RETURN_VALUE, Operand::None);
    first.set_successor(Some(second));
    second.set_successor(Some(build));
    build.set_successor(Some(ret));

    let mut unit = CodeUnit::new(&profile, &arena, first, Pools::default(), CodeHeader::default());
    let (encoded, stats) = unit.encode().unwrap();
    assert_eq!(stats.inserted_prefixes, 1);
    assert_eq!(stats.iterations, 2);
    assert_eq!(encoded.code, vec![144, 1, 144, 0, 144, 0, 102, 0, 83, 0]);
}

#[test]
fn operands_read_back_exactly() {
    let profile = VersionProfile::python38();
    for value in [0, 1, 255, 256, 0xffff, 0x1_0000, 0xff_ffff, 0x100_0000, u32::MAX] {
        let arena = CodeArena::new();
        let build = arena.alloc(BUILD_TUPLE, Operand::Raw(value));
        let ret = arena.alloc(RETURN_VALUE, Operand::None);
        build.set_successor(Some(ret));

        let mut unit = CodeUnit::new(&profile, &arena, build, Pools::default(), CodeHeader::default());
        let (encoded, stats) = unit.encode().unwrap();
        let digits = extra_digits(value) as usize;
        assert_eq!(stats.inserted_prefixes, digits);
        assert_eq!(encoded.code.len(), (digits + 2) * 2);

        let check = CodeArena::new();
        let decoded = decode_stream(&encoded.code, &encoded.pools, &profile, &check).unwrap();
        assert_eq!(*decoded[digits].operand(), Operand::Raw(value));
    }
}

#[test]
fn long_jumps_land_on_their_target() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: vec![Constant::None],
        locals: vec!["x".to_owned()],
        ..Pools::default()
    };

    // if x: <130 no-ops>; return None
    // return x
    let test = arena.alloc(LOAD_FAST, Operand::Local("x".to_owned()));
    let branch = arena.alloc(POP_JUMP_IF_FALSE, Operand::Jump);
    let none = arena.alloc(LOAD_CONST, Operand::Constant(Constant::None));
    let ret_none = arena.alloc(RETURN_VALUE, Operand::None);
    let load = arena.alloc(LOAD_FAST, Operand::Local("x".to_owned()));
    let ret_x = arena.alloc(RETURN_VALUE, Operand::None);
    test.set_successor(Some(branch));
    branch.set_branch_target(Some(load));
    let mut last = branch;
    for _ in 0..130 {
        let nop = arena.alloc(NOP, Operand::None);
        last.set_successor(Some(nop));
        last = nop;
    }
    last.set_successor(Some(none));
    none.set_successor(Some(ret_none));
    load.set_successor(Some(ret_x));

    let mut unit = CodeUnit::new(&profile, &arena, test, pools, CodeHeader::default());
    let (encoded, stats) = unit.encode().unwrap();
    assert_eq!(stats.inserted_prefixes, 1);
    // 270 = 0x10e
    assert_eq!(&encoded.code[..6], &[124, 0, 144, 1, 114, 14]);
    assert_eq!(load.offset(), Some(270));

    let check = CodeArena::new();
    let decoded = decode_stream(&encoded.code, &encoded.pools, &profile, &check).unwrap();
    let target = decoded[2].branch_target().unwrap();
    assert_eq!(target.offset(), Some(270));
    assert_eq!(target.opcode(), LOAD_FAST);
    assert_eq!(target.successor().unwrap().opcode(), RETURN_VALUE);
}

#[test]
fn addition_operands() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: vec![Constant::Int(1), Constant::Int(2)],
        ..Pools::default()
    };
    // LOAD_CONST 1; LOAD_CONST 2; BINARY_ADD; RETURN_VALUE
    let raw = RawCode::new(vec![100, 0, 100, 1, 23, 0, 83, 0], pools);
    let mut unit = decode(&raw, &profile, &arena).unwrap();

    let one = at(&mut unit, 0);
    let two = at(&mut unit, 2);
    let add = at(&mut unit, 4);
    let ret = at(&mut unit, 6);

    let producers: Vec<_> = unit.trace_producer(ret, 0).collect();
    assert_eq!(ids(producers), ids([add]));

    let left: Vec<_> = unit.trace_producer(add, 1).collect();
    let right: Vec<_> = unit.trace_producer(add, 0).collect();
    assert_eq!(ids(left), ids([one]));
    assert_eq!(ids(right), ids([two]));

    let consumers: Vec<_> = unit.trace_consumer(one, 0).collect();
    assert_eq!(ids(consumers), ids([add]));

    // Tracing past the entry has no answer
    assert_eq!(unit.trace_producer(one, 0).count(), 0);
}

#[test]
fn loops_do_not_trap_traces() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        names: vec!["range".to_owned()],
        locals: vec!["n".to_owned(), "i".to_owned()],
        ..Pools::default()
    };
    let code = vec![
        116, 0, 124, 0, 131, 1, 68, 0, 93, 8, 125, 1, 124, 1, 1, 0, 113, 8, 124, 0, 83, 0,
    ];
    let raw = RawCode::new(code, pools);
    let mut unit = decode(&raw, &profile, &arena).unwrap();

    let get_iter = at(&mut unit, 6);
    let for_iter = at(&mut unit, 8);
    let store = at(&mut unit, 10);
    let load = at(&mut unit, 12);
    let pop = at(&mut unit, 14);

    // The iterator comes from GET_ITER on entry, and is passed along by FOR_ITER around the back
    // edge
    let iterators: Vec<_> = unit.trace_producer(for_iter, 0).collect();
    assert_eq!(ids(iterators), ids([get_iter, for_iter]));

    let items: Vec<_> = unit.trace_producer(store, 0).collect();
    assert_eq!(ids(items), ids([for_iter]));

    let popped: Vec<_> = unit.trace_producer(pop, 0).collect();
    assert_eq!(ids(popped), ids([load]));

    let consumers: Vec<_> = unit.trace_consumer(get_iter, 0).collect();
    assert_eq!(ids(consumers), ids([for_iter]));
}

#[test]
fn chained_jumps_collapse() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: vec![Constant::None, Constant::Int(1)],
        locals: vec!["x".to_owned()],
        ..Pools::default()
    };
    let code = vec![
        124, 0, // 0 LOAD_FAST x
        115, 8, // 2 POP_JUMP_IF_TRUE 8
        100, 0, // 4 LOAD_CONST None
        83, 0, // 6 RETURN_VALUE
        113, 12, // 8 JUMP_ABSOLUTE 12
        9, 0, // 10 NOP
        110, 2, // 12 JUMP_FORWARD (to 16)
        9, 0, // 14 NOP
        100, 1, // 16 LOAD_CONST 1
        83, 0, // 18 RETURN_VALUE
    ];
    let raw = RawCode::new(code, pools);
    let mut unit = decode(&raw, &profile, &arena).unwrap();
    let branch = at(&mut unit, 2);
    let target = at(&mut unit, 16);

    unit.optimise();
    assert_eq!(RefId(branch.branch_target().unwrap()), RefId(target));

    let (encoded, _) = unit.encode().unwrap();
    assert_eq!(
        encoded.code,
        vec![124, 0, 115, 8, 100, 0, 83, 0, 100, 1, 83, 0]
    );
}

#[test]
fn optimise_is_idempotent() {
    let profile = VersionProfile::python38();
    let pools = Pools {
        constants: vec![Constant::None, Constant::Int(1)],
        locals: vec!["x".to_owned()],
        ..Pools::default()
    };
    let code = vec![
        9, 0, // 0 NOP
        124, 0, // 2 LOAD_FAST x
        114, 10, // 4 POP_JUMP_IF_FALSE 10
        100, 0, // 6 LOAD_CONST None
        83, 0, // 8 RETURN_VALUE
        113, 12, // 10 JUMP_ABSOLUTE 12
        100, 1, // 12 LOAD_CONST 1
        83, 0, // 14 RETURN_VALUE
    ];
    let raw = RawCode::new(code, pools);

    let arena = CodeArena::new();
    let mut unit = decode(&raw, &profile, &arena).unwrap();
    unit.optimise();
    let (once, _) = unit.encode().unwrap();
    assert_eq!(once.code, vec![124, 0, 114, 8, 100, 0, 83, 0, 100, 1, 83, 0]);

    let arena = CodeArena::new();
    let mut unit = decode(&once, &profile, &arena).unwrap();
    unit.optimise();
    let (twice, _) = unit.encode().unwrap();
    assert_eq!(twice.code, once.code);
    assert_eq!(twice.pools, once.pools);
}

#[test]
fn declared_regions_are_flattened() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();

    // try: return f()
    // except: return None
    let load = arena.alloc(LOAD_GLOBAL, Operand::Name("f".to_owned()));
    let call = arena.alloc(CALL_FUNCTION, Operand::Raw(0));
    let ret = arena.alloc(RETURN_VALUE, Operand::None);
    let handler = arena.alloc(POP_TOP, Operand::None);
    let none = arena.alloc(LOAD_CONST, Operand::Constant(Constant::None));
    let handler_ret = arena.alloc(RETURN_VALUE, Operand::None);
    load.set_successor(Some(call));
    call.set_successor(Some(ret));
    handler.set_successor(Some(none));
    none.set_successor(Some(handler_ret));

    let mut unit = CodeUnit::new(&profile, &arena, load, Pools::default(), CodeHeader::default());
    unit.exceptions.protect(handler, vec![load, call, ret]);
    let (encoded, _) = unit.encode().unwrap();
    assert_eq!(
        encoded.code,
        vec![122, 8, 116, 0, 131, 0, 87, 0, 83, 0, 1, 0, 100, 0, 83, 0]
    );
    assert_eq!(encoded.pools.names, vec!["f".to_owned()]);
    assert_eq!(encoded.pools.constants, vec![Constant::None]);

    // Decoding recovers the region from the setup instruction
    let check = CodeArena::new();
    let mut decoded = decode(&encoded, &profile, &check).unwrap();
    assert_eq!(decoded.exceptions.regions().len(), 1);
    let region = &decoded.exceptions.regions()[0];
    assert_eq!(region.setup.unwrap().offset(), Some(0));
    assert_eq!(region.handler.offset(), Some(10));
    assert_eq!(region.protected.len(), 3);

    let decoded_call = at(&mut decoded, 4);
    let decoded_handler = at(&mut decoded, 10);
    let found = decoded.exceptions.handler_for(decoded_call).unwrap();
    assert_eq!(RefId(found), RefId(decoded_handler));
}

#[test]
fn fragments_move_between_units() {
    let profile = VersionProfile::python38();

    let source_arena = CodeArena::new();
    let source_pools = Pools {
        constants: vec![Constant::Int(1), Constant::Int(2)],
        ..Pools::default()
    };
    let source_raw = RawCode::new(vec![100, 0, 100, 1, 23, 0, 83, 0], source_pools);
    let source = decode(&source_raw, &profile, &source_arena).unwrap();

    let target_arena = CodeArena::new();
    let target_pools = Pools {
        constants: vec![Constant::Str("b".to_owned())],
        ..Pools::default()
    };
    let target_raw = RawCode::new(vec![100, 0, 83, 0], target_pools);
    let mut target = decode(&target_raw, &profile, &target_arena).unwrap();

    target.entry = target.import_fragment(source.entry);
    let (encoded, _) = target.encode().unwrap();
    assert_eq!(encoded.code, vec![100, 1, 100, 2, 23, 0, 83, 0]);
    assert_eq!(
        encoded.pools.constants,
        vec![
            Constant::Str("b".to_owned()),
            Constant::Int(1),
            Constant::Int(2)
        ]
    );

    // The source is untouched
    assert_eq!(source.entry.pool_hint(), Some(0));
}

#[test]
fn dangling_nodes_are_rejected() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let load = arena.alloc(LOAD_CONST, Operand::Constant(Constant::None));

    let mut unit = CodeUnit::new(&profile, &arena, load, Pools::default(), CodeHeader::default());
    assert!(matches!(
        unit.encode(),
        Err(Error::GraphConsistency(GraphError::DanglingSuccessor { .. }))
    ));
}

#[test]
fn removing_instructions() {
    let profile = VersionProfile::python38();
    let arena = CodeArena::new();
    let pools = Pools {
        constants: vec![Constant::Int(5)],
        ..Pools::default()
    };
    // LOAD_CONST 5; DUP_TOP; POP_TOP; RETURN_VALUE
    let raw = RawCode::new(vec![100, 0, 4, 0, 1, 0, 83, 0], pools);
    let mut unit = decode(&raw, &profile, &arena).unwrap();

    let dup = at(&mut unit, 2);
    unit.remove(dup).unwrap();
    let pop = at(&mut unit, 4);
    unit.remove(pop).unwrap();

    let (encoded, _) = unit.encode().unwrap();
    assert_eq!(encoded.code, vec![100, 0, 83, 0]);
}
