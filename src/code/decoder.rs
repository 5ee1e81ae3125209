use super::{
    decode_lines, deserialize_all, CodeArena, CodeUnit, DecodeError, Error, ExceptionTable,
    Instruction, OpcodeFlags, Operand, OperandKind, PoolKind, Pools, RawCode, SourcePosition,
    VersionProfile, Word,
};

/// Decode a raw code object into a code unit
///
/// Besides the instruction graph, this resolves source lines from the line table and reconstructs
/// the exception regions implied by the handler setup instructions.
pub fn decode<'a>(
    raw: &RawCode,
    profile: &'a VersionProfile,
    arena: &'a CodeArena<'a>,
) -> Result<CodeUnit<'a>, Error> {
    let nodes = decode_stream(&raw.code, &raw.pools, profile, arena)?;

    let lines = decode_lines(
        profile.line_table,
        &raw.line_table,
        raw.header.firstlineno,
        nodes.len(),
    )?;
    for (node, line) in nodes.iter().zip(lines) {
        node.set_position(line.map(SourcePosition::line));
    }

    let exceptions = ExceptionTable::reconstruct(profile, &nodes);
    log::debug!(
        "Decoded '{}': {} code units, {} exception regions",
        raw.header.name,
        nodes.len(),
        exceptions.regions().len()
    );

    let mut unit = CodeUnit::new(
        profile,
        arena,
        nodes[0],
        raw.pools.clone(),
        raw.header.clone(),
    );
    unit.exceptions = exceptions;
    Ok(unit)
}

/// Decode a code stream into nodes, in stream order (one node per code unit)
///
/// Extended-argument prefixes become placeholder nodes whose digits are folded into the operand of
/// the instruction they precede. Jumps landing on a placeholder keep pointing at it, so that
/// prefixes only reachable through jumps survive re-encoding. Every node is bound to its offset in
/// the stream.
pub fn decode_stream<'a>(
    code: &[u8],
    pools: &Pools,
    profile: &VersionProfile,
    arena: &'a CodeArena<'a>,
) -> Result<Vec<&'a Instruction<'a>>, Error> {
    let words: Vec<Word> = deserialize_all(code, Word::WIDTH)
        .map_err(|_| DecodeError::TruncatedStream { length: code.len() })?;
    if words.is_empty() {
        return Err(Error::Decode(DecodeError::EmptyCode));
    }

    // First pass: operands
    let mut nodes: Vec<&'a Instruction<'a>> = Vec::with_capacity(words.len());
    let mut arguments: Vec<u32> = Vec::with_capacity(words.len());
    let mut pending: u64 = 0;
    for (index, word) in words.iter().enumerate() {
        let offset = index * Word::WIDTH;
        let info = profile.info(word.opcode);

        let argument = (pending << 8) | word.arg as u64;
        if argument > u32::MAX as u64 {
            return Err(Error::Decode(DecodeError::OversizedArgument { offset }));
        }
        let argument = argument as u32;

        let node = if info.flags.contains(OpcodeFlags::EXTENDED_ARG) {
            pending = argument as u64;
            arena.alloc(word.opcode, Operand::None)
        } else {
            pending = 0;
            let node = arena.alloc(word.opcode, Operand::None);
            if info.flags.contains(OpcodeFlags::HAS_ARGUMENT) {
                let split = info.quirk.split(argument);
                resolve_operand(node, info.operand, split, argument, pools, offset)?;
            }
            node
        };
        node.set_offset(Some(offset));
        nodes.push(node);
        arguments.push(argument);
    }

    // Second pass: edges
    for (index, node) in nodes.iter().enumerate() {
        let offset = index * Word::WIDTH;
        let flags = node.flags(profile);
        if flags.falls_through() {
            match nodes.get(index + 1) {
                Some(next) => node.set_successor(Some(*next)),
                None => return Err(Error::Decode(DecodeError::FallsOffEnd { offset })),
            }
        }

        if flags.is_jump() {
            let argument = arguments[index];
            let distance = argument as usize * profile.jump_unit.bytes();
            let end = offset + Word::WIDTH;
            let target = if flags.contains(OpcodeFlags::JUMP_ABSOLUTE) {
                Some(distance)
            } else if flags.contains(OpcodeFlags::JUMP_BACKWARD) {
                end.checked_sub(distance)
            } else {
                end.checked_add(distance)
            };

            let bad_target = || Error::Decode(DecodeError::BadJumpTarget { offset, argument });
            let target_index = match target {
                Some(target) if target % Word::WIDTH == 0 && target < code.len() => {
                    target / Word::WIDTH
                }
                _ => return Err(bad_target()),
            };
            node.set_branch_target(Some(nodes[target_index]));
        }
    }

    Ok(nodes)
}

/// Turn a raw operand into a resolved one
fn resolve_operand<'a>(
    node: &'a Instruction<'a>,
    kind: OperandKind,
    (index, flags): (u32, u32),
    argument: u32,
    pools: &Pools,
    offset: usize,
) -> Result<(), DecodeError> {
    let bad_index = |pool| DecodeError::BadPoolIndex {
        offset,
        pool,
        index,
    };
    let operand = match kind {
        OperandKind::None => Operand::None,
        OperandKind::Raw => Operand::Raw(argument),
        OperandKind::RelativeJump | OperandKind::AbsoluteJump => Operand::Jump,
        OperandKind::Constant => Operand::Constant(
            pools
                .constants
                .get(index as usize)
                .cloned()
                .ok_or_else(|| bad_index(PoolKind::Constants))?,
        ),
        OperandKind::Name => Operand::Name(
            pools
                .names
                .get(index as usize)
                .cloned()
                .ok_or_else(|| bad_index(PoolKind::Names))?,
        ),
        OperandKind::Local => Operand::Local(
            pools
                .locals
                .get(index as usize)
                .cloned()
                .ok_or_else(|| bad_index(PoolKind::Locals))?,
        ),
        OperandKind::Cell => Operand::Cell(
            pools
                .cell_name(index)
                .map(str::to_owned)
                .ok_or_else(|| bad_index(PoolKind::Cells))?,
        ),
    };

    let pooled = matches!(
        kind,
        OperandKind::Constant | OperandKind::Name | OperandKind::Local | OperandKind::Cell
    );
    node.set_operand(operand);
    if pooled {
        node.set_pool_hint(Some(index));
        node.set_operand_flags(flags);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::code::opcodes::py38::*;
    use crate::code::{Constant, OperandQuirk};
    use crate::util::RefId;

    fn pools() -> Pools {
        Pools {
            constants: vec![Constant::None, Constant::Int(5)],
            names: vec!["print".to_owned()],
            locals: vec!["x".to_owned()],
            ..Pools::default()
        }
    }

    #[test]
    fn straight_line() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        let nodes = decode_stream(&[100, 1, 83, 0], &pools(), &profile, &arena).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(*nodes[0].operand(), Operand::Constant(Constant::Int(5)));
        assert_eq!(nodes[0].pool_hint(), Some(1));
        assert_eq!(RefId(nodes[0].successor().unwrap()), RefId(nodes[1]));
        assert!(nodes[1].successor().is_none());
        assert_eq!(nodes[1].offset(), Some(2));
    }

    #[test]
    fn extended_arguments_fold_into_operand() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        let code = [144, 1, 144, 2, 102, 3, 83, 0];
        let nodes = decode_stream(&code, &pools(), &profile, &arena).unwrap();
        assert!(nodes[0].is_prefix(&profile));
        assert!(nodes[1].is_prefix(&profile));
        assert_eq!(nodes[2].opcode(), BUILD_TUPLE);
        assert_eq!(*nodes[2].operand(), Operand::Raw(0x010203));
    }

    #[test]
    fn jumps_land_on_placeholders() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        // jump_absolute 2; extended_arg 0; build_tuple 0; return_value
        let code = [113, 2, 144, 0, 102, 0, 83, 0];
        let nodes = decode_stream(&code, &pools(), &profile, &arena).unwrap();
        assert_eq!(RefId(nodes[0].branch_target().unwrap()), RefId(nodes[1]));
        assert_eq!(RefId(nodes[1].successor().unwrap()), RefId(nodes[2]));
        assert!(nodes[0].successor().is_none());
    }

    #[test]
    fn relative_jumps_by_profile() {
        let arena = CodeArena::new();
        // for_iter +2 units; pop_top; return_value
        let py38 = VersionProfile::python38();
        let nodes = decode_stream(&[93, 2, 1, 0, 83, 0], &pools(), &py38, &arena).unwrap();
        assert_eq!(RefId(nodes[0].branch_target().unwrap()), RefId(nodes[2]));

        let py310 = VersionProfile::python310();
        let nodes = decode_stream(&[93, 1, 1, 0, 83, 0], &pools(), &py310, &arena).unwrap();
        assert_eq!(RefId(nodes[0].branch_target().unwrap()), RefId(nodes[2]));
    }

    #[test]
    fn quirks_are_masked() {
        let profile =
            VersionProfile::python38().with_quirk(LOAD_GLOBAL, OperandQuirk::LowFlagBits(1));
        let arena = CodeArena::new();
        let nodes = decode_stream(&[116, 1, 83, 0], &pools(), &profile, &arena).unwrap();
        assert_eq!(*nodes[0].operand(), Operand::Name("print".to_owned()));
        assert_eq!(nodes[0].operand_flags(), 1);
    }

    #[test]
    fn malformed_streams() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        let decode = |code: &[u8]| decode_stream(code, &pools(), &profile, &arena);

        assert!(matches!(
            decode(&[100, 0, 83]),
            Err(Error::Decode(DecodeError::TruncatedStream { length: 3 }))
        ));
        assert!(matches!(decode(&[]), Err(Error::Decode(DecodeError::EmptyCode))));
        assert!(matches!(
            decode(&[100, 7, 83, 0]),
            Err(Error::Decode(DecodeError::BadPoolIndex {
                offset: 0,
                pool: PoolKind::Constants,
                index: 7
            }))
        ));
        assert!(matches!(
            decode(&[113, 3, 83, 0]),
            Err(Error::Decode(DecodeError::BadJumpTarget { offset: 0, argument: 3 }))
        ));
        assert!(matches!(
            decode(&[113, 8, 83, 0]),
            Err(Error::Decode(DecodeError::BadJumpTarget { .. }))
        ));
        assert!(matches!(
            decode(&[144, 1, 144, 0, 144, 0, 144, 0, 102, 0, 83, 0]),
            Err(Error::Decode(DecodeError::OversizedArgument { offset: 8 }))
        ));
        assert!(matches!(
            decode(&[100, 0]),
            Err(Error::Decode(DecodeError::FallsOffEnd { offset: 0 }))
        ));
    }
}
