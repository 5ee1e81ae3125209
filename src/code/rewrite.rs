//! Graph rewrites which keep the semantics of the code intact

use super::{Edge, Error, GraphError, Instruction, OpcodeFlags, PredecessorIndex, VersionProfile};
use crate::util::RefId;
use std::collections::HashSet;

/// First node with an actual effect that executing `node` leads to
///
/// No-ops and prefix placeholders are skipped through their successor, unconditional jumps through
/// their target. If this runs into a cycle of such nodes (an infinite empty loop), the node where
/// the cycle closes is returned.
pub fn skip_trivial<'a>(profile: &VersionProfile, node: &'a Instruction<'a>) -> &'a Instruction<'a> {
    let mut seen: HashSet<RefId<'a, Instruction<'a>>> = HashSet::new();
    let mut current = node;
    while seen.insert(RefId(current)) {
        let flags = current.flags(profile);
        let next = if flags.intersects(OpcodeFlags::NO_OP | OpcodeFlags::EXTENDED_ARG) {
            current.successor()
        } else if flags.is_jump() && flags.contains(OpcodeFlags::UNCONDITIONAL) {
            current.branch_target()
        } else {
            None
        };
        match next {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

/// Inline unconditional jumps and drop no-ops from everything reachable from `entry`
///
/// Returns the new entry. The skipped nodes are left untouched (they are just no longer
/// reachable). The result is generally not in a linear order anymore, which is fine since the
/// graph is linearised again when encoding.
pub fn optimise<'a>(profile: &VersionProfile, entry: &'a Instruction<'a>) -> &'a Instruction<'a> {
    let entry = skip_trivial(profile, entry);
    let mut visited: HashSet<RefId<'a, Instruction<'a>>> = HashSet::new();
    let mut to_visit: Vec<&'a Instruction<'a>> = vec![entry];
    let mut rewritten = 0;

    while let Some(node) = to_visit.pop() {
        if !visited.insert(RefId(node)) {
            continue;
        }
        let edges: Vec<_> = node.edges(profile).collect();
        for (next, edge) in edges {
            let skipped = skip_trivial(profile, next);
            if RefId(skipped) != RefId(next) {
                rewritten += 1;
                match edge {
                    Edge::Fallthrough => node.set_successor(Some(skipped)),
                    Edge::Branch => node.set_branch_target(Some(skipped)),
                }
            }
            to_visit.push(skipped);
        }
    }

    log::debug!("Optimised {} edges over {} instructions", rewritten, visited.len());
    entry
}

/// Take `node` out of the graph, redirecting every edge into it to where it continues
///
/// The node must either fall through or jump unconditionally. `index` must be up to date.
pub fn remove<'a>(
    profile: &VersionProfile,
    index: &PredecessorIndex<'a>,
    entry: &mut &'a Instruction<'a>,
    node: &'a Instruction<'a>,
) -> Result<(), Error> {
    let flags = node.flags(profile);
    let continuation = if flags.falls_through() {
        node.successor()
    } else if flags.is_jump() && flags.contains(OpcodeFlags::UNCONDITIONAL) {
        node.branch_target()
    } else {
        None
    };
    let continuation = match continuation {
        Some(continuation) => continuation,
        None => {
            return Err(Error::GraphConsistency(GraphError::DanglingSuccessor {
                opcode: node.opcode(),
                offset: node.offset(),
            }))
        }
    };

    for (pred, edge) in index.predecessors(node) {
        match edge {
            Edge::Fallthrough => pred.set_successor(Some(continuation)),
            Edge::Branch => pred.set_branch_target(Some(continuation)),
        }
    }
    if RefId(*entry) == RefId(node) {
        *entry = continuation;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::code::opcodes::py38::*;
    use crate::code::{CodeArena, Constant, Operand};

    #[test]
    fn jumps_and_nops_disappear() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        let nop = arena.alloc(NOP, Operand::None);
        let test = arena.alloc(POP_JUMP_IF_FALSE, Operand::Jump);
        let jump = arena.alloc(JUMP_FORWARD, Operand::Jump);
        let load = arena.alloc(LOAD_CONST, Operand::Constant(Constant::None));
        let ret = arena.alloc(RETURN_VALUE, Operand::None);
        nop.set_successor(Some(test));
        test.set_successor(Some(load));
        test.set_branch_target(Some(jump));
        jump.set_branch_target(Some(ret));
        load.set_successor(Some(ret));

        let entry = optimise(&profile, nop);
        assert_eq!(RefId(entry), RefId(test));
        assert_eq!(RefId(test.branch_target().unwrap()), RefId(ret));
        assert_eq!(RefId(test.successor().unwrap()), RefId(load));
    }

    #[test]
    fn empty_loops_terminate() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        let spin = arena.alloc(JUMP_ABSOLUTE, Operand::Jump);
        spin.set_branch_target(Some(spin));
        assert_eq!(RefId(skip_trivial(&profile, spin)), RefId(spin));
        assert_eq!(RefId(optimise(&profile, spin)), RefId(spin));
    }

    #[test]
    fn remove_redirects_predecessors() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        let load = arena.alloc(LOAD_CONST, Operand::Constant(Constant::None));
        let dup = arena.alloc(DUP_TOP, Operand::None);
        let pop = arena.alloc(POP_TOP, Operand::None);
        let ret = arena.alloc(RETURN_VALUE, Operand::None);
        load.set_successor(Some(dup));
        dup.set_successor(Some(pop));
        pop.set_successor(Some(ret));

        let mut entry = load;
        let index = PredecessorIndex::build(&profile, &[entry]);
        remove(&profile, &index, &mut entry, dup).unwrap();
        assert_eq!(RefId(load.successor().unwrap()), RefId(pop));

        remove(&profile, &index, &mut entry, load).unwrap();
        assert_eq!(RefId(entry), RefId(pop));

        assert!(matches!(
            remove(&profile, &index, &mut entry, ret),
            Err(Error::GraphConsistency(GraphError::DanglingSuccessor { .. }))
        ));
    }
}
