//! Flatten the instruction graph into one ordered sequence
//!
//! ### Reachability
//!
//! Every node reachable from the entry or from an exception handler ends up in the output exactly
//! once. Nodes are discovered with an explicit-stack depth-first walk that only follows edges that
//! can actually be taken (see [`Instruction::edges`]), which is also where dangling edits are
//! caught: a node that can fall through must have a successor and a jump must have a target.
//!
//! ### Layout
//!
//! The sequence is built out of fall-through chains. The chain starting at the entry comes first,
//! then chains are started from the remaining nodes in order of the offset they had in the last
//! linearised form (nodes that never had one come last, in discovery order). Following the
//! previous offsets means that unedited code comes out in exactly its original order.
//!
//! ### Fixups
//!
//! Two things can still be wrong with a chain-based layout, and both are repaired with extra
//! unconditional jumps:
//!
//!   - a node which falls through may not be followed by its successor (the successor was already
//!     placed in another chain), in which case a jump to the successor is spliced right after it
//!
//!   - a relative jump which can only go in one direction may have its target on the wrong side,
//!     in which case it is pointed at an absolute jump appended to the end of the code
//!
//! ```text,ignore,no_run
//!     for_iter L1                 for_iter T
//!     ...                         ...
//! L1: ...              =>     L1: ...
//!                                 ...
//!                             T:  jump_absolute L1
//! ```

use super::{CodeArena, Error, GraphError, Instruction, OpcodeFlags, Operand, VersionProfile};
use crate::util::RefId;
use std::collections::{HashMap, HashSet};

/// Every node reachable from `roots`, in depth-first discovery order
///
/// Fails on nodes with missing edges.
pub fn reachable<'a>(
    profile: &VersionProfile,
    roots: &[&'a Instruction<'a>],
) -> Result<Vec<&'a Instruction<'a>>, Error> {
    let mut visited: HashSet<RefId<'a, Instruction<'a>>> = HashSet::new();
    let mut discovered = vec![];
    let mut to_visit: Vec<&'a Instruction<'a>> = roots.iter().rev().copied().collect();

    while let Some(node) = to_visit.pop() {
        if !visited.insert(RefId(node)) {
            continue;
        }
        discovered.push(node);

        let flags = node.flags(profile);
        if flags.falls_through() && node.successor().is_none() {
            return Err(Error::GraphConsistency(GraphError::DanglingSuccessor {
                opcode: node.opcode(),
                offset: node.offset(),
            }));
        }
        if flags.is_jump() && node.branch_target().is_none() {
            return Err(Error::GraphConsistency(GraphError::MissingBranchTarget {
                opcode: node.opcode(),
                offset: node.offset(),
            }));
        }

        let edges: Vec<_> = node.edges(profile).collect();
        to_visit.extend(edges.into_iter().rev().map(|(next, _)| next));
    }

    Ok(discovered)
}

/// Lay out every node reachable from `entry` and `handlers`
///
/// New jump nodes are allocated in `arena` where needed. The returned nodes are bound to
/// provisional offsets (the extended-argument prefixes are only accounted for when encoding).
pub fn linearize<'a>(
    profile: &VersionProfile,
    arena: &'a CodeArena<'a>,
    entry: &'a Instruction<'a>,
    handlers: &[&'a Instruction<'a>],
) -> Result<Vec<&'a Instruction<'a>>, Error> {
    let mut roots = vec![entry];
    roots.extend(handlers.iter().copied());
    let discovered = reachable(profile, &roots)?;

    // Chain starts, by previous offset then by discovery
    let mut starts: Vec<(usize, &'a Instruction<'a>)> =
        discovered.iter().copied().enumerate().collect();
    starts.sort_by_key(|(discovery, node)| (node.offset().unwrap_or(usize::MAX), *discovery));

    let mut placed: HashSet<RefId<'a, Instruction<'a>>> = HashSet::new();
    let mut order: Vec<&'a Instruction<'a>> = Vec::with_capacity(discovered.len());
    let chain_heads = std::iter::once(entry).chain(starts.into_iter().map(|(_, node)| node));
    for head in chain_heads {
        let mut next = Some(head);
        while let Some(node) = next {
            if !placed.insert(RefId(node)) {
                break;
            }
            order.push(node);
            next = if node.falls_through(profile) {
                node.successor()
            } else {
                None
            };
        }
    }

    let order = insert_fallthrough_jumps(profile, arena, order);
    let order = insert_trampolines(profile, arena, order);

    for (index, node) in order.iter().enumerate() {
        node.set_offset(Some(index * 2));
    }
    log::debug!(
        "Linearised {} reachable instructions into {} slots",
        discovered.len(),
        order.len()
    );
    Ok(order)
}

fn insert_fallthrough_jumps<'a>(
    profile: &VersionProfile,
    arena: &'a CodeArena<'a>,
    order: Vec<&'a Instruction<'a>>,
) -> Vec<&'a Instruction<'a>> {
    let index: HashMap<RefId<'a, Instruction<'a>>, usize> = order
        .iter()
        .enumerate()
        .map(|(i, node)| (RefId(*node), i))
        .collect();

    let mut fixed = Vec::with_capacity(order.len());
    for (i, node) in order.iter().copied().enumerate() {
        fixed.push(node);
        if !node.falls_through(profile) {
            continue;
        }
        let successor = match node.successor() {
            Some(successor) => successor,
            None => continue,
        };
        let target = index[&RefId(successor)];
        if target == i + 1 {
            continue;
        }

        let opcode = if target > i {
            profile.jump_forward
        } else {
            profile.jump_absolute
        };
        let jump = arena.alloc(opcode, Operand::Jump);
        jump.set_branch_target(Some(successor));
        jump.set_position(node.position());
        node.set_successor(Some(jump));
        log::trace!("Inserted jump after {:?} to reach its successor", node);
        fixed.push(jump);
    }
    fixed
}

fn insert_trampolines<'a>(
    profile: &VersionProfile,
    arena: &'a CodeArena<'a>,
    mut order: Vec<&'a Instruction<'a>>,
) -> Vec<&'a Instruction<'a>> {
    let index: HashMap<RefId<'a, Instruction<'a>>, usize> = order
        .iter()
        .enumerate()
        .map(|(i, node)| (RefId(*node), i))
        .collect();

    let mut trampolines = vec![];
    for (i, node) in order.iter().enumerate() {
        let flags = node.flags(profile);
        if !flags.contains(OpcodeFlags::JUMP_RELATIVE) {
            continue;
        }
        let target = match node.branch_target() {
            Some(target) => target,
            None => continue,
        };
        let target_index = index[&RefId(target)];
        let wrong_way = if flags.contains(OpcodeFlags::JUMP_BACKWARD) {
            target_index > i
        } else {
            target_index <= i
        };
        if !wrong_way {
            continue;
        }

        let trampoline = arena.alloc(profile.jump_absolute, Operand::Jump);
        trampoline.set_branch_target(Some(target));
        trampoline.set_position(node.position());
        node.set_branch_target(Some(trampoline));
        trampolines.push(trampoline);
    }
    if !trampolines.is_empty() {
        log::debug!("Added {} jump trampolines", trampolines.len());
    }
    order.extend(trampolines);
    order
}
