//! Stack dataflow over the instruction graph
//!
//! The queries here answer "which instruction put this value on the stack" and the dual "which
//! instructions will take this value off the stack". Both are driven purely by the per-opcode
//! stack effect table: walking backwards over an instruction that pushed `p` values and popped `q`
//! values, the value at depth `d` (counted from the top) is either one of the pushed values (when
//! `d < p`) or was at depth `d - p + q` before the instruction ran.
//!
//! Values pushed by `dup`/`rot` style instructions are copies. Such an instruction is reported as
//! a producer (or consumer) of the value, and the walk also continues through it to where the
//! copied value came from (or goes to), see [`StackEffect::extra_walk_depth`].
//!
//! All walks are lazy worklist iterators with visited sets. Walking off the start of the code or
//! across an instruction whose effect is unknown just ends that path: an empty answer means the
//! provenance is unknown, it is not an error.

use super::{Edge, Instruction, VersionProfile};
use crate::util::RefId;
use std::collections::{HashMap, HashSet};

/// Depth past which a walk is assumed to be going around an unbalanced loop
const DEPTH_LIMIT: u32 = 1 << 16;

/// Back edges of the graph reachable from a set of roots
///
/// This is a snapshot: it is never updated when the graph is edited, and it must be rebuilt
/// before being trusted again.
pub struct PredecessorIndex<'a> {
    predecessors: HashMap<RefId<'a, Instruction<'a>>, Vec<(&'a Instruction<'a>, Edge)>>,
    reachable: Vec<&'a Instruction<'a>>,
}

impl<'a> PredecessorIndex<'a> {
    /// Walk everything reachable from `roots` and record the inverse of every edge
    pub fn build(profile: &VersionProfile, roots: &[&'a Instruction<'a>]) -> PredecessorIndex<'a> {
        let mut predecessors: HashMap<RefId<'a, Instruction<'a>>, Vec<(&'a Instruction<'a>, Edge)>> =
            HashMap::new();
        let mut reachable = vec![];
        let mut visited: HashSet<RefId<'a, Instruction<'a>>> = HashSet::new();
        let mut to_visit: Vec<&'a Instruction<'a>> = roots.iter().rev().copied().collect();

        while let Some(node) = to_visit.pop() {
            if !visited.insert(RefId(node)) {
                continue;
            }
            reachable.push(node);
            predecessors.entry(RefId(node)).or_insert_with(Vec::new);

            let edges: Vec<_> = node.edges(profile).collect();
            for (next, edge) in edges.iter().rev() {
                predecessors
                    .entry(RefId(*next))
                    .or_insert_with(Vec::new)
                    .push((node, *edge));
                to_visit.push(*next);
            }
        }

        // Keep predecessor lists in discovery order
        let order: HashMap<RefId<'a, Instruction<'a>>, usize> = reachable
            .iter()
            .enumerate()
            .map(|(i, node)| (RefId(*node), i))
            .collect();
        for preds in predecessors.values_mut() {
            preds.sort_by_key(|(node, edge)| (order[&RefId(*node)], *edge == Edge::Branch));
        }

        PredecessorIndex {
            predecessors,
            reachable,
        }
    }

    /// Nodes with an edge into `node`, and which of their edges it is
    pub fn predecessors(&self, node: &'a Instruction<'a>) -> &[(&'a Instruction<'a>, Edge)] {
        self.predecessors
            .get(&RefId(node))
            .map(|preds| preds.as_slice())
            .unwrap_or(&[])
    }

    /// Was `node` reachable when the index was built?
    pub fn contains(&self, node: &'a Instruction<'a>) -> bool {
        self.predecessors.contains_key(&RefId(node))
    }

    /// Every reachable node, in depth-first discovery order
    pub fn reachable(&self) -> &[&'a Instruction<'a>] {
        &self.reachable
    }
}

/// Lazily walk backwards to the instructions that could have produced a stack value
///
/// The value is the one `depth` slots below the top of the stack just before `instruction` runs.
/// Joins in the control flow yield one producer per incoming path (in no particular order).
pub fn trace_producer<'p, 'a>(
    profile: &'p VersionProfile,
    index: &'p PredecessorIndex<'a>,
    instruction: &'a Instruction<'a>,
    depth: u32,
) -> ProducerTrace<'p, 'a> {
    let mut trace = ProducerTrace {
        profile,
        index,
        worklist: vec![],
        visited: HashSet::new(),
        yielded: HashSet::new(),
    };
    trace.enqueue_predecessors(instruction, depth);
    trace
}

pub struct ProducerTrace<'p, 'a> {
    profile: &'p VersionProfile,
    index: &'p PredecessorIndex<'a>,

    /// Node, edge out of that node, and depth of the value right after the node along that edge
    worklist: Vec<(&'a Instruction<'a>, Edge, u32)>,
    visited: HashSet<(RefId<'a, Instruction<'a>>, Edge, u32)>,
    yielded: HashSet<RefId<'a, Instruction<'a>>>,
}

impl<'p, 'a> ProducerTrace<'p, 'a> {
    fn enqueue_predecessors(&mut self, node: &'a Instruction<'a>, depth: u32) {
        if depth > DEPTH_LIMIT {
            return;
        }
        for (pred, edge) in self.index.predecessors(node).iter().rev() {
            self.worklist.push((*pred, *edge, depth));
        }
    }
}

impl<'p, 'a> Iterator for ProducerTrace<'p, 'a> {
    type Item = &'a Instruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, edge, depth)) = self.worklist.pop() {
            if !self.visited.insert((RefId(node), edge, depth)) {
                continue;
            }
            let effect = match node.stack_effect(self.profile, edge) {
                Some(effect) => effect,
                None => continue,
            };

            if depth < effect.pushed {
                // Copies are producers too, but the value they copy keeps going further back
                if let Some(source) = effect.extra_walk_depth(depth) {
                    self.enqueue_predecessors(node, source);
                }
                if self.yielded.insert(RefId(node)) {
                    return Some(node);
                }
            } else {
                let below = depth - effect.pushed;
                self.enqueue_predecessors(node, below.saturating_add(effect.popped));
            }
        }
        None
    }
}

/// Lazily walk forwards to the instructions that could consume a stack value
///
/// The value is the one `depth` slots below the top of the stack just after `instruction` has run
/// (along each of its outgoing edges). Instructions that copy or reorder the value are reported,
/// and the walk carries on to the consumers of the copies.
pub fn trace_consumer<'p, 'a>(
    profile: &'p VersionProfile,
    instruction: &'a Instruction<'a>,
    depth: u32,
) -> ConsumerTrace<'p, 'a> {
    let worklist = instruction
        .edges(profile)
        .map(|(next, _)| (next, depth))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    ConsumerTrace {
        profile,
        worklist,
        visited: HashSet::new(),
        yielded: HashSet::new(),
    }
}

pub struct ConsumerTrace<'p, 'a> {
    profile: &'p VersionProfile,

    /// Node, and depth of the value right before that node runs
    worklist: Vec<(&'a Instruction<'a>, u32)>,
    visited: HashSet<(RefId<'a, Instruction<'a>>, u32)>,
    yielded: HashSet<RefId<'a, Instruction<'a>>>,
}

impl<'p, 'a> Iterator for ConsumerTrace<'p, 'a> {
    type Item = &'a Instruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, depth)) = self.worklist.pop() {
            if depth > DEPTH_LIMIT || !self.visited.insert((RefId(node), depth)) {
                continue;
            }

            let edges: Vec<_> = node.edges(self.profile).collect();
            let mut consumed = false;

            if edges.is_empty() {
                // Instructions that end the flow still consume their inputs
                if let Some(effect) = node.stack_effect(self.profile, Edge::Fallthrough) {
                    consumed = depth < effect.popped;
                }
            }

            let mut next_nodes = vec![];
            for (next, edge) in edges {
                let effect = match node.stack_effect(self.profile, edge) {
                    Some(effect) => effect,
                    None => continue,
                };
                if depth < effect.popped {
                    consumed = true;
                    for out in effect.forwarded_to(depth) {
                        next_nodes.push((next, out));
                    }
                } else {
                    next_nodes.push((next, depth - effect.popped + effect.pushed));
                }
            }
            self.worklist.extend(next_nodes.into_iter().rev());

            if consumed && self.yielded.insert(RefId(node)) {
                return Some(node);
            }
        }
        None
    }
}

/// Producers of every value `instruction` pops, from the top of the stack down
///
/// Instructions with an unknown stack effect have no known operands.
pub fn operand_producers<'a>(
    profile: &VersionProfile,
    index: &PredecessorIndex<'a>,
    instruction: &'a Instruction<'a>,
) -> Vec<Vec<&'a Instruction<'a>>> {
    let popped = match instruction.stack_effect(profile, Edge::Fallthrough) {
        Some(effect) => effect.popped,
        None => return vec![],
    };
    (0..popped)
        .map(|depth| trace_producer(profile, index, instruction, depth).collect())
        .collect()
}

/// Maximum stack depth reached when running from any of `roots` (each starting with an empty
/// stack)
///
/// Returns `None` if some reachable instruction has an unknown effect or would pop from an empty
/// stack.
pub fn max_stack_depth<'a>(profile: &VersionProfile, roots: &[&'a Instruction<'a>]) -> Option<u32> {
    let mut depths: HashMap<RefId<'a, Instruction<'a>>, u32> = HashMap::new();
    let mut worklist: Vec<(&'a Instruction<'a>, u32)> = roots.iter().map(|root| (*root, 0)).collect();
    let mut max_depth = 0;

    while let Some((node, depth)) = worklist.pop() {
        match depths.get(&RefId(node)) {
            Some(seen) if *seen >= depth => continue,
            _ => {
                depths.insert(RefId(node), depth);
            }
        }
        if depth > DEPTH_LIMIT {
            log::debug!("Stack depth keeps growing around a loop, giving up");
            return None;
        }
        max_depth = max_depth.max(depth);

        let mut has_edges = false;
        for (next, edge) in node.edges(profile) {
            has_edges = true;
            let effect = node.stack_effect(profile, edge)?;
            if depth < effect.popped {
                return None;
            }
            let after = depth - effect.popped + effect.pushed;
            max_depth = max_depth.max(after);
            worklist.push((next, after));
        }
        if !has_edges {
            let effect = node.stack_effect(profile, Edge::Fallthrough)?;
            if depth < effect.popped {
                return None;
            }
        }
    }

    Some(max_depth)
}
