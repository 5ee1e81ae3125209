use super::{
    CodeArena, Edge, Error, GraphError, Instruction, OpcodeFlags, Operand, PredecessorIndex,
    VersionProfile,
};
use crate::util::RefId;
use std::collections::{HashMap, HashSet};

/// Set of instructions protected by one exception handler
pub struct ExceptionRegion<'a> {
    /// Instruction which pushes the handler block (absent for regions which have been declared
    /// but not yet flattened into the graph)
    pub setup: Option<&'a Instruction<'a>>,

    /// First instruction of the handler
    pub handler: &'a Instruction<'a>,

    /// Protected instructions (including the block-exit instructions closing the region)
    pub protected: HashSet<RefId<'a, Instruction<'a>>>,
}

impl<'a> ExceptionRegion<'a> {
    pub fn contains(&self, node: &'a Instruction<'a>) -> bool {
        self.protected.contains(&RefId(node))
    }
}

/// Exception handlers of a code unit
///
/// In the code stream, handlers are only implied by setup instructions (which push a handler
/// block) and block-exit instructions (which pop it). The table makes the protected regions
/// explicit so that they survive graph edits, and so that new regions can be declared without
/// writing the setup/teardown instructions by hand.
#[derive(Default)]
pub struct ExceptionTable<'a> {
    regions: Vec<ExceptionRegion<'a>>,
}

impl<'a> ExceptionTable<'a> {
    pub fn new() -> ExceptionTable<'a> {
        ExceptionTable { regions: vec![] }
    }

    /// Rebuild regions from the setup instructions of freshly decoded code
    ///
    /// `nodes` must be bound to their offsets. Each region is flood-filled from the instruction
    /// after its setup, up to the matching block exit (nested setups are counted) and never beyond
    /// the span between the setup and the handler.
    pub fn reconstruct(profile: &VersionProfile, nodes: &[&'a Instruction<'a>]) -> ExceptionTable<'a> {
        let mut regions = vec![];

        for setup in nodes {
            if !setup.flags(profile).contains(OpcodeFlags::HANDLER_SETUP) {
                continue;
            }
            let (handler, start, end) =
                match (setup.branch_target(), setup.offset()) {
                    (Some(handler), Some(start)) => match handler.offset() {
                        Some(end) => (handler, start, end),
                        None => continue,
                    },
                    _ => continue,
                };

            let mut protected: HashSet<RefId<'a, Instruction<'a>>> = HashSet::new();
            let mut to_visit: Vec<(&'a Instruction<'a>, u32)> = setup
                .successor()
                .map(|node| (node, 0))
                .into_iter()
                .collect();

            while let Some((node, nesting)) = to_visit.pop() {
                match node.offset() {
                    Some(offset) if start < offset && offset < end => (),
                    _ => continue,
                }
                if !protected.insert(RefId(node)) {
                    continue;
                }

                let flags = node.flags(profile);
                if flags.contains(OpcodeFlags::BLOCK_EXIT) {
                    if nesting > 0 {
                        to_visit.extend(node.successor().map(|next| (next, nesting - 1)));
                    }
                } else if flags.contains(OpcodeFlags::HANDLER_SETUP) {
                    to_visit.extend(node.branch_target().map(|next| (next, nesting)));
                    to_visit.extend(node.successor().map(|next| (next, nesting + 1)));
                } else {
                    to_visit.extend(node.edges(profile).map(|(next, _)| (next, nesting)));
                }
            }

            log::trace!(
                "Handler at {} protects {} instructions",
                end,
                protected.len()
            );
            regions.push(ExceptionRegion {
                setup: Some(setup),
                handler,
                protected,
            });
        }

        ExceptionTable { regions }
    }

    pub fn regions(&self) -> &[ExceptionRegion<'a>] {
        &self.regions
    }

    /// Distinct handler entry points
    pub fn handlers(&self) -> Vec<&'a Instruction<'a>> {
        let mut seen = HashSet::new();
        self.regions
            .iter()
            .map(|region| region.handler)
            .filter(|handler| seen.insert(RefId(*handler)))
            .collect()
    }

    /// Does `handler` protect `node`?
    pub fn protects(&self, handler: &'a Instruction<'a>, node: &'a Instruction<'a>) -> bool {
        self.regions
            .iter()
            .any(|region| RefId(region.handler) == RefId(handler) && region.contains(node))
    }

    /// Innermost handler protecting `node`
    pub fn handler_for(&self, node: &'a Instruction<'a>) -> Option<&'a Instruction<'a>> {
        self.regions
            .iter()
            .filter(|region| region.contains(node))
            .min_by_key(|region| region.protected.len())
            .map(|region| region.handler)
    }

    /// Declare that `handler` protects `nodes`
    ///
    /// The setup and teardown instructions are only materialised when the code unit is encoded
    /// (see [`ExceptionTable::flatten`]).
    pub fn protect(
        &mut self,
        handler: &'a Instruction<'a>,
        nodes: impl IntoIterator<Item = &'a Instruction<'a>>,
    ) {
        self.regions.push(ExceptionRegion {
            setup: None,
            handler,
            protected: nodes.into_iter().map(RefId).collect(),
        });
    }

    /// Point regions at new handler instructions (used after rewriting the graph)
    pub fn remap_handlers(&mut self, remap: impl Fn(&'a Instruction<'a>) -> &'a Instruction<'a>) {
        for region in &mut self.regions {
            region.handler = remap(region.handler);
        }
    }

    /// Write setup and block-exit instructions for every declared region
    ///
    /// The setup instruction is inserted in front of the single entry of the region (every edge
    /// from outside the region into it is redirected), and a block-exit instruction is put on every
    /// edge leaving the region as well as in front of every return inside it. Regions with zero or
    /// several entries cannot be expressed and are rejected.
    pub fn flatten(
        &mut self,
        profile: &VersionProfile,
        arena: &'a CodeArena<'a>,
        entry: &mut &'a Instruction<'a>,
    ) -> Result<(), Error> {
        for i in 0..self.regions.len() {
            if self.regions[i].setup.is_some() {
                continue;
            }

            let mut roots = vec![*entry];
            roots.extend(self.handlers());
            let index = PredecessorIndex::build(profile, &roots);

            let region = &self.regions[i];
            let handler = region.handler;
            let members: Vec<&'a Instruction<'a>> = index
                .reachable()
                .iter()
                .copied()
                .filter(|node| region.contains(node))
                .collect();

            // Find the entry
            let entries: Vec<&'a Instruction<'a>> = members
                .iter()
                .copied()
                .filter(|node| {
                    RefId(*node) == RefId(*entry)
                        || index
                            .predecessors(node)
                            .iter()
                            .any(|(pred, _)| !region.contains(pred))
                })
                .collect();
            let first = match entries.as_slice() {
                [first] => *first,
                _ => {
                    return Err(Error::GraphConsistency(GraphError::RegionEntry {
                        entries: entries.len(),
                    }))
                }
            };

            let setup = arena.alloc(profile.handler_setup, Operand::Jump);
            setup.set_branch_target(Some(handler));
            setup.set_successor(Some(first));
            setup.set_position(first.position());

            let outside_preds: Vec<(&'a Instruction<'a>, Edge)> = index
                .predecessors(first)
                .iter()
                .copied()
                .filter(|(pred, _)| !region.contains(pred))
                .collect();
            for (pred, edge) in &outside_preds {
                redirect(pred, *edge, setup);
            }
            if RefId(first) == RefId(*entry) {
                *entry = setup;
            }

            // Close the region on every way out
            let mut exits: HashMap<RefId<'a, Instruction<'a>>, &'a Instruction<'a>> =
                HashMap::new();
            let mut added: Vec<(&'a Instruction<'a>, &'a Instruction<'a>)> = vec![];
            for node in &members {
                let flags = node.flags(profile);
                if flags.contains(OpcodeFlags::RETURNS) {
                    let ret = node.copy(arena);
                    ret.set_successor(None);
                    ret.set_branch_target(None);
                    node.set_opcode(profile.block_exit);
                    node.set_operand(Operand::None);
                    node.set_successor(Some(ret));
                    node.set_branch_target(None);
                    added.push((node, ret));
                    continue;
                }

                let edges: Vec<_> = node.edges(profile).collect();
                for (next, edge) in edges {
                    if region.contains(next)
                        || (edge == Edge::Branch && flags.contains(OpcodeFlags::HANDLER_SETUP))
                    {
                        continue;
                    }
                    let exit = *exits.entry(RefId(next)).or_insert_with(|| {
                        let exit = arena.alloc(profile.block_exit, Operand::None);
                        exit.set_successor(Some(next));
                        exit.set_position(node.position());
                        exit
                    });
                    redirect(node, edge, exit);
                    added.push((node, exit));
                }
            }
            log::debug!(
                "Flattened exception region with {} instructions ({} exits)",
                members.len(),
                exits.len()
            );

            // Keep enclosing declared regions consistent with the new instructions
            for (j, other) in self.regions.iter_mut().enumerate() {
                if j == i || other.setup.is_some() {
                    continue;
                }
                if outside_preds.iter().any(|(pred, _)| other.contains(pred)) {
                    other.protected.insert(RefId(setup));
                }
                for (source, node) in &added {
                    if other.contains(source) {
                        other.protected.insert(RefId(*node));
                    }
                }
            }

            let region = &mut self.regions[i];
            region.setup = Some(setup);
            for exit in exits.values() {
                region.protected.insert(RefId(*exit));
            }
        }
        Ok(())
    }
}

/// Point one edge of `node` at `target`
fn redirect<'a>(node: &'a Instruction<'a>, edge: Edge, target: &'a Instruction<'a>) {
    match edge {
        Edge::Fallthrough => node.set_successor(Some(target)),
        Edge::Branch => node.set_branch_target(Some(target)),
    }
}
