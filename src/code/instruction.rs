use super::{
    Constant, Edge, Error, GraphError, Opcode, OpcodeFlags, OperandKind, StackEffect,
    VersionProfile,
};
use crate::util::RefId;
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use typed_arena::Arena;

/// Owner of every instruction node of an assembly session
///
/// Nodes point at each other with plain shared references (the graph is cyclic as soon as there
/// is a loop), so they all need to live exactly as long as the arena.
pub struct CodeArena<'a> {
    instructions: Arena<Instruction<'a>>,
}

impl<'a> CodeArena<'a> {
    pub fn new() -> Self {
        CodeArena {
            instructions: Arena::new(),
        }
    }

    /// Allocate a fresh unbound node with no edges
    pub fn alloc(&'a self, opcode: Opcode, operand: Operand) -> &'a Instruction<'a> {
        self.instructions.alloc(Instruction::new(opcode, operand))
    }

    /// Move an already built node into the arena
    pub fn alloc_instruction(&'a self, instruction: Instruction<'a>) -> &'a Instruction<'a> {
        self.instructions.alloc(instruction)
    }

    /// Number of nodes ever allocated (including unreachable ones)
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> Default for CodeArena<'a> {
    fn default() -> Self {
        CodeArena::new()
    }
}

/// Source location of an instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: u32,
    pub column: Option<u32>,
}

impl SourcePosition {
    pub fn line(line: u32) -> SourcePosition {
        SourcePosition { line, column: None }
    }
}

/// Resolved operand of an instruction
///
/// Pool operands hold the pool _entry_ rather than an index, so that a node can be moved into
/// another code unit (or have its pools rebuilt) and get re-resolved on encode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    None,
    Raw(u32),
    Constant(Constant),
    Name(String),
    Local(String),
    Cell(String),

    /// The operand is computed from the branch target when encoding
    Jump,
}

impl Operand {
    /// Kind of operand this is (jumps are reported as absolute)
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Raw(_) => OperandKind::Raw,
            Operand::Constant(_) => OperandKind::Constant,
            Operand::Name(_) => OperandKind::Name,
            Operand::Local(_) => OperandKind::Local,
            Operand::Cell(_) => OperandKind::Cell,
            Operand::Jump => OperandKind::AbsoluteJump,
        }
    }

    /// Can this operand be carried by an opcode expecting `kind`?
    pub fn fits(&self, kind: OperandKind) -> bool {
        match self {
            Operand::Jump => kind.is_jump(),
            _ => self.kind() == kind,
        }
    }

    /// Value used when the stack effect depends on the operand
    pub fn raw_value(&self) -> u32 {
        match self {
            Operand::Raw(value) => *value,
            _ => 0,
        }
    }
}

/// One node of the instruction graph
///
/// Identity is reference identity (see [`RefId`]): two nodes with the same contents are still
/// different instructions. Everything is behind cells so that the graph can be rewired through
/// shared references.
pub struct Instruction<'a> {
    opcode: Cell<Opcode>,
    operand: RefCell<Operand>,

    /// Flag bits packed next to the pool index (see [`crate::code::OperandQuirk`])
    operand_flags: Cell<u32>,

    /// Index the operand had in the pool it was decoded from or last encoded into
    pool_hint: Cell<Option<u32>>,

    /// Byte offset in the last linearised form (negative when never bound)
    offset: Cell<isize>,

    position: Cell<Option<SourcePosition>>,
    successor: Cell<Option<&'a Instruction<'a>>>,
    branch_target: Cell<Option<&'a Instruction<'a>>>,
}

impl<'a> Instruction<'a> {
    /// New unbound node, with no edges
    pub fn new(opcode: Opcode, operand: Operand) -> Instruction<'a> {
        Instruction {
            opcode: Cell::new(opcode),
            operand: RefCell::new(operand),
            operand_flags: Cell::new(0),
            pool_hint: Cell::new(None),
            offset: Cell::new(-1),
            position: Cell::new(None),
            successor: Cell::new(None),
            branch_target: Cell::new(None),
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode.get()
    }

    pub fn operand(&self) -> Ref<'_, Operand> {
        self.operand.borrow()
    }

    pub fn operand_flags(&self) -> u32 {
        self.operand_flags.get()
    }

    pub fn pool_hint(&self) -> Option<u32> {
        self.pool_hint.get()
    }

    /// Offset in the last linearised form, or `None` for nodes that were never bound
    pub fn offset(&self) -> Option<usize> {
        let offset = self.offset.get();
        if offset < 0 {
            None
        } else {
            Some(offset as usize)
        }
    }

    pub fn position(&self) -> Option<SourcePosition> {
        self.position.get()
    }

    pub fn successor(&self) -> Option<&'a Instruction<'a>> {
        self.successor.get()
    }

    pub fn branch_target(&self) -> Option<&'a Instruction<'a>> {
        self.branch_target.get()
    }

    pub fn set_opcode(&self, opcode: Opcode) {
        self.opcode.set(opcode);
    }

    /// Replace the operand (this forgets any pool index the old operand had)
    pub fn set_operand(&self, operand: Operand) {
        *self.operand.borrow_mut() = operand;
        self.pool_hint.set(None);
    }

    pub fn set_operand_flags(&self, flags: u32) {
        self.operand_flags.set(flags);
    }

    pub(crate) fn set_pool_hint(&self, hint: Option<u32>) {
        self.pool_hint.set(hint);
    }

    pub(crate) fn set_offset(&self, offset: Option<usize>) {
        self.offset.set(offset.map_or(-1, |offset| offset as isize));
    }

    pub fn set_position(&self, position: Option<SourcePosition>) {
        self.position.set(position);
    }

    pub fn set_successor(&self, successor: Option<&'a Instruction<'a>>) {
        self.successor.set(successor);
    }

    pub fn set_branch_target(&self, target: Option<&'a Instruction<'a>>) {
        self.branch_target.set(target);
    }

    pub fn flags(&self, profile: &VersionProfile) -> OpcodeFlags {
        profile.flags(self.opcode())
    }

    /// Can execution continue along the successor edge?
    pub fn falls_through(&self, profile: &VersionProfile) -> bool {
        self.flags(profile).falls_through()
    }

    pub fn is_jump(&self, profile: &VersionProfile) -> bool {
        self.flags(profile).is_jump()
    }

    /// Is this an extended-argument prefix placeholder?
    pub fn is_prefix(&self, profile: &VersionProfile) -> bool {
        self.flags(profile).contains(OpcodeFlags::EXTENDED_ARG)
    }

    /// Stack effect of this instruction when leaving along `edge`
    pub fn stack_effect(&self, profile: &VersionProfile, edge: Edge) -> Option<StackEffect> {
        profile.stack_effect(self.opcode(), self.operand().raw_value(), edge)
    }

    /// Outgoing control flow edges
    ///
    /// Successor edges of nodes that never fall through, and branch edges of nodes that are not
    /// jumps, are ignored.
    pub fn edges(
        &self,
        profile: &VersionProfile,
    ) -> impl Iterator<Item = (&'a Instruction<'a>, Edge)> {
        let flags = self.flags(profile);
        let successor = if flags.falls_through() {
            self.successor()
        } else {
            None
        };
        let branch = if flags.is_jump() {
            self.branch_target()
        } else {
            None
        };
        successor
            .map(|node| (node, Edge::Fallthrough))
            .into_iter()
            .chain(branch.map(|node| (node, Edge::Branch)))
    }

    /// Splice a straight-line sequence of nodes between this node and its successor
    pub fn insert_after(
        &'a self,
        profile: &VersionProfile,
        nodes: &[&'a Instruction<'a>],
    ) -> Result<(), Error> {
        if !self.falls_through(profile) {
            return Err(Error::GraphConsistency(GraphError::InsertAfterTerminal {
                opcode: self.opcode(),
            }));
        }
        let (first, last) = match (nodes.first(), nodes.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(()),
        };
        for pair in nodes.windows(2) {
            if !pair[0].falls_through(profile) {
                return Err(Error::GraphConsistency(GraphError::InsertAfterTerminal {
                    opcode: pair[0].opcode(),
                }));
            }
            pair[0].set_successor(Some(pair[1]));
        }
        if last.falls_through(profile) {
            last.set_successor(self.successor());
        }
        self.set_successor(Some(first));
        Ok(())
    }

    /// Node with the same contents and outgoing edges (the copy is unbound)
    fn duplicate<'b>(&self) -> Instruction<'b> {
        let copy = Instruction::new(self.opcode(), self.operand().clone());
        copy.operand_flags.set(self.operand_flags());
        copy.pool_hint.set(self.pool_hint());
        copy.position.set(self.position());
        copy
    }

    /// Shallow copy: same contents, same outgoing edges
    pub fn copy(&self, arena: &'a CodeArena<'a>) -> &'a Instruction<'a> {
        let copy = arena.alloc_instruction(self.duplicate());
        copy.set_successor(self.successor());
        copy.set_branch_target(self.branch_target());
        copy
    }

    /// Copy the whole subgraph reachable from this node, remapping edges to the copies
    ///
    /// Returns the copy of `self`.
    pub fn copy_deep(&'a self, arena: &'a CodeArena<'a>) -> &'a Instruction<'a> {
        self.copy_subgraph(arena, true)
    }

    /// Copy the whole subgraph reachable from this node into another arena
    ///
    /// Pool index hints are dropped: they only make sense relative to the pools of the code unit
    /// the nodes came from.
    pub fn copy_into<'b>(&'a self, arena: &'b CodeArena<'b>) -> &'b Instruction<'b> {
        self.copy_subgraph(arena, false)
    }

    fn copy_subgraph<'b>(&'a self, arena: &'b CodeArena<'b>, keep_hints: bool) -> &'b Instruction<'b> {
        let mut copies: HashMap<RefId<'a, Instruction<'a>>, &'b Instruction<'b>> = HashMap::new();
        let mut originals: Vec<&'a Instruction<'a>> = vec![];
        let mut to_visit: Vec<&'a Instruction<'a>> = vec![self];

        while let Some(node) = to_visit.pop() {
            if copies.contains_key(&RefId(node)) {
                continue;
            }
            let copy = arena.alloc_instruction(node.duplicate());
            if !keep_hints {
                copy.pool_hint.set(None);
            }
            copies.insert(RefId(node), copy);
            originals.push(node);
            to_visit.extend(node.branch_target());
            to_visit.extend(node.successor());
        }

        for original in originals {
            let copy = copies[&RefId(original)];
            copy.set_successor(original.successor().map(|node| copies[&RefId(node)]));
            copy.set_branch_target(original.branch_target().map(|node| copies[&RefId(node)]));
        }

        copies[&RefId(self)]
    }
}

impl<'a> fmt::Debug for Instruction<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("opcode", &self.opcode())
            .field("operand", &*self.operand())
            .field("offset", &self.offset())
            .field("position", &self.position())
            .finish()
    }
}
