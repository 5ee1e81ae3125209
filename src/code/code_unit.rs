use super::{
    assemble, encode_lines, max_stack_depth, optimise, remove, skip_trivial, trace_consumer,
    trace_producer, CodeArena, CodeHeader, ConsumerTrace, EncodeStats, Error, ExceptionTable,
    Instruction, Listing, Pools, PredecessorIndex, ProducerTrace, RawCode, VersionProfile,
};

/// One function being edited: its instruction graph along with everything needed to encode it
/// back into a raw code object
///
/// A code unit is meant to be driven by a single assembly session. Different code units share
/// nothing mutable (the profile is only ever read), so they can be processed independently.
pub struct CodeUnit<'a> {
    pub profile: &'a VersionProfile,
    pub arena: &'a CodeArena<'a>,

    /// First instruction executed
    pub entry: &'a Instruction<'a>,

    /// Pools the code was decoded with (or last encoded into)
    pub pools: Pools,

    pub header: CodeHeader,
    pub exceptions: ExceptionTable<'a>,

    /// Lazily built, dropped whenever this code unit edits its own graph
    predecessors: Option<PredecessorIndex<'a>>,
}

impl<'a> CodeUnit<'a> {
    pub fn new(
        profile: &'a VersionProfile,
        arena: &'a CodeArena<'a>,
        entry: &'a Instruction<'a>,
        pools: Pools,
        header: CodeHeader,
    ) -> CodeUnit<'a> {
        CodeUnit {
            profile,
            arena,
            entry,
            pools,
            header,
            exceptions: ExceptionTable::new(),
            predecessors: None,
        }
    }

    /// Entry and exception handlers
    pub fn roots(&self) -> Vec<&'a Instruction<'a>> {
        let mut roots = vec![self.entry];
        roots.extend(self.exceptions.handlers());
        roots
    }

    /// Recompute the predecessor index from the current graph
    ///
    /// Edits made directly on nodes are not tracked, so this must be called after them before
    /// running any backwards query.
    pub fn rebuild_predecessors(&mut self) -> &PredecessorIndex<'a> {
        let index = PredecessorIndex::build(self.profile, &self.roots());
        self.predecessors.insert(index)
    }

    /// Predecessor index (built on first use)
    pub fn predecessors(&mut self) -> &PredecessorIndex<'a> {
        let profile = self.profile;
        let roots = self.roots();
        self.predecessors
            .get_or_insert_with(|| PredecessorIndex::build(profile, &roots))
    }

    /// Instructions that could have produced the value `depth` slots below the top of the stack
    /// right before `instruction` runs
    pub fn trace_producer(
        &mut self,
        instruction: &'a Instruction<'a>,
        depth: u32,
    ) -> ProducerTrace<'_, 'a> {
        let profile = self.profile;
        trace_producer(profile, self.predecessors(), instruction, depth)
    }

    /// Instructions that could consume the value `depth` slots below the top of the stack right
    /// after `instruction` runs
    pub fn trace_consumer(&self, instruction: &'a Instruction<'a>, depth: u32) -> ConsumerTrace<'_, 'a> {
        trace_consumer(self.profile, instruction, depth)
    }

    /// Inline unconditional jumps and drop no-ops (see [`optimise`])
    pub fn optimise(&mut self) {
        let profile = self.profile;
        for handler in self.exceptions.handlers() {
            optimise(profile, handler);
        }
        self.entry = optimise(profile, self.entry);
        self.exceptions
            .remap_handlers(|handler| skip_trivial(profile, handler));
        self.predecessors = None;
    }

    /// Take an instruction out of the graph (see [`remove`])
    pub fn remove(&mut self, node: &'a Instruction<'a>) -> Result<(), Error> {
        let profile = self.profile;
        let mut entry = self.entry;
        remove(profile, self.predecessors(), &mut entry, node)?;
        self.entry = entry;
        self.predecessors = None;
        Ok(())
    }

    /// Copy a fragment of another code unit's graph into this one's arena
    ///
    /// The copy has no pool indices: its operands are interned into this unit's pools when it is
    /// encoded. The caller is responsible for wiring the returned node into the graph.
    pub fn import_fragment<'b>(&self, fragment: &'b Instruction<'b>) -> &'a Instruction<'a> {
        fragment.copy_into(self.arena)
    }

    /// Listing of the current graph
    pub fn listing(&self) -> Listing<'a, 'a> {
        Listing::new(self.profile, &self.roots())
    }

    /// Encode the graph into a raw code object
    ///
    /// This writes the setup and teardown instructions of declared exception regions, lays the
    /// graph out (which may add jumps), and binds every node to its final offset and pool index.
    /// The pools of the code unit are replaced by the final pools.
    pub fn encode(&mut self) -> Result<(RawCode, EncodeStats), Error> {
        let profile = self.profile;
        self.predecessors = None;
        self.exceptions.flatten(profile, self.arena, &mut self.entry)?;

        let handlers = self.exceptions.handlers();
        let assembled = assemble(profile, self.arena, self.entry, &handlers, &self.pools)?;

        let total_units = assembled.total_units();
        let runs = assembled
            .layout
            .iter()
            .zip(&assembled.units)
            .map(|(node, unit)| (*unit, node.position().map(|position| position.line)));
        let line_table = encode_lines(
            profile.line_table,
            self.header.firstlineno,
            runs,
            total_units,
        )?;

        let mut header = self.header.clone();
        match max_stack_depth(profile, &[self.entry]) {
            Some(depth) => header.stacksize = header.stacksize.max(depth),
            None => log::debug!("Stack depth of '{}' could not be computed", header.name),
        }
        header.nlocals = assembled.pools.locals.len() as u32;

        log::debug!(
            "Encoded '{}' into {} bytes ({} relaxation iterations, {} prefixes added)",
            header.name,
            assembled.code.len(),
            assembled.stats.iterations,
            assembled.stats.inserted_prefixes
        );
        self.pools = assembled.pools.clone();
        self.header = header.clone();

        let raw = RawCode {
            header,
            code: assembled.code,
            pools: assembled.pools,
            line_table,
        };
        Ok((raw, assembled.stats))
    }
}
