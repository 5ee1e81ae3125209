use super::{
    linearize, relax, CellRef, CodeArena, Error, Instruction, Operand, Pools,
    PoolsBuilder, Serialize, VersionProfile, Word,
};

/// Counters describing one assembly
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// Relaxation iterations needed to reach a fixed point
    pub iterations: usize,

    /// Extended-argument prefixes that had to be added on top of the reserved ones
    pub inserted_prefixes: usize,
}

/// Output of [`assemble`]
pub struct Assembled<'a> {
    pub code: Vec<u8>,
    pub pools: Pools,

    /// Nodes in the order they were laid out (including prefix placeholders)
    pub layout: Vec<&'a Instruction<'a>>,

    /// First code unit attributed to each node of the layout
    pub units: Vec<usize>,

    pub stats: EncodeStats,
}

impl<'a> Assembled<'a> {
    /// Length of the code in code units
    pub fn total_units(&self) -> usize {
        self.code.len() / Word::WIDTH
    }
}

/// Operand value waiting for the pools to be complete
enum PendingArgument {
    Ready(u32),

    /// Pool index to be combined with the operand flags
    Pooled(u32, u32),

    /// Cell indices shift when new cell variables are added
    Cell(CellRef, u32),
}

/// Linearise the graph and turn it into a code stream
///
/// Pools are seeded with `pools`: entries that are still used keep their index and new entries are
/// appended. Every node in the layout ends up bound to its final offset and, for pool operands, to
/// its final pool index.
pub fn assemble<'a>(
    profile: &VersionProfile,
    arena: &'a CodeArena<'a>,
    entry: &'a Instruction<'a>,
    handlers: &[&'a Instruction<'a>],
    pools: &Pools,
) -> Result<Assembled<'a>, Error> {
    let layout = linearize(profile, arena, entry, handlers)?;

    // Resolve pool operands
    let mut builder = PoolsBuilder::seeded(pools);
    let mut pending = Vec::with_capacity(layout.len());
    for node in &layout {
        if node.is_prefix(profile) {
            pending.push(PendingArgument::Ready(0));
            continue;
        }

        let expected = profile.info(node.opcode()).operand;
        let operand = node.operand();
        if !operand.fits(expected) {
            return Err(Error::OperandMismatch {
                opcode: node.opcode(),
                expected,
                found: operand.kind(),
            });
        }

        let hint = node.pool_hint();
        let flags = node.operand_flags();
        pending.push(match &*operand {
            Operand::None | Operand::Jump => PendingArgument::Ready(0),
            Operand::Raw(value) => PendingArgument::Ready(*value),
            Operand::Constant(constant) => {
                PendingArgument::Pooled(builder.constants.intern_hinted(constant, hint), flags)
            }
            Operand::Name(name) => {
                PendingArgument::Pooled(builder.names.intern_hinted(name, hint), flags)
            }
            Operand::Local(name) => {
                PendingArgument::Pooled(builder.locals.intern_hinted(name, hint), flags)
            }
            Operand::Cell(name) => PendingArgument::Cell(builder.cell(name, hint), flags),
        });
    }

    let mut arguments = Vec::with_capacity(layout.len());
    for (node, pending) in layout.iter().zip(pending) {
        let quirk = profile.info(node.opcode()).quirk;
        let (index, flags) = match pending {
            PendingArgument::Ready(value) => {
                arguments.push(value);
                continue;
            }
            PendingArgument::Pooled(index, flags) => (index, flags),
            PendingArgument::Cell(cell, flags) => (builder.cell_index(cell), flags),
        };
        node.set_pool_hint(Some(index));
        let argument = quirk.join(index, flags).ok_or(Error::OperandOverflow {
            opcode: node.opcode(),
            index,
        })?;
        arguments.push(argument);
    }

    let relaxed = relax(profile, &layout, &arguments)?;
    let mut code = Vec::with_capacity(relaxed.words.len() * Word::WIDTH);
    relaxed.words.serialize(&mut code)?;

    Ok(Assembled {
        code,
        pools: builder.finish(),
        layout,
        units: relaxed.units,
        stats: EncodeStats {
            iterations: relaxed.iterations,
            inserted_prefixes: relaxed.inserted_prefixes,
        },
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::code::opcodes::py38::*;
    use crate::code::{Constant, OperandKind, OperandQuirk};

    #[test]
    fn pools_are_extended() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        let load = arena.alloc(LOAD_CONST, Operand::Constant(Constant::from("hi")));
        let deref = arena.alloc(LOAD_DEREF, Operand::Cell("y".to_owned()));
        let add = arena.alloc(BINARY_ADD, Operand::None);
        let ret = arena.alloc(RETURN_VALUE, Operand::None);
        load.set_successor(Some(deref));
        deref.set_successor(Some(add));
        add.set_successor(Some(ret));

        let pools = Pools {
            constants: vec![Constant::None],
            free: vec!["y".to_owned()],
            ..Pools::default()
        };
        let assembled = assemble(&profile, &arena, load, &[], &pools).unwrap();
        assert_eq!(assembled.code, vec![100, 1, 136, 0, 23, 0, 83, 0]);
        assert_eq!(
            assembled.pools.constants,
            vec![Constant::None, Constant::from("hi")]
        );
        assert_eq!(load.pool_hint(), Some(1));
        assert_eq!(assembled.stats, EncodeStats { iterations: 1, inserted_prefixes: 0 });
        assert_eq!(assembled.total_units(), 4);
    }

    #[test]
    fn new_cells_shift_free_variables() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        let free = arena.alloc(LOAD_DEREF, Operand::Cell("y".to_owned()));
        let cell = arena.alloc(STORE_DEREF, Operand::Cell("z".to_owned()));
        let ret = arena.alloc(RETURN_VALUE, Operand::None);
        free.set_successor(Some(cell));
        cell.set_successor(Some(ret));

        let pools = Pools {
            free: vec!["y".to_owned()],
            ..Pools::default()
        };
        let assembled = assemble(&profile, &arena, free, &[], &pools).unwrap();
        assert_eq!(assembled.pools.cells, vec!["z".to_owned()]);
        assert_eq!(assembled.code, vec![136, 1, 137, 0, 83, 0]);
    }

    #[test]
    fn mismatched_operands() {
        let profile = VersionProfile::python38();
        let arena = CodeArena::new();
        let load = arena.alloc(LOAD_NAME, Operand::Constant(Constant::Int(1)));
        let ret = arena.alloc(RETURN_VALUE, Operand::None);
        load.set_successor(Some(ret));
        assert!(matches!(
            assemble(&profile, &arena, load, &[], &Pools::default()),
            Err(Error::OperandMismatch {
                expected: OperandKind::Name,
                found: OperandKind::Constant,
                ..
            })
        ));
    }

    #[test]
    fn pool_index_overflowing_its_flag_bit() {
        let profile =
            VersionProfile::python38().with_quirk(LOAD_GLOBAL, OperandQuirk::HighFlagBit(7));
        let arena = CodeArena::new();
        let pools = Pools {
            names: (0..128).map(|i| format!("n{}", i)).collect(),
            ..Pools::default()
        };

        let fits = arena.alloc(LOAD_GLOBAL, Operand::Name("n127".to_owned()));
        fits.set_operand_flags(0x80);
        let ret = arena.alloc(RETURN_VALUE, Operand::None);
        fits.set_successor(Some(ret));
        let assembled = assemble(&profile, &arena, fits, &[], &pools).unwrap();
        assert_eq!(assembled.code, vec![116, 0xff, 83, 0]);

        // A fresh name lands at index 128, which is the flag bit itself
        let fresh = arena.alloc(LOAD_GLOBAL, Operand::Name("fresh".to_owned()));
        fresh.set_successor(Some(ret));
        assert!(matches!(
            assemble(&profile, &arena, fresh, &[], &pools),
            Err(Error::OperandOverflow { index: 128, .. })
        ));
    }
}
