use super::Constant;
use std::collections::HashMap;
use std::hash::Hash;

/// Operand pools of one code unit
///
/// The cell pool that cell-kind operands index is `cells ++ free`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pools {
    pub constants: Vec<Constant>,
    pub names: Vec<String>,
    pub locals: Vec<String>,
    pub cells: Vec<String>,
    pub free: Vec<String>,
}

impl Pools {
    /// Name of the cell or free variable at `index` in `cells ++ free`
    pub fn cell_name(&self, index: u32) -> Option<&str> {
        let index = index as usize;
        if index < self.cells.len() {
            Some(&self.cells[index])
        } else {
            self.free.get(index - self.cells.len()).map(String::as_str)
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len() + self.free.len()
    }
}

/// Append-only de-duplicating pool
///
/// A pool can be seeded with existing entries (which may contain duplicates, all of which keep
/// their index). Lookups by value return the first matching index, unless a hint pointing at an
/// equal entry is supplied.
#[derive(Debug)]
pub struct PoolBuilder<T> {
    entries: Vec<T>,
    indices: HashMap<T, u32>,
}

impl<T: Clone + Eq + Hash> PoolBuilder<T> {
    pub fn new() -> PoolBuilder<T> {
        PoolBuilder {
            entries: vec![],
            indices: HashMap::new(),
        }
    }

    /// Make a pool whose first entries are exactly `entries`
    pub fn seeded(entries: &[T]) -> PoolBuilder<T> {
        let mut pool = PoolBuilder::new();
        for entry in entries {
            pool.push(entry.clone());
        }
        pool
    }

    fn push(&mut self, entry: T) -> u32 {
        let index = self.entries.len() as u32;
        self.indices.entry(entry.clone()).or_insert(index);
        self.entries.push(entry);
        index
    }

    /// Index of an existing equal entry, or of a freshly appended one
    pub fn intern(&mut self, entry: &T) -> u32 {
        match self.indices.get(entry) {
            Some(index) => *index,
            None => self.push(entry.clone()),
        }
    }

    /// Like [`PoolBuilder::intern`], but prefer `hint` when the entry there is equal
    pub fn intern_hinted(&mut self, entry: &T, hint: Option<u32>) -> u32 {
        if let Some(hint) = hint {
            if self.entries.get(hint as usize) == Some(entry) {
                return hint;
            }
        }
        self.intern(entry)
    }

    /// Index of an equal entry, without inserting anything
    pub fn find(&self, entry: &T) -> Option<u32> {
        self.indices.get(entry).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.entries
    }
}

impl<T: Clone + Eq + Hash> Default for PoolBuilder<T> {
    fn default() -> Self {
        PoolBuilder::new()
    }
}

/// Position of a cell-kind operand before the final layout of `cells ++ free` is known
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CellRef {
    Cell(u32),
    Free(u32),
}

/// Builder for all the pools of a code unit during one encode pass
#[derive(Debug)]
pub struct PoolsBuilder {
    pub constants: PoolBuilder<Constant>,
    pub names: PoolBuilder<String>,
    pub locals: PoolBuilder<String>,
    pub cells: PoolBuilder<String>,
    pub free: PoolBuilder<String>,
    seeded_cells: u32,
}

impl PoolsBuilder {
    /// Builder which keeps every index of `pools` stable
    pub fn seeded(pools: &Pools) -> PoolsBuilder {
        PoolsBuilder {
            constants: PoolBuilder::seeded(&pools.constants),
            names: PoolBuilder::seeded(&pools.names),
            locals: PoolBuilder::seeded(&pools.locals),
            cells: PoolBuilder::seeded(&pools.cells),
            free: PoolBuilder::seeded(&pools.free),
            seeded_cells: pools.cells.len() as u32,
        }
    }

    /// Intern a cell-kind operand
    ///
    /// Unknown names become new cell variables of the code unit. The hint is an index into the
    /// `cells ++ free` pool as it was when seeded.
    pub fn cell(&mut self, name: &str, hint: Option<u32>) -> CellRef {
        let name = name.to_owned();
        let seeded_cells = self.seeded_cells;
        if let Some(hint) = hint {
            if hint < seeded_cells {
                if self.cells.entries.get(hint as usize) == Some(&name) {
                    return CellRef::Cell(hint);
                }
            } else if self.free.entries.get((hint - seeded_cells) as usize) == Some(&name) {
                return CellRef::Free(hint - seeded_cells);
            }
        }
        if let Some(index) = self.cells.find(&name) {
            CellRef::Cell(index)
        } else if let Some(index) = self.free.find(&name) {
            CellRef::Free(index)
        } else {
            CellRef::Cell(self.cells.intern(&name))
        }
    }

    /// Final index of a cell reference (only stable once nothing else is interned)
    pub fn cell_index(&self, cell: CellRef) -> u32 {
        match cell {
            CellRef::Cell(index) => index,
            CellRef::Free(index) => self.cells.len() as u32 + index,
        }
    }

    pub fn finish(self) -> Pools {
        Pools {
            constants: self.constants.into_vec(),
            names: self.names.into_vec(),
            locals: self.locals.into_vec(),
            cells: self.cells.into_vec(),
            free: self.free.into_vec(),
        }
    }
}
