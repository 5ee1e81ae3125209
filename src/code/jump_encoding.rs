//! Choose operand widths by inserting extended-argument prefixes
//!
//! Every code unit carries an 8-bit argument, so wider operands need their high digits carried by
//! prefix units placed right before the instruction. Jump operands are where this gets tricky:
//! inserting prefixes moves code around, which changes jump distances, which may require more
//! prefixes elsewhere.
//!
//! ### Reserved slots
//!
//! Prefix placeholders which are already part of the layout (typically decoded from the original
//! stream) are kept as reserved slots for the instruction that follows them. They are always
//! emitted, even when the operand turns out to need fewer digits: in that case the leading
//! prefixes just carry zero digits. This is what makes unedited code round-trip exactly.
//!
//! ### Termination
//!
//! The loop recomputes every offset and every jump operand from scratch on each iteration, then
//! grows the prefix count of every instruction that is too narrow. Prefix counts only ever grow and
//! each of them is bounded (an operand never needs more than 3 extra digits), so a fixed point is
//! reached after at most `3n + 1` iterations for `n` instructions. Running past that bound means
//! something is badly wrong and is reported instead of looping.

use super::{Error, GraphError, Instruction, OpcodeFlags, VersionProfile, Word};
use crate::util::RefId;
use std::collections::HashMap;

/// Result of width relaxation over a layout
#[derive(Debug)]
pub struct Relaxed {
    /// Final code units
    pub words: Vec<Word>,

    /// Per layout slot, the first code unit attributed to that slot (for real instructions, this
    /// is the first prefix inserted for them, or the instruction itself)
    pub units: Vec<usize>,

    pub iterations: usize,
    pub inserted_prefixes: usize,
}

/// Number of digits beyond the low one needed to encode `argument`
pub fn extra_digits(argument: u32) -> u8 {
    match argument {
        0..=0xff => 0,
        0x100..=0xffff => 1,
        0x1_0000..=0xff_ffff => 2,
        _ => 3,
    }
}

/// One real instruction, with the slots which precede it
struct Run<'a> {
    instruction: &'a Instruction<'a>,
    slot: usize,
    reserved: usize,
    inserted: u8,
}

impl<'a> Run<'a> {
    fn prefixes(&self) -> usize {
        self.reserved + self.inserted as usize
    }
}

/// Compute final operands and code units for a linearised layout
///
/// `arguments` is parallel to `layout` and holds the operand of every non-jump instruction (the
/// entries for jumps and placeholders are ignored). Jump targets are resolved to the first prefix
/// of the target instruction.
pub fn relax<'a>(
    profile: &VersionProfile,
    layout: &[&'a Instruction<'a>],
    arguments: &[u32],
) -> Result<Relaxed, Error> {
    // Group placeholders with the instruction they precede
    let mut runs: Vec<Run<'a>> = vec![];
    let mut owner: HashMap<RefId<'a, Instruction<'a>>, usize> = HashMap::new();
    let mut pending: Vec<&'a Instruction<'a>> = vec![];
    for (slot, node) in layout.iter().copied().enumerate() {
        if node.is_prefix(profile) {
            pending.push(node);
            continue;
        }
        let reserved = pending.len();
        for placeholder in pending.drain(..) {
            owner.insert(RefId(placeholder), runs.len());
        }
        owner.insert(RefId(node), runs.len());
        runs.push(Run {
            instruction: node,
            slot,
            reserved,
            inserted: 0,
        });
    }
    if let Some(stray) = pending.first() {
        return Err(Error::GraphConsistency(GraphError::StrayPrefix {
            offset: stray.offset().unwrap_or(0),
        }));
    }

    let limit = 3 * runs.len() + 2;
    let mut iterations = 0;
    let mut starts: Vec<usize> = vec![0; runs.len()];
    let mut operands: Vec<u32> = vec![0; runs.len()];
    loop {
        iterations += 1;

        let mut unit = 0;
        for (run, start) in runs.iter().zip(starts.iter_mut()) {
            *start = unit;
            unit += run.prefixes() + 1;
        }

        for (i, run) in runs.iter().enumerate() {
            operands[i] = if run.instruction.is_jump(profile) {
                jump_operand(profile, run, starts[i], &owner, &starts)?
            } else {
                arguments[run.slot]
            };
        }

        let mut grown = 0;
        for (run, operand) in runs.iter_mut().zip(&operands) {
            let needed = extra_digits(*operand) as usize;
            if needed > run.prefixes() {
                run.inserted = (needed - run.reserved) as u8;
                grown += 1;
            }
        }
        log::trace!("Relaxation iteration {}: {} instructions widened", iterations, grown);

        if grown == 0 {
            break;
        }
        if iterations >= limit {
            return Err(Error::RelaxationDivergence {
                iterations,
                unsatisfied: grown,
            });
        }
    }

    // Emit, binding every node to its final offset
    let mut words = Vec::with_capacity(layout.len());
    let mut units = vec![0; layout.len()];
    let mut inserted_prefixes = 0;
    for ((run, start), operand) in runs.iter().zip(&starts).zip(&operands) {
        let prefixes = run.prefixes();
        for (k, placeholder) in layout[run.slot - run.reserved..run.slot].iter().enumerate() {
            placeholder.set_offset(Some((start + k) * Word::WIDTH));
            units[run.slot - run.reserved + k] = start + k;
        }
        units[run.slot] = start + run.reserved;

        for k in 0..prefixes {
            let shift = 8 * (prefixes - k) as u64;
            let digit = if shift >= 32 { 0 } else { (*operand >> shift) & 0xff };
            words.push(Word {
                opcode: profile.extended_arg,
                arg: digit as u8,
            });
        }
        words.push(Word {
            opcode: run.instruction.opcode(),
            arg: (*operand & 0xff) as u8,
        });
        run.instruction.set_offset(Some((start + prefixes) * Word::WIDTH));
        inserted_prefixes += run.inserted as usize;
    }

    if inserted_prefixes > 0 {
        log::debug!(
            "Inserted {} extended-argument prefixes in {} iterations",
            inserted_prefixes,
            iterations
        );
    }
    Ok(Relaxed {
        words,
        units,
        iterations,
        inserted_prefixes,
    })
}

/// Operand of a jump, given the current starts of every run
fn jump_operand<'a>(
    profile: &VersionProfile,
    run: &Run<'a>,
    start: usize,
    owner: &HashMap<RefId<'a, Instruction<'a>>, usize>,
    starts: &[usize],
) -> Result<u32, Error> {
    let node = run.instruction;
    let target = match node.branch_target().and_then(|target| owner.get(&RefId(target))) {
        Some(target) => starts[*target],
        None => {
            return Err(Error::GraphConsistency(GraphError::MissingBranchTarget {
                opcode: node.opcode(),
                offset: node.offset(),
            }))
        }
    };

    let flags = node.flags(profile);
    let end = start + run.prefixes() + 1;
    let units = if flags.contains(OpcodeFlags::JUMP_ABSOLUTE) {
        target
    } else if flags.contains(OpcodeFlags::JUMP_BACKWARD) && target <= end {
        end - target
    } else if !flags.contains(OpcodeFlags::JUMP_BACKWARD) && target >= end {
        target - end
    } else {
        return Err(Error::GraphConsistency(GraphError::InvalidJumpDirection {
            opcode: node.opcode(),
            from: end * Word::WIDTH,
            to: target * Word::WIDTH,
        }));
    };

    let operand = units * Word::WIDTH / profile.jump_unit.bytes();
    Ok(u32::try_from(operand).unwrap_or(u32::MAX))
}
