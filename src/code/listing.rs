use super::{Instruction, Operand, PredecessorIndex, VersionProfile};
use crate::util::RefId;
use std::collections::HashSet;
use std::fmt;

/// Human readable listing of the instructions reachable from some roots
///
/// Instructions are shown in offset order, one per line, in the same columns as the interpreter's
/// own disassembler: source line (when it changes), a `>>` marker on jump targets, the offset, the
/// opcode name, and the operand. Pool operands show the pool index they were last bound to, then
/// the value itself in parentheses. Instructions which were never bound to an offset come last
/// and show `-` as their offset.
pub struct Listing<'p, 'a> {
    profile: &'p VersionProfile,
    instructions: Vec<&'a Instruction<'a>>,
    targets: HashSet<RefId<'a, Instruction<'a>>>,
}

impl<'p, 'a> Listing<'p, 'a> {
    pub fn new(profile: &'p VersionProfile, roots: &[&'a Instruction<'a>]) -> Listing<'p, 'a> {
        let index = PredecessorIndex::build(profile, roots);
        let mut instructions: Vec<&'a Instruction<'a>> = index.reachable().to_vec();
        instructions.sort_by_key(|node| node.offset().unwrap_or(usize::MAX));

        let targets = instructions
            .iter()
            .filter(|node| node.is_jump(profile))
            .filter_map(|node| node.branch_target())
            .map(RefId)
            .collect();

        Listing {
            profile,
            instructions,
            targets,
        }
    }
}

impl<'p, 'a> fmt::Display for Listing<'p, 'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut last_line = None;
        for (i, node) in self.instructions.iter().enumerate() {
            let line = node.position().map(|position| position.line);
            if line.is_some() && line != last_line {
                if i > 0 {
                    writeln!(f)?;
                }
                write!(f, "{:>4}", line.unwrap_or(0))?;
                last_line = line;
            } else {
                write!(f, "    ")?;
            }

            let marker = if self.targets.contains(&RefId(*node)) {
                ">>"
            } else {
                "  "
            };
            let offset = match node.offset() {
                Some(offset) => offset.to_string(),
                None => String::from("-"),
            };
            let name = self.profile.opcode_name(node.opcode());
            write!(f, "{:>6} {:>6} {:<24}", marker, offset, name)?;

            let hint = node
                .pool_hint()
                .map_or_else(|| String::from("?"), |index| index.to_string());
            match &*node.operand() {
                Operand::None => (),
                Operand::Raw(value) => write!(f, " {}", value)?,
                Operand::Constant(constant) => write!(f, " {} ({})", hint, constant)?,
                Operand::Name(name) | Operand::Local(name) | Operand::Cell(name) => {
                    write!(f, " {} ({})", hint, name)?
                }
                Operand::Jump => match node.branch_target().and_then(|target| target.offset()) {
                    Some(target) => write!(f, " (to {})", target)?,
                    None => write!(f, " (to ?)")?,
                },
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
