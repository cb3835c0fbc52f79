//! Canonical assembly text formatting.
//!
//! Pretty-prints a symbolic instruction list back to the canonical
//! grammar: one instruction per line, labels on their own line
//! terminated with `:`, a blank line before each label except the
//! first, and every line prefixed with `level * 4` spaces.

use std::fmt::Write;

use vellum_core::instruction::Instruction;

/// The four-space indentation unit.
const INDENTATION: &str = "    ";

/// Format an instruction list at the given indentation level.
pub fn format_instructions(instructions: &[Instruction], level: usize) -> String {
    let indent = INDENTATION.repeat(level);
    let mut output = String::new();
    for instruction in instructions {
        if let Some(ref label) = instruction.label {
            if !output.is_empty() {
                output.push('\n');
            }
            writeln!(output, "{}{}:", indent, label).unwrap();
        }
        writeln!(output, "{}{}", indent, instruction.operation).unwrap();
    }
    output
}
