//! Compilation contexts.
//!
//! A [`TypeContext`] is shared across all procedures of one type and owns
//! the literal and constant tables. A [`ProcedureContext`] is the
//! compilation output for a single procedure: its symbol tables, its
//! address table, the canonical assembly text, and (after assembly) the
//! parsed instruction list and packed bytecode. Together with the type
//! context it forms a self-describing executable image.

use rustc_hash::FxHashMap;

use crate::instruction::{self, Instruction, Word};
use crate::literal::Literal;
use crate::tables::{ConstantTable, InternTable};

/// The well-known variable holding the current procedure's result.
pub const RESULT_VARIABLE: &str = "$$result";

/// The well-known variable addressing the global event queue.
pub const EVENT_QUEUE_VARIABLE: &str = "$$eventQueue";

/// The well-known variable holding a message's target component.
pub const TARGET_VARIABLE: &str = "$target";

// =============================================================================
// TypeContext
// =============================================================================

/// State shared across all procedures of one type.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    /// Literal values in first-mention order; position defines the index
    /// encoded by `PUSH LITERAL`.
    pub literals: InternTable<Literal>,
    /// Named constants; key order defines the index encoded by
    /// `PUSH CONSTANT`.
    pub constants: ConstantTable,
}

impl TypeContext {
    /// Create an empty type context.
    #[must_use]
    pub fn new() -> Self {
        TypeContext::default()
    }
}

// =============================================================================
// ProcedureContext
// =============================================================================

/// The compilation output for one procedure.
///
/// Created by the top-level compile call, mutated by the walker and the
/// builder, and sealed when compilation returns; the assembler then
/// attaches the parsed instruction list and the bytecode.
#[derive(Debug, Clone)]
pub struct ProcedureContext {
    /// The procedure's parameter symbols, in declaration order.
    pub parameters: InternTable<String>,
    /// Every variable referenced by the procedure, in first-mention order.
    pub variables: InternTable<String>,
    /// Every sub-procedure invoked via EXECUTE, in first-mention order.
    pub procedures: InternTable<String>,
    /// Label text to 1-based instruction address.
    pub addresses: FxHashMap<String, u16>,
    /// The canonical assembly text, set by compilation.
    pub assembly: String,
    /// The parsed instruction list, set by assembly.
    pub instructions: Vec<Instruction>,
    /// The packed word sequence, set by assembly.
    pub bytecode: Vec<Word>,
}

impl ProcedureContext {
    /// Create a context for a procedure with the given parameter symbols.
    ///
    /// The variables table is seeded with `$target`, which every
    /// procedure can reference as the recipient of the message that
    /// invoked it.
    #[must_use]
    pub fn new<S: Into<String>>(parameters: impl IntoIterator<Item = S>) -> Self {
        let mut parameter_table = InternTable::new();
        for parameter in parameters {
            parameter_table.intern(parameter.into());
        }
        let mut variables = InternTable::new();
        variables.intern(TARGET_VARIABLE.to_string());
        ProcedureContext {
            parameters: parameter_table,
            variables,
            procedures: InternTable::new(),
            addresses: FxHashMap::default(),
            assembly: String::new(),
            instructions: Vec::new(),
            bytecode: Vec::new(),
        }
    }

    /// The address bound to a label, if the label is defined.
    pub fn address_of(&self, label: &str) -> Option<u16> {
        self.addresses.get(label).copied()
    }

    /// Serialise the bytecode as big-endian bytes, two per word.
    pub fn bytecode_bytes(&self) -> Vec<u8> {
        instruction::to_bytes(&self.bytecode)
    }
}

impl Default for ProcedureContext {
    fn default() -> Self {
        ProcedureContext::new(Vec::<String>::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_seeds_target_variable() {
        let context = ProcedureContext::new(["$x", "$y"]);
        assert_eq!(context.variables.len(), 1);
        assert!(context.variables.contains(&TARGET_VARIABLE.to_string()));
        assert_eq!(context.parameters.index_of(&"$x".to_string()), Some(1));
        assert_eq!(context.parameters.index_of(&"$y".to_string()), Some(2));
    }

    #[test]
    fn test_bytecode_bytes_are_big_endian() {
        let mut context = ProcedureContext::default();
        context.bytecode = vec![Word(0x1234), Word(0xABCD)];
        assert_eq!(context.bytecode_bytes(), vec![0x12, 0x34, 0xAB, 0xCD]);
    }
}
