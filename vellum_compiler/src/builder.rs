//! Instruction builder for assembly emission.
//!
//! The `InstructionBuilder` provides the emission API the compiling
//! walker drives: it tracks the 1-based address counter, binds labels to
//! addresses, maintains the procedure/statement context stack that the
//! label numbering scheme is derived from, and interns variable and
//! sub-procedure symbols as instructions reference them.
//!
//! # Labels
//!
//! Labels are constructed from the frame prefix and the statement kind,
//! e.g. `2.3.1.IfStatement` or `2.3.1.1.ConditionClause`. Nested blocks
//! derive their prefix from the parent frame's statement and clause
//! numbers, which makes every label unique by construction.
//!
//! At most one label can be pending at a time: binding a second label
//! while one is pending first emits a `SKIP INSTRUCTION` so both labels
//! resolve to consecutive addresses.

use smallvec::SmallVec;

use vellum_core::context::{ProcedureContext, RESULT_VARIABLE};
use vellum_core::instruction::{
    ExecuteModifier, HandleModifier, Instruction, JumpModifier, Operation, PopModifier,
    StorageModifier,
};

use crate::formatter;

/// Stack-allocated frame stack for typical block nesting depths.
type FrameStack = SmallVec<[ProcedureFrame; 4]>;

// =============================================================================
// Frames and Statement Records
// =============================================================================

/// One frame per procedure (top-level or nested block) being compiled.
#[derive(Debug)]
struct ProcedureFrame {
    /// The 1-based number of the statement currently being compiled.
    statement_number: u32,
    /// How many statements the procedure contains.
    statement_count: u32,
    /// The dot-separated lineage prefix for labels in this frame.
    prefix: String,
    /// The record for the statement currently being compiled, if any.
    statement: Option<StatementRecord>,
}

/// Derived state for the statement currently being compiled.
#[derive(Debug)]
struct StatementRecord {
    start_label: String,
    done_label: String,
    handler_label: String,
    failure_label: String,
    success_label: String,
    loop_label: Option<String>,
    /// The 1-based number the next subclause block will take.
    clause_number: u32,
    /// Total subclauses and handler clauses carried by the statement.
    clause_count: u32,
    has_clauses: bool,
    has_handlers: bool,
}

/// The labels a break or continue clause escapes to.
#[derive(Debug, Clone)]
pub struct LoopLabels {
    /// The label of the loop's condition or iteration clause.
    pub loop_label: String,
    /// The loop statement's done label.
    pub done_label: String,
}

// =============================================================================
// InstructionBuilder
// =============================================================================

/// Builder for the symbolic instruction list of one procedure.
pub struct InstructionBuilder {
    /// Next 1-based instruction address.
    address: u16,
    /// Stack of procedure frames; innermost at the end.
    frames: FrameStack,
    /// At most one label waiting to bind to the next instruction.
    pending_label: Option<String>,
    /// Emitted instructions.
    instructions: Vec<Instruction>,
    /// Whether the procedure tail still needs the `$$result` finaliser.
    requires_finalization: bool,
    /// The context being populated.
    context: ProcedureContext,
}

impl InstructionBuilder {
    /// Create a builder for a procedure with the given parameter symbols.
    pub fn new<S: Into<String>>(parameters: impl IntoIterator<Item = S>) -> Self {
        InstructionBuilder {
            address: 1,
            frames: FrameStack::new(),
            pending_label: None,
            instructions: Vec::new(),
            requires_finalization: true,
            context: ProcedureContext::new(parameters),
        }
    }

    /// The context under construction (read access).
    pub fn context(&self) -> &ProcedureContext {
        &self.context
    }

    /// The instructions emitted so far.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    // =========================================================================
    // Procedure and Statement Contexts
    // =========================================================================

    /// Enter a procedure (the top level, or a nested block).
    ///
    /// A nested block derives its prefix from the parent frame's current
    /// statement and clause numbers, and advances the parent's clause
    /// number.
    pub fn push_procedure_context(&mut self, statement_count: usize) {
        let prefix = match self.frames.last_mut() {
            None => String::new(),
            Some(parent) => {
                let statement = parent
                    .statement
                    .as_mut()
                    .expect("nested block outside a statement");
                let prefix = format!(
                    "{}{}.{}.",
                    parent.prefix, parent.statement_number, statement.clause_number
                );
                statement.clause_number += 1;
                prefix
            }
        };
        self.frames.push(ProcedureFrame {
            statement_number: 1,
            statement_count: statement_count as u32,
            prefix,
            statement: None,
        });
    }

    /// Leave the current procedure.
    pub fn pop_procedure_context(&mut self) {
        let frame = self.frames.pop().expect("no procedure context to pop");
        debug_assert!(
            frame.statement_number > frame.statement_count,
            "procedure popped before all statements were compiled"
        );
    }

    /// Enter a statement, deriving its label set from the frame prefix
    /// and the statement-kind string.
    ///
    /// Entering a statement marks the procedure tail as requiring
    /// finalization until a return or throw clause clears it.
    pub fn push_statement_context(
        &mut self,
        kind: &str,
        subclause_count: usize,
        handler_count: usize,
    ) {
        self.requires_finalization = true;
        let frame = self.frames.last_mut().expect("no procedure context");
        debug_assert!(frame.statement.is_none(), "statement contexts must nest");
        let base = format!("{}{}.{}Statement", frame.prefix, frame.statement_number, kind);
        frame.statement = Some(StatementRecord {
            start_label: base.clone(),
            done_label: format!("{}Done", base),
            handler_label: format!("{}Handlers", base),
            failure_label: format!("{}Failed", base),
            success_label: format!("{}Succeeded", base),
            loop_label: None,
            clause_number: 1,
            clause_count: (subclause_count + handler_count) as u32,
            has_clauses: subclause_count > 0,
            has_handlers: handler_count > 0,
        });
    }

    /// Leave the current statement and advance the statement number.
    pub fn pop_statement_context(&mut self) {
        let frame = self.frames.last_mut().expect("no procedure context");
        let statement = frame.statement.take().expect("no statement context to pop");
        debug_assert!(
            statement.clause_number > statement.clause_count,
            "statement popped before all clauses were compiled"
        );
        frame.statement_number += 1;
    }

    fn statement(&self) -> &StatementRecord {
        self.frames
            .last()
            .and_then(|frame| frame.statement.as_ref())
            .expect("no active statement")
    }

    /// The current statement's start label.
    pub fn start_label(&self) -> String {
        self.statement().start_label.clone()
    }

    /// The current statement's done label.
    pub fn done_label(&self) -> String {
        self.statement().done_label.clone()
    }

    /// The current statement's handler label.
    pub fn handler_label(&self) -> String {
        self.statement().handler_label.clone()
    }

    /// The current statement's failure label.
    pub fn failure_label(&self) -> String {
        self.statement().failure_label.clone()
    }

    /// The current statement's success label.
    pub fn success_label(&self) -> String {
        self.statement().success_label.clone()
    }

    /// Whether the current statement carries nested blocks.
    pub fn has_clauses(&self) -> bool {
        self.statement().has_clauses
    }

    /// Whether the current statement carries handle clauses.
    pub fn has_handlers(&self) -> bool {
        self.statement().has_handlers
    }

    /// The label of the current statement's clause of the given kind,
    /// numbered with the current clause number.
    pub fn clause_label(&self, kind: &str) -> String {
        let frame = self.frames.last().expect("no procedure context");
        let statement = self.statement();
        format!(
            "{}{}.{}.{}Clause",
            frame.prefix, frame.statement_number, statement.clause_number, kind
        )
    }

    /// The label the *next* clause of the given kind will take, once the
    /// current clause's block has advanced the clause number.
    pub fn next_clause_label(&self, kind: &str) -> String {
        let frame = self.frames.last().expect("no procedure context");
        let statement = self.statement();
        format!(
            "{}{}.{}.{}Clause",
            frame.prefix,
            frame.statement_number,
            statement.clause_number + 1,
            kind
        )
    }

    /// The unnumbered label of the current statement's else clause.
    pub fn else_label(&self) -> String {
        let frame = self.frames.last().expect("no procedure context");
        format!("{}{}.ElseClause", frame.prefix, frame.statement_number)
    }

    /// Record the loop label a break or continue clause escapes to.
    pub fn set_loop_label(&mut self, label: impl Into<String>) {
        let frame = self.frames.last_mut().expect("no procedure context");
        let statement = frame.statement.as_mut().expect("no active statement");
        statement.loop_label = Some(label.into());
    }

    /// Search the frame stack outward for the nearest enclosing loop.
    pub fn find_enclosing_loop(&self) -> Option<LoopLabels> {
        self.frames.iter().rev().find_map(|frame| {
            let statement = frame.statement.as_ref()?;
            let loop_label = statement.loop_label.clone()?;
            Some(LoopLabels {
                loop_label,
                done_label: statement.done_label.clone(),
            })
        })
    }

    /// Clear the finalization flag after a return or throw clause.
    pub fn clear_finalization(&mut self) {
        self.requires_finalization = false;
    }

    // =========================================================================
    // Emission
    // =========================================================================

    /// Bind a label to the next emitted instruction.
    ///
    /// If a label is already pending, a SKIP is emitted first so the
    /// earlier label attaches to it and this one to the next real
    /// instruction.
    pub fn insert_label(&mut self, label: impl Into<String>) {
        if self.pending_label.is_some() {
            self.insert(Operation::Skip);
        }
        self.pending_label = Some(label.into());
    }

    /// Append an instruction, binding any pending label to its address.
    fn insert(&mut self, operation: Operation) {
        let label = self.pending_label.take();
        if let Some(ref label) = label {
            self.context.addresses.insert(label.clone(), self.address);
        }
        self.instructions.push(Instruction { label, operation });
        self.address += 1;
    }

    /// Emit `JUMP TO <target>` with the given condition.
    pub fn insert_jump(&mut self, target: impl Into<String>, condition: JumpModifier) {
        self.insert(Operation::Jump {
            target: target.into(),
            condition,
        });
    }

    /// Emit `PUSH HANDLER <label>`.
    pub fn insert_push_handler(&mut self, handler: impl Into<String>) {
        self.insert(Operation::PushHandler {
            handler: handler.into(),
        });
    }

    /// Emit ``PUSH LITERAL `<text>` ``.
    ///
    /// The caller is responsible for interning the parsed value in the
    /// type context's literal table.
    pub fn insert_push_literal(&mut self, literal: impl Into<String>) {
        self.insert(Operation::PushLiteral {
            literal: literal.into(),
        });
    }

    /// Emit `PUSH CONSTANT <symbol>`.
    pub fn insert_push_constant(&mut self, constant: impl Into<String>) {
        self.insert(Operation::PushConstant {
            constant: constant.into(),
        });
    }

    /// Emit `PUSH PARAMETER <symbol>`.
    pub fn insert_push_parameter(&mut self, parameter: impl Into<String>) {
        self.insert(Operation::PushParameter {
            parameter: parameter.into(),
        });
    }

    /// Emit `POP HANDLER` or `POP COMPONENT`.
    pub fn insert_pop(&mut self, target: PopModifier) {
        self.insert(Operation::Pop { target });
    }

    /// Emit a LOAD, interning the variable symbol.
    pub fn insert_load(&mut self, source: StorageModifier, symbol: impl Into<String>) {
        let symbol = symbol.into();
        self.context.variables.intern(symbol.clone());
        self.insert(Operation::Load { source, symbol });
    }

    /// Emit a STORE, interning the variable symbol.
    pub fn insert_store(&mut self, destination: StorageModifier, symbol: impl Into<String>) {
        let symbol = symbol.into();
        self.context.variables.intern(symbol.clone());
        self.insert(Operation::Store {
            destination,
            symbol,
        });
    }

    /// Emit `INVOKE <intrinsic>` with the given argument count.
    pub fn insert_invoke(&mut self, intrinsic: impl Into<String>, arguments: u8) {
        debug_assert!(arguments <= 3, "intrinsics take at most 3 arguments");
        self.insert(Operation::Invoke {
            intrinsic: intrinsic.into(),
            arguments,
        });
    }

    /// Emit an EXECUTE, interning the sub-procedure symbol.
    pub fn insert_execute(&mut self, procedure: impl Into<String>, modifier: ExecuteModifier) {
        let procedure = procedure.into();
        self.context.procedures.intern(procedure.clone());
        self.insert(Operation::Execute {
            procedure,
            modifier,
        });
    }

    /// Emit `HANDLE EXCEPTION` or `HANDLE RESULT`.
    pub fn insert_handle(&mut self, outcome: HandleModifier) {
        self.insert(Operation::Handle { outcome });
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Emit the procedure finaliser: load `$$result` and hand it back.
    pub fn finalize(&mut self) {
        self.insert_load(StorageModifier::Variable, RESULT_VARIABLE);
        self.insert_handle(HandleModifier::Result);
        self.requires_finalization = false;
    }

    /// Seal the builder, returning the populated procedure context with
    /// its canonical assembly text.
    ///
    /// The finaliser is appended when the tail of the procedure did not
    /// already transfer control away, or when a label is still pending
    /// and needs an instruction to resolve to.
    pub fn finish(mut self) -> ProcedureContext {
        if self.requires_finalization || self.pending_label.is_some() {
            self.finalize();
        }
        debug_assert!(self.frames.is_empty(), "unbalanced procedure contexts");
        self.context.assembly = formatter::format_instructions(&self.instructions, 0);
        self.context
    }
}
