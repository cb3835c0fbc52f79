//! Tree-directed procedure compiler.
//!
//! The compiler walks a procedure syntax tree and drives the
//! [`InstructionBuilder`], emitting the symbolic instructions whose
//! stack effects the virtual processor expects. Every statement is
//! wrapped in the same scaffold:
//!
//! ```text
//! <startLabel>:
//!     PUSH HANDLER <handlerLabel>        (only with handle clauses)
//!     ...main clause...
//! <doneLabel>:                           (only with subclauses/handlers)
//!     POP HANDLER                        ┐
//!     JUMP TO <successLabel>             │
//! <handlerLabel>:                        │
//!     ...handle clause chain...          │ only with handle clauses
//! <failureLabel>:                        │
//!     HANDLE EXCEPTION                   │
//! <successLabel>:                        ┘
//! ```
//!
//! A handle clause stores the exception, reloads it twice, matches it
//! against its template, and either runs its block or falls through to
//! the next handler (or the failure label, which rethrows).

use vellum_ast as ast;
use vellum_core::context::{
    ProcedureContext, TypeContext, EVENT_QUEUE_VARIABLE, RESULT_VARIABLE,
};
use vellum_core::error::{VellumError, VellumResult};
use vellum_core::instruction::{
    ExecuteModifier, HandleModifier, JumpModifier, PopModifier, StorageModifier,
};
use vellum_core::literal::Literal;

use crate::builder::InstructionBuilder;

// =============================================================================
// Compiler
// =============================================================================

/// Compiles one procedure tree into a sealed [`ProcedureContext`].
pub struct Compiler<'a> {
    /// The type-level literal and constant tables.
    pub(crate) types: &'a mut TypeContext,
    /// The instruction builder being driven.
    pub(crate) builder: InstructionBuilder,
    /// Monotonic counter for `$$<kind>-<n>` temporary variables.
    pub(crate) temporaries: u32,
}

impl<'a> Compiler<'a> {
    /// Compile a procedure with the given parameter symbols.
    ///
    /// Returns the sealed procedure context carrying the canonical
    /// assembly text, the populated symbol tables, and the address
    /// table. The type context accumulates any literals the procedure
    /// mentions.
    pub fn compile<S: Into<String>>(
        types: &'a mut TypeContext,
        parameters: impl IntoIterator<Item = S>,
        procedure: &ast::Procedure,
    ) -> VellumResult<ProcedureContext> {
        let mut compiler = Compiler {
            types,
            builder: InstructionBuilder::new(parameters),
            temporaries: 0,
        };
        compiler
            .builder
            .push_procedure_context(procedure.statements.len());
        for statement in &procedure.statements {
            compiler.compile_statement(statement)?;
        }
        compiler.builder.pop_procedure_context();
        Ok(compiler.builder.finish())
    }

    /// Allocate a fresh `$$<kind>-<n>` temporary variable name.
    pub(crate) fn make_temporary(&mut self, kind: &str) -> String {
        self.temporaries += 1;
        format!("$${}-{}", kind, self.temporaries)
    }

    /// Compile a nested block as its own procedure frame.
    fn compile_block(&mut self, block: &ast::Procedure) -> VellumResult<()> {
        self.builder.push_procedure_context(block.statements.len());
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        self.builder.pop_procedure_context();
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Compile one statement, including its exception scaffold.
    fn compile_statement(&mut self, statement: &ast::Statement) -> VellumResult<()> {
        self.builder.push_statement_context(
            statement.main.kind(),
            statement.subclause_count(),
            statement.handlers.len(),
        );
        let has_clauses = self.builder.has_clauses();
        let has_handlers = self.builder.has_handlers();

        let start = self.builder.start_label();
        self.builder.insert_label(start);
        if has_handlers {
            let handler = self.builder.handler_label();
            self.builder.insert_push_handler(handler);
        }

        self.compile_clause(&statement.main)?;

        if has_clauses || has_handlers {
            let done = self.builder.done_label();
            self.builder.insert_label(done);
        }

        if has_handlers {
            let success = self.builder.success_label();
            self.builder.insert_pop(PopModifier::Handler);
            self.builder.insert_jump(&success, JumpModifier::OnAny);

            let handler = self.builder.handler_label();
            self.builder.insert_label(handler);
            let count = statement.handlers.len();
            for (position, clause) in statement.handlers.iter().enumerate() {
                self.compile_handle_clause(clause, position + 1 == count)?;
            }

            let failure = self.builder.failure_label();
            self.builder.insert_label(failure);
            self.builder.insert_handle(HandleModifier::Exception);
            self.builder.insert_label(success);
        }

        self.builder.pop_statement_context();
        Ok(())
    }

    /// Compile one handle clause in the statement's handler chain.
    fn compile_handle_clause(
        &mut self,
        clause: &ast::HandleClause,
        last: bool,
    ) -> VellumResult<()> {
        let label = self.builder.clause_label("Handle");
        self.builder.insert_label(label);

        // Store the exception, then reload two copies: one stays on the
        // stack for a possible rethrow, one feeds the template match.
        self.builder
            .insert_store(StorageModifier::Variable, &clause.exception);
        self.builder
            .insert_load(StorageModifier::Variable, &clause.exception);
        self.builder
            .insert_load(StorageModifier::Variable, &clause.exception);
        self.compile_expression(&clause.template)?;
        self.builder.insert_invoke("$isMatchedBy", 2);

        let next = if last {
            self.builder.failure_label()
        } else {
            self.builder.next_clause_label("Handle")
        };
        self.builder.insert_jump(next, JumpModifier::OnFalse);

        // The matched exception is no longer needed.
        self.builder.insert_pop(PopModifier::Component);
        self.compile_block(&clause.block)?;
        let success = self.builder.success_label();
        self.builder.insert_jump(success, JumpModifier::OnAny);
        Ok(())
    }

    // =========================================================================
    // Clauses
    // =========================================================================

    fn compile_clause(&mut self, clause: &ast::Clause) -> VellumResult<()> {
        match clause {
            ast::Clause::Evaluate {
                recipient,
                expression,
            } => match recipient {
                None => {
                    self.compile_expression(expression)?;
                    self.builder
                        .insert_store(StorageModifier::Variable, RESULT_VARIABLE);
                }
                Some(recipient) => {
                    self.prepare_recipient(recipient)?;
                    self.compile_expression(expression)?;
                    self.assign_recipient(recipient);
                }
            },

            ast::Clause::If {
                branches,
                else_block,
            } => self.compile_if(branches, else_block.as_ref())?,

            ast::Clause::Select {
                selector,
                options,
                else_block,
            } => self.compile_select(selector, options, else_block.as_ref())?,

            ast::Clause::While { condition, block } => self.compile_while(condition, block)?,

            ast::Clause::With {
                item,
                sequence,
                block,
            } => self.compile_with(item, sequence, block)?,

            ast::Clause::Break => {
                let labels = self
                    .builder
                    .find_enclosing_loop()
                    .ok_or_else(|| VellumError::no_enclosing_loop("break loop"))?;
                self.builder
                    .insert_jump(labels.done_label, JumpModifier::OnAny);
            }

            ast::Clause::Continue => {
                let labels = self
                    .builder
                    .find_enclosing_loop()
                    .ok_or_else(|| VellumError::no_enclosing_loop("continue loop"))?;
                self.builder
                    .insert_jump(labels.loop_label, JumpModifier::OnAny);
            }

            ast::Clause::Return { expression } => {
                match expression {
                    Some(expression) => self.compile_expression(expression)?,
                    None => self.push_literal("none"),
                }
                self.builder.insert_handle(HandleModifier::Result);
                self.builder.clear_finalization();
            }

            ast::Clause::Throw { expression } => {
                self.compile_expression(expression)?;
                self.builder.insert_handle(HandleModifier::Exception);
                self.builder.clear_finalization();
            }

            ast::Clause::Publish { event } => {
                self.compile_expression(event)?;
                self.builder
                    .insert_store(StorageModifier::Message, EVENT_QUEUE_VARIABLE);
            }

            ast::Clause::Post { message, queue } => {
                self.compile_expression(queue)?;
                let temporary = self.make_temporary("queue");
                self.builder
                    .insert_store(StorageModifier::Variable, &temporary);
                self.compile_expression(message)?;
                self.builder
                    .insert_store(StorageModifier::Message, &temporary);
            }

            ast::Clause::Save { draft, location } => {
                self.compile_expression(draft)?;
                self.compile_expression(location)?;
                let temporary = self.make_temporary("location");
                self.builder
                    .insert_store(StorageModifier::Variable, &temporary);
                self.builder
                    .insert_store(StorageModifier::Draft, &temporary);
            }

            ast::Clause::Commit { document, location } => {
                self.compile_expression(document)?;
                self.compile_expression(location)?;
                let temporary = self.make_temporary("location");
                self.builder
                    .insert_store(StorageModifier::Variable, &temporary);
                self.builder
                    .insert_store(StorageModifier::Document, &temporary);
            }

            ast::Clause::Discard { location } => {
                self.compile_expression(location)?;
                let temporary = self.make_temporary("location");
                self.builder
                    .insert_store(StorageModifier::Variable, &temporary);
                self.push_literal("none");
                self.builder
                    .insert_store(StorageModifier::Draft, &temporary);
            }

            ast::Clause::Checkout {
                recipient,
                location,
            } => {
                self.prepare_recipient(recipient)?;
                self.compile_expression(location)?;
                let temporary = self.make_temporary("location");
                self.builder
                    .insert_store(StorageModifier::Variable, &temporary);
                self.builder
                    .insert_load(StorageModifier::Document, &temporary);
                self.assign_recipient(recipient);
            }

            ast::Clause::Wait { recipient, queue } => {
                self.prepare_recipient(recipient)?;
                self.compile_expression(queue)?;
                let temporary = self.make_temporary("queue");
                self.builder
                    .insert_store(StorageModifier::Variable, &temporary);
                self.builder
                    .insert_load(StorageModifier::Message, &temporary);
                self.assign_recipient(recipient);
            }
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        branches: &[ast::ConditionBlock],
        else_block: Option<&ast::Procedure>,
    ) -> VellumResult<()> {
        let done = self.builder.done_label();
        let count = branches.len();
        for (position, branch) in branches.iter().enumerate() {
            let label = self.builder.clause_label("Condition");
            self.builder.insert_label(label);
            self.compile_expression(&branch.condition)?;

            let last = position + 1 == count;
            let next = if !last {
                self.builder.next_clause_label("Condition")
            } else if else_block.is_some() {
                self.builder.else_label()
            } else {
                done.clone()
            };
            self.builder.insert_jump(next, JumpModifier::OnFalse);

            self.compile_block(&branch.block)?;
            if !last || else_block.is_some() {
                self.builder.insert_jump(&done, JumpModifier::OnAny);
            }
        }
        if let Some(block) = else_block {
            let label = self.builder.else_label();
            self.builder.insert_label(label);
            self.compile_block(block)?;
        }
        Ok(())
    }

    fn compile_select(
        &mut self,
        selector: &ast::Expression,
        options: &[ast::OptionBlock],
        else_block: Option<&ast::Procedure>,
    ) -> VellumResult<()> {
        self.compile_expression(selector)?;
        let temporary = self.make_temporary("selector");
        self.builder
            .insert_store(StorageModifier::Variable, &temporary);

        let done = self.builder.done_label();
        let count = options.len();
        for (position, option) in options.iter().enumerate() {
            let label = self.builder.clause_label("Option");
            self.builder.insert_label(label);
            self.builder
                .insert_load(StorageModifier::Variable, &temporary);
            self.compile_expression(&option.option)?;
            self.builder.insert_invoke("$isMatchedBy", 2);

            let last = position + 1 == count;
            let next = if !last {
                self.builder.next_clause_label("Option")
            } else if else_block.is_some() {
                self.builder.else_label()
            } else {
                done.clone()
            };
            self.builder.insert_jump(next, JumpModifier::OnFalse);

            self.compile_block(&option.block)?;
            if !last || else_block.is_some() {
                self.builder.insert_jump(&done, JumpModifier::OnAny);
            }
        }
        if let Some(block) = else_block {
            let label = self.builder.else_label();
            self.builder.insert_label(label);
            self.compile_block(block)?;
        }
        Ok(())
    }

    fn compile_while(
        &mut self,
        condition: &ast::Expression,
        block: &ast::Procedure,
    ) -> VellumResult<()> {
        let done = self.builder.done_label();
        let label = self.builder.clause_label("Condition");
        self.builder.set_loop_label(&label);
        self.builder.insert_label(&label);
        self.compile_expression(condition)?;
        self.builder.insert_jump(done, JumpModifier::OnFalse);
        self.compile_block(block)?;
        self.builder.insert_jump(label, JumpModifier::OnAny);
        Ok(())
    }

    fn compile_with(
        &mut self,
        item: &str,
        sequence: &ast::Expression,
        block: &ast::Procedure,
    ) -> VellumResult<()> {
        let done = self.builder.done_label();
        self.compile_expression(sequence)?;
        self.builder
            .insert_execute("$getIterator", ExecuteModifier::OnTarget);
        let iterator = self.make_temporary("iterator");
        self.builder
            .insert_store(StorageModifier::Variable, &iterator);

        let label = self.builder.clause_label("Iteration");
        self.builder.set_loop_label(&label);
        self.builder.insert_label(&label);
        self.builder
            .insert_load(StorageModifier::Variable, &iterator);
        self.builder
            .insert_execute("$hasNext", ExecuteModifier::OnTarget);
        self.builder.insert_jump(done, JumpModifier::OnFalse);
        self.builder
            .insert_load(StorageModifier::Variable, &iterator);
        self.builder
            .insert_execute("$getNext", ExecuteModifier::OnTarget);
        self.builder.insert_store(StorageModifier::Variable, item);
        self.compile_block(block)?;
        self.builder.insert_jump(label, JumpModifier::OnAny);
        Ok(())
    }

    /// Push a literal, interning its canonical value in the type context.
    pub(crate) fn push_literal(&mut self, text: &str) {
        self.types.literals.intern(Literal::from_text(text));
        self.builder.insert_push_literal(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_ast::{Clause, ConditionBlock, Expression, Procedure, Statement};

    fn compile(procedure: &Procedure) -> ProcedureContext {
        let mut types = TypeContext::new();
        Compiler::compile(&mut types, Vec::<String>::new(), procedure).expect("compile failed")
    }

    fn try_compile(procedure: &Procedure) -> VellumResult<ProcedureContext> {
        let mut types = TypeContext::new();
        Compiler::compile(&mut types, Vec::<String>::new(), procedure)
    }

    #[test]
    fn test_return_of_literal() {
        let procedure = Procedure::new(vec![Statement::new(Clause::Return {
            expression: Some(Expression::element("true")),
        })]);
        let context = compile(&procedure);
        assert_eq!(
            context.assembly,
            "1.ReturnStatement:\nPUSH LITERAL `true`\nHANDLE RESULT\n"
        );
    }

    #[test]
    fn test_empty_procedure_gets_finaliser() {
        let context = compile(&Procedure::default());
        assert_eq!(
            context.assembly,
            "LOAD VARIABLE $$result\nHANDLE RESULT\n"
        );
        assert!(context.variables.contains(&"$$result".to_string()));
        assert!(context.variables.contains(&"$target".to_string()));
    }

    #[test]
    fn test_bare_evaluate_stores_result() {
        let procedure = Procedure::new(vec![Statement::new(Clause::Evaluate {
            recipient: None,
            expression: Expression::element("42"),
        })]);
        let context = compile(&procedure);
        assert!(context.assembly.contains("STORE VARIABLE $$result"));
        // The statement does not terminate the procedure, so the
        // finaliser follows.
        assert!(context.assembly.ends_with("HANDLE RESULT\n"));
    }

    #[test]
    fn test_break_outside_loop_fails() {
        let procedure = Procedure::new(vec![Statement::new(Clause::Break)]);
        let error = try_compile(&procedure).unwrap_err();
        assert_eq!(
            error,
            VellumError::no_enclosing_loop("break loop")
        );
    }

    #[test]
    fn test_continue_outside_loop_fails() {
        let procedure = Procedure::new(vec![Statement::new(Clause::Continue)]);
        assert!(matches!(
            try_compile(&procedure).unwrap_err(),
            VellumError::NoEnclosingLoop { .. }
        ));
    }

    #[test]
    fn test_while_loop_shape() {
        let body = Procedure::new(vec![Statement::new(Clause::Break)]);
        let procedure = Procedure::new(vec![Statement::new(Clause::While {
            condition: Expression::element("true"),
            block: body,
        })]);
        let context = compile(&procedure);
        let assembly = &context.assembly;
        assert!(assembly.contains("1.1.ConditionClause:"));
        assert!(assembly.contains("JUMP TO 1.WhileStatementDone ON FALSE"));
        // The break escapes to the loop's done label.
        assert!(assembly.contains("JUMP TO 1.WhileStatementDone\n"));
        // The loop tail returns to the condition.
        assert!(assembly.contains("JUMP TO 1.1.ConditionClause\n"));
    }

    #[test]
    fn test_continue_targets_loop_label() {
        let body = Procedure::new(vec![Statement::new(Clause::Continue)]);
        let procedure = Procedure::new(vec![Statement::new(Clause::While {
            condition: Expression::element("true"),
            block: body,
        })]);
        let context = compile(&procedure);
        let continues = context
            .assembly
            .lines()
            .filter(|line| line.trim() == "JUMP TO 1.1.ConditionClause")
            .count();
        // One from the continue clause, one from the loop tail.
        assert_eq!(continues, 2);
    }

    #[test]
    fn test_throw_emits_handle_exception() {
        let procedure = Procedure::new(vec![Statement::new(Clause::Throw {
            expression: Expression::element("$failure"),
        })]);
        let context = compile(&procedure);
        assert!(context.assembly.ends_with("HANDLE EXCEPTION\n"));
    }

    #[test]
    fn test_publish_stores_on_event_queue() {
        let procedure = Procedure::new(vec![Statement::new(Clause::Publish {
            event: Expression::element("\"started\""),
        })]);
        let context = compile(&procedure);
        assert!(context.assembly.contains("STORE MESSAGE $$eventQueue"));
    }

    #[test]
    fn test_post_stores_through_queue_temporary() {
        let procedure = Procedure::new(vec![Statement::new(Clause::Post {
            message: Expression::element("\"job\""),
            queue: Expression::variable("$jobs"),
        })]);
        let context = compile(&procedure);
        let assembly = &context.assembly;
        assert!(assembly.contains("STORE VARIABLE $$queue-1"));
        assert!(assembly.contains("STORE MESSAGE $$queue-1"));
        let queue_load = assembly.find("LOAD VARIABLE $jobs").unwrap();
        let message_push = assembly.find("PUSH LITERAL `\"job\"`").unwrap();
        assert!(queue_load < message_push, "queue compiles before message");
    }

    #[test]
    fn test_discard_stores_none_draft() {
        let procedure = Procedure::new(vec![Statement::new(Clause::Discard {
            location: Expression::variable("$citation"),
        })]);
        let context = compile(&procedure);
        let assembly = &context.assembly;
        assert!(assembly.contains("STORE VARIABLE $$location-1"));
        assert!(assembly.contains("PUSH LITERAL `none`"));
        assert!(assembly.contains("STORE DRAFT $$location-1"));
    }

    #[test]
    fn test_checkout_assigns_recipient() {
        let procedure = Procedure::new(vec![Statement::new(Clause::Checkout {
            recipient: vellum_ast::Recipient::Variable("$draft".to_string()),
            location: Expression::variable("$citation"),
        })]);
        let context = compile(&procedure);
        let assembly = &context.assembly;
        assert!(assembly.contains("LOAD DOCUMENT $$location-1"));
        assert!(assembly.contains("STORE VARIABLE $draft"));
    }

    #[test]
    fn test_temporaries_are_numbered_per_walker() {
        let procedure = Procedure::new(vec![
            Statement::new(Clause::Discard {
                location: Expression::variable("$a"),
            }),
            Statement::new(Clause::Discard {
                location: Expression::variable("$b"),
            }),
        ]);
        let context = compile(&procedure);
        assert!(context.assembly.contains("$$location-1"));
        assert!(context.assembly.contains("$$location-2"));
    }

    #[test]
    fn test_statement_numbering_advances() {
        let procedure = Procedure::new(vec![
            Statement::new(Clause::Evaluate {
                recipient: None,
                expression: Expression::element("1"),
            }),
            Statement::new(Clause::Return { expression: None }),
        ]);
        let context = compile(&procedure);
        assert!(context.assembly.contains("1.EvaluateStatement:"));
        assert!(context.assembly.contains("2.ReturnStatement:"));
    }

    #[test]
    fn test_if_with_terminating_branches_still_resolves_done_label() {
        let returning = Procedure::new(vec![Statement::new(Clause::Return {
            expression: Some(Expression::element("true")),
        })]);
        let procedure = Procedure::new(vec![Statement::new(Clause::If {
            branches: vec![ConditionBlock {
                condition: Expression::element("true"),
                block: returning.clone(),
            }],
            else_block: Some(returning),
        })]);
        let context = compile(&procedure);
        // Both branches return, but the done label is referenced and so
        // must resolve; the finaliser provides its instruction.
        assert!(context.address_of("1.IfStatementDone").is_some());
        assert!(context.assembly.ends_with("HANDLE RESULT\n"));
    }
}
