//! Procedure compiler and assembler for the Vellum virtual processor.
//!
//! The pipeline transforms a parsed procedure tree in two phases:
//!
//! 1. **Compilation** ([`Compiler`]): walks the syntax tree and emits
//!    symbolic instructions through the [`InstructionBuilder`],
//!    synthesising control-flow labels, temporary variables, exception
//!    scaffolding, and collection-building sequences. The result is a
//!    [`vellum_core::ProcedureContext`] holding the canonical assembly
//!    text and the populated symbol tables.
//! 2. **Assembly** ([`Assembler`]): re-parses the canonical assembly and
//!    packs each instruction into a 16-bit machine word, resolving label
//!    and symbol operands through the context tables.
//!
//! ```
//! use vellum_ast::{Clause, Expression, Procedure, Statement};
//! use vellum_compiler::{Assembler, Compiler};
//! use vellum_core::TypeContext;
//!
//! let procedure = Procedure::new(vec![Statement::new(Clause::Return {
//!     expression: Some(Expression::element("true")),
//! })]);
//!
//! let mut types = TypeContext::new();
//! let mut context = Compiler::compile(&mut types, Vec::<String>::new(), &procedure)?;
//! Assembler::new().assemble_procedure(&mut types, &mut context)?;
//! assert_eq!(context.bytecode.len(), 2);
//! # Ok::<(), vellum_core::VellumError>(())
//! ```

pub mod assembler;
pub mod builder;
pub mod compiler;
mod expression;
pub mod formatter;

pub use assembler::{parse, Assembler};
pub use builder::InstructionBuilder;
pub use compiler::Compiler;
pub use formatter::format_instructions;
