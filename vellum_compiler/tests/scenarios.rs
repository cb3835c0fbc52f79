//! End-to-end compilation and assembly scenarios.

use vellum_ast::{
    Argument, Clause, CollectionItem, CollectionKind, ConditionBlock, Expression, Procedure,
    Statement,
};
use vellum_compiler::{Assembler, Compiler};
use vellum_core::instruction::{HandleModifier, Opcode, PushModifier};
use vellum_core::literal::Literal;
use vellum_core::{TypeContext, VellumError};

fn compile_and_assemble(
    procedure: &Procedure,
) -> (TypeContext, vellum_core::ProcedureContext) {
    let mut types = TypeContext::new();
    let mut context =
        Compiler::compile(&mut types, Vec::<String>::new(), procedure).expect("compile failed");
    Assembler::new()
        .assemble_procedure(&mut types, &mut context)
        .expect("assemble failed");
    (types, context)
}

fn evaluate(expression: Expression) -> Statement {
    Statement::new(Clause::Evaluate {
        recipient: None,
        expression,
    })
}

#[test]
fn single_return_of_a_literal() {
    let procedure = Procedure::new(vec![Statement::new(Clause::Return {
        expression: Some(Expression::element("true")),
    })]);
    let (types, context) = compile_and_assemble(&procedure);

    assert_eq!(
        context.assembly,
        "1.ReturnStatement:\nPUSH LITERAL `true`\nHANDLE RESULT\n"
    );

    assert_eq!(context.bytecode.len(), 2);
    let push = context.bytecode[0];
    assert_eq!(push.opcode(), Opcode::Push);
    assert_eq!(push.modifier(), PushModifier::Literal as u8);
    assert_eq!(
        push.operand(),
        types
            .literals
            .index_of(&Literal::Boolean(true))
            .expect("`true` not interned")
    );
    let handle = context.bytecode[1];
    assert_eq!(handle.opcode(), Opcode::Handle);
    assert_eq!(handle.modifier(), HandleModifier::Result as u8);
}

#[test]
fn empty_procedure_gets_result_finaliser() {
    let (_, context) = compile_and_assemble(&Procedure::default());
    assert_eq!(
        context.assembly,
        "LOAD VARIABLE $$result\nHANDLE RESULT\n"
    );
    assert_eq!(context.bytecode.len(), 2);
    assert!(context.variables.contains(&"$$result".to_string()));
    assert!(context.variables.contains(&"$target".to_string()));
}

#[test]
fn if_then_else_chain() {
    let block = |symbol: &str| {
        Procedure::new(vec![Statement::new(Clause::Evaluate {
            recipient: Some(vellum_ast::Recipient::Variable("$x".to_string())),
            expression: Expression::element(symbol),
        })])
    };
    let procedure = Procedure::new(vec![Statement::new(Clause::If {
        branches: vec![
            ConditionBlock {
                condition: Expression::element("true"),
                block: block("1"),
            },
            ConditionBlock {
                condition: Expression::element("false"),
                block: block("2"),
            },
        ],
        else_block: Some(block("3")),
    })]);
    let (_, context) = compile_and_assemble(&procedure);
    let assembly = &context.assembly;

    for label in [
        "1.1.ConditionClause:",
        "1.2.ConditionClause:",
        "1.ElseClause:",
        "1.IfStatementDone:",
    ] {
        assert!(assembly.contains(label), "missing {} in:\n{}", label, assembly);
    }

    let first_jump = assembly
        .lines()
        .find(|line| line.starts_with("JUMP"))
        .expect("no jump emitted");
    assert_eq!(first_jump, "JUMP TO 1.2.ConditionClause ON FALSE");

    // Each branch with a successor falls out through the done label.
    assert_eq!(assembly.matches("JUMP TO 1.IfStatementDone\n").count(), 2);
}

#[test]
fn break_outside_loop_is_rejected_with_no_output() {
    let mut types = TypeContext::new();
    let procedure = Procedure::new(vec![Statement::new(Clause::Break)]);
    let result = Compiler::compile(&mut types, Vec::<String>::new(), &procedure);
    assert_eq!(
        result.unwrap_err(),
        VellumError::no_enclosing_loop("break loop")
    );
}

#[test]
fn function_call_with_four_arguments_is_rejected() {
    let mut types = TypeContext::new();
    let arguments = ["$a", "$b", "$c", "$d"]
        .into_iter()
        .map(|symbol| Argument::positional(Expression::variable(symbol)))
        .collect();
    let procedure = Procedure::new(vec![evaluate(Expression::FunctionCall {
        function: "f".to_string(),
        arguments,
    })]);
    let result = Compiler::compile(&mut types, Vec::<String>::new(), &procedure);
    assert_eq!(
        result.unwrap_err(),
        VellumError::too_many_arguments("$f", 4)
    );
}

#[test]
fn with_each_over_a_list() {
    let list = Expression::Collection {
        kind: CollectionKind::List,
        items: vec![
            CollectionItem::Component(Expression::element("1")),
            CollectionItem::Component(Expression::element("2")),
        ],
        parameters: None,
    };
    let body = Procedure::new(vec![evaluate(Expression::variable("$item"))]);
    let procedure = Procedure::new(vec![Statement::new(Clause::With {
        item: "$item".to_string(),
        sequence: list,
        block: body,
    })]);
    let (_, context) = compile_and_assemble(&procedure);
    let assembly = &context.assembly;

    let expected = [
        "EXECUTE $getIterator ON TARGET",
        "1.1.IterationClause:",
        "EXECUTE $hasNext ON TARGET",
        "JUMP TO 1.WithStatementDone ON FALSE",
        "EXECUTE $getNext ON TARGET",
        "STORE VARIABLE $item",
    ];
    let mut position = 0;
    for needle in expected {
        let found = assembly[position..]
            .find(needle)
            .unwrap_or_else(|| panic!("missing `{}` in:\n{}", needle, assembly));
        position += found + needle.len();
    }

    // The loop tail jumps back to the iteration label unconditionally.
    let last_jump = assembly
        .lines()
        .filter(|line| line.starts_with("JUMP"))
        .next_back()
        .unwrap();
    assert_eq!(last_jump, "JUMP TO 1.1.IterationClause");
}

#[test]
fn shared_type_context_deduplicates_literals_across_procedures() {
    let mut types = TypeContext::new();
    let first = Procedure::new(vec![Statement::new(Clause::Return {
        expression: Some(Expression::element("true")),
    })]);
    let second = Procedure::new(vec![evaluate(Expression::element("true"))]);

    let mut one = Compiler::compile(&mut types, Vec::<String>::new(), &first).unwrap();
    let mut two = Compiler::compile(&mut types, Vec::<String>::new(), &second).unwrap();
    let assembler = Assembler::new();
    assembler.assemble_procedure(&mut types, &mut one).unwrap();
    assembler.assemble_procedure(&mut types, &mut two).unwrap();

    assert_eq!(types.literals.len(), 1);
    assert_eq!(one.bytecode[0].operand(), two.bytecode[0].operand());
}

#[test]
fn assembled_image_round_trips_through_bytes() {
    let procedure = Procedure::new(vec![Statement::new(Clause::Return {
        expression: Some(Expression::element("true")),
    })]);
    let (_, context) = compile_and_assemble(&procedure);
    let bytes = context.bytecode_bytes();
    assert_eq!(bytes.len(), context.bytecode.len() * 2);
    assert_eq!(
        vellum_core::instruction::from_bytes(&bytes).unwrap(),
        context.bytecode
    );
}
