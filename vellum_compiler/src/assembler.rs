//! Assembler: canonical assembly text to packed bytecode.
//!
//! Assembly happens in two steps. The text is first re-parsed into the
//! symbolic instruction list, then each instruction is encoded into one
//! 16-bit word by resolving its operand through the procedure and type
//! tables: labels through the address table, literals/constants/
//! parameters through the type context, variables and sub-procedures
//! through the procedure context, and intrinsics through the fixed
//! registry.

use vellum_core::context::{ProcedureContext, TypeContext};
use vellum_core::error::{VellumError, VellumResult};
use vellum_core::instruction::{
    ExecuteModifier, HandleModifier, Instruction, JumpModifier, Opcode, Operation, PopModifier,
    PushModifier, StorageModifier, Word,
};
use vellum_core::intrinsics;
use vellum_core::literal::Literal;

// =============================================================================
// Parsing
// =============================================================================

/// Parse canonical assembly text into its instruction list.
///
/// Labels occupy their own `:`-terminated lines, blank lines are
/// ignored, and literal operands may span lines (the parser consumes
/// through the closing backtick).
pub fn parse(source: &str) -> VellumResult<Vec<Instruction>> {
    let lines: Vec<&str> = source.lines().collect();
    let mut instructions = Vec::new();
    let mut pending_label: Option<String> = None;
    let mut index = 0;

    while index < lines.len() {
        let line_number = (index + 1) as u32;
        let line = lines[index].trim();
        index += 1;

        if line.is_empty() {
            continue;
        }

        if let Some(label) = line.strip_suffix(':') {
            if pending_label.is_some() {
                return Err(VellumError::parse(
                    "two labels bound to one instruction",
                    line_number,
                ));
            }
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(VellumError::parse(
                    format!("malformed label `{}`", label),
                    line_number,
                ));
            }
            pending_label = Some(label.to_string());
            continue;
        }

        let address = (instructions.len() + 1) as u16;
        let operation = if let Some(rest) = strip_keywords(line, &["PUSH", "LITERAL"]) {
            parse_literal_operand(rest, &lines, &mut index, line_number)?
        } else {
            parse_operation(line, line_number, address)?
        };

        instructions.push(Instruction {
            label: pending_label.take(),
            operation,
        });
    }

    if pending_label.is_some() {
        return Err(VellumError::parse(
            "label is not attached to any instruction",
            lines.len() as u32,
        ));
    }

    Ok(instructions)
}

/// Strip a sequence of leading keywords, returning the remainder.
fn strip_keywords<'a>(line: &'a str, keywords: &[&str]) -> Option<&'a str> {
    let mut rest = line;
    for keyword in keywords {
        rest = rest.strip_prefix(keyword)?.trim_start();
    }
    Some(rest)
}

/// Parse a backtick-quoted literal, consuming continuation lines when
/// the literal spans more than one (source blocks do).
fn parse_literal_operand(
    rest: &str,
    lines: &[&str],
    index: &mut usize,
    line_number: u32,
) -> VellumResult<Operation> {
    let rest = rest
        .strip_prefix('`')
        .ok_or_else(|| VellumError::parse("expected ` after PUSH LITERAL", line_number))?;

    let mut literal = String::new();
    let mut remainder = rest;
    loop {
        if let Some(end) = remainder.find('`') {
            literal.push_str(&remainder[..end]);
            if !remainder[end + 1..].trim().is_empty() {
                return Err(VellumError::parse(
                    "unexpected text after closing `",
                    line_number,
                ));
            }
            break;
        }
        literal.push_str(remainder);
        literal.push('\n');
        if *index >= lines.len() {
            return Err(VellumError::parse("unterminated literal", line_number));
        }
        remainder = lines[*index];
        *index += 1;
    }

    Ok(Operation::PushLiteral { literal })
}

/// Parse one single-line instruction.
fn parse_operation(line: &str, line_number: u32, address: u16) -> VellumResult<Operation> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let malformed = || VellumError::parse(format!("malformed instruction `{}`", line), line_number);

    match tokens[0] {
        "SKIP" => match tokens[..] {
            ["SKIP", "INSTRUCTION"] => Ok(Operation::Skip),
            _ => Err(malformed()),
        },
        "JUMP" => {
            let target = match tokens[..] {
                ["JUMP", "TO", target, ..] => target.to_string(),
                _ => return Err(malformed()),
            };
            let condition = match tokens[3..] {
                [] => JumpModifier::OnAny,
                ["ON", "NONE"] => JumpModifier::OnNone,
                ["ON", "TRUE"] => JumpModifier::OnTrue,
                ["ON", "FALSE"] => JumpModifier::OnFalse,
                _ => return Err(malformed()),
            };
            Ok(Operation::Jump { target, condition })
        }
        "PUSH" => match tokens[..] {
            ["PUSH", "HANDLER", handler] => Ok(Operation::PushHandler {
                handler: handler.to_string(),
            }),
            ["PUSH", "CONSTANT", constant] => Ok(Operation::PushConstant {
                constant: symbol(constant, line_number)?,
            }),
            ["PUSH", "PARAMETER", parameter] => Ok(Operation::PushParameter {
                parameter: symbol(parameter, line_number)?,
            }),
            _ => Err(malformed()),
        },
        "POP" => match tokens[..] {
            ["POP", "HANDLER"] => Ok(Operation::Pop {
                target: PopModifier::Handler,
            }),
            ["POP", "COMPONENT"] => Ok(Operation::Pop {
                target: PopModifier::Component,
            }),
            _ => Err(malformed()),
        },
        "LOAD" | "STORE" => {
            let (keyword, modifier, name) = match tokens[..] {
                [keyword, modifier, name] => (keyword, modifier, name),
                _ => return Err(malformed()),
            };
            let storage = match modifier {
                "VARIABLE" => StorageModifier::Variable,
                "MESSAGE" => StorageModifier::Message,
                "DRAFT" => StorageModifier::Draft,
                "DOCUMENT" => StorageModifier::Document,
                _ => return Err(malformed()),
            };
            let name = symbol(name, line_number)?;
            if keyword == "LOAD" {
                Ok(Operation::Load {
                    source: storage,
                    symbol: name,
                })
            } else {
                Ok(Operation::Store {
                    destination: storage,
                    symbol: name,
                })
            }
        }
        "INVOKE" => {
            let intrinsic = match tokens[..] {
                ["INVOKE", intrinsic, ..] => symbol(intrinsic, line_number)?,
                _ => return Err(malformed()),
            };
            let arguments = match tokens[2..] {
                [] => 0,
                ["WITH", "PARAMETER"] => 1,
                ["WITH", count, "PARAMETERS"] => {
                    let count: u8 = count.parse().map_err(|_| malformed())?;
                    if !(2..=3).contains(&count) {
                        return Err(VellumError::parse(
                            format!("invalid argument count {}", count),
                            line_number,
                        ));
                    }
                    count
                }
                _ => return Err(malformed()),
            };
            Ok(Operation::Invoke {
                intrinsic,
                arguments,
            })
        }
        "EXECUTE" => {
            let procedure = match tokens[..] {
                ["EXECUTE", procedure, ..] => symbol(procedure, line_number)?,
                _ => return Err(malformed()),
            };
            let modifier = match tokens[2..] {
                [] => ExecuteModifier::WithNothing,
                ["WITH", "PARAMETERS"] => ExecuteModifier::WithParameters,
                ["ON", "TARGET"] => ExecuteModifier::OnTarget,
                ["ON", "TARGET", "WITH", "PARAMETERS"] => {
                    ExecuteModifier::OnTargetWithParameters
                }
                _ => return Err(malformed()),
            };
            Ok(Operation::Execute {
                procedure,
                modifier,
            })
        }
        "HANDLE" => match tokens[..] {
            ["HANDLE", "EXCEPTION"] => Ok(Operation::Handle {
                outcome: HandleModifier::Exception,
            }),
            ["HANDLE", "RESULT"] => Ok(Operation::Handle {
                outcome: HandleModifier::Result,
            }),
            _ => Err(malformed()),
        },
        operation => Err(VellumError::invalid_operation(operation, address)),
    }
}

fn symbol(token: &str, line_number: u32) -> VellumResult<String> {
    if !token.starts_with('$') || token.len() < 2 {
        return Err(VellumError::parse(
            format!("expected a symbol, got `{}`", token),
            line_number,
        ));
    }
    Ok(token.to_string())
}

// =============================================================================
// Encoding
// =============================================================================

/// Encodes parsed instructions into bytecode words.
#[derive(Debug, Default)]
pub struct Assembler;

impl Assembler {
    /// Create an assembler.
    #[must_use]
    pub fn new() -> Self {
        Assembler
    }

    /// Assemble a compiled procedure context in place.
    ///
    /// Re-parses the context's canonical assembly, encodes every
    /// instruction, and attaches both the parsed list and the packed
    /// word sequence to the context.
    pub fn assemble_procedure(
        &self,
        types: &mut TypeContext,
        context: &mut ProcedureContext,
    ) -> VellumResult<()> {
        let instructions = parse(&context.assembly)?;
        let mut bytecode = Vec::with_capacity(instructions.len());
        for instruction in &instructions {
            bytecode.push(self.encode(types, context, &instruction.operation)?);
        }
        context.instructions = instructions;
        context.bytecode = bytecode;
        Ok(())
    }

    /// Encode one operation into its machine word.
    fn encode(
        &self,
        types: &mut TypeContext,
        context: &mut ProcedureContext,
        operation: &Operation,
    ) -> VellumResult<Word> {
        let word = match operation {
            Operation::Skip => Word::SKIP,
            Operation::Jump { target, condition } => {
                let address = context.address_of(target).ok_or_else(|| {
                    VellumError::invalid_reference(target, "undefined jump label")
                })?;
                Word::pack(Opcode::Jump, *condition as u8, address)
            }
            Operation::PushHandler { handler } => {
                let address = context.address_of(handler).ok_or_else(|| {
                    VellumError::invalid_reference(handler, "undefined handler label")
                })?;
                Word::pack(Opcode::Push, PushModifier::Handler as u8, address)
            }
            Operation::PushLiteral { literal } => {
                let index = types.literals.intern(Literal::from_text(literal));
                Word::pack(Opcode::Push, PushModifier::Literal as u8, index)
            }
            Operation::PushConstant { constant } => {
                let index = types.constants.index_of(constant).ok_or_else(|| {
                    VellumError::invalid_reference(constant, "undefined constant")
                })?;
                Word::pack(Opcode::Push, PushModifier::Constant as u8, index)
            }
            Operation::PushParameter { parameter } => {
                let index = context.parameters.index_of(parameter).ok_or_else(|| {
                    VellumError::invalid_reference(parameter, "undefined parameter")
                })?;
                Word::pack(Opcode::Push, PushModifier::Parameter as u8, index)
            }
            Operation::Pop { target } => Word::pack(Opcode::Pop, *target as u8, 0),
            Operation::Load { source, symbol } => {
                let index = context.variables.intern(symbol.clone());
                Word::pack(Opcode::Load, *source as u8, index)
            }
            Operation::Store {
                destination,
                symbol,
            } => {
                let index = context.variables.intern(symbol.clone());
                Word::pack(Opcode::Store, *destination as u8, index)
            }
            Operation::Invoke {
                intrinsic,
                arguments,
            } => {
                let index = intrinsics::index(intrinsic).ok_or_else(|| {
                    VellumError::invalid_reference(intrinsic, "unknown intrinsic function")
                })?;
                Word::pack(Opcode::Invoke, *arguments, index)
            }
            Operation::Execute {
                procedure,
                modifier,
            } => {
                let index = context.procedures.intern(procedure.clone());
                Word::pack(Opcode::Execute, *modifier as u8, index)
            }
            Operation::Handle { outcome } => Word::pack(Opcode::Handle, *outcome as u8, 0),
        };
        Ok(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels_and_instructions() {
        let text = "1.ReturnStatement:\nPUSH LITERAL `true`\nHANDLE RESULT\n";
        let instructions = parse(text).unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].label.as_deref(), Some("1.ReturnStatement"));
        assert_eq!(
            instructions[0].operation,
            Operation::PushLiteral {
                literal: "true".to_string()
            }
        );
        assert_eq!(instructions[1].label, None);
    }

    #[test]
    fn test_parse_jump_conditions() {
        let instructions =
            parse("JUMP TO 1.Done\nJUMP TO 1.Done ON FALSE\nJUMP TO 1.Done ON NONE\n").unwrap();
        let conditions: Vec<_> = instructions
            .iter()
            .map(|instruction| match &instruction.operation {
                Operation::Jump { condition, .. } => *condition,
                other => panic!("unexpected operation {:?}", other),
            })
            .collect();
        assert_eq!(
            conditions,
            vec![
                JumpModifier::OnAny,
                JumpModifier::OnFalse,
                JumpModifier::OnNone
            ]
        );
    }

    #[test]
    fn test_parse_multi_line_literal() {
        let text = "PUSH LITERAL `{\n    return none\n}`\n";
        let instructions = parse(text).unwrap();
        assert_eq!(
            instructions[0].operation,
            Operation::PushLiteral {
                literal: "{\n    return none\n}".to_string()
            }
        );
    }

    #[test]
    fn test_parse_unterminated_literal() {
        let error = parse("PUSH LITERAL `{\nreturn none\n").unwrap_err();
        assert!(matches!(error, VellumError::Parse { .. }));
    }

    #[test]
    fn test_parse_unknown_operation() {
        let error = parse("SKIP INSTRUCTION\nFROB $x\n").unwrap_err();
        match error {
            VellumError::InvalidOperation { operation, address } => {
                assert_eq!(operation, "FROB");
                assert_eq!(address, 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_dangling_label() {
        assert!(parse("1.Done:\n").is_err());
        assert!(parse("1.One:\n1.Two:\nHANDLE RESULT\n").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_argument_count() {
        assert!(parse("INVOKE $sum WITH 4 PARAMETERS\n").is_err());
        assert!(parse("INVOKE $sum WITH 0 PARAMETERS\n").is_err());
    }

    #[test]
    fn test_encode_resolves_tables() {
        let mut types = TypeContext::new();
        let mut context = ProcedureContext::default();
        context.assembly = "1.Start:\nPUSH LITERAL `42`\nSTORE VARIABLE $x\nJUMP TO 1.Start\n"
            .to_string();
        context.addresses.insert("1.Start".to_string(), 1);

        Assembler::new()
            .assemble_procedure(&mut types, &mut context)
            .unwrap();

        assert_eq!(context.bytecode.len(), 3);
        let push = context.bytecode[0];
        assert_eq!(push.opcode(), Opcode::Push);
        assert_eq!(push.modifier(), PushModifier::Literal as u8);
        assert_eq!(
            push.operand(),
            types
                .literals
                .index_of(&Literal::from_text("42"))
                .unwrap()
        );
        let store = context.bytecode[1];
        assert_eq!(store.opcode(), Opcode::Store);
        assert_eq!(
            store.operand(),
            context.variables.index_of(&"$x".to_string()).unwrap()
        );
        let jump = context.bytecode[2];
        assert_eq!(jump.opcode(), Opcode::Jump);
        assert_eq!(jump.operand(), 1);
    }

    #[test]
    fn test_encode_rejects_undefined_label() {
        let mut types = TypeContext::new();
        let mut context = ProcedureContext::default();
        context.assembly = "JUMP TO 1.Missing\n".to_string();
        let error = Assembler::new()
            .assemble_procedure(&mut types, &mut context)
            .unwrap_err();
        assert!(matches!(error, VellumError::InvalidReference { .. }));
    }

    #[test]
    fn test_encode_rejects_unknown_intrinsic() {
        let mut types = TypeContext::new();
        let mut context = ProcedureContext::default();
        context.assembly = "INVOKE $frobnicate WITH 2 PARAMETERS\n".to_string();
        let error = Assembler::new()
            .assemble_procedure(&mut types, &mut context)
            .unwrap_err();
        assert!(matches!(error, VellumError::InvalidReference { .. }));
    }

    #[test]
    fn test_skip_encodes_to_zero_word() {
        let mut types = TypeContext::new();
        let mut context = ProcedureContext::default();
        context.assembly = "SKIP INSTRUCTION\n".to_string();
        Assembler::new()
            .assemble_procedure(&mut types, &mut context)
            .unwrap();
        assert_eq!(context.bytecode, vec![Word::SKIP]);
    }
}
