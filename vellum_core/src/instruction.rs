//! Instruction model and bytecode word encoding.
//!
//! Instructions exist in two forms:
//!
//! - [`Instruction`] — the symbolic form produced by the compiler and
//!   re-parsed from canonical assembly text. Operands are labels, symbols,
//!   and literal text.
//! - [`Word`] — the packed 16-bit machine form produced by the assembler.
//!   Operands are 1-based indices into the procedure and type tables.
//!
//! # Word layout
//!
//! Each word holds exactly one operation, one modifier, and one operand:
//!
//! ```text
//! 15      13 12   11 10                    0
//! ┌─────────┬───────┬───────────────────────┐
//! │ opcode  │ mod   │ operand               │
//! └─────────┴───────┴───────────────────────┘
//!     3 bits   2 bits   11 bits
//! ```
//!
//! Every modifier taxonomy has at most four members, so two bits are
//! sufficient and the three fields exactly fill the word. `SKIP
//! INSTRUCTION` is the all-zero word — the zero-operand degenerate of
//! JUMP, encoded distinctly so the processor can fast-path it. Words
//! serialise as two bytes each, most-significant byte first.

use std::fmt;

/// Maximum operand value representable in a word (11 bits).
pub const MAX_OPERAND: u16 = 0x07FF;

// =============================================================================
// Opcodes and Modifiers
// =============================================================================

/// The eight operations of the virtual processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Transfer control to an address, possibly conditionally.
    Jump = 0,
    /// Push a handler address or an indexed component onto a stack.
    Push = 1,
    /// Discard the top of the handler or component stack.
    Pop = 2,
    /// Load a component through a variable onto the component stack.
    Load = 3,
    /// Store the top of the component stack through a variable.
    Store = 4,
    /// Invoke an intrinsic function with 0–3 arguments.
    Invoke = 5,
    /// Execute a sub-procedure, optionally on a target with arguments.
    Execute = 6,
    /// Hand the top of the component stack back as a result or exception.
    Handle = 7,
}

impl Opcode {
    /// Decode an opcode from its 3-bit field value.
    #[inline]
    pub const fn from_bits(bits: u8) -> Option<Opcode> {
        match bits {
            0 => Some(Opcode::Jump),
            1 => Some(Opcode::Push),
            2 => Some(Opcode::Pop),
            3 => Some(Opcode::Load),
            4 => Some(Opcode::Store),
            5 => Some(Opcode::Invoke),
            6 => Some(Opcode::Execute),
            7 => Some(Opcode::Handle),
            _ => None,
        }
    }
}

/// Condition under which a JUMP transfers control.
///
/// All conditional forms pop the component they test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum JumpModifier {
    /// Transfer unconditionally (the zero/default modifier).
    #[default]
    OnAny = 0,
    /// Transfer when the popped component is `none`.
    OnNone = 1,
    /// Transfer when the popped component is `true`.
    OnTrue = 2,
    /// Transfer when the popped component is `false`.
    OnFalse = 3,
}

/// What a PUSH instruction places on which stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PushModifier {
    /// Push an exception handler address onto the handler stack.
    Handler = 0,
    /// Push an indexed literal onto the component stack.
    Literal = 1,
    /// Push an indexed named constant onto the component stack.
    Constant = 2,
    /// Push an indexed procedure parameter onto the component stack.
    Parameter = 3,
}

/// What a POP instruction discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PopModifier {
    /// Discard the top of the handler stack.
    Handler = 0,
    /// Discard the top of the component stack.
    Component = 1,
}

/// The namespace a LOAD or STORE accesses through its variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageModifier {
    /// The variable itself.
    Variable = 0,
    /// A message queue addressed by the variable.
    Message = 1,
    /// A draft document addressed by the variable.
    Draft = 2,
    /// A committed document addressed by the variable.
    Document = 3,
}

/// How a sub-procedure is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ExecuteModifier {
    /// Execute with no target and no arguments (the zero/default form).
    #[default]
    WithNothing = 0,
    /// Execute with an argument list popped from the component stack.
    WithParameters = 1,
    /// Execute on a target component popped from the component stack.
    OnTarget = 2,
    /// Execute on a target with an argument list, both popped.
    OnTargetWithParameters = 3,
}

/// Whether a HANDLE instruction yields a result or raises an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandleModifier {
    /// Unwind to the most recent handler with the popped exception.
    Exception = 0,
    /// Return the popped component as the procedure's result.
    Result = 1,
}

// =============================================================================
// Symbolic Instructions
// =============================================================================

/// A symbolic instruction, optionally carrying the label bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The label attached to this instruction's address, if any.
    pub label: Option<String>,
    /// The operation itself.
    pub operation: Operation,
}

impl Instruction {
    /// Create an unlabelled instruction.
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Instruction {
            label: None,
            operation,
        }
    }

    /// Create a labelled instruction.
    #[must_use]
    pub fn labelled(label: impl Into<String>, operation: Operation) -> Self {
        Instruction {
            label: Some(label.into()),
            operation,
        }
    }
}

/// The symbolic form of each operation, with textual operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// `SKIP INSTRUCTION` — does nothing; exists so two labels can bind
    /// to consecutive addresses.
    Skip,
    /// `JUMP TO <label> [ON NONE|TRUE|FALSE]`
    Jump {
        /// The target label.
        target: String,
        /// The transfer condition.
        condition: JumpModifier,
    },
    /// `PUSH HANDLER <label>`
    PushHandler {
        /// The label of the exception handler.
        handler: String,
    },
    /// ``PUSH LITERAL `<text>` ``
    PushLiteral {
        /// The literal text, without the backticks.
        literal: String,
    },
    /// `PUSH CONSTANT <symbol>`
    PushConstant {
        /// The constant's symbol.
        constant: String,
    },
    /// `PUSH PARAMETER <symbol>`
    PushParameter {
        /// The parameter's symbol.
        parameter: String,
    },
    /// `POP HANDLER` or `POP COMPONENT`
    Pop {
        /// Which stack is popped.
        target: PopModifier,
    },
    /// `LOAD VARIABLE|MESSAGE|DRAFT|DOCUMENT <symbol>`
    Load {
        /// The namespace loaded from.
        source: StorageModifier,
        /// The variable symbol.
        symbol: String,
    },
    /// `STORE VARIABLE|MESSAGE|DRAFT|DOCUMENT <symbol>`
    Store {
        /// The namespace stored into.
        destination: StorageModifier,
        /// The variable symbol.
        symbol: String,
    },
    /// `INVOKE <intrinsic> [WITH PARAMETER | WITH <n> PARAMETERS]`
    Invoke {
        /// The intrinsic function's symbol.
        intrinsic: String,
        /// The number of arguments (0–3).
        arguments: u8,
    },
    /// `EXECUTE <procedure> [WITH PARAMETERS | ON TARGET [WITH PARAMETERS]]`
    Execute {
        /// The sub-procedure's symbol.
        procedure: String,
        /// How the sub-procedure receives its target and arguments.
        modifier: ExecuteModifier,
    },
    /// `HANDLE EXCEPTION` or `HANDLE RESULT`
    Handle {
        /// Whether control leaves with a result or an exception.
        outcome: HandleModifier,
    },
}

impl Operation {
    /// The opcode this operation encodes to.
    pub fn opcode(&self) -> Opcode {
        match self {
            Operation::Skip | Operation::Jump { .. } => Opcode::Jump,
            Operation::PushHandler { .. }
            | Operation::PushLiteral { .. }
            | Operation::PushConstant { .. }
            | Operation::PushParameter { .. } => Opcode::Push,
            Operation::Pop { .. } => Opcode::Pop,
            Operation::Load { .. } => Opcode::Load,
            Operation::Store { .. } => Opcode::Store,
            Operation::Invoke { .. } => Opcode::Invoke,
            Operation::Execute { .. } => Opcode::Execute,
            Operation::Handle { .. } => Opcode::Handle,
        }
    }
}

impl fmt::Display for Operation {
    /// Renders the canonical single-line text form. Modifiers that equal
    /// the zero/default value are omitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Skip => write!(f, "SKIP INSTRUCTION"),
            Operation::Jump { target, condition } => {
                write!(f, "JUMP TO {}", target)?;
                match condition {
                    JumpModifier::OnAny => Ok(()),
                    JumpModifier::OnNone => write!(f, " ON NONE"),
                    JumpModifier::OnTrue => write!(f, " ON TRUE"),
                    JumpModifier::OnFalse => write!(f, " ON FALSE"),
                }
            }
            Operation::PushHandler { handler } => write!(f, "PUSH HANDLER {}", handler),
            Operation::PushLiteral { literal } => write!(f, "PUSH LITERAL `{}`", literal),
            Operation::PushConstant { constant } => write!(f, "PUSH CONSTANT {}", constant),
            Operation::PushParameter { parameter } => write!(f, "PUSH PARAMETER {}", parameter),
            Operation::Pop { target } => match target {
                PopModifier::Handler => write!(f, "POP HANDLER"),
                PopModifier::Component => write!(f, "POP COMPONENT"),
            },
            Operation::Load { source, symbol } => {
                write!(f, "LOAD {} {}", storage_keyword(*source), symbol)
            }
            Operation::Store {
                destination,
                symbol,
            } => write!(f, "STORE {} {}", storage_keyword(*destination), symbol),
            Operation::Invoke {
                intrinsic,
                arguments,
            } => match arguments {
                0 => write!(f, "INVOKE {}", intrinsic),
                1 => write!(f, "INVOKE {} WITH PARAMETER", intrinsic),
                n => write!(f, "INVOKE {} WITH {} PARAMETERS", intrinsic, n),
            },
            Operation::Execute {
                procedure,
                modifier,
            } => {
                write!(f, "EXECUTE {}", procedure)?;
                match modifier {
                    ExecuteModifier::WithNothing => Ok(()),
                    ExecuteModifier::WithParameters => write!(f, " WITH PARAMETERS"),
                    ExecuteModifier::OnTarget => write!(f, " ON TARGET"),
                    ExecuteModifier::OnTargetWithParameters => {
                        write!(f, " ON TARGET WITH PARAMETERS")
                    }
                }
            }
            Operation::Handle { outcome } => match outcome {
                HandleModifier::Exception => write!(f, "HANDLE EXCEPTION"),
                HandleModifier::Result => write!(f, "HANDLE RESULT"),
            },
        }
    }
}

fn storage_keyword(modifier: StorageModifier) -> &'static str {
    match modifier {
        StorageModifier::Variable => "VARIABLE",
        StorageModifier::Message => "MESSAGE",
        StorageModifier::Draft => "DRAFT",
        StorageModifier::Document => "DOCUMENT",
    }
}

// =============================================================================
// Machine Words
// =============================================================================

/// A packed 16-bit bytecode word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Word(pub u16);

impl Word {
    /// The SKIP word: all fields zero.
    pub const SKIP: Word = Word(0);

    /// Pack an opcode, modifier value, and operand into a word.
    ///
    /// The operand must fit in 11 bits and the modifier in 2.
    #[inline]
    #[must_use]
    pub fn pack(opcode: Opcode, modifier: u8, operand: u16) -> Word {
        debug_assert!(modifier < 4, "modifier out of range: {}", modifier);
        debug_assert!(operand <= MAX_OPERAND, "operand out of range: {}", operand);
        Word(((opcode as u16) << 13) | ((modifier as u16 & 0x3) << 11) | (operand & MAX_OPERAND))
    }

    /// The 3-bit opcode field.
    #[inline]
    pub fn opcode(self) -> Opcode {
        // All eight field values are valid opcodes.
        Opcode::from_bits((self.0 >> 13) as u8).unwrap()
    }

    /// The 2-bit modifier field.
    #[inline]
    pub const fn modifier(self) -> u8 {
        ((self.0 >> 11) & 0x3) as u8
    }

    /// The 11-bit operand field.
    #[inline]
    pub const fn operand(self) -> u16 {
        self.0 & MAX_OPERAND
    }

    /// Whether this word is the SKIP fast path.
    #[inline]
    pub const fn is_skip(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Serialise a word sequence as bytes, most-significant byte first.
pub fn to_bytes(words: &[Word]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        bytes.extend_from_slice(&word.0.to_be_bytes());
    }
    bytes
}

/// Reassemble a big-endian byte sequence into words.
///
/// The byte count must be even.
pub fn from_bytes(bytes: &[u8]) -> Option<Vec<Word>> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(2)
            .map(|pair| Word(u16::from_be_bytes([pair[0], pair[1]])))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_is_all_zero() {
        assert_eq!(Word::SKIP.0, 0);
        assert!(Word::SKIP.is_skip());
        assert_eq!(Word::SKIP.opcode(), Opcode::Jump);
        assert_eq!(Word::SKIP.modifier(), 0);
        assert_eq!(Word::SKIP.operand(), 0);
    }

    #[test]
    fn test_pack_and_field_extraction() {
        let word = Word::pack(Opcode::Push, PushModifier::Literal as u8, 42);
        assert_eq!(word.opcode(), Opcode::Push);
        assert_eq!(word.modifier(), PushModifier::Literal as u8);
        assert_eq!(word.operand(), 42);
    }

    #[test]
    fn test_pack_round_trips_all_opcodes() {
        for bits in 0..8u8 {
            let opcode = Opcode::from_bits(bits).unwrap();
            for modifier in 0..4u8 {
                let word = Word::pack(opcode, modifier, MAX_OPERAND);
                assert_eq!(word.opcode(), opcode);
                assert_eq!(word.modifier(), modifier);
                assert_eq!(word.operand(), MAX_OPERAND);
            }
        }
    }

    #[test]
    fn test_bytes_are_big_endian() {
        let words = vec![Word::pack(Opcode::Handle, HandleModifier::Result as u8, 0)];
        let bytes = to_bytes(&words);
        assert_eq!(bytes.len(), 2);
        assert_eq!(bytes[0], 0xE8); // opcode 7, modifier 1: 1110 1000
        assert_eq!(bytes[1], 0x00);
        assert_eq!(from_bytes(&bytes).unwrap(), words);
    }

    #[test]
    fn test_from_bytes_rejects_odd_length() {
        assert!(from_bytes(&[0x00]).is_none());
    }

    #[test]
    fn test_display_omits_zero_modifiers() {
        let jump = Operation::Jump {
            target: "1.LoopDone".to_string(),
            condition: JumpModifier::OnAny,
        };
        assert_eq!(jump.to_string(), "JUMP TO 1.LoopDone");

        let execute = Operation::Execute {
            procedure: "$refresh".to_string(),
            modifier: ExecuteModifier::WithNothing,
        };
        assert_eq!(execute.to_string(), "EXECUTE $refresh");

        let invoke = Operation::Invoke {
            intrinsic: "$catalog".to_string(),
            arguments: 0,
        };
        assert_eq!(invoke.to_string(), "INVOKE $catalog");
    }

    #[test]
    fn test_display_argument_count_wording() {
        let one = Operation::Invoke {
            intrinsic: "$parameters".to_string(),
            arguments: 1,
        };
        assert_eq!(one.to_string(), "INVOKE $parameters WITH PARAMETER");
        let two = Operation::Invoke {
            intrinsic: "$sum".to_string(),
            arguments: 2,
        };
        assert_eq!(two.to_string(), "INVOKE $sum WITH 2 PARAMETERS");
    }

    #[test]
    fn test_operation_opcodes() {
        assert_eq!(Operation::Skip.opcode(), Opcode::Jump);
        assert_eq!(
            Operation::Invoke {
                intrinsic: "$sum".to_string(),
                arguments: 2
            }
            .opcode(),
            Opcode::Invoke
        );
    }
}
