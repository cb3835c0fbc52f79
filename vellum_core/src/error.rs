//! Structured errors surfaced by the compilation and assembly pipeline.
//!
//! Every error is fatal for the current compile: the walker and the
//! assembler never recover internally. Each variant carries a structured
//! payload describing the offending source construct or assembly step,
//! and maps to the module identifier of the component that raised it.

use std::fmt;

/// Result type used throughout the toolchain.
pub type VellumResult<T> = Result<T, VellumError>;

/// An error raised while compiling or assembling a procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum VellumError {
    /// Malformed assembly text encountered during the re-parse step.
    Parse {
        /// Human-readable description of the problem.
        message: String,
        /// Line number (1-indexed) in the assembly text.
        line: u32,
    },

    /// An assembly step carries an operation the encoder does not know.
    InvalidOperation {
        /// The offending operation text.
        operation: String,
        /// Address (1-based) of the step.
        address: u16,
    },

    /// A step references a label, symbol, or intrinsic that is undefined.
    InvalidReference {
        /// The unresolved label or symbol.
        reference: String,
        /// What kind of lookup failed.
        message: String,
    },

    /// A break or continue clause appears outside any loop statement.
    NoEnclosingLoop {
        /// The clause that attempted the escape.
        clause: String,
    },

    /// A function call supplies more than three positional arguments.
    TooManyArguments {
        /// The invoked function.
        function: String,
        /// The number of arguments supplied.
        count: usize,
    },

    /// An intrinsic was handed an argument of the wrong type.
    ArgumentType {
        /// The intrinsic performing the validation.
        intrinsic: String,
        /// Description of the expected type.
        message: String,
    },

    /// An intrinsic was handed an argument with an invalid value.
    ArgumentValue {
        /// The intrinsic performing the validation.
        intrinsic: String,
        /// Description of the violated constraint.
        message: String,
    },

    /// An intrinsic requires its arguments to share a type and they do not.
    SameType {
        /// The intrinsic performing the validation.
        intrinsic: String,
        /// Description of the mismatched types.
        message: String,
    },
}

impl VellumError {
    /// Create a parse error for a line of assembly text.
    pub fn parse(message: impl Into<String>, line: u32) -> Self {
        VellumError::Parse {
            message: message.into(),
            line,
        }
    }

    /// Create an invalid-operation error for an assembly step.
    pub fn invalid_operation(operation: impl Into<String>, address: u16) -> Self {
        VellumError::InvalidOperation {
            operation: operation.into(),
            address,
        }
    }

    /// Create an invalid-reference error for an unresolved operand.
    pub fn invalid_reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        VellumError::InvalidReference {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create a no-enclosing-loop error for a break or continue clause.
    pub fn no_enclosing_loop(clause: impl Into<String>) -> Self {
        VellumError::NoEnclosingLoop {
            clause: clause.into(),
        }
    }

    /// Create a too-many-arguments error for a function call.
    pub fn too_many_arguments(function: impl Into<String>, count: usize) -> Self {
        VellumError::TooManyArguments {
            function: function.into(),
            count,
        }
    }

    /// Create an argument-value error for an intrinsic validator.
    pub fn argument_value(intrinsic: impl Into<String>, message: impl Into<String>) -> Self {
        VellumError::ArgumentValue {
            intrinsic: intrinsic.into(),
            message: message.into(),
        }
    }

    /// The identifier of the module that raised this error.
    pub fn module(&self) -> &'static str {
        match self {
            VellumError::Parse { .. }
            | VellumError::InvalidOperation { .. }
            | VellumError::InvalidReference { .. } => "/compiler/assembler",
            VellumError::NoEnclosingLoop { .. } | VellumError::TooManyArguments { .. } => {
                "/compiler/walker"
            }
            VellumError::ArgumentType { .. }
            | VellumError::ArgumentValue { .. }
            | VellumError::SameType { .. } => "/compiler/intrinsics",
        }
    }
}

impl fmt::Display for VellumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VellumError::Parse { message, line } => {
                write!(f, "{}: line {}: {}", self.module(), line, message)
            }
            VellumError::InvalidOperation { operation, address } => {
                write!(
                    f,
                    "{}: invalid operation `{}` at address {}",
                    self.module(),
                    operation,
                    address
                )
            }
            VellumError::InvalidReference { reference, message } => {
                write!(f, "{}: {}: `{}`", self.module(), message, reference)
            }
            VellumError::NoEnclosingLoop { clause } => {
                write!(
                    f,
                    "{}: `{}` has no enclosing loop statement",
                    self.module(),
                    clause
                )
            }
            VellumError::TooManyArguments { function, count } => {
                write!(
                    f,
                    "{}: `{}` was called with {} arguments, at most 3 are allowed",
                    self.module(),
                    function,
                    count
                )
            }
            VellumError::ArgumentType { intrinsic, message }
            | VellumError::ArgumentValue { intrinsic, message }
            | VellumError::SameType { intrinsic, message } => {
                write!(f, "{}: {}: {}", self.module(), intrinsic, message)
            }
        }
    }
}

impl std::error::Error for VellumError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_identifiers() {
        assert_eq!(VellumError::parse("bad", 3).module(), "/compiler/assembler");
        assert_eq!(
            VellumError::no_enclosing_loop("break loop").module(),
            "/compiler/walker"
        );
        assert_eq!(
            VellumError::argument_value("$sum", "wrong count").module(),
            "/compiler/intrinsics"
        );
    }

    #[test]
    fn test_display_includes_module_and_payload() {
        let err = VellumError::invalid_reference("1.Missing", "undefined label");
        let text = err.to_string();
        assert!(text.contains("/compiler/assembler"));
        assert!(text.contains("1.Missing"));
    }

    #[test]
    fn test_too_many_arguments_display() {
        let err = VellumError::too_many_arguments("$format", 4);
        assert!(err.to_string().contains("4 arguments"));
    }
}
