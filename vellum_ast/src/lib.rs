//! Syntax tree definitions for Vellum procedures.
//!
//! The document parser is a separate component; this crate defines the
//! tree shape it hands to the compiler. A procedure is a sequence of
//! statements, each statement a main clause with optional handle
//! clauses, and every clause bottoms out in expressions, collection
//! literals, and recipients.
//!
//! The nodes are plain data: the compiler dispatches on the enum
//! variants directly rather than through a visitor object.

// =============================================================================
// Procedures and Statements
// =============================================================================

/// A compilable unit: a sequence of statements.
///
/// Nested blocks (then-blocks, loop bodies, handler bodies) are
/// procedures as well.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Procedure {
    /// The statements in execution order.
    pub statements: Vec<Statement>,
}

impl Procedure {
    /// Create a procedure from its statements.
    #[must_use]
    pub fn new(statements: Vec<Statement>) -> Self {
        Procedure { statements }
    }
}

/// A statement: one main clause and any number of handle clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// The main clause.
    pub main: Clause,
    /// Handle clauses guarding the main clause, in match order.
    pub handlers: Vec<HandleClause>,
}

impl Statement {
    /// Create a statement with no handle clauses.
    #[must_use]
    pub fn new(main: Clause) -> Self {
        Statement {
            main,
            handlers: Vec::new(),
        }
    }

    /// Create a statement guarded by handle clauses.
    #[must_use]
    pub fn with_handlers(main: Clause, handlers: Vec<HandleClause>) -> Self {
        Statement { main, handlers }
    }

    /// Whether this statement has any handle clauses.
    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// The number of nested blocks within the main clause.
    pub fn subclause_count(&self) -> usize {
        self.main.subclause_count()
    }
}

/// A catch-like branch matching a thrown exception against a template.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleClause {
    /// The symbol the caught exception is bound to.
    pub exception: String,
    /// The pattern the exception is matched against.
    pub template: Expression,
    /// The block executed on a match.
    pub block: Procedure,
}

// =============================================================================
// Clauses
// =============================================================================

/// A condition paired with the block it guards.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionBlock {
    /// The boolean condition.
    pub condition: Expression,
    /// The guarded block.
    pub block: Procedure,
}

/// An option pattern paired with the block it selects.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionBlock {
    /// The pattern compared against the selector.
    pub option: Expression,
    /// The selected block.
    pub block: Procedure,
}

/// The main clause of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Evaluate an expression, optionally assigning it to a recipient.
    Evaluate {
        /// Where the value is stored; `$$result` when absent.
        recipient: Option<Recipient>,
        /// The expression to evaluate.
        expression: Expression,
    },
    /// A chain of conditional branches with an optional else block.
    If {
        /// The condition/block pairs, in order.
        branches: Vec<ConditionBlock>,
        /// The block taken when every condition is false.
        else_block: Option<Procedure>,
    },
    /// Match a selector against a sequence of option patterns.
    Select {
        /// The expression being matched.
        selector: Expression,
        /// The option/block pairs, in order.
        options: Vec<OptionBlock>,
        /// The block taken when no option matches.
        else_block: Option<Procedure>,
    },
    /// Repeat a block while a condition holds.
    While {
        /// The loop condition.
        condition: Expression,
        /// The loop body.
        block: Procedure,
    },
    /// Iterate a block over the items of a sequence.
    With {
        /// The symbol each item is bound to.
        item: String,
        /// The sequence being iterated.
        sequence: Expression,
        /// The loop body.
        block: Procedure,
    },
    /// Escape the nearest enclosing loop.
    Break,
    /// Restart the nearest enclosing loop.
    Continue,
    /// Return from the procedure, with `none` when no expression given.
    Return {
        /// The result expression, if any.
        expression: Option<Expression>,
    },
    /// Throw an exception.
    Throw {
        /// The exception expression.
        expression: Expression,
    },
    /// Publish an event on the global event queue.
    Publish {
        /// The event expression.
        event: Expression,
    },
    /// Post a message on a named queue.
    Post {
        /// The message expression.
        message: Expression,
        /// The queue reference.
        queue: Expression,
    },
    /// Save a draft document at a location.
    Save {
        /// The draft expression.
        draft: Expression,
        /// The location reference.
        location: Expression,
    },
    /// Commit a document at a location.
    Commit {
        /// The document expression.
        document: Expression,
        /// The location reference.
        location: Expression,
    },
    /// Discard the draft at a location.
    Discard {
        /// The location reference.
        location: Expression,
    },
    /// Check out the draft at a location into a recipient.
    Checkout {
        /// Where the draft is stored.
        recipient: Recipient,
        /// The location reference.
        location: Expression,
    },
    /// Wait for a message from a queue into a recipient.
    Wait {
        /// Where the message is stored.
        recipient: Recipient,
        /// The queue reference.
        queue: Expression,
    },
}

impl Clause {
    /// The statement-kind string used to construct this clause's labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Clause::Evaluate { .. } => "Evaluate",
            Clause::If { .. } => "If",
            Clause::Select { .. } => "Select",
            Clause::While { .. } => "While",
            Clause::With { .. } => "With",
            Clause::Break => "Break",
            Clause::Continue => "Continue",
            Clause::Return { .. } => "Return",
            Clause::Throw { .. } => "Throw",
            Clause::Publish { .. } => "Publish",
            Clause::Post { .. } => "Post",
            Clause::Save { .. } => "Save",
            Clause::Commit { .. } => "Commit",
            Clause::Discard { .. } => "Discard",
            Clause::Checkout { .. } => "Checkout",
            Clause::Wait { .. } => "Wait",
        }
    }

    /// The number of nested blocks this clause contains.
    pub fn subclause_count(&self) -> usize {
        match self {
            Clause::If {
                branches,
                else_block,
            } => branches.len() + usize::from(else_block.is_some()),
            Clause::Select {
                options,
                else_block,
                ..
            } => options.len() + usize::from(else_block.is_some()),
            Clause::While { .. } | Clause::With { .. } => 1,
            _ => 0,
        }
    }
}

// =============================================================================
// Recipients
// =============================================================================

/// The left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    /// A bare variable symbol.
    Variable(String),
    /// A subcomponent path into a composite component.
    Subcomponent {
        /// The composite expression.
        expression: Box<Expression>,
        /// The index expressions, outermost first.
        indices: Vec<Expression>,
    },
}

// =============================================================================
// Expressions
// =============================================================================

/// An expression node. Compiling one leaves exactly one component on the
/// processor's component stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal element, with optional parameterisation.
    Element {
        /// The element's source text.
        text: String,
        /// Parameters attached to the element.
        parameters: Option<Parameters>,
    },
    /// A reference to a parameter, constant, or variable.
    Variable(String),
    /// A binary operator application.
    Binary {
        /// The operator.
        operator: BinaryOperator,
        /// The left operand.
        left: Box<Expression>,
        /// The right operand.
        right: Box<Expression>,
    },
    /// A unary operator application.
    Unary {
        /// The operator.
        operator: UnaryOperator,
        /// The operand.
        operand: Box<Expression>,
    },
    /// Dereference of a location reference (`@reference`).
    Dereference(Box<Expression>),
    /// An intrinsic function call with at most three positional arguments.
    FunctionCall {
        /// The function name, without the leading `$`.
        function: String,
        /// The arguments, in order.
        arguments: Vec<Argument>,
    },
    /// A message sent to a target component.
    MessageCall {
        /// The target expression.
        target: Box<Expression>,
        /// The message symbol, without the leading `$`.
        message: String,
        /// The argument expressions, in order.
        arguments: Vec<Expression>,
    },
    /// A collection literal.
    Collection {
        /// Which container the literal constructs.
        kind: CollectionKind,
        /// The items, in order.
        items: Vec<CollectionItem>,
        /// Parameters for the container.
        parameters: Option<Parameters>,
    },
    /// A range of values.
    Range {
        /// The first value.
        first: Box<Expression>,
        /// The last value.
        last: Box<Expression>,
        /// Parameters for the range.
        parameters: Option<Parameters>,
    },
    /// A subcomponent access into a composite component.
    Subcomponent {
        /// The composite expression.
        expression: Box<Expression>,
        /// The index expressions, outermost first.
        indices: Vec<Expression>,
    },
    /// A brace-wrapped source block used as a value.
    SourceBlock {
        /// The block source, braces included.
        source: String,
        /// Parameters attached to the block.
        parameters: Option<Parameters>,
    },
}

impl Expression {
    /// Shorthand for an unparameterised element.
    #[must_use]
    pub fn element(text: impl Into<String>) -> Self {
        Expression::Element {
            text: text.into(),
            parameters: None,
        }
    }

    /// Shorthand for a variable reference.
    #[must_use]
    pub fn variable(symbol: impl Into<String>) -> Self {
        Expression::Variable(symbol.into())
    }
}

/// A positional or named argument in a function call.
///
/// Named arguments compile identically to positional ones: only the
/// value is used and the key is discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// The argument name, if the call site used one.
    pub name: Option<String>,
    /// The argument value.
    pub value: Expression,
}

impl Argument {
    /// Create a positional argument.
    #[must_use]
    pub fn positional(value: Expression) -> Self {
        Argument { name: None, value }
    }
}

/// The binary operators of the document notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// Arithmetic `+`
    Sum,
    /// Arithmetic `-`
    Difference,
    /// Arithmetic `*`
    Product,
    /// Arithmetic `/`
    Quotient,
    /// Arithmetic `//`
    Remainder,
    /// Comparison `<`
    IsLessThan,
    /// Comparison `=`
    IsEqualTo,
    /// Comparison `>`
    IsMoreThan,
    /// Identity comparison `is`
    IsSameAs,
    /// Pattern comparison `matches`
    IsMatchedBy,
    /// Logical `and`
    And,
    /// Logical `sans`
    Sans,
    /// Logical `xor`
    Xor,
    /// Logical `or`
    Or,
    /// Chaining `&`
    Concatenation,
    /// Exponentiation `^`
    Exponential,
    /// Defaulting `?`
    Default,
}

/// The unary operators of the document notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Postfix `!`
    Factorial,
    /// Logical `not`
    Complement,
    /// Additive inversion `-`
    Inverse,
    /// Multiplicative inversion `/`
    Reciprocal,
    /// Complex conjugation `*`
    Conjugate,
    /// Magnitude bars `|x|`
    Magnitude,
}

/// The container constructed by a collection literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// An ordered list.
    List,
    /// An ordered set.
    Set,
    /// A last-in-first-out stack.
    Stack,
    /// A first-in-first-out queue.
    Queue,
    /// A catalog of key/value associations.
    Catalog,
}

/// An item inside a collection literal.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionItem {
    /// A plain component item.
    Component(Expression),
    /// A key/value association (inside catalogs).
    Association {
        /// The association's key.
        key: Expression,
        /// The association's value.
        value: Expression,
    },
}

/// Parameterisation attached to an element, collection, or source block.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// The key/value associations, in order.
    pub associations: Vec<(Expression, Expression)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_kinds_match_label_scheme() {
        assert_eq!(Clause::Break.kind(), "Break");
        assert_eq!(
            Clause::Return { expression: None }.kind(),
            "Return"
        );
        assert_eq!(
            Clause::If {
                branches: Vec::new(),
                else_block: None
            }
            .kind(),
            "If"
        );
    }

    #[test]
    fn test_subclause_counts() {
        let branch = ConditionBlock {
            condition: Expression::element("true"),
            block: Procedure::default(),
        };
        let clause = Clause::If {
            branches: vec![branch.clone(), branch],
            else_block: Some(Procedure::default()),
        };
        assert_eq!(clause.subclause_count(), 3);
        assert_eq!(Clause::Break.subclause_count(), 0);
        assert_eq!(
            Clause::While {
                condition: Expression::element("true"),
                block: Procedure::default()
            }
            .subclause_count(),
            1
        );
    }

    #[test]
    fn test_statement_handler_queries() {
        let statement = Statement::new(Clause::Break);
        assert!(!statement.has_handlers());
        let guarded = Statement::with_handlers(
            Clause::Break,
            vec![HandleClause {
                exception: "$e".to_string(),
                template: Expression::element("any"),
                block: Procedure::default(),
            }],
        );
        assert!(guarded.has_handlers());
    }
}
