//! Expression, indices, and recipient emission.
//!
//! Compiling an expression leaves exactly one component on the
//! processor's component stack; operators become intrinsic invocations,
//! collection literals become constructor-plus-`$addItem` sequences, and
//! subcomponent paths desugar into `$getSubcomponent`/`$setSubcomponent`
//! message sends against the addressed parent.

use vellum_ast as ast;
use vellum_core::error::{VellumError, VellumResult};
use vellum_core::instruction::{ExecuteModifier, StorageModifier};
use vellum_core::intrinsics;

use crate::compiler::Compiler;

impl<'a> Compiler<'a> {
    /// Compile an expression. Net stack effect: `{} → {value}`.
    pub(crate) fn compile_expression(&mut self, expression: &ast::Expression) -> VellumResult<()> {
        match expression {
            ast::Expression::Element { text, parameters } => {
                self.push_literal(text.trim());
                self.compile_parameterisation(parameters.as_ref())?;
            }

            ast::Expression::Variable(symbol) => {
                if self.builder.context().parameters.contains(symbol) {
                    self.builder.insert_push_parameter(symbol);
                } else if self.types.constants.contains(symbol) {
                    self.builder.insert_push_constant(symbol);
                } else {
                    self.builder.insert_load(StorageModifier::Variable, symbol);
                }
            }

            ast::Expression::Binary {
                operator,
                left,
                right,
            } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.builder.insert_invoke(binary_intrinsic(*operator), 2);
            }

            ast::Expression::Unary { operator, operand } => {
                self.compile_expression(operand)?;
                self.builder.insert_invoke(unary_intrinsic(*operator), 1);
            }

            ast::Expression::Dereference(reference) => {
                self.compile_expression(reference)?;
                let temporary = self.make_temporary("location");
                self.builder
                    .insert_store(StorageModifier::Variable, &temporary);
                self.builder
                    .insert_load(StorageModifier::Document, &temporary);
            }

            ast::Expression::FunctionCall {
                function,
                arguments,
            } => {
                let name = format!("${}", function);
                if arguments.len() > 3 {
                    return Err(VellumError::too_many_arguments(name, arguments.len()));
                }
                // Named arguments contribute their value only.
                for argument in arguments {
                    self.compile_expression(&argument.value)?;
                }
                if intrinsics::index(&name).is_some() {
                    intrinsics::validate_arguments(&name, arguments.len() as u8)?;
                }
                self.builder.insert_invoke(name, arguments.len() as u8);
            }

            ast::Expression::MessageCall {
                target,
                message,
                arguments,
            } => {
                self.compile_expression(target)?;
                let name = format!("${}", message);
                if arguments.is_empty() {
                    self.builder.insert_execute(name, ExecuteModifier::OnTarget);
                } else {
                    self.builder.insert_invoke("$list", 0);
                    for argument in arguments {
                        self.compile_expression(argument)?;
                        self.builder.insert_invoke("$addItem", 2);
                    }
                    self.builder.insert_invoke("$parameters", 1);
                    self.builder
                        .insert_execute(name, ExecuteModifier::OnTargetWithParameters);
                }
            }

            ast::Expression::Collection {
                kind,
                items,
                parameters,
            } => {
                let constructor = collection_intrinsic(*kind);
                match parameters {
                    Some(parameters) => {
                        self.compile_parameters(parameters)?;
                        self.builder.insert_invoke(constructor, 1);
                    }
                    None => self.builder.insert_invoke(constructor, 0),
                }
                for item in items {
                    match item {
                        ast::CollectionItem::Component(expression) => {
                            self.compile_expression(expression)?;
                        }
                        ast::CollectionItem::Association { key, value } => {
                            self.compile_expression(key)?;
                            self.compile_expression(value)?;
                            self.builder.insert_invoke("$association", 2);
                        }
                    }
                    self.builder.insert_invoke("$addItem", 2);
                }
            }

            ast::Expression::Range {
                first,
                last,
                parameters,
            } => {
                self.compile_expression(first)?;
                self.compile_expression(last)?;
                match parameters {
                    Some(parameters) => {
                        self.compile_parameters(parameters)?;
                        self.builder.insert_invoke("$range", 3);
                    }
                    None => self.builder.insert_invoke("$range", 2),
                }
            }

            ast::Expression::Subcomponent {
                expression,
                indices,
            } => {
                self.compile_expression(expression)?;
                self.compile_indices(indices)?;
                self.builder.insert_invoke("$parameters", 1);
                self.builder
                    .insert_execute("$getSubcomponent", ExecuteModifier::OnTargetWithParameters);
            }

            ast::Expression::SourceBlock { source, parameters } => {
                self.push_literal(source.trim());
                self.compile_parameterisation(parameters.as_ref())?;
            }
        }
        Ok(())
    }

    /// Attach parameters to the component on top of the stack, if any.
    fn compile_parameterisation(
        &mut self,
        parameters: Option<&ast::Parameters>,
    ) -> VellumResult<()> {
        if let Some(parameters) = parameters {
            self.compile_parameters(parameters)?;
            self.builder.insert_invoke("$setParameters", 2);
        }
        Ok(())
    }

    /// Compile a parameters node to a single catalog component.
    pub(crate) fn compile_parameters(&mut self, parameters: &ast::Parameters) -> VellumResult<()> {
        self.builder.insert_invoke("$catalog", 0);
        for (key, value) in &parameters.associations {
            self.compile_expression(key)?;
            self.compile_expression(value)?;
            self.builder.insert_invoke("$association", 2);
            self.builder.insert_invoke("$addItem", 2);
        }
        Ok(())
    }

    /// Compile an index path. Stack effect: `{parent} → {parent, index}`.
    ///
    /// The first N−1 indices each replace the parent with the addressed
    /// child; the final index is left on the stack wrapped in its
    /// argument list so the caller can decide between get and set.
    pub(crate) fn compile_indices(&mut self, indices: &[ast::Expression]) -> VellumResult<()> {
        debug_assert!(!indices.is_empty(), "a subcomponent path needs an index");
        let count = indices.len();
        for (position, index) in indices.iter().enumerate() {
            self.builder.insert_invoke("$list", 0);
            self.compile_expression(index)?;
            self.builder.insert_invoke("$addItem", 2);
            if position + 1 < count {
                self.builder.insert_invoke("$parameters", 1);
                self.builder
                    .insert_execute("$getSubcomponent", ExecuteModifier::OnTargetWithParameters);
            }
        }
        Ok(())
    }

    /// Emit a recipient's preparatory instructions.
    ///
    /// Only subcomponent recipients need any: the composite expression
    /// and its index path are compiled before the assigned value.
    pub(crate) fn prepare_recipient(&mut self, recipient: &ast::Recipient) -> VellumResult<()> {
        match recipient {
            ast::Recipient::Variable(_) => Ok(()),
            ast::Recipient::Subcomponent {
                expression,
                indices,
            } => {
                self.compile_expression(expression)?;
                self.compile_indices(indices)
            }
        }
    }

    /// Assign the value on top of the stack to a recipient.
    pub(crate) fn assign_recipient(&mut self, recipient: &ast::Recipient) {
        match recipient {
            ast::Recipient::Variable(symbol) => {
                self.builder.insert_store(StorageModifier::Variable, symbol);
            }
            ast::Recipient::Subcomponent { .. } => {
                // The value joins the final index in its argument list.
                self.builder.insert_invoke("$addItem", 2);
                self.builder.insert_invoke("$parameters", 1);
                self.builder
                    .insert_execute("$setSubcomponent", ExecuteModifier::OnTargetWithParameters);
            }
        }
    }
}

/// The intrinsic invoked for each binary operator.
fn binary_intrinsic(operator: ast::BinaryOperator) -> &'static str {
    use ast::BinaryOperator::*;
    match operator {
        Sum => "$sum",
        Difference => "$difference",
        Product => "$product",
        Quotient => "$quotient",
        Remainder => "$remainder",
        IsLessThan => "$isLessThan",
        IsEqualTo => "$isEqualTo",
        IsMoreThan => "$isMoreThan",
        IsSameAs => "$isSameAs",
        IsMatchedBy => "$isMatchedBy",
        And => "$and",
        Sans => "$sans",
        Xor => "$xor",
        Or => "$or",
        Concatenation => "$concatenation",
        Exponential => "$exponential",
        Default => "$default",
    }
}

/// The intrinsic invoked for each unary operator.
fn unary_intrinsic(operator: ast::UnaryOperator) -> &'static str {
    use ast::UnaryOperator::*;
    match operator {
        Factorial => "$factorial",
        Complement => "$complement",
        Inverse => "$inverse",
        Reciprocal => "$reciprocal",
        Conjugate => "$conjugate",
        Magnitude => "$magnitude",
    }
}

/// The constructor intrinsic for each collection kind.
fn collection_intrinsic(kind: ast::CollectionKind) -> &'static str {
    match kind {
        ast::CollectionKind::List => "$list",
        ast::CollectionKind::Set => "$set",
        ast::CollectionKind::Stack => "$stack",
        ast::CollectionKind::Queue => "$queue",
        ast::CollectionKind::Catalog => "$catalog",
    }
}
