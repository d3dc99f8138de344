//! Expression evaluator for conditions and variable mappings.
//!
//! The grammar is deliberately small: literals, variables from a flat
//! namespace, arithmetic, comparisons and boolean connectives. An optional
//! leading `=` is accepted and ignored.
//!
//! ```
//! use bpmn_engine::expression::evaluate_expression;
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! let vars: HashMap<String, serde_json::Value> =
//!     [("aValue".to_string(), json!(3))].into_iter().collect();
//! assert_eq!(evaluate_expression("= aValue > 1", &vars).unwrap(), json!(true));
//! ```

mod eval;
mod parser;

pub use eval::ExpressionEvaluator;
pub use parser::{
    parse, ArithmeticOp, BinaryOp, ComparisonOp, Expr, LogicalOp, UnaryOp, MAX_DEPTH, MAX_OPERATORS,
};

use serde_json::Value;
use thiserror::Error;

use crate::variables::VariableLookup;

/// Expression evaluation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("cannot parse expression '{expression}': {message}")]
    Parse { expression: String, message: String },

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,
}

/// A parsed expression, reusable across evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self, EvaluationError> {
        let ast = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn evaluate(&self, variables: &dyn VariableLookup) -> Result<Value, EvaluationError> {
        ExpressionEvaluator::new(variables).evaluate(&self.ast)
    }

    /// Evaluate in a boolean context. Any non-boolean result is a type mismatch.
    pub fn evaluate_condition(&self, variables: &dyn VariableLookup) -> Result<bool, EvaluationError> {
        match self.evaluate(variables)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvaluationError::TypeMismatch(format!(
                "condition '{}' evaluated to {}, expected boolean",
                self.source,
                eval::type_name(&other)
            ))),
        }
    }
}

/// Compile and evaluate `expression` against `variables` in one step.
pub fn evaluate_expression(
    expression: &str,
    variables: &dyn VariableLookup,
) -> Result<Value, EvaluationError> {
    Expression::compile(expression)?.evaluate(variables)
}

/// Compile and evaluate a condition; the result must be boolean.
pub fn evaluate_condition(
    expression: &str,
    variables: &dyn VariableLookup,
) -> Result<bool, EvaluationError> {
    Expression::compile(expression)?.evaluate_condition(variables)
}
