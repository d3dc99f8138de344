//! Tree-walking evaluator.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use super::parser::{ArithmeticOp, BinaryOp, ComparisonOp, Expr, LogicalOp, UnaryOp};
use super::EvaluationError;
use crate::variables::VariableLookup;

type EvalResult<T> = std::result::Result<T, EvaluationError>;

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Number::Int)
                .or_else(|| n.as_f64().map(Number::Float)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// Evaluates parsed expressions against a variable namespace.
pub struct ExpressionEvaluator<'v> {
    variables: &'v dyn VariableLookup,
}

impl fmt::Debug for ExpressionEvaluator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEvaluator").finish_non_exhaustive()
    }
}

impl<'v> ExpressionEvaluator<'v> {
    pub fn new(variables: &'v dyn VariableLookup) -> Self {
        Self { variables }
    }

    pub fn evaluate(&self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => self
                .variables
                .lookup(name)
                .ok_or_else(|| EvaluationError::UndefinedVariable(name.clone())),
            Expr::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                apply_unary(*op, value)
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::Logical(op) => self.eval_logical(*op, left, right),
                BinaryOp::Arithmetic(op) => {
                    apply_arithmetic(*op, &self.evaluate(left)?, &self.evaluate(right)?)
                }
                BinaryOp::Comparison(op) => {
                    apply_comparison(*op, &self.evaluate(left)?, &self.evaluate(right)?)
                }
            },
        }
    }

    // Short-circuits: the right operand is not evaluated when the left decides.
    fn eval_logical(&self, op: LogicalOp, left: &Expr, right: &Expr) -> EvalResult<Value> {
        let lhs = expect_bool(op.symbol(), self.evaluate(left)?)?;
        let decided = match op {
            LogicalOp::And => !lhs,
            LogicalOp::Or => lhs,
        };
        if decided {
            return Ok(Value::Bool(lhs));
        }
        let rhs = expect_bool(op.symbol(), self.evaluate(right)?)?;
        Ok(Value::Bool(rhs))
    }
}

fn apply_unary(op: UnaryOp, value: Value) -> EvalResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!expect_bool("!", value)?)),
        UnaryOp::Neg => match Number::from_value(&value) {
            Some(Number::Int(i)) => match i.checked_neg() {
                Some(n) => Ok(Value::from(n)),
                None => float_value(-(i as f64)),
            },
            Some(Number::Float(f)) => float_value(-f),
            None => Err(EvaluationError::TypeMismatch(format!(
                "operator '-' expects a number, got {}",
                type_name(&value)
            ))),
        },
    }
}

fn apply_arithmetic(op: ArithmeticOp, left: &Value, right: &Value) -> EvalResult<Value> {
    if let (ArithmeticOp::Add, Value::String(a), Value::String(b)) = (op, left, right) {
        return Ok(Value::String(format!("{}{}", a, b)));
    }

    let (a, b) = match (Number::from_value(left), Number::from_value(right)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(EvaluationError::TypeMismatch(format!(
                "operator '{}' expects numbers, got {} and {}",
                op.symbol(),
                type_name(left),
                type_name(right)
            )))
        }
    };

    if op == ArithmeticOp::Div && b.as_f64() == 0.0 {
        return Err(EvaluationError::DivisionByZero);
    }

    // Integer results stay integers unless they overflow.
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        let exact = match op {
            ArithmeticOp::Add => x.checked_add(y),
            ArithmeticOp::Sub => x.checked_sub(y),
            ArithmeticOp::Mul => x.checked_mul(y),
            ArithmeticOp::Div => None,
        };
        if let Some(n) = exact {
            return Ok(Value::from(n));
        }
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        ArithmeticOp::Add => x + y,
        ArithmeticOp::Sub => x - y,
        ArithmeticOp::Mul => x * y,
        ArithmeticOp::Div => x / y,
    };
    float_value(result)
}

fn apply_comparison(op: ComparisonOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let result = match op {
        ComparisonOp::Eq => values_equal(left, right),
        ComparisonOp::Ne => !values_equal(left, right),
        ComparisonOp::Lt => order(op, left, right)?.is_lt(),
        ComparisonOp::Le => order(op, left, right)?.is_le(),
        ComparisonOp::Gt => order(op, left, right)?.is_gt(),
        ComparisonOp::Ge => order(op, left, right)?.is_ge(),
    };
    Ok(Value::Bool(result))
}

/// Numbers compare by value (`1 == 1.0`); everything else structurally.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (Number::from_value(left), Number::from_value(right)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn order(op: ComparisonOp, left: &Value, right: &Value) -> EvalResult<Ordering> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    let ordering = match (Number::from_value(left), Number::from_value(right)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => Some(a.cmp(&b)),
        (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        _ => None,
    };
    ordering.ok_or_else(|| {
        EvaluationError::TypeMismatch(format!(
            "operator '{}' cannot compare {} with {}",
            op.symbol(),
            type_name(left),
            type_name(right)
        ))
    })
}

fn expect_bool(operator: &str, value: Value) -> EvalResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvaluationError::TypeMismatch(format!(
            "operator '{}' expects a boolean, got {}",
            operator,
            type_name(&other)
        ))),
    }
}

fn float_value(f: f64) -> EvalResult<Value> {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| EvaluationError::TypeMismatch(format!("{} is not a finite number", f)))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::parse;
    use crate::variables::NoVariables;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    fn eval(source: &str) -> EvalResult<Value> {
        let expr = parse(source)?;
        ExpressionEvaluator::new(&NoVariables).evaluate(&expr)
    }

    fn eval_with(source: &str, vars: &HashMap<String, Value>) -> EvalResult<Value> {
        let expr = parse(source)?;
        ExpressionEvaluator::new(vars).evaluate(&expr)
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), json!(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), json!(9));
        assert_eq!(eval("10 - 4 - 3").unwrap(), json!(3));
        assert_eq!(eval("-5 + 2").unwrap(), json!(-3));
    }

    #[test]
    fn test_division_yields_float() {
        assert_eq!(eval("7 / 2").unwrap(), json!(3.5));
        assert_eq!(eval("6 / 3").unwrap(), json!(2.0));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1 / 0").unwrap_err(), EvaluationError::DivisionByZero);
        assert_eq!(eval("1 / 0.0").unwrap_err(), EvaluationError::DivisionByZero);
    }

    #[test]
    fn test_integer_overflow_widens_to_float() {
        let result = eval("9223372036854775807 + 1").unwrap();
        assert!(result.is_f64());
    }

    #[test]
    fn test_mixed_numeric_comparison() {
        assert_eq!(eval("1 == 1.0").unwrap(), json!(true));
        assert_eq!(eval("2 > 1.5").unwrap(), json!(true));
        assert_eq!(eval("2 <= 1.5").unwrap(), json!(false));
    }

    #[test]
    fn test_string_operations() {
        assert_eq!(eval("'a' + 'b'").unwrap(), json!("ab"));
        assert_eq!(eval("'abc' < 'abd'").unwrap(), json!(true));
        assert_eq!(eval("'x' == \"x\"").unwrap(), json!(true));
    }

    #[test]
    fn test_structural_equality_across_types() {
        assert_eq!(eval("1 == '1'").unwrap(), json!(false));
        assert_eq!(eval("null == null").unwrap(), json!(true));
        assert_eq!(eval("true != false").unwrap(), json!(true));
    }

    #[test]
    fn test_ordering_requires_compatible_types() {
        assert!(matches!(
            eval("1 < 'a'").unwrap_err(),
            EvaluationError::TypeMismatch(_)
        ));
        assert!(matches!(
            eval("true > false").unwrap_err(),
            EvaluationError::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_logical_short_circuit_skips_undefined() {
        assert_eq!(eval("false && missing").unwrap(), json!(false));
        assert_eq!(eval("true || missing").unwrap(), json!(true));
        assert_eq!(
            eval("true && missing").unwrap_err(),
            EvaluationError::UndefinedVariable("missing".to_string())
        );
    }

    #[test]
    fn test_logical_operators_require_booleans() {
        assert!(matches!(
            eval("1 && true").unwrap_err(),
            EvaluationError::TypeMismatch(_)
        ));
        assert!(matches!(
            eval("!1").unwrap_err(),
            EvaluationError::TypeMismatch(_)
        ));
        assert_eq!(eval("not (1 > 2)").unwrap(), json!(true));
    }

    #[test]
    fn test_arithmetic_type_mismatch() {
        let err = eval("'a' - 1").unwrap_err();
        assert_eq!(
            err,
            EvaluationError::TypeMismatch(
                "operator '-' expects numbers, got string and number".to_string()
            )
        );
    }

    #[test]
    fn test_variables_resolved_from_namespace() {
        let vars: HashMap<String, Value> = [
            ("price".to_string(), json!(-50)),
            ("name".to_string(), json!("widget")),
        ]
        .into_iter()
        .collect();

        assert_eq!(eval_with("price > 0", &vars).unwrap(), json!(false));
        assert_eq!(eval_with("price * -2", &vars).unwrap(), json!(100));
        assert_eq!(eval_with("name == 'widget'", &vars).unwrap(), json!(true));
        assert_eq!(
            eval_with("quantity > 0", &vars).unwrap_err(),
            EvaluationError::UndefinedVariable("quantity".to_string())
        );
    }

    #[test]
    fn test_null_variable_is_defined() {
        let vars: HashMap<String, Value> = [("note".to_string(), Value::Null)].into_iter().collect();
        assert_eq!(eval_with("note == null", &vars).unwrap(), json!(true));
    }

    #[test]
    fn test_debug_output() {
        let evaluator = ExpressionEvaluator::new(&NoVariables);
        assert_eq!(format!("{:?}", evaluator), "ExpressionEvaluator { .. }");
    }
}
