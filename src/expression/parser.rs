//! Nom grammar for condition and mapping expressions.
//!
//! ```text
//! expression     := or
//! or             := and ( ("||" | "or") and )*
//! and            := not ( ("&&" | "and") not )*
//! not            := ("!" | "not") not | comparison
//! comparison     := additive ( (">=" | "<=" | "==" | "!=" | ">" | "<") additive )?
//! additive       := multiplicative ( ("+" | "-") multiplicative )*
//! multiplicative := unary ( ("*" | "/") unary )*
//! unary          := "-" unary | primary
//! primary        := number | string | "true" | "false" | "null" | identifier | "(" expression ")"
//! ```
//!
//! Comparisons do not chain: `a < b < c` is a parse error.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value, verify},
    error::ErrorKind,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use serde_json::Value;
use std::cell::Cell;

use super::EvaluationError;

/// Words that cannot be used as variable names.
const RESERVED: &[&str] = &["and", "or", "not", "true", "false", "null"];

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Names of all variables referenced by the expression, in source order.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Variable(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_variables(names),
            Expr::Binary { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arithmetic(ArithmeticOp),
    Comparison(ComparisonOp),
    Logical(LogicalOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

/// Strip the optional leading `=` sigil used by modelling tools.
pub(crate) fn strip_sigil(source: &str) -> &str {
    let trimmed = source.trim_start();
    match trimmed.strip_prefix('=') {
        Some(rest) if !rest.starts_with('=') => rest,
        _ => trimmed,
    }
}

/// Parse an expression (with or without the `=` sigil) into a tree.
///
/// Nesting through parentheses and prefix operators is limited to
/// [`MAX_DEPTH`] levels and the whole expression to [`MAX_OPERATORS`] binary
/// operators; deeper or longer input is a parse error.
pub fn parse(source: &str) -> Result<Expr, EvaluationError> {
    let body = strip_sigil(source);
    let operators = Cell::new(0);
    let nesting = Nesting {
        depth: 0,
        operators: &operators,
    };
    let result = all_consuming(move |i| or_expr(i, nesting))(body);
    match result {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(EvaluationError::Parse {
            expression: source.to_string(),
            message: match e.code {
                ErrorKind::TooLarge => {
                    format!("expression nested too deeply (limit {})", MAX_DEPTH)
                }
                ErrorKind::Count => {
                    format!("expression has too many operators (limit {})", MAX_OPERATORS)
                }
                _ => describe_failure(body, e.input),
            },
        }),
        Err(nom::Err::Incomplete(_)) => Err(EvaluationError::Parse {
            expression: source.to_string(),
            message: "incomplete expression".to_string(),
        }),
    }
}

fn describe_failure(body: &str, remaining: &str) -> String {
    let rest = remaining.trim();
    if rest.is_empty() {
        return "unexpected end of expression".to_string();
    }
    let offset = body.len() - remaining.trim_start().len();
    let snippet: String = rest.chars().take(16).collect();
    format!("unexpected input at offset {}: '{}'", offset, snippet)
}

// =============================================================================
// Limits
// =============================================================================

/// Maximum nesting of parentheses and prefix operators.
pub const MAX_DEPTH: usize = 64;

/// Maximum number of binary operators in one expression.
pub const MAX_OPERATORS: usize = 512;

type ParseFailure<'a> = nom::Err<nom::error::Error<&'a str>>;

/// Recursion budget threaded through the grammar. Limit violations are
/// failures, so no alternative branch is tried after them.
#[derive(Clone, Copy)]
struct Nesting<'c> {
    depth: usize,
    operators: &'c Cell<usize>,
}

impl Nesting<'_> {
    fn deeper<'a>(self, input: &'a str) -> Result<Self, ParseFailure<'a>> {
        if self.depth >= MAX_DEPTH {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                ErrorKind::TooLarge,
            )));
        }
        Ok(Self {
            depth: self.depth + 1,
            ..self
        })
    }

    fn count_operator<'a>(self, input: &'a str) -> Result<(), ParseFailure<'a>> {
        let count = self.operators.get() + 1;
        if count > MAX_OPERATORS {
            return Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::Count)));
        }
        self.operators.set(count);
        Ok(())
    }
}

// =============================================================================
// Combinator helpers
// =============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A word that is not immediately followed by another identifier character.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(satisfy(is_ident_char)))
}

type Operand = for<'a, 'c> fn(&'a str, Nesting<'c>) -> IResult<&'a str, Expr>;

/// `operand (operator operand)*`, folded to the left. An operator without a
/// following operand is left unconsumed.
fn left_assoc<'a>(
    input: &'a str,
    nesting: Nesting<'_>,
    operand: Operand,
    operator: fn(&str) -> IResult<&str, BinaryOp>,
) -> IResult<&'a str, Expr> {
    let (mut input, mut expr) = operand(input, nesting)?;
    loop {
        let (rest, op) = match ws(operator)(input) {
            Ok(parsed) => parsed,
            Err(nom::Err::Error(_)) => return Ok((input, expr)),
            Err(e) => return Err(e),
        };
        let (rest, right) = match operand(rest, nesting) {
            Ok(parsed) => parsed,
            Err(nom::Err::Error(_)) => return Ok((input, expr)),
            Err(e) => return Err(e),
        };
        nesting.count_operator(input)?;
        expr = Expr::binary(op, expr, right);
        input = rest;
    }
}

// =============================================================================
// Precedence levels
// =============================================================================

fn or_expr<'a>(input: &'a str, nesting: Nesting<'_>) -> IResult<&'a str, Expr> {
    left_assoc(input, nesting, and_expr, or_op)
}

fn or_op(input: &str) -> IResult<&str, BinaryOp> {
    value(
        BinaryOp::Logical(LogicalOp::Or),
        alt((tag("||"), keyword("or"))),
    )(input)
}

fn and_expr<'a>(input: &'a str, nesting: Nesting<'_>) -> IResult<&'a str, Expr> {
    left_assoc(input, nesting, not_expr, and_op)
}

fn and_op(input: &str) -> IResult<&str, BinaryOp> {
    value(
        BinaryOp::Logical(LogicalOp::And),
        alt((tag("&&"), keyword("and"))),
    )(input)
}

fn not_expr<'a>(input: &'a str, nesting: Nesting<'_>) -> IResult<&'a str, Expr> {
    let negated = move |i: &'a str| -> IResult<&'a str, Expr> { not_expr(i, nesting.deeper(i)?) };
    alt((
        map(preceded(ws(not_op), negated), |e| Expr::unary(UnaryOp::Not, e)),
        move |i: &'a str| comparison(i, nesting),
    ))(input)
}

fn not_op(input: &str) -> IResult<&str, &str> {
    alt((terminated(tag("!"), not(char('='))), keyword("not")))(input)
}

fn comparison<'a>(input: &'a str, nesting: Nesting<'_>) -> IResult<&'a str, Expr> {
    let (rest, left) = additive(input, nesting)?;
    let (rest, tail) = opt(pair(ws(comparison_op), move |i: &'a str| {
        additive(i, nesting)
    }))(rest)?;
    let expr = match tail {
        Some((op, right)) => {
            nesting.count_operator(input)?;
            Expr::binary(op, left, right)
        }
        None => left,
    };
    Ok((rest, expr))
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    map(
        alt((
            value(ComparisonOp::Ge, tag(">=")),
            value(ComparisonOp::Le, tag("<=")),
            value(ComparisonOp::Eq, tag("==")),
            value(ComparisonOp::Ne, tag("!=")),
            value(ComparisonOp::Gt, tag(">")),
            value(ComparisonOp::Lt, tag("<")),
        )),
        BinaryOp::Comparison,
    )(input)
}

fn additive<'a>(input: &'a str, nesting: Nesting<'_>) -> IResult<&'a str, Expr> {
    left_assoc(input, nesting, multiplicative, additive_op)
}

fn additive_op(input: &str) -> IResult<&str, BinaryOp> {
    map(
        alt((
            value(ArithmeticOp::Add, char('+')),
            value(ArithmeticOp::Sub, char('-')),
        )),
        BinaryOp::Arithmetic,
    )(input)
}

fn multiplicative<'a>(input: &'a str, nesting: Nesting<'_>) -> IResult<&'a str, Expr> {
    left_assoc(input, nesting, unary, multiplicative_op)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOp> {
    map(
        alt((
            value(ArithmeticOp::Mul, char('*')),
            value(ArithmeticOp::Div, char('/')),
        )),
        BinaryOp::Arithmetic,
    )(input)
}

fn unary<'a>(input: &'a str, nesting: Nesting<'_>) -> IResult<&'a str, Expr> {
    let negated = move |i: &'a str| -> IResult<&'a str, Expr> { unary(i, nesting.deeper(i)?) };
    alt((
        map(preceded(ws(char('-')), negated), |e| Expr::unary(UnaryOp::Neg, e)),
        move |i: &'a str| primary(i, nesting),
    ))(input)
}

fn primary<'a>(input: &'a str, nesting: Nesting<'_>) -> IResult<&'a str, Expr> {
    let grouped = move |i: &'a str| -> IResult<&'a str, Expr> { or_expr(i, nesting.deeper(i)?) };
    ws(alt((
        map(number, Expr::Literal),
        map(string, Expr::Literal),
        map(constant, Expr::Literal),
        map(identifier, |name| Expr::Variable(name.to_string())),
        delimited(char('('), grouped, char(')')),
    )))(input)
}

// =============================================================================
// Atoms
// =============================================================================

fn number(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        parse_number,
    )(input)
}

fn parse_number(raw: &str) -> Result<Value, String> {
    if raw.contains('.') {
        let f: f64 = raw.parse().map_err(|e| format!("{}", e))?;
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| format!("{} is not a finite number", raw))
    } else {
        raw.parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("{}", e))
    }
}

fn string(input: &str) -> IResult<&str, Value> {
    map(
        alt((
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        )),
        |s: &str| Value::String(s.to_string()),
    )(input)
}

fn constant(input: &str) -> IResult<&str, Value> {
    alt((
        value(Value::Bool(true), keyword("true")),
        value(Value::Bool(false), keyword("false")),
        value(Value::Null, keyword("null")),
    ))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    verify(
        recognize(pair(
            satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
            take_while(is_ident_char),
        )),
        |name: &str| !RESERVED.contains(&name),
    )(input)
}
