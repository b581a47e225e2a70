//! The constraint mini-language: parser, static type check and
//! evaluator.
//!
//! A constraint is a boolean expression over the keys of the subject
//! node it is attached to:
//!
//! ```text
//! top       := ['{' text '}'] expr
//! expr      := and_chain ( ('|'|'^') and_chain )*
//! and_chain := unary ( '&' unary )*
//! unary     := '!' unary | relation
//! relation  := operand ( ('='|'!='|'<'|'<='|'>'|'>=') operand )?
//! operand   := INT | NUMBER | STRING | BOOL | IDENT | path | '%'
//!            | '#' [ '(' IDENT (',' IDENT)* ')' | path ]
//!            | '(' expr ')'
//! path      := ['/'] segment ('/' segment)*
//! segment   := IDENT | '[' path ']'
//! ```
//!
//! An identifier used as a boolean is true when the key is present in
//! the subject section. `%` names the value of the key the constraint is
//! attached to. `#` counts children; `#(a,b)` counts how many of the
//! listed keys are present. A bracketed segment resolves to a
//! string-valued key whose value names the next path step.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, multispace0, one_of},
    combinator::{all_consuming, map, opt, verify},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::lexer;
use crate::tree::Node;

use super::{resolve_type, BasicType};

/// A compiled constraint: the expression tree plus the text echoed in
/// diagnostics (the `{label}` when one was given, the raw source
/// otherwise).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Constraint {
    pub(crate) display: String,
    pub(crate) expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Bool(bool),
    Int(i64),
    Number(f64),
    Str(String),
    Ident(String),
    /// `%`: the value of the key this constraint is attached to.
    This,
    Path(Path),
    /// `#(a, b, ...)`: how many of the listed keys are present.
    Count(Vec<String>),
    /// `#` or `#path`: the child count of the subject or of the
    /// referenced node.
    Length(Option<Path>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Path {
    absolute: bool,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Key(String),
    Deref(Path),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub(crate) enum ExprError {
    #[error("syntax error in constraint near {0:?}")]
    Syntax(String),
}

/// Parses a constraint string, peeling an optional `{label}` prefix.
pub(crate) fn parse(text: &str) -> Result<Constraint, ExprError> {
    let mut rest = text.trim_start();
    let mut label = None;
    if let Some(after) = rest.strip_prefix('{') {
        match after.find('}') {
            Some(position) => {
                label = Some(after[..position].to_owned());
                rest = &after[position + 1..];
            }
            None => return Err(ExprError::Syntax(text.to_owned())),
        }
    }
    match all_consuming(delimited(multispace0, expr, multispace0))(rest) {
        Ok((_, parsed)) => Ok(Constraint {
            display: label.unwrap_or_else(|| text.to_owned()),
            expr: parsed,
        }),
        Err(_) => Err(ExprError::Syntax(rest.trim().to_owned())),
    }
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_chain(input)?;
    let (input, rest) = many0(pair(
        delimited(multispace0, one_of("|^"), multispace0),
        and_chain,
    ))(input)?;
    let combined = rest.into_iter().fold(first, |lhs, (operator, rhs)| {
        if operator == '|' {
            Expr::Or(Box::new(lhs), Box::new(rhs))
        } else {
            Expr::Xor(Box::new(lhs), Box::new(rhs))
        }
    });
    Ok((input, combined))
}

fn and_chain(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(preceded(
        delimited(multispace0, char('&'), multispace0),
        unary,
    ))(input)?;
    let combined = rest
        .into_iter()
        .fold(first, |lhs, rhs| Expr::And(Box::new(lhs), Box::new(rhs)));
    Ok((input, combined))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(preceded(multispace0, char('!')), unary), |inner| {
            Expr::Not(Box::new(inner))
        }),
        relation,
    ))(input)
}

fn relation(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = operand(input)?;
    let (input, comparison) = opt(pair(cmp_op, operand))(input)?;
    Ok((
        input,
        match comparison {
            Some((operator, rhs)) => Expr::Cmp(operator, Box::new(lhs), Box::new(rhs)),
            None => lhs,
        },
    ))
}

fn cmp_op(input: &str) -> IResult<&str, CmpOp> {
    preceded(
        multispace0,
        alt((
            map(tag("!="), |_| CmpOp::Ne),
            map(tag("<="), |_| CmpOp::Le),
            map(tag(">="), |_| CmpOp::Ge),
            map(tag("="), |_| CmpOp::Eq),
            map(tag("<"), |_| CmpOp::Lt),
            map(tag(">"), |_| CmpOp::Gt),
        )),
    )(input)
}

fn operand(input: &str) -> IResult<&str, Expr> {
    preceded(
        multispace0,
        alt((
            delimited(
                char('('),
                delimited(multispace0, expr, multispace0),
                char(')'),
            ),
            string_literal,
            number_literal,
            signed_nonfinite,
            int_literal,
            hash_form,
            map(char('%'), |_| Expr::This),
            path_operand,
            word_operand,
        )),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, Expr> {
    match lexer::scan_string(input) {
        Ok((raw, rest)) => Ok((rest, Expr::Str(lexer::unescape(raw)))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn number_literal(input: &str) -> IResult<&str, Expr> {
    let (rest, literal) = verify(lexer::raw_number, |s: &str| {
        s.chars().any(|c| c.is_ascii_digit())
    })(input)?;
    match literal.parse::<f64>() {
        Ok(value) => Ok((rest, Expr::Number(value))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn signed_nonfinite(input: &str) -> IResult<&str, Expr> {
    let (rest, (sign, name)) = pair(opt(one_of("+-")), lexer::word)(input)?;
    let value = if name.eq_ignore_ascii_case("nan") {
        f64::NAN
    } else if name.eq_ignore_ascii_case("inf") || name.eq_ignore_ascii_case("infinity") {
        f64::INFINITY
    } else {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    };
    let value = if sign == Some('-') { -value } else { value };
    Ok((rest, Expr::Number(value)))
}

fn int_literal(input: &str) -> IResult<&str, Expr> {
    let (rest, literal) = lexer::raw_int(input)?;
    match lexer::int_value(literal) {
        Ok(value) => Ok((rest, Expr::Int(value))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

fn hash_form(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char('#')(input)?;
    if let Ok((rest, names)) = delimited(
        preceded(multispace0, char('(')),
        separated_list1(
            preceded(multispace0, char(',')),
            preceded(multispace0, map(lexer::word, str::to_owned)),
        ),
        preceded(multispace0, char(')')),
    )(input)
    {
        return Ok((rest, Expr::Count(names)));
    }
    if let Ok((rest, target)) = path(input) {
        return Ok((rest, Expr::Length(Some(target))));
    }
    Ok((input, Expr::Length(None)))
}

fn path_operand(input: &str) -> IResult<&str, Expr> {
    if !input.starts_with('/') && !input.starts_with('[') {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    map(path, Expr::Path)(input)
}

fn path(input: &str) -> IResult<&str, Path> {
    let (input, slash) = opt(char('/'))(input)?;
    let (input, segments) = separated_list1(char('/'), segment)(input)?;
    Ok((
        input,
        Path {
            absolute: slash.is_some(),
            segments,
        },
    ))
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        map(lexer::word, |name| Segment::Key(name.to_owned())),
        map(delimited(char('['), path, char(']')), Segment::Deref),
    ))(input)
}

/// A word is a boolean literal, a non-finite number, a key reference, or
/// the head of a relative path.
fn word_operand(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = lexer::word(input)?;
    match name {
        "yes" | "true" => return Ok((rest, Expr::Bool(true))),
        "no" | "false" => return Ok((rest, Expr::Bool(false))),
        _ => {}
    }
    if name.eq_ignore_ascii_case("nan") {
        return Ok((rest, Expr::Number(f64::NAN)));
    }
    if name.eq_ignore_ascii_case("inf") || name.eq_ignore_ascii_case("infinity") {
        return Ok((rest, Expr::Number(f64::INFINITY)));
    }
    if rest.starts_with('/') {
        let (rest, tail) = preceded(char('/'), separated_list1(char('/'), segment))(rest)?;
        let mut segments = vec![Segment::Key(name.to_owned())];
        segments.extend(tail);
        return Ok((
            rest,
            Expr::Path(Path {
                absolute: false,
                segments,
            }),
        ));
    }
    Ok((rest, Expr::Ident(name.to_owned())))
}

/// The schema context a constraint is type-checked in: the declaration
/// the constraint is attached to and the schema's `types` section.
pub(crate) struct TypeContext<'a> {
    pub(crate) decl: &'a Node,
    pub(crate) types: Option<&'a Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperandType {
    Bool,
    Int,
    Number,
    Str,
    /// Sections and lists: declared, but not comparable.
    Aggregate,
    /// Not statically knowable (paths, `any`); checked at evaluation.
    Dynamic,
    /// Not declared anywhere in the local schema context.
    Unknown,
}

fn basic_operand_type(basic: BasicType) -> OperandType {
    match basic {
        BasicType::Bool => OperandType::Bool,
        BasicType::Int => OperandType::Int,
        BasicType::Number => OperandType::Number,
        BasicType::Str => OperandType::Str,
        BasicType::Section | BasicType::List => OperandType::Aggregate,
        BasicType::Any => OperandType::Dynamic,
    }
}

fn declared_type(name: &str, context: &TypeContext<'_>) -> OperandType {
    match resolve_type(name, context.types) {
        Some((basic, _)) => basic_operand_type(basic),
        None => OperandType::Unknown,
    }
}

/// The type of an identifier, taken from the enclosing declaration's
/// `allowed-keys` or `item-type`.
fn ident_type(name: &str, context: &TypeContext<'_>) -> OperandType {
    if let Some(allowed) = context.decl.get("allowed-keys") {
        match allowed
            .get(name)
            .and_then(|decl| decl.get("type"))
            .and_then(Node::as_str)
        {
            Some(type_name) => declared_type(type_name, context),
            None => OperandType::Unknown,
        }
    } else if let Some(item_type) = context.decl.get("item-type").and_then(Node::as_str) {
        declared_type(item_type, context)
    } else {
        OperandType::Unknown
    }
}

/// The type of `%`: the enclosing declaration's own type, which must be
/// scalar.
fn this_type(context: &TypeContext<'_>) -> Option<OperandType> {
    let name = context.decl.get("type").and_then(Node::as_str)?;
    match declared_type(name, context) {
        scalar @ (OperandType::Bool | OperandType::Int | OperandType::Number | OperandType::Str) => {
            Some(scalar)
        }
        _ => None,
    }
}

fn ident_allowed(name: &str, context: &TypeContext<'_>) -> bool {
    match context.decl.get("allowed-keys") {
        Some(allowed) => allowed.get(name).is_some(),
        None => true,
    }
}

fn comparison_operand_type(expr: &Expr, context: &TypeContext<'_>) -> Option<OperandType> {
    match expr {
        Expr::Bool(_) => Some(OperandType::Bool),
        Expr::Int(_) => Some(OperandType::Int),
        Expr::Number(_) => Some(OperandType::Number),
        Expr::Str(_) => Some(OperandType::Str),
        Expr::Ident(name) => Some(ident_type(name, context)),
        Expr::This => this_type(context),
        Expr::Path(_) => Some(OperandType::Dynamic),
        Expr::Count(_) | Expr::Length(_) => Some(OperandType::Int),
        _ => None,
    }
}

/// The static check run while a schema loads: every identifier must be
/// declared where the declaration context pins the keys down, and every
/// comparison must be well-typed where both operand types are knowable.
pub(crate) fn well_typed(expr: &Expr, context: &TypeContext<'_>) -> bool {
    match expr {
        Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) | Expr::Xor(lhs, rhs) => {
            well_typed(lhs, context) && well_typed(rhs, context)
        }
        Expr::Not(inner) => well_typed(inner, context),
        Expr::Ident(name) => ident_allowed(name, context),
        Expr::Path(_) => true,
        // A bare `%` only has a truth value on a bool-typed key;
        // evaluation reads it with `as_bool`. Comparisons go through
        // `comparison_operand_type`, where the other scalars are fine.
        Expr::This => this_type(context) == Some(OperandType::Bool),
        Expr::Bool(_) | Expr::Int(_) | Expr::Number(_) | Expr::Str(_) => true,
        Expr::Count(names) => names.iter().all(|name| ident_allowed(name, context)),
        // A count is only boolean-valued through a comparison.
        Expr::Length(_) => false,
        Expr::Cmp(operator, lhs, rhs) => {
            let (Some(left), Some(right)) = (
                comparison_operand_type(lhs, context),
                comparison_operand_type(rhs, context),
            ) else {
                return false;
            };
            if left == OperandType::Dynamic || right == OperandType::Dynamic {
                return true;
            }
            if left != right {
                return false;
            }
            match left {
                OperandType::Str | OperandType::Bool => {
                    matches!(operator, CmpOp::Eq | CmpOp::Ne)
                }
                OperandType::Int | OperandType::Number => true,
                _ => false,
            }
        }
    }
}

/// A scalar value produced while evaluating an operand.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Operand<'a> {
    Bool(bool),
    Int(i64),
    Number(f64),
    Str(&'a str),
}

fn scalar_of(node: &Node) -> Option<Operand<'_>> {
    if let Some(value) = node.as_bool() {
        Some(Operand::Bool(value))
    } else if let Some(value) = node.as_int() {
        Some(Operand::Int(value))
    } else if let Some(value) = node.as_number() {
        Some(Operand::Number(value))
    } else {
        node.as_str().map(Operand::Str)
    }
}

fn resolve_path<'a>(path: &Path, subject: &'a Node, root: &'a Node) -> Option<&'a Node> {
    let mut current = if path.absolute { root } else { subject };
    for segment in &path.segments {
        current = match segment {
            Segment::Key(name) => current.get(name)?,
            Segment::Deref(inner) => {
                let name = resolve_path(inner, subject, root)?.as_str()?;
                current.get(name)?
            }
        };
    }
    Some(current)
}

fn operand_value<'a>(expr: &'a Expr, subject: &'a Node, root: &'a Node) -> Option<Operand<'a>> {
    match expr {
        Expr::Bool(value) => Some(Operand::Bool(*value)),
        Expr::Int(value) => Some(Operand::Int(*value)),
        Expr::Number(value) => Some(Operand::Number(*value)),
        Expr::Str(value) => Some(Operand::Str(value)),
        Expr::Ident(name) => subject.get(name).and_then(scalar_of),
        Expr::This => scalar_of(subject),
        Expr::Path(path) => resolve_path(path, subject, root).and_then(scalar_of),
        Expr::Count(names) => Some(Operand::Int(
            names
                .iter()
                .filter(|name| subject.get(name).is_some())
                .count() as i64,
        )),
        Expr::Length(None) => Some(Operand::Int(subject.len() as i64)),
        Expr::Length(Some(path)) => {
            resolve_path(path, subject, root).map(|node| Operand::Int(node.len() as i64))
        }
        _ => None,
    }
}

fn compare(operator: CmpOp, lhs: Option<Operand<'_>>, rhs: Option<Operand<'_>>) -> bool {
    // A comparison with an absent or mismatched operand is false.
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return false;
    };
    match (lhs, rhs) {
        (Operand::Int(a), Operand::Int(b)) => match operator {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        },
        (Operand::Number(a), Operand::Number(b)) => match operator {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        },
        (Operand::Str(a), Operand::Str(b)) => match operator {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            _ => false,
        },
        (Operand::Bool(a), Operand::Bool(b)) => match operator {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            _ => false,
        },
        _ => false,
    }
}

/// Evaluates a constraint against a subject node. `root` anchors
/// absolute paths.
pub(crate) fn evaluate(expr: &Expr, subject: &Node, root: &Node) -> bool {
    match expr {
        Expr::Bool(value) => *value,
        Expr::Ident(name) => subject.get(name).is_some(),
        Expr::This => subject.as_bool().unwrap_or(false),
        Expr::Path(path) => resolve_path(path, subject, root).is_some(),
        Expr::Not(inner) => !evaluate(inner, subject, root),
        Expr::And(lhs, rhs) => evaluate(lhs, subject, root) && evaluate(rhs, subject, root),
        Expr::Or(lhs, rhs) => evaluate(lhs, subject, root) || evaluate(rhs, subject, root),
        Expr::Xor(lhs, rhs) => evaluate(lhs, subject, root) ^ evaluate(rhs, subject, root),
        Expr::Cmp(operator, lhs, rhs) => compare(
            *operator,
            operand_value(lhs, subject, root),
            operand_value(rhs, subject, root),
        ),
        Expr::Int(_) | Expr::Number(_) | Expr::Str(_) | Expr::Count(_) | Expr::Length(_) => false,
    }
}
