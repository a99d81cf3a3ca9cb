//! Arithmetic evaluation over signed 64-bit integers.

use std::borrow::Cow;

use husk_parser::ast;

use crate::env;
use crate::expansion;
use crate::interp::ExecutionParameters;
use crate::session::Session;
use crate::variables::ValueLiteral;

/// An error encountered while evaluating an arithmetic expression.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Division (or modulo) by zero.
    #[error("division by 0")]
    DivideByZero,

    /// A negative exponent was used.
    #[error("exponent less than 0")]
    NegativeExponent,

    /// The expression could not be shell-expanded.
    #[error("failed to expand expression: `{0}'")]
    FailedToExpand(String),

    /// An array element could not be read.
    #[error("failed to access array")]
    FailedToAccessArray,

    /// An assignment could not be stored.
    #[error("failed to update environment")]
    FailedToUpdateEnvironment,

    /// The expression (or a variable's value) failed to parse.
    #[error("syntax error in expression: `{0}'")]
    ParseError(String),
}

/// Trait for expressions that can be expanded and then evaluated.
pub(crate) trait ExpandAndEvaluate {
    async fn eval(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<i64, EvalError>;
}

impl ExpandAndEvaluate for ast::UnexpandedArithmeticExpr {
    async fn eval(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<i64, EvalError> {
        expand_and_eval(session, params, self.text.as_str()).await
    }
}

/// Shell-expands the given expression text, parses it, and evaluates it.
pub(crate) async fn expand_and_eval(
    session: &mut Session,
    params: &ExecutionParameters,
    expr: &str,
) -> Result<i64, EvalError> {
    // Expansion happens first (without tilde handling), then parsing.
    let expanded = expansion::basic_expand_str_without_tilde(session, params, expr)
        .await
        .map_err(|_e| EvalError::FailedToExpand(expr.to_owned()))?;

    let parsed = husk_parser::arithmetic::parse(expanded.as_str())
        .map_err(|_e| EvalError::ParseError(expanded))?;

    parsed.eval(session)
}

/// Trait for parsed expressions that can be evaluated against a session.
pub trait Evaluatable {
    /// Evaluates the expression, returning its numeric value.
    fn eval(&self, session: &mut Session) -> Result<i64, EvalError>;
}

impl Evaluatable for ast::ArithmeticExpr {
    fn eval(&self, session: &mut Session) -> Result<i64, EvalError> {
        let value = match self {
            Self::Literal(n) => *n,
            Self::Reference(target) => deref_target(session, target)?,
            Self::UnaryOp(op, operand) => apply_unary_op(session, *op, operand)?,
            Self::BinaryOp(op, left, right) => apply_binary_op(session, *op, left, right)?,
            Self::Conditional(condition, then_expr, else_expr) => {
                // Only the selected branch is evaluated.
                if condition.eval(session)? != 0 {
                    then_expr.eval(session)?
                } else {
                    else_expr.eval(session)?
                }
            }
            Self::Assignment(target, expr) => {
                let value = expr.eval(session)?;
                assign(session, target, value)?
            }
            Self::UnaryAssignment(op, target) => apply_unary_assignment(session, target, *op)?,
            Self::BinaryAssignment(op, target, operand) => {
                let value =
                    apply_binary_op(session, *op, &Self::Reference(target.clone()), operand)?;
                assign(session, target, value)?
            }
        };

        Ok(value)
    }
}

fn deref_target(
    session: &mut Session,
    target: &ast::ArithmeticTarget,
) -> Result<i64, EvalError> {
    let value_str: Cow<'_, str> = match target {
        ast::ArithmeticTarget::Variable(name) => session
            .env
            .get_str(name.as_str())
            .map(|value| Cow::Owned(value.into_owned()))
            .unwrap_or(Cow::Borrowed("")),
        ast::ArithmeticTarget::ArrayElement(name, index_expr) => {
            let index = index_expr.eval(session)?.to_string();

            session
                .env
                .get(name.as_str())
                .map_or_else(
                    || Ok(None),
                    |(_, var)| var.value().get_at(index.as_str()),
                )
                .map_err(|_e| EvalError::FailedToAccessArray)?
                .map(|value| Cow::Owned(value.into_owned()))
                .unwrap_or(Cow::Borrowed(""))
        }
    };

    // The value may itself be an expression (e.g. `x='1 + 2'`).
    let parsed = husk_parser::arithmetic::parse(value_str.as_ref())
        .map_err(|_e| EvalError::ParseError(value_str.to_string()))?;

    parsed.eval(session)
}

fn apply_unary_op(
    session: &mut Session,
    op: ast::UnaryOperator,
    operand: &ast::ArithmeticExpr,
) -> Result<i64, EvalError> {
    let operand = operand.eval(session)?;

    Ok(match op {
        ast::UnaryOperator::Plus => operand,
        ast::UnaryOperator::Minus => operand.wrapping_neg(),
        ast::UnaryOperator::BitwiseNot => !operand,
        ast::UnaryOperator::LogicalNot => bool_to_i64(operand == 0),
    })
}

fn apply_binary_op(
    session: &mut Session,
    op: ast::BinaryOperator,
    left: &ast::ArithmeticExpr,
    right: &ast::ArithmeticExpr,
) -> Result<i64, EvalError> {
    // Short-circuiting operators evaluate their right side conditionally.
    match op {
        ast::BinaryOperator::LogicalAnd => {
            if left.eval(session)? == 0 {
                return Ok(0);
            }
            return Ok(bool_to_i64(right.eval(session)? != 0));
        }
        ast::BinaryOperator::LogicalOr => {
            if left.eval(session)? != 0 {
                return Ok(1);
            }
            return Ok(bool_to_i64(right.eval(session)? != 0));
        }
        _ => (),
    }

    let left = left.eval(session)?;
    let right = right.eval(session)?;

    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    match op {
        ast::BinaryOperator::Power => {
            if right >= 0 {
                Ok(wrapping_pow(left, right as u64))
            } else {
                Err(EvalError::NegativeExponent)
            }
        }
        ast::BinaryOperator::Multiply => Ok(left.wrapping_mul(right)),
        ast::BinaryOperator::Divide => {
            if right == 0 {
                Err(EvalError::DivideByZero)
            } else {
                Ok(left.wrapping_div(right))
            }
        }
        ast::BinaryOperator::Modulo => {
            if right == 0 {
                Err(EvalError::DivideByZero)
            } else {
                Ok(left.wrapping_rem(right))
            }
        }
        ast::BinaryOperator::Comma => Ok(right),
        ast::BinaryOperator::Add => Ok(left.wrapping_add(right)),
        ast::BinaryOperator::Subtract => Ok(left.wrapping_sub(right)),
        ast::BinaryOperator::ShiftLeft => Ok(left.wrapping_shl(right as u32)),
        ast::BinaryOperator::ShiftRight => Ok(left.wrapping_shr(right as u32)),
        ast::BinaryOperator::LessThan => Ok(bool_to_i64(left < right)),
        ast::BinaryOperator::LessThanOrEqual => Ok(bool_to_i64(left <= right)),
        ast::BinaryOperator::GreaterThan => Ok(bool_to_i64(left > right)),
        ast::BinaryOperator::GreaterThanOrEqual => Ok(bool_to_i64(left >= right)),
        ast::BinaryOperator::Equals => Ok(bool_to_i64(left == right)),
        ast::BinaryOperator::NotEquals => Ok(bool_to_i64(left != right)),
        ast::BinaryOperator::BitwiseAnd => Ok(left & right),
        ast::BinaryOperator::BitwiseXor => Ok(left ^ right),
        ast::BinaryOperator::BitwiseOr => Ok(left | right),
        ast::BinaryOperator::LogicalAnd | ast::BinaryOperator::LogicalOr => {
            unreachable!("short-circuit operators handled above")
        }
    }
}

fn apply_unary_assignment(
    session: &mut Session,
    target: &ast::ArithmeticTarget,
    op: ast::UnaryAssignmentOperator,
) -> Result<i64, EvalError> {
    let value = deref_target(session, target)?;

    match op {
        ast::UnaryAssignmentOperator::PrefixIncrement => {
            let new_value = value.wrapping_add(1);
            assign(session, target, new_value)?;
            Ok(new_value)
        }
        ast::UnaryAssignmentOperator::PrefixDecrement => {
            let new_value = value.wrapping_sub(1);
            assign(session, target, new_value)?;
            Ok(new_value)
        }
        ast::UnaryAssignmentOperator::PostfixIncrement => {
            assign(session, target, value.wrapping_add(1))?;
            Ok(value)
        }
        ast::UnaryAssignmentOperator::PostfixDecrement => {
            assign(session, target, value.wrapping_sub(1))?;
            Ok(value)
        }
    }
}

fn assign(
    session: &mut Session,
    target: &ast::ArithmeticTarget,
    value: i64,
) -> Result<i64, EvalError> {
    match target {
        ast::ArithmeticTarget::Variable(name) => {
            session
                .env
                .update_or_add(
                    name.as_str(),
                    ValueLiteral::Scalar(value.to_string()),
                    |_| Ok(()),
                    env::EnvironmentLookup::Anywhere,
                    env::EnvironmentScope::Global,
                )
                .map_err(|_e| EvalError::FailedToUpdateEnvironment)?;
        }
        ast::ArithmeticTarget::ArrayElement(name, index_expr) => {
            let index = index_expr.eval(session)?.to_string();

            session
                .env
                .update_or_add_array_element(
                    name.as_str(),
                    index,
                    value.to_string(),
                    false,
                    env::EnvironmentLookup::Anywhere,
                    env::EnvironmentScope::Global,
                )
                .map_err(|_e| EvalError::FailedToUpdateEnvironment)?;
        }
    }

    Ok(value)
}

const fn bool_to_i64(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

// i64::wrapping_pow takes a u32 exponent; shells need the full 64-bit range.
const fn wrapping_pow(mut base: i64, mut exponent: u64) -> i64 {
    let mut result: i64 = 1;

    while exponent > 0 {
        if exponent % 2 == 1 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exponent /= 2;
    }

    result
}
