#![forbid(unsafe_code)]

//! Deferred column expressions for tidypipe.
//!
//! Expressions are built without a table ([`col`], [`Symbolic`], the operator
//! traits and builder methods on [`Expr`]) and only resolved when
//! [`evaluate`] or [`resolve_names`] is handed a concrete [`DataFrame`].
//! [`pipe`] and the `>>` operator feed a table through verbs, closures and
//! deferred [`MethodCall`] tokens.

mod eval;
mod expr;
mod methods;
mod pipe;
mod selector;

use thiserror::Error;
use tp_columnar::ColumnError;
use tp_frame::FrameError;
use tp_types::TypeError;

pub use eval::{AccessorView, Namespace, Value, evaluate, evaluate_mask, resolve_names};
pub use expr::{CaseBranch, ChainedCall, ColumnRef, Expr, Operand, Symbolic, col};
pub use pipe::{MethodCall, PipeStep, Piped, pipe};
pub use selector::{Pattern, Selector, TypePredicate};
pub use tp_columnar::{ArithmeticOp, ComparisonOp, LogicalOp, Reducer};
pub use tp_frame::DataFrame;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("column `{name}` not found")]
    ColumnNotFound { name: String },
    #[error("operation `{op}` is not supported for {operand}")]
    UnsupportedOperation { op: String, operand: String },
    #[error("length mismatch: expected {expected} rows, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid specification: {0}")]
    InvalidSpecification(String),
    #[error(transparent)]
    Column(ColumnError),
    #[error(transparent)]
    Frame(FrameError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl ExprError {
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound { name: name.into() }
    }

    pub fn unsupported(op: impl Into<String>, operand: impl ToString) -> Self {
        Self::UnsupportedOperation {
            op: op.into(),
            operand: operand.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidSpecification(message.into())
    }
}

impl From<ColumnError> for ExprError {
    fn from(err: ColumnError) -> Self {
        match err {
            ColumnError::LengthMismatch { left, right } => Self::LengthMismatch {
                expected: left,
                actual: right,
            },
            ColumnError::UnsupportedOperation { op, dtype } => Self::unsupported(op, dtype),
            ColumnError::Type(err) => Self::Type(err),
            other => Self::Column(other),
        }
    }
}

impl From<FrameError> for ExprError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ColumnNotFound(name) => Self::ColumnNotFound { name },
            FrameError::LengthMismatch { expected, actual } => {
                Self::LengthMismatch { expected, actual }
            }
            FrameError::UnsupportedMethod(name) => Self::unsupported(name, "DataFrame"),
            FrameError::Column(err) => Self::from(err),
            other => Self::Frame(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use tp_columnar::ColumnError;
    use tp_frame::FrameError;
    use tp_types::DType;

    use super::ExprError;

    #[test]
    fn lower_errors_flatten_into_the_public_taxonomy() {
        let err = ExprError::from(FrameError::ColumnNotFound("x".into()));
        assert_eq!(err, ExprError::column_not_found("x"));

        let err = ExprError::from(ColumnError::UnsupportedOperation {
            op: "str.lower".into(),
            dtype: DType::Int64,
        });
        assert_eq!(err.to_string(), "operation `str.lower` is not supported for int64");

        let err = ExprError::from(FrameError::Column(ColumnError::LengthMismatch {
            left: 3,
            right: 2,
        }));
        assert!(matches!(
            err,
            ExprError::LengthMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }
}
