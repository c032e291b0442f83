#![forbid(unsafe_code)]

//! dplyr-style table pipelines.
//!
//! A pipeline is a table fed through a sequence of steps. Steps are verbs
//! ([`select`], [`filter`], [`mutate`], ...), deferred method calls built from
//! [`Symbolic::method`], or plain closures. Column logic is written as
//! [`Expr`] trees that stay symbolic until the verb sees the table.
//!
//! ```
//! use tidypipe::prelude::*;
//!
//! let df = DataFrame::from_rows(
//!     &[("id", DType::Int64), ("name", DType::Utf8), ("score", DType::Float64)],
//!     vec![
//!         vec![1.into(), "a".into(), 10.0.into()],
//!         vec![2.into(), "b".into(), Scalar::Null(NullKind::Null)],
//!     ],
//! )?;
//! let kept = (df >> filter([col("score").gt(5.0)]) >> select(["id", "name"])).finish()?;
//! assert_eq!(kept.nrows(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use tp_columnar::{
    ArithmeticOp, Column, ColumnError, ComparisonOp, ContainsOptions, DateField, LogicalOp, Reducer,
};
pub use tp_expr::{
    AccessorView, CaseBranch, ChainedCall, ColumnRef, Expr, ExprError, MethodCall, Namespace,
    Operand, Pattern, PipeStep, Piped, Selector, Symbolic, TypePredicate, Value, col, evaluate,
    evaluate_mask, pipe, resolve_names,
};
pub use tp_frame::{DataFrame, FrameError};
pub use tp_groupby::{Group, GroupByError, GroupedFrame};
pub use tp_join::JoinError;
pub use tp_types::{DType, NullKind, Scalar, TypeError};
pub use tp_verbs::*;

/// The symbolic root, `_` in pipelines written as `_.col("x")`.
pub const SYM: Symbolic = Symbolic;

/// Everything a pipeline usually needs in scope.
pub mod prelude {
    pub use crate::{
        DType, DataFrame, Expr, ExprError, NullKind, Piped, SYM, Scalar, Selector, TypePredicate,
        col, pipe,
    };
    pub use tp_verbs::*;
}
