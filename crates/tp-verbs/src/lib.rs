#![forbid(unsafe_code)]

//! Table verbs for tidypipe.
//!
//! Every verb is a small value built up front and applied when a table is
//! piped through it, either with [`tp_expr::pipe`] or with `>>`:
//!
//! ```ignore
//! let out = (df >> filter([col("score").gt(5.0)]) >> select(["id", "score"])).finish()?;
//! ```

mod columns;
mod combine;
mod helpers;
mod mutate;
mod reshape;
mod rows;
mod summarize;

use std::ops::Shr;

use tp_expr::{DataFrame, Expr, ExprError, PipeStep, Piped, pipe};
use tp_groupby::{GroupByError, GroupedFrame};
use tp_join::JoinError;

pub use columns::{
    Pull, Relocate, Rename, RoundColumns, Select, pull, relocate, rename, round, select,
};
pub use combine::{BindCols, BindColsOptions, BindRows, Join, bind_cols, bind_rows, join};
pub use helpers::{
    case_when, if_else, row_contains, to_cat, to_date, to_float, to_int, to_lower, to_na,
    to_round, to_str, to_strip, to_title, to_upper, to_zero,
};
pub use mutate::{Across, Assignment, Mutate, MutateOptions, across, mutate};
pub use reshape::{Fill, Separate, SeparateOptions, Unite, UniteOptions, separate, unite};
pub use rows::{
    Arrange, ArrangeOptions, Distinct, DropNa, DropNaOptions, Filter, Head, Sample, SampleSize,
    Slice, Tail, arrange, distinct, drop_na, filter, head, sample, sample_frac, slice, tail,
};
pub use summarize::{
    GroupBy, Reframe, Summarize, Ungroup, group_by, reframe, summarize, ungroup,
};
pub use tp_frame::DropHow;
pub use tp_groupby::GroupByOptions;
pub use tp_join::{JoinOptions, JoinType};

/// Lets `table >> verb` start a pipeline; the orphan rule rules out a blanket impl.
macro_rules! pipe_operator {
    ($input:ty => $($verb:ty),* $(,)?) => {
        $(
            impl Shr<$verb> for $input {
                type Output = Piped<<$verb as PipeStep<$input>>::Output>;

                fn shr(self, verb: $verb) -> Self::Output {
                    Piped::from(pipe(self, verb))
                }
            }
        )*
    };
}

pipe_operator!(DataFrame =>
    Select, Filter, Mutate, Arrange, Relocate, Rename, Distinct, DropNa, RoundColumns, Pull,
    Head, Tail, Slice, Sample, BindRows, BindCols, Join, Unite, Separate, GroupBy, Summarize,
    Reframe,
);
pipe_operator!(GroupedFrame => Summarize, Reframe, Ungroup);

/// Names designated by a list of verb arguments, first occurrence kept.
pub(crate) fn resolve_all(exprs: &[Expr], frame: &DataFrame) -> Result<Vec<String>, ExprError> {
    let mut names = Vec::new();
    for expr in exprs {
        for name in tp_expr::resolve_names(expr, frame)? {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// A single column name: verbs like `rename` and `relocate` anchors need a plain reference.
pub(crate) fn single_name(expr: &Expr, frame: &DataFrame) -> Result<String, ExprError> {
    let column = expr
        .column_ref()
        .ok_or_else(|| ExprError::invalid("expected a plain column reference"))?;
    if frame.contains(column.name()) {
        Ok(column.name().to_owned())
    } else {
        Err(ExprError::column_not_found(column.name()))
    }
}

pub(crate) fn groupby_error(err: GroupByError) -> ExprError {
    match err {
        GroupByError::Frame(err) => err.into(),
        GroupByError::Column(err) => err.into(),
        other => ExprError::invalid(other.to_string()),
    }
}

pub(crate) fn join_error(err: JoinError) -> ExprError {
    match err {
        JoinError::Frame(err) => err.into(),
        JoinError::Column(err) => err.into(),
        other => ExprError::invalid(other.to_string()),
    }
}
