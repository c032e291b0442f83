//! Conditional builders and column-transform shorthands.
//!
//! The `to_*` functions take and return an [`Expr`], so they slot straight
//! into [`across`](crate::across) or wrap a single column reference.

use tp_expr::{CaseBranch, Expr, Operand};

/// `yes` where `cond` holds, `no` elsewhere. Missing conditions take `no`.
pub fn if_else(cond: Expr, yes: impl Into<Operand>, no: impl Into<Operand>) -> Expr {
    Expr::CaseWhen {
        branches: vec![CaseBranch {
            condition: cond,
            value: yes.into(),
        }],
        default: no.into(),
    }
}

/// Conditional overlay onto `default`. When several conditions hold for a row,
/// the one listed last wins.
pub fn case_when<I, V>(branches: I, default: impl Into<Operand>) -> Expr
where
    I: IntoIterator<Item = (Expr, V)>,
    V: Into<Operand>,
{
    Expr::CaseWhen {
        branches: branches
            .into_iter()
            .map(|(condition, value)| CaseBranch {
                condition,
                value: value.into(),
            })
            .collect(),
        default: default.into(),
    }
}

/// Row mask: true when any cell, as text, contains any of `needles`.
pub fn row_contains<I, V>(needles: I) -> Expr
where
    I: IntoIterator<Item = V>,
    V: ToString,
{
    Expr::RowContains {
        needles: needles.into_iter().map(|needle| needle.to_string()).collect(),
    }
}

#[must_use]
pub fn to_lower(x: Expr) -> Expr {
    x.str_().lower()
}

#[must_use]
pub fn to_upper(x: Expr) -> Expr {
    x.str_().upper()
}

#[must_use]
pub fn to_strip(x: Expr) -> Expr {
    x.str_().strip()
}

#[must_use]
pub fn to_title(x: Expr) -> Expr {
    x.str_().title()
}

#[must_use]
pub fn to_str(x: Expr) -> Expr {
    x.astype("str")
}

/// Unparsable values become missing.
#[must_use]
pub fn to_int(x: Expr) -> Expr {
    x.astype("int64")
}

#[must_use]
pub fn to_float(x: Expr) -> Expr {
    x.astype("float64")
}

#[must_use]
pub fn to_date(x: Expr) -> Expr {
    x.astype("datetime64")
}

#[must_use]
pub fn to_cat(x: Expr) -> Expr {
    x.astype("category")
}

#[must_use]
pub fn to_zero(x: Expr) -> Expr {
    x.fillna(0)
}

/// Common placeholder spellings of "no value" become missing.
#[must_use]
pub fn to_na(x: Expr) -> Expr {
    x.na_if(["", "None", "null", "NA", "N/A"])
}

/// Curried rounding: `across(cols, to_round(1))`.
pub fn to_round(decimals: i64) -> impl Fn(Expr) -> Expr + Clone + Send + Sync + 'static {
    move |x: Expr| x.round(decimals)
}
