use std::fmt;

use tp_columnar::{Column, ColumnError};
use tp_frame::DataFrame;
use tp_types::{DType, NullKind, Scalar};

use crate::expr::{CaseBranch, ChainedCall, Expr, Operand};
use crate::methods::apply_method;
use crate::ExprError;

/// Accessor namespace opened by a `str`, `dt` or `cat` chain link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Str,
    Dt,
    Cat,
}

impl Namespace {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "str" => Some(Self::Str),
            "dt" => Some(Self::Dt),
            "cat" => Some(Self::Cat),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Dt => "dt",
            Self::Cat => "cat",
        }
    }

    fn admits(self, dtype: DType) -> bool {
        dtype == DType::Null
            || match self {
                Self::Str => dtype.is_text_like(),
                Self::Dt => dtype.is_temporal(),
                Self::Cat => dtype.is_categorical(),
            }
    }
}

/// A column seen through an accessor namespace, waiting for its method link.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessorView {
    pub namespace: Namespace,
    pub column: Column,
    /// The view wraps a reduced value lifted into a one-row column.
    pub lifted: bool,
}

/// The materialized result of evaluating an [`Expr`] against a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Row-aligned data.
    Column(Column),
    /// A single value, from a literal or a reducer.
    Scalar(Scalar),
    Accessor(AccessorView),
    /// Column names, from a range or selector.
    Names(Vec<String>),
    /// Column names tagged for removal.
    Excluded(Vec<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Self::Column(_) => "column",
            Self::Scalar(_) => "scalar",
            Self::Accessor(_) => "accessor",
            Self::Names(_) => "column names",
            Self::Excluded(_) => "excluded column names",
        }
    }

    /// Row data of length `len`, broadcasting scalars.
    pub fn into_column(self, len: usize) -> Result<Column, ExprError> {
        match self {
            Self::Column(column) => Ok(column),
            Self::Scalar(value) => Ok(Column::full(value, len)?),
            Self::Accessor(view) => Err(ExprError::invalid(format!(
                "accessor `{}` must be followed by a method",
                view.namespace.name()
            ))),
            other => Err(ExprError::invalid(format!(
                "expected row data but the expression produced {}",
                other.kind()
            ))),
        }
    }

    pub fn into_scalar(self) -> Result<Scalar, ExprError> {
        match self {
            Self::Scalar(value) => Ok(value),
            other => Err(ExprError::invalid(format!(
                "expected a single value but the expression produced {}",
                other.kind()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::Column(column) => write!(f, "column[{}; {}]", column.dtype(), column.len()),
            Self::Accessor(view) => write!(f, ".{}", view.namespace.name()),
            Self::Names(names) | Self::Excluded(names) => write!(f, "{}", names.join(", ")),
        }
    }
}

/// Resolve an expression against `frame`. The frame is never modified.
pub fn evaluate(expr: &Expr, frame: &DataFrame) -> Result<Value, ExprError> {
    match expr {
        Expr::Column(column) => {
            #[cfg(feature = "tracing")]
            tracing::trace!(column = column.name(), "evaluate column reference");
            frame
                .column(column.name())
                .cloned()
                .map(Value::Column)
                .ok_or_else(|| ExprError::column_not_found(column.name()))
        }
        Expr::Compare { left, op, right } => {
            #[cfg(feature = "tracing")]
            tracing::trace!(op = op.symbol(), "evaluate comparison");
            let lhs = evaluate(left, frame)?;
            let rhs = evaluate_operand(right, frame)?;
            combine(lhs, rhs, frame, |l, r| l.compare(r, *op))
        }
        Expr::Arith { left, op, right } => {
            #[cfg(feature = "tracing")]
            tracing::trace!(op = op.symbol(), "evaluate arithmetic");
            let lhs = evaluate_operand(left, frame)?;
            let rhs = evaluate_operand(right, frame)?;
            combine(lhs, rhs, frame, |l, r| l.binary_numeric(r, *op))
        }
        Expr::Logical { left, op, right } => {
            let lhs = evaluate(left, frame)?;
            let rhs = evaluate(right, frame)?;
            combine(lhs, rhs, frame, |l, r| l.logical(r, *op))
        }
        Expr::Not(inner) => match evaluate(inner, frame)? {
            Value::Scalar(value) => lift(value, Column::not),
            other => Ok(Value::Column(other.into_column(frame.nrows())?.not()?)),
        },
        Expr::Chain(call) => evaluate_chain(call, frame),
        Expr::Range { start, end } => Ok(Value::Names(range_names(start, end, frame)?)),
        Expr::Exclude(inner) => Ok(Value::Excluded(names_of(inner, frame)?)),
        Expr::Select(selector) => Ok(Value::Names(
            frame
                .iter()
                .filter(|(name, column)| selector.matches(name, column.dtype()))
                .map(|(name, _)| name.to_owned())
                .collect(),
        )),
        Expr::CaseWhen { branches, default } => case_when(branches, default, frame),
        Expr::RowContains { needles } => row_contains(needles, frame),
    }
}

/// Column names an expression designates, for selection-style verbs.
///
/// Exclusions resolve to the complement of the wrapped names, in table order.
pub fn resolve_names(expr: &Expr, frame: &DataFrame) -> Result<Vec<String>, ExprError> {
    match expr {
        Expr::Exclude(inner) => {
            let excluded = names_of(inner, frame)?;
            Ok(frame
                .column_names()
                .iter()
                .filter(|name| !excluded.contains(name))
                .cloned()
                .collect())
        }
        other => names_of(other, frame),
    }
}

fn names_of(expr: &Expr, frame: &DataFrame) -> Result<Vec<String>, ExprError> {
    match expr {
        Expr::Column(column) => {
            if frame.contains(column.name()) {
                Ok(vec![column.name().to_owned()])
            } else {
                Err(ExprError::column_not_found(column.name()))
            }
        }
        Expr::Range { start, end } => range_names(start, end, frame),
        Expr::Select(_) | Expr::Exclude(_) => match evaluate(expr, frame)? {
            Value::Names(names) => Ok(names),
            // Nested exclusions: the complement of what the inner one removes.
            Value::Excluded(_) => resolve_names(expr, frame),
            other => Err(ExprError::invalid(format!(
                "expected column names, got {}",
                other.kind()
            ))),
        },
        _ => Err(ExprError::invalid(
            "only column references, ranges and selectors resolve to column names",
        )),
    }
}

fn endpoint(expr: &Expr, frame: &DataFrame) -> Result<usize, ExprError> {
    let column = expr
        .column_ref()
        .ok_or_else(|| ExprError::invalid("range endpoints must be column references"))?;
    frame
        .column_index(column.name())
        .ok_or_else(|| ExprError::column_not_found(column.name()))
}

fn range_names(start: &Expr, end: &Expr, frame: &DataFrame) -> Result<Vec<String>, ExprError> {
    let from = endpoint(start, frame)?;
    let to = endpoint(end, frame)?;
    #[cfg(feature = "tracing")]
    tracing::trace!(from, to, "evaluate column range");
    if from > to {
        return Ok(Vec::new());
    }
    Ok(frame.column_names()[from..=to].to_vec())
}

pub(crate) fn evaluate_operand(operand: &Operand, frame: &DataFrame) -> Result<Value, ExprError> {
    match operand {
        Operand::Literal(value) => Ok(Value::Scalar(value.clone())),
        Operand::Node(expr) => evaluate(expr, frame),
    }
}

/// Apply a column kernel to a single value through a one-row column.
pub(crate) fn lift(
    value: Scalar,
    kernel: impl FnOnce(&Column) -> Result<Column, ColumnError>,
) -> Result<Value, ExprError> {
    let out = kernel(&Column::full(value, 1)?)?;
    Ok(collapse(out))
}

/// Turn a one-row result back into a scalar.
pub(crate) fn collapse(column: Column) -> Value {
    match column.values() {
        [single] => Value::Scalar(single.clone()),
        _ => Value::Column(column),
    }
}

/// Element-wise binary kernel with scalar broadcasting on either side.
fn combine(
    lhs: Value,
    rhs: Value,
    frame: &DataFrame,
    kernel: impl FnOnce(&Column, &Column) -> Result<Column, ColumnError>,
) -> Result<Value, ExprError> {
    match (lhs, rhs) {
        (Value::Scalar(l), Value::Scalar(r)) => {
            let out = kernel(&Column::full(l, 1)?, &Column::full(r, 1)?)?;
            Ok(collapse(out))
        }
        (Value::Column(l), Value::Scalar(r)) => {
            let r = Column::full(r, l.len())?;
            Ok(Value::Column(kernel(&l, &r)?))
        }
        (Value::Scalar(l), Value::Column(r)) => {
            let l = Column::full(l, r.len())?;
            Ok(Value::Column(kernel(&l, &r)?))
        }
        (l, r) => {
            let l = l.into_column(frame.nrows())?;
            let r = r.into_column(frame.nrows())?;
            Ok(Value::Column(kernel(&l, &r)?))
        }
    }
}

fn evaluate_chain(call: &ChainedCall, frame: &DataFrame) -> Result<Value, ExprError> {
    let parent = evaluate(call.parent(), frame)?;
    #[cfg(feature = "tracing")]
    tracing::trace!(link = call.name(), "evaluate chain link");

    if call.is_accessor()
        && let Some(namespace) = Namespace::parse(call.name())
    {
        let (column, lifted) = match parent {
            Value::Column(column) => (column, false),
            Value::Scalar(value) => (Column::full(value, 1)?, true),
            other => {
                return Err(ExprError::unsupported(
                    format!(".{}", namespace.name()),
                    other.kind(),
                ));
            }
        };
        if !namespace.admits(column.dtype()) {
            return Err(ExprError::unsupported(
                format!(".{} accessor", namespace.name()),
                column.dtype(),
            ));
        }
        return Ok(Value::Accessor(AccessorView {
            namespace,
            column,
            lifted,
        }));
    }

    let args = call
        .args()
        .iter()
        .map(|arg| evaluate_operand(arg, frame))
        .collect::<Result<Vec<_>, _>>()?;
    apply_method(parent, call.name(), &args, call.kwargs())
}

fn case_when(
    branches: &[CaseBranch],
    default: &Operand,
    frame: &DataFrame,
) -> Result<Value, ExprError> {
    if branches.is_empty() {
        return Err(ExprError::invalid("case_when needs at least one condition"));
    }
    let nrows = frame.nrows();
    let mut values = evaluate_operand(default, frame)?
        .into_column(nrows)?
        .into_values();
    if values.len() != nrows {
        return Err(ExprError::LengthMismatch {
            expected: nrows,
            actual: values.len(),
        });
    }

    // Branches overlay in listed order, so a later match replaces an earlier one.
    for branch in branches {
        let mask = evaluate(&branch.condition, frame)?
            .into_column(nrows)?
            .to_mask()?;
        let replacement = evaluate_operand(&branch.value, frame)?.into_column(nrows)?;
        for len in [mask.len(), replacement.len()] {
            if len != nrows {
                return Err(ExprError::LengthMismatch {
                    expected: nrows,
                    actual: len,
                });
            }
        }
        for (row, (hit, value)) in mask.iter().zip(replacement.values()).enumerate() {
            if *hit {
                values[row] = value.clone();
            }
        }
    }

    let values = values
        .into_iter()
        .map(|value| match value {
            Scalar::Null(NullKind::NaN | NullKind::NaT) => Scalar::Null(NullKind::Null),
            other => other,
        })
        .collect();
    Ok(Value::Column(Column::from_values(values)?))
}

fn row_contains(needles: &[String], frame: &DataFrame) -> Result<Value, ExprError> {
    let mask = (0..frame.nrows())
        .map(|row| {
            let hit = frame.iter().any(|(_, column)| {
                column.value(row).is_some_and(|cell| {
                    let text = cell.to_string();
                    needles.iter().any(|needle| text.contains(needle.as_str()))
                })
            });
            Scalar::Bool(hit)
        })
        .collect();
    Ok(Value::Column(Column::new(DType::Bool, mask)?))
}

/// Evaluate a boolean expression to a row mask; missing counts as `false`.
pub fn evaluate_mask(expr: &Expr, frame: &DataFrame) -> Result<Vec<bool>, ExprError> {
    let column = evaluate(expr, frame)?.into_column(frame.nrows())?;
    if column.len() != frame.nrows() {
        return Err(ExprError::LengthMismatch {
            expected: frame.nrows(),
            actual: column.len(),
        });
    }
    Ok(column.to_mask()?)
}
