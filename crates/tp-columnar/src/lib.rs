#![forbid(unsafe_code)]

mod aggregate;
mod categorical;
mod temporal;
mod text;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_types::{
    DType, HashKey, NullKind, Scalar, TypeError, cast_scalar, cast_scalar_owned, common_dtype,
    compare_scalars, dtypes_comparable, infer_dtype,
};

pub use aggregate::Reducer;
pub use temporal::{DateField, parse_datetime};
pub use text::ContainsOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityMask {
    bits: Vec<bool>,
}

impl ValidityMask {
    #[must_use]
    pub fn from_values(values: &[Scalar]) -> Self {
        let bits = values.iter().map(|value| !value.is_missing()).collect();
        Self { bits }
    }

    #[must_use]
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColumnRepr", into = "ColumnRepr")]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
    validity: ValidityMask,
}

/// Stored form of a [`Column`]. Loading goes through [`Column::new`], so
/// values are coerced to the dtype and the validity mask is rebuilt.
#[derive(Serialize, Deserialize)]
struct ColumnRepr {
    dtype: DType,
    values: Vec<Scalar>,
}

impl TryFrom<ColumnRepr> for Column {
    type Error = ColumnError;

    fn try_from(repr: ColumnRepr) -> Result<Self, Self::Error> {
        Self::new(repr.dtype, repr.values)
    }
}

impl From<Column> for ColumnRepr {
    fn from(column: Column) -> Self {
        Self {
            dtype: column.dtype,
            values: column.values,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    /// True division; always produces float64.
    Div,
    /// Floor division, rounding toward negative infinity.
    FloorDiv,
    /// Modulo with the sign of the divisor.
    Mod,
    Pow,
}

impl ArithmeticOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// The operator that gives the same answer with the operands swapped.
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Self::Gt => Self::Lt,
            Self::Lt => Self::Gt,
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Ge => Self::Le,
            Self::Le => Self::Ge,
        }
    }

    #[must_use]
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("operation `{op}` is not supported for dtype {dtype}")]
    UnsupportedOperation { op: String, dtype: DType },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl ColumnError {
    pub(crate) fn unsupported(op: impl Into<String>, dtype: DType) -> Self {
        Self::UnsupportedOperation {
            op: op.into(),
            dtype,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SortKey<'a> {
    pub column: &'a Column,
    pub descending: bool,
}

impl Column {
    /// Construct a column, coercing values to the target dtype.
    /// Takes ownership of the values vec and uses `cast_scalar_owned`
    /// to skip cloning when values already have the correct dtype.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let needs_coercion = values.iter().any(|v| {
            let d = v.dtype();
            d != dtype && d != DType::Null
        });

        let coerced = if needs_coercion {
            values
                .into_iter()
                .map(|value| cast_scalar_owned(value, dtype))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            // Only remap Null variants to the dtype-specific missing marker.
            values
                .into_iter()
                .map(|value| match value {
                    Scalar::Null(_) => Scalar::missing_for_dtype(dtype),
                    other => other,
                })
                .collect()
        };

        let validity = ValidityMask::from_values(&coerced);

        Ok(Self {
            dtype,
            values: coerced,
            validity,
        })
    }

    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = infer_dtype(&values)?;
        Self::new(dtype, values)
    }

    /// A column repeating one value; used to broadcast literals and aggregates.
    pub fn full(value: Scalar, len: usize) -> Result<Self, ColumnError> {
        let dtype = value.dtype();
        Self::new(dtype, vec![value; len])
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Scalar> {
        self.values
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    /// Reinterpret text values as a categorical column (or back).
    pub fn with_dtype(self, dtype: DType) -> Result<Self, ColumnError> {
        Self::new(dtype, self.values)
    }

    pub fn reindex_by_positions(&self, positions: &[Option<usize>]) -> Result<Self, ColumnError> {
        let values = positions
            .iter()
            .map(|slot| match slot {
                Some(idx) => self
                    .values
                    .get(*idx)
                    .cloned()
                    .unwrap_or_else(|| Scalar::missing_for_dtype(self.dtype)),
                None => Scalar::missing_for_dtype(self.dtype),
            })
            .collect::<Vec<_>>();

        Self::new(self.dtype, values)
    }

    pub fn take(&self, positions: &[usize]) -> Result<Self, ColumnError> {
        let values = positions
            .iter()
            .map(|idx| {
                self.values
                    .get(*idx)
                    .cloned()
                    .unwrap_or_else(|| Scalar::missing_for_dtype(self.dtype))
            })
            .collect::<Vec<_>>();
        Self::new(self.dtype, values)
    }

    pub fn filter_mask(&self, mask: &[bool]) -> Result<Self, ColumnError> {
        if mask.len() != self.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: mask.len(),
            });
        }
        let values = self
            .values
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(value, _)| value.clone())
            .collect();
        Self::new(self.dtype, values)
    }

    pub fn binary_numeric(&self, right: &Self, op: ArithmeticOp) -> Result<Self, ColumnError> {
        if self.len() != right.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: right.len(),
            });
        }

        let textual = |dtype: DType| dtype.is_text_like() || dtype == DType::Null;
        if matches!(op, ArithmeticOp::Add)
            && textual(self.dtype)
            && textual(right.dtype)
            && (self.dtype != DType::Null || right.dtype != DType::Null)
        {
            return self.concat_text(right);
        }

        let numeric = |dtype: DType| dtype.is_numeric_like() || dtype == DType::Null;
        if !numeric(self.dtype) {
            return Err(ColumnError::unsupported(op.symbol(), self.dtype));
        }
        if !numeric(right.dtype) {
            return Err(ColumnError::unsupported(op.symbol(), right.dtype));
        }

        let out_dtype = numeric_out_dtype(self.dtype, right, op)?;

        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(left, right)| arith_scalar(left, right, op, out_dtype))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(out_dtype, values)
    }

    fn concat_text(&self, right: &Self) -> Result<Self, ColumnError> {
        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(left, right)| match (left, right) {
                (Scalar::Utf8(a), Scalar::Utf8(b)) => Scalar::Utf8(format!("{a}{b}")),
                _ => Scalar::Null(NullKind::Null),
            })
            .collect();
        Self::new(DType::Utf8, values)
    }

    /// Element-wise comparison producing a bool column.
    ///
    /// Any pair involving a missing value compares `false`, for every operator.
    pub fn compare(&self, right: &Self, op: ComparisonOp) -> Result<Self, ColumnError> {
        if self.len() != right.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: right.len(),
            });
        }

        let comparable = dtypes_comparable(self.dtype, right.dtype);
        if !comparable && !matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
            let offending = if self.dtype.is_numeric_like() {
                right.dtype
            } else {
                self.dtype
            };
            return Err(ColumnError::unsupported(op.symbol(), offending));
        }

        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(left, right)| {
                if left.is_missing() || right.is_missing() {
                    return Scalar::Bool(false);
                }
                let outcome = match compare_scalars(left, right) {
                    Some(ordering) => op.holds(ordering),
                    // Mixed, non-comparable dtypes: never equal.
                    None => matches!(op, ComparisonOp::Ne),
                };
                Scalar::Bool(outcome)
            })
            .collect();

        Self::new(DType::Bool, values)
    }

    pub fn compare_scalar(&self, value: &Scalar, op: ComparisonOp) -> Result<Self, ColumnError> {
        let right = Self::full(value.clone(), self.len())?;
        self.compare(&right, op)
    }

    /// Three-valued (Kleene) boolean combination of two masks.
    pub fn logical(&self, right: &Self, op: LogicalOp) -> Result<Self, ColumnError> {
        if self.len() != right.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: right.len(),
            });
        }
        let op_name = match op {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        };
        self.require_bool(op_name)?;
        right.require_bool(op_name)?;

        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(left, right)| {
                let (l, r) = (left.as_bool(), right.as_bool());
                let out = match op {
                    LogicalOp::And => match (l, r) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    },
                    LogicalOp::Or => match (l, r) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    },
                };
                Scalar::from(out)
            })
            .collect();
        Self::new(DType::Bool, values)
    }

    pub fn not(&self) -> Result<Self, ColumnError> {
        self.require_bool("not")?;
        let values = self
            .values
            .iter()
            .map(|value| Scalar::from(value.as_bool().map(|v| !v)))
            .collect();
        Self::new(DType::Bool, values)
    }

    fn require_bool(&self, op: &str) -> Result<(), ColumnError> {
        if matches!(self.dtype, DType::Bool | DType::Null) {
            Ok(())
        } else {
            Err(ColumnError::unsupported(op, self.dtype))
        }
    }

    /// Interpret the column as a row mask; missing counts as `false`.
    pub fn to_mask(&self) -> Result<Vec<bool>, ColumnError> {
        self.require_bool("mask")?;
        Ok(self
            .values
            .iter()
            .map(|value| value.as_bool().unwrap_or(false))
            .collect())
    }

    pub fn is_missing_mask(&self) -> Result<Self, ColumnError> {
        let values = self
            .values
            .iter()
            .map(|value| Scalar::Bool(value.is_missing()))
            .collect();
        Self::new(DType::Bool, values)
    }

    pub fn not_missing_mask(&self) -> Result<Self, ColumnError> {
        let values = self
            .values
            .iter()
            .map(|value| Scalar::Bool(!value.is_missing()))
            .collect();
        Self::new(DType::Bool, values)
    }

    pub fn fill_missing(&self, fill: &Scalar) -> Result<Self, ColumnError> {
        let dtype = common_dtype(self.dtype, fill.dtype())?;
        let values = self
            .values
            .iter()
            .map(|value| {
                if value.is_missing() {
                    fill.clone()
                } else {
                    value.clone()
                }
            })
            .collect();
        Self::new(dtype, values)
    }

    pub fn is_in(&self, candidates: &[Scalar]) -> Result<Self, ColumnError> {
        let lookup = candidates
            .iter()
            .map(HashKey::from_scalar)
            .collect::<HashSet<_>>();
        let values = self
            .values
            .iter()
            .map(|value| Scalar::Bool(lookup.contains(&HashKey::from_scalar(value))))
            .collect();
        Self::new(DType::Bool, values)
    }

    /// Inclusive range check, `left <= value <= right`.
    pub fn between(&self, left: &Scalar, right: &Scalar) -> Result<Self, ColumnError> {
        let lower = self.compare_scalar(left, ComparisonOp::Ge)?;
        let upper = self.compare_scalar(right, ComparisonOp::Le)?;
        lower.logical(&upper, LogicalOp::And)
    }

    /// Lenient dtype conversion: unparsable text becomes missing instead of failing.
    pub fn astype(&self, target: DType) -> Result<Self, ColumnError> {
        if target == self.dtype {
            return Ok(self.clone());
        }
        let values = self
            .values
            .iter()
            .map(|value| convert_lenient(value, target))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(target, values)
    }

    pub fn round(&self, decimals: i32) -> Result<Self, ColumnError> {
        match self.dtype {
            DType::Null | DType::Bool => Ok(self.clone()),
            DType::Int64 if decimals >= 0 => Ok(self.clone()),
            DType::Int64 => {
                let values = self
                    .values
                    .iter()
                    .map(|value| match value {
                        Scalar::Int64(v) => {
                            Scalar::Int64(round_half_even(*v as f64, decimals) as i64)
                        }
                        other => other.clone(),
                    })
                    .collect();
                Self::new(DType::Int64, values)
            }
            DType::Float64 => {
                let values = self
                    .values
                    .iter()
                    .map(|value| match value {
                        Scalar::Float64(v) => Scalar::Float64(round_half_even(*v, decimals)),
                        other => other.clone(),
                    })
                    .collect();
                Self::new(DType::Float64, values)
            }
            other => Err(ColumnError::unsupported("round", other)),
        }
    }

    pub fn abs(&self) -> Result<Self, ColumnError> {
        match self.dtype {
            DType::Null => Ok(self.clone()),
            DType::Int64 | DType::Float64 => {
                let values = self
                    .values
                    .iter()
                    .map(|value| match value {
                        Scalar::Int64(v) => Scalar::Int64(v.wrapping_abs()),
                        Scalar::Float64(v) => Scalar::Float64(v.abs()),
                        other => other.clone(),
                    })
                    .collect();
                Self::new(self.dtype, values)
            }
            other => Err(ColumnError::unsupported("abs", other)),
        }
    }

    /// Running sum; missing positions stay missing and are skipped.
    pub fn cumsum(&self) -> Result<Self, ColumnError> {
        match self.dtype {
            DType::Null => Ok(self.clone()),
            DType::Bool | DType::Int64 => {
                let mut acc: i64 = 0;
                let values = self
                    .values
                    .iter()
                    .map(|value| match value.as_i64() {
                        Some(v) if !value.is_missing() => {
                            acc = acc.wrapping_add(v);
                            Scalar::Int64(acc)
                        }
                        _ => Scalar::Null(NullKind::Null),
                    })
                    .collect();
                Self::new(DType::Int64, values)
            }
            DType::Float64 => {
                let mut acc = 0.0;
                let values = self
                    .values
                    .iter()
                    .map(|value| match value {
                        Scalar::Float64(v) if !v.is_nan() => {
                            acc += v;
                            Scalar::Float64(acc)
                        }
                        _ => Scalar::Null(NullKind::NaN),
                    })
                    .collect();
                Self::new(DType::Float64, values)
            }
            other => Err(ColumnError::unsupported("cumsum", other)),
        }
    }

    /// Shift values by `periods` rows, filling vacated slots with missing.
    pub fn shift(&self, periods: i64) -> Result<Self, ColumnError> {
        let len = self.len();
        let magnitude = usize::try_from(periods.unsigned_abs()).unwrap_or(usize::MAX);
        let values = (0..len)
            .map(|idx| {
                let source = if periods >= 0 {
                    idx.checked_sub(magnitude)
                } else {
                    idx.checked_add(magnitude).filter(|pos| *pos < len)
                };
                source.map_or_else(
                    || Scalar::missing_for_dtype(self.dtype),
                    |pos| self.values[pos].clone(),
                )
            })
            .collect();
        Self::new(self.dtype, values)
    }

    pub fn clip(
        &self,
        lower: Option<&Scalar>,
        upper: Option<&Scalar>,
    ) -> Result<Self, ColumnError> {
        if !(self.dtype.is_numeric_like() || self.dtype == DType::Null) {
            return Err(ColumnError::unsupported("clip", self.dtype));
        }
        let mut dtype = self.dtype;
        for bound in [lower, upper].into_iter().flatten() {
            dtype = common_dtype(dtype, bound.dtype())?;
        }
        let values = self
            .values
            .iter()
            .map(|value| {
                if value.is_missing() {
                    return value.clone();
                }
                if let Some(lo) = lower
                    && compare_scalars(value, lo) == Some(Ordering::Less)
                {
                    return lo.clone();
                }
                if let Some(hi) = upper
                    && compare_scalars(value, hi) == Some(Ordering::Greater)
                {
                    return hi.clone();
                }
                value.clone()
            })
            .collect();
        Self::new(dtype, values)
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| left.semantic_eq(right))
    }
}

/// Stack columns end to end under their common dtype.
pub fn concat_columns(columns: &[&Column]) -> Result<Column, ColumnError> {
    let mut dtype = DType::Null;
    for column in columns {
        dtype = common_dtype(dtype, column.dtype())?;
    }
    let values = columns
        .iter()
        .flat_map(|column| column.values().iter().cloned())
        .collect();
    Column::new(dtype, values)
}

/// Stable row permutation ordering by each key in turn. Missing values sort last
/// regardless of direction.
#[must_use]
pub fn sort_order(keys: &[SortKey<'_>], len: usize) -> Vec<usize> {
    let mut order = (0..len).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        for key in keys {
            let (Some(left), Some(right)) = (key.column.value(a), key.column.value(b)) else {
                continue;
            };
            let ordering = match (left.is_missing(), right.is_missing()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ordering = compare_scalars(left, right).unwrap_or(Ordering::Equal);
                    if key.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    order
}

fn numeric_out_dtype(left: DType, right: &Column, op: ArithmeticOp) -> Result<DType, ColumnError> {
    let mut out = common_dtype(left, right.dtype())?;
    if matches!(out, DType::Bool) {
        out = DType::Int64;
    }
    if out != DType::Int64 {
        return Ok(match op {
            ArithmeticOp::Div if out != DType::Null => DType::Float64,
            _ => out,
        });
    }

    let divisors = || right.values().iter().filter_map(Scalar::as_i64);
    let out = match op {
        ArithmeticOp::Div => DType::Float64,
        ArithmeticOp::FloorDiv | ArithmeticOp::Mod if divisors().any(|v| v == 0) => {
            DType::Float64
        }
        ArithmeticOp::Pow if divisors().any(|v| u32::try_from(v).is_err()) => DType::Float64,
        _ => DType::Int64,
    };
    Ok(out)
}

fn arith_scalar(
    left: &Scalar,
    right: &Scalar,
    op: ArithmeticOp,
    out_dtype: DType,
) -> Result<Scalar, ColumnError> {
    if left.is_missing() || right.is_missing() {
        return Ok(if left.is_nan() || right.is_nan() {
            Scalar::Null(NullKind::NaN)
        } else {
            Scalar::missing_for_dtype(out_dtype)
        });
    }

    if out_dtype == DType::Int64
        && let (Some(lhs), Some(rhs)) = (left.as_i64(), right.as_i64())
    {
        let value = match op {
            ArithmeticOp::Add => lhs.wrapping_add(rhs),
            ArithmeticOp::Sub => lhs.wrapping_sub(rhs),
            ArithmeticOp::Mul => lhs.wrapping_mul(rhs),
            ArithmeticOp::FloorDiv => floor_div_i64(lhs, rhs),
            ArithmeticOp::Mod => floor_mod_i64(lhs, rhs),
            ArithmeticOp::Pow => {
                let exp = u32::try_from(rhs).map_err(|_| {
                    ColumnError::InvalidArgument(format!("integer exponent {rhs} out of range"))
                })?;
                lhs.wrapping_pow(exp)
            }
            ArithmeticOp::Div => {
                return Err(ColumnError::unsupported(op.symbol(), DType::Int64));
            }
        };
        return Ok(Scalar::Int64(value));
    }

    let lhs = left.to_f64()?;
    let rhs = right.to_f64()?;
    let value = match op {
        ArithmeticOp::Add => lhs + rhs,
        ArithmeticOp::Sub => lhs - rhs,
        ArithmeticOp::Mul => lhs * rhs,
        ArithmeticOp::Div => lhs / rhs,
        ArithmeticOp::FloorDiv => (lhs / rhs).floor(),
        ArithmeticOp::Mod => {
            if rhs == 0.0 {
                f64::NAN
            } else {
                lhs - rhs * (lhs / rhs).floor()
            }
        }
        ArithmeticOp::Pow => lhs.powf(rhs),
    };
    Ok(Scalar::Float64(value))
}

fn floor_div_i64(lhs: i64, rhs: i64) -> i64 {
    let quotient = lhs.wrapping_div(rhs);
    if lhs.wrapping_rem(rhs) != 0 && ((lhs < 0) != (rhs < 0)) {
        quotient - 1
    } else {
        quotient
    }
}

fn floor_mod_i64(lhs: i64, rhs: i64) -> i64 {
    let rem = lhs.wrapping_rem(rhs);
    if rem != 0 && ((rem < 0) != (rhs < 0)) {
        rem + rhs
    } else {
        rem
    }
}

fn round_half_even(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round_ties_even() / factor;
    if rounded.is_finite() { rounded } else { value }
}

fn convert_lenient(value: &Scalar, target: DType) -> Result<Scalar, ColumnError> {
    if value.is_missing() {
        return Ok(Scalar::missing_for_dtype(target));
    }
    let out = match (value, target) {
        (_, DType::Utf8 | DType::Categorical) => Scalar::Utf8(value.to_string()),
        (Scalar::Utf8(text), DType::Int64) => {
            let trimmed = text.trim();
            match trimmed.parse::<i64>() {
                Ok(v) => Scalar::Int64(v),
                Err(_) => match trimmed.parse::<f64>() {
                    Ok(v) if v.is_finite() => Scalar::Int64(v.trunc() as i64),
                    _ => Scalar::Null(NullKind::Null),
                },
            }
        }
        (Scalar::Utf8(text), DType::Float64) => text
            .trim()
            .parse::<f64>()
            .map_or(Scalar::Null(NullKind::NaN), Scalar::Float64),
        (Scalar::Utf8(text), DType::Bool) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Scalar::Bool(true),
            "false" | "0" | "no" => Scalar::Bool(false),
            _ => Scalar::Null(NullKind::Null),
        },
        (Scalar::Utf8(text), DType::Datetime64) => {
            parse_datetime(text).map_or(Scalar::Null(NullKind::NaT), Scalar::Datetime64)
        }
        (Scalar::Float64(v), DType::Int64) if v.is_finite() => Scalar::Int64(v.trunc() as i64),
        (Scalar::Float64(v), DType::Datetime64) if v.is_finite() => {
            Scalar::Datetime64(v.trunc() as i64)
        }
        _ => cast_scalar(value, target)?,
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use tp_types::{DType, NullKind, Scalar};

    use super::{ArithmeticOp, Column, ColumnError, ComparisonOp, LogicalOp, SortKey, sort_order};

    fn ints(values: &[i64]) -> Column {
        Column::from_values(values.iter().copied().map(Scalar::Int64).collect()).expect("ints")
    }

    #[test]
    fn reindex_injects_missing_values() {
        let column = ints(&[10, 20]);

        let out = column
            .reindex_by_positions(&[Some(1), None, Some(0)])
            .expect("reindex should work");

        assert_eq!(
            out.values(),
            &[
                Scalar::Int64(20),
                Scalar::Null(NullKind::Null),
                Scalar::Int64(10)
            ]
        );
    }

    #[test]
    fn numeric_addition_propagates_missing() {
        let left = Column::from_values(vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Float64(f64::NAN),
        ])
        .expect("left");
        let right = ints(&[2, 5, 3]);

        let out = left
            .binary_numeric(&right, ArithmeticOp::Add)
            .expect("add should pass");

        assert_eq!(out.values()[0], Scalar::Float64(3.0));
        assert_eq!(out.values()[1], Scalar::Null(NullKind::NaN));
        assert_eq!(out.values()[2], Scalar::Null(NullKind::NaN));
    }

    #[test]
    fn true_and_floor_division_stay_distinct() {
        let left = ints(&[7, -7]);
        let right = ints(&[2, 2]);

        let div = left.binary_numeric(&right, ArithmeticOp::Div).expect("div");
        assert_eq!(div.values(), &[Scalar::Float64(3.5), Scalar::Float64(-3.5)]);

        let floor = left
            .binary_numeric(&right, ArithmeticOp::FloorDiv)
            .expect("floordiv");
        assert_eq!(floor.dtype(), DType::Int64);
        assert_eq!(floor.values(), &[Scalar::Int64(3), Scalar::Int64(-4)]);

        let modulo = left.binary_numeric(&right, ArithmeticOp::Mod).expect("mod");
        assert_eq!(modulo.values(), &[Scalar::Int64(1), Scalar::Int64(1)]);
    }

    #[test]
    fn integer_floor_division_by_zero_widens_to_float() {
        let out = ints(&[1, 4])
            .binary_numeric(&ints(&[0, 2]), ArithmeticOp::FloorDiv)
            .expect("floordiv");
        assert_eq!(out.dtype(), DType::Float64);
        assert_eq!(out.values()[0], Scalar::Float64(f64::INFINITY));
        assert_eq!(out.values()[1], Scalar::Float64(2.0));
    }

    #[test]
    fn power_keeps_integers_for_non_negative_exponents() {
        let out = ints(&[2, 3])
            .binary_numeric(&ints(&[3, 2]), ArithmeticOp::Pow)
            .expect("pow");
        assert_eq!(out.values(), &[Scalar::Int64(8), Scalar::Int64(9)]);

        let out = ints(&[2])
            .binary_numeric(&ints(&[-1]), ArithmeticOp::Pow)
            .expect("pow");
        assert_eq!(out.values(), &[Scalar::Float64(0.5)]);
    }

    #[test]
    fn text_addition_concatenates() {
        let left = Column::from_values(vec!["a".into(), Scalar::Null(NullKind::Null)]).expect("l");
        let right = Column::from_values(vec!["b".into(), "c".into()]).expect("r");
        let out = left.binary_numeric(&right, ArithmeticOp::Add).expect("concat");
        assert_eq!(out.values(), &[Scalar::Utf8("ab".into()), Scalar::Null(NullKind::Null)]);
    }

    #[test]
    fn text_subtraction_is_unsupported() {
        let left = Column::from_values(vec!["a".into()]).expect("l");
        let err = left
            .binary_numeric(&ints(&[1]), ArithmeticOp::Sub)
            .expect_err("must fail");
        assert_eq!(
            err,
            ColumnError::UnsupportedOperation {
                op: "-".into(),
                dtype: DType::Utf8
            }
        );
    }

    #[test]
    fn comparison_with_missing_is_false_for_every_operator() {
        let column =
            Column::from_values(vec![Scalar::Float64(10.0), Scalar::Null(NullKind::Null)])
                .expect("column");
        for op in [
            ComparisonOp::Eq,
            ComparisonOp::Ne,
            ComparisonOp::Lt,
            ComparisonOp::Le,
            ComparisonOp::Gt,
            ComparisonOp::Ge,
        ] {
            let out = column
                .compare_scalar(&Scalar::Float64(5.0), op)
                .expect("compare");
            assert_eq!(out.values()[1], Scalar::Bool(false), "operator {op}");
        }
    }

    #[test]
    fn ordering_text_against_numbers_is_rejected_but_equality_is_not() {
        let column = Column::from_values(vec!["a".into()]).expect("column");
        assert!(column.compare_scalar(&Scalar::Int64(1), ComparisonOp::Gt).is_err());
        let eq = column
            .compare_scalar(&Scalar::Int64(1), ComparisonOp::Eq)
            .expect("eq");
        assert_eq!(eq.values(), &[Scalar::Bool(false)]);
    }

    #[test]
    fn kleene_logic_keeps_unknowns() {
        let left = Column::new(
            DType::Bool,
            vec![Scalar::Bool(true), Scalar::Null(NullKind::Null), Scalar::Bool(false)],
        )
        .expect("left");
        let right = Column::new(
            DType::Bool,
            vec![Scalar::Null(NullKind::Null), Scalar::Bool(false), Scalar::Null(NullKind::Null)],
        )
        .expect("right");
        let and = left.logical(&right, LogicalOp::And).expect("and");
        assert_eq!(
            and.values(),
            &[Scalar::Null(NullKind::Null), Scalar::Bool(false), Scalar::Bool(false)]
        );
        assert_eq!(and.to_mask().expect("mask"), vec![false, false, false]);
    }

    #[test]
    fn astype_coerces_unparsable_text_to_missing() {
        let column = Column::from_values(vec!["12".into(), "x".into(), "3.9".into()]).expect("c");
        let out = column.astype(DType::Int64).expect("astype");
        assert_eq!(
            out.values(),
            &[Scalar::Int64(12), Scalar::Null(NullKind::Null), Scalar::Int64(3)]
        );
    }

    #[test]
    fn round_uses_half_even() {
        let column =
            Column::from_values(vec![Scalar::Float64(2.5), Scalar::Float64(1.235)]).expect("c");
        let out = column.round(0).expect("round");
        assert_eq!(out.values()[0], Scalar::Float64(2.0));
    }

    #[test]
    fn shift_moves_rows_and_fills_missing() {
        let out = ints(&[1, 2, 3]).shift(1).expect("shift");
        assert_eq!(
            out.values(),
            &[Scalar::Null(NullKind::Null), Scalar::Int64(1), Scalar::Int64(2)]
        );
        let out = ints(&[1, 2, 3]).shift(-2).expect("shift");
        assert_eq!(
            out.values(),
            &[Scalar::Int64(3), Scalar::Null(NullKind::Null), Scalar::Null(NullKind::Null)]
        );
    }

    #[test]
    fn sort_order_is_stable_with_missing_last() {
        let column = Column::from_values(vec![
            Scalar::Int64(2),
            Scalar::Null(NullKind::Null),
            Scalar::Int64(1),
            Scalar::Int64(2),
        ])
        .expect("c");
        let asc = sort_order(
            &[SortKey {
                column: &column,
                descending: false,
            }],
            column.len(),
        );
        assert_eq!(asc, vec![2, 0, 3, 1]);
        let desc = sort_order(
            &[SortKey {
                column: &column,
                descending: true,
            }],
            column.len(),
        );
        assert_eq!(desc, vec![0, 3, 2, 1]);
    }

    #[test]
    fn json_round_trip_keeps_missing_values() {
        let column = Column::from_values(vec![
            Scalar::Float64(1.5),
            Scalar::Null(NullKind::NaN),
            Scalar::Float64(-2.0),
        ])
        .expect("floats");
        let json = serde_json::to_string(&column).expect("serialize");
        assert!(!json.contains("validity"));
        let back: Column = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, column);
        assert_eq!(back.validity().bits(), &[true, false, true]);
    }

    #[test]
    fn loading_coerces_values_to_the_stored_dtype() {
        let stored = serde_json::json!({
            "dtype": "float64",
            "values": [
                {"kind": "int64", "value": 1},
                {"kind": "null", "value": "null"},
            ],
        });
        let column: Column = serde_json::from_value(stored).expect("deserialize");
        assert_eq!(column.dtype(), DType::Float64);
        assert_eq!(
            column.values(),
            &[Scalar::Float64(1.0), Scalar::Null(NullKind::NaN)]
        );
        assert_eq!(column.validity().count_valid(), 1);
    }
}
