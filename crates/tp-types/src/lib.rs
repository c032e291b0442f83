#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    Datetime64,
    Categorical,
}

impl DType {
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int64)
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float64)
    }

    #[must_use]
    pub fn is_string(self) -> bool {
        matches!(self, Self::Utf8)
    }

    #[must_use]
    pub fn is_boolean(self) -> bool {
        matches!(self, Self::Bool)
    }

    #[must_use]
    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Datetime64)
    }

    #[must_use]
    pub fn is_categorical(self) -> bool {
        matches!(self, Self::Categorical)
    }

    /// Bool participates in arithmetic and ordering as 0/1.
    #[must_use]
    pub fn is_numeric_like(self) -> bool {
        matches!(self, Self::Bool | Self::Int64 | Self::Float64)
    }

    /// Dtypes whose values are stored as `Scalar::Utf8`.
    #[must_use]
    pub fn is_text_like(self) -> bool {
        matches!(self, Self::Utf8 | Self::Categorical)
    }

    /// Parse the dtype names accepted by `astype`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let out = match name.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Self::Bool,
            "int" | "int64" | "int32" | "integer" => Self::Int64,
            "float" | "float64" | "float32" | "double" => Self::Float64,
            "str" | "string" | "utf8" | "object" => Self::Utf8,
            "datetime" | "datetime64" | "datetime64[ns]" | "date" => Self::Datetime64,
            "category" | "categorical" => Self::Categorical,
            "null" => Self::Null,
            _ => return None,
        };
        Some(out)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Utf8 => "str",
            Self::Datetime64 => "datetime64",
            Self::Categorical => "category",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
    NaT,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    /// Nanoseconds since the Unix epoch, naive (no timezone).
    Datetime64(i64),
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null(_) => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
            Self::Datetime64(_) => DType::Datetime64,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Null(NullKind::NaN)) || matches!(self, Self::Float64(v) if v.is_nan())
    }

    #[must_use]
    pub fn missing_for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::Float64 => Self::Null(NullKind::NaN),
            DType::Datetime64 => Self::Null(NullKind::NaT),
            DType::Null | DType::Bool | DType::Int64 | DType::Utf8 | DType::Categorical => {
                Self::Null(NullKind::Null)
            }
        }
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            (Self::Null(NullKind::NaN), Self::Float64(v))
            | (Self::Float64(v), Self::Null(NullKind::NaN)) => v.is_nan(),
            _ => self == other,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null(kind) => Err(TypeError::ValueIsMissing { kind: *kind }),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                dtype: DType::Utf8,
            }),
            Self::Datetime64(v) => Err(TypeError::NonNumericValue {
                value: v.to_string(),
                dtype: DType::Datetime64,
            }),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(v) => Some(v.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            Self::Bool(v) => Some(i64::from(*v)),
            Self::Float64(v) if v.is_finite() && *v == v.trunc() => Some(*v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(NullKind::Null) => f.write_str("None"),
            Self::Null(NullKind::NaN) => f.write_str("nan"),
            Self::Null(NullKind::NaT) => f.write_str("NaT"),
            Self::Bool(v) => f.write_str(if *v { "True" } else { "False" }),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => f.write_str(&format_float(*v)),
            Self::Utf8(v) => f.write_str(v),
            Self::Datetime64(v) => match datetime_from_nanos(*v) {
                Some(dt) => write!(f, "{dt}"),
                None => f.write_str("NaT"),
            },
        }
    }
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_owned()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "inf" } else { "-inf" };
        text.to_owned()
    } else if value == value.trunc() && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int64(i64::from(value))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null(NullKind::Null), Into::into)
    }
}

#[must_use]
pub fn datetime_from_nanos(nanos: i64) -> Option<NaiveDateTime> {
    let secs = nanos.div_euclid(1_000_000_000);
    let sub = nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, sub).map(|dt| dt.naive_utc())
}

#[must_use]
pub fn nanos_from_datetime(value: NaiveDateTime) -> Option<i64> {
    value.and_utc().timestamp_nanos_opt()
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("dtype coercion from {left:?} to {right:?} has no compatible common type")]
    IncompatibleDtypes { left: DType, right: DType },
    #[error("cannot cast scalar of dtype {from:?} to {to:?}")]
    InvalidCast { from: DType, to: DType },
    #[error("cannot cast float {value} to int64 without loss")]
    LossyFloatToInt { value: f64 },
    #[error("expected 0/1 for bool cast from int64 but found {value}")]
    InvalidBoolInt { value: i64 },
    #[error("expected 0.0/1.0 for bool cast from float64 but found {value}")]
    InvalidBoolFloat { value: f64 },
    #[error("value {value:?} has non-numeric dtype {dtype:?}")]
    NonNumericValue { value: String, dtype: DType },
    #[error("value is missing ({kind:?})")]
    ValueIsMissing { kind: NullKind },
}

pub fn common_dtype(left: DType, right: DType) -> Result<DType, TypeError> {
    use DType::{Bool, Categorical, Float64, Int64, Null, Utf8};

    let out = match (left, right) {
        (a, b) if a == b => a,
        (Null, other) | (other, Null) => other,
        (Bool, Int64) | (Int64, Bool) => Int64,
        (Bool, Float64) | (Float64, Bool) => Float64,
        (Int64, Float64) | (Float64, Int64) => Float64,
        (Categorical, Utf8) | (Utf8, Categorical) => Utf8,
        _ => return Err(TypeError::IncompatibleDtypes { left, right }),
    };

    Ok(out)
}

pub fn infer_dtype(values: &[Scalar]) -> Result<DType, TypeError> {
    let mut current = DType::Null;
    for value in values {
        current = common_dtype(current, value.dtype())?;
    }
    Ok(current)
}

/// Whether values of the two dtypes can be ordered against each other.
#[must_use]
pub fn dtypes_comparable(left: DType, right: DType) -> bool {
    left == DType::Null
        || right == DType::Null
        || left == right
        || (left.is_numeric_like() && right.is_numeric_like())
        || (left.is_text_like() && right.is_text_like())
}

/// Order two scalars. `None` when either side is missing or the pair is not comparable.
#[must_use]
pub fn compare_scalars(left: &Scalar, right: &Scalar) -> Option<Ordering> {
    if left.is_missing() || right.is_missing() {
        return None;
    }
    match (left, right) {
        (Scalar::Int64(a), Scalar::Int64(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Scalar::Utf8(a), Scalar::Utf8(b)) => Some(a.cmp(b)),
        (Scalar::Datetime64(a), Scalar::Datetime64(b)) => Some(a.cmp(b)),
        (a, b) if a.dtype().is_numeric_like() && b.dtype().is_numeric_like() => {
            let lhs = a.to_f64().ok()?;
            let rhs = b.to_f64().ok()?;
            lhs.partial_cmp(&rhs)
        }
        _ => None,
    }
}

/// Borrowed, hashable view of a scalar used for grouping and join keys.
///
/// All missing markers collapse to `Missing`; integral floats hash like the
/// equivalent `Int64` so `1` and `1.0` land in the same bucket.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum HashKey<'a> {
    Missing,
    Bool(bool),
    Int64(i64),
    FloatBits(u64),
    Utf8(&'a str),
    Datetime64(i64),
}

impl<'a> HashKey<'a> {
    #[must_use]
    pub fn from_scalar(value: &'a Scalar) -> Self {
        match value {
            _ if value.is_missing() => Self::Missing,
            Scalar::Null(_) => Self::Missing,
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::Int64(v) => Self::Int64(*v),
            Scalar::Float64(v) => {
                if *v == v.trunc() && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 {
                    Self::Int64(*v as i64)
                } else {
                    Self::FloatBits(v.to_bits())
                }
            }
            Scalar::Utf8(v) => Self::Utf8(v.as_str()),
            Scalar::Datetime64(v) => Self::Datetime64(*v),
        }
    }
}

pub fn cast_scalar(value: &Scalar, target: DType) -> Result<Scalar, TypeError> {
    cast_scalar_owned(value.clone(), target)
}

/// Owned variant of [`cast_scalar`]; values already of the target dtype move through untouched.
pub fn cast_scalar_owned(value: Scalar, target: DType) -> Result<Scalar, TypeError> {
    let from = value.dtype();
    if matches!(value, Scalar::Null(_)) {
        return Ok(Scalar::missing_for_dtype(target));
    }
    if from == target {
        return Ok(value);
    }

    match target {
        DType::Null => Ok(Scalar::Null(NullKind::Null)),
        DType::Bool => match value {
            Scalar::Int64(v) => match v {
                0 => Ok(Scalar::Bool(false)),
                1 => Ok(Scalar::Bool(true)),
                _ => Err(TypeError::InvalidBoolInt { value: v }),
            },
            Scalar::Float64(v) => {
                if v == 0.0 {
                    Ok(Scalar::Bool(false))
                } else if v == 1.0 {
                    Ok(Scalar::Bool(true))
                } else {
                    Err(TypeError::InvalidBoolFloat { value: v })
                }
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Int64 => match value {
            Scalar::Bool(v) => Ok(Scalar::Int64(i64::from(v))),
            Scalar::Datetime64(v) => Ok(Scalar::Int64(v)),
            Scalar::Float64(v) => {
                if v.is_nan() {
                    return Ok(Scalar::Null(NullKind::Null));
                }
                if !v.is_finite() || v != v.trunc() {
                    return Err(TypeError::LossyFloatToInt { value: v });
                }
                if v < i64::MIN as f64 || v > i64::MAX as f64 {
                    return Err(TypeError::LossyFloatToInt { value: v });
                }
                Ok(Scalar::Int64(v as i64))
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Float64 => match value {
            Scalar::Bool(v) => Ok(Scalar::Float64(if v { 1.0 } else { 0.0 })),
            Scalar::Int64(v) => Ok(Scalar::Float64(v as f64)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Datetime64 => match value {
            Scalar::Int64(v) => Ok(Scalar::Datetime64(v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Utf8 | DType::Categorical => match value {
            Scalar::Utf8(v) => Ok(Scalar::Utf8(v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{
        DType, HashKey, NullKind, Scalar, cast_scalar, common_dtype, compare_scalars,
        datetime_from_nanos, infer_dtype,
    };

    #[test]
    fn dtype_inference_coerces_numeric_values() {
        let values = vec![Scalar::Bool(true), Scalar::Int64(7), Scalar::Float64(3.5)];
        assert_eq!(
            infer_dtype(&values).expect("dtype should infer"),
            DType::Float64
        );
    }

    #[test]
    fn missing_values_get_target_missing_marker() {
        let missing = Scalar::Null(NullKind::Null);
        let cast = cast_scalar(&missing, DType::Float64).expect("missing casts");
        assert_eq!(cast, Scalar::Null(NullKind::NaN));
        let cast = cast_scalar(&missing, DType::Datetime64).expect("missing casts");
        assert_eq!(cast, Scalar::Null(NullKind::NaT));
    }

    #[test]
    fn semantic_eq_treats_nan_as_equal() {
        let left = Scalar::Float64(f64::NAN);
        let right = Scalar::Null(NullKind::NaN);
        assert!(left.semantic_eq(&right));
    }

    #[test]
    fn common_dtype_rejects_string_numeric_mix() {
        let err = common_dtype(DType::Utf8, DType::Int64).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "dtype coercion from Utf8 to Int64 has no compatible common type"
        );
    }

    #[test]
    fn categorical_and_text_widen_to_text() {
        assert_eq!(
            common_dtype(DType::Categorical, DType::Utf8).expect("widen"),
            DType::Utf8
        );
    }

    #[test]
    fn compare_scalars_crosses_int_and_float() {
        assert_eq!(
            compare_scalars(&Scalar::Int64(2), &Scalar::Float64(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_scalars(&Scalar::Float64(f64::NAN), &Scalar::Float64(1.0)),
            None
        );
        assert_eq!(
            compare_scalars(&Scalar::Utf8("a".into()), &Scalar::Int64(1)),
            None
        );
    }

    #[test]
    fn hash_key_merges_integral_float_with_int() {
        let int = Scalar::Int64(3);
        let float = Scalar::Float64(3.0);
        let nan = Scalar::Float64(f64::NAN);
        let null = Scalar::Null(NullKind::Null);
        assert_eq!(HashKey::from_scalar(&int), HashKey::from_scalar(&float));
        assert_eq!(HashKey::from_scalar(&nan), HashKey::from_scalar(&null));
    }

    #[test]
    fn display_renders_floats_with_a_decimal_point() {
        assert_eq!(Scalar::Float64(10.0).to_string(), "10.0");
        assert_eq!(Scalar::Float64(2.5).to_string(), "2.5");
        assert_eq!(Scalar::Bool(true).to_string(), "True");
        assert_eq!(Scalar::Null(NullKind::NaN).to_string(), "nan");
        let dt = datetime_from_nanos(86_400_000_000_000).expect("in range");
        assert_eq!(Scalar::Datetime64(86_400_000_000_000).to_string(), dt.to_string());
        assert_eq!(dt.to_string(), "1970-01-02 00:00:00");
    }

    #[test]
    fn dtype_names_parse_for_astype() {
        assert_eq!(DType::parse("Int64"), Some(DType::Int64));
        assert_eq!(DType::parse("category"), Some(DType::Categorical));
        assert_eq!(DType::parse("datetime64[ns]"), Some(DType::Datetime64));
        assert_eq!(DType::parse("complex"), None);
    }

    #[test]
    fn scalar_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Scalar::Int64(4)).expect("serialize");
        assert_eq!(json, r#"{"kind":"int64","value":4}"#);
    }
}
