use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tp_types::{DType, HashKey, Scalar, compare_scalars};

use crate::{Column, ColumnError};

/// Column-to-scalar reductions. Missing values are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    Std,
    Var,
    First,
    Last,
    Median,
    Nunique,
}

impl Reducer {
    pub const ALL: [Self; 11] = [
        Self::Count,
        Self::Sum,
        Self::Mean,
        Self::Min,
        Self::Max,
        Self::Std,
        Self::Var,
        Self::First,
        Self::Last,
        Self::Median,
        Self::Nunique,
    ];

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|reducer| reducer.name() == name)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
            Self::Var => "var",
            Self::First => "first",
            Self::Last => "last",
            Self::Median => "median",
            Self::Nunique => "nunique",
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Column {
    pub fn reduce(&self, reducer: Reducer) -> Result<Scalar, ColumnError> {
        let present = self.values().iter().filter(|value| !value.is_missing());
        match reducer {
            Reducer::Count => Ok(Scalar::Int64(self.validity().count_valid() as i64)),
            Reducer::Nunique => {
                let distinct = present.map(HashKey::from_scalar).collect::<HashSet<_>>();
                Ok(Scalar::Int64(distinct.len() as i64))
            }
            Reducer::First => Ok(present
                .cloned()
                .next()
                .unwrap_or_else(|| Scalar::missing_for_dtype(self.dtype()))),
            Reducer::Last => Ok(present
                .cloned()
                .last()
                .unwrap_or_else(|| Scalar::missing_for_dtype(self.dtype()))),
            Reducer::Min | Reducer::Max => self.extremum(reducer),
            Reducer::Sum => self.sum(),
            Reducer::Mean | Reducer::Median | Reducer::Std | Reducer::Var => {
                let values = self.numeric_values(reducer)?;
                Ok(Scalar::Float64(match reducer {
                    Reducer::Mean => mean(&values),
                    Reducer::Median => median(values),
                    Reducer::Var => variance(&values),
                    _ => variance(&values).sqrt(),
                }))
            }
        }
    }

    fn numeric_values(&self, reducer: Reducer) -> Result<Vec<f64>, ColumnError> {
        if !(self.dtype().is_numeric_like() || self.dtype() == DType::Null) {
            return Err(ColumnError::unsupported(reducer.name(), self.dtype()));
        }
        self.values()
            .iter()
            .filter(|value| !value.is_missing())
            .map(|value| value.to_f64().map_err(ColumnError::from))
            .collect()
    }

    fn sum(&self) -> Result<Scalar, ColumnError> {
        match self.dtype() {
            DType::Null | DType::Bool | DType::Int64 => {
                let total = self
                    .values()
                    .iter()
                    .filter_map(|value| (!value.is_missing()).then(|| value.as_i64()).flatten())
                    .fold(0_i64, i64::wrapping_add);
                Ok(Scalar::Int64(total))
            }
            DType::Float64 => {
                let total: f64 = self.numeric_values(Reducer::Sum)?.iter().sum();
                Ok(Scalar::Float64(total))
            }
            DType::Utf8 => Ok(Scalar::Utf8(
                self.values().iter().filter_map(Scalar::as_str).collect(),
            )),
            other => Err(ColumnError::unsupported("sum", other)),
        }
    }

    fn extremum(&self, reducer: Reducer) -> Result<Scalar, ColumnError> {
        let wanted = if reducer == Reducer::Min {
            Ordering::Less
        } else {
            Ordering::Greater
        };
        let mut best: Option<&Scalar> = None;
        for value in self.values().iter().filter(|value| !value.is_missing()) {
            best = match best {
                None => Some(value),
                Some(current) => match compare_scalars(value, current) {
                    Some(ordering) if ordering == wanted => Some(value),
                    Some(_) => Some(current),
                    None => return Err(ColumnError::unsupported(reducer.name(), self.dtype())),
                },
            };
        }
        Ok(best
            .cloned()
            .unwrap_or_else(|| Scalar::missing_for_dtype(self.dtype())))
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Sample variance (ddof = 1).
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let center = mean(values);
    let squares: f64 = values.iter().map(|v| (v - center).powi(2)).sum();
    squares / (values.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use tp_types::{NullKind, Scalar};

    use crate::Column;

    use super::Reducer;

    fn scores() -> Column {
        Column::from_values(vec![
            Scalar::Float64(10.0),
            Scalar::Null(NullKind::Null),
            Scalar::Float64(4.0),
            Scalar::Float64(7.0),
        ])
        .expect("column")
    }

    #[test]
    fn reducers_skip_missing_values() {
        let column = scores();
        assert_eq!(column.reduce(Reducer::Count).expect("count"), Scalar::Int64(3));
        assert_eq!(column.reduce(Reducer::Sum).expect("sum"), Scalar::Float64(21.0));
        assert_eq!(column.reduce(Reducer::Mean).expect("mean"), Scalar::Float64(7.0));
        assert_eq!(column.reduce(Reducer::Min).expect("min"), Scalar::Float64(4.0));
        assert_eq!(column.reduce(Reducer::Max).expect("max"), Scalar::Float64(10.0));
        assert_eq!(column.reduce(Reducer::Median).expect("median"), Scalar::Float64(7.0));
        assert_eq!(column.reduce(Reducer::Var).expect("var"), Scalar::Float64(9.0));
        assert_eq!(column.reduce(Reducer::Std).expect("std"), Scalar::Float64(3.0));
        assert_eq!(column.reduce(Reducer::First).expect("first"), Scalar::Float64(10.0));
        assert_eq!(column.reduce(Reducer::Last).expect("last"), Scalar::Float64(7.0));
    }

    #[test]
    fn integer_sum_stays_integral() {
        let column = Column::from_values(vec![Scalar::Int64(2), Scalar::Int64(3)]).expect("c");
        assert_eq!(column.reduce(Reducer::Sum).expect("sum"), Scalar::Int64(5));
    }

    #[test]
    fn text_min_and_nunique() {
        let column = Column::from_values(vec!["pear".into(), "apple".into(), "pear".into()])
            .expect("column");
        assert_eq!(
            column.reduce(Reducer::Min).expect("min"),
            Scalar::Utf8("apple".into())
        );
        assert_eq!(column.reduce(Reducer::Nunique).expect("nunique"), Scalar::Int64(2));
        assert!(column.reduce(Reducer::Mean).is_err());
    }

    #[test]
    fn empty_mean_is_nan() {
        let column = Column::from_values(vec![Scalar::Null(NullKind::Null)]).expect("column");
        let out = column.reduce(Reducer::Mean).expect("mean");
        assert!(out.is_nan());
    }

    #[test]
    fn reducer_names_round_trip() {
        for reducer in Reducer::ALL {
            assert_eq!(Reducer::parse(reducer.name()), Some(reducer));
        }
        assert_eq!(Reducer::parse("mode"), None);
    }
}
