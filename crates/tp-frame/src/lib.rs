#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_columnar::{Column, ColumnError, SortKey, sort_order};
use tp_types::{DType, HashKey, Scalar, common_dtype};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("column length ({actual}) does not match frame length ({expected})")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("column `{0}` appears more than once")]
    DuplicateColumn(String),
    #[error("column `{0}` not found")]
    ColumnNotFound(String),
    #[error("frame method `{0}` is not supported")]
    UnsupportedMethod(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Which rows `dropna` removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropHow {
    /// Drop a row when any inspected column is missing.
    #[default]
    Any,
    /// Drop a row only when every inspected column is missing.
    All,
}

impl DropHow {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "any" => Some(Self::Any),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// A table of equally long, uniquely named columns kept in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FrameRepr", into = "FrameRepr")]
pub struct DataFrame {
    names: Vec<String>,
    columns: Vec<Column>,
    nrows: usize,
}

/// Stored form of a [`DataFrame`]. Loading re-runs the checks of [`DataFrame::new`].
#[derive(Serialize, Deserialize)]
struct FrameRepr {
    columns: Vec<(String, Column)>,
    nrows: usize,
}

impl TryFrom<FrameRepr> for DataFrame {
    type Error = FrameError;

    fn try_from(repr: FrameRepr) -> Result<Self, Self::Error> {
        let mut frame = Self::new(repr.columns)?;
        // A frame without columns still remembers its row count.
        if frame.columns.is_empty() {
            frame.nrows = repr.nrows;
        } else if frame.nrows != repr.nrows {
            return Err(FrameError::LengthMismatch {
                expected: repr.nrows,
                actual: frame.nrows,
            });
        }
        Ok(frame)
    }
}

impl From<DataFrame> for FrameRepr {
    fn from(frame: DataFrame) -> Self {
        Self {
            columns: frame.names.into_iter().zip(frame.columns).collect(),
            nrows: frame.nrows,
        }
    }
}

impl Default for DataFrame {
    fn default() -> Self {
        Self::empty()
    }
}

impl DataFrame {
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self, FrameError> {
        let nrows = columns.first().map_or(0, |(_, column)| column.len());
        let mut seen = HashSet::with_capacity(columns.len());
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (name, column) in columns {
            if column.len() != nrows {
                return Err(FrameError::LengthMismatch {
                    expected: nrows,
                    actual: column.len(),
                });
            }
            if !seen.insert(name.clone()) {
                return Err(FrameError::DuplicateColumn(name));
            }
            names.push(name);
            data.push(column);
        }
        Ok(Self {
            names,
            columns: data,
            nrows,
        })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            nrows: 0,
        }
    }

    /// Build from named value lists, inferring each column's dtype.
    pub fn from_values<N: Into<String>>(
        columns: Vec<(N, Vec<Scalar>)>,
    ) -> Result<Self, FrameError> {
        let columns = columns
            .into_iter()
            .map(|(name, values)| Ok((name.into(), Column::from_values(values)?)))
            .collect::<Result<Vec<_>, FrameError>>()?;
        Self::new(columns)
    }

    /// Build from rows under an explicit schema.
    pub fn from_rows(schema: &[(&str, DType)], rows: Vec<Vec<Scalar>>) -> Result<Self, FrameError> {
        let mut buffers = vec![Vec::with_capacity(rows.len()); schema.len()];
        for row in rows {
            if row.len() != schema.len() {
                return Err(FrameError::LengthMismatch {
                    expected: schema.len(),
                    actual: row.len(),
                });
            }
            for (buffer, value) in buffers.iter_mut().zip(row) {
                buffer.push(value);
            }
        }
        let columns = schema
            .iter()
            .zip(buffers)
            .map(|((name, dtype), values)| Ok(((*name).to_owned(), Column::new(*dtype, values)?)))
            .collect::<Result<Vec<_>, FrameError>>()?;
        Self::new(columns)
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn column_or_err(&self, name: &str) -> Result<&Column, FrameError> {
        self.column(name)
            .ok_or_else(|| FrameError::ColumnNotFound(name.to_owned()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter())
    }

    #[must_use]
    pub fn into_columns(self) -> Vec<(String, Column)> {
        self.names.into_iter().zip(self.columns).collect()
    }

    /// Values of one row in column order.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<Vec<Scalar>> {
        (idx < self.nrows).then(|| {
            self.columns
                .iter()
                .filter_map(|column| column.value(idx).cloned())
                .collect()
        })
    }

    fn check_len(&self, column: &Column) -> Result<(), FrameError> {
        if self.columns.is_empty() || column.len() == self.nrows {
            Ok(())
        } else {
            Err(FrameError::LengthMismatch {
                expected: self.nrows,
                actual: column.len(),
            })
        }
    }

    /// Replace a column in place, or append it when the name is new.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        column: Column,
    ) -> Result<Self, FrameError> {
        self.check_len(&column)?;
        let name = name.into();
        if self.columns.is_empty() {
            self.nrows = column.len();
        }
        match self.column_index(&name) {
            Some(idx) => self.columns[idx] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(self)
    }

    /// Insert a new column at `position`; existing names are replaced in place instead.
    pub fn insert_column(
        mut self,
        position: usize,
        name: impl Into<String>,
        column: Column,
    ) -> Result<Self, FrameError> {
        let name = name.into();
        if self.contains(&name) {
            return self.with_column(name, column);
        }
        self.check_len(&column)?;
        if self.columns.is_empty() {
            self.nrows = column.len();
        }
        let position = position.min(self.columns.len());
        self.names.insert(position, name);
        self.columns.insert(position, column);
        Ok(self)
    }

    /// Keep the named columns, in the order given.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, FrameError> {
        let columns = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                Ok((name.to_owned(), self.column_or_err(name)?.clone()))
            })
            .collect::<Result<Vec<_>, FrameError>>()?;
        if columns.is_empty() {
            return Ok(Self {
                names: Vec::new(),
                columns: Vec::new(),
                nrows: self.nrows,
            });
        }
        Self::new(columns)
    }

    pub fn drop_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, FrameError> {
        for name in names {
            self.column_or_err(name.as_ref())?;
        }
        let keep = self
            .names
            .iter()
            .filter(|name| !names.iter().any(|drop| drop.as_ref() == name.as_str()))
            .collect::<Vec<_>>();
        self.select(&keep)
    }

    pub fn rename<S: AsRef<str>, T: AsRef<str>>(
        &self,
        mapping: &[(S, T)],
    ) -> Result<Self, FrameError> {
        let mut names = self.names.clone();
        for (old, new) in mapping {
            let idx = self
                .column_index(old.as_ref())
                .ok_or_else(|| FrameError::ColumnNotFound(old.as_ref().to_owned()))?;
            names[idx] = new.as_ref().to_owned();
        }
        Self::new(names.into_iter().zip(self.columns.iter().cloned()).collect())
    }

    pub fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        let columns = self
            .columns
            .iter()
            .map(|column| column.take(positions))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            names: self.names.clone(),
            columns,
            nrows: positions.len(),
        })
    }

    pub fn filter_mask(&self, mask: &[bool]) -> Result<Self, FrameError> {
        if mask.len() != self.nrows {
            return Err(FrameError::LengthMismatch {
                expected: self.nrows,
                actual: mask.len(),
            });
        }
        let positions = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, keep)| keep.then_some(idx))
            .collect::<Vec<_>>();
        self.take_rows(&positions)
    }

    /// First `n` rows; a negative `n` keeps all but the last `|n|`.
    pub fn head(&self, n: i64) -> Result<Self, FrameError> {
        let end = resolve_count(n, self.nrows);
        self.take_rows(&(0..end).collect::<Vec<_>>())
    }

    /// Last `n` rows; a negative `n` keeps all but the first `|n|`.
    pub fn tail(&self, n: i64) -> Result<Self, FrameError> {
        let count = resolve_count(n, self.nrows);
        self.take_rows(&(self.nrows - count..self.nrows).collect::<Vec<_>>())
    }

    fn subset_columns<S: AsRef<str>>(&self, subset: &[S]) -> Result<Vec<&Column>, FrameError> {
        if subset.is_empty() {
            return Ok(self.columns.iter().collect());
        }
        subset
            .iter()
            .map(|name| self.column_or_err(name.as_ref()))
            .collect()
    }

    /// Keep the first occurrence of each distinct row over `subset` (all columns when empty).
    pub fn drop_duplicates<S: AsRef<str>>(&self, subset: &[S]) -> Result<Self, FrameError> {
        let keys = self.subset_columns(subset)?;
        let mut seen = HashSet::new();
        let positions = (0..self.nrows)
            .filter(|&row| {
                let key = keys
                    .iter()
                    .map(|column| HashKey::from_scalar(&column.values()[row]))
                    .collect::<Vec<_>>();
                seen.insert(key)
            })
            .collect::<Vec<_>>();
        self.take_rows(&positions)
    }

    pub fn dropna<S: AsRef<str>>(&self, subset: &[S], how: DropHow) -> Result<Self, FrameError> {
        let inspected = self.subset_columns(subset)?;
        let positions = (0..self.nrows)
            .filter(|&row| {
                let mut missing = inspected.iter().map(|column| column.values()[row].is_missing());
                match how {
                    DropHow::Any => !missing.any(|m| m),
                    DropHow::All => inspected.is_empty() || !missing.all(|m| m),
                }
            })
            .collect::<Vec<_>>();
        self.take_rows(&positions)
    }

    /// Fill missing cells in every column whose dtype can hold `value`.
    /// Columns without gaps keep their dtype.
    pub fn fillna(&self, value: &Scalar) -> Result<Self, FrameError> {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let has_missing = column.validity().count_valid() < column.len();
                if has_missing && common_dtype(column.dtype(), value.dtype()).is_ok() {
                    column.fill_missing(value)
                } else {
                    Ok(column.clone())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            names: self.names.clone(),
            columns,
            nrows: self.nrows,
        })
    }

    /// Stable multi-key sort; missing values go last.
    pub fn sort_by<S: AsRef<str>>(&self, by: &[(S, bool)]) -> Result<Self, FrameError> {
        let keys = by
            .iter()
            .map(|(name, descending)| {
                Ok(SortKey {
                    column: self.column_or_err(name.as_ref())?,
                    descending: *descending,
                })
            })
            .collect::<Result<Vec<_>, FrameError>>()?;
        let order = sort_order(&keys, self.nrows);
        self.take_rows(&order)
    }

    /// Invoke one of the frame methods a deferred method call can name.
    ///
    /// Supported: `head`, `tail`, `copy`, `reset_index`, `drop`, `drop_duplicates`,
    /// `dropna`, `fillna`, `sort_values`.
    pub fn call_method(
        &self,
        name: &str,
        args: &[Scalar],
        kwargs: &BTreeMap<String, Scalar>,
    ) -> Result<Self, FrameError> {
        #[cfg(feature = "tracing")]
        tracing::debug!(method = name, nargs = args.len(), "dispatching frame method");

        match name {
            "head" => self.head(int_arg(args, kwargs, "n", 5)?),
            "tail" => self.tail(int_arg(args, kwargs, "n", 5)?),
            "copy" | "reset_index" => Ok(self.clone()),
            "drop" => self.drop_columns(&name_args(args, kwargs, "columns")?),
            "drop_duplicates" => self.drop_duplicates(&name_args(args, kwargs, "subset")?),
            "dropna" => {
                let how = match kwargs.get("how") {
                    Some(Scalar::Utf8(text)) => DropHow::parse(text).ok_or_else(|| {
                        FrameError::InvalidArgument(format!("invalid how `{text}`"))
                    })?,
                    Some(other) => {
                        return Err(FrameError::InvalidArgument(format!("invalid how `{other}`")));
                    }
                    None => DropHow::Any,
                };
                self.dropna(&name_args(args, kwargs, "subset")?, how)
            }
            "fillna" => {
                let value = args
                    .first()
                    .or_else(|| kwargs.get("value"))
                    .ok_or_else(|| FrameError::InvalidArgument("fillna needs a value".to_owned()))?;
                self.fillna(value)
            }
            "sort_values" => {
                let by = name_args(args, kwargs, "by")?;
                let descending = match kwargs.get("ascending") {
                    Some(Scalar::Bool(ascending)) => !ascending,
                    Some(other) => {
                        return Err(FrameError::InvalidArgument(format!(
                            "ascending must be a bool, got `{other}`"
                        )));
                    }
                    None => false,
                };
                let keys = by.into_iter().map(|name| (name, descending)).collect::<Vec<_>>();
                self.sort_by(&keys)
            }
            other => Err(FrameError::UnsupportedMethod(other.to_owned())),
        }
    }
}

fn resolve_count(n: i64, len: usize) -> usize {
    let magnitude = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
    if n >= 0 {
        magnitude.min(len)
    } else {
        len.saturating_sub(magnitude)
    }
}

fn int_arg(
    args: &[Scalar],
    kwargs: &BTreeMap<String, Scalar>,
    key: &str,
    default: i64,
) -> Result<i64, FrameError> {
    match args.first().or_else(|| kwargs.get(key)) {
        None => Ok(default),
        Some(value) => value.as_i64().ok_or_else(|| {
            FrameError::InvalidArgument(format!("`{key}` must be an integer, got `{value}`"))
        }),
    }
}

fn name_args(
    args: &[Scalar],
    kwargs: &BTreeMap<String, Scalar>,
    key: &str,
) -> Result<Vec<String>, FrameError> {
    args.iter()
        .chain(kwargs.get(key))
        .map(|value| {
            value.as_str().map(str::to_owned).ok_or_else(|| {
                FrameError::InvalidArgument(format!("expected a column name, got `{value}`"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tp_types::{DType, NullKind, Scalar};

    use super::{DataFrame, DropHow, FrameError};

    fn people() -> DataFrame {
        DataFrame::from_rows(
            &[("id", DType::Int64), ("name", DType::Utf8), ("score", DType::Float64)],
            vec![
                vec![1.into(), "a".into(), 10.0.into()],
                vec![2.into(), "b".into(), Scalar::Null(NullKind::Null)],
                vec![3.into(), "a".into(), 7.5.into()],
            ],
        )
        .expect("frame")
    }

    #[test]
    fn from_rows_applies_schema() {
        let df = people();
        assert_eq!(df.nrows(), 3);
        assert_eq!(df.column_names(), &["id", "name", "score"]);
        assert_eq!(df.column("score").expect("score").dtype(), DType::Float64);
        assert_eq!(
            df.column("score").expect("score").values()[1],
            Scalar::Null(NullKind::NaN)
        );
    }

    #[test]
    fn duplicate_and_ragged_columns_are_rejected() {
        let err = DataFrame::from_values(vec![
            ("a", vec![Scalar::Int64(1)]),
            ("a", vec![Scalar::Int64(2)]),
        ])
        .expect_err("duplicate");
        assert_eq!(err, FrameError::DuplicateColumn("a".into()));

        let err = DataFrame::from_values(vec![
            ("a", vec![Scalar::Int64(1)]),
            ("b", vec![Scalar::Int64(2), Scalar::Int64(3)]),
        ])
        .expect_err("ragged");
        assert!(matches!(err, FrameError::LengthMismatch { expected: 1, actual: 2 }));
    }

    #[test]
    fn with_column_replaces_in_place() {
        let df = people();
        let doubled = df
            .column("id")
            .expect("id")
            .take(&[0, 0, 0])
            .expect("take");
        let out = df.with_column("id", doubled).expect("replace");
        assert_eq!(out.column_names(), &["id", "name", "score"]);
        assert_eq!(out.column("id").expect("id").values()[2], Scalar::Int64(1));
    }

    #[test]
    fn select_reports_missing_columns() {
        let err = people().select(&["nope"]).expect_err("missing");
        assert_eq!(err, FrameError::ColumnNotFound("nope".into()));
    }

    #[test]
    fn head_tail_handle_negative_counts() {
        let df = people();
        assert_eq!(df.head(2).expect("head").nrows(), 2);
        assert_eq!(df.head(-1).expect("head").nrows(), 2);
        assert_eq!(df.tail(10).expect("tail").nrows(), 3);
        let tail = df.tail(1).expect("tail");
        assert_eq!(tail.column("id").expect("id").values(), &[Scalar::Int64(3)]);
    }

    #[test]
    fn drop_duplicates_keeps_first() {
        let out = people().drop_duplicates(&["name"]).expect("dedupe");
        assert_eq!(
            out.column("id").expect("id").values(),
            &[Scalar::Int64(1), Scalar::Int64(2)]
        );
    }

    #[test]
    fn dropna_any_and_all() {
        let df = people();
        assert_eq!(df.dropna::<&str>(&[], DropHow::Any).expect("any").nrows(), 2);
        assert_eq!(df.dropna::<&str>(&[], DropHow::All).expect("all").nrows(), 3);
    }

    #[test]
    fn sort_places_missing_last() {
        let out = people().sort_by(&[("score", true)]).expect("sort");
        assert_eq!(
            out.column("id").expect("id").values(),
            &[Scalar::Int64(1), Scalar::Int64(3), Scalar::Int64(2)]
        );
    }

    #[test]
    fn call_method_dispatches_known_names() {
        let df = people();
        let mut kwargs = BTreeMap::new();
        kwargs.insert("ascending".to_owned(), Scalar::Bool(false));
        let out = df
            .call_method("sort_values", &["id".into()], &kwargs)
            .expect("sort_values");
        assert_eq!(out.column("id").expect("id").values()[0], Scalar::Int64(3));

        let out = df
            .call_method("fillna", &[Scalar::Float64(0.0)], &BTreeMap::new())
            .expect("fillna");
        assert_eq!(out.column("score").expect("score").values()[1], Scalar::Float64(0.0));
        assert_eq!(out.column("name").expect("name"), df.column("name").expect("name"));

        let err = df
            .call_method("explode", &[], &BTreeMap::new())
            .expect_err("unknown");
        assert_eq!(err, FrameError::UnsupportedMethod("explode".into()));
    }

    #[test]
    fn json_round_trip_keeps_dtypes_and_order() {
        let df = people()
            .with_column(
                "seen",
                tp_columnar::Column::from_values(vec![
                    Scalar::Bool(true),
                    Scalar::Null(NullKind::Null),
                    Scalar::Bool(false),
                ])
                .expect("bools"),
            )
            .expect("with seen");
        let json = serde_json::to_string(&df).expect("serialize");
        let back: DataFrame = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, df);
        assert_eq!(back.column_names(), &["id", "name", "score", "seen"]);
        assert_eq!(back.column("seen").expect("seen").dtype(), DType::Bool);

        let empty = df.select::<&str>(&[]).expect("no columns");
        let back: DataFrame =
            serde_json::from_str(&serde_json::to_string(&empty).expect("serialize"))
                .expect("deserialize");
        assert_eq!(back.nrows(), 3);
    }

    #[test]
    fn loading_rejects_malformed_frames() {
        let mut stored = serde_json::to_value(people()).expect("to value");
        stored["nrows"] = serde_json::json!(4);
        let err = serde_json::from_value::<DataFrame>(stored).expect_err("row count");
        assert!(err.to_string().contains("does not match frame length"));

        let mut stored = serde_json::to_value(people()).expect("to value");
        stored["columns"][1][0] = serde_json::json!("id");
        let err = serde_json::from_value::<DataFrame>(stored).expect_err("duplicate");
        assert!(err.to_string().contains("column `id` appears more than once"));
    }
}
