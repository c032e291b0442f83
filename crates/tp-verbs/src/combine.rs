//! Verbs that combine the piped table with others.

use serde::{Deserialize, Serialize};
use tp_columnar::{Column, concat_columns};
use tp_expr::{DataFrame, ExprError, PipeStep};
use tp_join::JoinOptions;
use tp_types::{NullKind, Scalar};

use crate::join_error;

/// Stack tables vertically. Columns are the union, in first-seen order;
/// a table lacking a column contributes missing values.
#[derive(Debug, Clone, PartialEq)]
pub struct BindRows {
    others: Vec<DataFrame>,
}

pub fn bind_rows(others: impl IntoIterator<Item = DataFrame>) -> BindRows {
    BindRows {
        others: others.into_iter().collect(),
    }
}

impl PipeStep<DataFrame> for BindRows {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let frames = std::iter::once(&frame).chain(&self.others).collect::<Vec<_>>();
        let mut names = Vec::<&str>::new();
        for table in &frames {
            for name in table.column_names() {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }

        let columns = names
            .iter()
            .map(|name| {
                let padding = frames
                    .iter()
                    .filter(|table| !table.contains(name))
                    .map(|table| Column::full(Scalar::Null(NullKind::Null), table.nrows()))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut spare = padding.iter();
                let parts = frames
                    .iter()
                    .filter_map(|table| table.column(name).or_else(|| spare.next()))
                    .collect::<Vec<_>>();
                Ok(((*name).to_owned(), concat_columns(&parts)?))
            })
            .collect::<Result<Vec<_>, ExprError>>()?;
        Ok(DataFrame::new(columns)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindColsOptions {
    /// Appended to a name already present; later clashes fall back to `_3`, `_4`, ...
    pub suffix: String,
}

impl Default for BindColsOptions {
    fn default() -> Self {
        Self {
            suffix: "_2".to_owned(),
        }
    }
}

/// Place tables side by side, aligned by row position. Shorter tables are
/// padded with missing values.
#[derive(Debug, Clone, PartialEq)]
pub struct BindCols {
    others: Vec<DataFrame>,
    options: BindColsOptions,
}

pub fn bind_cols(others: impl IntoIterator<Item = DataFrame>) -> BindCols {
    BindCols {
        others: others.into_iter().collect(),
        options: BindColsOptions::default(),
    }
}

impl BindCols {
    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.options.suffix = suffix.into();
        self
    }
}

fn pad_rows(frame: DataFrame, nrows: usize) -> Result<Vec<(String, Column)>, ExprError> {
    if frame.nrows() == nrows {
        return Ok(frame.into_columns());
    }
    #[cfg(feature = "tracing")]
    tracing::warn!(
        rows = frame.nrows(),
        expected = nrows,
        "row count mismatch in bind_cols; padding with missing values"
    );
    let positions = (0..nrows)
        .map(|row| (row < frame.nrows()).then_some(row))
        .collect::<Vec<_>>();
    frame
        .into_columns()
        .into_iter()
        .map(|(name, column)| Ok((name, column.reindex_by_positions(&positions)?)))
        .collect()
}

impl PipeStep<DataFrame> for BindCols {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let nrows = std::iter::once(&frame)
            .chain(&self.others)
            .map(DataFrame::nrows)
            .max()
            .unwrap_or(0);
        let mut columns = pad_rows(frame, nrows)?;
        for other in self.others {
            let incoming = other.column_names().to_vec();
            for (name, column) in pad_rows(other, nrows)? {
                let taken = |candidate: &str| {
                    columns.iter().any(|(existing, _)| existing == candidate)
                        || incoming.iter().any(|other| other == candidate)
                };
                let name = if columns.iter().any(|(existing, _)| *existing == name) {
                    let mut renamed = format!("{name}{}", self.options.suffix);
                    let mut counter = 2;
                    while taken(&renamed) {
                        counter += 1;
                        renamed = format!("{name}_{counter}");
                    }
                    renamed
                } else {
                    name
                };
                columns.push((name, column));
            }
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Relational join of the piped table (left) with `right`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    right: DataFrame,
    options: JoinOptions,
}

pub fn join(right: DataFrame, options: JoinOptions) -> Join {
    Join { right, options }
}

impl PipeStep<DataFrame> for Join {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        tp_join::join(&frame, &self.right, &self.options).map_err(join_error)
    }
}
