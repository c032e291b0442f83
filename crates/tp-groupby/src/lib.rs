#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_columnar::{Column, ColumnError, Reducer};
use tp_frame::{DataFrame, FrameError};
use tp_types::{HashKey, Scalar, compare_scalars};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupByOptions {
    /// Drop rows whose key has a missing component.
    pub dropna: bool,
    /// Order groups by key value instead of first appearance.
    pub sort: bool,
}

impl Default for GroupByOptions {
    fn default() -> Self {
        Self {
            dropna: true,
            sort: true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GroupByError {
    #[error("grouping needs at least one key column")]
    NoKeys,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// One group: its key values (one per key column) and member row positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    key: Vec<Scalar>,
    rows: Vec<usize>,
}

impl Group {
    #[must_use]
    pub fn key(&self) -> &[Scalar] {
        &self.key
    }

    #[must_use]
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A table partitioned by the values of its key columns.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedFrame {
    frame: DataFrame,
    keys: Vec<String>,
    groups: Vec<Group>,
}

impl GroupedFrame {
    pub fn new<S: AsRef<str>>(
        frame: DataFrame,
        keys: &[S],
        options: GroupByOptions,
    ) -> Result<Self, GroupByError> {
        if keys.is_empty() {
            return Err(GroupByError::NoKeys);
        }
        let key_columns = keys
            .iter()
            .map(|key| frame.column_or_err(key.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups = match key_columns.as_slice() {
            [single] => try_group_dense_int64(single.values(), options.dropna),
            _ => None,
        }
        .unwrap_or_else(|| group_by_hash(&key_columns, frame.nrows(), options.dropna));

        if options.sort {
            groups.sort_by(|left, right| compare_keys(&left.key, &right.key));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            keys = keys.len(),
            groups = groups.len(),
            rows = frame.nrows(),
            "grouped frame"
        );

        Ok(Self {
            keys: keys.iter().map(|key| key.as_ref().to_owned()).collect(),
            frame,
            groups,
        })
    }

    #[must_use]
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[must_use]
    pub fn ngroups(&self) -> usize {
        self.groups.len()
    }

    /// Drop the grouping and hand back the underlying table.
    #[must_use]
    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// The rows of one group as their own table, in original row order.
    pub fn group_frame(&self, group: &Group) -> Result<DataFrame, GroupByError> {
        Ok(self.frame.take_rows(&group.rows)?)
    }

    /// Key columns with one row per group, keeping the source dtypes.
    pub fn key_frame(&self) -> Result<DataFrame, GroupByError> {
        let columns = self
            .keys
            .iter()
            .enumerate()
            .map(|(position, name)| {
                let dtype = self.frame.column_or_err(name)?.dtype();
                let values = self
                    .groups
                    .iter()
                    .map(|group| group.key[position].clone())
                    .collect();
                Ok((name.clone(), Column::new(dtype, values)?))
            })
            .collect::<Result<Vec<_>, GroupByError>>()?;
        Ok(DataFrame::new(columns)?)
    }

    /// Reduce `column` within every group, one value per group.
    pub fn reduce(&self, column: &str, reducer: Reducer) -> Result<Column, GroupByError> {
        let source = self.frame.column_or_err(column)?;
        let values = self
            .groups
            .iter()
            .map(|group| source.take(&group.rows)?.reduce(reducer))
            .collect::<Result<Vec<_>, ColumnError>>()?;
        Ok(Column::from_values(values)?)
    }
}

fn group_by_hash(key_columns: &[&Column], nrows: usize, dropna: bool) -> Vec<Group> {
    let mut slots = HashMap::<Vec<HashKey<'_>>, usize>::new();
    let mut groups = Vec::<Group>::new();

    for row in 0..nrows {
        let key = key_columns
            .iter()
            .map(|column| &column.values()[row])
            .collect::<Vec<_>>();
        if dropna && key.iter().any(|value| value.is_missing()) {
            continue;
        }
        let hashed = key.iter().copied().map(HashKey::from_scalar).collect();
        let slot = *slots.entry(hashed).or_insert_with(|| {
            groups.push(Group {
                key: key.iter().map(|value| (*value).clone()).collect(),
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(row);
    }
    groups
}

const DENSE_INT_KEY_RANGE_LIMIT: i128 = 65_536;

/// Dense-bucket fast path for a single `Int64` key column.
///
/// Falls back to the hash path unless every non-dropped key is `Int64`
/// and the key span is within a bounded range budget.
fn try_group_dense_int64(keys: &[Scalar], dropna: bool) -> Option<Vec<Group>> {
    let mut min_key = i64::MAX;
    let mut max_key = i64::MIN;
    let mut saw_int_key = false;

    for key in keys {
        match key {
            Scalar::Int64(v) => {
                saw_int_key = true;
                min_key = min_key.min(*v);
                max_key = max_key.max(*v);
            }
            Scalar::Null(_) if dropna => continue,
            _ => return None,
        }
    }

    if !saw_int_key {
        return Some(Vec::new());
    }

    let span = i128::from(max_key) - i128::from(min_key) + 1;
    if span <= 0 || span > DENSE_INT_KEY_RANGE_LIMIT {
        return None;
    }

    let mut slots = vec![None::<usize>; usize::try_from(span).ok()?];
    let mut groups = Vec::<Group>::new();

    for (row, key) in keys.iter().enumerate() {
        let Scalar::Int64(value) = key else {
            continue;
        };
        let bucket = usize::try_from(i128::from(*value) - i128::from(min_key)).ok()?;
        let slot = match slots[bucket] {
            Some(slot) => slot,
            None => {
                groups.push(Group {
                    key: vec![key.clone()],
                    rows: Vec::new(),
                });
                slots[bucket] = Some(groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[slot].rows.push(row);
    }

    Some(groups)
}

/// Lexicographic key order with missing components last.
fn compare_keys(left: &[Scalar], right: &[Scalar]) -> Ordering {
    for (a, b) in left.iter().zip(right) {
        let ordering = match (a.is_missing(), b.is_missing()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_scalars(a, b).unwrap_or(Ordering::Equal),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
