#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_columnar::{Column, ColumnError};
use tp_frame::{DataFrame, FrameError};
use tp_types::{HashKey, common_dtype};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
    Cross,
    /// Left rows with at least one match; left columns only.
    Semi,
    /// Left rows with no match; left columns only.
    Anti,
}

impl JoinType {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let how = match name {
            "inner" => Self::Inner,
            "left" => Self::Left,
            "right" => Self::Right,
            "outer" | "full" => Self::Outer,
            "cross" => Self::Cross,
            "semi" => Self::Semi,
            "anti" => Self::Anti,
            _ => return None,
        };
        Some(how)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    pub how: JoinType,
    /// Key columns present under the same name on both sides.
    pub on: Vec<String>,
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    /// Appended to overlapping non-key column names, left then right.
    pub suffixes: (String, String),
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            how: JoinType::Inner,
            on: Vec::new(),
            left_on: Vec::new(),
            right_on: Vec::new(),
            suffixes: ("_x".to_owned(), "_y".to_owned()),
        }
    }
}

impl JoinOptions {
    #[must_use]
    pub fn how(how: JoinType) -> Self {
        Self {
            how,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn on<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        self.on = keys.iter().map(|key| key.as_ref().to_owned()).collect();
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JoinError {
    #[error("no common columns to join on")]
    NoCommonColumns,
    #[error("left_on has {left} keys but right_on has {right}")]
    KeyCountMismatch { left: usize, right: usize },
    #[error("a cross join takes no key columns")]
    CrossWithKeys,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Row pairing produced by the match phase; `None` marks the absent side.
type RowPairs = Vec<(Option<usize>, Option<usize>)>;

pub fn join(
    left: &DataFrame,
    right: &DataFrame,
    options: &JoinOptions,
) -> Result<DataFrame, JoinError> {
    let (left_keys, right_keys) = resolve_keys(left, right, options)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        how = ?options.how,
        keys = left_keys.len(),
        left_rows = left.nrows(),
        right_rows = right.nrows(),
        "join"
    );

    if matches!(options.how, JoinType::Semi | JoinType::Anti) {
        let right_index = key_rows(right, &right_keys)?
            .into_iter()
            .collect::<HashSet<_>>();
        let want = matches!(options.how, JoinType::Semi);
        let rows = key_rows(left, &left_keys)?
            .iter()
            .enumerate()
            .filter(|(_, key)| right_index.contains(*key) == want)
            .map(|(row, _)| row)
            .collect::<Vec<_>>();
        return Ok(left.take_rows(&rows)?);
    }

    let pairs = match options.how {
        JoinType::Cross => (0..left.nrows())
            .flat_map(|l| (0..right.nrows()).map(move |r| (Some(l), Some(r))))
            .collect(),
        how => match_rows(left, right, &left_keys, &right_keys, how)?,
    };
    assemble(left, right, &left_keys, &right_keys, &pairs, &options.suffixes)
}

fn resolve_keys(
    left: &DataFrame,
    right: &DataFrame,
    options: &JoinOptions,
) -> Result<(Vec<String>, Vec<String>), JoinError> {
    let explicit =
        !options.on.is_empty() || !options.left_on.is_empty() || !options.right_on.is_empty();
    if options.how == JoinType::Cross {
        return if explicit {
            Err(JoinError::CrossWithKeys)
        } else {
            Ok((Vec::new(), Vec::new()))
        };
    }

    let (left_keys, right_keys) = if !options.left_on.is_empty() || !options.right_on.is_empty() {
        if options.left_on.len() != options.right_on.len() {
            return Err(JoinError::KeyCountMismatch {
                left: options.left_on.len(),
                right: options.right_on.len(),
            });
        }
        (options.left_on.clone(), options.right_on.clone())
    } else if !options.on.is_empty() {
        (options.on.clone(), options.on.clone())
    } else {
        let common = left
            .column_names()
            .iter()
            .filter(|name| right.contains(name))
            .cloned()
            .collect::<Vec<_>>();
        if common.is_empty() {
            return Err(JoinError::NoCommonColumns);
        }
        (common.clone(), common)
    };

    for name in &left_keys {
        left.column_or_err(name)?;
    }
    for name in &right_keys {
        right.column_or_err(name)?;
    }
    Ok((left_keys, right_keys))
}

fn key_rows<'a>(frame: &'a DataFrame, keys: &[String]) -> Result<Vec<Vec<HashKey<'a>>>, JoinError> {
    let columns = keys
        .iter()
        .map(|name| frame.column_or_err(name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((0..frame.nrows())
        .map(|row| {
            columns
                .iter()
                .map(|column| HashKey::from_scalar(&column.values()[row]))
                .collect()
        })
        .collect())
}

fn match_rows(
    left: &DataFrame,
    right: &DataFrame,
    left_keys: &[String],
    right_keys: &[String],
    how: JoinType,
) -> Result<RowPairs, JoinError> {
    let left_rows = key_rows(left, left_keys)?;
    let right_rows = key_rows(right, right_keys)?;

    // Right joins probe from the right side so output follows right row order.
    let (probe, build) = if how == JoinType::Right {
        (&right_rows, &left_rows)
    } else {
        (&left_rows, &right_rows)
    };
    let mut index = HashMap::<&[HashKey<'_>], Vec<usize>>::new();
    for (pos, key) in build.iter().enumerate() {
        index.entry(key.as_slice()).or_default().push(pos);
    }

    let keep_unmatched_probe = matches!(how, JoinType::Left | JoinType::Right | JoinType::Outer);
    let mut matched_build = vec![false; build.len()];
    let mut pairs = RowPairs::new();
    for (probe_pos, key) in probe.iter().enumerate() {
        match index.get(key.as_slice()) {
            Some(matches) => {
                for build_pos in matches {
                    matched_build[*build_pos] = true;
                    pairs.push((Some(probe_pos), Some(*build_pos)));
                }
            }
            None if keep_unmatched_probe => pairs.push((Some(probe_pos), None)),
            None => {}
        }
    }

    if how == JoinType::Outer {
        pairs.extend(
            matched_build
                .iter()
                .enumerate()
                .filter(|(_, matched)| !**matched)
                .map(|(pos, _)| (None, Some(pos))),
        );
    }

    if how == JoinType::Right {
        pairs = pairs.into_iter().map(|(r, l)| (l, r)).collect();
    }
    Ok(pairs)
}

fn assemble(
    left: &DataFrame,
    right: &DataFrame,
    left_keys: &[String],
    right_keys: &[String],
    pairs: &RowPairs,
    suffixes: &(String, String),
) -> Result<DataFrame, JoinError> {
    let left_positions = pairs.iter().map(|(l, _)| *l).collect::<Vec<_>>();
    let right_positions = pairs.iter().map(|(_, r)| *r).collect::<Vec<_>>();

    // Keys spelled the same on both sides collapse into one output column.
    let shared = left_keys
        .iter()
        .zip(right_keys)
        .filter(|(l, r)| l == r)
        .map(|(l, _)| l.as_str())
        .collect::<HashSet<_>>();
    let right_names = right
        .column_names()
        .iter()
        .filter(|name| !shared.contains(name.as_str()))
        .collect::<Vec<_>>();
    let overlapping = |name: &str| right_names.iter().any(|r| r.as_str() == name);

    let mut columns = Vec::with_capacity(left.ncols() + right_names.len());
    for (name, column) in left.iter() {
        if shared.contains(name) {
            let other = right.column_or_err(name)?;
            columns.push((name.to_owned(), coalesce(column, other, pairs)?));
        } else if overlapping(name) {
            columns.push((
                format!("{name}{}", suffixes.0),
                column.reindex_by_positions(&left_positions)?,
            ));
        } else {
            columns.push((name.to_owned(), column.reindex_by_positions(&left_positions)?));
        }
    }
    for name in right_names {
        let column = right.column_or_err(name)?.reindex_by_positions(&right_positions)?;
        let out_name = if left.contains(name) {
            format!("{name}{}", suffixes.1)
        } else {
            name.clone()
        };
        columns.push((out_name, column));
    }

    if columns.is_empty() {
        return Ok(DataFrame::empty());
    }
    Ok(DataFrame::new(columns)?)
}

/// A shared key column: the left value where the left row exists, else the right one.
fn coalesce(left: &Column, right: &Column, pairs: &RowPairs) -> Result<Column, JoinError> {
    let dtype = common_dtype(left.dtype(), right.dtype()).unwrap_or(left.dtype());
    let values = pairs
        .iter()
        .map(|pair| match pair {
            (Some(l), _) => left.values()[*l].clone(),
            (None, Some(r)) => right.values()[*r].clone(),
            (None, None) => tp_types::Scalar::missing_for_dtype(dtype),
        })
        .collect();
    Ok(Column::new(dtype, values)?)
}

#[cfg(test)]
mod tests {
    use tp_frame::DataFrame;
    use tp_types::{NullKind, Scalar};

    use super::{JoinError, JoinOptions, JoinType, join};

    fn left() -> DataFrame {
        DataFrame::from_values(vec![
            ("k", vec!["a".into(), "b".into(), "k".into(), "k".into()]),
            (
                "v",
                vec![
                    Scalar::Int64(1),
                    Scalar::Int64(2),
                    Scalar::Int64(3),
                    Scalar::Int64(4),
                ],
            ),
        ])
        .expect("left")
    }

    fn right() -> DataFrame {
        DataFrame::from_values(vec![
            ("k", vec!["k".into(), "a".into(), "k".into(), "z".into()]),
            (
                "v",
                vec![
                    Scalar::Int64(10),
                    Scalar::Int64(20),
                    Scalar::Int64(30),
                    Scalar::Int64(40),
                ],
            ),
        ])
        .expect("right")
    }

    fn keyed(how: JoinType) -> JoinOptions {
        JoinOptions::how(how).on(&["k"])
    }

    #[test]
    fn inner_join_multiplies_cardinality_for_duplicates() {
        let out = join(&left(), &right(), &keyed(JoinType::Inner)).expect("join");
        assert_eq!(out.column_names(), &["k", "v_x", "v_y"]);
        assert_eq!(out.nrows(), 5);
        assert_eq!(
            out.column("v_x").expect("v_x").values(),
            &[
                Scalar::Int64(1),
                Scalar::Int64(3),
                Scalar::Int64(3),
                Scalar::Int64(4),
                Scalar::Int64(4)
            ]
        );
    }

    #[test]
    fn left_join_injects_missing_for_unmatched_right_rows() {
        let out = join(&left(), &right(), &keyed(JoinType::Left)).expect("join");
        assert_eq!(out.nrows(), 6);
        assert_eq!(
            out.column("v_y").expect("v_y").values()[1],
            Scalar::Null(NullKind::Null)
        );
    }

    #[test]
    fn right_and_outer_joins_keep_right_keys() {
        let out = join(&left(), &right(), &keyed(JoinType::Right)).expect("join");
        assert_eq!(out.nrows(), 6);
        assert_eq!(
            out.column("k").expect("k").values().last(),
            Some(&Scalar::Utf8("z".into()))
        );

        let out = join(&left(), &right(), &keyed(JoinType::Outer)).expect("join");
        assert_eq!(out.nrows(), 7);
        let keys = out.column("k").expect("k").values();
        assert_eq!(keys[1], Scalar::Utf8("b".into()));
        assert_eq!(keys[6], Scalar::Utf8("z".into()));
        assert!(out.column("v_x").expect("v_x").values()[6].is_missing());
    }

    #[test]
    fn semi_and_anti_filter_left_rows() {
        let out = join(&left(), &right(), &keyed(JoinType::Semi)).expect("semi");
        assert_eq!(out.column_names(), &["k", "v"]);
        assert_eq!(out.nrows(), 3);
        let out = join(&left(), &right(), &keyed(JoinType::Anti)).expect("anti");
        assert_eq!(
            out.column("k").expect("k").values(),
            &[Scalar::Utf8("b".into())]
        );
    }

    #[test]
    fn cross_join_pairs_every_row() {
        let out = join(&left(), &right(), &JoinOptions::how(JoinType::Cross)).expect("cross");
        assert_eq!(out.nrows(), 16);
        assert_eq!(out.column_names(), &["k_x", "v_x", "k_y", "v_y"]);
        assert_eq!(
            join(&left(), &right(), &keyed(JoinType::Cross)).expect_err("keys"),
            JoinError::CrossWithKeys
        );
    }

    #[test]
    fn differently_named_keys_are_both_kept() {
        let renamed = right().rename(&[("k", "key")]).expect("rename");
        let options = JoinOptions {
            left_on: vec!["k".into()],
            right_on: vec!["key".into()],
            ..JoinOptions::default()
        };
        let out = join(&left(), &renamed, &options).expect("join");
        assert_eq!(out.column_names(), &["k", "v_x", "key", "v_y"]);
    }

    #[test]
    fn natural_join_needs_shared_columns() {
        let other = DataFrame::from_values(vec![("w", vec![Scalar::Int64(1)])]).expect("frame");
        assert_eq!(
            join(&left(), &other, &JoinOptions::default()).expect_err("no keys"),
            JoinError::NoCommonColumns
        );
        let out = join(&left(), &right(), &JoinOptions::default()).expect("natural");
        assert_eq!(out.column_names(), &["k", "v"]);
        assert_eq!(out.nrows(), 0);
    }

    #[test]
    fn join_type_parses_and_serializes() {
        assert_eq!(JoinType::parse("full"), Some(JoinType::Outer));
        assert_eq!(
            serde_json::to_string(&JoinType::Anti).expect("json"),
            r#""anti""#
        );
    }
}
