//! Grouping and per-group reduction.

use tp_columnar::{Column, concat_columns};
use tp_expr::{DataFrame, Expr, ExprError, Operand, PipeStep, Reducer, Value, evaluate};
use tp_groupby::{GroupByOptions, GroupedFrame};
use tp_types::Scalar;

use crate::{groupby_error, resolve_all};

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    keys: Vec<Expr>,
    options: GroupByOptions,
}

/// Partition rows by the values of `keys`. Pipe the result into [`summarize`].
pub fn group_by<I, E>(keys: I) -> GroupBy
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    GroupBy {
        keys: keys.into_iter().map(Into::into).collect(),
        options: GroupByOptions::default(),
    }
}

impl GroupBy {
    #[must_use]
    pub fn options(mut self, options: GroupByOptions) -> Self {
        self.options = options;
        self
    }
}

impl PipeStep<DataFrame> for GroupBy {
    type Output = GroupedFrame;

    fn apply(self, frame: DataFrame) -> Result<GroupedFrame, ExprError> {
        let keys = resolve_all(&self.keys, &frame)?;
        GroupedFrame::new(frame, &keys, self.options).map_err(groupby_error)
    }
}

/// Named reductions: one row per group (keys first), or a single row for an ungrouped table.
/// Every expression must reduce to a single value; literals are repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct Summarize {
    outputs: Vec<(String, Operand)>,
}

pub fn summarize<I, N, V>(outputs: I) -> Summarize
where
    I: IntoIterator<Item = (N, V)>,
    N: Into<String>,
    V: Into<Operand>,
{
    Summarize {
        outputs: outputs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect(),
    }
}

fn does_not_reduce(name: &str) -> ExprError {
    ExprError::invalid(format!("summary `{name}` does not reduce to a single value"))
}

/// Rejects a summary whose chains end without a reducer, before any data is touched.
fn check_reduces(name: &str, expr: &Expr) -> Result<(), ExprError> {
    if expr.is_aggregate() {
        Ok(())
    } else {
        Err(does_not_reduce(name))
    }
}

fn reduce_to_scalar(name: &str, expr: &Expr, frame: &DataFrame) -> Result<Scalar, ExprError> {
    evaluate(expr, frame)?
        .into_scalar()
        .map_err(|_| does_not_reduce(name))
}

/// `col(x).reducer()` with no arguments, which grouping can compute directly.
fn plain_reduction(expr: &Expr) -> Option<(&str, Reducer)> {
    let links = expr.chain_links();
    let &[link] = links.as_slice() else {
        return None;
    };
    if !link.args().is_empty() || !link.kwargs().is_empty() {
        return None;
    }
    let column = link.parent().column_ref()?;
    Some((column.name(), expr.aggregation()?))
}

impl PipeStep<GroupedFrame> for Summarize {
    type Output = DataFrame;

    fn apply(self, grouped: GroupedFrame) -> Result<DataFrame, ExprError> {
        let mut out = grouped.key_frame().map_err(groupby_error)?;
        let ngroups = grouped.ngroups();
        let pieces = grouped
            .groups()
            .iter()
            .map(|group| grouped.group_frame(group))
            .collect::<Result<Vec<_>, _>>()
            .map_err(groupby_error)?;

        for (name, value) in self.outputs {
            #[cfg(feature = "tracing")]
            tracing::debug!(summary = %name, groups = ngroups, "summarize");

            let column = match value {
                Operand::Literal(value) => Column::full(value, ngroups)?,
                Operand::Node(expr) => {
                    check_reduces(&name, &expr)?;
                    match plain_reduction(&expr) {
                        Some((source, reducer)) => {
                            grouped.reduce(source, reducer).map_err(groupby_error)?
                        }
                        None => Column::from_values(
                            pieces
                                .iter()
                                .map(|piece| reduce_to_scalar(&name, &expr, piece))
                                .collect::<Result<Vec<_>, _>>()?,
                        )?,
                    }
                }
            };
            out = out.with_column(name, column)?;
        }
        Ok(out)
    }
}

impl PipeStep<DataFrame> for Summarize {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let columns = self
            .outputs
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Operand::Literal(value) => value,
                    Operand::Node(expr) => {
                        check_reduces(&name, &expr)?;
                        reduce_to_scalar(&name, &expr, &frame)?
                    }
                };
                Ok((name, Column::from_values(vec![value])?))
            })
            .collect::<Result<Vec<_>, ExprError>>()?;
        Ok(DataFrame::new(columns)?)
    }
}

/// Like [`summarize`], but an expression may keep one value per row of its group.
/// Within a group, single values are repeated to the length of the longest result.
#[derive(Debug, Clone, PartialEq)]
pub struct Reframe {
    outputs: Vec<(String, Operand)>,
}

pub fn reframe<I, N, V>(outputs: I) -> Reframe
where
    I: IntoIterator<Item = (N, V)>,
    N: Into<String>,
    V: Into<Operand>,
{
    Reframe {
        outputs: outputs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect(),
    }
}

impl Reframe {
    /// Every output evaluated against one group, stretched to a common row count.
    /// Row data sets the count; literals and reductions are repeated to it.
    fn piece(&self, frame: &DataFrame) -> Result<(usize, Vec<Column>), ExprError> {
        let results = self
            .outputs
            .iter()
            .map(|(_, value)| -> Result<(bool, Column), ExprError> {
                match value {
                    Operand::Literal(value) => Ok((true, Column::full(value.clone(), 1)?)),
                    Operand::Node(expr) => match evaluate(expr, frame)? {
                        Value::Scalar(value) => Ok((true, Column::full(value, 1)?)),
                        other => Ok((false, other.into_column(frame.nrows())?)),
                    },
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = results
            .iter()
            .filter(|(single, _)| !single)
            .map(|(_, column)| column.len())
            .max()
            .unwrap_or(1);
        let columns = results
            .into_iter()
            .map(|(single, column)| -> Result<Column, ExprError> {
                if single {
                    Ok(Column::new(
                        column.dtype(),
                        column.values().iter().cycle().take(rows).cloned().collect(),
                    )?)
                } else if column.len() == rows {
                    Ok(column)
                } else {
                    Err(ExprError::LengthMismatch {
                        expected: rows,
                        actual: column.len(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, columns))
    }
}

impl PipeStep<GroupedFrame> for Reframe {
    type Output = DataFrame;

    fn apply(self, grouped: GroupedFrame) -> Result<DataFrame, ExprError> {
        #[cfg(feature = "tracing")]
        tracing::debug!(outputs = self.outputs.len(), groups = grouped.ngroups(), "reframe");

        let mut key_rows = Vec::new();
        let mut parts = vec![Vec::new(); self.outputs.len()];
        for (position, group) in grouped.groups().iter().enumerate() {
            let piece = grouped.group_frame(group).map_err(groupby_error)?;
            let (rows, columns) = self.piece(&piece)?;
            key_rows.extend(std::iter::repeat_n(position, rows));
            for (part, column) in parts.iter_mut().zip(columns) {
                part.push(column);
            }
        }

        let mut out = grouped
            .key_frame()
            .map_err(groupby_error)?
            .take_rows(&key_rows)?;
        for ((name, _), part) in self.outputs.iter().zip(parts) {
            let part = part.iter().collect::<Vec<_>>();
            out = out.with_column(name.as_str(), concat_columns(&part)?)?;
        }
        Ok(out)
    }
}

impl PipeStep<DataFrame> for Reframe {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let (_, columns) = self.piece(&frame)?;
        let names = self.outputs.into_iter().map(|(name, _)| name);
        Ok(DataFrame::new(names.zip(columns).collect())?)
    }
}

/// Drop the grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ungroup;

#[must_use]
pub fn ungroup() -> Ungroup {
    Ungroup
}

impl PipeStep<GroupedFrame> for Ungroup {
    type Output = DataFrame;

    fn apply(self, grouped: GroupedFrame) -> Result<DataFrame, ExprError> {
        Ok(grouped.into_frame())
    }
}

#[cfg(test)]
mod tests {
    use tp_expr::{ExprError, Operand, col, pipe};
    use tp_groupby::GroupByOptions;
    use tp_types::{DType, Scalar};

    use super::{group_by, reframe, summarize, ungroup};
    use crate::fixtures::{penguins, strings};

    #[test]
    fn one_row_per_group_keys_first() {
        let grouped = pipe(penguins(), group_by(["species"])).expect("group_by");
        assert_eq!(grouped.ngroups(), 3);
        let out = pipe(
            grouped,
            summarize([
                ("n", col("mass").count()),
                ("mean_bill", col("bill_length").mean()),
                ("source", col("island").first().str_().lower()),
            ]),
        )
        .expect("summarize");
        assert_eq!(out.column_names(), &["species", "n", "mean_bill", "source"]);
        assert_eq!(strings(&out, "species"), vec!["Adelie", "Chinstrap", "Gentoo"]);
        assert_eq!(strings(&out, "n"), vec!["2", "1", "1"]);
        assert_eq!(out.column("mean_bill").expect("mean").values()[1], Scalar::Float64(46.5));
        assert_eq!(strings(&out, "source"), vec!["torgersen", "dream", "biscoe"]);
    }

    #[test]
    fn arithmetic_over_reductions_and_literals() {
        let grouped = pipe(
            penguins(),
            group_by(["island"]).options(GroupByOptions {
                dropna: true,
                sort: false,
            }),
        )
        .expect("group_by");
        let out = pipe(
            grouped,
            summarize([("spread", col("mass").max() - col("mass").min())]),
        )
        .expect("summarize");
        assert_eq!(strings(&out, "island"), vec!["Torgersen", "Biscoe", "Dream"]);
        assert_eq!(strings(&out, "spread"), vec!["0", "1100", "0"]);

        let grouped = pipe(penguins(), group_by(["island"])).expect("group_by");
        let out = pipe(grouped, summarize([("version", 2)])).expect("literal");
        assert_eq!(strings(&out, "version"), vec!["2", "2", "2"]);
    }

    #[test]
    fn ungrouped_summary_is_one_row() {
        let out = pipe(
            penguins(),
            summarize([
                ("total", col("mass").sum()),
                ("heaviest", col("mass").max() / 1000),
            ]),
        )
        .expect("summarize");
        assert_eq!(out.nrows(), 1);
        assert_eq!(out.column("total").expect("total").values(), &[Scalar::Int64(15150)]);
        assert_eq!(out.column("heaviest").expect("heaviest").dtype(), DType::Float64);

        let err = pipe(penguins(), summarize([("raw", col("mass"))])).expect_err("not reduced");
        assert!(matches!(err, ExprError::InvalidSpecification(_)));
    }

    #[test]
    fn summaries_without_a_reducer_fail_before_evaluation() {
        // The chain is rejected on shape alone, so the unknown column is never looked up.
        let err = pipe(penguins(), summarize([("raw", col("nope").str_().upper())]))
            .expect_err("no reducer");
        assert_eq!(
            err,
            ExprError::invalid("summary `raw` does not reduce to a single value")
        );

        let err = pipe(penguins(), summarize([("total", col("nope").sum())]))
            .expect_err("reduces but missing");
        assert_eq!(err, ExprError::column_not_found("nope"));

        let grouped = pipe(penguins(), group_by(["species"])).expect("group_by");
        let out = pipe(
            grouped,
            summarize([("heavy", col("mass").max().gt(4000) & col("mass").count().ge(2))]),
        )
        .expect("logical over reductions");
        assert_eq!(strings(&out, "heavy"), vec!["False", "False", "False"]);
    }

    #[test]
    fn reframe_keeps_several_rows_per_group() {
        let grouped = (penguins() >> group_by(["species"])).finish().expect("group_by");
        let out = (grouped
            >> reframe([
                ("bill", Operand::from(col("bill_length"))),
                ("n", col("mass").count().into()),
                ("tag", "x".into()),
            ]))
        .finish()
        .expect("reframe");
        assert_eq!(out.column_names(), &["species", "bill", "n", "tag"]);
        assert_eq!(
            strings(&out, "species"),
            vec!["Adelie", "Adelie", "Chinstrap", "Gentoo", "Gentoo"]
        );
        assert_eq!(strings(&out, "bill"), vec!["39.1", "37.8", "46.5", "46.1", "50.0"]);
        assert_eq!(strings(&out, "n"), vec!["2", "2", "1", "1", "1"]);
        assert_eq!(strings(&out, "tag"), vec!["x"; 5]);
    }

    #[test]
    fn ungrouped_reframe_repeats_single_values() {
        let out = (penguins()
            >> reframe([
                ("species", col("species").str_().lower()),
                ("total", col("mass").sum()),
            ]))
        .finish()
        .expect("reframe");
        assert_eq!(out.nrows(), 5);
        assert_eq!(strings(&out, "species")[3], "chinstrap");
        assert_eq!(strings(&out, "total"), vec!["15150"; 5]);

        let err = (penguins() >> reframe([("cols", col("species") | col("island"))]))
            .finish()
            .expect_err("names are not row data");
        assert!(matches!(err, ExprError::InvalidSpecification(_)));
    }

    #[test]
    fn ungroup_hands_back_the_table() {
        let grouped = pipe(penguins(), group_by(["species", "island"])).expect("group_by");
        assert_eq!(grouped.ngroups(), 4);
        let out = pipe(grouped, ungroup()).expect("ungroup");
        assert_eq!(out, penguins());

        let err = pipe(penguins(), group_by(Vec::<&str>::new())).expect_err("no keys");
        assert!(matches!(err, ExprError::InvalidSpecification(_)));
    }
}
