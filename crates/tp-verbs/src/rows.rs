//! Verbs that keep, drop or reorder rows.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tp_columnar::{Column, SortKey, sort_order};
use tp_expr::{DataFrame, Expr, ExprError, PipeStep, evaluate, evaluate_mask};
use tp_frame::DropHow;

use crate::resolve_all;

/// Keep rows where every condition holds. Missing counts as not holding.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    conditions: Vec<Expr>,
}

pub fn filter(conditions: impl IntoIterator<Item = Expr>) -> Filter {
    Filter {
        conditions: conditions.into_iter().collect(),
    }
}

impl PipeStep<DataFrame> for Filter {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let mut keep = vec![true; frame.nrows()];
        for condition in &self.conditions {
            for (slot, hit) in keep.iter_mut().zip(evaluate_mask(condition, &frame)?) {
                *slot &= hit;
            }
        }
        Ok(frame.filter_mask(&keep)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrangeOptions {
    /// Flip every key's direction.
    pub descending: bool,
}

/// Stable sort by column references (`-col` for descending) or computed keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrange {
    keys: Vec<Expr>,
    options: ArrangeOptions,
}

pub fn arrange<I, E>(keys: I) -> Arrange
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Arrange {
        keys: keys.into_iter().map(Into::into).collect(),
        options: ArrangeOptions::default(),
    }
}

impl Arrange {
    #[must_use]
    pub fn options(mut self, options: ArrangeOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn descending(self) -> Self {
        self.options(ArrangeOptions { descending: true })
    }
}

impl PipeStep<DataFrame> for Arrange {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let columns = self
            .keys
            .iter()
            .map(|key| {
                let column = match key.column_ref() {
                    Some(reference) => frame
                        .column(reference.name())
                        .cloned()
                        .ok_or_else(|| ExprError::column_not_found(reference.name()))?,
                    None => evaluate(key, &frame)?.into_column(frame.nrows())?,
                };
                if column.len() != frame.nrows() {
                    return Err(ExprError::LengthMismatch {
                        expected: frame.nrows(),
                        actual: column.len(),
                    });
                }
                Ok((column, key.is_descending() != self.options.descending))
            })
            .collect::<Result<Vec<(Column, bool)>, ExprError>>()?;
        let keys = columns
            .iter()
            .map(|(column, descending)| SortKey {
                column,
                descending: *descending,
            })
            .collect::<Vec<_>>();
        let order = sort_order(&keys, frame.nrows());
        Ok(frame.take_rows(&order)?)
    }
}

/// Keep the first of each set of duplicate rows, over the given columns or all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Distinct {
    columns: Vec<Expr>,
}

pub fn distinct<I, E>(columns: I) -> Distinct
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Distinct {
        columns: columns.into_iter().map(Into::into).collect(),
    }
}

impl PipeStep<DataFrame> for Distinct {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let subset = resolve_all(&self.columns, &frame)?;
        Ok(frame.drop_duplicates(&subset)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropNaOptions {
    pub how: DropHow,
}

/// Drop rows with missing values in the given columns, or in any column.
#[derive(Debug, Clone, PartialEq)]
pub struct DropNa {
    subset: Vec<Expr>,
    options: DropNaOptions,
}

pub fn drop_na<I, E>(subset: I) -> DropNa
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    DropNa {
        subset: subset.into_iter().map(Into::into).collect(),
        options: DropNaOptions::default(),
    }
}

impl DropNa {
    #[must_use]
    pub fn how(mut self, how: DropHow) -> Self {
        self.options.how = how;
        self
    }
}

impl PipeStep<DataFrame> for DropNa {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let subset = resolve_all(&self.subset, &frame)?;
        Ok(frame.dropna(&subset, self.options.how)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    n: i64,
}

/// First `n` rows; negative `n` keeps all but the last `|n|`.
#[must_use]
pub fn head(n: i64) -> Head {
    Head { n }
}

impl Default for Head {
    fn default() -> Self {
        Self { n: 5 }
    }
}

impl PipeStep<DataFrame> for Head {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        Ok(frame.head(self.n)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tail {
    n: i64,
}

#[must_use]
pub fn tail(n: i64) -> Tail {
    Tail { n }
}

impl Default for Tail {
    fn default() -> Self {
        Self { n: 5 }
    }
}

impl PipeStep<DataFrame> for Tail {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        Ok(frame.tail(self.n)?)
    }
}

/// Rows by zero-based position, in the order given; negative positions count from the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    positions: Vec<i64>,
}

pub fn slice(positions: impl IntoIterator<Item = i64>) -> Slice {
    Slice {
        positions: positions.into_iter().collect(),
    }
}

impl PipeStep<DataFrame> for Slice {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let nrows = frame.nrows();
        let rows = self
            .positions
            .iter()
            .map(|&position| {
                let resolved = if position < 0 {
                    usize::try_from(position.unsigned_abs())
                        .ok()
                        .and_then(|back| nrows.checked_sub(back))
                } else {
                    usize::try_from(position).ok().filter(|row| *row < nrows)
                };
                resolved.ok_or_else(|| {
                    ExprError::invalid(format!("row {position} is out of range for {nrows} rows"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(frame.take_rows(&rows)?)
    }
}

/// How many rows [`sample`] draws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSize {
    Rows(usize),
    /// A share of the table, rounded to the nearest row.
    Fraction(f64),
}

/// Random rows, without replacement unless asked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    size: SampleSize,
    replace: bool,
    seed: Option<u64>,
}

#[must_use]
pub fn sample(n: usize) -> Sample {
    Sample {
        size: SampleSize::Rows(n),
        replace: false,
        seed: None,
    }
}

/// Sample a fraction of the rows; `sample_frac(1.0)` shuffles the table.
#[must_use]
pub fn sample_frac(frac: f64) -> Sample {
    Sample {
        size: SampleSize::Fraction(frac),
        ..sample(0)
    }
}

impl Sample {
    #[must_use]
    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    /// Seed the generator so the draw is reproducible.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn count(&self, nrows: usize) -> Result<usize, ExprError> {
        match self.size {
            SampleSize::Rows(n) => Ok(n),
            SampleSize::Fraction(frac) if frac.is_finite() && frac >= 0.0 => {
                Ok((frac * nrows as f64).round() as usize)
            }
            SampleSize::Fraction(frac) => Err(ExprError::invalid(format!(
                "sample fraction must be a non-negative number, got {frac}"
            ))),
        }
    }
}

impl PipeStep<DataFrame> for Sample {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let nrows = frame.nrows();
        let count = self.count(nrows)?;
        if !self.replace && count > nrows {
            return Err(ExprError::invalid(format!(
                "cannot take {count} rows from {nrows} without replacement"
            )));
        }
        if nrows == 0 && count > 0 {
            return Err(ExprError::invalid("cannot sample rows from an empty table"));
        }

        let mut rng = self
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let rows = if self.replace {
            (0..count).map(|_| rng.gen_range(0..nrows)).collect::<Vec<_>>()
        } else {
            index::sample(&mut rng, nrows, count).into_vec()
        };
        Ok(frame.take_rows(&rows)?)
    }
}

#[cfg(test)]
mod tests {
    use tp_expr::{ExprError, col, pipe};
    use tp_frame::DropHow;
    use tp_types::Scalar;

    use super::{arrange, distinct, drop_na, filter, head, sample, sample_frac, slice, tail};
    use crate::fixtures::{penguins, strings};

    #[test]
    fn filter_ands_conditions_and_drops_missing() {
        let out = pipe(
            penguins(),
            filter([col("species").eq("Gentoo"), col("bill_depth").gt(10.0)]),
        )
        .expect("filter");
        assert_eq!(out.nrows(), 1);
        assert_eq!(strings(&out, "bill_length"), vec!["50.0"]);

        let out = pipe(penguins(), filter([])).expect("no conditions");
        assert_eq!(out.nrows(), 5);
    }

    #[test]
    fn filter_rejects_non_boolean_conditions() {
        let err = pipe(penguins(), filter([col("mass") + 1])).expect_err("numeric mask");
        assert!(matches!(err, ExprError::UnsupportedOperation { .. }));
    }

    #[test]
    fn arrange_descending_with_missing_last() {
        let out = pipe(penguins(), arrange([-col("mass")])).expect("arrange");
        assert_eq!(
            strings(&out, "mass"),
            vec!["4500", "3750", "3500", "3400", "None"]
        );

        let out = pipe(penguins(), arrange(["species", "bill_length"]).descending()).expect("flip");
        assert_eq!(strings(&out, "species")[0], "Gentoo");
        assert_eq!(strings(&out, "bill_length")[0], "50.0");
    }

    #[test]
    fn arrange_by_computed_key_is_stable() {
        let out = pipe(penguins(), arrange([col("species").str_().len()])).expect("arrange");
        assert_eq!(
            strings(&out, "species"),
            vec!["Adelie", "Adelie", "Gentoo", "Gentoo", "Chinstrap"]
        );
        assert_eq!(strings(&out, "island")[..2], ["Torgersen", "Biscoe"]);
    }

    #[test]
    fn distinct_and_drop_na() {
        let out = pipe(penguins(), distinct(["species", "island"])).expect("distinct");
        assert_eq!(out.nrows(), 4);
        let out = pipe(penguins(), drop_na(Vec::<&str>::new())).expect("drop_na");
        assert_eq!(out.nrows(), 3);
        let out = pipe(
            penguins(),
            drop_na(["bill_depth", "mass"]).how(DropHow::All),
        )
        .expect("drop_na all");
        assert_eq!(out.nrows(), 5);
    }

    #[test]
    fn positional_row_verbs() {
        assert_eq!(pipe(penguins(), head(2)).expect("head").nrows(), 2);
        assert_eq!(pipe(penguins(), tail(-1)).expect("tail").nrows(), 4);
        let out = pipe(penguins(), slice([-1, 0])).expect("slice");
        assert_eq!(
            out.column("mass").expect("mass").values(),
            &[Scalar::Null(tp_types::NullKind::Null), Scalar::Int64(3750)]
        );
        let err = pipe(penguins(), slice([9])).expect_err("range");
        assert!(matches!(err, ExprError::InvalidSpecification(_)));
    }

    fn sorted(mut values: Vec<String>) -> Vec<String> {
        values.sort();
        values
    }

    #[test]
    fn seeded_samples_are_reproducible_and_distinct() {
        let first = (penguins() >> sample(3).seed(7)).finish().expect("sample");
        let again = (penguins() >> sample(3).seed(7)).finish().expect("sample again");
        assert_eq!(first, again);
        assert_eq!(first.nrows(), 3);

        let bills = sorted(strings(&first, "bill_length"));
        let mut unique = bills.clone();
        unique.dedup();
        assert_eq!(unique, bills);

        let shuffled = (penguins() >> sample_frac(1.0).seed(11)).finish().expect("shuffle");
        assert_eq!(
            sorted(strings(&shuffled, "bill_length")),
            sorted(strings(&penguins(), "bill_length"))
        );
    }

    #[test]
    fn sampling_with_replacement_can_exceed_the_row_count() {
        let out = (penguins() >> sample(12).replace(true).seed(3))
            .finish()
            .expect("with replacement");
        assert_eq!(out.nrows(), 12);
        let known = strings(&penguins(), "bill_length");
        assert!(strings(&out, "bill_length").iter().all(|bill| known.contains(bill)));

        let out = (penguins() >> sample_frac(0.4)).finish().expect("fraction");
        assert_eq!(out.nrows(), 2);
    }

    #[test]
    fn impossible_samples_are_rejected() {
        let err = (penguins() >> sample(6)).finish().expect_err("too many");
        assert!(matches!(err, ExprError::InvalidSpecification(_)));
        let err = (penguins() >> sample_frac(-0.5)).finish().expect_err("negative");
        assert!(matches!(err, ExprError::InvalidSpecification(_)));
    }
}
