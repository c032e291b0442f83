//! Verbs that choose, order or rename columns.

use tp_columnar::Column;
use tp_expr::{DataFrame, Expr, ExprError, PipeStep, evaluate, resolve_names};

use crate::{resolve_all, single_name};

fn exprs<I, E>(items: I) -> Vec<Expr>
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    items.into_iter().map(Into::into).collect()
}

/// Keep the designated columns. Exclusions are removed from the kept set,
/// or from every column when nothing is included.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    exprs: Vec<Expr>,
}

pub fn select<I, E>(columns: I) -> Select
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Select {
        exprs: exprs(columns),
    }
}

impl PipeStep<DataFrame> for Select {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let mut included = Vec::<String>::new();
        let mut excluded = Vec::<String>::new();
        for expr in &self.exprs {
            match expr {
                Expr::Exclude(inner) => excluded.extend(resolve_names(inner, &frame)?),
                other => {
                    for name in resolve_names(other, &frame)? {
                        if !included.contains(&name) {
                            included.push(name);
                        }
                    }
                }
            }
        }
        if included.is_empty() {
            included = frame.column_names().to_vec();
        }
        included.retain(|name| !excluded.contains(name));
        Ok(frame.select(&included)?)
    }
}

/// Move columns to the front, or next to an anchor column.
#[derive(Debug, Clone, PartialEq)]
pub struct Relocate {
    columns: Vec<Expr>,
    before: Option<Expr>,
    after: Option<Expr>,
}

pub fn relocate<I, E>(columns: I) -> Relocate
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Relocate {
        columns: exprs(columns),
        before: None,
        after: None,
    }
}

impl Relocate {
    #[must_use]
    pub fn before(mut self, anchor: impl Into<Expr>) -> Self {
        self.before = Some(anchor.into());
        self
    }

    #[must_use]
    pub fn after(mut self, anchor: impl Into<Expr>) -> Self {
        self.after = Some(anchor.into());
        self
    }
}

impl PipeStep<DataFrame> for Relocate {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let moved = resolve_all(&self.columns, &frame)?;
        let rest = frame
            .column_names()
            .iter()
            .filter(|name| !moved.contains(name))
            .cloned()
            .collect::<Vec<_>>();
        let order = place(&frame, moved, rest, self.before.as_ref(), self.after.as_ref())?;
        Ok(frame.select(&order)?)
    }
}

/// Splice `moved` into `rest` at the front, before `before`, or after `after`.
pub(crate) fn place(
    frame: &DataFrame,
    moved: Vec<String>,
    mut rest: Vec<String>,
    before: Option<&Expr>,
    after: Option<&Expr>,
) -> Result<Vec<String>, ExprError> {
    let at = match (before, after) {
        (None, None) => 0,
        (Some(_), Some(_)) => {
            return Err(ExprError::invalid("give either `before` or `after`, not both"));
        }
        (Some(anchor), None) | (None, Some(anchor)) => {
            let name = single_name(anchor, frame)?;
            let idx = rest.iter().position(|other| *other == name).ok_or_else(|| {
                ExprError::invalid(format!("anchor `{name}` is one of the columns being placed"))
            })?;
            if after.is_some() { idx + 1 } else { idx }
        }
    };
    rest.splice(at..at, moved);
    Ok(rest)
}

/// Rename columns, `new = old`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rename {
    mapping: Vec<(String, Expr)>,
}

pub fn rename<I, N, E>(mapping: I) -> Rename
where
    I: IntoIterator<Item = (N, E)>,
    N: Into<String>,
    E: Into<Expr>,
{
    Rename {
        mapping: mapping
            .into_iter()
            .map(|(new, old)| (new.into(), old.into()))
            .collect(),
    }
}

impl PipeStep<DataFrame> for Rename {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let pairs = self
            .mapping
            .iter()
            .map(|(new, old)| Ok((single_name(old, &frame)?, new.clone())))
            .collect::<Result<Vec<_>, ExprError>>()?;
        Ok(frame.rename(&pairs)?)
    }
}

/// Round numeric columns; with no columns given, every numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundColumns {
    columns: Vec<Expr>,
    decimals: i32,
}

pub fn round<I, E>(columns: I) -> RoundColumns
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    RoundColumns {
        columns: exprs(columns),
        decimals: 2,
    }
}

impl RoundColumns {
    #[must_use]
    pub fn decimals(mut self, decimals: i32) -> Self {
        self.decimals = decimals;
        self
    }
}

impl PipeStep<DataFrame> for RoundColumns {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let targets = if self.columns.is_empty() {
            frame
                .iter()
                .filter(|(_, column)| column.dtype().is_numeric())
                .map(|(name, _)| name.to_owned())
                .collect()
        } else {
            resolve_all(&self.columns, &frame)?
        };
        let mut out = frame;
        for name in targets {
            let rounded = out.column_or_err(&name)?.round(self.decimals)?;
            out = out.with_column(name, rounded)?;
        }
        Ok(out)
    }
}

/// Extract one column's data; the last column when none is named.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pull {
    expr: Option<Expr>,
}

pub fn pull(expr: impl Into<Expr>) -> Pull {
    Pull {
        expr: Some(expr.into()),
    }
}

impl PipeStep<DataFrame> for Pull {
    type Output = Column;

    fn apply(self, frame: DataFrame) -> Result<Column, ExprError> {
        match self.expr {
            Some(expr) => evaluate(&expr, &frame)?.into_column(frame.nrows()),
            None => frame
                .into_columns()
                .pop()
                .map(|(_, column)| column)
                .ok_or_else(|| ExprError::invalid("cannot pull from a table with no columns")),
        }
    }
}
