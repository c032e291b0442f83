//! Adding and replacing columns.

use std::fmt;
use std::sync::Arc;

use tp_columnar::Column;
use tp_expr::{DataFrame, Expr, ExprError, Operand, PipeStep, col, evaluate};
use tp_types::Scalar;

use crate::columns::place;
use crate::resolve_all;

type Transform = Arc<dyn Fn(Expr) -> Expr + Send + Sync>;

/// One expression builder applied to each of a set of columns.
#[derive(Clone)]
pub struct Across {
    columns: Vec<Expr>,
    transform: Transform,
    names: Option<String>,
}

impl fmt::Debug for Across {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Across")
            .field("columns", &self.columns)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

/// `transform` receives a reference to each selected column and returns its replacement.
pub fn across<I, E, F>(columns: I, transform: F) -> Across
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
    F: Fn(Expr) -> Expr + Send + Sync + 'static,
{
    Across {
        columns: columns.into_iter().map(Into::into).collect(),
        transform: Arc::new(transform),
        names: None,
    }
}

impl Across {
    /// Output name template, `{col}` standing for the source column.
    /// Without one, the source columns are overwritten.
    #[must_use]
    pub fn names(mut self, template: impl Into<String>) -> Self {
        self.names = Some(template.into());
        self
    }

    fn expand(&self, frame: &DataFrame) -> Result<Vec<(String, Operand)>, ExprError> {
        Ok(resolve_all(&self.columns, frame)?
            .into_iter()
            .map(|name| {
                let value = Operand::from((self.transform)(col(name.as_str())));
                let output = match &self.names {
                    Some(template) => template.replace("{col}", &name),
                    None => name,
                };
                (output, value)
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub enum Assignment {
    /// Evaluated against the table as it stands after earlier assignments.
    Expr { name: String, value: Operand },
    /// Literal row values; the length must match the table.
    Values { name: String, values: Vec<Scalar> },
    Across(Across),
}

/// Where new columns land. Both unset leaves them in place or at the end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutateOptions {
    pub before: Option<Expr>,
    pub after: Option<Expr>,
}

#[derive(Debug, Clone, Default)]
pub struct Mutate {
    assignments: Vec<Assignment>,
    options: MutateOptions,
}

pub fn mutate<I, N, V>(assignments: I) -> Mutate
where
    I: IntoIterator<Item = (N, V)>,
    N: Into<String>,
    V: Into<Operand>,
{
    Mutate {
        assignments: assignments
            .into_iter()
            .map(|(name, value)| Assignment::Expr {
                name: name.into(),
                value: value.into(),
            })
            .collect(),
        options: MutateOptions::default(),
    }
}

impl Mutate {
    #[must_use]
    pub fn values<V: Into<Scalar>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.assignments.push(Assignment::Values {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    #[must_use]
    pub fn across(mut self, across: Across) -> Self {
        self.assignments.push(Assignment::Across(across));
        self
    }

    #[must_use]
    pub fn before(mut self, anchor: impl Into<Expr>) -> Self {
        self.options.before = Some(anchor.into());
        self
    }

    #[must_use]
    pub fn after(mut self, anchor: impl Into<Expr>) -> Self {
        self.options.after = Some(anchor.into());
        self
    }

    #[must_use]
    pub fn options(mut self, options: MutateOptions) -> Self {
        self.options = options;
        self
    }
}

enum Pending {
    Operand(Operand),
    Values(Vec<Scalar>),
}

impl PipeStep<DataFrame> for Mutate {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        // `across` sees the input columns, not ones added earlier in the same call.
        let mut pending = Vec::new();
        for assignment in self.assignments {
            match assignment {
                Assignment::Expr { name, value } => pending.push((name, Pending::Operand(value))),
                Assignment::Values { name, values } => {
                    pending.push((name, Pending::Values(values)))
                }
                Assignment::Across(across) => pending.extend(
                    across
                        .expand(&frame)?
                        .into_iter()
                        .map(|(name, value)| (name, Pending::Operand(value))),
                ),
            }
        }

        let mut out = frame;
        let mut assigned = Vec::<String>::new();
        for (name, step) in pending {
            #[cfg(feature = "tracing")]
            tracing::debug!(column = %name, "mutate assignment");

            let nrows = out.nrows();
            let column = match step {
                Pending::Operand(Operand::Literal(value)) => Column::full(value, nrows)?,
                Pending::Operand(Operand::Node(expr)) => evaluate(&expr, &out)?.into_column(nrows)?,
                Pending::Values(values) => Column::from_values(values)?,
            };
            if out.ncols() > 0 && column.len() != nrows {
                return Err(ExprError::LengthMismatch {
                    expected: nrows,
                    actual: column.len(),
                });
            }
            out = out.with_column(name.as_str(), column)?;
            if !assigned.contains(&name) {
                assigned.push(name);
            }
        }

        let MutateOptions { before, after } = self.options;
        if before.is_none() && after.is_none() {
            return Ok(out);
        }
        let rest = out
            .column_names()
            .iter()
            .filter(|name| !assigned.contains(name))
            .cloned()
            .collect::<Vec<_>>();
        let order = place(&out, assigned, rest, before.as_ref(), after.as_ref())?;
        Ok(out.select(&order)?)
    }
}
