//! `unite` and `separate`: joining columns into one text column and back.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tp_columnar::Column;
use tp_expr::{DataFrame, Expr, ExprError, PipeStep};
use tp_types::{DType, NullKind, Scalar};

use crate::{resolve_all, single_name};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniteOptions {
    pub sep: String,
    /// Remove the source columns.
    pub drop: bool,
}

impl Default for UniteOptions {
    fn default() -> Self {
        Self {
            sep: "_".to_owned(),
            drop: true,
        }
    }
}

/// Paste columns together as text. Missing cells contribute an empty string.
#[derive(Debug, Clone, PartialEq)]
pub struct Unite {
    name: String,
    columns: Vec<Expr>,
    options: UniteOptions,
}

pub fn unite<I, E>(name: impl Into<String>, columns: I) -> Unite
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Unite {
        name: name.into(),
        columns: columns.into_iter().map(Into::into).collect(),
        options: UniteOptions::default(),
    }
}

impl Unite {
    #[must_use]
    pub fn sep(mut self, sep: impl Into<String>) -> Self {
        self.options.sep = sep.into();
        self
    }

    #[must_use]
    pub fn drop(mut self, drop: bool) -> Self {
        self.options.drop = drop;
        self
    }
}

impl PipeStep<DataFrame> for Unite {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let sources = resolve_all(&self.columns, &frame)?;
        let columns = sources
            .iter()
            .map(|name| frame.column_or_err(name))
            .collect::<Result<Vec<_>, _>>()?;
        let values = (0..frame.nrows())
            .map(|row| {
                let pieces = columns
                    .iter()
                    .map(|column| match &column.values()[row] {
                        value if value.is_missing() => String::new(),
                        value => value.to_string(),
                    })
                    .collect::<Vec<_>>();
                Scalar::Utf8(pieces.join(&self.options.sep))
            })
            .collect::<Vec<_>>();
        let united = Column::new(DType::Utf8, values)?;
        let out = if self.options.drop {
            frame.drop_columns(&sources)?
        } else {
            frame
        };
        Ok(out.with_column(self.name, united)?)
    }
}

/// What `separate` does with rows that split into fewer pieces than requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fill {
    /// Pad missing values after the pieces.
    #[default]
    Right,
    /// Pad missing values before the pieces.
    Left,
    Error,
}

impl Fill {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "right" => Some(Self::Right),
            "left" => Some(Self::Left),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparateOptions {
    /// Treat the separator as a regular expression.
    pub regex: bool,
    pub drop: bool,
    pub fill: Fill,
}

impl Default for SeparateOptions {
    fn default() -> Self {
        Self {
            regex: false,
            drop: true,
            fill: Fill::Right,
        }
    }
}

/// Split one text column into several. Pieces beyond the requested names are discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Separate {
    column: Expr,
    into: Vec<String>,
    sep: String,
    options: SeparateOptions,
}

pub fn separate<I, S>(column: impl Into<Expr>, into: I, sep: impl Into<String>) -> Separate
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Separate {
        column: column.into(),
        into: into.into_iter().map(Into::into).collect(),
        sep: sep.into(),
        options: SeparateOptions::default(),
    }
}

impl Separate {
    #[must_use]
    pub fn regex(mut self) -> Self {
        self.options.regex = true;
        self
    }

    #[must_use]
    pub fn drop(mut self, drop: bool) -> Self {
        self.options.drop = drop;
        self
    }

    #[must_use]
    pub fn fill(mut self, fill: Fill) -> Self {
        self.options.fill = fill;
        self
    }
}

fn split_rows(
    column: &Column,
    sep: &str,
    regex: bool,
) -> Result<Vec<Option<Vec<String>>>, ExprError> {
    if !regex {
        return Ok(column.str_split(sep)?);
    }
    if !(column.dtype().is_text_like() || column.dtype() == DType::Null) {
        return Err(ExprError::unsupported("str.split", column.dtype()));
    }
    let pattern = Regex::new(sep)
        .map_err(|err| ExprError::invalid(format!("invalid separator pattern `{sep}`: {err}")))?;
    Ok(column
        .values()
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(|text| pattern.split(text).map(str::to_owned).collect())
        })
        .collect())
}

impl PipeStep<DataFrame> for Separate {
    type Output = DataFrame;

    fn apply(self, frame: DataFrame) -> Result<DataFrame, ExprError> {
        let source = single_name(&self.column, &frame)?;
        let width = self.into.len();
        if width == 0 {
            return Err(ExprError::invalid("separate needs at least one output column"));
        }
        let rows = split_rows(frame.column_or_err(&source)?, &self.sep, self.options.regex)?;

        #[cfg(feature = "tracing")]
        {
            let widest = rows.iter().flatten().map(Vec::len).max().unwrap_or(0);
            if widest > width {
                tracing::warn!(
                    column = %source,
                    pieces = widest,
                    requested = width,
                    "separate discards extra pieces"
                );
            }
        }

        let mut buffers = vec![Vec::with_capacity(rows.len()); width];
        for (row, pieces) in rows.into_iter().enumerate() {
            let Some(mut pieces) = pieces else {
                for buffer in &mut buffers {
                    buffer.push(Scalar::Null(NullKind::Null));
                }
                continue;
            };
            let found = pieces.len();
            pieces.truncate(width);
            let mut cells = pieces.into_iter().map(Scalar::Utf8).collect::<Vec<_>>();
            if found < width {
                let gap = vec![Scalar::Null(NullKind::Null); width - found];
                match self.options.fill {
                    Fill::Right => cells.extend(gap),
                    Fill::Left => cells = gap.into_iter().chain(cells).collect(),
                    Fill::Error => {
                        return Err(ExprError::invalid(format!(
                            "row {row} of `{source}` splits into {found} pieces, expected {width}"
                        )));
                    }
                }
            }
            for (buffer, cell) in buffers.iter_mut().zip(cells) {
                buffer.push(cell);
            }
        }

        let position = frame.column_index(&source).unwrap_or(frame.ncols());
        let (mut out, at) = if self.options.drop {
            (frame.drop_columns(&[source.as_str()])?, position)
        } else {
            (frame, position + 1)
        };
        for (offset, (name, values)) in self.into.into_iter().zip(buffers).enumerate() {
            out = out.insert_column(at + offset, name, Column::new(DType::Utf8, values)?)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use tp_expr::{ExprError, col, pipe};
    use tp_frame::DataFrame;
    use tp_types::Scalar;

    use super::{Fill, SeparateOptions, UniteOptions, separate, unite};
    use crate::fixtures::{penguins, strings};

    fn codes() -> DataFrame {
        DataFrame::from_values(vec![
            ("id", vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(3)]),
            (
                "code",
                vec!["a-b-c".into(), "d-e".into(), Scalar::Null(tp_types::NullKind::Null)],
            ),
        ])
        .expect("codes")
    }

    #[test]
    fn unite_pastes_and_drops_sources() {
        let out = pipe(penguins(), unite("where", ["species", "island"]).sep("/")).expect("unite");
        assert_eq!(out.column_names().last().map(String::as_str), Some("where"));
        assert!(!out.contains("species"));
        assert_eq!(strings(&out, "where")[0], "Adelie/Torgersen");

        let out = pipe(
            penguins(),
            unite("depth_mass", [col("bill_depth") | col("mass")]).drop(false),
        )
        .expect("unite keep");
        assert_eq!(out.ncols(), 6);
        assert_eq!(strings(&out, "depth_mass")[2], "_4500");
        assert_eq!(strings(&out, "depth_mass")[4], "16.3_");
    }

    #[test]
    fn separate_fills_short_rows_on_the_right() {
        let out = pipe(codes(), separate("code", ["x", "y"], "-")).expect("separate");
        assert_eq!(out.column_names(), &["id", "x", "y"]);
        assert_eq!(strings(&out, "x"), vec!["a", "d", "None"]);
        assert_eq!(strings(&out, "y"), vec!["b", "e", "None"]);

        let out = pipe(codes(), separate("code", ["x", "y", "z"], "-").fill(Fill::Left).drop(false))
            .expect("left fill");
        assert_eq!(out.column_names(), &["id", "code", "x", "y", "z"]);
        assert_eq!(strings(&out, "x"), vec!["a", "None", "None"]);
        assert_eq!(strings(&out, "z"), vec!["c", "e", "None"]);
    }

    #[test]
    fn separate_with_regex_and_strict_fill() {
        let frame = DataFrame::from_values(vec![("when", vec!["2024-01/05".into()])])
            .expect("frame");
        let out = pipe(frame, separate("when", ["y", "m", "d"], "[-/]").regex()).expect("regex");
        assert_eq!(strings(&out, "d"), vec!["05"]);

        let err = pipe(codes(), separate("code", ["x", "y", "z"], "-").fill(Fill::Error))
            .expect_err("strict");
        assert!(matches!(err, ExprError::InvalidSpecification(_)));

        let err = pipe(codes(), separate("id", ["x"], "-")).expect_err("not text");
        assert!(matches!(err, ExprError::UnsupportedOperation { .. }));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: SeparateOptions =
            serde_json::from_str(r#"{"fill": "left"}"#).expect("separate options");
        assert_eq!(options.fill, Fill::Left);
        assert!(options.drop);
        assert!(!options.regex);

        let options: UniteOptions =
            serde_json::from_str(r#"{"drop": false}"#).expect("unite options");
        assert_eq!(options.sep, "_");
        assert_eq!(Fill::parse("error"), Some(Fill::Error));
    }
}
