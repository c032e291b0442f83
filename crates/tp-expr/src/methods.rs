use std::collections::BTreeMap;

use tp_columnar::{Column, ContainsOptions, DateField, Reducer};
use tp_types::{DType, Scalar};

use crate::ExprError;
use crate::eval::{AccessorView, Namespace, Value, collapse};

/// Positional and named arguments of one chain link, already evaluated.
struct Args<'a> {
    positional: &'a [Value],
    named: &'a BTreeMap<String, Scalar>,
}

impl Args<'_> {
    /// Argument at `index`, or the keyword `key` when not given positionally.
    fn scalar(&self, index: usize, key: &str) -> Result<Option<Scalar>, ExprError> {
        match self.positional.get(index) {
            Some(Value::Scalar(value)) => Ok(Some(value.clone())),
            Some(other) => Err(ExprError::invalid(format!(
                "argument `{key}` must be a single value, got {other}"
            ))),
            None => Ok(self.named.get(key).cloned()),
        }
    }

    fn text(&self, index: usize, key: &str) -> Result<Option<String>, ExprError> {
        match self.scalar(index, key)? {
            None | Some(Scalar::Null(_)) => Ok(None),
            Some(Scalar::Utf8(text)) => Ok(Some(text)),
            Some(other) => Err(ExprError::invalid(format!(
                "argument `{key}` must be text, got `{other}`"
            ))),
        }
    }

    fn required_text(&self, index: usize, key: &str) -> Result<String, ExprError> {
        self.text(index, key)?
            .ok_or_else(|| ExprError::invalid(format!("missing argument `{key}`")))
    }

    fn int(&self, index: usize, key: &str) -> Result<Option<i64>, ExprError> {
        match self.scalar(index, key)? {
            None | Some(Scalar::Null(_)) => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| {
                ExprError::invalid(format!("argument `{key}` must be an integer, got `{value}`"))
            }),
        }
    }

    fn flag(&self, index: usize, key: &str, default: bool) -> Result<bool, ExprError> {
        match self.scalar(index, key)? {
            None => Ok(default),
            Some(Scalar::Bool(flag)) => Ok(flag),
            Some(other) => Err(ExprError::invalid(format!(
                "argument `{key}` must be a bool, got `{other}`"
            ))),
        }
    }

    /// Every positional argument as a scalar, for variadic methods like `isin`.
    fn all_scalars(&self) -> Result<Vec<Scalar>, ExprError> {
        self.positional
            .iter()
            .map(|value| match value {
                Value::Scalar(value) => Ok(value.clone()),
                Value::Column(column) => Err(ExprError::invalid(format!(
                    "expected single values, got a column of {}",
                    column.len()
                ))),
                other => Err(ExprError::invalid(format!("expected single values, got {other}"))),
            })
            .collect()
    }
}

/// Apply chain link `name` to the value its parent produced.
pub(crate) fn apply_method(
    value: Value,
    name: &str,
    positional: &[Value],
    named: &BTreeMap<String, Scalar>,
) -> Result<Value, ExprError> {
    let args = Args { positional, named };
    match value {
        Value::Column(column) => series_method(&column, name, &args),
        Value::Scalar(scalar) => {
            let column = Column::full(scalar, 1)?;
            Ok(match series_method(&column, name, &args)? {
                Value::Column(out) => collapse(out),
                other => other,
            })
        }
        Value::Accessor(view) => {
            let lifted = view.lifted;
            let out = accessor_method(&view, name, &args)?;
            Ok(match out {
                Value::Column(column) if lifted => collapse(column),
                other => other,
            })
        }
        other => Err(ExprError::invalid(format!(
            "method `{name}` cannot be applied to column names `{other}`"
        ))),
    }
}

fn series_method(column: &Column, name: &str, args: &Args<'_>) -> Result<Value, ExprError> {
    if let Some(reducer) = Reducer::parse(name) {
        return Ok(Value::Scalar(column.reduce(reducer)?));
    }

    let out = match name {
        "abs" => column.abs()?,
        "round" => {
            let decimals = args.int(0, "decimals")?.unwrap_or(0);
            let decimals = i32::try_from(decimals)
                .map_err(|_| ExprError::invalid(format!("decimals {decimals} out of range")))?;
            column.round(decimals)?
        }
        "fillna" => match args.positional.first() {
            Some(Value::Column(fill)) => fill_from(column, fill)?,
            _ => {
                let fill = args
                    .scalar(0, "value")?
                    .ok_or_else(|| ExprError::invalid("fillna needs a value"))?;
                column.fill_missing(&fill)?
            }
        },
        "isna" | "isnull" => column.is_missing_mask()?,
        "notna" | "notnull" => column.not_missing_mask()?,
        "isin" | "is_in" => column.is_in(&args.all_scalars()?)?,
        "not_in" => column.is_in(&args.all_scalars()?)?.not()?,
        "not_like" => {
            let pattern = args.required_text(0, "pattern")?;
            column
                .str_contains(&pattern, &ContainsOptions::default())?
                .not()?
        }
        "na_if" => {
            let hits = column.is_in(&args.all_scalars()?)?.to_mask()?;
            let values = column
                .values()
                .iter()
                .zip(hits)
                .map(|(value, hit)| {
                    if hit {
                        Scalar::missing_for_dtype(column.dtype())
                    } else {
                        value.clone()
                    }
                })
                .collect();
            Column::new(column.dtype(), values)?
        }
        "astype" => {
            let dtype_name = args.required_text(0, "dtype")?;
            let dtype = DType::parse(&dtype_name)
                .ok_or_else(|| ExprError::invalid(format!("unknown dtype `{dtype_name}`")))?;
            column.astype(dtype)?
        }
        "cumsum" => column.cumsum()?,
        "shift" => column.shift(args.int(0, "periods")?.unwrap_or(1))?,
        "between" => {
            let left = args
                .scalar(0, "left")?
                .ok_or_else(|| ExprError::invalid("between needs `left`"))?;
            let right = args
                .scalar(1, "right")?
                .ok_or_else(|| ExprError::invalid("between needs `right`"))?;
            column.between(&left, &right)?
        }
        "clip" => {
            let bound = |index: usize, key: &str| -> Result<Option<Scalar>, ExprError> {
                Ok(args.scalar(index, key)?.filter(|value| !value.is_missing()))
            };
            let lower = bound(0, "lower")?;
            let upper = bound(1, "upper")?;
            column.clip(lower.as_ref(), upper.as_ref())?
        }
        "copy" => column.clone(),
        other => return Err(ExprError::unsupported(other, column.dtype())),
    };
    Ok(Value::Column(out))
}

fn fill_from(column: &Column, fill: &Column) -> Result<Column, ExprError> {
    if fill.len() != column.len() {
        return Err(ExprError::LengthMismatch {
            expected: column.len(),
            actual: fill.len(),
        });
    }
    let values = column
        .values()
        .iter()
        .zip(fill.values())
        .map(|(value, fill)| {
            if value.is_missing() {
                fill.clone()
            } else {
                value.clone()
            }
        })
        .collect();
    Ok(Column::from_values(values)?)
}

fn accessor_method(view: &AccessorView, name: &str, args: &Args<'_>) -> Result<Value, ExprError> {
    let column = &view.column;
    let out = match view.namespace {
        Namespace::Str => match name {
            "lower" => column.str_lower()?,
            "upper" => column.str_upper()?,
            "title" => column.str_title()?,
            "capitalize" => column.str_capitalize()?,
            "casefold" => column.str_casefold()?,
            "strip" => column.str_strip(args.text(0, "to_strip")?.as_deref())?,
            "lstrip" => column.str_lstrip(args.text(0, "to_strip")?.as_deref())?,
            "rstrip" => column.str_rstrip(args.text(0, "to_strip")?.as_deref())?,
            "len" => column.str_len()?,
            "contains" => {
                let pattern = args.required_text(0, "pat")?;
                let options = ContainsOptions {
                    case: args.flag(1, "case", true)?,
                    regex: args.flag(3, "regex", true)?,
                    na: match args.scalar(2, "na")? {
                        Some(Scalar::Bool(fill)) => Some(fill),
                        _ => None,
                    },
                };
                column.str_contains(&pattern, &options)?
            }
            "startswith" => column.str_startswith(&args.required_text(0, "pat")?)?,
            "endswith" => column.str_endswith(&args.required_text(0, "pat")?)?,
            "replace" => column.str_replace(
                &args.required_text(0, "pat")?,
                &args.required_text(1, "repl")?,
                args.flag(2, "regex", false)?,
            )?,
            "slice" => column.str_slice(args.int(0, "start")?, args.int(1, "stop")?)?,
            "zfill" => {
                let width = args
                    .int(0, "width")?
                    .ok_or_else(|| ExprError::invalid("zfill needs `width`"))?;
                column.str_zfill(usize::try_from(width).unwrap_or(0))?
            }
            other => return Err(ExprError::unsupported(format!("str.{other}"), column.dtype())),
        },
        Namespace::Dt => match name {
            "date" => column.dt_date()?,
            "strftime" => column.dt_strftime(&args.required_text(0, "date_format")?)?,
            other => match DateField::parse(other) {
                Some(field) => column.dt_field(field)?,
                None => {
                    return Err(ExprError::unsupported(format!("dt.{other}"), column.dtype()));
                }
            },
        },
        Namespace::Cat => match name {
            "codes" => column.cat_codes()?,
            "categories" => {
                let categories = column
                    .cat_categories()?
                    .into_iter()
                    .map(Scalar::Utf8)
                    .collect();
                Column::new(DType::Utf8, categories)?
            }
            other => return Err(ExprError::unsupported(format!("cat.{other}"), column.dtype())),
        },
    };
    Ok(Value::Column(out))
}

#[cfg(test)]
mod tests {
    use tp_frame::DataFrame;
    use tp_types::{DType, NullKind, Scalar};

    use crate::{ExprError, Value, col, evaluate};

    fn people() -> DataFrame {
        DataFrame::from_rows(
            &[("name", DType::Utf8), ("age", DType::Int64), ("joined", DType::Utf8)],
            vec![
                vec!["Ana Lu".into(), 31.into(), "2021-03-04".into()],
                vec![" bo ".into(), Scalar::Null(NullKind::Null), "2019-12-30".into()],
                vec![Scalar::Null(NullKind::Null), 45.into(), "bad".into()],
            ],
        )
        .expect("frame")
    }

    fn values(value: Value) -> Vec<Scalar> {
        match value {
            Value::Column(column) => column.into_values(),
            other => panic!("expected column, got {other:?}"),
        }
    }

    #[test]
    fn string_methods_pass_through_the_accessor() {
        let df = people();
        let out = values(evaluate(&col("name").str_().strip().str_().len(), &df).expect("len"));
        assert_eq!(
            out,
            vec![Scalar::Int64(6), Scalar::Int64(2), Scalar::Null(NullKind::Null)]
        );

        let expr = col("name").str_().contains("ana").kwarg("case", false).kwarg("na", false);
        let out = values(evaluate(&expr, &df).expect("contains"));
        assert_eq!(
            out,
            vec![Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(false)]
        );
    }

    #[test]
    fn astype_then_dt_fields() {
        let df = people();
        let expr = col("joined").astype("datetime64").dt().year();
        let out = values(evaluate(&expr, &df).expect("year"));
        assert_eq!(
            out,
            vec![Scalar::Int64(2021), Scalar::Int64(2019), Scalar::Null(NullKind::Null)]
        );
    }

    #[test]
    fn membership_helpers() {
        let df = people();
        let out = values(evaluate(&col("age").is_in([31, 45]), &df).expect("isin"));
        assert_eq!(
            out,
            vec![Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(true)]
        );
        let out = values(evaluate(&col("age").not_in([31]), &df).expect("not_in"));
        assert_eq!(
            out,
            vec![Scalar::Bool(false), Scalar::Bool(true), Scalar::Bool(true)]
        );
    }

    #[test]
    fn na_if_blanks_sentinel_values() {
        let df = people();
        let out = values(evaluate(&col("joined").na_if(["bad", "N/A"]), &df).expect("na_if"));
        assert_eq!(out[0], Scalar::Utf8("2021-03-04".into()));
        assert!(out[2].is_missing());
    }

    #[test]
    fn fillna_accepts_values_and_columns() {
        let df = people();
        let out = values(evaluate(&col("age").fillna(0), &df).expect("fillna"));
        assert_eq!(out[1], Scalar::Int64(0));
        let out = values(evaluate(&col("name").fillna(col("joined")), &df).expect("fillna"));
        assert_eq!(out[2], Scalar::Utf8("bad".into()));
    }

    #[test]
    fn reducer_followed_by_transform_stays_scalar() {
        let df = people();
        let out = evaluate(&col("age").mean().round(1), &df).expect("mean");
        assert_eq!(out, Value::Scalar(Scalar::Float64(38.0)));
        let out = evaluate(&col("name").count(), &df).expect("count");
        assert_eq!(out, Value::Scalar(Scalar::Int64(2)));
    }

    #[test]
    fn unknown_accessor_method() {
        let err = evaluate(&col("name").str_().attr("explode"), &people()).expect_err("unknown");
        assert_eq!(
            err,
            ExprError::UnsupportedOperation {
                op: "str.explode".into(),
                operand: "str".into()
            }
        );
    }

    #[test]
    fn bad_dtype_name_is_invalid() {
        let err = evaluate(&col("age").astype("complex"), &people()).expect_err("dtype");
        assert!(matches!(err, ExprError::InvalidSpecification(_)));
    }
}
