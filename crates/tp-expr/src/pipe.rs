use std::collections::BTreeMap;
use std::ops::Shr;

use serde::{Deserialize, Serialize};
use tp_frame::DataFrame;
use tp_types::Scalar;

use crate::ExprError;

/// A table method named now and invoked later, when a table is piped in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    name: String,
    #[serde(default)]
    args: Vec<Scalar>,
    #[serde(default)]
    kwargs: BTreeMap<String, Scalar>,
}

impl MethodCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<Scalar>) -> Self {
        self.args.push(value.into());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn args(&self) -> &[Scalar] {
        &self.args
    }

    #[must_use]
    pub fn kwargs(&self) -> &BTreeMap<String, Scalar> {
        &self.kwargs
    }
}

/// One stage of a pipeline.
pub trait PipeStep<In> {
    type Output;

    fn apply(self, input: In) -> Result<Self::Output, ExprError>;
}

impl<In, Out, F> PipeStep<In> for F
where
    F: FnOnce(In) -> Result<Out, ExprError>,
{
    type Output = Out;

    fn apply(self, input: In) -> Result<Out, ExprError> {
        self(input)
    }
}

impl PipeStep<DataFrame> for MethodCall {
    type Output = DataFrame;

    fn apply(self, input: DataFrame) -> Result<DataFrame, ExprError> {
        #[cfg(feature = "tracing")]
        tracing::debug!(method = %self.name, "pipe deferred method call");
        Ok(input.call_method(&self.name, &self.args, &self.kwargs)?)
    }
}

/// Feed `input` to `step`.
pub fn pipe<In, S: PipeStep<In>>(input: In, step: S) -> Result<S::Output, ExprError> {
    step.apply(input)
}

/// Result of a `>>` pipeline. Once a step fails the remaining steps are skipped.
///
/// `DataFrame >> step` works for method tokens and verbs; closures need the
/// pipeline started explicitly with [`Piped::new`].
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a pipeline does nothing until its result is inspected with `finish`"]
pub struct Piped<T>(Result<T, ExprError>);

impl<T> Piped<T> {
    pub fn new(input: T) -> Self {
        Self(Ok(input))
    }

    pub fn finish(self) -> Result<T, ExprError> {
        self.0
    }
}

impl<T> From<Result<T, ExprError>> for Piped<T> {
    fn from(result: Result<T, ExprError>) -> Self {
        Self(result)
    }
}

impl Shr<MethodCall> for DataFrame {
    type Output = Piped<DataFrame>;

    fn shr(self, step: MethodCall) -> Piped<DataFrame> {
        Piped(pipe(self, step))
    }
}

impl<T, S: PipeStep<T>> Shr<S> for Piped<T> {
    type Output = Piped<S::Output>;

    fn shr(self, step: S) -> Piped<S::Output> {
        #[cfg(feature = "tracing")]
        if self.0.is_err() {
            tracing::debug!("skipping pipe step after an earlier failure");
        }
        Piped(self.0.and_then(|input| pipe(input, step)))
    }
}

#[cfg(test)]
mod tests {
    use tp_frame::DataFrame;
    use tp_types::Scalar;

    use super::{MethodCall, Piped, pipe};
    use crate::{ExprError, Symbolic, col, evaluate_mask};

    fn numbers() -> DataFrame {
        DataFrame::from_values(vec![(
            "n",
            (1..=8).map(Scalar::Int64).collect::<Vec<_>>(),
        )])
        .expect("frame")
    }

    #[test]
    fn method_tokens_dispatch_to_the_table() {
        let out = pipe(numbers(), Symbolic.method("head").arg(3)).expect("head");
        assert_eq!(out.nrows(), 3);
        let out = pipe(numbers(), Symbolic.method("tail")).expect("tail");
        assert_eq!(out.nrows(), 5);
        assert_eq!(
            out.column("n").expect("n").values()[0],
            Scalar::Int64(4)
        );
    }

    #[test]
    fn keyword_arguments_reach_the_method() {
        let out = pipe(
            numbers(),
            MethodCall::new("sort_values").arg("n").kwarg("ascending", false),
        )
        .expect("sort");
        assert_eq!(out.column("n").expect("n").values()[0], Scalar::Int64(8));
    }

    #[test]
    fn unknown_method_names_are_unsupported() {
        let err = pipe(numbers(), Symbolic.method("explode")).expect_err("unknown");
        assert_eq!(
            err,
            ExprError::UnsupportedOperation {
                op: "explode".into(),
                operand: "DataFrame".into()
            }
        );
    }

    #[test]
    fn closures_are_steps() {
        let keep_even = |df: DataFrame| -> Result<DataFrame, ExprError> {
            let mask = evaluate_mask(&(col("n") % 2).eq(0), &df)?;
            Ok(df.filter_mask(&mask)?)
        };
        let out = (Piped::new(numbers()) >> keep_even >> Symbolic.method("head").arg(2))
            .finish()
            .expect("pipeline");
        assert_eq!(
            out.column("n").expect("n").values(),
            &[Scalar::Int64(2), Scalar::Int64(4)]
        );
    }

    #[test]
    fn failures_short_circuit() {
        let mut reached = false;
        let result = (numbers()
            >> Symbolic.method("nope")
            >> |df: DataFrame| -> Result<DataFrame, ExprError> {
                reached = true;
                Ok(df)
            })
        .finish();
        assert!(matches!(result, Err(ExprError::UnsupportedOperation { .. })));
        assert!(!reached);
    }

    #[test]
    fn closures_may_change_the_carried_type() {
        let count = |df: DataFrame| -> Result<usize, ExprError> { Ok(df.nrows()) };
        assert_eq!(pipe(numbers(), count).expect("count"), 8);
    }
}
