use std::collections::BTreeMap;
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Rem, Sub};

use serde::{Deserialize, Serialize};
use tp_columnar::{ArithmeticOp, ComparisonOp, LogicalOp, Reducer};
use tp_types::Scalar;

use crate::pipe::MethodCall;
use crate::selector::Selector;

/// Chain link names that open an accessor namespace instead of calling a method.
pub(crate) const ACCESSORS: [&str; 3] = ["str", "dt", "cat"];

/// An unresolved, table-independent handle to a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    name: String,
    #[serde(default)]
    descending: bool,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_descending(&self) -> bool {
        self.descending
    }

    /// The same reference with its sort direction flipped.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            name: self.name.clone(),
            descending: !self.descending,
        }
    }
}

/// Right-hand side of an operator: a literal or another expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Operand {
    Literal(Scalar),
    Node(Box<Expr>),
}

impl Operand {
    #[must_use]
    pub fn as_node(&self) -> Option<&Expr> {
        match self {
            Self::Node(expr) => Some(expr),
            Self::Literal(_) => None,
        }
    }

    #[must_use]
    pub fn as_literal(&self) -> Option<&Scalar> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Node(_) => None,
        }
    }
}

impl From<Expr> for Operand {
    fn from(expr: Expr) -> Self {
        Self::Node(Box::new(expr))
    }
}

impl From<&Expr> for Operand {
    fn from(expr: &Expr) -> Self {
        Self::Node(Box::new(expr.clone()))
    }
}

impl From<Scalar> for Operand {
    fn from(value: Scalar) -> Self {
        Self::Literal(value)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Self::Literal(Scalar::from(value))
                }
            }
        )*
    };
}

literal_operand!(bool, i32, i64, f64, &str, String);

/// One method-style link in a chain: `parent.name(args, kwargs)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedCall {
    parent: Box<Expr>,
    name: String,
    #[serde(default)]
    args: Vec<Operand>,
    #[serde(default)]
    kwargs: BTreeMap<String, Scalar>,
}

impl ChainedCall {
    #[must_use]
    pub fn parent(&self) -> &Expr {
        &self.parent
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn args(&self) -> &[Operand] {
        &self.args
    }

    #[must_use]
    pub fn kwargs(&self) -> &BTreeMap<String, Scalar> {
        &self.kwargs
    }

    #[must_use]
    pub fn is_accessor(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty() && ACCESSORS.contains(&self.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub condition: Expr,
    pub value: Operand,
}

/// A deferred computation over the columns of a not-yet-supplied table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expr {
    Column(ColumnRef),
    Compare {
        left: Box<Expr>,
        op: ComparisonOp,
        right: Operand,
    },
    Arith {
        left: Operand,
        op: ArithmeticOp,
        right: Operand,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    /// Element-wise boolean negation.
    Not(Box<Expr>),
    Chain(ChainedCall),
    /// Inclusive positional span of columns, resolved against the current column order.
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    Exclude(Box<Expr>),
    Select(Selector),
    /// Overlay of `(condition, value)` branches onto `default`; later branches win.
    CaseWhen {
        branches: Vec<CaseBranch>,
        default: Operand,
    },
    /// Row mask: any cell's text contains any needle.
    RowContains { needles: Vec<String> },
}

/// Reference a column by name.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(ColumnRef::new(name))
}

/// The symbolic root: every name maps to a fresh column reference, and
/// [`Symbolic::method`] builds deferred calls against whatever table is piped in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Symbolic;

impl Symbolic {
    #[must_use]
    pub fn col(self, name: impl Into<String>) -> Expr {
        col(name)
    }

    #[must_use]
    pub fn method(self, name: impl Into<String>) -> MethodCall {
        MethodCall::new(name)
    }
}

macro_rules! nullary_links {
    ($($(#[$meta:meta])* $fn_name:ident => $link:literal),* $(,)?) => {
        $(
            $(#[$meta])*
            #[must_use]
            pub fn $fn_name(&self) -> Self {
                self.attr($link)
            }
        )*
    };
}

impl Expr {
    #[must_use]
    pub fn column_ref(&self) -> Option<&ColumnRef> {
        match self {
            Self::Column(column) => Some(column),
            _ => None,
        }
    }

    /// Sort direction requested with unary minus; only column references carry one.
    #[must_use]
    pub fn is_descending(&self) -> bool {
        self.column_ref().is_some_and(ColumnRef::is_descending)
    }

    #[must_use]
    pub fn compare(&self, op: ComparisonOp, rhs: impl Into<Operand>) -> Self {
        Self::Compare {
            left: Box::new(self.clone()),
            op,
            right: rhs.into(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn eq(&self, rhs: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Eq, rhs)
    }

    #[must_use]
    pub fn ne(&self, rhs: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Ne, rhs)
    }

    #[must_use]
    pub fn lt(&self, rhs: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Lt, rhs)
    }

    #[must_use]
    pub fn le(&self, rhs: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Le, rhs)
    }

    #[must_use]
    pub fn gt(&self, rhs: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Gt, rhs)
    }

    #[must_use]
    pub fn ge(&self, rhs: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Ge, rhs)
    }

    #[must_use]
    pub fn arith(&self, op: ArithmeticOp, rhs: impl Into<Operand>) -> Self {
        Self::Arith {
            left: Operand::from(self),
            op,
            right: rhs.into(),
        }
    }

    #[must_use]
    pub fn floor_div(&self, rhs: impl Into<Operand>) -> Self {
        self.arith(ArithmeticOp::FloorDiv, rhs)
    }

    #[must_use]
    pub fn pow(&self, rhs: impl Into<Operand>) -> Self {
        self.arith(ArithmeticOp::Pow, rhs)
    }

    #[must_use]
    pub fn and(&self, rhs: impl Into<Expr>) -> Self {
        Self::Logical {
            left: Box::new(self.clone()),
            op: LogicalOp::And,
            right: Box::new(rhs.into()),
        }
    }

    #[must_use]
    pub fn or(&self, rhs: impl Into<Expr>) -> Self {
        Self::Logical {
            left: Box::new(self.clone()),
            op: LogicalOp::Or,
            right: Box::new(rhs.into()),
        }
    }

    /// Element-wise boolean not. Unary `!` means exclusion instead.
    #[must_use]
    pub fn negate(&self) -> Self {
        Self::Not(Box::new(self.clone()))
    }

    /// Inclusive column span from `self` to `end`; same as `self | end`.
    #[must_use]
    pub fn to(&self, end: impl Into<Expr>) -> Self {
        Self::Range {
            start: Box::new(self.clone()),
            end: Box::new(end.into()),
        }
    }

    /// Attribute-style link: an accessor hop or a zero-argument method.
    #[must_use]
    pub fn attr(&self, name: impl Into<String>) -> Self {
        self.call_with(name, Vec::new(), BTreeMap::new())
    }

    #[must_use]
    pub fn call(&self, name: impl Into<String>, args: Vec<Operand>) -> Self {
        self.call_with(name, args, BTreeMap::new())
    }

    #[must_use]
    pub fn call_with(
        &self,
        name: impl Into<String>,
        args: Vec<Operand>,
        kwargs: BTreeMap<String, Scalar>,
    ) -> Self {
        Self::Chain(ChainedCall {
            parent: Box::new(self.clone()),
            name: name.into(),
            args,
            kwargs,
        })
    }

    /// Attach a named argument to the outermost chain link.
    ///
    /// Only method chains take keyword arguments; any other receiver is a
    /// construction error and trips a debug assertion.
    #[must_use]
    pub fn kwarg(&self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        debug_assert!(
            matches!(self, Self::Chain(_)),
            "keyword arguments attach to a method call, not to {self:?}"
        );
        let mut out = self.clone();
        if let Self::Chain(call) = &mut out {
            call.kwargs.insert(key.into(), value.into());
        }
        out
    }

    /// Chain links from the column outward.
    #[must_use]
    pub fn chain_links(&self) -> Vec<&ChainedCall> {
        let mut links = Vec::new();
        let mut current = self;
        while let Self::Chain(call) = current {
            links.push(call);
            current = call.parent();
        }
        links.reverse();
        links
    }

    /// The last reducer in the chain, walking root to leaf.
    #[must_use]
    pub fn aggregation(&self) -> Option<Reducer> {
        self.chain_links()
            .into_iter()
            .filter(|link| !link.is_accessor())
            .filter_map(|link| Reducer::parse(link.name()))
            .last()
    }

    /// Whether evaluation yields one value rather than one per row.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        match self {
            Self::Chain(_) => self.aggregation().is_some(),
            Self::Arith { left, right, .. } => {
                let reduces = |operand: &Operand| operand.as_node().map(Self::is_aggregate);
                match (reduces(left), reduces(right)) {
                    (Some(l), Some(r)) => l && r,
                    (Some(side), None) | (None, Some(side)) => side,
                    (None, None) => true,
                }
            }
            Self::Compare { left, right, .. } => {
                left.is_aggregate() && right.as_node().is_none_or(Self::is_aggregate)
            }
            Self::Logical { left, right, .. } => left.is_aggregate() && right.is_aggregate(),
            Self::Not(inner) => inner.is_aggregate(),
            _ => false,
        }
    }

    #[must_use]
    pub fn str_(&self) -> Self {
        self.attr("str")
    }

    #[must_use]
    pub fn dt(&self) -> Self {
        self.attr("dt")
    }

    #[must_use]
    pub fn cat(&self) -> Self {
        self.attr("cat")
    }

    nullary_links! {
        count => "count",
        sum => "sum",
        mean => "mean",
        min => "min",
        max => "max",
        std => "std",
        var => "var",
        first => "first",
        last => "last",
        median => "median",
        nunique => "nunique",
        abs => "abs",
        /// Boolean mask of missing values.
        isna => "isna",
        notna => "notna",
        cumsum => "cumsum",
        lower => "lower",
        upper => "upper",
        title => "title",
        capitalize => "capitalize",
        casefold => "casefold",
        strip => "strip",
        /// Character count (after `str_()`).
        len => "len",
        year => "year",
        month => "month",
        day => "day",
        hour => "hour",
        minute => "minute",
        second => "second",
        dayofweek => "dayofweek",
        dayofyear => "dayofyear",
        quarter => "quarter",
        date => "date",
        codes => "codes",
        categories => "categories",
    }

    #[must_use]
    pub fn round(&self, decimals: i64) -> Self {
        self.call("round", vec![decimals.into()])
    }

    #[must_use]
    pub fn fillna(&self, value: impl Into<Operand>) -> Self {
        self.call("fillna", vec![value.into()])
    }

    #[must_use]
    pub fn astype(&self, dtype: &str) -> Self {
        self.call("astype", vec![dtype.into()])
    }

    #[must_use]
    pub fn shift(&self, periods: i64) -> Self {
        self.call("shift", vec![periods.into()])
    }

    #[must_use]
    pub fn between(&self, left: impl Into<Scalar>, right: impl Into<Scalar>) -> Self {
        self.call(
            "between",
            vec![Operand::Literal(left.into()), Operand::Literal(right.into())],
        )
    }

    /// Bound values; pass `Scalar::Null` for an open side.
    #[must_use]
    pub fn clip(&self, lower: impl Into<Scalar>, upper: impl Into<Scalar>) -> Self {
        self.call(
            "clip",
            vec![Operand::Literal(lower.into()), Operand::Literal(upper.into())],
        )
    }

    #[must_use]
    pub fn is_in<I, V>(&self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let args = values
            .into_iter()
            .map(|value| Operand::Literal(value.into()))
            .collect();
        self.call("isin", args)
    }

    #[must_use]
    pub fn not_in<I, V>(&self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let args = values
            .into_iter()
            .map(|value| Operand::Literal(value.into()))
            .collect();
        self.call("not_in", args)
    }

    /// Replace any of `values` with the column's missing marker.
    #[must_use]
    pub fn na_if<I, V>(&self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let args = values
            .into_iter()
            .map(|value| Operand::Literal(value.into()))
            .collect();
        self.call("na_if", args)
    }

    /// Rows whose text does not contain `pattern` (a regex).
    #[must_use]
    pub fn not_like(&self, pattern: &str) -> Self {
        self.call("not_like", vec![pattern.into()])
    }

    #[must_use]
    pub fn contains(&self, pattern: &str) -> Self {
        self.call("contains", vec![pattern.into()])
    }

    #[must_use]
    pub fn startswith(&self, prefix: &str) -> Self {
        self.call("startswith", vec![prefix.into()])
    }

    #[must_use]
    pub fn endswith(&self, suffix: &str) -> Self {
        self.call("endswith", vec![suffix.into()])
    }

    #[must_use]
    pub fn replace(&self, pattern: &str, replacement: &str) -> Self {
        self.call("replace", vec![pattern.into(), replacement.into()])
    }

    #[must_use]
    pub fn slice(&self, start: Option<i64>, stop: Option<i64>) -> Self {
        self.call(
            "slice",
            vec![
                Operand::Literal(Scalar::from(start)),
                Operand::Literal(Scalar::from(stop)),
            ],
        )
    }

    #[must_use]
    pub fn zfill(&self, width: i64) -> Self {
        self.call("zfill", vec![width.into()])
    }

    #[must_use]
    pub fn strftime(&self, format: &str) -> Self {
        self.call("strftime", vec![format.into()])
    }
}

impl From<ColumnRef> for Expr {
    fn from(column: ColumnRef) -> Self {
        Self::Column(column)
    }
}

impl From<&Expr> for Expr {
    fn from(expr: &Expr) -> Self {
        expr.clone()
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        col(name)
    }
}

impl From<String> for Expr {
    fn from(name: String) -> Self {
        col(name)
    }
}

macro_rules! arith_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Operand>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::Arith {
                    left: Operand::Node(Box::new(self)),
                    op: $op,
                    right: rhs.into(),
                }
            }
        }

        impl<R: Into<Operand>> $trait<R> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                $trait::$method(self.clone(), rhs)
            }
        }

        arith_operator!(@literal $trait, $method, $op, i32, i64, f64);
    };
    (@literal $trait:ident, $method:ident, $op:expr, $($lit:ty),*) => {
        $(
            impl $trait<Expr> for $lit {
                type Output = Expr;

                fn $method(self, rhs: Expr) -> Expr {
                    Expr::Arith {
                        left: Operand::from(self),
                        op: $op,
                        right: Operand::from(rhs),
                    }
                }
            }
        )*
    };
}

arith_operator!(Add, add, ArithmeticOp::Add);
arith_operator!(Sub, sub, ArithmeticOp::Sub);
arith_operator!(Mul, mul, ArithmeticOp::Mul);
arith_operator!(Div, div, ArithmeticOp::Div);
arith_operator!(Rem, rem, ArithmeticOp::Mod);

/// On a column reference: flip the sort direction. Elsewhere: numeric negation.
impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Column(column) => Expr::Column(column.reversed()),
            other => other * -1_i64,
        }
    }
}

impl Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        -self.clone()
    }
}

/// Exclusion from a selection.
impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Exclude(Box::new(self))
    }
}

impl Not for &Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        !self.clone()
    }
}

/// Column range, `start | end`.
impl<R: Into<Expr>> BitOr<R> for Expr {
    type Output = Expr;

    fn bitor(self, rhs: R) -> Expr {
        Expr::Range {
            start: Box::new(self),
            end: Box::new(rhs.into()),
        }
    }
}

impl<R: Into<Expr>> BitAnd<R> for Expr {
    type Output = Expr;

    fn bitand(self, rhs: R) -> Expr {
        Expr::Logical {
            left: Box::new(self),
            op: LogicalOp::And,
            right: Box::new(rhs.into()),
        }
    }
}
