use std::ops::Not;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tp_types::DType;

use crate::Expr;

const REGEX_METACHARACTERS: &[char] = &[
    '|', '(', ')', '[', ']', '{', '}', '^', '$', '*', '+', '?', '\\', '.',
];

/// A name pattern with its regex-ness decided once, at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    text: String,
    is_regex: bool,
}

impl Pattern {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let is_regex = text.contains(REGEX_METACHARACTERS);
        Self { text, is_regex }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_regex(&self) -> bool {
        self.is_regex
    }

    /// Match using `template` to anchor the regex form (`{}` is the pattern).
    /// A pattern that fails to compile falls back to the literal test.
    fn test(&self, name: &str, template: &str, literal: impl Fn(&str, &str) -> bool) -> bool {
        if self.is_regex
            && let Ok(re) = Regex::new(&template.replace("{}", &self.text))
        {
            return re.is_match(name);
        }
        literal(name, &self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypePredicate {
    IsNumeric,
    IsInteger,
    IsFloat,
    IsString,
    IsBoolean,
    IsTemporal,
    IsCategorical,
}

impl TypePredicate {
    #[must_use]
    pub fn test(self, dtype: DType) -> bool {
        match self {
            Self::IsNumeric => dtype.is_numeric(),
            Self::IsInteger => dtype.is_integer(),
            Self::IsFloat => dtype.is_float(),
            Self::IsString => dtype.is_string(),
            Self::IsBoolean => dtype.is_boolean(),
            Self::IsTemporal => dtype.is_temporal(),
            Self::IsCategorical => dtype.is_categorical(),
        }
    }
}

/// Column selection by name pattern or dtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selector {
    Everything,
    StartsWith(Pattern),
    EndsWith(Pattern),
    Contains(Pattern),
    Where(TypePredicate),
}

impl Selector {
    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Self::StartsWith(Pattern::new(prefix))
    }

    pub fn ends_with(suffix: impl Into<String>) -> Self {
        Self::EndsWith(Pattern::new(suffix))
    }

    pub fn contains(substring: impl Into<String>) -> Self {
        Self::Contains(Pattern::new(substring))
    }

    #[must_use]
    pub fn where_(predicate: TypePredicate) -> Self {
        Self::Where(predicate)
    }

    #[must_use]
    pub fn everything() -> Self {
        Self::Everything
    }

    #[must_use]
    pub fn matches(&self, column_name: &str, dtype: DType) -> bool {
        match self {
            Self::Everything => true,
            Self::StartsWith(pattern) => {
                pattern.test(column_name, "^({})", |name, text| name.starts_with(text))
            }
            Self::EndsWith(pattern) => {
                pattern.test(column_name, "({})$", |name, text| name.ends_with(text))
            }
            Self::Contains(pattern) => {
                pattern.test(column_name, "({})", |name, text| name.contains(text))
            }
            Self::Where(predicate) => predicate.test(dtype),
        }
    }
}

impl From<Selector> for Expr {
    fn from(selector: Selector) -> Self {
        Expr::Select(selector)
    }
}

impl Not for Selector {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Exclude(Box::new(Expr::Select(self)))
    }
}

#[cfg(test)]
mod tests {
    use tp_types::DType;

    use super::{Selector, TypePredicate};

    #[test]
    fn literal_patterns_skip_regex() {
        let selector = Selector::starts_with("sepal_");
        assert!(matches!(&selector, Selector::StartsWith(p) if !p.is_regex()));
        assert!(selector.matches("sepal_width", DType::Float64));
        assert!(!selector.matches("petal_width", DType::Float64));
    }

    #[test]
    fn regex_patterns_are_anchored_by_kind() {
        let selector = Selector::ends_with("_(x|y)");
        assert!(selector.matches("score_x", DType::Int64));
        assert!(!selector.matches("score_x_total", DType::Int64));

        let selector = Selector::starts_with("a|b");
        assert!(selector.matches("beta", DType::Int64));
        assert!(!selector.matches("gamma", DType::Int64));
    }

    #[test]
    fn dotted_names_count_as_regex() {
        let selector = Selector::contains("a.c");
        assert!(matches!(&selector, Selector::Contains(p) if p.is_regex()));
        assert!(selector.matches("xabcx", DType::Utf8));
    }

    #[test]
    fn type_predicates_follow_dtype() {
        let numeric = Selector::where_(TypePredicate::IsNumeric);
        assert!(numeric.matches("a", DType::Int64));
        assert!(numeric.matches("a", DType::Float64));
        assert!(!numeric.matches("a", DType::Bool));
        assert!(Selector::where_(TypePredicate::IsCategorical).matches("c", DType::Categorical));
    }
}
