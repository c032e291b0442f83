//! Vectorised string kernels backing the `str` accessor.

use regex::{Regex, RegexBuilder};
use tp_types::{DType, Scalar};
use unicode_casefold::UnicodeCaseFold;

use crate::{Column, ColumnError};

/// Options for [`Column::str_contains`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContainsOptions {
    pub case: bool,
    pub regex: bool,
    /// Result for missing inputs; `None` keeps them missing.
    pub na: Option<bool>,
}

impl Default for ContainsOptions {
    fn default() -> Self {
        Self {
            case: true,
            regex: true,
            na: None,
        }
    }
}

impl Column {
    fn map_text(
        &self,
        op: &str,
        out_dtype: DType,
        mut f: impl FnMut(&str) -> Scalar,
    ) -> Result<Self, ColumnError> {
        if !(self.dtype().is_text_like() || self.dtype() == DType::Null) {
            return Err(ColumnError::unsupported(format!("str.{op}"), self.dtype()));
        }
        let values = self
            .values()
            .iter()
            .map(|value| match value {
                Scalar::Utf8(text) => f(text),
                _ => Scalar::missing_for_dtype(out_dtype),
            })
            .collect();
        Self::new(out_dtype, values)
    }

    pub fn str_lower(&self) -> Result<Self, ColumnError> {
        self.map_text("lower", DType::Utf8, |s| Scalar::Utf8(s.to_lowercase()))
    }

    pub fn str_upper(&self) -> Result<Self, ColumnError> {
        self.map_text("upper", DType::Utf8, |s| Scalar::Utf8(s.to_uppercase()))
    }

    /// Uppercase the first letter of every word, lowercase the rest.
    pub fn str_title(&self) -> Result<Self, ColumnError> {
        self.map_text("title", DType::Utf8, |s| Scalar::Utf8(title_case(s)))
    }

    pub fn str_capitalize(&self) -> Result<Self, ColumnError> {
        self.map_text("capitalize", DType::Utf8, |s| {
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.as_str().to_lowercase().chars())
                    .collect(),
                None => String::new(),
            };
            Scalar::Utf8(out)
        })
    }

    pub fn str_casefold(&self) -> Result<Self, ColumnError> {
        self.map_text("casefold", DType::Utf8, |s| {
            Scalar::Utf8(s.case_fold().collect())
        })
    }

    /// Trim whitespace, or any of `chars` when given.
    pub fn str_strip(&self, chars: Option<&str>) -> Result<Self, ColumnError> {
        self.map_text("strip", DType::Utf8, |s| {
            Scalar::Utf8(match chars {
                Some(set) => s.trim_matches(|c: char| set.contains(c)).to_owned(),
                None => s.trim().to_owned(),
            })
        })
    }

    pub fn str_lstrip(&self, chars: Option<&str>) -> Result<Self, ColumnError> {
        self.map_text("lstrip", DType::Utf8, |s| {
            Scalar::Utf8(match chars {
                Some(set) => s.trim_start_matches(|c: char| set.contains(c)).to_owned(),
                None => s.trim_start().to_owned(),
            })
        })
    }

    pub fn str_rstrip(&self, chars: Option<&str>) -> Result<Self, ColumnError> {
        self.map_text("rstrip", DType::Utf8, |s| {
            Scalar::Utf8(match chars {
                Some(set) => s.trim_end_matches(|c: char| set.contains(c)).to_owned(),
                None => s.trim_end().to_owned(),
            })
        })
    }

    /// Length in characters, not bytes.
    pub fn str_len(&self) -> Result<Self, ColumnError> {
        self.map_text("len", DType::Int64, |s| {
            Scalar::Int64(s.chars().count() as i64)
        })
    }

    pub fn str_contains(
        &self,
        pattern: &str,
        options: &ContainsOptions,
    ) -> Result<Self, ColumnError> {
        let matcher: Box<dyn Fn(&str) -> bool> = match (options.regex, options.case) {
            (true, case) => {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(!case)
                    .build()
                    .map_err(|err| ColumnError::InvalidArgument(err.to_string()))?;
                Box::new(move |s: &str| re.is_match(s))
            }
            (false, true) => {
                let needle = pattern.to_owned();
                Box::new(move |s: &str| s.contains(needle.as_str()))
            }
            (false, false) => {
                let needle: String = pattern.case_fold().collect();
                Box::new(move |s: &str| {
                    s.case_fold().collect::<String>().contains(needle.as_str())
                })
            }
        };
        let column = self.map_text("contains", DType::Bool, |s| Scalar::Bool(matcher(s)))?;
        match options.na {
            Some(fill) => column.fill_missing(&Scalar::Bool(fill)),
            None => Ok(column),
        }
    }

    pub fn str_startswith(&self, prefix: &str) -> Result<Self, ColumnError> {
        self.map_text("startswith", DType::Bool, |s| Scalar::Bool(s.starts_with(prefix)))
    }

    pub fn str_endswith(&self, suffix: &str) -> Result<Self, ColumnError> {
        self.map_text("endswith", DType::Bool, |s| Scalar::Bool(s.ends_with(suffix)))
    }

    /// Replace every occurrence of `pattern`, literally or as a regex.
    pub fn str_replace(
        &self,
        pattern: &str,
        replacement: &str,
        regex: bool,
    ) -> Result<Self, ColumnError> {
        if regex {
            let re = Regex::new(pattern)
                .map_err(|err| ColumnError::InvalidArgument(err.to_string()))?;
            self.map_text("replace", DType::Utf8, |s| {
                Scalar::Utf8(re.replace_all(s, replacement).into_owned())
            })
        } else {
            self.map_text("replace", DType::Utf8, |s| {
                Scalar::Utf8(s.replace(pattern, replacement))
            })
        }
    }

    /// Character slice with negative indices counted from the end.
    pub fn str_slice(&self, start: Option<i64>, stop: Option<i64>) -> Result<Self, ColumnError> {
        self.map_text("slice", DType::Utf8, |s| {
            let chars = s.chars().collect::<Vec<_>>();
            let len = chars.len() as i64;
            let clamp = |idx: i64| if idx < 0 { (len + idx).max(0) } else { idx.min(len) };
            let from = start.map_or(0, clamp);
            let to = stop.map_or(len, clamp);
            let out = if from < to {
                chars[from as usize..to as usize].iter().collect()
            } else {
                String::new()
            };
            Scalar::Utf8(out)
        })
    }

    /// Left-pad with zeros to `width`, keeping a leading sign in front.
    pub fn str_zfill(&self, width: usize) -> Result<Self, ColumnError> {
        self.map_text("zfill", DType::Utf8, |s| {
            let len = s.chars().count();
            if len >= width {
                return Scalar::Utf8(s.to_owned());
            }
            let pad = "0".repeat(width - len);
            let out = match s.strip_prefix(['+', '-']) {
                Some(rest) => format!("{}{pad}{rest}", &s[..1]),
                None => format!("{pad}{s}"),
            };
            Scalar::Utf8(out)
        })
    }

    /// Split on a literal separator; missing stays missing.
    pub fn str_split(&self, separator: &str) -> Result<Vec<Option<Vec<String>>>, ColumnError> {
        if !(self.dtype().is_text_like() || self.dtype() == DType::Null) {
            return Err(ColumnError::unsupported("str.split", self.dtype()));
        }
        Ok(self
            .values()
            .iter()
            .map(|value| {
                value
                    .as_str()
                    .map(|s| s.split(separator).map(str::to_owned).collect())
            })
            .collect())
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_alphabetic();
    }
    out
}
