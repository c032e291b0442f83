use std::collections::BTreeSet;

use tp_types::{DType, Scalar};

use crate::{Column, ColumnError};

impl Column {
    fn require_categorical(&self, op: &str) -> Result<(), ColumnError> {
        if matches!(self.dtype(), DType::Categorical | DType::Null) {
            Ok(())
        } else {
            Err(ColumnError::unsupported(format!("cat.{op}"), self.dtype()))
        }
    }

    /// Distinct non-missing categories in lexical order.
    pub fn cat_categories(&self) -> Result<Vec<String>, ColumnError> {
        self.require_categorical("categories")?;
        let set = self
            .values()
            .iter()
            .filter_map(Scalar::as_str)
            .collect::<BTreeSet<_>>();
        Ok(set.into_iter().map(str::to_owned).collect())
    }

    /// Position of each value within [`Column::cat_categories`]; missing maps to -1.
    pub fn cat_codes(&self) -> Result<Self, ColumnError> {
        let categories = self.cat_categories()?;
        let values = self
            .values()
            .iter()
            .map(|value| {
                let code = value
                    .as_str()
                    .and_then(|text| categories.binary_search_by(|c| c.as_str().cmp(text)).ok())
                    .map_or(-1, |idx| idx as i64);
                Scalar::Int64(code)
            })
            .collect();
        Self::new(DType::Int64, values)
    }
}

#[cfg(test)]
mod tests {
    use tp_types::{DType, NullKind, Scalar};

    use crate::Column;

    #[test]
    fn codes_follow_sorted_categories() {
        let column = Column::new(
            DType::Categorical,
            vec!["low".into(), "high".into(), Scalar::Null(NullKind::Null), "low".into()],
        )
        .expect("categorical");
        assert_eq!(
            column.cat_categories().expect("categories"),
            vec!["high".to_owned(), "low".to_owned()]
        );
        let codes = column.cat_codes().expect("codes");
        assert_eq!(
            codes.values(),
            &[
                Scalar::Int64(1),
                Scalar::Int64(0),
                Scalar::Int64(-1),
                Scalar::Int64(1)
            ]
        );
    }

    #[test]
    fn plain_text_has_no_cat_accessor() {
        let column = Column::from_values(vec!["a".into()]).expect("text");
        assert!(column.cat_codes().is_err());
    }
}
