use std::fmt::Write as _;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tp_types::{DType, Scalar, datetime_from_nanos, nanos_from_datetime};

use crate::{Column, ColumnError};

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse the textual datetime layouts accepted by `to_date` and `astype`.
#[must_use]
pub fn parse_datetime(text: &str) -> Option<i64> {
    let text = text.trim();
    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    nanos_from_datetime(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    /// Monday is 0.
    DayOfWeek,
    DayOfYear,
    Quarter,
}

impl DateField {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let field = match name {
            "year" => Self::Year,
            "month" => Self::Month,
            "day" => Self::Day,
            "hour" => Self::Hour,
            "minute" => Self::Minute,
            "second" => Self::Second,
            "dayofweek" | "weekday" | "day_of_week" => Self::DayOfWeek,
            "dayofyear" | "day_of_year" => Self::DayOfYear,
            "quarter" => Self::Quarter,
            _ => return None,
        };
        Some(field)
    }

    fn extract(self, value: &NaiveDateTime) -> i64 {
        let raw = match self {
            Self::Year => return i64::from(value.year()),
            Self::Month => value.month(),
            Self::Day => value.day(),
            Self::Hour => value.hour(),
            Self::Minute => value.minute(),
            Self::Second => value.second(),
            Self::DayOfWeek => value.weekday().num_days_from_monday(),
            Self::DayOfYear => value.ordinal(),
            Self::Quarter => (value.month() - 1) / 3 + 1,
        };
        i64::from(raw)
    }
}

impl Column {
    fn map_datetime(
        &self,
        op: &str,
        out_dtype: DType,
        mut f: impl FnMut(&NaiveDateTime) -> Result<Scalar, ColumnError>,
    ) -> Result<Self, ColumnError> {
        if !matches!(self.dtype(), DType::Datetime64 | DType::Null) {
            return Err(ColumnError::unsupported(format!("dt.{op}"), self.dtype()));
        }
        let values = self
            .values()
            .iter()
            .map(|value| match value {
                Scalar::Datetime64(nanos) => match datetime_from_nanos(*nanos) {
                    Some(dt) => f(&dt),
                    None => Ok(Scalar::missing_for_dtype(out_dtype)),
                },
                _ => Ok(Scalar::missing_for_dtype(out_dtype)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(out_dtype, values)
    }

    pub fn dt_field(&self, field: DateField) -> Result<Self, ColumnError> {
        let name = format!("{field:?}").to_lowercase();
        self.map_datetime(&name, DType::Int64, |dt| Ok(Scalar::Int64(field.extract(dt))))
    }

    /// Truncate each timestamp to midnight.
    pub fn dt_date(&self) -> Result<Self, ColumnError> {
        self.map_datetime("date", DType::Datetime64, |dt| {
            Ok(dt
                .date()
                .and_hms_opt(0, 0, 0)
                .and_then(nanos_from_datetime)
                .map_or(Scalar::missing_for_dtype(DType::Datetime64), Scalar::Datetime64))
        })
    }

    pub fn dt_strftime(&self, format: &str) -> Result<Self, ColumnError> {
        self.map_datetime("strftime", DType::Utf8, |dt| {
            let mut out = String::new();
            write!(out, "{}", dt.format(format)).map_err(|_| {
                ColumnError::InvalidArgument(format!("invalid strftime format `{format}`"))
            })?;
            Ok(Scalar::Utf8(out))
        })
    }

    /// Parse text into timestamps; unparsable entries become NaT.
    pub fn to_datetime(&self) -> Result<Self, ColumnError> {
        self.astype(DType::Datetime64)
    }
}

#[cfg(test)]
mod tests {
    use tp_types::{DType, NullKind, Scalar};

    use crate::Column;

    use super::{DateField, parse_datetime};

    fn stamps() -> Column {
        let values = ["2024-02-29 13:45:10", "2023-11-05", "not a date"]
            .into_iter()
            .map(Scalar::from)
            .collect();
        Column::from_values(values)
            .expect("text")
            .to_datetime()
            .expect("parse")
    }

    #[test]
    fn parses_common_layouts() {
        assert!(parse_datetime("2024-01-02T03:04:05").is_some());
        assert!(parse_datetime("01/31/2024").is_some());
        assert_eq!(parse_datetime("2024-13-40"), None);
    }

    #[test]
    fn fields_extract_from_timestamps() {
        let column = stamps();
        assert_eq!(column.dtype(), DType::Datetime64);
        assert_eq!(column.values()[2], Scalar::Null(NullKind::NaT));

        let years = column.dt_field(DateField::Year).expect("year");
        assert_eq!(
            years.values(),
            &[
                Scalar::Int64(2024),
                Scalar::Int64(2023),
                Scalar::Null(NullKind::Null)
            ]
        );
        let quarter = column.dt_field(DateField::Quarter).expect("quarter");
        assert_eq!(quarter.values()[1], Scalar::Int64(4));
        let weekday = column.dt_field(DateField::DayOfWeek).expect("weekday");
        // 2024-02-29 was a Thursday.
        assert_eq!(weekday.values()[0], Scalar::Int64(3));
    }

    #[test]
    fn strftime_and_date() {
        let column = stamps();
        let text = column.dt_strftime("%d.%m.%Y").expect("strftime");
        assert_eq!(text.values()[0], Scalar::Utf8("29.02.2024".into()));
        let dates = column.dt_date().expect("date");
        assert_eq!(
            dates.values()[0],
            Scalar::Datetime64(parse_datetime("2024-02-29").expect("date"))
        );
    }

    #[test]
    fn text_columns_reject_dt_accessor() {
        let column = Column::from_values(vec!["2024-01-01".into()]).expect("text");
        assert!(column.dt_field(DateField::Month).is_err());
    }
}
