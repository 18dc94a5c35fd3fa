use std::fmt;
use std::fmt::Write as _;

use chrono::NaiveDateTime;

use crate::types::RowValues;

/// A SQL literal ready to be embedded in a generated statement.
///
/// Numbers stay unquoted, text is single-quoted with embedded quotes doubled,
/// [`Value::raw`] passes expressions such as `NOW()` through untouched and
/// [`Value::hex`] writes binary data as `X'..'`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Value {
    literal: String,
}

impl Value {
    #[must_use]
    pub fn null() -> Self {
        Self {
            literal: "NULL".into(),
        }
    }

    #[must_use]
    pub fn int(value: i64) -> Self {
        Self {
            literal: value.to_string(),
        }
    }

    #[must_use]
    pub fn uint(value: u64) -> Self {
        Self {
            literal: value.to_string(),
        }
    }

    /// Fixed notation with six decimals.
    #[must_use]
    pub fn float(value: f64) -> Self {
        Self {
            literal: format!("{value:.6}"),
        }
    }

    #[must_use]
    pub fn text(value: &str) -> Self {
        Self {
            literal: format!("'{}'", value.replace('\'', "''")),
        }
    }

    /// Unquoted expression, e.g. `NOW()` or a pre-escaped literal.
    #[must_use]
    pub fn raw(expression: &str) -> Self {
        Self {
            literal: expression.to_string(),
        }
    }

    #[must_use]
    pub fn hex(bytes: &[u8]) -> Self {
        let mut literal = String::with_capacity(bytes.len() * 2 + 3);
        literal.push_str("X'");
        for byte in bytes {
            let _ = write!(literal, "{byte:02x}");
        }
        literal.push('\'');
        Self { literal }
    }

    #[must_use]
    pub fn bool(flag: bool) -> Self {
        Self::int(i64::from(flag))
    }

    #[must_use]
    pub fn timestamp(value: NaiveDateTime) -> Self {
        Self {
            literal: format!("'{}'", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.literal
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.literal
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::int(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::uint(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::float(value)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::bool(flag)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::text(&value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::timestamp(value)
    }
}

impl From<&RowValues> for Value {
    fn from(cell: &RowValues) -> Self {
        match cell {
            RowValues::Int(value) => Self::int(*value),
            RowValues::Float(value) => Self::float(*value),
            RowValues::Text(value) => Self::text(value),
            RowValues::Bool(flag) => Self::bool(*flag),
            RowValues::Timestamp(value) => Self::timestamp(*value),
            RowValues::Null => Self::null(),
            RowValues::JSON(value) => Self::text(&value.to_string()),
            RowValues::Blob(bytes) => Self::hex(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn literals_by_type() {
        assert_eq!(Value::from(42_i64).as_str(), "42");
        assert_eq!(Value::from(1.5).as_str(), "1.500000");
        assert_eq!(Value::from("it's").as_str(), "'it''s'");
        assert_eq!(Value::raw("NOW()").as_str(), "NOW()");
        assert_eq!(Value::hex(&[0x0a, 0xff]).as_str(), "X'0aff'");
        assert_eq!(Value::from(true).as_str(), "1");
        assert_eq!(Value::null().as_str(), "NULL");
    }

    #[test]
    fn timestamps_and_cells() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|d| d.and_hms_opt(13, 5, 9))
            .expect("valid date");
        assert_eq!(Value::from(ts).as_str(), "'2024-02-29 13:05:09'");
        assert_eq!(Value::from(&RowValues::Blob(vec![1])).as_str(), "X'01'");
        assert_eq!(Value::from(&RowValues::Null).to_string(), "NULL");
    }
}
