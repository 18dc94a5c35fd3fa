use std::borrow::Cow;

use crate::value::Value;

/// A unit of work handed to an action: statement text, or raw bytes for escaping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    content: Vec<u8>,
}

impl Filter {
    #[must_use]
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            content: statement.into().into_bytes(),
        }
    }

    /// Arbitrary bytes, e.g. text that still needs escaping.
    #[must_use]
    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    #[must_use]
    pub fn sql(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl From<&str> for Filter {
    fn from(statement: &str) -> Self {
        Self::new(statement)
    }
}

impl From<String> for Filter {
    fn from(statement: String) -> Self {
        Self::new(statement)
    }
}

/// One row submitted to a batch action.
///
/// ```rust
/// use sql_fanout::prelude::*;
///
/// let mut row = BatchFilter::new("t");
/// row.append("id", 1).append(" name ", "a");
/// assert_eq!(row.columns(), ["id", "name"]);
/// assert_eq!(row.values(), "1,'a'");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFilter {
    table: String,
    force_check: bool,
    columns: Vec<String>,
    values: String,
}

impl BatchFilter {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Build a row from `(column, value)` pairs in iteration order.
    #[must_use]
    pub fn from_pairs<I, K, V>(table: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut filter = Self::new(table);
        for (column, value) in pairs {
            filter.append(column.as_ref(), value);
        }
        filter
    }

    /// Compare table and columns against the buffered statement even when one exists.
    #[must_use]
    pub fn with_force_check(mut self, force_check: bool) -> Self {
        self.force_check = force_check;
        self
    }

    pub fn append(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.columns.push(column.trim().to_string());
        self.append_value(value)
    }

    /// Append a value whose column was already declared.
    pub fn append_value(&mut self, value: impl Into<Value>) -> &mut Self {
        if !self.values.is_empty() {
            self.values.push(',');
        }
        self.values.push_str(value.into().as_str());
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Comma-joined literals of this row, without parentheses.
    #[must_use]
    pub fn values(&self) -> &str {
        &self.values
    }

    #[must_use]
    pub fn force_check(&self) -> bool {
        self.force_check
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty() && self.columns.is_empty() && self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_keep_order_and_quote_text() {
        let row = BatchFilter::from_pairs("users", [("id", Value::int(3)), ("name", Value::from("o'neil"))]);
        assert_eq!(row.table(), "users");
        assert_eq!(row.columns(), ["id", "name"]);
        assert_eq!(row.values(), "3,'o''neil'");
        assert!(!row.force_check());
    }

    #[test]
    fn filter_keeps_raw_bytes() {
        let filter = Filter::from_bytes(vec![b'a', 0, b'b']);
        assert_eq!(filter.content(), b"a\0b");
        assert!(!filter.is_empty());
        assert!(Filter::default().is_empty());
        assert!(BatchFilter::default().is_empty());
    }
}
