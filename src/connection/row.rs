//! Single result row in text format

use crate::{Error, Result};

/// One row of a simple-query result, columns addressed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl Row {
    /// Build a row from column names and their text values (`None` = SQL NULL).
    ///
    /// Extra names or values beyond the shorter list are ignored.
    pub fn new(columns: Vec<String>, values: Vec<Option<String>>) -> Self {
        let len = columns.len().min(values.len());
        let mut columns = columns;
        let mut values = values;
        columns.truncate(len);
        values.truncate(len);
        Self { columns, values }
    }

    /// Build a row from `(name, value)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        let (columns, values) = pairs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.map(str::to_string)))
            .unzip();
        Self { columns, values }
    }

    /// Value of the named column, matched case-insensitively.
    ///
    /// Returns `Ok(None)` for SQL NULL and `Error::MissingColumn` if no column has that name.
    pub fn get(&self, name: &str) -> Result<Option<&str>> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .map(|idx| self.values[idx].as_deref())
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    /// Column names in result order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_case_insensitive() {
        let row = Row::from_pairs([("CURRSCHEMA", Some("APP")), ("instance", None)]);
        assert_eq!(row.get("currschema").unwrap(), Some("APP"));
        assert_eq!(row.get("INSTANCE").unwrap(), None);
    }

    #[test]
    fn test_missing_column() {
        let row = Row::from_pairs([("a", Some("1"))]);
        let err = row.get("b").unwrap_err();
        assert!(matches!(err, Error::MissingColumn(ref c) if c == "b"));
    }

    #[test]
    fn test_new_truncates_to_shorter_list() {
        let row = Row::new(
            vec!["a".into(), "b".into()],
            vec![Some("1".into())],
        );
        assert_eq!(row.len(), 1);
        assert!(row.get("b").is_err());
    }
}
