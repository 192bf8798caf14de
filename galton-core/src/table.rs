//! Column-oriented tables for grouped data
//!
//! A table holds named, equal-length columns. Numeric columns use NaN for
//! missing entries; categorical columns use `None`. Group labels are always
//! handed out in lexicographic order so that results never depend on row
//! order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Column '{0}' is not numeric")]
    NotNumeric(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Column '{column}' has {got} rows, expected {expected}")]
    Ragged {
        column: String,
        expected: usize,
        got: usize,
    },
}

/// A single table column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row labels for grouping. Numeric cells are rendered as text and
    /// non-finite cells count as missing.
    pub fn labels(&self) -> Vec<Option<String>> {
        match self {
            Column::Categorical(v) => v.clone(),
            Column::Numeric(v) => v
                .iter()
                .map(|x| if x.is_finite() { Some(x.to_string()) } else { None })
                .collect(),
        }
    }
}

/// Named columns of equal length
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, checking name uniqueness and row count
    pub fn push(&mut self, name: impl Into<String>, column: Column) -> Result<(), TableError> {
        let name = name.into();
        if self.columns.iter().any(|(n, _)| *n == name) {
            return Err(TableError::DuplicateColumn(name));
        }
        if let Some((_, first)) = self.columns.first() {
            if first.len() != column.len() {
                return Err(TableError::Ragged {
                    column: name,
                    expected: first.len(),
                    got: column.len(),
                });
            }
        }
        self.columns.push((name, column));
        Ok(())
    }

    /// Builder: add a numeric column
    pub fn with_numeric(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, TableError> {
        self.push(name, Column::Numeric(values))?;
        Ok(self)
    }

    /// Builder: add a categorical column
    pub fn with_categorical<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        labels: impl IntoIterator<Item = S>,
    ) -> Result<Self, TableError> {
        let labels = labels.into_iter().map(|s| Some(s.into())).collect();
        self.push(name, Column::Categorical(labels))?;
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    pub fn numeric(&self, name: &str) -> Result<&[f64], TableError> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v),
            Column::Categorical(_) => Err(TableError::NotNumeric(name.to_string())),
        }
    }

    /// Distinct non-missing labels of a column, lexicographically ordered
    pub fn distinct(&self, name: &str) -> Result<BTreeSet<String>, TableError> {
        Ok(self.column(name)?.labels().into_iter().flatten().collect())
    }

    /// Split `value_col` by the labels of `group_col`.
    ///
    /// Every distinct label gets an entry, even when all of its values are
    /// missing. Rows without a label are skipped and non-finite values are
    /// dropped per partition.
    pub fn partition(&self, value_col: &str, group_col: &str) -> Result<BTreeMap<String, Vec<f64>>, TableError> {
        let values = self.numeric(value_col)?;
        let labels = self.column(group_col)?.labels();

        let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (label, &x) in labels.into_iter().zip(values) {
            let Some(label) = label else { continue };
            let entry = groups.entry(label).or_default();
            if x.is_finite() {
                entry.push(x);
            }
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new()
            .with_numeric("RT", vec![310.0, f64::NAN, 290.0, 330.0, 305.0])
            .unwrap()
            .with_categorical("Group", ["b", "b", "a", "a", "c"])
            .unwrap()
    }

    #[test]
    fn test_partition_orders_labels_and_drops_missing() {
        let parts = table().partition("RT", "Group").unwrap();
        let keys: Vec<&str> = parts.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(parts["b"], vec![310.0]);
        assert_eq!(parts["a"], vec![290.0, 330.0]);
    }

    #[test]
    fn test_all_missing_group_still_listed() {
        let t = Table::new()
            .with_numeric("x", vec![1.0, f64::NAN])
            .unwrap()
            .with_categorical("g", ["a", "b"])
            .unwrap();
        let parts = t.partition("x", "g").unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts["b"].is_empty());
    }

    #[test]
    fn test_ragged_column_rejected() {
        let err = Table::new()
            .with_numeric("x", vec![1.0, 2.0])
            .unwrap()
            .with_numeric("y", vec![1.0])
            .unwrap_err();
        assert!(matches!(err, TableError::Ragged { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Table::new()
            .with_numeric("x", vec![1.0])
            .unwrap()
            .with_numeric("x", vec![2.0])
            .unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("x".into()));
    }

    #[test]
    fn test_numeric_labels_for_grouping() {
        let t = Table::new()
            .with_numeric("x", vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_numeric("g", vec![1.0, 2.0, f64::NAN])
            .unwrap();
        let distinct = t.distinct("g").unwrap();
        assert_eq!(distinct.len(), 2);
    }

    #[test]
    fn test_unknown_and_non_numeric_columns() {
        let t = table();
        assert_eq!(t.numeric("nope").unwrap_err(), TableError::UnknownColumn("nope".into()));
        assert_eq!(t.numeric("Group").unwrap_err(), TableError::NotNumeric("Group".into()));
    }
}
