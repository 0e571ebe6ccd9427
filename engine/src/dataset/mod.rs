//! Column-oriented dataset
//!
//! The active working set of a session: named, typed columns over aligned
//! rows. Numeric cells use NaN as the missing marker; categorical and
//! datetime cells use `Option`. The dataset is always replaced wholesale by
//! the turn controller, never shared, so deep copy is plain `Clone`.
//!
//! Equality is structural and treats aligned missing numeric cells as equal
//! (change detection must not report a no-op mutation as a change just
//! because NaN != NaN).

pub mod clean;

use sdk::errors::SessionError;
use sdk::types::{ColumnKind, ColumnProfile, DatasetContext};
use serde::Serialize;

/// One column of cells
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "cells", rename_all = "lowercase")]
pub enum Column {
    /// Floating-point cells; NaN marks a missing value
    Numeric(Vec<f64>),

    /// Text cells
    Categorical(Vec<Option<String>>),

    /// Epoch-seconds cells
    Datetime(Vec<Option<i64>>),
}

impl Column {
    /// Build a numeric column
    pub fn numeric(values: Vec<f64>) -> Self {
        Column::Numeric(values)
    }

    /// Build a categorical column
    pub fn categorical(values: Vec<Option<String>>) -> Self {
        Column::Categorical(values)
    }

    /// Build a categorical column from string slices, no missing cells
    pub fn texts(values: &[&str]) -> Self {
        Column::Categorical(values.iter().map(|s| Some((*s).to_string())).collect())
    }

    /// Build a datetime column
    pub fn datetime(values: Vec<Option<i64>>) -> Self {
        Column::Datetime(values)
    }

    /// The column kind
    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Numeric(_) => ColumnKind::Numeric,
            Column::Categorical(_) => ColumnKind::Categorical,
            Column::Datetime(_) => ColumnKind::Datetime,
        }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
            Column::Datetime(v) => v.len(),
        }
    }

    /// True if the column has no cells
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the cell at `row` is missing
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Column::Numeric(v) => v.get(row).is_none_or(|x| x.is_nan()),
            Column::Categorical(v) => v.get(row).is_none_or(|x| x.is_none()),
            Column::Datetime(v) => v.get(row).is_none_or(|x| x.is_none()),
        }
    }

    /// Count of missing cells
    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_missing(i)).count()
    }

    /// Mean of the finite numeric cells, `None` for non-numeric columns or
    /// columns with no finite cell
    pub fn mean(&self) -> Option<f64> {
        let Column::Numeric(values) = self else {
            return None;
        };
        let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }

    /// Linear-interpolation quantile of the finite numeric cells
    ///
    /// `q` in [0, 1]. Matches the interpolation the original cleaning rules
    /// were written against.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let Column::Numeric(values) = self else {
            return None;
        };
        let mut finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
        if finite.is_empty() || !(0.0..=1.0).contains(&q) {
            return None;
        }
        finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let h = (finite.len() - 1) as f64 * q;
        let lo = h.floor() as usize;
        let hi = h.ceil() as usize;
        if lo == hi {
            return Some(finite[lo]);
        }
        Some(finite[lo] + (h - lo as f64) * (finite[hi] - finite[lo]))
    }

    /// Most frequent non-missing datetime cell; ties resolve to the
    /// smallest value
    pub fn mode_datetime(&self) -> Option<i64> {
        let Column::Datetime(values) = self else {
            return None;
        };
        let mut counts: std::collections::BTreeMap<i64, usize> = std::collections::BTreeMap::new();
        for value in values.iter().flatten() {
            *counts.entry(*value).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(value, _)| value)
    }

    fn cells_equal(&self, other: &Self) -> bool {
        match (self, other) {
            (Column::Numeric(a), Column::Numeric(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| (x.is_nan() && y.is_nan()) || x == y)
            }
            (Column::Categorical(a), Column::Categorical(b)) => a == b,
            (Column::Datetime(a), Column::Datetime(b)) => a == b,
            _ => false,
        }
    }
}

/// A single cell value, used by the executor's dataset operations
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A numeric value
    Number(f64),

    /// A text value
    Text(String),

    /// An epoch-seconds timestamp
    Timestamp(i64),

    /// A missing cell
    Missing,
}

/// The tabular working set
///
/// Column order is significant; names are unique; all columns have the same
/// length.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dataset {
    columns: Vec<(String, Column)>,
}

impl Dataset {
    /// An empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from named columns
    ///
    /// Rejects duplicate names and ragged column lengths.
    pub fn with_columns(columns: Vec<(String, Column)>) -> Result<Self, SessionError> {
        let mut dataset = Self::new();
        for (name, column) in columns {
            dataset.push_column(name, column)?;
        }
        Ok(dataset)
    }

    /// Append a named column
    pub fn push_column(&mut self, name: String, column: Column) -> Result<(), SessionError> {
        if self.columns.iter().any(|(n, _)| *n == name) {
            return Err(SessionError::DuplicateColumn(name));
        }
        if !self.columns.is_empty() && column.len() != self.n_rows() {
            return Err(SessionError::ColumnLength {
                column: name,
                len: column.len(),
                rows: self.n_rows(),
            });
        }
        self.columns.push((name, column));
        Ok(())
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    /// Number of columns
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// True if the dataset has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in order
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Iterate over (name, column) pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Schema snapshot for oracle context binding
    pub fn profile(&self) -> DatasetContext {
        DatasetContext {
            rows: self.n_rows(),
            columns: self
                .columns
                .iter()
                .map(|(name, column)| ColumnProfile {
                    name: name.clone(),
                    kind: column.kind(),
                })
                .collect(),
        }
    }

    fn column_mut(&mut self, name: &str) -> Result<&mut Column, SessionError> {
        self.columns
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| SessionError::UnknownColumn(name.to_string()))
    }

    /// Fill missing cells of a column with a fixed value
    pub fn fill_na(&mut self, name: &str, value: Cell) -> Result<(), SessionError> {
        match (self.column_mut(name)?, value) {
            (Column::Numeric(cells), Cell::Number(fill)) => {
                for cell in cells.iter_mut().filter(|c| c.is_nan()) {
                    *cell = fill;
                }
                Ok(())
            }
            (Column::Categorical(cells), Cell::Text(fill)) => {
                for cell in cells.iter_mut().filter(|c| c.is_none()) {
                    *cell = Some(fill.clone());
                }
                Ok(())
            }
            (Column::Datetime(cells), Cell::Timestamp(fill)) => {
                for cell in cells.iter_mut().filter(|c| c.is_none()) {
                    *cell = Some(fill);
                }
                Ok(())
            }
            (column, _) => Err(SessionError::ColumnType {
                column: name.to_string(),
                expected: match column.kind() {
                    ColumnKind::Numeric => "numeric",
                    ColumnKind::Categorical => "categorical",
                    ColumnKind::Datetime => "datetime",
                },
            }),
        }
    }

    /// Fill missing numeric cells with the column mean
    ///
    /// A column with no finite cell is left untouched.
    pub fn fill_na_mean(&mut self, name: &str) -> Result<(), SessionError> {
        let Some(mean) = self.column(name).and_then(Column::mean) else {
            // Still validate the name and kind.
            return match self.column(name) {
                None => Err(SessionError::UnknownColumn(name.to_string())),
                Some(Column::Numeric(_)) => Ok(()),
                Some(_) => Err(SessionError::ColumnType {
                    column: name.to_string(),
                    expected: "numeric",
                }),
            };
        };
        self.fill_na(name, Cell::Number(mean))
    }

    /// Clamp finite numeric cells into `[lo, hi]`
    pub fn cap(&mut self, name: &str, lo: f64, hi: f64) -> Result<(), SessionError> {
        match self.column_mut(name)? {
            Column::Numeric(cells) => {
                for cell in cells.iter_mut().filter(|c| c.is_finite()) {
                    *cell = cell.clamp(lo, hi);
                }
                Ok(())
            }
            _ => Err(SessionError::ColumnType {
                column: name.to_string(),
                expected: "numeric",
            }),
        }
    }

    /// Remove a column
    pub fn drop_column(&mut self, name: &str) -> Result<(), SessionError> {
        let position = self
            .columns
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| SessionError::UnknownColumn(name.to_string()))?;
        self.columns.remove(position);
        Ok(())
    }

    /// Rename a column
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), SessionError> {
        if from != to && self.columns.iter().any(|(n, _)| n == to) {
            return Err(SessionError::DuplicateColumn(to.to_string()));
        }
        let entry = self
            .columns
            .iter_mut()
            .find(|(n, _)| n == from)
            .ok_or_else(|| SessionError::UnknownColumn(from.to_string()))?;
        entry.0 = to.to_string();
        Ok(())
    }

    /// Overwrite one cell
    pub fn set_value(&mut self, row: usize, name: &str, value: Cell) -> Result<(), SessionError> {
        let rows = self.n_rows();
        if row >= rows {
            return Err(SessionError::RowOutOfBounds { row, rows });
        }
        match (self.column_mut(name)?, value) {
            (Column::Numeric(cells), Cell::Number(v)) => cells[row] = v,
            (Column::Numeric(cells), Cell::Missing) => cells[row] = f64::NAN,
            (Column::Categorical(cells), Cell::Text(v)) => cells[row] = Some(v),
            (Column::Categorical(cells), Cell::Missing) => cells[row] = None,
            (Column::Datetime(cells), Cell::Timestamp(v)) => cells[row] = Some(v),
            (Column::Datetime(cells), Cell::Missing) => cells[row] = None,
            (column, _) => {
                return Err(SessionError::ColumnType {
                    column: name.to_string(),
                    expected: match column.kind() {
                        ColumnKind::Numeric => "numeric",
                        ColumnKind::Categorical => "categorical",
                        ColumnKind::Datetime => "datetime",
                    },
                })
            }
        }
        Ok(())
    }

    /// Keep only the rows for which `keep` returns true
    pub fn retain_rows(&mut self, keep: impl Fn(usize) -> bool) {
        let flags: Vec<bool> = (0..self.n_rows()).map(&keep).collect();
        for (_, column) in &mut self.columns {
            match column {
                Column::Numeric(cells) => {
                    let mut i = 0;
                    cells.retain(|_| {
                        let k = flags[i];
                        i += 1;
                        k
                    });
                }
                Column::Categorical(cells) => {
                    let mut i = 0;
                    cells.retain(|_| {
                        let k = flags[i];
                        i += 1;
                        k
                    });
                }
                Column::Datetime(cells) => {
                    let mut i = 0;
                    cells.retain(|_| {
                        let k = flags[i];
                        i += 1;
                        k
                    });
                }
            }
        }
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|((an, ac), (bn, bc))| an == bn && ac.cells_equal(bc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::with_columns(vec![
            (
                "salary".to_string(),
                Column::numeric(vec![1.0, 2.0, f64::NAN, 1000.0]),
            ),
            (
                "team".to_string(),
                Column::categorical(vec![
                    Some("red".to_string()),
                    None,
                    Some("blue".to_string()),
                    Some("red".to_string()),
                ]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_shape() {
        let dataset = sample();
        assert_eq!(dataset.n_rows(), 4);
        assert_eq!(dataset.n_cols(), 2);
        assert_eq!(dataset.names(), vec!["salary", "team"]);
    }

    #[test]
    fn test_ragged_column_rejected() {
        let mut dataset = sample();
        let err = dataset
            .push_column("short".to_string(), Column::numeric(vec![1.0]))
            .unwrap_err();
        assert!(err.to_string().contains("short"));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut dataset = sample();
        assert!(dataset
            .push_column("salary".to_string(), Column::numeric(vec![0.0; 4]))
            .is_err());
    }

    #[test]
    fn test_equality_treats_nan_as_equal() {
        let a = sample();
        let b = sample();
        assert_eq!(a, b);

        let mut c = sample();
        c.set_value(0, "salary", Cell::Number(9.0)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_equality_respects_column_order() {
        let a = Dataset::with_columns(vec![
            ("x".to_string(), Column::numeric(vec![1.0])),
            ("y".to_string(), Column::numeric(vec![2.0])),
        ])
        .unwrap();
        let b = Dataset::with_columns(vec![
            ("y".to_string(), Column::numeric(vec![2.0])),
            ("x".to_string(), Column::numeric(vec![1.0])),
        ])
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_mean_ignores_missing() {
        let dataset = sample();
        let mean = dataset.column("salary").unwrap().mean().unwrap();
        assert!((mean - (1.0 + 2.0 + 1000.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_quantile_interpolates() {
        let column = Column::numeric(vec![1.0, 2.0, 334.0, 1000.0]);
        // h = 3 * 0.5 = 1.5 -> midpoint of 2 and 334
        assert!((column.quantile(0.5).unwrap() - 168.0).abs() < 1e-9);
        assert_eq!(column.quantile(0.0), Some(1.0));
        assert_eq!(column.quantile(1.0), Some(1000.0));
    }

    #[test]
    fn test_fill_na_and_mean() {
        let mut dataset = sample();
        dataset.fill_na_mean("salary").unwrap();
        assert_eq!(dataset.column("salary").unwrap().missing_count(), 0);

        dataset
            .fill_na("team", Cell::Text("Not Specified".to_string()))
            .unwrap();
        let Column::Categorical(cells) = dataset.column("team").unwrap() else {
            panic!("expected categorical");
        };
        assert_eq!(cells[1].as_deref(), Some("Not Specified"));
    }

    #[test]
    fn test_fill_na_type_mismatch() {
        let mut dataset = sample();
        let err = dataset.fill_na("team", Cell::Number(1.0)).unwrap_err();
        assert!(err.to_string().contains("team"));
    }

    #[test]
    fn test_cap_clamps_finite_only() {
        let mut dataset = sample();
        dataset.cap("salary", 1.5, 100.0).unwrap();
        let Column::Numeric(cells) = dataset.column("salary").unwrap() else {
            panic!("expected numeric");
        };
        assert_eq!(cells[0], 1.5);
        assert_eq!(cells[3], 100.0);
        assert!(cells[2].is_nan());
    }

    #[test]
    fn test_drop_and_rename() {
        let mut dataset = sample();
        dataset.rename_column("team", "group").unwrap();
        assert!(dataset.column("group").is_some());
        assert!(dataset.rename_column("group", "salary").is_err());

        dataset.drop_column("group").unwrap();
        assert_eq!(dataset.n_cols(), 1);
        assert!(dataset.drop_column("group").is_err());
    }

    #[test]
    fn test_set_value_bounds() {
        let mut dataset = sample();
        assert!(dataset.set_value(99, "salary", Cell::Number(1.0)).is_err());
        dataset.set_value(1, "salary", Cell::Missing).unwrap();
        assert!(dataset.column("salary").unwrap().is_missing(1));
    }

    #[test]
    fn test_retain_rows() {
        let mut dataset = sample();
        dataset.retain_rows(|i| i != 2);
        assert_eq!(dataset.n_rows(), 3);
        let Column::Numeric(cells) = dataset.column("salary").unwrap() else {
            panic!("expected numeric");
        };
        assert_eq!(cells, &vec![1.0, 2.0, 1000.0]);
    }

    #[test]
    fn test_profile() {
        let profile = sample().profile();
        assert_eq!(profile.rows, 4);
        assert_eq!(profile.columns.len(), 2);
        assert_eq!(profile.columns[0].name, "salary");
    }

    #[test]
    fn test_mode_datetime_tie_breaks_low() {
        let column = Column::datetime(vec![Some(5), Some(3), Some(5), Some(3), None]);
        assert_eq!(column.mode_datetime(), Some(3));
    }
}
