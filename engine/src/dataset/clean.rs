//! Deterministic dataset cleaning
//!
//! A pure, rule-based pass with no oracle involvement: drop empty rows and
//! columns, mean-fill and percentile-cap numeric columns, normalize and fill
//! categorical columns, mode-fill datetime columns. Returns the cleaned
//! dataset and a summary that renders as the markdown block shown to users.
//!
//! Rule order matters: numeric means are computed over the pre-cap values,
//! so a later cap never shifts the fill value.

use super::{Cell, Column, Dataset};
use std::fmt;

/// Tokens that mean "missing" when found in a categorical cell
const INVALID_TOKENS: &[&str] = &[
    "na",
    "nan",
    "not applicable",
    "n/a",
    "n.a.",
    "null",
    "empty",
    "blank",
];

/// Share of missing cells above which a categorical column is dropped
const MISSING_DROP_THRESHOLD: f64 = 0.9;

/// Quantile bounds for numeric outlier capping
const LOWER_QUANTILE: f64 = 0.01;
const UPPER_QUANTILE: f64 = 0.99;

/// Lower/upper cap counts for one numeric column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapCounts {
    /// Values below the lower percentile bound
    pub lower: usize,

    /// Values above the upper percentile bound
    pub upper: usize,
}

/// What the cleaning pass changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanSummary {
    /// (column, fill count) for mean-filled numeric columns
    pub numeric_filled: Vec<(String, usize)>,

    /// (column, cap counts) for percentile-capped numeric columns
    pub outliers_capped: Vec<(String, CapCounts)>,

    /// (column, fill count) for categorical columns filled with the
    /// placeholder
    pub categorical_filled: Vec<(String, usize)>,

    /// Categorical columns dropped for excessive missingness
    pub categorical_removed: Vec<String>,

    /// (column, fill count) for mode-filled datetime columns
    pub datetime_filled: Vec<(String, usize)>,

    /// All-missing rows removed
    pub rows_removed: usize,

    /// All-missing columns removed
    pub columns_removed: usize,
}

impl fmt::Display for CleanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "**Data Cleaning Result:**")?;
        writeln!(f)?;

        if !self.numeric_filled.is_empty() {
            writeln!(
                f,
                "- Numeric columns with missing values filled using the column mean:"
            )?;
            let parts: Vec<String> = self
                .numeric_filled
                .iter()
                .map(|(col, count)| format!("{col} ({count} values)"))
                .collect();
            writeln!(f, "  {}", parts.join(", "))?;
            writeln!(f)?;
        }

        if !self.outliers_capped.is_empty() {
            writeln!(
                f,
                "- Numeric columns had outliers capped between the 1st and 99th percentiles:"
            )?;
            let parts: Vec<String> = self
                .outliers_capped
                .iter()
                .map(|(col, caps)| {
                    format!(
                        "{col} (lower capped: {}, upper capped: {})",
                        caps.lower, caps.upper
                    )
                })
                .collect();
            writeln!(f, "  {}", parts.join(", "))?;
            writeln!(f)?;
        }

        if !self.categorical_filled.is_empty() {
            writeln!(
                f,
                "- Categorical columns with missing values filled with 'Not Specified':"
            )?;
            let parts: Vec<String> = self
                .categorical_filled
                .iter()
                .map(|(col, count)| format!("{col} ({count} values)"))
                .collect();
            writeln!(f, "  {}", parts.join(", "))?;
            writeln!(f)?;
        }

        if !self.categorical_removed.is_empty() {
            writeln!(
                f,
                "- Categorical columns removed due to over 90% missing data:"
            )?;
            writeln!(f, "  {}", self.categorical_removed.join(", "))?;
            writeln!(f)?;
        }

        if !self.datetime_filled.is_empty() {
            writeln!(
                f,
                "- Datetime columns with missing values filled using the column mode:"
            )?;
            let parts: Vec<String> = self
                .datetime_filled
                .iter()
                .map(|(col, count)| format!("{col} ({count} values)"))
                .collect();
            writeln!(f, "  {}", parts.join(", "))?;
            writeln!(f)?;
        }

        writeln!(f, "- Total number of rows removed: {}", self.rows_removed)?;
        writeln!(
            f,
            "- Total number of columns removed: {}",
            self.columns_removed
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "Next, categorical fields are reviewed for any unreasonable values."
        )
    }
}

/// Run the deterministic cleaning pass
pub fn clean(dataset: &Dataset) -> (Dataset, CleanSummary) {
    let mut cleaned = dataset.clone();
    let mut summary = CleanSummary::default();

    remove_empty(&mut cleaned, &mut summary);
    clean_numeric(&mut cleaned, &mut summary);
    clean_categorical(&mut cleaned, &mut summary);
    clean_datetime(&mut cleaned, &mut summary);

    (cleaned, summary)
}

fn remove_empty(dataset: &mut Dataset, summary: &mut CleanSummary) {
    let rows_before = dataset.n_rows();
    if dataset.n_cols() > 0 {
        let empty_rows: Vec<bool> = (0..rows_before)
            .map(|row| dataset.iter().all(|(_, column)| column.is_missing(row)))
            .collect();
        dataset.retain_rows(|row| !empty_rows[row]);
    }
    summary.rows_removed = rows_before - dataset.n_rows();

    let empty_columns: Vec<String> = dataset
        .iter()
        .filter(|(_, column)| !column.is_empty() && column.missing_count() == column.len())
        .map(|(name, _)| name.to_string())
        .collect();
    summary.columns_removed = empty_columns.len();
    for name in &empty_columns {
        // Cannot fail: the name came from the dataset itself.
        let _ = dataset.drop_column(name);
    }
}

fn clean_numeric(dataset: &mut Dataset, summary: &mut CleanSummary) {
    let names: Vec<String> = dataset
        .iter()
        .filter(|(_, c)| matches!(c, Column::Numeric(_)))
        .map(|(n, _)| n.to_string())
        .collect();

    for name in names {
        let Some(column) = dataset.column(&name) else {
            continue;
        };
        let missing = column.missing_count();
        if missing > 0 {
            let _ = dataset.fill_na_mean(&name);
            summary.numeric_filled.push((name.clone(), missing));
        }

        let Some(column) = dataset.column(&name) else {
            continue;
        };
        let (Some(lo), Some(hi)) = (
            column.quantile(LOWER_QUANTILE),
            column.quantile(UPPER_QUANTILE),
        ) else {
            continue;
        };
        let Column::Numeric(cells) = column else {
            continue;
        };
        let caps = CapCounts {
            lower: cells.iter().filter(|x| x.is_finite() && **x < lo).count(),
            upper: cells.iter().filter(|x| x.is_finite() && **x > hi).count(),
        };
        if caps.lower > 0 || caps.upper > 0 {
            let _ = dataset.cap(&name, lo, hi);
            summary.outliers_capped.push((name, caps));
        }
    }
}

fn clean_categorical(dataset: &mut Dataset, summary: &mut CleanSummary) {
    let names: Vec<String> = dataset
        .iter()
        .filter(|(_, c)| matches!(c, Column::Categorical(_)))
        .map(|(n, _)| n.to_string())
        .collect();

    for name in names {
        normalize_categorical(dataset, &name);

        let Some(column) = dataset.column(&name) else {
            continue;
        };
        if column.is_empty() {
            continue;
        }
        let missing = column.missing_count();
        let missing_share = missing as f64 / column.len() as f64;

        if missing_share > MISSING_DROP_THRESHOLD {
            let _ = dataset.drop_column(&name);
            summary.categorical_removed.push(name);
        } else if missing > 0 {
            let _ = dataset.fill_na(&name, Cell::Text("Not Specified".to_string()));
            summary.categorical_filled.push((name, missing));
        }
    }
}

/// Trim whitespace and turn invalid tokens into missing cells
fn normalize_categorical(dataset: &mut Dataset, name: &str) {
    let Ok(Column::Categorical(cells)) = dataset.column_mut(name) else {
        return;
    };
    for cell in cells.iter_mut() {
        if let Some(text) = cell {
            let trimmed = text.trim();
            if INVALID_TOKENS.contains(&trimmed.to_lowercase().as_str()) {
                *cell = None;
            } else if trimmed.len() != text.len() {
                *cell = Some(trimmed.to_string());
            }
        }
    }
}

fn clean_datetime(dataset: &mut Dataset, summary: &mut CleanSummary) {
    let names: Vec<String> = dataset
        .iter()
        .filter(|(_, c)| matches!(c, Column::Datetime(_)))
        .map(|(n, _)| n.to_string())
        .collect();

    for name in names {
        let Some(column) = dataset.column(&name) else {
            continue;
        };
        let missing = column.missing_count();
        let Some(mode) = column.mode_datetime() else {
            continue;
        };
        if missing > 0 {
            let _ = dataset.fill_na(&name, Cell::Timestamp(mode));
            summary.datetime_filled.push((name, missing));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_dataset() -> Dataset {
        Dataset::with_columns(vec![(
            "salary".to_string(),
            Column::numeric(vec![1.0, 2.0, f64::NAN, 1000.0]),
        )])
        .unwrap()
    }

    #[test]
    fn test_mean_fill_uses_pre_cap_mean() {
        let (cleaned, summary) = clean(&numeric_dataset());
        let Some(Column::Numeric(cells)) = cleaned.column("salary") else {
            panic!("expected numeric");
        };
        // Mean of [1, 2, 1000], computed before any capping.
        assert!((cells[2] - 334.3333333333333).abs() < 1e-9);
        assert_eq!(summary.numeric_filled, vec![("salary".to_string(), 1)]);
    }

    #[test]
    fn test_outlier_capped_at_99th_percentile() {
        let (cleaned, summary) = clean(&numeric_dataset());
        let Some(Column::Numeric(cells)) = cleaned.column("salary") else {
            panic!("expected numeric");
        };
        // Filled column is [1, 2, 334.33, 1000]; q99 interpolates to ~980.03.
        assert!((cells[3] - 980.0333333333333).abs() < 1e-6);
        let caps = &summary.outliers_capped[0];
        assert_eq!(caps.0, "salary");
        assert_eq!(caps.1.upper, 1);
    }

    #[test]
    fn test_summary_counts_render() {
        let (_, summary) = clean(&numeric_dataset());
        let text = summary.to_string();
        assert!(text.contains("**Data Cleaning Result:**"));
        assert!(text.contains("salary (1 values)"));
        assert!(text.contains("upper capped: 1"));
        assert!(text.contains("Total number of rows removed: 0"));
    }

    #[test]
    fn test_invalid_tokens_become_missing_then_filled() {
        let dataset = Dataset::with_columns(vec![(
            "team".to_string(),
            Column::categorical(vec![
                Some("red".to_string()),
                Some(" n/a ".to_string()),
                Some("NULL".to_string()),
                Some("blue ".to_string()),
            ]),
        )])
        .unwrap();
        let (cleaned, summary) = clean(&dataset);
        let Some(Column::Categorical(cells)) = cleaned.column("team") else {
            panic!("expected categorical");
        };
        assert_eq!(cells[1].as_deref(), Some("Not Specified"));
        assert_eq!(cells[2].as_deref(), Some("Not Specified"));
        assert_eq!(cells[3].as_deref(), Some("blue"));
        assert_eq!(summary.categorical_filled, vec![("team".to_string(), 2)]);
    }

    #[test]
    fn test_mostly_missing_categorical_dropped() {
        let mut cells = vec![None; 19];
        cells.push(Some("lonely".to_string()));
        let dataset = Dataset::with_columns(vec![
            ("junk".to_string(), Column::categorical(cells)),
            ("id".to_string(), Column::numeric((0..20).map(f64::from).collect())),
        ])
        .unwrap();
        let (cleaned, summary) = clean(&dataset);
        assert!(cleaned.column("junk").is_none());
        assert_eq!(summary.categorical_removed, vec!["junk".to_string()]);
    }

    #[test]
    fn test_ninety_percent_missing_is_kept() {
        // Exactly 90% missing is not "over 90%".
        let mut cells = vec![None; 9];
        cells.push(Some("kept".to_string()));
        let dataset =
            Dataset::with_columns(vec![("col".to_string(), Column::categorical(cells))]).unwrap();
        let (cleaned, _) = clean(&dataset);
        assert!(cleaned.column("col").is_some());
    }

    #[test]
    fn test_empty_rows_and_columns_removed() {
        let dataset = Dataset::with_columns(vec![
            (
                "a".to_string(),
                Column::numeric(vec![1.0, f64::NAN, 3.0]),
            ),
            (
                "b".to_string(),
                Column::categorical(vec![Some("x".to_string()), None, Some("y".to_string())]),
            ),
            ("void".to_string(), Column::numeric(vec![f64::NAN; 3])),
        ])
        .unwrap();
        let (cleaned, summary) = clean(&dataset);
        // Row 1 was missing in every column; "void" was missing everywhere.
        assert_eq!(summary.rows_removed, 1);
        assert_eq!(summary.columns_removed, 1);
        assert_eq!(cleaned.n_rows(), 2);
        assert!(cleaned.column("void").is_none());
    }

    #[test]
    fn test_datetime_mode_fill() {
        let dataset = Dataset::with_columns(vec![(
            "joined".to_string(),
            Column::datetime(vec![Some(100), Some(100), None, Some(200)]),
        )])
        .unwrap();
        let (cleaned, summary) = clean(&dataset);
        let Some(Column::Datetime(cells)) = cleaned.column("joined") else {
            panic!("expected datetime");
        };
        assert_eq!(cells[2], Some(100));
        assert_eq!(summary.datetime_filled, vec![("joined".to_string(), 1)]);
    }

    #[test]
    fn test_clean_is_pure() {
        let dataset = numeric_dataset();
        let before = dataset.clone();
        let _ = clean(&dataset);
        assert_eq!(dataset, before);
    }
}
