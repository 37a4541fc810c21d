//! Declared table schemas
//!
//! A schema standardizes a raw input file before the pipeline touches it:
//! column names are cleaned to lowercase/underscore form, duplicate rows can
//! be forbidden, and per-column type, nullability, uniqueness, range and
//! allowed-value expectations are checked. All violations found in one pass
//! are reported together in a single validation error.

use crate::error::{PipelineError, Result};
use indexmap::IndexMap;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Clean a single column name or categorical value
pub fn clean_name(name: &str) -> String {
    name.to_lowercase()
        .trim()
        .replace("  ", "_")
        .replace('/', "_")
        .replace('\n', "_")
        .replace('\\', "_")
        .replace('\t', "_")
        .replace(' ', "_")
        .replace('^', "")
}

/// Map a list of column names to their cleaned forms
pub fn clean_column_names<'a, I>(columns: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    columns
        .into_iter()
        .map(|c| (c.to_string(), clean_name(c)))
        .collect()
}

/// Expected column type families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaDtype {
    Int,
    Float,
    Str,
    Bool,
}

fn dtype_matches(expected: SchemaDtype, actual: &DataType) -> bool {
    use DataType::*;
    match expected {
        SchemaDtype::Int => matches!(
            actual,
            Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64
        ),
        SchemaDtype::Float => matches!(actual, Float32 | Float64),
        SchemaDtype::Str => matches!(actual, String),
        SchemaDtype::Bool => matches!(actual, Boolean),
    }
}

/// Expectations for one column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Expected type family
    pub dtype: SchemaDtype,
    /// Whether missing values are permitted
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Whether every value must be distinct
    #[serde(default)]
    pub unique: bool,
    /// Inclusive lower bound for numeric columns
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric columns
    #[serde(default)]
    pub max: Option<f64>,
    /// Exhaustive list of permitted values for string columns
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

/// Declared schema for one input table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Whether duplicate rows are permitted
    #[serde(default = "default_true")]
    pub allow_duplicates: bool,
    /// Require the column set to match the schema exactly
    #[serde(default)]
    pub strict: bool,
    /// Per-column expectations, keyed by cleaned column name
    pub columns: IndexMap<String, ColumnSchema>,
}

impl TableSchema {
    /// Load a schema from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Clean column names, then check the frame against the schema.
    ///
    /// Returns the renamed frame. Every violation found is collected and
    /// reported in one error rather than failing on the first.
    pub fn validate(&self, df: DataFrame) -> Result<DataFrame> {
        let df = rename_columns(df)?;
        let mut violations: Vec<String> = Vec::new();

        if !self.allow_duplicates {
            let deduped = df.unique::<String, String>(None, UniqueKeepStrategy::First, None)?;
            if deduped.height() != df.height() {
                violations.push(format!(
                    "{} duplicate rows detected",
                    df.height() - deduped.height()
                ));
            }
        }

        if self.strict {
            for name in df.get_column_names() {
                if !self.columns.contains_key(name.as_str()) {
                    violations.push(format!("unexpected column `{name}`"));
                }
            }
        }

        for (name, expected) in &self.columns {
            let column = match df.column(name) {
                Ok(column) => column,
                Err(_) => {
                    violations.push(format!("missing column `{name}`"));
                    continue;
                }
            };

            if !dtype_matches(expected.dtype, column.dtype()) {
                violations.push(format!(
                    "column `{name}` has dtype {:?}, expected {:?}",
                    column.dtype(),
                    expected.dtype
                ));
                continue;
            }

            if !expected.nullable && column.null_count() > 0 {
                violations.push(format!(
                    "column `{name}` contains {} missing values but is not nullable",
                    column.null_count()
                ));
            }

            if expected.unique {
                let distinct = column.n_unique()?;
                if distinct != column.len() {
                    violations.push(format!(
                        "column `{name}` has {} duplicated values",
                        column.len() - distinct
                    ));
                }
            }

            if expected.min.is_some() || expected.max.is_some() {
                let ca = column.cast(&DataType::Float64)?;
                let ca = ca.f64()?;
                if let (Some(bound), Some(observed)) = (expected.min, ca.min()) {
                    if observed < bound {
                        violations.push(format!(
                            "column `{name}` has minimum {observed}, below bound {bound}"
                        ));
                    }
                }
                if let (Some(bound), Some(observed)) = (expected.max, ca.max()) {
                    if observed > bound {
                        violations.push(format!(
                            "column `{name}` has maximum {observed}, above bound {bound}"
                        ));
                    }
                }
            }

            if let Some(allowed) = &expected.allowed {
                let ca = column.cast(&DataType::String)?;
                let ca = ca.str()?;
                let mut bad: Vec<String> = Vec::new();
                for value in ca.into_iter().flatten() {
                    if !allowed.iter().any(|a| a == value) && !bad.iter().any(|b| b == value) {
                        bad.push(value.to_string());
                    }
                }
                if !bad.is_empty() {
                    violations.push(format!(
                        "column `{name}` contains values outside the allowed set: {}",
                        bad.join(", ")
                    ));
                }
            }
        }

        if violations.is_empty() {
            info!("schema validation checks passed");
            Ok(df)
        } else {
            Err(PipelineError::Validation(format!(
                "schema check failed; {}",
                violations.join("; ")
            )))
        }
    }
}

/// Rename every column to its cleaned form
pub fn rename_columns(mut df: DataFrame) -> Result<DataFrame> {
    let cleaned: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| clean_name(name.as_str()))
        .collect();
    df.set_column_names(cleaned)?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_yaml() -> &'static str {
        "\
allow_duplicates: false
columns:
  id:
    dtype: int
    nullable: false
    unique: true
  age:
    dtype: float
    min: 0.0
    max: 120.0
  sex:
    dtype: str
    allowed: [male, female]
"
    }

    fn valid_frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("id".into(), &[1i64, 2, 3]),
            Column::new("age".into(), &[22.0, 35.5, 61.0]),
            Column::new("sex".into(), &["male", "female", "male"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("Fare Amount"), "fare_amount");
        assert_eq!(clean_name("  A/B  "), "a_b");
        assert_eq!(clean_name("x^2"), "x2");
    }

    #[test]
    fn test_rename_columns() {
        let df = DataFrame::new(vec![Column::new("Fare Amount".into(), &[1.0, 2.0])]).unwrap();
        let df = rename_columns(df).unwrap();
        assert!(df.column("fare_amount").is_ok());
    }

    #[test]
    fn test_valid_frame_passes() {
        let schema: TableSchema = serde_yaml::from_str(schema_yaml()).unwrap();
        assert!(schema.validate(valid_frame()).is_ok());
    }

    #[test]
    fn test_violations_are_aggregated() {
        let schema: TableSchema = serde_yaml::from_str(schema_yaml()).unwrap();
        let df = DataFrame::new(vec![
            Column::new("id".into(), &[1i64, 1, 3]),
            Column::new("age".into(), &[-5.0, 35.5, 200.0]),
            Column::new("sex".into(), &["male", "robot", "male"]),
        ])
        .unwrap();

        let err = schema.validate(df).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("id"));
        assert!(message.contains("age"));
        assert!(message.contains("robot"));
    }

    #[test]
    fn test_missing_column_reported() {
        let schema: TableSchema = serde_yaml::from_str(schema_yaml()).unwrap();
        let df = DataFrame::new(vec![Column::new("id".into(), &[1i64, 2])]).unwrap();
        let err = schema.validate(df).unwrap_err();
        assert!(err.to_string().contains("missing column `age`"));
    }
}
