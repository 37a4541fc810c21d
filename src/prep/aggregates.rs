//! Missing-value aggregates computed on train and applied to both sides

use crate::artifacts::RunDir;
use crate::config::{Aggregation, RunConfig};
use crate::data::loader;
use crate::error::{PipelineError, Result};
use indexmap::IndexMap;
use polars::prelude::*;
use std::fmt;
use tracing::info;

/// A single representative statistic for one feature
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue {
    Numeric(f64),
    Text(String),
}

impl fmt::Display for AggregateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateValue::Numeric(v) => write!(f, "{v}"),
            AggregateValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Per-feature aggregates, in configuration order
#[derive(Debug, Clone, Default)]
pub struct FeatureAggregates {
    values: IndexMap<String, AggregateValue>,
}

impl FeatureAggregates {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AggregateValue)> {
        self.values.iter()
    }

    pub fn get(&self, feature: &str) -> Option<&AggregateValue> {
        self.values.get(feature)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Persist the aggregates table to the run directory
    pub fn save(&self, run_dir: &RunDir) -> Result<()> {
        let features: Vec<&str> = self.values.keys().map(|k| k.as_str()).collect();
        let rendered: Vec<String> = self.values.values().map(|v| v.to_string()).collect();

        let mut table = DataFrame::new(vec![
            Column::new("feature".into(), features),
            Column::new("aggregates".into(), rendered),
        ])?;

        let path = run_dir.file("calc_train_aggregates.csv");
        info!(path = %path.display(), "saving train aggregates");
        loader::save_csv(&mut table, &path)
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    use DataType::*;
    matches!(
        dtype,
        Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 | Float32 | Float64
    )
}

/// Compute the configured aggregation for every simple feature from training
/// data.
///
/// Before aggregating, every numeric feature is checked for infinite values;
/// all offending columns are reported together in one error.
pub fn compute_aggregates(train: &DataFrame, config: &RunConfig) -> Result<FeatureAggregates> {
    let mut infinite: Vec<String> = Vec::new();
    for feature in config.simple_features.keys() {
        let column = train
            .column(feature)
            .map_err(|_| PipelineError::ColumnNotFound(feature.clone()))?;
        if is_numeric(column.dtype()) {
            let values = column.cast(&DataType::Float64)?;
            let ca = values.f64()?;
            if ca.into_iter().flatten().any(|v| v.is_infinite()) {
                infinite.push(feature.clone());
            }
        }
    }
    if !infinite.is_empty() {
        return Err(PipelineError::Validation(format!(
            "one or more features contains -inf/inf, fix these: {}",
            infinite.join(", ")
        )));
    }

    let mut values = IndexMap::new();
    for (feature, aggregation) in &config.simple_features {
        let column = train.column(feature)?;
        let value = match aggregation {
            Aggregation::Mean => {
                if !is_numeric(column.dtype()) {
                    return Err(PipelineError::Validation(format!(
                        "cannot take the mean of non-numeric column `{feature}`"
                    )));
                }
                let cast = column.cast(&DataType::Float64)?;
                AggregateValue::Numeric(cast.f64()?.mean().unwrap_or(0.0))
            }
            Aggregation::Mode => {
                if matches!(column.dtype(), DataType::String) {
                    AggregateValue::Text(string_mode(column.str()?))
                } else {
                    let cast = column.cast(&DataType::Float64)?;
                    AggregateValue::Numeric(numeric_mode(cast.f64()?))
                }
            }
        };
        values.insert(feature.clone(), value);
    }

    Ok(FeatureAggregates { values })
}

/// Most frequent non-missing value; ties broken by the smallest value
fn numeric_mode(ca: &Float64Chunked) -> f64 {
    let mut sorted: Vec<f64> = ca.into_iter().flatten().collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut best = sorted[0];
    let mut best_count = 0usize;
    let mut run_value = sorted[0];
    let mut run_count = 0usize;
    for &v in &sorted {
        if v == run_value {
            run_count += 1;
        } else {
            run_value = v;
            run_count = 1;
        }
        if run_count > best_count {
            best = run_value;
            best_count = run_count;
        }
    }
    best
}

/// Most frequent non-missing string; ties broken lexicographically
fn string_mode(ca: &StringChunked) -> String {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for value in ca.into_iter().flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut entries: Vec<(&str, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    entries.first().map(|(v, _)| v.to_string()).unwrap_or_default()
}

/// Fill missing values in each aggregated column.
///
/// A missing column fails immediately; aggregate/column type mismatches are
/// collected across all columns and reported together.
pub fn apply_aggregates(mut df: DataFrame, aggregates: &FeatureAggregates) -> Result<DataFrame> {
    let mut mismatched: Vec<String> = Vec::new();

    for (feature, value) in aggregates.iter() {
        let column = df
            .column(feature)
            .map_err(|_| PipelineError::ColumnNotFound(feature.clone()))?;

        match value {
            AggregateValue::Numeric(fill) => {
                if is_numeric(column.dtype()) {
                    let cast = column.cast(&DataType::Float64)?;
                    let filled = cast.f64()?.fill_null_with_values(*fill)?;
                    df.with_column(filled.into_series())?;
                } else {
                    mismatched.push(feature.clone());
                }
            }
            AggregateValue::Text(fill) => {
                if matches!(column.dtype(), DataType::String) {
                    let ca = column.str()?;
                    let mut filled: StringChunked =
                        ca.iter().map(|opt| Some(opt.unwrap_or(fill.as_str()))).collect();
                    filled.rename(column.name().clone());
                    df.with_column(filled.into_series())?;
                } else {
                    mismatched.push(feature.clone());
                }
            }
        }
    }

    if !mismatched.is_empty() {
        return Err(PipelineError::Validation(format!(
            "aggregate type does not match column type (mean/mode likely swapped) for: {}",
            mismatched.join(", ")
        )));
    }

    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml_features: &str) -> RunConfig {
        let yaml = format!(
            "data_file: data/input.parquet\nrun_name: test_run\ntarget: price\nsimple_features:\n{yaml_features}"
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_mean_aggregate() {
        let train = DataFrame::new(vec![Column::new(
            "age".into(),
            &[Some(10.0), None, Some(30.0)],
        )])
        .unwrap();
        let config = config("  age: mean\n");

        let aggregates = compute_aggregates(&train, &config).unwrap();
        assert_eq!(
            aggregates.get("age"),
            Some(&AggregateValue::Numeric(20.0))
        );
    }

    #[test]
    fn test_mode_aggregate_numeric_and_text() {
        let train = DataFrame::new(vec![
            Column::new("grade".into(), &[1.0, 2.0, 2.0, 3.0]),
            Column::new("port".into(), &[Some("s"), Some("c"), Some("s"), None]),
        ])
        .unwrap();
        let config = config("  grade: mode\n  port: mode\n");

        let aggregates = compute_aggregates(&train, &config).unwrap();
        assert_eq!(aggregates.get("grade"), Some(&AggregateValue::Numeric(2.0)));
        assert_eq!(
            aggregates.get("port"),
            Some(&AggregateValue::Text("s".to_string()))
        );
    }

    #[test]
    fn test_mode_tie_breaks_to_smallest() {
        let train =
            DataFrame::new(vec![Column::new("grade".into(), &[3.0, 1.0, 3.0, 1.0])]).unwrap();
        let config = config("  grade: mode\n");

        let aggregates = compute_aggregates(&train, &config).unwrap();
        assert_eq!(aggregates.get("grade"), Some(&AggregateValue::Numeric(1.0)));
    }

    #[test]
    fn test_infinite_values_reported_together() {
        let train = DataFrame::new(vec![
            Column::new("a".into(), &[1.0, f64::INFINITY]),
            Column::new("b".into(), &[1.0, 2.0]),
            Column::new("c".into(), &[f64::NEG_INFINITY, 2.0]),
        ])
        .unwrap();
        let config = config("  a: mean\n  b: mean\n  c: mean\n");

        let err = compute_aggregates(&train, &config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("a"));
        assert!(message.contains("c"));
        assert!(!message.contains(" b"));
    }

    #[test]
    fn test_apply_fills_all_missing() {
        let train = DataFrame::new(vec![Column::new(
            "age".into(),
            &[Some(10.0), None, Some(30.0)],
        )])
        .unwrap();
        let config = config("  age: mean\n");

        let aggregates = compute_aggregates(&train, &config).unwrap();
        let filled = apply_aggregates(train, &aggregates).unwrap();

        let column = filled.column("age").unwrap();
        assert_eq!(column.null_count(), 0);
        let values: Vec<f64> = column.f64().unwrap().into_iter().flatten().collect();
        assert_eq!(values, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_apply_to_test_uses_train_statistics() {
        let train =
            DataFrame::new(vec![Column::new("age".into(), &[Some(10.0), Some(20.0)])]).unwrap();
        let test = DataFrame::new(vec![Column::new(
            "age".into(),
            &[None, Some(100.0)],
        )])
        .unwrap();
        let config = config("  age: mean\n");

        let aggregates = compute_aggregates(&train, &config).unwrap();
        let filled = apply_aggregates(test, &aggregates).unwrap();

        let values: Vec<f64> = filled
            .column("age")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(values, vec![15.0, 100.0]);
    }

    #[test]
    fn test_type_mismatches_reported_together() {
        let frame = DataFrame::new(vec![
            Column::new("a".into(), &["x", "y"]),
            Column::new("b".into(), &[1.0, 2.0]),
            Column::new("c".into(), &["p", "q"]),
        ])
        .unwrap();

        let mut values = IndexMap::new();
        values.insert("a".to_string(), AggregateValue::Numeric(1.0));
        values.insert("b".to_string(), AggregateValue::Numeric(1.5));
        values.insert("c".to_string(), AggregateValue::Numeric(2.0));
        let aggregates = FeatureAggregates { values };

        let err = apply_aggregates(frame, &aggregates).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("a"));
        assert!(message.contains("c"));
    }

    #[test]
    fn test_missing_column_fails_fast() {
        let frame = DataFrame::new(vec![Column::new("a".into(), &[1.0])]).unwrap();

        let mut values = IndexMap::new();
        values.insert("nope".to_string(), AggregateValue::Numeric(1.0));
        let aggregates = FeatureAggregates { values };

        let err = apply_aggregates(frame, &aggregates).unwrap_err();
        assert!(matches!(err, PipelineError::ColumnNotFound(_)));
    }
}
