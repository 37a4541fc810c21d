//! Indicator features for categorical columns, with low-frequency bucketing

use crate::config::RunConfig;
use crate::data::schema::clean_name;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Separator between source column and value in generated column names.
/// Chosen to be unlikely to collide with real column content.
pub const DUMMY_SEPARATOR: &str = "_##_";

/// Name of the merged bucket for below-threshold categories
pub const OTHER_BUCKET: &str = "other_combined";

/// Expand every configured categorical column into indicator features.
///
/// Returns the augmented frame plus the generated column names in order.
pub fn create_dummy_features(
    mut df: DataFrame,
    config: &RunConfig,
) -> Result<(DataFrame, Vec<String>)> {
    let mut dummy_features = Vec::new();

    for column in &config.dummy_features {
        let (series, names) = compressed_dummies(&df, column, config.min_dummy_percent)?;
        for s in series {
            df.with_column(s)?;
        }
        dummy_features.extend(names);
    }

    Ok((df, dummy_features))
}

/// Build indicator columns for one categorical column.
///
/// Values are stringified and cleaned with the column-name rules; missing
/// values become the literal category `null`. Every value whose relative
/// frequency meets `min_dummy` gets a dedicated `{column}_##_{value}` column
/// (values in sorted order); the rest are merged into a single
/// `{column}_##_other_combined` bucket, which is always emitted. The cleaned
/// values also replace the source column.
fn compressed_dummies(
    df: &DataFrame,
    column: &str,
    min_dummy: f64,
) -> Result<(Vec<Series>, Vec<String>)> {
    let source = df
        .column(column)
        .map_err(|_| PipelineError::ColumnNotFound(column.to_string()))?;

    let strings = source.cast(&DataType::String)?;
    let cleaned: Vec<String> = strings
        .str()?
        .into_iter()
        .map(|value| match value {
            Some(v) => clean_name(v),
            None => "null".to_string(),
        })
        .collect();

    let total = cleaned.len() as f64;
    let (mut kept, n_categories) = {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in &cleaned {
            *counts.entry(value.as_str()).or_insert(0) += 1;
        }
        let kept: Vec<String> = counts
            .iter()
            .filter(|(_, &count)| count as f64 / total >= min_dummy)
            .map(|(&value, _)| value.to_string())
            .collect();
        (kept, counts.len())
    };
    kept.sort_unstable();
    debug!(
        column,
        categories = n_categories,
        kept = kept.len(),
        "compressing dummy categories"
    );

    let mut series = Vec::with_capacity(kept.len() + 2);
    let mut names = Vec::with_capacity(kept.len() + 1);

    for value in &kept {
        let name = format!("{column}{DUMMY_SEPARATOR}{value}");
        let indicators: Vec<i32> = cleaned.iter().map(|c| i32::from(c == value)).collect();
        series.push(Series::new(name.as_str().into(), indicators));
        names.push(name);
    }

    let other_name = format!("{column}{DUMMY_SEPARATOR}{OTHER_BUCKET}");
    let other: Vec<i32> = cleaned
        .iter()
        .map(|c| i32::from(!kept.contains(c)))
        .collect();
    series.push(Series::new(other_name.as_str().into(), other));
    names.push(other_name);

    // Source column keeps the cleaned values so later stages see them
    series.push(Series::new(column.into(), cleaned));

    Ok((series, names))
}
