//! Row filtering driven by the `_filter` label column

use crate::config::RunConfig;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use tracing::{debug, info};

/// Label column the upstream transform writes filter reasons into
pub const FILTER_COLUMN: &str = "_filter";

/// Remove rows whose `_filter` value contains any configured substring.
///
/// The `_filter` column must exist in processed data even when no filters are
/// configured; configuring no filter labels makes this a no-op.
pub fn apply_filtering(df: DataFrame, config: &RunConfig) -> Result<DataFrame> {
    let column = df.column(FILTER_COLUMN).map_err(|_| {
        PipelineError::Validation(format!(
            "expects `{FILTER_COLUMN}` column in processed data"
        ))
    })?;

    if config.filters.is_empty() {
        debug!("no filter conditions from config, passing");
        return Ok(df);
    }

    let ca = column.str()?;
    let mask: BooleanChunked = ca
        .into_iter()
        .map(|value| {
            let labels = value.unwrap_or("");
            !config.filters.iter().any(|f| labels.contains(f.as_str()))
        })
        .collect();

    info!(
        filters = ?config.filters,
        rows = df.height(),
        "applying filters to dataset"
    );
    let filtered = df.filter(&mask)?;
    info!(rows = filtered.height(), "post filter shape");

    Ok(filtered)
}

/// Drop rows with a missing target value
pub fn drop_missing_target(df: DataFrame, config: &RunConfig) -> Result<DataFrame> {
    let target = df
        .column(&config.target)
        .map_err(|_| PipelineError::ColumnNotFound(config.target.clone()))?;

    info!(rows = df.height(), "original data size");
    let kept = df.filter(&target.is_not_null())?;
    info!(rows = kept.height(), "size after dropping missing target");

    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_filters(filters: &[&str]) -> RunConfig {
        let mut config: RunConfig = serde_yaml::from_str(
            "data_file: data/input.parquet\nrun_name: test_run\ntarget: price\n",
        )
        .unwrap();
        config.filters = filters.iter().map(|s| s.to_string()).collect();
        config
    }

    fn frame_with_filter_column() -> DataFrame {
        DataFrame::new(vec![
            Column::new(
                FILTER_COLUMN.into(),
                &["remove_me", "", "remove_me, x", ""],
            ),
            Column::new("price".into(), &[1.0, 2.0, 3.0, 4.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_filtering_retains_unlabelled_rows() {
        let df = frame_with_filter_column();
        let config = config_with_filters(&["remove_me"]);

        let filtered = apply_filtering(df, &config).unwrap();
        assert_eq!(filtered.height(), 2);

        let prices: Vec<f64> = filtered
            .column("price")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(prices, vec![2.0, 4.0]);
    }

    #[test]
    fn test_no_filters_is_noop() {
        let df = frame_with_filter_column();
        let config = config_with_filters(&[]);
        let filtered = apply_filtering(df, &config).unwrap();
        assert_eq!(filtered.height(), 4);
    }

    #[test]
    fn test_missing_filter_column_fails() {
        let df = DataFrame::new(vec![Column::new("price".into(), &[1.0, 2.0])]).unwrap();
        let config = config_with_filters(&[]);
        let err = apply_filtering(df, &config).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn test_drop_missing_target() {
        let df = DataFrame::new(vec![Column::new(
            "price".into(),
            &[Some(1.0), None, Some(3.0)],
        )])
        .unwrap();
        let config = config_with_filters(&[]);

        let kept = drop_missing_target(df, &config).unwrap();
        assert_eq!(kept.height(), 2);
    }
}
