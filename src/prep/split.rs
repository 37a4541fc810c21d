//! Train/test split strategies

use crate::config::RunConfig;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{info, warn};

/// Default hold-out fraction for a randomized split with no explicit size
const DEFAULT_TEST_SIZE: f64 = 0.25;

/// Partition the dataset into train and test frames.
///
/// Three mutually exclusive modes, by configuration precedence: an existing
/// binary assignment column (1 = train, 0 = test), a randomized split with a
/// test fraction and optional seed, or no split at all, in which case the
/// whole frame is train and test is empty.
pub fn split(df: DataFrame, config: &RunConfig) -> Result<(DataFrame, DataFrame)> {
    let Some(params) = &config.split else {
        warn!("no test set specified");
        let test = df.clear();
        info!(train = df.height(), test = test.height(), "split sizes");
        return Ok((df, test));
    };

    let (train, test) = if let Some(field) = &params.field {
        split_by_column(&df, field)?
    } else {
        split_at_random(
            &df,
            params.test_size.unwrap_or(DEFAULT_TEST_SIZE),
            params.random_state,
        )?
    };

    info!(train = train.height(), test = test.height(), "split sizes");
    Ok((train, test))
}

/// Assign rows by an existing binary column; rows with any other value
/// (including missing) belong to neither side.
fn split_by_column(df: &DataFrame, field: &str) -> Result<(DataFrame, DataFrame)> {
    info!(field, "splitting sample using existing column");

    let column = df
        .column(field)
        .map_err(|_| PipelineError::ColumnNotFound(field.to_string()))?;
    let assignments = column.cast(&DataType::Int64)?;
    let ca = assignments.i64()?;

    let train_mask: BooleanChunked = ca.into_iter().map(|v| v == Some(1)).collect();
    let test_mask: BooleanChunked = ca.into_iter().map(|v| v == Some(0)).collect();

    Ok((df.filter(&train_mask)?, df.filter(&test_mask)?))
}

/// Randomized split holding out `test_size` of the rows; a fixed seed makes
/// the partition reproducible.
fn split_at_random(
    df: &DataFrame,
    test_size: f64,
    random_state: Option<u64>,
) -> Result<(DataFrame, DataFrame)> {
    info!(test_size, "splitting sample at random");

    let n = df.height();
    let n_test = ((n as f64) * test_size).ceil() as usize;

    let mut rng = match random_state {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    };

    let mut indices: Vec<IdxSize> = (0..n as IdxSize).collect();
    indices.shuffle(&mut rng);

    let mut test_idx: Vec<IdxSize> = indices[..n_test].to_vec();
    let mut train_idx: Vec<IdxSize> = indices[n_test..].to_vec();
    // Keep original row order within each side
    test_idx.sort_unstable();
    train_idx.sort_unstable();

    let train = df.take(&IdxCa::from_vec("".into(), train_idx))?;
    let test = df.take(&IdxCa::from_vec("".into(), test_idx))?;

    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitConfig;

    fn base_config() -> RunConfig {
        serde_yaml::from_str("data_file: data/input.parquet\nrun_name: test_run\ntarget: y\n")
            .unwrap()
    }

    fn frame(n: usize) -> DataFrame {
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        DataFrame::new(vec![Column::new("y".into(), values)]).unwrap()
    }

    #[test]
    fn test_no_split_gives_empty_test() {
        let config = base_config();
        let (train, test) = split(frame(10), &config).unwrap();

        assert_eq!(train.height(), 10);
        assert_eq!(test.height(), 0);
        assert_eq!(test.get_column_names(), train.get_column_names());
    }

    #[test]
    fn test_split_by_existing_column() {
        let df = DataFrame::new(vec![
            Column::new("y".into(), &[1.0, 2.0, 3.0, 4.0]),
            Column::new(
                "my_split".into(),
                &[Some(1i64), Some(0), Some(1), None],
            ),
        ])
        .unwrap();

        let mut config = base_config();
        config.split = Some(SplitConfig {
            field: Some("my_split".to_string()),
            ..Default::default()
        });

        let (train, test) = split(df, &config).unwrap();
        assert_eq!(train.height(), 2);
        assert_eq!(test.height(), 1);
    }

    #[test]
    fn test_random_split_sizes_and_disjointness() {
        let mut config = base_config();
        config.split = Some(SplitConfig {
            test_size: Some(0.2),
            random_state: Some(7),
            ..Default::default()
        });

        let (train, test) = split(frame(100), &config).unwrap();
        assert_eq!(test.height(), 20);
        assert_eq!(train.height(), 80);

        let mut all: Vec<f64> = train
            .column("y")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .chain(test.column("y").unwrap().f64().unwrap().into_iter().flatten())
            .collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_random_split_is_reproducible() {
        let mut config = base_config();
        config.split = Some(SplitConfig {
            test_size: Some(0.3),
            random_state: Some(42),
            ..Default::default()
        });

        let (train_a, test_a) = split(frame(50), &config).unwrap();
        let (train_b, test_b) = split(frame(50), &config).unwrap();

        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
    }

    #[test]
    fn test_missing_split_column_fails() {
        let mut config = base_config();
        config.split = Some(SplitConfig {
            field: Some("nope".to_string()),
            ..Default::default()
        });

        let err = split(frame(5), &config).unwrap_err();
        assert!(matches!(err, PipelineError::ColumnNotFound(_)));
    }
}
