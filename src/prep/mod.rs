//! Config-driven feature preparation
//!
//! The stages run in a fixed order: dummy expansion, row filtering, dropping
//! rows with a missing target, train/test split, then missing-value
//! aggregates computed on train and applied to both sides.

pub mod aggregates;
pub mod dummies;
pub mod filter;
pub mod split;

pub use aggregates::{apply_aggregates, compute_aggregates, AggregateValue, FeatureAggregates};
pub use dummies::create_dummy_features;
pub use filter::{apply_filtering, drop_missing_target, FILTER_COLUMN};
pub use split::split;

use crate::artifacts::RunDir;
use crate::config::RunConfig;
use crate::error::Result;
use crate::data::loader;
use polars::prelude::*;
use tracing::info;

/// Final model feature list: simple features in configuration order,
/// followed by generated dummy features in generation order.
pub fn collate_features(config: &RunConfig, dummy_features: &[String]) -> Vec<String> {
    let simple: Vec<String> = config.simple_features.keys().cloned().collect();
    info!(
        simple = simple.len(),
        dummy = dummy_features.len(),
        total = simple.len() + dummy_features.len(),
        "collated model features"
    );
    simple
        .into_iter()
        .chain(dummy_features.iter().cloned())
        .collect()
}

/// Persist prepared train, test and combined frames to the run directory
pub fn save_prepared(train: &DataFrame, test: &DataFrame, run_dir: &RunDir) -> Result<()> {
    let path = run_dir.file("prep_train.parquet");
    info!(path = %path.display(), "saving prepared train data");
    loader::save_parquet(&mut train.clone(), &path)?;

    let path = run_dir.file("prep_test.parquet");
    info!(path = %path.display(), "saving prepared test data");
    loader::save_parquet(&mut test.clone(), &path)?;

    let mut combined = train.vstack(test)?;
    let path = run_dir.file("prep_train_test.parquet");
    info!(path = %path.display(), "saving combined prepared data");
    loader::save_parquet(&mut combined, &path)?;

    Ok(())
}
