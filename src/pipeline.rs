//! End-to-end run orchestration
//!
//! Stages run strictly in sequence; the first error propagates out to the
//! caller. There is no retry layer and no partial-failure recovery.

use crate::artifacts::RunDir;
use crate::config::RunConfig;
use crate::data::schema::TableSchema;
use crate::data::loader;
use crate::error::Result;
use crate::prep;
use crate::report::plots;
use crate::training;
use tracing::info;

/// Run the full pipeline for one configuration
pub fn run(config: &RunConfig) -> Result<()> {
    let run_dir = RunDir::create(config)?;

    info!(path = %config.data_file.display(), "loading input data");
    let mut df = loader::load(&config.data_file)?;

    if let Some(schema_path) = &config.schema_file {
        info!(path = %schema_path.display(), "checking data against declared schema");
        let schema = TableSchema::load(schema_path)?;
        df = schema.validate(df)?;
    }

    let (df, dummy_features) = prep::create_dummy_features(df, config)?;
    let df = prep::apply_filtering(df, config)?;
    let df = prep::drop_missing_target(df, config)?;

    let (train, test) = prep::split(df, config)?;

    let aggregates = prep::compute_aggregates(&train, config)?;
    aggregates.save(&run_dir)?;
    let train = prep::apply_aggregates(train, &aggregates)?;
    let test = prep::apply_aggregates(test, &aggregates)?;

    if config.save_data {
        prep::save_prepared(&train, &test, &run_dir)?;
    }

    let features = prep::collate_features(config, &dummy_features);
    save_feature_list(&features, &run_dir)?;

    let Some(kind) = config.model else {
        info!("no model configured, stopping after preparation");
        return Ok(());
    };

    let outcome = training::run(kind, &train, &test, &features, config, &run_dir)?;

    plots::univariate_plots(&train, &outcome.reporting_features, config, &run_dir)?;
    plots::correlation_matrix(&train, &outcome.reporting_features, &run_dir)?;

    Ok(())
}

fn save_feature_list(features: &[String], run_dir: &RunDir) -> Result<()> {
    let path = run_dir.file("features.json");
    info!(path = %path.display(), "saving model feature list");
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, features)?;
    Ok(())
}
