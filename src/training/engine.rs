//! Training orchestration: matrix extraction, model dispatch and artifacts

use crate::artifacts::RunDir;
use crate::config::{ModelKind, RunConfig};
use crate::data::loader;
use crate::error::{PipelineError, Result};
use crate::prep::dummies::DUMMY_SEPARATOR;
use crate::report::metrics::RegressionReport;
use crate::report::plots;
use crate::training::{GradientBoostingRegressor, LinearRegression, Model};
use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use tracing::info;

/// Result of one training pass
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// Features selected for downstream diagnostics
    pub reporting_features: Vec<String>,
    /// Metrics over the test set, absent when reporting was skipped
    pub report: Option<RegressionReport>,
}

/// Fit the configured model, persist predictions and importance artifacts,
/// and produce the metrics report unless test actuals are entirely missing.
pub fn run(
    kind: ModelKind,
    train: &DataFrame,
    test: &DataFrame,
    features: &[String],
    config: &RunConfig,
    run_dir: &RunDir,
) -> Result<TrainOutcome> {
    info!(model = kind.name(), "fitting model");

    let (predicted, reporting_features) = match kind {
        ModelKind::Baseline => {
            let predicted = column_options(test, config.baseline_column())?;
            (predicted, first_n(features, config.num_features_reporting))
        }
        ModelKind::Ols => {
            let x_train = to_matrix(train, features)?;
            let y_train = to_target(train, &config.target)?;

            let mut model = LinearRegression::new();
            model.fit(&x_train, &y_train)?;
            save_coefficients(&model, features, run_dir)?;

            let x_test = to_matrix(test, features)?;
            let predictions = model.predict(&x_test)?;
            (
                predictions.iter().map(|v| Some(*v)).collect(),
                first_n(features, config.num_features_reporting),
            )
        }
        ModelKind::GradientBoosting => {
            let x_train = to_matrix(train, features)?;
            let y_train = to_target(train, &config.target)?;

            let mut model = GradientBoostingRegressor::new(config.model_params.clone());
            model.fit(&x_train, &y_train)?;
            info!(model = kind.name(), "fit finished");

            let ranked = match model.feature_importances() {
                Some(importances) => save_importances(features, &importances, run_dir)?,
                None => features.to_vec(),
            };

            let x_test = to_matrix(test, features)?;
            let predictions = model.predict(&x_test)?;
            (
                predictions.iter().map(|v| Some(*v)).collect(),
                first_n(&ranked, config.num_features_reporting),
            )
        }
    };

    let actual = column_options(test, &config.target)?;
    let mut results = DataFrame::new(vec![
        Column::new("Actual".into(), actual.clone()),
        Column::new("Predicted".into(), predicted.clone()),
    ])?;

    let path = run_dir.file("predictions.csv");
    info!(path = %path.display(), "saving predictions");
    loader::save_csv(&mut results, &path)?;

    if actual.iter().all(|v| v.is_none()) {
        info!("actual target values entirely missing in test set, skipping metrics and plot");
        return Ok(TrainOutcome {
            reporting_features,
            report: None,
        });
    }

    let paired: Vec<(f64, f64)> = actual
        .iter()
        .zip(predicted.iter())
        .filter_map(|(a, p)| match (a, p) {
            (Some(a), Some(p)) => Some((*a, *p)),
            _ => None,
        })
        .collect();
    let actuals: Vec<f64> = paired.iter().map(|(a, _)| *a).collect();
    let predictions: Vec<f64> = paired.iter().map(|(_, p)| *p).collect();

    let report = RegressionReport::compute(&actuals, &predictions);
    report.save(run_dir)?;
    plots::metrics_scatter(&results, &report, config, run_dir, kind.name())?;

    Ok(TrainOutcome {
        reporting_features,
        report: Some(report),
    })
}

fn first_n(features: &[String], n: usize) -> Vec<String> {
    features.iter().take(n).cloned().collect()
}

/// Column values as options, cast to f64
fn column_options(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::ColumnNotFound(name.to_string()))?;
    let cast = column.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Target vector; remaining missing values become zero, as rows with a
/// missing target were dropped upstream
fn to_target(df: &DataFrame, name: &str) -> Result<Array1<f64>> {
    let values = column_options(df, name)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

/// Design matrix in feature order
fn to_matrix(df: &DataFrame, features: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = features.len();
    let mut data = Vec::with_capacity(n_rows * n_cols);

    for name in features {
        let column = df
            .column(name)
            .map_err(|_| PipelineError::ColumnNotFound(name.clone()))?;
        let cast = column.cast(&DataType::Float64)?;
        data.extend(cast.f64()?.into_iter().map(|v| v.unwrap_or(0.0)));
    }

    let x = Array2::from_shape_vec((n_cols, n_rows), data)
        .map_err(|e| PipelineError::Shape {
            expected: format!("({n_cols}, {n_rows})"),
            actual: e.to_string(),
        })?
        .t()
        .to_owned();

    Ok(x)
}

/// Persist OLS coefficients, intercept first
fn save_coefficients(
    model: &LinearRegression,
    features: &[String],
    run_dir: &RunDir,
) -> Result<()> {
    let coefficients = model
        .coefficients()
        .ok_or(PipelineError::ModelNotFitted)?;

    let mut names: Vec<&str> = vec!["(intercept)"];
    names.extend(features.iter().map(|f| f.as_str()));
    let mut values: Vec<f64> = vec![model.intercept()];
    values.extend(coefficients.iter().copied());

    let mut table = DataFrame::new(vec![
        Column::new("feature".into(), names),
        Column::new("coefficient".into(), values),
    ])?;

    let path = run_dir.file("coefficients.csv");
    info!(path = %path.display(), "saving coefficients");
    loader::save_csv(&mut table, &path)
}

/// Persist per-feature and per-group importance tables.
///
/// Returns the feature names ranked by importance, descending.
fn save_importances(
    features: &[String],
    importances: &Array1<f64>,
    run_dir: &RunDir,
) -> Result<Vec<String>> {
    let mut ranked: Vec<(&String, f64)> =
        features.iter().zip(importances.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    // Per-feature table, with the source column and value split back out of
    // generated dummy names
    let names: Vec<&str> = ranked.iter().map(|(f, _)| f.as_str()).collect();
    let values: Vec<f64> = ranked.iter().map(|(_, v)| *v).collect();
    let groups: Vec<&str> = names
        .iter()
        .map(|name| name.split(DUMMY_SEPARATOR).next().unwrap_or(name))
        .collect();
    let subgroups: Vec<Option<&str>> = names
        .iter()
        .map(|name| name.split_once(DUMMY_SEPARATOR).map(|(_, rest)| rest))
        .collect();

    let mut table = DataFrame::new(vec![
        Column::new("feature".into(), names),
        Column::new("importance".into(), values.clone()),
        Column::new("feature_group".into(), groups.clone()),
        Column::new("feature_subgroup".into(), subgroups),
    ])?;

    let path = run_dir.file("importance_subgroups.csv");
    info!(path = %path.display(), "saving per-feature importances");
    loader::save_csv(&mut table, &path)?;

    // Grouped table, summed per source column
    let mut grouped: IndexMap<&str, f64> = IndexMap::new();
    for (group, value) in groups.iter().zip(values.iter()) {
        *grouped.entry(group).or_insert(0.0) += value;
    }
    let mut grouped: Vec<(&str, f64)> = grouped.into_iter().collect();
    grouped.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut table = DataFrame::new(vec![
        Column::new(
            "feature_group".into(),
            grouped.iter().map(|(g, _)| *g).collect::<Vec<&str>>(),
        ),
        Column::new(
            "importance".into(),
            grouped.iter().map(|(_, v)| *v).collect::<Vec<f64>>(),
        ),
    ])?;

    let path = run_dir.file("importance.csv");
    info!(path = %path.display(), "saving grouped importances");
    loader::save_csv(&mut table, &path)?;

    Ok(ranked.into_iter().map(|(f, _)| f.clone()).collect())
}
