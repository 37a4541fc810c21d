//! Run configuration: loaded once, validated once, immutable afterwards

use crate::error::{PipelineError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Aggregation used to fill missing values in a simple feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Arithmetic mean of the non-missing training values
    Mean,
    /// Most frequent training value (ties broken by smallest)
    Mode,
}

/// Model selected for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Naive model: predictions are a copy of a reference column
    Baseline,
    /// Ordinary least squares regression
    Ols,
    /// Gradient boosted regression trees
    GradientBoosting,
}

impl ModelKind {
    /// Short name used to label artifacts
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Baseline => "baseline",
            ModelKind::Ols => "ols",
            ModelKind::GradientBoosting => "gradient_boosting",
        }
    }
}

/// Train/test split specification.
///
/// Exactly one mode applies: an existing binary assignment column takes
/// precedence, else a randomized split with `test_size`, else no split.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    /// Pre-computed assignment column: 1 = train, 0 = test
    pub field: Option<String>,
    /// Fraction of rows held out for test in a randomized split
    pub test_size: Option<f64>,
    /// Seed for the randomized split
    pub random_state: Option<u64>,
}

/// Hyperparameters for the gradient boosting model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Shrinkage applied to each tree's contribution
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples in a leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio per boosting round
    pub subsample: f64,
    /// Seed for subsampling
    pub random_state: Option<u64>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

/// Configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Input data file (parquet, csv or json)
    pub data_file: PathBuf,

    /// Name of the run; keys the output directory
    pub run_name: String,

    /// Parent folder for run output directories
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,

    /// Target column to predict
    pub target: String,

    /// Reference column for the baseline model (defaults to the target)
    #[serde(default)]
    pub baseline: Option<String>,

    /// Simple features and the aggregation used to fill their missing values.
    /// Order is preserved and defines feature order.
    #[serde(default)]
    pub simple_features: IndexMap<String, Aggregation>,

    /// Categorical columns expanded into indicator features
    #[serde(default)]
    pub dummy_features: Vec<String>,

    /// Minimum relative frequency for a category to keep its own indicator
    #[serde(default = "default_min_dummy_percent")]
    pub min_dummy_percent: f64,

    /// Substrings matched against the `_filter` column to exclude rows
    #[serde(default)]
    pub filters: Vec<String>,

    /// Train/test split specification
    #[serde(default)]
    pub split: Option<SplitConfig>,

    /// Model to train; a run without a model stops after preparation
    #[serde(default, alias = "model_function_name")]
    pub model: Option<ModelKind>,

    /// Model hyperparameters
    #[serde(default)]
    pub model_params: ModelParams,

    /// Persist prepared train/test frames to the run directory
    #[serde(default)]
    pub save_data: bool,

    /// How many features receive individual diagnostics
    #[serde(default = "default_num_features_reporting")]
    pub num_features_reporting: usize,

    /// Lower quantile for clipping the metrics scatter plot
    #[serde(default)]
    pub plot_min_clip: f64,

    /// Upper quantile for clipping the metrics scatter plot
    #[serde(default = "default_plot_max_clip")]
    pub plot_max_clip: f64,

    /// Optional declared schema checked against the loaded data
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("models")
}

fn default_min_dummy_percent() -> f64 {
    0.001
}

fn default_num_features_reporting() -> usize {
    5
}

fn default_plot_max_clip() -> f64 {
    1.0
}

impl RunConfig {
    /// Load a run configuration from a YAML or JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
            Some("json") => serde_json::from_str(&text)?,
            _ => {
                return Err(PipelineError::Config(format!(
                    "unsupported config file type: {}",
                    path.display()
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Reference column used by the baseline model
    pub fn baseline_column(&self) -> &str {
        self.baseline.as_deref().unwrap_or(&self.target)
    }

    fn validate(&self) -> Result<()> {
        if self.run_name.trim().is_empty() {
            return Err(PipelineError::Config("run_name must not be empty".into()));
        }
        if self.target.trim().is_empty() {
            return Err(PipelineError::Config("target must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.min_dummy_percent) {
            return Err(PipelineError::Config(format!(
                "min_dummy_percent must be within [0, 1], got {}",
                self.min_dummy_percent
            )));
        }
        if !(0.0..=1.0).contains(&self.plot_min_clip)
            || !(0.0..=1.0).contains(&self.plot_max_clip)
            || self.plot_min_clip > self.plot_max_clip
        {
            return Err(PipelineError::Config(format!(
                "plot clip quantiles must satisfy 0 <= min <= max <= 1, got {} and {}",
                self.plot_min_clip, self.plot_max_clip
            )));
        }
        if let Some(split) = &self.split {
            if let Some(test_size) = split.test_size {
                if !(0.0..1.0).contains(&test_size) {
                    return Err(PipelineError::Config(format!(
                        "split.test_size must be within [0, 1), got {test_size}"
                    )));
                }
            }
        }
        if self.model_params.n_estimators == 0 {
            return Err(PipelineError::Config(
                "model_params.n_estimators must be positive".into(),
            ));
        }
        if !(0.0 < self.model_params.subsample && self.model_params.subsample <= 1.0) {
            return Err(PipelineError::Config(format!(
                "model_params.subsample must be within (0, 1], got {}",
                self.model_params.subsample
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        "data_file: data/input.parquet\nrun_name: test_run\ntarget: price\n"
    }

    #[test]
    fn test_defaults_applied() {
        let config: RunConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.min_dummy_percent, 0.001);
        assert_eq!(config.num_features_reporting, 5);
        assert_eq!(config.plot_min_clip, 0.0);
        assert_eq!(config.plot_max_clip, 1.0);
        assert_eq!(config.output_folder, PathBuf::from("models"));
        assert!(!config.save_data);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_simple_features_preserve_order() {
        let yaml = "\
data_file: data/input.parquet
run_name: test_run
target: price
simple_features:
  zeta: mean
  alpha: mode
  mid: mean
";
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<&String> = config.simple_features.keys().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let yaml = format!("{}typo_key: 1\n", minimal_yaml());
        let parsed: std::result::Result<RunConfig, _> = serde_yaml::from_str(&yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_clip() {
        let mut config: RunConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.plot_min_clip = 0.9;
        config.plot_max_clip = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_baseline_defaults_to_target() {
        let config: RunConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.baseline_column(), "price");
    }

    #[test]
    fn test_model_kind_names() {
        assert_eq!(ModelKind::Ols.name(), "ols");
        assert_eq!(ModelKind::GradientBoosting.name(), "gradient_boosting");
        let parsed: ModelKind = serde_yaml::from_str("gradient_boosting").unwrap();
        assert_eq!(parsed, ModelKind::GradientBoosting);
    }
}
