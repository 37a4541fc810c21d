//! Post-fit reporting: metrics and diagnostic plots

pub mod metrics;
pub mod plots;

pub use metrics::RegressionReport;
