//! Diagnostic plot rendering
//!
//! All plots are written as PNG files into the run directory. Plotting is a
//! terminal step: nothing downstream consumes the images.

use crate::artifacts::RunDir;
use crate::config::RunConfig;
use crate::error::{PipelineError, Result};
use crate::report::metrics::RegressionReport;
use polars::prelude::*;
use plotters::prelude::*;
use rand::prelude::*;
use tracing::{debug, info, warn};

const PLOT_SIZE: (u32, u32) = (800, 500);
const POINT_COLOR: RGBColor = RGBColor(48, 162, 218);
const LINE_COLOR: RGBColor = RGBColor(252, 79, 48);

/// Rows beyond this are sampled away before univariate plotting
const UNIVARIATE_SAMPLE_LIMIT: usize = 5000;

fn plot_err<E: std::fmt::Display>(err: E) -> PipelineError {
    PipelineError::Plot(err.to_string())
}

/// Non-null paired f64 values from two columns
fn paired_values(df: &DataFrame, a: &str, b: &str) -> Result<Vec<(f64, f64)>> {
    let ca = df.column(a)?.cast(&DataType::Float64)?;
    let cb = df.column(b)?.cast(&DataType::Float64)?;
    let pairs = ca
        .f64()?
        .into_iter()
        .zip(cb.f64()?.into_iter())
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        })
        .collect();
    Ok(pairs)
}

/// Linear-interpolated quantile of an unsorted sample
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.is_empty() {
        return 0.0;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let low = position.floor() as usize;
    let high = position.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let weight = position - low as f64;
        sorted[low] * (1.0 - weight) + sorted[high] * weight
    }
}

/// Pad a degenerate value range so axes stay drawable
fn padded(min: f64, max: f64) -> (f64, f64) {
    if (max - min).abs() < 1e-12 {
        (min - 1.0, max + 1.0)
    } else {
        let pad = (max - min) * 0.05;
        (min - pad, max + pad)
    }
}

/// Actual-vs-predicted scatter with an identity reference line.
///
/// Both series are clipped symmetrically to the configured quantiles so a
/// few wild predictions cannot dominate the axes.
pub fn metrics_scatter(
    results: &DataFrame,
    report: &RegressionReport,
    config: &RunConfig,
    run_dir: &RunDir,
    name: &str,
) -> Result<()> {
    let pairs = paired_values(results, "Actual", "Predicted")?;
    if pairs.is_empty() {
        warn!(name, "no paired results to plot");
        return Ok(());
    }

    let actual: Vec<f64> = pairs.iter().map(|(a, _)| *a).collect();
    let predicted: Vec<f64> = pairs.iter().map(|(_, p)| *p).collect();

    let lower = quantile(&actual, config.plot_min_clip)
        .min(quantile(&predicted, config.plot_min_clip));
    let upper = quantile(&actual, config.plot_max_clip)
        .max(quantile(&predicted, config.plot_max_clip));

    let clipped: Vec<(f64, f64)> = pairs
        .iter()
        .map(|(a, p)| (a.clamp(lower, upper), p.clamp(lower, upper)))
        .collect();

    let rounded = report.rounded();
    let title = format!(
        "{name} - predicted {} (r2: {}, mae: {}, mse: {})",
        config.target, rounded.r2, rounded.mae, rounded.mse
    );

    let path = run_dir.file(&format!("plots_metrics_{name}.png"));
    debug!(path = %path.display(), "drawing metrics scatter");

    let (lo, hi) = padded(lower, upper);
    let root = BitMapBackend::new(&path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 16))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, lo..hi)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Actual")
        .y_desc("Predicted")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(
            clipped
                .iter()
                .map(|(a, p)| Circle::new((*a, *p), 3, POINT_COLOR.mix(0.5).filled())),
        )
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(vec![(lower, lower), (upper, upper)], &LINE_COLOR))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!(path = %path.display(), "saved metrics plot");
    Ok(())
}

/// One scatter-with-fit plot per reporting feature against the target
pub fn univariate_plots(
    train: &DataFrame,
    reporting_features: &[String],
    config: &RunConfig,
    run_dir: &RunDir,
) -> Result<()> {
    let data = sample_rows(train, UNIVARIATE_SAMPLE_LIMIT)?;

    for feature in reporting_features {
        let pairs = paired_values(&data, feature, &config.target)?;
        if pairs.is_empty() {
            warn!(feature = feature.as_str(), "no data for univariate plot");
            continue;
        }

        let xs: Vec<f64> = pairs.iter().map(|(x, _)| *x).collect();
        let ys: Vec<f64> = pairs.iter().map(|(_, y)| *y).collect();
        let (x_lo, x_hi) = padded(
            xs.iter().cloned().fold(f64::INFINITY, f64::min),
            xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        );
        let (y_lo, y_hi) = padded(
            ys.iter().cloned().fold(f64::INFINITY, f64::min),
            ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        );

        let path = run_dir.file(&format!(
            "plots_univariate_{}.png",
            sanitize_for_filename(feature)
        ));
        info!(path = %path.display(), "saving univariate plot");

        let root = BitMapBackend::new(&path, PLOT_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;

        let title = format!("Univariate plot of {} and {feature}", config.target);
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 16))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
            .map_err(plot_err)?;

        chart
            .configure_mesh()
            .x_desc(feature.as_str())
            .y_desc(config.target.as_str())
            .draw()
            .map_err(plot_err)?;

        chart
            .draw_series(
                pairs
                    .iter()
                    .map(|(x, y)| Circle::new((*x, *y), 3, POINT_COLOR.mix(0.5).filled())),
            )
            .map_err(plot_err)?;

        if let Some((slope, intercept)) = linear_fit(&pairs) {
            chart
                .draw_series(LineSeries::new(
                    vec![
                        (x_lo, slope * x_lo + intercept),
                        (x_hi, slope * x_hi + intercept),
                    ],
                    &LINE_COLOR,
                ))
                .map_err(plot_err)?;
        }

        root.present().map_err(plot_err)?;
    }

    Ok(())
}

/// Heatmap of pairwise Pearson correlations between reporting features.
///
/// Diagonal cells carry the mean of the column's off-diagonal correlations,
/// which keeps the colour scale informative. Features without variation
/// produce undefined correlations; those are zero-filled with a warning.
pub fn correlation_matrix(
    train: &DataFrame,
    reporting_features: &[String],
    run_dir: &RunDir,
) -> Result<()> {
    let n = reporting_features.len();
    if n == 0 {
        warn!("no reporting features for correlation matrix");
        return Ok(());
    }

    let mut matrix = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let pairs = paired_values(train, &reporting_features[i], &reporting_features[j])?;
            let value = pearson(&pairs).unwrap_or(f64::NAN);
            matrix[i][j] = value;
            matrix[j][i] = value;
        }
    }

    for i in 0..n {
        let off_diagonal: Vec<f64> = (0..n).filter(|&j| j != i).map(|j| matrix[i][j]).collect();
        matrix[i][i] = if off_diagonal.is_empty() {
            1.0
        } else {
            off_diagonal.iter().sum::<f64>() / off_diagonal.len() as f64
        };
    }

    let mut had_nan = false;
    for (i, row) in matrix.iter_mut().enumerate() {
        for value in row.iter_mut() {
            if value.is_nan() {
                if !had_nan {
                    warn!(
                        feature = reporting_features[i].as_str(),
                        "no variation in at least one feature, zero-filling correlations"
                    );
                    had_nan = true;
                }
                *value = 0.0;
            }
        }
    }

    let path = run_dir.file("plots_correlation.png");
    info!(path = %path.display(), "saving correlation plot");

    let label_gutter = 160i32;
    let cell = (520 / n.max(1)) as i32;
    let width = (label_gutter + cell * n as i32 + 20) as u32;
    let height = (cell * n as i32 + label_gutter + 20) as u32;

    let root = BitMapBackend::new(&path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let label_style = TextStyle::from(("sans-serif", 13)).color(&BLACK);
    let value_style = TextStyle::from(("sans-serif", 11)).color(&BLACK);
    let rotated_style = TextStyle::from(
        ("sans-serif", 13)
            .into_font()
            .transform(FontTransform::Rotate90),
    )
    .color(&BLACK);

    for (i, row) in matrix.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            let x0 = label_gutter + cell * j as i32;
            let y0 = 10 + cell * i as i32;
            root.draw(&Rectangle::new(
                [(x0, y0), (x0 + cell, y0 + cell)],
                correlation_color(value).filled(),
            ))
            .map_err(plot_err)?;
            root.draw(&Text::new(
                format!("{value:.2}"),
                (x0 + cell / 2 - 12, y0 + cell / 2 - 6),
                value_style.clone(),
            ))
            .map_err(plot_err)?;
        }
    }

    for (i, feature) in reporting_features.iter().enumerate() {
        let label = truncate_label(feature, 22);
        root.draw(&Text::new(
            label.clone(),
            (5, 10 + cell * i as i32 + cell / 2 - 6),
            label_style.clone(),
        ))
        .map_err(plot_err)?;
        root.draw(&Text::new(
            label,
            (
                label_gutter + cell * i as i32 + cell / 2,
                10 + cell * reporting_features.len() as i32 + 8,
            ),
            rotated_style.clone(),
        ))
        .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Blue-white-red colour ramp over [-1, 1]
fn correlation_color(value: f64) -> RGBColor {
    let v = value.clamp(-1.0, 1.0);
    if v < 0.0 {
        let t = -v;
        RGBColor(
            (255.0 * (1.0 - t) + 48.0 * t) as u8,
            (255.0 * (1.0 - t) + 113.0 * t) as u8,
            (255.0 * (1.0 - t) + 218.0 * t) as u8,
        )
    } else {
        RGBColor(
            (255.0 * (1.0 - v) + 252.0 * v) as u8,
            (255.0 * (1.0 - v) + 79.0 * v) as u8,
            (255.0 * (1.0 - v) + 48.0 * v) as u8,
        )
    }
}

fn truncate_label(label: &str, max_len: usize) -> String {
    if label.len() <= max_len {
        label.to_string()
    } else {
        format!("{}..", &label[..max_len.saturating_sub(2)])
    }
}

fn sanitize_for_filename(name: &str) -> String {
    name.replace(['<', '>'], "").replace('/', "_")
}

/// Pearson correlation over paired observations
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len() as f64;
    if pairs.len() < 2 {
        return None;
    }

    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        None
    } else {
        Some(cov / (var_x.sqrt() * var_y.sqrt()))
    }
}

/// Least-squares slope and intercept for the fit line
fn linear_fit(pairs: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = pairs.len() as f64;
    if pairs.len() < 2 {
        return None;
    }

    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (x, y) in pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x) * (x - mean_x);
    }

    if var_x <= 0.0 {
        None
    } else {
        let slope = cov / var_x;
        Some((slope, mean_y - slope * mean_x))
    }
}

/// Random row sample without replacement; a no-op below the limit
fn sample_rows(df: &DataFrame, limit: usize) -> Result<DataFrame> {
    if df.height() <= limit {
        return Ok(df.clone());
    }

    let mut rng = rand::thread_rng();
    let mut indices: Vec<IdxSize> = (0..df.height() as IdxSize).collect();
    indices.shuffle(&mut rng);
    indices.truncate(limit);
    indices.sort_unstable();

    Ok(df.take(&IdxCa::from_vec("".into(), indices))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_bounds() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 4.0);
        assert_eq!(quantile(&values, 0.5), 2.5);
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let pairs: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 * i as f64)).collect();
        let r = pearson(&pairs).unwrap();
        assert!((r - 1.0).abs() < 1e-12);

        let inverse: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, -(i as f64))).collect();
        let r = pearson(&inverse).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_constant_is_undefined() {
        let pairs: Vec<(f64, f64)> = (0..10).map(|i| (1.0, i as f64)).collect();
        assert!(pearson(&pairs).is_none());
    }

    #[test]
    fn test_linear_fit_recovers_line() {
        let pairs: Vec<(f64, f64)> = (0..20).map(|i| (i as f64, 3.0 * i as f64 + 2.0)).collect();
        let (slope, intercept) = linear_fit(&pairs).unwrap();
        assert!((slope - 3.0).abs() < 1e-9);
        assert!((intercept - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_rows_caps_height() {
        let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let df = DataFrame::new(vec![Column::new("v".into(), values)]).unwrap();
        let sampled = sample_rows(&df, 10).unwrap();
        assert_eq!(sampled.height(), 10);
    }

    #[test]
    fn test_correlation_color_extremes() {
        assert_eq!(correlation_color(0.0), RGBColor(255, 255, 255));
        assert_eq!(correlation_color(1.0), RGBColor(252, 79, 48));
        assert_eq!(correlation_color(-1.0), RGBColor(48, 113, 218));
    }
}
