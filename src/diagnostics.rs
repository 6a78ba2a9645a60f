//! Numeric summaries of generated data, estimates and posteriors, written
//! as CSV next to the ranking tables.

use std::path::{Path, PathBuf};

use crate::error::BenchError;
use crate::evaluate::FitRecord;
use crate::io::{self, fmt_f64};
use crate::stats::{autocorrelation, mean, quantile, spearman, std_dev};
use crate::table::{ConnectivityTable, TimeSeriesTable, COVARIANCE_PARAMETER, TIMESERIES_1, TIMESERIES_2};

pub const MAX_LAG: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct AutocorrelationRow {
    pub condition: String,
    pub series: &'static str,
    pub lag: usize,
    pub value: f64,
}

/// Lags `0..=MAX_LAG` of the channels when there is no ground truth,
/// otherwise of the covariance parameter.
pub fn autocorrelation_rows(data: &TimeSeriesTable) -> Vec<AutocorrelationRow> {
    let mut rows = Vec::new();
    for (c, condition) in data.index.conditions.iter().enumerate() {
        let series: Vec<(&'static str, &[f64])> = match data.ground_truth(c) {
            Some(truth) => vec![(COVARIANCE_PARAMETER, truth)],
            None => {
                let (ts1, ts2) = data.channels(c);
                vec![(TIMESERIES_1, ts1), (TIMESERIES_2, ts2)]
            }
        };
        for (name, values) in series {
            for (lag, value) in autocorrelation(values, MAX_LAG).into_iter().enumerate() {
                rows.push(AutocorrelationRow {
                    condition: condition.to_string(),
                    series: name,
                    lag,
                    value,
                });
            }
        }
    }
    rows
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCorrelationRow {
    pub condition: String,
    pub method_a: String,
    pub method_b: String,
    pub n_obs: usize,
    pub spearman: f64,
}

/// Spearman correlation of every method pair, per condition, over rows
/// where both are finite.
pub fn method_correlation_rows(dfc: &ConnectivityTable) -> Vec<MethodCorrelationRow> {
    let mut methods = dfc.method_names();
    methods.sort();
    let mut rows = Vec::new();
    for (c, condition) in dfc.index.conditions.iter().enumerate() {
        for (i, a) in methods.iter().enumerate() {
            for b in &methods[i + 1..] {
                let (Some(xa), Some(xb)) = (dfc.condition_column(a, c), dfc.condition_column(b, c))
                else {
                    continue;
                };
                let (pa, pb): (Vec<f64>, Vec<f64>) = xa
                    .iter()
                    .zip(xb)
                    .filter(|(u, v)| u.is_finite() && v.is_finite())
                    .map(|(u, v)| (*u, *v))
                    .unzip();
                let value = if pa.len() < 2 { f64::NAN } else { spearman(&pa, &pb) };
                rows.push(MethodCorrelationRow {
                    condition: condition.to_string(),
                    method_a: a.clone(),
                    method_b: b.clone(),
                    n_obs: pa.len(),
                    spearman: value,
                });
            }
        }
    }
    rows
}

#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorSummary {
    pub condition: String,
    pub method: String,
    pub mean: f64,
    pub sd: f64,
    pub q025: f64,
    pub q975: f64,
}

pub fn summarize_beta(beta: &[f64]) -> (f64, f64, f64, f64) {
    (
        mean(beta),
        std_dev(beta, 1),
        quantile(beta, 0.025),
        quantile(beta, 0.975),
    )
}

/// Slope posterior of every persisted fit, after discarding `burn` draws.
pub fn posterior_rows(fits: &[FitRecord], burn: usize) -> Result<Vec<PosteriorSummary>, BenchError> {
    fits.iter()
        .map(|fit| {
            let model = io::read_model_json(&fit.path)?;
            let trace = model.trace.burned(burn)?;
            let (mean, sd, q025, q975) = summarize_beta(&trace.beta);
            Ok(PosteriorSummary {
                condition: fit.condition.to_string(),
                method: fit.method.clone(),
                mean,
                sd,
                q025,
                q975,
            })
        })
        .collect()
}

pub fn write_autocorrelation(dir: &Path, prefix: &str, rows: &[AutocorrelationRow]) -> Result<PathBuf, BenchError> {
    let path = dir.join(format!("{prefix}_autocorrelation.csv"));
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|r| vec![r.condition.clone(), r.series.to_string(), r.lag.to_string(), fmt_f64(r.value)])
        .collect();
    io::write_rows_csv(&path, &["condition", "series", "lag", "autocorrelation"], &body)?;
    Ok(path)
}

pub fn write_method_correlation(
    dir: &Path,
    prefix: &str,
    rows: &[MethodCorrelationRow],
) -> Result<PathBuf, BenchError> {
    let path = dir.join(format!("{prefix}_method_spearman.csv"));
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.condition.clone(),
                r.method_a.clone(),
                r.method_b.clone(),
                r.n_obs.to_string(),
                fmt_f64(r.spearman),
            ]
        })
        .collect();
    io::write_rows_csv(&path, &["condition", "method_a", "method_b", "n_obs", "spearman"], &body)?;
    Ok(path)
}

pub fn write_posterior(dir: &Path, prefix: &str, rows: &[PosteriorSummary]) -> Result<PathBuf, BenchError> {
    let path = dir.join(format!("{prefix}_beta_posterior.csv"));
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.condition.clone(),
                r.method.clone(),
                fmt_f64(r.mean),
                fmt_f64(r.sd),
                fmt_f64(r.q025),
                fmt_f64(r.q975),
            ]
        })
        .collect();
    io::write_rows_csv(&path, &["condition", "method", "mean", "sd", "q2.5", "q97.5"], &body)?;
    Ok(path)
}
