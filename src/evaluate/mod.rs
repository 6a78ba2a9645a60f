//! Per-condition, per-method model fitting and WAIC ranking.

pub mod bayes;
pub mod waic;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::TraceParams;
use crate::error::BenchError;
use crate::io;
use crate::multi_index::Condition;
use crate::table::{ConnectivityTable, TimeSeriesTable};

pub use bayes::{bayes_model, FittedModel, Priors, RegressionData, SamplerReport, Trace};
pub use waic::{rank_methods, render_simple_table, waic, RankRow, Waic};

#[derive(Debug, Clone)]
pub struct FitRecord {
    pub method: String,
    pub condition: Condition,
    pub path: PathBuf,
    pub n_obs: usize,
}

/// A fit or ranking that could not be completed.
#[derive(Debug, Clone)]
pub struct EvalFailure {
    pub stage: &'static str,
    pub method: Option<String>,
    pub condition: Condition,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct FitReport {
    pub fitted: Vec<FitRecord>,
    pub failures: Vec<EvalFailure>,
}

impl FitReport {
    pub fn fit_failed(&self, method: &str, condition: &Condition) -> bool {
        self.failures.iter().any(|f| {
            f.stage == "fit" && f.method.as_deref() == Some(method) && &f.condition == condition
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConditionRanking {
    pub condition: Condition,
    pub rows: Vec<RankRow>,
    pub table_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RankReport {
    pub rankings: Vec<ConditionRanking>,
    pub failures: Vec<EvalFailure>,
}

/// Row positions (within one condition) where the truth and every method
/// are finite.
fn common_finite_rows(truth: &[f64], estimates: &[&[f64]]) -> Vec<usize> {
    (0..truth.len())
        .filter(|&t| truth[t].is_finite() && estimates.iter().all(|col| col[t].is_finite()))
        .collect()
}

/// Fits one regression per (condition, method) of `dfc` against the ground
/// truth of `data` and writes each fit to `stat_dir/{stem}.json`.
///
/// A failed fit is logged and recorded; it does not stop the others.
pub fn model_dfc(
    data: &TimeSeriesTable,
    dfc: &ConnectivityTable,
    stat_dir: &Path,
    prefix: &str,
    params: &TraceParams,
) -> Result<FitReport, BenchError> {
    if data.index != dfc.index {
        return Err(BenchError::InvalidTable(format!(
            "{prefix}: connectivity table index does not match the data table"
        )));
    }
    if data.covariance_parameter.is_none() {
        return Err(BenchError::InvalidTable(format!(
            "{prefix}: no covariance_parameter column to evaluate against"
        )));
    }
    io::ensure_outdir(stat_dir)?;

    let methods = dfc.method_names();
    let mut report = FitReport::default();
    for (c, condition) in dfc.index.conditions.iter().enumerate() {
        let truth = data.ground_truth(c).ok_or_else(|| {
            BenchError::InvalidTable(format!("{prefix}: missing ground truth"))
        })?;
        let estimates: Vec<&[f64]> = methods
            .iter()
            .filter_map(|name| dfc.condition_column(name, c))
            .collect();
        let rows = common_finite_rows(truth, &estimates);
        let y: Vec<f64> = rows.iter().map(|&t| truth[t]).collect();

        for (method, column) in methods.iter().zip(&estimates) {
            let x: Vec<f64> = rows.iter().map(|&t| column[t]).collect();
            match bayes_model(&x, &y, params) {
                Ok((model, trace, sampler)) => {
                    let stem = io::model_stem(prefix, method, condition);
                    let path = stat_dir.join(format!("{stem}.json"));
                    let fitted = FittedModel {
                        schema_version: bayes::MODEL_SCHEMA_VERSION.to_string(),
                        simulation: prefix.to_string(),
                        method: method.clone(),
                        condition: condition.to_string(),
                        model,
                        trace,
                        sampler,
                    };
                    io::write_model_json(&path, &fitted)?;
                    info!(
                        simulation = prefix,
                        method = method.as_str(),
                        condition = %condition,
                        n_obs = rows.len(),
                        acceptance = sampler.acceptance_rate,
                        "fitted model"
                    );
                    report.fitted.push(FitRecord {
                        method: method.clone(),
                        condition: condition.clone(),
                        path,
                        n_obs: rows.len(),
                    });
                }
                Err(err) => {
                    warn!(
                        simulation = prefix,
                        method = method.as_str(),
                        condition = %condition,
                        error = %err,
                        "model fit failed"
                    );
                    report.failures.push(EvalFailure {
                        stage: "fit",
                        method: Some(method.clone()),
                        condition: condition.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
    Ok(report)
}

fn rank_condition(
    methods: &[String],
    condition: &Condition,
    model_dir: &Path,
    prefix: &str,
    burn: usize,
) -> Result<Vec<RankRow>, BenchError> {
    let mut scores = Vec::with_capacity(methods.len());
    for method in methods {
        let stem = io::model_stem(prefix, method, condition);
        let fitted = io::read_model_json(&model_dir.join(format!("{stem}.json")))?;
        let trace = fitted.trace.burned(burn)?;
        scores.push((method.clone(), waic(&fitted.model, &trace)?));
    }
    Ok(rank_methods(scores))
}

/// Reloads the persisted fits of `dfc`'s methods, ranks them per condition
/// by WAIC and writes `table_dir/{prefix}_waictable{suffix}.md`.
///
/// Methods whose fit is recorded as failed in `fits` are left out of their
/// condition's table. A condition whose remaining models cannot all be
/// loaded or scored is skipped and recorded.
pub fn calc_waic(
    dfc: &ConnectivityTable,
    fits: &FitReport,
    model_dir: &Path,
    table_dir: &Path,
    prefix: &str,
    burn: usize,
) -> Result<RankReport, BenchError> {
    io::ensure_outdir(table_dir)?;
    let methods = dfc.method_names();
    let mut report = RankReport::default();
    for condition in &dfc.index.conditions {
        let fitted: Vec<String> = methods
            .iter()
            .filter(|method| !fits.fit_failed(method, condition))
            .cloned()
            .collect();
        if fitted.is_empty() {
            warn!(simulation = prefix, condition = %condition, "no fitted models to rank");
            report.failures.push(EvalFailure {
                stage: "rank",
                method: None,
                condition: condition.clone(),
                reason: "no method could be fitted".to_string(),
            });
            continue;
        }
        if fitted.len() < methods.len() {
            warn!(
                simulation = prefix,
                condition = %condition,
                ranked = fitted.len(),
                methods = methods.len(),
                "ranking without failed fits"
            );
        }
        match rank_condition(&fitted, condition, model_dir, prefix, burn) {
            Ok(rows) => {
                let table = render_simple_table(&rows);
                let table_path = table_dir.join(io::waic_table_name(prefix, condition));
                io::write_text(&table_path, &table)?;
                info!(simulation = prefix, condition = %condition, "WAIC ranking\n{table}");
                report.rankings.push(ConditionRanking {
                    condition: condition.clone(),
                    rows,
                    table_path,
                });
            }
            Err(err) => {
                warn!(
                    simulation = prefix,
                    condition = %condition,
                    error = %err,
                    "ranking failed"
                );
                report.failures.push(EvalFailure {
                    stage: "rank",
                    method: None,
                    condition: condition.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}
