//! Synthetic bivariate time series with known covariance.
//!
//! Every generator seeds one `ChaCha8Rng` from `randomseed` before its first
//! draw and threads it through all conditions of the sweep in order.

use nalgebra::Matrix2;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BenchError;
use crate::multi_index::{MultiIndex, ParamMap, ParamReader, ParamValue};
use crate::table::TimeSeriesTable;

pub mod autoregressive;
pub mod fluctuating;
pub mod hrf;
pub mod state_switching;

pub use autoregressive::{gen_data_sim1, AutoregressiveParams};
pub use fluctuating::{gen_data_sim2, FluctuatingParams};
pub use hrf::{gen_data_sim3, HrfParams, HrfSource};
pub use state_switching::{gen_data_sim4, StateSwitchingParams};

/// Parameters that fix the shape of the output or the RNG stream.
const UNSWEEPABLE: [&str; 2] = ["n_samples", "randomseed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SimulationKind {
    #[serde(rename = "sim-1")]
    Autoregressive,
    #[serde(rename = "sim-2")]
    FluctuatingCovariance,
    #[serde(rename = "sim-3")]
    HrfConvolved,
    #[serde(rename = "sim-4")]
    StateSwitching,
}

impl SimulationKind {
    pub const ALL: [SimulationKind; 4] = [
        SimulationKind::Autoregressive,
        SimulationKind::FluctuatingCovariance,
        SimulationKind::HrfConvolved,
        SimulationKind::StateSwitching,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Autoregressive => "sim-1",
            Self::FluctuatingCovariance => "sim-2",
            Self::HrfConvolved => "sim-3",
            Self::StateSwitching => "sim-4",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, BenchError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == raw)
            .ok_or_else(|| BenchError::UnknownSimulation(raw.to_string()))
    }

    /// Sim-1 has no covariance column and is therefore not evaluated.
    pub fn has_ground_truth(self) -> bool {
        !matches!(self, Self::Autoregressive)
    }

    pub fn default_multi_index(self) -> Vec<String> {
        match self {
            Self::FluctuatingCovariance | Self::HrfConvolved => vec!["alpha".to_string()],
            Self::Autoregressive | Self::StateSwitching => Vec::new(),
        }
    }
}

pub fn gen_data(
    kind: SimulationKind,
    params: &ParamMap,
    swept: &[String],
) -> Result<TimeSeriesTable, BenchError> {
    match kind {
        SimulationKind::Autoregressive => gen_data_sim1(params, swept),
        SimulationKind::FluctuatingCovariance => gen_data_sim2(params, swept),
        SimulationKind::HrfConvolved => gen_data_sim3(params, swept),
        SimulationKind::StateSwitching => gen_data_sim4(params, swept),
    }
}

/// Type-checks every condition of a sweep without drawing anything and
/// returns the number of timepoints each condition will have.
pub fn validate_params(
    kind: SimulationKind,
    params: &ParamMap,
    swept: &[String],
) -> Result<usize, BenchError> {
    let lengths: Vec<usize> = match kind {
        SimulationKind::Autoregressive => {
            let (_, resolved) =
                resolve_conditions(kind.name(), params, swept, AutoregressiveParams::from_params)?;
            resolved.iter().map(|p| p.n_samples).collect()
        }
        SimulationKind::FluctuatingCovariance => {
            let (_, resolved) =
                resolve_conditions(kind.name(), params, swept, FluctuatingParams::from_params)?;
            resolved.iter().map(|p| p.n_samples).collect()
        }
        SimulationKind::HrfConvolved => {
            let hrf_params = hrf::resolve_hrf_params(params, swept)?;
            let (_, resolved) = resolve_conditions(kind.name(), &hrf_params, swept, |p| {
                FluctuatingParams::read(kind.name(), p)
            })?;
            resolved.iter().map(|p| p.n_samples).collect()
        }
        SimulationKind::StateSwitching => {
            let (_, resolved) =
                resolve_conditions(kind.name(), params, swept, StateSwitchingParams::from_params)?;
            resolved.iter().map(|p| p.n_samples).collect()
        }
    };
    Ok(lengths.into_iter().min().unwrap_or(0))
}

/// Expands the sweep and builds typed parameters for every condition.
pub(crate) fn resolve_conditions<P, F>(
    context: &str,
    params: &ParamMap,
    swept: &[String],
    build: F,
) -> Result<(MultiIndex, Vec<P>), BenchError>
where
    F: Fn(&ParamMap) -> Result<P, BenchError>,
{
    for name in swept {
        if UNSWEEPABLE.contains(&name.as_str()) {
            return Err(BenchError::InvalidConfig(format!(
                "{context}: '{name}' cannot be part of multi_index"
            )));
        }
    }
    let mi = MultiIndex::expand(params, swept)?;
    let resolved = mi
        .conditions
        .iter()
        .map(|condition| build(&condition.apply(params)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((mi, resolved))
}

/// Lower-triangular factor of a 2x2 covariance, tolerant of singular and
/// (after clamping) indefinite matrices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BivariateNormal {
    l11: f64,
    l21: f64,
    l22: f64,
}

impl BivariateNormal {
    pub fn new(var_1: f64, covariance: f64, var_2: f64) -> Self {
        let l11 = var_1.max(0.0).sqrt();
        let l21 = if l11 > 0.0 { covariance / l11 } else { 0.0 };
        let l22 = (var_2 - l21 * l21).max(0.0).sqrt();
        Self { l11, l21, l22 }
    }

    pub fn from_matrix(sigma: &Matrix2<f64>) -> Self {
        Self::new(sigma[(0, 0)], sigma[(1, 0)], sigma[(1, 1)])
    }

    pub fn sample<R: Rng + ?Sized>(&self, mean: [f64; 2], rng: &mut R) -> [f64; 2] {
        let z1: f64 = StandardNormal.sample(rng);
        let z2: f64 = StandardNormal.sample(rng);
        [
            mean[0] + self.l11 * z1,
            mean[1] + self.l21 * z1 + self.l22 * z2,
        ]
    }
}

pub(crate) fn read_positive_usize(r: &ParamReader<'_>, field: &str) -> Result<usize, BenchError> {
    let value = r.usize(field)?;
    if value == 0 {
        return Err(r.invalid(field, "greater than zero"));
    }
    Ok(value)
}

/// `[m1, m2]` (constant) or `[[m1_0..m1_n], [m2_0..m2_n]]` (per timestep).
pub(crate) fn read_mean_trajectory(
    r: &ParamReader<'_>,
    field: &str,
    n_samples: usize,
) -> Result<[Vec<f64>; 2], BenchError> {
    let value = r.value(field)?;
    if let Some(pair) = value.as_f64_vec() {
        if pair.len() == 2 {
            return Ok([vec![pair[0]; n_samples], vec![pair[1]; n_samples]]);
        }
    }
    if let Some(rows) = value.as_f64_matrix() {
        if rows.len() == 2 && rows.iter().all(|row| row.len() == n_samples) {
            return Ok([rows[0].clone(), rows[1].clone()]);
        }
    }
    Err(r.invalid(field, "a pair of means or two rows of n_samples means"))
}

/// A scalar, a one-element list, or a list of n_samples values.
pub(crate) fn read_series(
    r: &ParamReader<'_>,
    field: &str,
    n_samples: usize,
) -> Result<Vec<f64>, BenchError> {
    let value = r.value(field)?;
    if let Some(v) = value.as_f64() {
        return Ok(vec![v; n_samples]);
    }
    match value.as_f64_vec() {
        Some(values) if values.len() == 1 => Ok(vec![values[0]; n_samples]),
        Some(values) if values.len() == n_samples => Ok(values),
        _ => Err(r.invalid(field, "a number or a list of n_samples numbers")),
    }
}

pub(crate) fn read_covariance_matrix(
    r: &ParamReader<'_>,
    field: &str,
) -> Result<Matrix2<f64>, BenchError> {
    let rows = r
        .value(field)?
        .as_f64_matrix()
        .filter(|rows| rows.len() == 2 && rows.iter().all(|row| row.len() == 2))
        .ok_or_else(|| r.invalid(field, "a 2x2 matrix"))?;
    let sigma = Matrix2::new(rows[0][0], rows[0][1], rows[1][0], rows[1][1]);
    if (sigma[(0, 1)] - sigma[(1, 0)]).abs() > 1e-12 {
        return Err(r.invalid(field, "symmetric"));
    }
    if sigma[(0, 0)] < 0.0 || sigma[(1, 1)] < 0.0 || sigma.determinant() < -1e-12 {
        return Err(r.invalid(field, "positive semi-definite"));
    }
    Ok(sigma)
}

pub fn count_invalid_covariance(covariance: &[f64]) -> usize {
    covariance.iter().filter(|r| r.abs() > 1.0).count()
}

pub(crate) fn warn_on_invalid_covariance(simulation: &str, covariance: &[f64]) {
    let invalid = count_invalid_covariance(covariance);
    if invalid > 0 {
        warn!(
            simulation,
            invalid,
            "some value(s) of r_t > 1 or r_t < -1; consider changing parameters"
        );
    }
}

pub(crate) fn two_row_param(rows: [&[f64]; 2]) -> ParamValue {
    ParamValue::List(rows.iter().map(|row| ParamValue::from_f64_slice(row)).collect())
}
