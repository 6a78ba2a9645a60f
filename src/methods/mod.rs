use std::fmt;

use nalgebra::DMatrix;
use tracing::warn;

use crate::error::BenchError;
use crate::multi_index::{ParamMap, ParamReader};

pub mod custom;
pub mod jackknife;
pub mod sliding_window;
pub mod spatial_distance;
pub mod temporal_derivative;

pub use custom::{EstimatorFn, EstimatorRegistry, FnEstimator};
pub use jackknife::JackknifeMethod;
pub use sliding_window::{SlidingWindowMethod, TaperedSlidingWindowMethod};
pub use spatial_distance::{DistanceMetric, SpatialDistanceMethod};
pub use temporal_derivative::TemporalDerivativeMethod;

/// Output of one estimator call on one condition.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEstimate {
    /// One value per output timestep.
    Series(Vec<f64>),
    /// Node x node matrix per timestep.
    NodeNodeTime(Vec<DMatrix<f64>>),
}

impl RawEstimate {
    pub fn len(&self) -> usize {
        match self {
            Self::Series(values) => values.len(),
            Self::NodeNodeTime(frames) => frames.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The (0, 1) element over time for matrix output.
    pub fn into_series(self, method: &str) -> Result<Vec<f64>, BenchError> {
        match self {
            Self::Series(values) => Ok(values),
            Self::NodeNodeTime(frames) => frames
                .iter()
                .map(|frame| {
                    if frame.nrows() < 2 || frame.ncols() < 2 {
                        return Err(BenchError::Numerical(format!(
                            "{method}: node x node output must be at least 2x2, got {}x{}",
                            frame.nrows(),
                            frame.ncols()
                        )));
                    }
                    Ok(frame[(0, 1)])
                })
                .collect(),
        }
    }
}

/// How raw output is padded back to the input length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicy {
    /// A value at every timestep.
    None,
    /// `(window - 1) / 2` NaN on each side.
    Symmetric { window: usize },
    /// One leading NaN for the first difference, then symmetric padding.
    DerivativeSymmetric { window: usize },
    /// Whatever length comes back: split the shortfall evenly and put the odd
    /// one at the front.
    Reconcile,
}

impl fmt::Display for EdgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Symmetric { window } => write!(f, "symmetric(w={window})"),
            Self::DerivativeSymmetric { window } => write!(f, "derivative(w={window})"),
            Self::Reconcile => f.write_str("reconcile"),
        }
    }
}

pub trait ConnectivityEstimator {
    fn name(&self) -> &str;
    fn edge_policy(&self) -> EdgePolicy;
    /// Shortest condition this estimator can produce output for.
    fn min_samples(&self) -> usize {
        1
    }
    fn estimate(&self, ts1: &[f64], ts2: &[f64]) -> Result<RawEstimate, BenchError>;
}

fn pad_nan(values: Vec<f64>, front: usize, back: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(front + values.len() + back);
    out.extend(std::iter::repeat(f64::NAN).take(front));
    out.extend(values);
    out.extend(std::iter::repeat(f64::NAN).take(back));
    out
}

/// Pads raw estimator output to exactly `expected` timesteps.
pub fn align(
    method: &str,
    raw: RawEstimate,
    policy: EdgePolicy,
    expected: usize,
) -> Result<Vec<f64>, BenchError> {
    let series = raw.into_series(method)?;
    let got = series.len();
    let mismatch = || BenchError::Alignment {
        method: method.to_string(),
        expected,
        got,
    };

    let (front, back) = match policy {
        EdgePolicy::None => (0, 0),
        EdgePolicy::Symmetric { window } => {
            let half = window.saturating_sub(1) / 2;
            (half, half)
        }
        EdgePolicy::DerivativeSymmetric { window } => {
            let half = window.saturating_sub(1) / 2;
            (half + 1, half)
        }
        EdgePolicy::Reconcile => {
            let shortfall = expected.checked_sub(got).ok_or_else(mismatch)?;
            (shortfall - shortfall / 2, shortfall / 2)
        }
    };

    if front + got + back != expected {
        return Err(mismatch());
    }
    Ok(pad_nan(series, front, back))
}

pub(crate) fn read_window(
    r: &ParamReader<'_>,
    field: &str,
    default: usize,
    min: usize,
) -> Result<usize, BenchError> {
    let window = match r.opt(field) {
        Some(_) => r.usize(field)?,
        None => default,
    };
    if window < min || window % 2 == 0 {
        return Err(r.invalid(field, &format!("an odd integer of at least {min}")));
    }
    Ok(window)
}

pub(crate) fn require_length(
    method: &str,
    required: usize,
    actual: usize,
) -> Result<(), BenchError> {
    if actual < required {
        return Err(BenchError::InsufficientData {
            context: method.to_string(),
            required,
            actual,
        });
    }
    Ok(())
}

fn warn_unknown_keys(method: &str, params: &ParamMap, known: &[&str]) {
    for key in params.keys() {
        if !known.contains(&key.as_str()) {
            warn!(method, key = key.as_str(), "ignoring unknown method parameter");
        }
    }
}

/// `MTD` is accepted as an alias of `TD`.
pub fn canonical_method_id(method: &str) -> &str {
    match method {
        "MTD" => "TD",
        other => other,
    }
}

/// Builds the estimator for dfc entry `index`. Registered estimators take
/// precedence over built-in ids.
pub fn build_estimator(
    index: usize,
    method: &str,
    params: &ParamMap,
    registry: &EstimatorRegistry,
) -> Result<Box<dyn ConnectivityEstimator>, BenchError> {
    if let Some(func) = registry.get(method) {
        return Ok(Box::new(FnEstimator::new(method, func, params.clone())));
    }

    let id = canonical_method_id(method);
    let known: &[&str] = match id {
        "SW" => &[sliding_window::WINDOW_KEY],
        "TSW" => &[
            sliding_window::WINDOW_KEY,
            sliding_window::TAPER_NAME_KEY,
            sliding_window::TAPER_PROPERTIES_KEY,
        ],
        "SD" => &[spatial_distance::DISTANCE_KEY],
        "JC" => &[],
        "TD" => &[temporal_derivative::WINDOW_KEY],
        _ => {
            return Err(BenchError::UnknownMethod {
                index,
                method: method.to_string(),
            })
        }
    };
    warn_unknown_keys(id, params, known);

    let estimator: Box<dyn ConnectivityEstimator> = match id {
        "SW" => Box::new(SlidingWindowMethod::from_params(params)?),
        "TSW" => Box::new(TaperedSlidingWindowMethod::from_params(params)?),
        "SD" => Box::new(SpatialDistanceMethod::from_params(params)?),
        "JC" => Box::new(JackknifeMethod::new()),
        _ => Box::new(TemporalDerivativeMethod::from_params(params)?),
    };
    Ok(estimator)
}
