use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::error::BenchError;
use crate::multi_index::{ParamMap, ParamReader};
use crate::sim::{
    read_mean_trajectory, read_positive_usize, resolve_conditions, warn_on_invalid_covariance,
    BivariateNormal,
};
use crate::table::{TableIndex, TimeSeriesTable};

const CONTEXT: &str = "sim-4";

/// Sim-4: piecewise-constant covariance levels with random dwell times.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSwitchingParams {
    pub n_samples: usize,
    pub mu: [Vec<f64>; 2],
    pub var: f64,
    pub covar_range: Vec<f64>,
    pub state_length: Vec<usize>,
    pub covar_sigma: f64,
    pub randomseed: u64,
}

impl StateSwitchingParams {
    pub fn from_params(params: &ParamMap) -> Result<Self, BenchError> {
        let r = ParamReader::new(CONTEXT, params);
        let n_samples = read_positive_usize(&r, "n_samples")?;
        let var = r.f64("var")?;
        if var <= 0.0 {
            return Err(r.invalid("var", "greater than zero"));
        }
        let covar_sigma = r.f64("covar_sigma")?;
        if covar_sigma < 0.0 {
            return Err(r.invalid("covar_sigma", "non-negative"));
        }
        let covar_range = r.f64_list("covar_range")?;
        if covar_range.is_empty() || covar_range.iter().any(|v| !v.is_finite()) {
            return Err(r.invalid("covar_range", "a non-empty list of finite numbers"));
        }
        let state_length = r
            .value("state_length")?
            .as_list()
            .and_then(|items| items.iter().map(|v| v.as_usize()).collect::<Option<Vec<_>>>())
            .filter(|lengths| !lengths.is_empty() && lengths.iter().all(|&l| l > 0))
            .ok_or_else(|| r.invalid("state_length", "a non-empty list of positive integers"))?;
        Ok(Self {
            n_samples,
            mu: read_mean_trajectory(&r, "mu", n_samples)?,
            var,
            covar_range,
            state_length,
            covar_sigma,
            randomseed: r.u64("randomseed")?,
        })
    }
}

/// Concatenates `(level, dwell)` blocks drawn uniformly until `n_samples` is
/// covered, then truncates.
pub fn state_trajectory<R: Rng + ?Sized>(
    covar_range: &[f64],
    state_length: &[usize],
    n_samples: usize,
    rng: &mut R,
) -> Vec<f64> {
    let mut levels = Vec::with_capacity(n_samples);
    while levels.len() < n_samples {
        let level = covar_range[rng.gen_range(0..covar_range.len())];
        let dwell = state_length[rng.gen_range(0..state_length.len())];
        levels.extend(std::iter::repeat(level).take(dwell));
    }
    levels.truncate(n_samples);
    levels
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateRun {
    pub x1: Vec<f64>,
    pub x2: Vec<f64>,
    pub covariance: Vec<f64>,
    pub state: Vec<f64>,
}

pub fn simulate_state_switching<R: Rng + ?Sized>(
    params: &StateSwitchingParams,
    rng: &mut R,
) -> Result<StateRun, BenchError> {
    let noise = Normal::new(0.0, params.covar_sigma)
        .map_err(|e| BenchError::InvalidConfig(format!("{CONTEXT}: covar_sigma: {e}")))?;
    let state = state_trajectory(
        &params.covar_range,
        &params.state_length,
        params.n_samples,
        rng,
    );

    let n = params.n_samples;
    let mut x1 = Vec::with_capacity(n);
    let mut x2 = Vec::with_capacity(n);
    let mut covariance = Vec::with_capacity(n);
    for (t, &level) in state.iter().enumerate() {
        // Fresh noise around the state level; r is not carried over.
        let covar = level + noise.sample(rng);
        let mvn = BivariateNormal::new(params.var, covar, params.var);
        let [a, b] = mvn.sample([params.mu[0][t], params.mu[1][t]], rng);
        x1.push(a);
        x2.push(b);
        covariance.push(covar);
    }

    Ok(StateRun {
        x1,
        x2,
        covariance,
        state,
    })
}

pub fn gen_data_sim4(params: &ParamMap, swept: &[String]) -> Result<TimeSeriesTable, BenchError> {
    let (mi, resolved) =
        resolve_conditions(CONTEXT, params, swept, StateSwitchingParams::from_params)?;
    let n_samples = resolved[0].n_samples;
    let mut rng = ChaCha8Rng::seed_from_u64(resolved[0].randomseed);

    let total = n_samples * mi.len();
    let mut x1 = Vec::with_capacity(total);
    let mut x2 = Vec::with_capacity(total);
    let mut covariance = Vec::with_capacity(total);
    let mut state = Vec::with_capacity(total);
    for condition_params in &resolved {
        let run = simulate_state_switching(condition_params, &mut rng)?;
        x1.extend(run.x1);
        x2.extend(run.x2);
        covariance.extend(run.covariance);
        state.extend(run.state);
    }

    warn_on_invalid_covariance(CONTEXT, &covariance);

    TimeSeriesTable::new(
        TableIndex::new(mi.names, mi.conditions, n_samples),
        x1,
        x2,
        Some(covariance),
        Some(state),
    )
}
