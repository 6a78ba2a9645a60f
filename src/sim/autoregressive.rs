use nalgebra::Matrix2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::BenchError;
use crate::multi_index::{ParamMap, ParamReader};
use crate::sim::{
    read_covariance_matrix, read_positive_usize, resolve_conditions, BivariateNormal,
};
use crate::table::{TableIndex, TimeSeriesTable};

const CONTEXT: &str = "sim-1";

/// Sim-1: two channels of multivariate-normal innovations, each filtered by
/// `x[t] = alpha * x[t-1] + w[t]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoregressiveParams {
    pub n_samples: usize,
    pub alpha: f64,
    pub mu: [f64; 2],
    pub sigma: Matrix2<f64>,
    pub randomseed: u64,
}

impl AutoregressiveParams {
    pub fn from_params(params: &ParamMap) -> Result<Self, BenchError> {
        let r = ParamReader::new(CONTEXT, params);
        let mu = r.f64_list("mu")?;
        if mu.len() != 2 {
            return Err(r.invalid("mu", "a pair of means"));
        }
        Ok(Self {
            n_samples: read_positive_usize(&r, "n_samples")?,
            alpha: r.f64("alpha")?,
            mu: [mu[0], mu[1]],
            sigma: read_covariance_matrix(&r, "sigma")?,
            randomseed: r.u64("randomseed")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRun {
    pub x1: Vec<f64>,
    pub x2: Vec<f64>,
}

pub fn draw_innovations<R: Rng + ?Sized>(params: &AutoregressiveParams, rng: &mut R) -> ChannelRun {
    let mvn = BivariateNormal::from_matrix(&params.sigma);
    let mut x1 = Vec::with_capacity(params.n_samples);
    let mut x2 = Vec::with_capacity(params.n_samples);
    for _ in 0..params.n_samples {
        let [a, b] = mvn.sample(params.mu, rng);
        x1.push(a);
        x2.push(b);
    }
    ChannelRun { x1, x2 }
}

pub fn filter_autoregressive(alpha: f64, innovations: &ChannelRun) -> ChannelRun {
    let filter = |w: &[f64]| {
        let mut out = Vec::with_capacity(w.len());
        for (t, &value) in w.iter().enumerate() {
            if t == 0 {
                out.push(value);
            } else {
                out.push(alpha * out[t - 1] + value);
            }
        }
        out
    };
    ChannelRun {
        x1: filter(&innovations.x1),
        x2: filter(&innovations.x2),
    }
}

pub fn simulate_autoregressive<R: Rng + ?Sized>(
    params: &AutoregressiveParams,
    rng: &mut R,
) -> ChannelRun {
    let innovations = draw_innovations(params, rng);
    filter_autoregressive(params.alpha, &innovations)
}

pub fn gen_data_sim1(params: &ParamMap, swept: &[String]) -> Result<TimeSeriesTable, BenchError> {
    let (mi, resolved) =
        resolve_conditions(CONTEXT, params, swept, AutoregressiveParams::from_params)?;
    let n_samples = resolved[0].n_samples;
    let mut rng = ChaCha8Rng::seed_from_u64(resolved[0].randomseed);

    let mut x1 = Vec::with_capacity(n_samples * mi.len());
    let mut x2 = Vec::with_capacity(n_samples * mi.len());
    for condition_params in &resolved {
        let run = simulate_autoregressive(condition_params, &mut rng);
        x1.extend(run.x1);
        x2.extend(run.x2);
    }

    TimeSeriesTable::new(
        TableIndex::new(mi.names, mi.conditions, n_samples),
        x1,
        x2,
        None,
        None,
    )
}
