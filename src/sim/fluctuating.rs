use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::error::BenchError;
use crate::multi_index::{ParamMap, ParamReader};
use crate::sim::{
    read_mean_trajectory, read_positive_usize, read_series, resolve_conditions,
    warn_on_invalid_covariance, BivariateNormal,
};
use crate::table::{TableIndex, TimeSeriesTable};

const CONTEXT: &str = "sim-2";

/// Sim-2: the covariance between the channels is itself autoregressive,
/// `r[t] = N(covar_mu[t], covar_sigma) + alpha * r[t-1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FluctuatingParams {
    pub n_samples: usize,
    pub alpha: f64,
    pub mu: [Vec<f64>; 2],
    pub var: f64,
    pub covar_mu: Vec<f64>,
    pub covar_sigma: f64,
    pub randomseed: u64,
}

impl FluctuatingParams {
    pub fn from_params(params: &ParamMap) -> Result<Self, BenchError> {
        Self::read(CONTEXT, params)
    }

    pub(crate) fn read(context: &str, params: &ParamMap) -> Result<Self, BenchError> {
        let r = ParamReader::new(context, params);
        let n_samples = read_positive_usize(&r, "n_samples")?;
        let var = r.f64("var")?;
        if var <= 0.0 {
            return Err(r.invalid("var", "greater than zero"));
        }
        let covar_sigma = r.f64("covar_sigma")?;
        if covar_sigma < 0.0 {
            return Err(r.invalid("covar_sigma", "non-negative"));
        }
        Ok(Self {
            n_samples,
            alpha: r.f64("alpha")?,
            mu: read_mean_trajectory(&r, "mu", n_samples)?,
            var,
            covar_mu: read_series(&r, "covar_mu", n_samples)?,
            covar_sigma,
            randomseed: r.u64("randomseed")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceRun {
    pub x1: Vec<f64>,
    pub x2: Vec<f64>,
    pub covariance: Vec<f64>,
}

pub fn simulate_fluctuating<R: Rng + ?Sized>(
    params: &FluctuatingParams,
    rng: &mut R,
) -> Result<CovarianceRun, BenchError> {
    let noise = Normal::new(0.0, params.covar_sigma)
        .map_err(|e| BenchError::InvalidConfig(format!("covar_sigma: {e}")))?;

    let n = params.n_samples;
    let mut x1 = Vec::with_capacity(n);
    let mut x2 = Vec::with_capacity(n);
    let mut covariance = Vec::with_capacity(n);

    for t in 0..n {
        let mut covar = params.covar_mu[t] + noise.sample(rng);
        if t > 0 {
            covar += params.alpha * covariance[t - 1];
        }
        let mvn = BivariateNormal::new(params.var, covar, params.var);
        let [a, b] = mvn.sample([params.mu[0][t], params.mu[1][t]], rng);
        x1.push(a);
        x2.push(b);
        covariance.push(covar);
    }

    Ok(CovarianceRun { x1, x2, covariance })
}

pub fn gen_data_sim2(params: &ParamMap, swept: &[String]) -> Result<TimeSeriesTable, BenchError> {
    generate(CONTEXT, params, swept)
}

/// Shared by sim-2 and sim-3, which differ only in how `mu` is built.
pub(crate) fn generate(
    context: &str,
    params: &ParamMap,
    swept: &[String],
) -> Result<TimeSeriesTable, BenchError> {
    let (mi, resolved) = resolve_conditions(context, params, swept, |p| {
        FluctuatingParams::read(context, p)
    })?;
    let n_samples = resolved[0].n_samples;
    let mut rng = ChaCha8Rng::seed_from_u64(resolved[0].randomseed);

    let total = n_samples * mi.len();
    let mut x1 = Vec::with_capacity(total);
    let mut x2 = Vec::with_capacity(total);
    let mut covariance = Vec::with_capacity(total);
    for condition_params in &resolved {
        let run = simulate_fluctuating(condition_params, &mut rng)?;
        x1.extend(run.x1);
        x2.extend(run.x2);
        covariance.extend(run.covariance);
    }

    warn_on_invalid_covariance(context, &covariance);

    TimeSeriesTable::new(
        TableIndex::new(mi.names, mi.conditions, n_samples),
        x1,
        x2,
        Some(covariance),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multi_index::ParamValue;
    use crate::sim::count_invalid_covariance;

    fn base(covar_mu: ParamValue, covar_sigma: f64, alpha: ParamValue) -> ParamMap {
        ParamMap::from([
            ("n_samples".to_string(), ParamValue::Number(50.0)),
            ("alpha".to_string(), alpha),
            ("mu".to_string(), ParamValue::from_f64_slice(&[0.0, 0.0])),
            ("var".to_string(), ParamValue::Number(1.0)),
            ("covar_mu".to_string(), covar_mu),
            ("covar_sigma".to_string(), ParamValue::Number(covar_sigma)),
            ("randomseed".to_string(), ParamValue::Number(7.0)),
        ])
    }

    #[test]
    fn zero_covar_sigma_is_deterministic_recursion() {
        let covar_mu: Vec<f64> = (0..50).map(|t| 0.01 * t as f64 - 0.2).collect();
        let params = base(ParamValue::from_f64_slice(&covar_mu), 0.0, ParamValue::Number(0.3));
        let table = gen_data_sim2(&params, &[]).unwrap();
        let r = table.covariance_parameter.as_ref().unwrap();
        assert_eq!(r[0], covar_mu[0]);
        for t in 1..50 {
            assert_eq!(r[t], covar_mu[t] + 0.3 * r[t - 1]);
        }
    }

    #[test]
    fn emitted_covariance_drives_each_timestep() {
        // r[t] = +/-1 with unit variance makes the channels exactly (anti)collinear.
        let covar_mu: Vec<f64> = (0..50).map(|t| if t % 3 == 0 { -1.0 } else { 1.0 }).collect();
        let params = base(ParamValue::from_f64_slice(&covar_mu), 0.0, ParamValue::Number(0.0));
        let table = gen_data_sim2(&params, &[]).unwrap();
        let r = table.covariance_parameter.as_ref().unwrap();
        for t in 0..50 {
            assert_eq!(table.timeseries_2[t], r[t] * table.timeseries_1[t]);
        }
        assert_eq!(count_invalid_covariance(r), 0);
    }

    #[test]
    fn alpha_sweep_keeps_condition_order() {
        let params = base(
            ParamValue::Number(0.2),
            0.1,
            ParamValue::from_f64_slice(&[0.8, 0.2]),
        );
        let table = gen_data_sim2(&params, &["alpha".into()]).unwrap();
        assert_eq!(table.index.names, vec!["alpha"]);
        assert_eq!(
            table.index.conditions[0].get("alpha"),
            Some(&ParamValue::Number(0.8))
        );
        assert_eq!(table.ground_truth(1).map(<[f64]>::len), Some(50));
    }

    #[test]
    fn negative_variance_is_rejected() {
        let mut params = base(ParamValue::Number(0.2), 0.1, ParamValue::Number(0.5));
        params.insert("var".into(), ParamValue::Number(-1.0));
        assert!(matches!(
            gen_data_sim2(&params, &[]),
            Err(BenchError::InvalidConfig(_))
        ));
    }
}
