//! Bayesian linear regression `y = alpha + beta * x + e`, `e ~ N(0, sigma)`,
//! with `alpha ~ N`, `beta ~ N`, `sigma ~ HalfNormal` on standardized data.
//!
//! Sampling is Metropolis-within-Gibbs: the coefficients are drawn exactly
//! from their Gaussian full conditional, `log sigma` takes a random-walk step.

use nalgebra::{Matrix2, Vector2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::config::TraceParams;
use crate::error::BenchError;
use crate::stats::standardize;

pub const MODEL_SCHEMA_VERSION: &str = "1.0.0";

const ADAPT_EVERY: usize = 100;
const TARGET_ACCEPTANCE: f64 = 0.44;
const INITIAL_STEP: f64 = 0.1;
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Priors {
    pub alpha_mu: f64,
    pub alpha_sd: f64,
    pub beta_mu: f64,
    pub beta_sd: f64,
    pub sigma_sd: f64,
}

impl From<&TraceParams> for Priors {
    fn from(p: &TraceParams) -> Self {
        Self {
            alpha_mu: p.alpha_mu,
            alpha_sd: p.alpha_sd,
            beta_mu: p.beta_mu,
            beta_sd: p.beta_sd,
            sigma_sd: p.sigma_sd,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub alpha: Vec<f64>,
    pub beta: Vec<f64>,
    pub sigma: Vec<f64>,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.alpha.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.is_empty()
    }

    /// Drops the first `burn` draws.
    pub fn burned(&self, burn: usize) -> Result<Trace, BenchError> {
        if burn >= self.len() {
            return Err(BenchError::InsufficientData {
                context: "trace after burn-in".to_string(),
                required: burn + 1,
                actual: self.len(),
            });
        }
        Ok(Trace {
            alpha: self.alpha[burn..].to_vec(),
            beta: self.beta[burn..].to_vec(),
            sigma: self.sigma[burn..].to_vec(),
        })
    }

    pub(crate) fn check(&self) -> Result<(), BenchError> {
        if self.beta.len() != self.len() || self.sigma.len() != self.len() {
            return Err(BenchError::LengthMismatch {
                context: "trace".to_string(),
                expected: self.len(),
                got: self.beta.len().min(self.sigma.len()),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionData {
    pub priors: Priors,
    /// Standardized predictor (connectivity estimate).
    pub x: Vec<f64>,
    /// Standardized response (ground-truth covariance).
    pub y: Vec<f64>,
}

impl RegressionData {
    /// Pointwise log-likelihood of every observation under one draw.
    pub fn log_likelihood(&self, alpha: f64, beta: f64, sigma: f64) -> impl Iterator<Item = f64> + '_ {
        let ln_sigma = sigma.ln();
        self.x.iter().zip(&self.y).map(move |(x, y)| {
            let r = (y - alpha - beta * x) / sigma;
            -LN_SQRT_2PI - ln_sigma - 0.5 * r * r
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerReport {
    pub seed: u64,
    pub n_init: usize,
    pub samples: usize,
    pub sigma_step: f64,
    pub acceptance_rate: f64,
}

/// Everything needed to rank a fit later: data, priors and the draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub schema_version: String,
    pub simulation: String,
    pub method: String,
    pub condition: String,
    pub model: RegressionData,
    pub trace: Trace,
    pub sampler: SamplerReport,
}

/// Sufficient statistics of the standardized data.
#[derive(Debug, Clone, Copy)]
struct Moments {
    n: f64,
    sx: f64,
    sy: f64,
    sxx: f64,
    sxy: f64,
    syy: f64,
}

impl Moments {
    fn new(x: &[f64], y: &[f64]) -> Self {
        let mut m = Self {
            n: x.len() as f64,
            sx: 0.0,
            sy: 0.0,
            sxx: 0.0,
            sxy: 0.0,
            syy: 0.0,
        };
        for (a, b) in x.iter().zip(y) {
            m.sx += a;
            m.sy += b;
            m.sxx += a * a;
            m.sxy += a * b;
            m.syy += b * b;
        }
        m
    }

    fn ssr(&self, alpha: f64, beta: f64) -> f64 {
        let ssr = self.syy - 2.0 * alpha * self.sy - 2.0 * beta * self.sxy
            + self.n * alpha * alpha
            + 2.0 * alpha * beta * self.sx
            + beta * beta * self.sxx;
        ssr.max(0.0)
    }
}

struct Sampler<'a> {
    moments: Moments,
    priors: &'a Priors,
    rng: ChaCha8Rng,
    alpha: f64,
    beta: f64,
    log_sigma: f64,
    step: f64,
}

impl Sampler<'_> {
    fn log_target(&self, u: f64) -> f64 {
        let var = (2.0 * u).exp();
        let s = self.priors.sigma_sd;
        -self.moments.n * u - self.moments.ssr(self.alpha, self.beta) / (2.0 * var) - var / (2.0 * s * s)
            + u
    }

    fn draw_coefficients(&mut self) -> Result<(), BenchError> {
        let m = &self.moments;
        let p = self.priors;
        let inv_var = (-2.0 * self.log_sigma).exp();
        let prec_a = 1.0 / (p.alpha_sd * p.alpha_sd);
        let prec_b = 1.0 / (p.beta_sd * p.beta_sd);
        let precision = Matrix2::new(
            m.n * inv_var + prec_a,
            m.sx * inv_var,
            m.sx * inv_var,
            m.sxx * inv_var + prec_b,
        );
        let rhs = Vector2::new(
            m.sy * inv_var + p.alpha_mu * prec_a,
            m.sxy * inv_var + p.beta_mu * prec_b,
        );
        let chol = precision
            .cholesky()
            .ok_or_else(|| BenchError::Numerical("coefficient precision is not positive definite".to_string()))?;
        let mean = chol.solve(&rhs);
        let z = Vector2::new(
            self.rng.sample::<f64, _>(StandardNormal),
            self.rng.sample::<f64, _>(StandardNormal),
        );
        let offset = chol
            .l()
            .transpose()
            .solve_upper_triangular(&z)
            .ok_or_else(|| BenchError::Numerical("singular coefficient factor".to_string()))?;
        self.alpha = mean[0] + offset[0];
        self.beta = mean[1] + offset[1];
        Ok(())
    }

    fn step_sigma(&mut self) -> bool {
        let z: f64 = self.rng.sample(StandardNormal);
        let proposal = self.log_sigma + self.step * z;
        let log_ratio = self.log_target(proposal) - self.log_target(self.log_sigma);
        let u: f64 = self.rng.gen();
        if u.ln() < log_ratio {
            self.log_sigma = proposal;
            true
        } else {
            false
        }
    }
}

/// Fits the regression of `y` on `x` after standardizing both.
pub fn bayes_model(x: &[f64], y: &[f64], params: &TraceParams) -> Result<(RegressionData, Trace, SamplerReport), BenchError> {
    if x.len() != y.len() {
        return Err(BenchError::LengthMismatch {
            context: "regression input".to_string(),
            expected: y.len(),
            got: x.len(),
        });
    }
    if x.len() < 3 {
        return Err(BenchError::InsufficientData {
            context: "regression".to_string(),
            required: 3,
            actual: x.len(),
        });
    }
    let data = RegressionData {
        priors: Priors::from(params),
        x: standardize(x)?,
        y: standardize(y)?,
    };
    let moments = Moments::new(&data.x, &data.y);

    // Least-squares start.
    let mx = moments.sx / moments.n;
    let my = moments.sy / moments.n;
    let var_x = moments.sxx / moments.n - mx * mx;
    let beta0 = (moments.sxy / moments.n - mx * my) / var_x;
    let alpha0 = my - beta0 * mx;
    let sigma0 = (moments.ssr(alpha0, beta0) / moments.n).sqrt().max(1e-3);

    let mut sampler = Sampler {
        moments,
        priors: &data.priors,
        rng: ChaCha8Rng::seed_from_u64(params.randomseed),
        alpha: alpha0,
        beta: beta0,
        log_sigma: sigma0.ln(),
        step: INITIAL_STEP,
    };

    let mut window_accepts = 0usize;
    for iter in 1..=params.n_init {
        sampler.draw_coefficients()?;
        if sampler.step_sigma() {
            window_accepts += 1;
        }
        if iter % ADAPT_EVERY == 0 {
            let rate = window_accepts as f64 / ADAPT_EVERY as f64;
            if rate > TARGET_ACCEPTANCE {
                sampler.step *= 1.1;
            } else {
                sampler.step /= 1.1;
            }
            window_accepts = 0;
        }
    }

    let mut trace = Trace {
        alpha: Vec::with_capacity(params.samples),
        beta: Vec::with_capacity(params.samples),
        sigma: Vec::with_capacity(params.samples),
    };
    let mut accepted = 0usize;
    for _ in 0..params.samples {
        sampler.draw_coefficients()?;
        if sampler.step_sigma() {
            accepted += 1;
        }
        trace.alpha.push(sampler.alpha);
        trace.beta.push(sampler.beta);
        trace.sigma.push(sampler.log_sigma.exp());
    }

    let report = SamplerReport {
        seed: params.randomseed,
        n_init: params.n_init,
        samples: params.samples,
        sigma_step: sampler.step,
        acceptance_rate: accepted as f64 / params.samples.max(1) as f64,
    };
    Ok((data, trace, report))
}
