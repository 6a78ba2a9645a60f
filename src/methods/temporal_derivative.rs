use crate::error::BenchError;
use crate::methods::{read_window, require_length, ConnectivityEstimator, EdgePolicy, RawEstimate};
use crate::multi_index::{ParamMap, ParamReader};
use crate::stats::std_dev;

pub const WINDOW_KEY: &str = "mtd_window";
pub const DEFAULT_WINDOW: usize = 7;

/// Multiplication of temporal derivatives, averaged over a moving window.
/// No Fisher transform: the output is not a correlation.
#[derive(Debug, Clone)]
pub struct TemporalDerivativeMethod {
    window: usize,
}

impl TemporalDerivativeMethod {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn from_params(params: &ParamMap) -> Result<Self, BenchError> {
        let r = ParamReader::new("TD", params);
        Ok(Self::new(read_window(&r, WINDOW_KEY, DEFAULT_WINDOW, 1)?))
    }
}

fn scaled_diff(x: &[f64]) -> Vec<f64> {
    let diff: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let sd = std_dev(&diff, 0);
    diff.into_iter().map(|d| d / sd).collect()
}

impl ConnectivityEstimator for TemporalDerivativeMethod {
    fn name(&self) -> &str {
        "TD"
    }

    fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::DerivativeSymmetric {
            window: self.window,
        }
    }

    fn min_samples(&self) -> usize {
        self.window + 1
    }

    fn estimate(&self, ts1: &[f64], ts2: &[f64]) -> Result<RawEstimate, BenchError> {
        require_length(self.name(), self.min_samples(), ts1.len())?;
        let coupling: Vec<f64> = scaled_diff(ts1)
            .iter()
            .zip(scaled_diff(ts2))
            .map(|(a, b)| a * b)
            .collect();
        let w = self.window as f64;
        let values = coupling
            .windows(self.window)
            .map(|window| window.iter().sum::<f64>() / w)
            .collect();
        Ok(RawEstimate::Series(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::align;
    use approx::assert_relative_eq;

    #[test]
    fn aligned_output_matches_input_length() {
        let x: Vec<f64> = (0..30).map(|t| (t as f64 * 0.9).sin()).collect();
        let y: Vec<f64> = (0..30).map(|t| (t as f64 * 0.9).cos()).collect();
        let td = TemporalDerivativeMethod::new(7);
        let raw = td.estimate(&x, &y).unwrap();
        assert_eq!(raw.len(), 23);
        let aligned = align("TD", raw, td.edge_policy(), 30).unwrap();
        assert_eq!(aligned.len(), 30);
        assert!(aligned[..4].iter().all(|v| v.is_nan()));
        assert!(aligned[4].is_finite());
        assert!(aligned[27..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn derivatives_have_unit_variance() {
        let x: Vec<f64> = (0..12).map(|t| ((t * t) % 7) as f64).collect();
        let td = TemporalDerivativeMethod::new(1);
        let RawEstimate::Series(values) = td.estimate(&x, &x).unwrap() else {
            panic!("expected a series");
        };
        assert_eq!(values.len(), 11);
        let diff = scaled_diff(&x);
        assert_relative_eq!(crate::stats::variance(&diff, 0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(values[0], diff[0] * diff[0], epsilon = 1e-12);
    }
}
