use crate::error::BenchError;
use crate::methods::{require_length, ConnectivityEstimator, EdgePolicy, RawEstimate};
use crate::stats::fisher_z;

/// Correlation of all timepoints but one, sign-flipped so that it tracks the
/// connectivity at the left-out timepoint.
#[derive(Debug, Clone, Default)]
pub struct JackknifeMethod;

impl JackknifeMethod {
    pub fn new() -> Self {
        Self
    }
}

impl ConnectivityEstimator for JackknifeMethod {
    fn name(&self) -> &str {
        "JC"
    }

    fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::None
    }

    fn min_samples(&self) -> usize {
        3
    }

    fn estimate(&self, ts1: &[f64], ts2: &[f64]) -> Result<RawEstimate, BenchError> {
        require_length(self.name(), self.min_samples(), ts1.len())?;
        let n = ts1.len().min(ts2.len());
        let (x, y) = (&ts1[..n], &ts2[..n]);

        // Centre first so the leave-one-out sums do not cancel badly.
        let mx = x.iter().sum::<f64>() / n as f64;
        let my = y.iter().sum::<f64>() / n as f64;
        let dx: Vec<f64> = x.iter().map(|v| v - mx).collect();
        let dy: Vec<f64> = y.iter().map(|v| v - my).collect();
        let sxx: f64 = dx.iter().map(|v| v * v).sum();
        let syy: f64 = dy.iter().map(|v| v * v).sum();
        let sxy: f64 = dx.iter().zip(&dy).map(|(a, b)| a * b).sum();

        let m = (n - 1) as f64;
        let values = (0..n)
            .map(|t| {
                // The remaining points have sum -dx[t] in centred coordinates.
                let cxx = sxx - dx[t] * dx[t] - dx[t] * dx[t] / m;
                let cyy = syy - dy[t] * dy[t] - dy[t] * dy[t] / m;
                let cxy = sxy - dx[t] * dy[t] - dx[t] * dy[t] / m;
                fisher_z(-(cxy / (cxx * cyy).sqrt()))
            })
            .collect();
        Ok(RawEstimate::Series(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::pearson;

    #[test]
    fn matches_explicit_leave_one_out() {
        let x = [0.3, -1.2, 0.8, 2.0, -0.4, 1.1, 0.0, -0.9];
        let y = [0.1, -0.7, 1.5, 1.2, 0.2, 0.4, -0.3, -1.8];
        let RawEstimate::Series(values) = JackknifeMethod::new().estimate(&x, &y).unwrap() else {
            panic!("expected a series");
        };
        assert_eq!(values.len(), x.len());
        for t in 0..x.len() {
            let xs: Vec<f64> = x.iter().enumerate().filter(|(i, _)| *i != t).map(|(_, v)| *v).collect();
            let ys: Vec<f64> = y.iter().enumerate().filter(|(i, _)| *i != t).map(|(_, v)| *v).collect();
            let expected = (-pearson(&xs, &ys)).atanh();
            assert!((values[t] - expected).abs() < 1e-10, "t={t}");
        }
    }
}
