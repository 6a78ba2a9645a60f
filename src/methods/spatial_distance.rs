use crate::error::BenchError;
use crate::methods::{require_length, ConnectivityEstimator, EdgePolicy, RawEstimate};
use crate::multi_index::{ParamMap, ParamReader};
use crate::stats::{fisher_z, weighted_pearson};

pub const DISTANCE_KEY: &str = "sd_distance";

/// Repeated timepoints are treated as this far apart.
const MIN_DISTANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Euclidean,
    Cityblock,
    Chebyshev,
}

impl DistanceMetric {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "euclidean" => Some(Self::Euclidean),
            "cityblock" | "manhattan" | "taxicab" => Some(Self::Cityblock),
            "chebyshev" => Some(Self::Chebyshev),
            _ => None,
        }
    }

    pub fn distance(self, a: [f64; 2], b: [f64; 2]) -> f64 {
        let d0 = (a[0] - b[0]).abs();
        let d1 = (a[1] - b[1]).abs();
        match self {
            Self::Euclidean => d0.hypot(d1),
            Self::Cityblock => d0 + d1,
            Self::Chebyshev => d0.max(d1),
        }
    }
}

/// Every timepoint is weighted by its inverse distance to the current one.
#[derive(Debug, Clone)]
pub struct SpatialDistanceMethod {
    metric: DistanceMetric,
}

impl SpatialDistanceMethod {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }

    pub fn from_params(params: &ParamMap) -> Result<Self, BenchError> {
        let r = ParamReader::new("SD", params);
        let metric = match r.opt(DISTANCE_KEY) {
            Some(value) => value
                .as_str()
                .and_then(DistanceMetric::parse)
                .ok_or_else(|| r.invalid(DISTANCE_KEY, "euclidean, cityblock or chebyshev"))?,
            None => DistanceMetric::Euclidean,
        };
        Ok(Self::new(metric))
    }

    fn inverse_distance(&self, points: &[[f64; 2]], i: usize, j: usize) -> f64 {
        1.0 / self.metric.distance(points[i], points[j]).max(MIN_DISTANCE)
    }
}

impl ConnectivityEstimator for SpatialDistanceMethod {
    fn name(&self) -> &str {
        "SD"
    }

    fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::None
    }

    fn min_samples(&self) -> usize {
        3
    }

    fn estimate(&self, ts1: &[f64], ts2: &[f64]) -> Result<RawEstimate, BenchError> {
        require_length(self.name(), self.min_samples(), ts1.len())?;
        let points: Vec<[f64; 2]> = ts1.iter().zip(ts2).map(|(&a, &b)| [a, b]).collect();
        let n = points.len();

        // Min-max over off-diagonal pairs; the matrix is symmetric.
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for i in 0..n {
            for j in i + 1..n {
                let w = self.inverse_distance(&points, i, j);
                lo = lo.min(w);
                hi = hi.max(w);
            }
        }
        let span = hi - lo;

        let mut weights = vec![0.0; n];
        let mut values = Vec::with_capacity(n);
        for t in 0..n {
            for (j, w) in weights.iter_mut().enumerate() {
                *w = if j == t || span == 0.0 {
                    1.0
                } else {
                    (self.inverse_distance(&points, t, j) - lo) / span
                };
            }
            values.push(fisher_z(weighted_pearson(ts1, ts2, &weights)));
        }
        Ok(RawEstimate::Series(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_differ() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_eq!(DistanceMetric::Euclidean.distance(a, b), 5.0);
        assert_eq!(DistanceMetric::Cityblock.distance(a, b), 7.0);
        assert_eq!(DistanceMetric::Chebyshev.distance(a, b), 4.0);
    }

    #[test]
    fn matches_dense_weight_matrix() {
        let x: Vec<f64> = (0..40).map(|t| (t as f64 * 0.5).sin()).collect();
        let y: Vec<f64> = (0..40).map(|t| (t as f64 * 0.5).sin() * 0.8 + (t as f64).cos() * 0.2).collect();
        let raw = SpatialDistanceMethod::new(DistanceMetric::Cityblock)
            .estimate(&x, &y)
            .unwrap();
        assert_eq!(raw.len(), 40);
        let RawEstimate::Series(values) = raw else {
            panic!("expected a series");
        };

        let n = x.len();
        let mut dense = vec![vec![f64::NAN; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    dense[i][j] = 1.0 / ((x[i] - x[j]).abs() + (y[i] - y[j]).abs());
                }
            }
        }
        let off_diag = || dense.iter().flatten().copied().filter(|v| !v.is_nan());
        let lo = off_diag().fold(f64::INFINITY, f64::min);
        let hi = off_diag().fold(f64::NEG_INFINITY, f64::max);
        let t = 5;
        let row: Vec<f64> = (0..n)
            .map(|j| if j == t { 1.0 } else { (dense[t][j] - lo) / (hi - lo) })
            .collect();
        let expected = weighted_pearson(&x, &y, &row).atanh();
        assert!((values[t] - expected).abs() < 1e-9);
    }

    #[test]
    fn repeated_timepoints_stay_finite() {
        let mut x: Vec<f64> = (0..30).map(|t| (t as f64 * 0.4).sin()).collect();
        let mut y: Vec<f64> = (0..30).map(|t| (t as f64 * 0.4).cos() + 0.1 * t as f64).collect();
        x[12] = x[4];
        y[12] = y[4];
        for metric in [DistanceMetric::Euclidean, DistanceMetric::Cityblock, DistanceMetric::Chebyshev] {
            let RawEstimate::Series(values) = SpatialDistanceMethod::new(metric).estimate(&x, &y).unwrap() else {
                panic!("expected a series");
            };
            assert!(values.iter().all(|v| v.is_finite()), "{metric:?}: {values:?}");
        }
    }

    #[test]
    fn unknown_metric_is_rejected() {
        let params = ParamMap::from([(
            DISTANCE_KEY.to_string(),
            crate::multi_index::ParamValue::Text("mahalanobis".into()),
        )]);
        assert!(SpatialDistanceMethod::from_params(&params).is_err());
    }
}
