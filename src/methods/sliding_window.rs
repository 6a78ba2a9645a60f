use crate::error::BenchError;
use crate::methods::{read_window, require_length, ConnectivityEstimator, EdgePolicy, RawEstimate};
use crate::multi_index::{ParamMap, ParamReader};
use crate::stats::{fisher_z, pearson, weighted_pearson};

pub const WINDOW_KEY: &str = "sw_window";
pub const TAPER_NAME_KEY: &str = "taper_name";
pub const TAPER_PROPERTIES_KEY: &str = "taper_properties";

pub const DEFAULT_WINDOW: usize = 63;

/// Pearson correlation in a window sliding one step at a time.
#[derive(Debug, Clone)]
pub struct SlidingWindowMethod {
    window: usize,
}

impl SlidingWindowMethod {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn from_params(params: &ParamMap) -> Result<Self, BenchError> {
        let r = ParamReader::new("SW", params);
        Ok(Self::new(read_window(&r, WINDOW_KEY, DEFAULT_WINDOW, 3)?))
    }
}

impl ConnectivityEstimator for SlidingWindowMethod {
    fn name(&self) -> &str {
        "SW"
    }

    fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::Symmetric {
            window: self.window,
        }
    }

    fn min_samples(&self) -> usize {
        self.window
    }

    fn estimate(&self, ts1: &[f64], ts2: &[f64]) -> Result<RawEstimate, BenchError> {
        require_length(self.name(), self.min_samples(), ts1.len())?;
        let values = ts1
            .windows(self.window)
            .zip(ts2.windows(self.window))
            .map(|(a, b)| fisher_z(pearson(a, b)))
            .collect();
        Ok(RawEstimate::Series(values))
    }
}

/// Taper shapes. Only the normal density is offered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Taper {
    Normal { loc: f64, scale: f64 },
}

impl Taper {
    fn pdf(&self, x: f64) -> f64 {
        match *self {
            Self::Normal { loc, scale } => {
                let z = (x - loc) / scale;
                (-0.5 * z * z).exp() / (scale * (2.0 * std::f64::consts::PI).sqrt())
            }
        }
    }

    /// Weights at offsets `-(w-1)/2 ..= (w-1)/2`, summing to one.
    pub fn weights(&self, window: usize) -> Vec<f64> {
        let half = (window / 2) as f64;
        let raw: Vec<f64> = (0..window).map(|k| self.pdf(k as f64 - half)).collect();
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|w| w / total).collect()
    }
}

/// Sliding window with taper-weighted correlation.
#[derive(Debug, Clone)]
pub struct TaperedSlidingWindowMethod {
    window: usize,
    weights: Vec<f64>,
}

impl TaperedSlidingWindowMethod {
    pub fn new(window: usize, taper: Taper) -> Self {
        Self {
            window,
            weights: taper.weights(window),
        }
    }

    pub fn from_params(params: &ParamMap) -> Result<Self, BenchError> {
        let r = ParamReader::new("TSW", params);
        let window = read_window(&r, WINDOW_KEY, DEFAULT_WINDOW, 3)?;
        let name = match r.opt(TAPER_NAME_KEY) {
            Some(value) => value
                .as_str()
                .ok_or_else(|| r.invalid(TAPER_NAME_KEY, "a string"))?,
            None => "norm",
        };
        let properties = match r.opt(TAPER_PROPERTIES_KEY) {
            Some(_) => r.f64_list(TAPER_PROPERTIES_KEY)?,
            None => vec![0.0, 10.0],
        };
        let taper = match (name, properties.as_slice()) {
            ("norm", [loc, scale]) if scale.is_finite() && *scale > 0.0 => Taper::Normal {
                loc: *loc,
                scale: *scale,
            },
            ("norm", _) => {
                return Err(r.invalid(TAPER_PROPERTIES_KEY, "[loc, scale] with scale > 0"))
            }
            _ => return Err(r.invalid(TAPER_NAME_KEY, "'norm'")),
        };
        Ok(Self::new(window, taper))
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl ConnectivityEstimator for TaperedSlidingWindowMethod {
    fn name(&self) -> &str {
        "TSW"
    }

    fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::Symmetric {
            window: self.window,
        }
    }

    fn min_samples(&self) -> usize {
        self.window
    }

    fn estimate(&self, ts1: &[f64], ts2: &[f64]) -> Result<RawEstimate, BenchError> {
        require_length(self.name(), self.min_samples(), ts1.len())?;
        let values = ts1
            .windows(self.window)
            .zip(ts2.windows(self.window))
            .map(|(a, b)| fisher_z(weighted_pearson(a, b, &self.weights)))
            .collect();
        Ok(RawEstimate::Series(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|t| (t as f64 * 0.37).sin()).collect();
        let y: Vec<f64> = (0..n).map(|t| (t as f64 * 0.37).sin() + 0.3 * (t as f64 * 1.1).cos()).collect();
        (x, y)
    }

    #[test]
    fn raw_length_is_t_minus_w_plus_one() {
        let (x, y) = ramp(50);
        let raw = SlidingWindowMethod::new(7).estimate(&x, &y).unwrap();
        assert_eq!(raw.len(), 44);
    }

    #[test]
    fn window_values_are_fisher_transformed_pearson() {
        let (x, y) = ramp(20);
        let RawEstimate::Series(values) = SlidingWindowMethod::new(5).estimate(&x, &y).unwrap() else {
            panic!("expected a series");
        };
        assert_relative_eq!(values[3], pearson(&x[3..8], &y[3..8]).atanh(), epsilon = 1e-12);
    }

    #[test]
    fn taper_is_symmetric_and_normalised() {
        let w = Taper::Normal { loc: 0.0, scale: 10.0 }.weights(63);
        assert_eq!(w.len(), 63);
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(w[0], w[62], epsilon = 1e-15);
        assert!(w[31] > w[0]);
    }

    #[test]
    fn short_series_is_insufficient() {
        let (x, y) = ramp(10);
        let tsw = TaperedSlidingWindowMethod::from_params(&ParamMap::new()).unwrap();
        assert!(matches!(
            tsw.estimate(&x, &y),
            Err(BenchError::InsufficientData { required: 63, .. })
        ));
    }
}
