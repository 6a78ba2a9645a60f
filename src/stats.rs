//! Small descriptive statistics used by the estimators and the evaluation.
//!
//! Correlations of degenerate input (fewer than two points, zero variance)
//! are `NaN`, as they would be in a numeric array library.

use crate::error::BenchError;

pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

/// Variance with `ddof` delta degrees of freedom.
pub fn variance(x: &[f64], ddof: usize) -> f64 {
    if x.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(x);
    x.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (x.len() - ddof) as f64
}

pub fn std_dev(x: &[f64], ddof: usize) -> f64 {
    variance(x, ddof).sqrt()
}

/// z-scores with the sample standard deviation.
pub fn standardize(x: &[f64]) -> Result<Vec<f64>, BenchError> {
    if x.len() < 2 {
        return Err(BenchError::InsufficientData {
            context: "standardize".to_string(),
            required: 2,
            actual: x.len(),
        });
    }
    let m = mean(x);
    let sd = std_dev(x, 1);
    if !(sd.is_finite() && sd > 0.0) {
        return Err(BenchError::Numerical(
            "cannot standardize a series with zero variance".to_string(),
        ));
    }
    Ok(x.iter().map(|v| (v - m) / sd).collect())
}

pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = mean(x);
    let my = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    sxy / (sxx * syy).sqrt()
}

/// Pearson correlation with observation weights. Weights need not sum to one.
pub fn weighted_pearson(x: &[f64], y: &[f64], w: &[f64]) -> f64 {
    let n = x.len().min(y.len()).min(w.len());
    let total: f64 = w[..n].iter().sum();
    if n < 2 || total <= 0.0 {
        return f64::NAN;
    }
    let mut mx = 0.0;
    let mut my = 0.0;
    for i in 0..n {
        mx += w[i] * x[i];
        my += w[i] * y[i];
    }
    mx /= total;
    my /= total;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += w[i] * dx * dy;
        sxx += w[i] * dx * dx;
        syy += w[i] * dy * dy;
    }
    sxy / (sxx * syy).sqrt()
}

/// Fractional ranks starting at 1, ties averaged.
pub fn ranks(x: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..x.len()).collect();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
    let mut out = vec![0.0; x.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && x[order[end]] == x[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            out[idx] = rank;
        }
        start = end;
    }
    out
}

pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    pearson(&ranks(x), &ranks(y))
}

/// Autocorrelation for lags `0..=max_lag` as the Pearson correlation of the
/// series with itself shifted by `lag`. Each lag uses its own means and
/// variances over the overlapping part. NaN once fewer than two points
/// overlap or a slice is constant.
pub fn autocorrelation(x: &[f64], max_lag: usize) -> Vec<f64> {
    (0..=max_lag)
        .map(|lag| {
            if lag >= x.len() {
                return f64::NAN;
            }
            pearson(&x[lag..], &x[..x.len() - lag])
        })
        .collect()
}

/// Linear-interpolated quantile of unsorted data, `q` in `[0, 1]`.
pub fn quantile(x: &[f64], q: f64) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    let mut sorted = x.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Fisher r-to-z transform.
pub fn fisher_z(r: f64) -> f64 {
    r.atanh()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn standardize_uses_sample_std() {
        let z = standardize(&[1.0, 2.0, 3.0]).unwrap();
        assert_relative_eq!(z[0], -1.0);
        assert_relative_eq!(z[2], 1.0);
        assert!(matches!(
            standardize(&[4.0, 4.0, 4.0]),
            Err(BenchError::Numerical(_))
        ));
    }

    #[test]
    fn pearson_and_weighted_agree_on_uniform_weights() {
        let x = [1.0, 2.0, 4.0, 3.0, 6.0];
        let y = [2.0, 1.0, 5.0, 4.0, 7.0];
        assert_relative_eq!(
            pearson(&x, &y),
            weighted_pearson(&x, &y, &[0.2; 5]),
            epsilon = 1e-12
        );
        assert_relative_eq!(pearson(&x, &x), 1.0, epsilon = 1e-12);
        assert!(pearson(&[1.0, 1.0], &[2.0, 3.0]).is_nan());
    }

    #[test]
    fn ranks_average_ties() {
        assert_eq!(ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
        assert_relative_eq!(spearman(&[1.0, 2.0, 3.0], &[1.0, 4.0, 9.0]), 1.0);
    }

    #[test]
    fn autocorrelation_of_alternating_series() {
        let acf = autocorrelation(&[1.0, -1.0, 1.0, -1.0], 4);
        assert_relative_eq!(acf[0], 1.0);
        assert_relative_eq!(acf[1], -1.0);
        assert_relative_eq!(acf[2], 1.0);
        assert!(acf[3].is_nan());
        assert!(acf[4].is_nan());
    }

    #[test]
    fn autocorrelation_uses_the_overlap_moments() {
        // A linear trend stays perfectly correlated with its own shift.
        let trend: Vec<f64> = (0..12).map(f64::from).collect();
        let acf = autocorrelation(&trend, 5);
        for value in &acf {
            assert_relative_eq!(*value, 1.0, epsilon = 1e-12);
        }
        let x = [0.3, 1.2, -0.4, 2.2, 0.9, -1.5, 0.1];
        assert_relative_eq!(autocorrelation(&x, 2)[2], pearson(&x[2..], &x[..5]));
        assert!(autocorrelation(&[2.0; 6], 1).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn quantile_interpolates() {
        let x = [4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(quantile(&x, 0.5), 2.5);
        assert_relative_eq!(quantile(&x, 0.0), 1.0);
        assert_relative_eq!(quantile(&x, 1.0), 4.0);
    }
}
