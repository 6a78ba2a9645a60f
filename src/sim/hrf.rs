//! Sim-3: sim-2 with a mean trajectory built from a hemodynamic response.

use std::path::{Path, PathBuf};

use crate::error::BenchError;
use crate::multi_index::{ParamMap, ParamReader, ParamValue};
use crate::sim::{fluctuating, read_positive_usize, two_row_param};
use crate::table::TimeSeriesTable;

const CONTEXT: &str = "sim-3";

/// Name of the built-in kernel, sampled at TR = 2 s.
pub const CANONICAL_HRF: &str = "hrf_TR2";

/// Parameters that shape the kernel. They, and `mu`, are fixed for the whole
/// sweep.
const FIXED_FIELDS: [&str; 4] = ["hrf_path", "hrf_zeropad", "hrf_scale", "mu"];

#[derive(Debug, Clone, PartialEq)]
pub enum HrfSource {
    Canonical,
    File(PathBuf),
    Inline(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HrfParams {
    pub source: HrfSource,
    pub zeropad: usize,
    pub scale: f64,
}

impl HrfParams {
    pub fn from_params(params: &ParamMap) -> Result<Self, BenchError> {
        let r = ParamReader::new(CONTEXT, params);
        let source = match r.value("hrf_path")? {
            ParamValue::Text(name) if name == CANONICAL_HRF => HrfSource::Canonical,
            ParamValue::Text(path) => HrfSource::File(PathBuf::from(path)),
            value => HrfSource::Inline(
                value
                    .as_f64_vec()
                    .filter(|kernel| !kernel.is_empty())
                    .ok_or_else(|| {
                        r.invalid("hrf_path", "'hrf_TR2', a file path or a list of numbers")
                    })?,
            ),
        };
        Ok(Self {
            source,
            zeropad: r.usize("hrf_zeropad")?,
            scale: r.f64("hrf_scale")?,
        })
    }

    pub fn kernel(&self) -> Result<Vec<f64>, BenchError> {
        match &self.source {
            HrfSource::Canonical => Ok(canonical_hrf_tr2()),
            HrfSource::File(path) => load_hrf_kernel(path),
            HrfSource::Inline(kernel) => Ok(kernel.clone()),
        }
    }
}

fn gamma_pdf(t: f64, shape: u32) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    let ln_factorial: f64 = (1..shape).map(|k| (k as f64).ln()).sum();
    ((shape - 1) as f64 * t.ln() - t - ln_factorial).exp()
}

/// Double-gamma response (peaks 6 and 16 s, undershoot ratio 1/6) sampled at
/// t = 0, 2, ..., 30 s and scaled to a unit peak.
pub fn canonical_hrf_tr2() -> Vec<f64> {
    let raw: Vec<f64> = (0..16)
        .map(|k| {
            let t = 2.0 * k as f64;
            gamma_pdf(t, 6) - gamma_pdf(t, 16) / 6.0
        })
        .collect();
    let peak = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    raw.into_iter().map(|v| v / peak).collect()
}

/// Reads every numeric field of a headerless CSV file, row by row.
pub fn load_hrf_kernel(path: &Path) -> Result<Vec<f64>, BenchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut kernel = Vec::new();
    for record in reader.records() {
        let record = record?;
        for field in record.iter().filter(|f| !f.is_empty()) {
            let value = field.parse::<f64>().map_err(|_| {
                BenchError::InvalidConfig(format!(
                    "{CONTEXT}: non-numeric value '{field}' in {}",
                    path.display()
                ))
            })?;
            kernel.push(value);
        }
    }
    if kernel.is_empty() {
        return Err(BenchError::InvalidConfig(format!(
            "{CONTEXT}: empty HRF kernel in {}",
            path.display()
        )));
    }
    Ok(kernel)
}

/// Pads the kernel with `zeropad` zeros, repeats it until it covers
/// `n_samples`, truncates and scales.
pub fn hrf_mean_trajectory(kernel: &[f64], zeropad: usize, scale: f64, n_samples: usize) -> Vec<f64> {
    let mut period = kernel.to_vec();
    period.resize(kernel.len() + zeropad, 0.0);
    period
        .iter()
        .cycle()
        .take(n_samples)
        .map(|v| v * scale)
        .collect()
}

/// Returns the sim-2 parameter map with `mu` replaced by the HRF trajectory
/// (identical for both channels).
pub(crate) fn resolve_hrf_params(params: &ParamMap, swept: &[String]) -> Result<ParamMap, BenchError> {
    if let Some(name) = swept.iter().find(|name| FIXED_FIELDS.contains(&name.as_str())) {
        return Err(BenchError::InvalidConfig(format!(
            "{CONTEXT}: '{name}' cannot be part of multi_index"
        )));
    }
    let hrf = HrfParams::from_params(params)?;
    let n_samples = read_positive_usize(&ParamReader::new(CONTEXT, params), "n_samples")?;
    let kernel = hrf.kernel()?;
    let trajectory = hrf_mean_trajectory(&kernel, hrf.zeropad, hrf.scale, n_samples);

    let mut resolved = params.clone();
    resolved.insert("mu".to_string(), two_row_param([&trajectory, &trajectory]));
    Ok(resolved)
}

pub fn gen_data_sim3(params: &ParamMap, swept: &[String]) -> Result<TimeSeriesTable, BenchError> {
    let resolved = resolve_hrf_params(params, swept)?;
    fluctuating::generate(CONTEXT, &resolved, swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn sim3_params(hrf_path: ParamValue) -> ParamMap {
        ParamMap::from([
            ("n_samples".to_string(), ParamValue::Number(40.0)),
            ("alpha".to_string(), ParamValue::from_f64_slice(&[0.2, 0.8])),
            ("hrf_path".to_string(), hrf_path),
            ("hrf_zeropad".to_string(), ParamValue::Number(4.0)),
            ("hrf_scale".to_string(), ParamValue::Number(2.0)),
            ("var".to_string(), ParamValue::Number(1.0)),
            ("covar_mu".to_string(), ParamValue::Number(0.2)),
            ("covar_sigma".to_string(), ParamValue::Number(0.1)),
            ("randomseed".to_string(), ParamValue::Number(11.0)),
        ])
    }

    #[test]
    fn canonical_kernel_has_unit_peak_near_six_seconds() {
        let hrf = canonical_hrf_tr2();
        assert_eq!(hrf.len(), 16);
        assert_eq!(hrf[0], 0.0);
        let (argmax, peak) = hrf
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        assert_eq!(peak, 1.0);
        assert!((2..=3).contains(&argmax));
        assert!(hrf[8] < 0.0, "undershoot expected around 16 s");
    }

    #[test]
    fn trajectory_is_padded_tiled_and_scaled() {
        let mu = hrf_mean_trajectory(&[1.0, 2.0], 1, 3.0, 7);
        assert_eq!(mu, vec![3.0, 6.0, 0.0, 3.0, 6.0, 0.0, 3.0]);
    }

    #[test]
    fn mean_follows_hrf_in_both_channels() {
        let params = sim3_params(ParamValue::from_f64_slice(&[0.0, 1.0, 0.5]));
        let resolved = resolve_hrf_params(&params, &["alpha".into()]).unwrap();
        let rows = resolved["mu"].as_f64_matrix().unwrap();
        assert_eq!(rows[0], rows[1]);
        assert_eq!(rows[0].len(), 40);
        assert_relative_eq!(rows[0][1], 2.0);
        assert_relative_eq!(rows[0][8], 2.0);

        let table = gen_data_sim3(&params, &["alpha".into()]).unwrap();
        assert_eq!(table.len(), 80);
        assert!(table.covariance_parameter.is_some());
    }

    #[test]
    fn kernel_can_be_loaded_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0\n0.5\n1.0\n0.25").unwrap();
        let params = sim3_params(ParamValue::Text(file.path().display().to_string()));
        let hrf = HrfParams::from_params(&params).unwrap();
        assert_eq!(hrf.kernel().unwrap(), vec![0.0, 0.5, 1.0, 0.25]);
    }

    #[test]
    fn kernel_shape_cannot_be_swept() {
        let mut params = sim3_params(ParamValue::Text(CANONICAL_HRF.into()));
        params.insert("hrf_scale".into(), ParamValue::from_f64_slice(&[1.0, 2.0]));
        assert!(matches!(
            gen_data_sim3(&params, &["hrf_scale".into()]),
            Err(BenchError::InvalidConfig(_))
        ));
    }
}
