use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use nalgebra::DMatrix;

use crate::error::BenchError;
use crate::methods::{ConnectivityEstimator, EdgePolicy, RawEstimate};
use crate::multi_index::ParamMap;

/// A caller-supplied estimator. Receives both channels stacked as a 2 x T
/// matrix and the method's `params` record.
pub type EstimatorFn =
    Arc<dyn Fn(&DMatrix<f64>, &ParamMap) -> Result<RawEstimate, BenchError> + Send + Sync>;

/// Method ids resolved to caller-supplied estimators.
#[derive(Clone, Default)]
pub struct EstimatorRegistry {
    entries: BTreeMap<String, EstimatorFn>,
}

impl EstimatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&DMatrix<f64>, &ParamMap) -> Result<RawEstimate, BenchError> + Send + Sync + 'static,
    {
        self.entries.insert(id.into(), Arc::new(func));
        self
    }

    pub fn get(&self, id: &str) -> Option<EstimatorFn> {
        self.entries.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }
}

impl fmt::Debug for EstimatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

pub struct FnEstimator {
    name: String,
    func: EstimatorFn,
    params: ParamMap,
}

impl FnEstimator {
    pub fn new(name: impl Into<String>, func: EstimatorFn, params: ParamMap) -> Self {
        Self {
            name: name.into(),
            func,
            params,
        }
    }
}

impl ConnectivityEstimator for FnEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::Reconcile
    }

    fn estimate(&self, ts1: &[f64], ts2: &[f64]) -> Result<RawEstimate, BenchError> {
        let n = ts1.len().min(ts2.len());
        let stacked = DMatrix::from_fn(2, n, |row, col| if row == 0 { ts1[col] } else { ts2[col] });
        (self.func)(&stacked, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::{align, build_estimator};
    use crate::multi_index::ParamValue;

    /// Product of the channels averaged over `window` points, node x node.
    fn moving_product(data: &DMatrix<f64>, params: &ParamMap) -> Result<RawEstimate, BenchError> {
        let window = params.get("window").and_then(ParamValue::as_usize).unwrap_or(3);
        let products: Vec<f64> = (0..data.ncols()).map(|t| data[(0, t)] * data[(1, t)]).collect();
        let frames = products
            .windows(window)
            .map(|w| {
                let v = w.iter().sum::<f64>() / window as f64;
                DMatrix::from_row_slice(2, 2, &[1.0, v, v, 1.0])
            })
            .collect();
        Ok(RawEstimate::NodeNodeTime(frames))
    }

    #[test]
    fn registered_function_is_reconciled() {
        let mut registry = EstimatorRegistry::new();
        registry.register("moving_product", moving_product);
        let params = ParamMap::from([("window".to_string(), ParamValue::Number(5.0))]);
        let estimator = build_estimator(0, "moving_product", &params, &registry).unwrap();
        assert_eq!(estimator.edge_policy(), EdgePolicy::Reconcile);

        let x = vec![1.0; 20];
        let y: Vec<f64> = (0..20).map(|t| t as f64).collect();
        let raw = estimator.estimate(&x, &y).unwrap();
        assert_eq!(raw.len(), 16);
        let aligned = align(estimator.name(), raw, estimator.edge_policy(), 20).unwrap();
        assert!(aligned[1].is_nan());
        assert_eq!(aligned[2], 2.0);
        assert!(aligned[18].is_nan());
    }
}
