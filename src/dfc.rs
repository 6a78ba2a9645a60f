//! Derives connectivity columns from a time series table, one estimator
//! call per condition.

use tracing::{debug, info};

use crate::config::MethodEntry;
use crate::error::BenchError;
use crate::methods::{align, build_estimator, ConnectivityEstimator, EstimatorRegistry};
use crate::table::{ConnectivityTable, TimeSeriesTable};

/// A built estimator and the column it fills.
pub struct DerivedMethod {
    pub name: String,
    pub estimator: Box<dyn ConnectivityEstimator>,
}

/// Builds every estimator up front so that unknown ids and bad parameters
/// fail before any derivation.
pub fn build_methods(
    entries: &[MethodEntry],
    registry: &EstimatorRegistry,
) -> Result<Vec<DerivedMethod>, BenchError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            Ok(DerivedMethod {
                name: entry.name.clone(),
                estimator: build_estimator(index, &entry.method, &entry.params, registry)?,
            })
        })
        .collect()
}

/// Runs one estimator on every condition and concatenates the aligned
/// outputs in condition order.
pub fn derive_connectivity(
    data: &TimeSeriesTable,
    estimator: &dyn ConnectivityEstimator,
) -> Result<Vec<f64>, BenchError> {
    let n_samples = data.index.n_samples;
    let mut column = Vec::with_capacity(data.len());
    for (i, condition) in data.index.conditions.iter().enumerate() {
        let (ts1, ts2) = data.channels(i);
        let raw = estimator.estimate(ts1, ts2)?;
        debug!(
            method = estimator.name(),
            condition = %condition,
            raw_len = raw.len(),
            policy = %estimator.edge_policy(),
            "derived connectivity"
        );
        column.extend(align(estimator.name(), raw, estimator.edge_policy(), n_samples)?);
    }
    Ok(column)
}

/// Connectivity estimate table for `entries`, columns in entry order.
pub fn calc_dfc(
    data: &TimeSeriesTable,
    entries: &[MethodEntry],
    registry: &EstimatorRegistry,
) -> Result<ConnectivityTable, BenchError> {
    let methods = build_methods(entries, registry)?;
    let mut table = ConnectivityTable::new(data.index.clone());
    for method in &methods {
        info!(
            column = method.name.as_str(),
            method = method.estimator.name(),
            conditions = data.index.condition_count(),
            "deriving connectivity"
        );
        let values = derive_connectivity(data, method.estimator.as_ref())?;
        table.insert(&method.name, values)?;
    }
    Ok(table)
}

/// Adds the columns of caller-registered methods to an existing table.
pub fn calc_new_method(
    data: &TimeSeriesTable,
    dfc: &mut ConnectivityTable,
    entries: &[MethodEntry],
    registry: &EstimatorRegistry,
) -> Result<(), BenchError> {
    for (index, entry) in entries.iter().enumerate() {
        if !registry.contains(&entry.method) {
            return Err(BenchError::UnknownMethod {
                index,
                method: entry.method.clone(),
            });
        }
    }
    for method in build_methods(entries, registry)? {
        info!(column = method.name.as_str(), "deriving new method");
        let values = derive_connectivity(data, method.estimator.as_ref())?;
        dfc.insert(&method.name, values)?;
    }
    Ok(())
}
