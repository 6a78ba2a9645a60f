//! Column tables indexed by `(condition..., time)`.

use std::ops::Range;

use crate::error::BenchError;
use crate::multi_index::Condition;

pub const TIMESERIES_1: &str = "timeseries_1";
pub const TIMESERIES_2: &str = "timeseries_2";
pub const COVARIANCE_PARAMETER: &str = "covariance_parameter";
pub const COVARIANCE_MEAN: &str = "covariance_mean";
pub const TIME: &str = "time";

/// Row index shared by a raw data table and every estimate table derived from
/// it. Conditions are stored in sweep order, each spanning `n_samples` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableIndex {
    pub names: Vec<String>,
    pub conditions: Vec<Condition>,
    pub n_samples: usize,
}

impl TableIndex {
    pub fn new(names: Vec<String>, conditions: Vec<Condition>, n_samples: usize) -> Self {
        Self {
            names,
            conditions,
            n_samples,
        }
    }

    pub fn len(&self) -> usize {
        self.conditions.len() * self.n_samples
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    pub fn range(&self, condition: usize) -> Range<usize> {
        let start = condition * self.n_samples;
        start..start + self.n_samples
    }

    pub(crate) fn check_column(&self, context: &str, column: &[f64]) -> Result<(), BenchError> {
        if column.len() != self.len() {
            return Err(BenchError::LengthMismatch {
                context: context.to_string(),
                expected: self.len(),
                got: column.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    pub index: TableIndex,
    pub timeseries_1: Vec<f64>,
    pub timeseries_2: Vec<f64>,
    pub covariance_parameter: Option<Vec<f64>>,
    pub covariance_mean: Option<Vec<f64>>,
}

impl TimeSeriesTable {
    pub fn new(
        index: TableIndex,
        timeseries_1: Vec<f64>,
        timeseries_2: Vec<f64>,
        covariance_parameter: Option<Vec<f64>>,
        covariance_mean: Option<Vec<f64>>,
    ) -> Result<Self, BenchError> {
        index.check_column(TIMESERIES_1, &timeseries_1)?;
        index.check_column(TIMESERIES_2, &timeseries_2)?;
        if let Some(col) = &covariance_parameter {
            index.check_column(COVARIANCE_PARAMETER, col)?;
        }
        if let Some(col) = &covariance_mean {
            index.check_column(COVARIANCE_MEAN, col)?;
        }
        Ok(Self {
            index,
            timeseries_1,
            timeseries_2,
            covariance_parameter,
            covariance_mean,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn channels(&self, condition: usize) -> (&[f64], &[f64]) {
        let range = self.index.range(condition);
        (
            &self.timeseries_1[range.clone()],
            &self.timeseries_2[range],
        )
    }

    pub fn ground_truth(&self, condition: usize) -> Option<&[f64]> {
        let range = self.index.range(condition);
        self.covariance_parameter.as_ref().map(|col| &col[range])
    }

    /// Value columns in persisted order.
    pub fn columns(&self) -> Vec<(&'static str, &[f64])> {
        let mut cols: Vec<(&'static str, &[f64])> = vec![
            (TIMESERIES_1, &self.timeseries_1),
            (TIMESERIES_2, &self.timeseries_2),
        ];
        if let Some(col) = &self.covariance_parameter {
            cols.push((COVARIANCE_PARAMETER, col));
        }
        if let Some(col) = &self.covariance_mean {
            cols.push((COVARIANCE_MEAN, col));
        }
        cols
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// One column per method, sharing the source table's index.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityTable {
    pub index: TableIndex,
    columns: Vec<MethodColumn>,
}

impl ConnectivityTable {
    pub fn new(index: TableIndex) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Adds or replaces a method column.
    pub fn insert(&mut self, name: &str, values: Vec<f64>) -> Result<(), BenchError> {
        self.index.check_column(name, &values)?;
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == name) {
            existing.values = values;
        } else {
            self.columns.push(MethodColumn {
                name: name.to_string(),
                values,
            });
        }
        Ok(())
    }

    pub fn columns(&self) -> &[MethodColumn] {
        &self.columns
    }

    pub fn method_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn condition_column(&self, name: &str, condition: usize) -> Option<&[f64]> {
        let range = self.index.range(condition);
        self.column(name).map(|col| &col[range])
    }

    /// Keeps the requested methods that exist, in request order. Names absent
    /// from the table are dropped.
    pub fn select(&self, requested: &[String]) -> Self {
        let columns = requested
            .iter()
            .filter_map(|name| self.columns.iter().find(|c| &c.name == name).cloned())
            .collect();
        Self {
            index: self.index.clone(),
            columns,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
