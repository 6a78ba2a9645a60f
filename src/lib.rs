//! Simulation benchmark for time-varying connectivity (TVC) estimators.
//!
//! Four generators produce paired time series with a known (or absent)
//! covariance trajectory, each over a parameter sweep. Connectivity
//! estimators turn every condition into a per-timepoint estimate, and a
//! Bayesian regression of the true covariance on each estimate is ranked by
//! WAIC.

pub mod config;
pub mod dfc;
pub mod diagnostics;
pub mod error;
pub mod evaluate;
pub mod io;
pub mod methods;
pub mod multi_index;
pub mod run;
pub mod sim;
pub mod stats;
pub mod table;
pub mod telemetry;

pub use config::{MethodEntry, Routine, SimulationEntry, StatsConfig, TraceParams};
pub use dfc::{calc_dfc, calc_new_method};
pub use error::BenchError;
pub use evaluate::{calc_waic, model_dfc};
pub use methods::{ConnectivityEstimator, EstimatorRegistry, RawEstimate};
pub use multi_index::{Condition, MultiIndex, ParamMap, ParamValue};
pub use run::{run_simulations, RunOptions, RunSummary};
pub use sim::{gen_data, SimulationKind};
pub use table::{ConnectivityTable, TableIndex, TimeSeriesTable};
