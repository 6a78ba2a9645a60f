//! Batch driver: generate (or reload), derive, evaluate and report every
//! simulation of a routine.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::config::{MethodEntry, Routine, SimulationEntry};
use crate::dfc::{calc_dfc, calc_new_method};
use crate::diagnostics;
use crate::error::BenchError;
use crate::evaluate::{calc_waic, model_dfc, ConditionRanking, EvalFailure};
use crate::io::{self, Manifest, RunLayout, OUTPUT_SCHEMA_VERSION};
use crate::methods::EstimatorRegistry;
use crate::sim::{gen_data, SimulationKind};
use crate::table::{ConnectivityTable, TimeSeriesTable};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Parent of the timestamped run directory.
    pub outdir: PathBuf,
    /// Directory holding `{sim}_data.csv` / `{sim}_dfc.csv` from an earlier run.
    pub use_saved: Option<PathBuf>,
    /// Recorded in the manifest only.
    pub routine_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub simulation: SimulationKind,
    pub conditions: usize,
    pub methods: Vec<String>,
    pub fitted: usize,
    pub rankings: Vec<ConditionRanking>,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub simulations: Vec<SimulationSummary>,
    pub failures: Vec<String>,
}

fn describe(simulation: &str, failure: &EvalFailure) -> String {
    match &failure.method {
        Some(method) => format!(
            "{simulation} {} [{}] {method}: {}",
            failure.stage, failure.condition, failure.reason
        ),
        None => format!(
            "{simulation} {} [{}]: {}",
            failure.stage, failure.condition, failure.reason
        ),
    }
}

fn load_or_generate(
    kind: SimulationKind,
    entry: &SimulationEntry,
    saved: Option<&Path>,
) -> Result<TimeSeriesTable, BenchError> {
    if let Some(dir) = saved {
        let path = io::data_csv_path(dir, kind.name());
        if path.exists() {
            info!(simulation = kind.name(), path = %path.display(), "loading saved data");
            return io::read_timeseries_csv(&path);
        }
        warn!(simulation = kind.name(), path = %path.display(), "no saved data, generating");
    }
    info!(
        simulation = kind.name(),
        multi_index = ?entry.multi_index,
        "generating data"
    );
    gen_data(kind, &entry.params, &entry.multi_index)
}

fn load_or_derive(
    kind: SimulationKind,
    data: &TimeSeriesTable,
    entries: &[MethodEntry],
    registry: &EstimatorRegistry,
    saved: Option<&Path>,
) -> Result<ConnectivityTable, BenchError> {
    if let Some(dir) = saved {
        let path = io::dfc_csv_path(dir, kind.name());
        if path.exists() {
            let saved = io::read_connectivity_csv(&path)?;
            if saved.index != data.index {
                return Err(BenchError::InvalidTable(format!(
                    "{}: index differs from the data table",
                    path.display()
                )));
            }
            let requested: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
            let selected = saved.select(&requested);
            info!(
                simulation = kind.name(),
                methods = ?selected.method_names(),
                "loaded saved estimates"
            );
            return Ok(selected);
        }
    }
    calc_dfc(data, entries, registry)
}

/// Runs every simulation of `routine`. `new_methods` must name estimators in
/// `registry`; their columns are added after the routine's own methods.
///
/// Configuration errors fail the whole run before anything is written.
/// Fit and ranking failures are recorded and the run continues.
pub fn run_simulations(
    routine: &Routine,
    registry: &EstimatorRegistry,
    new_methods: &[MethodEntry],
    options: &RunOptions,
) -> Result<RunSummary, BenchError> {
    routine.validate_with(registry, new_methods)?;
    let all_methods: Vec<MethodEntry> = routine.dfc.iter().chain(new_methods).cloned().collect();

    let run_dir = io::create_timestamped_run_dir(&options.outdir)?;
    let layout = RunLayout::create(&run_dir)?;
    info!(run_dir = %run_dir.display(), "starting run");

    let saved = options.use_saved.as_deref();
    let mut summary = RunSummary {
        run_dir: run_dir.clone(),
        simulations: Vec::new(),
        failures: Vec::new(),
    };

    for entry in &routine.simulation {
        let kind = entry.name;
        let prefix = kind.name();
        let data = load_or_generate(kind, entry, saved)?;
        let mut dfc = load_or_derive(kind, &data, &routine.dfc, registry, saved)?;
        if !new_methods.is_empty() {
            calc_new_method(&data, &mut dfc, new_methods, registry)?;
        }

        let mut files = vec![layout.data_csv(prefix), layout.dfc_csv(prefix)];
        io::write_timeseries_csv(&files[0], &data)?;
        io::write_connectivity_csv(&files[1], &dfc)?;

        files.push(diagnostics::write_autocorrelation(
            &layout.tables,
            prefix,
            &diagnostics::autocorrelation_rows(&data),
        )?);
        files.push(diagnostics::write_method_correlation(
            &layout.tables,
            prefix,
            &diagnostics::method_correlation_rows(&dfc),
        )?);

        let mut sim_summary = SimulationSummary {
            simulation: kind,
            conditions: data.index.condition_count(),
            methods: dfc.method_names(),
            fitted: 0,
            rankings: Vec::new(),
            files: Vec::new(),
        };

        if kind.has_ground_truth() && !dfc.is_empty() {
            let fits = model_dfc(&data, &dfc, &layout.stats, prefix, &routine.stats.trace)?;
            summary
                .failures
                .extend(fits.failures.iter().map(|f| describe(prefix, f)));
            sim_summary.fitted = fits.fitted.len();
            files.extend(fits.fitted.iter().map(|f| f.path.clone()));

            let ranks = calc_waic(
                &dfc,
                &fits,
                &layout.stats,
                &layout.tables,
                prefix,
                routine.stats.burn,
            )?;
            summary
                .failures
                .extend(ranks.failures.iter().map(|f| describe(prefix, f)));
            files.extend(ranks.rankings.iter().map(|r| r.table_path.clone()));
            sim_summary.rankings = ranks.rankings;

            let posterior = diagnostics::posterior_rows(&fits.fitted, routine.stats.burn)?;
            files.push(diagnostics::write_posterior(&layout.tables, prefix, &posterior)?);
        } else {
            info!(simulation = prefix, "no ground truth, skipping evaluation");
        }

        sim_summary.files = files;
        summary.simulations.push(sim_summary);
    }

    let manifest = Manifest {
        schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
        created_utc: Utc::now().to_rfc3339(),
        routine: options.routine_path.clone(),
        use_saved: options.use_saved.clone(),
        simulations: summary
            .simulations
            .iter()
            .map(|s| s.simulation.name().to_string())
            .collect(),
        methods: all_methods.iter().map(|m| m.name.clone()).collect(),
        files: summary
            .simulations
            .iter()
            .flat_map(|s| s.files.iter())
            .filter_map(|f| f.strip_prefix(&run_dir).ok().map(Path::to_path_buf))
            .collect(),
        failures: summary.failures.clone(),
    };
    io::write_manifest_json(&run_dir.join("manifest.json"), &manifest)?;

    info!(
        run_dir = %run_dir.display(),
        simulations = summary.simulations.len(),
        failures = summary.failures.len(),
        "run complete"
    );
    Ok(summary)
}
