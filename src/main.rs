use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};

use tvc_bench::config::{resolve_default_routine_path, Routine};
use tvc_bench::methods::EstimatorRegistry;
use tvc_bench::run::{run_simulations, RunOptions};
use tvc_bench::telemetry::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "tvc-bench")]
#[command(about = "Simulation benchmark for time-varying connectivity estimators")]
struct Cli {
    /// Routine file (JSON, or TOML by extension).
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "output-tvc-bench")]
    outdir: PathBuf,

    /// Reload `{sim}_data.csv` and `{sim}_dfc.csv` from an earlier run's data directory.
    #[arg(long)]
    use_saved: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    json_logs: bool,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs, cli.log_level);

    let routine_path = cli.config.unwrap_or_else(resolve_default_routine_path);
    let routine = Routine::from_path(&routine_path)
        .with_context(|| format!("failed to load routine {}", routine_path.display()))?;
    if let Some(dir) = &cli.use_saved {
        if !dir.is_dir() {
            bail!("--use-saved {} is not a directory", dir.display());
        }
    }

    let options = RunOptions {
        outdir: cli.outdir,
        use_saved: cli.use_saved,
        routine_path,
    };
    let summary = run_simulations(&routine, &EstimatorRegistry::new(), &[], &options)
        .context("benchmark run failed")?;

    for failure in &summary.failures {
        warn!(failure = failure.as_str(), "incomplete evaluation");
    }
    info!(
        run_dir = %summary.run_dir.display(),
        simulations = summary.simulations.len(),
        "outputs written"
    );
    println!("{}", summary.run_dir.display());
    Ok(())
}
