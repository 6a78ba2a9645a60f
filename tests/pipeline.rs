use serde_json::{json, Value};
use tvc_bench::io::{read_connectivity_csv, read_model_json, read_timeseries_csv};
use tvc_bench::methods::RawEstimate;
use tvc_bench::{run_simulations, EstimatorRegistry, MethodEntry, ParamMap, ParamValue, Routine, RunOptions};

fn routine(methods: Value) -> Routine {
    Routine::from_value(json!({
        "simulation": [
            {
                "name": "sim-1",
                "multi_index": null,
                "params": {
                    "n_samples": 60, "alpha": 0.5, "mu": [0, 0],
                    "sigma": [[1, 0.4], [0.4, 1]], "randomseed": 1
                }
            },
            {
                "name": "sim-2",
                "params": {
                    "n_samples": 80, "alpha": [0.3, 0.9], "mu": [0, 0], "var": 1,
                    "covar_mu": 0.02, "covar_sigma": 0.1, "randomseed": 2017
                }
            },
            {
                "name": "sim-4",
                "params": {
                    "n_samples": 80, "mu": [0, 0], "var": 1,
                    "covar_range": [-0.5, 0.5], "state_length": [10, 20],
                    "covar_sigma": 0.05, "randomseed": 3
                }
            }
        ],
        "dfc": methods,
        "stats": {
            "trace": { "samples": 200, "n_init": 200 },
            "burn": 50
        }
    }))
    .unwrap()
}

fn default_methods() -> Value {
    json!([
        { "name": "SW", "method": "SW", "params": { "sw_window": 7 } },
        { "name": "JC", "method": "JC" },
        { "name": "TD", "method": "MTD", "params": { "mtd_window": 3 } }
    ])
}

fn options(outdir: &std::path::Path, use_saved: Option<std::path::PathBuf>) -> RunOptions {
    RunOptions {
        outdir: outdir.to_path_buf(),
        use_saved,
        routine_path: "inline".into(),
    }
}

#[test]
fn full_run_writes_tables_models_and_rankings() {
    let out = tempfile::tempdir().unwrap();
    let summary = run_simulations(
        &routine(default_methods()),
        &EstimatorRegistry::new(),
        &[],
        &options(out.path(), None),
    )
    .unwrap();

    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    assert_eq!(summary.simulations.len(), 3);

    let sim1 = &summary.simulations[0];
    assert_eq!(sim1.fitted, 0);
    assert!(sim1.rankings.is_empty());

    let sim2 = &summary.simulations[1];
    assert_eq!(sim2.conditions, 2);
    assert_eq!(sim2.fitted, 6);
    assert_eq!(sim2.rankings.len(), 2);
    for ranking in &sim2.rankings {
        assert_eq!(ranking.rows.len(), 3);
        assert_eq!(ranking.rows[0].delta_waic, 0.0);
    }

    let run = &summary.run_dir;
    assert!(run.join("manifest.json").exists());
    assert!(run.join("tables/sim-2_waictable_alpha-0.3.md").exists());
    assert!(run.join("tables/sim-4_waictable.md").exists());
    assert!(run.join("tables/sim-1_autocorrelation.csv").exists());
    assert!(run.join("tables/sim-4_beta_posterior.csv").exists());
    assert!(!run.join("tables/sim-1_beta_posterior.csv").exists());

    let model = read_model_json(&run.join("stats/sim-2_method-TD_alpha-0.9.json")).unwrap();
    assert_eq!(model.trace.len(), 200);
    assert_eq!(model.method, "TD");

    let data = read_timeseries_csv(&run.join("data/sim-2_data.csv")).unwrap();
    assert_eq!(data.len(), 160);
    let dfc = read_connectivity_csv(&run.join("data/sim-2_dfc.csv")).unwrap();
    assert_eq!(dfc.method_names(), vec!["SW", "JC", "TD"]);

    let manifest: Value =
        serde_json::from_str(&std::fs::read_to_string(run.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["simulations"], json!(["sim-1", "sim-2", "sim-4"]));
}

#[test]
fn same_routine_gives_identical_outputs() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let r = routine(default_methods());
    let first = run_simulations(&r, &EstimatorRegistry::new(), &[], &options(a.path(), None)).unwrap();
    let second = run_simulations(&r, &EstimatorRegistry::new(), &[], &options(b.path(), None)).unwrap();
    for file in ["data/sim-4_dfc.csv", "stats/sim-2_method-SW_alpha-0.3.json", "tables/sim-2_waictable_alpha-0.9.md"] {
        let x = std::fs::read(first.run_dir.join(file)).unwrap();
        let y = std::fs::read(second.run_dir.join(file)).unwrap();
        assert_eq!(x, y, "{file} differs");
    }
}

#[test]
fn saved_tables_are_reused_and_new_methods_appended() {
    let first_out = tempfile::tempdir().unwrap();
    let first = run_simulations(
        &routine(default_methods()),
        &EstimatorRegistry::new(),
        &[],
        &options(first_out.path(), None),
    )
    .unwrap();

    let mut registry = EstimatorRegistry::new();
    registry.register("product", |x, _| {
        Ok(RawEstimate::Series(
            (0..x.ncols()).map(|t| x[(0, t)] * x[(1, t)]).collect(),
        ))
    });
    let new_methods = vec![MethodEntry {
        name: "PROD".into(),
        method: "product".into(),
        params: ParamMap::new(),
    }];

    let second_out = tempfile::tempdir().unwrap();
    let saved = first.run_dir.join("data");
    let second = run_simulations(
        &routine(json!([
            { "name": "JC", "method": "JC" },
            { "name": "SW", "method": "SW", "params": { "sw_window": 7 } }
        ])),
        &registry,
        &new_methods,
        &options(second_out.path(), Some(saved)),
    )
    .unwrap();

    let sim2 = &second.simulations[1];
    assert_eq!(sim2.methods, vec!["JC", "SW", "PROD"]);

    let before = read_timeseries_csv(&first.run_dir.join("data/sim-2_data.csv")).unwrap();
    let after = read_timeseries_csv(&second.run_dir.join("data/sim-2_data.csv")).unwrap();
    assert_eq!(before, after);

    let old = read_connectivity_csv(&first.run_dir.join("data/sim-2_dfc.csv")).unwrap();
    let new = read_connectivity_csv(&second.run_dir.join("data/sim-2_dfc.csv")).unwrap();
    let (x, y) = (old.column("SW").unwrap(), new.column("SW").unwrap());
    assert!(x.iter().zip(y).all(|(a, b)| a == b || (a.is_nan() && b.is_nan())));
}

#[test]
fn invalid_routine_fails_before_writing() {
    let out = tempfile::tempdir().unwrap();
    let err = run_simulations(
        &routine(json!([{ "name": "SW", "method": "SW", "params": { "sw_window": 4 } }])),
        &EstimatorRegistry::new(),
        &[],
        &options(out.path(), None),
    );
    assert!(err.is_err());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn window_longer_than_a_simulation_fails_before_writing() {
    let mut r = routine(json!([{ "name": "SW", "method": "SW", "params": { "sw_window": 15 } }]));
    r.simulation[1].params.insert("n_samples".to_string(), ParamValue::Number(10.0));
    let out = tempfile::tempdir().unwrap();
    let err = run_simulations(&r, &EstimatorRegistry::new(), &[], &options(out.path(), None));
    assert!(err.unwrap_err().to_string().contains("sim-2"));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}
