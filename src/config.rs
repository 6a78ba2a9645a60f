use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::BenchError;
use crate::methods::{build_estimator, EstimatorRegistry};
use crate::multi_index::{deserialize_swept_names, ParamMap};
use crate::sim::{validate_params, SimulationKind};

pub const DEFAULT_ROUTINE_FILE: &str = "routine.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationEntry {
    pub name: SimulationKind,
    #[serde(default, deserialize_with = "deserialize_swept_names")]
    pub multi_index: Vec<String>,
    pub params: ParamMap,
}

/// One column of the estimate table: `name` labels the column, `method`
/// picks the estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodEntry {
    pub name: String,
    pub method: String,
    #[serde(default)]
    pub params: ParamMap,
}

/// Priors and sampler settings for the per-method regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceParams {
    pub samples: usize,
    pub alpha_mu: f64,
    pub beta_mu: f64,
    pub alpha_sd: f64,
    pub beta_sd: f64,
    pub sigma_sd: f64,
    pub n_init: usize,
    pub randomseed: u64,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            samples: 6000,
            alpha_mu: 0.0,
            beta_mu: 0.0,
            alpha_sd: 1.0,
            beta_sd: 1.0,
            sigma_sd: 1.0,
            n_init: 200_000,
            randomseed: 2017,
        }
    }
}

impl TraceParams {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.samples == 0 {
            return Err(BenchError::InvalidConfig(
                "stats.trace.samples must be greater than zero".to_string(),
            ));
        }
        for (field, sd) in [
            ("alpha_sd", self.alpha_sd),
            ("beta_sd", self.beta_sd),
            ("sigma_sd", self.sigma_sd),
        ] {
            if !(sd.is_finite() && sd > 0.0) {
                return Err(BenchError::InvalidConfig(format!(
                    "stats.trace.{field} must be finite and greater than zero"
                )));
            }
        }
        if !(self.alpha_mu.is_finite() && self.beta_mu.is_finite()) {
            return Err(BenchError::InvalidConfig(
                "stats.trace.alpha_mu and beta_mu must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub trace: TraceParams,
    pub burn: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            trace: TraceParams::default(),
            burn: 1000,
        }
    }
}

impl StatsConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        self.trace.validate()?;
        if self.burn >= self.trace.samples {
            return Err(BenchError::InvalidConfig(format!(
                "stats.burn ({}) must be smaller than stats.trace.samples ({})",
                self.burn, self.trace.samples
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub simulation: Vec<SimulationEntry>,
    pub dfc: Vec<MethodEntry>,
    #[serde(default)]
    pub stats: StatsConfig,
}

impl Routine {
    /// Reads a JSON routine, or TOML when the extension is `.toml`.
    pub fn from_path(path: &Path) -> Result<Self, BenchError> {
        Self::from_value(read_value(path)?)
    }

    pub fn from_value(value: Value) -> Result<Self, BenchError> {
        let Value::Object(mut root) = value else {
            return Err(BenchError::InvalidConfig(
                "routine must be an object with simulation and dfc entries".to_string(),
            ));
        };

        let dfc = check_params(&Value::Object(root.clone()), "dfc")?;
        let simulation = check_params(&Value::Object(root.clone()), "simulation")?
            .into_iter()
            .map(fill_default_multi_index)
            .collect::<Result<Vec<_>, _>>()?;
        root.insert("dfc".to_string(), Value::Array(dfc));
        root.insert("simulation".to_string(), Value::Array(simulation));

        Ok(serde_json::from_value(Value::Object(root))?)
    }

    /// Checks every simulation condition and builds every estimator without
    /// drawing or deriving anything.
    pub fn validate(&self, registry: &EstimatorRegistry) -> Result<(), BenchError> {
        self.validate_with(registry, &[])
    }

    /// Like [`Routine::validate`], with `extra` methods appended to `dfc`.
    /// Every method must fit inside the shortest condition of every
    /// simulation.
    pub fn validate_with(
        &self,
        registry: &EstimatorRegistry,
        extra: &[MethodEntry],
    ) -> Result<(), BenchError> {
        if self.simulation.is_empty() {
            return Err(BenchError::InvalidConfig(
                "routine has no simulation entries".to_string(),
            ));
        }
        let entries: Vec<MethodEntry> = self.dfc.iter().chain(extra).cloned().collect();
        let min_samples = validate_method_entries(&entries, registry)?;

        let mut seen = BTreeSet::new();
        for sim in &self.simulation {
            if !seen.insert(sim.name) {
                return Err(BenchError::InvalidConfig(format!(
                    "simulation {} is listed more than once",
                    sim.name.name()
                )));
            }
            let n_samples = validate_params(sim.name, &sim.params, &sim.multi_index)?;
            for (entry, required) in entries.iter().zip(&min_samples) {
                if n_samples < *required {
                    return Err(BenchError::InvalidConfig(format!(
                        "method {} needs at least {required} timepoints but {} has n_samples {n_samples}",
                        entry.name,
                        sim.name.name()
                    )));
                }
            }
        }
        self.stats.validate()
    }
}

/// Method ids must resolve and column names must be unique. Returns the
/// minimum condition length of each entry.
pub fn validate_method_entries(
    entries: &[MethodEntry],
    registry: &EstimatorRegistry,
) -> Result<Vec<usize>, BenchError> {
    let mut names = BTreeSet::new();
    let mut min_samples = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        if !names.insert(entry.name.as_str()) {
            return Err(BenchError::InvalidConfig(format!(
                "method name '{}' is used by more than one dfc entry",
                entry.name
            )));
        }
        min_samples.push(build_estimator(index, &entry.method, &entry.params, registry)?.min_samples());
    }
    Ok(min_samples)
}

fn read_value(path: &Path) -> Result<Value, BenchError> {
    let raw = fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        Ok(toml::from_str(&raw)?)
    } else {
        Ok(serde_json::from_str(&raw)?)
    }
}

fn structure_error() -> BenchError {
    BenchError::InvalidConfig("Cannot understand parameter structure".to_string())
}

/// Normalises the entries under `head` to an ordered list.
///
/// Accepted shapes, at the root or under `head`: a list, an object keyed by
/// stringified integers, or one record with a `name`. For `dfc`, every entry
/// needs `name` and `method`; a missing `params` defaults to empty.
pub fn check_params(root: &Value, head: &str) -> Result<Vec<Value>, BenchError> {
    let collection = match root.get(head) {
        Some(value) => value,
        None if is_keyed(root) || root.get("name").is_some() => root,
        None => return Err(structure_error()),
    };

    let mut entries = match collection {
        Value::Array(items) => items.clone(),
        Value::Object(map) if is_keyed(collection) => keyed_entries(map)?,
        Value::Object(map) if map.contains_key("name") => vec![collection.clone()],
        _ => return Err(structure_error()),
    };

    if head == "dfc" {
        for (index, entry) in entries.iter_mut().enumerate() {
            let Value::Object(record) = entry else {
                return Err(structure_error());
            };
            let name = match record.get("name") {
                Some(Value::String(name)) => name.clone(),
                Some(other) => other.to_string(),
                None => {
                    return Err(BenchError::InvalidConfig(format!(
                        "name field missing from method: {index}"
                    )))
                }
            };
            if !record.contains_key("method") {
                return Err(BenchError::InvalidConfig(format!(
                    "method field missing from method: {name}"
                )));
            }
            if !record.contains_key("params") {
                warn!(
                    method = name.as_str(),
                    "params field missing from method; assuming no parameters are needed"
                );
                record.insert("params".to_string(), Value::Object(Map::new()));
            }
        }
    }

    Ok(entries)
}

fn is_keyed(value: &Value) -> bool {
    value.get("0").is_some()
}

fn keyed_entries(map: &Map<String, Value>) -> Result<Vec<Value>, BenchError> {
    let mut keyed = map
        .iter()
        .map(|(key, value)| {
            key.parse::<usize>()
                .map(|idx| (idx, value.clone()))
                .map_err(|_| structure_error())
        })
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_by_key(|(idx, _)| *idx);
    Ok(keyed.into_iter().map(|(_, value)| value).collect())
}

/// A simulation without `multi_index` sweeps its conventional parameter;
/// an explicit `null` sweeps nothing.
fn fill_default_multi_index(entry: Value) -> Result<Value, BenchError> {
    let Value::Object(mut record) = entry else {
        return Err(structure_error());
    };
    if !record.contains_key("multi_index") {
        let kind = match record.get("name").and_then(Value::as_str) {
            Some(raw) => SimulationKind::parse(raw)?,
            None => return Err(BenchError::missing("simulation", "name")),
        };
        record.insert(
            "multi_index".to_string(),
            Value::from(kind.default_multi_index()),
        );
    }
    Ok(Value::Object(record))
}

/// `configs/<file>` under the working directory, else under the crate.
pub fn resolve_default_routine_path() -> PathBuf {
    let local = PathBuf::from("configs").join(DEFAULT_ROUTINE_FILE);
    if local.exists() {
        return local;
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("configs")
        .join(DEFAULT_ROUTINE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multi_index::ParamValue;
    use serde_json::json;

    fn sim2() -> Value {
        json!({
            "name": "sim-2",
            "multi_index": "alpha",
            "params": {
                "n_samples": 100, "alpha": [0.2, 0.8], "mu": [0, 0], "var": 1,
                "covar_mu": 0.2, "covar_sigma": 0.1, "randomseed": 2017
            }
        })
    }

    #[test]
    fn dfc_head_accepts_list_keyed_and_single() {
        let list = json!({"dfc": [{"name": "SW", "method": "SW", "params": {}}]});
        let keyed = json!({"dfc": {"1": {"name": "JC", "method": "JC", "params": {}},
                                   "0": {"name": "SW", "method": "SW", "params": {}}}});
        let single = json!({"name": "SW", "method": "SW", "params": {}});
        assert_eq!(check_params(&list, "dfc").unwrap().len(), 1);
        let ordered = check_params(&keyed, "dfc").unwrap();
        assert_eq!(ordered[0]["name"], "SW");
        assert_eq!(ordered[1]["name"], "JC");
        assert_eq!(check_params(&single, "dfc").unwrap().len(), 1);
        assert!(check_params(&json!({"other": 1}), "dfc").is_err());
    }

    #[test]
    fn dfc_entries_need_name_and_method() {
        let no_name = json!({"dfc": [{"method": "SW"}]});
        let err = check_params(&no_name, "dfc").unwrap_err().to_string();
        assert!(err.contains("name field missing from method: 0"));

        let no_method = json!({"dfc": [{"name": "window"}]});
        let err = check_params(&no_method, "dfc").unwrap_err().to_string();
        assert!(err.contains("method field missing from method: window"));

        let no_params = json!({"dfc": [{"name": "JC", "method": "JC"}]});
        assert_eq!(check_params(&no_params, "dfc").unwrap()[0]["params"], json!({}));
    }

    #[test]
    fn routine_defaults_and_validation() {
        let routine = Routine::from_value(json!({
            "simulation": {"0": sim2()},
            "dfc": [{"name": "SW", "method": "SW", "params": {"sw_window": 15}}]
        }))
        .unwrap();
        assert_eq!(routine.simulation[0].multi_index, vec!["alpha"]);
        assert_eq!(routine.stats.burn, 1000);
        assert_eq!(routine.stats.trace.randomseed, 2017);
        routine.validate(&EstimatorRegistry::new()).unwrap();
    }

    #[test]
    fn missing_multi_index_uses_simulation_default() {
        let mut entry = sim2();
        entry.as_object_mut().unwrap().remove("multi_index");
        let routine = Routine::from_value(json!({"simulation": [entry], "dfc": []})).unwrap();
        assert_eq!(routine.simulation[0].multi_index, vec!["alpha"]);

        let mut explicit_null = sim2();
        explicit_null["multi_index"] = Value::Null;
        explicit_null["params"]["alpha"] = json!(0.5);
        let routine = Routine::from_value(json!({"simulation": [explicit_null], "dfc": []})).unwrap();
        assert!(routine.simulation[0].multi_index.is_empty());
    }

    #[test]
    fn validation_catches_bad_entries_before_running() {
        let routine = Routine::from_value(json!({
            "simulation": [sim2()],
            "dfc": [{"name": "X", "method": "nope", "params": {}}]
        }))
        .unwrap();
        assert!(matches!(
            routine.validate(&EstimatorRegistry::new()),
            Err(BenchError::UnknownMethod { index: 0, .. })
        ));

        let bad_sim = json!({"simulation": [{"name": "sim-7", "params": {}}], "dfc": []});
        assert!(matches!(
            Routine::from_value(bad_sim),
            Err(BenchError::UnknownSimulation(_))
        ));
    }

    #[test]
    fn windows_longer_than_the_simulation_are_rejected() {
        let mut short = sim2();
        short["params"]["n_samples"] = json!(10);
        let routine = Routine::from_value(json!({
            "simulation": [short],
            "dfc": [{"name": "SW", "method": "SW", "params": {"sw_window": 15}}]
        }))
        .unwrap();
        let err = routine.validate(&EstimatorRegistry::new()).unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig(_)));
        assert!(err.to_string().contains("at least 15"));

        let routine = Routine::from_value(json!({"simulation": [sim2()], "dfc": []})).unwrap();
        let td = MethodEntry {
            name: "TD".into(),
            method: "TD".into(),
            params: ParamMap::from([("mtd_window".to_string(), ParamValue::Number(101.0))]),
        };
        routine.validate(&EstimatorRegistry::new()).unwrap();
        assert!(routine.validate_with(&EstimatorRegistry::new(), &[td]).is_err());
    }

    #[test]
    fn toml_routines_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routine.toml");
        fs::write(
            &path,
            r#"
[[simulation]]
name = "sim-1"
multi_index = []
[simulation.params]
n_samples = 50
alpha = 0.5
mu = [0, 0]
sigma = [[1, 0.3], [0.3, 1]]
randomseed = 1

[[dfc]]
name = "JC"
method = "JC"

[stats]
burn = 10
[stats.trace]
samples = 100
n_init = 100
"#,
        )
        .unwrap();
        let routine = Routine::from_path(&path).unwrap();
        assert_eq!(routine.simulation[0].name, SimulationKind::Autoregressive);
        assert_eq!(routine.stats.trace.samples, 100);
        routine.validate(&EstimatorRegistry::new()).unwrap();
    }
}
