use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;

use crate::error::BenchError;
use crate::evaluate::bayes::FittedModel;
use crate::multi_index::{Condition, ParamValue};
use crate::table::{
    ConnectivityTable, TableIndex, TimeSeriesTable, COVARIANCE_MEAN, COVARIANCE_PARAMETER, TIME,
    TIMESERIES_1, TIMESERIES_2,
};

pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";

pub(crate) fn fmt_f64(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else {
        format!("{v}")
    }
}

fn parse_f64(raw: &str, path: &Path) -> Result<f64, BenchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    trimmed.parse::<f64>().map_err(|_| {
        BenchError::InvalidTable(format!("{}: '{trimmed}' is not a number", path.display()))
    })
}

pub fn ensure_outdir(outdir: &Path) -> Result<(), BenchError> {
    fs::create_dir_all(outdir)?;
    Ok(())
}

/// `base/<UTC timestamp>`, suffixed with a counter if it already exists.
pub fn create_timestamped_run_dir(base: &Path) -> Result<PathBuf, BenchError> {
    ensure_outdir(base)?;
    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut run_dir = base.join(&timestamp);
    let mut counter = 1_u32;
    while run_dir.exists() {
        run_dir = base.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }
    fs::create_dir_all(&run_dir)?;
    Ok(run_dir)
}

/// Sub-directories of one run.
#[derive(Debug, Clone)]
pub struct RunLayout {
    pub root: PathBuf,
    pub data: PathBuf,
    pub stats: PathBuf,
    pub tables: PathBuf,
}

impl RunLayout {
    pub fn create(root: &Path) -> Result<Self, BenchError> {
        let layout = Self {
            root: root.to_path_buf(),
            data: root.join("data"),
            stats: root.join("stats"),
            tables: root.join("tables"),
        };
        for dir in [&layout.data, &layout.stats, &layout.tables] {
            ensure_outdir(dir)?;
        }
        Ok(layout)
    }

    pub fn data_csv(&self, simulation: &str) -> PathBuf {
        data_csv_path(&self.data, simulation)
    }

    pub fn dfc_csv(&self, simulation: &str) -> PathBuf {
        dfc_csv_path(&self.data, simulation)
    }
}

pub fn data_csv_path(dir: &Path, simulation: &str) -> PathBuf {
    dir.join(format!("{simulation}_data.csv"))
}

pub fn dfc_csv_path(dir: &Path, simulation: &str) -> PathBuf {
    dir.join(format!("{simulation}_dfc.csv"))
}

/// `{prefix}_method-{method}_{name}-{value}...`
pub fn model_stem(prefix: &str, method: &str, condition: &Condition) -> String {
    format!("{prefix}_method-{method}{}", condition.file_suffix())
}

pub fn waic_table_name(prefix: &str, condition: &Condition) -> String {
    format!("{prefix}_waictable{}.md", condition.file_suffix())
}

fn index_header(index: &TableIndex) -> Vec<String> {
    let mut header = index.names.clone();
    header.push(TIME.to_string());
    header
}

fn write_indexed_csv(
    path: &Path,
    index: &TableIndex,
    columns: &[(&str, &[f64])],
) -> Result<(), BenchError> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    let mut header = index_header(index);
    header.extend(columns.iter().map(|(name, _)| name.to_string()));
    wtr.write_record(&header)?;

    for (c, condition) in index.conditions.iter().enumerate() {
        let labels: Vec<String> = index
            .names
            .iter()
            .map(|name| condition.get(name).map(ToString::to_string).unwrap_or_default())
            .collect();
        for (t, row) in index.range(c).enumerate() {
            let mut record = labels.clone();
            record.push(t.to_string());
            record.extend(columns.iter().map(|(_, values)| fmt_f64(values[row])));
            wtr.write_record(&record)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_timeseries_csv(path: &Path, table: &TimeSeriesTable) -> Result<(), BenchError> {
    write_indexed_csv(path, &table.index, &table.columns())
}

pub fn write_connectivity_csv(path: &Path, table: &ConnectivityTable) -> Result<(), BenchError> {
    let columns: Vec<(&str, &[f64])> = table
        .columns()
        .iter()
        .map(|c| (c.name.as_str(), c.values.as_slice()))
        .collect();
    write_indexed_csv(path, &table.index, &columns)
}

/// Index and value columns of a persisted table. Index columns are every
/// column up to and including `time`.
fn read_indexed_csv(path: &Path) -> Result<(TableIndex, Vec<(String, Vec<f64>)>), BenchError> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let header: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let time_col = header.iter().position(|h| h == TIME).ok_or_else(|| {
        BenchError::InvalidTable(format!("{}: no '{TIME}' column", path.display()))
    })?;
    let names = header[..time_col].to_vec();
    let mut values: Vec<(String, Vec<f64>)> = header[time_col + 1..]
        .iter()
        .map(|name| (name.clone(), Vec::new()))
        .collect();

    let mut conditions: Vec<Condition> = Vec::new();
    let mut n_samples: Option<usize> = None;
    let mut current_len = 0usize;
    for record in rdr.records() {
        let record = record?;
        let time: usize = record
            .get(time_col)
            .and_then(|raw| raw.trim().parse().ok())
            .ok_or_else(|| BenchError::InvalidTable(format!("{}: bad time value", path.display())))?;
        if time == 0 {
            if let Some(prev) = conditions.last() {
                check_block(path, prev, current_len, &mut n_samples)?;
            }
            let pairs = names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), ParamValue::parse_label(record.get(i).unwrap_or(""))))
                .collect();
            conditions.push(Condition::new(pairs));
            current_len = 0;
        } else if time != current_len || conditions.is_empty() {
            return Err(BenchError::InvalidTable(format!(
                "{}: time index must restart at 0 and be contiguous",
                path.display()
            )));
        }
        current_len += 1;
        for (offset, (_, column)) in values.iter_mut().enumerate() {
            column.push(parse_f64(record.get(time_col + 1 + offset).unwrap_or(""), path)?);
        }
    }
    match conditions.last() {
        Some(last) => check_block(path, last, current_len, &mut n_samples)?,
        None => {
            return Err(BenchError::InvalidTable(format!("{}: no rows", path.display())));
        }
    }

    let index = TableIndex::new(names, conditions, n_samples.unwrap_or(0));
    Ok((index, values))
}

fn check_block(
    path: &Path,
    condition: &Condition,
    len: usize,
    n_samples: &mut Option<usize>,
) -> Result<(), BenchError> {
    match n_samples {
        Some(n) if *n != len => Err(BenchError::InvalidTable(format!(
            "{}: condition {condition} has {len} rows, expected {n}",
            path.display()
        ))),
        Some(_) => Ok(()),
        None => {
            *n_samples = Some(len);
            Ok(())
        }
    }
}

pub fn read_timeseries_csv(path: &Path) -> Result<TimeSeriesTable, BenchError> {
    let (index, mut columns) = read_indexed_csv(path)?;
    let mut take = |name: &str| {
        columns
            .iter()
            .position(|(n, _)| n == name)
            .map(|pos| columns.remove(pos).1)
    };
    let missing = |name: &str| {
        BenchError::InvalidTable(format!("{}: missing column '{name}'", path.display()))
    };
    let ts1 = take(TIMESERIES_1).ok_or_else(|| missing(TIMESERIES_1))?;
    let ts2 = take(TIMESERIES_2).ok_or_else(|| missing(TIMESERIES_2))?;
    let covariance = take(COVARIANCE_PARAMETER);
    let state = take(COVARIANCE_MEAN);
    TimeSeriesTable::new(index, ts1, ts2, covariance, state)
}

pub fn read_connectivity_csv(path: &Path) -> Result<ConnectivityTable, BenchError> {
    let (index, columns) = read_indexed_csv(path)?;
    let mut table = ConnectivityTable::new(index);
    for (name, values) in columns {
        table.insert(&name, values)?;
    }
    Ok(table)
}

pub fn write_model_json(path: &Path, model: &FittedModel) -> Result<(), BenchError> {
    let json = serde_json::to_string(model)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_model_json(path: &Path) -> Result<FittedModel, BenchError> {
    if !path.exists() {
        return Err(BenchError::MissingTrace(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn write_text(path: &Path, text: &str) -> Result<(), BenchError> {
    fs::write(path, text)?;
    Ok(())
}

/// Header plus string rows; used by the diagnostics tables.
pub fn write_rows_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<(), BenchError> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub schema_version: String,
    pub created_utc: String,
    pub routine: PathBuf,
    pub use_saved: Option<PathBuf>,
    pub simulations: Vec<String>,
    pub methods: Vec<String>,
    pub files: Vec<PathBuf>,
    pub failures: Vec<String>,
}

pub fn write_manifest_json(path: &Path, manifest: &Manifest) -> Result<(), BenchError> {
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(path, json)?;
    Ok(())
}
