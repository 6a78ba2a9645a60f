//! Parameter sweeps.
//!
//! A simulation or method is configured with a [`ParamMap`]. Some of its names
//! are "swept": their value is a list of candidates, and the sweep is the
//! Cartesian product of those lists taken in alphabetical name order. Every
//! point of the product is a [`Condition`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::BenchError;

/// A single parameter value as it appears in a routine file.
///
/// Lists nest, so a swept vector parameter (`mu = [[0, 0], [1, 1]]`) is a list
/// of lists and each candidate is itself one `List` value. A list candidate is
/// one index level, rendered as a tuple in labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
    List(Vec<ParamValue>),
}

pub type ParamMap = BTreeMap<String, ParamValue>;

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_u64().and_then(|v| usize::try_from(v).ok())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        self.as_list()?.iter().map(ParamValue::as_f64).collect()
    }

    pub fn as_f64_matrix(&self) -> Option<Vec<Vec<f64>>> {
        self.as_list()?.iter().map(ParamValue::as_f64_vec).collect()
    }

    pub fn from_f64_slice(values: &[f64]) -> Self {
        Self::List(values.iter().copied().map(Self::Number).collect())
    }

    /// Inverse of the `Display` rendering used for index labels.
    pub fn parse_label(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(inner) = trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            if inner.trim().is_empty() {
                return Self::List(Vec::new());
            }
            return Self::List(
                split_top_level(inner)
                    .into_iter()
                    .map(Self::parse_label)
                    .collect(),
            );
        }
        match trimmed.parse::<f64>() {
            Ok(v) => Self::Number(v),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Swept names as written in a routine: one name, a list, or null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SweptNames {
    One(String),
    Many(Vec<String>),
}

impl SweptNames {
    pub fn into_sorted(self) -> Vec<String> {
        let mut names = match self {
            Self::One(name) => vec![name],
            Self::Many(names) => names,
        };
        names.sort();
        names.dedup();
        names
    }
}

pub fn deserialize_swept_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<SweptNames>::deserialize(deserializer)?;
    Ok(raw.map(SweptNames::into_sorted).unwrap_or_default())
}

/// One point of a sweep: `(name, value)` pairs in alphabetical name order.
///
/// The empty condition stands for "no sweep" and selects the whole table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    values: Vec<(String, ParamValue)>,
}

impl Condition {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(values: Vec<(String, ParamValue)>) -> Self {
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[(String, ParamValue)] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Returns `base` with every swept name replaced by this condition's value.
    pub fn apply(&self, base: &ParamMap) -> ParamMap {
        let mut resolved = base.clone();
        for (name, value) in &self.values {
            resolved.insert(name.clone(), value.clone());
        }
        resolved
    }

    /// `_alpha-0.5_mu-(0,0)`; empty when nothing is swept. Numbers use the
    /// shortest form that reads back exactly, so `1.0` is written `1`.
    pub fn file_suffix(&self) -> String {
        if self.values.is_empty() {
            return String::new();
        }
        let joined = self
            .values
            .iter()
            .map(|(name, value)| format!("{name}-{value}"))
            .collect::<Vec<_>>()
            .join("_");
        format!("_{}", joined.replace(' ', ""))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            return f.write_str("(all)");
        }
        for (idx, (name, value)) in self.values.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Expanded sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiIndex {
    pub names: Vec<String>,
    pub counts: Vec<usize>,
    pub levels: Vec<Vec<ParamValue>>,
    pub conditions: Vec<Condition>,
}

impl MultiIndex {
    pub fn expand(params: &ParamMap, swept: &[String]) -> Result<Self, BenchError> {
        let mut names = swept.to_vec();
        names.sort();
        names.dedup();

        let mut levels = Vec::with_capacity(names.len());
        for name in &names {
            let value = params
                .get(name)
                .ok_or_else(|| BenchError::missing("multi_index", name.as_str()))?;
            let candidates = match value.as_list() {
                Some(items) if !items.is_empty() => items.to_vec(),
                _ => {
                    return Err(BenchError::InvalidConfig(format!(
                        "multi_index parameter '{name}' must be a non-empty list of candidates"
                    )))
                }
            };
            for (idx, candidate) in candidates.iter().enumerate() {
                if candidates[..idx].contains(candidate) {
                    return Err(BenchError::InvalidConfig(format!(
                        "multi_index parameter '{name}' repeats candidate {candidate}"
                    )));
                }
            }
            levels.push(candidates);
        }

        Ok(Self::from_levels(names, levels))
    }

    /// `names` must already be sorted.
    pub fn from_levels(names: Vec<String>, levels: Vec<Vec<ParamValue>>) -> Self {
        let counts = levels.iter().map(Vec::len).collect();
        let conditions = cartesian_product(&names, &levels);
        Self {
            names,
            counts,
            levels,
            conditions,
        }
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn is_sweep(&self) -> bool {
        !self.names.is_empty()
    }
}

fn cartesian_product(names: &[String], levels: &[Vec<ParamValue>]) -> Vec<Condition> {
    let total: usize = levels.iter().map(Vec::len).product();
    let mut conditions = Vec::with_capacity(total);
    let mut cursor = vec![0usize; levels.len()];

    for _ in 0..total {
        let values = names
            .iter()
            .zip(levels)
            .zip(&cursor)
            .map(|((name, level), &pos)| (name.clone(), level[pos].clone()))
            .collect();
        conditions.push(Condition::new(values));

        // Rightmost name varies fastest.
        for pos in (0..cursor.len()).rev() {
            cursor[pos] += 1;
            if cursor[pos] < levels[pos].len() {
                break;
            }
            cursor[pos] = 0;
        }
    }

    conditions
}

/// Typed access to a resolved parameter map with field-named errors.
pub struct ParamReader<'a> {
    context: &'a str,
    params: &'a ParamMap,
}

impl<'a> ParamReader<'a> {
    pub fn new(context: &'a str, params: &'a ParamMap) -> Self {
        Self { context, params }
    }

    pub fn opt(&self, field: &str) -> Option<&'a ParamValue> {
        self.params.get(field)
    }

    pub fn value(&self, field: &str) -> Result<&'a ParamValue, BenchError> {
        self.params
            .get(field)
            .ok_or_else(|| BenchError::missing(self.context, field))
    }

    pub fn f64(&self, field: &str) -> Result<f64, BenchError> {
        self.value(field)?
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.invalid(field, "a finite number"))
    }

    pub fn u64(&self, field: &str) -> Result<u64, BenchError> {
        self.value(field)?
            .as_u64()
            .ok_or_else(|| self.invalid(field, "a non-negative integer"))
    }

    pub fn usize(&self, field: &str) -> Result<usize, BenchError> {
        self.value(field)?
            .as_usize()
            .ok_or_else(|| self.invalid(field, "a non-negative integer"))
    }

    pub fn f64_list(&self, field: &str) -> Result<Vec<f64>, BenchError> {
        self.value(field)?
            .as_f64_vec()
            .ok_or_else(|| self.invalid(field, "a list of numbers"))
    }

    pub fn invalid(&self, field: &str, expected: &str) -> BenchError {
        BenchError::InvalidConfig(format!(
            "{}: field '{field}' must be {expected}",
            self.context
        ))
    }
}
