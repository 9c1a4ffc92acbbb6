//! Observation index table
//!
//! One row per observation, keyed by `OBS_ID`, with free-form metadata columns
//! (pointing, times, telescope configuration, ...).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::data::{DataStoreError, ObsId};

/// A table cell, header keyword value or metadata entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ColumnValue {
    /// Integer view; floats with an integral value and numeric strings also convert
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Int(v) => Some(*v),
            ColumnValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            ColumnValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Int(v) => Some(*v as f64),
            ColumnValue::Float(v) => Some(*v),
            ColumnValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// Total order used for sorting and grouping: nulls, bools, numbers, strings
    pub fn total_cmp(&self, other: &ColumnValue) -> Ordering {
        fn rank(v: &ColumnValue) -> u8 {
            match v {
                ColumnValue::Null => 0,
                ColumnValue::Bool(_) => 1,
                ColumnValue::Int(_) | ColumnValue::Float(_) => 2,
                ColumnValue::Text(_) => 3,
            }
        }

        match (self, other) {
            (ColumnValue::Bool(a), ColumnValue::Bool(b)) => a.cmp(b),
            (ColumnValue::Int(a), ColumnValue::Int(b)) => a.cmp(b),
            (ColumnValue::Text(a), ColumnValue::Text(b)) => a.cmp(b),
            (a, b) if rank(a) == 2 && rank(b) == 2 => {
                let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => write!(f, "None"),
            ColumnValue::Bool(v) => write!(f, "{}", v),
            ColumnValue::Int(v) => write!(f, "{}", v),
            ColumnValue::Float(v) => write!(f, "{}", v),
            ColumnValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Float(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Bool(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ColumnValue::Null, Into::into)
    }
}

/// Table-level metadata (header keywords)
pub type TableMeta = BTreeMap<String, ColumnValue>;

/// One observation table row, keyed by column name
pub type ObsRow = BTreeMap<String, ColumnValue>;

/// Observation index table
///
/// Rows are unique by `OBS_ID`: duplicates are collapsed to their first
/// occurrence on construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationTable {
    columns: Vec<String>,
    rows: Vec<ObsRow>,
    #[serde(default)]
    meta: TableMeta,
}

impl ObservationTable {
    pub fn new(columns: Vec<String>, rows: Vec<ObsRow>, meta: TableMeta) -> Self {
        Self {
            columns,
            rows,
            meta,
        }
        .unique()
    }

    /// Build a table from rows, with columns in first-seen order
    pub fn from_rows(rows: Vec<(Vec<String>, ObsRow)>, meta: TableMeta) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut data = Vec::with_capacity(rows.len());
        for (names, row) in rows {
            for name in names {
                if !columns.contains(&name) {
                    columns.push(name);
                }
            }
            data.push(row);
        }
        Self::new(columns, data, meta)
    }

    fn unique(mut self) -> Self {
        let mut seen = Vec::new();
        self.rows.retain(|row| match row_obs_id(row) {
            Some(id) if seen.contains(&id) => false,
            Some(id) => {
                seen.push(id);
                true
            }
            None => true,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ObsRow] {
        &self.rows
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut TableMeta {
        &mut self.meta
    }

    /// Observation ids in row order
    pub fn obs_ids(&self) -> Vec<ObsId> {
        self.rows.iter().filter_map(row_obs_id).collect()
    }

    /// Row for one observation
    pub fn row(&self, obs_id: ObsId) -> Option<&ObsRow> {
        self.rows.iter().find(|row| row_obs_id(row) == Some(obs_id))
    }

    /// Values of one column in row order, `Null` where a row lacks it
    pub fn column(&self, name: &str) -> Result<Vec<ColumnValue>, DataStoreError> {
        if !self.columns.iter().any(|c| c == name) {
            return Err(DataStoreError::MissingColumn {
                column: name.to_string(),
            });
        }
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(ColumnValue::Null))
            .collect())
    }

    /// Rows whose `OBS_ID` is in `obs_ids`, in table order
    pub fn select_obs_id(&self, obs_ids: &[ObsId]) -> ObservationTable {
        self.filtered(|row| row_obs_id(row).is_some_and(|id| obs_ids.contains(&id)))
    }

    /// Rows where `mask` is true
    pub fn mask(&self, mask: &[bool]) -> Result<ObservationTable, DataStoreError> {
        if mask.len() != self.rows.len() {
            return Err(DataStoreError::SelectionLength {
                expected: self.rows.len(),
                got: mask.len(),
            });
        }
        let mut keep = mask.iter();
        Ok(self.filtered(|_| keep.next().copied().unwrap_or(false)))
    }

    fn filtered(&self, mut keep: impl FnMut(&ObsRow) -> bool) -> ObservationTable {
        ObservationTable {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|&row| keep(row)).cloned().collect(),
            meta: self.meta.clone(),
        }
    }

    /// Group rows by the value of column `key`, in ascending key order
    pub fn group_by(&self, key: &str) -> Result<Vec<(ColumnValue, ObservationTable)>, DataStoreError> {
        let values = self.column(key)?;

        let mut groups: Vec<(ColumnValue, ObservationTable)> = Vec::new();
        for (row, value) in self.rows.iter().zip(values) {
            match groups.iter_mut().find(|(v, _)| *v == value) {
                Some((_, group)) => group.rows.push(row.clone()),
                None => {
                    let mut group = self.filtered(|_| false);
                    group.rows.push(row.clone());
                    groups.push((value, group));
                }
            }
        }
        groups.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        Ok(groups)
    }

    /// Short text summary
    pub fn summary(&self) -> String {
        let observatory = self
            .meta
            .get("OBSERVATORY_NAME")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        format!(
            "Observation table:\nObservatory name: '{}'\nNumber of observations: {}\n",
            observatory,
            self.rows.len()
        )
    }
}

fn row_obs_id(row: &ObsRow) -> Option<ObsId> {
    row.get("OBS_ID").and_then(ColumnValue::as_i64)
}
