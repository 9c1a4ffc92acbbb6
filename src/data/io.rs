//! Reading and writing index tables and event headers
//!
//! Container file formats are pluggable: index tables go through [`IndexFormat`],
//! event file headers through [`HeaderReader`]. JSON implementations of both
//! are provided.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::data::hdu_index::HduIndexTable;
use crate::data::obs_table::{ColumnValue, ObservationTable};
use crate::data::DataStoreError;

/// Header keywords of one HDU
pub type Header = std::collections::BTreeMap<String, ColumnValue>;

/// Storage format of the HDU and observation index tables
pub trait IndexFormat {
    /// Default file name of the HDU index table
    fn hdu_file_name(&self) -> &str;

    /// Default file name of the observation index table
    fn obs_file_name(&self) -> &str;

    fn read_hdu_table(&self, path: &Path) -> Result<HduIndexTable, DataStoreError>;

    fn read_obs_table(&self, path: &Path) -> Result<ObservationTable, DataStoreError>;

    fn write_hdu_table(
        &self,
        table: &HduIndexTable,
        path: &Path,
        overwrite: bool,
    ) -> Result<(), DataStoreError>;

    fn write_obs_table(
        &self,
        table: &ObservationTable,
        path: &Path,
        overwrite: bool,
    ) -> Result<(), DataStoreError>;

    /// Read both tables from one file holding an `HDU_INDEX` and an optional
    /// `OBS_INDEX` section
    fn read_combined(
        &self,
        path: &Path,
    ) -> Result<(HduIndexTable, Option<ObservationTable>), DataStoreError>;
}

/// Index tables stored as JSON documents
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonIndexFormat;

impl JsonIndexFormat {
    pub const HDU_FILE_NAME: &'static str = "hdu-index.json";
    pub const OBS_FILE_NAME: &'static str = "obs-index.json";
    pub const HDU_SECTION: &'static str = "HDU_INDEX";
    pub const OBS_SECTION: &'static str = "OBS_INDEX";

    /// Write both tables into one combined file
    pub fn write_combined(
        &self,
        hdu_table: &HduIndexTable,
        obs_table: Option<&ObservationTable>,
        path: &Path,
        overwrite: bool,
    ) -> Result<(), DataStoreError> {
        let doc = CombinedIndex {
            hdu_index: Some(hdu_table.clone()),
            obs_index: obs_table.cloned(),
        };
        write_json(&doc, path, overwrite)
    }
}

#[derive(Serialize, Deserialize)]
struct CombinedIndex {
    #[serde(rename = "HDU_INDEX", default)]
    hdu_index: Option<HduIndexTable>,
    #[serde(rename = "OBS_INDEX", default, skip_serializing_if = "Option::is_none")]
    obs_index: Option<ObservationTable>,
}

fn open(path: &Path) -> Result<BufReader<File>, DataStoreError> {
    if !path.exists() {
        return Err(DataStoreError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    debug!("Reading {}", path.display());
    Ok(BufReader::new(File::open(path)?))
}

fn write_json<T: Serialize>(value: &T, path: &Path, overwrite: bool) -> Result<(), DataStoreError> {
    if path.exists() && !overwrite {
        return Err(DataStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("File exists: {}", path.display()),
        )));
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

impl IndexFormat for JsonIndexFormat {
    fn hdu_file_name(&self) -> &str {
        Self::HDU_FILE_NAME
    }

    fn obs_file_name(&self) -> &str {
        Self::OBS_FILE_NAME
    }

    fn read_hdu_table(&self, path: &Path) -> Result<HduIndexTable, DataStoreError> {
        Ok(serde_json::from_reader(open(path)?)?)
    }

    fn read_obs_table(&self, path: &Path) -> Result<ObservationTable, DataStoreError> {
        let table: ObservationTable = serde_json::from_reader(open(path)?)?;
        // Re-run construction so duplicate OBS_ID rows collapse
        Ok(ObservationTable::new(
            table.columns().to_vec(),
            table.rows().to_vec(),
            table.meta().clone(),
        ))
    }

    fn write_hdu_table(
        &self,
        table: &HduIndexTable,
        path: &Path,
        overwrite: bool,
    ) -> Result<(), DataStoreError> {
        write_json(table, path, overwrite)
    }

    fn write_obs_table(
        &self,
        table: &ObservationTable,
        path: &Path,
        overwrite: bool,
    ) -> Result<(), DataStoreError> {
        write_json(table, path, overwrite)
    }

    fn read_combined(
        &self,
        path: &Path,
    ) -> Result<(HduIndexTable, Option<ObservationTable>), DataStoreError> {
        let doc: CombinedIndex = serde_json::from_reader(open(path)?)?;
        let hdu_table = doc.hdu_index.ok_or_else(|| DataStoreError::MissingSection {
            path: path.to_path_buf(),
            section: Self::HDU_SECTION.to_string(),
        })?;
        let obs_table = doc
            .obs_index
            .map(|t| ObservationTable::new(t.columns().to_vec(), t.rows().to_vec(), t.meta().clone()));
        Ok((hdu_table, obs_table))
    }
}

/// Source of HDU headers of event files
pub trait HeaderReader: Send + Sync {
    /// Header of HDU `hdu` in the file at `path`
    fn read_header(&self, path: &Path, hdu: &str) -> Result<Header, DataStoreError>;
}

/// Reads headers from JSON files mapping HDU names to keyword objects,
/// e.g. `{"EVENTS": {"OBS_ID": 110380, "TSTART": 0.0}}`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHeaderReader;

impl HeaderReader for JsonHeaderReader {
    fn read_header(&self, path: &Path, hdu: &str) -> Result<Header, DataStoreError> {
        let mut hdus: HashMap<String, Header> = serde_json::from_reader(open(path)?)?;
        hdus.remove(hdu).ok_or_else(|| DataStoreError::MissingSection {
            path: path.to_path_buf(),
            section: hdu.to_string(),
        })
    }
}

/// Headers held in memory, keyed by file path and HDU name
#[derive(Debug, Clone, Default)]
pub struct MemoryHeaderReader {
    headers: HashMap<(PathBuf, String), Header>,
}

impl MemoryHeaderReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, hdu: &str, header: Header) {
        self.headers.insert((path.into(), hdu.to_string()), header);
    }

    /// Builder-style [`MemoryHeaderReader::insert`]
    pub fn with_header(mut self, path: impl Into<PathBuf>, hdu: &str, header: Header) -> Self {
        self.insert(path, hdu, header);
        self
    }
}

impl HeaderReader for MemoryHeaderReader {
    fn read_header(&self, path: &Path, hdu: &str) -> Result<Header, DataStoreError> {
        self.headers
            .get(&(path.to_path_buf(), hdu.to_string()))
            .cloned()
            .ok_or_else(|| DataStoreError::FileNotFound {
                path: path.to_path_buf(),
            })
    }
}

/// Create `dir` and its parents if missing
pub(crate) fn ensure_dir(dir: &Path) -> Result<(), DataStoreError> {
    fs::create_dir_all(dir)?;
    Ok(())
}
