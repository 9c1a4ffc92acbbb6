//! # Data Store
//!
//! Access to IACT data through an HDU index table and an observation index table,
//! following the GADF storage conventions.
//!
//! - [`HduIndexTable`]: one row per (observation, HDU type), locating the HDU on disk
//! - [`ObservationTable`]: one row per observation with free-form metadata columns
//! - [`DataStore`]: resolves observation ids into [`Observation`] descriptors,
//!   checking that the required IRFs are present
//! - [`DataStoreMaker`]: builds both index tables from event file headers
//!
//! Reading the underlying container files is delegated to the [`IndexFormat`] and
//! [`HeaderReader`] traits; the crate ships JSON based implementations.

pub mod coords;
pub mod data_store;
pub mod hdu_index;
pub mod io;
pub mod maker;
pub mod obs_table;
pub mod observation;

use std::path::PathBuf;
use thiserror::Error;

pub use coords::{GalacticTransform, SkyTransform};
pub use data_store::{
    CheckLevel, CheckRecord, CopyOptions, DataStore, ObservationQuery, RequiredIrf,
    SelectionReport,
};
pub use hdu_index::{make_path, HduClass, HduIndexRow, HduIndexTable, HduLocation, HduType};
pub use io::{Header, HeaderReader, IndexFormat, JsonHeaderReader, JsonIndexFormat, MemoryHeaderReader};
pub use maker::{CalDbIrf, DataStoreMaker, EventsInfo, IrfPaths, PointingInfo, TimeInfo};
pub use obs_table::{ColumnValue, ObsRow, ObservationTable, TableMeta};
pub use observation::{Observation, Observations};

/// Observation identifier
pub type ObsId = i64;

fn join_types(types: &[HduType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by the data store, the index tables and the index builder
#[derive(Error, Debug)]
pub enum DataStoreError {
    #[error("Required HDUs [{}] not found in observation {obs_id}", join_types(.missing))]
    MissingRequiredHdu {
        obs_id: ObsId,
        missing: Vec<HduType>,
    },

    #[error("OBS_ID = {obs_id} not in HDU index table")]
    UnknownObsId { obs_id: ObsId },

    #[error("Invalid HDU type '{value}', choose from: events, gti, pointing, aeff, edisp, psf, bkg, rad_max")]
    InvalidHduType { value: String },

    #[error("Invalid HDU class '{value}'")]
    InvalidHduClass { value: String },

    #[error("'{value}' is not a valid IRF key, choose from: aeff, edisp, psf, bkg, rad_max")]
    InvalidRequiredIrf { value: String },

    #[error("Observation table must be present to select groups of observations")]
    MissingObsTable,

    #[error("Column '{column}' not found in observation table")]
    MissingColumn { column: String },

    #[error("Selection mask must have length {expected}, got {got}")]
    SelectionLength { expected: usize, got: usize },

    #[error("Not a directory: {}", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("File not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Index file {} has no section '{section}'", .path.display())]
    MissingSection { path: PathBuf, section: String },

    #[error("No events files given")]
    NoEventsFiles,

    #[error("Expected one IRF path per events file ({expected}), got {got}")]
    IrfPathCount { expected: usize, got: usize },

    #[error("The time information in the EVENT header are not consistent between observations")]
    InconsistentTimeInfo,

    #[error("Missing header key '{key}' in {}", .path.display())]
    MissingHeaderKey { key: String, path: PathBuf },

    #[error("Invalid value for header key '{key}' in {}: {message}", .path.display())]
    InvalidHeaderValue {
        key: String,
        path: PathBuf,
        message: String,
    },

    #[error("No IRF file found in CALDB directory {}", .path.display())]
    CaldbNotFound { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DataStoreError {
    /// Whether this error reports required HDUs missing from an observation
    pub fn is_missing_hdu(&self) -> bool {
        matches!(self, DataStoreError::MissingRequiredHdu { .. })
    }
}
