use thiserror::Error;

use crate::data::DataStoreError;
use crate::irf::EDispError;
use crate::parameters::{ParameterError, UnitError};

/// Error types for the gammafit-rs library.
#[derive(Error, Debug)]
pub enum GammaError {
    /// Error raised by the parameter system (validation kind).
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    /// Error raised while parsing or converting units.
    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    /// Error raised by the data store, index tables or index builder.
    #[error("Data store error: {0}")]
    DataStore(#[from] DataStoreError),

    /// Error raised by the energy dispersion algebra.
    #[error("Energy dispersion error: {0}")]
    EDisp(#[from] EDispError),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error for cases that don't fit the other categories.
    #[error("Error: {0}")]
    Other(String),
}

impl GammaError {
    /// Whether this error reports required HDUs missing from an observation.
    ///
    /// This is the only error kind batch operations recover from.
    pub fn is_missing_hdu(&self) -> bool {
        matches!(self, GammaError::DataStore(e) if e.is_missing_hdu())
    }
}

/// Result type alias for gammafit-rs operations.
pub type Result<T> = std::result::Result<T, GammaError>;

/// Extensions for converting from other error types.
impl From<String> for GammaError {
    fn from(s: String) -> Self {
        GammaError::Other(s)
    }
}

impl From<&str> for GammaError {
    fn from(s: &str) -> Self {
        GammaError::Other(s.to_string())
    }
}
