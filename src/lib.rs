//! # gammafit-rs
//!
//! `gammafit-rs` provides the parameter management and data access machinery a
//! gamma-ray astronomy fitting and analysis layer is built on.
//!
//! The library provides:
//! - Fit parameters with a numerically stable `factor * scale` representation,
//!   linear/log/sqrt transforms, bounds, priors and scan ranges
//! - Parameter sets with shared (linked) parameters, selection and scoped restore
//! - A GADF data store resolving observation ids into HDU locations
//! - An index builder creating HDU and observation index tables from event headers
//! - Energy dispersion kernel and migration map algebra
//!
//! ## Basic Usage
//!
//! ```
//! use gammafit_rs::parameters::{Parameter, Parameters};
//!
//! let mut index = Parameter::new("index", 2.0);
//! index.autoscale();
//! assert_eq!(index.scale(), 1.0);
//! assert_eq!(index.factor(), 2.0);
//!
//! let params = Parameters::from_parameters(vec![index, Parameter::new("amplitude", 1e-12)]);
//! assert_eq!(params.names(), vec!["index", "amplitude"]);
//! ```
//!
//! No logger is installed by the library; messages go through the `log` facade.

// Public modules
pub mod error;

// Parameter system
pub mod parameters;

// Data store and index tables
pub mod data;

// Instrument response functions
pub mod irf;

// Re-exports for convenience
pub use data::{DataStore, DataStoreMaker, Observation, Observations};
pub use error::{GammaError, Result};
pub use parameters::{Parameter, Parameters};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
