//! # Instrument response functions
//!
//! Energy dispersion in two representations:
//!
//! - [`EDispMap`]: migration density `[true energy, E_reco / E_true]`
//! - [`EDispKernel`]: probability matrix `[true energy, reco energy]`
//!
//! Both carry an optional exposure per true energy bin. Sky geometry is not
//! modelled; each object describes a single position.

pub mod axis;
pub mod edisp;

use thiserror::Error;

pub use axis::EnergyAxis;
pub use edisp::{overlap_fraction, EDispKernel, EDispMap};

/// Errors raised when building or combining IRF matrices
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EDispError {
    #[error("Invalid axis: {message}")]
    InvalidAxis { message: String },

    #[error("Expected data of shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Expected {expected} values, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Incompatible axis: {message}")]
    IncompatibleAxis { message: String },

    #[error("Gaussian width must be positive and finite, got {sigma}")]
    InvalidSigma { sigma: f64 },

    #[error("Invalid distribution: {message}")]
    InvalidDistribution { message: String },
}
