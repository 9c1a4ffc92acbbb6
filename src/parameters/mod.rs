//! # Parameter System
//!
//! This module provides the parameter system used by model fitting: named scalar
//! parameters with units, bounds, priors and an optimizer-facing factor/scale
//! decomposition, plus ordered collections in which the same parameter may be
//! shared between several model slots.
//!
//! ## Key Features
//!
//! - **Factor/scale decomposition**: `value = inverse(scale * factor)` with linear,
//!   log or sqrt transforms, so the optimizer sees well-scaled numbers
//! - **Autoscaling**: `scale10` and `factor1` policies pick the scale from the value
//! - **Linked parameters**: collections hold shared references; identity decides linking
//! - **Scoped restore**: `restore_status` snapshots values and frozen flags and
//!   restores them when the guard drops
//! - **Serialization Support**: round-trip rows with serde, keeping links
//!
//! ## Core Components
//!
//! - [`Parameter`]: a single parameter
//! - [`Parameters`]: an ordered, possibly aliased collection
//! - [`ModelParameters`]: named slots of one model component
//! - [`Prior`]: penalty terms attached to a parameter
//! - [`Unit`] and [`Quantity`]: the unit service used by parameter values and bounds
//!
//! ## Example Usage
//!
//! ```rust
//! use gammafit_rs::parameters::{Parameter, Parameters};
//!
//! let params = Parameters::from_parameters(vec![
//!     Parameter::builder("index", 2.0).min(1.0).max(5.0).build().unwrap(),
//!     Parameter::builder("norm", 250.0).unit("cm-2 s-1 TeV-1").build().unwrap(),
//! ]);
//!
//! params.autoscale();
//! assert_eq!(params.factors(), vec![2.0, 2.5]);
//!
//! // An optimizer writes factors back
//! params.set_parameter_factors(&[2.5, 3.0]).unwrap();
//! assert_eq!(params[1].borrow().value(), 300.0);
//! ```

pub mod model;
pub mod parameter;
pub mod parameters;
pub mod prior;
pub mod transform;
pub mod units;


pub use model::ModelParameters;
pub use parameter::{Parameter, ParameterBuilder, ParameterDict, ParameterError, ValueInput};
pub use parameters::{
    shared, ParameterKey, ParameterRef, ParameterRow, Parameters, RestoreStatus,
    SerializationError,
};
pub use prior::Prior;
pub use transform::{scale_linspace, InterpScale, ScaleMethod};
pub use units::{Quantity, Unit, UnitError};
