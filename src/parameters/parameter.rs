//! Parameter definition and implementation
//!
//! This module provides the Parameter struct, the fundamental building block of
//! the parameter system. The physical value of a parameter is split into an
//! optimizer-facing `factor` and a `scale`:
//!
//! ```text
//! factor = transform(value) / scale
//! value  = inverse(scale * factor)
//! ```
//!
//! Users interact with `value`, `quantity`, `min` and `max`; only optimizer
//! interfaces need `factor`, `factor_min` and `factor_max`, so the optimizer sees
//! a well-scaled problem.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::parameters::prior::Prior;
use crate::parameters::transform::{scale_linspace, InterpScale, ScaleMethod};
use crate::parameters::units::{Quantity, Unit, UnitError};

/// Errors that can occur when working with parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Invalid scale method '{value}', expected one of: scale10, factor1")]
    InvalidScaleMethod { value: String },

    #[error("Invalid transform '{value}', expected one of: lin, log, sqrt")]
    InvalidTransform { value: String },

    #[error("{what} must have same length as parameter list: expected {expected}, got {got}")]
    LengthMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("No parameter: '{name}'")]
    NotFound { name: String },

    #[error("Parameter index {index} out of range for {len} parameters")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Expected parameter name '{expected}', got '{got}'")]
    NameMismatch { expected: String, got: String },

    #[error("Parameter slot '{name}' is already declared")]
    DuplicateSlot { name: String },

    #[error("Unit must be equivalent to '{expected}' for parameter '{name}', got '{got}'")]
    UnitConversion {
        name: String,
        expected: String,
        got: String,
    },

    #[error("Invalid quantity for parameter '{name}': {message}")]
    InvalidQuantity { name: String, message: String },
}

/// Input accepted by the bound and error setters
///
/// Bounds may be given as plain floats, as quantities (converted to the
/// parameter's unit), as quantity strings, or as missing (unbounded).
#[derive(Debug, Clone, PartialEq)]
pub enum ValueInput {
    Float(f64),
    Quantity(Quantity),
    Text(String),
    Missing,
}

impl From<f64> for ValueInput {
    fn from(value: f64) -> Self {
        ValueInput::Float(value)
    }
}

impl From<Option<f64>> for ValueInput {
    fn from(value: Option<f64>) -> Self {
        value.map_or(ValueInput::Missing, ValueInput::Float)
    }
}

impl From<Quantity> for ValueInput {
    fn from(value: Quantity) -> Self {
        ValueInput::Quantity(value)
    }
}

impl From<&str> for ValueInput {
    fn from(value: &str) -> Self {
        ValueInput::Text(value.to_string())
    }
}

impl From<String> for ValueInput {
    fn from(value: String) -> Self {
        ValueInput::Text(value)
    }
}

/// A model parameter
///
/// Cloning a parameter produces a fully independent deep copy. Sharing a
/// parameter between several containers (linking) goes through
/// [`ParameterRef`](crate::parameters::ParameterRef).
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: f64,
    factor: f64,
    scale: f64,
    unit: Unit,
    min: f64,
    max: f64,
    frozen: bool,
    error: f64,
    scan_min: Option<f64>,
    scan_max: Option<f64>,
    scan_n_values: usize,
    scan_n_sigma: u32,
    scan_values: Option<Vec<f64>>,
    interp: InterpScale,
    scale_method: Option<ScaleMethod>,
    scale_transform: InterpScale,
    prior: Option<Prior>,
    component_type: Option<String>,
    link_label: Option<String>,
}

impl Parameter {
    /// Create a new dimensionless parameter with default settings
    ///
    /// # Examples
    ///
    /// ```
    /// use gammafit_rs::parameters::Parameter;
    ///
    /// let param = Parameter::new("index", 2.0);
    /// assert_eq!(param.name(), "index");
    /// assert_eq!(param.value(), 2.0);
    /// assert_eq!(param.factor(), 2.0);
    /// assert_eq!(param.scale(), 1.0);
    /// assert!(param.min().is_nan());
    /// assert!(!param.frozen());
    /// ```
    pub fn new(name: &str, value: f64) -> Self {
        let mut param = Self {
            name: name.to_string(),
            value: 0.0,
            factor: 0.0,
            scale: 1.0,
            unit: Unit::dimensionless(),
            min: f64::NAN,
            max: f64::NAN,
            frozen: false,
            error: 0.0,
            scan_min: None,
            scan_max: None,
            scan_n_values: 11,
            scan_n_sigma: 2,
            scan_values: None,
            interp: InterpScale::Lin,
            scale_method: Some(ScaleMethod::Scale10),
            scale_transform: InterpScale::Lin,
            prior: None,
            component_type: None,
            link_label: None,
        };
        param.set_value(value);
        param
    }

    /// Start building a parameter with non-default settings
    pub fn builder(name: &str, value: impl Into<ValueInput>) -> ParameterBuilder {
        ParameterBuilder::new(name, value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the physical value, recomputing the factor with the current scale
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
        self.factor = self.transform(value);
    }

    /// Optimizer-facing factor
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Set the factor, recomputing the physical value with the current scale
    pub fn set_factor(&mut self, factor: f64) {
        self.factor = factor;
        self.value = self.inverse_transform(factor);
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Replace the unit without converting the value
    pub fn set_unit(&mut self, unit: Unit) {
        self.unit = unit;
    }

    /// Value with unit
    pub fn quantity(&self) -> Quantity {
        Quantity::new(self.value, self.unit.clone())
    }

    /// Set value and unit together
    ///
    /// Fails without modifying the parameter if the new unit is not
    /// dimensionally equivalent to the current one.
    pub fn set_quantity(&mut self, quantity: Quantity) -> Result<(), ParameterError> {
        if !quantity.unit.is_equivalent(&self.unit) {
            return Err(ParameterError::UnitConversion {
                name: self.name.clone(),
                expected: self.unit.to_fits_string(),
                got: quantity.unit.to_fits_string(),
            });
        }
        self.set_value(quantity.value);
        self.unit = quantity.unit;
        Ok(())
    }

    /// Lower bound, NaN when unbounded
    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn set_min(&mut self, min: impl Into<ValueInput>) -> Result<(), ParameterError> {
        self.min = self.resolve_input(min.into())?.unwrap_or(f64::NAN);
        Ok(())
    }

    /// Upper bound, NaN when unbounded
    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn set_max(&mut self, max: impl Into<ValueInput>) -> Result<(), ParameterError> {
        self.max = self.resolve_input(max.into())?.unwrap_or(f64::NAN);
        Ok(())
    }

    /// Set either bound; `None` leaves that bound unchanged
    pub fn set_lim(
        &mut self,
        min: Option<ValueInput>,
        max: Option<ValueInput>,
    ) -> Result<(), ParameterError> {
        if let Some(min) = min {
            self.set_min(min)?;
        }
        if let Some(max) = max {
            self.set_max(max)?;
        }
        Ok(())
    }

    /// Lower bound in optimizer space, `transform(min)`
    pub fn factor_min(&self) -> f64 {
        self.transform(self.min)
    }

    /// Upper bound in optimizer space, `transform(max)`
    pub fn factor_max(&self) -> f64 {
        self.transform(self.max)
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    pub fn set_error(&mut self, error: impl Into<ValueInput>) -> Result<(), ParameterError> {
        self.error = self
            .resolve_input(error.into())?
            .ok_or_else(|| ParameterError::InvalidQuantity {
                name: self.name.clone(),
                message: "error must be a number or quantity".to_string(),
            })?;
        Ok(())
    }

    fn resolve_input(&self, input: ValueInput) -> Result<Option<f64>, ParameterError> {
        let quantity = match input {
            ValueInput::Missing => return Ok(None),
            ValueInput::Float(value) => return Ok(Some(value)),
            ValueInput::Quantity(quantity) => quantity,
            ValueInput::Text(text) => Quantity::parse(&text).map_err(|e| self.quantity_error(e))?,
        };
        quantity
            .value_in(&self.unit)
            .map(Some)
            .map_err(|e| self.quantity_error(e))
    }

    fn quantity_error(&self, err: UnitError) -> ParameterError {
        match err {
            UnitError::Incompatible { from, to } => ParameterError::UnitConversion {
                name: self.name.clone(),
                expected: to,
                got: from,
            },
            other => ParameterError::InvalidQuantity {
                name: self.name.clone(),
                message: other.to_string(),
            },
        }
    }

    pub fn frozen(&self) -> bool {
        self.frozen
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Interpolation scale used for scan values
    pub fn interp(&self) -> InterpScale {
        self.interp
    }

    pub fn set_interp(&mut self, interp: InterpScale) {
        self.interp = interp;
    }

    pub fn scale_method(&self) -> Option<ScaleMethod> {
        self.scale_method
    }

    /// Change the scale method, resetting the factor/scale decomposition first
    pub fn set_scale_method(&mut self, method: Option<ScaleMethod>) {
        self.reset_autoscale();
        self.scale_method = method;
    }

    pub fn scale_transform(&self) -> InterpScale {
        self.scale_transform
    }

    /// Change the value transform, resetting the factor/scale decomposition first
    pub fn set_scale_transform(&mut self, transform: InterpScale) {
        self.reset_autoscale();
        self.scale_transform = transform;
    }

    /// Model component type this parameter is bound to (e.g. "spectral")
    pub fn component_type(&self) -> Option<&str> {
        self.component_type.as_deref()
    }

    pub fn set_component_type(&mut self, component_type: Option<&str>) {
        self.component_type = component_type.map(|s| s.to_string());
    }

    /// Serialization alias used when this parameter is shared between slots
    pub fn link_label(&self) -> Option<&str> {
        self.link_label.as_deref()
    }

    pub(crate) fn set_link_label(&mut self, label: Option<String>) {
        self.link_label = label;
    }

    pub fn prior(&self) -> Option<&Prior> {
        self.prior.as_ref()
    }

    pub fn set_prior(&mut self, prior: Option<Prior>) {
        self.prior = prior;
    }

    /// Prior penalty for the current value, `None` when no prior is set
    pub fn prior_stat_sum(&self) -> Option<f64> {
        self.prior.as_ref().map(|prior| prior.stat(self))
    }

    fn step(&self) -> f64 {
        if self.error > 0.0 {
            self.error
        } else {
            self.value.abs()
        }
    }

    /// Confidence interval lower limit
    ///
    /// The explicit minimum when set, otherwise `value - step * n_sigma`, pushed
    /// out to at least `1e5` large steps below zero.
    pub fn conf_min(&self) -> f64 {
        if !self.min.is_nan() {
            return self.min;
        }
        let min = self.value - self.step() * self.scan_n_sigma as f64;
        let large_step = self.step().max(self.value.abs());
        min.min(-large_step * 1e5)
    }

    /// Confidence interval upper limit
    pub fn conf_max(&self) -> f64 {
        if !self.max.is_nan() {
            return self.max;
        }
        let max = self.value + self.step() * self.scan_n_sigma as f64;
        let large_step = self.step().max(self.value.abs());
        max.max(large_step * 1e5)
    }

    /// Stat scan minimum
    pub fn scan_min(&self) -> f64 {
        self.scan_min
            .unwrap_or_else(|| self.value - self.step() * self.scan_n_sigma as f64)
    }

    pub fn set_scan_min(&mut self, scan_min: Option<f64>) {
        self.scan_min = scan_min;
    }

    /// Stat scan maximum
    pub fn scan_max(&self) -> f64 {
        self.scan_max
            .unwrap_or_else(|| self.value + self.step() * self.scan_n_sigma as f64)
    }

    pub fn set_scan_max(&mut self, scan_max: Option<f64>) {
        self.scan_max = scan_max;
    }

    pub fn scan_n_values(&self) -> usize {
        self.scan_n_values
    }

    pub fn set_scan_n_values(&mut self, n_values: usize) {
        self.scan_n_values = n_values;
    }

    pub fn scan_n_sigma(&self) -> u32 {
        self.scan_n_sigma
    }

    pub fn set_scan_n_sigma(&mut self, n_sigma: u32) {
        self.scan_n_sigma = n_sigma;
    }

    /// Stat scan values
    ///
    /// Explicit values when set, otherwise `scan_n_values` points evenly spaced
    /// between `scan_min` and `scan_max` in the `interp` scale.
    pub fn scan_values(&self) -> Vec<f64> {
        match &self.scan_values {
            Some(values) => values.clone(),
            None => scale_linspace(
                self.interp,
                self.scan_min(),
                self.scan_max(),
                self.scan_n_values,
            ),
        }
    }

    pub fn set_scan_values(&mut self, values: Option<Vec<f64>>) {
        self.scan_values = values;
    }

    /// Warn if a free parameter's value lies outside its bounds
    ///
    /// Returns whether a warning was emitted. NaN bounds never trigger.
    pub fn check_limits(&self) -> bool {
        if self.frozen {
            return false;
        }
        let below = !self.min.is_nan() && self.value < self.min;
        let above = !self.max.is_nan() && self.value > self.max;
        if below || above {
            warn!(
                "Value {} is outside bounds [{}, {}] for parameter '{}'",
                self.value, self.min, self.max, self.name
            );
        }
        below || above
    }

    /// Transform a physical value into a factor using the current scale
    pub fn transform(&self, value: f64) -> f64 {
        self.scale_transform.apply(value) / self.scale
    }

    /// Transform a physical value into a factor, first updating the scale
    /// according to the scale method
    pub fn transform_with_scale_update(&mut self, value: f64) -> f64 {
        let transformed = self.scale_transform.apply(value);
        self.update_scale(transformed);
        transformed / self.scale
    }

    /// Recompute the scale from an already transformed value
    pub fn update_scale(&mut self, transformed: f64) {
        if let Some(method) = self.scale_method {
            self.scale = method.update_scale(transformed, self.scale);
        }
    }

    /// Map a factor back into a physical value
    pub fn inverse_transform(&self, factor: f64) -> f64 {
        self.scale_transform.inverse(self.scale * factor)
    }

    /// Derivative of the physical value with respect to the factor
    pub fn inverse_transform_derivative(&self, factor: f64) -> f64 {
        self.scale_transform.inverse_derivative(self.scale * factor) * self.scale
    }

    /// Choose a scale for the current value and store the matching factor
    ///
    /// The value is authoritative here and is not recomputed from the factor.
    pub fn autoscale(&mut self) {
        self.factor = self.transform_with_scale_update(self.value);
    }

    /// Reset to the identity decomposition `factor = value`, `scale = 1`
    pub fn reset_autoscale(&mut self) {
        self.factor = self.value;
        self.scale = 1.0;
    }

    /// Serializable representation
    pub fn to_dict(&self) -> ParameterDict {
        ParameterDict {
            name: self.name.clone(),
            value: self.value,
            unit: self.unit.to_fits_string(),
            error: self.error,
            min: self.min,
            max: self.max,
            frozen: self.frozen,
            interp: self.interp,
            scale_method: self.scale_method,
            scale_transform: self.scale_transform,
            link: self.link_label.clone(),
            prior: self.prior.clone(),
        }
    }

    /// Build a parameter from its serialized representation
    pub fn from_dict(data: &ParameterDict) -> Result<Self, ParameterError> {
        let mut param = Parameter::builder(&data.name, data.value)
            .unit(&data.unit)
            .min(data.min)
            .max(data.max)
            .error(data.error)
            .frozen(data.frozen)
            .interp(data.interp)
            .scale_method(data.scale_method)
            .scale_transform(data.scale_transform)
            .prior(data.prior.clone())
            .build()?;
        param.link_label = data.link.clone();
        Ok(param)
    }

    /// Update value, unit, bounds, frozen flag and prior from a serialized representation
    pub fn update_from_dict(&mut self, data: &ParameterDict) -> Result<(), ParameterError> {
        let unit = Unit::parse(&data.unit).map_err(|e| self.quantity_error(e))?;
        self.set_value(data.value);
        self.unit = unit;
        self.set_min(data.min)?;
        self.set_max(data.max)?;
        self.frozen = data.frozen;
        self.prior = data.prior.clone();
        Ok(())
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.link_label.as_deref().unwrap_or(&self.name);
        let (value, error) = if self.name == "amplitude" {
            (format!("{:10.2e}", self.value), format!("{:7.1e}", self.error))
        } else {
            (format!("{:10.3}", self.value), format!("{:7.2}", self.error))
        };

        if self.frozen {
            write!(f, "{:21} {:8}: {}  {:<12}", name, "(frozen)", value, self.unit)
        } else {
            write!(f, "{:21} {:8}: {} +/- {} {:<12}", name, "", value, error, self.unit)
        }
    }
}

/// Builder for parameters with non-default settings
///
/// # Examples
///
/// ```
/// use gammafit_rs::parameters::{InterpScale, Parameter};
///
/// let amplitude = Parameter::builder("amplitude", 1e-12)
///     .unit("cm-2 s-1 TeV-1")
///     .min(0.0)
///     .interp(InterpScale::Log)
///     .build()
///     .unwrap();
/// assert_eq!(amplitude.unit().to_string(), "cm-2 s-1 TeV-1");
///
/// let reference = Parameter::builder("reference", "1 TeV").frozen(true).build().unwrap();
/// assert_eq!(reference.value(), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct ParameterBuilder {
    name: String,
    value: ValueInput,
    unit: String,
    scale: f64,
    min: ValueInput,
    max: ValueInput,
    frozen: bool,
    error: ValueInput,
    scan_min: Option<f64>,
    scan_max: Option<f64>,
    scan_n_values: usize,
    scan_n_sigma: u32,
    scan_values: Option<Vec<f64>>,
    interp: InterpScale,
    scale_method: Option<ScaleMethod>,
    scale_transform: InterpScale,
    prior: Option<Prior>,
}

impl ParameterBuilder {
    pub fn new(name: &str, value: impl Into<ValueInput>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            unit: String::new(),
            scale: 1.0,
            min: ValueInput::Missing,
            max: ValueInput::Missing,
            frozen: false,
            error: ValueInput::Float(0.0),
            scan_min: None,
            scan_max: None,
            scan_n_values: 11,
            scan_n_sigma: 2,
            scan_values: None,
            interp: InterpScale::Lin,
            scale_method: Some(ScaleMethod::Scale10),
            scale_transform: InterpScale::Lin,
            prior: None,
        }
    }

    /// Unit of a plain float value; ignored when the value is a quantity
    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn min(mut self, min: impl Into<ValueInput>) -> Self {
        self.min = min.into();
        self
    }

    pub fn max(mut self, max: impl Into<ValueInput>) -> Self {
        self.max = max.into();
        self
    }

    pub fn frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn error(mut self, error: impl Into<ValueInput>) -> Self {
        self.error = error.into();
        self
    }

    pub fn scan_min(mut self, scan_min: f64) -> Self {
        self.scan_min = Some(scan_min);
        self
    }

    pub fn scan_max(mut self, scan_max: f64) -> Self {
        self.scan_max = Some(scan_max);
        self
    }

    pub fn scan_n_values(mut self, n_values: usize) -> Self {
        self.scan_n_values = n_values;
        self
    }

    pub fn scan_n_sigma(mut self, n_sigma: u32) -> Self {
        self.scan_n_sigma = n_sigma;
        self
    }

    pub fn scan_values(mut self, values: Vec<f64>) -> Self {
        self.scan_values = Some(values);
        self
    }

    pub fn interp(mut self, interp: InterpScale) -> Self {
        self.interp = interp;
        self
    }

    pub fn scale_method(mut self, method: Option<ScaleMethod>) -> Self {
        self.scale_method = method;
        self
    }

    pub fn scale_transform(mut self, transform: InterpScale) -> Self {
        self.scale_transform = transform;
        self
    }

    pub fn prior(mut self, prior: Option<Prior>) -> Self {
        self.prior = prior;
        self
    }

    pub fn build(self) -> Result<Parameter, ParameterError> {
        let invalid = |message: String| ParameterError::InvalidQuantity {
            name: self.name.clone(),
            message,
        };

        let (value, unit) = match &self.value {
            ValueInput::Float(value) => (
                *value,
                Unit::parse(&self.unit).map_err(|e| invalid(e.to_string()))?,
            ),
            ValueInput::Quantity(q) => (q.value, q.unit.clone()),
            ValueInput::Text(text) => {
                let q = Quantity::parse(text).map_err(|e| invalid(e.to_string()))?;
                (q.value, q.unit)
            }
            ValueInput::Missing => return Err(invalid("value is required".to_string())),
        };

        let mut param = Parameter::new(&self.name, 0.0);
        param.scale_method = self.scale_method;
        param.scale_transform = self.scale_transform;
        param.interp = self.interp;
        param.scale = self.scale;
        param.frozen = self.frozen;
        param.set_value(value);
        param.unit = unit;
        param.set_min(self.min)?;
        param.set_max(self.max)?;
        param.set_error(self.error)?;
        param.scan_min = self.scan_min;
        param.scan_max = self.scan_max;
        param.scan_values = self.scan_values;
        param.scan_n_values = self.scan_n_values;
        param.scan_n_sigma = self.scan_n_sigma;
        param.prior = self.prior;
        Ok(param)
    }
}

fn nan() -> f64 {
    f64::NAN
}

fn default_scale_method() -> Option<ScaleMethod> {
    Some(ScaleMethod::Scale10)
}

/// NaN bounds are stored as `null`, since JSON has no NaN
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Serialized form of a parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDict {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub error: f64,
    #[serde(default = "nan", with = "nan_as_null")]
    pub min: f64,
    #[serde(default = "nan", with = "nan_as_null")]
    pub max: f64,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub interp: InterpScale,
    #[serde(default = "default_scale_method")]
    pub scale_method: Option<ScaleMethod>,
    #[serde(default)]
    pub scale_transform: InterpScale,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<Prior>,
}
