//! Named parameter slots of a model component
//!
//! A model component declares its parameters as an ordered list of named
//! slots. Declaring or linking a slot checks that the parameter's own name
//! matches the slot name.

use crate::parameters::parameter::{Parameter, ParameterError};
use crate::parameters::parameters::{shared, ParameterRef, Parameters};

/// Ordered name to parameter mapping for one model component
///
/// # Examples
///
/// ```
/// use gammafit_rs::parameters::{ModelParameters, Parameter};
///
/// let mut spectral = ModelParameters::new("spectral");
/// spectral.declare(Parameter::new("index", 2.0)).unwrap();
/// spectral.declare(Parameter::new("amplitude", 1e-12)).unwrap();
///
/// let mut other = ModelParameters::new("spectral");
/// other.declare(Parameter::new("index", 3.0)).unwrap();
/// other.declare(Parameter::new("amplitude", 3e-12)).unwrap();
/// other.link("index", &spectral.get("index").unwrap()).unwrap();
///
/// spectral.get("index").unwrap().borrow_mut().set_value(2.7);
/// assert_eq!(other.get("index").unwrap().borrow().value(), 2.7);
/// ```
#[derive(Debug, Clone)]
pub struct ModelParameters {
    component_type: String,
    slots: Vec<(String, ParameterRef)>,
}

impl ModelParameters {
    pub fn new(component_type: &str) -> Self {
        Self {
            component_type: component_type.to_string(),
            slots: Vec::new(),
        }
    }

    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    /// Add a new slot named after the parameter and return its shared handle
    pub fn declare(&mut self, mut param: Parameter) -> Result<ParameterRef, ParameterError> {
        let name = param.name().to_string();
        if self.slots.iter().any(|(slot, _)| *slot == name) {
            return Err(ParameterError::DuplicateSlot { name });
        }
        param.set_component_type(Some(&self.component_type));
        let param = shared(param);
        self.slots.push((name, param.clone()));
        Ok(param)
    }

    /// Shared handle to the parameter in slot `name`
    pub fn get(&self, name: &str) -> Result<ParameterRef, ParameterError> {
        self.slots
            .iter()
            .find(|(slot, _)| slot == name)
            .map(|(_, param)| param.clone())
            .ok_or_else(|| ParameterError::NotFound {
                name: name.to_string(),
            })
    }

    /// Replace slot `name` with a shared parameter
    ///
    /// The slot must exist and the shared parameter must carry the same name.
    pub fn link(&mut self, name: &str, param: &ParameterRef) -> Result<(), ParameterError> {
        let got = param.borrow().name().to_string();
        if got != name {
            return Err(ParameterError::NameMismatch {
                expected: name.to_string(),
                got,
            });
        }

        let slot = self
            .slots
            .iter_mut()
            .find(|(slot, _)| slot == name)
            .ok_or_else(|| ParameterError::NotFound {
                name: name.to_string(),
            })?;
        slot.1 = param.clone();
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// All slots as a parameter collection, in declaration order
    pub fn parameters(&self) -> Parameters {
        self.slots.iter().map(|(_, param)| param.clone()).collect()
    }
}
