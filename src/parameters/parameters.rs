//! Parameters collection implementation
//!
//! This module provides the Parameters struct, an ordered collection of shared
//! parameter references. The same parameter may occupy several slots of a
//! collection (a linked parameter); identity, not value, decides whether two
//! slots are the same parameter.

use log::{debug, warn};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::ops::{Add, Index};
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

use crate::parameters::parameter::{Parameter, ParameterDict, ParameterError};
use crate::parameters::prior::Prior;

/// Shared handle to a parameter
///
/// Cloning the handle shares the parameter; cloning the parameter behind it
/// produces an independent copy.
pub type ParameterRef = Rc<RefCell<Parameter>>;

/// Wrap a parameter into a new shared handle
pub fn shared(param: Parameter) -> ParameterRef {
    Rc::new(RefCell::new(param))
}

/// Ways of addressing a slot of a [`Parameters`] collection
#[derive(Debug, Clone, Copy)]
pub enum ParameterKey<'a> {
    /// Position, passed through after a range check
    Index(usize),
    /// First slot whose parameter has this name
    Name(&'a str),
    /// First slot holding this very parameter
    Ref(&'a ParameterRef),
}

impl From<usize> for ParameterKey<'_> {
    fn from(index: usize) -> Self {
        ParameterKey::Index(index)
    }
}

impl<'a> From<&'a str> for ParameterKey<'a> {
    fn from(name: &'a str) -> Self {
        ParameterKey::Name(name)
    }
}

impl<'a> From<&'a ParameterRef> for ParameterKey<'a> {
    fn from(param: &'a ParameterRef) -> Self {
        ParameterKey::Ref(param)
    }
}

/// An ordered, possibly aliased collection of parameters
///
/// `Clone` copies the slot list and keeps sharing the parameters; use
/// [`Parameters::deep_copy`] for independent parameters.
///
/// # Examples
///
/// ```
/// use gammafit_rs::parameters::{shared, Parameter, Parameters};
///
/// let index = shared(Parameter::new("index", 2.0));
/// let params = Parameters::new(vec![
///     index.clone(),
///     shared(Parameter::new("amplitude", 1e-12)),
///     index.clone(),
/// ]);
///
/// assert_eq!(params.len(), 3);
/// assert_eq!(params.unique_parameters().len(), 2);
///
/// index.borrow_mut().set_value(2.5);
/// assert_eq!(params.values(), vec![2.5, 1e-12, 2.5]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    params: Vec<ParameterRef>,
}

impl Parameters {
    pub fn new(params: Vec<ParameterRef>) -> Self {
        Self { params }
    }

    /// Build a collection owning freshly shared copies of `params`
    pub fn from_parameters(params: Vec<Parameter>) -> Self {
        Self {
            params: params.into_iter().map(shared).collect(),
        }
    }

    /// Concatenate several collections, keeping shared references shared
    pub fn from_stack(stack: &[Parameters]) -> Self {
        Self {
            params: stack
                .iter()
                .flat_map(|p| p.params.iter().cloned())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParameterRef> {
        self.params.iter()
    }

    pub fn push(&mut self, param: ParameterRef) {
        self.params.push(param);
    }

    /// Resolve a key to a slot position
    ///
    /// # Examples
    ///
    /// ```
    /// use gammafit_rs::parameters::{Parameter, Parameters};
    ///
    /// let params = Parameters::from_parameters(vec![
    ///     Parameter::new("index", 2.0),
    ///     Parameter::new("amplitude", 1e-12),
    /// ]);
    /// assert_eq!(params.index("amplitude").unwrap(), 1);
    /// assert_eq!(params.index(0usize).unwrap(), 0);
    /// assert!(params.index("lambda_").is_err());
    /// ```
    pub fn index<'a>(&self, key: impl Into<ParameterKey<'a>>) -> Result<usize, ParameterError> {
        match key.into() {
            ParameterKey::Index(index) => {
                if index < self.params.len() {
                    Ok(index)
                } else {
                    Err(ParameterError::IndexOutOfRange {
                        index,
                        len: self.params.len(),
                    })
                }
            }
            ParameterKey::Name(name) => self
                .params
                .iter()
                .position(|p| p.borrow().name() == name)
                .ok_or_else(|| ParameterError::NotFound {
                    name: name.to_string(),
                }),
            ParameterKey::Ref(param) => self
                .params
                .iter()
                .position(|p| Rc::ptr_eq(p, param))
                .ok_or_else(|| ParameterError::NotFound {
                    name: param.borrow().name().to_string(),
                }),
        }
    }

    /// Shared handle to the parameter at `key`
    pub fn get<'a>(&self, key: impl Into<ParameterKey<'a>>) -> Result<ParameterRef, ParameterError> {
        let index = self.index(key)?;
        Ok(self.params[index].clone())
    }

    /// Sub-collection of the slots where `mask` is true, duplicates preserved
    pub fn mask(&self, mask: &[bool]) -> Result<Parameters, ParameterError> {
        self.check_length("mask", mask.len())?;
        Ok(Self {
            params: self
                .params
                .iter()
                .zip(mask)
                .filter(|&(_, &keep)| keep)
                .map(|(p, _)| p.clone())
                .collect(),
        })
    }

    fn check_length(&self, what: &str, got: usize) -> Result<(), ParameterError> {
        if got != self.params.len() {
            return Err(ParameterError::LengthMismatch {
                what: what.to_string(),
                expected: self.params.len(),
                got,
            });
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.params
            .iter()
            .map(|p| p.borrow().name().to_string())
            .collect()
    }

    /// Component type of each slot
    pub fn types(&self) -> Vec<Option<String>> {
        self.params
            .iter()
            .map(|p| p.borrow().component_type().map(str::to_string))
            .collect()
    }

    pub fn priors(&self) -> Vec<Option<Prior>> {
        self.params
            .iter()
            .map(|p| p.borrow().prior().cloned())
            .collect()
    }

    /// Parameter values in slot order
    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.borrow().value()).collect()
    }

    pub fn set_values(&self, values: &[f64]) -> Result<(), ParameterError> {
        self.check_length("values", values.len())?;
        for (param, &value) in self.params.iter().zip(values) {
            param.borrow_mut().set_value(value);
        }
        Ok(())
    }

    pub fn min_values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.borrow().min()).collect()
    }

    pub fn set_min_values(&self, values: &[f64]) -> Result<(), ParameterError> {
        self.check_length("min values", values.len())?;
        for (param, &value) in self.params.iter().zip(values) {
            param.borrow_mut().set_min(value)?;
        }
        Ok(())
    }

    pub fn max_values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.borrow().max()).collect()
    }

    pub fn set_max_values(&self, values: &[f64]) -> Result<(), ParameterError> {
        self.check_length("max values", values.len())?;
        for (param, &value) in self.params.iter().zip(values) {
            param.borrow_mut().set_max(value)?;
        }
        Ok(())
    }

    pub fn errors(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.borrow().error()).collect()
    }

    /// Slots whose parameter is not frozen, duplicates preserved
    pub fn free_parameters(&self) -> Parameters {
        self.params
            .iter()
            .filter(|p| !p.borrow().frozen())
            .cloned()
            .collect()
    }

    /// One slot per distinct parameter, in first-seen order
    pub fn unique_parameters(&self) -> Parameters {
        let mut unique: Vec<ParameterRef> = Vec::new();
        for param in &self.params {
            if !unique.iter().any(|u| Rc::ptr_eq(u, param)) {
                unique.push(param.clone());
            }
        }
        Self { params: unique }
    }

    pub fn free_unique_parameters(&self) -> Parameters {
        self.unique_parameters().free_parameters()
    }

    /// Label every parameter occupying more than one slot
    ///
    /// Labels have the form `"{name}@{suffix}"` and are regenerated on each call.
    pub fn update_link_label(&self) {
        let mut seen: Vec<&ParameterRef> = Vec::new();
        let mut linked: Vec<&ParameterRef> = Vec::new();
        for param in &self.params {
            if !seen.iter().any(|p| Rc::ptr_eq(*p, param)) {
                seen.push(param);
            } else if !linked.iter().any(|p| Rc::ptr_eq(*p, param)) {
                linked.push(param);
            }
        }

        for param in linked {
            let mut param = param.borrow_mut();
            let label = format!("{}@{:08x}", param.name(), rand::random::<u32>());
            debug!("Linking parameter '{}' as '{}'", param.name(), label);
            param.set_link_label(Some(label));
        }
    }

    /// Filter slots; every provided filter must match
    ///
    /// `names` matches any of the listed names.
    pub fn select(
        &self,
        names: Option<&[&str]>,
        component_type: Option<&str>,
        frozen: Option<bool>,
    ) -> Parameters {
        self.params
            .iter()
            .filter(|p| {
                let p = p.borrow();
                names.map_or(true, |names| names.contains(&p.name()))
                    && component_type.map_or(true, |t| p.component_type() == Some(t))
                    && frozen.map_or(true, |f| p.frozen() == f)
            })
            .cloned()
            .collect()
    }

    /// Snapshot value and frozen state, restored when the returned guard drops
    ///
    /// # Examples
    ///
    /// ```
    /// use gammafit_rs::parameters::{Parameter, Parameters};
    ///
    /// let params = Parameters::from_parameters(vec![Parameter::new("index", 2.0)]);
    /// {
    ///     let _guard = params.restore_status(true);
    ///     params[0].borrow_mut().set_value(3.0);
    ///     params[0].borrow_mut().set_frozen(true);
    /// }
    /// assert_eq!(params[0].borrow().value(), 2.0);
    /// assert!(!params[0].borrow().frozen());
    /// ```
    pub fn restore_status(&self, restore_values: bool) -> RestoreStatus {
        RestoreStatus {
            snapshot: self
                .params
                .iter()
                .map(|p| {
                    let param = p.borrow();
                    (p.clone(), param.name().to_string(), param.value(), param.frozen())
                })
                .collect(),
            restore_values,
        }
    }

    /// Run `f` with the status restored afterwards, whatever `f` returns
    pub fn with_restore_status<T, F>(&self, restore_values: bool, f: F) -> T
    where
        F: FnOnce(&Parameters) -> T,
    {
        let _guard = self.restore_status(restore_values);
        f(self)
    }

    pub fn freeze_all(&self) {
        for param in &self.params {
            param.borrow_mut().set_frozen(true);
        }
    }

    pub fn unfreeze_all(&self) {
        for param in &self.params {
            param.borrow_mut().set_frozen(false);
        }
    }

    /// Autoscale every distinct parameter once
    pub fn autoscale(&self) {
        for param in &self.unique_parameters().params {
            param.borrow_mut().autoscale();
        }
    }

    /// Warn for every distinct free parameter outside its bounds
    ///
    /// Returns the number of warnings emitted.
    pub fn check_limits(&self) -> usize {
        self.unique_parameters()
            .params
            .iter()
            .filter(|p| p.borrow().check_limits())
            .count()
    }

    /// Sum of the prior penalties of all slots; 0 without priors
    pub fn prior_stat_sum(&self) -> f64 {
        self.params
            .iter()
            .filter_map(|p| p.borrow().prior_stat_sum())
            .sum()
    }

    /// Optimizer view: factors of the free unique parameters
    pub fn factors(&self) -> Vec<f64> {
        self.free_unique_parameters()
            .params
            .iter()
            .map(|p| p.borrow().factor())
            .collect()
    }

    pub fn factor_min(&self) -> Vec<f64> {
        self.free_unique_parameters()
            .params
            .iter()
            .map(|p| p.borrow().factor_min())
            .collect()
    }

    pub fn factor_max(&self) -> Vec<f64> {
        self.free_unique_parameters()
            .params
            .iter()
            .map(|p| p.borrow().factor_max())
            .collect()
    }

    /// Write optimizer factors back into the free unique parameters
    ///
    /// # Arguments
    ///
    /// * `factors` - One factor per free unique parameter, in first-seen order
    pub fn set_parameter_factors(&self, factors: &[f64]) -> Result<(), ParameterError> {
        let free = self.free_unique_parameters();
        if factors.len() != free.len() {
            return Err(ParameterError::LengthMismatch {
                what: "factors".to_string(),
                expected: free.len(),
                got: factors.len(),
            });
        }
        for (param, &factor) in free.params.iter().zip(factors) {
            param.borrow_mut().set_factor(factor);
        }
        Ok(())
    }

    /// Independent copy; parameters shared within this collection stay shared
    /// with each other but not with the source
    pub fn deep_copy(&self) -> Parameters {
        let mut copies: Vec<(ParameterRef, ParameterRef)> = Vec::new();
        let mut params = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let copy = match copies.iter().find(|(orig, _)| Rc::ptr_eq(orig, param)) {
                Some((_, copy)) => copy.clone(),
                None => {
                    let copy = shared(param.borrow().clone());
                    copies.push((param.clone(), copy.clone()));
                    copy
                }
            };
            params.push(copy);
        }
        Self { params }
    }

    /// Serializable rows, one per slot, with link labels refreshed first
    pub fn to_dict(&self) -> Vec<ParameterDict> {
        self.update_link_label();
        self.params.iter().map(|p| p.borrow().to_dict()).collect()
    }

    /// Rebuild a collection; rows sharing a link label become one shared parameter
    pub fn from_dict(data: &[ParameterDict]) -> Result<Parameters, ParameterError> {
        let mut links: HashMap<String, ParameterRef> = HashMap::new();
        let mut params = Vec::with_capacity(data.len());
        for row in data {
            let param = match row.link.as_ref().and_then(|label| links.get(label)) {
                Some(linked) => linked.clone(),
                None => {
                    let param = shared(Parameter::from_dict(row)?);
                    if let Some(label) = &row.link {
                        links.insert(label.clone(), param.clone());
                    }
                    param
                }
            };
            params.push(param);
        }
        Ok(Self { params })
    }

    /// Tabular view with one row per slot
    pub fn to_table(&self) -> Vec<ParameterRow> {
        self.update_link_label();
        self.params
            .iter()
            .map(|p| {
                let p = p.borrow();
                ParameterRow {
                    component_type: p.component_type().unwrap_or("").to_string(),
                    name: p.name().to_string(),
                    value: p.value(),
                    unit: p.unit().to_fits_string(),
                    error: p.error(),
                    min: p.min(),
                    max: p.max(),
                    frozen: p.frozen(),
                    link: p.link_label().unwrap_or("").to_string(),
                    prior: p.prior().map(|pr| pr.type_name()).unwrap_or("").to_string(),
                }
            })
            .collect()
    }
}

/// Row of [`Parameters::to_table`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRow {
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub error: f64,
    pub min: f64,
    pub max: f64,
    pub frozen: bool,
    pub link: String,
    pub prior: String,
}

/// Guard returned by [`Parameters::restore_status`]
///
/// Restores the snapshot on drop, including during unwinding or early `?` returns.
#[must_use = "the status is restored as soon as the guard is dropped"]
pub struct RestoreStatus {
    snapshot: Vec<(ParameterRef, String, f64, bool)>,
    restore_values: bool,
}

impl Drop for RestoreStatus {
    fn drop(&mut self) {
        for (param, name, value, frozen) in &self.snapshot {
            // A parameter still borrowed here cannot be written without panicking in drop
            match param.try_borrow_mut() {
                Ok(mut param) => {
                    if self.restore_values {
                        param.set_value(*value);
                    }
                    param.set_frozen(*frozen);
                }
                Err(_) => warn!(
                    "Parameter {} is still borrowed, its status was not restored \
                     (value = {}, frozen = {})",
                    name, value, frozen
                ),
            }
        }
    }
}

impl PartialEq for Parameters {
    /// Same length and the very same parameter in every slot
    fn eq(&self, other: &Self) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| Rc::ptr_eq(a, b))
    }
}

impl Index<usize> for Parameters {
    type Output = ParameterRef;

    fn index(&self, index: usize) -> &ParameterRef {
        &self.params[index]
    }
}

impl FromIterator<ParameterRef> for Parameters {
    fn from_iter<I: IntoIterator<Item = ParameterRef>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a ParameterRef;
    type IntoIter = std::slice::Iter<'a, ParameterRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

impl Add for Parameters {
    type Output = Parameters;

    fn add(mut self, other: Parameters) -> Parameters {
        self.params.extend(other.params);
        self
    }
}

impl Add for &Parameters {
    type Output = Parameters;

    fn add(self, other: &Parameters) -> Parameters {
        Parameters::from_stack(&[self.clone(), other.clone()])
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parameters")?;
        writeln!(f)?;
        for param in &self.params {
            writeln!(f, "    {}", param.borrow())?;
        }
        Ok(())
    }
}

/// Errors that can occur when saving or loading parameters
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Parameter error: {0}")]
    ParameterError(#[from] ParameterError),
}

impl Parameters {
    /// Save parameters to a JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), SerializationError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &self.to_dict())?;
        Ok(())
    }

    /// Save parameters to a JSON string
    ///
    /// # Examples
    ///
    /// ```
    /// use gammafit_rs::parameters::{Parameter, Parameters};
    ///
    /// let params = Parameters::from_parameters(vec![Parameter::new("index", 2.0)]);
    /// let json = params.to_json().unwrap();
    /// let loaded = Parameters::from_json(&json).unwrap();
    /// assert_eq!(loaded.values(), vec![2.0]);
    /// ```
    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string_pretty(&self.to_dict())?)
    }

    /// Load parameters from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, SerializationError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }

    /// Load parameters from a JSON string
    pub fn from_json(json: &str) -> Result<Self, SerializationError> {
        let rows: Vec<ParameterDict> = serde_json::from_str(json)?;
        Ok(Self::from_dict(&rows)?)
    }
}
