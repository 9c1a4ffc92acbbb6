//! Parameter priors
//!
//! A prior contributes a penalty term to the fit statistic based on the current
//! value of the parameter it is attached to.

use serde::{Deserialize, Serialize};

use crate::parameters::parameter::Parameter;

fn default_weight() -> f64 {
    1.0
}

/// A prior on a single parameter
///
/// Serialized as a dictionary tagged by `type`, e.g.
/// `{"type": "GaussianPrior", "mu": 2.0, "sigma": 0.1, "weight": 1.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Prior {
    /// Gaussian penalty `((value - mu) / sigma)^2`
    #[serde(rename = "GaussianPrior")]
    Gaussian {
        mu: f64,
        sigma: f64,
        #[serde(default = "default_weight")]
        weight: f64,
    },

    /// Flat prior: no penalty inside `[min, max]`, unit penalty outside
    #[serde(rename = "UniformPrior")]
    Uniform {
        min: f64,
        max: f64,
        #[serde(default = "default_weight")]
        weight: f64,
    },
}

impl Prior {
    pub fn gaussian(mu: f64, sigma: f64) -> Self {
        Prior::Gaussian {
            mu,
            sigma,
            weight: 1.0,
        }
    }

    pub fn uniform(min: f64, max: f64) -> Self {
        Prior::Uniform {
            min,
            max,
            weight: 1.0,
        }
    }

    /// Return the same prior with a different weight
    pub fn with_weight(mut self, new_weight: f64) -> Self {
        match &mut self {
            Prior::Gaussian { weight, .. } | Prior::Uniform { weight, .. } => *weight = new_weight,
        }
        self
    }

    pub fn weight(&self) -> f64 {
        match self {
            Prior::Gaussian { weight, .. } | Prior::Uniform { weight, .. } => *weight,
        }
    }

    /// The serialized type tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Prior::Gaussian { .. } => "GaussianPrior",
            Prior::Uniform { .. } => "UniformPrior",
        }
    }

    /// Unweighted prior penalty at `value`
    pub fn evaluate(&self, value: f64) -> f64 {
        match self {
            Prior::Gaussian { mu, sigma, .. } => ((value - mu) / sigma).powi(2),
            Prior::Uniform { min, max, .. } => {
                if value < *min || value > *max {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Weighted penalty for the parameter's current value
    pub fn stat(&self, parameter: &Parameter) -> f64 {
        self.weight() * self.evaluate(parameter.value())
    }
}
