//! Value/factor transforms
//!
//! This module provides the interpolation scales used to map a physical parameter
//! value into the space the optimizer works in, and the scaling policies that keep
//! the optimizer-facing factor well conditioned.
//!
//! A parameter's optimizer state is `factor = transform(value) / scale`, and its
//! physical state is recovered with `value = inverse(scale * factor)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::parameters::parameter::ParameterError;

/// Interpolation scale used for the value transform and for scan spacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpScale {
    /// Identity mapping
    #[default]
    Lin,
    /// Natural logarithm, inverse is the exponential
    Log,
    /// Sign-preserving square root, inverse squares preserving sign
    Sqrt,
}

impl InterpScale {
    /// Map a physical value into the transformed space
    ///
    /// # Examples
    ///
    /// ```
    /// use gammafit_rs::parameters::InterpScale;
    ///
    /// assert_eq!(InterpScale::Lin.apply(4.0), 4.0);
    /// assert_eq!(InterpScale::Sqrt.apply(-4.0), -2.0);
    /// assert!((InterpScale::Log.apply(1.0)).abs() < 1e-15);
    /// ```
    pub fn apply(self, value: f64) -> f64 {
        match self {
            InterpScale::Lin => value,
            InterpScale::Log => value.ln(),
            InterpScale::Sqrt => value.signum() * value.abs().sqrt(),
        }
    }

    /// Map a transformed value back into physical space
    pub fn inverse(self, value: f64) -> f64 {
        match self {
            InterpScale::Lin => value,
            InterpScale::Log => value.exp(),
            InterpScale::Sqrt => value.signum() * value * value,
        }
    }

    /// Derivative of [`InterpScale::inverse`] with respect to its argument
    pub fn inverse_derivative(self, value: f64) -> f64 {
        match self {
            InterpScale::Lin => 1.0,
            InterpScale::Log => value.exp(),
            InterpScale::Sqrt => 2.0 * value.abs(),
        }
    }

    /// The serialized tag of this scale
    pub fn as_str(self) -> &'static str {
        match self {
            InterpScale::Lin => "lin",
            InterpScale::Log => "log",
            InterpScale::Sqrt => "sqrt",
        }
    }
}

impl fmt::Display for InterpScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpScale {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lin" => Ok(InterpScale::Lin),
            "log" => Ok(InterpScale::Log),
            "sqrt" => Ok(InterpScale::Sqrt),
            other => Err(ParameterError::InvalidTransform {
                value: other.to_string(),
            }),
        }
    }
}

/// Policy used by autoscaling to choose a parameter's scale
///
/// A parameter without a scale method (`Option::None`) never rescales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMethod {
    /// Scale is the power of ten below the transformed value, so `|factor|` lies in `[1, 10)`
    Scale10,
    /// Scale is the transformed value itself, so the factor becomes 1
    Factor1,
}

impl ScaleMethod {
    /// Compute the new scale for an already transformed value
    ///
    /// `Scale10` leaves the current scale untouched when the value is exactly zero,
    /// since its decade is undefined.
    pub fn update_scale(self, transformed: f64, current: f64) -> f64 {
        match self {
            ScaleMethod::Scale10 => {
                if transformed != 0.0 {
                    10f64.powf(transformed.abs().log10().floor())
                } else {
                    current
                }
            }
            ScaleMethod::Factor1 => transformed,
        }
    }

    /// The serialized tag of this method
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleMethod::Scale10 => "scale10",
            ScaleMethod::Factor1 => "factor1",
        }
    }
}

impl fmt::Display for ScaleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScaleMethod {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scale10" => Ok(ScaleMethod::Scale10),
            "factor1" => Ok(ScaleMethod::Factor1),
            other => Err(ParameterError::InvalidScaleMethod {
                value: other.to_string(),
            }),
        }
    }
}

/// Evenly spaced samples between `start` and `stop` in the given interpolation scale
pub fn scale_linspace(scale: InterpScale, start: f64, stop: f64, n: usize) -> Vec<f64> {
    let (lo, hi) = (scale.apply(start), scale.apply(stop));
    match n {
        0 => Vec::new(),
        1 => vec![scale.inverse(lo)],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n)
                .map(|i| scale.inverse(lo + step * i as f64))
                .collect()
        }
    }
}
