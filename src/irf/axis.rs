//! Binned axes for IRF matrices

use serde::{Deserialize, Serialize};

use crate::irf::EDispError;
use crate::parameters::{scale_linspace, InterpScale};

/// A binned axis defined by its edges
///
/// Energies are in TeV; migration axes are dimensionless. Bin centers and pixel
/// coordinates are computed in the axis' interpolation scale, so a log energy
/// axis has geometric bin centers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyAxis {
    edges: Vec<f64>,
    interp: InterpScale,
}

impl EnergyAxis {
    /// Create an axis from strictly increasing edges
    pub fn from_edges(edges: Vec<f64>, interp: InterpScale) -> Result<Self, EDispError> {
        if edges.len() < 2 {
            return Err(EDispError::InvalidAxis {
                message: format!("need at least two edges, got {}", edges.len()),
            });
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(EDispError::InvalidAxis {
                message: "edges must be finite".to_string(),
            });
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EDispError::InvalidAxis {
                message: "edges must be strictly increasing".to_string(),
            });
        }
        if interp == InterpScale::Log && edges[0] <= 0.0 {
            return Err(EDispError::InvalidAxis {
                message: "log axis edges must be positive".to_string(),
            });
        }
        Ok(Self { edges, interp })
    }

    /// Axis from edges already known to be valid
    pub(crate) fn new_unchecked(edges: Vec<f64>, interp: InterpScale) -> Self {
        Self { edges, interp }
    }

    /// Log-spaced energy axis with `nbin` bins between `min` and `max`
    ///
    /// # Examples
    ///
    /// ```
    /// use gammafit_rs::irf::EnergyAxis;
    ///
    /// let axis = EnergyAxis::from_energy_bounds(1.0, 100.0, 2).unwrap();
    /// assert_eq!(axis.nbin(), 2);
    /// assert!((axis.edges()[1] - 10.0).abs() < 1e-12);
    /// assert!((axis.center()[0] - 10f64.sqrt()).abs() < 1e-12);
    /// ```
    pub fn from_energy_bounds(min: f64, max: f64, nbin: usize) -> Result<Self, EDispError> {
        Self::from_bounds(min, max, nbin, InterpScale::Log)
    }

    /// Axis with `nbin` bins evenly spaced in the given scale
    pub fn from_bounds(
        min: f64,
        max: f64,
        nbin: usize,
        interp: InterpScale,
    ) -> Result<Self, EDispError> {
        if nbin == 0 {
            return Err(EDispError::InvalidAxis {
                message: "need at least one bin".to_string(),
            });
        }
        let mut edges = scale_linspace(interp, min, max, nbin + 1);
        // Pin the end points against round-off in the transformed space
        edges[0] = min;
        edges[nbin] = max;
        Self::from_edges(edges, interp)
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn interp(&self) -> InterpScale {
        self.interp
    }

    pub fn nbin(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges_min(&self) -> &[f64] {
        &self.edges[..self.nbin()]
    }

    pub fn edges_max(&self) -> &[f64] {
        &self.edges[1..]
    }

    /// Bin centers in the interpolation scale
    pub fn center(&self) -> Vec<f64> {
        let s = self.interp;
        self.edges
            .windows(2)
            .map(|w| s.inverse(0.5 * (s.apply(w[0]) + s.apply(w[1]))))
            .collect()
    }

    pub fn bin_width(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Pixel coordinate of `coord`; bin `i` spans `[i - 0.5, i + 0.5]`
    ///
    /// Values outside the axis are extrapolated from the nearest bin.
    pub fn coord_to_pix(&self, coord: f64) -> f64 {
        let s = self.interp;
        let t = s.apply(coord);
        let above = self.edges.partition_point(|&e| s.apply(e) <= t);
        let idx = above.saturating_sub(1).min(self.nbin() - 1);
        let (lo, hi) = (s.apply(self.edges[idx]), s.apply(self.edges[idx + 1]));
        idx as f64 - 0.5 + (t - lo) / (hi - lo)
    }

    /// Positions of `other`'s edges among this axis' edges, if all of them match
    pub(crate) fn edge_positions(&self, other: &EnergyAxis) -> Option<Vec<usize>> {
        other
            .edges
            .iter()
            .map(|&edge| {
                self.edges.iter().position(|&e| {
                    (e - edge).abs() <= 1e-6 * e.abs().max(edge.abs())
                })
            })
            .collect()
    }
}
