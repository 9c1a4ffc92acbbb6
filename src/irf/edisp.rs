//! Energy dispersion kernels and migration maps
//!
//! An [`EDispKernel`] is the probability matrix `[true energy, reco energy]` of
//! reconstructing an event of a given true energy in each reco energy bin. An
//! [`EDispMap`] holds the same information as a density in migration
//! `E_reco / E_true` per true energy bin, and converts into a kernel for any reco
//! energy axis.

use ndarray::{Array1, Array2, Axis};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::irf::axis::EnergyAxis;
use crate::irf::EDispError;
use crate::parameters::InterpScale;

/// Fraction of each true energy bin covered by each reco energy bin, `[true, reco]`
pub fn overlap_fraction(energy_axis: &EnergyAxis, energy_axis_true: &EnergyAxis) -> Array2<f64> {
    let (n_true, n_reco) = (energy_axis_true.nbin(), energy_axis.nbin());
    let mut data = Array2::<f64>::zeros((n_true, n_reco));
    for (i, t) in energy_axis_true.edges().windows(2).enumerate() {
        for (j, r) in energy_axis.edges().windows(2).enumerate() {
            let overlap = t[1].min(r[1]) - t[0].max(r[0]);
            data[[i, j]] = overlap.max(0.0) / (t[1] - t[0]);
        }
    }
    data
}

fn check_shape(data: &Array2<f64>, expected: (usize, usize)) -> Result<(), EDispError> {
    if data.dim() != expected {
        return Err(EDispError::ShapeMismatch {
            expected,
            got: data.dim(),
        });
    }
    Ok(())
}

fn check_exposure(exposure: &Array1<f64>, expected: usize) -> Result<(), EDispError> {
    if exposure.len() != expected {
        return Err(EDispError::LengthMismatch {
            expected,
            got: exposure.len(),
        });
    }
    Ok(())
}

/// Energy dispersion matrix for one sky position
#[derive(Debug, Clone, PartialEq)]
pub struct EDispKernel {
    energy_axis_true: EnergyAxis,
    energy_axis: EnergyAxis,
    data: Array2<f64>,
    exposure: Option<Array1<f64>>,
}

impl EDispKernel {
    /// Create a kernel from a `[true, reco]` probability matrix
    pub fn new(
        energy_axis_true: EnergyAxis,
        energy_axis: EnergyAxis,
        data: Array2<f64>,
    ) -> Result<Self, EDispError> {
        check_shape(&data, (energy_axis_true.nbin(), energy_axis.nbin()))?;
        Ok(Self {
            energy_axis_true,
            energy_axis,
            data,
            exposure: None,
        })
    }

    /// Attach an exposure per true energy bin
    pub fn with_exposure(mut self, exposure: Array1<f64>) -> Result<Self, EDispError> {
        check_exposure(&exposure, self.energy_axis_true.nbin())?;
        self.exposure = Some(exposure);
        Ok(self)
    }

    /// Kernel without dispersion: each true bin maps onto the reco bins it overlaps
    ///
    /// # Examples
    ///
    /// ```
    /// use gammafit_rs::irf::{EDispKernel, EnergyAxis};
    ///
    /// let axis = EnergyAxis::from_energy_bounds(1.0, 10.0, 3).unwrap();
    /// let kernel = EDispKernel::from_diagonal_response(axis.clone(), axis);
    /// assert_eq!(kernel.pdf_matrix()[[1, 1]], 1.0);
    /// assert_eq!(kernel.pdf_matrix()[[1, 0]], 0.0);
    /// ```
    pub fn from_diagonal_response(energy_axis: EnergyAxis, energy_axis_true: EnergyAxis) -> Self {
        let data = overlap_fraction(&energy_axis, &energy_axis_true);
        Self {
            energy_axis_true,
            energy_axis,
            data,
            exposure: None,
        }
    }

    /// Gaussian dispersion in migration `E_reco / E_true`
    ///
    /// # Arguments
    ///
    /// * `sigma` - RMS width of the migration distribution (resolution)
    /// * `bias` - Offset of the migration mean from 1
    /// * `pdf_threshold` - Probabilities below this value are set to zero
    pub fn from_gauss(
        energy_axis: EnergyAxis,
        energy_axis_true: EnergyAxis,
        sigma: f64,
        bias: f64,
        pdf_threshold: f64,
    ) -> Result<Self, EDispError> {
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(EDispError::InvalidSigma { sigma });
        }
        let normal = Normal::new(1.0 + bias, sigma).map_err(|e| EDispError::InvalidDistribution {
            message: e.to_string(),
        })?;

        let e_true = energy_axis_true.center();
        let mut data = Array2::<f64>::zeros((energy_axis_true.nbin(), energy_axis.nbin()));
        for (i, &energy) in e_true.iter().enumerate() {
            let cdf: Vec<f64> = energy_axis
                .edges()
                .iter()
                .map(|&edge| normal.cdf(edge / energy))
                .collect();
            for (j, w) in cdf.windows(2).enumerate() {
                let p = w[1] - w[0];
                data[[i, j]] = if p < pdf_threshold { 0.0 } else { p };
            }
        }

        Self::new(energy_axis_true, energy_axis, data)
    }

    pub fn energy_axis(&self) -> &EnergyAxis {
        &self.energy_axis
    }

    pub fn energy_axis_true(&self) -> &EnergyAxis {
        &self.energy_axis_true
    }

    /// Probability matrix `[true, reco]`
    pub fn pdf_matrix(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn exposure(&self) -> Option<&Array1<f64>> {
        self.exposure.as_ref()
    }

    fn weighted(&self, weights: Option<&Array2<f64>>) -> Result<Array2<f64>, EDispError> {
        match weights {
            Some(w) => {
                check_shape(w, self.data.dim())?;
                Ok(&self.data * w)
            }
            None => Ok(self.data.clone()),
        }
    }

    /// Sum over reco energy into a single bin spanning the whole reco axis
    pub fn to_image(&self, weights: Option<&Array2<f64>>) -> Result<Self, EDispError> {
        let data = self.weighted(weights)?.sum_axis(Axis(1)).insert_axis(Axis(1));
        let edges = self.energy_axis.edges();
        let energy_axis = EnergyAxis::from_edges(
            vec![edges[0], edges[edges.len() - 1]],
            self.energy_axis.interp(),
        )?;
        Ok(Self {
            energy_axis_true: self.energy_axis_true.clone(),
            energy_axis,
            data,
            exposure: self.exposure.clone(),
        })
    }

    /// Group reco energy bins by a coarser axis whose edges are a subset of the
    /// current ones; true energy is unchanged
    pub fn resample_energy_axis(
        &self,
        energy_axis: &EnergyAxis,
        weights: Option<&Array2<f64>>,
    ) -> Result<Self, EDispError> {
        let positions = self
            .energy_axis
            .edge_positions(energy_axis)
            .ok_or_else(|| EDispError::IncompatibleAxis {
                message: "reco energy edges are not a subset of the kernel edges".to_string(),
            })?;
        let fine = self.weighted(weights)?;

        let mut data = Array2::<f64>::zeros((self.energy_axis_true.nbin(), energy_axis.nbin()));
        for (j, range) in positions.windows(2).enumerate() {
            for i in 0..fine.nrows() {
                data[[i, j]] = (range[0]..range[1]).map(|k| fine[[i, k]]).sum::<f64>();
            }
        }

        Ok(Self {
            energy_axis_true: self.energy_axis_true.clone(),
            energy_axis: energy_axis.clone(),
            data,
            exposure: self.exposure.clone(),
        })
    }
}

/// Migration density `[true energy, migra]` for one sky position
#[derive(Debug, Clone, PartialEq)]
pub struct EDispMap {
    energy_axis_true: EnergyAxis,
    migra_axis: EnergyAxis,
    data: Array2<f64>,
    exposure: Option<Array1<f64>>,
}

impl EDispMap {
    pub fn new(
        energy_axis_true: EnergyAxis,
        migra_axis: EnergyAxis,
        data: Array2<f64>,
    ) -> Result<Self, EDispError> {
        check_shape(&data, (energy_axis_true.nbin(), migra_axis.nbin()))?;
        Ok(Self {
            energy_axis_true,
            migra_axis,
            data,
            exposure: None,
        })
    }

    /// Attach an exposure per true energy bin; it is carried into kernels
    pub fn with_exposure(mut self, exposure: Array1<f64>) -> Result<Self, EDispError> {
        check_exposure(&exposure, self.energy_axis_true.nbin())?;
        self.exposure = Some(exposure);
        Ok(self)
    }

    /// Narrow linear migration axis, `1 ± 1e-5` in three bins
    pub fn default_migra_axis() -> EnergyAxis {
        let res = 1e-5;
        let edges = (0..4)
            .map(|k| 1.0 - res + 2.0 * res * k as f64 / 3.0)
            .collect();
        EnergyAxis::new_unchecked(edges, InterpScale::Lin)
    }

    /// Map without dispersion: all density sits at migration 1
    ///
    /// The density at migration 1 is spread linearly over the two nearest
    /// pixels and divided by the bin width.
    pub fn from_diagonal_response(energy_axis_true: EnergyAxis, migra_axis: Option<EnergyAxis>) -> Self {
        let migra_axis = migra_axis.unwrap_or_else(Self::default_migra_axis);
        let migra_0 = migra_axis.coord_to_pix(1.0);
        let widths = migra_axis.bin_width();

        let row: Vec<f64> = widths
            .iter()
            .enumerate()
            .map(|(j, width)| {
                let distance = (j as f64 - migra_0).abs();
                let weight = if distance < 1.0 { 1.0 - distance } else { 0.0 };
                weight / width
            })
            .collect();

        let n_true = energy_axis_true.nbin();
        let mut data = Array2::<f64>::zeros((n_true, migra_axis.nbin()));
        for mut out in data.rows_mut() {
            out.assign(&Array1::from(row.clone()));
        }

        Self {
            energy_axis_true,
            migra_axis,
            data,
            exposure: None,
        }
    }

    pub fn energy_axis_true(&self) -> &EnergyAxis {
        &self.energy_axis_true
    }

    pub fn migra_axis(&self) -> &EnergyAxis {
        &self.migra_axis
    }

    /// Migration density `[true, migra]`
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn exposure(&self) -> Option<&Array1<f64>> {
        self.exposure.as_ref()
    }

    /// Scale each true energy row so its migration integral is one
    ///
    /// Rows with a zero integral are left unchanged.
    pub fn normalize(&mut self) {
        let widths = Array1::from(self.migra_axis.bin_width());
        for mut row in self.data.rows_mut() {
            let norm = row.dot(&widths);
            if norm > 0.0 {
                row /= norm;
            }
        }
    }

    /// Integral of the density of true energy bin `true_idx` from the lowest
    /// migration edge up to `migra`
    pub fn cumulative(&self, true_idx: usize, migra: f64) -> f64 {
        let mut total = 0.0;
        for (j, w) in self.migra_axis.edges().windows(2).enumerate() {
            if migra <= w[0] {
                break;
            }
            total += self.data[[true_idx, j]] * (migra.min(w[1]) - w[0]);
        }
        total
    }

    /// Kernel for a reco energy axis
    ///
    /// Reco bin `j` of true bin `i` receives the migration integral between
    /// `E_reco[j] / E_true[i]` and `E_reco[j + 1] / E_true[i]`, clipped at zero.
    pub fn to_edisp_kernel(&self, energy_axis: &EnergyAxis) -> EDispKernel {
        let e_true = self.energy_axis_true.center();
        let mut data = Array2::<f64>::zeros((e_true.len(), energy_axis.nbin()));

        for (i, &energy) in e_true.iter().enumerate() {
            let values: Vec<f64> = energy_axis
                .edges()
                .iter()
                .map(|&edge| self.cumulative(i, edge / energy))
                .collect();
            for (j, w) in values.windows(2).enumerate() {
                data[[i, j]] = (w[1] - w[0]).max(0.0);
            }
        }

        EDispKernel {
            energy_axis_true: self.energy_axis_true.clone(),
            energy_axis: energy_axis.clone(),
            data,
            exposure: self.exposure.clone(),
        }
    }
}
