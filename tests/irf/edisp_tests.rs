//! Integration tests for migration maps and energy dispersion kernels

use approx::assert_abs_diff_eq;
use gammafit_rs::irf::{EDispError, EDispKernel, EDispMap, EnergyAxis};
use gammafit_rs::parameters::InterpScale;
use ndarray::{Array1, Array2, Axis};
use statrs::distribution::{Continuous, Normal};

const SIGMA: f64 = 0.1;

fn true_axis() -> EnergyAxis {
    EnergyAxis::from_energy_bounds(0.5, 20.0, 10).unwrap()
}

fn reco_axis() -> EnergyAxis {
    EnergyAxis::from_energy_bounds(0.1, 100.0, 30).unwrap()
}

/// Gaussian migration density sampled at the migration bin centers
fn gauss_map() -> EDispMap {
    let migra = EnergyAxis::from_bounds(0.0, 3.0, 300, InterpScale::Lin).unwrap();
    let normal = Normal::new(1.0, SIGMA).unwrap();
    let row: Vec<f64> = migra.center().iter().map(|&m| normal.pdf(m)).collect();

    let energy_axis_true = true_axis();
    let mut data = Array2::<f64>::zeros((energy_axis_true.nbin(), migra.nbin()));
    for mut out in data.rows_mut() {
        out.assign(&Array1::from(row.clone()));
    }

    let mut map = EDispMap::new(energy_axis_true, migra, data).unwrap();
    map.normalize();
    map
}

#[test]
fn test_map_kernel_matches_gauss_kernel() {
    let kernel = gauss_map().to_edisp_kernel(&reco_axis());
    let expected = EDispKernel::from_gauss(reco_axis(), true_axis(), SIGMA, 0.0, 0.0).unwrap();

    assert_eq!(kernel.pdf_matrix().dim(), (10, 30));
    for (a, b) in kernel.pdf_matrix().iter().zip(expected.pdf_matrix().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 5e-3);
    }

    for row_sum in kernel.pdf_matrix().sum_axis(Axis(1)).iter() {
        assert_abs_diff_eq!(*row_sum, 1.0, epsilon = 1e-6);
    }
}

#[test]
fn test_kernel_regrouping() {
    let kernel = gauss_map().to_edisp_kernel(&reco_axis());
    let row_sums = kernel.pdf_matrix().sum_axis(Axis(1));

    let coarse = EnergyAxis::from_energy_bounds(0.1, 100.0, 3).unwrap();
    let resampled = kernel.resample_energy_axis(&coarse, None).unwrap();
    assert_eq!(resampled.pdf_matrix().dim(), (10, 3));
    assert_eq!(resampled.energy_axis(), &coarse);
    for (a, b) in resampled.pdf_matrix().sum_axis(Axis(1)).iter().zip(row_sums.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }

    let image = kernel.to_image(None).unwrap();
    assert_eq!(image.energy_axis().nbin(), 1);
    assert_eq!(image.energy_axis().edges(), &[0.1, 100.0]);
    for (a, b) in image.pdf_matrix().column(0).iter().zip(row_sums.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }

    let shifted = EnergyAxis::from_energy_bounds(0.2, 100.0, 3).unwrap();
    assert!(matches!(
        kernel.resample_energy_axis(&shifted, None),
        Err(EDispError::IncompatibleAxis { .. })
    ));
}

#[test]
fn test_exposure_follows_kernel() {
    let exposure = Array1::linspace(1e9, 1e10, 10);
    let map = gauss_map().with_exposure(exposure.clone()).unwrap();
    let kernel = map.to_edisp_kernel(&reco_axis());
    assert_eq!(kernel.exposure(), Some(&exposure));

    let weights = Array2::<f64>::from_elem((10, 30), 0.5);
    let image = kernel.to_image(Some(&weights)).unwrap();
    assert_eq!(image.exposure(), Some(&exposure));
    assert_abs_diff_eq!(image.pdf_matrix()[[5, 0]], 0.5, epsilon = 1e-6);

    assert!(matches!(
        gauss_map().with_exposure(Array1::zeros(3)),
        Err(EDispError::LengthMismatch { expected: 10, got: 3 })
    ));
}

#[test]
fn test_diagonal_map_is_identity_on_matching_axes() {
    let axis = EnergyAxis::from_energy_bounds(1.0, 10.0, 5).unwrap();
    let map = EDispMap::from_diagonal_response(axis.clone(), None);
    let kernel = map.to_edisp_kernel(&axis);
    let identity = EDispKernel::from_diagonal_response(axis.clone(), axis);

    for (a, b) in kernel.pdf_matrix().iter().zip(identity.pdf_matrix().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
}
