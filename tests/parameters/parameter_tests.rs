//! Integration tests for the Parameter struct
//!
//! These tests verify that a single parameter behaves correctly through the
//! public API: transforms, autoscaling, units, scans and serialization.

use approx::assert_relative_eq;
use gammafit_rs::parameters::{
    InterpScale, Parameter, ParameterError, Prior, Quantity, ScaleMethod, Unit,
};

#[test]
fn test_parameter_lifecycle() {
    let mut param = Parameter::builder("amplitude", 2.3e-12)
        .unit("cm-2 s-1 TeV-1")
        .min(0.0)
        .build()
        .unwrap();

    // Initial state
    assert_eq!(param.name(), "amplitude");
    assert_eq!(param.value(), 2.3e-12);
    assert_eq!(param.scale(), 1.0);
    assert_eq!(param.factor(), 2.3e-12);
    assert_eq!(param.min(), 0.0);
    assert!(param.max().is_nan());
    assert!(!param.frozen());
    assert_eq!(param.scale_method(), Some(ScaleMethod::Scale10));

    // Autoscale moves the magnitude into the scale
    param.autoscale();
    assert_relative_eq!(param.scale(), 1e-12, max_relative = 1e-12);
    assert_relative_eq!(param.factor(), 2.3, max_relative = 1e-12);
    assert_relative_eq!(param.value(), 2.3e-12, max_relative = 1e-15);

    // The optimizer moves the factor, the value follows
    param.set_factor(4.0);
    assert_relative_eq!(param.value(), 4e-12, max_relative = 1e-12);

    // Setting the value keeps the current scale
    param.set_value(5e-12);
    assert_relative_eq!(param.factor(), 5.0, max_relative = 1e-12);
    assert_relative_eq!(param.scale(), 1e-12, max_relative = 1e-12);

    param.set_frozen(true);
    assert!(param.frozen());
}

#[test]
fn test_index_autoscale() {
    let mut index = Parameter::new("index", 2.0);
    index.autoscale();
    assert_eq!(index.scale(), 1.0);
    assert_eq!(index.factor(), 2.0);
}

#[test]
fn test_factor1_scale_method() {
    let mut param = Parameter::builder("sigma", 0.2)
        .scale_method(Some(ScaleMethod::Factor1))
        .build()
        .unwrap();
    param.autoscale();
    assert_eq!(param.scale(), 0.2);
    assert_eq!(param.factor(), 1.0);

    // No scale method never rescales
    param.set_scale_method(None);
    param.set_value(30.0);
    param.autoscale();
    assert_eq!(param.scale(), 1.0);
    assert_eq!(param.factor(), 30.0);
}

#[test]
fn test_log_transform() {
    let mut param = Parameter::builder("lambda_", 100.0)
        .scale_transform(InterpScale::Log)
        .build()
        .unwrap();
    param.autoscale();

    // ln(100) = 4.6 lies in the first decade
    assert_eq!(param.scale(), 1.0);
    assert_relative_eq!(param.factor(), 100f64.ln(), max_relative = 1e-12);
    assert_relative_eq!(param.inverse_transform(param.factor()), 100.0, max_relative = 1e-12);

    // dvalue/dfactor of exp(scale * factor)
    assert_relative_eq!(
        param.inverse_transform_derivative(param.factor()),
        100.0,
        max_relative = 1e-12
    );

    // Changing the transform resets the decomposition
    param.set_scale_transform(InterpScale::Sqrt);
    assert_eq!(param.scale(), 1.0);
    assert_eq!(param.factor(), 100.0);
}

#[test]
fn test_scale10_at_zero_keeps_scale() {
    let mut param = Parameter::new("lon_0", 300.0);
    param.autoscale();
    assert_eq!(param.scale(), 100.0);

    param.set_value(0.0);
    param.autoscale();
    assert_eq!(param.scale(), 100.0);
    assert_eq!(param.factor(), 0.0);
}

#[test]
fn test_bounds_with_units() {
    let mut param = Parameter::builder("reference", "1 TeV").build().unwrap();
    assert_eq!(param.unit(), &Unit::parse("TeV").unwrap());

    param.set_min("500 GeV").unwrap();
    assert_relative_eq!(param.min(), 0.5, max_relative = 1e-12);

    param.set_max(Quantity::parse("10 TeV").unwrap()).unwrap();
    assert_eq!(param.max(), 10.0);
    assert_relative_eq!(param.factor_max(), 10.0);

    let err = param.set_max("3 s").unwrap_err();
    assert!(matches!(err, ParameterError::UnitConversion { .. }));
    assert_eq!(param.max(), 10.0);

    // Missing clears the bound
    param.set_min(None::<f64>).unwrap();
    assert!(param.min().is_nan());
}

#[test]
fn test_set_quantity() {
    let mut param = Parameter::builder("reference", "1 TeV").build().unwrap();

    param.set_quantity(Quantity::parse("300 GeV").unwrap()).unwrap();
    assert_eq!(param.value(), 300.0);
    assert_eq!(param.unit().to_fits_string(), "GeV");

    let err = param.set_quantity(Quantity::parse("2 deg").unwrap());
    assert!(err.is_err());
    assert_eq!(param.value(), 300.0);
    assert_eq!(param.unit().to_fits_string(), "GeV");
}

#[test]
fn test_scan_values() {
    let mut param = Parameter::builder("index", 2.0)
        .error(0.5)
        .scan_n_values(5)
        .build()
        .unwrap();

    assert_eq!(param.scan_min(), 1.0);
    assert_eq!(param.scan_max(), 3.0);
    assert_eq!(param.scan_values(), vec![1.0, 1.5, 2.0, 2.5, 3.0]);

    param.set_interp(InterpScale::Log);
    param.set_scan_min(Some(1.0));
    param.set_scan_max(Some(100.0));
    param.set_scan_n_values(3);
    let values = param.scan_values();
    assert_relative_eq!(values[1], 10.0, max_relative = 1e-12);

    param.set_scan_values(Some(vec![1.9, 2.1]));
    assert_eq!(param.scan_values(), vec![1.9, 2.1]);
}

#[test]
fn test_conf_limits() {
    let param = Parameter::builder("index", 2.0)
        .min(1.0)
        .error(0.1)
        .build()
        .unwrap();

    assert_eq!(param.conf_min(), 1.0);
    // No maximum: pushed far out
    assert!(param.conf_max() >= 2e5);
}

#[test]
fn test_check_limits() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut param = Parameter::builder("index", 6.0)
        .min(1.0)
        .max(5.0)
        .build()
        .unwrap();
    assert!(param.check_limits());

    param.set_frozen(true);
    assert!(!param.check_limits());

    // NaN bounds never trigger
    assert!(!Parameter::new("index", -1e9).check_limits());
}

#[test]
fn test_prior_penalty() {
    let mut param = Parameter::new("index", 2.2);
    assert_eq!(param.prior_stat_sum(), None);

    param.set_prior(Some(Prior::gaussian(2.0, 0.1).with_weight(2.0)));
    assert_relative_eq!(param.prior_stat_sum().unwrap(), 8.0, max_relative = 1e-9);

    param.set_prior(Some(Prior::uniform(0.0, 2.0)));
    assert_eq!(param.prior_stat_sum(), Some(1.0));
}

#[test]
fn test_dict_roundtrip() {
    let param = Parameter::builder("amplitude", 1e-12)
        .unit("cm-2 s-1 TeV-1")
        .min(0.0)
        .error(1e-13)
        .prior(Some(Prior::gaussian(1e-12, 1e-13)))
        .build()
        .unwrap();

    let json = serde_json::to_string(&param.to_dict()).unwrap();
    // Unbounded maximum is written as null
    assert!(json.contains("\"max\":null"));

    let loaded = Parameter::from_dict(&serde_json::from_str(&json).unwrap()).unwrap();
    assert_eq!(loaded.name(), "amplitude");
    assert_eq!(loaded.value(), 1e-12);
    assert_eq!(loaded.min(), 0.0);
    assert!(loaded.max().is_nan());
    assert_eq!(loaded.error(), 1e-13);
    assert_eq!(loaded.unit(), param.unit());
    assert_eq!(loaded.prior(), param.prior());
}

#[test]
fn test_invalid_tags() {
    assert!(matches!(
        "linear".parse::<InterpScale>(),
        Err(ParameterError::InvalidTransform { .. })
    ));
    assert!(matches!(
        "scale100".parse::<ScaleMethod>(),
        Err(ParameterError::InvalidScaleMethod { .. })
    ));
}
