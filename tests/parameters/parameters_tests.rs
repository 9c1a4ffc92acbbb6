//! Integration tests for parameter collections
//!
//! These tests exercise linked parameters across model components, the
//! optimizer view, scoped restore and serialization of whole collections.

use std::rc::Rc;

use gammafit_rs::parameters::{
    shared, ModelParameters, Parameter, ParameterError, Parameters, Prior,
};
use gammafit_rs::{GammaError, Result};

/// Two spectral components sharing their index
fn linked_models() -> (ModelParameters, ModelParameters) {
    let mut first = ModelParameters::new("spectral");
    first.declare(Parameter::new("index", 2.0)).unwrap();
    first
        .declare(
            Parameter::builder("amplitude", 1e-12)
                .unit("cm-2 s-1 TeV-1")
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut second = ModelParameters::new("spectral");
    second.declare(Parameter::new("index", 3.0)).unwrap();
    second
        .declare(
            Parameter::builder("amplitude", 4e-12)
                .unit("cm-2 s-1 TeV-1")
                .build()
                .unwrap(),
        )
        .unwrap();
    second.link("index", &first.get("index").unwrap()).unwrap();

    (first, second)
}

#[test]
fn test_linked_parameters_share_state() {
    let (first, second) = linked_models();
    let params = Parameters::from_stack(&[first.parameters(), second.parameters()]);

    assert_eq!(params.len(), 4);
    assert_eq!(params.unique_parameters().len(), 3);
    assert!(Rc::ptr_eq(&params[0], &params[2]));

    params[2].borrow_mut().set_value(2.4);
    assert_eq!(first.get("index").unwrap().borrow().value(), 2.4);
}

#[test]
fn test_link_requires_matching_name() {
    let (first, mut second) = linked_models();
    let err = second
        .link("index", &first.get("amplitude").unwrap())
        .unwrap_err();
    assert_eq!(
        err,
        ParameterError::NameMismatch {
            expected: "index".to_string(),
            got: "amplitude".to_string(),
        }
    );
}

#[test]
fn test_optimizer_view() {
    let (first, second) = linked_models();
    let params = &first.parameters() + &second.parameters();
    params.autoscale();

    // index, amplitude, amplitude; the linked index appears once
    let factors = params.factors();
    assert_eq!(factors.len(), 3);
    assert_eq!(factors[0], 2.0);

    second.get("amplitude").unwrap().borrow_mut().set_frozen(true);
    assert_eq!(params.factors().len(), 2);

    params.set_parameter_factors(&[2.5, 3.0]).unwrap();
    assert_eq!(params[0].borrow().value(), 2.5);
    assert_eq!(params[2].borrow().value(), 2.5);
    approx::assert_relative_eq!(params[1].borrow().value(), 3e-12, max_relative = 1e-12);

    assert!(matches!(
        params.set_parameter_factors(&[1.0]),
        Err(ParameterError::LengthMismatch { expected: 2, got: 1, .. })
    ));
}

fn failing_fit(params: &Parameters) -> Result<f64> {
    let _guard = params.restore_status(true);
    params.freeze_all();
    params.set_values(&[2.7, 5e-12])?;
    params.get("lambda_")?;
    Ok(0.0)
}

#[test]
fn test_restore_status_on_error() {
    let params = Parameters::from_parameters(vec![
        Parameter::new("index", 2.0),
        Parameter::new("amplitude", 1e-12),
    ]);
    params[1].borrow_mut().set_frozen(true);

    let err = failing_fit(&params).unwrap_err();
    assert!(matches!(err, GammaError::Parameter(ParameterError::NotFound { .. })));

    assert_eq!(params.values(), vec![2.0, 1e-12]);
    assert!(!params[0].borrow().frozen());
    assert!(params[1].borrow().frozen());
}

#[test]
fn test_restore_status_keeps_values() {
    let params = Parameters::from_parameters(vec![Parameter::new("index", 2.0)]);

    let value = params.with_restore_status(false, |p| {
        p.freeze_all();
        p[0].borrow_mut().set_value(2.9);
        p[0].borrow().value()
    });

    assert_eq!(value, 2.9);
    assert_eq!(params[0].borrow().value(), 2.9);
    assert!(!params[0].borrow().frozen());
}

#[test]
fn test_select() {
    let (first, second) = linked_models();
    let mut spatial = ModelParameters::new("spatial");
    spatial.declare(Parameter::new("lon_0", 83.6)).unwrap();
    let lat = spatial.declare(Parameter::new("lat_0", 22.0)).unwrap();
    lat.borrow_mut().set_frozen(true);

    let params = Parameters::from_stack(&[
        first.parameters(),
        second.parameters(),
        spatial.parameters(),
    ]);

    assert_eq!(params.select(None, Some("spatial"), None).len(), 2);
    assert_eq!(params.select(None, Some("spatial"), Some(false)).names(), vec!["lon_0"]);
    assert_eq!(params.select(Some(&["amplitude"][..]), None, None).len(), 2);
    assert_eq!(params.select(Some(&["index", "lat_0"][..]), None, Some(true)).len(), 1);
    assert!(params.select(None, Some("temporal"), None).is_empty());
}

#[test]
fn test_deep_copy_is_independent() {
    let (first, second) = linked_models();
    let params = Parameters::from_stack(&[first.parameters(), second.parameters()]);

    let copy = params.deep_copy();
    assert_ne!(copy, params);
    assert!(Rc::ptr_eq(&copy[0], &copy[2]));

    copy[0].borrow_mut().set_value(1.5);
    assert_eq!(params[0].borrow().value(), 2.0);
    assert_eq!(copy[2].borrow().value(), 1.5);
}

#[test]
fn test_json_file_roundtrip_keeps_links() {
    let (first, second) = linked_models();
    let params = Parameters::from_stack(&[first.parameters(), second.parameters()]);
    params[1]
        .borrow_mut()
        .set_prior(Some(Prior::gaussian(1e-12, 1e-13)));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parameters.json");
    params.save_json(&path).unwrap();

    let loaded = Parameters::load_json(&path).unwrap();
    assert_eq!(loaded.names(), params.names());
    assert_eq!(loaded.values(), params.values());
    assert_eq!(loaded.unique_parameters().len(), 3);
    assert!(Rc::ptr_eq(&loaded[0], &loaded[2]));
    assert_eq!(loaded.priors(), params.priors());

    let label = loaded[0].borrow().link_label().map(str::to_string).unwrap();
    assert!(label.starts_with("index@"));
    assert!(loaded[1].borrow().link_label().is_none());
}

#[test]
fn test_prior_stat_sum_counts_slots() {
    let index = shared(Parameter::new("index", 2.2));
    index
        .borrow_mut()
        .set_prior(Some(Prior::uniform(0.0, 2.0)));
    let params = Parameters::new(vec![index.clone(), index]);
    assert_eq!(params.prior_stat_sum(), 2.0);
}
