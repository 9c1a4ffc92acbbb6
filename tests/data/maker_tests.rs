//! Integration tests for building index tables from events files on disk

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use gammafit_rs::data::{
    CheckLevel, ColumnValue, DataStore, DataStoreError, DataStoreMaker, HduClass, HduType,
    IrfPaths, MemoryHeaderReader, RequiredIrf,
};
use serde_json::json;

use crate::test_helpers::{approx_eq, events_header, init_logger};

/// Write a JSON events file holding an `EVENTS` header
fn write_events(dir: &Path, obs_id: i64, ra: f64, dec: f64) -> PathBuf {
    let path = dir.join(format!("events_{:06}.json", obs_id));
    let doc = json!({ "EVENTS": events_header(obs_id, ra, dec) });
    fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    path
}

#[test]
fn test_single_run_index() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let events = write_events(dir.path(), 110380, 83.6, 22.0);

    let store = DataStoreMaker::new(&[&events], IrfPaths::None)
        .unwrap()
        .run()
        .unwrap();

    let obs_table = store.obs_table().unwrap();
    assert_eq!(obs_table.len(), 1);
    let row = obs_table.row(110380).unwrap();
    assert_eq!(row["RA_PNT"], ColumnValue::Float(83.6));
    assert_eq!(row["DEC_PNT"], ColumnValue::Float(22.0));
    assert_eq!(row["ONTIME"], ColumnValue::Float(1800.0));
    assert_eq!(row["LIVETIME"], ColumnValue::Float(1800.0));
    assert_eq!(row["DEADC"], ColumnValue::Float(1.0));
    assert_eq!(row["TELESCOP"], ColumnValue::Text("CTA".to_string()));
    assert_eq!(row["N_TELS"], ColumnValue::Int(-1));
    assert_eq!(row["OBJECT"], ColumnValue::Text("NOT AVAILABLE".to_string()));

    // The Crab sits just below the Galactic plane towards the anticenter
    let glon = row["GLON_PNT"].as_f64().unwrap();
    let glat = row["GLAT_PNT"].as_f64().unwrap();
    assert!(approx_eq(glon, 184.5, 0.1));
    assert!(approx_eq(glat, -5.8, 0.1));

    let hdu_table = store.hdu_table();
    assert_eq!(hdu_table.len(), 6);
    assert_eq!(
        hdu_table.hdu_types(),
        vec![
            HduType::Events,
            HduType::Gti,
            HduType::Aeff,
            HduType::Edisp,
            HduType::Psf,
            HduType::Bkg
        ]
    );

    let obs_ids: BTreeSet<i64> = obs_table.obs_ids().into_iter().collect();
    let hdu_ids: BTreeSet<i64> = hdu_table.obs_ids().into_iter().collect();
    assert_eq!(obs_ids, hdu_ids);

    assert_eq!(obs_table.meta()["HDUCLAS2"], ColumnValue::Text("OBS".to_string()));
    assert_eq!(hdu_table.meta()["HDUCLAS2"], ColumnValue::Text("HDU".to_string()));
    assert_eq!(obs_table.meta()["MJDREFI"], ColumnValue::Int(51910));

    // Without CALDB information the IRFs are looked up in the events file
    let observation = store.obs(110380, &RequiredIrf::FullEnclosure, true).unwrap();
    assert_eq!(observation.location(HduType::Events).unwrap().path(), events);
    assert_eq!(observation.location(HduType::Aeff).unwrap().path(), events);
    assert_eq!(
        observation.location(HduType::Psf).unwrap().hdu_class,
        HduClass::Psf3Gauss
    );

    assert!(store
        .check()
        .iter()
        .all(|record| record.level != CheckLevel::Error));
}

#[test]
fn test_write_and_reload() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let events: Vec<PathBuf> = [(23523, 83.63, 21.51), (23526, 83.63, 22.51), (23592, 85.25, 22.01)]
        .iter()
        .map(|&(obs_id, ra, dec)| write_events(dir.path(), obs_id, ra, dec))
        .collect();

    let store = DataStore::from_events_files(&events, IrfPaths::None).unwrap();
    assert_eq!(store.obs_ids(), vec![23523, 23526, 23592]);

    let outdir = dir.path().join("index");
    store.write(&outdir, false).unwrap();

    // Refuses to overwrite by default
    assert!(store.write(&outdir, false).is_err());
    store.write(&outdir, true).unwrap();

    let reloaded = DataStore::from_dir(&outdir, None, None).unwrap();
    assert_eq!(reloaded.obs_ids(), store.obs_ids());
    assert_eq!(reloaded.hdu_table().rows(), store.hdu_table().rows());
    let obs_table = reloaded.obs_table().unwrap();
    assert_eq!(obs_table.columns(), store.obs_table().unwrap().columns());
    let ra = obs_table.row(23592).unwrap()["RA_PNT"].as_f64().unwrap();
    assert!(approx_eq(ra, 85.25, 1e-12));

    // Absolute FILE_DIR entries ignore the base directory
    let observation = reloaded
        .obs(23526, &RequiredIrf::PointLike, true)
        .unwrap();
    assert_eq!(observation.location(HduType::Events).unwrap().path(), events[1]);
}

#[test]
fn test_irfs_from_caldb() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let caldb = dir.path().join("caldb");
    let irf_dir = caldb.join("data/cta/prod3b-v2/bcf/South_z20_50h");
    fs::create_dir_all(&irf_dir).unwrap();
    fs::write(irf_dir.join("irf_file.json"), "{}").unwrap();

    let mut header = events_header(1, 0.0, 0.0);
    header.insert("CALDB".to_string(), "prod3b-v2".into());
    header.insert("IRF".to_string(), "South_z20_50h".into());
    let events = dir.path().join("events_1.json");
    fs::write(
        &events,
        serde_json::to_string(&json!({ "EVENTS": header })).unwrap(),
    )
    .unwrap();

    let store = DataStoreMaker::new(&[&events], IrfPaths::None)
        .unwrap()
        .with_caldb(&caldb)
        .run()
        .unwrap();

    let observation = store.obs(1, &RequiredIrf::FullEnclosure, true).unwrap();
    let edisp = observation.location(HduType::Edisp).unwrap();
    assert_eq!(edisp.file_name, "irf_file.json");
    assert_eq!(edisp.path(), irf_dir.join("irf_file.json"));
    assert_eq!(edisp.hdu_name, "ENERGY DISPERSION");

    // An explicit IRF path wins over CALDB
    let explicit = dir.path().join("irf_explicit.json");
    let store = DataStoreMaker::new(&[&events], IrfPaths::Single(explicit.clone()))
        .unwrap()
        .with_caldb(&caldb)
        .run()
        .unwrap();
    let aeff = store.hdu_table().hdu_location(1, HduType::Aeff, true).unwrap();
    assert_eq!(aeff.path(), explicit);
}

#[test]
fn test_missing_events_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("events_000001.json");
    let err = DataStoreMaker::new(&[&missing], IrfPaths::None)
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, DataStoreError::FileNotFound { .. }));
}

#[test]
fn test_events_info_is_cached() {
    let mut maker = DataStoreMaker::new(&["run_1.fits"], IrfPaths::None)
        .unwrap()
        .with_header_reader(
            MemoryHeaderReader::new().with_header("run_1.fits", "EVENTS", events_header(1, 10.0, -5.0)),
        );

    let info = maker.get_events_info(Path::new("run_1.fits"), None).unwrap();
    assert_eq!(info.obs_id, 1);
    assert_eq!(info.irf_filename, "run_1.fits");

    let obs_table = maker.make_obs_table().unwrap();
    let hdu_table = maker.make_hdu_table().unwrap();
    assert_eq!(obs_table.obs_ids(), vec![1]);
    assert_eq!(hdu_table.len(), 6);
    assert!(hdu_table.rows().iter().all(|row| row.file_dir.is_empty()));
}
