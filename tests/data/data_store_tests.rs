//! Integration tests for resolving observations from a data directory

use std::fs;
use std::path::Path;

use gammafit_rs::data::{
    CheckLevel, CopyOptions, DataStore, DataStoreError, HduClass, HduIndexRow, HduIndexTable,
    HduType, JsonIndexFormat, ObsRow, ObservationQuery, ObservationTable, RequiredIrf, TableMeta,
};
use gammafit_rs::{GammaError, Result};

use crate::test_helpers::init_logger;

fn class_of(hdu_type: HduType) -> HduClass {
    match hdu_type {
        HduType::Events => HduClass::Events,
        HduType::Gti => HduClass::Gti,
        HduType::Aeff => HduClass::Aeff2d,
        HduType::Edisp => HduClass::Edisp2d,
        HduType::Psf => HduClass::Psf3Gauss,
        HduType::Bkg => HduClass::Bkg3d,
        HduType::Pointing => HduClass::Pointing,
        HduType::RadMax => HduClass::RadMax2d,
    }
}

fn index_meta(clas2: &str) -> TableMeta {
    let mut meta = TableMeta::new();
    meta.insert("HDUCLASS".to_string(), "GADF".into());
    meta.insert("HDUCLAS1".to_string(), "INDEX".into());
    meta.insert("HDUCLAS2".to_string(), clas2.into());
    meta
}

/// Data directory with runs 1 and 3 complete and run 4 lacking edisp
///
/// Events and IRFs of each run live in separate files under `data/run{id}`.
fn make_data_dir(dir: &Path) {
    let runs: [(i64, &[HduType]); 3] = [
        (1, &[HduType::Events, HduType::Gti, HduType::Aeff, HduType::Edisp, HduType::Psf, HduType::Bkg]),
        (3, &[HduType::Events, HduType::Gti, HduType::Aeff, HduType::Edisp, HduType::Psf, HduType::Bkg]),
        (4, &[HduType::Events, HduType::Gti, HduType::Aeff, HduType::Psf, HduType::Bkg]),
    ];

    let mut hdu_rows = Vec::new();
    let mut obs_rows = Vec::new();
    for (obs_id, types) in runs {
        let file_dir = format!("data/run{:03}", obs_id);
        fs::create_dir_all(dir.join(&file_dir)).unwrap();
        for &hdu_type in types {
            let file_name = if hdu_type.is_irf() { "irfs.json" } else { "events.json" };
            fs::write(dir.join(&file_dir).join(file_name), b"{}").unwrap();
            hdu_rows.push(HduIndexRow {
                obs_id,
                hdu_type,
                hdu_class: class_of(hdu_type),
                file_dir: file_dir.clone(),
                file_name: file_name.to_string(),
                hdu_name: hdu_type.to_string().to_uppercase(),
            });
        }

        let mut row = ObsRow::new();
        row.insert("OBS_ID".to_string(), obs_id.into());
        let zen = if obs_id == 3 { 40.0 } else { 20.0 };
        row.insert("ZEN_PNT".to_string(), zen.into());
        obs_rows.push(row);
    }

    let store = DataStore::new(
        HduIndexTable::new(hdu_rows, index_meta("HDU")),
        Some(ObservationTable::new(
            vec!["OBS_ID".to_string(), "ZEN_PNT".to_string()],
            obs_rows,
            index_meta("OBS"),
        )),
    );
    store.write(dir, false).unwrap();
}

#[test]
fn test_skip_missing_ids() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    make_data_dir(dir.path());
    let store = DataStore::from_dir(dir.path(), None, None).unwrap();

    let query = ObservationQuery::new()
        .with_obs_ids(vec![1, 2, 3])
        .with_skip_missing(true);
    let (observations, report) = store.get_observations_with_report(&query).unwrap();
    assert_eq!(observations.ids(), vec![1, 3]);
    assert_eq!(report.unknown, vec![2]);
    assert_eq!(report.requested, 3);

    // Without skip_missing the unknown id is fatal
    let err = store
        .get_observations(&query.with_skip_missing(false))
        .unwrap_err();
    assert_eq!(err.to_string(), "OBS_ID = 2 not in HDU index table");
}

#[test]
fn test_point_like_requires_edisp() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    make_data_dir(dir.path());
    let store = DataStore::from_dir(dir.path(), None, None).unwrap();

    let err = store.obs(4, &RequiredIrf::PointLike, true).unwrap_err();
    assert!(err.is_missing_hdu());
    assert!(err.to_string().contains("edisp"));

    let observation = store.obs(4, &RequiredIrf::AllOptional, true).unwrap();
    assert!(observation.location(HduType::Edisp).is_none());
    assert_eq!(
        observation.available_irfs(),
        vec![HduType::Aeff, HduType::Psf, HduType::Bkg]
    );

    let path = observation.location(HduType::Aeff).unwrap().path();
    assert_eq!(path, dir.path().join("data/run004/irfs.json"));
    assert!(path.exists());

    // Batch selection skips run 4 instead of failing
    let query = ObservationQuery::new().with_required_irf(RequiredIrf::PointLike);
    let (observations, report) = store.get_observations_with_report(&query).unwrap();
    assert_eq!(observations.ids(), vec![1, 3]);
    assert_eq!(report.skipped, vec![(4, vec![HduType::Edisp])]);
}

fn count_missing(store: &DataStore, ids: &[i64]) -> Result<usize> {
    let required = "aeff,edisp,psf".parse::<RequiredIrf>()?;
    let mut missing = 0;
    for &id in ids {
        match store.obs(id, &required, true) {
            Ok(_) => {}
            Err(err) if err.is_missing_hdu() => missing += 1,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(missing)
}

#[test]
fn test_errors_convert_into_crate_error() {
    let dir = tempfile::tempdir().unwrap();
    make_data_dir(dir.path());
    let store = DataStore::from_dir(dir.path(), None, None).unwrap();

    assert_eq!(count_missing(&store, &[1, 3, 4]).unwrap(), 1);

    let err = count_missing(&store, &[1, 9]).unwrap_err();
    assert!(matches!(
        err,
        GammaError::DataStore(DataStoreError::UnknownObsId { obs_id: 9 })
    ));
    assert!(!err.is_missing_hdu());
}

#[test]
fn test_groups_by_zenith() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    make_data_dir(dir.path());
    let store = DataStore::from_dir(dir.path(), None, None).unwrap();

    let query = ObservationQuery::new().with_required_irf(RequiredIrf::AllOptional);
    let groups = store.get_observation_groups("ZEN_PNT", &query).unwrap();
    let keys: Vec<&str> = groups.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys, vec!["ZEN_PNT_20", "ZEN_PNT_40"]);
    assert_eq!(groups[0].1.ids(), vec![1, 4]);
    assert_eq!(groups[1].1.ids(), vec![3]);
}

#[test]
fn test_copy_obs_subset() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    make_data_dir(dir.path());
    let store = DataStore::from_dir(dir.path(), None, None).unwrap();

    let outdir = tempfile::tempdir().unwrap();
    let options = CopyOptions {
        verbose: true,
        ..CopyOptions::default()
    };
    store.copy_obs(&[3], outdir.path(), &options).unwrap();

    assert!(outdir.path().join("data/run003/events.json").exists());
    assert!(outdir.path().join("data/run003/irfs.json").exists());
    assert!(!outdir.path().join("data/run001").exists());

    let copied = DataStore::from_dir(outdir.path(), None, None).unwrap();
    assert_eq!(copied.obs_ids(), vec![3]);
    assert_eq!(copied.obs_table().unwrap().obs_ids(), vec![3]);
    let observation = copied.obs(3, &RequiredIrf::FullEnclosure, true).unwrap();
    assert!(observation.location(HduType::Bkg).unwrap().path().starts_with(outdir.path()));

    assert!(copied
        .check()
        .iter()
        .all(|record| record.level != CheckLevel::Error));

    // Copying onto a file instead of a directory fails
    let file = outdir.path().join(JsonIndexFormat::HDU_FILE_NAME);
    assert!(matches!(
        store.copy_obs(&[1], &file, &options),
        Err(DataStoreError::NotADirectory { .. })
    ));
}

#[test]
fn test_copy_obs_by_class() {
    let dir = tempfile::tempdir().unwrap();
    make_data_dir(dir.path());
    let store = DataStore::from_dir(dir.path(), None, None).unwrap();

    let outdir = tempfile::tempdir().unwrap();
    let options = CopyOptions {
        hdu_classes: Some(vec![HduClass::Events, HduClass::Gti]),
        ..CopyOptions::default()
    };
    store.copy_obs(&[1, 4], outdir.path(), &options).unwrap();

    assert!(outdir.path().join("data/run001/events.json").exists());
    assert!(!outdir.path().join("data/run001/irfs.json").exists());

    let copied = DataStore::from_dir(outdir.path(), None, None).unwrap();
    assert_eq!(copied.hdu_table().len(), 4);
    assert!(copied.obs(1, &RequiredIrf::AllOptional, true).is_ok());
    assert!(copied.obs(1, &RequiredIrf::PointLike, true).is_err());
}

#[test]
fn test_check_finds_missing_files() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    make_data_dir(dir.path());
    fs::remove_file(dir.path().join("data/run001/irfs.json")).unwrap();

    let store = DataStore::from_dir(dir.path(), None, None).unwrap();
    let errors: Vec<_> = store
        .check()
        .into_iter()
        .filter(|record| record.level == CheckLevel::Error)
        .collect();

    // aeff, edisp, psf and bkg of run 1 share the removed file
    assert_eq!(errors.len(), 4);
    assert!(errors.iter().all(|record| record.msg.contains("OBS_ID = 1")));
}

#[test]
fn test_combined_index_file() {
    let dir = tempfile::tempdir().unwrap();
    make_data_dir(dir.path());
    let store = DataStore::from_dir(dir.path(), None, None).unwrap();

    let path = dir.path().join("index.json");
    JsonIndexFormat
        .write_combined(store.hdu_table(), store.obs_table(), &path, false)
        .unwrap();

    let combined = DataStore::from_file(&path).unwrap();
    assert_eq!(combined.obs_ids(), vec![1, 3, 4]);
    assert_eq!(combined.obs_table().unwrap().len(), 3);
    assert!(combined.info().contains("Data store"));
}

#[test]
fn test_missing_index_files() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        DataStore::from_dir(dir.path(), None, None),
        Err(DataStoreError::FileNotFound { .. })
    ));

    make_data_dir(dir.path());
    fs::remove_file(dir.path().join(JsonIndexFormat::OBS_FILE_NAME)).unwrap();

    // The default observation index is optional
    let store = DataStore::from_dir(dir.path(), None, None).unwrap();
    assert!(store.obs_table().is_none());

    // A named one is not
    assert!(DataStore::from_dir(dir.path(), None, Some(Path::new("obs.json"))).is_err());
}
