//! IACT data store
//!
//! A [`DataStore`] pairs an HDU index table with an optional observation table
//! and resolves observation ids into [`Observation`] descriptors. Batch selection
//! skips observations that lack required HDUs and logs why.

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString, IntoEnumIterator};

use crate::data::hdu_index::{make_path, HduClass, HduIndexRow, HduIndexTable, HduType};
use crate::data::io::{ensure_dir, IndexFormat, JsonIndexFormat};
use crate::data::maker::{DataStoreMaker, IrfPaths};
use crate::data::obs_table::{ColumnValue, ObservationTable, TableMeta};
use crate::data::observation::{Observation, Observations};
use crate::data::{DataStoreError, ObsId};

/// IRF types an observation must provide
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequiredIrf {
    /// aeff, edisp, psf and bkg
    #[default]
    FullEnclosure,
    /// aeff and edisp
    PointLike,
    /// Nothing is mandatory
    AllOptional,
    /// An explicit set, which must only contain IRF types
    Explicit(BTreeSet<HduType>),
}

impl RequiredIrf {
    pub fn explicit(types: impl IntoIterator<Item = HduType>) -> Self {
        RequiredIrf::Explicit(types.into_iter().collect())
    }

    /// The required HDU types
    ///
    /// Fails if an explicit set names types that are not IRFs.
    pub fn hdu_types(&self) -> Result<BTreeSet<HduType>, DataStoreError> {
        let types: BTreeSet<HduType> = match self {
            RequiredIrf::FullEnclosure => [HduType::Aeff, HduType::Edisp, HduType::Psf, HduType::Bkg]
                .into_iter()
                .collect(),
            RequiredIrf::PointLike => [HduType::Aeff, HduType::Edisp].into_iter().collect(),
            RequiredIrf::AllOptional => BTreeSet::new(),
            RequiredIrf::Explicit(types) => {
                let invalid: Vec<String> = types
                    .iter()
                    .filter(|t| !t.is_irf())
                    .map(|t| t.to_string())
                    .collect();
                if !invalid.is_empty() {
                    return Err(DataStoreError::InvalidRequiredIrf {
                        value: invalid.join(", "),
                    });
                }
                types.clone()
            }
        };
        Ok(types)
    }
}

impl FromStr for RequiredIrf {
    type Err = DataStoreError;

    /// Accepts the preset names or a comma separated list of IRF types
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "full-enclosure" => Ok(RequiredIrf::FullEnclosure),
            "point-like" => Ok(RequiredIrf::PointLike),
            "all-optional" => Ok(RequiredIrf::AllOptional),
            other => {
                let mut types = BTreeSet::new();
                for tag in other.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    let hdu_type = tag.parse::<HduType>().map_err(|_| {
                        DataStoreError::InvalidRequiredIrf {
                            value: tag.to_string(),
                        }
                    })?;
                    types.insert(hdu_type);
                }
                let required = RequiredIrf::Explicit(types);
                required.hdu_types()?;
                Ok(required)
            }
        }
    }
}

/// Options for selecting a batch of observations
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationQuery {
    /// Requested ids, in order; `None` selects every id in ascending order
    pub obs_ids: Option<Vec<ObsId>>,
    /// Warn and skip unknown ids instead of failing
    pub skip_missing: bool,
    pub required_irf: RequiredIrf,
    /// Also require the events and gti HDUs
    pub require_events: bool,
    /// Boolean mask over [`DataStore::obs_ids`], or over the observation table
    /// rows for [`DataStore::get_observation_groups`]
    pub selection: Option<Vec<bool>>,
}

impl Default for ObservationQuery {
    fn default() -> Self {
        Self {
            obs_ids: None,
            skip_missing: false,
            required_irf: RequiredIrf::default(),
            require_events: true,
            selection: None,
        }
    }
}

impl ObservationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_obs_ids(mut self, obs_ids: impl Into<Vec<ObsId>>) -> Self {
        self.obs_ids = Some(obs_ids.into());
        self
    }

    pub fn with_skip_missing(mut self, skip_missing: bool) -> Self {
        self.skip_missing = skip_missing;
        self
    }

    pub fn with_required_irf(mut self, required_irf: RequiredIrf) -> Self {
        self.required_irf = required_irf;
        self
    }

    pub fn with_require_events(mut self, require_events: bool) -> Self {
        self.require_events = require_events;
        self
    }

    pub fn with_selection(mut self, selection: impl Into<Vec<bool>>) -> Self {
        self.selection = Some(selection.into());
        self
    }
}

/// What happened to each requested id during a batch selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionReport {
    /// Number of requested ids
    pub requested: usize,
    pub selected: Vec<ObsId>,
    /// Ids not present in the HDU index table
    pub unknown: Vec<ObsId>,
    /// Ids skipped for missing required HDUs, with the missing types
    pub skipped: Vec<(ObsId, Vec<HduType>)>,
    /// Ids requested more than once
    pub duplicates: Vec<ObsId>,
}

/// Options for [`DataStore::copy_obs`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyOptions {
    /// Only copy HDUs of these classes
    pub hdu_classes: Option<Vec<HduClass>>,
    pub overwrite: bool,
    /// Log every copied file at info level
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CheckLevel {
    Info,
    Warning,
    Error,
}

/// One finding of [`DataStore::check`]
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRecord {
    pub level: CheckLevel,
    /// Index table the finding refers to
    pub hdu: Option<String>,
    pub msg: String,
}

impl CheckRecord {
    fn error(hdu: Option<&str>, msg: impl Into<String>) -> Self {
        Self {
            level: CheckLevel::Error,
            hdu: hdu.map(str::to_string),
            msg: msg.into(),
        }
    }

    fn warning(hdu: Option<&str>, msg: impl Into<String>) -> Self {
        Self {
            level: CheckLevel::Warning,
            hdu: hdu.map(str::to_string),
            msg: msg.into(),
        }
    }
}

impl fmt::Display for CheckRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hdu {
            Some(hdu) => write!(f, "[{}] {}: {}", self.level, hdu, self.msg),
            None => write!(f, "[{}] {}", self.level, self.msg),
        }
    }
}

/// IACT data store
///
/// # Examples
///
/// ```
/// use gammafit_rs::data::{
///     DataStore, HduClass, HduIndexRow, HduIndexTable, HduType, ObservationQuery, RequiredIrf,
///     TableMeta,
/// };
///
/// let row = |hdu_type, hdu_class| HduIndexRow {
///     obs_id: 23523,
///     hdu_type,
///     hdu_class,
///     file_dir: "run023400-023599".to_string(),
///     file_name: "run023523.fits.gz".to_string(),
///     hdu_name: "EVENTS".to_string(),
/// };
/// let hdu_table = HduIndexTable::new(
///     vec![
///         row(HduType::Events, HduClass::Events),
///         row(HduType::Gti, HduClass::Gti),
///         row(HduType::Aeff, HduClass::Aeff2d),
///     ],
///     TableMeta::new(),
/// );
/// let store = DataStore::new(hdu_table, None);
///
/// let query = ObservationQuery::new().with_required_irf(RequiredIrf::PointLike);
/// assert!(store.get_observations(&query).unwrap().is_empty());
///
/// let obs = store.obs(23523, &RequiredIrf::AllOptional, true).unwrap();
/// assert!(obs.location(HduType::Pointing).is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataStore {
    hdu_table: HduIndexTable,
    obs_table: Option<ObservationTable>,
}

impl DataStore {
    /// Default GADF HDU index file name
    pub const DEFAULT_HDU_TABLE: &'static str = "hdu-index.fits.gz";

    /// Default GADF observation index file name
    pub const DEFAULT_OBS_TABLE: &'static str = "obs-index.fits.gz";

    pub fn new(hdu_table: HduIndexTable, obs_table: Option<ObservationTable>) -> Self {
        Self {
            hdu_table,
            obs_table,
        }
    }

    /// Read the index tables of a data directory in JSON format
    ///
    /// # Arguments
    ///
    /// * `base_dir` - Directory the `FILE_DIR` entries are relative to
    /// * `hdu_file` - HDU index file, relative to `base_dir` or absolute
    /// * `obs_file` - Observation index file, relative to `base_dir` or absolute
    pub fn from_dir(
        base_dir: impl AsRef<Path>,
        hdu_file: Option<&Path>,
        obs_file: Option<&Path>,
    ) -> Result<Self, DataStoreError> {
        Self::from_dir_with_format(base_dir, hdu_file, obs_file, &JsonIndexFormat)
    }

    /// [`DataStore::from_dir`] with a custom index format
    ///
    /// A missing HDU index is fatal. A missing observation index is fatal only
    /// when it was named explicitly.
    pub fn from_dir_with_format(
        base_dir: impl AsRef<Path>,
        hdu_file: Option<&Path>,
        obs_file: Option<&Path>,
        format: &dyn IndexFormat,
    ) -> Result<Self, DataStoreError> {
        let base_dir = make_path(&base_dir.as_ref().to_string_lossy());

        let hdu_path = match hdu_file {
            Some(file) => resolve_in(&base_dir, file),
            None => base_dir.join(format.hdu_file_name()),
        };

        let obs_path = match obs_file {
            Some(file) => {
                let path = resolve_in(&base_dir, file);
                if !path.exists() {
                    return Err(DataStoreError::FileNotFound { path });
                }
                path
            }
            None => base_dir.join(format.obs_file_name()),
        };

        if !hdu_path.exists() {
            return Err(DataStoreError::FileNotFound { path: hdu_path });
        }
        let mut hdu_table = format.read_hdu_table(&hdu_path)?;
        hdu_table.set_base_dir(&base_dir);

        let obs_table = if obs_path.exists() {
            Some(format.read_obs_table(&obs_path)?)
        } else {
            info!("Cannot find default obs-index table.");
            None
        };

        Ok(Self::new(hdu_table, obs_table))
    }

    /// Read both index tables from one combined JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DataStoreError> {
        Self::from_file_with_format(path, &JsonIndexFormat)
    }

    pub fn from_file_with_format(
        path: impl AsRef<Path>,
        format: &dyn IndexFormat,
    ) -> Result<Self, DataStoreError> {
        let path = make_path(&path.as_ref().to_string_lossy());
        let (hdu_table, obs_table) = format.read_combined(&path)?;
        Ok(Self::new(hdu_table, obs_table))
    }

    /// Build the index tables from event file headers
    ///
    /// See [`DataStoreMaker`] for how IRF files are located.
    pub fn from_events_files<P: AsRef<Path>>(
        events_paths: &[P],
        irfs_paths: IrfPaths,
    ) -> Result<Self, DataStoreError> {
        DataStoreMaker::new(events_paths, irfs_paths)?.run()
    }

    pub fn hdu_table(&self) -> &HduIndexTable {
        &self.hdu_table
    }

    pub fn obs_table(&self) -> Option<&ObservationTable> {
        self.obs_table.as_ref()
    }

    /// Sorted unique observation ids of the HDU index table
    pub fn obs_ids(&self) -> Vec<ObsId> {
        self.hdu_table.obs_ids()
    }

    /// Summary of both index tables
    pub fn info(&self) -> String {
        let mut s = String::from("Data store:\n");
        s += &self.hdu_table.summary();
        s += "\n\n";
        match &self.obs_table {
            Some(table) => s += &table.summary(),
            None => s += "No observation index table.",
        }
        s
    }

    /// Resolve one observation
    ///
    /// Every HDU type is looked up; the missing required ones are reported
    /// together. When an events HDU exists, the pointing and metadata locations
    /// point at the events HDU.
    pub fn obs(
        &self,
        obs_id: ObsId,
        required_irf: &RequiredIrf,
        require_events: bool,
    ) -> Result<Observation, DataStoreError> {
        if !self.hdu_table.rows().iter().any(|row| row.obs_id == obs_id) {
            return Err(DataStoreError::UnknownObsId { obs_id });
        }

        let mut required = required_irf.hdu_types()?;
        if require_events {
            required.insert(HduType::Events);
            required.insert(HduType::Gti);
        }

        let mut locations = BTreeMap::new();
        let mut missing = Vec::new();
        for hdu_type in HduType::iter() {
            match self.hdu_table.hdu_location(obs_id, hdu_type, false) {
                Some(location) => {
                    locations.insert(hdu_type, location);
                }
                None if required.contains(&hdu_type) => missing.push(hdu_type),
                None => {}
            }
        }

        if !missing.is_empty() {
            return Err(DataStoreError::MissingRequiredHdu { obs_id, missing });
        }

        let mut meta = None;
        if let Some(events) = locations.get(&HduType::Events).cloned() {
            locations.insert(HduType::Pointing, events.with_class(HduClass::Pointing));
            meta = Some(events.with_class(HduClass::ObservationMetadata));
        }

        Ok(Observation::new(obs_id, locations, meta))
    }

    /// Resolve a batch of observations
    ///
    /// Observations lacking required HDUs are skipped with a warning.
    pub fn get_observations(&self, query: &ObservationQuery) -> Result<Observations, DataStoreError> {
        self.get_observations_with_report(query)
            .map(|(observations, _)| observations)
    }

    /// [`DataStore::get_observations`], also reporting what was skipped
    pub fn get_observations_with_report(
        &self,
        query: &ObservationQuery,
    ) -> Result<(Observations, SelectionReport), DataStoreError> {
        let all_ids = self.obs_ids();
        let allowed = match &query.selection {
            Some(mask) => apply_mask(&all_ids, mask)?,
            None => all_ids.clone(),
        };

        let mut report = SelectionReport::default();
        let candidates: Vec<ObsId> = match &query.obs_ids {
            None => allowed,
            Some(ids) => {
                for &id in ids {
                    if all_ids.binary_search(&id).is_err() {
                        if query.skip_missing {
                            warn!("Skipping missing obs_id: {}", id);
                            report.unknown.push(id);
                        } else {
                            return Err(DataStoreError::UnknownObsId { obs_id: id });
                        }
                    }
                }

                report.duplicates = duplicates(ids);
                if !report.duplicates.is_empty() {
                    warn!(
                        "List of obs_id is not unique! Multiples are: {:?}",
                        report.duplicates
                    );
                }

                ids.iter()
                    .copied()
                    .filter(|id| allowed.binary_search(id).is_ok())
                    .collect()
            }
        };
        report.requested = query.obs_ids.as_ref().map_or(candidates.len(), Vec::len);

        let mut observations = Vec::with_capacity(candidates.len());
        for id in candidates {
            match self.obs(id, &query.required_irf, query.require_events) {
                Ok(observation) => {
                    report.selected.push(id);
                    observations.push(observation);
                }
                Err(err) if err.is_missing_hdu() => {
                    warn!("Skipping run with missing HDUs; {}", err);
                    if let DataStoreError::MissingRequiredHdu { missing, .. } = err {
                        report.skipped.push((id, missing));
                    }
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            "Observations selected: {} out of {}.",
            observations.len(),
            report.requested
        );
        Ok((Observations::new(observations), report))
    }

    /// Resolve observations grouped by the value of an observation table column
    ///
    /// Groups are keyed `"{key}_{value}"` and come in ascending value order.
    /// Here `query.selection` masks the observation table rows, in table order.
    pub fn get_observation_groups(
        &self,
        key: &str,
        query: &ObservationQuery,
    ) -> Result<Vec<(String, Observations)>, DataStoreError> {
        let obs_table = self.obs_table.as_ref().ok_or(DataStoreError::MissingObsTable)?;

        let mut table = obs_table.clone();
        let mut obs_ids = query.obs_ids.clone();
        if let Some(mask) = &query.selection {
            table = obs_table.mask(mask)?;
            let allowed = table.obs_ids();
            obs_ids = obs_ids.map(|ids| ids.into_iter().filter(|id| allowed.contains(id)).collect());
        }
        if let Some(ids) = &obs_ids {
            table = table.select_obs_id(ids);
        }

        let mut groups = Vec::new();
        for (value, group) in table.group_by(key)? {
            let group_query = ObservationQuery {
                obs_ids: Some(group.obs_ids()),
                selection: None,
                ..query.clone()
            };
            groups.push((format!("{}_{}", key, value), self.get_observations(&group_query)?));
        }
        Ok(groups)
    }

    /// Copy a subset of observations into a new data store directory
    ///
    /// Files keep their `FILE_DIR` structure under `outdir`; absolute
    /// directories are re-rooted there. Index tables for the subset are written
    /// in JSON format.
    pub fn copy_obs(
        &self,
        obs_ids: &[ObsId],
        outdir: impl AsRef<Path>,
        options: &CopyOptions,
    ) -> Result<(), DataStoreError> {
        self.copy_obs_with_format(obs_ids, outdir, options, &JsonIndexFormat)
    }

    pub fn copy_obs_with_format(
        &self,
        obs_ids: &[ObsId],
        outdir: impl AsRef<Path>,
        options: &CopyOptions,
        format: &dyn IndexFormat,
    ) -> Result<(), DataStoreError> {
        let outdir = make_path(&outdir.as_ref().to_string_lossy());
        if !outdir.is_dir() {
            return Err(DataStoreError::NotADirectory { path: outdir });
        }

        let mut subset = self.hdu_table.select_obs_id(obs_ids);
        if let Some(classes) = &options.hdu_classes {
            subset = subset.select_hdu_class(classes);
        }

        let mut copied = BTreeSet::new();
        for idx in 0..subset.len() {
            let Some(location) = subset.location_info(idx) else {
                continue;
            };
            let target_dir = outdir.join(relative_dir(&location.file_dir));
            let target = target_dir.join(&location.file_name);
            if !copied.insert(target.clone()) {
                continue;
            }

            ensure_dir(&target_dir)?;
            if target.exists() && !options.overwrite {
                debug!("Not overwriting {}", target.display());
                continue;
            }

            let source = location.path();
            fs::copy(&source, &target)?;
            if options.verbose {
                info!("'{}' -> '{}'", source.display(), target.display());
            }
        }

        let mut meta = subset.meta().clone();
        meta.remove("BASE_DIR");
        let rows = subset
            .rows()
            .iter()
            .map(|row| HduIndexRow {
                file_dir: relative_dir(&row.file_dir),
                ..row.clone()
            })
            .collect();
        let hdu_table = HduIndexTable::new(rows, meta);
        format.write_hdu_table(
            &hdu_table,
            &outdir.join(format.hdu_file_name()),
            options.overwrite,
        )?;

        if let Some(obs_table) = &self.obs_table {
            format.write_obs_table(
                &obs_table.select_obs_id(obs_ids),
                &outdir.join(format.obs_file_name()),
                options.overwrite,
            )?;
        }
        Ok(())
    }

    /// Write the index tables into `outdir` in JSON format
    pub fn write(&self, outdir: impl AsRef<Path>, overwrite: bool) -> Result<(), DataStoreError> {
        self.write_with_format(outdir, overwrite, &JsonIndexFormat)
    }

    pub fn write_with_format(
        &self,
        outdir: impl AsRef<Path>,
        overwrite: bool,
        format: &dyn IndexFormat,
    ) -> Result<(), DataStoreError> {
        let outdir = outdir.as_ref();
        ensure_dir(outdir)?;
        format.write_hdu_table(&self.hdu_table, &outdir.join(format.hdu_file_name()), overwrite)?;
        if let Some(obs_table) = &self.obs_table {
            format.write_obs_table(obs_table, &outdir.join(format.obs_file_name()), overwrite)?;
        }
        Ok(())
    }

    /// Check the index tables and the referenced files
    pub fn check(&self) -> Vec<CheckRecord> {
        let mut records = Vec::new();

        match &self.obs_table {
            Some(table) => check_index_meta(table.meta(), "obs-index", "OBS", &mut records),
            None => records.push(CheckRecord::warning(
                Some("obs-index"),
                "No observation index table",
            )),
        }

        let hdu_table = &self.hdu_table;
        check_index_meta(hdu_table.meta(), "hdu-index", "HDU", &mut records);

        let mut seen = BTreeSet::new();
        for (idx, row) in hdu_table.rows().iter().enumerate() {
            if !seen.insert((row.obs_id, row.hdu_type)) {
                records.push(CheckRecord::warning(
                    Some("hdu-index"),
                    format!(
                        "Multiple rows for OBS_ID = {}, HDU_TYPE = {}",
                        row.obs_id, row.hdu_type
                    ),
                ));
            }
            if let Some(location) = hdu_table.location_info(idx) {
                let path = location.path();
                if !path.exists() {
                    records.push(CheckRecord::error(
                        None,
                        format!(
                            "HDU not found: OBS_ID = {}, HDU_TYPE = {}, file {} (HDU {})",
                            row.obs_id,
                            row.hdu_type,
                            path.display(),
                            row.hdu_name
                        ),
                    ));
                }
            }
        }

        if let Some(obs_table) = &self.obs_table {
            let obs_ids: BTreeSet<ObsId> = obs_table.obs_ids().into_iter().collect();
            let hdu_ids: BTreeSet<ObsId> = hdu_table.obs_ids().into_iter().collect();
            if obs_ids != hdu_ids {
                records.push(CheckRecord::error(
                    None,
                    "Inconsistent OBS_ID in obs and HDU index tables",
                ));
            }
        }

        records
    }
}

impl fmt::Display for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info())
    }
}

fn resolve_in(base_dir: &Path, file: &Path) -> PathBuf {
    let file = make_path(&file.to_string_lossy());
    let joined = base_dir.join(&file);
    if joined.exists() {
        joined
    } else {
        file
    }
}

fn apply_mask(obs_ids: &[ObsId], mask: &[bool]) -> Result<Vec<ObsId>, DataStoreError> {
    if mask.len() != obs_ids.len() {
        return Err(DataStoreError::SelectionLength {
            expected: obs_ids.len(),
            got: mask.len(),
        });
    }
    Ok(obs_ids
        .iter()
        .zip(mask)
        .filter(|&(_, &keep)| keep)
        .map(|(&id, _)| id)
        .collect())
}

fn duplicates(ids: &[ObsId]) -> Vec<ObsId> {
    let mut counts: BTreeMap<ObsId, usize> = BTreeMap::new();
    for &id in ids {
        *counts.entry(id).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|&(_, n)| n > 1)
        .map(|(id, _)| id)
        .collect()
}

/// Normal components of `dir` joined with `/`, dropping roots and `..`
fn relative_dir(dir: &str) -> String {
    Path::new(dir)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn check_index_meta(
    meta: &TableMeta,
    hdu: &str,
    clas2: &str,
    records: &mut Vec<CheckRecord>,
) {
    let value = |key: &str| meta.get(key).and_then(ColumnValue::as_str).unwrap_or("");
    if value("HDUCLAS1") != "INDEX" {
        records.push(CheckRecord::error(
            Some(hdu),
            "Invalid header key. Must have HDUCLAS1=INDEX",
        ));
    }
    if value("HDUCLAS2") != clas2 {
        records.push(CheckRecord::error(
            Some(hdu),
            format!("Invalid header key. Must have HDUCLAS2={}", clas2),
        ));
    }
}
