//! HDU index table
//!
//! The HDU index table locates every HDU of every observation: one row per
//! (observation, HDU type) with the file directory, file name and HDU name.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::data::obs_table::{ColumnValue, TableMeta};
use crate::data::{DataStoreError, ObsId};

/// Logical HDU type of an index row
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    Display,
    AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HduType {
    Events,
    Gti,
    Pointing,
    Aeff,
    Edisp,
    Psf,
    Bkg,
    RadMax,
}

impl HduType {
    /// HDU types holding instrument response functions
    pub const IRFS: [HduType; 5] = [
        HduType::Aeff,
        HduType::Edisp,
        HduType::Psf,
        HduType::Bkg,
        HduType::RadMax,
    ];

    pub fn is_irf(self) -> bool {
        Self::IRFS.contains(&self)
    }

    /// Parse a type tag such as `"edisp"`
    pub fn parse(value: &str) -> Result<Self, DataStoreError> {
        value
            .parse()
            .map_err(|_| DataStoreError::InvalidHduType {
                value: value.to_string(),
            })
    }
}

/// Format class of an HDU
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    Display,
    AsRefStr,
)]
pub enum HduClass {
    #[strum(serialize = "events")]
    #[serde(rename = "events")]
    Events,
    #[strum(serialize = "gti")]
    #[serde(rename = "gti")]
    Gti,
    #[strum(serialize = "pointing")]
    #[serde(rename = "pointing")]
    Pointing,
    #[strum(serialize = "aeff_2d")]
    #[serde(rename = "aeff_2d")]
    Aeff2d,
    #[strum(serialize = "edisp_2d")]
    #[serde(rename = "edisp_2d")]
    Edisp2d,
    #[strum(serialize = "edisp_kernel")]
    #[serde(rename = "edisp_kernel")]
    EdispKernel,
    #[strum(serialize = "psf_table")]
    #[serde(rename = "psf_table")]
    PsfTable,
    #[strum(serialize = "psf_3gauss")]
    #[serde(rename = "psf_3gauss")]
    Psf3Gauss,
    #[strum(serialize = "psf_king")]
    #[serde(rename = "psf_king")]
    PsfKing,
    #[strum(serialize = "bkg_2d")]
    #[serde(rename = "bkg_2d")]
    Bkg2d,
    #[strum(serialize = "bkg_3d")]
    #[serde(rename = "bkg_3d")]
    Bkg3d,
    #[strum(serialize = "rad_max_2d")]
    #[serde(rename = "rad_max_2d")]
    RadMax2d,
    /// Observation metadata read from the events header
    #[strum(serialize = "observation_metadata")]
    #[serde(rename = "observation_metadata")]
    ObservationMetadata,
}

impl HduClass {
    pub fn parse(value: &str) -> Result<Self, DataStoreError> {
        value
            .parse()
            .map_err(|_| DataStoreError::InvalidHduClass {
                value: value.to_string(),
            })
    }
}

/// Expand `$VAR` and `${VAR}` environment references in a path
///
/// Unset variables are left as written.
pub fn make_path(path: &str) -> PathBuf {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    PathBuf::from(out)
}

/// Location of one HDU on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HduLocation {
    pub obs_id: ObsId,
    pub hdu_type: HduType,
    pub hdu_class: HduClass,
    pub base_dir: PathBuf,
    pub file_dir: String,
    pub file_name: String,
    pub hdu_name: String,
}

impl HduLocation {
    /// Full file path, `base_dir / file_dir / file_name`, environment expanded
    pub fn path(&self) -> PathBuf {
        let joined = self.base_dir.join(&self.file_dir).join(&self.file_name);
        make_path(&joined.to_string_lossy())
    }

    /// Copy of this location tagged with another class
    pub fn with_class(&self, hdu_class: HduClass) -> HduLocation {
        HduLocation {
            hdu_class,
            ..self.clone()
        }
    }
}

/// One row of the HDU index table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct HduIndexRow {
    pub obs_id: ObsId,
    pub hdu_type: HduType,
    pub hdu_class: HduClass,
    pub file_dir: String,
    pub file_name: String,
    pub hdu_name: String,
}

/// HDU index table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HduIndexTable {
    rows: Vec<HduIndexRow>,
    #[serde(default)]
    meta: TableMeta,
}

impl HduIndexTable {
    pub fn new(rows: Vec<HduIndexRow>, meta: TableMeta) -> Self {
        Self { rows, meta }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[HduIndexRow] {
        &self.rows
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut TableMeta {
        &mut self.meta
    }

    /// Directory the `FILE_DIR` entries are relative to (`BASE_DIR` keyword)
    pub fn base_dir(&self) -> PathBuf {
        self.meta
            .get("BASE_DIR")
            .and_then(ColumnValue::as_str)
            .map(make_path)
            .unwrap_or_default()
    }

    pub fn set_base_dir(&mut self, base_dir: &Path) {
        self.meta.insert(
            "BASE_DIR".to_string(),
            ColumnValue::Text(base_dir.to_string_lossy().into_owned()),
        );
    }

    /// Indices of the rows matching the observation and the given type or class
    pub fn row_indices(
        &self,
        obs_id: ObsId,
        hdu_type: Option<HduType>,
        hdu_class: Option<HduClass>,
    ) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                row.obs_id == obs_id
                    && hdu_type.map_or(true, |t| row.hdu_type == t)
                    && hdu_class.map_or(true, |c| row.hdu_class == c)
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Locate the HDU of one type for one observation
    ///
    /// Returns `None` when no row matches, warning first if `warn_missing` is
    /// set. With several matching rows the first one is returned.
    pub fn hdu_location(
        &self,
        obs_id: ObsId,
        hdu_type: HduType,
        warn_missing: bool,
    ) -> Option<HduLocation> {
        self.find_location(obs_id, Some(hdu_type), None, warn_missing)
    }

    /// Locate the HDU of one class for one observation
    pub fn hdu_location_by_class(
        &self,
        obs_id: ObsId,
        hdu_class: HduClass,
        warn_missing: bool,
    ) -> Option<HduLocation> {
        self.find_location(obs_id, None, Some(hdu_class), warn_missing)
    }

    fn find_location(
        &self,
        obs_id: ObsId,
        hdu_type: Option<HduType>,
        hdu_class: Option<HduClass>,
        warn_missing: bool,
    ) -> Option<HduLocation> {
        let indices = self.row_indices(obs_id, hdu_type, hdu_class);
        match indices.as_slice() {
            [] => {
                if warn_missing {
                    warn!(
                        "No HDU found matching: OBS_ID = {}, HDU_TYPE = {:?}, HDU_CLASS = {:?}",
                        obs_id, hdu_type, hdu_class
                    );
                }
                None
            }
            [idx] => self.location_info(*idx),
            [idx, ..] => {
                let row = &self.rows[*idx];
                warn!(
                    "Found multiple HDU matching: OBS_ID = {}, HDU_TYPE = {:?}, HDU_CLASS = {:?}. \
                     Returning the first entry, which has HDU_TYPE = {} and HDU_CLASS = {}",
                    obs_id, hdu_type, hdu_class, row.hdu_type, row.hdu_class
                );
                self.location_info(*idx)
            }
        }
    }

    /// Location of the HDU described by row `idx`
    pub fn location_info(&self, idx: usize) -> Option<HduLocation> {
        let row = self.rows.get(idx)?;
        Some(HduLocation {
            obs_id: row.obs_id,
            hdu_type: row.hdu_type,
            hdu_class: row.hdu_class,
            base_dir: self.base_dir(),
            file_dir: row.file_dir.clone(),
            file_name: row.file_name.clone(),
            hdu_name: row.hdu_name.clone(),
        })
    }

    /// Sorted unique observation ids
    pub fn obs_ids(&self) -> Vec<ObsId> {
        self.rows
            .iter()
            .map(|row| row.obs_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn hdu_types(&self) -> Vec<HduType> {
        self.rows
            .iter()
            .map(|row| row.hdu_type)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn hdu_classes(&self) -> Vec<HduClass> {
        self.rows
            .iter()
            .map(|row| row.hdu_class)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows belonging to the given observations
    pub fn select_obs_id(&self, obs_ids: &[ObsId]) -> HduIndexTable {
        self.filtered(|row| obs_ids.contains(&row.obs_id))
    }

    /// Rows of the given HDU classes
    pub fn select_hdu_class(&self, hdu_classes: &[HduClass]) -> HduIndexTable {
        self.filtered(|row| hdu_classes.contains(&row.hdu_class))
    }

    fn filtered(&self, keep: impl Fn(&HduIndexRow) -> bool) -> HduIndexTable {
        HduIndexTable {
            rows: self.rows.iter().filter(|&row| keep(row)).cloned().collect(),
            meta: self.meta.clone(),
        }
    }

    /// Short text summary
    pub fn summary(&self) -> String {
        let obs_ids = self.obs_ids();
        let join = |items: Vec<String>| items.join("', '");

        let mut s = String::from("HDU index table:\n");
        s += &format!("BASE_DIR: {}\n", self.base_dir().display());
        s += &format!("Rows: {}\n", self.rows.len());
        if let (Some(first), Some(last)) = (obs_ids.first(), obs_ids.last()) {
            s += &format!("OBS_ID: {} -- {}\n", first, last);
        }
        s += &format!(
            "HDU_TYPE: ['{}']\n",
            join(self.hdu_types().iter().map(|t| t.to_string()).collect())
        );
        s += &format!(
            "HDU_CLASS: ['{}']\n",
            join(self.hdu_classes().iter().map(|c| c.to_string()).collect())
        );
        s
    }
}
