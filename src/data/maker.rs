//! Building index tables from event files
//!
//! [`DataStoreMaker`] reads the `EVENTS` header of every event file and
//! produces one observation table row and six HDU index rows per file. IRF
//! files are taken from an explicit path, from the CALDB directory named in the
//! header, or assumed to live in the events file itself.

use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::coords::{GalacticTransform, SkyTransform};
use crate::data::data_store::DataStore;
use crate::data::hdu_index::{make_path, HduClass, HduIndexRow, HduIndexTable, HduType};
use crate::data::io::{Header, HeaderReader, JsonHeaderReader};
use crate::data::obs_table::{ColumnValue, ObsRow, ObservationTable, TableMeta};
use crate::data::{DataStoreError, ObsId};

const NA_INT: i64 = -1;
const NA_STR: &str = "NOT AVAILABLE";

/// GADF documentation URL written to the index table headers
pub const HDUDOC: &str = "https://github.com/open-gamma-ray-astro/gamma-astro-data-formats";

/// GADF format version written to the index table headers
pub const HDUVERS: &str = "0.2";

/// IRF files to pair with the events files
#[derive(Debug, Clone, Default, PartialEq)]
pub enum IrfPaths {
    /// Use CALDB header keywords, or the events file itself
    #[default]
    None,
    /// One IRF file shared by every events file
    Single(PathBuf),
    /// One IRF file per events file
    PerEvent(Vec<PathBuf>),
}

/// Telescope pointing read from the events header
#[derive(Debug, Clone, PartialEq)]
pub enum PointingInfo {
    /// Tracking observation, equatorial pointing with derived galactic position
    Radec {
        ra: f64,
        dec: f64,
        glon: f64,
        glat: f64,
    },
    /// Drift scan, horizontal pointing
    Drift { alt: f64, az: f64, zen: f64 },
}

/// Time reference keywords, which must agree between all observations of a store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeInfo {
    pub mjdrefi: ColumnValue,
    pub mjdreff: ColumnValue,
    pub timeunit: ColumnValue,
    pub timesys: ColumnValue,
    pub timeref: ColumnValue,
}

impl TimeInfo {
    pub const KEYWORDS: [&'static str; 5] = ["MJDREFI", "MJDREFF", "TIMEUNIT", "TIMESYS", "TIMEREF"];

    fn from_header(header: &Header) -> Self {
        let get = |key: &str| header.get(key).cloned().unwrap_or(ColumnValue::Null);
        Self {
            mjdrefi: get("MJDREFI"),
            mjdreff: get("MJDREFF"),
            timeunit: get("TIMEUNIT"),
            timesys: get("TIMESYS"),
            timeref: get("TIMEREF"),
        }
    }

    fn values(&self) -> [&ColumnValue; 5] {
        [
            &self.mjdrefi,
            &self.mjdreff,
            &self.timeunit,
            &self.timesys,
            &self.timeref,
        ]
    }
}

/// Header information of one events file
#[derive(Debug, Clone, PartialEq)]
pub struct EventsInfo {
    pub obs_id: ObsId,
    /// Start time in seconds
    pub tstart: f64,
    pub tstop: f64,
    pub ontime: f64,
    pub livetime: f64,
    pub deadc: f64,
    pub telescop: String,
    pub pointing: PointingInfo,
    pub date_obs: String,
    pub time_obs: String,
    pub date_end: String,
    pub time_end: String,
    pub n_tels: i64,
    pub object: String,
    pub events_filename: String,
    pub event_count: i64,
    pub caldb: String,
    pub irf: String,
    pub irf_filename: String,
    pub time: TimeInfo,
}

impl EventsInfo {
    /// Observation table row, with the column names in table order
    pub fn to_row(&self) -> (Vec<String>, ObsRow) {
        let mut cells: Vec<(&str, ColumnValue)> = vec![
            ("OBS_ID", self.obs_id.into()),
            ("TSTART", self.tstart.into()),
            ("TSTOP", self.tstop.into()),
            ("ONTIME", self.ontime.into()),
            ("LIVETIME", self.livetime.into()),
            ("DEADC", self.deadc.into()),
            ("TELESCOP", self.telescop.as_str().into()),
        ];
        match &self.pointing {
            PointingInfo::Radec { ra, dec, glon, glat } => cells.extend([
                ("RA_PNT", (*ra).into()),
                ("DEC_PNT", (*dec).into()),
                ("GLON_PNT", (*glon).into()),
                ("GLAT_PNT", (*glat).into()),
            ]),
            PointingInfo::Drift { alt, az, zen } => cells.extend([
                ("ALT_PNT", (*alt).into()),
                ("AZ_PNT", (*az).into()),
                ("ZEN_PNT", (*zen).into()),
            ]),
        }
        cells.extend([
            ("DATE-OBS", self.date_obs.as_str().into()),
            ("TIME-OBS", self.time_obs.as_str().into()),
            ("DATE-END", self.date_end.as_str().into()),
            ("TIME-END", self.time_end.as_str().into()),
            ("N_TELS", self.n_tels.into()),
            ("OBJECT", self.object.as_str().into()),
            ("EVENTS_FILENAME", self.events_filename.as_str().into()),
            ("EVENT_COUNT", self.event_count.into()),
            ("CALDB", self.caldb.as_str().into()),
            ("IRF", self.irf.as_str().into()),
            ("IRF_FILENAME", self.irf_filename.as_str().into()),
        ]);
        for (key, value) in TimeInfo::KEYWORDS.into_iter().zip(self.time.values()) {
            cells.push((key, value.clone()));
        }

        let names = cells.iter().map(|(k, _)| k.to_string()).collect();
        let row = cells
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        (names, row)
    }
}

/// IRF file lookup following the CALDB directory convention
#[derive(Debug, Clone, PartialEq)]
pub struct CalDbIrf {
    pub telescop: String,
    pub caldb: String,
    pub irf: String,
}

impl CalDbIrf {
    /// `{root}/data/{telescop}/{caldb}/bcf/{irf}`, with the telescope lower-cased
    pub fn file_dir(&self, root: &str) -> String {
        format!(
            "{}/data/{}/{}/bcf/{}",
            root,
            self.telescop.to_lowercase(),
            self.caldb,
            self.irf
        )
    }

    /// First file of the IRF directory, in name order
    pub fn file_path(&self, root: &str) -> Result<String, DataStoreError> {
        let dir = self.file_dir(root);
        let expanded = make_path(&dir);
        let entries = fs::read_dir(&expanded).map_err(|_| DataStoreError::CaldbNotFound {
            path: expanded.clone(),
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        let name = names
            .into_iter()
            .next()
            .ok_or(DataStoreError::CaldbNotFound { path: expanded })?;
        Ok(format!("{}/{}", dir, name))
    }
}

/// Builder of data store index tables
///
/// # Examples
///
/// ```
/// use gammafit_rs::data::{ColumnValue, DataStoreMaker, Header, IrfPaths, MemoryHeaderReader};
///
/// let mut header = Header::new();
/// header.insert("OBS_ID".to_string(), ColumnValue::Int(110380));
/// header.insert("TSTART".to_string(), ColumnValue::Float(0.0));
/// header.insert("TSTOP".to_string(), ColumnValue::Float(100.0));
/// header.insert("RA_PNT".to_string(), ColumnValue::Float(83.6));
/// header.insert("DEC_PNT".to_string(), ColumnValue::Float(22.0));
///
/// let reader = MemoryHeaderReader::new().with_header("events_110380.fits", "EVENTS", header);
/// let store = DataStoreMaker::new(&["events_110380.fits"], IrfPaths::None)
///     .unwrap()
///     .with_header_reader(reader)
///     .run()
///     .unwrap();
///
/// assert_eq!(store.obs_ids(), vec![110380]);
/// assert_eq!(store.hdu_table().len(), 6);
/// ```
pub struct DataStoreMaker {
    events_paths: Vec<PathBuf>,
    irfs_paths: Vec<Option<PathBuf>>,
    caldb: String,
    reader: Box<dyn HeaderReader>,
    sky: Box<dyn SkyTransform>,
    cache: HashMap<PathBuf, EventsInfo>,
}

impl DataStoreMaker {
    /// Create a maker for the given events files
    ///
    /// With [`IrfPaths::PerEvent`] there must be exactly one IRF path per events file.
    pub fn new<P: AsRef<Path>>(events_paths: &[P], irfs_paths: IrfPaths) -> Result<Self, DataStoreError> {
        if events_paths.is_empty() {
            return Err(DataStoreError::NoEventsFiles);
        }
        let events_paths: Vec<PathBuf> = events_paths
            .iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();

        let irfs_paths = match irfs_paths {
            IrfPaths::None => vec![None; events_paths.len()],
            IrfPaths::Single(path) => vec![Some(path); events_paths.len()],
            IrfPaths::PerEvent(paths) => {
                if paths.len() != events_paths.len() {
                    return Err(DataStoreError::IrfPathCount {
                        expected: events_paths.len(),
                        got: paths.len(),
                    });
                }
                paths.into_iter().map(Some).collect()
            }
        };

        Ok(Self {
            events_paths,
            irfs_paths,
            caldb: "$CALDB".to_string(),
            reader: Box::new(JsonHeaderReader),
            sky: Box::new(GalacticTransform),
            cache: HashMap::new(),
        })
    }

    /// Use an explicit CALDB root instead of the `CALDB` environment variable
    pub fn with_caldb(mut self, root: impl AsRef<Path>) -> Self {
        self.caldb = root.as_ref().to_string_lossy().into_owned();
        self
    }

    pub fn with_header_reader(mut self, reader: impl HeaderReader + 'static) -> Self {
        self.reader = Box::new(reader);
        self.cache.clear();
        self
    }

    pub fn with_sky_transform(mut self, sky: impl SkyTransform + 'static) -> Self {
        self.sky = Box::new(sky);
        self.cache.clear();
        self
    }

    /// Build both index tables
    pub fn run(mut self) -> Result<DataStore, DataStoreError> {
        let hdu_table = self.make_hdu_table()?;
        let obs_table = self.make_obs_table()?;
        Ok(DataStore::new(hdu_table, Some(obs_table)))
    }

    /// Header information of one events file, read once and cached
    pub fn get_events_info(
        &mut self,
        events_path: &Path,
        irf_path: Option<&Path>,
    ) -> Result<&EventsInfo, DataStoreError> {
        if !self.cache.contains_key(events_path) {
            let info = Self::read_events_info(
                self.reader.as_ref(),
                self.sky.as_ref(),
                &self.caldb,
                events_path,
                irf_path,
            )?;
            self.cache.insert(events_path.to_path_buf(), info);
        }
        self.cached(events_path)
    }

    fn cached(&self, events_path: &Path) -> Result<&EventsInfo, DataStoreError> {
        self.cache
            .get(events_path)
            .ok_or_else(|| DataStoreError::FileNotFound {
                path: events_path.to_path_buf(),
            })
    }

    /// Read all uncached headers in parallel
    fn prefetch(&mut self) -> Result<(), DataStoreError> {
        let pending: Vec<(&PathBuf, Option<&PathBuf>)> = self
            .events_paths
            .iter()
            .zip(&self.irfs_paths)
            .filter(|(events, _)| !self.cache.contains_key(events.as_path()))
            .map(|(events, irf)| (events, irf.as_ref()))
            .collect();

        let reader = self.reader.as_ref();
        let sky = self.sky.as_ref();
        let caldb = self.caldb.as_str();
        let infos: Vec<Result<(PathBuf, EventsInfo), DataStoreError>> = pending
            .par_iter()
            .map(|(events, irf)| {
                Self::read_events_info(reader, sky, caldb, events, irf.map(|p| p.as_path()))
                    .map(|info| ((*events).clone(), info))
            })
            .collect();

        for result in infos {
            let (path, info) = result?;
            self.cache.entry(path).or_insert(info);
        }
        Ok(())
    }

    /// Read the mandatory and optional `EVENTS` header information of one file
    ///
    /// `ONTIME` defaults to `TSTOP - TSTART`, `DEADC` to 1 and `LIVETIME` to
    /// `ONTIME * DEADC`. Optional keywords missing from the header are filled with
    /// `-1` or `"NOT AVAILABLE"`.
    pub fn read_events_info(
        reader: &dyn HeaderReader,
        sky: &dyn SkyTransform,
        caldb_root: &str,
        events_path: &Path,
        irf_path: Option<&Path>,
    ) -> Result<EventsInfo, DataStoreError> {
        debug!("Reading {}", events_path.display());
        let header = reader.read_header(events_path, "EVENTS")?;
        let keys = HeaderKeys {
            header: &header,
            path: events_path,
        };

        let obs_id = keys.required_int("OBS_ID")?;
        let tstart = keys.required_f64("TSTART")?;
        let tstop = keys.required_f64("TSTOP")?;
        let ontime = keys.optional_f64("ONTIME")?.unwrap_or(tstop - tstart);
        let deadc = keys.optional_f64("DEADC")?.unwrap_or(1.0);
        let livetime = keys.optional_f64("LIVETIME")?.unwrap_or(ontime * deadc);
        let telescop = keys.text_or("TELESCOP", NA_STR);

        let pointing = if keys.text_or("OBS_MODE", "POINTING") == "DRIFT" {
            let alt = keys.required_f64("ALT_PNT")?;
            let az = keys.required_f64("AZ_PNT")?;
            PointingInfo::Drift {
                alt,
                az,
                zen: 90.0 - alt,
            }
        } else {
            let ra = keys.required_f64("RA_PNT")?;
            let dec = keys.required_f64("DEC_PNT")?;
            let (glon, glat) = sky.icrs_to_galactic(ra, dec);
            PointingInfo::Radec { ra, dec, glon, glat }
        };

        let hyphenated = ["DATE-OBS", "TIME-OBS", "DATE-END", "TIME-END"];
        let date_keys = if hyphenated.iter().all(|k| header.contains_key(*k)) {
            hyphenated
        } else {
            ["DATE_OBS", "TIME_OBS", "DATE_END", "TIME_END"]
        };
        let [date_obs, time_obs, date_end, time_end] = date_keys.map(|k| keys.text_or(k, NA_STR));

        let events_filename = events_path.to_string_lossy().into_owned();
        let caldb = keys.text_or("CALDB", NA_STR);
        let irf = keys.text_or("IRF", NA_STR);
        let irf_filename = match irf_path {
            Some(path) => path.to_string_lossy().into_owned(),
            None if caldb != NA_STR && irf != NA_STR => CalDbIrf {
                telescop: telescop.clone(),
                caldb: caldb.clone(),
                irf: irf.clone(),
            }
            .file_path(caldb_root)?,
            None => events_filename.clone(),
        };

        Ok(EventsInfo {
            obs_id,
            tstart,
            tstop,
            ontime,
            livetime,
            deadc,
            telescop,
            pointing,
            date_obs,
            time_obs,
            date_end,
            time_end,
            n_tels: keys.int_or("N_TELS", NA_INT),
            object: keys.text_or("OBJECT", NA_STR),
            events_filename,
            event_count: keys.int_or("NAXIS2", NA_INT),
            caldb,
            irf,
            irf_filename,
            time: TimeInfo::from_header(&header),
        })
    }

    /// Observation index table, one row per events file
    ///
    /// Fails if the time reference keywords differ between files.
    pub fn make_obs_table(&mut self) -> Result<ObservationTable, DataStoreError> {
        self.prefetch()?;

        let mut rows = Vec::with_capacity(self.events_paths.len());
        let mut times: Vec<&TimeInfo> = Vec::with_capacity(self.events_paths.len());
        for events_path in &self.events_paths {
            let info = self.cached(events_path)?;
            rows.push(info.to_row());
            times.push(&info.time);
        }

        if times.windows(2).any(|pair| pair[0] != pair[1]) {
            return Err(DataStoreError::InconsistentTimeInfo);
        }

        let mut meta = TableMeta::new();
        if let Some(time) = times.first() {
            for (key, value) in TimeInfo::KEYWORDS.iter().zip(time.values()) {
                meta.insert(key.to_string(), value.clone());
            }
        }
        insert_gadf_meta(&mut meta, "OBS");

        Ok(ObservationTable::from_rows(rows, meta))
    }

    /// HDU index table, six rows per events file
    pub fn make_hdu_table(&mut self) -> Result<HduIndexTable, DataStoreError> {
        self.prefetch()?;

        let mut rows = Vec::with_capacity(6 * self.events_paths.len());
        for events_path in &self.events_paths {
            let info = self.cached(events_path)?;
            rows.extend(Self::hdu_table_rows(events_path, info));
        }

        let mut meta = TableMeta::new();
        insert_gadf_meta(&mut meta, "HDU");
        Ok(HduIndexTable::new(rows, meta))
    }

    fn hdu_table_rows(events_path: &Path, info: &EventsInfo) -> Vec<HduIndexRow> {
        let (events_dir, events_name) = split_path(events_path);
        let (irf_dir, irf_name) = split_path(Path::new(&info.irf_filename));

        let row = |hdu_type, hdu_class, hdu_name: &str, dir: &str, name: &str| HduIndexRow {
            obs_id: info.obs_id,
            hdu_type,
            hdu_class,
            file_dir: dir.to_string(),
            file_name: name.to_string(),
            hdu_name: hdu_name.to_string(),
        };

        vec![
            row(HduType::Events, HduClass::Events, "EVENTS", &events_dir, &events_name),
            row(HduType::Gti, HduClass::Gti, "GTI", &events_dir, &events_name),
            row(HduType::Aeff, HduClass::Aeff2d, "EFFECTIVE AREA", &irf_dir, &irf_name),
            row(HduType::Edisp, HduClass::Edisp2d, "ENERGY DISPERSION", &irf_dir, &irf_name),
            row(HduType::Psf, HduClass::Psf3Gauss, "POINT SPREAD FUNCTION", &irf_dir, &irf_name),
            row(HduType::Bkg, HduClass::Bkg3d, "BACKGROUND", &irf_dir, &irf_name),
        ]
    }
}

fn split_path(path: &Path) -> (String, String) {
    let dir = path
        .parent()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (dir, name)
}

fn insert_gadf_meta(meta: &mut TableMeta, clas2: &str) {
    meta.insert("HDUCLASS".to_string(), "GADF".into());
    meta.insert("HDUDOC".to_string(), HDUDOC.into());
    meta.insert("HDUVERS".to_string(), HDUVERS.into());
    meta.insert("HDUCLAS1".to_string(), "INDEX".into());
    meta.insert("HDUCLAS2".to_string(), clas2.into());
}

struct HeaderKeys<'a> {
    header: &'a Header,
    path: &'a Path,
}

impl HeaderKeys<'_> {
    fn invalid(&self, key: &str, message: &str) -> DataStoreError {
        DataStoreError::InvalidHeaderValue {
            key: key.to_string(),
            path: self.path.to_path_buf(),
            message: message.to_string(),
        }
    }

    fn required(&self, key: &str) -> Result<&ColumnValue, DataStoreError> {
        match self.header.get(key) {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(DataStoreError::MissingHeaderKey {
                key: key.to_string(),
                path: self.path.to_path_buf(),
            }),
        }
    }

    fn required_f64(&self, key: &str) -> Result<f64, DataStoreError> {
        self.required(key)?
            .as_f64()
            .ok_or_else(|| self.invalid(key, "expected a number"))
    }

    fn required_int(&self, key: &str) -> Result<i64, DataStoreError> {
        self.required(key)?
            .as_i64()
            .ok_or_else(|| self.invalid(key, "expected an integer"))
    }

    fn optional_f64(&self, key: &str) -> Result<Option<f64>, DataStoreError> {
        match self.header.get(key) {
            None | Some(ColumnValue::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(key, "expected a number")),
        }
    }

    fn int_or(&self, key: &str, default: i64) -> i64 {
        self.header
            .get(key)
            .and_then(ColumnValue::as_i64)
            .unwrap_or(default)
    }

    fn text_or(&self, key: &str, default: &str) -> String {
        match self.header.get(key) {
            None | Some(ColumnValue::Null) => default.to_string(),
            Some(ColumnValue::Text(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
        }
    }
}
