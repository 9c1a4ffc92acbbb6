//! Resolved observation descriptors

use std::collections::BTreeMap;
use std::ops::Index;

use crate::data::hdu_index::{HduLocation, HduType};
use crate::data::ObsId;

/// All located HDUs of one observation
///
/// Built by [`DataStore::obs`](crate::data::DataStore::obs). When an events HDU
/// is present, the pointing location and the metadata location are derived from
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    obs_id: ObsId,
    locations: BTreeMap<HduType, HduLocation>,
    meta: Option<HduLocation>,
}

impl Observation {
    pub fn new(
        obs_id: ObsId,
        locations: BTreeMap<HduType, HduLocation>,
        meta: Option<HduLocation>,
    ) -> Self {
        Self {
            obs_id,
            locations,
            meta,
        }
    }

    pub fn obs_id(&self) -> ObsId {
        self.obs_id
    }

    pub fn location(&self, hdu_type: HduType) -> Option<&HduLocation> {
        self.locations.get(&hdu_type)
    }

    /// Location of the observation metadata, the events header
    pub fn meta(&self) -> Option<&HduLocation> {
        self.meta.as_ref()
    }

    /// HDU types with a known location, in canonical order
    pub fn available_hdus(&self) -> Vec<HduType> {
        self.locations.keys().copied().collect()
    }

    /// Available IRF types
    pub fn available_irfs(&self) -> Vec<HduType> {
        self.locations
            .keys()
            .copied()
            .filter(|t| t.is_irf())
            .collect()
    }
}

/// An ordered batch of observations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observations {
    observations: Vec<Observation>,
}

impl Observations {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn ids(&self) -> Vec<ObsId> {
        self.observations.iter().map(Observation::obs_id).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    /// First observation with the given id
    pub fn get(&self, obs_id: ObsId) -> Option<&Observation> {
        self.observations.iter().find(|o| o.obs_id == obs_id)
    }
}

impl Index<usize> for Observations {
    type Output = Observation;

    fn index(&self, index: usize) -> &Observation {
        &self.observations[index]
    }
}

impl<'a> IntoIterator for &'a Observations {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

impl IntoIterator for Observations {
    type Item = Observation;
    type IntoIter = std::vec::IntoIter<Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.into_iter()
    }
}
