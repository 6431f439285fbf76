use std::collections::BTreeMap;
use std::sync::Arc;

use crate::key::KeyId;
use smallvec::SmallVec;

/// Tag key for the load profile name.
pub const PROFILE_TAG: &str = "profile";
/// Tag key for the scenario component name.
pub const COMPONENT_TAG: &str = "component";

/// Tags attached to every sample a virtual user emits.
///
/// The required fields are fixed so aggregation keys stay predictable. Only `profile`,
/// `component` and the `extra` map key a series inside the registry; `vu_id` and `iteration`
/// identify the sample itself and are never used as series keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tags {
    pub vu_id: u64,
    pub iteration: u64,
    pub profile: Arc<str>,
    pub component: Arc<str>,
    pub extra: BTreeMap<String, String>,
}

impl Tags {
    #[must_use]
    pub fn new(vu_id: u64, iteration: u64, profile: Arc<str>, component: Arc<str>) -> Self {
        Self {
            vu_id,
            iteration,
            profile,
            component,
            extra: BTreeMap::new(),
        }
    }

    /// Adds an extension tag. Required keys cannot be shadowed.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key != PROFILE_TAG && key != COMPONENT_TAG {
            self.extra.insert(key, value.into());
        }
        self
    }

    /// Pairs that make up the series key.
    pub fn series_pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        [
            (PROFILE_TAG, self.profile.as_ref()),
            (COMPONENT_TAG, self.component.as_ref()),
        ]
        .into_iter()
        .chain(
            self.extra
                .iter()
                .filter(|(k, _)| k.as_str() != PROFILE_TAG && k.as_str() != COMPONENT_TAG)
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }
}

/// Interned, sorted tag pairs identifying one series of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // SmallVec to avoid allocation for small tag sets (usually < 4)
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    pub fn from_sorted_iter(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let slice: &[(KeyId, KeyId)] = &self.tags;
        let idx = slice.partition_point(|(k, _)| *k < key);
        slice.get(idx).and_then(|(k, v)| (*k == key).then_some(*v))
    }
}
