//! Local replica of the user's preference document.
//!
//! The replica follows two rules:
//! - The server is authoritative. Whatever it returns replaces local values.
//! - Domains are independent. Adopting a map-state response never touches
//!   general fields or navigation, and so on. Concurrent edits to different
//!   domains from different devices therefore do not clobber each other.
//!
//! Ordering uses the server's `lastSyncAt`, tracked per domain. A response or
//! delta is compared only against the stamp of the domains it carries, so a
//! late map update is not dropped because a general write landed first. The
//! document's `lastSyncAt` is the newest of the three stamps.

use trailsync_types::{PreferenceDelta, PreferenceDomain, PreferenceSet, SyncCursor};

/// A single field of the preference document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceField {
    /// `theme`
    Theme,
    /// `language`
    Language,
    /// `distanceUnit`
    DistanceUnit,
    /// `mapState`
    MapState,
    /// `navigation`
    Navigation,
}

impl PreferenceField {
    /// The domain this field belongs to.
    pub fn domain(&self) -> PreferenceDomain {
        match self {
            PreferenceField::Theme | PreferenceField::Language | PreferenceField::DistanceUnit => {
                PreferenceDomain::General
            }
            PreferenceField::MapState => PreferenceDomain::MapState,
            PreferenceField::Navigation => PreferenceDomain::Navigation,
        }
    }
}

/// Fields whose value actually changed during a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedFields(Vec<PreferenceField>);

impl ChangedFields {
    /// True when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `field` changed.
    pub fn contains(&self, field: PreferenceField) -> bool {
        self.0.contains(&field)
    }

    /// Iterate over changed fields.
    pub fn iter(&self) -> impl Iterator<Item = &PreferenceField> {
        self.0.iter()
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn push(&mut self, field: PreferenceField) {
        if !self.0.contains(&field) {
            self.0.push(field);
        }
    }
}

/// Server stamp of the last value adopted for each domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DomainStamps {
    general: SyncCursor,
    map_state: SyncCursor,
    navigation: SyncCursor,
}

impl DomainStamps {
    fn all(stamp: SyncCursor) -> Self {
        Self {
            general: stamp,
            map_state: stamp,
            navigation: stamp,
        }
    }

    fn get(&self, domain: PreferenceDomain) -> SyncCursor {
        match domain {
            PreferenceDomain::General => self.general,
            PreferenceDomain::MapState => self.map_state,
            PreferenceDomain::Navigation => self.navigation,
        }
    }

    fn raise(&mut self, domain: PreferenceDomain, stamp: SyncCursor) {
        let slot = match domain {
            PreferenceDomain::General => &mut self.general,
            PreferenceDomain::MapState => &mut self.map_state,
            PreferenceDomain::Navigation => &mut self.navigation,
        };
        *slot = (*slot).max(stamp);
    }

    fn newest(&self) -> SyncCursor {
        self.general.max(self.map_state).max(self.navigation)
    }
}

/// Client-side replica. Empty until the first successful load.
#[derive(Debug, Clone, Default)]
pub struct PreferenceReplica {
    document: Option<PreferenceSet>,
    stamps: DomainStamps,
}

impl PreferenceReplica {
    /// Create an empty replica.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a document has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    /// The current document, if loaded.
    pub fn document(&self) -> Option<&PreferenceSet> {
        self.document.as_ref()
    }

    /// Cursor of the current document (zero when empty).
    pub fn cursor(&self) -> SyncCursor {
        self.document
            .as_ref()
            .map(|d| d.last_sync_at)
            .unwrap_or_default()
    }

    /// Stamp of the last adopted value for `domain`.
    pub fn domain_cursor(&self, domain: PreferenceDomain) -> SyncCursor {
        self.stamps.get(domain)
    }

    /// Replace the whole document with an authoritative copy.
    ///
    /// Returns the changed fields, or `None` if the copy is older than the
    /// replica and was dropped.
    pub fn replace(&mut self, incoming: PreferenceSet) -> Option<ChangedFields> {
        let stamp = incoming.last_sync_at;
        let changed = match &self.document {
            Some(current) if stamp < current.last_sync_at => return None,
            Some(current) => diff(current, &incoming),
            None => {
                let mut changed = ChangedFields::default();
                changed.push(PreferenceField::Theme);
                changed.push(PreferenceField::Language);
                changed.push(PreferenceField::DistanceUnit);
                if incoming.map_state.is_some() {
                    changed.push(PreferenceField::MapState);
                }
                if incoming.navigation.is_some() {
                    changed.push(PreferenceField::Navigation);
                }
                changed
            }
        };
        self.document = Some(incoming);
        self.stamps = DomainStamps::all(stamp);
        Some(changed)
    }

    /// Adopt one domain of a server response after a domain-scoped write.
    ///
    /// Only the fields of `domain` (and the cursor) are copied. If the
    /// replica is empty the response is adopted as a whole, since there is
    /// nothing local to protect. Returns `None` when the response is older
    /// than the last value adopted for `domain`.
    pub fn apply_domain(
        &mut self,
        domain: PreferenceDomain,
        response: &PreferenceSet,
    ) -> Option<ChangedFields> {
        if self.document.is_none() {
            return self.replace(response.clone());
        }
        if response.last_sync_at < self.stamps.get(domain) {
            return None;
        }
        let current = self.document.as_mut()?;

        let mut changed = ChangedFields::default();
        match domain {
            PreferenceDomain::General => {
                if current.theme != response.theme {
                    current.theme = response.theme;
                    changed.push(PreferenceField::Theme);
                }
                if current.language != response.language {
                    current.language = response.language.clone();
                    changed.push(PreferenceField::Language);
                }
                if current.distance_unit != response.distance_unit {
                    current.distance_unit = response.distance_unit;
                    changed.push(PreferenceField::DistanceUnit);
                }
            }
            PreferenceDomain::MapState => {
                if current.map_state != response.map_state {
                    current.map_state = response.map_state.clone();
                    changed.push(PreferenceField::MapState);
                }
            }
            PreferenceDomain::Navigation => {
                if current.navigation != response.navigation {
                    current.navigation = response.navigation.clone();
                    changed.push(PreferenceField::Navigation);
                }
            }
        }
        self.stamps.raise(domain, response.last_sync_at);
        current.last_sync_at = self.stamps.newest();
        Some(changed)
    }

    /// Merge a realtime delta field by field.
    ///
    /// Fields equal to the local value are not reported, so consumers can
    /// skip redundant re-renders. Each domain the delta carries is checked
    /// against that domain's stamp; older domains are skipped while newer
    /// ones still merge. An unstamped delta always merges. An empty replica
    /// ignores deltas; the next load brings the full document.
    pub fn merge_delta(&mut self, delta: &PreferenceDelta) -> ChangedFields {
        let mut changed = ChangedFields::default();
        let stamps = self.stamps;
        let current = match self.document.as_mut() {
            Some(current) => current,
            None => return changed,
        };
        let fresh = |domain: PreferenceDomain| match delta.last_sync_at {
            Some(stamp) => stamp >= stamps.get(domain),
            None => true,
        };
        let general_fresh = fresh(PreferenceDomain::General);
        let map_fresh = fresh(PreferenceDomain::MapState);
        let navigation_fresh = fresh(PreferenceDomain::Navigation);

        if let Some(theme) = delta.theme.filter(|_| general_fresh) {
            if current.theme != theme {
                current.theme = theme;
                changed.push(PreferenceField::Theme);
            }
        }
        if let Some(language) = delta.language.as_ref().filter(|_| general_fresh) {
            if current.language.as_ref() != Some(language) {
                current.language = Some(language.clone());
                changed.push(PreferenceField::Language);
            }
        }
        if let Some(unit) = delta.distance_unit.filter(|_| general_fresh) {
            if current.distance_unit != unit {
                current.distance_unit = unit;
                changed.push(PreferenceField::DistanceUnit);
            }
        }
        if let Some(map_state) = delta.map_state.as_ref().filter(|_| map_fresh) {
            if current.map_state.as_ref() != Some(map_state) {
                current.map_state = Some(map_state.clone());
                changed.push(PreferenceField::MapState);
            }
        }
        if let Some(navigation) = delta.navigation.as_ref().filter(|_| navigation_fresh) {
            if current.navigation.as_ref() != Some(navigation) {
                current.navigation = Some(navigation.clone());
                changed.push(PreferenceField::Navigation);
            }
        }
        if let Some(stamp) = delta.last_sync_at {
            let carried = [
                (PreferenceDomain::General, general_fresh && delta.carries_general()),
                (PreferenceDomain::MapState, map_fresh && delta.map_state.is_some()),
                (PreferenceDomain::Navigation, navigation_fresh && delta.navigation.is_some()),
            ];
            for (domain, applied) in carried {
                if applied {
                    self.stamps.raise(domain, stamp);
                }
            }
            current.last_sync_at = self.stamps.newest().max(current.last_sync_at);
        }
        changed
    }

    /// Drop the document (on logout).
    pub fn clear(&mut self) {
        self.document = None;
        self.stamps = DomainStamps::default();
    }
}

fn diff(old: &PreferenceSet, new: &PreferenceSet) -> ChangedFields {
    let mut changed = ChangedFields::default();
    if old.theme != new.theme {
        changed.push(PreferenceField::Theme);
    }
    if old.language != new.language {
        changed.push(PreferenceField::Language);
    }
    if old.distance_unit != new.distance_unit {
        changed.push(PreferenceField::DistanceUnit);
    }
    if old.map_state != new.map_state {
        changed.push(PreferenceField::MapState);
    }
    if old.navigation != new.navigation {
        changed.push(PreferenceField::Navigation);
    }
    changed
}
