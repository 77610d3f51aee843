use crate::gateway::{PersistenceGateway, Roster};
use crate::StoreError;
use stalker_core::{SteamId, TrackedProfile};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoveOutcome {
    Removed(TrackedProfile),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The id was removed while the snapshot was in flight; the update is
    /// dropped so the record is not resurrected.
    SkippedTombstoned,
    /// The id is neither tracked nor tombstoned; nothing to replace.
    SkippedUntracked,
}

/// Authoritative in-memory roster with write-through persistence. Every
/// mutating operation saves the full map through the gateway before
/// returning success; if the save fails the in-memory change is rolled
/// back, so memory and durable state never diverge past one operation.
///
/// The tombstone set is process-local and never persisted: it only exists
/// to reject snapshots that were already in flight when their profile was
/// removed.
pub struct RosterStore {
    roster: Roster,
    tombstones: HashSet<SteamId>,
    gateway: Box<dyn PersistenceGateway>,
}

impl RosterStore {
    pub fn open(gateway: Box<dyn PersistenceGateway>) -> Result<Self, StoreError> {
        let roster = gateway.load()?;
        Ok(Self {
            roster,
            tombstones: HashSet::new(),
            gateway,
        })
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn get(&self, id: &SteamId) -> Option<&TrackedProfile> {
        self.roster.get(id)
    }

    pub fn tracked_ids(&self) -> Vec<SteamId> {
        self.roster.keys().cloned().collect()
    }

    /// Point-in-time copy of the roster; later mutations are not observed
    /// by the returned sequence.
    pub fn list_all(&self) -> Vec<(SteamId, TrackedProfile)> {
        self.roster
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    pub fn is_tombstoned(&self, id: &SteamId) -> bool {
        self.tombstones.contains(id)
    }

    /// Called when a new reconciliation cycle begins. Any snapshot still
    /// referencing an older tombstone belonged to a cycle that has already
    /// run to completion, so the markers can go.
    pub fn begin_cycle(&mut self) {
        self.tombstones.clear();
    }

    pub fn add(
        &mut self,
        id: SteamId,
        initial_name: &str,
        notes: Option<String>,
    ) -> Result<AddOutcome, StoreError> {
        if self.roster.contains_key(&id) {
            return Ok(AddOutcome::AlreadyExists);
        }

        let was_tombstoned = self.tombstones.remove(&id);
        self.roster
            .insert(id.clone(), TrackedProfile::seeded(initial_name, notes));

        if let Err(err) = self.gateway.save(&self.roster) {
            self.roster.remove(&id);
            if was_tombstoned {
                self.tombstones.insert(id);
            }
            return Err(err);
        }
        Ok(AddOutcome::Created)
    }

    pub fn remove(&mut self, id: &SteamId) -> Result<RemoveOutcome, StoreError> {
        let Some(record) = self.roster.remove(id) else {
            return Ok(RemoveOutcome::NotFound);
        };
        self.tombstones.insert(id.clone());

        if let Err(err) = self.gateway.save(&self.roster) {
            self.roster.insert(id.clone(), record);
            self.tombstones.remove(id);
            return Err(err);
        }
        Ok(RemoveOutcome::Removed(record))
    }

    pub fn apply_reconciliation(
        &mut self,
        id: &SteamId,
        updated: TrackedProfile,
    ) -> Result<ApplyOutcome, StoreError> {
        if self.tombstones.contains(id) {
            return Ok(ApplyOutcome::SkippedTombstoned);
        }
        if !self.roster.contains_key(id) {
            return Ok(ApplyOutcome::SkippedUntracked);
        }

        let previous = self.roster.insert(id.clone(), updated);
        if let Err(err) = self.gateway.save(&self.roster) {
            match previous {
                Some(record) => {
                    self.roster.insert(id.clone(), record);
                }
                None => {
                    self.roster.remove(id);
                }
            }
            return Err(err);
        }
        Ok(ApplyOutcome::Applied)
    }
}
