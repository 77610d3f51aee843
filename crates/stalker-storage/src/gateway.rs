use crate::StoreError;
use stalker_core::{SteamId, TrackedProfile};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// The full persisted state: identity → record. `BTreeMap` keeps roster
/// files stably ordered across rewrites.
pub type Roster = BTreeMap<SteamId, TrackedProfile>;

/// Durable storage for the roster. Implementations must make `save`
/// all-or-nothing: a failed save leaves the previous state readable.
pub trait PersistenceGateway: Send {
    fn load(&self) -> Result<Roster, StoreError>;
    fn save(&self, roster: &Roster) -> Result<(), StoreError>;
}

/// Roster persisted as pretty-printed JSON. Saves go through a sibling
/// temp file and a rename so a crash mid-write cannot corrupt the roster.
pub struct JsonFileGateway {
    path: PathBuf,
}

impl JsonFileGateway {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl PersistenceGateway for JsonFileGateway {
    fn load(&self) -> Result<Roster, StoreError> {
        if !self.path.exists() {
            return Ok(Roster::new());
        }
        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, roster: &Roster) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string_pretty(roster).map_err(StoreError::Serialize)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, payload)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Gateway twin that never touches disk. Used by tests and by callers that
/// want a store without durability.
#[derive(Default)]
pub struct MemoryGateway {
    roster: Mutex<Roster>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roster(roster: Roster) -> Self {
        Self {
            roster: Mutex::new(roster),
        }
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load(&self) -> Result<Roster, StoreError> {
        match self.roster.lock() {
            Ok(guard) => Ok(guard.clone()),
            Err(_) => Err(StoreError::Poisoned),
        }
    }

    fn save(&self, roster: &Roster) -> Result<(), StoreError> {
        match self.roster.lock() {
            Ok(mut guard) => {
                *guard = roster.clone();
                Ok(())
            }
            Err(_) => Err(StoreError::Poisoned),
        }
    }
}
