use std::path::PathBuf;
use thiserror::Error;

pub mod gateway;
pub mod store;

pub use gateway::{JsonFileGateway, MemoryGateway, PersistenceGateway, Roster};
pub use store::{AddOutcome, ApplyOutcome, RemoveOutcome, RosterStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("roster io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("roster parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("roster serialize error: {0}")]
    Serialize(serde_json::Error),
    #[error("roster state poisoned by a previous panic")]
    Poisoned,
}
