use async_trait::async_trait;
use stalker_core::{ProfileQuery, ProfileSnapshot, SteamId};
use std::collections::BTreeMap;
use thiserror::Error;

mod web_api;

pub use web_api::SteamWebApi;

/// Errors from the profile source. Cloneable so one failed batch request
/// can be reported against every id it covered.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("steam api transport error: {0}")]
    Transport(String),
    #[error("steam api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("steam api payload parse error: {0}")]
    Parse(String),
    #[error("no player summary returned for {0}")]
    MissingPlayer(SteamId),
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Source of profile snapshots. Partial failure is a per-id value in the
/// result map, never an error that aborts the whole batch.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_snapshots(
        &self,
        ids: &[SteamId],
    ) -> BTreeMap<SteamId, Result<ProfileSnapshot, FetchError>>;

    /// Resolve a community vanity name to its SteamID64. `Ok(None)` means
    /// the name does not exist, which is an input problem, not a fault.
    async fn resolve_vanity(&self, vanity: &str) -> Result<Option<SteamId>, FetchError>;
}

pub async fn resolve_query(
    fetcher: &dyn ProfileFetcher,
    query: &ProfileQuery,
) -> Result<Option<SteamId>, FetchError> {
    match query {
        ProfileQuery::Id(id) => Ok(Some(id.clone())),
        ProfileQuery::Vanity(name) => fetcher.resolve_vanity(name).await,
    }
}
