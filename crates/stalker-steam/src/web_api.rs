use crate::{FetchError, ProfileFetcher};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use stalker_core::{ProfileAttributes, ProfileSnapshot, ProfileVisibility, SteamId};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://api.steampowered.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// GetPlayerSummaries and GetPlayerBans accept up to 100 ids per request.
const BATCH_LIMIT: usize = 100;
const RUST_APP_ID: u32 = 252_490;
const VISIBILITY_PUBLIC: u8 = 3;

/// Steam Web API client. Summaries and bans are fetched in batches; level,
/// playtime and friends go per id because those endpoints take a single
/// `steamid`.
pub struct SteamWebApi {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SteamWebApi {
    pub fn new(api_key: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| FetchError::Parse(err.to_string()))
    }

    async fn player_summaries(
        &self,
        ids: &[SteamId],
    ) -> Result<BTreeMap<String, PlayerSummary>, FetchError> {
        let joined = join_ids(ids);
        let envelope: SummariesEnvelope = self
            .get_json(
                "/ISteamUser/GetPlayerSummaries/v0002/",
                &[("steamids", joined.as_str())],
            )
            .await?;
        Ok(envelope
            .response
            .players
            .into_iter()
            .map(|player| (player.steamid.clone(), player))
            .collect())
    }

    async fn player_bans(
        &self,
        ids: &[SteamId],
    ) -> Result<BTreeMap<String, PlayerBans>, FetchError> {
        let joined = join_ids(ids);
        let envelope: BansEnvelope = self
            .get_json(
                "/ISteamUser/GetPlayerBans/v1/",
                &[("steamids", joined.as_str())],
            )
            .await?;
        Ok(envelope
            .players
            .into_iter()
            .map(|player| (player.steam_id.clone(), player))
            .collect())
    }

    async fn steam_level(&self, id: &SteamId) -> Result<Option<u32>, FetchError> {
        let envelope: LevelEnvelope = self
            .get_json(
                "/IPlayerService/GetSteamLevel/v1/",
                &[("steamid", id.as_str())],
            )
            .await?;
        Ok(envelope.response.player_level)
    }

    async fn rust_hours(&self, id: &SteamId) -> Result<f64, FetchError> {
        let envelope: OwnedGamesEnvelope = self
            .get_json(
                "/IPlayerService/GetOwnedGames/v1/",
                &[
                    ("steamid", id.as_str()),
                    ("include_appinfo", "true"),
                    ("include_played_free_games", "true"),
                ],
            )
            .await?;
        Ok(rust_hours_from_games(&envelope.response.games))
    }

    async fn friends_count(&self, id: &SteamId) -> Result<u32, FetchError> {
        let envelope: FriendsEnvelope = self
            .get_json(
                "/ISteamUser/GetFriendList/v1/",
                &[("steamid", id.as_str()), ("relationship", "friend")],
            )
            .await?;
        // A private friends list comes back without the wrapper at all.
        Ok(envelope
            .friendslist
            .map(|list| list.friends.len() as u32)
            .unwrap_or(0))
    }
}

#[async_trait]
impl ProfileFetcher for SteamWebApi {
    async fn fetch_snapshots(
        &self,
        ids: &[SteamId],
    ) -> BTreeMap<SteamId, Result<ProfileSnapshot, FetchError>> {
        let mut results = BTreeMap::new();

        for chunk in ids.chunks(BATCH_LIMIT) {
            let summaries = match self.player_summaries(chunk).await {
                Ok(summaries) => summaries,
                Err(err) => {
                    // Without a summary there is no display name, so the
                    // whole chunk fails with the same cause.
                    for id in chunk {
                        results.insert(id.clone(), Err(err.clone()));
                    }
                    continue;
                }
            };
            let bans = match self.player_bans(chunk).await {
                Ok(bans) => bans,
                Err(err) => {
                    warn!(event = "player_bans_failed", error = %err);
                    BTreeMap::new()
                }
            };

            for id in chunk {
                let Some(summary) = summaries.get(id.as_str()) else {
                    results.insert(id.clone(), Err(FetchError::MissingPlayer(id.clone())));
                    continue;
                };

                let level = match self.steam_level(id).await {
                    Ok(level) => level,
                    Err(err) => {
                        warn!(event = "steam_level_failed", id = %id, error = %err);
                        None
                    }
                };
                let rust_hours = match self.rust_hours(id).await {
                    Ok(hours) => Some(hours),
                    Err(err) => {
                        warn!(event = "owned_games_failed", id = %id, error = %err);
                        None
                    }
                };
                let friends = match self.friends_count(id).await {
                    Ok(count) => Some(count),
                    Err(err) => {
                        warn!(event = "friend_list_failed", id = %id, error = %err);
                        None
                    }
                };

                let attributes = build_attributes(
                    summary,
                    bans.get(id.as_str()),
                    level,
                    rust_hours,
                    friends,
                );
                results.insert(
                    id.clone(),
                    Ok(ProfileSnapshot {
                        persona_name: summary.personaname.clone(),
                        attributes,
                        observed_at: Utc::now(),
                    }),
                );
            }
        }

        results
    }

    async fn resolve_vanity(&self, vanity: &str) -> Result<Option<SteamId>, FetchError> {
        let envelope: VanityEnvelope = self
            .get_json(
                "/ISteamUser/ResolveVanityURL/v0001/",
                &[("vanityurl", vanity)],
            )
            .await?;
        if envelope.response.success != 1 {
            return Ok(None);
        }
        match envelope.response.steamid {
            Some(raw) => SteamId::parse(&raw)
                .map(Some)
                .map_err(|err| FetchError::Parse(err.to_string())),
            None => Ok(None),
        }
    }
}

fn join_ids(ids: &[SteamId]) -> String {
    ids.iter()
        .map(SteamId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn rust_hours_from_games(games: &[OwnedGame]) -> f64 {
    games
        .iter()
        .find(|game| game.appid == RUST_APP_ID)
        .map(|game| game.playtime_forever as f64 / 60.0)
        .unwrap_or(0.0)
}

fn build_attributes(
    summary: &PlayerSummary,
    bans: Option<&PlayerBans>,
    level: Option<u32>,
    rust_hours: Option<f64>,
    friends: Option<u32>,
) -> ProfileAttributes {
    ProfileAttributes {
        account_created: summary.timecreated,
        steam_level: level,
        rust_hours,
        friends_count: friends,
        game_bans: bans.map(|record| record.game_bans),
        last_game_ban: bans.and_then(|record| {
            if record.game_bans > 0 {
                record.game_ban_date.clone()
            } else {
                None
            }
        }),
        vac_bans: bans.map(|record| record.vac_bans),
        last_vac_ban: bans.and_then(|record| {
            if record.vac_bans > 0 {
                record.days_since_last_ban
            } else {
                None
            }
        }),
        last_online: summary.lastlogoff,
        profile_status: summary.communityvisibilitystate.map(|state| {
            if state == VISIBILITY_PUBLIC {
                ProfileVisibility::Public
            } else {
                ProfileVisibility::Private
            }
        }),
        extra: BTreeMap::new(),
    }
}

#[derive(Debug, Deserialize)]
struct SummariesEnvelope {
    response: SummariesResponse,
}

#[derive(Debug, Deserialize)]
struct SummariesResponse {
    #[serde(default)]
    players: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlayerSummary {
    steamid: String,
    personaname: String,
    #[serde(default)]
    timecreated: Option<i64>,
    #[serde(default)]
    lastlogoff: Option<i64>,
    #[serde(default)]
    communityvisibilitystate: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct BansEnvelope {
    #[serde(default)]
    players: Vec<PlayerBans>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlayerBans {
    #[serde(rename = "SteamId")]
    steam_id: String,
    #[serde(rename = "NumberOfGameBans", default)]
    game_bans: u32,
    #[serde(rename = "GameBanDate", default)]
    game_ban_date: Option<String>,
    #[serde(rename = "NumberOfVACBans", default)]
    vac_bans: u32,
    #[serde(rename = "DaysSinceLastBan", default)]
    days_since_last_ban: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LevelEnvelope {
    response: LevelResponse,
}

#[derive(Debug, Deserialize)]
struct LevelResponse {
    #[serde(default)]
    player_level: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OwnedGamesEnvelope {
    response: OwnedGamesResponse,
}

#[derive(Debug, Default, Deserialize)]
struct OwnedGamesResponse {
    #[serde(default)]
    games: Vec<OwnedGame>,
}

#[derive(Debug, Deserialize)]
struct OwnedGame {
    appid: u32,
    #[serde(default)]
    playtime_forever: u64,
}

#[derive(Debug, Deserialize)]
struct FriendsEnvelope {
    #[serde(default)]
    friendslist: Option<FriendsList>,
}

#[derive(Debug, Deserialize)]
struct FriendsList {
    #[serde(default)]
    friends: Vec<Friend>,
}

#[derive(Debug, Deserialize)]
struct Friend {
    #[allow(dead_code)]
    steamid: String,
}

#[derive(Debug, Deserialize)]
struct VanityEnvelope {
    response: VanityResponse,
}

#[derive(Debug, Deserialize)]
struct VanityResponse {
    success: i32,
    #[serde(default)]
    steamid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_payload_parses_with_optional_fields_missing() {
        let raw = r#"{
            "response": {
                "players": [
                    {
                        "steamid": "76561198000000001",
                        "personaname": "alice",
                        "communityvisibilitystate": 3,
                        "timecreated": 1262304000,
                        "lastlogoff": 1700000000
                    },
                    {
                        "steamid": "76561198000000002",
                        "personaname": "bob"
                    }
                ]
            }
        }"#;
        let envelope: SummariesEnvelope = serde_json::from_str(raw).expect("parse summaries");
        assert_eq!(envelope.response.players.len(), 2);
        assert_eq!(envelope.response.players[1].timecreated, None);
    }

    #[test]
    fn bans_payload_parses_pascal_case_keys() {
        let raw = r#"{
            "players": [
                {
                    "SteamId": "76561198000000001",
                    "CommunityBanned": false,
                    "VACBanned": true,
                    "NumberOfVACBans": 2,
                    "DaysSinceLastBan": 90,
                    "NumberOfGameBans": 1,
                    "EconomyBan": "none"
                }
            ]
        }"#;
        let envelope: BansEnvelope = serde_json::from_str(raw).expect("parse bans");
        let record = &envelope.players[0];
        assert_eq!(record.vac_bans, 2);
        assert_eq!(record.game_bans, 1);
        assert_eq!(record.days_since_last_ban, Some(90));
    }

    #[test]
    fn vanity_payload_parses_both_outcomes() {
        let hit: VanityEnvelope = serde_json::from_str(
            r#"{"response": {"success": 1, "steamid": "76561198000000001"}}"#,
        )
        .expect("parse hit");
        assert_eq!(hit.response.success, 1);
        assert_eq!(hit.response.steamid.as_deref(), Some("76561198000000001"));

        let miss: VanityEnvelope = serde_json::from_str(
            r#"{"response": {"success": 42, "message": "No match"}}"#,
        )
        .expect("parse miss");
        assert_eq!(miss.response.success, 42);
        assert_eq!(miss.response.steamid, None);
    }

    #[test]
    fn rust_hours_come_from_the_rust_appid_in_minutes() {
        let games = vec![
            OwnedGame {
                appid: 730,
                playtime_forever: 54_000,
            },
            OwnedGame {
                appid: RUST_APP_ID,
                playtime_forever: 90,
            },
        ];
        assert_eq!(rust_hours_from_games(&games), 1.5);
        assert_eq!(rust_hours_from_games(&[]), 0.0);
    }

    #[test]
    fn attributes_expose_ban_dates_only_when_banned() {
        let summary = PlayerSummary {
            steamid: "76561198000000001".to_string(),
            personaname: "alice".to_string(),
            timecreated: Some(1_262_304_000),
            lastlogoff: Some(1_700_000_000),
            communityvisibilitystate: Some(3),
        };
        let clean = PlayerBans {
            steam_id: summary.steamid.clone(),
            game_bans: 0,
            game_ban_date: Some("2020-01-01".to_string()),
            vac_bans: 0,
            days_since_last_ban: Some(12),
        };

        let attributes = build_attributes(&summary, Some(&clean), Some(10), Some(2.0), Some(3));
        assert_eq!(attributes.game_bans, Some(0));
        assert_eq!(attributes.last_game_ban, None);
        assert_eq!(attributes.last_vac_ban, None);
        assert_eq!(attributes.profile_status, Some(ProfileVisibility::Public));

        let banned = PlayerBans {
            game_bans: 2,
            vac_bans: 1,
            ..clean
        };
        let attributes = build_attributes(&summary, Some(&banned), None, None, None);
        assert_eq!(attributes.last_game_ban.as_deref(), Some("2020-01-01"));
        assert_eq!(attributes.last_vac_ban, Some(12));
        assert_eq!(attributes.steam_level, None);
    }

    #[test]
    fn non_public_visibility_maps_to_private() {
        let summary = PlayerSummary {
            steamid: "76561198000000001".to_string(),
            personaname: "alice".to_string(),
            timecreated: None,
            lastlogoff: None,
            communityvisibilitystate: Some(1),
        };
        let attributes = build_attributes(&summary, None, None, None, None);
        assert_eq!(attributes.profile_status, Some(ProfileVisibility::Private));
        assert_eq!(attributes.game_bans, None);
    }
}
