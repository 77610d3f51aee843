use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

pub const COMMUNITY_PROFILE_BASE: &str = "https://steamcommunity.com/profiles";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("not a 17-digit steam id: {0}")]
    MalformedId(String),
    #[error("unrecognized profile reference: {0}")]
    UnrecognizedReference(String),
}

/// A SteamID64: the stable external key for a tracked profile.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SteamId(String);

impl SteamId {
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let trimmed = input.trim();
        if trimmed.len() == 17 && trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(IdentityError::MalformedId(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn profile_url(&self) -> String {
        format!("{COMMUNITY_PROFILE_BASE}/{}", self.0)
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SteamId {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Operator input naming a profile: a bare SteamID64, a
/// `/profiles/<id64>` community link, or a `/id/<vanity>` community link.
/// Vanity names need the web API to resolve, so they stay symbolic here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileQuery {
    Id(SteamId),
    Vanity(String),
}

fn profiles_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/profiles/(\d{17})").expect("valid profiles regex"))
}

fn vanity_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/id/([^/\s?#]+)").expect("valid vanity regex"))
}

impl ProfileQuery {
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let trimmed = input.trim();
        if let Ok(id) = SteamId::parse(trimmed) {
            return Ok(Self::Id(id));
        }
        if trimmed.contains("steamcommunity.com") {
            if let Some(captures) = profiles_link_re().captures(trimmed) {
                return Ok(Self::Id(SteamId(captures[1].to_string())));
            }
            if let Some(captures) = vanity_link_re().captures(trimmed) {
                return Ok(Self::Vanity(captures[1].to_string()));
            }
        }
        Err(IdentityError::UnrecognizedReference(input.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileVisibility {
    Public,
    Private,
}

impl ProfileVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileVisibility::Public => "public",
            ProfileVisibility::Private => "private",
        }
    }
}

impl fmt::Display for ProfileVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known public attributes of a profile. Field names on disk match
/// the roster files written by earlier deployments; unknown keys survive
/// round-trips through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    #[serde(default, rename = "accountCreated", skip_serializing_if = "Option::is_none")]
    pub account_created: Option<i64>,
    #[serde(default, rename = "steamLevel", skip_serializing_if = "Option::is_none")]
    pub steam_level: Option<u32>,
    #[serde(default, rename = "rustHours", skip_serializing_if = "Option::is_none")]
    pub rust_hours: Option<f64>,
    #[serde(default, rename = "friendsCount", skip_serializing_if = "Option::is_none")]
    pub friends_count: Option<u32>,
    #[serde(default, rename = "gameBans", skip_serializing_if = "Option::is_none")]
    pub game_bans: Option<u32>,
    #[serde(default, rename = "lastGameBan", skip_serializing_if = "Option::is_none")]
    pub last_game_ban: Option<String>,
    #[serde(default, rename = "vacBans", skip_serializing_if = "Option::is_none")]
    pub vac_bans: Option<u32>,
    #[serde(default, rename = "lastVacBan", skip_serializing_if = "Option::is_none")]
    pub last_vac_ban: Option<i64>,
    #[serde(default, rename = "lastOnline", skip_serializing_if = "Option::is_none")]
    pub last_online: Option<i64>,
    #[serde(default, rename = "profileStatus", skip_serializing_if = "Option::is_none")]
    pub profile_status: Option<ProfileVisibility>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProfileAttributes {
    /// Shallow overlay: fields the fresh snapshot knows replace the stored
    /// ones; fields the source omitted keep their last known value.
    pub fn overlay(&self, fresh: &ProfileAttributes) -> ProfileAttributes {
        let mut extra = self.extra.clone();
        extra.extend(fresh.extra.clone());
        ProfileAttributes {
            account_created: fresh.account_created.or(self.account_created),
            steam_level: fresh.steam_level.or(self.steam_level),
            rust_hours: fresh.rust_hours.or(self.rust_hours),
            friends_count: fresh.friends_count.or(self.friends_count),
            game_bans: fresh.game_bans.or(self.game_bans),
            last_game_ban: fresh.last_game_ban.clone().or_else(|| self.last_game_ban.clone()),
            vac_bans: fresh.vac_bans.or(self.vac_bans),
            last_vac_ban: fresh.last_vac_ban.or(self.last_vac_ban),
            last_online: fresh.last_online.or(self.last_online),
            profile_status: fresh.profile_status.or(self.profile_status),
            extra,
        }
    }
}

/// One tracked profile record. `names[0]` is the display name observed when
/// tracking began and never changes; the last entry is the current name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedProfile {
    pub names: Vec<String>,
    #[serde(default)]
    pub data: ProfileAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TrackedProfile {
    pub fn seeded(initial_name: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            names: vec![initial_name.into()],
            data: ProfileAttributes::default(),
            notes,
        }
    }

    pub fn original_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn current_name(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    pub fn has_prior_changes(&self) -> bool {
        self.names.len() > 1
    }
}

/// What one fetch observed for a profile at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSnapshot {
    pub persona_name: String,
    pub attributes: ProfileAttributes,
    pub observed_at: DateTime<Utc>,
}
