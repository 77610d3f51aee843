use crate::profile::{SteamId, TrackedProfile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// One operator command, sent as a single newline-terminated JSON frame
/// over the daemon's control socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    Add {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    Remove {
        id: String,
    },
    List,
    Check {
        query: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileEntry {
    pub id: SteamId,
    #[serde(flatten)]
    pub profile: TrackedProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlErrorCode {
    InvalidReference,
    UnknownVanity,
    ResolveFailed,
    FetchFailed,
    Storage,
    MalformedRequest,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResponse {
    Added { id: SteamId, name: String },
    AlreadyTracked { id: SteamId },
    Removed { id: SteamId },
    NotTracked { id: SteamId },
    Listing { profiles: Vec<ProfileEntry> },
    Checked { profile: ProfileEntry },
    Error { code: ControlErrorCode, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    Oversized { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

pub fn encode_frame<T: Serialize>(
    value: &T,
    max_frame_bytes: usize,
) -> Result<Vec<u8>, FrameError> {
    let mut encoded =
        serde_json::to_vec(value).map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::Oversized {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    encoded.push(b'\n');
    Ok(encoded)
}

pub fn decode_frame<T: DeserializeOwned>(
    bytes: &[u8],
    max_frame_bytes: usize,
) -> Result<T, FrameError> {
    let mut raw = bytes;
    if raw.ends_with(b"\n") {
        raw = &raw[..raw.len() - 1];
    }
    if raw.ends_with(b"\r") {
        raw = &raw[..raw.len() - 1];
    }
    if raw.len() > max_frame_bytes {
        return Err(FrameError::Oversized {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    serde_json::from_slice(raw).map_err(|err| FrameError::Decode(err.to_string()))
}

/// Where daemon and CLI meet when neither is told otherwise:
/// `$XDG_STATE_HOME/stalkerd/control.sock` (or the `~/.local/state`
/// fallback).
pub fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/state"))
        })
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("stalkerd")
        .join("control.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileAttributes;

    fn sample_id() -> SteamId {
        SteamId::parse("76561198000000001").expect("valid id")
    }

    #[test]
    fn requests_round_trip_through_frames() {
        let requests = [
            ControlRequest::Add {
                query: "https://steamcommunity.com/id/someone".to_string(),
                notes: Some("seen in pvp".to_string()),
            },
            ControlRequest::Remove {
                id: "76561198000000001".to_string(),
            },
            ControlRequest::List,
            ControlRequest::Check {
                query: "76561198000000001".to_string(),
            },
        ];

        for request in requests {
            let frame = encode_frame(&request, DEFAULT_MAX_FRAME_BYTES).expect("encode");
            assert!(frame.ends_with(b"\n"));
            let decoded: ControlRequest =
                decode_frame(&frame, DEFAULT_MAX_FRAME_BYTES).expect("decode");
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn responses_round_trip_through_frames() {
        let entry = ProfileEntry {
            id: sample_id(),
            profile: TrackedProfile {
                names: vec!["alice".to_string(), "alicia".to_string()],
                data: ProfileAttributes {
                    steam_level: Some(12),
                    ..ProfileAttributes::default()
                },
                notes: None,
            },
        };
        let responses = [
            ControlResponse::Added {
                id: sample_id(),
                name: "alice".to_string(),
            },
            ControlResponse::AlreadyTracked { id: sample_id() },
            ControlResponse::Removed { id: sample_id() },
            ControlResponse::NotTracked { id: sample_id() },
            ControlResponse::Listing {
                profiles: vec![entry.clone()],
            },
            ControlResponse::Checked { profile: entry },
            ControlResponse::Error {
                code: ControlErrorCode::InvalidReference,
                message: "not a profile".to_string(),
            },
        ];

        for response in responses {
            let frame = encode_frame(&response, DEFAULT_MAX_FRAME_BYTES).expect("encode");
            let decoded: ControlResponse =
                decode_frame(&frame, DEFAULT_MAX_FRAME_BYTES).expect("decode");
            assert_eq!(decoded, response);
        }
    }

    #[test]
    fn entry_flattens_record_fields_beside_the_id() {
        let entry = ProfileEntry {
            id: sample_id(),
            profile: TrackedProfile::seeded("alice", None),
        };
        let value = serde_json::to_value(&entry).expect("encode entry");
        assert_eq!(value["id"], "76561198000000001");
        assert_eq!(value["names"][0], "alice");
    }

    #[test]
    fn oversized_frames_are_rejected_both_ways() {
        let request = ControlRequest::Add {
            query: "x".repeat(256),
            notes: None,
        };
        assert!(matches!(
            encode_frame(&request, 64),
            Err(FrameError::Oversized { .. })
        ));

        let long_line = format!("{{\"op\":\"list\",\"pad\":\"{}\"}}\n", "y".repeat(256));
        assert!(matches!(
            decode_frame::<ControlRequest>(long_line.as_bytes(), 64),
            Err(FrameError::Oversized { .. })
        ));
    }

    #[test]
    fn decode_tolerates_crlf_line_endings() {
        let decoded: ControlRequest =
            decode_frame(b"{\"op\":\"list\"}\r\n", DEFAULT_MAX_FRAME_BYTES).expect("decode");
        assert_eq!(decoded, ControlRequest::List);
    }
}
