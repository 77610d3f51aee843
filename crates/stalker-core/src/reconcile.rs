use crate::profile::{ProfileSnapshot, SteamId, TrackedProfile};
use serde::{Deserialize, Serialize};

/// Emitted at most once per reconciliation when the observed display name
/// differs from the last recorded one. All fields are taken from the record
/// as it was *before* the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameChange {
    pub id: SteamId,
    pub original_name: String,
    pub previous_name: String,
    pub new_name: String,
    pub has_prior_changes: bool,
}

impl NameChange {
    pub fn profile_url(&self) -> String {
        self.id.profile_url()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub record: TrackedProfile,
    pub event: Option<NameChange>,
}

/// Merge a fresh snapshot into an existing record. Pure: no I/O, no store
/// access. The change event is computed against the pre-merge history, then
/// the new name is appended (never twice in a row) and the attribute bag is
/// overlaid.
///
/// A record with an empty history (legacy roster files) is seeded from the
/// snapshot without emitting an event.
pub fn reconcile(id: &SteamId, existing: &TrackedProfile, snapshot: &ProfileSnapshot) -> Reconciled {
    let event = match existing.current_name() {
        Some(previous) if previous != snapshot.persona_name => Some(NameChange {
            id: id.clone(),
            original_name: existing.original_name().unwrap_or(previous).to_string(),
            previous_name: previous.to_string(),
            new_name: snapshot.persona_name.clone(),
            has_prior_changes: existing.has_prior_changes(),
        }),
        _ => None,
    };

    let mut record = existing.clone();
    if record.current_name() != Some(snapshot.persona_name.as_str()) {
        record.names.push(snapshot.persona_name.clone());
    }
    record.data = record.data.overlay(&snapshot.attributes);

    Reconciled { record, event }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileAttributes;
    use chrono::{TimeZone, Utc};

    fn id() -> SteamId {
        SteamId::parse("76561198000000001").expect("valid id")
    }

    fn snapshot(name: &str) -> ProfileSnapshot {
        ProfileSnapshot {
            persona_name: name.to_string(),
            attributes: ProfileAttributes {
                steam_level: Some(7),
                ..ProfileAttributes::default()
            },
            observed_at: Utc
                .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn same_name_produces_no_event_but_refreshes_attributes() {
        let profile = TrackedProfile::seeded("alice", None);
        let merged = reconcile(&id(), &profile, &snapshot("alice"));

        assert!(merged.event.is_none());
        assert_eq!(merged.record.names, vec!["alice".to_string()]);
        assert_eq!(merged.record.data.steam_level, Some(7));
    }

    #[test]
    fn changed_name_emits_event_built_from_pre_merge_history() {
        let profile = TrackedProfile::seeded("alice", None);
        let merged = reconcile(&id(), &profile, &snapshot("alicia"));

        let event = merged.event.expect("name change event");
        assert_eq!(event.original_name, "alice");
        assert_eq!(event.previous_name, "alice");
        assert_eq!(event.new_name, "alicia");
        assert!(!event.has_prior_changes);
        assert_eq!(
            merged.record.names,
            vec!["alice".to_string(), "alicia".to_string()]
        );
    }

    #[test]
    fn repeat_of_current_name_is_idempotent() {
        let profile = TrackedProfile::seeded("alice", None);
        let once = reconcile(&id(), &profile, &snapshot("alicia"));
        let twice = reconcile(&id(), &once.record, &snapshot("alicia"));

        assert!(twice.event.is_none());
        assert_eq!(twice.record.names, once.record.names);
    }

    #[test]
    fn later_changes_keep_original_name_and_flag_prior_history() {
        let profile = TrackedProfile::seeded("alice", None);
        let second = reconcile(&id(), &profile, &snapshot("alicia"));
        let third = reconcile(&id(), &second.record, &snapshot("al1cia"));

        let event = third.event.expect("second change event");
        assert_eq!(event.original_name, "alice");
        assert_eq!(event.previous_name, "alicia");
        assert_eq!(event.new_name, "al1cia");
        assert!(event.has_prior_changes);
        assert_eq!(third.record.names[0], "alice");
    }

    #[test]
    fn empty_legacy_history_is_seeded_without_event() {
        let legacy = TrackedProfile {
            names: Vec::new(),
            data: ProfileAttributes::default(),
            notes: None,
        };
        let merged = reconcile(&id(), &legacy, &snapshot("alice"));

        assert!(merged.event.is_none());
        assert_eq!(merged.record.names, vec!["alice".to_string()]);
    }

    #[test]
    fn notes_survive_reconciliation_untouched() {
        let profile = TrackedProfile::seeded("alice", Some("cheater report #4".to_string()));
        let merged = reconcile(&id(), &profile, &snapshot("alicia"));
        assert_eq!(merged.record.notes.as_deref(), Some("cheater report #4"));
    }
}
