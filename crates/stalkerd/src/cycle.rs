use crate::notifier::Notifier;
use stalker_core::{reconcile, SteamId};
use stalker_steam::ProfileFetcher;
use stalker_storage::{ApplyOutcome, RosterStore};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Per-cycle counters, one line in the log per finished cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub changed: usize,
    pub fetch_failures: usize,
    pub notify_failures: usize,
    pub dropped_stale: usize,
    pub persist_failures: usize,
}

/// One reconciliation cycle: snapshot the tracked id set (or the single
/// target), fetch, then merge each snapshot and notify per change. Fetch
/// and notify happen outside the store lock; the diff and the persisted
/// write share one critical section so no suspension can interleave them.
/// Any per-identity failure is counted and the cycle moves on.
pub async fn run_cycle(
    store: &Mutex<RosterStore>,
    fetcher: &dyn ProfileFetcher,
    notifier: &dyn Notifier,
    target: Option<&SteamId>,
) -> CycleReport {
    let mut report = CycleReport::default();

    let ids = {
        let mut store = store.lock().await;
        store.begin_cycle();
        match target {
            Some(id) if store.get(id).is_some() => vec![id.clone()],
            Some(_) => Vec::new(),
            None => store.tracked_ids(),
        }
    };
    if ids.is_empty() {
        return report;
    }

    let snapshots = fetcher.fetch_snapshots(&ids).await;

    for (id, result) in snapshots {
        report.checked += 1;
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                report.fetch_failures += 1;
                warn!(event = "fetch_failed", id = %id, error = %err);
                continue;
            }
        };

        let event = {
            let mut store = store.lock().await;
            let Some(existing) = store.get(&id) else {
                // Removed while the fetch was in flight.
                report.dropped_stale += 1;
                continue;
            };
            let merged = reconcile(&id, existing, &snapshot);
            match store.apply_reconciliation(&id, merged.record) {
                Ok(ApplyOutcome::Applied) => merged.event,
                Ok(ApplyOutcome::SkippedTombstoned) | Ok(ApplyOutcome::SkippedUntracked) => {
                    report.dropped_stale += 1;
                    None
                }
                Err(err) => {
                    report.persist_failures += 1;
                    error!(event = "persist_failed", id = %id, error = %err);
                    None
                }
            }
        };

        if let Some(event) = event {
            report.changed += 1;
            if let Err(err) = notifier.notify(&event).await {
                report.notify_failures += 1;
                warn!(event = "notify_failed", id = %event.id, error = %err);
            }
        }
    }

    info!(
        event = "cycle_done",
        checked = report.checked,
        changed = report.changed,
        fetch_failures = report.fetch_failures,
        notify_failures = report.notify_failures,
        dropped_stale = report.dropped_stale,
        persist_failures = report.persist_failures,
    );
    report
}
