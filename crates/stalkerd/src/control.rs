use stalker_core::control::{
    decode_frame, encode_frame, ControlErrorCode, ControlRequest, ControlResponse, ProfileEntry,
    DEFAULT_MAX_FRAME_BYTES,
};
use stalker_core::{ProfileQuery, SteamId};
use stalker_steam::{resolve_query, ProfileFetcher};
use stalker_storage::{AddOutcome, RemoveOutcome, RosterStore};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, info, warn};

/// Ask the scheduler loop for an immediate targeted cycle. `done` resolves
/// once that cycle has run (used by `check`, dropped by `add`).
pub struct CycleRequest {
    pub target: SteamId,
    pub done: Option<oneshot::Sender<()>>,
}

#[derive(Clone)]
pub struct ControlContext {
    pub store: Arc<Mutex<RosterStore>>,
    pub fetcher: Arc<dyn ProfileFetcher>,
    pub cycle_tx: mpsc::Sender<CycleRequest>,
}

/// Control socket server: one NDJSON request per line, one response line
/// back. Connections are independent; a bad frame fails that request only.
pub async fn serve(
    socket_path: PathBuf,
    ctx: ControlContext,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)?;
        let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
    }
    if socket_path.exists() {
        let _ = fs::remove_file(&socket_path);
    }

    let listener = UnixListener::bind(&socket_path)?;
    let _ = fs::set_permissions(&socket_path, fs::Permissions::from_mode(0o600));
    info!(event = "control_listening", socket = %socket_path.display());

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_ok() && *shutdown.borrow() {
                    break;
                }
            }
            accept = listener.accept() => {
                match accept {
                    Ok((stream, _addr)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, ctx).await;
                        });
                    }
                    Err(err) => {
                        warn!(event = "control_accept_error", error = %err);
                    }
                }
            }
        }
    }
    Ok(())
}

async fn handle_connection(stream: UnixStream, ctx: ControlContext) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let response =
                    match decode_frame::<ControlRequest>(line.as_bytes(), DEFAULT_MAX_FRAME_BYTES)
                    {
                        Ok(request) => handle_request(request, &ctx).await,
                        Err(err) => ControlResponse::Error {
                            code: ControlErrorCode::MalformedRequest,
                            message: err.to_string(),
                        },
                    };
                match encode_frame(&response, DEFAULT_MAX_FRAME_BYTES) {
                    Ok(frame) => {
                        if write_half.write_all(&frame).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(event = "control_encode_error", error = %err);
                        break;
                    }
                }
            }
            Err(err) => {
                debug!(event = "control_read_error", error = %err);
                break;
            }
        }
    }
}

pub async fn handle_request(request: ControlRequest, ctx: &ControlContext) -> ControlResponse {
    match request {
        ControlRequest::Add { query, notes } => handle_add(&query, notes, ctx).await,
        ControlRequest::Remove { id } => handle_remove(&id, ctx).await,
        ControlRequest::List => handle_list(ctx).await,
        ControlRequest::Check { query } => handle_check(&query, ctx).await,
    }
}

/// Turn operator input into a SteamID64, resolving vanity names through
/// the fetcher. Failures come back as ready-made error responses.
async fn resolve_reference(query: &str, ctx: &ControlContext) -> Result<SteamId, ControlResponse> {
    let parsed = match ProfileQuery::parse(query) {
        Ok(parsed) => parsed,
        Err(err) => {
            return Err(ControlResponse::Error {
                code: ControlErrorCode::InvalidReference,
                message: err.to_string(),
            })
        }
    };
    match resolve_query(ctx.fetcher.as_ref(), &parsed).await {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(ControlResponse::Error {
            code: ControlErrorCode::UnknownVanity,
            message: format!("no profile behind {query}"),
        }),
        Err(err) => Err(ControlResponse::Error {
            code: ControlErrorCode::ResolveFailed,
            message: err.to_string(),
        }),
    }
}

async fn handle_add(query: &str, notes: Option<String>, ctx: &ControlContext) -> ControlResponse {
    let id = match resolve_reference(query, ctx).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    // Seed with the name the profile carries right now.
    let mut snapshots = ctx.fetcher.fetch_snapshots(std::slice::from_ref(&id)).await;
    let snapshot = match snapshots.remove(&id) {
        Some(Ok(snapshot)) => snapshot,
        Some(Err(err)) => {
            return ControlResponse::Error {
                code: ControlErrorCode::FetchFailed,
                message: err.to_string(),
            }
        }
        None => {
            return ControlResponse::Error {
                code: ControlErrorCode::FetchFailed,
                message: format!("no snapshot returned for {id}"),
            }
        }
    };

    let outcome = ctx
        .store
        .lock()
        .await
        .add(id.clone(), &snapshot.persona_name, notes);
    match outcome {
        Ok(AddOutcome::Created) => {
            // Immediate targeted cycle fills in the attribute bag.
            let _ = ctx
                .cycle_tx
                .send(CycleRequest {
                    target: id.clone(),
                    done: None,
                })
                .await;
            ControlResponse::Added {
                id,
                name: snapshot.persona_name,
            }
        }
        Ok(AddOutcome::AlreadyExists) => ControlResponse::AlreadyTracked { id },
        Err(err) => ControlResponse::Error {
            code: ControlErrorCode::Storage,
            message: err.to_string(),
        },
    }
}

async fn handle_remove(raw_id: &str, ctx: &ControlContext) -> ControlResponse {
    let id = match SteamId::parse(raw_id) {
        Ok(id) => id,
        Err(err) => {
            return ControlResponse::Error {
                code: ControlErrorCode::InvalidReference,
                message: err.to_string(),
            }
        }
    };
    match ctx.store.lock().await.remove(&id) {
        Ok(RemoveOutcome::Removed(_)) => ControlResponse::Removed { id },
        Ok(RemoveOutcome::NotFound) => ControlResponse::NotTracked { id },
        Err(err) => ControlResponse::Error {
            code: ControlErrorCode::Storage,
            message: err.to_string(),
        },
    }
}

async fn handle_list(ctx: &ControlContext) -> ControlResponse {
    let profiles = ctx
        .store
        .lock()
        .await
        .list_all()
        .into_iter()
        .map(|(id, profile)| ProfileEntry { id, profile })
        .collect();
    ControlResponse::Listing { profiles }
}

async fn handle_check(query: &str, ctx: &ControlContext) -> ControlResponse {
    let id = match resolve_reference(query, ctx).await {
        Ok(id) => id,
        Err(response) => return response,
    };
    let tracked = ctx.store.lock().await.get(&id).is_some();
    if !tracked {
        return ControlResponse::NotTracked { id };
    }

    let (done_tx, done_rx) = oneshot::channel();
    let sent = ctx
        .cycle_tx
        .send(CycleRequest {
            target: id.clone(),
            done: Some(done_tx),
        })
        .await;
    if sent.is_err() || done_rx.await.is_err() {
        return ControlResponse::Error {
            code: ControlErrorCode::Internal,
            message: "scheduler is not running".to_string(),
        };
    }

    match ctx.store.lock().await.get(&id) {
        Some(profile) => ControlResponse::Checked {
            profile: ProfileEntry {
                id: id.clone(),
                profile: profile.clone(),
            },
        },
        None => ControlResponse::NotTracked { id },
    }
}
