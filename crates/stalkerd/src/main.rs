use anyhow::{bail, Context, Result};
use clap::Parser;
use fs2::FileExt;
use stalker_core::control::default_socket_path;
use stalker_core::SteamId;
use stalker_steam::{ProfileFetcher, SteamWebApi};
use stalker_storage::{JsonFileGateway, RosterStore};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod control;
mod cycle;
mod notifier;
mod scheduler;

use config::LoadedConfig;
use control::CycleRequest;
use notifier::{LogNotifier, Notifier, WebhookNotifier};
use scheduler::{CycleQueue, CycleSpec};

#[derive(Parser, Debug)]
#[command(name = "stalkerd", about = "Watches Steam profiles for display-name changes")]
struct Args {
    /// Configuration file; created with defaults on first run
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Roster file holding the tracked profiles
    #[arg(long, default_value = "data.json")]
    data: PathBuf,

    /// Control socket; defaults to $XDG_STATE_HOME/stalkerd/control.sock
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Poll every minute and log verbosely
    #[arg(long, default_value_t = false)]
    debug: bool,
}

/// Advisory lock beside the roster file so a second daemon instance cannot
/// interleave writes with this one.
struct InstanceLock {
    file: File,
}

impl InstanceLock {
    fn acquire(data_path: &Path) -> Result<Self> {
        let lock_path = data_path.with_extension("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)
            .with_context(|| format!("could not open {}", lock_path.display()))?;
        if file.try_lock_exclusive().is_err() {
            bail!(
                "{} is locked; is another stalkerd already running?",
                lock_path.display()
            );
        }
        Ok(Self { file })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match config::load_or_init(&args.config)? {
        LoadedConfig::Ready(config) => config,
        LoadedConfig::Initialized(path) => {
            eprintln!(
                "Wrote a default config to {}. Fill in apiKey and webhookUrl, then start again.",
                path.display()
            );
            return Ok(());
        }
    };
    let debug = args.debug || config.debug;
    init_logging(debug);
    if config.is_unconfigured() {
        warn!(event = "api_key_unconfigured", config = %args.config.display());
    }

    let _instance_lock = InstanceLock::acquire(&args.data)?;

    let store = RosterStore::open(Box::new(JsonFileGateway::new(&args.data)))
        .with_context(|| format!("failed to load roster from {}", args.data.display()))?;
    info!(event = "roster_loaded", profiles = store.len());
    let store = Arc::new(Mutex::new(store));

    let fetcher: Arc<dyn ProfileFetcher> = Arc::new(SteamWebApi::new(&config.api_key)?);
    let notifier: Arc<dyn Notifier> = if config.webhook_url.trim().is_empty() {
        warn!(event = "webhook_unconfigured");
        Arc::new(LogNotifier)
    } else {
        Arc::new(WebhookNotifier::new(&config.webhook_url)?)
    };

    let (cycle_tx, cycle_rx) = mpsc::channel::<CycleRequest>(32);
    // Held here so the scheduler's receiver never sees a closed channel,
    // even if the control server goes down.
    let _cycle_tx = cycle_tx.clone();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let socket_path = args.socket.clone().unwrap_or_else(default_socket_path);
    let control_task = tokio::spawn(control::serve(
        socket_path.clone(),
        control::ControlContext {
            store: store.clone(),
            fetcher: fetcher.clone(),
            cycle_tx,
        },
        shutdown_rx,
    ));

    let poll_interval = config.poll_interval();
    info!(
        event = "stalkerd_start",
        interval_secs = poll_interval.as_secs(),
        socket = %socket_path.display(),
    );

    run_scheduler(&store, fetcher.as_ref(), notifier.as_ref(), poll_interval, cycle_rx).await;

    info!(event = "stalkerd_stop");
    let _ = shutdown_tx.send(true);
    let _ = control_task.await;
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

/// Drives the cycle queue: the interval requests sweeps (the first tick
/// fires immediately, seeding attributes right after startup), control
/// requests enqueue targeted cycles, and ctrl-c ends the loop. Cycles run
/// one at a time; `check` waiters are released when their target's cycle
/// finishes.
async fn run_scheduler(
    store: &Mutex<RosterStore>,
    fetcher: &dyn ProfileFetcher,
    notifier: &dyn Notifier,
    poll_interval: std::time::Duration,
    mut cycle_rx: mpsc::Receiver<CycleRequest>,
) {
    let mut queue = CycleQueue::default();
    let mut ticker = tokio::time::interval(poll_interval);
    let mut waiters: Vec<(SteamId, oneshot::Sender<()>)> = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                queue.request_sweep();
            }
            request = cycle_rx.recv() => {
                let Some(request) = request else { continue };
                if let Some(done) = request.done {
                    waiters.push((request.target.clone(), done));
                }
                queue.request_target(request.target);
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }

        while let Some(spec) = queue.claim() {
            let target = match &spec {
                CycleSpec::Sweep => None,
                CycleSpec::Targeted(id) => Some(id.clone()),
            };
            let report =
                cycle::run_cycle(store, fetcher, notifier, target.as_ref()).await;
            debug!(event = "cycle_report", ?report);

            if let CycleSpec::Targeted(id) = &spec {
                let mut index = 0;
                while index < waiters.len() {
                    if waiters[index].0 == *id {
                        let (_, done) = waiters.swap_remove(index);
                        let _ = done.send(());
                    } else {
                        index += 1;
                    }
                }
            }
            queue.complete();
        }
    }
}
