//! PipeKV Server Binary
//!
//! Runs every job in a directory, then keeps serving client sessions on a
//! named-pipe registration channel. `SIGUSR1` disconnects every live
//! session.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use pipekv::network::{FifoChannels, Server};
use pipekv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// PipeKV Server
#[derive(Parser, Debug)]
#[command(name = "pipekv-server")]
#[command(about = "Sharded in-memory key-value store with job scripts and subscriptions")]
#[command(version)]
struct Args {
    /// Directory holding the .job files
    jobs_dir: PathBuf,

    /// Maximum concurrent backups (0 disables BACKUP)
    max_backups: usize,

    /// Job worker threads
    max_threads: usize,

    /// Path of the registration FIFO clients connect through
    registration: PathBuf,

    /// Session workers, pending-connection bound, and subscribers per key
    #[arg(long, default_value_t = pipekv::config::DEFAULT_MAX_SESSIONS)]
    max_sessions: usize,
}

/// Set from the SIGUSR1 handler, cleared by the watcher thread
static DISCONNECT_REQUESTED: AtomicBool = AtomicBool::new(false);

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pipekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("PipeKV Server v{}", pipekv::VERSION);
    tracing::info!("Jobs directory: {}", args.jobs_dir.display());
    tracing::info!("Registration channel: {}", args.registration.display());

    let config = Config::builder()
        .jobs_dir(&args.jobs_dir)
        .max_backups(args.max_backups)
        .max_job_workers(args.max_threads)
        .registration_channel(&args.registration)
        .max_sessions(args.max_sessions)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = pipekv::network::create_fifo(&args.registration) {
        tracing::error!(
            "Failed to create registration channel {}: {}",
            args.registration.display(),
            e
        );
        std::process::exit(1);
    }

    let mut server = engine.server(Arc::new(FifoChannels));
    if let Err(e) = server.start() {
        tracing::error!("Failed to start session workers: {}", e);
        std::process::exit(1);
    }
    let server = Arc::new(server);

    if let Err(e) = install_disconnect_handler() {
        tracing::warn!("SIGUSR1 handler not installed: {}", e);
    }
    spawn_disconnect_watcher(Arc::clone(&server));

    let listener = {
        let server = Arc::clone(&server);
        thread::Builder::new()
            .name("registration-listener".into())
            .spawn(move || {
                if let Err(e) = server.listen() {
                    tracing::error!("Registration listener stopped: {}", e);
                }
            })
    };
    let listener = match listener {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to start registration listener: {}", e);
            std::process::exit(1);
        }
    };

    match engine.run_jobs() {
        Ok(report) => tracing::info!(
            "Processed {} jobs ({} failed)",
            report.total(),
            report.failed
        ),
        Err(e) => tracing::error!("Failed to run jobs: {}", e),
    }
    engine.backups().wait_all();
    tracing::info!("All backups finished; serving sessions");

    if listener.join().is_err() {
        tracing::error!("Registration listener panicked");
    }
    engine.close();
    tracing::info!("Server stopped");
}

extern "C" fn on_sigusr1(_: nix::libc::c_int) {
    DISCONNECT_REQUESTED.store(true, Ordering::SeqCst);
}

/// Route SIGUSR1 to the atomic flag. `SA_RESTART` keeps blocked channel
/// reads from failing with `EINTR`.
fn install_disconnect_handler() -> nix::Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let action = SigAction::new(
        SigHandler::Handler(on_sigusr1),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to an atomic
    unsafe { sigaction(Signal::SIGUSR1, &action) }.map(|_| ())
}

fn spawn_disconnect_watcher(server: Arc<Server>) {
    let spawned = thread::Builder::new()
        .name("disconnect-watcher".into())
        .spawn(move || loop {
            if DISCONNECT_REQUESTED.swap(false, Ordering::SeqCst) {
                tracing::info!("Received SIGUSR1, disconnecting all sessions");
                server.disconnect_all();
            }
            thread::sleep(Duration::from_millis(100));
        });
    if let Err(e) = spawned {
        tracing::warn!("Failed to start disconnect watcher: {}", e);
    }
}
