//! TCP server for the relational store.
//!
//! An acceptor task binds a port and hands each socket to a worker bounded
//! by a semaphore-backed pool; a monitor task reaps connections that sit
//! idle past `connection_timeout_secs`, rolling back whatever transaction
//! they left open.

mod connection;
mod monitor;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use common::Config;
use engine::Engine;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Semaphore;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9876;

#[derive(Parser, Debug)]
#[command(name = "toydb-server", about = "TCP server for the relational store")]
struct Args {
    /// Host address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Root directory holding Database/<db>/... trees
    #[arg(long, default_value = "./Database")]
    data_dir: PathBuf,

    /// Bound on concurrently-running connection handlers
    #[arg(long, default_value_t = 8)]
    worker_threads: usize,

    /// Maximum accepted connections before new sockets are rejected
    #[arg(long, default_value_t = 100)]
    max_connections: usize,

    /// Idle seconds after which a connection's transaction is rolled back
    /// and the socket closed
    #[arg(long, default_value_t = 60)]
    connection_timeout_secs: u64,

    /// Password assigned to the bootstrap "admin" user on first run
    #[arg(long, default_value = "admin")]
    bootstrap_admin_password: String,

    /// Enable ACL permission enforcement for every database opened. Off by
    /// default: a freshly-opened database permits every operation until
    /// `enable_auth` is issued against it.
    #[arg(long, default_value_t = false)]
    enable_acl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = Config::builder()
        .data_dir(args.data_dir.clone())
        .worker_threads(args.worker_threads)
        .max_connections(args.max_connections)
        .connection_timeout_secs(args.connection_timeout_secs)
        .acl_enabled(args.enable_acl)
        .build();

    let engine = Arc::new(
        Engine::new(config.data_dir.clone(), args.bootstrap_admin_password.clone())
            .with_acl_enabled_default(config.acl_enabled),
    );
    let registry = Arc::new(monitor::ConnectionRegistry::default());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}, data_dir={}", config.data_dir.display());

    let monitor_handle = tokio::spawn(monitor::run(
        engine.clone(),
        registry.clone(),
        config.connection_timeout_secs,
    ));
    let accept_handle = tokio::spawn(run_acceptor(listener, engine, registry, config));

    signal::ctrl_c().await?;
    log::info!("shutdown signal received");
    monitor_handle.abort();
    accept_handle.abort();
    Ok(())
}

/// Accepts sockets and hands each to its own task, bounded by a semaphore
/// sized to `config.max_connections`. Once the pool is saturated, new
/// sockets get an error frame and are closed immediately.
async fn run_acceptor(
    listener: TcpListener,
    engine: Arc<Engine>,
    registry: Arc<monitor::ConnectionRegistry>,
    config: Config,
) {
    let permits = Arc::new(Semaphore::new(config.max_connections));
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };

        let permit = match permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                log::warn!("rejecting {peer}: worker pool at capacity");
                let _ = connection::reject_over_capacity(socket).await;
                continue;
            }
        };

        let id = connection::next_id();
        let state = Arc::new(monitor::ConnState::new(
            connection::DEFAULT_DATABASE.to_string(),
            connection::unix_now(),
        ));

        let task_engine = engine.clone();
        let task_registry = registry.clone();
        let task_state = state.clone();
        let join = tokio::spawn(async move {
            let _permit = permit;
            connection::handle(socket, peer, task_engine, task_registry, id, task_state).await;
        });
        registry.insert(id, state, join.abort_handle());
    }
}
