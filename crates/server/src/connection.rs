//! Per-connection request loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use engine::Engine;
use pipeline::{execute, force_rollback, parse, Response, Session};
use protocol::{line_too_long_frame, over_capacity_frame, read_frame, welcome_frame, write_frame};
use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::monitor::{ConnState, ConnectionRegistry};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub const DEFAULT_DATABASE: &str = "default";

pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub async fn reject_over_capacity(mut socket: TcpStream) -> std::io::Result<()> {
    write_frame(&mut socket, &over_capacity_frame()).await?;
    Ok(())
}

/// Runs the read-dispatch-write loop for one accepted socket until the
/// client disconnects, sends `meta exit`, or the monitor reaps it for
/// idleness. `id`/`state` are pre-registered by the caller so the
/// registry's abort handle is available before this future is polled.
pub async fn handle(
    socket: TcpStream,
    peer: std::net::SocketAddr,
    engine: Arc<Engine>,
    registry: Arc<ConnectionRegistry>,
    id: u64,
    state: Arc<ConnState>,
) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    if write_frame(&mut write_half, &welcome_frame()).await.is_err() {
        registry.remove(id);
        return;
    }

    let mut session = Session::new(DEFAULT_DATABASE);

    log::info!("connection {id} from {peer} opened");

    loop {
        let line = match read_frame(&mut reader).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(_) => {
                let _ = write_frame(&mut write_half, &line_too_long_frame()).await;
                break;
            }
        };

        let outcome = match parse(&line) {
            Ok(stmt) => execute(&engine, &mut session, stmt),
            Err(e) => pipeline::Outcome::reply(Response::error(format!("invalid request: {e}"))),
        };

        if write_frame(&mut write_half, &outcome.response.to_frame()).await.is_err() {
            break;
        }

        state.touch(unix_now(), session.txn_id, &session.database);

        if outcome.close {
            break;
        }
    }

    force_rollback(&engine, &mut session);
    registry.remove(id);
    log::info!("connection {id} from {peer} closed");
}
