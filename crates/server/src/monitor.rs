//! Idle-connection reaper: a background task that rolls back and closes
//! connections that have sat idle past the configured timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use engine::Engine;
use tokio::task::AbortHandle;
use tokio::time::interval;

/// Shared, lock-free-on-the-hot-path view into one connection's liveness,
/// updated by the connection task after every request and read by the
/// monitor without needing to talk to that task directly.
pub struct ConnState {
    last_activity_unix: AtomicI64,
    txn_id: AtomicU32,
    database: Mutex<String>,
}

impl ConnState {
    pub fn new(database: String, now_unix: i64) -> Self {
        Self {
            last_activity_unix: AtomicI64::new(now_unix),
            txn_id: AtomicU32::new(0),
            database: Mutex::new(database),
        }
    }

    pub fn touch(&self, now_unix: i64, txn_id: u32, database: &str) {
        self.last_activity_unix.store(now_unix, Ordering::Relaxed);
        self.txn_id.store(txn_id, Ordering::Relaxed);
        *self.database.lock().unwrap() = database.to_string();
    }
}

struct Entry {
    state: Arc<ConnState>,
    abort: AbortHandle,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<u64, Entry>>,
}

impl ConnectionRegistry {
    pub fn insert(&self, id: u64, state: Arc<ConnState>, abort: AbortHandle) {
        self.entries.lock().unwrap().insert(id, Entry { state, abort });
    }

    pub fn remove(&self, id: u64) {
        self.entries.lock().unwrap().remove(&id);
    }
}

/// Runs until the task is aborted (on server shutdown). Every `5s` it scans
/// the registry for connections idle past `timeout_secs`, force-rolls-back
/// any open transaction, and aborts the owning task.
pub async fn run(engine: Arc<Engine>, registry: Arc<ConnectionRegistry>, timeout_secs: u64) {
    let mut ticker = interval(Duration::from_secs(5));
    loop {
        ticker.tick().await;
        let now = unix_now();
        let mut expired = Vec::new();
        {
            let entries = registry.entries.lock().unwrap();
            for (id, entry) in entries.iter() {
                let idle = now - entry.state.last_activity_unix.load(Ordering::Relaxed);
                if idle >= timeout_secs as i64 {
                    expired.push(*id);
                }
            }
        }
        for id in expired {
            let (txn_id, database, abort) = {
                let entries = registry.entries.lock().unwrap();
                let Some(entry) = entries.get(&id) else { continue };
                (
                    entry.state.txn_id.load(Ordering::Relaxed),
                    entry.state.database.lock().unwrap().clone(),
                    entry.abort.clone(),
                )
            };
            if txn_id != 0 {
                if let Ok(db) = engine.open_or_create(&database) {
                    let _ = db.rollback_txn(txn_id);
                }
            }
            log::info!("closing idle connection {id} (db={database})");
            abort.abort();
            registry.remove(id);
        }
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
