//! End-to-end tests for the request server: spawn the real binary against
//! a temporary data directory, talk newline-JSON over a raw TCP socket.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

struct TestServer {
    child: Child,
    port: u16,
    _dir: tempfile::TempDir,
}

impl TestServer {
    fn start() -> Self {
        Self::start_with_timeout(60)
    }

    fn start_with_timeout(connection_timeout_secs: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port();
        let child = Command::new(env!("CARGO_BIN_EXE_toydb-server"))
            .args([
                "--host",
                "127.0.0.1",
                "--port",
                &port.to_string(),
                "--data-dir",
            ])
            .arg(dir.path())
            .args(["--bootstrap-admin-password", "adminpw"])
            .args(["--connection-timeout-secs", &connection_timeout_secs.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to start server binary");

        wait_for_port(port);
        Self { child, port, _dir: dir }
    }

    fn connect(&self) -> Connection {
        let stream = TcpStream::connect(("127.0.0.1", self.port)).expect("connect");
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut welcome = String::new();
        reader.read_line(&mut welcome).expect("welcome frame");
        Connection { stream, reader }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct Connection {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Connection {
    fn send(&mut self, request: serde_json::Value) -> serde_json::Value {
        let mut line = request.to_string();
        line.push('\n');
        self.stream.write_all(line.as_bytes()).unwrap();
        let mut response = String::new();
        self.reader.read_line(&mut response).expect("response frame");
        serde_json::from_str(&response).expect("valid JSON response")
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn wait_for_port(port: u16) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("server never started listening on {port}");
}

#[test]
fn create_insert_select_round_trip_over_the_wire() {
    let server = TestServer::start();
    let mut conn = server.connect();

    let created = conn.send(serde_json::json!({
        "command": "create_table",
        "table": "users",
        "columns": [
            {"name": "id", "type": "INT"},
            {"name": "name", "type": "STRING", "size": 32},
        ],
    }));
    assert_eq!(created["status"], "success");

    let inserted = conn.send(serde_json::json!({
        "command": "insert",
        "table": "users",
        "values": [1, "alice"],
    }));
    assert_eq!(inserted["status"], "success");
    assert_eq!(inserted["affected_rows"], 1);

    let selected = conn.send(serde_json::json!({"command": "select", "table": "users"}));
    assert_eq!(selected["status"], "success");
    assert_eq!(selected["count"], 1);
    assert_eq!(selected["results"][0]["name"], "alice");
}

#[test]
fn duplicate_primary_key_is_reported_as_an_error() {
    let server = TestServer::start();
    let mut conn = server.connect();

    conn.send(serde_json::json!({
        "command": "create_table",
        "table": "accounts",
        "columns": [{"name": "id", "type": "INT"}],
    }));
    conn.send(serde_json::json!({"command": "insert", "table": "accounts", "values": [1]}));
    let dup = conn.send(serde_json::json!({"command": "insert", "table": "accounts", "values": [1]}));
    assert_eq!(dup["status"], "error");
}

#[test]
fn meta_exit_closes_the_connection() {
    let server = TestServer::start();
    let mut conn = server.connect();

    let response = conn.send(serde_json::json!({"command": "meta", "meta_command": "exit"}));
    assert_eq!(response["status"], "success");

    let mut leftover = String::new();
    let n = conn.reader.read_line(&mut leftover).unwrap_or(0);
    assert_eq!(n, 0, "connection should be closed after meta exit");
}

#[test]
fn login_is_required_for_writes_once_auth_is_enabled() {
    let server = TestServer::start();
    let mut conn = server.connect();

    conn.send(serde_json::json!({
        "command": "create_table",
        "table": "secrets",
        "columns": [{"name": "id", "type": "INT"}],
    }));
    conn.send(serde_json::json!({"command": "enable_auth"}));
    conn.send(serde_json::json!({"command": "logout"}));

    let denied = conn.send(serde_json::json!({"command": "insert", "table": "secrets", "values": [1]}));
    assert_eq!(denied["status"], "error");

    let login = conn.send(serde_json::json!({
        "command": "login",
        "username": "admin",
        "password": "adminpw",
    }));
    assert_eq!(login["status"], "success");

    let allowed = conn.send(serde_json::json!({"command": "insert", "table": "secrets", "values": [1]}));
    assert_eq!(allowed["status"], "success");
}

#[test]
fn idle_connection_is_reaped_and_its_open_transaction_rolled_back() {
    let server = TestServer::start_with_timeout(1);
    let mut conn = server.connect();

    conn.send(serde_json::json!({
        "command": "create_table",
        "table": "counters",
        "columns": [{"name": "id", "type": "INT"}, {"name": "n", "type": "INT"}],
    }));
    conn.send(serde_json::json!({"command": "insert", "table": "counters", "values": [1, 0]}));

    let begin = conn.send(serde_json::json!({"command": "meta", "meta_command": "txn begin"}));
    assert_eq!(begin["status"], "success");

    conn.send(serde_json::json!({
        "command": "update",
        "table": "counters",
        "column": "n",
        "value": 99,
        "where": {"column": "id", "operator": "=", "value": 1},
    }));

    // Sit idle past the configured timeout. The monitor only scans once per
    // its own 5s tick, so wait out a full tick plus the timeout to guarantee
    // at least one sweep has run since the connection went idle.
    std::thread::sleep(Duration::from_secs(7));

    let mut leftover = String::new();
    let n = conn.reader.read_line(&mut leftover).unwrap_or(0);
    assert_eq!(n, 0, "idle connection should have been closed by the monitor");

    let mut fresh = server.connect();
    let selected = fresh.send(serde_json::json!({"command": "select", "table": "counters"}));
    assert_eq!(selected["status"], "success");
    assert_eq!(selected["results"][0]["n"], 0, "uncommitted update must have been rolled back");
}
