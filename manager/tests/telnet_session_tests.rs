//! Inventory over a real telnet socket against a scripted router process

mod common;

use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use common::fixtures::*;
use upgrade_manager::database::{ConnectionType, JobStatus, NewHost};
use upgrade_manager::executor::WorkUnit;
use upgrade_manager::transport::NetworkDialer;
use upgrade_manager::work_units::InventoryWorkUnit;

const IAC: u8 = 255;
const WILL: u8 = 251;
const ECHO: u8 = 1;
const PROMPT: &str = "RP/0/RSP0/CPU0:tn1#";

/// Reads one line, dropping telnet negotiation triples and carriage returns
async fn read_line(stream: &mut TcpStream) -> Option<String> {
    let mut line = Vec::new();
    let mut skip = 0;
    loop {
        let mut byte = [0u8; 1];
        if stream.read(&mut byte).await.ok()? == 0 {
            return None;
        }
        match byte[0] {
            _ if skip > 0 => skip -= 1,
            IAC => skip = 2,
            b'\r' => {}
            b'\n' => return Some(String::from_utf8_lossy(&line).to_string()),
            b => line.push(b),
        }
    }
}

fn answer(command: &str) -> String {
    let body = match command {
        "admin show install active summary" => outputs::ACTIVE_SUMMARY,
        "admin show install inactive summary" => outputs::INACTIVE_SUMMARY,
        "admin show install committed summary" => outputs::COMMITTED_SUMMARY,
        _ => "",
    };
    format!("{}\r\n{}\r\n{}", command, body.replace('\n', "\r\n"), PROMPT)
}

async fn serve_router(mut stream: TcpStream) {
    let banner = [
        &[IAC, WILL, ECHO][..],
        b"\r\n\r\nUser Access Verification\r\n\r\nUsername: ",
    ]
    .concat();
    if stream.write_all(&banner).await.is_err() {
        return;
    }
    let Some(username) = read_line(&mut stream).await else { return };
    let _ = stream.write_all(b"\r\nPassword: ").await;
    let Some(password) = read_line(&mut stream).await else { return };

    if username != login::USERNAME || password != login::PASSWORD {
        let _ = stream.write_all(b"\r\n% Authentication failed\r\n").await;
        return;
    }
    let _ = stream.write_all(format!("\r\n\r\n{}", PROMPT).as_bytes()).await;

    while let Some(command) = read_line(&mut stream).await {
        if stream.write_all(answer(&command).as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Listens on an ephemeral port and serves every connection
async fn spawn_router() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_router(stream));
        }
    });
    port
}

/// A port nothing listens on
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn add_telnet_host(store: &TestDatabase, ports: &str, password: &str) -> i64 {
    store
        .db()
        .create_host(&NewHost {
            hostname: "tn1".to_string(),
            platform: "ASR9K".to_string(),
            region_id: None,
            roles: "PE".to_string(),
            host_or_ip: "127.0.0.1".to_string(),
            username: login::USERNAME.to_string(),
            password: password.to_string(),
            connection_type: ConnectionType::Telnet,
            port_number: ports.to_string(),
            jump_host_id: None,
        })
        .await
        .unwrap()
}

async fn run_inventory(store: &TestDatabase, host_id: i64, logs: &TempDir) {
    let ctx = store
        .unit_context(Arc::new(NetworkDialer), logs.path(), "")
        .unwrap();
    InventoryWorkUnit::new(host_id, ctx).run().await;
}

#[tokio::test]
async fn inventory_over_telnet_stores_the_package_set() {
    let port = spawn_router().await;
    let store = TestDatabase::new().await.unwrap();
    let logs = TempDir::new().unwrap();
    let host_id = add_telnet_host(&store, &port.to_string(), login::PASSWORD).await;

    run_inventory(&store, host_id, &logs).await;

    let history = store.db().list_inventory_history(host_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, JobStatus::Completed, "trace: {:?}", history[0].trace);

    let packages = store.db().get_packages(host_id).await.unwrap();
    assert_eq!(packages.len(), 4);
    let host = store.db().get_host(host_id).await.unwrap().unwrap();
    assert_eq!(host.software_version.as_deref(), Some("5.3.3"));

    let inventory = store.db().get_inventory_job(host_id).await.unwrap().unwrap();
    assert!(!inventory.pending_submit);
}

#[tokio::test]
async fn next_port_is_tried_after_a_refused_one() {
    let open = spawn_router().await;
    let closed = closed_port().await;
    let store = TestDatabase::new().await.unwrap();
    let logs = TempDir::new().unwrap();
    let host_id = add_telnet_host(&store, &format!("{},{}", closed, open), login::PASSWORD).await;

    run_inventory(&store, host_id, &logs).await;

    let history = store.db().list_inventory_history(host_id).await.unwrap();
    assert_eq!(history[0].status, JobStatus::Completed, "trace: {:?}", history[0].trace);
}

#[tokio::test]
async fn refused_connection_fails_the_inventory() {
    let closed = closed_port().await;
    let store = TestDatabase::new().await.unwrap();
    let logs = TempDir::new().unwrap();
    let host_id = add_telnet_host(&store, &closed.to_string(), login::PASSWORD).await;

    run_inventory(&store, host_id, &logs).await;

    let history = store.db().list_inventory_history(host_id).await.unwrap();
    assert_eq!(history[0].status, JobStatus::Failed);
    assert!(history[0].trace.as_deref().unwrap().starts_with("ConnectFailed"));
    assert!(store.db().get_packages(host_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn wrong_password_over_telnet_is_an_auth_failure() {
    let port = spawn_router().await;
    let store = TestDatabase::new().await.unwrap();
    let logs = TempDir::new().unwrap();
    let host_id = add_telnet_host(&store, &port.to_string(), "not-the-password").await;

    run_inventory(&store, host_id, &logs).await;

    let history = store.db().list_inventory_history(host_id).await.unwrap();
    assert_eq!(history[0].status, JobStatus::Failed);
    assert!(history[0].trace.as_deref().unwrap().starts_with("AuthFailed"));

    let logs = store.db().list_system_logs(5).await.unwrap();
    assert!(logs.iter().any(|l| l.msg == "Inventory of tn1 failed"));
}
