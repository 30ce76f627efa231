//! Session mode changes and hop chains against scripted fake routers

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::fixtures::*;
use upgrade_manager::database::ConnectionType;
use upgrade_manager::device::{ConfigExit, DeviceSession, PromptSet, SessionState};
use upgrade_manager::errors::DeviceError;
use upgrade_manager::transport::{HopUrl, SessionLog, Terminal};

const TIMEOUT: Duration = Duration::from_millis(300);

fn telnet_hop(address: &str, username: &str, password: &str) -> HopUrl {
    HopUrl {
        scheme: ConnectionType::Telnet,
        username: username.to_string(),
        password: Some(password.to_string()),
        host: address.to_string(),
        port: None,
    }
}

fn device_hop(address: &str) -> HopUrl {
    telnet_hop(address, login::USERNAME, login::PASSWORD)
}

async fn session_over(dialer: Arc<FakeDialer>, hops: Vec<HopUrl>) -> DeviceSession {
    let terminal = Terminal::new(hops, dialer, SessionLog::disabled(), TIMEOUT);
    let mut session = DeviceSession::new(terminal, PromptSet::classic_xr().unwrap(), TIMEOUT);
    session.connect().await.unwrap();
    session
}

async fn connected(router: &Arc<FakeRouter>) -> DeviceSession {
    let dialer = FakeDialer::new();
    dialer.add("10.0.0.1", router.clone());
    session_over(dialer, vec![device_hop("10.0.0.1")]).await
}

#[tokio::test]
async fn elevated_command_runs_in_admin_and_returns_to_exec() {
    let router = FakeRouter::new(hosts::PE1);
    router.reply("show platform", &["0/RSP0/CPU0  A9K-RSP440-SE(Active)  IOS XR RUN"]);
    let mut session = connected(&router).await;

    let output = session.execute_elevated("show platform").await.unwrap();

    assert!(output.contains("IOS XR RUN"));
    assert_eq!(session.state(), SessionState::Exec);
    assert_eq!(session.elevated_commands(), ["show platform".to_string()]);
    assert_eq!(
        router.received(),
        vec!["terminal length 0", "admin", "show platform", "exit"]
    );

    // Exec commands work again after leaving admin
    router.reply("show version", &[outputs::SHOW_VERSION_XR5]);
    assert!(session.execute("show version").await.unwrap().contains("5.3.3"));
}

#[tokio::test]
async fn admin_mode_is_left_explicitly() {
    let router = FakeRouter::new(hosts::PE1);
    let mut session = connected(&router).await;

    session.enter_admin().await.unwrap();
    assert_eq!(session.state(), SessionState::Admin);
    // Configuration is only entered from exec
    let err = session.enter_config().await.unwrap_err();
    assert_eq!(err.kind(), "DeviceOperationFailed");

    session.exit_admin().await.unwrap();
    assert_eq!(session.state(), SessionState::Exec);
    assert_eq!(router.received_matching("exit").len(), 1);
}

#[tokio::test]
async fn committed_configuration_returns_to_exec() {
    let router = FakeRouter::new(hosts::PE1);
    router
        .reply("hostname", &[""])
        .reply("commit", &[""]);
    let mut session = connected(&router).await;

    session.enter_config().await.unwrap();
    assert_eq!(session.state(), SessionState::Config);
    session.execute("hostname pe1-new").await.unwrap();
    session.leave_config(ConfigExit::Commit).await.unwrap();

    assert_eq!(session.state(), SessionState::Exec);
    assert_eq!(
        router.received(),
        vec!["terminal length 0", "configure", "hostname pe1-new", "commit", "end"]
    );
}

#[tokio::test]
async fn rejected_commit_aborts_the_candidate() {
    let router = FakeRouter::new(hosts::PE1);
    router.reply(
        "commit",
        &["% Failed to commit one or more configuration items during a pseudo-atomic operation."],
    );
    let mut session = connected(&router).await;

    session.enter_config().await.unwrap();
    let err = session.leave_config(ConfigExit::Commit).await.unwrap_err();

    assert_eq!(err.kind(), "DeviceOperationFailed");
    assert!(err.to_string().contains("Failed to commit"));
    assert_eq!(session.state(), SessionState::Exec);
    assert_eq!(router.received_matching("abort"), vec!["abort".to_string()]);
    assert!(router.received_matching("end").is_empty());
}

#[tokio::test]
async fn missing_exec_prompt_after_leaving_config_is_resynchronized() {
    let router = FakeRouter::new(hosts::PE1);
    router.hang_on("end");
    let mut session = connected(&router).await;

    session.enter_config().await.unwrap();
    session.leave_config(ConfigExit::End).await.unwrap();

    assert_eq!(session.state(), SessionState::Exec);
    let received = router.received();
    assert_eq!(&received[received.len() - 2..], ["end", ""]);

    router.reply("show version", &[outputs::SHOW_VERSION_XR5]);
    assert!(session.execute("show version").await.is_ok());
}

#[tokio::test]
async fn disconnect_from_config_aborts_first() {
    let router = FakeRouter::new(hosts::PE1);
    let mut session = connected(&router).await;

    session.enter_config().await.unwrap();
    session.disconnect().await;

    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(router.received().last().map(String::as_str), Some("abort"));
}

#[tokio::test]
async fn device_behind_a_jump_host_is_reached_in_band() {
    let jump = FakeRouter::with_login("jump1", "jumper", "hop-pass");
    let target = FakeRouter::new(hosts::PE1);
    target.reply("show version", &[outputs::SHOW_VERSION_XR5]);
    let dialer = FakeDialer::new();
    dialer.add("192.168.0.1", jump.clone());
    dialer.add("10.0.0.1", target.clone());

    let mut session = session_over(
        dialer.clone(),
        vec![
            telnet_hop("192.168.0.1", "jumper", "hop-pass"),
            device_hop("10.0.0.1"),
        ],
    )
    .await;
    let version = session.execute("show version").await.unwrap();

    assert!(version.contains("Version 5.3.3"));
    // Only the first hop is dialed, the device is reached from the jump host
    assert_eq!(dialer.dial_count(), 1);
    assert_eq!(jump.received(), vec!["telnet 10.0.0.1"]);
    assert_eq!(target.received(), vec!["terminal length 0", "show version"]);
}

#[tokio::test]
async fn jump_host_refusing_the_device_fails_the_connect() {
    let jump = FakeRouter::with_login("jump1", "jumper", "hop-pass");
    let dialer = FakeDialer::new();
    dialer.add("192.168.0.1", jump.clone());

    let terminal = Terminal::new(
        vec![
            telnet_hop("192.168.0.1", "jumper", "hop-pass"),
            device_hop("10.0.0.9"),
        ],
        dialer,
        SessionLog::disabled(),
        TIMEOUT,
    );
    let mut session = DeviceSession::new(terminal, PromptSet::classic_xr().unwrap(), TIMEOUT);
    let err = session.connect().await.unwrap_err();

    assert!(matches!(err, DeviceError::ConnectFailed { .. }), "got {:?}", err);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(jump.received(), vec!["telnet 10.0.0.9"]);
}
