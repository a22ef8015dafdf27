//! Tunnel lifecycle against a stand-in session CLI
//!
//! The stub behaves like `aws ssm start-session`: it prints the port line
//! and leaves a helper process running in its process group.

use rdscli::LifecycleError;
use rdscli::config::TunnelConfig;
use rdscli::tunnel::{PORT_FORWARDING_DOCUMENT, TunnelManager, group_alive};
use rdscli_test_utils::{StubBehavior, TunnelStub, pid_alive, wait_until_dead};
use std::time::{Duration, Instant};

const INSTANCE_ID: &str = "i-0123456789abcdef0";

fn manager(stub: &TunnelStub, startup_timeout: Duration) -> TunnelManager {
    TunnelManager::new(TunnelConfig {
        program: stub.program().display().to_string(),
        startup_timeout,
        close_grace: Duration::from_millis(500),
    })
}

fn unresolved_reason(err: &anyhow::Error) -> String {
    match err.downcast_ref::<LifecycleError>() {
        Some(LifecycleError::TunnelUnresolved { target, reason }) => {
            assert_eq!(target, INSTANCE_ID);
            reason.clone()
        }
        other => panic!("expected TunnelUnresolved, got {other:?}: {err:#}"),
    }
}

#[tokio::test]
async fn test_open_reports_announced_port_and_close_kills_group() {
    let stub = TunnelStub::new(StubBehavior::Announce { port: 40123 }).unwrap();
    let tunnel = manager(&stub, Duration::from_secs(10))
        .open(INSTANCE_ID, "db.internal", 3306)
        .await
        .unwrap();

    assert_eq!(tunnel.local_port(), 40123);
    let pgid = tunnel.pgid();
    let helper = stub.helper_pid().unwrap();
    assert!(pid_alive(helper));
    assert!(group_alive(pgid));

    let args = stub.recorded_args().unwrap();
    assert_eq!(
        &args[..4],
        ["ssm", "start-session", "--document-name", PORT_FORWARDING_DOCUMENT]
    );
    assert_eq!(args[6..], ["--target", INSTANCE_ID]);
    let parameters: serde_json::Value = serde_json::from_str(&args[5]).unwrap();
    assert_eq!(parameters["host"][0], "db.internal");
    assert_eq!(parameters["portNumber"][0], "3306");

    tunnel.close().await.unwrap();
    assert!(wait_until_dead(helper, Duration::from_secs(2)));
}

#[tokio::test]
async fn test_close_kills_helper_that_ignores_sigterm() {
    let stub = TunnelStub::new(StubBehavior::AnnounceStubborn { port: 40124 }).unwrap();
    let tunnel = manager(&stub, Duration::from_secs(10))
        .open(INSTANCE_ID, "db.internal", 3306)
        .await
        .unwrap();
    let helper = stub.helper_pid().unwrap();

    let start = Instant::now();
    tunnel.close().await.unwrap();

    // SIGTERM was not enough, so close waited out the grace period
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(wait_until_dead(helper, Duration::from_secs(2)));
}

#[tokio::test]
async fn test_session_exiting_without_port_is_unresolved() {
    let stub = TunnelStub::new(StubBehavior::ExitEarly).unwrap();
    let err = manager(&stub, Duration::from_secs(10))
        .open(INSTANCE_ID, "db.internal", 3306)
        .await
        .unwrap_err();

    assert_eq!(unresolved_reason(&err), "session exited before opening a port");
    // The helper the session left behind is torn down with the group
    let helper = stub.helper_pid().unwrap();
    assert!(wait_until_dead(helper, Duration::from_secs(2)));
}

#[tokio::test]
async fn test_silent_session_times_out() {
    let stub = TunnelStub::new(StubBehavior::Silent).unwrap();
    let start = Instant::now();
    let err = manager(&stub, Duration::from_millis(300))
        .open(INSTANCE_ID, "db.internal", 3306)
        .await
        .unwrap_err();

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(unresolved_reason(&err).starts_with("no port announced within"));
    let helper = stub.helper_pid().unwrap();
    assert!(wait_until_dead(helper, Duration::from_secs(2)));
}

#[tokio::test]
async fn test_missing_program_fails_to_start() {
    let err = TunnelManager::new(TunnelConfig {
        program: "/nonexistent/session-cli".to_string(),
        ..TunnelConfig::default()
    })
    .open(INSTANCE_ID, "db.internal", 3306)
    .await
    .unwrap_err();

    assert!(err.to_string().contains("Failed to start /nonexistent/session-cli"));
    assert!(err.downcast_ref::<LifecycleError>().is_none());
}

// Drop hands the group to a background task, so these need a second worker
// while the test thread blocks on the helper.

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_open_tunnel_terminates_group() {
    let stub = TunnelStub::new(StubBehavior::Announce { port: 40125 }).unwrap();
    let tunnel = manager(&stub, Duration::from_secs(10))
        .open(INSTANCE_ID, "db.internal", 3306)
        .await
        .unwrap();
    let helper = stub.helper_pid().unwrap();
    assert!(pid_alive(helper));

    drop(tunnel);

    assert!(wait_until_dead(helper, Duration::from_secs(2)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_tunnel_kills_helper_that_ignores_sigterm() {
    let stub = TunnelStub::new(StubBehavior::AnnounceStubborn { port: 40126 }).unwrap();
    let tunnel = manager(&stub, Duration::from_secs(10))
        .open(INSTANCE_ID, "db.internal", 3306)
        .await
        .unwrap();
    let helper = stub.helper_pid().unwrap();

    drop(tunnel);

    // SIGTERM is ignored, so the helper outlives the drop until the grace period ends
    assert!(pid_alive(helper));
    assert!(wait_until_dead(helper, Duration::from_secs(3)));
}
