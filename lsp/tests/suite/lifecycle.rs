//! Start, readiness, shutdown and restart against the stub server.

use std::time::{Duration, Instant};

use tether_lsp::{ClientConfig, ClientEvent, LspClient, SessionState};

use crate::common::{
    FAKE_URI, READY_TIMEOUT, ROOT_URI, assert_readiness_settled, flags, start_ready, start_stub,
    stub_command, wait_for, wait_for_log, wait_for_state, wait_ready,
};

#[tokio::test]
async fn becomes_ready_and_publishes_diagnostics() {
    let started = Instant::now();
    let (client, mut events) = start_ready(&["--publish-diagnostics"]).await;
    assert!(started.elapsed() < READY_TIMEOUT);
    assert_eq!(client.state(), SessionState::Ready);
    assert_eq!(client.root_uri().as_deref(), Some(ROOT_URI));

    let capabilities = client.server_capabilities().unwrap();
    assert!(capabilities.get("completionProvider").is_some());

    let event = wait_for(&mut events, |e| matches!(e, ClientEvent::Diagnostics { .. }))
        .await
        .expect("diagnostics should be published");
    let ClientEvent::Diagnostics { uri, diagnostics } = event else {
        unreachable!();
    };
    assert_eq!(uri, FAKE_URI);
    assert!(!diagnostics.is_empty());
    assert_eq!(diagnostics[0]["source"], "stub");

    assert!(client.stop().await);
    assert_eq!(client.state(), SessionState::Stopped);
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::Ready(_))).await,
        Some(ClientEvent::Ready(false))
    );
}

#[tokio::test]
async fn stderr_lines_are_forwarded() {
    let (client, mut events) = start_stub(&[]).await;
    let line = wait_for_log(&mut events, "stub-lsp-server:").await;
    assert_eq!(line, "stub-lsp-server: starting");
    client.stop().await;
}

#[tokio::test]
async fn stray_stdout_is_logged_and_session_recovers() {
    let (client, mut events) = start_stub(&["--stray-stdout"]).await;
    let line = wait_for_log(&mut events, "stub banner").await;
    assert!(line.starts_with("stub banner"));

    wait_ready(&mut events).await;
    assert!(client.is_ready());
    client.stop().await;
}

#[tokio::test]
async fn failed_initialize_stops_session() {
    let (client, mut events) = start_stub(&["--fail-initialize"]).await;
    let line = wait_for_log(&mut events, "initialize failed").await;
    assert!(line.contains("stub refused to initialize"));

    assert!(wait_for_state(&client, SessionState::Stopped).await);
    assert!(!client.is_ready());
    while let Ok(event) = events.try_recv() {
        assert_ne!(event, ClientEvent::Ready(true));
    }
}

#[tokio::test]
async fn unsolicited_exit_reports_not_ready() {
    let (client, mut events) = start_ready(&["--exit-after-initialize"]).await;

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::Ready(_))).await,
        Some(ClientEvent::Ready(false))
    );
    assert!(wait_for_state(&client, SessionState::Stopped).await);
    assert!(!client.stop().await);
}

#[tokio::test]
async fn concurrent_stops_tear_down_once() {
    let (client, _events) = start_ready(&[]).await;
    let other = client.clone();

    let (a, b) = tokio::join!(client.stop(), other.stop());
    assert!(a ^ b, "exactly one stop should report the teardown");
    assert_eq!(client.state(), SessionState::Stopped);
}

#[tokio::test]
async fn restart_starts_a_fresh_session() {
    let (client, mut events) = start_ready(&[]).await;
    client.did_open(FAKE_URI, "cpp", "int main() {}");
    client.did_change(FAKE_URI, "int main() { return 0; }");
    assert_eq!(client.document_version(FAKE_URI), Some(2));

    client
        .start(stub_command(), &[], ROOT_URI)
        .await
        .expect("restart should spawn");
    assert_eq!(client.document_version(FAKE_URI), None);
    wait_ready(&mut events).await;

    client.did_open(FAKE_URI, "cpp", "int main() {}");
    assert_eq!(client.document_version(FAKE_URI), Some(1));
    assert!(client.stop().await);
}

#[tokio::test]
async fn empty_root_is_sent_as_null() {
    let (client, mut events) = LspClient::new(ClientConfig::default());
    client.start(stub_command(), &[], "").await.unwrap();
    wait_ready(&mut events).await;
    assert!(client.root_uri().is_none());
    client.stop().await;
}

#[tokio::test]
async fn stop_while_starting_never_reports_ready() {
    let (client, mut events) = start_stub(&["--delay-initialize", "300"]).await;
    assert_eq!(client.state(), SessionState::Starting);

    assert!(client.stop().await);
    assert_eq!(client.state(), SessionState::Stopped);

    // Give a late reply the chance to surface.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!client.is_ready());
    assert!(client.server_capabilities().is_none());
    assert_readiness_settled(&mut events);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_racing_initialize_reply_leaves_readiness_settled() {
    for _ in 0..5 {
        let (client, mut events) = start_stub(&[]).await;
        assert!(client.stop().await);
        assert_eq!(client.state(), SessionState::Stopped);
        assert_readiness_settled(&mut events);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_starts_leave_one_session() {
    let (client, mut events) = LspClient::new(ClientConfig::default());
    let other = client.clone();
    let args = flags(&[]);

    let (a, b) = tokio::join!(
        client.start(stub_command(), &args, ROOT_URI),
        other.start(stub_command(), &args, ROOT_URI),
    );
    assert!(a.is_ok() && b.is_ok());

    wait_ready(&mut events).await;
    assert!(client.is_ready());

    // The surviving session is the only one left to tear down.
    assert!(client.stop().await);
    assert!(!other.stop().await);
    assert_eq!(client.state(), SessionState::Stopped);
    assert_readiness_settled(&mut events);
}
