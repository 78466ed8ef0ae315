//! Shared test utilities for driving the stub language server.

#![allow(dead_code)]

use std::time::Duration;

use tether_lsp::{ClientConfig, ClientEvent, LspClient, SessionState};
use tokio::sync::mpsc::UnboundedReceiver;

pub const FAKE_URI: &str = "file:///tmp/fake.cpp";
pub const ROOT_URI: &str = "file:///tmp/stub-workspace";

/// Upper bound for a healthy server to become ready.
pub const READY_TIMEOUT: Duration = Duration::from_millis(2000);
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn stub_command() -> &'static str {
    env!("CARGO_BIN_EXE_stub-lsp-server")
}

pub fn flags(flags: &[&str]) -> Vec<String> {
    flags.iter().map(|f| (*f).to_string()).collect()
}

/// Start the stub with `stub_flags` without waiting for readiness.
pub async fn start_stub(stub_flags: &[&str]) -> (LspClient, UnboundedReceiver<ClientEvent>) {
    let (client, events) = LspClient::new(ClientConfig::default());
    client
        .start(stub_command(), &flags(stub_flags), ROOT_URI)
        .await
        .expect("stub server should spawn");
    (client, events)
}

/// Start the stub and wait for `Ready(true)`.
pub async fn start_ready(stub_flags: &[&str]) -> (LspClient, UnboundedReceiver<ClientEvent>) {
    let (client, mut events) = start_stub(stub_flags).await;
    wait_ready(&mut events).await;
    (client, events)
}

pub async fn wait_ready(events: &mut UnboundedReceiver<ClientEvent>) {
    wait_for_within(events, READY_TIMEOUT, |e| *e == ClientEvent::Ready(true))
        .await
        .expect("server should become ready in time");
}

/// Skip events until one matches `pred`. `None` on timeout or when the
/// channel closes.
pub async fn wait_for_within<F>(
    events: &mut UnboundedReceiver<ClientEvent>,
    timeout: Duration,
    mut pred: F,
) -> Option<ClientEvent>
where
    F: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

pub async fn wait_for<F>(events: &mut UnboundedReceiver<ClientEvent>, pred: F) -> Option<ClientEvent>
where
    F: FnMut(&ClientEvent) -> bool,
{
    wait_for_within(events, EVENT_TIMEOUT, pred).await
}

/// Wait for a log line starting with `prefix` and return it.
pub async fn wait_for_log(events: &mut UnboundedReceiver<ClientEvent>, prefix: &str) -> String {
    match wait_for(events, |e| matches!(e, ClientEvent::Log(line) if line.starts_with(prefix))).await
    {
        Some(ClientEvent::Log(line)) => line,
        other => panic!("no log line starting with {prefix:?}, got {other:?}"),
    }
}

/// Poll until the client reaches `state`.
pub async fn wait_for_state(client: &LspClient, state: SessionState) -> bool {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while client.state() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Drain the events that are already queued and check that readiness
/// toggled cleanly and ended on `Ready(false)`, or was never reported.
pub fn assert_readiness_settled(events: &mut UnboundedReceiver<ClientEvent>) {
    let mut ready = false;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Ready(flag) = event {
            assert_ne!(flag, ready, "readiness events must alternate");
            ready = flag;
        }
    }
    assert!(!ready, "session stopped but was last reported ready");
}
