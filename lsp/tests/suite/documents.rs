//! Text document synchronization as seen by the server.

use tether_lsp::ClientEvent;

use crate::common::{FAKE_URI, start_ready, wait_for_log};

#[tokio::test]
async fn sync_notifications_carry_versions() {
    let (client, mut events) = start_ready(&[]).await;

    client.did_open(FAKE_URI, "cpp", "int x;");
    let line = wait_for_log(&mut events, "textDocument/didOpen").await;
    assert_eq!(line, format!("textDocument/didOpen {FAKE_URI} 1"));

    client.did_change(FAKE_URI, "int x = 1;");
    let line = wait_for_log(&mut events, "textDocument/didChange").await;
    assert_eq!(line, format!("textDocument/didChange {FAKE_URI} 2"));

    client.did_save(FAKE_URI, "int x = 1;");
    let line = wait_for_log(&mut events, "textDocument/didSave").await;
    assert_eq!(line, format!("textDocument/didSave {FAKE_URI} -"));

    client.did_close(FAKE_URI);
    let line = wait_for_log(&mut events, "textDocument/didClose").await;
    assert_eq!(line, format!("textDocument/didClose {FAKE_URI} -"));
    assert_eq!(client.document_version(FAKE_URI), None);

    client.stop().await;
}

#[tokio::test]
async fn change_without_open_starts_at_version_one() {
    let (client, mut events) = start_ready(&[]).await;

    client.did_change("file:///tmp/unopened.cpp", "int y;");
    let line = wait_for_log(&mut events, "textDocument/didChange").await;
    assert_eq!(line, "textDocument/didChange file:///tmp/unopened.cpp 1");

    client.stop().await;
}

#[tokio::test]
async fn sync_after_stop_is_silent() {
    let (client, mut events) = start_ready(&[]).await;
    client.stop().await;
    while events.try_recv().is_ok() {}

    client.did_open(FAKE_URI, "cpp", "int x;");
    assert_eq!(client.document_version(FAKE_URI), None);
    assert!(!matches!(events.try_recv(), Ok(ClientEvent::Log(_))));
}
