//! Request correlation and server-initiated requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tether_lsp::{METHOD_NOT_FOUND, PROCESS_NOT_RUNNING, RequestError};

use crate::common::{FAKE_URI, start_ready, wait_for_log};

#[tokio::test]
async fn completion_result_is_passed_through() {
    let (client, _events) = start_ready(&[]).await;
    let result = client
        .request(
            "textDocument/completion",
            Some(json!({
                "textDocument": { "uri": FAKE_URI },
                "position": { "line": 0, "character": 3 },
            })),
        )
        .await
        .unwrap();

    assert_eq!(
        result,
        json!({
            "isIncomplete": false,
            "items": [{ "label": "foo", "insertText": "foo" }],
        })
    );
    client.stop().await;
}

#[tokio::test]
async fn params_are_delivered_unchanged() {
    let (client, _events) = start_ready(&[]).await;
    let params = json!({ "nested": { "list": [1, 2, 3], "flag": true } });
    let result = client.request("stub/echo", Some(params.clone())).await.unwrap();
    assert_eq!(result, params);
    client.stop().await;
}

#[tokio::test]
async fn server_errors_reach_the_handler() {
    let (client, _events) = start_ready(&[]).await;
    let err = client.request("stub/nope", None).await.unwrap_err();
    match err {
        RequestError::Response(err) => {
            assert_eq!(err.code, METHOD_NOT_FOUND);
            assert_eq!(err.message, "unhandled method stub/nope");
        }
        RequestError::Dropped => panic!("request should have been answered"),
    }
    client.stop().await;
}

#[tokio::test]
async fn requests_after_stop_fail_with_not_running() {
    let (client, _events) = start_ready(&[]).await;
    client.stop().await;

    let err = client.request("textDocument/completion", None).await.unwrap_err();
    assert_eq!(err.code(), Some(PROCESS_NOT_RUNNING));
}

#[tokio::test]
async fn stop_drops_pending_handlers() {
    let (client, _events) = start_ready(&[]).await;
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);

    let id = client.send_request(
        "stub/hang",
        None,
        Some(Box::new(move |_| flag.store(true, Ordering::SeqCst))),
    );
    assert!(id.is_some());
    assert_eq!(client.pending_requests(), 1);

    assert!(client.stop().await);
    assert_eq!(client.pending_requests(), 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn awaited_request_sees_dropped_on_stop() {
    let (client, _events) = start_ready(&[]).await;
    let waiter = client.clone();
    let pending = tokio::spawn(async move { waiter.request("stub/hang", None).await });

    while client.pending_requests() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    client.stop().await;

    let outcome = pending.await.unwrap();
    assert!(matches!(outcome, Err(RequestError::Dropped)));
}

#[tokio::test]
async fn request_ids_increase() {
    let (client, _events) = start_ready(&[]).await;
    let first = client.send_request("stub/echo", None, None).unwrap();
    let second = client.send_request("stub/echo", None, None).unwrap();
    assert!(second > first);
    client.stop().await;
}

fn reply_payload(line: &str, method: &str) -> Value {
    let payload = line
        .strip_prefix(&format!("reply {method} "))
        .unwrap_or_else(|| panic!("unexpected reply line {line:?}"));
    serde_json::from_str(payload).unwrap()
}

#[tokio::test]
async fn server_requests_are_answered() {
    let (client, mut events) = start_ready(&["--ask-configuration"]).await;

    let line = wait_for_log(&mut events, "reply workspace/configuration").await;
    assert_eq!(
        reply_payload(&line, "workspace/configuration"),
        json!({ "result": [{}, {}] })
    );

    let line = wait_for_log(&mut events, "reply window/workDoneProgress/create").await;
    assert_eq!(
        reply_payload(&line, "window/workDoneProgress/create"),
        json!({ "result": null })
    );

    let line = wait_for_log(&mut events, "reply stub/unknownRequest").await;
    let payload = reply_payload(&line, "stub/unknownRequest");
    assert_eq!(payload["error"]["code"], METHOD_NOT_FOUND);
    assert_eq!(payload["error"]["message"], "Method not found");

    client.stop().await;
}
