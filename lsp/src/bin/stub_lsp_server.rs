//! Scripted language server for exercising the client end to end.
//!
//! Speaks framed JSON-RPC on stdin/stdout and behaves according to its
//! flags:
//!
//! - `--publish-diagnostics`: after `initialized`, publish one diagnostic
//!   for `file:///tmp/fake.cpp`.
//! - `--fail-initialize`: answer `initialize` with an error.
//! - `--delay-initialize <ms>`: wait before answering `initialize`.
//! - `--exit-after-initialize`: exit as soon as `initialized` arrives.
//! - `--stray-stdout`: print a header-less banner before anything else.
//! - `--ask-configuration`: after `initialized`, send the client
//!   `workspace/configuration`, `window/workDoneProgress/create` and an
//!   unknown request, and report each reply back as a `window/logMessage`.
//!
//! Document sync notifications are always echoed as log messages. A
//! `stub/hang` request is never answered.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use tether_lsp::codec::{Decoded, FrameDecoder, encode_frame};

const FAKE_URI: &str = "file:///tmp/fake.cpp";

#[derive(Debug, Default)]
struct Options {
    publish_diagnostics: bool,
    fail_initialize: bool,
    exit_after_initialize: bool,
    stray_stdout: bool,
    ask_configuration: bool,
    delay_initialize: Option<Duration>,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut options = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--publish-diagnostics" => options.publish_diagnostics = true,
                "--fail-initialize" => options.fail_initialize = true,
                "--exit-after-initialize" => options.exit_after_initialize = true,
                "--stray-stdout" => options.stray_stdout = true,
                "--ask-configuration" => options.ask_configuration = true,
                "--delay-initialize" => {
                    let Some(ms) = args.next() else {
                        bail!("--delay-initialize needs a value in milliseconds");
                    };
                    let ms: u64 = ms.parse().context("invalid --delay-initialize value")?;
                    options.delay_initialize = Some(Duration::from_millis(ms));
                }
                other => bail!("unknown flag: {other}"),
            }
        }
        Ok(options)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct Stub<W> {
    options: Options,
    out: W,
    next_id: u64,
    /// Requests we sent to the client, by id.
    sent: HashMap<u64, &'static str>,
}

impl<W: Write> Stub<W> {
    fn send(&mut self, msg: &Value) -> Result<()> {
        self.out.write_all(&encode_frame(msg)?)?;
        self.out.flush()?;
        Ok(())
    }

    fn log(&mut self, message: String) -> Result<()> {
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": "window/logMessage",
            "params": { "type": 3, "message": message },
        }))
    }

    fn request(&mut self, method: &'static str, params: Value) -> Result<()> {
        let id = self.next_id;
        self.next_id += 1;
        self.sent.insert(id, method);
        self.send(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
    }

    fn handle(&mut self, mut msg: Map<String, Value>) -> Result<Flow> {
        let method = msg.get("method").and_then(Value::as_str).map(str::to_string);
        match (msg.remove("id"), method) {
            (Some(id), Some(method)) => {
                let params = msg.remove("params").unwrap_or(Value::Null);
                self.handle_request(id, &method, &params)?;
                Ok(Flow::Continue)
            }
            (None, Some(method)) => {
                let params = msg.remove("params").unwrap_or(Value::Null);
                self.handle_notification(&method, &params)
            }
            (Some(id), None) => {
                self.handle_reply(&id, msg)?;
                Ok(Flow::Continue)
            }
            (None, None) => Ok(Flow::Continue),
        }
    }

    fn handle_request(&mut self, id: Value, method: &str, params: &Value) -> Result<()> {
        if method == "initialize"
            && let Some(delay) = self.options.delay_initialize
        {
            thread::sleep(delay);
        }
        let outcome = match method {
            "stub/hang" => return Ok(()),
            "initialize" if self.options.fail_initialize => {
                Err(json!({ "code": -32603, "message": "stub refused to initialize" }))
            }
            "initialize" => Ok(json!({
                "capabilities": {
                    "textDocumentSync": 1,
                    "completionProvider": { "triggerCharacters": ["."] },
                },
                "serverInfo": { "name": "stub-lsp-server" },
            })),
            "shutdown" => Ok(Value::Null),
            "textDocument/completion" => Ok(json!({
                "isIncomplete": false,
                "items": [{ "label": "foo", "insertText": "foo" }],
            })),
            "stub/echo" => Ok(params.clone()),
            _ => Err(json!({ "code": -32601, "message": format!("unhandled method {method}") })),
        };
        let reply = match outcome {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
        };
        self.send(&reply)
    }

    fn handle_notification(&mut self, method: &str, params: &Value) -> Result<Flow> {
        match method {
            "initialized" => {
                if self.options.exit_after_initialize {
                    return Ok(Flow::Exit);
                }
                if self.options.publish_diagnostics {
                    self.publish_diagnostics()?;
                }
                if self.options.ask_configuration {
                    self.request(
                        "workspace/configuration",
                        json!({ "items": [{ "section": "stub" }, { "section": "stub.format" }] }),
                    )?;
                    self.request("window/workDoneProgress/create", json!({ "token": "index" }))?;
                    self.request("stub/unknownRequest", json!({}))?;
                }
            }
            "textDocument/didOpen"
            | "textDocument/didChange"
            | "textDocument/didClose"
            | "textDocument/didSave" => {
                let document = &params["textDocument"];
                let uri = document["uri"].as_str().unwrap_or_default();
                let version = document["version"]
                    .as_i64()
                    .map_or_else(|| "-".to_string(), |v| v.to_string());
                self.log(format!("{method} {uri} {version}"))?;
            }
            "exit" => return Ok(Flow::Exit),
            _ => {}
        }
        Ok(Flow::Continue)
    }

    fn handle_reply(&mut self, id: &Value, mut msg: Map<String, Value>) -> Result<()> {
        let method = id
            .as_u64()
            .and_then(|id| self.sent.remove(&id))
            .unwrap_or("unknown");
        msg.remove("jsonrpc");
        let payload = serde_json::to_string(&msg)?;
        self.log(format!("reply {method} {payload}"))
    }

    fn publish_diagnostics(&mut self) -> Result<()> {
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": FAKE_URI,
                "diagnostics": [{
                    "range": {
                        "start": { "line": 0, "character": 0 },
                        "end": { "line": 0, "character": 1 },
                    },
                    "severity": 1,
                    "source": "stub",
                    "message": "expected ';' after expression",
                }],
            },
        }))
    }
}

fn main() -> Result<()> {
    let options = Options::parse(std::env::args().skip(1))?;
    eprintln!("stub-lsp-server: starting");

    let mut stdout = io::stdout().lock();
    if options.stray_stdout {
        stdout.write_all(b"stub banner\r\n\r\n")?;
        stdout.flush()?;
        // Keep the banner in its own read on the client side.
        thread::sleep(Duration::from_millis(200));
    }

    let mut stub = Stub {
        options,
        out: stdout,
        next_id: 1000,
        sent: HashMap::new(),
    };
    let mut stdin = io::stdin().lock();
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stdin.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        for decoded in decoder.push(&buf[..n]) {
            let Decoded::Message(msg) = decoded else {
                continue;
            };
            if stub.handle(msg)? == Flow::Exit {
                return Ok(());
            }
        }
    }
}
