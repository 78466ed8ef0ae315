//! Tether CLI - probe a language server from the command line.
//!
//! ```text
//! tether <config.toml> <file>...
//! ```
//!
//! Starts the configured server, waits for it to become ready, opens every
//! file and prints the diagnostics it publishes until the server has been
//! quiet for a settle window. Server log lines go to stderr, diagnostics to
//! stdout.

use std::{
    env, fs,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tether_lsp::protocol::{directory_to_file_uri, file_uri_to_path, path_to_file_uri};
use tether_lsp::{ClientEvent, LspClient, LspConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const SETTLE_WINDOW: Duration = Duration::from_secs(2);

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    // Stdout is reserved for diagnostics.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

struct Args {
    config: PathBuf,
    files: Vec<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let Some(config) = args.next() else {
            bail!("usage: tether <config.toml> <file>...");
        };
        let files: Vec<PathBuf> = args.map(PathBuf::from).collect();
        if files.is_empty() {
            bail!("usage: tether <config.toml> <file>...");
        }
        Ok(Self {
            config: PathBuf::from(config),
            files,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(path))
}

/// Show `uri` as a path relative to `root` when it names a file under it.
fn display_name(uri: &str, root: &Path) -> String {
    file_uri_to_path(uri)
        .and_then(|path| path.strip_prefix(root).ok().map(|rel| rel.display().to_string()))
        .unwrap_or_else(|| uri.to_string())
}

/// One line per diagnostic: `name:line:col: severity: message`, 1-based.
fn format_diagnostic(name: &str, diagnostic: &Value) -> String {
    let start = &diagnostic["range"]["start"];
    let line = start["line"].as_u64().map_or(0, |l| l + 1);
    let col = start["character"].as_u64().map_or(0, |c| c + 1);
    let severity = match diagnostic["severity"].as_u64() {
        Some(1) => "error",
        Some(2) => "warning",
        Some(3) => "info",
        Some(4) => "hint",
        _ => "note",
    };
    let message = diagnostic["message"].as_str().unwrap_or_default();
    format!("{name}:{line}:{col}: {severity}: {message}")
}

fn print_diagnostics(uri: &str, diagnostics: &[Value], root: &Path) {
    let name = display_name(uri, root);
    for diagnostic in diagnostics {
        println!("{}", format_diagnostic(&name, diagnostic));
    }
}

async fn wait_ready(events: &mut UnboundedReceiver<ClientEvent>, root: &Path) -> bool {
    let wait = async {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Ready(ready) => return ready,
                ClientEvent::Log(line) => eprintln!("{line}"),
                ClientEvent::Diagnostics { uri, diagnostics } => {
                    print_diagnostics(&uri, &diagnostics, root);
                }
            }
        }
        false
    };
    tokio::time::timeout(READY_TIMEOUT, wait).await.unwrap_or(false)
}

/// Print events until none arrive for [`SETTLE_WINDOW`], the server stops,
/// or the user interrupts.
async fn drain_events(events: &mut UnboundedReceiver<ClientEvent>, root: &Path) {
    loop {
        let next = tokio::select! {
            next = tokio::time::timeout(SETTLE_WINDOW, events.recv()) => next,
            _ = tokio::signal::ctrl_c() => return,
        };
        match next {
            Ok(Some(ClientEvent::Diagnostics { uri, diagnostics })) => {
                if diagnostics.is_empty() {
                    tracing::debug!("{uri}: no diagnostics");
                }
                print_diagnostics(&uri, &diagnostics, root);
            }
            Ok(Some(ClientEvent::Log(line))) => eprintln!("{line}"),
            Ok(Some(ClientEvent::Ready(false))) => {
                tracing::warn!("Language server stopped early");
                return;
            }
            Ok(Some(ClientEvent::Ready(true))) => {}
            Ok(None) | Err(_) => return,
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = LspConfig::load(&args.config)?;
    let root = match &config.server.root {
        Some(root) => absolute(root)?,
        None => env::current_dir().context("failed to read current directory")?,
    };
    let root_uri = directory_to_file_uri(&root)?;

    let (client, mut events) = LspClient::new(config.client);
    client
        .start(&config.server.command, &config.server.args, root_uri.as_str())
        .await
        .with_context(|| format!("failed to start {}", config.server.command))?;

    if !wait_ready(&mut events, &root).await {
        eprintln!(
            "{} did not become ready (session {})",
            config.server.command,
            client.state().label()
        );
        client.stop().await;
        return Ok(ExitCode::FAILURE);
    }

    for file in &args.files {
        let path = absolute(file)?;
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let uri = path_to_file_uri(&path)?;
        client.did_open(uri.as_str(), &config.server.language_id, &text);
    }

    drain_events(&mut events, &root).await;
    client.stop().await;
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = match Args::parse(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
