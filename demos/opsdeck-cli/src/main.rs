//! Command-line client for an opsdeck server.
//!
//! Run with: cargo run -p opsdeck-cli -- --url http://localhost:8000/api/v1 task deploy-1
//!
//! `task` follows a task's output until it finishes. `shell` opens an
//! interactive terminal on a remote host; press Ctrl+] to leave. The shell
//! follows window changes through SIGWINCH, so this binary is Unix-only.

use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use opsdeck_core::ClientConfig;
use opsdeck_session::{HttpTaskLauncher, TaskStream, TerminalBridge};
use opsdeck_transport::{Viewport, ViewportGuard, ViewportRegistry, WindowChangeSource};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "opsdeck", about = "Stream task output and remote terminals")]
struct Cli {
    /// Config file (TOML).
    #[arg(long, env = "OPSDECK_CONFIG")]
    config: Option<PathBuf>,

    /// API root, overriding the config file.
    #[arg(long, env = "OPSDECK_URL")]
    url: Option<String>,

    /// Bearer token for task launches.
    #[arg(long, env = "OPSDECK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow a task's output until it finishes.
    Task {
        /// Task to follow. Omit when launching.
        task_id: Option<String>,

        /// Start a task by POSTing to this API path, e.g. `/deploy/run`.
        #[arg(long)]
        launch: Option<String>,

        /// JSON body for `--launch`.
        #[arg(long, requires = "launch")]
        body: Option<String>,
    },
    /// Open an interactive terminal on a host.
    Shell {
        host: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(url) = cli.url {
        config.base_url = url;
    }

    match cli.command {
        Command::Task {
            task_id,
            launch,
            body,
        } => follow_task(&config, cli.token, task_id, launch, body).await,
        Command::Shell { host } => shell(&config, host).await,
    }
}

async fn follow_task(
    config: &ClientConfig,
    token: Option<String>,
    task_id: Option<String>,
    launch: Option<String>,
    body: Option<String>,
) -> anyhow::Result<()> {
    let endpoint = config.endpoint()?;
    let mut stream = TaskStream::with_config(endpoint.clone(), config);

    match (launch, task_id) {
        (Some(path), _) => {
            let body = body
                .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
                .transpose()
                .context("--body is not valid JSON")?;
            let mut launcher = HttpTaskLauncher::new(endpoint)?;
            if let Some(token) = token {
                launcher = launcher.with_bearer_token(token);
            }
            let task_id = stream.launch(&launcher, &path, body.as_ref()).await?;
            eprintln!("task {task_id}");
        }
        (None, Some(task_id)) => stream.start(&task_id),
        (None, None) => bail!("give a task id or --launch PATH"),
    }

    let mut printed = 0;
    let mut updates = stream.updates();
    while let Some(snapshot) = updates.next().await {
        for line in &snapshot.lines[printed..] {
            println!("{line}");
        }
        printed = snapshot.lines.len();
        if snapshot.finished {
            break;
        }
    }

    let snapshot = stream.wait().await?;
    match (snapshot.status, snapshot.exit_code) {
        (Some(status), Some(code)) => eprintln!("{status} (exit code {code})"),
        (Some(status), None) => eprintln!("{status}"),
        (None, _) => bail!("task ended without a status"),
    }
    Ok(())
}

enum Done {
    Quit,
    Closed(String),
    Failed(String),
}

async fn shell(config: &ClientConfig, host: String) -> anyhow::Result<()> {
    let endpoint = config.endpoint()?;
    let bridge = TerminalBridge::with_config(endpoint, host, config);

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    bridge.on_data(|bytes| {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(&bytes);
        let _ = stdout.flush();
    });
    let closed = done_tx.clone();
    bridge.on_closed(move |reason| {
        let _ = closed.send(Done::Closed(reason.to_owned()));
    });
    let failed = done_tx.clone();
    bridge.on_error(move |err| {
        let _ = failed.send(Done::Failed(err.to_string()));
    });

    let fallback = Viewport::new(config.terminal.cols, config.terminal.rows);
    let registry = ViewportRegistry::new(WindowChangeSource, fallback);
    let mut viewport = registry.acquire();
    let size = viewport.viewport();
    if size.is_compact(config.compact_cols) {
        tracing::warn!(
            cols = size.cols,
            "terminal is narrower than {} columns",
            config.compact_cols
        );
    }

    enable_raw_mode()?;
    bridge.connect(size.cols, size.rows);
    let events = read_events();

    let result = forward(&bridge, &mut viewport, events, &mut done_rx).await;
    drop(done_tx);

    bridge.disconnect();
    disable_raw_mode()?;
    println!();

    match result {
        Done::Quit => Ok(()),
        Done::Closed(reason) => {
            eprintln!("connection closed: {reason}");
            Ok(())
        }
        Done::Failed(err) => bail!(err),
    }
}

async fn forward(
    bridge: &TerminalBridge,
    viewport: &mut ViewportGuard,
    mut events: mpsc::UnboundedReceiver<Event>,
    done_rx: &mut mpsc::UnboundedReceiver<Done>,
) -> Done {
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if is_quit(&event) {
                    return Done::Quit;
                }
                bridge.handle_event(&event);
            }
            Some(size) = viewport.changed() => {
                bridge.send_resize(size.cols, size.rows);
            }
            done = done_rx.recv() => return done.unwrap_or(Done::Quit),
        }
    }
}

fn is_quit(event: &Event) -> bool {
    matches!(
        event,
        Event::Key(KeyEvent {
            code: KeyCode::Char(']'),
            modifiers: KeyModifiers::CONTROL,
            ..
        })
    )
}

/// Read crossterm events on a blocking thread until the receiver goes away.
fn read_events() -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::task::spawn_blocking(move || {
        while !tx.is_closed() {
            match event::poll(Duration::from_millis(50)) {
                Ok(true) => match event::read() {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "failed to read terminal event");
                        break;
                    }
                },
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(%err, "failed to poll terminal events");
                    break;
                }
            }
        }
    });
    rx
}
