use clap::{Args, Parser, Subcommand};
use place_client_core::canvas::PixelStore;
use place_client_core::client::{
    CanvasObserver, ClientError, InputEvent, PaintOutcome, PlaceClient,
};
use place_client_core::config::{ClientConfig, ConfigError};
use place_client_core::identity::{Identity, IdentityError, IdentityStore};
use place_client_core::session::{ConnectionManager, ConnectionState, Notice};
use place_client_core::telemetry::{
    self,
    logging::{self as logctl, LogConfig, LogLevel},
};
use place_client_core::transport::websocket::config::normalize_server;
use place_client_core::transport::{TransportError, WebSocketConnector};
use place_client_core::viewport::ViewportEngine;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const INPUT_QUEUE: usize = 64;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let log_config = cli.logging.to_config();
    logctl::init(&log_config).map_err(|err| CliError::Logging(err.to_string()))?;
    debug!(log_level = ?log_config.level, log_file = ?log_config.file, "logging configured");

    let config = ClientConfig::from_env()?;
    let store = IdentityStore::open_default()?;
    let mut stored = store.load()?;
    let server = config.resolve_server(cli.server.as_deref().or(stored.server.as_deref()))?;
    if stored.merge(cli.nick.clone(), cli.captcha.clone(), Some(server.clone())) {
        if let Err(err) = store.save(&stored) {
            warn!(target: "place::identity", error = %err, "could not persist identity");
        }
    }
    let identity = stored.identity();

    let session = ConnectionManager::new(
        Arc::new(WebSocketConnector::new()),
        normalize_server(&server)?,
    )
    .with_resync_period(config.resync_period);
    let viewport = ViewportEngine::new(config.viewport.0, config.viewport.1);

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => handle_watch(session, viewport, identity).await,
        Command::Paint(args) => handle_paint(session, viewport, identity, args).await,
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "place",
    about = "🎨 Watch and paint a shared pixel canvas",
    author,
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "PLACE_SERVER",
        help = "Canvas server address (ws://, wss:// or bare host)"
    )]
    server: Option<String>,

    #[arg(long, global = true, env = "PLACE_NICK", help = "Nickname shown to other painters")]
    nick: Option<String>,

    #[arg(
        long,
        global = true,
        env = "PLACE_CAPTCHA",
        help = "Verification token obtained from the server"
    )]
    captcha: Option<String>,

    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "PLACE_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "PLACE_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    file: Option<PathBuf>,
}

impl LoggingArgs {
    fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the canvas and drive the viewport from stdin (default)
    Watch,
    /// Paint a single pixel and wait for the server to echo it
    Paint(PaintArgs),
}

#[derive(Args, Debug)]
struct PaintArgs {
    x: u16,
    y: u16,
    #[arg(help = "Palette index, 0-23")]
    color: u8,
    #[arg(long, default_value_t = 10, help = "Seconds to wait for the echo")]
    wait: u64,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Identity(#[from] IdentityError),
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("server rejected the paint: {0}")]
    PaintRejected(String),
    #[error("paint was dropped while the connection was being established")]
    PaintDropped,
    #[error("no echo from the server within {0:?}")]
    PaintTimedOut(Duration),
    #[error("logging initialization failed: {0}")]
    Logging(String),
}

async fn handle_watch(
    session: ConnectionManager,
    viewport: ViewportEngine,
    identity: Identity,
) -> Result<(), CliError> {
    println!("🎨 painting as {}; type `help` for commands", identity.nick);
    let (tx, rx) = mpsc::channel(INPUT_QUEUE);
    tokio::spawn(read_commands(tx));

    let printer = StatusPrinter {
        crosshair: viewport.targeted_pixel(),
        under_crosshair: None,
    };
    let mut client = PlaceClient::new(session, viewport, printer);
    client.run(identity, rx).await;
    telemetry::report();

    let counts = client.store().histogram();
    if let Some((index, cells)) = counts.iter().enumerate().max_by_key(|(_, cells)| **cells) {
        println!("🧮 most common color {index} covers {cells} cells");
    }
    Ok(())
}

async fn handle_paint(
    session: ConnectionManager,
    viewport: ViewportEngine,
    identity: Identity,
    args: PaintArgs,
) -> Result<(), CliError> {
    let mut client = PlaceClient::new(session, viewport, ());
    client.select_color(args.color)?;
    client.start(identity).await?;
    let wait = Duration::from_secs(args.wait);
    let outcome = client.paint_and_confirm(args.x, args.y, wait).await;
    client.shutdown().await;

    match outcome? {
        PaintOutcome::Confirmed => {
            println!("✅ painted ({}, {}) with color {}", args.x, args.y, args.color);
            Ok(())
        }
        PaintOutcome::Rejected(notice) => Err(CliError::PaintRejected(notice.message)),
        PaintOutcome::Dropped => Err(CliError::PaintDropped),
        PaintOutcome::TimedOut => Err(CliError::PaintTimedOut(wait)),
    }
}

const HELP: &str = "\
commands:
  pan DX DY | drag start|move X Y | drag end
  wheel DY | zoom in | zoom out | reset | resize W H
  color N | click X Y | paint | quit";

async fn read_commands(tx: mpsc::Sender<InputEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(target: "place::input", error = %err, "stdin read failed");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "help" {
            println!("{HELP}");
            continue;
        }
        match trimmed.parse::<InputEvent>() {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(err) => eprintln!("⚠️  {err}"),
        }
    }
}

/// Prints notices, viewport status and the color under the crosshair.
struct StatusPrinter {
    crosshair: Option<(u16, u16)>,
    under_crosshair: Option<u8>,
}

impl StatusPrinter {
    fn report_crosshair(&mut self, store: &PixelStore) {
        let Some((x, y)) = self.crosshair else {
            return;
        };
        let color = store.index_at(u32::from(x), u32::from(y));
        if color != self.under_crosshair {
            self.under_crosshair = color;
            if let Some(color) = color {
                println!("   ({x}, {y}) is color {color}");
            }
        }
    }
}

impl CanvasObserver for StatusPrinter {
    fn buffer_changed(&mut self, store: &PixelStore) {
        self.report_crosshair(store);
    }

    fn viewport_changed(&mut self, viewport: &ViewportEngine) {
        let state = viewport.state();
        self.crosshair = viewport.targeted_pixel();
        self.under_crosshair = None;
        println!(
            "🔍 scale {:.3}  crosshair ({}, {})",
            state.scale, state.center.x, state.center.y
        );
    }

    fn notice(&mut self, notice: &Notice) {
        if notice.is_error() {
            eprintln!("❌ {}", notice.message);
        } else {
            println!("ℹ️  {}", notice.message);
        }
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        debug!(target: "place::client", ?state, "connection state");
        if state == ConnectionState::Connected {
            println!("🔌 connected");
        }
    }
}
