use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use rustls::crypto::{ring, CryptoProvider};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dbmeter_agent::capture::{FeedSource, IvfFeedSource, Resolution, SyntheticFeedSource};
use dbmeter_agent::config::{AgentConfig, ConfigStore};
use dbmeter_agent::events::{AgentEvent, EventBus};
use dbmeter_agent::roi::{DisplaySize, RoiOverlay};
use dbmeter_agent::session::SessionController;
use dbmeter_agent::signaling::{SignalingChannel, WsConnector};
use dbmeter_agent::webrtc::RtcTransportFactory;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// dbmeter agent command line arguments
#[derive(Parser, Debug)]
#[command(name = "dbmeter-agent")]
#[command(version, about = "Streams a camera feed to a number detection service over WebRTC", long_about = None)]
struct CliArgs {
    /// Configuration file (TOML); defaults are used if it does not exist
    #[arg(short = 'c', long, value_name = "FILE", default_value = "dbmeter-agent.toml")]
    config: PathBuf,

    /// Page origin the service is reached through (e.g. https://meter.example.com)
    #[arg(short = 'o', long, value_name = "URL", conflicts_with = "host")]
    origin: Option<String>,

    /// Service host[:port] (overrides config)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Use wss:// for the signaling channel (overrides config)
    #[arg(long)]
    secure: bool,

    /// Replay a VP8 IVF file as the camera feed
    #[arg(long, value_name = "FILE")]
    ivf: Option<PathBuf>,

    /// Display surface size, e.g. 1280x720 (overrides config)
    #[arg(long, value_name = "WxH")]
    display: Option<Resolution>,

    /// Start with the ROI overlay hidden
    #[arg(long)]
    no_roi: bool,

    /// Start a session as soon as the agent is up
    #[arg(long)]
    start: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

/// One line of interactive input
#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Start,
    Stop,
    ToggleRoi,
    Resize(Resolution),
    Status,
    Quit,
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        match command {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "roi" => Ok(Command::ToggleRoi),
            "status" => Ok(Command::Status),
            "quit" | "exit" => Ok(Command::Quit),
            "resize" => parts
                .next()
                .ok_or_else(|| "usage: resize <W>x<H>".to_string())?
                .parse()
                .map(Command::Resize),
            other => Err(format!(
                "unknown command '{}' (start, stop, roi, resize <W>x<H>, status, quit)",
                other
            )),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose, args.log_json);

    // wss:// needs a process-wide provider (rustls 0.23+)
    if CryptoProvider::install_default(ring::default_provider()).is_err() {
        tracing::debug!("rustls crypto provider already installed");
    }

    tracing::info!("Starting dbmeter-agent v{}", env!("CARGO_PKG_VERSION"));

    let store = ConfigStore::load(&args.config).await?;
    let mut config = (*store.get()).clone();
    apply_overrides(&mut config, &args)?;
    store.update(|c| *c = config)?;
    let config = store.get();

    let events = Arc::new(EventBus::new());
    let printer = tokio::spawn(print_events(events.subscribe()));

    let channel = SignalingChannel::new(
        config.signaling.url(),
        config.signaling.reconnect_delay(),
        Arc::new(WsConnector),
        events.clone(),
    );
    tracing::info!("Signaling endpoint: {}", channel.url());
    channel.connect();

    let feeds: Arc<dyn FeedSource> = match &args.ivf {
        Some(path) => Arc::new(IvfFeedSource::new(path)),
        None => Arc::new(SyntheticFeedSource),
    };
    let transports = Arc::new(RtcTransportFactory::new(config.webrtc.clone()));
    let mut controller =
        SessionController::new(&config, channel.clone(), feeds, transports, events.clone());

    if args.start {
        run_command(&mut controller, Command::Start).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Failed to read input: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => run_command(&mut controller, command).await,
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    controller.shutdown().await;
    channel.shutdown().await;
    printer.abort();

    tracing::info!("dbmeter-agent stopped");
    Ok(())
}

fn apply_overrides(config: &mut AgentConfig, args: &CliArgs) -> anyhow::Result<()> {
    if let Some(origin) = &args.origin {
        config.signaling.apply_origin(origin)?;
    }
    if let Some(host) = &args.host {
        config.signaling.host = host.clone();
    }
    if args.secure {
        config.signaling.secure = true;
    }
    if let Some(display) = args.display {
        config.display.width = display.width;
        config.display.height = display.height;
    }
    if args.no_roi {
        config.roi.enabled = false;
    }
    Ok(())
}

async fn run_command(controller: &mut SessionController, command: Command) {
    match command {
        Command::Start => match controller.start().await {
            Ok(id) => println!("session {} started", id),
            Err(e) => println!("[{}] {}", e.module(), e),
        },
        Command::Stop => controller.stop().await,
        Command::ToggleRoi => {
            let overlay = controller.toggle_roi();
            println!("roi {}", describe_overlay(&overlay));
        }
        Command::Resize(size) => {
            controller.set_display_size(DisplaySize::from(size));
        }
        Command::Status => {
            println!(
                "signaling {} | session {} | roi {}",
                controller.channel().state(),
                controller.session_id().unwrap_or("none"),
                describe_overlay(&controller.overlay())
            );
        }
        Command::Quit => {}
    }
}

fn describe_overlay(overlay: &RoiOverlay) -> String {
    match overlay.display_rect() {
        Some(r) => format!(
            "({:.0},{:.0})-({:.0},{:.0})",
            r.left, r.top, r.right, r.bottom
        ),
        None => "hidden".to_string(),
    }
}

/// Render agent events on the terminal
async fn print_events(mut rx: broadcast::Receiver<AgentEvent>) {
    loop {
        match rx.recv().await {
            Ok(AgentEvent::Status { source, text }) => println!("[{}] {}", source, text),
            Ok(AgentEvent::NumbersDetected {
                text, frame_count, ..
            }) => println!("numbers #{}: {}", frame_count, text),
            Ok(AgentEvent::RoiChanged { overlay }) => {
                println!("roi {}", describe_overlay(&overlay))
            }
            Ok(event) => tracing::debug!("Event: {}", event.event_name()),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Display lagged, {} events skipped", n)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "dbmeter_agent=error,webrtc=error",
        LogLevel::Warn => "dbmeter_agent=warn,webrtc=warn",
        LogLevel::Info => "dbmeter_agent=info,webrtc=warn",
        LogLevel::Verbose => "dbmeter_agent=debug,webrtc=warn",
        LogLevel::Debug => "dbmeter_agent=debug,webrtc=info",
        LogLevel::Trace => "dbmeter_agent=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    if let Err(err) = result {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
