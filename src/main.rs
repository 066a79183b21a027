mod cli;
mod command;
mod config;
mod pilot;
mod status;
mod transport;
mod video;

use anyhow::{bail, Result};
use clap::Parser;
use cli::Input;
use command::{CommandEvent, CommandLog};
use config::{PilotConfig, DEFAULT_CONFIG_FILE};
use pilot::Pilot;
use status::{StatusMonitor, StatusReport};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use transport::{FrameReplay, Transport, UdpTransport};
use video::{Frame, WatchPreview};

use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Fly a Tello drone from the command line or a command file
#[derive(Parser, Debug)]
#[command(name = "tello-pilot", version)]
struct Args {
    /// Settings file (key=value lines)
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Drone address, overrides the Host setting
    #[arg(long)]
    host: Option<String>,

    /// Execute this command file and exit
    #[arg(long)]
    run: Option<PathBuf>,

    /// Replay the images in this directory as the video feed
    #[arg(long, value_name = "DIR")]
    frames: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        PilotConfig::load(&args.config)?
    } else {
        info!("{} not found, using default settings", args.config.display());
        PilotConfig::default()
    };
    if let Some(host) = args.host {
        config.connection.host = host;
    }

    info!("Tello pilot starting");
    info!("  Drone: {}:{}", config.connection.host, config.connection.control_port);

    let transport = Arc::new(UdpTransport::bind(&config.connection).await?);
    if let Some(dir) = &args.frames {
        let replay = FrameReplay::load(dir)?;
        tokio::spawn(replay.run(transport.frame_feed(), config.video.frame_period()));
    }

    let (log, events) = CommandLog::with_channel();
    tokio::spawn(print_events(events));

    let (preview, frames) = WatchPreview::new();
    tokio::spawn(watch_preview(frames));

    let pilot = Pilot::new(config.clone(), transport.clone(), Arc::new(log), Arc::new(preview));

    let status = StatusMonitor::new(transport.clone(), pilot.worker().clone(), config.status_interval).start();
    tokio::spawn(log_status(status.subscribe()));
    info!("Status monitor started");

    if !pilot.connect().await {
        status.stop().await;
        pilot.end().await;
        bail!("Drone at {} did not enter SDK mode", config.connection.host);
    }

    match args.run {
        Some(file) => {
            pilot.executor().run_file(&file).await;
        }
        None => prompt(&pilot).await?,
    }

    if let Ok(telemetry) = transport.telemetry().await {
        info!("Stopping Tello with battery: {}%", telemetry.battery);
    }
    status.stop().await;
    pilot.end().await;
    Ok(())
}

/// Read and execute lines until the operator quits
async fn prompt(pilot: &Pilot) -> Result<()> {
    println!("{}", cli::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}", cli::PROMPT);
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match cli::interpret(&line) {
            Input::Quit => break,
            Input::Help => println!("{}", cli::HELP),
            Input::Repeat(command) => {
                let repeater = pilot.repeater();
                if repeater.is_running(command).await {
                    repeater.stop(command).await;
                } else {
                    repeater.start(command).await;
                }
            }
            Input::Rc([lr, fb, ud, yaw]) => {
                pilot.send_rc_control(lr, fb, ud, yaw, "prompt").await;
            }
            Input::Reboot => {
                pilot.reboot().await;
            }
            Input::Execute(command) => {
                pilot.executor().execute(command).await;
            }
        }
    }

    info!("bye ...");
    Ok(())
}

/// Operator-facing echo of command traffic
async fn print_events(mut events: mpsc::UnboundedReceiver<CommandEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            CommandEvent::Note(message) => println!("{}", message),
            CommandEvent::Failure { line, error } => println!("Error: {}: {}", line, error),
            CommandEvent::Outcome { command, outcome } if !outcome.is_success() => {
                println!("{}: {}", command, outcome)
            }
            _ => {}
        }
    }
}

/// Stand-in for a display: follows the preview channel
async fn watch_preview(mut frames: watch::Receiver<Option<Arc<Frame>>>) {
    while frames.changed().await.is_ok() {
        let frame = frames.borrow_and_update().clone();
        match frame {
            Some(frame) => debug!("Preview frame {}x{}", frame.width(), frame.height()),
            None => debug!("Preview closed"),
        }
    }
}

async fn log_status(mut reports: watch::Receiver<StatusReport>) {
    while reports.changed().await.is_ok() {
        let report = reports.borrow_and_update().clone();
        if report.connected {
            info!("Status: {}", report);
        } else {
            debug!("Status: {}", report);
        }
    }
}
