//! Glimmer
//!
//! Receives spectrum data over UDP and drives an LED strip (or the terminal
//! emulator) with audio-reactive effects.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use glimmer::{
    config::{default_config_path, AppConfig, ConfigStore, DisplayMode},
    constants::STATS_INTERVAL_SECS,
    engine::{ControlEvent, Engine, EngineHandle},
    keyboard,
    output::{NullSink, OutputSink, RetryingSink, TerminalSink},
    protocol::PacketFormat,
    ui::WebServer,
};

#[derive(Parser, Debug)]
#[command(name = "glimmer", version, about = "Audio-reactive LED strip controller")]
struct Cli {
    /// Config file (.json or .toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    num_leds: Option<usize>,

    /// Data pin for hardware drivers
    #[arg(long)]
    pin: Option<u8>,

    /// Start pinned to this effect
    #[arg(short, long)]
    effect: Option<String>,

    /// Render to the terminal instead of hardware
    #[arg(short, long)]
    simulator: bool,

    /// Simulator layout: horizontal, vertical or grid
    #[arg(long)]
    display: Option<DisplayMode>,

    #[arg(long)]
    audio_port: Option<u16>,

    /// Packet format: auto, wled or eqstreamer
    #[arg(long)]
    format: Option<PacketFormat>,

    #[arg(long)]
    api_port: Option<u16>,

    /// Disable the HTTP API
    #[arg(long)]
    no_api: bool,

    /// Disable keyboard control
    #[arg(long)]
    no_keyboard: bool,

    #[arg(long)]
    fps: Option<u32>,
}

impl Cli {
    /// In-memory overrides; never written back to the config file
    fn apply(&self, config: &mut AppConfig) {
        if let Some(n) = self.num_leds {
            config.hardware.num_leds = n;
        }
        if let Some(pin) = self.pin {
            config.hardware.pin = pin;
        }
        if let Some(fps) = self.fps {
            config.hardware.fps = fps;
        }
        if let Some(mode) = self.display {
            config.simulator.display_mode = mode;
        }
        if let Some(port) = self.audio_port {
            config.network.audio_port = port;
        }
        if let Some(format) = self.format {
            config.network.audio_format = format;
        }
        if let Some(port) = self.api_port {
            config.network.api_port = port;
        }
    }
}

fn init_logging(simulator: bool) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    // The emulator owns stdout, so logs go to a file while it runs
    if simulator {
        let path = std::env::temp_dir().join("glimmer.log");
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
            .init();
        return Ok(Some(path));
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    Ok(None)
}

fn build_sink(simulator: bool, config: &AppConfig) -> Box<dyn OutputSink> {
    let inner: Box<dyn OutputSink> = if simulator {
        Box::new(TerminalSink::stdout(
            config.simulator.display_mode,
            config.simulator.grid_width,
            config.hardware.brightness,
        ))
    } else {
        tracing::warn!("No hardware driver linked, rendering headless");
        Box::new(NullSink::new())
    };
    Box::new(RetryingSink::new(inner, config.hardware.output_retries))
}

fn log_stats(engine: &EngineHandle) {
    let status = engine.status();
    let rx = status.receiver.unwrap_or_default();
    tracing::info!(
        "Stats: {} packets, {} bytes, {} invalid | effect {} ({}) | audio {} vol {:.2} | {} frames",
        rx.packets_received,
        rx.bytes_received,
        rx.invalid_packets,
        status.current_effect,
        if status.playlist_mode { "playlist" } else { "manual" },
        if status.audio_active { "active" } else { "silent" },
        status.volume,
        status.frames_rendered,
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_file = init_logging(cli.simulator)?;
    if let Some(path) = &log_file {
        eprintln!("Logging to {}", path.display());
    }

    tracing::info!("Starting Glimmer");

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let store = ConfigStore::open(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    tracing::info!("Config: {}", config_path.display());

    let mut engine = Engine::new(store);
    let handle = engine.handle();
    handle
        .override_config(|config| cli.apply(config))
        .context("invalid command-line override")?;
    if let Some(effect) = &cli.effect {
        handle
            .apply(ControlEvent::SelectEffect(effect.clone()))
            .with_context(|| format!("cannot start with effect '{}'", effect))?;
    }
    let config = handle.config();

    engine
        .start_receiver()
        .context("starting audio receiver")?;
    engine
        .start_render(build_sink(cli.simulator, &config))
        .context("starting render loop")?;

    let api = if cli.no_api {
        None
    } else {
        let server = WebServer::new(
            &config.network.api_bind_address,
            config.network.api_port,
            handle.clone(),
        )?;
        let (_, task) = server
            .start_background()
            .await
            .context("starting HTTP API")?;
        Some(task)
    };

    let keys = if !cli.no_keyboard && std::io::stdin().is_terminal() {
        Some(keyboard::spawn(handle.clone()).context("starting keyboard thread")?)
    } else {
        None
    };

    let signal = handle.shutdown_signal();
    let mut stopped = tokio::task::spawn_blocking(move || {
        let _ = signal.recv();
    });
    let mut stats = tokio::time::interval(Duration::from_secs(STATS_INTERVAL_SECS));
    stats.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                handle.shutdown();
                break;
            }
            _ = &mut stopped => break,
            _ = stats.tick() => log_stats(&handle),
        }
    }

    let result = engine.shutdown();
    if let Some(keys) = keys {
        let _ = keys.join();
    }
    if let Some(api) = api {
        let _ = api.await;
    }
    result.context("LED output failed")?;
    tracing::info!("Goodbye");
    Ok(())
}
