use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camhub::config::{AppConfig, CameraBackendKind};
use camhub::state::AppState;
use camhub::video::PixelFormat;
use camhub::web;

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

/// camhub command line arguments
#[derive(Parser, Debug)]
#[command(name = "camhub")]
#[command(version, about = "Multi-camera MJPEG streaming server", long_about = None)]
struct CliArgs {
    /// Path to JSON config file (defaults are used when omitted)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Camera backend: v4l2 or test-pattern (overrides config)
    #[arg(long, value_name = "BACKEND")]
    backend: Option<CameraBackendKind>,

    /// Capture pixel format, e.g. MJPEG or YUYV (overrides config)
    #[arg(short = 'f', long, value_name = "FORMAT")]
    format: Option<PixelFormat>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting camhub v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(address) = args.address {
        config.web.bind_address = address;
    }
    if let Some(port) = args.port {
        config.web.http_port = port;
    }
    if let Some(backend) = args.backend {
        config.camera.backend = backend;
    }
    if let Some(format) = args.format {
        config.camera.format = format;
    }
    config.validate()?;

    let bind_ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.web.bind_address))?;
    let bind_addr = SocketAddr::new(bind_ip, config.web.http_port);

    tracing::info!(
        backend = ?config.camera.backend,
        resolution = %config.camera.resolution(),
        fps = config.camera.fps,
        format = %config.camera.format,
        "Camera configuration"
    );

    let state = AppState::from_config(config);

    let app = web::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    // Streaming responses never finish on their own, so cameras are
    // closed before the server waits for connections to drain.
    let shutdown_state = state.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        shutdown_state.registry.shutdown().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "camhub=error,tower_http=error",
        LogLevel::Warn => "camhub=warn,tower_http=warn",
        LogLevel::Info => "camhub=info,tower_http=info",
        LogLevel::Verbose => "camhub=debug,tower_http=info",
        LogLevel::Debug => "camhub=debug,tower_http=debug",
        LogLevel::Trace => "camhub=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
