use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use web_hid_keyboard::config::AppConfig;
use web_hid_keyboard::hid::{HidBackendType, HidController, KeyTracking, ReleasePolicy};
use web_hid_keyboard::state::AppState;
use web_hid_keyboard::web;

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

/// HID backend selectable from the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Otg,
    None,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KeyTrackingArg {
    Single,
    Chord,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReleasePolicyArg {
    All,
    One,
}

/// Web HID keyboard command line arguments
#[derive(Parser, Debug)]
#[command(name = "web-hid-keyboard")]
#[command(version, about = "Type on a USB host from a browser", long_about = None)]
struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address (overrides config file)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config file)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// HID backend (overrides config file)
    #[arg(short = 'b', long, value_name = "BACKEND")]
    backend: Option<BackendArg>,

    /// HID gadget keyboard device, implies the OTG backend
    #[arg(short = 'd', long, value_name = "PATH")]
    device: Option<String>,

    /// Track one key at a time or up to six held keys
    #[arg(long, value_name = "MODE")]
    key_tracking: Option<KeyTrackingArg>,

    /// Release every key or only the released one on key-up
    #[arg(long, value_name = "POLICY")]
    release_policy: Option<ReleasePolicyArg>,

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

    tracing::info!("Starting web-hid-keyboard v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path).await?,
        None => AppConfig::default(),
    };
    apply_cli_overrides(&mut config, &args);
    config.validate()?;

    let hid = Arc::new(HidController::from_config(&config.hid));
    hid.init().await?;

    let addr = config.web.socket_addr()?;
    let state = AppState::new(config, hid.clone());
    let app = web::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
    {
        tracing::error!("HTTP server error: {}", e);
    }

    if let Err(e) = hid.shutdown().await {
        tracing::warn!("Failed to shutdown HID: {}", e);
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Command line values win over the config file
fn apply_cli_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(address) = &args.address {
        config.web.bind_address = address.clone();
    }
    if let Some(port) = args.port {
        config.web.http_port = port;
    }

    match (args.backend, &args.device) {
        (Some(BackendArg::None), _) => config.hid.backend = HidBackendType::None,
        (_, Some(device)) => {
            config.hid.backend = HidBackendType::Otg {
                device: device.clone(),
            }
        }
        (Some(BackendArg::Otg), None) => {
            if !matches!(config.hid.backend, HidBackendType::Otg { .. }) {
                config.hid.backend = HidBackendType::Otg {
                    device: web_hid_keyboard::hid::backend::DEFAULT_KEYBOARD_DEVICE.to_string(),
                };
            }
        }
        (None, None) => {}
    }

    if let Some(tracking) = args.key_tracking {
        config.hid.key_tracking = match tracking {
            KeyTrackingArg::Single => KeyTracking::Single,
            KeyTrackingArg::Chord => KeyTracking::Chord,
        };
    }
    if let Some(policy) = args.release_policy {
        config.hid.release_policy = match policy {
            ReleasePolicyArg::All => ReleasePolicy::All,
            ReleasePolicyArg::One => ReleasePolicy::One,
        };
    }
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
        LogLevel::Error => "web_hid_keyboard=error,tower_http=error",
        LogLevel::Warn => "web_hid_keyboard=warn,tower_http=warn",
        LogLevel::Info => "web_hid_keyboard=info,tower_http=info",
        LogLevel::Verbose => "web_hid_keyboard=debug,tower_http=info",
        LogLevel::Debug => "web_hid_keyboard=debug,tower_http=debug",
        LogLevel::Trace => "web_hid_keyboard=trace,tower_http=debug",
    };

    // RUST_LOG takes highest priority
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
