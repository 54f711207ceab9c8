//! TPCK Serial Bridge CLI
//!
//! Opens a serial port speaking TPCK and serves its packets, one text line
//! per packet, to every TCP client that connects.

use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tokio::signal;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tpck_bridge_core::config::{BridgeConfig, LoggingConfig};
use tpck_bridge_core::metrics::BridgeMetrics;
use tpck_bridge_core::network::{Bridge, BridgeListener, BridgeSettings, ConnectionRegistry};

/// Serial-to-TCP bridge for TPCK devices.
#[derive(Parser)]
#[command(name = "tpck-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial device, e.g. /dev/ttyACM0.
    serial: Option<String>,

    /// Host to listen on [default: $TRPC_HOST or localhost].
    host: Option<String>,

    /// Port to listen on [default: $TRPC_PORT or 55444].
    port: Option<u16>,

    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Serial baud rate.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };

    // Apply CLI overrides
    if let Some(serial) = &args.serial {
        config.serial.path = Some(serial.clone());
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if args.host.is_some() || args.port.is_some() {
        let (host, port) = config.listen.parse_address()?;
        let host = args.host.clone().unwrap_or(host);
        let port = args.port.unwrap_or(port);
        config.listen.address = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
    }
    config.validate()?;

    let Some(serial_path) = config.serial.resolved_path() else {
        Args::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "a serial device is required (argument or serial.path in the config file)",
            )
            .exit();
    };

    // Override log level from verbosity flag
    let log_config = match args.verbose {
        0 => config.logging.clone(),
        1 => LoggingConfig {
            level: "debug".to_string(),
            ..config.logging.clone()
        },
        _ => LoggingConfig {
            level: "trace".to_string(),
            ..config.logging.clone()
        },
    };

    // Setup tracing
    setup_tracing(&log_config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        serial = %serial_path,
        baud_rate = config.serial.baud_rate,
        listen = %config.listen.resolved_address(),
        "starting tpck bridge"
    );

    // Run the async runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move { run_bridge(config, serial_path).await })
}

fn setup_tracing(config: &LoggingConfig) {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

async fn run_bridge(config: BridgeConfig, serial_path: String) -> anyhow::Result<()> {
    let metrics = Arc::new(BridgeMetrics::new());

    // Open the serial port
    let serial = tokio_serial::new(&serial_path, config.serial.baud_rate)
        .open_native_async()
        .with_context(|| format!("failed to open serial port {serial_path}"))?;
    info!(path = %serial_path, baud_rate = config.serial.baud_rate, "serial port opened");

    // Start metrics server if enabled
    if config.metrics.enabled {
        let metrics_clone = Arc::clone(&metrics);
        let metrics_addr = config.metrics.address.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(&metrics_addr, metrics_clone).await {
                tracing::error!(error = %e, "metrics server error");
            }
        });
        info!(address = %config.metrics.address, "metrics server started");
    }

    // Start the bridge loop
    let registry = ConnectionRegistry::new();
    let bridge = Bridge::new(serial, registry.clone(), BridgeSettings::from_config(&config))
        .with_metrics(metrics)
        .start();

    // Start the listener
    let listener = BridgeListener::new(&config.listen, registry);
    let shutdown_handle = listener.shutdown_handle();

    // Handle shutdown signals
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, stopping bridge");
        let _ = shutdown_handle.send(());
    });

    // Run until shutdown
    listener.run(&bridge).await?;

    info!("bridge shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn start_metrics_server(
    addr: &str,
    metrics: Arc<BridgeMetrics>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(address = %addr, "metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            let service = service_fn(move |_req: Request<hyper::body::Incoming>| {
                let metrics = Arc::clone(&metrics);
                async move {
                    let body = metrics.encode().unwrap_or_default();
                    Ok::<_, hyper::Error>(Response::new(Full::new(Bytes::from(body))))
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, "metrics connection error");
            }
        });
    }
}
