//! Task Scheduling and Execution Server
//!
//! An in-process, in-memory task scheduling service exposed over HTTP.
//! Clients submit typed jobs with a priority, observe their progress,
//! long-poll for state changes, and request cancellation. Jobs run on a
//! bounded pool of workers; terminal records are garbage-collected after a
//! grace period; a per-client sliding-window limiter guards the edge.
// This is the main entry point for the server application. It's responsible for:
// - Initializing logging and configuration.
// - Wiring the rate limiter and task manager into the HTTP router.
// - Starting the web server and background services.
// - Handling graceful shutdown.

// Use jemalloc as the global allocator for better performance
#[cfg(not(target_os = "windows"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

// The server is organized into modules for the API surface, configuration,
// job execution, and the scheduling core.
mod api;
mod config;
mod jobs;
mod queue;
mod rate_limiter;
mod task_manager;

#[cfg(test)]
mod tests;

use config::ServerConfig;
use rate_limiter::RateLimiter;
use task_manager::TaskManager;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "In-memory task scheduling and execution service", long_about = None)]
struct CliArgs {
    /// Override the listen address (default 0.0.0.0:8000)
    #[arg(long = "listen-address", value_name = "ADDRESS")]
    listen_address: Option<String>,
}

/// The main application structure for the server.
/// It owns the core singletons (rate limiter and task manager) and the
/// network address to listen on.
pub struct Server {
    /// Runtime configuration loaded from the environment.
    config: ServerConfig,
    /// The `SocketAddr` (IP address and port) on which the web server will listen.
    listen_address: SocketAddr,
    /// Task manager owning the table, queue, worker pool, and sweeper.
    task_manager: Arc<TaskManager>,
    /// Per-client request limiter applied at the HTTP edge.
    rate_limiter: Arc<RateLimiter>,
    /// Shutdown signal sender for notifying the HTTP server.
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl Server {
    /// Creates a new server instance from the loaded configuration.
    pub fn new(config: ServerConfig, listen_address: Option<String>) -> Result<Self> {
        let listen_address =
            listen_address.unwrap_or_else(shared::defaults::default_listen_address);
        let listen_address: SocketAddr = listen_address.parse().map_err(|e| {
            anyhow::anyhow!("Invalid listen address '{}': {}", listen_address, e)
        })?;

        let task_manager = Arc::new(TaskManager::new(
            config.max_tasks_queue,
            config.concurrency,
            config.cleanup_interval,
            shared::defaults::default_cleanup_sleep_seconds(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.max_requests_per_time_per_ip,
            config.rate_limit_period,
            config.rate_limit_cleanup_interval,
        ));

        Ok(Self {
            config,
            listen_address,
            task_manager,
            rate_limiter,
            shutdown_tx: None,
        })
    }

    /// Starts the server and runs until the HTTP listener stops.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting Task Scheduling Server");

        // Log key configuration details at startup for verification.
        info!(
            listen_address = %self.listen_address,
            concurrency = self.config.concurrency,
            max_tasks_queue = self.config.max_tasks_queue,
            cleanup_interval = self.config.cleanup_interval,
            max_requests_per_ip = self.config.max_requests_per_time_per_ip,
            rate_limit_period = self.config.rate_limit_period,
            task_min_time = self.config.task_min_time,
            task_max_time = self.config.task_max_time,
            "Server configuration loaded"
        );

        // Create shutdown broadcast channel for the HTTP server.
        let (shutdown_tx, _) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        // Start background services before accepting traffic.
        self.rate_limiter.start_cleanup().await;
        self.task_manager.start().await;

        // Create application state with all dependencies.
        let app_state = api::AppState {
            task_manager: Arc::clone(&self.task_manager),
            rate_limiter: Arc::clone(&self.rate_limiter),
        };
        let app = api::create_router(app_state);

        info!("Starting HTTP server on {}", self.listen_address);

        // Bind a TCP listener to the configured address.
        let listener = tokio::net::TcpListener::bind(self.listen_address)
            .await
            .with_context(|| {
                format!(
                    "Failed to bind TCP listener to {}. \
                     Check if port is already in use (EADDRINUSE) or requires elevated permissions (EACCES).",
                    self.listen_address
                )
            })?;

        // Create a shutdown signal receiver for axum.
        let shutdown_signal = {
            let mut rx = shutdown_tx.subscribe();
            async move {
                let _ = rx.recv().await;
                info!("HTTP server received shutdown signal");
            }
        };

        // Serve with connection info so the rate limiter can fall back to
        // the peer address when x-forwarded-for is absent.
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }

    /// Performs a graceful shutdown of the server.
    ///
    /// Shutdown sequence (reverse startup order):
    /// 1. Broadcast shutdown to the HTTP server
    /// 2. Stop the task manager; in-flight executors observe cancellation
    /// 3. Stop the rate limiter's cleanup loop
    pub async fn shutdown(&mut self) {
        info!("Shutting down Task Scheduling Server gracefully");

        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }

        self.task_manager.stop().await;
        self.rate_limiter.stop_cleanup().await;

        info!("Server shutdown complete");
    }
}

/// Sets up signal handlers for graceful shutdown.
/// Returns a future that completes when a shutdown signal is received.
///
/// On Unix systems, handles SIGTERM and SIGINT signals.
/// On non-Unix systems, handles Ctrl+C.
async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate());
        let sigint = signal(SignalKind::interrupt());

        match (sigterm, sigint) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to register signal handlers: {}", e);
                error!("Falling back to Ctrl+C only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to wait for Ctrl+C: {}", e);
                } else {
                    info!("Received Ctrl+C");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to receive Ctrl+C signal: {}", e);
        } else {
            info!("Received Ctrl+C");
        }
    }
}

/// Server entry point
///
/// Initializes logging, loads configuration from the environment, creates
/// the server instance, and runs until a shutdown signal is received.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    let file_appender = tracing_appender::rolling::daily("./logs", "server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Configure logging with proper RUST_LOG environment variable handling
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default directives are only used if RUST_LOG is not set
        tracing_subscriber::EnvFilter::new("server=info,shared=info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(non_blocking)
        .init();

    // Parse command-line arguments
    let cli_args = CliArgs::parse();

    info!("Task Scheduling Server starting up");
    if cli_args.listen_address.is_some() {
        info!("Listen address override provided via command line");
    }

    // Load configuration from the environment. Exit if any value is invalid.
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Create and initialize the server. Exit if initialization fails.
    let mut server = match Server::new(config, cli_args.listen_address) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to initialize server: {}", e);
            std::process::exit(1);
        }
    };

    // Run the server and the shutdown signal handler concurrently.
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        _ = setup_shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
    }

    // Perform graceful shutdown.
    server.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}
