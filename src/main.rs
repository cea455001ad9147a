//! Cirrus main entry point
//!
//! This is the command-line interface for the Cirrus catalog crawler.

use anyhow::Context;
use cirrus::api::{self, AppState};
use cirrus::config::{load_config_with_hash, Config, FrontierBackend, LoggerConfig};
use cirrus::crawler::{Daemon, HttpRenderer};
use cirrus::frontier::{Frontier, MemoryFrontier, RedisFrontier};
use cirrus::proxy::{JgProvider, ProxyPool};
use cirrus::store::{open_store, ProductStore};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Cirrus: a focused catalog crawler
///
/// Cirrus walks a merchant catalog from a root category, rotating through
/// short-lived proxies, and records every product page that passes the
/// configured match rule.
#[derive(Parser, Debug)]
#[command(name = "cirrus")]
#[command(version)]
#[command(about = "A focused catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate and print the configuration, then exit
    #[arg(long, conflicts_with = "root")]
    check: bool,

    /// Start crawling from this URL as soon as the daemon is up
    #[arg(long, value_name = "URL")]
    root: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The logger section is only known after loading, so parse first and
    // report load failures on stderr
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    setup_logging(&config.logger, cli.verbose, cli.quiet);
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    if cli.check {
        print_config(&config);
        return Ok(());
    }

    run(config, cli.root).await
}

/// Sets up the tracing subscriber from the config and verbosity flags
fn setup_logging(logger: &LoggerConfig, verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_new(&logger.level).unwrap_or_else(|_| EnvFilter::new("cirrus=info,warn")),
            1 => EnvFilter::new("cirrus=debug,info"),
            2 => EnvFilter::new("cirrus=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    if logger.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_config(config: &Config) {
    println!("=== Cirrus Configuration ===\n");

    println!("Site:");
    println!("  Root: {}", config.site.root);
    println!("  Detail prefix: {}", config.site.detail_prefix);

    println!("\nClient:");
    println!("  Connections: {}", config.client.connections);
    println!("  Poll interval: {}ms", config.client.poll_interval_ms);
    println!("  Task timeout: {}s", config.client.task_timeout_secs);

    println!("\nFrontier:");
    println!("  Backend: {:?}", config.frontier.backend);
    if let Some(url) = &config.frontier.redis_url {
        println!("  Redis: {}", url);
    }
    println!("  Key prefix: {}", config.frontier.key_prefix);

    println!("\nProxy:");
    if config.proxy.enable {
        println!("  Pool size: {}", config.proxy.size);
        println!("  Expiry margin: {}s", config.proxy.expiry_margin_secs);
    } else {
        println!("  Disabled, fetching directly");
    }

    println!("\nStore: {}", config.store.database_path);
    println!("Control API: {}:{}", config.web.binding, config.web.port);

    println!("\n✓ Configuration is valid");
}

/// Wires every component together and runs until Ctrl-C
async fn run(config: Config, root: Option<String>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let frontier: Arc<dyn Frontier> = match config.frontier.backend {
        FrontierBackend::Redis => Arc::new(
            RedisFrontier::connect(&config.frontier, shutdown.clone())
                .await
                .context("Failed to connect to the redis frontier")?,
        ),
        FrontierBackend::Memory => {
            tracing::warn!("Using the in-memory frontier; crawl progress is lost on exit");
            Arc::new(MemoryFrontier::new())
        }
    };

    let store: Arc<dyn ProductStore> = Arc::new(
        open_store(Path::new(&config.store.database_path))
            .context("Failed to open the result store")?,
    );

    let proxies = if config.proxy.enable {
        let jg = config
            .proxy
            .jg
            .clone()
            .context("proxy.enable is set but [proxy.jg] is missing")?;
        let timeout = Duration::from_secs(config.client.request_timeout_secs);
        let provider = Arc::new(JgProvider::new(jg, timeout)?);
        let pool = ProxyPool::init(provider, &config.proxy, shutdown.clone())
            .await
            .context("Failed to initialize the proxy pool")?;
        tracing::info!("Proxy pool ready with {} endpoints", pool.endpoints().await.len());
        Some(Arc::new(pool))
    } else {
        None
    };

    let renderer = Arc::new(HttpRenderer::new(&config.client)?);
    let daemon = Daemon::new(
        &config,
        frontier,
        renderer,
        proxies.clone(),
        store.clone(),
        shutdown.clone(),
    )?;

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal.cancel();
    });

    if let Some(root) = root {
        daemon
            .start(&root)
            .await
            .with_context(|| format!("Failed to start crawl from {}", root))?;
    }

    let state = AppState {
        daemon: daemon.clone(),
        store,
        proxies: proxies.clone(),
    };
    let server = tokio::spawn({
        let web = config.web.clone();
        let shutdown = shutdown.clone();
        async move {
            let result = api::serve(&web, state, shutdown.clone()).await;
            if result.is_err() {
                shutdown.cancel();
            }
            result
        }
    });

    daemon.run().await;

    if let Some(pool) = &proxies {
        pool.close();
    }

    match server.await {
        Ok(result) => result?,
        Err(e) => tracing::error!("Control API task failed: {}", e),
    }

    tracing::info!("Cirrus stopped");
    Ok(())
}
