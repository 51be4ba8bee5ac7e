//! E-Digit Finder
//!
//! Look up the digit of e at a given position, from the command line or
//! over HTTP.
//!
//! Commands:
//! - `lookup <POSITION>...` - print each digit with its context
//! - `info` - print how many digits are available
//! - `serve` - run the HTTP interface

use clap::{Parser, Subcommand};
use edigits::http::{self, AppState};
use edigits::lookup::group_thousands;
use edigits::{
    Config, DigitSource, LookupService, APP_NAME, APP_VERSION, HTTP_BIND_ADDRESS_DEFAULT,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// CLI
// =============================================================================

/// E-Digit Finder - find the digit of e at any position
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Find the digit of e at a given position")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Digit resource: an http(s) URL or a file path
    #[arg(long, global = true)]
    resource: Option<String>,

    /// Highest position accepted
    #[arg(long, global = true)]
    max: Option<usize>,

    /// File with embedded fallback digits
    #[arg(long, global = true)]
    embedded_file: Option<PathBuf>,

    /// Use the embedded digits without fetching the resource
    #[arg(long, global = true)]
    prefer_local: bool,

    /// Fetch timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the digit at each position
    Lookup {
        /// 1-based positions
        #[arg(required = true, allow_hyphen_values = true)]
        positions: Vec<String>,
    },
    /// Print the number of available digits
    Info,
    /// Run the HTTP interface
    Serve {
        /// HTTP bind address
        #[arg(short, long, default_value = HTTP_BIND_ADDRESS_DEFAULT)]
        bind: String,
    },
}

impl Cli {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::from_env()?;

        if let Some(resource) = &self.resource {
            config = config.with_resource(resource);
        }
        if let Some(max) = self.max {
            config = config.with_digits_count_max(max)?;
        }
        if let Some(path) = &self.embedded_file {
            let path = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            config = config.with_embedded_file(std::path::Path::new(&path))?;
        }
        if self.prefer_local {
            config = config.with_prefer_local_source(true);
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_fetch_timeout(Some(Duration::from_millis(ms)));
        }

        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::info!("E-Digit Finder v{}", APP_VERSION);

    let config = cli.config()?;
    tracing::info!(resource = ?config.resource, max = config.digits_count_max, "configured");

    let source = Arc::new(DigitSource::from_config(&config)?);
    let lookup = LookupService::new(source.clone(), config.digits_count_max);

    match cli.command {
        Command::Lookup { positions } => {
            let mut failed = 0;
            for input in &positions {
                match lookup.lookup_input(input).await {
                    Ok(result) => println!(
                        "{}: {}  {}",
                        result.position,
                        result.digit,
                        result.window.render()
                    ),
                    Err(err) => {
                        failed += 1;
                        println!("{}: {}", input.trim(), err);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} lookups failed", failed, positions.len());
            }
        }
        Command::Info => {
            let digits = source.resolve().await?;
            println!("available: {} digits", group_thousands(digits.len()));
            println!(
                "maximum position: {}",
                group_thousands(config.digits_count_max)
            );
        }
        Command::Serve { bind } => {
            if let Some(delay) = config.preload_delay {
                http::spawn_preload(source.clone(), delay);
            }

            tracing::info!("Starting HTTP server on {}", bind);
            let addr: std::net::SocketAddr = bind.parse()?;
            let app = http::router(AppState::new(lookup));

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Shutdown signal received");
                })
                .await?;
        }
    }

    Ok(())
}
