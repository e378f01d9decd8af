#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use icehouse::{CONFIG, tokio, tracing};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the catalog database schema
    Migrate {},
    /// Run the server
    Serve {},
    /// Print the version of the server
    Version {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Commands::Migrate {} => {
            migrate().await?;
        }
        Commands::Serve {} => {
            serve().await?;
        }
        Commands::Version {} => {
            println!("{VERSION}");
        }
    }

    Ok(())
}

async fn migrate() -> anyhow::Result<()> {
    tracing::info!("Migrating catalog database...");
    let catalog =
        icehouse::implementations::sqlite::CatalogState::connect(&CONFIG.database_url)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
    catalog.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!("Catalog database migration complete.");
    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    // The store is embedded, so serving always starts from a migrated schema.
    migrate().await?;
    tracing::info!(
        "Starting Icehouse v{VERSION} on {}:{}...",
        CONFIG.bind_ip,
        CONFIG.listen_port
    );
    let bind_addr = std::net::SocketAddr::from((CONFIG.bind_ip, CONFIG.listen_port));
    icehouse::serve::serve_default(bind_addr).await
}
