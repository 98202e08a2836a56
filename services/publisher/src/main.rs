//! Satellite product publisher.
//!
//! Publishes one observation of a satellite product into GeoServer,
//! provisioning the product's workspace and mosaic store on first use.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geoserver_client::GeoServerClient;
use publication::{load_config, Publisher, PublisherConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "publisher")]
#[command(about = "Publishes satellite GeoTIFF products to GeoServer")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "PUBLISHER_CONFIG", default_value = "config/publisher.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Which product to operate on.
#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct Target {
    /// Satellite identifier (electro_l2, himawari8, goes16, goes17)
    #[arg(short, long)]
    satellite: Option<String>,

    /// Configured product name
    #[arg(short, long)]
    product: Option<String>,
}

#[derive(clap::Args, Debug)]
struct Observation {
    /// Year, e.g. 2021
    year: String,
    /// Zero-padded month, e.g. 07
    month: String,
    /// Zero-padded day, e.g. 19
    day: String,
    /// HHMM time slot, e.g. 2030
    slot: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish one observation and print the outcome
    Publish {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        observation: Observation,
    },

    /// Print the lifecycle state of one observation without changing anything
    Status {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        observation: Observation,
    },

    /// List the granules of a product's store
    Granules {
        #[command(flatten)]
        target: Target,
    },

    /// Remove one granule from a product's store
    DeleteGranule {
        #[command(flatten)]
        target: Target,
        /// Granule id as listed by `granules`
        id: String,
    },

    /// Reset the catalog's store and raster caches
    Reset,

    /// Reload the catalog configuration from disk
    Reload,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args.config)?;
    info!(
        config = %args.config.display(),
        products = ?config.products.keys().collect::<Vec<_>>(),
        "Loaded configuration"
    );

    match args.command {
        Commands::Publish {
            target,
            observation,
        } => {
            let publisher = publisher_for(&config, &target)?;
            let key = publisher.key(
                &observation.year,
                &observation.month,
                &observation.day,
                &observation.slot,
            )?;
            let outcome = publisher.workflow(&key).await;
            println!("{}", outcome);
            if outcome.is_success() {
                return Ok(ExitCode::SUCCESS);
            }
            return Ok(ExitCode::FAILURE);
        }

        Commands::Status {
            target,
            observation,
        } => {
            let publisher = publisher_for(&config, &target)?;
            let key = publisher.key(
                &observation.year,
                &observation.month,
                &observation.day,
                &observation.slot,
            )?;
            let state = publisher.assess(&key).await?;
            println!("{}", state);
        }

        Commands::Granules { target } => {
            let publisher = publisher_for(&config, &target)?;
            let index = publisher.list_granules().await?;
            for (id, location) in index.iter() {
                println!("{}\t{}", id, location);
            }
            info!(store = publisher.store(), count = index.len(), "Listed granules");
        }

        Commands::DeleteGranule { target, id } => {
            let publisher = publisher_for(&config, &target)?;
            publisher.delete_granule(&id).await?;
        }

        Commands::Reset => {
            catalog_client(&config)?.reset().await?;
        }

        Commands::Reload => {
            catalog_client(&config)?.reload().await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn publisher_for(config: &PublisherConfig, target: &Target) -> Result<Publisher> {
    let publisher = match (&target.satellite, &target.product) {
        (Some(satellite), _) => Publisher::for_satellite(config, satellite)?,
        (None, Some(product)) => Publisher::new(config, product)?,
        (None, None) => anyhow::bail!("Either --satellite or --product is required"),
    };
    info!(
        product = publisher.product(),
        workspace = publisher.workspace(),
        store = publisher.store(),
        "Publisher ready"
    );
    Ok(publisher)
}

fn catalog_client(config: &PublisherConfig) -> Result<GeoServerClient> {
    GeoServerClient::new(config.geoserver.clone()).context("Failed to build catalog client")
}
