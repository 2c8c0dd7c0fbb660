//! Rivven Catalog CLI
//!
//! Resolve schema ids against an Apicurio registry and inspect enveloped
//! records.
//!
//! ## Usage
//!
//! ```bash
//! # Resolve the latest id for a subject
//! rivven-catalog resolve-id --config catalog.yaml --subject orders
//!
//! # Fetch schema content by id
//! rivven-catalog resolve-schema --config catalog.yaml --id 101
//!
//! # Read the envelope of a hex-encoded record
//! rivven-catalog inspect --encoding legacy 000000006548656c6c6f
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use rivven_catalog::{
    ApicurioCatalog, CatalogConfig, CatalogHandler, IdCodec, IdEncoding, SchemaId,
    VERSION_LATEST,
};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "rivven-catalog")]
#[command(
    author,
    version,
    about = "Rivven Catalog - schema id resolution against an Apicurio registry"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a subject version to a schema id
    ResolveId {
        /// Catalog configuration file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Subject (artifact id)
        #[arg(short, long)]
        subject: String,

        /// Version number or "latest"
        #[arg(id = "schema_version", short = 'v', long = "version", default_value = VERSION_LATEST)]
        version: String,
    },

    /// Fetch schema content by id
    ResolveSchema {
        /// Catalog configuration file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Schema id
        #[arg(short, long)]
        id: u32,
    },

    /// Print the envelope id and payload length of a hex-encoded record
    Inspect {
        /// Id encoding (default, legacy)
        #[arg(short, long, default_value = "default")]
        encoding: IdEncoding,

        /// Record bytes as hex
        record: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::ResolveId {
            config,
            subject,
            version,
        } => {
            let catalog = load(&config)?;
            match catalog.resolve_id(&subject, &version).await {
                Some(id) => println!("{}", id),
                None => anyhow::bail!("Unable to resolve {} version {}", subject, version),
            }
        }

        Commands::ResolveSchema { config, id } => {
            let catalog = load(&config)?;
            let id = SchemaId::new(id);
            match catalog.resolve_schema(id).await {
                Some(schema) => println!("{}", schema),
                None => anyhow::bail!("Unable to fetch schema id {}", id),
            }
        }

        Commands::Inspect { encoding, record } => {
            let bytes = hex::decode(record.trim()).context("Record is not valid hex")?;
            let codec = IdCodec::new(encoding);
            let (id, payload) = codec.split(&bytes);
            match id {
                Some(id) => {
                    println!("schema id:      {}", id);
                    println!("envelope bytes: {}", codec.envelope_len());
                }
                None => println!("schema id:      none"),
            }
            println!("payload bytes:  {}", payload.len());
        }
    }

    Ok(())
}

fn load(path: &Path) -> anyhow::Result<ApicurioCatalog> {
    let config = CatalogConfig::from_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let catalog = ApicurioCatalog::new(config, 0)?;
    Ok(catalog)
}
