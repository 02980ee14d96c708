//! Command-line front end for inspecting declarations and mapping items.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use common::config::DEFAULT_LOG_LEVEL;
use mapper::ioc::contracts;
use mapper::{
    DeclarationRegistry, InMemoryStore, ItemId, ItemStore, MapperConfig, MapperContext,
    ServiceRegistry, TypeKey,
};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "itemmap")]
#[command(about = "Resolve item mapping declarations and map stored items")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every declared type and report configuration errors
    Validate {
        /// JSON array of type declarations
        declarations: PathBuf,
    },
    /// Print the resolved configuration of one type
    Show {
        declarations: PathBuf,
        #[arg(value_name = "TYPE")]
        type_key: String,
    },
    /// Map one stored item and print the result
    Get {
        declarations: PathBuf,
        /// JSON store fixture (`{ "items": [...] }`)
        store: PathBuf,
        #[arg(value_name = "TYPE")]
        type_key: String,
        item_id: String,
        /// Construct a lazy proxy (every property is still read before printing)
        #[arg(long)]
        lazy: bool,
        /// Return the most-derived type matching the item's template
        #[arg(long)]
        infer_type: bool,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let settings = MapperConfig::from_env();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    debug!(default_level = DEFAULT_LOG_LEVEL, "Logging initialized");

    let cli = Cli::parse();
    match run(cli.command, settings) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, settings: MapperConfig) -> CliResult<ExitCode> {
    match command {
        Commands::Validate { declarations } => {
            let context = open(&declarations, Arc::new(InMemoryStore::new()), settings)?;
            let errors = context.validate();
            let report: Vec<_> = errors
                .iter()
                .map(|e| serde_json::json!({ "code": e.code(), "message": e.to_string() }))
                .collect();
            print_json(&serde_json::json!({
                "types": context.declarations().len(),
                "errors": report,
            }))?;
            if errors.is_empty() {
                info!("All declarations resolved");
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Show {
            declarations,
            type_key,
        } => {
            let context = open(&declarations, Arc::new(InMemoryStore::new()), settings)?;
            let configuration = context.configuration(&TypeKey::new(type_key))?;
            print_json(&configuration.summary())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Get {
            declarations,
            store,
            type_key,
            item_id,
            lazy,
            infer_type,
        } => {
            let store = Arc::new(InMemoryStore::from_json_file(&store)?);
            let context = open(&declarations, store.clone(), settings)?;

            let mut options = context.default_options();
            options.lazy |= lazy;
            options.infer_type |= infer_type;

            let item_id = ItemId::parse(&item_id)?;
            let Some(object) = context.get_item(&TypeKey::new(type_key), item_id, options)? else {
                error!(item_id = %item_id, "Item not found");
                return Ok(ExitCode::FAILURE);
            };
            let constructed = store.stats();

            for property in object.configuration().properties() {
                object.get(property.name())?;
            }

            print_json(&serde_json::json!({
                "options": options,
                "object": object,
                "store_reads": {
                    "construction": constructed.reads,
                    "total": store.stats().reads,
                },
                "cache": context.cache().stats(),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Assemble a context through the service registry
fn open(
    declarations: &Path,
    store: Arc<dyn ItemStore>,
    settings: MapperConfig,
) -> CliResult<Arc<MapperContext>> {
    let registry = DeclarationRegistry::from_json_file(declarations)?;
    info!(
        path = %declarations.display(),
        types = registry.len(),
        "Loaded declarations"
    );

    let services = ServiceRegistry::new();
    services
        .register(contracts::ITEM_STORE, store)
        .register(contracts::SETTINGS, settings);
    Ok(MapperContext::from_resolver(&services, registry)?)
}

fn print_json(value: &impl serde::Serialize) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
