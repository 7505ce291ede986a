//! runcfg command line
//!
//! `runcfg list` prints the stored configurations, `runcfg select <index>`
//! makes one current, and `runcfg push` re-saves the current configuration and
//! sends its live parameters to the backend.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use runcfg::backend::HttpBackend;
use runcfg::configs::ConfigSession;
use runcfg::notify::TracingNotifier;
use runcfg::storage::configs::{load_collection, ConfigStore, JsonFileStore};
use runcfg::storage::models::ModelSourceList;
use runcfg::storage::settings::{load_settings, ManagerSettings};
use tracing_subscriber::EnvFilter;

/// Manage named inference backend run configurations
#[derive(Parser, Debug)]
#[command(name = "runcfg")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored configurations (default)
    List,
    /// Make the configuration at INDEX current
    Select {
        /// Position in the list, starting at 0
        index: usize,
    },
    /// Re-save the current configuration and send its live parameters to the backend
    Push,
}

fn build_session(settings: &ManagerSettings) -> Result<ConfigSession, Box<dyn std::error::Error>> {
    let store: Arc<dyn ConfigStore> = match &settings.configs_path {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(JsonFileStore::default_location()?),
    };

    let catalog = match &settings.model_catalog_path {
        Some(path) => ModelSourceList::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load model catalog, continuing without it: {}", e);
            ModelSourceList::default()
        }),
        None => ModelSourceList::default(),
    };

    let collection = load_collection(store.as_ref());
    let backend = HttpBackend::from_settings(settings)?;

    Ok(ConfigSession::new(
        collection,
        store,
        Arc::new(catalog),
        Arc::new(backend),
        Arc::new(TracingNotifier),
    ))
}

fn print_configs(session: &ConfigSession) {
    for (index, config) in session.collection().iter().enumerate() {
        let marker = if index == session.selected_index() { "*" } else { " " };
        let runnable = session.is_runnable(index).unwrap_or(false);
        println!(
            "{} {:>2}  {:<28} {:<16} {:<5} port {}{}",
            marker,
            index,
            config.name,
            config.model_parameters.device,
            config.model_parameters.precision,
            config.api_parameters.api_port,
            if runnable { "  [ready]" } else { "" },
        );
    }

    let fields: Vec<String> = session
        .visible_fields()
        .iter()
        .map(|field| field.to_string())
        .collect();
    println!("\nfields: {}", fields.join(", "));

    if let Some(strategy) = session.current_strategy() {
        println!("strategy: {}", strategy);
    }
    if let Err(e) = session.validate_draft() {
        println!("warning: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let mut session = build_session(&settings)?;

    match cli.command.unwrap_or(Command::List) {
        Command::List => print_configs(&session),
        Command::Select { index } => {
            session.select(index)?;
            print_configs(&session);
        }
        Command::Push => {
            let outcome = session.save()?;
            if let Some(push) = outcome.push {
                if let Err(e) = push.await? {
                    tracing::warn!("{}", e);
                }
            }
        }
    }

    Ok(())
}
