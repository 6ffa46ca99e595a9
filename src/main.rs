use clap::Parser;
use docvec::application::search::SearchOptions;
use docvec::cli::commands::{Cli, Commands};
use docvec::config::Settings;
use docvec::domain::entities::document::Document;
use docvec::domain::values::consistency::ConsistencyLevel;
use docvec::{store_options, Store};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error reading configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_command(&settings, cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_command(settings: &Settings, cmd: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = store_options(settings)?;
    match cmd {
        Commands::Provision { drop_old } => {
            if drop_old {
                options = options.with_drop_old();
            }
            let store = Store::connect(settings.connection.clone(), options).await?;
            println!("{}", serde_json::to_string_pretty(store.collection())?);
        }
        Commands::Add { json, skip_flush } => {
            let documents: Vec<Document> = serde_json::from_str(&json)?;
            if skip_flush {
                options = options.with_skip_flush_on_write();
            }
            let store = Store::connect(settings.connection.clone(), options).await?;
            let ids = store.add_documents(&documents).await?;
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        Commands::Search {
            query,
            k,
            threshold,
            consistency,
            filter,
            partition,
        } => {
            let mut search = SearchOptions::new().with_score_threshold(threshold);
            if let Some(level) = consistency {
                let level: ConsistencyLevel = level.parse()?;
                search = search.with_consistency_level(level);
            }
            if let Some(expr) = filter {
                search = search.with_filter(expr);
            }
            if let Some(name) = partition {
                search = search.with_partition_name(name);
            }
            let store = Store::connect(settings.connection.clone(), options).await?;
            let results = store.similarity_search(&query, k, search).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }
    Ok(())
}
