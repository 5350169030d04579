use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod catalog;
mod cli;
mod config;
mod embedding;
mod factory;
mod index;
mod product;
mod query;
mod similarity;
mod storage;
mod store;
mod sync;
#[cfg(test)]
mod tests;

use embedding::EmbeddingPath;
use factory::AppFactory;
use query::UserProfile;
use sync::SyncReport;

pub fn parse_list(values: String) -> Vec<String> {
    values
        .split(',')
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let paths = AppFactory::get_paths()?;
    let app = AppFactory::create_app(&paths)?;

    match args.command {
        cli::Command::Sync { force } => {
            let result = app.sync_service().sync(force);
            let report = SyncReport::from_result(&result);
            println!("{}", serde_json::to_string_pretty(&report)?);

            if let Err(e) = result {
                return Err(e.into());
            }
        }

        cli::Command::Status => {
            let status = app.sync_service().status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        cli::Command::SetupIndex { print } => {
            if print {
                println!("FT.CREATE {}", app.schema.to_ft_create_args().join(" "));
                return Ok(());
            }

            let outcome = app.index_manager().ensure_index(&app.schema)?;
            println!("{}: {:?}", app.schema.name, outcome);
        }

        cli::Command::Similar {
            skin_type,
            goals,
            conditions,
            limit,
        } => {
            let profile = UserProfile {
                skin_type: skin_type.trim().to_lowercase(),
                goals: goals.map(parse_list).unwrap_or_default(),
                conditions: conditions.map(parse_list).unwrap_or_default(),
            };
            let limit = limit.unwrap_or(app.config.query.default_limit);

            let products = app.query_service().find_for_profile(&profile, limit);
            println!("{}", serde_json::to_string_pretty(&products)?);
        }

        cli::Command::Embed { text, effects } => {
            let embedding = if effects {
                app.embedder.embed_effects(text.as_slice())
            } else {
                app.embedder.embed(&text.join(" "))
            };

            let path = match &embedding.path {
                EmbeddingPath::Primary => "primary".to_string(),
                EmbeddingPath::Fallback(reason) => format!("fallback ({reason:?})"),
            };
            let output = json!({
                "path": path,
                "dimensions": embedding.vector.len(),
                "vector": embedding.vector,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
