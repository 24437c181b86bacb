use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::json;
use space_search::models::SpaceId;
use std::error::Error;

#[derive(Parser)]
#[command(name = "space-search-cli")]
#[command(about = "Space search CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "SPACE_SEARCH_ENDPOINT", default_value = "http://localhost:9115")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the spaces visible to a user
    Search {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Caller identity
        #[arg(short, long)]
        user: String,

        /// Restrict to one space or a resource inside it (`storage$space!opaque`)
        #[arg(short, long)]
        scope: Option<String>,

        /// Relative path below the scope resource
        #[arg(short = 'P', long, requires = "scope")]
        path: Option<String>,

        #[arg(short = 'n', long)]
        page_size: Option<usize>,

        /// Request deadline in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Index a whole space as its owner
    IndexSpace {
        #[arg(value_name = "SPACE_ID")]
        space_id: String,

        #[arg(short, long)]
        owner: String,
    },

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Search {
            query,
            user,
            scope,
            path,
            page_size,
            timeout_ms,
        } => {
            let mut body = json!({
                "query": query,
                "page_size": page_size,
            });
            if let Some(scope) = scope {
                let space: SpaceId = scope.parse()?;
                body["scope"] = json!({
                    "resource_id": space.root(),
                    "path": path.unwrap_or_else(|| ".".to_string()),
                });
            }

            let mut request = client
                .post(format!("{}/v1/search", cli.endpoint))
                .header("x-user-id", user)
                .json(&body);
            if let Some(ms) = timeout_ms {
                request = request.header("x-request-timeout-ms", ms.to_string());
            }

            let response = request.send().await?;
            let status = response.status();
            let body: serde_json::Value = response.json().await?;

            if !status.is_success() {
                eprintln!("Search failed ({})", status);
                println!("{}", serde_json::to_string_pretty(&body)?);
                std::process::exit(1);
            }

            let total = body["total_matches"].as_u64().unwrap_or(0);
            let matches = body["matches"].as_array().cloned().unwrap_or_default();
            println!("{} of {} matches", matches.len(), total);
            for m in matches {
                println!(
                    "{:>8.3}  {}  {}",
                    m["score"].as_f64().unwrap_or(0.0),
                    m["reference"]["path"].as_str().unwrap_or(""),
                    m["mime_type"].as_str().unwrap_or("")
                );
            }
        }

        Commands::IndexSpace { space_id, owner } => {
            let space: SpaceId = space_id.parse()?;
            let response = client
                .post(format!("{}/v1/spaces/{}/index", cli.endpoint, space))
                .json(&json!({ "owner_id": owner }))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
