use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod gallery;
pub mod image_proxy;
pub mod models;
pub mod normalize;
pub mod retry;
pub mod server;

#[cfg(test)]
mod test_support;

use config::CatalogSettings;
use server::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the catalog and image proxy
    Serve(ServeArgs),
    /// Fetch an upstream catalog endpoint and print the JSON
    Fetch(FetchArgs),
    /// Print the canonical form of catalog image URLs
    Normalize(NormalizeArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    #[command(flatten)]
    settings: CatalogSettings,
}

#[derive(Parser, Debug)]
struct FetchArgs {
    /// Endpoint path relative to the catalog API, e.g. /artworks?year=2024
    endpoint: String,

    #[command(flatten)]
    settings: CatalogSettings,
}

#[derive(Parser, Debug)]
struct NormalizeArgs {
    /// Image URLs to normalize
    #[arg(required = true)]
    urls: Vec<String>,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Fetch(args) => run_fetch(args).await,
        Commands::Normalize(args) => {
            for url in &args.urls {
                println!("{}", normalize::normalize_image_url(url));
            }
            Ok(())
        }
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    init_logging(&args.settings.log_level);

    let state = Arc::new(AppState {
        catalog: args.settings.build_client(args.settings.http_client()?),
        images: args.settings.build_image_proxy()?,
    });

    tracing::info!(
        api_url = %args.settings.api_url,
        image_hosts = ?args.settings.image_hosts,
        "starting artwork proxy"
    );
    server::start_server(state, SocketAddr::new(args.bind, args.port)).await
}

async fn run_fetch(args: FetchArgs) -> Result<()> {
    init_logging(&args.settings.log_level);

    let client = args.settings.build_client(args.settings.http_client()?);
    println!("GET {}", client.resolve(&args.endpoint));

    let value = client
        .fetch_json(&args.endpoint)
        .await
        .with_context(|| format!("Failed to fetch {}", args.endpoint))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("Failed to render response")?
    );
    Ok(())
}
