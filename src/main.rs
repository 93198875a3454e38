mod abs_client;
mod api;
mod config;
mod domain;
mod error;
mod hardcover_client;
mod logging;
mod runner;
mod scheduler;
mod sync;

use std::{path::Path, sync::Arc};

use abs_client::AbsClient;
use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Config;
use hardcover_client::HardcoverClient;
use poem::{
    EndpointExt, Route, Server,
    listener::TcpListener,
    middleware::{Cors, Tracing as PoemTracing},
};
use poem_openapi::OpenApiService;
use runner::{RunOutcome, SyncRunner};

type SyncResult<T> = anyhow::Result<T>;

/// Push Audiobookshelf listening progress to Hardcover
#[derive(Parser, Debug)]
#[command(name = "abs-hardcover-sync", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync and exit
    Sync,
    /// Sync on a schedule and serve the HTTP API (default)
    Serve,
}

#[tokio::main]
async fn main() -> SyncResult<()> {
    let cli = Cli::parse();

    // Load environment variables from .env files
    if Path::new(".env.local").exists() {
        dotenvy::from_filename(".env.local")?;
    } else if Path::new(".env").exists() {
        dotenvy::from_filename(".env")?;
    };
    let config = Config::load()?;

    let _logging = logging::init(&config.log_dir)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_dir = %config.log_dir.display(),
        "starting ABS Hardcover Sync"
    );
    config.validate()?;

    let abs = AbsClient::new(&config.abs_url, config.http_timeout)?
        .with_api_key(&config.abs_api_key);
    tracing::info!(abs_url = %abs.base_url(), "configured ABS client");
    let hardcover = HardcoverClient::new(
        &config.hardcover_api_url,
        &config.hardcover_api_key,
        config.http_timeout,
    )?;
    tracing::info!(api_url = %hardcover.api_url(), "configured Hardcover client");

    let runner = Arc::new(SyncRunner::new(
        Arc::new(abs),
        Arc::new(hardcover),
        config.finished_threshold,
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Sync => {
            let record = runner.run().await;
            if let RunOutcome::Failed(error) = record.outcome {
                anyhow::bail!("sync failed: {}", error);
            }
            Ok(())
        }
        Command::Serve => {
            tokio::spawn(scheduler::run(runner.clone(), config.sync_schedule.clone()));
            run_poem(runner, &config.bind_addr).await
        }
    }
}

pub async fn run_poem(runner: Arc<SyncRunner>, bind_addr: &str) -> SyncResult<()> {
    let version = env!("CARGO_PKG_VERSION");
    let api = api::SyncApi { runner };
    let api_service = OpenApiService::new(api, "ABS Hardcover Sync API", version)
        .server(format!("http://{}", bind_addr));
    let ui = api_service.rapidoc();
    let spec = api_service.spec();
    let route = Route::new()
        .nest("/", api_service)
        .nest("/ui", ui)
        .nest("/spec", poem::endpoint::make_sync(move |_| spec.clone()))
        .with(Cors::new())
        .with(PoemTracing);

    tracing::info!(%bind_addr, "starting HTTP server");
    Server::new(TcpListener::bind(bind_addr))
        .run(route)
        .await
        .with_context(|| format!("HTTP server on {} failed", bind_addr))?;
    Ok(())
}
