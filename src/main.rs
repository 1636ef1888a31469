use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod clock;
mod config;
mod db;
mod error;
mod genai;
mod hub;
mod microbet;
mod plays;

use clock::PlayClock;
use config::Config;
use db::Database;
use genai::GenAiClient;
use hub::{AppState, SubscriberHub};
use microbet::BetExecutor;
use plays::{load_plays, PlaySource, PlaysFile, SportradarFeed};

const INITIAL_FETCH_BACKOFF: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    // Pick the play source: a local file wins over the live feed.
    let source: Box<dyn PlaySource> = match (&config.plays_file, config.sportradar_key()) {
        (Some(path), _) => Box::new(PlaysFile::new(path)),
        (None, Some(key)) => Box::new(SportradarFeed::new(
            &config.sportradar_api_url,
            &config.sportradar_game_id,
            key,
        )?),
        (None, None) => anyhow::bail!("no play source configured"),
    };
    let plays = load_plays(source.as_ref(), config.fetch_attempts, INITIAL_FETCH_BACKOFF).await?;

    // One client serves as both generator and judge.
    let genai = Arc::new(GenAiClient::new(
        &config.genai_api_url,
        config.genai_api_key.clone(),
        &config.genai_model,
        config.call_timeout(),
    )?);
    if !genai.is_configured() {
        warn!("GENAI_API_KEY not set: micro-bets rotate through fallback questions and stay open");
    }

    let (executor, completions) = BetExecutor::new(
        genai.clone(),
        genai,
        Arc::new(db.clone()),
        &config.home_team,
        &config.away_team,
        config.call_timeout(),
    );

    let hub = SubscriberHub::new();
    let clock = PlayClock::new(
        plays,
        &config.game_id,
        executor,
        completions,
        Arc::new(hub.clone()),
    );

    let app = hub::router(AppState { hub, db });
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Subscribers connect to ws://{}/ws", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // The clock owns all bet state and runs in its own task.
    tokio::spawn(clock.run(config.tick_period()));

    // Run the server (blocks until shutdown)
    axum::serve(listener, app).await?;

    Ok(())
}
