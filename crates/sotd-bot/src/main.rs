// Song of the Day bot entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database
// 4. Build the Discord and Spotify clients
// 5. Wire the seeder and engine
// 6. Spawn the gateway listener
// 7. Run the app loop until Ctrl+C

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use sotd_bot::app;
use sotd_bot::config;
use sotd_bot::db::Database;
use sotd_bot::discord::DiscordClient;
use sotd_bot::gateway;
use sotd_bot::seeder::ChatRoundSeeder;
use sotd_bot::spotify::PlaylistClient;
use sotd_core::engine::Engine;
use sotd_core::ports::{ChatVenue, MatchStore, PlaylistService, RoundSeeder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Song of the Day bot starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} votes to win, voting in channel {}",
        config.bracket.votes_to_win, config.channels.vote
    );

    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);
    let store: Arc<dyn MatchStore> = Arc::new(db);

    let token = config
        .credentials
        .discord_token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .context("credentials.toml must set discord_token")?;
    let venue: Arc<dyn ChatVenue> = Arc::new(
        DiscordClient::new(&config.discord.api_base, token)
            .context("failed to build Discord client")?,
    );

    let playlist_client = PlaylistClient::from_config(&config);
    match &playlist_client {
        PlaylistClient::Active(_) => info!("Spotify client initialized"),
        PlaylistClient::Disabled => info!("Spotify mirroring disabled (credentials missing)"),
    }
    let playlists: Arc<dyn PlaylistService> = Arc::new(playlist_client);

    let seeder = Arc::new(ChatRoundSeeder::new(
        Arc::clone(&store),
        Arc::clone(&venue),
        Arc::clone(&playlists),
        config.channels.vote.clone(),
        config.playlists.voting.clone(),
    ));
    let round_seeder: Arc<dyn RoundSeeder> = seeder.clone();

    let engine = Engine::new(config.engine_config(), store, venue, playlists, round_seeder);

    let (gateway_tx, gateway_rx) = mpsc::channel(256);
    let port = config.gateway_port;
    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = gateway::serve(port, gateway_tx).await {
            error!("Gateway error on port {port}: {e}");
        }
    });

    let app_handle = tokio::spawn(app::run(gateway_rx, app::App { engine, seeder }));

    info!("Bot ready. Gateway listening on 127.0.0.1:{port}");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown requested");

    // Stopping the listener closes the gateway channel, which lets the app
    // loop drain in-flight events and exit.
    gateway_handle.abort();
    match tokio::time::timeout(std::time::Duration::from_secs(10), app_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("Application loop error: {e}"),
        Ok(Err(e)) => error!("Application task failed: {e}"),
        Err(_) => error!("Timed out waiting for in-flight events"),
    }

    info!("Song of the Day bot shut down cleanly");
    Ok(())
}

/// Initialize tracing to write to `logs/sotd.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("sotd.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sotd_bot=info,sotd_core=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
