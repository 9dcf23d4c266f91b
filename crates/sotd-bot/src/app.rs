// Application event loop.
//
// Consumes gateway events from the relay, parses each frame and hands vote
// events to the engine on their own task. Per-match serialization lives in
// the engine, so frames for different matches proceed concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use sotd_core::bracket::Song;
use sotd_core::engine::{Declaration, Engine, VoteOutcome};
use sotd_core::ports::VoteEvent;

use crate::gateway::GatewayEvent;
use crate::protocol::GatewayMessage;
use crate::seeder::ChatRoundSeeder;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long the relay may stay silent before the connection is reported stale.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// How often the heartbeat deadline is checked.
pub const HEARTBEAT_CHECK_INTERVAL: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Everything the loop needs to dispatch a frame.
#[derive(Clone)]
pub struct App {
    pub engine: Engine,
    pub seeder: Arc<ChatRoundSeeder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayStatus {
    Disconnected,
    Connected,
    Stale,
}

/// Run until the gateway channel closes, then wait for in-flight events.
pub async fn run(mut gateway_rx: mpsc::Receiver<GatewayEvent>, app: App) -> anyhow::Result<()> {
    info!("Application event loop started");

    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut status = RelayStatus::Disconnected;
    let mut last_frame = Instant::now();

    let mut heartbeat_interval = tokio::time::interval(HEARTBEAT_CHECK_INTERVAL);
    // The first tick completes immediately.
    heartbeat_interval.tick().await;

    loop {
        tokio::select! {
            event = gateway_rx.recv() => {
                match event {
                    Some(GatewayEvent::Connected { addr }) => {
                        info!("Relay connected from {addr}");
                        status = RelayStatus::Connected;
                        last_frame = Instant::now();
                    }
                    Some(GatewayEvent::Disconnected) => {
                        info!("Relay disconnected");
                        status = RelayStatus::Disconnected;
                    }
                    Some(GatewayEvent::Frame(json)) => {
                        last_frame = Instant::now();
                        if status == RelayStatus::Stale {
                            info!("Relay connection restored");
                            status = RelayStatus::Connected;
                        }
                        dispatch_frame(&app, &json, &mut tasks);
                    }
                    None => {
                        info!("Gateway channel closed, shutting down");
                        break;
                    }
                }
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!("Event task failed: {e}");
                }
            }

            _ = heartbeat_interval.tick() => {
                let silent = last_frame.elapsed();
                if status == RelayStatus::Connected && silent > HEARTBEAT_TIMEOUT {
                    warn!("No relay frame for {silent:?}, marking connection as stale");
                    status = RelayStatus::Stale;
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Event task failed: {e}");
        }
    }

    info!("Application event loop exiting");
    Ok(())
}

/// Parse one relay frame and spawn whatever work it carries.
fn dispatch_frame(app: &App, json: &str, tasks: &mut JoinSet<()>) {
    let msg: GatewayMessage = match serde_json::from_str(json) {
        Ok(m) => m,
        Err(e) => {
            warn!("Dropping malformed relay frame: {e}");
            return;
        }
    };

    match msg {
        GatewayMessage::Heartbeat => {}
        GatewayMessage::StartDay { payload } => {
            let seeder = Arc::clone(&app.seeder);
            tasks.spawn(async move {
                start_day(&seeder, payload.songs, payload.day).await;
            });
        }
        reaction => {
            if let Some(event) = reaction.into_vote_event() {
                let engine = app.engine.clone();
                tasks.spawn(async move {
                    process_vote(&engine, event).await;
                });
            }
        }
    }
}

/// Run one vote through the engine and log what happened.
pub async fn process_vote(engine: &Engine, event: VoteEvent) -> Option<VoteOutcome> {
    let message_id = event.message.message_id.clone();
    let user_id = event.user.id.clone();

    match engine.handle_vote(event).await {
        Ok(outcome) => {
            log_outcome(&outcome, &message_id, &user_id);
            Some(outcome)
        }
        Err(e) => {
            error!(message = %message_id, user = %user_id, "vote processing failed: {e}");
            None
        }
    }
}

fn log_outcome(outcome: &VoteOutcome, message_id: &str, user_id: &str) {
    match outcome {
        VoteOutcome::Ignored(reason) => {
            debug!(message = message_id, user = user_id, ?reason, "vote ignored");
        }
        VoteOutcome::Withdrawn { emoji } => {
            debug!(message = message_id, user = user_id, emoji = %emoji, "stray reaction cleared");
        }
        VoteOutcome::Counted { match_id, tally } => {
            debug!(
                match_id = %match_id,
                a = tally.song_a_votes.len(),
                b = tally.song_b_votes.len(),
                "tally updated"
            );
        }
        VoteOutcome::Decided {
            match_id,
            declaration,
            ..
        } => match declaration {
            Declaration::Declared {
                winner,
                progression,
                ..
            } => {
                info!(match_id = %match_id, winner = %winner.id, ?progression, "match decided");
            }
            Declaration::AlreadyDeclared => {
                debug!(match_id = %match_id, "winner already declared");
            }
        },
    }
}

async fn start_day(seeder: &ChatRoundSeeder, songs: Vec<Song>, day: u32) {
    match seeder.start_day(&songs, day).await {
        Ok(shape) => info!(
            day,
            entrants = shape.entrants(),
            matches = shape.total_matches(),
            "day started"
        ),
        Err(e) => error!(day, "failed to start day: {e:#}"),
    }
}
