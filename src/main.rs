use clap::Parser;
use tracing::info;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tsr_processor::{
    args::Args,
    database::db::DbClient,
    model::{self, coordinator::PeriodCoordinator, store::RatingStore}
};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args);

    let client = DbClient::connect(&args.connection_string)
        .await
        .expect("Expected valid database connection");

    let players = client.get_players().await.expect("Failed to fetch players");
    let sessions = client
        .get_unrated_sessions()
        .await
        .expect("Failed to fetch unrated sessions");

    info!(players = players.len(), sessions = sessions.len(), "starting rating run");

    if sessions.is_empty() {
        info!("No unrated sessions to process");
        return;
    }

    let session_ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
    let first_period_id = client
        .next_period_id()
        .await
        .expect("Failed to determine the next rating period");

    let mut coordinator = PeriodCoordinator::new(client, args.engine_config(), first_period_id);
    let summary = model::process_sessions(
        &mut coordinator,
        &sessions,
        args.period_policy(),
        &args.aggregator_config()
    )
    .await
    .expect("Rating run aborted");

    // Sessions are only flagged once every covering period has committed
    let client = coordinator.into_store();
    client
        .mark_sessions_rated(&session_ids)
        .await
        .expect("Failed to mark sessions as rated");

    info!(
        periods = summary.periods_committed,
        outcomes = summary.outcomes_rated,
        skipped = summary.sessions_skipped,
        "processing run complete"
    );
}

fn init_tracing(args: &Args) {
    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}
