// Muse Content Engine
// Main entry point for the muse binary

use clap::Parser;
use muse_engine::cli::{Cli, Command};
use muse_engine::config::Config;
use muse_engine::handlers::{self, Engine};
use muse_engine::telemetry::{init_telemetry, init_telemetry_with_level};
use sdk::errors::{EngineError, MuseErrorExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Basic telemetry first, before config is loaded
    init_telemetry();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load_or_create(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Hint: {}", e.user_hint());
            return;
        }
    };

    // Re-initialize with the configured level (RUST_LOG still wins)
    let log_level = cli.log.clone().unwrap_or_else(|| config.core.log_level.clone());
    init_telemetry_with_level(&log_level);

    if let Err(e) = run(cli, config).await {
        // Missing credentials is the one hard exit; everything else prints
        // a failure message and exits cleanly
        if let Some(EngineError::MissingCredentials(var)) = e.downcast_ref::<EngineError>() {
            eprintln!("Error: {} environment variable not set.", var);
            eprintln!("Please set it in your environment and try again.");
            std::process::exit(1);
        }
        eprintln!("Failed: {:#}", e);
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let engine = Engine::init(config).await?;

    match cli.command {
        Command::Ingest { file } => handlers::handle_ingest(&engine, &file).await,

        Command::Ask { query, results } => handlers::handle_ask(&engine, &query, results).await,

        Command::Report { samples } => handlers::handle_report(&engine, samples).await,

        Command::Plan {
            time_frame,
            num,
            date,
            avoid_themes,
        } => {
            handlers::handle_plan(
                &engine,
                time_frame.as_deref(),
                num,
                date.as_deref(),
                avoid_themes,
            )
            .await
        }

        Command::Ideas {
            pillar,
            num,
            wildcard,
        } => handlers::handle_ideas(&engine, &pillar, num, wildcard).await,

        Command::Develop {
            title,
            pillar,
            defense,
            outcome,
            num_images,
        } => {
            handlers::handle_develop(&engine, &title, &pillar, &defense, &outcome, num_images)
                .await
        }

        Command::PlanAndDevelop { time_frame, num } => {
            handlers::handle_plan_and_develop(&engine, time_frame.as_deref(), num).await
        }

        Command::Refine {
            component,
            original,
            feedback,
        } => handlers::handle_refine(&engine, &component, &original, &feedback).await,

        Command::Wildcard { pillar } => handlers::handle_wildcard(&engine, &pillar).await,

        Command::Run {
            request,
            session,
            on_budget,
        } => handlers::handle_run(&engine, &request, session, on_budget).await,

        Command::Session { action } => handlers::handle_session(&engine, &action).await,
    }
}
