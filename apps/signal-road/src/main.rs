use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use signal_road::{
    bookings::MemoryBookings,
    cli::{self, Cli, Commands},
    config::Config,
    mailbox, routes,
    state::AppState,
    telemetry::init_tracing,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(&config.log_filter);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Room {
            url,
            session,
            caller,
        } => cli::run_room_client(&url, &session, &caller, &config.jwt_secret).await,
        Commands::Token { caller, ttl } => {
            let token = cli::mint_token(&config.jwt_secret, &caller, Duration::from_secs(ttl))?;
            println!("{token}");
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    if config.admin_token.is_none() {
        warn!("SIGNAL_ADMIN_TOKEN unset; session registration is disabled");
    }

    let mailbox = mailbox::build_mailbox(&config)
        .await
        .context("failed to initialize mailbox backend")?;
    let bookings = MemoryBookings::new();
    let state = AppState::new(&config, mailbox, bookings);
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!(
        %addr,
        backend = ?config.mailbox_backend,
        room_ttl_secs = config.room_ttl_seconds,
        require_accepted = config.require_accepted,
        reset_candidates_on_offer = config.reset_candidates_on_offer,
        "starting signal-road"
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
