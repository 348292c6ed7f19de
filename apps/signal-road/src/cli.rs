use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use signal_proto::{ErrorBody, SignalingRoom};
use tracing::debug;

use crate::auth::CallerTokens;

#[derive(Parser, Debug)]
#[command(name = "signal-road")]
#[command(about = "Call signaling mailbox server and debug client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the signaling server (default)
    Serve,

    /// Fetch and print the signaling room of a session
    Room {
        /// Server base URL
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,

        /// Session id to inspect
        #[arg(short, long)]
        session: String,

        /// Participant id to sign a short-lived token for (uses SIGNAL_JWT_SECRET)
        #[arg(short, long)]
        caller: String,
    },

    /// Mint a caller token for local testing
    Token {
        /// Participant id placed in the `sub` claim
        #[arg(short, long)]
        caller: String,

        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
}

pub fn mint_token(secret: &str, caller: &str, ttl: Duration) -> Result<String> {
    if secret.is_empty() {
        bail!("SIGNAL_JWT_SECRET must be set to mint tokens");
    }
    CallerTokens::new(secret.as_bytes())
        .issue(caller, ttl)
        .context("failed to sign caller token")
}

pub async fn run_room_client(url: &str, session: &str, caller: &str, secret: &str) -> Result<()> {
    let token = mint_token(secret, caller, Duration::from_secs(60))?;
    let endpoint = format!("{}/sessions/{}/room", url.trim_end_matches('/'), session);
    debug!(%endpoint, %caller, "fetching room");

    let response = reqwest::Client::new()
        .get(&endpoint)
        .bearer_auth(token)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .with_context(|| format!("request to {endpoint} failed"))?;

    let status = response.status();
    if !status.is_success() {
        let body: Option<ErrorBody> = response.json().await.ok();
        match body {
            Some(body) => bail!("{status}: {} ({})", body.message, body.error),
            None => bail!("{status}"),
        }
    }

    let room: Option<SignalingRoom> = response.json().await?;
    match room {
        Some(room) => println!("{}", serde_json::to_string_pretty(&room)?),
        None => println!("no room yet for session {session}"),
    }
    Ok(())
}
