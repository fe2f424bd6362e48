//! Gateway Bot Example
//!
//! Runs every bundled module against an in-memory platform session. Events
//! are read as newline-delimited JSON from stdin, so a recorded session can be
//! replayed:
//!
//! ```bash
//! cargo run --package gateway-bot -- --config demos/gateway_bot/kestrel.toml \
//!     < demos/gateway_bot/events.jsonl
//! ```
//!
//! Each line is one `{"type": ..., "data": ...}` gateway event:
//!
//! ```text
//! {"type":"ready","data":{"user":{"id":"0","username":"kestrel","bot":true},"guilds":["1"]}}
//! {"type":"guild_member_add","data":{"guild_id":"1","user":{"id":"200","username":"stranger"}}}
//! ```
//!
//! The process exits with the runtime's exit code, so `/restart` exits
//! non-zero for a supervisor to bring it back up.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kestrel::core::{Guild, GuildId, Member, SessionOp, User, UserId};
use kestrel::modules::{
    DebugModule, ExtraModule, InMemoryLedgerStore, InMemoryWhitelistStore, LedgerModule,
    WhitelistModule,
};
use kestrel::prelude::*;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "gateway-bot", about = "Replay gateway events through the Kestrel modules")]
struct Args {
    /// Configuration file; searched for in the usual places when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (`development`, `production`, ...).
    #[arg(short, long)]
    profile: Option<String>,
}

// ============================================================================
// Sample Platform
// ============================================================================

fn member(id: &str, username: &str) -> Member {
    Member {
        user: User {
            id: UserId::new(id),
            username: username.into(),
            bot: false,
        },
        roles: Vec::new(),
    }
}

/// A session with one guild holding the configured owner and a regular user.
fn sample_session() -> MemorySession {
    let guild = Guild {
        id: GuildId::new("1"),
        name: "Kestrel Test Server".into(),
    };
    MemorySession::default().with_guild(
        guild,
        vec![member("100", "owner"), member("101", "regular")],
    )
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let session = Arc::new(sample_session());

    let mut builder = GatewayRuntime::builder().session(session.clone());
    if let Some(path) = args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = args.profile {
        builder = builder.profile(profile);
    }
    let mut runtime = builder.build().context("failed to start the gateway runtime")?;

    let config = runtime.config().clone();
    let shutdown = runtime.shutdown_handle();

    let features = Arc::new(InMemoryFeatureStore::new());
    for feature in DebugModule::features()
        .into_iter()
        .chain(ExtraModule::features())
    {
        features.register(feature);
    }

    runtime.register_module(&DebugModule::new(&config, features.clone(), shutdown))?;
    runtime.register_module(&ExtraModule::new(&config, features))?;
    runtime.register_module(&WhitelistModule::new(
        &config,
        Arc::new(InMemoryWhitelistStore::new()),
    ))?;
    runtime.register_module(&LedgerModule::new(
        &config,
        Arc::new(InMemoryLedgerStore::new()),
    ))?;

    let reason = runtime.run(JsonLinesSource::stdin()).await?;

    info!(
        calls = session.calls().len(),
        messages = session.sent_messages().len(),
        kicks = session.count(SessionOp::KickMember),
        "session summary"
    );

    std::process::exit(reason.exit_code());
}
