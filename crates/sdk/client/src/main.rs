//! `beam` command line client.
//!
//! Run with: `beam <command>`. Configuration comes from `BEAM_*` environment
//! variables, optionally loaded from `.env`.

use std::sync::Arc;

use anyhow::{Context, Result};
use beam_client::{BeamClient, TerminalWindowHost, dirs, logging};
use beam_core::ChainId;
use beam_session::{FileStorage, SdkConfig, SessionState};
use clap::{Args, Parser, Subcommand};
use console::style;
use serde::Serialize;

/// Beam player sessions from the terminal
#[derive(Parser)]
#[command(name = "beam")]
#[command(about = "Manage Beam player sessions and sign operations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the address of the local signing key
    Address,

    /// Print the active session
    Session(EntityArgs),

    /// Approve a new session in the browser
    CreateSession(EntityArgs),

    /// Revoke the active session in the browser
    RevokeSession(EntityArgs),

    /// Sign an operation
    Sign(SignArgs),

    /// Wipe the local key, session and addresses
    Clear,
}

#[derive(Args)]
struct EntityArgs {
    /// Player entity id
    #[arg(long)]
    entity: String,

    /// Chain id (default: BEAM_CHAIN_ID)
    #[arg(long)]
    chain: Option<u64>,
}

#[derive(Args)]
struct SignArgs {
    #[command(flatten)]
    target: EntityArgs,

    /// Operation id
    #[arg(long)]
    operation: String,

    /// Confirm in the browser when there is no usable session
    #[arg(long)]
    browser: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = logging::setup_logging(&dirs::log_dir())?;

    let config = SdkConfig::from_env().context("Failed to load configuration")?;
    let data_dir = dirs::data_dir();
    let storage = FileStorage::new(&data_dir)
        .with_context(|| format!("Failed to open storage at {}", data_dir.display()))?;

    let host = TerminalWindowHost::new();
    let client = BeamClient::builder()
        .config(config)
        .storage(Arc::new(storage))
        .window_host(Arc::new(host.clone()))
        .build()?;

    match cli.command {
        Command::Address => {
            let address = client.signing_address()?;
            println!("{}", address);
        }
        Command::Session(args) => {
            let chain_id = select_chain(&client, args.chain)?;
            let session = client.get_active_session(&args.entity, chain_id).await?;
            print_json(&session)?;
        }
        Command::CreateSession(args) => {
            let chain_id = select_chain(&client, args.chain)?;
            host.spawn_stdin_reader();
            client.open_popup(None)?;

            let result = client.create_session(&args.entity, chain_id).await;
            client.close_popup();
            let session = result?;

            println!("{} {}", style("Session created:").green().bold(), session.id);
            print_json(&session)?;
        }
        Command::RevokeSession(args) => {
            let chain_id = select_chain(&client, args.chain)?;
            host.spawn_stdin_reader();
            client.open_popup(None)?;

            let result = client.revoke_session(&args.entity, chain_id).await;
            client.close_popup();
            result?;

            println!("{}", style("Session revoked").green().bold());
        }
        Command::Sign(args) => {
            let chain_id = select_chain(&client, args.target.chain)?;
            if args.browser {
                host.spawn_stdin_reader();
            }

            let operation = client
                .sign_operation(&args.target.entity, &args.operation, chain_id, args.browser)
                .await?;
            client.close_popup();

            println!(
                "{} {} ({:?})",
                style("Operation signed:").green().bold(),
                operation.id,
                operation.status
            );
        }
        Command::Clear => {
            let had_key = client.session_state() != SessionState::NoKey;
            client.clear_session()?;
            if had_key {
                println!("{}", style("Local state cleared").green());
            } else {
                println!("{}", style("Nothing to clear").dim());
            }
        }
    }

    Ok(())
}

/// Make `chain` the active chain, or use the configured one.
fn select_chain(client: &BeamClient, chain: Option<u64>) -> Result<u64> {
    if let Some(id) = chain {
        let chain_id = ChainId::try_from(id)?;
        client
            .config()
            .set_chain_id(chain_id)
            .with_context(|| format!("Chain {} is not configured", id))?;
    }
    Ok(client.chain_id()?)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
