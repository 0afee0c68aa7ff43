//! sitelink - CLI tool for a site's connection to its collector
//!
//! This tool provides commands for:
//! - Checking connection state and handshake backoff
//! - Connecting, reconnecting, and disconnecting the site
//! - Sending a single event
//! - Answering a verification callback
//!
//! Uses XDG Base Directory specification for file locations:
//! - State: $XDG_DATA_HOME/sitelink/state.db (~/.local/share/sitelink/state.db)
//! - Config: $XDG_CONFIG_HOME/sitelink/config.toml (~/.config/sitelink/config.toml)

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sitelink_core::collector::{BlockingSiteClient, RequestContext};
use sitelink_core::store::{CredentialStore, SqliteStore, StateStores};
use sitelink_core::{Config, Event, SiteProviders};

#[derive(Parser)]
#[command(name = "sitelink")]
#[command(about = "Connect this site to its collector and report events")]
#[command(version)]
struct Args {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show connection state and backoff
    Status,

    /// Perform the initial handshake
    Connect,

    /// Re-handshake with the current credential
    Reconnect,

    /// Send one event
    Send {
        /// Event category (e.g. "admin")
        #[arg(short, long)]
        category: String,

        /// Event key within the category (e.g. "plugin_search")
        #[arg(short, long)]
        key: String,

        /// Event data as a JSON object
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Check a verification token presented by the collector
    Verify {
        /// Token to check
        token: String,
    },

    /// Forget the stored credential
    Disconnect,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    // Held until exit so buffered log lines are flushed
    let _log_guard = if args.verbose {
        Some(sitelink_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    let store_path = Config::store_path();
    let store = Arc::new(
        SqliteStore::open(&store_path)
            .with_context(|| format!("failed to open state store {}", store_path.display()))?,
    );

    if let Err(e) = store.purge_expired() {
        tracing::warn!(error = %e, "Failed to purge expired transients");
    }

    let client = BlockingSiteClient::new(
        config.collector.clone(),
        StateStores::shared(store.clone()),
        SiteProviders::configured(config.site.clone()),
    )
    .context("failed to create collector client")?;

    match args.command {
        Command::Status => cmd_status(&config, &client),
        Command::Connect => cmd_connect(&client),
        Command::Reconnect => cmd_reconnect(&client),
        Command::Send {
            category,
            key,
            data,
        } => cmd_send(&client, category, key, data),
        Command::Verify { token } => cmd_verify(&client, &token),
        Command::Disconnect => cmd_disconnect(store.as_ref()),
    }
}

fn cmd_status(config: &Config, client: &BlockingSiteClient) -> Result<()> {
    let connection = client.inner().connection();

    println!("Collector Connection");
    println!("====================");
    println!();
    println!("Collector URL:   {}", config.collector.api_url());
    println!("State:           {}", client.state());
    println!(
        "Attempts:        {}",
        connection.attempts().context("failed to read attempts")?
    );
    println!(
        "Throttled:       {}",
        if connection.is_throttled() { "yes" } else { "no" }
    );
    println!(
        "Next backoff:    {}",
        format_interval(
            connection
                .throttle_interval()
                .context("failed to read backoff")?
        )
    );
    println!("State store:     {}", Config::store_path().display());

    Ok(())
}

fn cmd_connect(client: &BlockingSiteClient) -> Result<()> {
    if client.is_connected() {
        println!("Already connected. Use 'reconnect' to renew the credential.");
        return Ok(());
    }

    if client.inner().connection().is_throttled() {
        bail!("connection attempts are throttled; try again later");
    }

    if !client.connect() {
        bail!("collector did not issue a credential (see 'status' for backoff)");
    }

    println!("Connected.");
    Ok(())
}

fn cmd_reconnect(client: &BlockingSiteClient) -> Result<()> {
    if !client.is_connected() {
        bail!("not connected; run 'connect' first");
    }

    if client.inner().connection().is_throttled() {
        bail!("connection attempts are throttled; try again later");
    }

    if !client.reconnect() {
        bail!("collector refused the reconnect");
    }

    println!("Reconnected.");
    Ok(())
}

fn cmd_send(
    client: &BlockingSiteClient,
    category: String,
    key: String,
    data: Option<String>,
) -> Result<()> {
    let data = match data {
        Some(raw) => serde_json::from_str(&raw).context("--data must be valid JSON")?,
        None => serde_json::Value::Null,
    };

    let event = Event::with_data(category, key, data);
    tracing::debug!(category = %event.category, key = %event.key, "Sending event");

    let record = client
        .send_event(&event, RequestContext::Interactive)
        .context("failed to send event")?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn cmd_verify(client: &BlockingSiteClient, token: &str) -> Result<()> {
    let reply = client.verification_reply(token);
    println!("{}", serde_json::to_string(&reply)?);

    if !reply.valid {
        bail!("verification token did not match");
    }
    Ok(())
}

fn cmd_disconnect(store: &SqliteStore) -> Result<()> {
    store.delete().context("failed to clear credential")?;
    println!("Disconnected.");
    Ok(())
}

fn format_interval(interval: std::time::Duration) -> String {
    let hours = interval.as_secs() / 3600;
    if hours >= 24 && hours % 24 == 0 {
        format!("{}d", hours / 24)
    } else {
        format!("{}h", hours)
    }
}
