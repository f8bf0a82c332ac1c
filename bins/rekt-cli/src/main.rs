//! REKT operator CLI
//!
//! Commands:
//! - `resolve`: Resolve a market's phase and capability flags once
//! - `watch`: Poll a market and print each snapshot until Ctrl+C
//! - `participate`: Submit a prediction (pays the entrance fee)
//! - `settle`: Settle a market at its final price
//! - `create-market`: Create a market on-chain and mirror it to the chat service
//! - `events`: Query a subgraph event feed
//! - `chats`: List prediction chats
//! - `ping`: Check RPC, subgraph and chat service connectivity
//! - `serve`: Run the chat service
//!
//! # Usage
//! ```bash
//! export REKT_CONTRACT_ADDRESS=0x5fbdb2315678afecb367f032d93f642f64180aa3
//!
//! # One-shot resolution
//! rekt resolve --market-id 1
//! rekt resolve --market-id 1 --asof 2024-06-01T00:00:00Z --out resolved.json
//!
//! # Watch every 5 seconds
//! rekt watch --market-id 1 --interval 5
//!
//! # Writes (provider account signs)
//! rekt --from 0x7099... participate --market-id 1 --price 65000
//! rekt --from 0x7099... create-market --market-id 2 --start 2024-06-01T00:00:00Z \
//!     --deadline 2024-06-02T00:00:00Z --fee 10000000000000000 --name "BTC above 70k"
//!
//! # Chat service
//! REKT_DATABASE_URL=sqlite://rekt-chat.db rekt serve --bind 0.0.0.0:3000
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use rekt_adapter::chat::{ChatClient, ChatQuery};
use rekt_adapter::contract::abi;
use rekt_adapter::contract::CreateMarketParams;
use rekt_adapter::flows::{MarketFlows, ParticipateRequest};
use rekt_adapter::market::MarketWatcher;
use rekt_adapter::subgraph::{EventFilter, SubgraphClient};
use rekt_adapter::{Address, RektConfig};
use rekt_chat::ServerConfig;

#[derive(Parser)]
#[command(name = "rekt")]
#[command(about = "REKT prediction market operator CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// JSON-RPC endpoint (overrides REKT_RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Contract address (overrides REKT_CONTRACT_ADDRESS)
    #[arg(long, global = true)]
    contract: Option<String>,

    /// Sender account for writes (overrides REKT_FROM_ADDRESS)
    #[arg(long, global = true)]
    from: Option<String>,

    /// Subgraph GraphQL endpoint (overrides REKT_SUBGRAPH_URL)
    #[arg(long, global = true)]
    subgraph_url: Option<String>,

    /// Chat service base URL (overrides REKT_CHAT_API_URL)
    #[arg(long, global = true)]
    chat_api: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a market once
    Resolve {
        #[arg(long)]
        market_id: u64,

        /// Reference time (RFC 3339 or epoch seconds, default: now)
        #[arg(long)]
        asof: Option<String>,

        /// Output file for the resolution JSON (defaults to stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Poll a market and print snapshots
    Watch {
        #[arg(long)]
        market_id: u64,

        /// Poll interval in seconds (default: REKT_POLL_INTERVAL_SECS or 5)
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many polls (0 = until Ctrl+C)
        #[arg(long, default_value = "0")]
        limit: u64,
    },

    /// Submit a prediction
    Participate {
        #[arg(long)]
        market_id: u64,

        /// Predicted price
        #[arg(long)]
        price: u128,

        /// bytes32 payload as hex (default: zero)
        #[arg(long)]
        data: Option<String>,

        /// Image attached to the prediction chat
        #[arg(long)]
        image_url: Option<String>,
    },

    /// Settle a market
    Settle {
        #[arg(long)]
        market_id: u64,

        #[arg(long)]
        final_price: u128,
    },

    /// Create a market
    CreateMarket {
        #[arg(long)]
        market_id: u64,

        /// Start time (RFC 3339 or epoch seconds)
        #[arg(long)]
        start: String,

        /// Deadline (RFC 3339 or epoch seconds)
        #[arg(long)]
        deadline: String,

        /// Participation fee in wei
        #[arg(long)]
        fee: u128,

        #[arg(long)]
        name: String,
    },

    /// Query a subgraph event feed
    Events {
        #[arg(long, value_enum)]
        feed: EventFeed,

        #[arg(long)]
        market_id: Option<u64>,

        /// Filter withdrawals by user
        #[arg(long)]
        user: Option<String>,

        /// Only events after this time (RFC 3339 or epoch seconds)
        #[arg(long)]
        since: Option<String>,

        #[arg(long, default_value = "20")]
        first: u32,

        #[arg(long, default_value = "0")]
        skip: u32,
    },

    /// List prediction chats
    Chats {
        #[arg(long)]
        market_id: Option<u64>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long, default_value = "50")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Check connectivity of every configured collaborator
    Ping,

    /// Run the chat service
    Serve {
        /// Listen address (overrides REKT_BIND_ADDR)
        #[arg(long)]
        bind: Option<String>,

        /// SQLite URL (overrides REKT_DATABASE_URL)
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EventFeed {
    Created,
    Settled,
    Participations,
    Withdrawals,
    Ownership,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    if let Commands::Serve { bind, database_url } = &cli.command {
        return run_serve(bind.clone(), database_url.clone()).await;
    }

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Resolve { market_id, asof, out } => {
            run_resolve(&config, market_id, asof, out).await
        }
        Commands::Watch { market_id, interval, limit } => {
            run_watch(&config, market_id, interval, limit).await
        }
        Commands::Participate { market_id, price, data, image_url } => {
            run_participate(&config, market_id, price, data, image_url).await
        }
        Commands::Settle { market_id, final_price } => {
            run_settle(&config, market_id, final_price).await
        }
        Commands::CreateMarket { market_id, start, deadline, fee, name } => {
            run_create_market(&config, market_id, &start, &deadline, fee, name).await
        }
        Commands::Events { feed, market_id, user, since, first, skip } => {
            run_events(&config, feed, market_id, user, since, first, skip).await
        }
        Commands::Chats { market_id, user, limit, offset } => {
            let query = ChatQuery {
                user_address: user,
                market_id,
                limit: Some(limit),
                offset: Some(offset),
            };
            run_chats(&config, query).await
        }
        Commands::Ping => run_ping(&config).await,
        Commands::Serve { .. } => Ok(()),
    }
}

/// Environment overlaid with command-line overrides
fn load_config(cli: &Cli) -> Result<RektConfig> {
    let mut overrides = HashMap::new();
    let pairs = [
        ("REKT_RPC_URL", &cli.rpc_url),
        ("REKT_CONTRACT_ADDRESS", &cli.contract),
        ("REKT_FROM_ADDRESS", &cli.from),
        ("REKT_SUBGRAPH_URL", &cli.subgraph_url),
        ("REKT_CHAT_API_URL", &cli.chat_api),
    ];
    for (key, value) in pairs {
        if let Some(value) = value {
            overrides.insert(key, value.clone());
        }
    }

    RektConfig::from_lookup(|key| overrides.get(key).cloned().or_else(|| std::env::var(key).ok()))
}

/// RFC 3339 or epoch seconds
fn parse_time(raw: &str) -> Result<i64> {
    if let Ok(secs) = raw.trim().parse::<i64>() {
        return Ok(secs);
    }
    let time = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|e| anyhow::anyhow!("Invalid time '{}': {}", raw, e))?;
    Ok(time.with_timezone(&Utc).timestamp())
}

fn parse_bytes32(raw: &str) -> Result<[u8; 32]> {
    let bytes = abi::from_hex(raw).context("Invalid --data hex")?;
    if bytes.len() > 32 {
        anyhow::bail!("--data is {} bytes, bytes32 holds at most 32", bytes.len());
    }
    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(&bytes);
    Ok(out)
}

async fn write_or_print(json_output: &str, out: Option<PathBuf>) -> Result<()> {
    if let Some(out_path) = out {
        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&out_path, json_output).await?;
        info!("");
        info!("Output written to: {}", out_path.display());
    } else {
        println!();
        println!("{}", json_output);
    }
    Ok(())
}

async fn run_resolve(
    config: &RektConfig,
    market_id: u64,
    asof: Option<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    info!("=== Market State Resolver ===");
    info!("RPC: {}", config.rpc.url);
    info!("Contract: {}", config.rpc.contract_address);
    info!("Subgraph: {}", config.subgraph_url.as_deref().unwrap_or("(none)"));
    info!("");

    let now = match asof {
        Some(ref s) => parse_time(s)?,
        None => Utc::now().timestamp(),
    };
    info!("Reference time (asof): {}", now);

    let flows = MarketFlows::from_config(config)?;
    let resolved = flows.resolver().resolve(market_id, now).await?;

    info!("");
    info!("=== Market {} ===", market_id);
    info!("Name: {}", resolved.market.name);
    info!("Phase: {} ({})", resolved.phase(), resolved.label);
    info!("Start: {} ({:?})", resolved.market.start_time, resolved.start_time_source);
    info!("Deadline: {}", resolved.market.deadline);
    info!("Entrance fee: {} wei", resolved.market.entrance_fee);
    info!("Pool: {} wei, {} player(s)", resolved.market.total_amount, resolved.players.len());
    info!("Can participate: {}", resolved.state.can_participate);
    info!("Can settle: {}", resolved.state.can_settle);
    match resolved.chain_phase {
        Some(chain) if chain != resolved.phase() => {
            warn!("Chain reports {} (local derivation wins)", chain)
        }
        Some(chain) => info!("Chain phase: {}", chain),
        None => warn!("Chain phase unavailable"),
    }

    write_or_print(&serde_json::to_string_pretty(&resolved)?, out).await
}

async fn run_watch(
    config: &RektConfig,
    market_id: u64,
    interval: Option<u64>,
    limit: u64,
) -> Result<()> {
    let interval = interval.map(Duration::from_secs).unwrap_or(config.watch.poll_interval);
    if interval.is_zero() {
        anyhow::bail!("--interval must be greater than zero");
    }

    info!("=== Market Watcher ===");
    info!("Market: {}", market_id);
    info!("Interval: {:?}", interval);
    info!("Limit: {} (0 = unlimited)", limit);
    info!("Press Ctrl+C to stop");
    info!("");

    let flows = MarketFlows::from_config(config)?;
    let mut watcher = MarketWatcher::spawn(flows.resolver().clone(), market_id, interval);
    let updates = watcher.updates().filter(|s| futures::future::ready(!s.loading));
    tokio::pin!(updates);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            next = updates.next() => {
                let Some(snapshot) = next else {
                    warn!("Watcher stopped unexpectedly");
                    break;
                };
                match &snapshot.error {
                    Some(_) => warn!("{}", snapshot.status_line()),
                    None => info!("{}", snapshot.status_line()),
                }
                if limit > 0 && snapshot.polls >= limit {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    watcher.stop();
    Ok(())
}

async fn run_participate(
    config: &RektConfig,
    market_id: u64,
    price: u128,
    data: Option<String>,
    image_url: Option<String>,
) -> Result<()> {
    info!("=== Participate ===");
    info!("Market: {}", market_id);
    info!("Prediction: {}", price);

    let mut request = ParticipateRequest::new(market_id, price);
    if let Some(raw) = data {
        request.data = parse_bytes32(&raw)?;
    }
    request.image_url = image_url;

    let flows = MarketFlows::from_config(config)?;
    let outcome = match flows.participate(request, None).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Participation failed: {:#}", e);
            return Err(e);
        }
    };

    info!("");
    info!("=== Participation CONFIRMED ===");
    info!("Transaction: {}", outcome.receipt.tx_hash);
    info!("Block: {}", outcome.receipt.block_number);
    info!("Fee paid: {} wei", outcome.fee_paid);

    // Let the detached chat post finish before the runtime shuts down
    if let Some(post) = outcome.chat_post {
        finish_chat_post(post).await;
    }
    Ok(())
}

/// Wait for a detached chat post; returns false if the task died
async fn finish_chat_post(post: JoinHandle<()>) -> bool {
    match post.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Prediction chat task did not complete: {}", e);
            false
        }
    }
}

async fn run_settle(config: &RektConfig, market_id: u64, final_price: u128) -> Result<()> {
    info!("=== Settle ===");
    info!("Market: {}", market_id);
    info!("Final price: {}", final_price);

    let flows = MarketFlows::from_config(config)?;
    let outcome = flows.settle(market_id, final_price, None).await.map_err(|e| {
        error!("Settlement failed: {:#}", e);
        e
    })?;

    info!("");
    info!("=== Settlement CONFIRMED ===");
    info!("Transaction: {}", outcome.receipt.tx_hash);
    info!("Block: {}", outcome.receipt.block_number);
    Ok(())
}

async fn run_create_market(
    config: &RektConfig,
    market_id: u64,
    start: &str,
    deadline: &str,
    fee: u128,
    name: String,
) -> Result<()> {
    let params = CreateMarketParams {
        market_id,
        start_time: parse_time(start)?,
        deadline: parse_time(deadline)?,
        participation_fee: fee,
        name,
    };

    info!("=== Create Market ===");
    info!("Market: {} \"{}\"", params.market_id, params.name);
    info!("Window: {} -> {}", params.start_time, params.deadline);
    info!("Fee: {} wei", params.participation_fee);

    let flows = MarketFlows::from_config(config)?;
    let outcome = flows.create_market(params).await.map_err(|e| {
        error!("Market creation failed: {:#}", e);
        e
    })?;

    info!("");
    info!("=== Market CREATED ===");
    info!("Transaction: {}", outcome.receipt.tx_hash);
    info!("Block: {}", outcome.receipt.block_number);
    if !outcome.mirrored {
        warn!("Market record was not stored in the chat service");
    }
    Ok(())
}

async fn run_events(
    config: &RektConfig,
    feed: EventFeed,
    market_id: Option<u64>,
    user: Option<String>,
    since: Option<String>,
    first: u32,
    skip: u32,
) -> Result<()> {
    let url = config
        .subgraph_url
        .as_deref()
        .context("No subgraph configured (set REKT_SUBGRAPH_URL)")?;
    let client = SubgraphClient::new(url)?;

    let mut filter = EventFilter::new().first(first).skip(skip);
    filter.market_id = market_id;
    if let Some(raw) = since {
        filter.since = Some(parse_time(&raw)?);
    }
    if let Some(raw) = user {
        let user: Address = raw.parse().context("Invalid --user address")?;
        filter.user = Some(user);
    }

    info!("Querying {:?} feed from {}", feed, url);
    let json_output = match feed {
        EventFeed::Created => {
            serde_json::to_string_pretty(&client.market_createds(&filter).await?)?
        }
        EventFeed::Settled => {
            serde_json::to_string_pretty(&client.market_settleds(&filter).await?)?
        }
        EventFeed::Participations => {
            serde_json::to_string_pretty(&client.market_participations(&filter).await?)?
        }
        EventFeed::Withdrawals => {
            serde_json::to_string_pretty(&client.withdraw_balances(&filter).await?)?
        }
        EventFeed::Ownership => {
            serde_json::to_string_pretty(&client.ownership_transferreds(&filter).await?)?
        }
    };
    println!("{}", json_output);
    Ok(())
}

async fn run_chats(config: &RektConfig, query: ChatQuery) -> Result<()> {
    let client = ChatClient::with_base_url(&config.chat_api_url)?;
    let page = client.list_chats(&query).await?;

    info!(
        "Chats {}-{} of {}",
        page.pagination.offset,
        page.pagination.offset as usize + page.chats.len(),
        page.pagination.total
    );
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

async fn run_ping(config: &RektConfig) -> Result<()> {
    info!("=== Connectivity ===");
    let mut failures = 0;

    let flows = MarketFlows::from_config(config)?;
    match flows.contract().rpc().test_connectivity().await {
        Ok(block) => info!("RPC {}: OK (block {})", config.rpc.url, block),
        Err(e) => {
            error!("RPC {}: {:#}", config.rpc.url, e);
            failures += 1;
        }
    }

    if let Some(url) = &config.subgraph_url {
        match SubgraphClient::new(url)?.test_connectivity().await {
            Ok(()) => info!("Subgraph {}: OK", url),
            Err(e) => {
                error!("Subgraph {}: {:#}", url, e);
                failures += 1;
            }
        }
    } else {
        info!("Subgraph: not configured");
    }

    match ChatClient::with_base_url(&config.chat_api_url)?.test_connectivity().await {
        Ok(()) => info!("Chat service {}: OK", config.chat_api_url),
        Err(e) => {
            error!("Chat service {}: {:#}", config.chat_api_url, e);
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} collaborator(s) unreachable", failures);
    }
    Ok(())
}

async fn run_serve(bind: Option<String>, database_url: Option<String>) -> Result<()> {
    let config = ServerConfig::from_lookup(|key| match key {
        "REKT_BIND_ADDR" => bind.clone().or_else(|| std::env::var(key).ok()),
        "REKT_DATABASE_URL" => database_url.clone().or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    })?;

    info!("=== Chat Service ===");
    info!("Bind: {}", config.bind_addr);
    info!("Database: {}", config.database_url);
    info!("Press Ctrl+C to stop");

    rekt_chat::serve(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finish_chat_post_reports_dead_task() {
        assert!(finish_chat_post(tokio::spawn(async {})).await);

        let dead = tokio::spawn(async { panic!("chat task blew up") });
        assert!(!finish_chat_post(dead).await);
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("1717000000").unwrap(), 1_717_000_000);
        assert_eq!(parse_time("2024-06-01T00:00:00Z").unwrap(), 1_717_200_000);
        assert!(parse_time("tomorrow").is_err());
    }

    #[test]
    fn test_parse_bytes32() {
        let data = parse_bytes32("0xabcd").unwrap();
        assert_eq!(&data[..2], &[0xab, 0xcd]);
        assert!(data[2..].iter().all(|b| *b == 0));
        assert!(parse_bytes32(&format!("0x{}", "11".repeat(33))).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "rekt",
            "--contract",
            "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "events",
            "--feed",
            "settled",
            "--market-id",
            "3",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Events { feed: EventFeed::Settled, market_id: Some(3), .. }
        ));

        let config = load_config(&cli).unwrap();
        assert_eq!(
            config.rpc.contract_address.to_string(),
            "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );
    }
}
