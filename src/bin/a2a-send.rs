//! A2A Message Sending Utility
//!
//! Sends one message to an A2A agent through the protocol bridge, or fetches
//! an agent's card. Handy for poking a running router's dynamic agent.
//!
//! ## Usage
//!
//! ```bash
//! # Fetch the card a server advertises
//! a2a-send card --url http://localhost:10120
//!
//! # Send a message, addressing the dynamic sub-agent "weather-1"
//! a2a-send send --url http://localhost:10120/a2a --agent-id weather-1 \
//!   --text "clima em Lisboa"
//!
//! # Resolve the endpoint from the advertised card first
//! a2a-send send --url http://localhost:10120 --discover --text "calc 6*7"
//!
//! # Only speak the legacy `message` dialect
//! a2a-send send --url http://localhost:9999/ --legacy --text "hello"
//! ```

use a2a_router::bridge::{EnvelopeVariant, ToolFactory};
use a2a_router::card::AgentCard;
use a2a_router::observability::init_default_logging;
use a2a_router::NormalizedResult;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::time::Duration;

const WELL_KNOWN_CARD_PATH: &str = "/.well-known/agent.json";

#[derive(Parser)]
#[command(
    name = "a2a-send",
    about = "Send test messages to A2A agents",
    long_about = "Sends one message to an A2A agent through the router's protocol bridge,\n\
                  negotiating the JSON-RPC dialect the agent speaks."
)]
struct Args {
    /// Request timeout in milliseconds
    #[arg(long, default_value = "30000", global = true)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the agent card served at <url>/.well-known/agent.json
    Card {
        /// Agent base URL
        #[arg(long, required = true)]
        url: String,
    },
    /// Send a text message
    Send {
        /// Agent JSON-RPC endpoint, or base URL with --discover
        #[arg(long, required = true)]
        url: String,

        /// Message text
        #[arg(long, required = true)]
        text: String,

        /// Dynamic sub-agent to address (sent as params.metadata.agent_id)
        #[arg(long)]
        agent_id: Option<String>,

        /// Read the endpoint from the agent's well-known card
        #[arg(long)]
        discover: bool,

        /// Only use the legacy `message` envelope
        #[arg(long)]
        legacy: bool,
    },
}

async fn fetch_card(
    base_url: &str,
    timeout: Duration,
) -> Result<AgentCard, Box<dyn std::error::Error>> {
    let url = format!("{}{WELL_KNOWN_CARD_PATH}", base_url.trim_end_matches('/'));
    let card = reqwest::Client::new()
        .get(&url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .json::<AgentCard>()
        .await?;
    card.validate()?;
    Ok(card)
}

async fn send(
    url: &str,
    text: &str,
    agent_id: Option<&str>,
    discover: bool,
    legacy: bool,
    timeout: Duration,
) -> Result<NormalizedResult, Box<dyn std::error::Error>> {
    let card = if discover {
        fetch_card(url, timeout).await?
    } else {
        AgentCard::new("a2a-send-target", "Agent addressed from the command line", url)
    };

    let mut factory = ToolFactory::default().with_timeout(timeout);
    if legacy {
        factory = factory.with_variants(vec![EnvelopeVariant::LegacyMessage]);
    }

    let mut tool = factory.build(&card)?;
    if let Some(agent_id) = agent_id {
        tool = tool.with_metadata(json!({"agent_id": agent_id}));
    }

    println!("\n📤 Sending to {} ({})", tool.agent_name(), tool.endpoint());
    if let Some(agent_id) = agent_id {
        println!("   Agent ID: {agent_id}");
    }
    println!("   Message: {text}");

    Ok(tool.call(text).await)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_default_logging();

    let timeout = Duration::from_millis(args.timeout_ms);

    match args.command {
        Command::Card { url } => match fetch_card(&url, timeout).await {
            Ok(card) => println!("{}", serde_json::to_string_pretty(&card)?),
            Err(e) => {
                eprintln!("✗ Failed to fetch agent card: {e}");
                std::process::exit(1);
            }
        },
        Command::Send {
            url,
            text,
            agent_id,
            discover,
            legacy,
        } => {
            let sent = send(&url, &text, agent_id.as_deref(), discover, legacy, timeout).await;
            let result = match sent {
                Ok(result) => result,
                Err(e) => {
                    eprintln!("✗ Failed to send message: {e}");
                    std::process::exit(1);
                }
            };

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                eprintln!("✗ Agent call failed");
                std::process::exit(2);
            }
            println!("✓ Message delivered");
        }
    }

    Ok(())
}
