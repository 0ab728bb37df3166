//! A2A Router - dynamic agent discovery and protocol bridging
//!
//! Routes free text to remote A2A agents: a discovery step picks an agent card,
//! a protocol bridge speaks that agent's JSON-RPC dialect, and every outcome is
//! reduced to a single [`NormalizedResult`].
//!
//! # Overview
//!
//! - [`card`]: agent cards and the on-disk card directory
//! - [`discovery`]: local keyword rules and the remote directory client
//! - [`bridge`]: JSON-RPC envelopes and dialect negotiation
//! - [`dynamic`]: memoized in-process agents answering inbound requests
//! - [`orchestrator`]: the per-query state machine
//! - [`persistence`]: conversation, message and task records with expiry
//! - [`server`]: warp routes hosting all of the above
//!
//! # Quick Start
//!
//! ```rust
//! use a2a_router::bridge::ToolFactory;
//! use a2a_router::card::{AgentCard, DirectoryHandle, DirectorySnapshot};
//! use a2a_router::discovery::LocalDiscovery;
//! use a2a_router::orchestrator::Orchestrator;
//! use std::sync::Arc;
//!
//! let directory = Arc::new(DirectoryHandle::from_snapshot(DirectorySnapshot::from_cards(vec![
//!     AgentCard::new("WeatherAgent", "Weather information agent", "http://localhost:10110/"),
//! ])));
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(LocalDiscovery::new(directory)),
//!     ToolFactory::default(),
//! );
//!
//! // `orchestrator.run("clima em São Paulo").await` yields a NormalizedResult
//! # let _ = orchestrator;
//! ```

pub mod bridge;
pub mod card;
pub mod config;
pub mod discovery;
pub mod dynamic;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod persistence;
pub mod server;
pub mod testing;

pub use bridge::{AgentTool, ToolFactory};
pub use card::{AgentCard, DirectoryHandle, DirectorySnapshot};
pub use config::*;
pub use discovery::{AgentResolver, LocalDiscovery};
pub use dynamic::{DynamicAgent, DynamicAgentFactory};
pub use error::{FailureKind, NormalizedResult, RouterError, RouterResult};
pub use orchestrator::{Orchestrator, RoutingQuery, Stage};
