//! # Live Poll Server Library
//!
//! This library provides the server side of a live classroom session. Students
//! and a teacher connect over WebSockets, chat, see who is present, and answer
//! polls whose results are pushed to everyone as votes arrive.
//!
//! ## Core Responsibilities
//!
//! ### Presence
//! Tracks which usernames currently have at least one open connection. A
//! student with several tabs open is listed once and stays listed until the
//! last tab closes. Every change is broadcast as a full participant list.
//!
//! ### Chat and Moderation
//! Chat messages are relayed to every connection exactly as received. The
//! teacher can kick a username, which notifies and closes all of that
//! username's connections.
//!
//! ### Polls
//! Teachers create polls with a question, a timer and a list of options. Each
//! username may vote once per poll and every accepted or repeated vote
//! broadcasts the current tally. Poll history is kept in memory for the
//! lifetime of the process and served over HTTP.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! All session state lives in one [`gateway::SessionGateway`] driven by a
//! single task. Socket tasks forward decoded events over a channel and the
//! gateway applies them one at a time, so no state is ever shared between
//! tasks and nothing needs a lock.
//!
//! ### Per-Connection Queues
//! Every socket gets an unbounded outbound queue drained by its own writer
//! task. Handlers enqueue pre-encoded frames and never wait on a slow client.
//!
//! ### Forgiving Input
//! Client payloads are loosely typed JSON. Invalid input is dropped without a
//! reply and internal faults are logged, so a misbehaving client can never
//! stop the loop.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! Connection handles, encoded frames and the [`connection::Outbox`] seam that
//! engine code broadcasts through.
//!
//! ### Registry and Presence Modules (`registry`, `presence`)
//! The username to connection mapping and the participant list broadcast.
//!
//! ### Poll Modules (`poll`, `poll_store`, `poll_engine`, `payload`)
//! Poll records with their tallies, the in-memory store, poll creation and
//! vote handling, and lenient decoding of client payloads.
//!
//! ### Gateway Module (`gateway`)
//! The event loop tying the above together.
//!
//! ### Network Module (`network`)
//! axum router with the HTTP endpoints and the WebSocket upgrade.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!
//!     // Runs until Ctrl+C
//!     server::network::run(&config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod network;
pub mod payload;
pub mod poll;
pub mod poll_engine;
pub mod poll_store;
pub mod presence;
pub mod registry;
pub mod utils;
