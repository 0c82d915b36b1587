//! # Groupcast - Group-Key Broadcast Delivery Simulation
//!
//! Evaluates how well group-based symmetric-key distribution protects
//! broadcast messages between mobile nodes that meet opportunistically.
//!
//! ## Pipeline
//!
//! ```text
//!  mobility trace                    config sweep
//!        |                                |
//!        v                                v
//!  [Contact Graph] --> [Group Formation] ---> (Groups, Memberships)
//!        |                                         |
//!        |            [Broadcast Schedule] --------+
//!        |                                         v
//!        +---------------------------------> [Delivery Simulator]
//!                                                  |
//!                                                  v
//!                                     Delivery log --> [Statistics]
//! ```
//!
//! - **Contact graph**: undirected graph over node ids; each edge carries
//!   the proximity windows during which the pair was in range. Built once,
//!   read-only afterwards.
//! - **Group formation**: randomized greedy clique packing under two
//!   capacity limits — max groups per node (`group_limit`) and max members
//!   per group (`group_size_limit`). Each group models one shared
//!   symmetric key.
//! - **Delivery simulator**: time-steps the broadcast schedule; a
//!   recipient decrypts iff it shares the group whose key the sender's
//!   round-robin rotation selected for that broadcast. Decryption is a
//!   boolean eligibility check, not real cryptography.
//! - **Sweep runner**: one experiment per (group_limit, group_size_limit,
//!   broadcast_frequency) triple, plus a single-shared-key baseline per
//!   frequency, simulated concurrently on a bounded worker pool.
//!
//! Everything randomized (anchor choice, clique truncation, broadcast
//! phases, initial key cursors) derives from one master seed, so a sweep
//! replays byte-identically.
//!
//! ## Quick Start
//!
//! ```rust
//! use groupcast::config::Config;
//! use groupcast::runner::SweepRunner;
//! use groupcast::store::MemoryStore;
//! use groupcast::trace::parse_linkdump;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let graph = parse_linkdump("0 1 10*400 500*900\n1 2 20*800\n".as_bytes())?;
//! let config = Config {
//!     group_limits: vec![1, 2],
//!     group_sizes: vec![2, 3],
//!     broadcast_freqs: vec![60],
//!     node_count: graph.node_count() as u32,
//!     total_time: 1000,
//!     ..Config::default()
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! let report = SweepRunner::new(config, graph, store).run().await?;
//! assert_eq!(report.failed(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`graph`]: contact graph, reachability queries, clique enumeration
//! - [`trace`]: mobility linkdump ingestion
//! - [`group`]: group formation engine and membership index
//! - [`schedule`]: per-frequency broadcast schedules
//! - [`sim`]: delivery simulator and rotation-cursor state
//! - [`store`]: append-only per-experiment delivery logs
//! - [`stats`]: post-hoc per-sender and hourly aggregates
//! - [`config`]: sweep configuration (TOML + env)
//! - [`runner`]: experiment worker pool

pub mod config;
pub mod error;
pub mod graph;
pub mod group;
pub mod runner;
pub mod schedule;
pub mod sim;
pub mod stats;
pub mod store;
pub mod trace;

pub use config::Config;
pub use error::{Result, SimError};
pub use graph::{ContactGraph, Interval, NodeId};
pub use group::{baseline_groups, form_groups, Group, GroupId, GroupSet};
pub use runner::{SweepReport, SweepRunner};
pub use schedule::{Broadcast, BroadcastId, BroadcastSchedule};
pub use sim::{simulate, Delivery, Experiment, ExperimentId, RotationState};
pub use stats::ExperimentStats;
pub use store::{DeliveryStore, JsonlStore, MemoryStore};
pub use trace::{load_linkdump, parse_linkdump};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
