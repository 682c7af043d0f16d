//! Reforger Core - live monitoring of an Arma Reforger server.
//!
//! This module provides:
//! - Console log following (local tail, FTP and HTTP range polling) with
//!   rotation detection and resumable checkpoints
//! - Ordered line dispatch into a priority-ordered handler chain
//! - Typed domain events fanned out over a single broadcast bus
//! - BattlEye RCON session management with unbounded backoff reconnection
//! - Roster reconciliation across RCON snapshots and log identity lines
//! - Vote-kick correlation against the roster
//! - Operator-defined custom parsers loaded from JSON definitions

pub mod bus;
pub mod correlation;
pub mod custom_parsers;
pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod log_reader;
pub mod models;
pub mod monitor;
pub mod parser;
pub mod rcon;
pub mod roster;
pub mod server_stats;

pub use bus::{BusEvent, EventBus, EventSubscriber};
pub use error::{CheckpointError, ConfigError, RconError, TransportError};
pub use models::{ConnectionState, DomainEvent, EventKind, PlayerRecord};
pub use monitor::{MonitorConfig, ServerMonitor};
pub use roster::Roster;
