//! BattlEye RCON client
//!
//! This module provides:
//! - `RconManager`: connection state machine, backoff, periodic roster query
//! - `BattlEyeSession`: one logged-in UDP session
//! - `protocol`: packet encoding, multipart replies, roster reply parsing
//! - `RconConfig` / `ReconnectConfig`: settings loaded from the environment

pub mod config;
pub mod manager;
pub mod protocol;
pub mod session;

pub use crate::models::ConnectionState;
pub use config::{RconConfig, ReconnectConfig};
pub use manager::{BattlEyeConnector, Connector, RconManager, ReconnectStats};
pub use session::{BattlEyeSession, Session, SessionEvent, SessionTimeouts};
