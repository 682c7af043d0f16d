// Shared models for the Reforger monitor
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod event;

pub use event::*;

// ============================================================================
// Players
// ============================================================================

/// One connected player, merged from RCON roster snapshots and log events.
///
/// Unique by `name` within a session. `id` and `uid` are filled in
/// opportunistically and never change once set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub name: String,
    /// Session slot as reported by BattlEye
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default, rename = "beGUID")]
    pub be_guid: Option<String>,
    #[serde(default, rename = "steamID")]
    pub steam_id: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    /// Stable per-session player id
    #[serde(default)]
    pub id: Option<u32>,
    /// Persistent identity id
    #[serde(default)]
    pub uid: Option<String>,
}

// ============================================================================
// Chat & GM enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatChannel {
    Global,
    Faction,
    Group,
    Vehicle,
    Local,
    Unknown,
}

impl ChatChannel {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => ChatChannel::Global,
            1 => ChatChannel::Faction,
            2 => ChatChannel::Group,
            3 => ChatChannel::Vehicle,
            4 => ChatChannel::Local,
            _ => ChatChannel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatChannel::Global => "Global",
            ChatChannel::Faction => "Faction",
            ChatChannel::Group => "Group",
            ChatChannel::Vehicle => "Vehicle",
            ChatChannel::Local => "Local",
            ChatChannel::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GmStatus {
    Enter,
    Exit,
    Unknown,
}

impl GmStatus {
    /// Map the raw `ENTERED` / `EXITED` keyword from the log line.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "ENTERED" => GmStatus::Enter,
            "EXITED" => GmStatus::Exit,
            _ => GmStatus::Unknown,
        }
    }
}

// ============================================================================
// RCON connection state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal for the manager instance
    Closing,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_channel_lookup() {
        assert_eq!(ChatChannel::from_code(0), ChatChannel::Global);
        assert_eq!(ChatChannel::from_code(1), ChatChannel::Faction);
        assert_eq!(ChatChannel::from_code(2), ChatChannel::Group);
        assert_eq!(ChatChannel::from_code(3), ChatChannel::Vehicle);
        assert_eq!(ChatChannel::from_code(4), ChatChannel::Local);
        assert_eq!(ChatChannel::from_code(9), ChatChannel::Unknown);
    }

    #[test]
    fn test_gm_status_mapping() {
        assert_eq!(GmStatus::from_raw("ENTERED"), GmStatus::Enter);
        assert_eq!(GmStatus::from_raw("EXITED"), GmStatus::Exit);
        assert_eq!(GmStatus::from_raw("PAUSED"), GmStatus::Unknown);
    }

    #[test]
    fn test_player_record_json_field_names() {
        let record = PlayerRecord {
            name: "Bob".to_string(),
            be_guid: Some("abc".to_string()),
            steam_id: Some("765".to_string()),
            ..PlayerRecord::default()
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "Bob");
        assert_eq!(json["beGUID"], "abc");
        assert_eq!(json["steamID"], "765");
    }
}
