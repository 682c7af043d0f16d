//! Structured events produced by the log handler chain.
//!
//! `DomainEvent` is a closed set of variants, one per recognized log grammar,
//! plus `Custom` for events emitted by operator-supplied parsers. Each payload
//! carries only what its source line yields. `time` is always the server's
//! own log-local timestamp (`HH:MM:SS.mmm`), never wall-clock.

use super::{ChatChannel, GmStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteKickStart {
    pub time: String,
    /// Player who started the vote, resolved later against the roster
    pub player_id: u32,
    pub victim_id: u32,
    pub votes: u32,
    pub votes_required: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteKickVictim {
    pub time: String,
    pub victim_name: String,
    pub victim_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoined {
    pub time: String,
    pub player_number: u32,
    pub player_name: String,
    pub player_ip: String,
    #[serde(rename = "beGUID")]
    pub be_guid: Option<String>,
    #[serde(rename = "steamID")]
    pub steam_id: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    pub time: String,
    pub player_id: Option<u32>,
    pub player_name: Option<String>,
    pub player_uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealth {
    pub time: String,
    pub fps: f64,
    pub memory_kb: u64,
    pub player_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStart {
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEnd {
    pub time: String,
    /// Set only by ServerAdminTools game-end lines
    pub reason: Option<String>,
    pub winner: Option<String>,
}

impl GameEnd {
    pub fn is_admin_tools(&self) -> bool {
        self.reason.is_some() && self.winner.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationHang {
    pub time: String,
    pub duration_secs: u64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseCapture {
    pub time: String,
    pub faction: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerKilled {
    pub time: String,
    pub player_name: String,
    pub instigator_name: String,
    pub friendly_fire: bool,
    #[serde(rename = "isAI")]
    pub is_ai: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAction {
    pub time: String,
    pub action: String,
    pub admin_name: String,
    pub player_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmStatusChange {
    pub time: String,
    pub player_name: String,
    pub player_id: String,
    pub status: GmStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmSessionTime {
    pub time: String,
    pub player_name: String,
    pub player_id: String,
    /// Seconds
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub time: String,
    pub player_bi_id: String,
    pub sender_faction: String,
    pub channel_id: u32,
    pub channel_type: ChatChannel,
    pub sender_id: String,
    pub player_name: String,
    pub message: String,
    pub server_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEvent {
    /// Name of the custom parser that produced the event
    pub parser: String,
    /// Event name declared by the parser definition
    pub event: String,
    pub time: Option<String>,
    pub fields: BTreeMap<String, String>,
}

// ============================================================================
// DomainEvent
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    VoteKickStart(VoteKickStart),
    VoteKickVictim(VoteKickVictim),
    PlayerJoined(PlayerJoined),
    PlayerUpdate(PlayerUpdate),
    ServerHealth(ServerHealth),
    GameStart(GameStart),
    GameEnd(GameEnd),
    ApplicationHang(ApplicationHang),
    BaseCapture(BaseCapture),
    PlayerKilled(PlayerKilled),
    AdminAction(AdminAction),
    GmStatus(GmStatusChange),
    GmTime(GmSessionTime),
    Chat(ChatMessage),
    Custom(CustomEvent),
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::VoteKickStart(_) => EventKind::VoteKickStart,
            DomainEvent::VoteKickVictim(_) => EventKind::VoteKickVictim,
            DomainEvent::PlayerJoined(_) => EventKind::PlayerJoined,
            DomainEvent::PlayerUpdate(_) => EventKind::PlayerUpdate,
            DomainEvent::ServerHealth(_) => EventKind::ServerHealth,
            DomainEvent::GameStart(_) => EventKind::GameStart,
            DomainEvent::GameEnd(_) => EventKind::GameEnd,
            DomainEvent::ApplicationHang(_) => EventKind::ApplicationHang,
            DomainEvent::BaseCapture(_) => EventKind::BaseCapture,
            DomainEvent::PlayerKilled(_) => EventKind::PlayerKilled,
            DomainEvent::AdminAction(_) => EventKind::AdminAction,
            DomainEvent::GmStatus(_) => EventKind::GmStatus,
            DomainEvent::GmTime(_) => EventKind::GmTime,
            DomainEvent::Chat(_) => EventKind::Chat,
            DomainEvent::Custom(_) => EventKind::Custom,
        }
    }

    /// Log-local timestamp of the source line, if the grammar carried one.
    pub fn time(&self) -> Option<&str> {
        let time = match self {
            DomainEvent::VoteKickStart(e) => &e.time,
            DomainEvent::VoteKickVictim(e) => &e.time,
            DomainEvent::PlayerJoined(e) => &e.time,
            DomainEvent::PlayerUpdate(e) => &e.time,
            DomainEvent::ServerHealth(e) => &e.time,
            DomainEvent::GameStart(e) => &e.time,
            DomainEvent::GameEnd(e) => &e.time,
            DomainEvent::ApplicationHang(e) => &e.time,
            DomainEvent::BaseCapture(e) => &e.time,
            DomainEvent::PlayerKilled(e) => &e.time,
            DomainEvent::AdminAction(e) => &e.time,
            DomainEvent::GmStatus(e) => &e.time,
            DomainEvent::GmTime(e) => &e.time,
            DomainEvent::Chat(e) => &e.time,
            DomainEvent::Custom(e) => return e.time.as_deref(),
        };
        Some(time.as_str())
    }
}

// ============================================================================
// Event kinds (bus subscription keys)
// ============================================================================

/// Tag for every message that can travel over the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    VoteKickStart,
    VoteKickVictim,
    PlayerJoined,
    PlayerUpdate,
    ServerHealth,
    GameStart,
    GameEnd,
    ApplicationHang,
    BaseCapture,
    PlayerKilled,
    AdminAction,
    GmStatus,
    GmTime,
    Chat,
    Custom,
    // Derived by the fan-out / RCON manager
    VoteKickAttributed,
    FriendlyFire,
    RosterUpdated,
    ConnectionState,
    RconMessage,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::VoteKickStart => "voteKickStart",
            EventKind::VoteKickVictim => "voteKickVictim",
            EventKind::PlayerJoined => "playerJoined",
            EventKind::PlayerUpdate => "playerUpdate",
            EventKind::ServerHealth => "serverHealth",
            EventKind::GameStart => "gameStart",
            EventKind::GameEnd => "gameEnd",
            EventKind::ApplicationHang => "applicationHang",
            EventKind::BaseCapture => "baseCapture",
            EventKind::PlayerKilled => "playerKilled",
            EventKind::AdminAction => "adminAction",
            EventKind::GmStatus => "gmStatus",
            EventKind::GmTime => "gmTime",
            EventKind::Chat => "chatMessage",
            EventKind::Custom => "custom",
            EventKind::VoteKickAttributed => "voteKickAttributed",
            EventKind::FriendlyFire => "friendlyFire",
            EventKind::RosterUpdated => "rosterUpdated",
            EventKind::ConnectionState => "connectionState",
            EventKind::RconMessage => "rconMessage",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = DomainEvent::GmTime(GmSessionTime {
            time: "12:00:00.000".to_string(),
            player_name: "Bob".to_string(),
            player_id: "7".to_string(),
            duration: 12.5,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "gmTime");
        assert_eq!(json["playerName"], "Bob");
        assert_eq!(json["playerId"], "7");
        assert_eq!(json["duration"], 12.5);
    }

    #[test]
    fn test_kind_and_time_accessors() {
        let event = DomainEvent::GameStart(GameStart {
            time: "10:00:00.000".to_string(),
        });
        assert_eq!(event.kind(), EventKind::GameStart);
        assert_eq!(event.time(), Some("10:00:00.000"));

        let custom = DomainEvent::Custom(CustomEvent {
            parser: "medic".to_string(),
            event: "heal".to_string(),
            time: None,
            fields: BTreeMap::new(),
        });
        assert_eq!(custom.kind(), EventKind::Custom);
        assert_eq!(custom.time(), None);
    }

    #[test]
    fn test_sat_game_end_flag() {
        let vanilla = GameEnd {
            time: "t".to_string(),
            reason: None,
            winner: None,
        };
        let sat = GameEnd {
            time: "t".to_string(),
            reason: Some("SCORELIMIT".to_string()),
            winner: Some("US".to_string()),
        };
        assert!(!vanilla.is_admin_tools());
        assert!(sat.is_admin_tools());
    }
}
