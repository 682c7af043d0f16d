//! Built-in Reforger console log handlers.
//!
//! Each handler owns one anchored grammar: log-local timestamp, a log tag
//! (`SCRIPT`, `DEFAULT`, `ENGINE`), then a structured payload. Handler order
//! is defined by `default_handlers()`.

use super::LineHandler;
use crate::models::*;
use regex::{Captures, Regex};

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in handler pattern must compile")
}

fn text(caps: &Captures<'_>, idx: usize) -> Option<String> {
    caps.get(idx).map(|m| m.as_str().to_string())
}

fn non_empty(caps: &Captures<'_>, idx: usize) -> Option<String> {
    caps.get(idx)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, idx: usize) -> Option<T> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Every built-in handler, highest priority first.
pub fn default_handlers() -> Vec<Box<dyn LineHandler>> {
    vec![
        Box::new(VoteKickStartHandler::new()),
        Box::new(VoteKickVictimHandler::new()),
        Box::new(PlayerJoinedHandler::new()),
        Box::new(PlayerUpdateHandler::new()),
        Box::new(ServerHealthHandler::new()),
        Box::new(GameStartHandler::new()),
        Box::new(GameEndHandler::new()),
        Box::new(ApplicationHangHandler::new()),
        Box::new(SatBaseCaptureHandler::new()),
        Box::new(SatPlayerKilledHandler::new()),
        Box::new(SatAdminActionHandler::new()),
        Box::new(SatGameEndHandler::new()),
        Box::new(GmToolsStatusHandler::new()),
        Box::new(GmToolsTimeHandler::new()),
        Box::new(ChatHandler::new()),
    ]
}

// ============================================================================
// Vote kicks
// ============================================================================

/// `Player '5' approved vote | Vote Type: 'KICK' | Vote value: '7' | Count (1/10)`
pub struct VoteKickStartHandler {
    re: Regex,
}

impl VoteKickStartHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s+SCRIPT\s+:\s+Player '(\d+)' approved vote \| Vote Type: 'KICK' \| Vote value: '(\d+)' \| Count \((\d+)/(\d+)\)",
            ),
        }
    }
}

impl LineHandler for VoteKickStartHandler {
    fn name(&self) -> &str {
        "voteKickStart"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::VoteKickStart(VoteKickStart {
            time: text(&caps, 1)?,
            player_id: number(&caps, 2)?,
            victim_id: number(&caps, 3)?,
            votes: number(&caps, 4)?,
            votes_required: number(&caps, 5)?,
        }))
    }
}

pub struct VoteKickVictimHandler {
    re: Regex,
}

impl VoteKickVictimHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s+SCRIPT\s+:\s+Vote kick succeeded against player '(.*?)' \(ID: (\d+)\)",
            ),
        }
    }
}

impl LineHandler for VoteKickVictimHandler {
    fn name(&self) -> &str {
        "voteKickVictim"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::VoteKickVictim(VoteKickVictim {
            time: text(&caps, 1)?,
            victim_name: text(&caps, 2)?,
            victim_id: number(&caps, 3)?,
        }))
    }
}

// ============================================================================
// Player identity
// ============================================================================

/// BattlEye connect line, optionally followed by identity suffixes:
/// `BattlEye Server: 'Player #3 Bob (10.0.0.5:2001) connected' | BE GUID: ab12 | SteamID: 7656 | Device: PC`
pub struct PlayerJoinedHandler {
    re: Regex,
}

impl PlayerJoinedHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s+DEFAULT\s+:\s+BattlEye Server: 'Player #(\d+) (.+?) \(([0-9a-fA-F.:]+):\d+\) connected'(?: \| BE GUID: ([0-9a-fA-F]+))?(?: \| SteamID: (\d+))?(?: \| Device: (\w+))?",
            ),
        }
    }
}

impl LineHandler for PlayerJoinedHandler {
    fn name(&self) -> &str {
        "playerJoined"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::PlayerJoined(PlayerJoined {
            time: text(&caps, 1)?,
            player_number: number(&caps, 2)?,
            player_name: text(&caps, 3)?,
            player_ip: text(&caps, 4)?,
            be_guid: non_empty(&caps, 5),
            steam_id: non_empty(&caps, 6),
            device: non_empty(&caps, 7),
        }))
    }
}

/// `### Updating player: PlayerId=7, Name=Bob, IdentityId=4d5e...`
///
/// Any of the three values may be empty; the roster decides whether that is
/// enough to act on.
pub struct PlayerUpdateHandler {
    re: Regex,
}

impl PlayerUpdateHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s+DEFAULT\s+:\s+### Updating player: PlayerId=(\d*), Name=(.*?), IdentityId=([0-9a-fA-F-]*)\s*$",
            ),
        }
    }
}

impl LineHandler for PlayerUpdateHandler {
    fn name(&self) -> &str {
        "playerUpdate"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::PlayerUpdate(PlayerUpdate {
            time: text(&caps, 1)?,
            player_id: number(&caps, 2),
            player_name: non_empty(&caps, 3),
            player_uid: non_empty(&caps, 4),
        }))
    }
}

// ============================================================================
// Server state
// ============================================================================

/// `FPS: 59.9, frame time (avg: 16.7 ms, ...), Mem: 2345678 kB, ..., Player: 12, ...`
pub struct ServerHealthHandler {
    re: Regex,
}

impl ServerHealthHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s+DEFAULT\s+:\s+FPS: ([\d.]+),.*?Mem: (\d+) kB,.*?Players?: (\d+)",
            ),
        }
    }
}

impl LineHandler for ServerHealthHandler {
    fn name(&self) -> &str {
        "serverHealth"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::ServerHealth(ServerHealth {
            time: text(&caps, 1)?,
            fps: number(&caps, 2)?,
            memory_kb: number(&caps, 3)?,
            player_count: number(&caps, 4)?,
        }))
    }
}

pub struct GameStartHandler {
    re: Regex,
}

impl GameStartHandler {
    pub fn new() -> Self {
        Self {
            re: compile(r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s+\w+\s+:\s+Game successfully created"),
        }
    }
}

impl LineHandler for GameStartHandler {
    fn name(&self) -> &str {
        "gameStart"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::GameStart(GameStart {
            time: text(&caps, 1)?,
        }))
    }
}

pub struct GameEndHandler {
    re: Regex,
}

impl GameEndHandler {
    pub fn new() -> Self {
        Self {
            re: compile(r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s+\w+\s+:\s+SCR_BaseGameMode::OnGameEnd"),
        }
    }
}

impl LineHandler for GameEndHandler {
    fn name(&self) -> &str {
        "gameEnd"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::GameEnd(GameEnd {
            time: text(&caps, 1)?,
            reason: None,
            winner: None,
        }))
    }
}

pub struct ApplicationHangHandler {
    re: Regex,
}

impl ApplicationHangHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s+ENGINE\s+\(F\):\s+Application\s+hangs\s+\(force\s+crash\)\s+(\d+)\s+s",
            ),
        }
    }
}

impl LineHandler for ApplicationHangHandler {
    fn name(&self) -> &str {
        "applicationHang"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::ApplicationHang(ApplicationHang {
            time: text(&caps, 1)?,
            duration_secs: number(&caps, 2)?,
            message: "ENGINE (F): Application hangs (force crash)".to_string(),
        }))
    }
}

// ============================================================================
// ServerAdminTools mod
// ============================================================================

pub struct SatBaseCaptureHandler {
    re: Regex,
}

impl SatBaseCaptureHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"(\d{2}:\d{2}:\d{2}\.\d{3})\s+SCRIPT\s+:\s+ServerAdminTools \| Event serveradmintools_conflict_base_captured \|\s+faction: ([^,]+), base: (.+)",
            ),
        }
    }
}

impl LineHandler for SatBaseCaptureHandler {
    fn name(&self) -> &str {
        "satBaseCapture"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::BaseCapture(BaseCapture {
            time: text(&caps, 1)?,
            faction: non_empty(&caps, 2)?,
            base: non_empty(&caps, 3)?,
        }))
    }
}

pub struct SatPlayerKilledHandler {
    re: Regex,
}

impl SatPlayerKilledHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"(\d{2}:\d{2}:\d{2}\.\d{3})\s+SCRIPT\s+:\s+ServerAdminTools \| Event serveradmintools_player_killed \| player: (.*?), instigator: (.*?), friendly: (true|false)",
            ),
        }
    }
}

impl LineHandler for SatPlayerKilledHandler {
    fn name(&self) -> &str {
        "satPlayerKilled"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        let instigator_name = text(&caps, 3)?.trim().to_string();
        Some(DomainEvent::PlayerKilled(PlayerKilled {
            time: text(&caps, 1)?,
            player_name: text(&caps, 2)?.trim().to_string(),
            is_ai: instigator_name == "AI",
            instigator_name,
            friendly_fire: caps.get(4)?.as_str() == "true",
        }))
    }
}

pub struct SatAdminActionHandler {
    re: Regex,
}

impl SatAdminActionHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"(\d{2}:\d{2}:\d{2}\.\d{3})\s+SCRIPT\s+:\s+ServerAdminTools \| Event serveradmintools_admin_action \| action: ([^,]+), admin: (.*?), player: (.+)",
            ),
        }
    }
}

impl LineHandler for SatAdminActionHandler {
    fn name(&self) -> &str {
        "satAdminAction"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::AdminAction(AdminAction {
            time: text(&caps, 1)?,
            action: non_empty(&caps, 2)?,
            admin_name: text(&caps, 3)?.trim().to_string(),
            player_name: text(&caps, 4)?.trim().to_string(),
        }))
    }
}

pub struct SatGameEndHandler {
    re: Regex,
}

impl SatGameEndHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"(\d{2}:\d{2}:\d{2}\.\d{3})\s+SCRIPT\s+:\s+ServerAdminTools \| Event serveradmintools_game_ended \|\s+reason: ([^,]+), winner: (.+)",
            ),
        }
    }
}

impl LineHandler for SatGameEndHandler {
    fn name(&self) -> &str {
        "satGameEnd"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::GameEnd(GameEnd {
            time: text(&caps, 1)?,
            reason: non_empty(&caps, 2),
            winner: non_empty(&caps, 3),
        }))
    }
}

// ============================================================================
// GM Tools mod
// ============================================================================

pub struct GmToolsStatusHandler {
    re: Regex,
}

impl GmToolsStatusHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"(\d{2}:\d{2}:\d{2}\.\d{3})\s+SCRIPT\s+:\s+\[GM Tools\]\[GMSession\] Player '(.*?)' \(ID: (\d+)\) ([A-Z]+) Game Master",
            ),
        }
    }
}

impl LineHandler for GmToolsStatusHandler {
    fn name(&self) -> &str {
        "gmToolsStatus"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::GmStatus(GmStatusChange {
            time: text(&caps, 1)?,
            player_name: text(&caps, 2)?.trim().to_string(),
            player_id: text(&caps, 3)?,
            status: GmStatus::from_raw(caps.get(4)?.as_str()),
        }))
    }
}

pub struct GmToolsTimeHandler {
    re: Regex,
}

impl GmToolsTimeHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"(\d{2}:\d{2}:\d{2}\.\d{3})\s+SCRIPT\s+:\s+\[GM Tools\]\[GMSession\] GM session duration for '(.*?)' \(ID: (\d+)\): ([\d.]+) seconds",
            ),
        }
    }
}

impl LineHandler for GmToolsTimeHandler {
    fn name(&self) -> &str {
        "gmToolsTime"
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        Some(DomainEvent::GmTime(GmSessionTime {
            time: text(&caps, 1)?,
            player_name: text(&caps, 2)?.trim().to_string(),
            player_id: text(&caps, 3)?,
            duration: number(&caps, 4)?,
        }))
    }
}

// ============================================================================
// Chat (flabby_logger mod)
// ============================================================================

pub struct ChatHandler {
    re: Regex,
}

impl ChatHandler {
    pub fn new() -> Self {
        Self {
            re: compile(
                r"(\d{2}:\d{2}:\d{2}\.\d{3})\s+SCRIPT\s+:\s+<flabby_logger>\s+\[\s+playerBiId=([a-f0-9-]+),\s+function='OnNewMessage',\s+senderFaction='([^']*)',\s+channelId='(\d+)',\s+senderId='(\d+)',\s+playerName='(.*?)',\s+msg='(.*?)',\s+ServerName='([^']+)'",
            ),
        }
    }
}

impl LineHandler for ChatHandler {
    fn name(&self) -> &str {
        "chatMessage"
    }

    fn test(&self, line: &str) -> bool {
        line.contains("function='OnNewMessage'") && self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;
        let channel_id: u32 = number(&caps, 4)?;
        Some(DomainEvent::Chat(ChatMessage {
            time: text(&caps, 1)?,
            player_bi_id: text(&caps, 2)?,
            sender_faction: text(&caps, 3)?,
            channel_id,
            channel_type: ChatChannel::from_code(channel_id),
            sender_id: text(&caps, 5)?,
            player_name: text(&caps, 6)?.trim().to_string(),
            message: text(&caps, 7)?,
            server_name: text(&caps, 8)?,
        }))
    }
}
