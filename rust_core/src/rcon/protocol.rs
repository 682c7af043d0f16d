//! BattlEye RCON wire format
//!
//! Every datagram is `'B' 'E' | crc32 (LE) | 0xFF | type | payload`, the CRC
//! covering everything from the 0xFF byte on. Packet types:
//! - `0x00` login: client sends the password, server answers `0x01` / `0x00`
//! - `0x01` command: one-byte sequence number, then the command text. Long
//!   replies are split as `0x00 total index` + fragment
//! - `0x02` server message: sequence number + text, must be acknowledged

use crate::error::RconError;
use crate::roster::RosterEntry;
use regex::Regex;
use std::sync::OnceLock;

const HEADER_LEN: usize = 8;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// IEEE CRC-32
pub fn crc32(data: &[u8]) -> u32 {
    !data.iter().fold(!0u32, |crc, &byte| {
        CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Login = 0x00,
    Command = 0x01,
    ServerMessage = 0x02,
}

pub fn encode(kind: PacketType, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + payload.len());
    body.push(0xFF);
    body.push(kind as u8);
    body.extend_from_slice(payload);

    let mut packet = Vec::with_capacity(6 + body.len());
    packet.extend_from_slice(b"BE");
    packet.extend_from_slice(&crc32(&body).to_le_bytes());
    packet.extend_from_slice(&body);
    packet
}

pub fn login_packet(password: &str) -> Vec<u8> {
    encode(PacketType::Login, password.as_bytes())
}

/// An empty command doubles as keep-alive.
pub fn command_packet(seq: u8, command: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + command.len());
    payload.push(seq);
    payload.extend_from_slice(command.as_bytes());
    encode(PacketType::Command, &payload)
}

pub fn ack_packet(seq: u8) -> Vec<u8> {
    encode(PacketType::ServerMessage, &[seq])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub total: u8,
    pub index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Login {
        success: bool,
    },
    Command {
        seq: u8,
        fragment: Option<Fragment>,
        body: Vec<u8>,
    },
    ServerMessage {
        seq: u8,
        message: String,
    },
}

pub fn decode(buf: &[u8]) -> Result<Packet, RconError> {
    if buf.len() < HEADER_LEN || &buf[..2] != b"BE" {
        return Err(RconError::Malformed("bad header"));
    }
    if buf[6] != 0xFF {
        return Err(RconError::Malformed("missing 0xFF marker"));
    }

    let expected = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
    if crc32(&buf[6..]) != expected {
        return Err(RconError::Malformed("checksum mismatch"));
    }

    let payload = &buf[HEADER_LEN..];
    match buf[7] {
        0x00 => match payload.first() {
            Some(&result) => Ok(Packet::Login {
                success: result == 0x01,
            }),
            None => Err(RconError::Malformed("empty login reply")),
        },
        0x01 => {
            let (&seq, rest) = payload
                .split_first()
                .ok_or(RconError::Malformed("command reply without sequence"))?;
            match rest {
                [0x00, total, index, fragment @ ..] => Ok(Packet::Command {
                    seq,
                    fragment: Some(Fragment {
                        total: *total,
                        index: *index,
                    }),
                    body: fragment.to_vec(),
                }),
                _ => Ok(Packet::Command {
                    seq,
                    fragment: None,
                    body: rest.to_vec(),
                }),
            }
        }
        0x02 => {
            let (&seq, rest) = payload
                .split_first()
                .ok_or(RconError::Malformed("server message without sequence"))?;
            Ok(Packet::ServerMessage {
                seq,
                message: String::from_utf8_lossy(rest).into_owned(),
            })
        }
        _ => Err(RconError::Malformed("unknown packet type")),
    }
}

/// Reassembles one multipart command reply.
#[derive(Debug)]
pub struct Multipart {
    parts: Vec<Option<Vec<u8>>>,
}

impl Multipart {
    pub fn new(total: u8) -> Self {
        Self {
            parts: vec![None; total as usize],
        }
    }

    /// Store a fragment; returns the full body once every part has arrived.
    pub fn add(&mut self, fragment: Fragment, body: Vec<u8>) -> Option<Vec<u8>> {
        if fragment.total as usize != self.parts.len() {
            return None;
        }
        let slot = self.parts.get_mut(fragment.index as usize)?;
        *slot = Some(body);

        if self.parts.iter().any(Option::is_none) {
            return None;
        }
        Some(self.parts.iter().flatten().flatten().copied().collect())
    }
}

fn player_row() -> &'static Regex {
    static ROW: OnceLock<Regex> = OnceLock::new();
    ROW.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s+(\d+)\s+([0-9a-fA-F-]+)\s+(.+?)\s*$")
            .expect("player row pattern must compile")
    })
}

/// Parse a roster reply. Rows are `number id uid name`; anything else
/// (header, separator, total line) is ignored.
pub fn parse_players(text: &str) -> Vec<RosterEntry> {
    text.lines()
        .filter_map(|line| {
            let caps = player_row().captures(line)?;
            Some(RosterEntry {
                number: caps[1].parse().ok(),
                id: caps[2].parse().ok(),
                uid: Some(caps[3].to_string()),
                name: caps[4].to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_login_packet_layout() {
        let packet = login_packet("pw");
        assert_eq!(&packet[..2], b"BE");
        assert_eq!(&packet[6..], &[0xFF, 0x00, b'p', b'w']);
        assert_eq!(
            u32::from_le_bytes([packet[2], packet[3], packet[4], packet[5]]),
            crc32(&packet[6..])
        );
    }

    #[test]
    fn test_decode_login_reply() {
        assert_eq!(
            decode(&encode(PacketType::Login, &[0x01])).unwrap(),
            Packet::Login { success: true }
        );
        assert_eq!(
            decode(&encode(PacketType::Login, &[0x00])).unwrap(),
            Packet::Login { success: false }
        );
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut packet = command_packet(3, "#players");
        let last = packet.len() - 1;
        packet[last] ^= 0x55;
        assert!(matches!(decode(&packet), Err(RconError::Malformed(_))));
        assert!(decode(b"XX").is_err());
    }

    #[test]
    fn test_server_message() {
        let packet = encode(PacketType::ServerMessage, b"\x07Player #1 connected");
        assert_eq!(
            decode(&packet).unwrap(),
            Packet::ServerMessage {
                seq: 7,
                message: "Player #1 connected".to_string()
            }
        );
    }

    #[test]
    fn test_multipart_reassembly_out_of_order() {
        let second = decode(&encode(PacketType::Command, b"\x04\x00\x02\x01world")).unwrap();
        let first = decode(&encode(PacketType::Command, b"\x04\x00\x02\x00hello ")).unwrap();

        let mut assembly = Multipart::new(2);
        for packet in [second, first] {
            let Packet::Command { seq, fragment: Some(fragment), body } = packet else {
                panic!("expected fragment");
            };
            assert_eq!(seq, 4);
            if let Some(full) = assembly.add(fragment, body) {
                assert_eq!(full, b"hello world");
                return;
            }
        }
        panic!("reply never completed");
    }

    #[test]
    fn test_parse_players() {
        let reply = "Players on server:\n\
                     [#] [ID] [UID] [Name]\n\
                     --------------------------------\n\
                     0   1   5c0a7e12-9f11-4b7e-a8f2-000000000001   Alice\n\
                     3   4   5c0a7e12-9f11-4b7e-a8f2-000000000004   Bob the Builder\n\
                     (2 players in total)";

        let players = parse_players(reply);
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "Alice");
        assert_eq!(players[0].number, Some(0));
        assert_eq!(players[0].id, Some(1));
        assert_eq!(players[1].name, "Bob the Builder");
        assert_eq!(
            players[1].uid.as_deref(),
            Some("5c0a7e12-9f11-4b7e-a8f2-000000000004")
        );
    }
}
