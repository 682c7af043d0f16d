//! Operator-defined handlers for third-party mod logging.
//!
//! A custom parser is described by a JSON definition:
//!
//! ```json
//! {
//!   "name": "medics",
//!   "enabled": true,
//!   "logDir": "/srv/reforger/profile/logs",
//!   "fileName": "medics.log",
//!   "events": [
//!     { "event": "heal", "pattern": "^(?P<time>\\d{2}:\\d{2}:\\d{2}\\.\\d{3}) .*healed (?P<target>.+)$" }
//!   ]
//! }
//! ```
//!
//! Named capture groups become event fields; a group named `time` fills the
//! event timestamp.

use super::{HandlerChain, LineHandler};
use crate::error::ConfigError;
use crate::models::{CustomEvent, DomainEvent};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomParserDefinition {
    pub name: String,
    #[serde(default = "default_enabled", deserialize_with = "flexible_bool")]
    pub enabled: bool,
    pub log_dir: Option<PathBuf>,
    pub file_name: Option<String>,
    #[serde(default)]
    pub scan_interval_ms: Option<u64>,
    #[serde(default)]
    pub state_save_interval_ms: Option<u64>,
    #[serde(default)]
    pub events: Vec<EventPattern>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventPattern {
    pub event: String,
    pub pattern: String,
}

fn default_enabled() -> bool {
    true
}

/// Accept `true`/`false` as well as the strings `"true"`/`"false"`.
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Str(s) => Ok(s.trim().eq_ignore_ascii_case("true")),
    }
}

impl CustomParserDefinition {
    /// Event names this parser can emit
    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.event.as_str()).collect()
    }

    /// Compile every event pattern into a handler chain.
    pub fn build_chain(&self) -> Result<HandlerChain, ConfigError> {
        let mut chain = HandlerChain::new();
        for pattern in &self.events {
            chain.register(Box::new(PatternHandler::new(
                &self.name,
                &pattern.event,
                &pattern.pattern,
            )?));
        }
        Ok(chain)
    }
}

/// A single regex grammar that emits `DomainEvent::Custom`.
pub struct PatternHandler {
    parser: String,
    event: String,
    re: Regex,
}

impl PatternHandler {
    pub fn new(parser: &str, event: &str, pattern: &str) -> Result<Self, ConfigError> {
        let re = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
            name: format!("{}.{}", parser, event),
            source,
        })?;

        Ok(Self {
            parser: parser.to_string(),
            event: event.to_string(),
            re,
        })
    }
}

impl LineHandler for PatternHandler {
    fn name(&self) -> &str {
        &self.event
    }

    fn test(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    fn process(&self, line: &str) -> Option<DomainEvent> {
        let caps = self.re.captures(line)?;

        let mut fields = BTreeMap::new();
        let mut time = None;
        for name in self.re.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                if name == "time" {
                    time = Some(m.as_str().to_string());
                } else {
                    fields.insert(name.to_string(), m.as_str().to_string());
                }
            }
        }

        Some(DomainEvent::Custom(CustomEvent {
            parser: self.parser.clone(),
            event: self.event.clone(),
            time,
            fields,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"{
        "name": "medics",
        "enabled": "true",
        "logDir": "/tmp/logs",
        "fileName": "medics.log",
        "events": [
            { "event": "heal", "pattern": "^(?P<time>\\d{2}:\\d{2}:\\d{2}\\.\\d{3}) MEDIC (?P<medic>\\w+) healed (?P<target>\\w+)$" }
        ]
    }"#;

    #[test]
    fn test_definition_parses_string_enabled() {
        let def: CustomParserDefinition = serde_json::from_str(DEFINITION).unwrap();
        assert!(def.enabled);
        assert_eq!(def.event_names(), vec!["heal"]);
        assert_eq!(def.file_name.as_deref(), Some("medics.log"));
    }

    #[test]
    fn test_pattern_handler_extracts_named_groups() {
        let def: CustomParserDefinition = serde_json::from_str(DEFINITION).unwrap();
        let chain = def.build_chain().unwrap();

        let event = chain
            .classify("08:15:00.250 MEDIC Alice healed Bob")
            .unwrap();
        match event {
            DomainEvent::Custom(e) => {
                assert_eq!(e.parser, "medics");
                assert_eq!(e.event, "heal");
                assert_eq!(e.time.as_deref(), Some("08:15:00.250"));
                assert_eq!(e.fields.get("medic").map(String::as_str), Some("Alice"));
                assert_eq!(e.fields.get("target").map(String::as_str), Some("Bob"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        assert!(chain.classify("08:15:01.000 something else").is_none());
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = PatternHandler::new("broken", "oops", "(unclosed").err().unwrap();
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }

    #[test]
    fn test_disabled_flag() {
        let def: CustomParserDefinition =
            serde_json::from_str(r#"{ "name": "x", "enabled": false }"#).unwrap();
        assert!(!def.enabled);
        assert!(def.events.is_empty());
    }
}
