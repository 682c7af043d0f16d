//! Log line classification
//!
//! A `HandlerChain` is an ordered list of `LineHandler`s. For each line the
//! handlers are tried in order and the first whose `test` passes runs
//! `process`; a line yields at most one event. Lines that no handler accepts,
//! or that pass a `test` but fail field extraction, are counted as
//! non-matching in `ParseStats` and dropped.
//!
//! Built-in handlers live in `handlers`; operator-supplied regex handlers for
//! custom parsers live in `custom`.

use crate::models::DomainEvent;
use std::sync::Arc;
use tracing::{debug, info};

pub mod custom;
pub mod handlers;
pub mod stats;

pub use custom::{CustomParserDefinition, EventPattern, PatternHandler};
pub use stats::{ParseStats, ParseStatsSnapshot};

/// One log grammar.
///
/// `test` must be a cheap check. `process` returns `None` when the line looks
/// like the grammar but a field cannot be extracted or coerced.
pub trait LineHandler: Send + Sync {
    /// Handler name for logging and debugging
    fn name(&self) -> &str;

    fn test(&self, line: &str) -> bool;

    fn process(&self, line: &str) -> Option<DomainEvent>;
}

/// Ordered handler list. Order is the only tie-break between grammars.
pub struct HandlerChain {
    handlers: Vec<Box<dyn LineHandler>>,
    stats: Arc<ParseStats>,
}

impl HandlerChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            stats: Arc::new(ParseStats::default()),
        }
    }

    /// Create a chain with every built-in log handler, in priority order
    pub fn with_defaults() -> Self {
        let mut chain = Self::new();
        for handler in handlers::default_handlers() {
            chain.handlers.push(handler);
        }

        info!(
            "HandlerChain initialized with {} handlers",
            chain.handlers.len()
        );

        chain
    }

    /// Append a handler at the lowest priority
    pub fn register(&mut self, handler: Box<dyn LineHandler>) {
        debug!("Registering handler: {}", handler.name());
        self.handlers.push(handler);
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn stats(&self) -> &Arc<ParseStats> {
        &self.stats
    }

    /// Classify one line. First handler whose `test` passes decides.
    pub fn classify(&self, line: &str) -> Option<DomainEvent> {
        self.stats.record_line();

        for handler in &self.handlers {
            if !handler.test(line) {
                continue;
            }

            return match handler.process(line) {
                Some(event) => {
                    self.stats.record_match();
                    Some(event)
                }
                None => {
                    debug!(
                        handler = handler.name(),
                        line = %line_prefix(line),
                        "Line passed test but failed extraction"
                    );
                    self.stats.record_unmatched();
                    None
                }
            };
        }

        self.stats.record_unmatched();
        None
    }
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// First 120 characters of a line, for log context.
pub fn line_prefix(line: &str) -> &str {
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, GameStart};

    struct Always(&'static str);

    impl LineHandler for Always {
        fn name(&self) -> &str {
            self.0
        }

        fn test(&self, _line: &str) -> bool {
            true
        }

        fn process(&self, line: &str) -> Option<DomainEvent> {
            Some(DomainEvent::GameStart(GameStart {
                time: format!("{}:{}", self.0, line),
            }))
        }
    }

    struct Broken;

    impl LineHandler for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn test(&self, line: &str) -> bool {
            line.starts_with("broken")
        }

        fn process(&self, _line: &str) -> Option<DomainEvent> {
            None
        }
    }

    #[test]
    fn test_first_match_wins() {
        let mut chain = HandlerChain::new();
        chain.register(Box::new(Always("first")));
        chain.register(Box::new(Always("second")));

        let event = chain.classify("x").unwrap();
        match event {
            DomainEvent::GameStart(e) => assert_eq!(e.time, "first:x"),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(chain.handler_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_unmatched_line_counts_once() {
        let chain = HandlerChain::with_defaults();
        let before = chain.stats().snapshot();

        assert!(chain.classify("totally unrelated engine chatter").is_none());

        let after = chain.stats().snapshot();
        assert_eq!(after.unmatched_total, before.unmatched_total + 1);
        assert_eq!(after.matched_total, before.matched_total);
    }

    #[test]
    fn test_failed_extraction_counts_as_unmatched() {
        let mut chain = HandlerChain::new();
        chain.register(Box::new(Broken));
        chain.register(Box::new(Always("fallback")));

        // Broken claims the line, so the fallback never sees it
        assert!(chain.classify("broken line").is_none());
        assert_eq!(chain.stats().snapshot().unmatched_total, 1);

        let event = chain.classify("other").unwrap();
        assert_eq!(event.kind(), EventKind::GameStart);
    }

    #[test]
    fn test_line_prefix_truncates() {
        let long = "a".repeat(300);
        assert_eq!(line_prefix(&long).len(), 120);
        assert_eq!(line_prefix("short"), "short");
    }
}
