//! Broadcast fan-out
//!
//! Delivers one line to every registered session except the origin.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::protocol::ServerLine;
use crate::registry::SessionRegistry;
use crate::types::SessionId;

/// Outcome of a single broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Targets whose queue accepted the line
    pub delivered: usize,
    /// Targets whose sink was already closed
    pub failed: usize,
}

/// Fans lines out over a shared registry
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: SessionRegistry,
}

impl Broadcaster {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// The registry this broadcaster delivers over
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Send `line` to every session except `origin`
    ///
    /// A closed target is logged and skipped; delivery to the rest goes on.
    /// That target's own supervisor notices the dead writer and cleans up.
    pub fn broadcast(&self, origin: SessionId, line: &ServerLine) -> BroadcastReport {
        let text: Arc<str> = Arc::from(line.to_string());
        let mut report = BroadcastReport::default();

        self.registry.for_each_except(origin, |target| {
            match target.send_line(Arc::clone(&text)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to deliver to {} ({}): {}",
                        target.id,
                        target.display_name(),
                        e
                    );
                    report.failed += 1;
                }
            }
        });

        debug!(
            "Broadcast from {}: delivered={}, failed={}",
            origin, report.delivered, report.failed
        );
        report
    }
}
