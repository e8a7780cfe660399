use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionIssued,
    SessionRevoked,
    SessionExpired,
    DeliveryIssued,
    DeliveryExpired,
    Swept,
}

/// One token lifecycle event. Credentials are never recorded in full.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub detail: String,
}

/// Bounded in-memory log of recent lifecycle events
#[derive(Clone, Debug)]
pub struct EventLog {
    inner: Arc<Mutex<VecDeque<Event>>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn record(&self, kind: EventKind, detail: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }

        let mut events = self.inner.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(Event {
            at: Utc::now(),
            kind,
            detail: detail.into(),
        });
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<Event> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First characters of a credential, safe to log
pub fn redact(credential: &str) -> String {
    let visible: String = credential.chars().take(8).collect();
    format!("{visible}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded() {
        let log = EventLog::new(3);
        for i in 0..5 {
            log.record(EventKind::SessionIssued, format!("user{i}"));
        }

        let events = log.snapshot();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].detail, "user2");
        assert_eq!(events[2].detail, "user4");
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let log = EventLog::new(0);
        log.record(EventKind::Swept, "removed=1");
        assert!(log.is_empty());
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("0123456789abcdef"), "01234567…");
        assert_eq!(redact("abc"), "abc…");
    }
}
