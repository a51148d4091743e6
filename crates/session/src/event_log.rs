use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local, SubsecRound};
use uuid::Uuid;

pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 50;

/// Display tone of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    Neutral,
    Info,
    Success,
    Warning,
    Error,
}

/// Category marker of a log entry, rendered as an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventKind {
    #[default]
    General,
    Loaded,
    Opened,
    Closed,
    Error,
    Notification,
}

impl EventKind {
    pub fn icon(self) -> &'static str {
        match self {
            Self::General => "•",
            Self::Loaded => "📥",
            Self::Opened => "📱",
            Self::Closed => "🔒",
            Self::Error => "⚠️",
            Self::Notification => "🔔",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLogEntry {
    id: Uuid,
    message: String,
    severity: Severity,
    kind: EventKind,
    timestamp: DateTime<Local>,
}

impl EventLogEntry {
    pub fn new(message: impl Into<String>, severity: Severity, kind: EventKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            message: message.into(),
            severity,
            kind,
            timestamp: Local::now().trunc_subsecs(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn icon(&self) -> &'static str {
        self.kind.icon()
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn timestamp_label(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

impl fmt::Display for EventLogEntry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {} {}",
            self.timestamp_label(),
            self.icon(),
            self.message
        )
    }
}

/// Bounded, newest-first history of lifecycle events.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<EventLogEntry>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_LOG_CAPACITY)
    }

    /// Any capacity is accepted; storage grows with the entries actually kept.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_LOG_CAPACITY)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(&mut self, message: impl Into<String>, severity: Severity, kind: EventKind) {
        self.push(EventLogEntry::new(message, severity, kind));
    }

    pub fn push(&mut self, entry: EventLogEntry) {
        self.entries.push_front(entry);
        // Oldest entries live at the back.
        self.entries.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn latest(&self) -> Option<&EventLogEntry> {
        self.entries.front()
    }

    /// Newest-first view; call again to restart from the newest entry.
    pub fn iter(&self) -> impl Iterator<Item = &EventLogEntry> + '_ {
        self.entries.iter()
    }

    /// Owned copy that stays valid while the log keeps changing.
    pub fn snapshot(&self) -> Vec<EventLogEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_most_recent_entries_newest_first() {
        let mut log = EventLog::new();
        for index in 0..120 {
            log.append(format!("event-{index}"), Severity::Neutral, EventKind::General);
            assert!(log.len() <= DEFAULT_EVENT_LOG_CAPACITY);
        }

        let messages = log
            .iter()
            .map(|entry| entry.message().to_string())
            .collect::<Vec<_>>();
        let expected = (70..120)
            .rev()
            .map(|index| format!("event-{index}"))
            .collect::<Vec<_>>();
        assert_eq!(messages, expected);
    }

    #[test]
    fn iteration_restarts_from_newest() {
        let mut log = EventLog::with_capacity(3);
        log.append("first", Severity::Info, EventKind::General);
        log.append("second", Severity::Success, EventKind::Loaded);

        let first_pass = log.iter().map(EventLogEntry::message).collect::<Vec<_>>();
        let second_pass = log.iter().map(EventLogEntry::message).collect::<Vec<_>>();
        assert_eq!(first_pass, vec!["second", "first"]);
        assert_eq!(first_pass, second_pass);
        assert_eq!(log.latest().map(EventLogEntry::kind), Some(EventKind::Loaded));
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let mut log = EventLog::with_capacity(2);
        log.append("kept", Severity::Warning, EventKind::Closed);
        let snapshot = log.snapshot();

        log.clear();
        assert!(log.is_empty());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].icon(), "🔒");
    }

    #[test]
    fn zero_capacity_still_keeps_latest_entry() {
        let mut log = EventLog::with_capacity(0);
        log.append("a", Severity::Neutral, EventKind::General);
        log.append("b", Severity::Neutral, EventKind::General);
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.latest().map(EventLogEntry::message), Some("b"));
    }

    #[test]
    fn huge_capacity_does_not_preallocate() {
        let mut log = EventLog::with_capacity(usize::MAX);
        assert_eq!(log.capacity(), usize::MAX);

        log.append("only", Severity::Info, EventKind::General);
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest().map(EventLogEntry::message), Some("only"));
        assert!(log.entries.capacity() < 1 << 20);
    }

    #[test]
    fn timestamp_label_has_second_precision() {
        let entry = EventLogEntry::new("tick", Severity::Neutral, EventKind::General);
        assert_eq!(entry.timestamp_label().len(), "HH:MM:SS".len());
        assert_eq!(entry.timestamp().timestamp_subsec_nanos(), 0);
    }
}
