use crate::models::activity_log::{ActivityKind, ActivityLogEntry};
use crate::utils::time::now;

/// Append-only, in-memory record of what happened during one session.
/// Insertion order is preserved; entries are never edited or removed.
#[derive(Debug, Clone)]
pub struct ActivityLogger {
    actor: String,
    source_ip: String,
    entries: Vec<ActivityLogEntry>,
}

impl ActivityLogger {
    pub fn new(actor: impl Into<String>, source_ip: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            source_ip: source_ip.into(),
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, kind: ActivityKind, description: impl Into<String>) -> &ActivityLogEntry {
        self.entries.push(ActivityLogEntry {
            timestamp: now(),
            actor: self.actor.clone(),
            source_ip: self.source_ip.clone(),
            kind,
            description: description.into(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[ActivityLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: ActivityKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Plain-text rendering handed to the proctoring analyzer.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(ActivityLogEntry::to_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_and_renders_lines() {
        let mut logger = ActivityLogger::new("alice", "10.0.0.7");
        logger.append(ActivityKind::SessionStarted, "Session started");
        logger.append(ActivityKind::TabHidden, "Tab hidden");
        logger.append(ActivityKind::AnswerRecorded, "Answered q1");

        let kinds: Vec<_> = logger.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::SessionStarted,
                ActivityKind::TabHidden,
                ActivityKind::AnswerRecorded
            ]
        );
        assert_eq!(logger.count(ActivityKind::TabHidden), 1);

        let text = logger.serialize();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("alice (10.0.0.7): Tab hidden"));
    }
}
