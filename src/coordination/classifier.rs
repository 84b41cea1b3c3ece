use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::message::MessageType;

const ERROR_MARKERS: &[&str] = &[
    "error",
    "failed",
    "failure",
    "exception",
    "traceback",
    "panic",
    "crash",
];
const TOOL_MARKERS: &[&str] = &[
    "tool use",
    "tool_use",
    "using tool",
    "running command",
    "executing",
    "invoking",
    "bash(",
    "read(",
    "edit(",
    "write(",
];
const TASK_MARKERS: &[&str] = &[
    "task assigned",
    "task completed",
    "task failed",
    "new task",
    "assigned to you",
    "task:",
];
const STATUS_MARKERS: &[&str] = &[
    "status",
    "progress",
    "completed",
    "done",
    "finished",
    "working on",
    "started",
    "%",
];
const QUESTION_OPENERS: &[&str] = &[
    "what ", "why ", "how ", "when ", "where ", "which ", "who ", "can ", "could ", "should ",
    "would ", "is ", "are ", "do ", "does ",
];

/// Keyword-based message categorization
///
/// `classify` is pure; counting happens only through `record`.
#[derive(Debug, Default)]
pub struct MessageClassifier {
    stats: Mutex<BTreeMap<MessageType, u64>>,
}

impl MessageClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Categorizes content; identical input always yields the same type
    ///
    /// Rules are checked in order: error report, tool use, task update,
    /// status report, question, generic.
    pub fn classify(&self, content: &str) -> MessageType {
        let text = content.trim().to_lowercase();
        if text.is_empty() {
            return MessageType::Generic;
        }

        if contains_any(&text, ERROR_MARKERS) {
            MessageType::ErrorReport
        } else if contains_any(&text, TOOL_MARKERS) {
            MessageType::ToolUseNotice
        } else if contains_any(&text, TASK_MARKERS) {
            MessageType::TaskUpdate
        } else if contains_any(&text, STATUS_MARKERS) {
            MessageType::StatusReport
        } else if text.ends_with('?') || QUESTION_OPENERS.iter().any(|q| text.starts_with(q)) {
            MessageType::Question
        } else {
            MessageType::Generic
        }
    }

    pub fn record(&self, kind: MessageType) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats.entry(kind).or_insert(0) += 1;
        }
    }

    /// Counts per type observed since this process started
    ///
    /// Every type is present, with zero for unseen ones.
    pub fn get_classification_stats(&self) -> BTreeMap<MessageType, u64> {
        let mut out: BTreeMap<MessageType, u64> =
            MessageType::ALL.into_iter().map(|kind| (kind, 0)).collect();
        if let Ok(stats) = self.stats.lock() {
            for (kind, count) in stats.iter() {
                out.insert(*kind, *count);
            }
        }
        out
    }
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| text.contains(marker))
}
