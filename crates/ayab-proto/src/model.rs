use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_COLORS: u8 = 2;
pub const MIN_COLORS: u8 = 2;
pub const MAX_COLORS: u8 = 4;

/// One queued image segment. Queue order is knitting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub weburl: String,
    pub pattern_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// Carriage position: entry index plus offset inside that entry, and the
/// absolute position within the concatenated pattern.
///
/// `entry == queue.len()` (or beyond) is the past-the-end sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub entry: usize,
    #[serde(default)]
    pub offset: u64,
    pub position: u64,
    #[serde(default)]
    pub end_of_pattern: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
    pub pattern_width: u32,
    #[serde(default = "default_colors")]
    pub colors: u8,
    #[serde(default)]
    pub ribber: bool,
    #[serde(default)]
    pub cursor: CursorState,
}

fn default_colors() -> u8 {
    DEFAULT_COLORS
}

impl QueueState {
    #[must_use]
    pub fn total_pattern_length(&self) -> u64 {
        self.queue.iter().map(|entry| entry.pattern_length).sum()
    }

    #[must_use]
    pub fn cursor_past_end(&self) -> bool {
        self.cursor.entry >= self.queue.len()
    }

    /// Index of the entry under the cursor, `None` when past the end.
    #[must_use]
    pub fn cursor_entry_index(&self) -> Option<usize> {
        (!self.cursor_past_end()).then_some(self.cursor.entry)
    }

    /// Absolute start position of entry `index` within the concatenated pattern.
    #[must_use]
    pub fn entry_start(&self, index: usize) -> Option<u64> {
        if index > self.queue.len() {
            return None;
        }
        Some(
            self.queue
                .iter()
                .take(index)
                .map(|entry| entry.pattern_length)
                .sum(),
        )
    }

    /// Entry containing absolute `position`, `None` past the end of the queue.
    #[must_use]
    pub fn entry_at_position(&self, position: u64) -> Option<usize> {
        let mut start = 0_u64;
        for (index, entry) in self.queue.iter().enumerate() {
            let end = start.saturating_add(entry.pattern_length);
            if position < end {
                return Some(index);
            }
            start = end;
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStatus {
    pub status: i64,
}

impl MachineStatus {
    #[must_use]
    pub const fn readiness(self) -> MachineReadiness {
        MachineReadiness::from_status(self.status)
    }
}

/// Display bands over the daemon's machine status.
///
/// The ordering is part of the contract: below 2 is an error or not-ready
/// machine, `[2, 3)` waits for a restart, 3 and above is knitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineReadiness {
    NotReady,
    ReadyToRestart,
    Knitting,
}

impl MachineReadiness {
    pub const RESTART_THRESHOLD: i64 = 2;
    pub const KNITTING_THRESHOLD: i64 = 3;

    #[must_use]
    pub const fn from_status(status: i64) -> Self {
        if status < Self::RESTART_THRESHOLD {
            Self::NotReady
        } else if status < Self::KNITTING_THRESHOLD {
            Self::ReadyToRestart
        } else {
            Self::Knitting
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::ReadyToRestart => "ready_to_restart",
            Self::Knitting => "knitting",
        }
    }
}

/// The daemon answers `{"result": ...}` on success and `{"error": ...}` on
/// failure. The bridge synthesizes the same error shape for transport faults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DaemonReply<T> {
    pub result: Option<T>,
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    #[error("daemon error: {0}")]
    Daemon(String),
    #[error("daemon reply has no result")]
    MissingResult,
}

impl<T> DaemonReply<T> {
    pub fn into_result(self) -> Result<T, ReplyError> {
        if let Some(error) = self.error {
            return Err(ReplyError::Daemon(error_message(&error)));
        }
        self.result.ok_or(ReplyError::MissingResult)
    }
}

impl DaemonReply<Value> {
    /// Acknowledgement check for actions: only an explicit error fails.
    pub fn into_ack(self) -> Result<Value, ReplyError> {
        if let Some(error) = self.error {
            return Err(ReplyError::Daemon(error_message(&error)));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), ToString::to_string),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn three_entry_state(cursor_entry: usize) -> QueueState {
        serde_json::from_value(json!({
            "queue": [
                {"weburl": "/imgs/a.png", "patternLength": 10, "filePath": "/srv/imgs/a.png"},
                {"weburl": "/imgs/b.png", "patternLength": 20},
                {"weburl": "/imgs/c.png", "patternLength": 30}
            ],
            "patternWidth": 40,
            "cursor": {"entry": cursor_entry, "offset": 0, "position": 0, "endOfPattern": false}
        }))
        .expect("queue state")
    }

    #[test]
    fn queue_state_defaults_colors_and_ribber() {
        let state = three_entry_state(0);
        assert_eq!(state.colors, DEFAULT_COLORS);
        assert!(!state.ribber);
        assert_eq!(state.total_pattern_length(), 60);
        assert_eq!(state.queue[0].file_path.as_deref(), Some("/srv/imgs/a.png"));
    }

    #[test]
    fn entry_positions_follow_queue_order() {
        let state = three_entry_state(0);
        assert_eq!(state.entry_start(0), Some(0));
        assert_eq!(state.entry_start(2), Some(30));
        assert_eq!(state.entry_start(3), Some(60));
        assert_eq!(state.entry_start(4), None);
        assert_eq!(state.entry_at_position(9), Some(0));
        assert_eq!(state.entry_at_position(10), Some(1));
        assert_eq!(state.entry_at_position(59), Some(2));
        assert_eq!(state.entry_at_position(60), None);
    }

    #[test]
    fn cursor_past_end_is_a_sentinel() {
        assert_eq!(three_entry_state(1).cursor_entry_index(), Some(1));
        let past_end = three_entry_state(3);
        assert!(past_end.cursor_past_end());
        assert_eq!(past_end.cursor_entry_index(), None);
    }

    #[test]
    fn readiness_bands_and_boundaries() {
        assert_eq!(MachineReadiness::from_status(0), MachineReadiness::NotReady);
        assert_eq!(MachineReadiness::from_status(1), MachineReadiness::NotReady);
        assert_eq!(
            MachineReadiness::from_status(2),
            MachineReadiness::ReadyToRestart
        );
        assert_eq!(MachineReadiness::from_status(3), MachineReadiness::Knitting);
        assert_eq!(MachineReadiness::from_status(7), MachineReadiness::Knitting);
        assert_eq!(MachineReadiness::from_status(-1), MachineReadiness::NotReady);
    }

    #[test]
    fn reply_error_takes_precedence_over_result() {
        let reply: DaemonReply<MachineStatus> =
            serde_json::from_value(json!({"error": "cannot open connection to localhost:9999"}))
                .expect("reply");
        assert_eq!(
            reply.into_result(),
            Err(ReplyError::Daemon(
                "cannot open connection to localhost:9999".to_string()
            ))
        );

        let ok: DaemonReply<MachineStatus> =
            serde_json::from_value(json!({"result": {"status": 3}})).expect("reply");
        assert_eq!(ok.into_result(), Ok(MachineStatus { status: 3 }));
    }

    #[test]
    fn ack_tolerates_missing_result() {
        let reply: DaemonReply<Value> = serde_json::from_value(json!({})).expect("reply");
        assert_eq!(reply.into_ack(), Ok(Value::Null));

        let missing: DaemonReply<CursorState> =
            serde_json::from_value(json!({})).expect("reply");
        assert_eq!(missing.into_result(), Err(ReplyError::MissingResult));
    }
}
