use ayab_proto::{CursorState, MachineReadiness, MachineStatus, QueueState};
use serde::Serialize;

/// A cursor position the user picked but has not committed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingCursorEdit {
    pub position: u64,
}

/// Everything the synchronizer knows about the daemon, plus the local edit.
///
/// Each fetched resource is a full snapshot: applying one replaces the
/// previous value, so a late reply can never leave a half-merged view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientViewModel {
    pub queue: Option<QueueState>,
    pub cursor: Option<CursorState>,
    pub machine: Option<MachineStatus>,
    /// False until a status fetch succeeds, and again after any failed one.
    pub machine_fresh: bool,
    pub pending_edit: Option<PendingCursorEdit>,
}

impl ClientViewModel {
    pub fn apply_queue(&mut self, state: QueueState) {
        self.cursor = Some(state.cursor);
        self.queue = Some(state);
    }

    pub fn apply_cursor(&mut self, cursor: CursorState) {
        if let Some(queue) = self.queue.as_mut() {
            queue.cursor = cursor;
        }
        self.cursor = Some(cursor);
    }

    pub fn apply_machine(&mut self, status: MachineStatus) {
        self.machine = Some(status);
        self.machine_fresh = true;
    }

    pub fn mark_machine_stale(&mut self) {
        self.machine_fresh = false;
    }

    #[must_use]
    pub fn readiness(&self) -> MachineReadiness {
        match self.machine {
            Some(status) if self.machine_fresh => status.readiness(),
            _ => MachineReadiness::NotReady,
        }
    }

    /// The pending edit wins over the daemon's cursor while it exists.
    #[must_use]
    pub fn displayed_cursor_position(&self) -> Option<u64> {
        self.pending_edit
            .map(|edit| edit.position)
            .or_else(|| self.cursor.map(|cursor| cursor.position))
    }

    /// Entry the pending edit would move the cursor into, if any.
    #[must_use]
    pub fn pending_edit_entry(&self) -> Option<usize> {
        let edit = self.pending_edit?;
        self.queue.as_ref()?.entry_at_position(edit.position)
    }

    /// The queue's cursor always mirrors the latest cursor poll, so the
    /// current segment follows the daemon, not the pending edit.
    #[must_use]
    pub fn rendered_queue(&self, row_width: u64) -> Option<RenderedQueue> {
        self.queue
            .as_ref()
            .map(|queue| render_queue(queue, row_width))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEntry {
    pub index: usize,
    pub weburl: String,
    /// Horizontal offset of the entry within the row, in pattern columns.
    pub x: u64,
    pub width: u64,
    /// The segment under the cursor is shown as current and cannot be removed.
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedQueue {
    pub entries: Vec<RenderedEntry>,
    pub rest_width: u64,
    pub row_height: u32,
}

impl RenderedQueue {
    #[must_use]
    pub fn removable(&self) -> impl Iterator<Item = &RenderedEntry> {
        self.entries.iter().filter(|entry| !entry.is_current)
    }
}

/// Lays the queue out as one row: each entry as wide as its pattern length,
/// in queue order, followed by a filler taking whatever is left of `row_width`.
/// A past-the-end cursor marks no segment as current.
#[must_use]
pub fn render_queue(state: &QueueState, row_width: u64) -> RenderedQueue {
    let current = state.cursor_entry_index();
    let entries = state
        .queue
        .iter()
        .enumerate()
        .map(|(index, entry)| RenderedEntry {
            index,
            weburl: entry.weburl.clone(),
            x: state.entry_start(index).unwrap_or_default(),
            width: entry.pattern_length,
            is_current: current == Some(index),
        })
        .collect();

    RenderedQueue {
        entries,
        rest_width: row_width.saturating_sub(state.total_pattern_length()),
        row_height: state.pattern_width,
    }
}
