// Queue window presentation
//
// Holds the user's local view of held and deleted entries. Drag-reordering is
// local until the window closes or a conversion is requested, at which point
// the order is pushed back to the queue.

use crate::services::{ConversionError, EntryId, EntryState, QueueEntry};
use crate::state::ConversionService;
use crate::ui::prompt::{ConversionPrompt, apply_outcome};

/// One line of the queue window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRow {
    pub id: EntryId,
    pub display_name: String,
    pub include: bool,
    pub deleted: bool,
}

impl QueueRow {
    fn from_entry(entry: &QueueEntry) -> Self {
        Self {
            id: entry.id,
            display_name: entry.display_name.clone(),
            include: entry.include_in_next_run,
            deleted: entry.state == EntryState::Deleted,
        }
    }
}

/// User gestures in the queue window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueIntent {
    ToggleInclude(EntryId),
    ToggleDelete(EntryId),
    /// Drag the row at `from` so it lands at `to`
    Move { from: usize, to: usize },
    ConvertNow,
    Close,
}

/// The queue window's model
#[derive(Debug, Default)]
pub struct QueueView {
    rows: Vec<QueueRow>,
    open: bool,
}

impl QueueView {
    /// Open the window over the current held and deleted entries.
    pub fn open(service: &ConversionService) -> Self {
        let mut view = Self {
            rows: Vec::new(),
            open: true,
        };
        view.refresh(service);
        view
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn rows(&self) -> &[QueueRow] {
        &self.rows
    }

    /// Re-read the queue, keeping the local order of rows still present and
    /// appending new ones at the end.
    pub fn refresh(&mut self, service: &ConversionService) {
        let fresh: Vec<QueueRow> =
            service.read(|queue, _| queue.held_entries().map(QueueRow::from_entry).collect());

        let mut rows: Vec<QueueRow> = self
            .rows
            .iter()
            .filter_map(|old| fresh.iter().find(|row| row.id == old.id).cloned())
            .collect();
        for row in fresh {
            if !rows.iter().any(|r| r.id == row.id) {
                rows.push(row);
            }
        }
        self.rows = rows;
    }

    fn order(&self) -> Vec<EntryId> {
        self.rows.iter().map(|row| row.id).collect()
    }

    /// Apply one gesture.
    ///
    /// Only `ConvertNow` can fail, when a run is already in progress.
    pub fn handle(
        &mut self,
        service: &ConversionService,
        prompt: &mut dyn ConversionPrompt,
        intent: QueueIntent,
    ) -> Result<(), ConversionError> {
        match intent {
            QueueIntent::ToggleInclude(id) => {
                if let Some(row) = self.rows.iter_mut().find(|row| row.id == id) {
                    let include = !row.include;
                    if service.queue_set_include(id, include) {
                        row.include = include;
                    }
                }
            }
            QueueIntent::ToggleDelete(id) => {
                if let Some(state) = service.queue_toggle_deleted(id) {
                    if let Some(row) = self.rows.iter_mut().find(|row| row.id == id) {
                        row.deleted = state == EntryState::Deleted;
                    }
                }
            }
            QueueIntent::Move { from, to } => {
                if from < self.rows.len() && to < self.rows.len() && from != to {
                    let row = self.rows.remove(from);
                    self.rows.insert(to, row);
                }
            }
            QueueIntent::ConvertNow => {
                if !service.is_idle() {
                    return Err(ConversionError::AlreadyRunning);
                }
                service.queue_reorder(&self.order());
                if service.queue_promote_all_held() {
                    let active: Vec<QueueEntry> = service.read(|queue, _| {
                        queue
                            .entries()
                            .filter(|e| e.state == EntryState::BeingProcessed)
                            .cloned()
                            .collect()
                    });
                    let outcome = prompt.request(&active);
                    let result = apply_outcome(service, outcome);
                    self.refresh(service);
                    return result;
                }
                tracing::debug!("No included entries to convert");
            }
            QueueIntent::Close => {
                service.queue_reorder(&self.order());
                service.queue_reclaim_deleted();
                self.rows.clear();
                self.open = false;
            }
        }
        Ok(())
    }
}
