use crate::download::record::TransferRecord;
use crate::session::TransferId;

/// Fixed-capacity slots for transfer records, one per configured download.
///
/// Slot index and [`TransferId`] are the same number. Invariant:
/// `finished_count() <= active_count() <= capacity()`.
#[derive(Debug)]
pub struct DownloadRegistry {
    capacity: usize,
    slots: Vec<TransferRecord>,
    finished: usize,
    last_created: Option<TransferId>,
    last_completed: Option<TransferId>,
}

impl DownloadRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            finished: 0,
            last_created: None,
            last_completed: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.slots.len()
    }

    pub fn finished_count(&self) -> usize {
        self.finished
    }

    /// Id the next registered record must carry, or `None` when every slot is taken.
    pub fn next_id(&self) -> Option<TransferId> {
        (self.slots.len() < self.capacity).then_some(TransferId(self.slots.len()))
    }

    /// Store `record` in the next free slot. Hands the record back when the registry is full
    /// or the id does not match that slot.
    pub fn register(&mut self, record: TransferRecord) -> Result<TransferId, TransferRecord> {
        match self.next_id() {
            Some(id) if id == record.id() => {
                self.slots.push(record);
                self.last_created = Some(id);
                Ok(id)
            }
            _ => Err(record),
        }
    }

    pub fn get(&self, id: TransferId) -> Option<&TransferRecord> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: TransferId) -> Option<&mut TransferRecord> {
        self.slots.get_mut(id.0)
    }

    pub fn records(&self) -> impl Iterator<Item = &TransferRecord> {
        self.slots.iter()
    }

    pub fn last_created(&self) -> Option<TransferId> {
        self.last_created
    }

    pub fn last_completed(&self) -> Option<&TransferRecord> {
        self.last_completed.and_then(|id| self.get(id))
    }

    /// Count a completed record. Callers invoke this once per record.
    pub fn mark_finished(&mut self, id: TransferId) {
        debug_assert!(self.get(id).is_some_and(TransferRecord::is_complete));
        self.finished = (self.finished + 1).min(self.slots.len());
        self.last_completed = Some(id);
    }

    /// Every configured download has been received.
    pub fn all_finished(&self) -> bool {
        self.capacity > 0 && self.finished == self.capacity
    }

    /// Close every handle that is still open. Errors are logged; teardown keeps going.
    pub async fn teardown(&mut self) {
        for record in &mut self.slots {
            if !record.has_file() {
                continue;
            }
            tracing::debug!(
                transfer = %record.id(),
                path = %record.path().display(),
                received = record.received(),
                expected = record.expected(),
                "closing unfinished transfer"
            );
            if let Err(err) = record.close().await {
                tracing::warn!(error = %err, "failed to close transfer file during teardown");
            }
        }
    }
}
