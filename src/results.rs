use crate::{ErrorType, GvoxError};
use std::collections::VecDeque;

/// Per-context stack of outstanding errors. The most recent error is on top;
/// when full, the oldest record is discarded to make room.
#[derive(Debug)]
pub(crate) struct ResultStack {
    records: VecDeque<GvoxError>,
    capacity: usize,
}

impl ResultStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, error: GvoxError) {
        if self.records.len() == self.capacity {
            if let Some(dropped) = self.records.pop_front() {
                log::warn!("result stack full, discarding oldest error: {dropped}");
            }
        }
        self.records.push_back(error);
    }

    pub fn top(&self) -> Option<&GvoxError> {
        self.records.back()
    }

    pub fn top_type(&self) -> Option<ErrorType> {
        self.top().map(GvoxError::error_type)
    }

    pub fn pop(&mut self) -> Option<GvoxError> {
        self.records.pop_back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
