//! Per-second trade counting

/// Folds event-time seconds into a series of per-second counts
///
/// A second is finalized as soon as a record from any other second arrives,
/// so a late record restarts counting under its own (older) second.
#[derive(Debug, Clone)]
pub struct SecondAggregator {
    history: Vec<u64>,
    current_second: Option<i64>,
    counter: u64,
    history_limit: usize,
}

impl SecondAggregator {
    /// `history_limit` bounds the retained series; at least one entry is kept
    pub fn new(history_limit: usize) -> Self {
        Self {
            history: Vec::new(),
            current_second: None,
            counter: 0,
            history_limit: history_limit.max(1),
        }
    }

    /// Count one record in `sec`; returns the closed second's count if this
    /// record finalized it
    pub fn observe(&mut self, sec: i64) -> Option<u64> {
        let mut finalized = None;

        match self.current_second {
            None => self.current_second = Some(sec),
            Some(current) if current != sec => {
                let count = self.counter;
                self.push_history(count);
                self.current_second = Some(sec);
                self.counter = 0;
                finalized = Some(count);
            }
            Some(_) => {}
        }

        self.counter += 1;
        finalized
    }

    fn push_history(&mut self, count: u64) {
        self.history.push(count);
        if self.history.len() > self.history_limit * 2 {
            let excess = self.history.len() - self.history_limit;
            self.history.drain(..excess);
        }
    }

    /// Finalized counts, oldest first
    pub fn history(&self) -> &[u64] {
        &self.history
    }

    /// Second currently being counted
    pub fn current_second(&self) -> Option<i64> {
        self.current_second
    }

    /// Records counted so far in the open second
    pub fn open_count(&self) -> u64 {
        self.counter
    }
}
