/// Counters for a single pack run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressState {
    /// Files found by the traversal pass
    pub total: usize,
    /// Files added to the container so far
    pub processed: usize,
}

impl ProgressState {
    pub fn new(total: usize) -> Self {
        Self { total, processed: 0 }
    }

    /// `round(processed / total * 100)`, or 100 when there is nothing to do.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = (self.processed as f64 / self.total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    pub(crate) fn advance(&mut self) {
        self.processed += 1;
    }
}

/// Observations emitted while packing.
#[derive(Debug, Clone, Copy)]
pub enum PackEvent<'a> {
    /// Traversal finished, `total` files will be added
    Started { total: usize },
    /// One file was written to the container
    EntryAdded {
        progress: ProgressState,
        name: &'a str,
    },
    /// All entries are written, the central directory is being flushed
    Finalizing,
}
