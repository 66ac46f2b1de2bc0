//! Progress reporting for long-running imports.
//!
//! Importers push whole-number percentages through a `ProgressSink`. The
//! contract: values never decrease within a run, 10 is sent once the file
//! has parsed, and 100 is sent only after the import has fully succeeded.

/// Receives progress percentages from an import in flight.
pub trait ProgressSink {
    fn send(&mut self, percent: u8);
}

/// Discards all progress updates.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn send(&mut self, _percent: u8) {}
}

/// Forwards updates to a channel; a dropped receiver is not an error.
impl ProgressSink for std::sync::mpsc::Sender<u8> {
    fn send(&mut self, percent: u8) {
        let _ = std::sync::mpsc::Sender::send(self, percent);
    }
}

/// Collects every update in order, for inspection after the run.
#[derive(Default)]
pub struct CollectingSink {
    pub updates: Vec<u8>,
}

impl ProgressSink for CollectingSink {
    fn send(&mut self, percent: u8) {
        self.updates.push(percent);
    }
}
