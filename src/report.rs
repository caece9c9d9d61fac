use log::{info, warn};

use crate::error::{ErrorKind, PollError};

/// Per-run tally. Non-fatal errors accumulate here instead of stopping the batch.
#[derive(Debug, Default)]
pub struct RunReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub resolved: usize,
    pub exhausted: usize,
    pub errors: Vec<PollError>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&mut self, error: PollError) {
        warn!("{}", error);
        self.errors.push(error);
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind() == kind).count()
    }

    pub fn skipped(&self) -> usize {
        self.count(ErrorKind::InvalidRecord)
    }

    pub fn duplicates(&self) -> usize {
        self.count(ErrorKind::DuplicateRecord)
    }

    pub fn log_summary(&self) {
        info!(
            "Run complete: {} inserted, {} updated, {} unchanged, {} duplicate, {} skipped, {} resolved, {} exhausted",
            self.inserted,
            self.updated,
            self.unchanged,
            self.duplicates(),
            self.skipped(),
            self.resolved,
            self.exhausted
        );
        for error in &self.errors {
            info!("  - {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PollKey;

    #[test]
    fn counts_errors_by_kind() {
        let mut report = RunReport::new();
        report.record_error(PollError::DuplicateRecord(PollKey::new("Marist", "2025-05-01", "")));
        report.record_error(PollError::extraction("not JSON"));
        report.record_error(PollError::DuplicateRecord(PollKey::new("Siena", "2025-05-02", "")));
        assert_eq!(report.duplicates(), 2);
        assert_eq!(report.count(ErrorKind::ExtractionFailure), 1);
        assert_eq!(report.skipped(), 0);
    }
}
