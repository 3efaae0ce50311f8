//! Core logging types: unit entries, status, and the [`Log`] trait.

/// Result of one script unit, kept for the run summary.
#[derive(Debug, Clone)]
pub struct UnitEntry {
    /// `<unit>.<method>` of the block that ran.
    pub name: String,
    /// Final status of the block.
    pub status: UnitStatus,
    /// Optional detail message (skip reason or error description).
    pub message: Option<String>,
}

/// Status of a block after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// The block ran to the end.
    Ok,
    /// The block's file was skipped (missing package, `exit_script`).
    Skipped,
    /// The block ran with every change vetoed.
    DryRun,
    /// The block raised an error.
    Failed,
}

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) writes through `tracing`; tests plug in
/// recording implementations so engine code can log without knowing where
/// output goes.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a change that dry-run mode held back.
    fn dry_run(&self, msg: &str);
    /// Record a block result for the summary.
    fn record_unit(&self, name: &str, status: UnitStatus, message: Option<&str>);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn unit_status_equality() {
        assert_eq!(UnitStatus::Ok, UnitStatus::Ok);
        assert_ne!(UnitStatus::Ok, UnitStatus::Failed);
        assert_ne!(UnitStatus::Skipped, UnitStatus::DryRun);
    }
}
