//! Collaborators that touch the host: files, config-file edits, packages.
pub mod editor;
pub mod error;
pub mod fileops;
pub mod package;

/// Result of one filesystem operation.
///
/// # Examples
///
/// ```
/// use cfenjin::resources::ResourceChange;
///
/// let applied = ResourceChange::Applied;
/// let skipped = ResourceChange::Skipped { reason: "vetoed".into() };
///
/// assert!(applied.changed());
/// assert!(!skipped.changed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    /// Something was created or updated.
    Applied,
    /// The target already matched.
    AlreadyCorrect,
    /// Nothing was done.
    Skipped {
        /// Why nothing was done.
        reason: String,
    },
}

impl ResourceChange {
    /// Whether the operation changed the system.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Collapse a monitored attempt: a vetoed attempt counts as skipped.
    #[must_use]
    pub fn from_attempt(outcome: Option<Self>) -> Self {
        outcome.unwrap_or_else(|| Self::Skipped {
            reason: "pre-empted".to_string(),
        })
    }
}
