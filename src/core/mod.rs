//! Triage-domain state: the photo catalog and the decision stack.

/// Photo registry with status, queue and folder bookkeeping.
pub mod catalog;
/// Stack of committed triage decisions.
pub mod decisions;
/// Helper index aliases.
pub mod indices;
