//! Triage state machine: accept, reject, skip and undo.
//!
//! Every mutation is split in three steps so a caller can keep file I/O
//! outside its critical section:
//!
//! 1. `plan_*` reads state and validates the request,
//! 2. `perform` runs the file move through a [`crate::fs::FileMover`],
//! 3. `commit_*` re-validates and records the result.
//!
//! [`TriageController::decide`] and [`TriageController::undo`] chain the
//! three steps for single-threaded callers.

/// Controller, plans and errors.
pub mod controller;

pub use controller::{
    DecisionPlan, Destinations, Presented, TriageController, TriageError, UndoPlan,
};
