//! Single-writer async front end over a [`crate::session::Session`].

/// Events broadcast after each commit.
pub mod events;
/// Session handle, writer loop and persistence worker.
pub mod handle;

pub use events::SessionEvent;
pub use handle::{Collaborators, PoolSyncReport, RuntimeConfig, RuntimeError, SessionHandle, spawn_session};
