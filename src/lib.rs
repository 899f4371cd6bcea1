//! Photo triage and pairwise ranking with undo and an append-only SQLite journal.
//!
//! A [`session::Session`] owns the triage state (catalog plus decision
//! stack) and the ranking state (TrueSkill ratings plus comparison stack).
//! The [`runtime`] puts a single writer task in front of it and journals
//! every committed mutation through [`persist::sqlite::SqliteJournal`].
//!
//! # Examples
//!
//! In-memory triage with [`triage::TriageController`]:
//! ```
//! use shortlist::{
//!     fs::{FileMover, MoveError},
//!     photo::PhotoDraft,
//!     triage::{Destinations, TriageController},
//!     types::{Action, Status},
//! };
//! use std::path::Path;
//!
//! struct NoopMover;
//! impl FileMover for NoopMover {
//!     fn move_file(&self, _from: &Path, _to: &Path) -> Result<(), MoveError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut triage = TriageController::new(Destinations::new("/keep", "/discard"));
//! triage.register(PhotoDraft::from_path("/photos/a.jpg", "/photos")).expect("register");
//! triage.decide(&NoopMover, Path::new("/photos/a.jpg"), Action::Accept).expect("decide");
//! triage.undo(&NoopMover).expect("undo");
//! assert_eq!(triage.catalog().get(Path::new("/photos/a.jpg")).map(|p| p.status), Some(Status::Pending));
//! ```
//!
//! Runtime usage with the SQLite journal:
//! ```no_run
//! use shortlist::{
//!     config::Config,
//!     fs::CancelFlag,
//!     persist::sqlite::SqliteJournal,
//!     runtime::{spawn_session, Collaborators},
//!     types::{Action, Outcome},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = Config::load_or_default(&Config::default_path()).expect("config");
//! let journal = SqliteJournal::open(Config::default_journal_path()).expect("open sqlite");
//! let session = journal.load_session(config.session_settings()).expect("load");
//! let handle = spawn_session(session, Some(Box::new(journal)), Collaborators::default(), config.runtime.clone());
//!
//! handle.rescan(config.source_folders.clone()).await.expect("scan");
//! while let Some(photo) = handle.current_pending_photo().await.expect("queue") {
//!     handle.decide(photo.id, Action::Accept).await.expect("decide");
//! }
//!
//! handle.enter_ranking(CancelFlag::new()).await.expect("pool");
//! if let Ok((left, right)) = handle.next_pair().await {
//!     handle.compare(left, right, Outcome::LeftWin).await.expect("compare");
//! }
//! for entry in handle.leaderboard(10).await {
//!     println!("{} {:.2} {:?}", entry.rank, entry.score, entry.location);
//! }
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![warn(missing_docs)]

/// User configuration file.
pub mod config;
/// Photo catalog, decision stack and index helpers.
pub mod core;
/// Filesystem collaborators: mover, hasher, scanner.
pub mod fs;
/// Journaled op model and persistence wrapper types.
pub mod op;
/// Journal abstraction and SQLite implementation.
pub mod persist;
/// Photo records and scanner tuples.
pub mod photo;
/// TrueSkill ratings, matchmaking and the ranking engine.
pub mod rating;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Session aggregate over triage and ranking.
pub mod session;
/// Triage controller.
pub mod triage;
/// Shared identities and enums.
pub mod types;
