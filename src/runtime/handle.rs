use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::{Mutex, RwLock, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    core::{
        catalog::{FolderSummary, StatusCounts},
        decisions::DecisionRecord,
    },
    fs::{CancelFlag, ContentHasher, FileMover, FsMover, HashCache, Sha256Hasher, hash::hash_all, scan_folders},
    op::{Op, StoredOp},
    persist::{JournalSink, PersistError},
    photo::{Photo, PhotoDraft},
    rating::{ComparisonRecord, LeaderboardEntry, PoolMember, RankingError, RankingStats},
    session::{BrowsePage, BrowseSort, ScanSummary, Session, SessionSnapshotV1},
    triage::TriageError,
    types::{Action, ContentId, OpSeq, Outcome, Phase, PhotoId, Status},
};

use super::events::SessionEvent;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Triage(#[from] TriageError),
    #[error(transparent)]
    Ranking(#[from] RankingError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("session runtime is closed")]
    ChannelClosed,
}

impl RuntimeError {
    /// `NothingToUndo` and `InsufficientPool` are states to show, not failures.
    pub fn is_benign(&self) -> bool {
        match self {
            RuntimeError::Triage(err) => err.is_benign(),
            RuntimeError::Ranking(err) => err.is_benign(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Persist immediately after ops that record a file move.
    pub flush_on_move: bool,
    pub batch_max_ops: usize,
    pub batch_max_latency_ms: u64,
    pub persist_queue_bound: usize,
    /// Ops between automatic snapshots; 0 disables them.
    pub snapshot_every_ops: usize,
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_move: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 500,
            compact_after_snapshot: false,
        }
    }
}

/// Filesystem collaborators used by the writer task.
#[derive(Clone)]
pub struct Collaborators {
    pub mover: Arc<dyn FileMover>,
    pub hasher: Arc<dyn ContentHasher>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            mover: Arc::new(FsMover),
            hasher: Arc::new(Sha256Hasher::default()),
        }
    }
}

/// What [`SessionHandle::enter_ranking`] did to the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSyncReport {
    pub entered: usize,
    pub relocated: usize,
    pub removed: usize,
    /// Pool size afterwards.
    pub pool: usize,
    /// Accepted photos that could not be hashed.
    pub failed: Vec<PathBuf>,
    /// Hashing stopped early; nothing was pruned.
    pub cancelled: bool,
}

/// Cloneable front end to a running session.
///
/// Mutations queue behind one writer task. Reads take the shared lock
/// directly and never wait for file I/O.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<SessionEvent>,
    state: Arc<RwLock<Session>>,
}

enum Command {
    Register {
        drafts: Vec<PhotoDraft>,
        resp: oneshot::Sender<ScanSummary>,
    },
    Rescan {
        folders: Vec<PathBuf>,
        resp: oneshot::Sender<Result<ScanSummary, RuntimeError>>,
    },
    PresentNext {
        resp: oneshot::Sender<Result<Option<Photo>, RuntimeError>>,
    },
    Decide {
        id: PhotoId,
        action: Action,
        resp: oneshot::Sender<Result<DecisionRecord, RuntimeError>>,
    },
    UndoTriage {
        resp: oneshot::Sender<Result<DecisionRecord, RuntimeError>>,
    },
    RetireFolder {
        folder: PathBuf,
        resp: oneshot::Sender<bool>,
    },
    EnterRanking {
        cancel: CancelFlag,
        resp: oneshot::Sender<Result<PoolSyncReport, RuntimeError>>,
    },
    NextPair {
        resp: oneshot::Sender<Result<(ContentId, ContentId), RuntimeError>>,
    },
    Compare {
        left: ContentId,
        right: ContentId,
        outcome: Outcome,
        resp: oneshot::Sender<Result<ComparisonRecord, RuntimeError>>,
    },
    UndoRanking {
        resp: oneshot::Sender<Result<ComparisonRecord, RuntimeError>>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Op(StoredOp),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: Box<SessionSnapshotV1>,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
}

pub fn spawn_session(
    session: Session,
    sink: Option<Box<dyn JournalSink>>,
    collaborators: Collaborators,
    config: RuntimeConfig,
) -> SessionHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<SessionEvent>(1024);
    let state = Arc::new(RwLock::new(session));

    let (persist_tx, mut durable_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound.max(1));
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<Result<OpSeq, PersistError>>();
        JournalWorker::spawn(sink, persist_rx, durable_tx, config.clone());
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let mut writer = Writer {
        state: Arc::clone(&state),
        collaborators,
        events_tx: events_tx.clone(),
        persist_tx,
        config,
        ops_since_snapshot: 0,
        hash_cache: HashCache::new(),
    };

    tokio::spawn(async move {
        loop {
            if let Some(rx) = durable_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        if writer.handle_command(cmd).await {
                            break;
                        }
                    }
                    durable = rx.recv() => {
                        if let Some(Ok(op_seq)) = durable {
                            let _ = writer.events_tx.send(SessionEvent::DurableUpTo { op_seq });
                        }
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                if writer.handle_command(cmd).await {
                    break;
                }
            }
        }
        debug!("session writer stopped");
    });

    SessionHandle {
        cmd_tx,
        events_tx,
        state,
    }
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Registers already-scanned photos.
    pub async fn register(&self, drafts: Vec<PhotoDraft>) -> Result<ScanSummary, RuntimeError> {
        self.request(|resp| Command::Register { drafts, resp }).await
    }

    /// Scans `folders` off the writer's lock and registers what it finds.
    pub async fn rescan(&self, folders: Vec<PathBuf>) -> Result<ScanSummary, RuntimeError> {
        self.request(|resp| Command::Rescan { folders, resp }).await?
    }

    /// Photo to triage next; `None` when triage is done.
    pub async fn current_pending_photo(&self) -> Result<Option<Photo>, RuntimeError> {
        self.request(|resp| Command::PresentNext { resp }).await?
    }

    pub async fn decide(&self, id: impl Into<PhotoId>, action: Action) -> Result<DecisionRecord, RuntimeError> {
        let id = id.into();
        self.request(|resp| Command::Decide { id, action, resp })
            .await?
    }

    pub async fn undo_triage(&self) -> Result<DecisionRecord, RuntimeError> {
        self.request(|resp| Command::UndoTriage { resp }).await?
    }

    pub async fn retire_folder(&self, folder: impl Into<PathBuf>) -> Result<bool, RuntimeError> {
        let folder = folder.into();
        self.request(|resp| Command::RetireFolder { folder, resp })
            .await
    }

    /// Hashes accepted photos and reconciles the ranking pool.
    ///
    /// Cancelling `cancel` stops hashing at the next file; photos hashed so
    /// far still enter the pool, and nothing is removed.
    pub async fn enter_ranking(&self, cancel: CancelFlag) -> Result<PoolSyncReport, RuntimeError> {
        self.request(|resp| Command::EnterRanking { cancel, resp })
            .await?
    }

    pub async fn next_pair(&self) -> Result<(ContentId, ContentId), RuntimeError> {
        self.request(|resp| Command::NextPair { resp }).await?
    }

    pub async fn compare(
        &self,
        left: impl Into<ContentId>,
        right: impl Into<ContentId>,
        outcome: Outcome,
    ) -> Result<ComparisonRecord, RuntimeError> {
        let (left, right) = (left.into(), right.into());
        self.request(|resp| Command::Compare {
            left,
            right,
            outcome,
            resp,
        })
        .await?
    }

    pub async fn undo_ranking(&self) -> Result<ComparisonRecord, RuntimeError> {
        self.request(|resp| Command::UndoRanking { resp }).await?
    }

    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await?
    }

    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Checkpoint { resp }).await?
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await?
    }

    // Reads below see only committed state and run alongside each other.

    pub async fn stats(&self) -> StatusCounts {
        self.state.read().await.stats()
    }

    pub async fn ranking_stats(&self) -> RankingStats {
        self.state.read().await.ranking_stats()
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase()
    }

    pub async fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.state.read().await.leaderboard(limit)
    }

    pub async fn browse(&self, status: Status, sort: BrowseSort, page: usize, per_page: usize) -> BrowsePage {
        self.state
            .read()
            .await
            .browse(status, sort, page, per_page)
    }

    pub async fn photo(&self, id: &Path) -> Option<Photo> {
        self.state.read().await.photo(id).cloned()
    }

    pub async fn folder_summaries(&self) -> Vec<FolderSummary> {
        self.state.read().await.folder_summaries()
    }
}

struct Writer {
    state: Arc<RwLock<Session>>,
    collaborators: Collaborators,
    events_tx: broadcast::Sender<SessionEvent>,
    persist_tx: Option<mpsc::Sender<PersistMsg>>,
    config: RuntimeConfig,
    ops_since_snapshot: usize,
    hash_cache: HashCache,
}

impl Writer {
    /// Returns true once the loop should stop.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Register { drafts, resp } => {
                let summary = self.register(drafts).await;
                let _ = resp.send(summary);
            }
            Command::Rescan { folders, resp } => {
                let res = match tokio::task::spawn_blocking(move || scan_folders(&folders)).await {
                    Ok(drafts) => Ok(self.register(drafts).await),
                    Err(e) => Err(RuntimeError::Task(format!("scan: {e}"))),
                };
                let _ = resp.send(res);
            }
            Command::PresentNext { resp } => {
                let res = {
                    let mut state = self.state.write().await;
                    state.present_next().map_err(RuntimeError::from)
                };
                // Only a requeued skip emits an op here.
                if let Ok(Some(photo)) = &res {
                    if self.publish().await > 0 {
                        let _ = self.events_tx.send(SessionEvent::Requeued {
                            id: photo.id.clone(),
                        });
                    }
                }
                let _ = resp.send(res);
            }
            Command::Decide { id, action, resp } => {
                let res = self.decide(id, action).await;
                let _ = resp.send(res);
            }
            Command::UndoTriage { resp } => {
                let res = self.undo_triage().await;
                let _ = resp.send(res);
            }
            Command::RetireFolder { folder, resp } => {
                let retired = self.state.write().await.retire_folder(&folder);
                if retired {
                    self.publish().await;
                    let _ = self.events_tx.send(SessionEvent::FolderRetired { folder });
                }
                let _ = resp.send(retired);
            }
            Command::EnterRanking { cancel, resp } => {
                let res = self.enter_ranking(cancel).await;
                let _ = resp.send(res);
            }
            Command::NextPair { resp } => {
                let res = self
                    .state
                    .write()
                    .await
                    .next_pair()
                    .map_err(RuntimeError::from);
                let _ = resp.send(res);
            }
            Command::Compare {
                left,
                right,
                outcome,
                resp,
            } => {
                let res = self.compare(&left, &right, outcome).await;
                let _ = resp.send(res);
            }
            Command::UndoRanking { resp } => {
                let res = self.undo_ranking().await;
                let _ = resp.send(res);
            }
            Command::Flush { resp } => {
                let out = if let Some(tx) = &self.persist_tx {
                    let (flush_tx, flush_rx) = oneshot::channel();
                    if tx.send(PersistMsg::Flush { resp: flush_tx }).await.is_err() {
                        Err(RuntimeError::ChannelClosed)
                    } else {
                        flush_rx
                            .await
                            .map_err(|_| RuntimeError::ChannelClosed)
                            .and_then(|r| r.map_err(RuntimeError::from))
                    }
                } else {
                    Ok(self.state.read().await.latest_op_seq())
                };
                let _ = resp.send(out);
            }
            Command::Checkpoint { resp } => {
                let out = self.checkpoint().await;
                let _ = resp.send(out);
            }
            Command::Shutdown { resp } => {
                let out = if let Some(tx) = &self.persist_tx {
                    let (done_tx, done_rx) = oneshot::channel();
                    if tx.send(PersistMsg::Shutdown { resp: done_tx }).await.is_err() {
                        Err(RuntimeError::ChannelClosed)
                    } else {
                        done_rx
                            .await
                            .map_err(|_| RuntimeError::ChannelClosed)
                            .and_then(|r| r.map_err(RuntimeError::from))
                    }
                } else {
                    Ok(())
                };
                info!("session runtime shutting down");
                let _ = resp.send(out);
                return true;
            }
        }

        false
    }

    async fn register(&mut self, drafts: Vec<PhotoDraft>) -> ScanSummary {
        let summary = self.state.write().await.register_all(drafts);
        if summary.added > 0 {
            self.publish().await;
            let _ = self.events_tx.send(SessionEvent::Scanned {
                added: summary.added,
            });
        }
        summary
    }

    async fn decide(&mut self, id: PhotoId, action: Action) -> Result<DecisionRecord, RuntimeError> {
        let plan = self.state.read().await.plan_decision(&id, action)?;

        // The move runs with no lock held; readers keep seeing the old state.
        let mover = Arc::clone(&self.collaborators.mover);
        let io_plan = plan.clone();
        let side_effect = tokio::task::spawn_blocking(move || io_plan.perform(mover.as_ref()))
            .await
            .map_err(|e| RuntimeError::Task(format!("move: {e}")))??;

        let record = self
            .state
            .write()
            .await
            .commit_decision(&plan, side_effect)?;
        self.publish().await;

        let _ = self.events_tx.send(SessionEvent::Decided {
            id: record.photo.clone(),
            action,
            moved_to: record.side_effect.as_ref().map(|e| e.to.clone()),
        });
        Ok(record)
    }

    async fn undo_triage(&mut self) -> Result<DecisionRecord, RuntimeError> {
        let plan = self.state.read().await.plan_undo()?;

        let mover = Arc::clone(&self.collaborators.mover);
        let io_plan = plan.clone();
        tokio::task::spawn_blocking(move || io_plan.perform(mover.as_ref()))
            .await
            .map_err(|e| RuntimeError::Task(format!("reverse move: {e}")))??;

        let record = self.state.write().await.commit_undo(&plan)?;
        self.publish().await;

        let _ = self.events_tx.send(SessionEvent::TriageUndone {
            id: record.photo.clone(),
            status: record.previous_status,
        });
        Ok(record)
    }

    async fn enter_ranking(&mut self, cancel: CancelFlag) -> Result<PoolSyncReport, RuntimeError> {
        let (candidates, phase_before) = {
            let state = self.state.read().await;
            (state.pool_candidates(), state.phase())
        };
        let paths: Vec<PathBuf> = candidates.iter().map(|(_, loc)| loc.clone()).collect();

        let hasher = Arc::clone(&self.collaborators.hasher);
        let mut cache = std::mem::take(&mut self.hash_cache);
        let (cache, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = hash_all(hasher.as_ref(), &mut cache, paths, &cancel);
            (cache, outcome)
        })
        .await
        .map_err(|e| RuntimeError::Task(format!("hashing: {e}")))?;
        self.hash_cache = cache;

        let photo_at: HashMap<PathBuf, PhotoId> = candidates.into_iter().map(|(id, loc)| (loc, id)).collect();
        let members: Vec<PoolMember> = outcome
            .hashed
            .into_iter()
            .map(|(location, content_id)| PoolMember {
                content_id,
                photo: photo_at.get(&location).cloned(),
                location,
            })
            .collect();
        let prune = !outcome.cancelled && outcome.failed.is_empty();

        let (change, pool, phase_after) = {
            let mut state = self.state.write().await;
            let change = state.sync_pool(members, prune);
            (change, state.ranking().store().len(), state.phase())
        };
        self.publish().await;

        if outcome.cancelled {
            info!(pool, "ranking pool sync cancelled");
        }
        let _ = self.events_tx.send(SessionEvent::PoolSynced {
            entered: change.entered.len(),
            removed: change.removed.len(),
            pool,
        });
        self.announce_phase(phase_before, phase_after);

        Ok(PoolSyncReport {
            entered: change.entered.len(),
            relocated: change.relocated.len(),
            removed: change.removed.len(),
            pool,
            failed: outcome.failed,
            cancelled: outcome.cancelled,
        })
    }

    async fn compare(&mut self, left: &str, right: &str, outcome: Outcome) -> Result<ComparisonRecord, RuntimeError> {
        let (record, before, after) = {
            let mut state = self.state.write().await;
            let before = state.phase();
            let record = state.compare(left, right, outcome)?;
            (record, before, state.phase())
        };
        self.publish().await;

        let _ = self.events_tx.send(SessionEvent::Compared {
            left: record.left.clone(),
            right: record.right.clone(),
            outcome,
        });
        self.announce_phase(before, after);
        Ok(record)
    }

    async fn undo_ranking(&mut self) -> Result<ComparisonRecord, RuntimeError> {
        let (record, before, after) = {
            let mut state = self.state.write().await;
            let before = state.phase();
            let record = state.undo_ranking()?;
            (record, before, state.phase())
        };
        self.publish().await;

        let _ = self.events_tx.send(SessionEvent::RankingUndone {
            left: record.left.clone(),
            right: record.right.clone(),
        });
        self.announce_phase(before, after);
        Ok(record)
    }

    fn announce_phase(&self, before: Phase, after: Phase) {
        if before != after {
            info!(?after, "ranking phase changed");
            let _ = self.events_tx.send(SessionEvent::PhaseChanged { phase: after });
        }
    }

    /// Hands committed ops to the persistence worker; returns how many.
    async fn publish(&mut self) -> usize {
        let (ops, latest) = {
            let mut state = self.state.write().await;
            (state.drain_pending_ops(), state.latest_op_seq())
        };
        let count = ops.len();
        if count == 0 {
            return 0;
        }

        match &self.persist_tx {
            Some(tx) => {
                for stored in ops {
                    enqueue_persist(tx, stored).await;
                }
            }
            None => {
                let _ = self.events_tx.send(SessionEvent::DurableUpTo { op_seq: latest });
            }
        }

        self.ops_since_snapshot += count;
        self.maybe_auto_checkpoint().await;
        count
    }

    async fn checkpoint(&mut self) -> Result<(), RuntimeError> {
        let Some(tx) = &self.persist_tx else {
            return Ok(());
        };

        let (snapshot, last_seq) = {
            let state = self.state.read().await;
            (Box::new(state.export_snapshot()), state.latest_op_seq())
        };
        let (cp_tx, cp_rx) = oneshot::channel();
        tx.send(PersistMsg::Checkpoint {
            snapshot,
            last_seq,
            compact: self.config.compact_after_snapshot,
            resp: cp_tx,
        })
        .await
        .map_err(|_| RuntimeError::ChannelClosed)?;
        cp_rx.await.map_err(|_| RuntimeError::ChannelClosed)??;
        self.ops_since_snapshot = 0;
        Ok(())
    }

    async fn maybe_auto_checkpoint(&mut self) {
        if self.config.snapshot_every_ops == 0 || self.ops_since_snapshot < self.config.snapshot_every_ops {
            return;
        }
        if let Err(err) = self.checkpoint().await {
            warn!(error = %err, "automatic checkpoint failed");
        }
    }
}

/// Queues one op, waiting for room when the worker falls behind.
async fn enqueue_persist(tx: &mpsc::Sender<PersistMsg>, stored: StoredOp) {
    let msg = match tx.try_send(PersistMsg::Op(stored)) {
        Ok(()) => return,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            warn!("persistence queue full, waiting");
            msg
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!("persistence worker is gone, op not journaled");
            return;
        }
    };
    if tx.send(msg).await.is_err() {
        warn!("persistence worker is gone, op not journaled");
    }
}

fn records_move(op: &Op) -> bool {
    match op {
        Op::Decided { record } => record.side_effect.is_some(),
        Op::DecisionUndone { .. } => true,
        _ => false,
    }
}

/// Owns the sink on its own task and writes ops to it in batches.
///
/// An op leaves `pending` only after the sink accepted it, so a failed
/// append is retried in order by the next write and the durable mark
/// never passes a hole.
struct JournalWorker {
    sink: Arc<Mutex<Box<dyn JournalSink>>>,
    pending: Vec<StoredOp>,
    durable: OpSeq,
    durable_tx: mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    config: RuntimeConfig,
    deadline: Instant,
}

impl JournalWorker {
    fn spawn(
        sink: Box<dyn JournalSink>,
        rx: mpsc::Receiver<PersistMsg>,
        durable_tx: mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
        config: RuntimeConfig,
    ) {
        let deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
        let worker = JournalWorker {
            sink: Arc::new(Mutex::new(sink)),
            pending: Vec::new(),
            durable: 0,
            durable_tx,
            config,
            deadline,
        };
        tokio::spawn(worker.run(rx));
    }

    async fn run(mut self, mut rx: mpsc::Receiver<PersistMsg>) {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = self.finish().await;
                        break;
                    };
                    if self.handle(msg).await {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(self.deadline), if !self.pending.is_empty() => {
                    let _ = self.write_pending(false).await;
                    self.rearm();
                }
            }
        }
        debug!(durable = self.durable, "journal worker stopped");
    }

    /// Returns true once the worker should stop.
    async fn handle(&mut self, msg: PersistMsg) -> bool {
        match msg {
            PersistMsg::Op(stored) => {
                let urgent = self.config.flush_on_move && records_move(&stored.op);
                self.pending.push(stored);
                if urgent || self.pending.len() >= self.config.batch_max_ops {
                    let _ = self.write_pending(true).await;
                    self.rearm();
                }
            }
            PersistMsg::Flush { resp } => {
                let _ = resp.send(self.write_pending(true).await);
                self.rearm();
            }
            PersistMsg::Checkpoint {
                snapshot,
                last_seq,
                compact,
                resp,
            } => {
                let result = match self.write_pending(true).await {
                    Ok(_) => self.write_snapshot(snapshot, last_seq, compact).await,
                    Err(err) => Err(err),
                };
                let _ = resp.send(result);
                self.rearm();
            }
            PersistMsg::Shutdown { resp } => {
                let _ = resp.send(self.finish().await);
                return true;
            }
        }
        false
    }

    fn rearm(&mut self) {
        self.deadline = Instant::now() + Duration::from_millis(self.config.batch_max_latency_ms);
    }

    /// Last write before the worker exits.
    async fn finish(&mut self) -> Result<(), PersistError> {
        let result = self.write_pending(true).await.map(|_| ());
        if !self.pending.is_empty() {
            warn!(unjournaled = self.pending.len(), "stopping with ops the journal never accepted");
        }
        result
    }

    /// Appends everything pending, syncing the sink when `sync` is set.
    ///
    /// Returns the durable mark afterwards.
    async fn write_pending(&mut self, sync: bool) -> Result<OpSeq, PersistError> {
        let batch = self.pending.clone();
        let sink = Arc::clone(&self.sink);
        let (appended, synced) = tokio::task::spawn_blocking(move || {
            let mut sink = sink.blocking_lock();
            let appended = if batch.is_empty() {
                Ok(None)
            } else {
                sink.append_ops(&batch).map(Some)
            };
            let synced = match &appended {
                Ok(_) if sync => sink.flush(),
                _ => Ok(()),
            };
            (appended, synced)
        })
        .await
        .map_err(|e| PersistError::Message(format!("join error: {e}")))?;

        match appended {
            Ok(Some(seq)) => {
                let count = self.pending.len();
                self.pending.clear();
                self.durable = self.durable.max(seq);
                debug!(count, durable = self.durable, "ops journaled");
                let _ = self.durable_tx.send(Ok(self.durable));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(kept = self.pending.len(), error = %err, "journal append failed, batch kept for retry");
                let _ = self
                    .durable_tx
                    .send(Err(PersistError::Message(format!("append failed: {err}"))));
                return Err(err);
            }
        }

        if let Err(err) = synced {
            warn!(error = %err, "journal sync failed");
            return Err(err);
        }
        Ok(self.durable)
    }

    async fn write_snapshot(
        &mut self,
        snapshot: Box<SessionSnapshotV1>,
        last_seq: OpSeq,
        compact: bool,
    ) -> Result<(), PersistError> {
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || {
            let mut sink = sink.blocking_lock();
            sink.write_snapshot(&snapshot, last_seq)?;
            if compact {
                let removed = sink.compact_through(last_seq)?;
                debug!(removed, last_seq, "journal compacted");
            }
            Result::<(), PersistError>::Ok(())
        })
        .await
        .map_err(|e| PersistError::Message(format!("join error: {e}")))?
    }
}
