use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use tempfile::TempDir;

use shortlist::{
    fs::CancelFlag,
    op::StoredOp,
    persist::{JournalSink, PersistError, PersistResult, sqlite::SqliteJournal},
    photo::PhotoDraft,
    rating::{MatchmakingParams, RankingError},
    runtime::{Collaborators, RuntimeConfig, RuntimeError, SessionEvent, SessionHandle, spawn_session},
    session::{BrowseSort, Session, SessionSettings},
    triage::{Destinations, TriageError},
    types::{Action, OpSeq, Outcome, Status},
};

struct Workspace {
    _tmp: TempDir,
    source: PathBuf,
    keep: PathBuf,
    discard: PathBuf,
}

/// Three photos with distinct bytes plus a file the scanner must ignore.
fn workspace() -> Workspace {
    let tmp = TempDir::new().expect("tmp");
    let source = tmp.path().join("shoot");
    std::fs::create_dir_all(source.join("day2")).expect("mkdir");
    std::fs::write(source.join("a.jpg"), b"alpha").expect("write");
    std::fs::write(source.join("b.jpg"), b"bravo").expect("write");
    std::fs::write(source.join("day2").join("c.png"), b"charlie").expect("write");
    std::fs::write(source.join("notes.txt"), b"not a photo").expect("write");
    Workspace {
        keep: tmp.path().join("keep"),
        discard: tmp.path().join("discard"),
        source,
        _tmp: tmp,
    }
}

fn settings(ws: &Workspace) -> SessionSettings {
    SessionSettings {
        destinations: Destinations::new(&ws.keep, &ws.discard),
        matchmaking: MatchmakingParams {
            seed: Some(11),
            ..MatchmakingParams::default()
        },
        ..SessionSettings::default()
    }
}

fn in_memory(ws: &Workspace) -> SessionHandle {
    spawn_session(
        Session::new(settings(ws)),
        None,
        Collaborators::default(),
        RuntimeConfig::default(),
    )
}

async fn next_non_durable(sub: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> SessionEvent {
    loop {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event")
            .expect("recv");
        if !matches!(evt, SessionEvent::DurableUpTo { .. }) {
            return evt;
        }
    }
}

#[tokio::test]
async fn triage_then_rank_end_to_end() {
    let ws = workspace();
    let handle = in_memory(&ws);
    let mut sub = handle.subscribe();

    let summary = handle.rescan(vec![ws.source.clone()]).await.expect("scan");
    assert_eq!(summary.added, 3);
    assert_eq!(next_non_durable(&mut sub).await, SessionEvent::Scanned { added: 3 });

    // A second scan finds nothing new.
    let again = handle.rescan(vec![ws.source.clone()]).await.expect("rescan");
    assert_eq!((again.added, again.already_present), (0, 3));

    let mut decided = Vec::new();
    while let Some(photo) = handle.current_pending_photo().await.expect("queue") {
        let action = if photo.filename == "b.jpg" { Action::Reject } else { Action::Accept };
        let record = handle.decide(photo.id.clone(), action).await.expect("decide");
        let moved_to = record.side_effect.expect("moved").to;
        assert!(moved_to.exists());
        assert!(!photo.id.exists());
        assert_eq!(
            next_non_durable(&mut sub).await,
            SessionEvent::Decided {
                id: photo.id.clone(),
                action,
                moved_to: Some(moved_to),
            }
        );
        decided.push(photo.filename);
    }
    assert_eq!(decided, vec!["a.jpg", "b.jpg", "c.png"]);
    assert!(ws.keep.join("a.jpg").exists());
    assert!(ws.keep.join("c.png").exists());
    assert!(ws.discard.join("b.jpg").exists());

    let stats = handle.stats().await;
    assert_eq!((stats.accepted, stats.rejected, stats.pending), (2, 1, 0));

    let report = handle.enter_ranking(CancelFlag::new()).await.expect("pool");
    assert_eq!((report.entered, report.pool), (2, 2));
    assert!(report.failed.is_empty() && !report.cancelled);
    assert_eq!(
        next_non_durable(&mut sub).await,
        SessionEvent::PoolSynced {
            entered: 2,
            removed: 0,
            pool: 2,
        }
    );

    let (left, right) = handle.next_pair().await.expect("pair");
    assert_ne!(left, right);
    handle
        .compare(left.clone(), right.clone(), Outcome::LeftWin)
        .await
        .expect("compare");
    assert_eq!(
        next_non_durable(&mut sub).await,
        SessionEvent::Compared {
            left: left.clone(),
            right: right.clone(),
            outcome: Outcome::LeftWin,
        }
    );

    let board = handle.leaderboard(10).await;
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].content_id, left);
    assert!(board[0].location.starts_with(&ws.keep));

    let page = handle.browse(Status::Accepted, BrowseSort::ScoreDesc, 1, 10).await;
    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 1);
    assert!(page.items.iter().all(|item| item.score.is_some()));
    assert!(page.items[0].score >= page.items[1].score);

    let ranking = handle.ranking_stats().await;
    assert_eq!(ranking.total_comparisons, 1);
    assert_eq!(ranking.total_photos, 2);

    handle.undo_ranking().await.expect("undo ranking");
    assert_eq!(handle.ranking_stats().await.total_comparisons, 0);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn undo_moves_the_file_back() {
    let ws = workspace();
    let handle = in_memory(&ws);
    handle.rescan(vec![ws.source.clone()]).await.expect("scan");

    let photo = handle
        .current_pending_photo()
        .await
        .expect("queue")
        .expect("photo");
    handle.decide(photo.id.clone(), Action::Reject).await.expect("reject");
    assert!(!photo.id.exists());

    let undone = handle.undo_triage().await.expect("undo");
    assert_eq!(undone.photo, photo.id);
    assert!(photo.id.exists());
    assert!(!ws.discard.join(&photo.filename).exists());
    assert_eq!(
        handle.photo(&photo.id).await.map(|p| p.status),
        Some(Status::Pending)
    );

    let err = handle.undo_triage().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Triage(TriageError::NothingToUndo)));
    assert!(err.is_benign());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn skip_is_requeued_with_an_event() {
    let ws = workspace();
    let handle = in_memory(&ws);
    let mut sub = handle.subscribe();
    handle.rescan(vec![ws.source.clone()]).await.expect("scan");
    let _ = next_non_durable(&mut sub).await;

    let first = handle
        .current_pending_photo()
        .await
        .expect("queue")
        .expect("photo");
    handle.decide(first.id.clone(), Action::Skip).await.expect("skip");
    assert!(first.id.exists());
    let _ = next_non_durable(&mut sub).await;

    for _ in 0..2 {
        let photo = handle
            .current_pending_photo()
            .await
            .expect("queue")
            .expect("photo");
        assert_ne!(photo.id, first.id);
        handle.decide(photo.id, Action::Accept).await.expect("accept");
        let _ = next_non_durable(&mut sub).await;
    }

    let back = handle
        .current_pending_photo()
        .await
        .expect("queue")
        .expect("photo");
    assert_eq!(back.id, first.id);
    assert_eq!(back.status, Status::Pending);
    assert_eq!(
        next_non_durable(&mut sub).await,
        SessionEvent::Requeued { id: first.id.clone() }
    );

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn empty_pool_and_cancelled_sync_are_benign() {
    let ws = workspace();
    let handle = in_memory(&ws);

    let err = handle.next_pair().await.unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Ranking(RankingError::InsufficientPool { eligible: 0 })
    ));
    assert!(err.is_benign());

    handle.rescan(vec![ws.source.clone()]).await.expect("scan");
    while let Some(photo) = handle.current_pending_photo().await.expect("queue") {
        handle.decide(photo.id, Action::Accept).await.expect("accept");
    }

    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = handle.enter_ranking(cancel).await.expect("pool");
    assert!(report.cancelled);
    assert_eq!(report.pool, 0);

    let report = handle.enter_ranking(CancelFlag::new()).await.expect("pool");
    assert_eq!((report.entered, report.pool), (3, 3));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn journaled_session_resumes_with_undo() {
    let ws = workspace();
    let db_path = ws.source.parent().expect("parent").join("session.db");

    let accepted = {
        let journal = SqliteJournal::open(&db_path).expect("open sqlite");
        let session = journal.load_session(settings(&ws)).expect("load");
        let handle = spawn_session(
            session,
            Some(Box::new(journal)),
            Collaborators::default(),
            RuntimeConfig::default(),
        );
        handle.rescan(vec![ws.source.clone()]).await.expect("scan");
        let photo = handle
            .current_pending_photo()
            .await
            .expect("queue")
            .expect("photo");
        handle.decide(photo.id.clone(), Action::Accept).await.expect("accept");
        handle.flush().await.expect("flush");
        handle.shutdown().await.expect("shutdown");
        photo
    };
    assert!(!accepted.id.exists());

    let journal = SqliteJournal::open(&db_path).expect("reopen");
    let session = journal.load_session(settings(&ws)).expect("reload");
    assert_eq!(session.stats().accepted, 1);
    assert_eq!(session.stats().pending, 2);

    let handle = spawn_session(
        session,
        Some(Box::new(journal)),
        Collaborators::default(),
        RuntimeConfig::default(),
    );
    let undone = handle.undo_triage().await.expect("undo after restart");
    assert_eq!(undone.photo, accepted.id);
    assert!(accepted.id.exists());
    handle.checkpoint().await.expect("checkpoint");
    handle.shutdown().await.expect("shutdown");

    let journal = SqliteJournal::open(&db_path).expect("reopen again");
    let statuses = journal.photo_statuses().expect("statuses");
    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|row| row.status == Status::Pending));
}

struct SlowSink {
    seen: Arc<Mutex<Vec<OpSeq>>>,
    delay: Duration,
}

impl JournalSink for SlowSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        std::thread::sleep(self.delay);
        let mut seen = self.seen.lock().expect("lock");
        for op in ops {
            seen.push(op.seq);
        }
        Ok(ops.last().map(|o| o.seq).unwrap_or(0))
    }
}

#[tokio::test]
async fn slow_sink_reports_durability_and_loses_nothing() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = SlowSink {
        seen: Arc::clone(&seen),
        delay: Duration::from_millis(40),
    };
    let cfg = RuntimeConfig {
        flush_on_move: true,
        batch_max_ops: 4,
        batch_max_latency_ms: 50,
        persist_queue_bound: 1,
        snapshot_every_ops: 0,
        compact_after_snapshot: false,
    };

    let session = Session::new(SessionSettings {
        destinations: Destinations::new("/keep", "/discard"),
        ..SessionSettings::default()
    });
    let handle = spawn_session(session, Some(Box::new(sink)), Collaborators::default(), cfg);
    let mut sub = handle.subscribe();

    let drafts: Vec<PhotoDraft> = (0..12)
        .map(|i| PhotoDraft::from_path(format!("/virtual/img{i:02}.jpg"), "/virtual"))
        .collect();
    let summary = handle.register(drafts).await.expect("register");
    assert_eq!(summary.added, 12);

    let mut durable_seen = false;
    for _ in 0..20 {
        let evt = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("recv timeout")
            .expect("recv");
        if matches!(evt, SessionEvent::DurableUpTo { .. }) {
            durable_seen = true;
            break;
        }
    }
    assert!(durable_seen, "expected DurableUpTo event");

    // Skips never touch the filesystem, so virtual paths are fine.
    for i in 0..12 {
        let id = PathBuf::from(format!("/virtual/img{i:02}.jpg"));
        handle.decide(id, Action::Skip).await.expect("skip under pressure");
    }

    let durable = handle.flush().await.expect("flush");
    assert_eq!(durable, 24);
    handle.shutdown().await.expect("shutdown");

    let seen = seen.lock().expect("lock").clone();
    assert_eq!(seen, (1..=24).collect::<Vec<OpSeq>>());
}

/// Refuses its first appends, then writes through to SQLite.
struct FlakySink {
    inner: SqliteJournal,
    failures_left: usize,
}

impl JournalSink for FlakySink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(PersistError::Message("disk unavailable".into()));
        }
        self.inner.append_ops(ops)
    }
}

#[tokio::test]
async fn failed_append_is_retried_in_order() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("flaky.db");
    let sink = FlakySink {
        inner: SqliteJournal::open(&db_path).expect("open sqlite"),
        failures_left: 1,
    };
    let cfg = RuntimeConfig {
        flush_on_move: false,
        batch_max_ops: 64,
        batch_max_latency_ms: 10_000,
        persist_queue_bound: 8,
        snapshot_every_ops: 0,
        compact_after_snapshot: false,
    };
    let settings = || SessionSettings {
        destinations: Destinations::new("/keep", "/discard"),
        ..SessionSettings::default()
    };
    let handle = spawn_session(Session::new(settings()), Some(Box::new(sink)), Collaborators::default(), cfg);

    handle
        .register(vec![PhotoDraft::from_path("/v/a.jpg", "/v")])
        .await
        .expect("register a");
    let err = handle.flush().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Persist(_)), "{err}");

    handle
        .register(vec![PhotoDraft::from_path("/v/b.jpg", "/v")])
        .await
        .expect("register b");
    assert_eq!(handle.flush().await.expect("flush"), 2);
    handle.shutdown().await.expect("shutdown");

    let journal = SqliteJournal::open(&db_path).expect("reopen");
    let seqs: Vec<OpSeq> = journal
        .load_events_after(0)
        .expect("events")
        .iter()
        .map(|op| op.seq)
        .collect();
    assert_eq!(seqs, vec![1, 2]);
    let session = journal.load_session(settings()).expect("replay");
    assert_eq!(session.triage().catalog().len(), 2);
}
