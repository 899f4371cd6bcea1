//! SQLite-backed append-only op journal.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    op::{Op, StoredOp, StoredOpEnvelope},
    session::{Session, SessionSettings, SessionSnapshotV1, now_ms},
    types::{ContentId, OpSeq, PhotoId, Status},
};

use super::{JournalSink, PersistError, PersistResult};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    snapshot: SessionSnapshotV1,
}

/// One row of the materialised `photo_status` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoStatusRow {
    /// Triage identity.
    pub photo: PhotoId,
    /// Folder the photo was discovered in.
    pub source_folder: PathBuf,
    /// Where the file was at snapshot time.
    pub location: PathBuf,
    /// Status at snapshot time.
    pub status: Status,
}

/// One row of the materialised `ratings` table.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingRow {
    /// Ranking identity.
    pub content_id: ContentId,
    /// Mean skill.
    pub mu: f64,
    /// Skill uncertainty.
    pub sigma: f64,
    /// Decisive comparisons.
    pub comparisons: u32,
    /// Where the file was at snapshot time.
    pub location: PathBuf,
}

/// SQLite implementation of [`crate::persist::JournalSink`].
pub struct SqliteJournal {
    conn: Connection,
}

impl SqliteJournal {
    /// Opens or creates a journal at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory journal.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Loads session state from the latest snapshot plus tail events.
    pub fn load_session(&self, settings: SessionSettings) -> PersistResult<Session> {
        let mut session = match self.load_latest_snapshot()? {
            Some(snapshot) => Session::from_snapshot(snapshot, settings)?,
            None => Session::new(settings),
        };

        let start_seq = session.latest_op_seq();
        let events = self.load_events_after(start_seq)?;
        let replayed = events.len();
        for event in events {
            session.apply_replayed_op(event)?;
        }

        info!(
            photos = session.triage().catalog().len(),
            rated = session.ranking().store().len(),
            replayed,
            "session loaded"
        );
        Ok(session)
    }

    /// Loads events strictly after `seq`.
    pub fn load_events_after(&self, seq: OpSeq) -> PersistResult<Vec<StoredOp>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, ts_ms, payload FROM events WHERE seq > ?1 ORDER BY seq ASC")?;

        let rows = stmt.query_map(params![seq as i64], |row| {
            let seq: i64 = row.get(0)?;
            let ts_ms: i64 = row.get(1)?;
            let payload: Vec<u8> = row.get(2)?;
            let mut op = decode_stored_op_payload(&payload).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    payload.len(),
                    rusqlite::types::Type::Blob,
                    Box::new(std::io::Error::other(err)),
                )
            })?;
            op.seq = seq as OpSeq;
            op.ts_ms = ts_ms as u64;
            Ok(op)
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Writes a snapshot covering `last_seq` and refreshes the per-identity tables.
    pub fn write_snapshot(&mut self, snapshot: &SessionSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        let env = SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        };
        let payload = serde_json::to_vec(&env)?;
        let ts_ms = now_ms() as i64;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO snapshots(last_seq, ts_ms, payload) VALUES (?1, ?2, ?3)",
            params![last_seq as i64, ts_ms, payload],
        )?;

        tx.execute("DELETE FROM photo_status", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO photo_status(photo_id, source_folder, location, status, updated_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for photo in &snapshot.photos {
                stmt.execute(params![
                    path_text(&photo.id),
                    path_text(&photo.source_folder),
                    path_text(&photo.location),
                    photo.status.as_str(),
                    ts_ms,
                ])?;
            }
        }

        tx.execute("DELETE FROM ratings", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO ratings(content_id, mu, sigma, comparisons, location, updated_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in &snapshot.ratings {
                stmt.execute(params![
                    entry.content_id,
                    entry.rating.mu,
                    entry.rating.sigma,
                    entry.rating.comparisons,
                    path_text(&entry.location),
                    ts_ms,
                ])?;
            }
        }
        tx.commit()?;

        info!(last_seq, photos = snapshot.photos.len(), rated = snapshot.ratings.len(), "snapshot written");
        Ok(())
    }

    /// Deletes events up to and including `seq`.
    pub fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        let count = self
            .conn
            .execute("DELETE FROM events WHERE seq <= ?1", params![seq as i64])?;
        Ok(count)
    }

    /// Returns the latest sequence persisted in the events table.
    pub fn latest_seq(&self) -> PersistResult<OpSeq> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(seq.unwrap_or(0) as OpSeq)
    }

    /// Triage status per photo, as of the latest snapshot.
    pub fn photo_statuses(&self) -> PersistResult<Vec<PhotoStatusRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT photo_id, source_folder, location, status FROM photo_status ORDER BY photo_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (photo, source_folder, location, status) = row?;
            let status = Status::parse(&status)
                .ok_or_else(|| PersistError::Message(format!("unknown status {status:?} for {photo}")))?;
            out.push(PhotoStatusRow {
                photo: PathBuf::from(photo),
                source_folder: PathBuf::from(source_folder),
                location: PathBuf::from(location),
                status,
            });
        }
        Ok(out)
    }

    /// Rating per content identity, as of the latest snapshot.
    pub fn stored_ratings(&self) -> PersistResult<Vec<RatingRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT content_id, mu, sigma, comparisons, location FROM ratings ORDER BY content_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(RatingRow {
                content_id: row.get(0)?,
                mu: row.get(1)?,
                sigma: row.get(2)?,
                comparisons: row.get(3)?,
                location: PathBuf::from(row.get::<_, String>(4)?),
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn load_latest_snapshot(&self) -> PersistResult<Option<SessionSnapshotV1>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let env: SnapshotEnvelope = serde_json::from_slice(&payload)?;
        if env.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::Message(
                "unsupported snapshot format".to_string(),
            ));
        }
        Ok(Some(env.snapshot))
    }
}

impl JournalSink for SqliteJournal {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        if ops.is_empty() {
            return self.latest_seq();
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events(seq, ts_ms, kind, subject, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for stored in ops {
                let payload = serde_json::to_vec(&StoredOpEnvelope::new(stored.clone()))?;
                stmt.execute(params![
                    stored.seq as i64,
                    stored.ts_ms as i64,
                    stored.op.kind(),
                    op_subject(&stored.op),
                    payload,
                ])?;
            }
        }
        tx.commit()?;

        Ok(ops.last().map(|o| o.seq).unwrap_or(0))
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &SessionSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        SqliteJournal::write_snapshot(self, snapshot, last_seq)
    }

    fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        SqliteJournal::compact_through(self, seq)
    }
}

/// Identity an op is about, for ad-hoc queries against the journal.
fn op_subject(op: &Op) -> Option<String> {
    match op {
        Op::Registered { photo } => Some(path_text(&photo.id)),
        Op::Decided { record } => Some(path_text(&record.photo)),
        Op::DecisionUndone { photo, .. } | Op::Requeued { photo } => Some(path_text(photo)),
        Op::FolderRetired { folder } => Some(path_text(folder)),
        Op::PoolEntered { entry } => Some(entry.content_id.clone()),
        Op::PoolLeft { content_id } => Some(content_id.clone()),
        Op::Compared { record, .. } => Some(format!("{}:{}", record.left, record.right)),
        Op::ComparisonUndone { .. } => None,
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn decode_stored_op_payload(payload: &[u8]) -> Result<StoredOp, String> {
    let envelope = serde_json::from_slice::<StoredOpEnvelope>(payload)
        .map_err(|e| format!("op payload decode failed: {e}"))?;
    if envelope.format_version != crate::op::OP_FORMAT_VERSION {
        return Err(format!(
            "unsupported op format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.stored)
}
