//! Durable store adapter for position history.
//!
//! rusqlite is synchronous, so all access goes through spawn_blocking
//! against the shared connection. The hot ingestion path never waits on
//! SQLite: appends flow through a bounded queue into a single writer task,
//! which preserves arrival order and logs-and-continues on failure.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::db::models::UserRow;
use crate::db::DbPool;
use crate::registry::PositionSample;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("store task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Append one sample to the locations table.
pub fn append_sample(db: &DbPool, sample: &PositionSample) -> Result<(), StoreError> {
    let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
    conn.execute(
        "INSERT INTO locations (identity, lat, lon, ts) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![sample.identity, sample.lat, sample.lon, sample.ts],
    )?;
    Ok(())
}

/// Most recent stored samples for an identity, newest first.
/// Secondary order on rowid keeps same-second samples stable.
pub fn query_recent(
    db: &DbPool,
    identity: &str,
    limit: usize,
) -> Result<Vec<PositionSample>, StoreError> {
    let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
    let mut stmt = conn.prepare(
        "SELECT identity, lat, lon, ts FROM locations
         WHERE identity = ?1 ORDER BY ts DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![identity, limit as i64], |row| {
        Ok(PositionSample {
            identity: row.get(0)?,
            lat: row.get(1)?,
            lon: row.get(2)?,
            ts: row.get(3)?,
        })
    })?;
    let mut samples = Vec::new();
    for row in rows {
        samples.push(row?);
    }
    Ok(samples)
}

/// Insert or update a principal in the user store.
/// This is the identity-store write used by the operator mint path.
pub fn upsert_user(db: &DbPool, identity: &str, is_admin: bool) -> Result<(), StoreError> {
    let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (identity, is_admin, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(identity) DO UPDATE SET is_admin = excluded.is_admin",
        rusqlite::params![identity, is_admin as i64, now],
    )?;
    Ok(())
}

/// Look up a principal in the user store.
pub fn get_user(db: &DbPool, identity: &str) -> Result<Option<UserRow>, StoreError> {
    use rusqlite::OptionalExtension;

    let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
    let user = conn
        .query_row(
            "SELECT identity, is_admin, created_at FROM users WHERE identity = ?1",
            [identity],
            |row| {
                Ok(UserRow {
                    identity: row.get(0)?,
                    is_admin: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Whether the identity exists in the user store with the admin role.
/// The admin WS entry point re-checks this after decoding the token.
pub fn user_is_admin(db: &DbPool, identity: &str) -> Result<bool, StoreError> {
    Ok(get_user(db, identity)?.is_some_and(|u| u.is_admin))
}

/// Spawn the single store-writer task and return its input queue.
///
/// One consumer appending sequentially keeps samples in arrival order, per
/// identity and globally. The queue is bounded: when it is full the
/// ingestion path drops the append rather than blocking on storage.
/// Append failures are logged; the in-memory path never depends on them.
pub fn spawn_store_writer(db: DbPool, capacity: usize) -> mpsc::Sender<PositionSample> {
    let (tx, mut rx) = mpsc::channel::<PositionSample>(capacity);

    tokio::spawn(async move {
        while let Some(sample) = rx.recv().await {
            let db = db.clone();
            let result = tokio::task::spawn_blocking(move || append_sample(&db, &sample))
                .await
                .map_err(StoreError::from)
                .and_then(|r| r);
            if let Err(e) = result {
                tracing::warn!(error = %e, "Durable append failed, continuing");
            }
        }
        tracing::debug!("Store writer queue closed, writer task exiting");
    });

    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn test_db() -> DbPool {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::db::migrations::migrations().to_latest(&mut conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn sample(identity: &str, n: i64) -> PositionSample {
        PositionSample {
            identity: identity.to_string(),
            lat: 37.0 + n as f64,
            lon: -122.0 - n as f64,
            ts: 1_700_000_000 + n,
        }
    }

    #[test]
    fn query_recent_is_newest_first_and_bounded() {
        let db = test_db();
        for n in 0..10 {
            append_sample(&db, &sample("u1", n)).unwrap();
        }
        append_sample(&db, &sample("other", 0)).unwrap();

        let recent = query_recent(&db, "u1", 4).unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0], sample("u1", 9));
        assert_eq!(recent[3], sample("u1", 6));
    }

    #[test]
    fn query_recent_breaks_ts_ties_by_insertion() {
        let db = test_db();
        let mut a = sample("u1", 0);
        let mut b = sample("u1", 1);
        b.ts = a.ts;
        a.lat = 1.0;
        b.lat = 2.0;
        append_sample(&db, &a).unwrap();
        append_sample(&db, &b).unwrap();

        let recent = query_recent(&db, "u1", 10).unwrap();
        assert_eq!(recent[0].lat, 2.0);
        assert_eq!(recent[1].lat, 1.0);
    }

    #[test]
    fn upsert_user_sets_and_updates_admin_flag() {
        let db = test_db();
        assert!(!user_is_admin(&db, "ghost").unwrap());

        upsert_user(&db, "u1", false).unwrap();
        assert!(!user_is_admin(&db, "u1").unwrap());

        upsert_user(&db, "u1", true).unwrap();
        assert!(user_is_admin(&db, "u1").unwrap());

        let row = get_user(&db, "u1").unwrap().unwrap();
        assert_eq!(row.identity, "u1");
        assert!(!row.created_at.is_empty());
    }

    #[tokio::test]
    async fn store_writer_appends_in_order() {
        let db = test_db();
        let tx = spawn_store_writer(db.clone(), 64);
        for n in 0..5 {
            tx.send(sample("u1", n)).await.unwrap();
        }
        drop(tx);

        // Writer drains sequentially; poll until all rows land.
        for _ in 0..50 {
            let rows = query_recent(&db, "u1", 10).unwrap();
            if rows.len() == 5 {
                assert_eq!(rows[0], sample("u1", 4));
                assert_eq!(rows[4], sample("u1", 0));
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("store writer did not persist all samples");
    }
}
