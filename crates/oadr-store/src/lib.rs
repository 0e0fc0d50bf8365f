//! Crash-safe persistence for accepted events: a single SQLite table
//! holding the raw `eiEvent` bytes plus the two columns (`vtn_id`,
//! `event_id`, `mod_num`) needed to query and mutate without re-parsing
//! XML on every pass of the control loop.

mod error;

pub use error::StoreError;

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use oadr_model::{EventKey, StoredEvent};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_active_events(&self) -> Result<Vec<StoredEvent>, StoreError>;
    async fn get(&self, key: &EventKey) -> Result<Option<StoredEvent>, StoreError>;
    async fn upsert(&self, key: &EventKey, modification_number: i64, raw_xml: &[u8]) -> Result<(), StoreError>;
    async fn replace_all(&self, records: &[StoredEvent]) -> Result<(), StoreError>;
    async fn remove(&self, keys: &[EventKey]) -> Result<usize, StoreError>;
}

#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Opens (creating if absent) the SQLite file at `path` and runs the
    /// embedded migration, same shape as `database::PgDatabase::connect`
    /// but against a file instead of a server - a VEN is a single-tenant
    /// edge agent, not a multi-origin aggregator.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(StoreError::Connect)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::Connect)?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

fn row_to_event(row: sqlx::sqlite::SqliteRow) -> Result<StoredEvent, StoreError> {
    let vtn_id: String = row.get("vtn_id");
    let event_id: String = row.get("event_id");
    let modification_number: i64 = row.get("mod_num");
    let raw_xml: String = row.get("raw_xml");
    Ok(StoredEvent {
        key: EventKey::new(vtn_id, event_id),
        modification_number,
        raw_xml: raw_xml.into_bytes(),
    })
}

fn utf8(raw_xml: &[u8]) -> Result<&str, StoreError> {
    std::str::from_utf8(raw_xml).map_err(|_| StoreError::InvalidEncoding)
}

const UPSERT: &str = "INSERT INTO event (vtn_id, event_id, mod_num, raw_xml) VALUES (?1, ?2, ?3, ?4) \
     ON CONFLICT(vtn_id, event_id) DO UPDATE SET mod_num = excluded.mod_num, raw_xml = excluded.raw_xml";

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn get_active_events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query("SELECT vtn_id, event_id, mod_num, raw_xml FROM event")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Query)?;
        rows.into_iter().map(row_to_event).collect()
    }

    async fn get(&self, key: &EventKey) -> Result<Option<StoredEvent>, StoreError> {
        let row = sqlx::query("SELECT vtn_id, event_id, mod_num, raw_xml FROM event WHERE vtn_id = ?1 AND event_id = ?2")
            .bind(&key.vtn_id)
            .bind(&key.event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Query)?;
        row.map(row_to_event).transpose()
    }

    async fn upsert(&self, key: &EventKey, modification_number: i64, raw_xml: &[u8]) -> Result<(), StoreError> {
        sqlx::query(UPSERT)
            .bind(&key.vtn_id)
            .bind(&key.event_id)
            .bind(modification_number)
            .bind(utf8(raw_xml)?)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Query)?;
        Ok(())
    }

    /// Replaces the whole table with `records` in one transaction - used
    /// after a poll that returns the VTN's complete active-event set.
    async fn replace_all(&self, records: &[StoredEvent]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Query)?;
        sqlx::query("DELETE FROM event").execute(&mut *tx).await.map_err(StoreError::Query)?;
        for record in records {
            sqlx::query(UPSERT)
                .bind(&record.key.vtn_id)
                .bind(&record.key.event_id)
                .bind(record.modification_number)
                .bind(utf8(&record.raw_xml)?)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Query)?;
        }
        tx.commit().await.map_err(StoreError::Query)?;
        Ok(())
    }

    async fn remove(&self, keys: &[EventKey]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Query)?;
        let mut removed = 0usize;
        for key in keys {
            let result = sqlx::query("DELETE FROM event WHERE vtn_id = ?1 AND event_id = ?2")
                .bind(&key.vtn_id)
                .bind(&key.event_id)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Query)?;
            removed += result.rows_affected() as usize;
        }
        tx.commit().await.map_err(StoreError::Query)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(event_id: &str, mod_num: i64) -> StoredEvent {
        StoredEvent {
            key: EventKey::new("vtn_1", event_id),
            modification_number: mod_num,
            raw_xml: format!("<eiEvent id=\"{event_id}\"/>").into_bytes(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEventStore::connect(&dir.path().join("ven.db")).await.unwrap();
        let key = EventKey::new("vtn_1", "evt_1");
        store.upsert(&key, 0, b"<eiEvent/>").await.unwrap();

        let found = store.get(&key).await.unwrap().unwrap();
        assert_eq!(found.modification_number, 0);
        assert_eq!(found.raw_xml, b"<eiEvent/>");
    }

    #[tokio::test]
    async fn upsert_on_existing_key_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEventStore::connect(&dir.path().join("ven.db")).await.unwrap();
        let key = EventKey::new("vtn_1", "evt_1");
        store.upsert(&key, 0, b"<eiEvent mod=\"0\"/>").await.unwrap();
        store.upsert(&key, 1, b"<eiEvent mod=\"1\"/>").await.unwrap();

        let all = store.get_active_events().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].modification_number, 1);
    }

    #[tokio::test]
    async fn replace_all_drops_events_missing_from_the_new_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEventStore::connect(&dir.path().join("ven.db")).await.unwrap();
        store.upsert(&EventKey::new("vtn_1", "stale"), 0, b"<eiEvent/>").await.unwrap();

        store.replace_all(&[sample("fresh", 0)]).await.unwrap();

        let all = store.get_active_events().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key.event_id, "fresh");
    }

    #[tokio::test]
    async fn remove_reports_how_many_rows_disappeared() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEventStore::connect(&dir.path().join("ven.db")).await.unwrap();
        store.upsert(&EventKey::new("vtn_1", "a"), 0, b"<eiEvent/>").await.unwrap();
        store.upsert(&EventKey::new("vtn_1", "b"), 0, b"<eiEvent/>").await.unwrap();

        let removed = store
            .remove(&[EventKey::new("vtn_1", "a"), EventKey::new("vtn_1", "missing")])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get_active_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn survives_a_reopen_of_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ven.db");
        {
            let store = SqliteEventStore::connect(&path).await.unwrap();
            store.upsert(&EventKey::new("vtn_1", "evt_1"), 2, b"<eiEvent/>").await.unwrap();
        }
        let reopened = SqliteEventStore::connect(&path).await.unwrap();
        let found = reopened.get(&EventKey::new("vtn_1", "evt_1")).await.unwrap().unwrap();
        assert_eq!(found.modification_number, 2);
    }
}
