use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::info;

use quizsync_core::errors::{Result, StorageError as LocalStoreError};
use quizsync_core::store::{Collection, LocalStore, Record, ALL_COLLECTIONS};

use super::model::{LocalCollectionDB, LocalRecordDB};
use crate::db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle,
};
use crate::errors::StorageError;
use crate::schema::{local_collections, local_records};

fn register_collections(conn: &mut SqliteConnection) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows: Vec<LocalCollectionDB> = ALL_COLLECTIONS
        .iter()
        .map(|collection| LocalCollectionDB {
            name: collection.as_str().to_string(),
            created_at: now.clone(),
        })
        .collect();
    diesel::insert_or_ignore_into(local_collections::table)
        .values(&rows)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

fn to_record(row: LocalRecordDB) -> Result<Record> {
    let payload = serde_json::from_str(&row.payload).map_err(|e| {
        LocalStoreError::Corrupt(format!(
            "Record '{}/{}' is not valid JSON: {}",
            row.collection, row.id, e
        ))
    })?;
    Ok(Record {
        id: row.id,
        payload,
    })
}

#[derive(Clone)]
struct OpenDatabase {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

/// `LocalStore` backed by a single SQLite file in the app data directory.
pub struct SqliteLocalStore {
    app_data_dir: String,
    db: RwLock<Option<OpenDatabase>>,
}

impl SqliteLocalStore {
    /// Opens (creating if needed) the database under `app_data_dir`.
    pub fn open(app_data_dir: impl Into<String>) -> Result<Self> {
        let app_data_dir = app_data_dir.into();
        let db = Self::connect(&app_data_dir)?;
        Ok(Self {
            app_data_dir,
            db: RwLock::new(Some(db)),
        })
    }

    pub fn app_data_dir(&self) -> &str {
        &self.app_data_dir
    }

    fn connect(app_data_dir: &str) -> Result<OpenDatabase> {
        let db_path = init(app_data_dir)?;
        run_migrations(&db_path)?;
        let pool = create_pool(&db_path)?;
        let mut conn = get_connection(&pool)?;
        register_collections(&mut conn)?;
        let writer = spawn_writer(pool.as_ref().clone());
        info!("[QuizSync] Local store opened at {}", db_path);
        Ok(OpenDatabase { pool, writer })
    }

    fn database(&self) -> Result<OpenDatabase> {
        let guard = self
            .db
            .read()
            .map_err(|_| LocalStoreError::Internal("SQLite store lock is poisoned".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| LocalStoreError::Unavailable("SQLite store is closed".to_string()).into())
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn init(&self) -> Result<()> {
        let mut guard = self
            .db
            .write()
            .map_err(|_| LocalStoreError::Internal("SQLite store lock is poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(Self::connect(&self.app_data_dir)?);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self
            .db
            .write()
            .map_err(|_| LocalStoreError::Internal("SQLite store lock is poisoned".to_string()))?;
        // Dropping the last WriteHandle stops the writer thread after queued jobs.
        if guard.take().is_some() {
            info!("[QuizSync] Local store closed");
        }
        Ok(())
    }

    async fn put(&self, collection: Collection, record: Record) -> Result<()> {
        let db = self.database()?;
        let row = LocalRecordDB {
            collection: collection.as_str().to_string(),
            id: record.id,
            payload: serde_json::to_string(&record.payload)?,
            updated_at: Utc::now().to_rfc3339(),
        };
        db.writer
            .exec(move |conn| {
                diesel::insert_into(local_records::table)
                    .values(&row)
                    .on_conflict((local_records::collection, local_records::id))
                    .do_update()
                    .set((
                        local_records::payload.eq(row.payload.clone()),
                        local_records::updated_at.eq(row.updated_at.clone()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let db = self.database()?;
        let mut conn = get_connection(&db.pool)?;
        let row = local_records::table
            .filter(local_records::collection.eq(collection.as_str()))
            .filter(local_records::id.eq(id))
            .first::<LocalRecordDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(to_record).transpose()
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>> {
        let db = self.database()?;
        let mut conn = get_connection(&db.pool)?;
        let rows = local_records::table
            .filter(local_records::collection.eq(collection.as_str()))
            .order(local_records::id.asc())
            .load::<LocalRecordDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(to_record).collect()
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let db = self.database()?;
        let id = id.to_string();
        db.writer
            .exec(move |conn| {
                diesel::delete(
                    local_records::table
                        .filter(local_records::collection.eq(collection.as_str()))
                        .filter(local_records::id.eq(id)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn clear(&self, collection: Collection) -> Result<()> {
        let db = self.database()?;
        db.writer
            .exec(move |conn| {
                diesel::delete(
                    local_records::table.filter(local_records::collection.eq(collection.as_str())),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn clear_all(&self) -> Result<()> {
        let db = self.database()?;
        db.writer
            .exec(|conn| {
                let removed = diesel::delete(local_records::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                info!("[QuizSync] Cleared {} local records", removed);
                Ok(())
            })
            .await
    }
}
