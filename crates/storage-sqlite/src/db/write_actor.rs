//! Single writer thread. Mutations are queued and each runs inside its own
//! immediate transaction.

use diesel::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use quizsync_core::{Error, Result};

use super::{get_connection, DbPool};
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&DbPool) + Send + 'static>;

enum TxError {
    Storage(StorageError),
    Job(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Storage(StorageError::from(err))
    }
}

impl From<TxError> for Error {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Storage(err) => err.into(),
            TxError::Job(err) => err,
        }
    }
}

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Runs `job` on the writer thread inside a transaction and waits for it.
    /// An `Err` from the job rolls the transaction back.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let task: Job = Box::new(move |pool: &DbPool| {
            let outcome = get_connection(pool).and_then(|mut conn| {
                conn.immediate_transaction::<T, TxError, _>(|tx| job(tx).map_err(TxError::Job))
                    .map_err(Error::from)
            });
            // Caller may have gone away; nothing to do then.
            let _ = reply_tx.send(outcome);
        });

        self.tx
            .send(task)
            .map_err(|_| StorageError::WriterClosed("writer thread has exited".to_string()))?;
        reply_rx
            .await
            .map_err(|_| StorageError::WriterClosed("write job was dropped".to_string()))?
    }
}

/// Starts the writer thread. It exits once every `WriteHandle` is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    let spawned = std::thread::Builder::new()
        .name("quizsync-db-writer".to_string())
        .spawn(move || {
            debug!("[QuizSync] Database writer started");
            while let Some(job) = rx.blocking_recv() {
                job(&pool);
            }
            debug!("[QuizSync] Database writer stopped");
        });
    if let Err(err) = spawned {
        // The receiver is gone with the closure; exec() reports WriterClosed.
        error!("[QuizSync] Failed to start database writer: {}", err);
    }
    WriteHandle { tx }
}
