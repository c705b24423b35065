//! The live vault: an in-memory SQLite database loaded from, and persisted
//! back to, one encrypted snapshot file.

use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rusqlite::serialize::OwnedData;
use rusqlite::{Connection, DatabaseName};
use tokio::sync::watch;

use crate::debounce::{DebounceConfig, Debouncer};
use crate::error::{Result, StorageError};
use crate::files::EncryptedFileController;

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

type FlushError = Arc<Mutex<Option<StorageError>>>;

/// Cloneable handle; every clone shares one connection and one scheduler.
#[derive(Clone)]
pub struct VaultDatabase {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Arc<Mutex<Connection>>,
    file: EncryptedFileController,
    revision: watch::Sender<u64>,
    debouncer: Debouncer<u64>,
    flush_error: FlushError,
    /// Highest revision known to be on disk.
    persisted: Arc<AtomicU64>,
    closed: AtomicBool,
}

impl VaultDatabase {
    /// Load the snapshot behind `file` (an absent or empty snapshot starts a
    /// fresh database) and start autosaving with `autosave`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(file: EncryptedFileController, autosave: DebounceConfig) -> Result<Self> {
        let snapshot = file.get().await?.unwrap_or_default();
        let conn = Arc::new(Mutex::new(load_snapshot(&snapshot)?));
        drop(snapshot);

        let flush_error: FlushError = Arc::new(Mutex::new(None));
        let persisted = Arc::new(AtomicU64::new(0));
        let debouncer = {
            let conn = conn.clone();
            let file = file.clone();
            let flush_error = flush_error.clone();
            let persisted = persisted.clone();
            Debouncer::new(autosave, move |revision: u64| {
                let conn = conn.clone();
                let file = file.clone();
                let flush_error = flush_error.clone();
                let persisted = persisted.clone();
                async move {
                    match persist(&conn, &file).await {
                        Ok(len) => {
                            persisted.fetch_max(revision, Ordering::SeqCst);
                            log::debug!(
                                "persisted vault revision {revision} ({len} bytes) to {}",
                                file.path()
                            );
                        }
                        Err(err) => {
                            log::error!("failed to persist vault revision {revision}: {err}");
                            *flush_error.lock().expect("flush error mutex poisoned") = Some(err);
                        }
                    }
                }
            })
        };

        let (revision, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(Inner {
                conn,
                file,
                revision,
                debouncer,
                flush_error,
                persisted,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        self.ensure_open()?;
        let conn = self.inner.conn.lock().expect("vault mutex poisoned");
        Ok(f(&conn)?)
    }

    /// Run a mutation, publish the new revision and schedule a flush.
    ///
    /// A failed mutation publishes nothing.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>) -> Result<T> {
        self.ensure_open()?;
        let out = {
            let mut conn = self.inner.conn.lock().expect("vault mutex poisoned");
            f(&mut conn)?
        };
        let mut revision = 0;
        self.inner.revision.send_modify(|rev| {
            *rev += 1;
            revision = *rev;
        });
        self.inner.debouncer.schedule(revision);
        Ok(out)
    }

    /// Notified with the new revision after every successful mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Number of snapshot writes performed by the scheduler.
    pub fn flush_count(&self) -> u64 {
        self.inner.debouncer.flush_count()
    }

    /// Highest revision written to the snapshot file.
    pub fn persisted_revision(&self) -> u64 {
        self.inner.persisted.load(Ordering::SeqCst)
    }

    /// True while a revision is scheduled or a failed write has not been
    /// retried successfully.
    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.debouncer.is_pending() || self.revision() > self.persisted_revision()
    }

    /// Persist everything up to the current revision now, retrying a revision
    /// whose background write failed.
    ///
    /// Fails if the current revision could not be written; the changes stay
    /// unsaved and a later `flush` tries again.
    pub async fn flush(&self) -> Result<()> {
        let revision = self.revision();
        if revision > self.persisted_revision() && !self.inner.debouncer.is_pending() {
            self.inner.debouncer.schedule(revision);
        }
        self.inner.debouncer.flush().await;

        let failure = self.take_flush_error();
        if self.persisted_revision() >= revision {
            if let Err(err) = failure {
                log::debug!("earlier vault write failure superseded: {err}");
            }
            return Ok(());
        }
        failure
    }

    /// Final flush, then stop autosaving. Later calls to `read`/`mutate` fail
    /// with [`StorageError::DatabaseClosed`]. Closing twice is a no-op.
    ///
    /// If the final flush fails the database stays open, so the close can be
    /// retried once the storage recovers.
    pub async fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.flush().await?;
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.debouncer.close().await;
        log::debug!("closed vault {}", self.inner.file.path());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StorageError::DatabaseClosed);
        }
        Ok(())
    }

    fn take_flush_error(&self) -> Result<()> {
        match self
            .inner
            .flush_error
            .lock()
            .expect("flush error mutex poisoned")
            .take()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for VaultDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultDatabase")
            .field("file", &self.inner.file.path())
            .field("revision", &self.revision())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Serialize the connection as it is now and write it through `file`.
async fn persist(conn: &Mutex<Connection>, file: &EncryptedFileController) -> Result<usize> {
    let image = {
        let conn = conn.lock().expect("vault mutex poisoned");
        let data = conn.serialize(DatabaseName::Main)?;
        data.to_vec()
    };
    let len = image.len();
    file.write(image).await?;
    Ok(len)
}

fn load_snapshot(bytes: &[u8]) -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    if bytes.is_empty() {
        return Ok(conn);
    }
    if !bytes.starts_with(SQLITE_HEADER) {
        return Err(StorageError::CorruptSnapshot(
            "missing SQLite header".to_string(),
        ));
    }

    conn.deserialize(DatabaseName::Main, sqlite_owned_copy(bytes)?, false)
        .map_err(|err| StorageError::CorruptSnapshot(err.to_string()))?;
    // Deserializing only checks the header; touching the schema reads the pages.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map_err(|err| StorageError::CorruptSnapshot(err.to_string()))?;
    Ok(conn)
}

/// Copy `bytes` into a buffer owned by SQLite's allocator, as `deserialize` requires.
fn sqlite_owned_copy(bytes: &[u8]) -> Result<OwnedData> {
    let raw = unsafe { rusqlite::ffi::sqlite3_malloc64(bytes.len() as u64) } as *mut u8;
    let ptr = NonNull::new(raw).ok_or_else(|| {
        StorageError::Io(io::Error::new(
            io::ErrorKind::OutOfMemory,
            "sqlite3_malloc64 failed",
        ))
    })?;
    // SAFETY: `ptr` was just allocated by sqlite3_malloc64 with room for
    // `bytes.len()` bytes, and ownership moves into `OwnedData`.
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
        Ok(OwnedData::from_raw_nonnull(ptr, bytes.len()))
    }
}
