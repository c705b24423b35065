//! A dedicated thread that owns the key schedule and serves encrypt/decrypt
//! requests in submission order.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::processor::CipherProcessor;

#[derive(Debug, Clone, Copy)]
enum Operation {
    Encrypt,
    Decrypt,
}

struct Request {
    op: Operation,
    data: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<u8>>>,
}

struct WorkerInner {
    sender: Mutex<Option<mpsc::UnboundedSender<Request>>>,
    /// Resolves when the thread has dropped the cipher and exited.
    stopped: Mutex<Option<oneshot::Receiver<()>>>,
}

impl WorkerInner {
    fn close_queue(&self) {
        // Dropping the sender ends the worker loop once queued requests drain.
        self.sender
            .lock()
            .expect("crypto worker mutex poisoned")
            .take();
    }
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

/// Cloneable handle to the worker thread. Every clone talks to the same thread.
#[derive(Clone)]
pub struct CryptoWorker {
    inner: Arc<WorkerInner>,
}

impl CryptoWorker {
    /// Move `cipher` onto a new thread. The key material never leaves that thread
    /// and is dropped there when the worker stops.
    pub fn spawn<C>(cipher: C) -> Result<Self>
    where
        C: CipherProcessor + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Request>();
        let (stopped_tx, stopped_rx) = oneshot::channel();
        // Detached: `shutdown` waits on `stopped` instead of joining.
        thread::Builder::new()
            .name("notevault-crypto".to_string())
            .spawn(move || {
                while let Some(mut request) = receiver.blocking_recv() {
                    let result = match request.op {
                        Operation::Encrypt => cipher.encrypt(&request.data),
                        Operation::Decrypt => cipher.decrypt(&request.data),
                    };
                    request.data.zeroize();
                    // The caller may have stopped waiting; that is not an error here.
                    let _ = request.reply.send(result);
                }
                drop(cipher);
                log::debug!("crypto worker stopped");
                let _ = stopped_tx.send(());
            })?;

        Ok(Self {
            inner: Arc::new(WorkerInner {
                sender: Mutex::new(Some(sender)),
                stopped: Mutex::new(Some(stopped_rx)),
            }),
        })
    }

    pub async fn encrypt(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        self.submit(Operation::Encrypt, data).await
    }

    pub async fn decrypt(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        self.submit(Operation::Decrypt, data).await
    }

    async fn submit(&self, op: Operation, data: Vec<u8>) -> Result<Vec<u8>> {
        let (reply, response) = oneshot::channel();
        {
            let guard = self
                .inner
                .sender
                .lock()
                .expect("crypto worker mutex poisoned");
            let sender = guard.as_ref().ok_or(CryptoError::WorkerTerminated)?;
            sender
                .send(Request { op, data, reply })
                .map_err(|_| CryptoError::WorkerTerminated)?;
        }
        response.await.map_err(|_| CryptoError::WorkerTerminated)?
    }

    /// Stop accepting requests. Returns immediately; the thread serves the
    /// requests already queued, drops the cipher and exits.
    ///
    /// Idempotent. Requests issued afterwards fail with
    /// [`CryptoError::WorkerTerminated`].
    pub fn terminate(&self) {
        self.inner.close_queue();
    }

    /// [`CryptoWorker::terminate`], then wait until the thread has dropped the
    /// key material and exited. Only the first caller waits.
    pub async fn shutdown(&self) {
        self.terminate();
        let stopped = self
            .inner
            .stopped
            .lock()
            .expect("crypto worker mutex poisoned")
            .take();
        if let Some(stopped) = stopped {
            if stopped.await.is_err() {
                log::error!("crypto worker thread panicked");
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.inner
            .sender
            .lock()
            .expect("crypto worker mutex poisoned")
            .is_none()
    }
}

impl fmt::Debug for CryptoWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoWorker")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::time::{Duration, Instant};

    struct Reverse;

    impl CipherProcessor for Reverse {
        fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
            Ok(data.iter().rev().copied().collect())
        }

        fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
            self.encrypt(data)
        }
    }

    #[tokio::test]
    async fn serves_requests() {
        let worker = CryptoWorker::spawn(Reverse).expect("spawn");
        assert_eq!(worker.encrypt(b"abc".to_vec()).await.expect("encrypt"), b"cba");
        assert_eq!(worker.decrypt(b"cba".to_vec()).await.expect("decrypt"), b"abc");
    }

    #[tokio::test]
    async fn terminate_is_final_and_idempotent() {
        let worker = CryptoWorker::spawn(Reverse).expect("spawn");
        let clone = worker.clone();
        worker.terminate();
        worker.terminate();
        assert!(clone.is_terminated());
        assert!(matches!(
            clone.encrypt(b"x".to_vec()).await,
            Err(CryptoError::WorkerTerminated)
        ));
    }

    struct SlowReverse {
        started: Mutex<std_mpsc::Sender<()>>,
        delay: Duration,
        dropped: Arc<AtomicBool>,
    }

    impl CipherProcessor for SlowReverse {
        fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
            let _ = self.started.lock().expect("started").send(());
            thread::sleep(self.delay);
            Reverse.encrypt(data)
        }

        fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
            self.encrypt(data)
        }
    }

    impl Drop for SlowReverse {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn terminate_returns_while_queued_work_finishes() {
        let (started_tx, started_rx) = std_mpsc::channel();
        let dropped = Arc::new(AtomicBool::new(false));
        let delay = Duration::from_millis(300);
        let worker = CryptoWorker::spawn(SlowReverse {
            started: Mutex::new(started_tx),
            delay,
            dropped: dropped.clone(),
        })
        .expect("spawn");

        let in_flight = tokio::spawn({
            let worker = worker.clone();
            async move { worker.encrypt(b"abc".to_vec()).await }
        });
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("request reached the worker");

        let before = Instant::now();
        worker.terminate();
        assert!(before.elapsed() < delay, "terminate must not wait for the thread");

        assert_eq!(in_flight.await.expect("join").expect("encrypt"), b"cba");
        worker.shutdown().await;
        assert!(dropped.load(Ordering::SeqCst), "cipher dropped once shutdown returns");
        // A second shutdown has nothing left to wait for.
        worker.shutdown().await;
    }
}
