//! Debounced, deadline-bounded flushing.
//!
//! A [`Debouncer`] holds at most one pending value. Each `schedule` replaces the
//! value and restarts the quiet timer; the deadline timer starts with the first
//! value after an idle period and is not restarted. Whichever timer fires first
//! hands the value to the flush handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Quiet period after the latest value.
    pub wait: Duration,
    /// Upper bound from the first pending value to its flush.
    pub deadline: Option<Duration>,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(300),
            deadline: Some(Duration::from_millis(2000)),
        }
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Handler<T> = Box<dyn Fn(T) -> BoxFuture + Send + Sync>;

struct State<T> {
    pending: Option<T>,
    quiet_at: Option<Instant>,
    deadline_at: Option<Instant>,
    closed: bool,
}

impl<T> State<T> {
    fn next_fire(&self) -> Option<Instant> {
        match (self.quiet_at, self.deadline_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn clear(&mut self) -> Option<T> {
        self.quiet_at = None;
        self.deadline_at = None;
        self.pending.take()
    }
}

struct Shared<T> {
    config: DebounceConfig,
    state: Mutex<State<T>>,
    wake: Notify,
    flush_lock: tokio::sync::Mutex<()>,
    flushes: AtomicU64,
    handler: Handler<T>,
}

impl<T: Send + 'static> Shared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.state.lock().expect("debounce mutex poisoned")
    }

    async fn drive(self: Arc<Self>) {
        loop {
            let next = {
                let state = self.lock();
                if state.closed {
                    break;
                }
                state.next_fire()
            };
            match next {
                None => self.wake.notified().await,
                Some(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => self.flush_due().await,
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }
        log::debug!("debounce driver stopped");
    }

    async fn flush_due(&self) {
        let _guard = self.flush_lock.lock().await;
        let value = {
            let mut state = self.lock();
            match state.next_fire() {
                Some(at) if at <= Instant::now() => state.clear(),
                _ => None,
            }
        };
        if let Some(value) = value {
            self.run(value).await;
        }
    }

    async fn flush_now(&self) {
        let _guard = self.flush_lock.lock().await;
        let value = self.lock().clear();
        if let Some(value) = value {
            self.run(value).await;
        }
    }

    /// Callers hold `flush_lock`.
    async fn run(&self, value: T) {
        (self.handler)(value).await;
        let count = self.flushes.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("debounced flush #{count} complete");
    }
}

pub struct Debouncer<T> {
    shared: Arc<Shared<T>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Start the scheduler. Must be called from within a tokio runtime.
    pub fn new<F, Fut>(config: DebounceConfig, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(State {
                pending: None,
                quiet_at: None,
                deadline_at: None,
                closed: false,
            }),
            wake: Notify::new(),
            flush_lock: tokio::sync::Mutex::new(()),
            flushes: AtomicU64::new(0),
            handler: Box::new(move |value| -> BoxFuture { Box::pin(handler(value)) }),
        });
        let driver = tokio::spawn(shared.clone().drive());
        Self {
            shared,
            driver: Mutex::new(Some(driver)),
        }
    }

    pub fn config(&self) -> DebounceConfig {
        self.shared.config
    }

    /// Replace the pending value. Ignored once the debouncer is closed.
    pub fn schedule(&self, value: T) {
        {
            let mut state = self.shared.lock();
            if state.closed {
                log::debug!("ignoring value scheduled on a closed debouncer");
                return;
            }
            let now = Instant::now();
            state.pending = Some(value);
            state.quiet_at = Some(now + self.shared.config.wait);
            if state.deadline_at.is_none() {
                state.deadline_at = self.shared.config.deadline.map(|d| now + d);
            }
        }
        self.shared.wake.notify_one();
    }

    /// Drop the pending value and stop both timers. A flush that is already
    /// running is not interrupted.
    pub fn cancel(&self) {
        self.shared.lock().clear();
        self.shared.wake.notify_one();
    }

    /// Flush the pending value now, after any flush already in progress.
    pub async fn flush(&self) {
        self.shared.flush_now().await;
    }

    /// Cancel and stop the driver. Waits for an in-flight flush to finish.
    pub async fn close(&self) {
        self.shut_down();
        let driver = self.driver.lock().expect("debounce mutex poisoned").take();
        if let Some(driver) = driver {
            if let Err(err) = driver.await {
                log::error!("debounce driver failed: {err}");
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn flush_count(&self) -> u64 {
        self.shared.flushes.load(Ordering::SeqCst)
    }

    fn shut_down(&self) {
        {
            let mut state = self.shared.lock();
            state.closed = true;
            state.clear();
        }
        self.shared.wake.notify_one();
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.closed = true;
            state.quiet_at = None;
            state.deadline_at = None;
            state.pending = None;
        }
        self.shared.wake.notify_one();
    }
}
