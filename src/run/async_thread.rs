use anyhow::{Context, Result, anyhow};
use log::{debug, trace};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::Notify;
use tokio::task::JoinSet;

use super::signals::block_interrupts_on_this_thread;

/// Returned by a unit when it noticed cancellation and gave up. Errors of
/// this type never reach the owner of the unit.
#[derive(Debug, thiserror::Error)]
#[error("cancelled")]
pub struct Cancelled;

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation flag shared between a unit and whoever owns it.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never blocks, safe to call from any thread.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancellationToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// What a unit gets to work with: its cancellation token and a registry of
/// child tasks. Children are aborted when the unit is cancelled or finishes.
#[derive(Clone)]
pub struct UnitContext {
    token: CancellationToken,
    tasks: Arc<Mutex<JoinSet<Result<()>>>>,
}

impl UnitContext {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks
            .lock()
            .expect("Failed to lock task registry")
            .spawn(task);
    }

    /// Waits for every child spawned so far, returning the first failure.
    pub async fn join_all(&self) -> Result<()> {
        let mut tasks = std::mem::take(
            &mut *self.tasks.lock().expect("Failed to lock task registry"),
        );
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(Cancelled.into()),
                Err(e) => Err(anyhow!("task panicked: {}", e)),
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn abort_all(&self) {
        let mut tasks = std::mem::take(
            &mut *self.tasks.lock().expect("Failed to lock task registry"),
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

enum Outcome {
    Completed,
    Cancelled,
    Failed(anyhow::Error),
}

/**
 * Runs an async unit of work on its own OS thread with a single threaded
 * runtime, so the owning thread can cancel it at any point without
 * blocking. Cancelling drops every pending await of the unit and aborts its
 * children.
 *
 * An error from the unit is handed to the owner by [`AsyncThread::finish`],
 * unless it was caused by the owner's own cancellation.
 */
pub struct AsyncThread {
    name: String,
    token: CancellationToken,
    handle: Option<JoinHandle<Outcome>>,
}

impl AsyncThread {
    pub fn start<F, Fut>(name: &str, unit: F) -> Result<AsyncThread>
    where
        F: FnOnce(UnitContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let token = CancellationToken::new();
        let thread_token = token.clone();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("failed to build async runtime")?;

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                block_interrupts_on_this_thread();
                runtime.block_on(run_unit(thread_token, unit))
            })
            .context(format!("failed to start thread {}", name))?;

        trace!("Started async thread {}", name);
        Ok(AsyncThread {
            name: name.to_string(),
            token,
            handle: Some(handle),
        })
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        debug!("Cancelling async thread {}", self.name);
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the unit without cancelling it.
    pub fn join(mut self) -> Result<()> {
        self.join_inner()
    }

    /// Cancels the unit, waits for its thread and returns its error, if any.
    pub fn finish(mut self) -> Result<()> {
        self.cancel();
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let outcome = handle
            .join()
            .unwrap_or_else(|_| Outcome::Failed(anyhow!("thread {} panicked", self.name)));
        match outcome {
            Outcome::Completed | Outcome::Cancelled => Ok(()),
            Outcome::Failed(e) => Err(e),
        }
    }
}

impl Drop for AsyncThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.token.cancel();
            let _ = self.join_inner();
        }
    }
}

async fn run_unit<F, Fut>(token: CancellationToken, unit: F) -> Outcome
where
    F: FnOnce(UnitContext) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let context = UnitContext {
        token: token.clone(),
        tasks: Arc::new(Mutex::new(JoinSet::new())),
    };

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = unit(context.clone()) => Some(result),
    };
    context.abort_all().await;

    match result {
        None => Outcome::Cancelled,
        Some(Ok(())) => Outcome::Completed,
        Some(Err(e)) if token.is_cancelled() || e.is::<Cancelled>() => {
            trace!("Suppressing error caused by cancellation: {}", e);
            Outcome::Cancelled
        }
        Some(Err(e)) => Outcome::Failed(e),
    }
}

/**
 * Runs `body` while `unit` runs on its own thread. When `body` returns the
 * unit is cancelled and joined. An error from `body` wins; otherwise an
 * error from the unit is returned.
 */
pub fn with_async_thread<U, Fut, B, T>(name: &str, unit: U, body: B) -> Result<T>
where
    U: FnOnce(UnitContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + 'static,
    B: FnOnce(&AsyncThread) -> Result<T>,
{
    let thread = AsyncThread::start(name, unit)?;
    let result = body(&thread);
    let unit_result = thread.finish();
    match result {
        Err(e) => Err(e),
        Ok(value) => unit_result.map(|_| value),
    }
}
