//! # Libris Runtime
//!
//! Executes the effects returned by reducers.
//!
//! The circulation service runs its reducer inside a storage transaction and
//! only hands the resulting effects to the runtime once the transaction has
//! committed. The runtime spawns them on the Tokio executor, tracks how many
//! are still in flight, and lets the server drain them on shutdown.
//!
//! ## Example
//!
//! ```ignore
//! use libris_runtime::EffectRunner;
//!
//! let runner = EffectRunner::new();
//! let mut handle = runner.run(effects)?;
//! handle.wait_with_timeout(Duration::from_secs(5)).await?;
//! ```

use libris_core::effect::Effect;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub mod health;

pub use health::{HealthCheck, HealthReport, HealthStatus};

/// Error types for the effect runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur while running effects
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum RuntimeError {
        /// Runtime is shutting down and not accepting new effects
        #[error("Effect runtime is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for an effect handle
        #[error("Timed out waiting for effects to complete")]
        Timeout,
    }
}

pub use error::RuntimeError;

/// Pending effects above which the runner reports itself as degraded.
const DEGRADED_BACKLOG: usize = 1_000;

/// Handle for tracking effect completion
///
/// Returned by [`EffectRunner::run`]. Callers that need to observe the
/// side effects of an operation (tests, mostly) await it; request handlers
/// drop it and let the effects finish in the background.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone, so nothing can still be running.
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Timeout`] if the timeout expires before all
    /// effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), RuntimeError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| RuntimeError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: per-run counter shared by every spawned effect of one `run` call.
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawns effects on the Tokio runtime.
///
/// Actions produced by `Effect::Future` and `Effect::Delay` are forwarded to
/// the feedback channel when one is attached, and dropped (with a trace
/// event) otherwise.
pub struct EffectRunner<A> {
    feedback: Option<mpsc::UnboundedSender<A>>,
    pending: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl<A> Clone for EffectRunner<A> {
    fn clone(&self) -> Self {
        Self {
            feedback: self.feedback.clone(),
            pending: Arc::clone(&self.pending),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<A> std::fmt::Debug for EffectRunner<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRunner")
            .field("pending_effects", &self.pending.load(Ordering::SeqCst))
            .field("shutting_down", &self.shutdown.load(Ordering::SeqCst))
            .field("feedback", &self.feedback.is_some())
            .finish()
    }
}

impl<A> Default for EffectRunner<A>
where
    A: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> EffectRunner<A>
where
    A: Send + 'static,
{
    /// Create a runner without a feedback channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            feedback: None,
            pending: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Forward actions produced by effects to `tx`.
    #[must_use]
    pub fn with_feedback(mut self, tx: mpsc::UnboundedSender<A>) -> Self {
        self.feedback = Some(tx);
        self
    }

    /// Number of effects in flight across every `run` call.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Start executing `effects` and return a handle to await them.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownInProgress`] once [`shutdown`](Self::shutdown)
    /// has been called.
    pub fn run<I>(&self, effects: I) -> Result<EffectHandle, RuntimeError>
    where
        I: IntoIterator<Item = Effect<A>>,
    {
        if self.shutdown.load(Ordering::Acquire) {
            metrics::counter!("effects.rejected", "reason" => "shutdown").increment(1);
            return Err(RuntimeError::ShutdownInProgress);
        }

        let (handle, tracking) = EffectHandle::new();
        for effect in effects {
            self.execute(effect, &tracking);
        }
        Ok(handle)
    }

    /// Stop accepting effects and wait for the ones in flight.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownTimeout`] if the timeout expires before all
    /// pending effects complete.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError> {
        tracing::info!("Draining effect runtime");
        self.shutdown.store(true, Ordering::Release);

        match self.settle(timeout).await {
            Ok(()) => {
                tracing::info!("All effects completed");
                Ok(())
            },
            Err(_) => {
                let pending = self.pending();
                tracing::error!(pending_effects = pending, "Effect drain timed out");
                metrics::counter!("effects.shutdown.timeout").increment(1);
                Err(RuntimeError::ShutdownTimeout(pending))
            },
        }
    }

    /// Wait until no effect is in flight, without refusing new ones.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Timeout`] if effects are still running when
    /// `timeout` expires.
    pub async fn settle(&self, timeout: Duration) -> Result<(), RuntimeError> {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(10);

        while self.pending.load(Ordering::Acquire) > 0 {
            if start.elapsed() >= timeout {
                return Err(RuntimeError::Timeout);
            }
            tokio::time::sleep(poll_interval).await;
        }
        Ok(())
    }

    /// Health of the runner: unhealthy once shut down, degraded under a large backlog.
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        let pending = self.pending();
        let check = if self.shutdown.load(Ordering::Acquire) {
            HealthCheck::unhealthy("effects", "runtime is shutting down")
        } else if pending >= DEGRADED_BACKLOG {
            HealthCheck::degraded("effects", "large backlog of pending effects")
        } else {
            HealthCheck::healthy("effects")
        };
        check.with_metadata("pending", pending.to_string())
    }

    fn forward(&self, action: A) {
        match &self.feedback {
            Some(tx) => {
                if tx.send(action).is_err() {
                    tracing::debug!("Feedback receiver dropped, discarding action");
                }
            },
            None => tracing::trace!("Effect produced an action with no feedback channel"),
        }
    }

    /// Register one spawned unit of work against both counters.
    fn track(&self, tracking: &EffectTracking) -> (DecrementGuard, AtomicCounterGuard) {
        tracking.increment();
        self.pending.fetch_add(1, Ordering::SeqCst);
        (
            DecrementGuard(tracking.clone()),
            AtomicCounterGuard(Arc::clone(&self.pending)),
        )
    }

    fn execute(&self, effect: Effect<A>, tracking: &EffectTracking) {
        match effect {
            Effect::None => {
                metrics::counter!("effects.executed", "type" => "none").increment(1);
            },
            Effect::Future(fut) => {
                tracing::trace!("Executing Effect::Future");
                metrics::counter!("effects.executed", "type" => "future").increment(1);
                let guards = self.track(tracking);
                let runner = self.clone();

                tokio::spawn(async move {
                    let _guards = guards;
                    if let Some(action) = fut.await {
                        runner.forward(action);
                    }
                });
            },
            Effect::Delay { duration, action } => {
                tracing::trace!(?duration, "Executing Effect::Delay");
                metrics::counter!("effects.executed", "type" => "delay").increment(1);
                let guards = self.track(tracking);
                let runner = self.clone();

                tokio::spawn(async move {
                    let _guards = guards;
                    tokio::time::sleep(duration).await;
                    runner.forward(*action);
                });
            },
            Effect::Parallel(effects) => {
                metrics::counter!("effects.executed", "type" => "parallel").increment(1);
                for effect in effects {
                    self.execute(effect, tracking);
                }
            },
            Effect::Sequential(effects) => {
                let effect_count = effects.len();
                tracing::trace!(effect_count, "Executing Effect::Sequential");
                metrics::counter!("effects.executed", "type" => "sequential").increment(1);
                let guards = self.track(tracking);
                let runner = self.clone();

                tokio::spawn(async move {
                    let _guards = guards;
                    for effect in effects {
                        let (mut step, step_tracking) = EffectHandle::new();
                        runner.execute(effect, &step_tracking);
                        drop(step_tracking);
                        step.wait().await;
                    }
                });
            },
        }
    }
}
