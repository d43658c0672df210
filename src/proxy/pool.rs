//! Worker pool that drains a shared queue of candidates through a probe routine
//!
//! The pool owns three pieces of shared state:
//! - a [`WorkQueue`] with exactly-once dispatch and completion tracking
//! - a [`ResultAggregator`] the workers append successful results to
//! - an optional progress channel of [`ProbeEvent`]s
//!
//! Results only leave the pool through [`ProbePool::join`] or
//! [`ProbePool::abandon`], both of which stop the workers first.

use crate::proxy::checker::ProxyProber;
use crate::proxy::error::{ProbeError, ProbeErrorKind};
use crate::proxy::models::{ProbeResult, ProxyCandidate};
use futures::FutureExt;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;

/// Default number of concurrent workers
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    in_flight: usize,
}

/// Unbounded multi-producer, multi-consumer queue with completion tracking.
///
/// Every item handed out by [`get`](WorkQueue::get) must be acknowledged with
/// [`task_done`](WorkQueue::task_done). The queue is drained once it is empty
/// and no handed-out item is still unacknowledged.
#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    /// One permit per queued item
    available: Semaphore,
    drained: Notify,
    completed: AtomicUsize,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                in_flight: 0,
            }),
            available: Semaphore::new(0),
            drained: Notify::new(),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn put(&self, item: T) {
        self.state.lock().items.push_back(item);
        self.available.add_permits(1);
    }

    /// Wait for an item and take it.
    ///
    /// Returns `None` only once the queue has been closed.
    pub async fn get(&self) -> Option<T> {
        let permit = self.available.acquire().await.ok()?;
        permit.forget();

        let mut state = self.state.lock();
        let item = state.items.pop_front();
        if item.is_some() {
            state.in_flight += 1;
        }
        item
    }

    /// Acknowledge one item previously returned by `get`
    pub fn task_done(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        self.completed.fetch_add(1, Ordering::SeqCst);
        if state.items.is_empty() && state.in_flight == 0 {
            self.drained.notify_waiters();
        }
    }

    /// Wait until the queue is drained
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.items.is_empty() && state.in_flight == 0
    }

    /// Items waiting to be dispatched
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items dispatched but not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Total acknowledged items
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Wake every blocked `get` with `None`
    pub fn close(&self) {
        self.available.close();
    }
}

/// Append-only, synchronized collection of probe results
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Mutex<Vec<ProbeResult>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: ProbeResult) {
        self.results.lock().push(result);
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self) -> Vec<ProbeResult> {
        std::mem::take(&mut *self.results.lock())
    }
}

/// Progress notification for one completed candidate
#[derive(Debug, Clone)]
pub enum ProbeEvent {
    Classified(ProbeResult),
    Discarded {
        proxy: ProxyCandidate,
        kind: ProbeErrorKind,
    },
}

/// Fixed-size pool of probe workers bound to one [`WorkQueue`]
pub struct ProbePool {
    queue: Arc<WorkQueue<ProxyCandidate>>,
    results: Arc<ResultAggregator>,
    workers: Vec<JoinHandle<()>>,
}

impl ProbePool {
    /// Start `concurrency` workers, each running `probe` on dequeued candidates
    pub fn spawn<F, Fut>(concurrency: usize, probe: F) -> Self
    where
        F: Fn(ProxyCandidate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeResult, ProbeError>> + Send + 'static,
    {
        Self::start(concurrency, probe, None)
    }

    /// Like [`spawn`](ProbePool::spawn), also reporting every completion on `events`
    pub fn spawn_with_events<F, Fut>(
        concurrency: usize,
        probe: F,
        events: mpsc::UnboundedSender<ProbeEvent>,
    ) -> Self
    where
        F: Fn(ProxyCandidate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeResult, ProbeError>> + Send + 'static,
    {
        Self::start(concurrency, probe, Some(events))
    }

    /// Start a pool that probes every candidate with `prober`
    pub fn with_prober(
        prober: ProxyProber,
        concurrency: usize,
        events: Option<mpsc::UnboundedSender<ProbeEvent>>,
    ) -> Self {
        let prober = Arc::new(prober);
        Self::start(
            concurrency,
            move |candidate: ProxyCandidate| {
                let prober = Arc::clone(&prober);
                async move { prober.probe(&candidate).await }
            },
            events,
        )
    }

    fn start<F, Fut>(
        concurrency: usize,
        probe: F,
        events: Option<mpsc::UnboundedSender<ProbeEvent>>,
    ) -> Self
    where
        F: Fn(ProxyCandidate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeResult, ProbeError>> + Send + 'static,
    {
        let concurrency = concurrency.max(1);
        let queue = Arc::new(WorkQueue::new());
        let results = Arc::new(ResultAggregator::new());
        let probe = Arc::new(probe);

        let workers = (0..concurrency)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&results),
                    Arc::clone(&probe),
                    events.clone(),
                ))
            })
            .collect();

        debug!("Started probe pool with {} workers", concurrency);

        Self {
            queue,
            results,
            workers,
        }
    }

    pub fn enqueue(&self, candidate: ProxyCandidate) {
        self.queue.put(candidate);
    }

    pub fn enqueue_all<I>(&self, candidates: I)
    where
        I: IntoIterator<Item = ProxyCandidate>,
    {
        for candidate in candidates {
            self.queue.put(candidate);
        }
    }

    pub fn concurrency(&self) -> usize {
        self.workers.len()
    }

    /// Candidates finished so far, whatever their outcome
    pub fn completed(&self) -> usize {
        self.queue.completed()
    }

    /// Candidates waiting or in progress
    pub fn pending(&self) -> usize {
        self.queue.len() + self.queue.in_flight()
    }

    /// Wait until every enqueued candidate has completed
    pub async fn drained(&self) {
        self.queue.join().await;
    }

    /// Wait for the queue to drain, then hand over the results
    pub async fn join(self) -> Vec<ProbeResult> {
        self.drained().await;
        self.shutdown().await
    }

    /// Stop the workers now and hand over whatever has been collected.
    ///
    /// In-flight probes are dropped. A probe that already finished is kept
    /// even if its worker was still recording it when the abort arrived.
    pub async fn abandon(self) -> Vec<ProbeResult> {
        debug!(
            "Abandoning probe pool with {} candidates pending",
            self.pending()
        );
        self.shutdown().await
    }

    async fn shutdown(mut self) -> Vec<ProbeResult> {
        self.queue.close();
        let workers = std::mem::take(&mut self.workers);
        for worker in &workers {
            worker.abort();
        }
        // Aborts land at the next await, so a result pushed before that is
        // always paired with its event.
        for (id, worker) in workers.into_iter().enumerate() {
            if let Err(err) = worker.await {
                if err.is_panic() {
                    warn!("worker {} panicked during shutdown", id);
                }
            }
        }
        self.results.take()
    }
}

impl Drop for ProbePool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn run_worker<F, Fut>(
    id: usize,
    queue: Arc<WorkQueue<ProxyCandidate>>,
    results: Arc<ResultAggregator>,
    probe: Arc<F>,
    events: Option<mpsc::UnboundedSender<ProbeEvent>>,
) where
    F: Fn(ProxyCandidate) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProbeResult, ProbeError>> + Send + 'static,
{
    while let Some(candidate) = queue.get().await {
        let outcome = AssertUnwindSafe(probe(candidate.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ProbeError::Panicked(panic_message(panic.as_ref()))));

        let event = match outcome {
            Ok(result) => {
                trace!("worker {}: {} is {}", id, result.proxy, result.level);
                results.push(result.clone());
                ProbeEvent::Classified(result)
            }
            Err(err) => {
                let kind = err.kind();
                match kind {
                    ProbeErrorKind::Transport | ProbeErrorKind::Decode => {
                        trace!("worker {}: discarding {}: {}", id, candidate, err)
                    }
                    ProbeErrorKind::Shape => {
                        debug!("worker {}: discarding {}: {}", id, candidate, err)
                    }
                    ProbeErrorKind::Unexpected => {
                        warn!("worker {}: unexpected failure probing {}: {}", id, candidate, err)
                    }
                }
                ProbeEvent::Discarded {
                    proxy: candidate,
                    kind,
                }
            }
        };

        if let Some(ref tx) = events {
            let _ = tx.send(event);
        }
        queue.task_done();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}
