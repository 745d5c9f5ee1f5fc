//! Cancellable, resettable worker-thread stage with a job queue.
//!
//! Every stage runs the same state machine:
//!
//! ```text
//! Idle → Starting → Running ⇄ { Resetting → Running,
//!                               Cancelling → Idle,
//!                               Stopping → Idle }
//! ```
//!
//! All transitions are guarded by a single mutex and signaled through one
//! condition variable. Work items are processed in FIFO order; the listener
//! is invoked from the worker thread once per completed unit of work.
//! Misusing a control operation (e.g. `reset()` while Idle) returns `false`
//! instead of crashing, and caller-supplied latches are always released.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::common::cancel::CancelToken;

use super::latch::Latch;

/// Stage lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum StageState {
    Idle,
    Starting,
    Running,
    Resetting,
    Cancelling,
    Stopping,
}

/// Result of one unit of work, reported to the listener.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Completed {
        /// The frame (or job) this outcome identifies.
        input: PathBuf,
        /// Output file for the next stage, when the job produces one.
        output: Option<PathBuf>,
    },
    Failed {
        input: PathBuf,
        error: String,
    },
}

impl StageOutcome {
    pub fn input(&self) -> &std::path::Path {
        match self {
            StageOutcome::Completed { input, .. } | StageOutcome::Failed { input, .. } => input,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Completed { .. })
    }
}

/// Listener invoked from the worker thread, one call per completed unit of
/// work. Implementations must be thread-safe or route to a single consumer
/// thread themselves.
pub type StageListener = Arc<dyn Fn(&StageOutcome) + Send + Sync>;

/// One unit of stage-specific work.
pub trait FrameProcessor: Send + 'static {
    type Job: Send + 'static;

    /// Stage name for thread naming and logs.
    fn name(&self) -> &'static str;

    /// Perform one unit of work. Runs on the worker thread with no locks
    /// held; may be slow and I/O-bound.
    fn process(&mut self, job: Self::Job) -> StageOutcome;

    /// Re-arm stage-specific sub-state (e.g. clear partial accumulation).
    fn reset(&mut self) {}
}

struct StageInner<J> {
    state: StageState,
    queue: VecDeque<J>,
    reset_latches: Vec<Latch>,
    exit_latches: Vec<Latch>,
}

struct StageShared<J> {
    inner: Mutex<StageInner<J>>,
    signal: Condvar,
}

/// Cheap handle for enqueueing work into a stage from other threads.
pub struct StageHandle<J> {
    shared: Arc<StageShared<J>>,
}

impl<J> Clone for StageHandle<J> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<J: Send + 'static> StageHandle<J> {
    /// Queue work items. Allowed while the stage is starting or running
    /// (including while a job is in flight); returns false otherwise.
    /// Thread-safe regardless of caller.
    pub fn enqueue<I>(&self, jobs: I) -> bool
    where
        I: IntoIterator<Item = J>,
    {
        let mut inner = self.shared.inner.lock();
        if !matches!(inner.state, StageState::Starting | StageState::Running) {
            return false;
        }
        inner.queue.extend(jobs);
        self.shared.signal.notify_all();
        true
    }

    /// Current queue length (pending jobs, not the in-flight one).
    pub fn pending(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }
}

/// A background worker stage wrapping a [`FrameProcessor`].
pub struct PipelineStage<P: FrameProcessor> {
    shared: Arc<StageShared<P::Job>>,
    processor: Arc<Mutex<P>>,
    listener: StageListener,
    cancel_token: Option<CancelToken>,
    handle: Option<JoinHandle<()>>,
}

impl<P: FrameProcessor> PipelineStage<P> {
    pub fn new(processor: P, listener: StageListener) -> Self {
        Self {
            shared: Arc::new(StageShared {
                inner: Mutex::new(StageInner {
                    state: StageState::Idle,
                    queue: VecDeque::new(),
                    reset_latches: Vec::new(),
                    exit_latches: Vec::new(),
                }),
                signal: Condvar::new(),
            }),
            processor: Arc::new(Mutex::new(processor)),
            listener,
            cancel_token: None,
            handle: None,
        }
    }

    /// Attach a token that [`cancel`](Self::cancel) triggers, so in-flight
    /// work inside the processor (e.g. a stacker combine) aborts too.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn state(&self) -> StageState {
        self.shared.inner.lock().state
    }

    /// Handle for feeding this stage from listener callbacks of other stages.
    pub fn handle(&self) -> StageHandle<P::Job> {
        StageHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queue work items; see [`StageHandle::enqueue`].
    pub fn enqueue<I>(&self, jobs: I) -> bool
    where
        I: IntoIterator<Item = P::Job>,
    {
        self.handle().enqueue(jobs)
    }

    /// Spawn the worker thread. Fails (returns false) unless Idle.
    pub fn start(&mut self) -> bool {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state != StageState::Idle {
                return false;
            }
            inner.state = StageState::Starting;
        }

        if let Some(token) = &self.cancel_token {
            token.reset();
        }

        let shared = Arc::clone(&self.shared);
        let processor = Arc::clone(&self.processor);
        let listener = Arc::clone(&self.listener);
        let name = self.processor.lock().name();

        let handle = std::thread::Builder::new()
            .name(format!("stage-{name}"))
            .spawn(move || worker_loop(shared, processor, listener))
            .expect("failed to spawn stage worker thread");
        self.handle = Some(handle);
        true
    }

    /// Synchronously discard pending work, re-arm the processor's sub-state
    /// and return to Running. Blocks until the worker acknowledges; returns
    /// false (without blocking) when the stage is not running.
    pub fn reset(&self) -> bool {
        let latch = Latch::new();
        {
            let mut inner = self.shared.inner.lock();
            if !matches!(inner.state, StageState::Starting | StageState::Running) {
                return false;
            }
            inner.state = StageState::Resetting;
            inner.reset_latches.push(latch.clone());
            self.shared.signal.notify_all();
        }
        latch.wait();
        true
    }

    /// Asynchronously request termination; pending work is discarded and the
    /// stage goes Idle once the worker exits. Returns false when already
    /// Idle.
    pub fn cancel(&self) -> bool {
        self.cancel_with(None)
    }

    /// [`cancel`](Self::cancel) with a latch released when the worker has
    /// exited. The latch is released even on invalid-state misuse so the
    /// caller never hangs.
    pub fn cancel_with(&self, latch: Option<Latch>) -> bool {
        if let Some(token) = &self.cancel_token {
            token.cancel();
        }

        let mut inner = self.shared.inner.lock();
        if inner.state == StageState::Idle {
            drop(inner);
            if let Some(latch) = latch {
                latch.open();
            }
            return false;
        }
        inner.state = StageState::Cancelling;
        if let Some(latch) = latch {
            inner.exit_latches.push(latch);
        }
        self.shared.signal.notify_all();
        true
    }

    /// Request a graceful drain: finish in-flight and queued work, then go
    /// Idle. No new work is accepted once Stopping is requested.
    pub fn stop(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if !matches!(inner.state, StageState::Starting | StageState::Running) {
            return false;
        }
        inner.state = StageState::Stopping;
        self.shared.signal.notify_all();
        true
    }

    /// Block until the worker thread exits.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("stage worker thread panicked");
        }
    }
}

impl<P: FrameProcessor> Drop for PipelineStage<P> {
    fn drop(&mut self) {
        self.cancel();
        self.join();
    }
}

fn worker_loop<P: FrameProcessor>(
    shared: Arc<StageShared<P::Job>>,
    processor: Arc<Mutex<P>>,
    listener: StageListener,
) {
    let mut inner = shared.inner.lock();
    if inner.state == StageState::Starting {
        inner.state = StageState::Running;
    }

    loop {
        while inner.queue.is_empty() && inner.state == StageState::Running {
            shared.signal.wait(&mut inner);
        }

        match inner.state {
            StageState::Resetting => {
                inner.queue.clear();
                processor.lock().reset();
                for latch in inner.reset_latches.drain(..) {
                    latch.open();
                }
                inner.state = StageState::Running;
                continue;
            }
            StageState::Cancelling => {
                inner.queue.clear();
                break;
            }
            StageState::Stopping if inner.queue.is_empty() => break,
            _ => {}
        }

        let Some(job) = inner.queue.pop_front() else {
            continue;
        };

        // Release the lock for the (possibly slow, I/O-bound) work
        drop(inner);
        let outcome = processor.lock().process(job);
        listener(&outcome);
        inner = shared.inner.lock();
    }

    inner.state = StageState::Idle;
    for latch in inner.exit_latches.drain(..) {
        latch.open();
    }
    // A reset racing with termination must not leave its caller waiting
    for latch in inner.reset_latches.drain(..) {
        latch.open();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts processed jobs, optionally sleeping per job.
    struct CountingProcessor {
        processed: Arc<AtomicUsize>,
        delay: Duration,
        resets: Arc<AtomicUsize>,
    }

    impl FrameProcessor for CountingProcessor {
        type Job = PathBuf;

        fn name(&self) -> &'static str {
            "counting"
        }

        fn process(&mut self, job: PathBuf) -> StageOutcome {
            std::thread::sleep(self.delay);
            self.processed.fetch_add(1, Ordering::SeqCst);
            StageOutcome::Completed {
                input: job,
                output: None,
            }
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_stage(
        delay: Duration,
    ) -> (
        PipelineStage<CountingProcessor>,
        Arc<AtomicUsize>,
        Arc<AtomicUsize>,
        Arc<AtomicUsize>,
    ) {
        let processed = Arc::new(AtomicUsize::new(0));
        let resets = Arc::new(AtomicUsize::new(0));
        let callbacks = Arc::new(AtomicUsize::new(0));

        let callback_count = Arc::clone(&callbacks);
        let listener: StageListener = Arc::new(move |outcome| {
            assert!(outcome.is_success());
            callback_count.fetch_add(1, Ordering::SeqCst);
        });

        let stage = PipelineStage::new(
            CountingProcessor {
                processed: Arc::clone(&processed),
                delay,
                resets: Arc::clone(&resets),
            },
            listener,
        );
        (stage, processed, resets, callbacks)
    }

    fn jobs(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("frame_{i:03}"))).collect()
    }

    fn wait_for_idle(stage_state: impl Fn() -> StageState) {
        for _ in 0..500 {
            if stage_state() == StageState::Idle {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("stage did not reach Idle");
    }

    #[test]
    fn test_start_only_from_idle() {
        let (mut stage, ..) = counting_stage(Duration::ZERO);
        assert_eq!(stage.state(), StageState::Idle);
        assert!(stage.start());
        assert!(!stage.start(), "start while running must fail");

        stage.stop();
        stage.join();
        assert_eq!(stage.state(), StageState::Idle);
        assert!(stage.start(), "start must succeed again after stop");
        stage.cancel();
        stage.join();
    }

    #[test]
    fn test_stop_drains_all_queued_work() {
        let (mut stage, processed, _, callbacks) = counting_stage(Duration::from_millis(1));
        assert!(stage.start());
        assert!(stage.enqueue(jobs(5)));

        assert!(stage.stop());
        stage.join();

        assert_eq!(processed.load(Ordering::SeqCst), 5);
        assert_eq!(callbacks.load(Ordering::SeqCst), 5);
        assert!(!stage.enqueue(jobs(1)), "no work accepted after stop");
    }

    #[test]
    fn test_cancel_discards_pending_work_and_stage_restarts() {
        let (mut stage, processed, _, callbacks) = counting_stage(Duration::from_millis(30));
        assert!(stage.start());
        assert!(stage.enqueue(jobs(3)));

        // Let the first job get in flight, then cancel
        std::thread::sleep(Duration::from_millis(5));
        assert!(stage.cancel());
        stage.join();
        assert_eq!(stage.state(), StageState::Idle);

        assert!(
            callbacks.load(Ordering::SeqCst) < 3,
            "cancel must complete with fewer than 3 callbacks"
        );
        assert!(processed.load(Ordering::SeqCst) < 3);

        // The same stage starts again
        assert!(stage.start());
        assert!(stage.enqueue(jobs(1)));
        stage.stop();
        stage.join();
    }

    #[test]
    fn test_cancel_with_latch_releases_caller() {
        let (mut stage, ..) = counting_stage(Duration::from_millis(10));
        assert!(stage.start());
        stage.enqueue(jobs(2));

        let latch = Latch::new();
        assert!(stage.cancel_with(Some(latch.clone())));
        latch.wait();
        assert_eq!(stage.state(), StageState::Idle);
        stage.join();
    }

    #[test]
    fn test_cancel_on_idle_stage_still_releases_latch() {
        let (stage, ..) = counting_stage(Duration::ZERO);
        let latch = Latch::new();
        assert!(!stage.cancel_with(Some(latch.clone())));
        latch.wait();
        assert!(latch.is_open());
    }

    #[test]
    fn test_reset_clears_pending_work_and_keeps_running() {
        let (mut stage, _, resets, callbacks) = counting_stage(Duration::from_millis(20));
        assert!(stage.start());
        stage.enqueue(jobs(10));

        std::thread::sleep(Duration::from_millis(5));
        assert!(stage.reset(), "reset must be acknowledged");

        // Acknowledged reset means the queue is already drained
        assert_eq!(stage.handle().pending(), 0);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert!(callbacks.load(Ordering::SeqCst) <= 1);
        assert_eq!(stage.state(), StageState::Running);

        // The stage keeps accepting work after a reset
        assert!(stage.enqueue(jobs(2)));
        stage.stop();
        stage.join();
    }

    #[test]
    fn test_reset_on_idle_stage_fails_fast() {
        let (stage, ..) = counting_stage(Duration::ZERO);
        assert!(!stage.reset());
    }

    #[test]
    fn test_enqueue_requires_running_stage() {
        let (mut stage, ..) = counting_stage(Duration::ZERO);
        assert!(!stage.enqueue(jobs(1)), "enqueue before start must fail");

        assert!(stage.start());
        assert!(stage.enqueue(jobs(1)));
        stage.stop();
        stage.join();
        assert!(!stage.enqueue(jobs(1)), "enqueue after stop must fail");
    }

    #[test]
    fn test_fifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        struct OrderProcessor {
            order: Arc<Mutex<Vec<PathBuf>>>,
        }
        impl FrameProcessor for OrderProcessor {
            type Job = PathBuf;
            fn name(&self) -> &'static str {
                "order"
            }
            fn process(&mut self, job: PathBuf) -> StageOutcome {
                self.order.lock().push(job.clone());
                StageOutcome::Completed {
                    input: job,
                    output: None,
                }
            }
        }

        let listener: StageListener = Arc::new(|_| {});
        let mut stage = PipelineStage::new(
            OrderProcessor {
                order: Arc::clone(&order),
            },
            listener,
        );
        assert!(stage.start());
        stage.enqueue(jobs(8));
        stage.stop();
        stage.join();

        assert_eq!(*order.lock(), jobs(8));
    }

    #[test]
    fn test_cancel_token_propagates() {
        let (stage, ..) = counting_stage(Duration::ZERO);
        let token = CancelToken::new();
        let mut stage = stage.with_cancel_token(token.clone());

        assert!(stage.start());
        // start() re-arms the token
        assert!(!token.is_cancelled());

        stage.cancel();
        assert!(token.is_cancelled());
        stage.join();
        wait_for_idle(|| stage.state());
    }
}
