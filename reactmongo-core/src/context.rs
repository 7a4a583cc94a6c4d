//! The two execution contexts of a connection.
//!
//! - [`EventLoop`] is the master context: a FIFO queue of tasks drained by the caller on
//!   its own thread. Every user callback runs here.
//! - [`Worker`] is the worker context: one background thread that owns the driver and
//!   runs blocking jobs against it one at a time, in submission order.
//!
//! Work crosses from one context to the other by value, so nothing is shared between
//! the caller and the worker apart from the queues themselves.

use std::{
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{debug, error, info, trace};

use crate::error::ReactMongoResult;

/// A unit of work for the master context.
pub type Task = Box<dyn FnOnce() + Send>;

/// A unit of work for the worker context, given exclusive access to the driver.
pub type Job<D> = Box<dyn FnOnce(&mut D) + Send>;

/// The caller's event loop.
///
/// The loop does not run by itself: the owning thread calls [`run_pending`],
/// [`run_once`] or [`run_until`] from its own main loop.
///
/// [`run_pending`]: EventLoop::run_pending
/// [`run_once`]: EventLoop::run_once
/// [`run_until`]: EventLoop::run_until
#[derive(Debug)]
pub struct EventLoop {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();

        Self { sender, receiver }
    }

    /// Returns a handle other threads can use to queue tasks on this loop.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            sender: self.sender.clone(),
        }
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Runs every task queued at the time of the call and returns how many ran.
    ///
    /// Tasks queued while draining are left for the next call.
    pub fn run_pending(&self) -> usize {
        let queued = self.receiver.len();
        let mut ran = 0;

        while ran < queued {
            match self.receiver.try_recv() {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(_) => break,
            }
        }

        ran
    }

    /// Waits up to `timeout` for one task and runs it.
    ///
    /// Returns `false` if no task arrived in time.
    pub fn run_once(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Runs tasks as they arrive until `done` returns `true` or `timeout` elapses.
    ///
    /// Returns whether `done` was satisfied.
    pub fn run_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;

        while !done() {
            let remaining = deadline.saturating_duration_since(Instant::now());

            if remaining.is_zero() || !self.run_once(remaining) {
                return done();
            }
        }

        true
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable, thread-safe handle that queues tasks on an [`EventLoop`].
#[derive(Debug, Clone)]
pub struct LoopHandle {
    sender: Sender<Task>,
}

impl LoopHandle {
    /// Queues a task on the loop.
    ///
    /// Returns `false` when the loop has been dropped, in which case the task is
    /// discarded without running.
    pub fn execute<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(task)).is_err() {
            trace!("Event loop is gone, dropping task");
            return false;
        }

        true
    }
}

/// A dedicated background thread that owns a driver and runs jobs against it.
///
/// Dropping the worker closes its queue and waits for the jobs already queued to
/// finish before the thread exits.
pub struct Worker<D: Send + 'static> {
    sender: Option<Sender<Job<D>>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl<D: Send + 'static> Worker<D> {
    /// Spawns the worker thread, moving `driver` into it.
    pub fn spawn(name: &str, driver: D) -> ReactMongoResult<Self> {
        let (sender, receiver) = unbounded::<Job<D>>();

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::worker_thread(driver, receiver))?;

        info!(worker = name, "Started worker thread");

        Ok(Self {
            sender: Some(sender),
            thread_handle: Some(thread_handle),
        })
    }

    /// Queues a job. Jobs run in the order they were queued.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce(&mut D) + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(job)).is_err() {
                error!("Worker thread has exited, dropping job");
            }
        }
    }

    fn worker_thread(mut driver: D, receiver: Receiver<Job<D>>) {
        for job in receiver {
            // A panicking job must not take the remaining jobs down with it
            if panic::catch_unwind(AssertUnwindSafe(|| job(&mut driver))).is_err() {
                error!("Worker job panicked");
            }
        }

        debug!("Worker queue closed, thread exiting");
    }
}

impl<D: Send + 'static> Drop for Worker<D> {
    fn drop(&mut self) {
        drop(self.sender.take());

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

impl<D: Send + 'static> std::fmt::Debug for Worker<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("running", &self.sender.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use parking_lot::Mutex;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn run_pending_drains_in_fifo_order() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let log = log.clone();
            handle.execute(move || log.lock().push(i));
        }

        assert_eq!(event_loop.pending(), 5);
        assert_eq!(event_loop.run_pending(), 5);
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(event_loop.run_pending(), 0);
    }

    #[test]
    fn tasks_queued_while_draining_wait_for_next_round() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let inner = handle.clone();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();

        handle.execute(move || {
            inner.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(event_loop.run_pending(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(event_loop.run_pending(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_once_times_out_when_idle() {
        let event_loop = EventLoop::new();

        assert!(!event_loop.run_once(Duration::from_millis(10)));
    }

    #[test]
    fn handle_reports_dropped_loop() {
        let handle = EventLoop::new().handle();

        assert!(!handle.execute(|| {}));
    }

    #[test]
    fn worker_runs_jobs_in_order_and_reports_back() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let worker = Worker::spawn("test-worker", Vec::<usize>::new()).unwrap();
        let results = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let handle = handle.clone();
            let results = results.clone();

            worker.execute(move |state: &mut Vec<usize>| {
                state.push(i);
                let seen = state.len();
                handle.execute(move || results.lock().push((i, seen)));
            });
        }

        assert!(event_loop.run_until(WAIT, || results.lock().len() == 10));
        assert_eq!(
            *results.lock(),
            (0..10).map(|i| (i, i + 1)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn worker_survives_panicking_job() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let worker = Worker::spawn("test-worker", ()).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();

        worker.execute(|_: &mut ()| panic!("job failure"));
        worker.execute(move |_: &mut ()| {
            handle.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert!(event_loop.run_until(WAIT, || done.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn dropping_worker_finishes_queued_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let worker = Worker::spawn("test-worker", ()).unwrap();

        for _ in 0..3 {
            let counter = counter.clone();
            worker.execute(move |_: &mut ()| {
                thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(worker);

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
