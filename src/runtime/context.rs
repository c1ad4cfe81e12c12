use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::StoreError;
use crate::monitor::StoreMonitor;

/// Process-unique identity of a store instance.
///
/// Ids are handed out from a monotonically increasing counter and are never
/// reused, so a stale id can never alias a newer store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

impl StoreId {
    /// Generate the next unique id.
    pub(crate) fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::SeqCst))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

type Job = Box<dyn FnOnce() + Send>;

thread_local! {
    static ON_MAIN_CONTEXT: Cell<bool> = const { Cell::new(false) };
}

/// The designated mutation context.
///
/// A single named worker thread that runs jobs in submission order. It plays
/// the role a UI main thread plays in an application: `dispatch` hops onto it,
/// and shared-store attachment is scheduled onto it when requested elsewhere.
///
/// # Examples
///
/// ```
/// use flowstore::runtime::MainContext;
///
/// let on_main = MainContext::global().run(MainContext::is_current);
/// assert!(on_main);
/// assert!(!MainContext::is_current());
/// ```
pub struct MainContext {
    jobs: Sender<Job>,
}

impl MainContext {
    fn start() -> Self {
        let (jobs, rx) = unbounded::<Job>();
        // The handle is dropped on purpose: the context lives for the process.
        let spawned = thread::Builder::new()
            .name("flowstore-main".to_string())
            .spawn(move || run_loop(rx));
        if let Err(err) = spawned {
            tracing::error!(error = %err, "failed to spawn flowstore main context");
        }
        Self { jobs }
    }

    /// Get or start the process-wide main context.
    pub fn global() -> &'static MainContext {
        static CONTEXT: OnceLock<MainContext> = OnceLock::new();
        CONTEXT.get_or_init(Self::start)
    }

    /// Whether the calling thread is the main context.
    pub fn is_current() -> bool {
        ON_MAIN_CONTEXT.with(Cell::get)
    }

    /// Queue a job to run asynchronously on the main context.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.jobs.send(Box::new(job)).is_err() {
            tracing::error!("flowstore main context is gone, job dropped");
        }
    }

    /// Run a function on the main context and wait for its result.
    ///
    /// Runs inline when already on the main context. A panic inside `f` is
    /// resumed on the calling thread.
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if Self::is_current() {
            return f();
        }

        let (tx, rx) = bounded::<thread::Result<R>>(1);
        self.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f));
            let _ = tx.send(result);
        });

        match rx.recv() {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => panic::resume_unwind(e),
            Err(_) => panic!("flowstore main context stopped before answering"),
        }
    }

    /// Block until every job queued before this call has run.
    pub fn flush(&self) {
        self.run(|| ());
    }

    /// Report an `OffMainContext` diagnostic when enforcement is on and the
    /// caller is elsewhere.
    pub(crate) fn check(operation: &'static str) {
        let monitor = StoreMonitor::shared();
        if monitor.settings().enforce_main_context && !Self::is_current() {
            monitor.fatal(StoreError::OffMainContext { operation });
        }
    }
}

fn run_loop(rx: Receiver<Job>) {
    ON_MAIN_CONTEXT.with(|on_main| on_main.set(true));
    for job in rx.iter() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "job panicked on flowstore main context"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
