use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type ScheduledJob = Box<dyn FnOnce() + Send>;

/// Time-ordered queue for readouts requested with a future `when`.
///
/// A single dispatcher task sleeps until the earliest deadline and re-arms
/// whenever an earlier entry is inserted. Colliding deadlines are nudged
/// forward a few nanoseconds so every entry gets a unique key.
pub(crate) struct JobQueue {
    entries: Mutex<BTreeMap<Instant, ScheduledJob>>,
    rearm: Notify,
    shutdown: CancellationToken,
}

impl JobQueue {
    pub(crate) fn new() -> Arc<Self> {
        let queue = Arc::new(JobQueue {
            entries: Mutex::new(BTreeMap::new()),
            rearm: Notify::new(),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(Arc::clone(&queue).dispatch());
        queue
    }

    /// Files a job and returns the key it landed under.
    pub(crate) fn schedule(
        &self,
        at: Instant,
        job: ScheduledJob,
    ) -> Instant {
        let mut key = at;
        {
            let mut entries = self.entries.lock();
            let mut rng = rand::thread_rng();
            while entries.contains_key(&key) {
                key += Duration::from_nanos(rng.gen_range(1..1_000));
            }
            entries.insert(key, job);
        }
        self.rearm.notify_one();
        key
    }

    /// Withdraws a scheduled job. Returns false when it already fired.
    pub(crate) fn remove(
        &self,
        key: Instant,
    ) -> bool {
        self.entries.lock().remove(&key).is_some()
    }

    pub(crate) fn shutdown(&self) {
        self.entries.lock().clear();
        self.shutdown.cancel();
    }

    async fn dispatch(self: Arc<Self>) {
        loop {
            let next = self.entries.lock().keys().next().copied();
            match next {
                None => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.rearm.notified() => {}
                    }
                }
                Some(at) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.rearm.notified() => {}
                        _ = tokio::time::sleep_until(at) => self.fire_due(),
                    }
                }
            }
        }
        debug!("job queue dispatcher stopped");
    }

    fn fire_due(&self) {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut entries = self.entries.lock();
            while entries.keys().next().map_or(false, |key| *key <= now) {
                if let Some((_, job)) = entries.pop_first() {
                    due.push(job);
                }
            }
        }
        for job in due {
            job();
        }
    }
}
