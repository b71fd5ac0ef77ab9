//! Per-session call ordering
//!
//! Calls that share a session id run one at a time, in the order they were
//! enqueued. Calls for different sessions, and calls with no session id yet,
//! run concurrently.
//!
//! Each session keeps only the tail of its chain: a shared future that settles
//! when the most recently enqueued task finishes. A new task waits on the
//! previous tail, whatever its outcome, then becomes the tail itself. The
//! entry is dropped when its task settles and no newer task has replaced it.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Settled = Shared<BoxFuture<'static, ()>>;

struct Tail {
    ticket: u64,
    settled: Settled,
}

#[derive(Default)]
struct Registry {
    next_ticket: u64,
    tails: HashMap<String, Tail>,
}

/// Serializes tasks by session id.
#[derive(Clone, Default)]
pub struct SessionQueue {
    registry: Arc<Mutex<Registry>>,
}

impl SessionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` behind any pending work for `session_id`.
    ///
    /// The task is registered before this returns and runs on its own tokio
    /// task, so dropping the handle does not break ordering for later calls.
    /// Without a session id the task starts immediately.
    pub fn enqueue<F, T>(&self, session_id: Option<&str>, task: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let Some(session_id) = session_id else {
            return tokio::spawn(task);
        };

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let settled: Settled = done_rx.map(|_| ()).boxed().shared();

        let (ticket, prior) = {
            let mut registry = self.registry.lock();
            registry.next_ticket += 1;
            let ticket = registry.next_ticket;
            let prior = registry.tails.insert(
                session_id.to_string(),
                Tail {
                    ticket,
                    settled: settled.clone(),
                },
            );
            (ticket, prior.map(|tail| tail.settled))
        };

        let guard = SettleGuard {
            registry: Arc::clone(&self.registry),
            session_id: session_id.to_string(),
            ticket,
            done: Some(done_tx),
        };

        tokio::spawn(async move {
            // Runs on success, error, or panic of the task.
            let _guard = guard;
            if let Some(prior) = prior {
                prior.await;
            }
            task.await
        })
    }

    /// Whether any task is queued or running for `session_id`.
    pub fn is_pending(&self, session_id: &str) -> bool {
        self.registry.lock().tails.contains_key(session_id)
    }

    /// Number of sessions with outstanding work.
    pub fn pending_sessions(&self) -> usize {
        self.registry.lock().tails.len()
    }
}

/// Releases a session's tail when its task settles.
struct SettleGuard {
    registry: Arc<Mutex<Registry>>,
    session_id: String,
    ticket: u64,
    done: Option<oneshot::Sender<()>>,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        {
            let mut registry = self.registry.lock();
            if registry
                .tails
                .get(&self.session_id)
                .is_some_and(|tail| tail.ticket == self.ticket)
            {
                registry.tails.remove(&self.session_id);
            }
        }
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{Instant, sleep};

    #[tokio::test]
    async fn test_same_session_runs_in_enqueue_order() {
        let queue = SessionQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let delays = [40u64, 5, 25, 0, 15];
        let handles: Vec<_> = delays
            .iter()
            .enumerate()
            .map(|(i, delay)| {
                let log = Arc::clone(&log);
                let delay = *delay;
                queue.enqueue(Some("s-1"), async move {
                    log.lock().push(("start", i, Instant::now()));
                    sleep(Duration::from_millis(delay)).await;
                    log.lock().push(("end", i, Instant::now()));
                    i
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i);
        }

        let log = log.lock();
        let order: Vec<(&str, usize)> = log.iter().map(|(kind, i, _)| (*kind, *i)).collect();
        let expected: Vec<(&str, usize)> = (0..delays.len())
            .flat_map(|i| [("start", i), ("end", i)])
            .collect();
        assert_eq!(order, expected);

        let starts: Vec<Instant> = log
            .iter()
            .filter(|(kind, _, _)| *kind == "start")
            .map(|(_, _, at)| *at)
            .collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
        assert!(!queue.is_pending("s-1"));
    }

    #[tokio::test]
    async fn test_different_sessions_run_concurrently() {
        let queue = SessionQueue::new();
        let (tx, rx) = oneshot::channel::<()>();

        // `a` blocks until `b` signals; this only finishes if they overlap.
        let a = queue.enqueue(Some("a"), async move {
            rx.await.unwrap();
            "a"
        });
        let b = queue.enqueue(Some("b"), async move {
            tx.send(()).unwrap();
            "b"
        });

        let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
            (a.await.unwrap(), b.await.unwrap())
        })
        .await
        .expect("sessions should not block each other");
        assert_eq!((a, b), ("a", "b"));
    }

    #[tokio::test]
    async fn test_sessionless_tasks_are_not_registered() {
        let queue = SessionQueue::new();
        let handle = queue.enqueue(None, async { 7 });
        assert_eq!(queue.pending_sessions(), 0);
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_the_session() {
        let queue = SessionQueue::new();

        let failed = queue.enqueue(Some("s"), async { Err::<(), &str>("boom") });
        let panicked = queue.enqueue(Some("s"), async {
            panic!("task blew up");
        });
        let next = queue.enqueue(Some("s"), async { Ok::<_, &str>("ran") });

        assert_eq!(failed.await.unwrap(), Err("boom"));
        assert!(panicked.await.is_err());
        assert_eq!(next.await.unwrap(), Ok("ran"));
        assert!(!queue.is_pending("s"));
    }

    #[tokio::test]
    async fn test_entry_survives_until_the_newest_task_settles() {
        let queue = SessionQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = queue.enqueue(Some("s"), async {});
        let second = queue.enqueue(Some("s"), async move {
            release_rx.await.ok();
        });

        first.await.unwrap();
        // The first task settled, but the newer registration must remain.
        assert!(queue.is_pending("s"));

        release_tx.send(()).unwrap();
        second.await.unwrap();
        assert!(!queue.is_pending("s"));
        assert_eq!(queue.pending_sessions(), 0);
    }
}
