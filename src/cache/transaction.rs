//! Write-transaction boundary signal.
//!
//! The host wraps the work of one write transaction in
//! [`Transaction::scope`] and ends it with [`Transaction::commit`] or
//! [`Transaction::rollback`]. While a scope is active the cache bypasses
//! reads and queues evictions as end-of-transaction hooks.
//!
//! Hooks fire on every way out: commit, rollback, and drop without either.
//! Stores apply writes as they are made, so a scope that rolled back may
//! still have changed storage underneath the cache.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Deferred = Box<dyn FnOnce() + Send>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// How a transaction ended, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Committed,
    RolledBack,
    Abandoned,
}

struct TransactionState {
    id: u64,
    /// `None` once the transaction has ended.
    hooks: Mutex<Option<Vec<Deferred>>>,
}

impl TransactionState {
    fn is_open(&self) -> bool {
        self.hooks.lock().unwrap().is_some()
    }

    /// Queue `hook`, or hand it back when the transaction already ended.
    fn defer(&self, hook: Deferred) -> Option<Deferred> {
        match self.hooks.lock().unwrap().as_mut() {
            Some(hooks) => {
                hooks.push(hook);
                None
            }
            None => Some(hook),
        }
    }

    /// Close the transaction and run whatever was queued. Returns how many
    /// hooks ran; zero when it had already ended.
    fn finish(&self, outcome: Outcome) -> usize {
        let Some(hooks) = self.hooks.lock().unwrap().take() else {
            return 0;
        };
        let count = hooks.len();
        for hook in hooks {
            hook();
        }
        match outcome {
            Outcome::Committed => {
                log::debug!("Transaction {} committed, {} deferred actions fired", self.id, count)
            }
            Outcome::RolledBack => {
                log::debug!("Transaction {} rolled back, {} deferred actions fired", self.id, count)
            }
            Outcome::Abandoned if count > 0 => log::warn!(
                "Transaction {} dropped without commit or rollback, {} deferred actions fired",
                self.id,
                count
            ),
            Outcome::Abandoned => {}
        }
        count
    }
}

tokio::task_local! {
    static CURRENT: Arc<TransactionState>;
}

/// One open write transaction.
pub struct Transaction {
    state: Arc<TransactionState>,
}

impl Transaction {
    pub fn begin() -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        log::trace!("Transaction {} opened", id);
        Self {
            state: Arc::new(TransactionState {
                id,
                hooks: Mutex::new(Some(Vec::new())),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Run `fut` as part of this transaction.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT.scope(self.state.clone(), fut).await
    }

    /// Mark the transaction committed and fire the queued hooks.
    /// Returns how many hooks ran.
    pub fn commit(self) -> usize {
        self.state.finish(Outcome::Committed)
    }

    /// End the transaction without committing. Queued evictions still run.
    pub fn rollback(self) -> usize {
        self.state.finish(Outcome::RolledBack)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.state.finish(Outcome::Abandoned);
    }
}

/// Whether the calling task runs inside an open write transaction.
pub fn in_transaction() -> bool {
    CURRENT.try_with(|state| state.is_open()).unwrap_or(false)
}

/// Run `hook` when the current transaction ends, or right away when there
/// is no open transaction.
pub(crate) fn on_transaction_end(hook: impl FnOnce() + Send + 'static) {
    let hook: Deferred = Box::new(hook);
    let pending = match CURRENT.try_with(Arc::clone) {
        Ok(state) => state.defer(hook),
        Err(_) => Some(hook),
    };
    if let Some(hook) = pending {
        hook();
    }
}

/// Transaction membership captured from the calling task so that work
/// spawned on another task observes the same boundary.
pub(crate) struct TransactionContext(Option<Arc<TransactionState>>);

impl TransactionContext {
    pub(crate) fn capture() -> Self {
        Self(CURRENT.try_with(Arc::clone).ok())
    }

    pub(crate) async fn run<F: Future>(self, fut: F) -> F::Output {
        match self.0 {
            Some(state) => CURRENT.scope(state, fut).await,
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_no_transaction_runs_immediately() {
        assert!(!in_transaction());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        on_transaction_end(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hooks_wait_for_commit() {
        let fired = Arc::new(AtomicUsize::new(0));
        let tx = Transaction::begin();
        let counter = fired.clone();
        tx.scope(async move {
            assert!(in_transaction());
            on_transaction_end(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        })
        .await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(tx.commit(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rollback_still_runs_hooks() {
        let fired = Arc::new(AtomicUsize::new(0));
        let tx = Transaction::begin();
        let counter = fired.clone();
        tx.scope(async move {
            on_transaction_end(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        })
        .await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(tx.rollback(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_runs_hooks_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let tx = Transaction::begin();
            let counter = fired.clone();
            tx.scope(async move {
                on_transaction_end(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            })
            .await;
            assert_eq!(fired.load(Ordering::SeqCst), 0);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // A committed transaction does not fire again when dropped.
        let tx = Transaction::begin();
        let counter = fired.clone();
        tx.scope(async move {
            on_transaction_end(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        })
        .await;
        assert_eq!(tx.commit(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hook_after_end_runs_immediately() {
        let tx = Transaction::begin();
        let state = tx.state.clone();
        tx.commit();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        CURRENT
            .scope(state, async move {
                assert!(!in_transaction());
                on_transaction_end(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            })
            .await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_context_carries_into_spawned_task() {
        let tx = Transaction::begin();
        let seen = tx
            .scope(async {
                let ctx = TransactionContext::capture();
                tokio::spawn(ctx.run(async { in_transaction() })).await.unwrap()
            })
            .await;
        assert!(seen);
        let outside = tokio::spawn(TransactionContext::capture().run(async { in_transaction() }))
            .await
            .unwrap();
        assert!(!outside);
        tx.commit();
    }
}
