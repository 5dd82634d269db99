//! Single-flight token refresh.
//!
//! When several tasks find their credential expired at once, only the
//! first runs the refresh. The rest queue a oneshot waiter and receive
//! the same outcome.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

type Outcome<T> = Result<T, String>;

struct Flight<T> {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<Outcome<T>>>,
}

/// Coordinates concurrent refreshes of a shared token.
pub struct TokenRefresher<T: Clone> {
    flight: Mutex<Flight<T>>,
    refreshes: AtomicU64,
}

/// Clears the in-flight flag if the leading refresh is dropped before it
/// completes. Dropping the waiters' senders wakes them with an error.
struct LeaderGuard<'a, T: Clone> {
    refresher: &'a TokenRefresher<T>,
    finished: bool,
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            let mut flight = self.refresher.flight.lock();
            flight.in_flight = false;
            flight.waiters.clear();
        }
    }
}

impl<T: Clone> Default for TokenRefresher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> TokenRefresher<T> {
    /// Creates an idle refresher.
    pub fn new() -> Self {
        Self {
            flight: Mutex::new(Flight {
                in_flight: false,
                waiters: Vec::new(),
            }),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Number of refreshes actually run.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// True while a refresh is running.
    pub fn is_refreshing(&self) -> bool {
        self.flight.lock().in_flight
    }

    /// Runs `refresh` unless one is already running, in which case waits
    /// for that one's result.
    ///
    /// # Errors
    ///
    /// [`SyncError::RefreshFailed`] with the refresh's error message, or
    /// [`SyncError::Cancelled`] if the leading refresh was dropped.
    pub async fn refresh<F, Fut>(&self, refresh: F) -> SyncResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let waiter = {
            let mut flight = self.flight.lock();
            if flight.in_flight {
                let (tx, rx) = oneshot::channel();
                flight.waiters.push(tx);
                Some(rx)
            } else {
                flight.in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            debug!("token refresh in flight, waiting");
            return match rx.await {
                Ok(outcome) => outcome.map_err(SyncError::RefreshFailed),
                Err(_) => Err(SyncError::Cancelled),
            };
        }

        let mut guard = LeaderGuard {
            refresher: self,
            finished: false,
        };
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let outcome = refresh().await;

        let waiters = {
            let mut flight = self.flight.lock();
            flight.in_flight = false;
            std::mem::take(&mut flight.waiters)
        };
        guard.finished = true;
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "token refresh finished");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        outcome.map_err(SyncError::RefreshFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let refresher = Arc::new(TokenRefresher::<String>::new());
        let gate = Arc::new(Notify::new());

        let leader = {
            let refresher = Arc::clone(&refresher);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                refresher
                    .refresh(|| async move {
                        gate.notified().await;
                        Ok("fresh".to_string())
                    })
                    .await
            })
        };
        while !refresher.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let followers: Vec<_> = (0..4)
            .map(|_| {
                let refresher = Arc::clone(&refresher);
                tokio::spawn(async move {
                    refresher
                        .refresh(|| async { Ok("unused".to_string()) })
                        .await
                })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        assert_eq!(leader.await.unwrap().unwrap(), "fresh");
        for follower in followers {
            assert_eq!(follower.await.unwrap().unwrap(), "fresh");
        }
        assert_eq!(refresher.refresh_count(), 1);
        assert!(!refresher.is_refreshing());
    }

    #[tokio::test]
    async fn failures_reach_every_waiter() {
        let refresher = TokenRefresher::<String>::new();
        let err = refresher
            .refresh(|| async { Err("expired".to_string()) })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RefreshFailed(ref m) if m == "expired"));

        let ok = refresher.refresh(|| async { Ok("next".to_string()) }).await;
        assert_eq!(ok.unwrap(), "next");
        assert_eq!(refresher.refresh_count(), 2);
    }

    #[tokio::test]
    async fn dropped_leader_releases_the_flight() {
        let refresher = Arc::new(TokenRefresher::<String>::new());
        let leader = {
            let refresher = Arc::clone(&refresher);
            tokio::spawn(async move {
                refresher
                    .refresh(|| std::future::pending::<Outcome<String>>())
                    .await
            })
        };
        while !refresher.is_refreshing() {
            tokio::task::yield_now().await;
        }
        leader.abort();
        let _ = leader.await;
        assert!(!refresher.is_refreshing());
    }
}
