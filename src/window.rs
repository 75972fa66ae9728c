//! Bounded table of in-flight requests awaiting a response.
//!
//! Each entry is keyed by sequence number and resolved exactly once: by a
//! matching response ([`Window::complete`]), by its waiter giving up
//! ([`WindowFuture::await_response`] timing out or being dropped), or by the
//! expiry sweep ([`Window::expire`]). All three remove the slot under the same
//! lock, so whichever gets there first decides the outcome and releases the
//! slot's capacity permit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};

/// Window errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("no window slot became free within {0:?}")]
    OfferTimeout(Duration),

    #[error("sequence {0} is already pending")]
    DuplicateKey(u32),

    #[error("no response for sequence {0} before the waiter gave up")]
    Timeout(u32),

    #[error("entry for sequence {0} expired or was cancelled")]
    Expired(u32),

    #[error("window closed")]
    Closed,
}

struct Slot<Req, Resp> {
    /// Distinguishes reuses of the same sequence number.
    id: u64,
    request: Req,
    offered_at: Instant,
    expire_at: Instant,
    tx: oneshot::Sender<Resp>,
    _permit: OwnedSemaphorePermit,
}

/// Pending-request window.
pub struct Window<Req, Resp> {
    capacity: usize,
    permits: Arc<Semaphore>,
    slots: Mutex<HashMap<u32, Slot<Req, Resp>>>,
    next_id: AtomicU64,
}

impl<Req, Resp> Window<Req, Resp> {
    /// Create a window holding at most `capacity` outstanding requests.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
            slots: Mutex::new(HashMap::with_capacity(capacity)),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of outstanding entries.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn contains(&self, key: u32) -> bool {
        self.lock().contains_key(&key)
    }

    /// Register `request` under `key`.
    ///
    /// Waits up to `offer_timeout` for capacity when the window is full. The
    /// entry is reclaimed by [`Window::expire`] once `expire_timeout` has
    /// passed without a response.
    pub async fn offer(
        self: &Arc<Self>,
        key: u32,
        request: Req,
        offer_timeout: Duration,
        expire_timeout: Duration,
    ) -> Result<WindowFuture<Req, Resp>, WindowError> {
        if self.contains(key) {
            return Err(WindowError::DuplicateKey(key));
        }

        let permit = match tokio::time::timeout(offer_timeout, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(WindowError::Closed),
            Err(_) => return Err(WindowError::OfferTimeout(offer_timeout)),
        };

        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        let mut slots = self.lock();
        // Re-check: another offer may have taken the key while we waited.
        if slots.contains_key(&key) {
            return Err(WindowError::DuplicateKey(key));
        }
        slots.insert(
            key,
            Slot {
                id,
                request,
                offered_at: now,
                expire_at: now + expire_timeout,
                tx,
                _permit: permit,
            },
        );

        Ok(WindowFuture {
            key,
            id,
            rx,
            window: Arc::clone(self),
            resolved: false,
        })
    }

    /// Resolve the entry under `key` with `response`.
    ///
    /// Returns the original request and how long it was outstanding, or
    /// `None` if nothing is pending under that key.
    pub fn complete(&self, key: u32, response: Resp) -> Option<(Req, Duration)> {
        let slot = self.lock().remove(&key)?;
        let waited = slot.offered_at.elapsed();
        // The waiter may already be gone; the entry is resolved either way.
        let _ = slot.tx.send(response);
        Some((slot.request, waited))
    }

    /// Remove the entry under `key` without a response.
    pub fn cancel(&self, key: u32) -> Option<Req> {
        self.lock().remove(&key).map(|slot| slot.request)
    }

    /// Remove every entry whose expiry deadline has passed.
    pub fn expire(&self) -> Vec<(u32, Req)> {
        let now = Instant::now();
        let mut slots = self.lock();
        let expired: Vec<u32> = slots
            .iter()
            .filter(|(_, slot)| slot.expire_at <= now)
            .map(|(key, _)| *key)
            .collect();

        expired
            .into_iter()
            .filter_map(|key| slots.remove(&key).map(|slot| (key, slot.request)))
            .collect()
    }

    /// Close the window: pending waiters are released and new offers fail.
    pub fn close(&self) -> usize {
        self.permits.close();
        let mut slots = self.lock();
        let count = slots.len();
        slots.clear();
        count
    }

    fn cancel_slot(&self, key: u32, id: u64) -> bool {
        let mut slots = self.lock();
        match slots.get(&key) {
            Some(slot) if slot.id == id => {
                slots.remove(&key);
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Slot<Req, Resp>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one outstanding window entry.
///
/// Dropping an unresolved handle cancels its entry.
pub struct WindowFuture<Req, Resp> {
    key: u32,
    id: u64,
    rx: oneshot::Receiver<Resp>,
    window: Arc<Window<Req, Resp>>,
    resolved: bool,
}

impl<Req, Resp> WindowFuture<Req, Resp> {
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Wait up to `timeout` for the response.
    pub async fn await_response(mut self, timeout: Duration) -> Result<Resp, WindowError> {
        let result = tokio::time::timeout(timeout, &mut self.rx).await;
        self.resolved = true;

        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(WindowError::Expired(self.key)),
            Err(_) => {
                if self.window.cancel_slot(self.key, self.id) {
                    return Err(WindowError::Timeout(self.key));
                }
                // Lost the race: a completion removed the slot first and its
                // response is already in the channel.
                self.rx
                    .try_recv()
                    .map_err(|_| WindowError::Expired(self.key))
            }
        }
    }
}

impl<Req, Resp> Drop for WindowFuture<Req, Resp> {
    fn drop(&mut self) {
        if !self.resolved {
            self.window.cancel_slot(self.key, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: Duration = Duration::from_millis(200);
    const EXPIRE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_complete_wakes_waiter() {
        let window: Arc<Window<&str, u32>> = Window::new(4);
        let future = window.offer(7, "req", OFFER, EXPIRE).await.unwrap();
        assert_eq!(window.size(), 1);

        let (request, _) = window.complete(7, 700).unwrap();
        assert_eq!(request, "req");

        assert_eq!(future.await_response(Duration::from_secs(1)).await, Ok(700));
        assert_eq!(window.size(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_completion_is_dropped() {
        let window: Arc<Window<(), u32>> = Window::new(4);
        assert!(window.complete(99, 1).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let window: Arc<Window<(), ()>> = Window::new(4);
        let _first = window.offer(1, (), OFFER, EXPIRE).await.unwrap();
        let second = window.offer(1, (), OFFER, EXPIRE).await;
        assert_eq!(second.err(), Some(WindowError::DuplicateKey(1)));
    }

    #[tokio::test]
    async fn test_timeout_reclaims_slot() {
        let window: Arc<Window<(), u32>> = Window::new(1);
        let future = window.offer(5, (), OFFER, EXPIRE).await.unwrap();

        let result = future.await_response(Duration::from_millis(20)).await;
        assert_eq!(result, Err(WindowError::Timeout(5)));
        assert_eq!(window.size(), 0);

        // Same key and the single permit are both available again.
        let again = window.offer(5, (), OFFER, EXPIRE).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_full_window_blocks_offer() {
        let window: Arc<Window<(), u32>> = Window::new(1);
        let _held = window.offer(1, (), OFFER, EXPIRE).await.unwrap();

        let started = Instant::now();
        let blocked = window.offer(2, (), Duration::from_millis(50), EXPIRE).await;
        assert_eq!(blocked.err(), Some(WindowError::OfferTimeout(Duration::from_millis(50))));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_blocked_offer_proceeds_when_capacity_frees() {
        let window: Arc<Window<(), u32>> = Window::new(1);
        let _held = window.offer(1, (), OFFER, EXPIRE).await.unwrap();

        let waiter = {
            let window = window.clone();
            tokio::spawn(async move { window.offer(2, (), Duration::from_secs(2), EXPIRE).await.map(|f| f.key()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        window.complete(1, 10);

        assert_eq!(waiter.await.unwrap(), Ok(2));
    }

    #[tokio::test]
    async fn test_dropped_future_cancels_entry() {
        let window: Arc<Window<(), u32>> = Window::new(2);
        let future = window.offer(3, (), OFFER, EXPIRE).await.unwrap();
        drop(future);
        assert!(!window.contains(3));
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_cancel_reused_key() {
        let window: Arc<Window<(), u32>> = Window::new(2);
        let first = window.offer(3, (), OFFER, EXPIRE).await.unwrap();
        window.complete(3, 1);

        let _second = window.offer(3, (), OFFER, EXPIRE).await.unwrap();
        drop(first);
        assert!(window.contains(3));
    }

    #[tokio::test]
    async fn test_expire_releases_waiter() {
        let window: Arc<Window<&str, u32>> = Window::new(2);
        let future = window.offer(4, "late", OFFER, Duration::ZERO).await.unwrap();

        let expired = window.expire();
        assert_eq!(expired, vec![(4, "late")]);

        let result = future.await_response(Duration::from_secs(1)).await;
        assert_eq!(result, Err(WindowError::Expired(4)));
    }

    #[tokio::test]
    async fn test_close_rejects_offers() {
        let window: Arc<Window<(), u32>> = Window::new(2);
        let _pending = window.offer(1, (), OFFER, EXPIRE).await.unwrap();
        assert_eq!(window.close(), 1);

        let result = window.offer(2, (), OFFER, EXPIRE).await;
        assert_eq!(result.err(), Some(WindowError::Closed));
    }

    #[tokio::test]
    async fn test_concurrent_waiters_get_their_own_response() {
        let window: Arc<Window<u32, u32>> = Window::new(16);
        let mut futures = Vec::new();
        for seq in 1..=10u32 {
            futures.push(window.offer(seq, seq, OFFER, EXPIRE).await.unwrap());
        }

        let waiters: Vec<_> = futures
            .into_iter()
            .map(|f| {
                let key = f.key();
                tokio::spawn(async move { (key, f.await_response(Duration::from_secs(2)).await) })
            })
            .collect();

        // Complete in reverse order.
        for seq in (1..=10u32).rev() {
            window.complete(seq, seq * 100);
        }

        for waiter in waiters {
            let (key, result) = waiter.await.unwrap();
            assert_eq!(result, Ok(key * 100));
        }
        assert_eq!(window.size(), 0);
    }

    #[tokio::test]
    async fn test_completion_racing_timeout_resolves_once() {
        for _ in 0..50 {
            let window: Arc<Window<(), u32>> = Window::new(1);
            let future = window.offer(1, (), OFFER, EXPIRE).await.unwrap();

            let completer = {
                let window = window.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    window.complete(1, 42).is_some()
                })
            };

            let result = future.await_response(Duration::from_millis(1)).await;
            let completed = completer.await.unwrap();

            match result {
                Ok(42) => assert!(completed),
                Err(WindowError::Timeout(1)) => assert!(!completed),
                other => panic!("unexpected outcome {:?}", other),
            }
            assert_eq!(window.size(), 0);
        }
    }
}
