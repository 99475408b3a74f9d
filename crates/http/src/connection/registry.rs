//! Live socket and HTTP/2 session bookkeeping.
//!
//! Every accepted socket registers itself and gets a [`SocketLease`]. The
//! lease refreshes the socket's last-activity timestamp, exposes a token that
//! fires when the socket must be destroyed, and removes the entry on drop.
//! The idle reaper calls [`SocketRegistry::evict_idle`] periodically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::trace;

#[derive(Debug)]
struct SocketEntry {
    /// Milliseconds since the registry epoch.
    last_active: AtomicU64,
    keep_alive: Duration,
    destroy: CancellationToken,
}

/// A socket evicted for being idle too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub id: u64,
    pub idle: Duration,
}

#[derive(Debug)]
pub struct SocketRegistry {
    epoch: Instant,
    next_id: AtomicU64,
    sockets: Mutex<HashMap<u64, Arc<SocketEntry>>>,
}

impl Default for SocketRegistry {
    fn default() -> Self {
        Self { epoch: Instant::now(), next_id: AtomicU64::new(1), sockets: Mutex::new(HashMap::new()) }
    }
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a new socket that may stay idle for at most `keep_alive`.
    pub fn register(self: &Arc<Self>, keep_alive: Duration) -> SocketLease {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(SocketEntry {
            last_active: AtomicU64::new(self.millis_at(Instant::now())),
            keep_alive,
            destroy: CancellationToken::new(),
        });
        self.sockets().insert(id, Arc::clone(&entry));
        trace!(socket_id = id, "socket registered");
        SocketLease { id, registry: Arc::clone(self), entry }
    }

    pub fn len(&self) -> usize {
        self.sockets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys and forgets every socket idle longer than its keep-alive timeout.
    pub fn evict_idle(&self) -> Vec<Eviction> {
        self.evict_idle_at(Instant::now())
    }

    pub fn evict_idle_at(&self, now: Instant) -> Vec<Eviction> {
        let now = self.millis_at(now);
        let mut evicted = Vec::new();
        self.sockets().retain(|id, entry| {
            let idle = Duration::from_millis(now.saturating_sub(entry.last_active.load(Ordering::Relaxed)));
            if idle > entry.keep_alive {
                entry.destroy.cancel();
                evicted.push(Eviction { id: *id, idle });
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Destroys every registered socket, used when the server stops.
    pub fn destroy_all(&self) -> usize {
        let mut sockets = self.sockets();
        let count = sockets.len();
        for (_, entry) in sockets.drain() {
            entry.destroy.cancel();
        }
        count
    }

    fn millis_at(&self, at: Instant) -> u64 {
        u64::try_from(at.saturating_duration_since(self.epoch).as_millis()).unwrap_or(u64::MAX)
    }

    fn sockets(&self) -> MutexGuard<'_, HashMap<u64, Arc<SocketEntry>>> {
        self.sockets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration of one socket, removed from the registry on drop.
#[derive(Debug)]
pub struct SocketLease {
    id: u64,
    registry: Arc<SocketRegistry>,
    entry: Arc<SocketEntry>,
}

impl SocketLease {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn touch(&self) {
        self.tracker().touch();
    }

    /// Cheap handle for refreshing the activity timestamp from elsewhere.
    pub fn tracker(&self) -> ActivityTracker {
        ActivityTracker { epoch: self.registry.epoch, entry: Arc::clone(&self.entry) }
    }

    /// Resolves once the socket has been evicted or the server is stopping.
    pub fn destroyed(&self) -> WaitForCancellationFutureOwned {
        self.entry.destroy.clone().cancelled_owned()
    }

    pub fn is_destroyed(&self) -> bool {
        self.entry.destroy.is_cancelled()
    }
}

impl Drop for SocketLease {
    fn drop(&mut self) {
        self.registry.sockets().remove(&self.id);
        trace!(socket_id = self.id, "socket unregistered");
    }
}

#[derive(Debug, Clone)]
pub struct ActivityTracker {
    epoch: Instant,
    entry: Arc<SocketEntry>,
}

impl ActivityTracker {
    pub fn touch(&self) {
        let millis = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.entry.last_active.store(millis, Ordering::Relaxed);
    }
}

/// Active HTTP/2 sessions, so they can be asked to go away on shutdown.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, CancellationToken>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self: &Arc<Self>) -> SessionLease {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shutdown = CancellationToken::new();
        self.sessions().insert(id, shutdown.clone());
        SessionLease { id, registry: Arc::clone(self), shutdown }
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Asks every session for a graceful `GOAWAY`.
    pub fn shutdown_all(&self) -> usize {
        let sessions = self.sessions();
        for token in sessions.values() {
            token.cancel();
        }
        sessions.len()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct SessionLease {
    id: u64,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
}

impl SessionLease {
    pub fn shutdown_requested(&self) -> WaitForCancellationFutureOwned {
        self.shutdown.clone().cancelled_owned()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.sessions().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_drop_removes_entry() {
        let registry = Arc::new(SocketRegistry::new());
        let first = registry.register(Duration::from_secs(5));
        let second = registry.register(Duration::from_secs(5));
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len(), 2);

        drop(first);
        assert_eq!(registry.len(), 1);
        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn idle_sockets_are_evicted_and_destroyed() {
        let registry = Arc::new(SocketRegistry::new());
        let short = registry.register(Duration::from_millis(100));
        let long = registry.register(Duration::from_secs(60));

        let later = Instant::now() + Duration::from_secs(1);
        let evicted = registry.evict_idle_at(later);

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, short.id());
        assert!(short.is_destroyed());
        assert!(!long.is_destroyed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn touch_postpones_eviction() {
        let registry = Arc::new(SocketRegistry::new());
        let lease = registry.register(Duration::from_millis(500));
        std::thread::sleep(Duration::from_millis(20));
        lease.touch();

        assert!(registry.evict_idle_at(Instant::now() + Duration::from_millis(400)).is_empty());
        assert_eq!(registry.evict_idle_at(Instant::now() + Duration::from_secs(2)).len(), 1);
    }

    #[tokio::test]
    async fn destroy_all_fires_tokens() {
        let registry = Arc::new(SocketRegistry::new());
        let lease = registry.register(Duration::from_secs(5));
        let destroyed = lease.destroyed();

        assert_eq!(registry.destroy_all(), 1);
        destroyed.await;
        assert!(lease.is_destroyed());
    }

    #[test]
    fn sessions_track_and_shutdown() {
        let sessions = Arc::new(SessionRegistry::new());
        let lease = sessions.register();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.shutdown_all(), 1);
        drop(lease);
        assert!(sessions.is_empty());
    }
}
