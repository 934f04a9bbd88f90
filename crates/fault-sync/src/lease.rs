//! Run Mutual Exclusion

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone)]
struct Holder {
    owner: String,
    expires_at: Instant,
}

/// An advisory lease ensuring one sync run at a time.
///
/// A scheduler tick that finds the lease held skips its run rather than
/// queueing. The expiry lets the scheduler recover if a run dies without
/// releasing (a leaked guard), instead of wedging forever the way a bare
/// boolean flag would.
#[derive(Debug, Clone)]
pub struct RunLease {
    inner: Arc<Mutex<Option<Holder>>>,
    ttl: Duration,
}

impl RunLease {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            ttl,
        }
    }

    /// Acquires the lease if free or expired. Returns `None` while a
    /// live holder exists.
    pub fn try_acquire(&self, owner: impl Into<String>) -> Option<LeaseGuard> {
        let owner = owner.into();
        let mut slot = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(holder) = slot.as_ref() {
            if holder.expires_at > Instant::now() {
                return None;
            }
            warn!(
                stale_owner = %holder.owner,
                "Expired run lease found, reclaiming"
            );
        }

        *slot = Some(Holder {
            owner: owner.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Some(LeaseGuard {
            inner: Arc::clone(&self.inner),
            owner,
        })
    }

    /// Current holder, if the lease is live.
    pub fn holder(&self) -> Option<String> {
        let slot = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        slot.as_ref()
            .filter(|h| h.expires_at > Instant::now())
            .map(|h| h.owner.clone())
    }
}

/// Releases the lease on drop, but only if this guard still owns it
/// (a reclaimed expired lease belongs to the new owner).
pub struct LeaseGuard {
    inner: Arc<Mutex<Option<Holder>>>,
    owner: String,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let mut slot = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.as_ref().map_or(false, |h| h.owner == self.owner) {
            *slot = None;
        }
    }
}
