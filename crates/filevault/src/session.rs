//! The session key cache.
//!
//! Holds the viewer's master key between `unlock` and `clear`. Any number of
//! readers may borrow the key at once; unlocking and clearing take the write
//! lock. The key is only ever lent out through a guard or a closure, so no
//! caller can keep a copy beyond its own stack frame.
//!
//! ```text
//!   Locked ──unlock──▶ Unlocked ──clear / TTL──▶ Locked
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use zeroize::Zeroize;

use filevault_core::{MasterKeyMaterial, KEY_LEN};

/// Errors from the session key cache.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// No master key is available.
    #[error("session is locked")]
    Locked,
}

/// Observable state of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocked,
}

struct Slot {
    /// All zeros while locked.
    master: MasterKeyMaterial,
    unlocked_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, ttl: Option<Duration>) -> bool {
        match (self.unlocked_at, ttl) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(at), Some(ttl)) => at.elapsed() < ttl,
        }
    }

    fn wipe(&mut self) {
        self.master.zeroize();
        self.unlocked_at = None;
    }
}

/// Single-writer, many-reader holder of the master key.
pub struct SessionKeyCache {
    slot: RwLock<Slot>,
    ttl: Option<Duration>,
}

/// A borrowed master key. Releases the read lock when dropped.
pub struct SessionGuard<'a> {
    slot: RwLockReadGuard<'a, Slot>,
}

impl Deref for SessionGuard<'_> {
    type Target = MasterKeyMaterial;

    fn deref(&self) -> &MasterKeyMaterial {
        &self.slot.master
    }
}

impl SessionKeyCache {
    /// Create a locked cache. With `ttl`, an unlocked key expires that long
    /// after [`unlock`](Self::unlock).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            slot: RwLock::new(Slot {
                master: MasterKeyMaterial::from_bytes([0; KEY_LEN]),
                unlocked_at: None,
            }),
            ttl,
        }
    }

    /// Store the master key, replacing (and wiping) any previous one.
    pub fn unlock(&self, master: MasterKeyMaterial) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.master = master;
        slot.unlocked_at = Some(Instant::now());
        tracing::debug!("session unlocked");
    }

    /// Borrow the master key.
    ///
    /// An expired key is wiped before `Locked` is returned.
    pub fn get(&self) -> Result<SessionGuard<'_>, SessionError> {
        {
            let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
            if slot.is_live(self.ttl) {
                return Ok(SessionGuard { slot });
            }
            if slot.unlocked_at.is_none() {
                return Err(SessionError::Locked);
            }
        }

        self.expire();
        Err(SessionError::Locked)
    }

    /// Run `f` with the master key borrowed for its duration.
    pub fn with_key<T>(&self, f: impl FnOnce(&MasterKeyMaterial) -> T) -> Result<T, SessionError> {
        let guard = self.get()?;
        Ok(f(&*guard))
    }

    /// Wipe the master key and return to `Locked`.
    pub fn clear(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.wipe();
        tracing::debug!("session cleared");
    }

    /// Current state, taking the TTL into account.
    pub fn state(&self) -> SessionState {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        if slot.is_live(self.ttl) {
            SessionState::Unlocked
        } else {
            SessionState::Locked
        }
    }

    /// Wipe the key if it is unlocked but past its TTL.
    fn expire(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have unlocked again since the read.
        if slot.unlocked_at.is_some() && !slot.is_live(self.ttl) {
            slot.wipe();
            tracing::debug!("session expired");
        }
    }
}

impl Default for SessionKeyCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for SessionKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyCache")
            .field("state", &self.state())
            .field("ttl", &self.ttl)
            .finish()
    }
}
