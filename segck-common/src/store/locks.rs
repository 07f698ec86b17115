//! Exclusive per-segment claims
//!
//! A lock maps a segment id to the user holding it. Locks never expire and
//! never queue: a conflicting claim fails immediately. A lock left behind by a
//! crashed client stays until its holder, or an operator acting for the
//! holder, calls [`LockManager::unlock_all`].

use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// Lock table guarded by its own read/write mutex, independent of the
/// annotation data mutex. Probes take the shared side, mutations the
/// exclusive side.
#[derive(Debug, Default)]
pub struct LockManager {
    held: RwLock<HashMap<String, String>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` for `user`. Fails if anyone holds it, including `user`.
    pub fn lock(&self, id: &str, user: &str) -> Result<()> {
        let mut held = self.held.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(by) = held.get(id) {
            return Err(Error::AlreadyLocked {
                id: id.to_string(),
                by: by.clone(),
            });
        }
        held.insert(id.to_string(), user.to_string());
        info!(segment_id = %id, user = %user, "Locked segment");
        Ok(())
    }

    /// Release `id`, which must be held by `user`
    pub fn unlock(&self, id: &str, user: &str) -> Result<()> {
        let mut held = self.held.write().unwrap_or_else(PoisonError::into_inner);
        match held.get(id) {
            None => Err(Error::NotLocked(id.to_string())),
            Some(by) if by != user => Err(Error::NotOwner {
                id: id.to_string(),
                user: user.to_string(),
            }),
            Some(_) => {
                held.remove(id);
                info!(segment_id = %id, user = %user, "Unlocked segment");
                Ok(())
            }
        }
    }

    /// Release every segment held by `user`. Returns how many were released.
    pub fn unlock_all(&self, user: &str) -> usize {
        let mut held = self.held.write().unwrap_or_else(PoisonError::into_inner);
        let before = held.len();
        held.retain(|_, by| by != user);
        let released = before - held.len();
        info!(user = %user, released, "Unlocked all segments for user");
        released
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.held
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Current holder of `id`, if any
    pub fn holder(&self, id: &str) -> Option<String> {
        self.held
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.held.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the lock table, so callers can work with it without holding
    /// the lock mutex while they take other locks.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.held.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_second_user_cannot_lock() {
        let locks = LockManager::new();
        locks.lock("a", "u1").unwrap();

        match locks.lock("a", "u2") {
            Err(Error::AlreadyLocked { id, by }) => {
                assert_eq!(id, "a");
                assert_eq!(by, "u1");
            }
            other => panic!("expected AlreadyLocked, got {:?}", other),
        }
    }

    #[test]
    fn test_same_user_cannot_relock() {
        let locks = LockManager::new();
        locks.lock("a", "u1").unwrap();
        assert!(matches!(
            locks.lock("a", "u1"),
            Err(Error::AlreadyLocked { .. })
        ));
    }

    #[test]
    fn test_unlock_then_lock_by_other_user() {
        let locks = LockManager::new();
        locks.lock("a", "u1").unwrap();
        locks.unlock("a", "u1").unwrap();
        locks.lock("a", "u2").unwrap();
        assert_eq!(locks.holder("a").as_deref(), Some("u2"));
    }

    #[test]
    fn test_unlock_errors() {
        let locks = LockManager::new();
        assert!(matches!(locks.unlock("a", "u1"), Err(Error::NotLocked(_))));

        locks.lock("a", "u1").unwrap();
        assert!(matches!(
            locks.unlock("a", "u2"),
            Err(Error::NotOwner { .. })
        ));
        assert!(locks.is_locked("a"));
    }

    #[test]
    fn test_unlock_all_only_touches_user() {
        let locks = LockManager::new();
        locks.lock("a", "u1").unwrap();
        locks.lock("b", "u1").unwrap();
        locks.lock("c", "u2").unwrap();

        assert_eq!(locks.unlock_all("u1"), 2);
        assert!(!locks.is_locked("a"));
        assert!(!locks.is_locked("b"));
        assert!(locks.is_locked("c"));
        assert_eq!(locks.unlock_all("nobody"), 0);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_concurrent_claims_have_single_winner() {
        let locks = Arc::new(LockManager::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let locks = Arc::clone(&locks);
                std::thread::spawn(move || locks.lock("a", &format!("u{}", i)).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(locks.len(), 1);
    }
}
