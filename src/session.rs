//! # Session Recommendation Cache
//!
//! Per-user cache of the embedding neighbourhood, stored in the
//! [`Namespace::Sessions`](crate::store::Namespace::Sessions) namespace.
//!
//! Each user is in one of two states:
//!
//! ```text
//!            warm(ids)                    end()
//!   Cold  ───────────────▶  Warm(ids)  ───────────▶  Cold
//! ```
//!
//! - **Cold**: no cached neighbourhood. The next embedding request computes
//!   one and calls [`SessionCache::warm`].
//! - **Warm**: a neighbourhood exists and is reused for every request until
//!   the bot reports the end of the listening session ([`SessionCache::end`]).
//!
//! Two first requests racing for the same user may both compute and both
//! write; the last write wins. Each write is a single atomic `set`, so a
//! reader sees one complete neighbourhood or none.

use log::debug;

use crate::store::{SharedStore, StoreError, StoreExt};
use crate::track::{TrackId, UserId};

/// Where a user's session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Cold,
    Warm(Vec<TrackId>),
}

impl SessionState {
    #[must_use]
    pub fn is_warm(&self) -> bool {
        matches!(self, SessionState::Warm(_))
    }
}

/// Store-backed session cache. Holds no state of its own.
#[derive(Clone)]
pub struct SessionCache {
    store: SharedStore,
}

impl SessionCache {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Current state for `user`. An empty stored list counts as Cold.
    pub fn state(&self, user: UserId) -> Result<SessionState, StoreError> {
        let state = match self.store.get_value::<Vec<TrackId>>(user)? {
            Some(tracks) if !tracks.is_empty() => SessionState::Warm(tracks),
            _ => SessionState::Cold,
        };
        Ok(state)
    }

    /// Cold -> Warm. Overwrites whatever a concurrent request wrote.
    pub fn warm(&self, user: UserId, neighbourhood: &[TrackId]) -> Result<(), StoreError> {
        self.store.set_value(user, neighbourhood)?;
        debug!(
            "Session for user {user}: Cold -> Warm ({} tracks)",
            neighbourhood.len()
        );
        Ok(())
    }

    /// Warm -> Cold. Returns whether the user had a cached neighbourhood.
    pub fn end(&self, user: UserId) -> Result<bool, StoreError> {
        let was_warm = self.store.exists(user)?;
        self.store.delete(user)?;
        if was_warm {
            debug!("Session for user {user}: Warm -> Cold");
        } else {
            debug!("Session for user {user} ended while already Cold");
        }
        Ok(was_warm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_state_machine() {
        let cache = SessionCache::new(Arc::new(MemoryStore::new()));

        assert_eq!(cache.state(1).unwrap(), SessionState::Cold);

        cache.warm(1, &[4, 5, 6]).unwrap();
        assert_eq!(cache.state(1).unwrap(), SessionState::Warm(vec![4, 5, 6]));
        assert_eq!(cache.state(2).unwrap(), SessionState::Cold);

        assert!(cache.end(1).unwrap());
        assert_eq!(cache.state(1).unwrap(), SessionState::Cold);
        assert!(!cache.end(1).unwrap());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = SessionCache::new(Arc::new(MemoryStore::new()));

        cache.warm(1, &[1, 2]).unwrap();
        cache.warm(1, &[3, 4]).unwrap();

        assert_eq!(cache.state(1).unwrap(), SessionState::Warm(vec![3, 4]));
    }

    #[test]
    fn test_empty_neighbourhood_is_cold() {
        let cache = SessionCache::new(Arc::new(MemoryStore::new()));
        cache.warm(1, &[]).unwrap();
        assert!(!cache.state(1).unwrap().is_warm());
    }
}
