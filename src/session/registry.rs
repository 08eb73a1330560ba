//! Capacity-bounded session map ordered by insertion.
//!
//! Lookups never promote an entry; only (re)insertion does. When full, the
//! least recently inserted session is evicted to make room.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::command::SessionId;
use super::state::Session;

pub const MIN_SESSIONS: usize = 2;
pub const MAX_SESSIONS: usize = 128;
pub const DEFAULT_SESSIONS: usize = 64;

pub struct SessionRegistry {
    sessions: LruCache<SessionId, Session>,
}

impl SessionRegistry {
    /// Capacity is clamped to `[MIN_SESSIONS, MAX_SESSIONS]`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_SESSIONS, MAX_SESSIONS);
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: LruCache::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.sessions.cap().get()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.capacity()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains(&id)
    }

    /// Insert `session`, evicting and returning the oldest entry when full.
    ///
    /// # Panics
    ///
    /// Panics if a session with the same id is already registered.
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        let evicted = if self.is_full() {
            self.evict_oldest()
        } else {
            None
        };

        let id = session.id();
        if let Some((displaced, _)) = self.sessions.push(id, session) {
            panic!("session registry displaced {displaced} while inserting {id}");
        }
        evicted
    }

    pub fn erase(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.pop(&id)
    }

    pub fn evict_oldest(&mut self) -> Option<Session> {
        self.sessions.pop_lru().map(|(_, session)| session)
    }

    pub fn lookup(&self, id: SessionId) -> Option<&Session> {
        self.sessions.peek(&id)
    }

    pub fn lookup_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.peek_mut(&id)
    }

    pub fn oldest(&self) -> Option<&Session> {
        self.sessions.peek_lru().map(|(_, session)| session)
    }

    pub fn newest(&self) -> Option<&Session> {
        self.sessions.iter().next().map(|(_, session)| session)
    }

    /// Sessions from least to most recently inserted.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter().rev().map(|(_, session)| session)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut().map(|(_, session)| session)
    }

    /// Ids from least to most recently inserted.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().rev().map(|(id, _)| *id).collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSIONS)
    }
}
