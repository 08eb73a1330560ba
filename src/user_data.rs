//! Persistence of learned user data (conversion history, predictions).

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UserDataError {
    #[error("User data I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("User data store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for what sessions learn from the user.
pub trait UserDataStore: Send + Sync {
    /// Flush learned data to storage.
    fn sync(&self) -> Result<(), UserDataError>;

    /// Re-read learned data from storage.
    fn reload(&self) -> Result<(), UserDataError>;

    /// Block until pending sync/reload work has finished.
    fn wait(&self) -> Result<(), UserDataError>;

    fn clear_user_history(&self) -> Result<(), UserDataError>;

    fn clear_user_prediction(&self) -> Result<(), UserDataError>;

    fn clear_unused_user_prediction(&self) -> Result<(), UserDataError>;
}

/// Store that keeps nothing but counts calls, for servers without a user
/// profile and for tests.
#[derive(Debug, Default)]
pub struct NullUserDataStore {
    syncs: AtomicUsize,
    reloads: AtomicUsize,
    clears: AtomicUsize,
}

impl NullUserDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl UserDataStore for NullUserDataStore {
    fn sync(&self) -> Result<(), UserDataError> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reload(&self) -> Result<(), UserDataError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait(&self) -> Result<(), UserDataError> {
        Ok(())
    }

    fn clear_user_history(&self) -> Result<(), UserDataError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear_user_prediction(&self) -> Result<(), UserDataError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear_unused_user_prediction(&self) -> Result<(), UserDataError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
