//! Game State Store - the single owner of the live [`GameState`].
//!
//! Reads go through [`GameStore::snapshot`], which returns the last committed
//! state and never waits on a writer. Writes go through [`GameStore::mutate`],
//! which runs one updater at a time:
//!
//! 1. **Admit**: wait for the store lock (tokio's mutex is fair, so callers
//!    are served in the order they asked)
//! 2. **Draft**: clone the committed state and hand it to the updater
//! 3. **Run**: await the updater, which may itself await backend calls
//! 4. **Commit**: publish the returned draft, or drop it if the updater failed
//!
//! The lock guard is dropped on every exit path, including when the caller
//! drops the `mutate` future mid-flight.

use game_rules::{GameState, PersistedState};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

tokio::task_local! {
    static IN_MUTATION: ();
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A guarded mutation was requested from inside another one on the same
    /// task; waiting for the lock would never finish.
    #[error("state mutation requested while already inside a state mutation")]
    NestedMutation,
}

/// Receives the persisted subset after every commit.
pub trait PersistenceSink: Send + Sync {
    fn persist(&self, state: &PersistedState);
}

pub struct GameStore {
    committed: watch::Sender<Arc<GameState>>,
    lock: Mutex<()>,
    sink: Option<Arc<dyn PersistenceSink>>,
}

impl GameStore {
    pub fn new(initial: GameState) -> Self {
        let (committed, _) = watch::channel(Arc::new(initial));
        Self {
            committed,
            lock: Mutex::new(()),
            sink: None,
        }
    }

    /// Start from a previously persisted session.
    pub fn restore(persisted: PersistedState) -> Self {
        Self::new(GameState::restore(persisted))
    }

    pub fn with_persistence(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The last committed state.
    pub fn snapshot(&self) -> Arc<GameState> {
        Arc::clone(&self.committed.borrow())
    }

    /// The persisted subset of the last committed state.
    pub fn persisted(&self) -> PersistedState {
        self.snapshot().persisted()
    }

    /// Watch commits, e.g. to re-render a view.
    pub fn subscribe(&self) -> watch::Receiver<Arc<GameState>> {
        self.committed.subscribe()
    }

    /// Whether the current task is running inside a `mutate` updater.
    pub fn in_mutation() -> bool {
        IN_MUTATION.try_with(|_| ()).is_ok()
    }

    /// Run `updater` exclusively against a draft of the committed state.
    ///
    /// The updater receives the draft by value and returns it alongside its
    /// result; returning `Err` discards the draft and leaves the committed
    /// state untouched.
    pub async fn mutate<F, Fut, T, E>(&self, updater: F) -> Result<T, E>
    where
        F: FnOnce(GameState) -> Fut,
        Fut: Future<Output = Result<(GameState, T), E>>,
        E: From<StoreError>,
    {
        if Self::in_mutation() {
            return Err(StoreError::NestedMutation.into());
        }

        let _guard = self.lock.lock().await;
        let draft = GameState::clone(&self.snapshot());
        trace!(phase = %draft.phase, "state mutation started");

        match IN_MUTATION.scope((), updater(draft)).await {
            Ok((draft, value)) => {
                self.commit(draft);
                Ok(value)
            }
            Err(err) => {
                debug!("state mutation rolled back");
                Err(err)
            }
        }
    }

    fn commit(&self, draft: GameState) {
        let state = Arc::new(draft);
        self.committed.send_replace(Arc::clone(&state));
        if let Some(sink) = &self.sink {
            sink.persist(&state.persisted());
        }
        trace!(phase = %state.phase, events = state.events.len(), "state committed");
    }
}

impl Default for GameStore {
    fn default() -> Self {
        Self::new(GameState::default())
    }
}
