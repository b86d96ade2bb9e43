// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Desired-state store
//!
//! The one authoritative [`DesiredState`]. Readers always observe a fully
//! merged snapshot; each operation is a single short critical section and no
//! lock is held across I/O.

use std::path::PathBuf;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::persistence::StatePersistence;
use crate::state::{DesiredState, PartialState, PowerState, UpdateOutcome};

pub struct StateStore {
    state: RwLock<DesiredState>,
    /// Serializes snapshot writes; held only while writing the file
    persistence: Option<Mutex<StatePersistence>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DesiredState::default())
    }
}

impl StateStore {
    pub fn new(initial: DesiredState) -> Self {
        Self {
            state: RwLock::new(initial),
            persistence: None,
        }
    }

    /// Store backed by a JSON snapshot file.
    ///
    /// The snapshot is loaded if present. A missing or unreadable file falls
    /// back to the default state; the bridge never refuses to start over it.
    pub fn with_persistence(path: impl Into<PathBuf>) -> Self {
        let persistence = StatePersistence::new(path);
        let initial = match persistence.load() {
            Ok(Some(state)) => {
                info!(target: "ledbridge-core", path = %persistence.path().display(), "Restored desired state {}", state.to_json());
                state
            }
            Ok(None) => DesiredState::default(),
            Err(e) => {
                warn!(target: "ledbridge-core", path = %persistence.path().display(), "Ignoring state file: {}", e);
                DesiredState::default()
            }
        };
        Self {
            state: RwLock::new(initial),
            persistence: Some(Mutex::new(persistence)),
        }
    }

    pub fn current(&self) -> DesiredState {
        *self.state.read()
    }

    /// Merge a partial update and return the before/after snapshots.
    ///
    /// `woke_from_off` is set exactly when the stored power was Off and the
    /// update sets it On. With persistence enabled a change also writes the
    /// snapshot file synchronously, so async callers run this on a blocking
    /// thread.
    pub fn apply_update(&self, update: &PartialState) -> UpdateOutcome {
        let outcome = {
            let mut state = self.state.write();
            let previous = *state;
            let next = previous.merged(update);
            *state = next;
            UpdateOutcome {
                previous,
                state: next,
                woke_from_off: previous.power == PowerState::Off
                    && update.power == Some(PowerState::On),
            }
        };

        debug!(target: "ledbridge-core", "Applied update: {} -> {}", outcome.previous.to_json(), outcome.state.to_json());

        if outcome.changed() {
            self.persist();
        }
        outcome
    }

    fn persist(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let persistence = persistence.lock();
        // Read after taking the file lock so the latest snapshot wins
        let latest = self.current();
        if let Err(e) = persistence.save(&latest) {
            warn!(target: "ledbridge-core", path = %persistence.path().display(), "Failed to persist desired state: {}", e);
        }
    }
}
