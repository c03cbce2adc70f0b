//! Content-addressed store of past observations and actions
//!
//! Records are keyed by the hex SHA-256 of their instruction/action string,
//! so identical instruction text overwrites the prior record — intentional,
//! last write wins. Nothing is deleted during a session. The returned ids are
//! not consumed by the core loops; they exist so replay and caching layers
//! can be built on top.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::observe::ObservedTarget;

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationRecord {
    pub instruction: String,
    pub result: Vec<ObservedTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    pub action: String,
    pub result: String,
}

#[derive(Default)]
pub struct Recorder {
    observations: DashMap<String, ObservationRecord>,
    actions: DashMap<String, ActionRecord>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an observation under `sha256_hex(instruction)` and return the id.
    pub fn record_observation(&self, instruction: &str, result: &[ObservedTarget]) -> String {
        let id = sha256_hex(instruction);
        self.observations.insert(
            id.clone(),
            ObservationRecord {
                instruction: instruction.to_string(),
                result: result.to_vec(),
            },
        );
        id
    }

    /// Store an action outcome under `sha256_hex(action)` and return the id.
    pub fn record_action(&self, action: &str, result: &str) -> String {
        let id = sha256_hex(action);
        self.actions.insert(
            id.clone(),
            ActionRecord {
                action: action.to_string(),
                result: result.to_string(),
            },
        );
        id
    }

    pub fn observation(&self, id: &str) -> Option<ObservationRecord> {
        self.observations.get(id).map(|r| r.value().clone())
    }

    pub fn action(&self, id: &str) -> Option<ActionRecord> {
        self.actions.get(id).map(|r| r.value().clone())
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}
