//! In-memory store for tests.
//!
//! This provides a [`KvClient`] backed by a `HashMap` with the revision semantics of a
//! revisioned store: every successful put increments the revision, a delete increments it only
//! if it removed something. The store is [`Clone`] so tests can keep a handle for inspection while
//! the driver owns another.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::client::{DeleteResponse, KvClient, PutResponse};
use crate::error::{Error, Result};

/// A store call as recorded by [`InMemoryStore`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    /// A put of the given key with a value of the given length.
    Put(String, usize),
    /// A delete of the given key.
    Delete(String),
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Bytes>,
    revision: i64,
    failing: HashSet<String>,
    calls: Vec<Call>,
}

/// A shared, in-process revisioned key-value store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Creates an empty store at revision `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation on `key` fail with `503 Service Unavailable`.
    pub fn fail_on(&self, key: impl Into<String>) {
        self.lock().failing.insert(key.into());
    }

    /// Removes an entry directly, bypassing the client interface and without bumping the revision.
    ///
    /// Useful for simulating keys that vanished between phases.
    pub fn remove(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.lock().entries.get(key).cloned()
    }

    /// Returns `true` if the store contains `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// The current store revision.
    pub fn revision(&self) -> i64 {
        self.lock().revision
    }

    /// All calls received so far, in order. Failed calls are included.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the store from other assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn injected_failure(key: &str) -> Error {
    Error::Status {
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        message: format!("injected failure for `{key}`"),
    }
}

#[async_trait::async_trait]
impl KvClient for InMemoryStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<PutResponse> {
        let mut state = self.lock();
        state.calls.push(Call::Put(key.to_owned(), value.len()));
        if state.failing.contains(key) {
            return Err(injected_failure(key));
        }

        state
            .entries
            .insert(key.to_owned(), Bytes::copy_from_slice(value));
        state.revision += 1;
        Ok(PutResponse {
            revision: state.revision,
        })
    }

    async fn delete(&self, key: &str) -> Result<DeleteResponse> {
        let mut state = self.lock();
        state.calls.push(Call::Delete(key.to_owned()));
        if state.failing.contains(key) {
            return Err(injected_failure(key));
        }

        let deleted = match state.entries.remove(key) {
            Some(_) => {
                state.revision += 1;
                1
            }
            None => 0,
        };
        Ok(DeleteResponse {
            deleted,
            revision: state.revision,
        })
    }
}
