/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out after {timeout:?} waiting for lock `{key}`")]
    Timeout { key: String, timeout: Duration },
}

/// In-process registry of named async mutexes.
///
/// Entries exist only while somebody holds or waits for the key.
#[derive(Debug, Default, Clone)]
pub struct KeyedLock {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Debug)]
pub struct KeyedLockGuard {
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLock {
    pub async fn acquire(&self, key: &str, timeout: Duration) -> Result<KeyedLockGuard, LockError> {
        let mutex = Arc::clone(
            self.locks
                .entry(key.to_owned())
                .or_insert_with(Default::default)
                .value(),
        );

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(KeyedLockGuard {
                key: key.to_owned(),
                locks: Arc::clone(&self.locks),
                guard: Some(guard),
            }),
            Err(_) => {
                release_unused(&self.locks, key);
                Err(LockError::Timeout {
                    key: key.to_owned(),
                    timeout,
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        release_unused(&self.locks, &self.key);
    }
}

fn release_unused(locks: &DashMap<String, Arc<Mutex<()>>>, key: &str) {
    // the map holds the only reference once no guard or waiter is left
    locks.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
}
