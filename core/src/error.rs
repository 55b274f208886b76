/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use sea_orm::DbErr;
use std::time::Duration;
use thiserror::Error;

use super::job::QueueError;
use super::lock::LockError;
use super::storage::StorageError;

/// Failure of a single job run. Everything except `Unretryable` is retried
/// until the attempt budget is spent.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Unretryable(String),
    #[error(transparent)]
    Retryable(#[from] anyhow::Error),
    #[error("job timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl JobError {
    pub fn unretryable(message: impl Into<String>) -> Self {
        JobError::Unretryable(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, JobError::Unretryable(_))
    }
}

impl From<DbErr> for JobError {
    fn from(e: DbErr) -> Self {
        JobError::Retryable(anyhow::Error::new(e).context("Database error"))
    }
}

impl From<StorageError> for JobError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(_) | StorageError::InvalidKey(_) => {
                JobError::Unretryable(e.to_string())
            }
            StorageError::Io(_) => JobError::Retryable(anyhow::Error::new(e)),
        }
    }
}

impl From<QueueError> for JobError {
    fn from(e: QueueError) -> Self {
        JobError::Retryable(anyhow::Error::new(e))
    }
}
