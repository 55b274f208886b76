/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use argos_core::error::JobError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// GitHub answers 422 for statuses on commits it has not seen yet.
    #[error("no commit found for sha")]
    CommitNotFound,
    #[error("resource not found")]
    NotFound,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("provider responded with {status}: {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<ProviderError> for JobError {
    fn from(e: ProviderError) -> Self {
        JobError::Retryable(anyhow::Error::new(e).context("Provider request failed"))
    }
}

pub fn classify_error(status: u16, message: &str) -> ProviderError {
    match status {
        404 => ProviderError::NotFound,
        422 if message.contains("No commit found for SHA") => ProviderError::CommitNotFound,
        401 | 403 => ProviderError::Auth(message.to_string()),
        _ => ProviderError::Api {
            status,
            message: message.to_string(),
        },
    }
}

pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(classify_error(status.as_u16(), &message))
}
