/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use argos_core::input::join_url;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use super::error::{ProviderError, check_response};
use super::notification::GitlabState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitlabCommitStatus {
    pub project_id: i64,
    pub sha: String,
    pub state: GitlabState,
    pub context: String,
    pub description: String,
    pub target_url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitlabClient: Send + Sync {
    async fn edit_commit_status(
        &self,
        access_token: &str,
        status: &GitlabCommitStatus,
    ) -> Result<(), ProviderError>;
}

pub struct GitlabApi {
    client: reqwest::Client,
    base_url: String,
}

impl GitlabApi {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl GitlabClient for GitlabApi {
    async fn edit_commit_status(
        &self,
        access_token: &str,
        status: &GitlabCommitStatus,
    ) -> Result<(), ProviderError> {
        let url = join_url(
            &self.base_url,
            &format!("api/v4/projects/{}/statuses/{}", status.project_id, status.sha),
        );

        let response = self
            .client
            .post(url)
            .header("PRIVATE-TOKEN", access_token)
            .json(&json!({
                "state": status.state.as_str(),
                "name": status.context,
                "target_url": status.target_url,
                "description": status.description,
            }))
            .send()
            .await?;

        check_response(response).await?;
        Ok(())
    }
}
