/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use argos_core::input::join_url;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::error::{ProviderError, check_response};
use super::notification::GithubState;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_USER_AGENT: &str = "argos-server";
const MAX_DESCRIPTION_LENGTH: usize = 140;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitStatus {
    pub owner: String,
    pub repo: String,
    pub sha: String,
    pub state: GithubState,
    pub context: String,
    pub description: String,
    pub target_url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn create_commit_status(
        &self,
        installation_id: i64,
        status: &CommitStatus,
    ) -> Result<(), ProviderError>;

    /// Returns the id of the created comment.
    async fn create_pr_comment(
        &self,
        installation_id: i64,
        owner: &str,
        repo: &str,
        number: i64,
        body: &str,
    ) -> Result<i64, ProviderError>;

    async fn update_pr_comment(
        &self,
        installation_id: i64,
        owner: &str,
        repo: &str,
        comment_id: i64,
        body: &str,
    ) -> Result<(), ProviderError>;
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: i64,
}

#[derive(Debug, Clone)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// GitHub App client. Installation tokens are minted from an RS256 app JWT and
/// cached until shortly before they expire.
pub struct GithubApi {
    client: reqwest::Client,
    api_url: String,
    app_id: u64,
    key: EncodingKey,
    tokens: DashMap<i64, InstallationToken>,
}

impl GithubApi {
    pub fn new(api_url: &str, app_id: u64, private_key_pem: &[u8]) -> Result<Self, ProviderError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| ProviderError::Auth(format!("invalid GitHub App private key: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            app_id,
            key,
            tokens: DashMap::new(),
        })
    }

    fn app_jwt(&self) -> Result<String, ProviderError> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            // clock drift allowance
            iat: now - 60,
            exp: now + 9 * 60,
            iss: self.app_id.to_string(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| ProviderError::Auth(e.to_string()))
    }

    async fn installation_token(&self, installation_id: i64) -> Result<String, ProviderError> {
        let cached = self
            .tokens
            .get(&installation_id)
            .map(|token| token.value().clone());

        if let Some(token) = cached {
            if token.expires_at - TimeDelta::seconds(60) > Utc::now() {
                return Ok(token.token);
            }
        }

        let url = join_url(
            &self.api_url,
            &format!("app/installations/{}/access_tokens", installation_id),
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(self.app_jwt()?)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, GITHUB_USER_AGENT)
            .send()
            .await?;

        let response: InstallationTokenResponse = check_response(response).await?.json().await?;
        let expires_at = DateTime::parse_from_rfc3339(&response.expires_at)
            .map(|expires_at| expires_at.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now() + TimeDelta::minutes(30));

        debug!(installation_id, "Minted GitHub installation token");
        self.tokens.insert(
            installation_id,
            InstallationToken {
                token: response.token.clone(),
                expires_at,
            },
        );

        Ok(response.token)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        installation_id: i64,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let token = self.installation_token(installation_id).await?;
        let response = self
            .client
            .request(method, join_url(&self.api_url, path))
            .bearer_auth(token)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, GITHUB_USER_AGENT)
            .json(&body)
            .send()
            .await?;

        check_response(response).await
    }
}

#[async_trait]
impl GithubClient for GithubApi {
    async fn create_commit_status(
        &self,
        installation_id: i64,
        status: &CommitStatus,
    ) -> Result<(), ProviderError> {
        let description: String = status.description.chars().take(MAX_DESCRIPTION_LENGTH).collect();

        self.request(
            reqwest::Method::POST,
            installation_id,
            &format!("repos/{}/{}/statuses/{}", status.owner, status.repo, status.sha),
            json!({
                "state": status.state.as_str(),
                "target_url": status.target_url,
                "description": description,
                "context": status.context,
            }),
        )
        .await?;

        Ok(())
    }

    async fn create_pr_comment(
        &self,
        installation_id: i64,
        owner: &str,
        repo: &str,
        number: i64,
        body: &str,
    ) -> Result<i64, ProviderError> {
        let response = self
            .request(
                reqwest::Method::POST,
                installation_id,
                &format!("repos/{}/{}/issues/{}/comments", owner, repo, number),
                json!({ "body": body }),
            )
            .await?;

        let comment: CommentResponse = response.json().await?;
        Ok(comment.id)
    }

    async fn update_pr_comment(
        &self,
        installation_id: i64,
        owner: &str,
        repo: &str,
        comment_id: i64,
        body: &str,
    ) -> Result<(), ProviderError> {
        self.request(
            reqwest::Method::PATCH,
            installation_id,
            &format!("repos/{}/{}/issues/comments/{}", owner, repo, comment_id),
            json!({ "body": body }),
        )
        .await?;

        Ok(())
    }
}
