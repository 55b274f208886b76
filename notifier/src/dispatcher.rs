/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Context;
use argos_core::consts::{
    COMMIT_STATUS_LOCK_TIMEOUT, NOTIFICATION_JOB_TIMEOUT, NOTIFICATION_LOCK_TIMEOUT,
    PR_COMMENT_LOCK_TIMEOUT,
};
use argos_core::database::get_latest_build_notification;
use argos_core::error::JobError;
use argos_core::input::load_secret;
use argos_core::job::{Job, Queue};
use argos_core::types::*;
use async_trait::async_trait;
use entity::job::JobStatus;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::aggregated::get_aggregated_notification;
use super::comment::get_comment_body;
use super::error::ProviderError;
use super::github::{CommitStatus, GithubApi, GithubClient};
use super::gitlab::{GitlabApi, GitlabClient, GitlabCommitStatus};
use super::notification::{NotificationPayload, build_url, compose_notification, project_url};

#[derive(Clone)]
pub struct Providers {
    /// Unset when no GitHub App is configured.
    pub github: Option<Arc<dyn GithubClient>>,
    pub gitlab: Arc<dyn GitlabClient>,
}

impl Providers {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let github: Option<Arc<dyn GithubClient>> =
            match (cli.github_app_id, &cli.github_app_private_key_file) {
                (Some(app_id), Some(key_file)) => {
                    let key = load_secret(key_file);
                    let client = GithubApi::new(&cli.github_api_url, app_id, key.as_bytes())
                        .context("Failed to set up GitHub App client")?;
                    Some(Arc::new(client))
                }
                _ => {
                    warn!("GitHub App is not configured, skipping GitHub notifications");
                    None
                }
            };

        let gitlab = GitlabApi::new(&cli.gitlab_url).context("Failed to set up GitLab client")?;

        Ok(Self {
            github,
            gitlab: Arc::new(gitlab),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// A newer notification exists for the build, nothing was sent.
    Superseded,
}

pub struct NotificationJob {
    pub providers: Providers,
}

#[async_trait]
impl Job for NotificationJob {
    const QUEUE: Queue = Queue::BuildNotification;

    fn timeout(&self) -> Duration {
        NOTIFICATION_JOB_TIMEOUT
    }

    async fn perform(&self, state: Arc<ServerState>, id: Uuid) -> Result<(), JobError> {
        process_build_notification(&state, &self.providers, id)
            .await
            .map(|_| ())
    }

    async fn failed(&self, state: Arc<ServerState>, id: Uuid, _error: &JobError) {
        if let Err(e) = set_notification_status(&state.db, id, JobStatus::Error).await {
            error!(error = %e, build_notification_id = %id, "Failed to mark build notification as failed");
        }
    }
}

struct Delivery {
    commit: String,
    build_url: String,
    project_url: String,
    payload: NotificationPayload,
    aggregated: Option<NotificationPayload>,
}

#[instrument(skip(state, providers), fields(build_notification_id = %notification_id))]
pub async fn process_build_notification(
    state: &ServerState,
    providers: &Providers,
    notification_id: Uuid,
) -> Result<DispatchOutcome, JobError> {
    let notification = EBuildNotification::find_by_id(notification_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            JobError::unretryable(format!("Build notification {} not found", notification_id))
        })?;

    let _guard = state
        .locks
        .acquire(
            &format!("build-notification:{}", notification.build),
            NOTIFICATION_LOCK_TIMEOUT,
        )
        .await?;

    let latest = get_latest_build_notification(&state.db, notification.build).await?;
    if latest.map(|latest| latest.id) != Some(notification.id) {
        debug!(build_id = %notification.build, "Build notification superseded, skipping delivery");
        set_notification_status(&state.db, notification.id, JobStatus::Complete).await?;
        return Ok(DispatchOutcome::Superseded);
    }

    let build = EBuild::find_by_id(notification.build)
        .one(&state.db)
        .await?
        .ok_or_else(|| JobError::unretryable(format!("Build {} not found", notification.build)))?;

    let project = EProject::find_by_id(build.project)
        .one(&state.db)
        .await?
        .ok_or_else(|| JobError::unretryable(format!("Project {} not found", build.project)))?;

    let account = EAccount::find_by_id(project.account)
        .one(&state.db)
        .await?
        .ok_or_else(|| JobError::unretryable(format!("Account {} not found", project.account)))?;

    let github_repository = match project.github_repository {
        Some(id) => EGithubRepository::find_by_id(id).one(&state.db).await?,
        None => None,
    };

    let gitlab_project = match project.gitlab_project {
        Some(id) => EGitlabProject::find_by_id(id).one(&state.db).await?,
        None => None,
    };

    let (payload, aggregated) = tokio::try_join!(
        compose_notification(&state.db, notification.notification_type, &build),
        get_aggregated_notification(&state.db, &project, &build.commit),
    )?;

    let delivery = Delivery {
        commit: build
            .pr_head_commit
            .clone()
            .unwrap_or_else(|| build.commit.clone()),
        build_url: build_url(&state.cli.serve_url, &account, &project, &build),
        project_url: project_url(&state.cli.serve_url, &account, &project),
        payload,
        aggregated,
    };

    match (&providers.github, &github_repository) {
        (Some(github), Some(repository)) => {
            deliver_github(
                state,
                github.as_ref(),
                repository,
                &build,
                &account,
                &project,
                &delivery,
            )
            .await?
        }
        (None, Some(_)) => warn!("Project is linked to GitHub but no GitHub App is configured"),
        _ => {}
    }

    if let (Some(gitlab_project), Some(token)) = (&gitlab_project, &account.gitlab_access_token) {
        deliver_gitlab(state, providers.gitlab.as_ref(), gitlab_project, token, &delivery).await?;
    }

    set_notification_status(&state.db, notification.id, JobStatus::Complete).await?;

    info!(
        build_id = %build.id,
        notification_type = %notification.notification_type,
        "Delivered build notification"
    );
    Ok(DispatchOutcome::Delivered)
}

async fn deliver_github(
    state: &ServerState,
    github: &dyn GithubClient,
    repository: &MGithubRepository,
    build: &MBuild,
    account: &MAccount,
    project: &MProject,
    delivery: &Delivery,
) -> Result<(), JobError> {
    let installation_id = match repository.installation_id {
        Some(installation_id) => installation_id,
        None => {
            debug!(repository = %repository.name, "GitHub App not installed, skipping");
            return Ok(());
        }
    };

    send_github_status(
        state,
        github,
        installation_id,
        CommitStatus {
            owner: repository.owner.clone(),
            repo: repository.name.clone(),
            sha: delivery.commit.clone(),
            state: delivery.payload.github,
            context: delivery.payload.context.clone(),
            description: delivery.payload.description.clone(),
            target_url: delivery.build_url.clone(),
        },
    )
    .await?;

    if let (true, Some(pull_request_id)) = (project.pr_comment_enabled, build.github_pull_request) {
        let body = get_comment_body(
            &state.db,
            &state.cli.serve_url,
            account,
            project,
            &build.commit,
        )
        .await?;

        upsert_pr_comment(state, github, installation_id, repository, pull_request_id, &body)
            .await?;
    }

    if let Some(aggregated) = &delivery.aggregated {
        send_github_status(
            state,
            github,
            installation_id,
            CommitStatus {
                owner: repository.owner.clone(),
                repo: repository.name.clone(),
                sha: delivery.commit.clone(),
                state: aggregated.github,
                context: aggregated.context.clone(),
                description: aggregated.description.clone(),
                target_url: delivery.project_url.clone(),
            },
        )
        .await?;
    }

    Ok(())
}

async fn send_github_status(
    state: &ServerState,
    github: &dyn GithubClient,
    installation_id: i64,
    status: CommitStatus,
) -> Result<(), JobError> {
    let _guard = state
        .locks
        .acquire(
            &format!(
                "commit-status:github:{}/{}@{}",
                status.owner, status.repo, status.sha
            ),
            COMMIT_STATUS_LOCK_TIMEOUT,
        )
        .await?;

    match github.create_commit_status(installation_id, &status).await {
        Ok(()) => Ok(()),
        Err(ProviderError::CommitNotFound) => {
            debug!(sha = %status.sha, "Commit not known to GitHub, ignoring status");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn upsert_pr_comment(
    state: &ServerState,
    github: &dyn GithubClient,
    installation_id: i64,
    repository: &MGithubRepository,
    pull_request_id: Uuid,
    body: &str,
) -> Result<(), JobError> {
    let _guard = state
        .locks
        .acquire(
            &format!("pr-comment:{}", pull_request_id),
            PR_COMMENT_LOCK_TIMEOUT,
        )
        .await?;

    // re-read inside the lock, another job may have created the comment
    let pull_request = EGithubPullRequest::find_by_id(pull_request_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            JobError::unretryable(format!("Pull request {} not found", pull_request_id))
        })?;

    if pull_request.comment_deleted {
        debug!(pull_request = pull_request.number, "Comment was deleted, not recreating it");
        return Ok(());
    }

    match pull_request.comment_id {
        Some(comment_id) => {
            match github
                .update_pr_comment(
                    installation_id,
                    &repository.owner,
                    &repository.name,
                    comment_id,
                    body,
                )
                .await
            {
                Ok(()) => {}
                Err(ProviderError::NotFound) => {
                    info!(pull_request = pull_request.number, "Comment deleted on GitHub");
                    EGithubPullRequest::update_many()
                        .col_expr(CGithubPullRequest::CommentDeleted, Expr::value(true))
                        .filter(CGithubPullRequest::Id.eq(pull_request.id))
                        .exec(&state.db)
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        None => {
            let comment_id = github
                .create_pr_comment(
                    installation_id,
                    &repository.owner,
                    &repository.name,
                    pull_request.number,
                    body,
                )
                .await?;

            EGithubPullRequest::update_many()
                .col_expr(CGithubPullRequest::CommentId, Expr::value(comment_id))
                .filter(CGithubPullRequest::Id.eq(pull_request.id))
                .exec(&state.db)
                .await?;
        }
    }

    Ok(())
}

async fn deliver_gitlab(
    state: &ServerState,
    gitlab: &dyn GitlabClient,
    gitlab_project: &MGitlabProject,
    access_token: &str,
    delivery: &Delivery,
) -> Result<(), JobError> {
    let mut statuses = vec![GitlabCommitStatus {
        project_id: gitlab_project.gitlab_id,
        sha: delivery.commit.clone(),
        state: delivery.payload.gitlab,
        context: delivery.payload.context.clone(),
        description: delivery.payload.description.clone(),
        target_url: delivery.build_url.clone(),
    }];

    if let Some(aggregated) = &delivery.aggregated {
        statuses.push(GitlabCommitStatus {
            project_id: gitlab_project.gitlab_id,
            sha: delivery.commit.clone(),
            state: aggregated.gitlab,
            context: aggregated.context.clone(),
            description: aggregated.description.clone(),
            target_url: delivery.project_url.clone(),
        });
    }

    for status in statuses {
        let _guard = state
            .locks
            .acquire(
                &format!("commit-status:gitlab:{}@{}", status.project_id, status.sha),
                COMMIT_STATUS_LOCK_TIMEOUT,
            )
            .await?;

        gitlab.edit_commit_status(access_token, &status).await?;
    }

    Ok(())
}

async fn set_notification_status(
    db: &DatabaseConnection,
    id: Uuid,
    status: JobStatus,
) -> Result<(), DbErr> {
    EBuildNotification::update_many()
        .col_expr(CBuildNotification::JobStatus, Expr::value(status))
        .filter(CBuildNotification::Id.eq(id))
        .exec(db)
        .await?;

    Ok(())
}
