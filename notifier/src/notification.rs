/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use argos_core::consts::{DEFAULT_BUILD_NAME, FAILED_SCREENSHOT_MARKER, STATUS_CONTEXT};
use argos_core::input::join_url;
use argos_core::types::*;
use entity::build::BuildType;
use entity::build_notification::NotificationType;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GithubState {
    Pending,
    Success,
    Failure,
}

impl GithubState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GithubState::Pending => "pending",
            GithubState::Success => "success",
            GithubState::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GitlabState {
    Pending,
    Running,
    Success,
    Failed,
}

impl GitlabState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitlabState::Pending => "pending",
            GitlabState::Running => "running",
            GitlabState::Success => "success",
            GitlabState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub context: String,
    pub description: String,
    pub github: GithubState,
    pub gitlab: GitlabState,
}

/// Provider states for a notification. Reference builds never fail on a
/// detected diff, they are the new baseline.
pub fn notification_status(
    notification_type: NotificationType,
    is_reference: bool,
) -> (GithubState, GitlabState) {
    match (notification_type, is_reference) {
        (NotificationType::Queued, _) => (GithubState::Pending, GitlabState::Pending),
        (NotificationType::Progress, _) => (GithubState::Pending, GitlabState::Running),
        (NotificationType::NoDiffDetected, _)
        | (NotificationType::DiffAccepted, _)
        | (NotificationType::DiffDetected, true) => (GithubState::Success, GitlabState::Success),
        (NotificationType::DiffDetected, false) | (NotificationType::DiffRejected, _) => {
            (GithubState::Failure, GitlabState::Failed)
        }
    }
}

pub fn notification_description(
    notification_type: NotificationType,
    is_reference: bool,
    stats: &str,
) -> String {
    match notification_type {
        NotificationType::Queued => "Build is queued".to_string(),
        NotificationType::Progress => "Build in progress...".to_string(),
        NotificationType::NoDiffDetected if stats.is_empty() => {
            let description = if is_reference {
                "Used as comparison baseline"
            } else {
                "Everything's good!"
            };
            description.to_string()
        }
        NotificationType::NoDiffDetected => with_stats(
            stats,
            if is_reference {
                "used as comparison baseline"
            } else {
                "no change"
            },
        ),
        NotificationType::DiffDetected => with_stats(
            stats,
            if is_reference {
                "auto-approved"
            } else {
                "waiting for your decision"
            },
        ),
        NotificationType::DiffAccepted => with_stats(stats, "changes approved"),
        NotificationType::DiffRejected => with_stats(stats, "changes rejected"),
    }
}

fn with_stats(stats: &str, suffix: &str) -> String {
    if stats.is_empty() {
        let mut chars = suffix.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        format!("{} — {}", stats, suffix)
    }
}

pub fn status_context(build_name: &str) -> String {
    if build_name == DEFAULT_BUILD_NAME {
        STATUS_CONTEXT.to_string()
    } else {
        format!("{}/{}", STATUS_CONTEXT, build_name)
    }
}

pub fn notification_payload(
    notification_type: NotificationType,
    build: &MBuild,
    stats: &BuildStats,
) -> NotificationPayload {
    let is_reference = build.build_type == BuildType::Reference;
    let (github, gitlab) = notification_status(notification_type, is_reference);

    NotificationPayload {
        context: status_context(&build.name),
        description: notification_description(notification_type, is_reference, &stats.message()),
        github,
        gitlab,
    }
}

/// Loads the stats fragment only for notifications that carry one.
pub async fn compose_notification(
    db: &DatabaseConnection,
    notification_type: NotificationType,
    build: &MBuild,
) -> Result<NotificationPayload, DbErr> {
    let stats = match notification_type {
        NotificationType::Queued | NotificationType::Progress => BuildStats::default(),
        _ => load_build_stats(db, build.id).await?,
    };

    Ok(notification_payload(notification_type, build, &stats))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub changed: usize,
    pub added: usize,
    pub unchanged: usize,
    pub failure: usize,
}

impl BuildStats {
    pub fn from_diffs(diffs: &[MScreenshotDiff], screenshots: &[MScreenshot]) -> Self {
        let failed: HashSet<Uuid> = screenshots
            .iter()
            .filter(|screenshot| screenshot.name.contains(FAILED_SCREENSHOT_MARKER))
            .map(|screenshot| screenshot.id)
            .collect();

        let mut stats = Self::default();
        for diff in diffs {
            if failed.contains(&diff.compare_screenshot) {
                stats.failure += 1;
            } else if diff.base_screenshot.is_none() {
                stats.added += 1;
            } else if diff.score.is_some_and(|score| score > 0.0) {
                stats.changed += 1;
            } else {
                stats.unchanged += 1;
            }
        }

        stats
    }

    /// e.g. `12 changed, 3 added, 1 failure`, empty when nothing stands out.
    pub fn message(&self) -> String {
        let mut parts = Vec::new();

        if self.changed > 0 {
            parts.push(format!("{} changed", self.changed));
        }
        if self.added > 0 {
            parts.push(format!("{} added", self.added));
        }
        if self.failure > 0 {
            let noun = if self.failure == 1 { "failure" } else { "failures" };
            parts.push(format!("{} {}", self.failure, noun));
        }

        parts.join(", ")
    }
}

pub async fn load_build_stats(db: &DatabaseConnection, build_id: Uuid) -> Result<BuildStats, DbErr> {
    let diffs = EScreenshotDiff::find()
        .filter(CScreenshotDiff::Build.eq(build_id))
        .all(db)
        .await?;

    if diffs.is_empty() {
        return Ok(BuildStats::default());
    }

    let screenshots = EScreenshot::find()
        .filter(CScreenshot::Id.is_in(diffs.iter().map(|diff| diff.compare_screenshot)))
        .all(db)
        .await?;

    Ok(BuildStats::from_diffs(&diffs, &screenshots))
}

pub fn project_url(serve_url: &str, account: &MAccount, project: &MProject) -> String {
    join_url(serve_url, &format!("{}/{}", account.slug, project.name))
}

pub fn build_url(serve_url: &str, account: &MAccount, project: &MProject, build: &MBuild) -> String {
    join_url(
        &project_url(serve_url, account, project),
        &format!("builds/{}", build.number),
    )
}
