/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use argos_core::types::*;
use entity::build_notification::NotificationType;
use entity::job::JobStatus;
use sea_orm::{DatabaseConnection, DbErr};

use super::aggregated::get_commit_builds;
use super::notification::{build_url, load_build_stats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRow {
    pub name: String,
    pub label: &'static str,
    pub details: String,
    pub url: String,
}

pub fn build_label(build: &MBuild, notification_type: Option<NotificationType>) -> &'static str {
    match (build.job_status, notification_type) {
        (JobStatus::Error, _) => "❌ An error happened",
        (JobStatus::Aborted, _) => "🙅 Build aborted",
        (_, None) | (_, Some(NotificationType::Queued)) => "📭 Waiting for screenshots",
        (_, Some(NotificationType::Progress)) => "🚜 Diffing screenshots",
        (_, Some(NotificationType::DiffDetected)) => "🧿 Changes detected",
        (_, Some(NotificationType::NoDiffDetected)) => "✅ No change detected",
        (_, Some(NotificationType::DiffAccepted)) => "👍 Changes approved",
        (_, Some(NotificationType::DiffRejected)) => "👎 Changes rejected",
    }
}

pub fn format_comment(rows: &[CommentRow]) -> String {
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    let mut body = String::from("**The latest updates on your project.**\n\n");
    body.push_str("| Build name | Status | Details | Inspect |\n");
    body.push_str("| :--- | :--- | :--- | :--- |\n");

    for row in rows {
        body.push_str(&format!(
            "| {} | {} | {} | [Inspect]({}) |\n",
            row.name, row.label, row.details, row.url
        ));
    }

    body
}

/// Markdown summary of every build of the project on a commit.
pub async fn get_comment_body(
    db: &DatabaseConnection,
    serve_url: &str,
    account: &MAccount,
    project: &MProject,
    commit: &str,
) -> Result<String, DbErr> {
    let mut rows = Vec::new();

    for (build, notification) in get_commit_builds(db, project.id, commit).await? {
        let notification_type = notification.map(|notification| notification.notification_type);
        let details = match notification_type {
            None | Some(NotificationType::Queued) | Some(NotificationType::Progress) => {
                String::new()
            }
            Some(_) => load_build_stats(db, build.id).await?.message(),
        };

        rows.push(CommentRow {
            name: build.name.clone(),
            label: build_label(&build, notification_type),
            details,
            url: build_url(serve_url, account, project, &build),
        });
    }

    Ok(format_comment(&rows))
}
