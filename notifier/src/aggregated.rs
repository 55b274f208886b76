/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use argos_core::consts::SUMMARY_CONTEXT;
use argos_core::database::get_latest_build_notification;
use argos_core::types::*;
use entity::build::BuildType;
use entity::build_notification::NotificationType;
use entity::project::SummaryCheck;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::notification::{NotificationPayload, notification_status};

/// The newest build per build name, ordered by name. Older builds that were
/// superseded by a rerun under the same name are ignored; equal timestamps
/// fall back to the higher build number.
pub fn latest_builds_per_name(builds: Vec<MBuild>) -> Vec<MBuild> {
    let mut latest: BTreeMap<String, MBuild> = BTreeMap::new();

    for build in builds {
        match latest.get(&build.name) {
            Some(current)
                if (current.created_at, current.number) >= (build.created_at, build.number) => {}
            _ => {
                latest.insert(build.name.clone(), build);
            }
        }
    }

    latest.into_values().collect()
}

fn aggregate_priority(notification_type: NotificationType) -> u8 {
    match notification_type {
        NotificationType::Queued => 0,
        NotificationType::Progress => 1,
        NotificationType::DiffDetected => 2,
        NotificationType::DiffRejected => 3,
        NotificationType::DiffAccepted => 4,
        NotificationType::NoDiffDetected => 5,
    }
}

pub fn resolve_aggregate_type(
    types: impl IntoIterator<Item = NotificationType>,
) -> Option<NotificationType> {
    types.into_iter().min_by_key(|t| aggregate_priority(*t))
}

pub fn should_aggregate(summary_check: SummaryCheck, siblings: usize) -> bool {
    match summary_check {
        SummaryCheck::Never => false,
        SummaryCheck::Auto => siblings > 1,
        SummaryCheck::Always => siblings > 0,
    }
}

pub fn aggregated_payload(
    notification_type: NotificationType,
    is_reference: bool,
) -> NotificationPayload {
    let (github, gitlab) = notification_status(notification_type, is_reference);

    let description = match notification_type {
        NotificationType::Queued => "Builds queued...",
        NotificationType::Progress => "Builds in progress...",
        NotificationType::DiffDetected | NotificationType::NoDiffDetected if is_reference => {
            "Auto-approved"
        }
        NotificationType::DiffDetected => "Diff detected",
        NotificationType::DiffRejected => "Diff rejected",
        NotificationType::DiffAccepted => "Diff accepted",
        NotificationType::NoDiffDetected => "No diff detected",
    };

    NotificationPayload {
        context: SUMMARY_CONTEXT.to_string(),
        description: description.to_string(),
        github,
        gitlab,
    }
}

/// Rolls the latest notification of each sibling build into one payload. The
/// result only counts as a reference outcome when every build carrying the
/// winning type is a reference build.
pub fn aggregate_notifications(
    entries: &[(MBuild, NotificationType)],
) -> Option<NotificationPayload> {
    let notification_type = resolve_aggregate_type(entries.iter().map(|(_, t)| *t))?;

    let is_reference = entries
        .iter()
        .filter(|(_, t)| *t == notification_type)
        .all(|(build, _)| build.build_type == BuildType::Reference);

    Some(aggregated_payload(notification_type, is_reference))
}

/// Latest build per name on a commit together with its current notification.
pub async fn get_commit_builds(
    db: &DatabaseConnection,
    project_id: Uuid,
    commit: &str,
) -> Result<Vec<(MBuild, Option<MBuildNotification>)>, DbErr> {
    let builds = EBuild::find()
        .filter(CBuild::Project.eq(project_id))
        .filter(CBuild::Commit.eq(commit))
        .all(db)
        .await?;

    let mut result = Vec::new();
    for build in latest_builds_per_name(builds) {
        let notification = get_latest_build_notification(db, build.id).await?;
        result.push((build, notification));
    }

    Ok(result)
}

pub async fn get_aggregated_notification(
    db: &DatabaseConnection,
    project: &MProject,
    commit: &str,
) -> Result<Option<NotificationPayload>, DbErr> {
    if project.summary_check == SummaryCheck::Never {
        return Ok(None);
    }

    let builds = get_commit_builds(db, project.id, commit).await?;
    if !should_aggregate(project.summary_check, builds.len()) {
        return Ok(None);
    }

    let entries: Vec<(MBuild, NotificationType)> = builds
        .into_iter()
        .filter_map(|(build, notification)| {
            notification.map(|notification| (build, notification.notification_type))
        })
        .collect();

    Ok(aggregate_notifications(&entries))
}
