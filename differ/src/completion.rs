/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use argos_core::database::push_build_notification;
use argos_core::error::JobError;
use argos_core::types::*;
use chrono::Utc;
use entity::build_notification::NotificationType;
use entity::job::JobStatus;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Decides the build-level notification from the sibling diffs of one build.
///
/// Nothing is decided until every diff is complete. Reading the siblings is
/// race tolerant: when the last two diffs finish together both may conclude,
/// the resulting duplicate entry is harmless because only the latest counts.
pub fn evaluate_build_completion(diffs: &[MScreenshotDiff]) -> Option<NotificationType> {
    if diffs.is_empty() || diffs.iter().any(|diff| diff.job_status != JobStatus::Complete) {
        return None;
    }

    if diffs.iter().any(|diff| diff.score.is_some_and(|score| score > 0.0)) {
        Some(NotificationType::DiffDetected)
    } else {
        Some(NotificationType::NoDiffDetected)
    }
}

#[instrument(skip(state), fields(build_id = %build_id))]
pub async fn check_build_completion(
    state: &ServerState,
    build_id: Uuid,
) -> Result<Option<NotificationType>, JobError> {
    let diffs = EScreenshotDiff::find()
        .filter(CScreenshotDiff::Build.eq(build_id))
        .all(&state.db)
        .await?;

    let notification_type = match evaluate_build_completion(&diffs) {
        Some(notification_type) => notification_type,
        None => {
            debug!(screenshot_diffs = diffs.len(), "Build still has diffs in flight");
            return Ok(None);
        }
    };

    push_build_notification(state, build_id, notification_type).await?;

    EBuild::update_many()
        .col_expr(CBuild::JobStatus, Expr::value(JobStatus::Complete))
        .col_expr(CBuild::UpdatedAt, Expr::value(Utc::now().naive_utc()))
        .filter(CBuild::Id.eq(build_id))
        .exec(&state.db)
        .await?;

    info!(notification_type = %notification_type, "Build completed");
    Ok(Some(notification_type))
}
