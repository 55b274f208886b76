/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, SubsecRound, TimeDelta, Utc};
use entity::build_notification::NotificationType;
use entity::job::JobStatus;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectOptions, Database, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use std::time::Duration;
use tracing::log::LevelFilter;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::consts::NOTIFICATION_LOCK_TIMEOUT;
use super::error::JobError;
use super::job::Queue;
use super::types::*;

pub async fn connect_db(cli: &Cli) -> Result<DatabaseConnection> {
    let db_url = if let Some(file) = &cli.database_url_file {
        std::fs::read_to_string(file)
            .context("Failed to read database url from file")?
            .trim()
            .to_string()
    } else if let Some(url) = &cli.database_url {
        url.clone()
    } else {
        anyhow::bail!("No database url provided")
    };

    let mut opt = ConnectOptions::new(db_url);

    // Only enable SQL logging at debug level
    if cli.log_level == "debug" {
        opt.sqlx_logging(true).sqlx_logging_level(LevelFilter::Debug);
    } else {
        opt.sqlx_logging(false);
    }

    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8));

    Database::connect(opt)
        .await
        .context("Failed to connect to database")
}

/// Pushes every row left pending by a previous process back onto its queue.
pub async fn recover_pending_jobs(state: &ServerState) -> Result<()> {
    let diffs = EScreenshotDiff::find()
        .filter(CScreenshotDiff::JobStatus.eq(JobStatus::Pending))
        .all(&state.db)
        .await
        .context("Failed to query pending screenshot diffs")?;

    for diff in &diffs {
        state.queue.push(Queue::ScreenshotDiff, diff.id)?;
    }

    let notifications = EBuildNotification::find()
        .filter(CBuildNotification::JobStatus.eq(JobStatus::Pending))
        .order_by_asc(CBuildNotification::CreatedAt)
        .all(&state.db)
        .await
        .context("Failed to query pending build notifications")?;

    for notification in &notifications {
        state.queue.push(Queue::BuildNotification, notification.id)?;
    }

    info!(
        screenshot_diffs = diffs.len(),
        build_notifications = notifications.len(),
        "Recovered pending jobs"
    );

    Ok(())
}

pub async fn get_latest_build_notification(
    db: &DatabaseConnection,
    build_id: Uuid,
) -> Result<Option<MBuildNotification>, DbErr> {
    EBuildNotification::find()
        .filter(CBuildNotification::Build.eq(build_id))
        .order_by_desc(CBuildNotification::CreatedAt)
        .one(db)
        .await
}

/// Timestamp for the next log entry of a build, strictly after `latest` at
/// the microsecond precision of the store.
pub fn next_notification_time(
    now: NaiveDateTime,
    latest: Option<NaiveDateTime>,
) -> NaiveDateTime {
    let now = now.trunc_subsecs(6);

    match latest {
        Some(latest) if latest >= now => latest.trunc_subsecs(6) + TimeDelta::microseconds(1),
        _ => now,
    }
}

#[instrument(skip(state), fields(build_id = %build_id, notification_type = %notification_type))]
pub async fn push_build_notification(
    state: &ServerState,
    build_id: Uuid,
    notification_type: NotificationType,
) -> Result<MBuildNotification, JobError> {
    let _guard = state
        .locks
        .acquire(
            &format!("build-notification-log:{}", build_id),
            NOTIFICATION_LOCK_TIMEOUT,
        )
        .await?;

    let latest = get_latest_build_notification(&state.db, build_id).await?;
    let created_at = next_notification_time(
        Utc::now().naive_utc(),
        latest.map(|notification| notification.created_at),
    );

    let anotification = ABuildNotification {
        id: Set(Uuid::new_v4()),
        build: Set(build_id),
        notification_type: Set(notification_type),
        job_status: Set(JobStatus::Pending),
        created_at: Set(created_at),
    };

    let notification = anotification.insert(&state.db).await?;
    state.queue.push(Queue::BuildNotification, notification.id)?;

    debug!(build_notification_id = %notification.id, "Queued build notification");
    Ok(notification)
}
