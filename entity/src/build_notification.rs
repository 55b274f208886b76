/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::job::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, DeriveActiveEnum, EnumIter, Deserialize, Serialize)]
#[sea_orm(rs_type = "i16", db_type = "Integer")]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
    #[sea_orm(num_value = 0)]
    Queued,
    #[sea_orm(num_value = 1)]
    Progress,
    #[sea_orm(num_value = 2)]
    DiffDetected,
    #[sea_orm(num_value = 3)]
    NoDiffDetected,
    #[sea_orm(num_value = 4)]
    DiffAccepted,
    #[sea_orm(num_value = 5)]
    DiffRejected,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationType::Queued => "queued",
            NotificationType::Progress => "progress",
            NotificationType::DiffDetected => "diff-detected",
            NotificationType::NoDiffDetected => "no-diff-detected",
            NotificationType::DiffAccepted => "diff-accepted",
            NotificationType::DiffRejected => "diff-rejected",
        };
        write!(f, "{}", s)
    }
}

/// Append-only log entry. The row with the greatest `created_at` per build is
/// the current state of that build.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "build_notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub build: Uuid,
    pub notification_type: NotificationType,
    pub job_status: JobStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::build::Entity",
        from = "Column::Build",
        to = "super::build::Column::Id"
    )]
    Build,
}

impl ActiveModelBehavior for ActiveModel {}
