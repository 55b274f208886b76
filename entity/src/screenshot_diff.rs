/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "screenshot_diff")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub build: Uuid,
    pub base_screenshot: Option<Uuid>,
    pub compare_screenshot: Uuid,
    /// Fraction of differing pixels, unset until the diff ran.
    pub score: Option<f64>,
    /// Content hash of the diff image, shared by identical diffs.
    pub diff_blob_key: Option<String>,
    /// Set to the diff key when several diffs of one build look the same.
    pub group: Option<String>,
    pub job_status: JobStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::build::Entity",
        from = "Column::Build",
        to = "super::build::Column::Id"
    )]
    Build,
    #[sea_orm(
        belongs_to = "super::screenshot::Entity",
        from = "Column::BaseScreenshot",
        to = "super::screenshot::Column::Id"
    )]
    BaseScreenshot,
    #[sea_orm(
        belongs_to = "super::screenshot::Entity",
        from = "Column::CompareScreenshot",
        to = "super::screenshot::Column::Id"
    )]
    CompareScreenshot,
}

impl ActiveModelBehavior for ActiveModel {}
