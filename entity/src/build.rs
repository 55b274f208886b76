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

#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveActiveEnum, EnumIter, Deserialize, Serialize)]
#[sea_orm(rs_type = "i16", db_type = "Integer")]
pub enum BuildType {
    /// Baseline build, its diffs are auto-approved.
    #[sea_orm(num_value = 0)]
    Reference,
    #[sea_orm(num_value = 1)]
    Check,
    /// No baseline was found to compare against.
    #[sea_orm(num_value = 2)]
    Orphan,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "build")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project: Uuid,
    pub name: String,
    pub number: i32,
    pub build_type: BuildType,
    pub job_status: JobStatus,
    pub commit: String,
    pub pr_head_commit: Option<String>,
    pub github_pull_request: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::Project",
        to = "super::project::Column::Id"
    )]
    Project,
    #[sea_orm(
        belongs_to = "super::github_pull_request::Entity",
        from = "Column::GithubPullRequest",
        to = "super::github_pull_request::Column::Id"
    )]
    GithubPullRequest,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
