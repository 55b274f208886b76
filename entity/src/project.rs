/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// When the rollup status across sibling builds of a commit is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveActiveEnum, EnumIter, Deserialize, Serialize)]
#[sea_orm(rs_type = "i16", db_type = "Integer")]
pub enum SummaryCheck {
    #[sea_orm(num_value = 0)]
    Never,
    #[sea_orm(num_value = 1)]
    Auto,
    #[sea_orm(num_value = 2)]
    Always,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "project")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account: Uuid,
    pub name: String,
    pub pr_comment_enabled: bool,
    pub summary_check: SummaryCheck,
    pub github_repository: Option<Uuid>,
    pub gitlab_project: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::Account",
        to = "super::account::Column::Id"
    )]
    Account,
    #[sea_orm(
        belongs_to = "super::github_repository::Entity",
        from = "Column::GithubRepository",
        to = "super::github_repository::Column::Id"
    )]
    GithubRepository,
    #[sea_orm(
        belongs_to = "super::gitlab_project::Entity",
        from = "Column::GitlabProject",
        to = "super::gitlab_project::Column::Id"
    )]
    GitlabProject,
}

impl ActiveModelBehavior for ActiveModel {}
