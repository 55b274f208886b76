/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use super::input::{fraction, greater_than_zero};
use super::job::JobQueue;
use super::lock::KeyedLock;
use super::storage::BlobStorage;
use clap::Parser;
use entity::*;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Parser, Debug, Clone)]
#[command(name = "Argos", display_name = "Argos", bin_name = "argos-server", author = "Wavelens", version, about, long_about = None)]
pub struct Cli {
    #[arg(long, env = "ARGOS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    #[arg(long, env = "ARGOS_LOG_JSON", default_value = "false")]
    pub log_json: bool,
    #[arg(long, env = "ARGOS_SERVE_URL", default_value = "http://127.0.0.1:8000")]
    pub serve_url: String,
    #[arg(long, env = "ARGOS_DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long, env = "ARGOS_DATABASE_URL_FILE")]
    pub database_url_file: Option<String>,
    #[arg(long, env = "ARGOS_STORAGE_PATH")]
    pub storage_path: Option<String>,
    #[arg(long, env = "ARGOS_SCRATCH_PATH")]
    pub scratch_path: Option<String>,
    #[arg(long, env = "ARGOS_MAX_CONCURRENT_DIFFS", value_parser = greater_than_zero::<usize>, default_value = "10")]
    pub max_concurrent_diffs: usize,
    #[arg(long, env = "ARGOS_MAX_CONCURRENT_NOTIFICATIONS", value_parser = greater_than_zero::<usize>, default_value = "10")]
    pub max_concurrent_notifications: usize,
    #[arg(long, env = "ARGOS_DIFF_FUZZ", value_parser = fraction, default_value = "0.1")]
    pub diff_fuzz: f64,
    #[arg(long, env = "ARGOS_DIFF_NOISE_FLOOR", value_parser = fraction, default_value = "0.00003")]
    pub diff_noise_floor: f64,
    #[arg(long, env = "ARGOS_GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,
    #[arg(long, env = "ARGOS_GITHUB_APP_ID")]
    pub github_app_id: Option<u64>,
    #[arg(long, env = "ARGOS_GITHUB_APP_PRIVATE_KEY_FILE")]
    pub github_app_private_key_file: Option<String>,
    #[arg(long, env = "ARGOS_GITLAB_URL", default_value = "https://gitlab.com")]
    pub gitlab_url: String,
    #[arg(long, env = "ARGOS_SENTRY_DSN")]
    pub sentry_dsn: Option<String>,
}

#[derive(Debug)]
pub struct ServerState {
    pub db: DatabaseConnection,
    pub cli: Cli,
    pub locks: KeyedLock,
    pub queue: JobQueue,
    pub storage: Arc<dyn BlobStorage>,
}

impl ServerState {
    pub fn new(db: DatabaseConnection, cli: Cli, storage: Arc<dyn BlobStorage>) -> Self {
        Self {
            db,
            cli,
            locks: KeyedLock::default(),
            queue: JobQueue::new(),
            storage,
        }
    }
}

pub type EAccount = account::Entity;
pub type EBuild = build::Entity;
pub type EBuildNotification = build_notification::Entity;
pub type EGithubPullRequest = github_pull_request::Entity;
pub type EGithubRepository = github_repository::Entity;
pub type EGitlabProject = gitlab_project::Entity;
pub type EProject = project::Entity;
pub type EScreenshot = screenshot::Entity;
pub type EScreenshotDiff = screenshot_diff::Entity;

pub type MAccount = account::Model;
pub type MBuild = build::Model;
pub type MBuildNotification = build_notification::Model;
pub type MGithubPullRequest = github_pull_request::Model;
pub type MGithubRepository = github_repository::Model;
pub type MGitlabProject = gitlab_project::Model;
pub type MProject = project::Model;
pub type MScreenshot = screenshot::Model;
pub type MScreenshotDiff = screenshot_diff::Model;

pub type AAccount = account::ActiveModel;
pub type ABuild = build::ActiveModel;
pub type ABuildNotification = build_notification::ActiveModel;
pub type AGithubPullRequest = github_pull_request::ActiveModel;
pub type AGithubRepository = github_repository::ActiveModel;
pub type AGitlabProject = gitlab_project::ActiveModel;
pub type AProject = project::ActiveModel;
pub type AScreenshot = screenshot::ActiveModel;
pub type AScreenshotDiff = screenshot_diff::ActiveModel;

pub type CAccount = account::Column;
pub type CBuild = build::Column;
pub type CBuildNotification = build_notification::Column;
pub type CGithubPullRequest = github_pull_request::Column;
pub type CGithubRepository = github_repository::Column;
pub type CGitlabProject = gitlab_project::Column;
pub type CProject = project::Column;
pub type CScreenshot = screenshot::Column;
pub type CScreenshotDiff = screenshot_diff::Column;

pub type RBuild = build::Relation;
pub type RBuildNotification = build_notification::Relation;
pub type RGithubPullRequest = github_pull_request::Relation;
pub type RProject = project::Relation;
pub type RScreenshotDiff = screenshot_diff::Relation;
