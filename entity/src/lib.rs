/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod account;
pub mod build;
pub mod build_notification;
pub mod github_pull_request;
pub mod github_repository;
pub mod gitlab_project;
pub mod job;
pub mod project;
pub mod screenshot;
pub mod screenshot_diff;
