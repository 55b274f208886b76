/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod aggregated;
pub mod comment;
pub mod dispatcher;
pub mod error;
pub mod github;
pub mod gitlab;
pub mod notification;

#[cfg(test)]
mod tests;

use argos_core::job::{RetryPolicy, run_job_loop};
use argos_core::types::ServerState;
use dispatcher::{NotificationJob, Providers};
use std::sync::Arc;

pub async fn start_notifier(state: Arc<ServerState>) -> anyhow::Result<()> {
    let providers = Providers::from_cli(&state.cli)?;
    let job = Arc::new(NotificationJob { providers });
    let max_concurrent = state.cli.max_concurrent_notifications;

    tokio::spawn(run_job_loop(
        Arc::clone(&state),
        job,
        max_concurrent,
        RetryPolicy::default(),
    ));

    Ok(())
}
