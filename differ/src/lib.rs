/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod comparator;
pub mod completion;
pub mod worker;


use argos_core::job::{RetryPolicy, run_job_loop};
use argos_core::types::ServerState;
use std::sync::Arc;
use worker::DiffJob;

pub async fn start_differ(state: Arc<ServerState>) -> std::io::Result<()> {
    let job = Arc::new(DiffJob::from_cli(&state.cli));
    let max_concurrent = state.cli.max_concurrent_diffs;

    tokio::spawn(run_job_loop(
        Arc::clone(&state),
        job,
        max_concurrent,
        RetryPolicy::default(),
    ));

    Ok(())
}
