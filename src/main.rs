/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use argos_core::database::recover_pending_jobs;
use argos_core::init_state;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let state = init_state().await?;

    let _guard = state
        .cli
        .sentry_dsn
        .as_deref()
        .map(|dsn| sentry::init(dsn));

    recover_pending_jobs(&state).await?;

    differ::start_differ(Arc::clone(&state)).await?;
    notifier::start_notifier(Arc::clone(&state)).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down Argos Server");

    Ok(())
}
