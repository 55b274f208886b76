/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod consts;
pub mod database;
pub mod error;
pub mod input;
pub mod job;
pub mod lock;
pub mod storage;
pub mod types;

use anyhow::Result;
use clap::Parser;
use database::connect_db;
use std::sync::Arc;
use storage::{BlobStorage, FileStorage, MemoryStorage};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use types::*;

pub async fn init_state() -> Result<Arc<ServerState>> {
    let cli = Cli::parse();
    init_logging(&cli);

    info!(serve_url = %cli.serve_url, "Starting Argos Server");

    let db = connect_db(&cli).await?;

    let storage: Arc<dyn BlobStorage> = match &cli.storage_path {
        Some(path) => Arc::new(FileStorage::new(path)),
        None => {
            warn!("No storage path configured, keeping blobs in memory");
            Arc::new(MemoryStorage::default())
        }
    };

    Ok(Arc::new(ServerState::new(db, cli, storage)))
}

pub fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if cli.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
