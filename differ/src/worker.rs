/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Context;
use argos_core::consts::{DIFF_JOB_TIMEOUT, DIFF_UPLOAD_LOCK_TIMEOUT};
use argos_core::error::JobError;
use argos_core::job::{Job, Queue};
use argos_core::storage::BlobStorage;
use argos_core::types::*;
use async_trait::async_trait;
use chrono::Utc;
use entity::job::JobStatus;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::comparator::{
    CompareError, CompareOptions, ImageDifference, compare_files, image_dimensions,
    write_diff_image,
};
use super::completion::check_build_completion;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiffOutcome {
    /// The row was already complete, only build completion was re-checked.
    AlreadyComplete,
    Completed { score: Option<f64> },
}

#[derive(Debug, Clone)]
pub struct DiffJob {
    pub options: CompareOptions,
    pub scratch_root: Option<PathBuf>,
}

impl DiffJob {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            options: CompareOptions {
                fuzz: cli.diff_fuzz,
                noise_floor: cli.diff_noise_floor,
            },
            scratch_root: cli.scratch_path.as_ref().map(PathBuf::from),
        }
    }
}

#[async_trait]
impl Job for DiffJob {
    const QUEUE: Queue = Queue::ScreenshotDiff;

    fn timeout(&self) -> Duration {
        DIFF_JOB_TIMEOUT
    }

    async fn perform(&self, state: Arc<ServerState>, id: Uuid) -> Result<(), JobError> {
        compute_screenshot_diff(&state, id, &self.options, self.scratch_root.as_deref())
            .await
            .map(|_| ())
    }

    async fn failed(&self, state: Arc<ServerState>, id: Uuid, _error: &JobError) {
        let screenshot_diff = match EScreenshotDiff::find_by_id(id).one(&state.db).await {
            Ok(Some(screenshot_diff)) => screenshot_diff,
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, screenshot_diff_id = %id, "Failed to query screenshot diff");
                return;
            }
        };

        let mut ascreenshot_diff = screenshot_diff.into_active_model();
        ascreenshot_diff.job_status = Set(JobStatus::Error);
        ascreenshot_diff.updated_at = Set(Utc::now().naive_utc());

        if let Err(e) = ascreenshot_diff.update(&state.db).await {
            error!(error = %e, screenshot_diff_id = %id, "Failed to mark screenshot diff as failed");
        }
    }
}

#[instrument(skip(state, options, scratch_root), fields(screenshot_diff_id = %diff_id))]
pub async fn compute_screenshot_diff(
    state: &ServerState,
    diff_id: Uuid,
    options: &CompareOptions,
    scratch_root: Option<&Path>,
) -> Result<DiffOutcome, JobError> {
    let screenshot_diff = EScreenshotDiff::find_by_id(diff_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| JobError::unretryable(format!("Screenshot diff {} not found", diff_id)))?;

    // a retry may land here after the row was saved but before the build was concluded
    if screenshot_diff.job_status == JobStatus::Complete {
        debug!("Screenshot diff already complete, re-checking build completion");
        check_build_completion(state, screenshot_diff.build).await?;
        return Ok(DiffOutcome::AlreadyComplete);
    }

    let build = EBuild::find_by_id(screenshot_diff.build)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            JobError::unretryable(format!("Build {} not found", screenshot_diff.build))
        })?;

    let compare = find_screenshot(state, screenshot_diff.compare_screenshot).await?;
    let base = match screenshot_diff.base_screenshot {
        Some(id) => Some(find_screenshot(state, id).await?),
        None => None,
    };

    let (score, diff_blob_key) = match base {
        Some(base) if base.blob_key == compare.blob_key => {
            return Err(JobError::unretryable(format!(
                "Base and compare screenshot share blob {}",
                base.blob_key
            )));
        }
        Some(base) => {
            let result = diff_screenshots(state, &base, &compare, options, scratch_root).await?;
            ensure_dimensions(state, &base, result.base_dimensions).await?;
            ensure_dimensions(state, &compare, result.compare_dimensions).await?;
            (Some(result.score), result.diff_blob_key)
        }
        None => {
            debug!(screenshot = %compare.name, "No base screenshot, nothing to compare");
            if !has_dimensions(&compare) {
                let dimensions = fetch_dimensions(state, &compare, scratch_root).await?;
                ensure_dimensions(state, &compare, dimensions).await?;
            }
            (None, None)
        }
    };

    let mut ascreenshot_diff = screenshot_diff.into_active_model();
    ascreenshot_diff.score = Set(score);
    ascreenshot_diff.diff_blob_key = Set(diff_blob_key.clone());
    ascreenshot_diff.job_status = Set(JobStatus::Complete);
    ascreenshot_diff.updated_at = Set(Utc::now().naive_utc());
    ascreenshot_diff.update(&state.db).await?;

    info!(build_id = %build.id, screenshot = %compare.name, score = ?score, "Screenshot diff complete");

    if let Some(diff_key) = &diff_blob_key {
        group_similar_diffs(state, build.id, diff_key).await?;
    }

    check_build_completion(state, build.id).await?;

    Ok(DiffOutcome::Completed { score })
}

async fn find_screenshot(state: &ServerState, id: Uuid) -> Result<MScreenshot, JobError> {
    EScreenshot::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| JobError::unretryable(format!("Screenshot {} not found", id)))
}

#[derive(Debug)]
pub(crate) struct Measurement {
    pub difference: ImageDifference,
    /// Unset when there is nothing to highlight or the image could not be written.
    pub diff_path: Option<PathBuf>,
    pub base_dimensions: (u32, u32),
    pub compare_dimensions: (u32, u32),
}

/// Blocking part of a diff: compare two local files and render the highlight.
///
/// A failed write of the diff image keeps the computed score.
pub(crate) fn measure_screenshots(
    base_path: &Path,
    compare_path: &Path,
    diff_path: &Path,
    options: &CompareOptions,
) -> Result<Measurement, CompareError> {
    let difference = compare_files(base_path, compare_path, options)?;
    let base_dimensions = image_dimensions(base_path)?;
    let compare_dimensions = image_dimensions(compare_path)?;

    let diff_path = match &difference.diff_image {
        Some(image) => match write_diff_image(image, diff_path) {
            Ok(()) => Some(diff_path.to_path_buf()),
            Err(e) => {
                warn!(error = %e, "Failed to write diff image, keeping score only");
                None
            }
        },
        None => None,
    };

    Ok(Measurement {
        difference,
        diff_path,
        base_dimensions,
        compare_dimensions,
    })
}

struct DiffResult {
    score: f64,
    diff_blob_key: Option<String>,
    base_dimensions: (u32, u32),
    compare_dimensions: (u32, u32),
}

async fn diff_screenshots(
    state: &ServerState,
    base: &MScreenshot,
    compare: &MScreenshot,
    options: &CompareOptions,
    scratch_root: Option<&Path>,
) -> Result<DiffResult, JobError> {
    // removed on drop, whichever way this function returns
    let scratch = create_scratch_dir(scratch_root)?;
    let base_path = scratch.path().join("base.png");
    let compare_path = scratch.path().join("compare.png");
    let diff_path = scratch.path().join("diff.png");

    tokio::try_join!(
        download_blob(state.storage.as_ref(), &base.blob_key, &base_path),
        download_blob(state.storage.as_ref(), &compare.blob_key, &compare_path),
    )?;

    let options = *options;
    let measurement = tokio::task::spawn_blocking(move || {
        measure_screenshots(&base_path, &compare_path, &diff_path, &options)
    })
    .await
    .context("Image comparison task failed")??;

    let difference = &measurement.difference;
    debug!(
        width = difference.width,
        height = difference.height,
        pixels_different = difference.pixels_different,
        score = difference.score,
        "Compared screenshots"
    );

    let diff_blob_key = match &measurement.diff_path {
        Some(path) => Some(upload_diff_image(state, path).await?),
        None => None,
    };

    Ok(DiffResult {
        score: difference.score,
        diff_blob_key,
        base_dimensions: measurement.base_dimensions,
        compare_dimensions: measurement.compare_dimensions,
    })
}

/// Stores the diff image under the sha256 of its bytes. Identical diffs end
/// up as one blob; the lock keeps concurrent jobs from uploading it twice.
async fn upload_diff_image(state: &ServerState, path: &Path) -> Result<String, JobError> {
    let data = tokio::fs::read(path)
        .await
        .context("Failed to read diff image")?;
    let key = hex::encode(Sha256::digest(&data));

    if state.storage.exists(&key).await? {
        debug!(key = %key, "Reusing stored diff image");
        return Ok(key);
    }

    let _guard = state
        .locks
        .acquire(&format!("diff-upload:{}", key), DIFF_UPLOAD_LOCK_TIMEOUT)
        .await?;

    if !state.storage.exists(&key).await? {
        state.storage.put_with_key(&key, data).await?;
    }

    Ok(key)
}

/// Tags diffs of one build that produced the same diff image with a shared group.
async fn group_similar_diffs(
    state: &ServerState,
    build_id: Uuid,
    diff_key: &str,
) -> Result<(), JobError> {
    let similar = EScreenshotDiff::find()
        .filter(CScreenshotDiff::Build.eq(build_id))
        .filter(CScreenshotDiff::DiffBlobKey.eq(diff_key))
        .all(&state.db)
        .await?;

    if similar.len() < 2 {
        return Ok(());
    }

    let ungrouped: Vec<Uuid> = similar
        .iter()
        .filter(|diff| diff.group.is_none())
        .map(|diff| diff.id)
        .collect();

    if ungrouped.is_empty() {
        return Ok(());
    }

    EScreenshotDiff::update_many()
        .col_expr(CScreenshotDiff::Group, Expr::value(diff_key))
        .filter(CScreenshotDiff::Id.is_in(ungrouped))
        .exec(&state.db)
        .await?;

    debug!(group = %diff_key, screenshot_diffs = similar.len(), "Grouped identical diffs");
    Ok(())
}

fn has_dimensions(screenshot: &MScreenshot) -> bool {
    screenshot.width.is_some() && screenshot.height.is_some()
}

async fn fetch_dimensions(
    state: &ServerState,
    screenshot: &MScreenshot,
    scratch_root: Option<&Path>,
) -> Result<(u32, u32), JobError> {
    let scratch = create_scratch_dir(scratch_root)?;
    let path = scratch.path().join("screenshot.png");
    download_blob(state.storage.as_ref(), &screenshot.blob_key, &path).await?;

    let dimensions = tokio::task::spawn_blocking(move || image_dimensions(&path))
        .await
        .context("Image dimension task failed")??;

    Ok(dimensions)
}

/// Records the size of a screenshot that was stored without one.
async fn ensure_dimensions(
    state: &ServerState,
    screenshot: &MScreenshot,
    (width, height): (u32, u32),
) -> Result<(), JobError> {
    if has_dimensions(screenshot) {
        return Ok(());
    }

    let width = i32::try_from(width)
        .map_err(|_| JobError::unretryable(format!("Screenshot width {} out of range", width)))?;
    let height = i32::try_from(height)
        .map_err(|_| JobError::unretryable(format!("Screenshot height {} out of range", height)))?;

    EScreenshot::update_many()
        .col_expr(CScreenshot::Width, Expr::value(width))
        .col_expr(CScreenshot::Height, Expr::value(height))
        .filter(CScreenshot::Id.eq(screenshot.id))
        .exec(&state.db)
        .await?;

    debug!(screenshot = %screenshot.name, width, height, "Recorded screenshot dimensions");
    Ok(())
}

fn create_scratch_dir(root: Option<&Path>) -> Result<TempDir, JobError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("argos-diff-");

    let dir = match root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    };

    Ok(dir.context("Failed to create scratch directory")?)
}

async fn download_blob(storage: &dyn BlobStorage, key: &str, path: &Path) -> Result<(), JobError> {
    let data = storage.get(key).await?;
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write blob {} to scratch directory", key))?;
    Ok(())
}
