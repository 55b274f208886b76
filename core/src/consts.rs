/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::time::Duration;

pub const DIFF_JOB_TIMEOUT: Duration = Duration::from_secs(25);
pub const NOTIFICATION_JOB_TIMEOUT: Duration = Duration::from_secs(25);

// Lock timeouts stay below the timeout of the job holding them.
pub const NOTIFICATION_LOCK_TIMEOUT: Duration = Duration::from_secs(20);
pub const COMMIT_STATUS_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
pub const PR_COMMENT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DIFF_UPLOAD_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

pub const MAX_JOB_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_BUILD_NAME: &str = "default";
pub const STATUS_CONTEXT: &str = "argos";
pub const SUMMARY_CONTEXT: &str = "argos/summary";

/// Marker in a screenshot name for captures taken from a failing test.
pub const FAILED_SCREENSHOT_MARKER: &str = "(failed)";

pub const DEFAULT_FUZZ: f64 = 0.10;
pub const NOISE_FLOOR: f64 = 0.00003;
