/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

#[cfg(test)]
mod tests {
    use crate::aggregated::*;
    use crate::comment::*;
    use crate::dispatcher::{DispatchOutcome, Providers, process_build_notification};
    use crate::error::{ProviderError, classify_error};
    use crate::github::MockGithubClient;
    use crate::gitlab::MockGitlabClient;
    use crate::notification::*;
    use argos_core::error::JobError;
    use argos_core::storage::MemoryStorage;
    use argos_core::types::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use clap::Parser;
    use entity::build::BuildType;
    use entity::build_notification::NotificationType;
    use entity::job::JobStatus;
    use entity::project::SummaryCheck;
    use entity::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;
    use uuid::Uuid;

    const COMMIT: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HEAD: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn exec_ok() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    fn create_mock_state(db: MockDatabase) -> Arc<ServerState> {
        let cli = Cli::try_parse_from(["argos-server", "--serve-url", "https://argos.test/"]).unwrap();
        Arc::new(ServerState::new(
            db.into_connection(),
            cli,
            Arc::new(MemoryStorage::default()),
        ))
    }

    fn account() -> account::Model {
        account::Model {
            id: Uuid::new_v4(),
            slug: "acme".to_string(),
            name: "Acme".to_string(),
            gitlab_access_token: None,
            created_at: date(),
        }
    }

    fn project(account: &account::Model) -> project::Model {
        project::Model {
            id: Uuid::new_v4(),
            account: account.id,
            name: "web".to_string(),
            pr_comment_enabled: false,
            summary_check: SummaryCheck::Never,
            github_repository: None,
            gitlab_project: None,
            created_at: date(),
        }
    }

    fn github_repository(installation_id: Option<i64>) -> github_repository::Model {
        github_repository::Model {
            id: Uuid::new_v4(),
            owner: "acme".to_string(),
            name: "web".to_string(),
            installation_id,
        }
    }

    fn build(project: &project::Model, name: &str, build_type: BuildType) -> build::Model {
        build::Model {
            id: Uuid::new_v4(),
            project: project.id,
            name: name.to_string(),
            number: 12,
            build_type,
            job_status: JobStatus::Complete,
            commit: COMMIT.to_string(),
            pr_head_commit: Some(HEAD.to_string()),
            github_pull_request: None,
            created_at: date(),
            updated_at: date(),
        }
    }

    fn notification(
        build: &build::Model,
        notification_type: NotificationType,
        offset: i64,
    ) -> build_notification::Model {
        build_notification::Model {
            id: Uuid::new_v4(),
            build: build.id,
            notification_type,
            job_status: JobStatus::Pending,
            created_at: date() + TimeDelta::microseconds(offset),
        }
    }

    fn diff(build: Uuid, base: bool, compare: Uuid, score: Option<f64>) -> screenshot_diff::Model {
        screenshot_diff::Model {
            id: Uuid::new_v4(),
            build,
            base_screenshot: base.then(Uuid::new_v4),
            compare_screenshot: compare,
            score,
            diff_blob_key: None,
            group: None,
            job_status: JobStatus::Complete,
            created_at: date(),
            updated_at: date(),
        }
    }

    fn screenshot(name: &str) -> screenshot::Model {
        screenshot::Model {
            id: Uuid::new_v4(),
            name: name.to_string(),
            blob_key: Uuid::new_v4().to_string(),
            width: None,
            height: None,
            created_at: date(),
        }
    }

    fn providers(github: MockGithubClient, gitlab: MockGitlabClient) -> Providers {
        Providers {
            github: Some(Arc::new(github)),
            gitlab: Arc::new(gitlab),
        }
    }

    #[test]
    fn test_notification_status_table() {
        use GithubState as Gh;
        use GitlabState as Gl;
        use NotificationType::*;

        let cases = [
            (Queued, false, Gh::Pending, Gl::Pending),
            (Queued, true, Gh::Pending, Gl::Pending),
            (Progress, false, Gh::Pending, Gl::Running),
            (NoDiffDetected, false, Gh::Success, Gl::Success),
            (NoDiffDetected, true, Gh::Success, Gl::Success),
            (DiffDetected, true, Gh::Success, Gl::Success),
            (DiffDetected, false, Gh::Failure, Gl::Failed),
            (DiffAccepted, false, Gh::Success, Gl::Success),
            (DiffRejected, false, Gh::Failure, Gl::Failed),
            (DiffRejected, true, Gh::Failure, Gl::Failed),
        ];

        for (notification_type, is_reference, github, gitlab) in cases {
            assert_eq!(
                notification_status(notification_type, is_reference),
                (github, gitlab),
                "{} reference={}",
                notification_type,
                is_reference
            );
        }
    }

    #[test]
    fn test_notification_descriptions() {
        use NotificationType::*;

        assert_eq!(notification_description(Queued, false, ""), "Build is queued");
        assert_eq!(notification_description(Progress, false, ""), "Build in progress...");
        assert_eq!(
            notification_description(NoDiffDetected, false, ""),
            "Everything's good!"
        );
        assert_eq!(
            notification_description(NoDiffDetected, true, ""),
            "Used as comparison baseline"
        );
        assert_eq!(
            notification_description(NoDiffDetected, false, "2 added"),
            "2 added — no change"
        );
        assert_eq!(
            notification_description(DiffDetected, false, "12 changed, 3 added, 1 failure"),
            "12 changed, 3 added, 1 failure — waiting for your decision"
        );
        assert_eq!(
            notification_description(DiffDetected, true, "1 changed"),
            "1 changed — auto-approved"
        );
        assert_eq!(
            notification_description(DiffAccepted, false, "1 changed"),
            "1 changed — changes approved"
        );
        assert_eq!(
            notification_description(DiffRejected, false, ""),
            "Changes rejected"
        );
    }

    #[test]
    fn test_status_context() {
        assert_eq!(status_context("default"), "argos");
        assert_eq!(status_context("mobile"), "argos/mobile");
    }

    #[test]
    fn test_build_stats() {
        let build_id = Uuid::new_v4();
        let failed = screenshot("checkout (failed).png");
        let changed = screenshot("home.png");
        let added = screenshot("signup.png");
        let unchanged = screenshot("about.png");

        let diffs = vec![
            diff(build_id, true, failed.id, Some(0.5)),
            diff(build_id, true, changed.id, Some(0.2)),
            diff(build_id, false, added.id, None),
            diff(build_id, true, unchanged.id, Some(0.0)),
        ];
        let stats =
            BuildStats::from_diffs(&diffs, &[failed, changed, added, unchanged]);

        assert_eq!(
            stats,
            BuildStats {
                changed: 1,
                added: 1,
                unchanged: 1,
                failure: 1,
            }
        );
        assert_eq!(stats.message(), "1 changed, 1 added, 1 failure");

        let many = BuildStats {
            changed: 12,
            added: 3,
            unchanged: 40,
            failure: 2,
        };
        assert_eq!(many.message(), "12 changed, 3 added, 2 failures");
        assert_eq!(BuildStats::default().message(), "");
    }

    #[test]
    fn test_notification_payload_masks_reference_builds() {
        let account = account();
        let project = project(&account);
        let reference = build(&project, "default", BuildType::Reference);
        let stats = BuildStats {
            changed: 4,
            ..Default::default()
        };

        let payload = notification_payload(NotificationType::DiffDetected, &reference, &stats);

        assert_eq!(
            payload,
            NotificationPayload {
                context: "argos".to_string(),
                description: "4 changed — auto-approved".to_string(),
                github: GithubState::Success,
                gitlab: GitlabState::Success,
            }
        );
    }

    #[test]
    fn test_urls() {
        let account = account();
        let project = project(&account);
        let build = build(&project, "default", BuildType::Check);

        assert_eq!(
            build_url("https://argos.test/", &account, &project, &build),
            "https://argos.test/acme/web/builds/12"
        );
        assert_eq!(
            project_url("https://argos.test", &account, &project),
            "https://argos.test/acme/web"
        );
    }

    #[test]
    fn test_aggregate_priority() {
        use NotificationType::*;

        assert_eq!(resolve_aggregate_type([NoDiffDetected, Progress, DiffDetected]), Some(Progress));
        assert_eq!(resolve_aggregate_type([DiffAccepted, DiffRejected]), Some(DiffRejected));
        assert_eq!(resolve_aggregate_type([NoDiffDetected, DiffAccepted]), Some(DiffAccepted));
        assert_eq!(resolve_aggregate_type([DiffDetected, Queued]), Some(Queued));
        assert_eq!(resolve_aggregate_type([]), None);
    }

    #[test]
    fn test_aggregate_detected_beats_accepted() {
        let account = account();
        let project = project(&account);
        let entries = vec![
            (
                build(&project, "default", BuildType::Check),
                NotificationType::DiffDetected,
            ),
            (
                build(&project, "mobile", BuildType::Check),
                NotificationType::DiffAccepted,
            ),
        ];

        assert_eq!(
            aggregate_notifications(&entries),
            Some(NotificationPayload {
                context: "argos/summary".to_string(),
                description: "Diff detected".to_string(),
                github: GithubState::Failure,
                gitlab: GitlabState::Failed,
            })
        );
    }

    #[test]
    fn test_aggregate_reference_builds_are_auto_approved() {
        let account = account();
        let project = project(&account);
        let entries = vec![
            (
                build(&project, "default", BuildType::Reference),
                NotificationType::DiffDetected,
            ),
            (
                build(&project, "mobile", BuildType::Check),
                NotificationType::NoDiffDetected,
            ),
        ];

        let payload = aggregate_notifications(&entries).unwrap();

        assert_eq!(payload.description, "Auto-approved");
        assert_eq!(payload.github, GithubState::Success);
    }

    #[test]
    fn test_latest_builds_per_name() {
        let account = account();
        let project = project(&account);
        let old = build(&project, "default", BuildType::Check);
        let mut rerun = build(&project, "default", BuildType::Check);
        rerun.created_at = old.created_at + TimeDelta::seconds(30);
        let mobile = build(&project, "mobile", BuildType::Check);

        let latest = latest_builds_per_name(vec![rerun.clone(), old, mobile.clone()]);

        assert_eq!(latest, vec![rerun, mobile]);
    }

    #[test]
    fn test_latest_builds_per_name_breaks_ties_on_number() {
        let account = account();
        let project = project(&account);
        let first = build(&project, "default", BuildType::Check);
        let mut second = build(&project, "default", BuildType::Check);
        second.number = first.number + 1;

        let forward = latest_builds_per_name(vec![first.clone(), second.clone()]);
        let backward = latest_builds_per_name(vec![second.clone(), first]);

        assert_eq!(forward, vec![second.clone()]);
        assert_eq!(backward, vec![second]);
    }

    #[test]
    fn test_should_aggregate() {
        assert!(!should_aggregate(SummaryCheck::Never, 3));
        assert!(!should_aggregate(SummaryCheck::Auto, 1));
        assert!(should_aggregate(SummaryCheck::Auto, 2));
        assert!(should_aggregate(SummaryCheck::Always, 1));
        assert!(!should_aggregate(SummaryCheck::Always, 0));
    }

    #[test]
    fn test_format_comment_sorts_rows() {
        let rows = vec![
            CommentRow {
                name: "mobile".to_string(),
                label: "🧿 Changes detected",
                details: "2 changed".to_string(),
                url: "https://argos.test/acme/web/builds/13".to_string(),
            },
            CommentRow {
                name: "default".to_string(),
                label: "✅ No change detected",
                details: String::new(),
                url: "https://argos.test/acme/web/builds/12".to_string(),
            },
        ];

        let body = format_comment(&rows);
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines[2], "| Build name | Status | Details | Inspect |");
        assert_eq!(
            lines[4],
            "| default | ✅ No change detected |  | [Inspect](https://argos.test/acme/web/builds/12) |"
        );
        assert!(lines[5].starts_with("| mobile | 🧿 Changes detected | 2 changed |"));
    }

    #[test]
    fn test_build_label() {
        let account = account();
        let project = project(&account);
        let mut build = build(&project, "default", BuildType::Check);

        assert_eq!(build_label(&build, None), "📭 Waiting for screenshots");
        assert_eq!(
            build_label(&build, Some(NotificationType::DiffRejected)),
            "👎 Changes rejected"
        );

        build.job_status = JobStatus::Error;
        assert_eq!(
            build_label(&build, Some(NotificationType::Progress)),
            "❌ An error happened"
        );
    }

    #[test]
    fn test_classify_error() {
        assert!(matches!(
            classify_error(422, r#"{"message":"No commit found for SHA: abc"}"#),
            ProviderError::CommitNotFound
        ));
        assert!(matches!(classify_error(404, ""), ProviderError::NotFound));
        assert!(matches!(classify_error(401, "bad credentials"), ProviderError::Auth(_)));
        assert!(matches!(
            classify_error(422, "Validation Failed"),
            ProviderError::Api { status: 422, .. }
        ));
    }

    #[tokio::test]
    async fn test_superseded_notification_is_not_delivered() {
        let account = account();
        let project = project(&account);
        let build = build(&project, "default", BuildType::Check);
        let queued = notification(&build, NotificationType::Queued, 0);
        let detected = notification(&build, NotificationType::DiffDetected, 1);

        let state = create_mock_state(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![detected]])
                .append_exec_results([exec_ok()]),
        );

        let mut github = MockGithubClient::new();
        github.expect_create_commit_status().never();
        github.expect_create_pr_comment().never();
        let mut gitlab = MockGitlabClient::new();
        gitlab.expect_edit_commit_status().never();

        let outcome = process_build_notification(&state, &providers(github, gitlab), queued.id)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Superseded);
        assert!(state.locks.is_empty());
    }

    #[tokio::test]
    async fn test_latest_notification_is_delivered_to_github() {
        let account = account();
        let repository = github_repository(Some(42));
        let mut project = project(&account);
        project.github_repository = Some(repository.id);
        let build = build(&project, "default", BuildType::Check);
        let queued = notification(&build, NotificationType::Queued, 0);

        let state = create_mock_state(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![build.clone()]])
                .append_query_results([vec![project.clone()]])
                .append_query_results([vec![account.clone()]])
                .append_query_results([vec![repository.clone()]])
                .append_exec_results([exec_ok()]),
        );

        let mut github = MockGithubClient::new();
        github
            .expect_create_commit_status()
            .withf(|installation_id, status| {
                *installation_id == 42
                    && status.owner == "acme"
                    && status.repo == "web"
                    && status.sha == HEAD
                    && status.state == GithubState::Pending
                    && status.context == "argos"
                    && status.description == "Build is queued"
                    && status.target_url == "https://argos.test/acme/web/builds/12"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = process_build_notification(
            &state,
            &providers(github, MockGitlabClient::new()),
            queued.id,
        )
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_summary_status_is_sent_after_build_status() {
        let account = account();
        let repository = github_repository(Some(42));
        let mut project = project(&account);
        project.github_repository = Some(repository.id);
        project.summary_check = SummaryCheck::Always;
        let default = build(&project, "default", BuildType::Check);
        let mobile = build(&project, "mobile", BuildType::Check);
        let queued = notification(&default, NotificationType::Queued, 0);
        let mobile_detected = notification(&mobile, NotificationType::DiffDetected, 0);

        let state = create_mock_state(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![default.clone()]])
                .append_query_results([vec![project.clone()]])
                .append_query_results([vec![account.clone()]])
                .append_query_results([vec![repository.clone()]])
                .append_query_results([vec![default.clone(), mobile.clone()]])
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![mobile_detected]])
                .append_exec_results([exec_ok()]),
        );

        let mut github = MockGithubClient::new();
        github
            .expect_create_commit_status()
            .withf(|_, status| status.context == "argos")
            .times(1)
            .returning(|_, _| Ok(()));
        github
            .expect_create_commit_status()
            .withf(|_, status| {
                status.context == "argos/summary"
                    && status.state == GithubState::Pending
                    && status.description == "Builds queued..."
                    && status.target_url == "https://argos.test/acme/web"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = process_build_notification(
            &state,
            &providers(github, MockGitlabClient::new()),
            queued.id,
        )
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_pr_comment_is_created_once() {
        let account = account();
        let repository = github_repository(Some(42));
        let mut project = project(&account);
        project.github_repository = Some(repository.id);
        project.pr_comment_enabled = true;
        let pull_request = github_pull_request::Model {
            id: Uuid::new_v4(),
            github_repository: repository.id,
            number: 3,
            comment_id: None,
            comment_deleted: false,
        };
        let mut build = build(&project, "default", BuildType::Check);
        build.github_pull_request = Some(pull_request.id);
        let queued = notification(&build, NotificationType::Queued, 0);

        let state = create_mock_state(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![build.clone()]])
                .append_query_results([vec![project.clone()]])
                .append_query_results([vec![account.clone()]])
                .append_query_results([vec![repository.clone()]])
                .append_query_results([vec![build.clone()]])
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![pull_request.clone()]])
                .append_exec_results([exec_ok(), exec_ok()]),
        );

        let mut github = MockGithubClient::new();
        github
            .expect_create_commit_status()
            .times(1)
            .returning(|_, _| Ok(()));
        github
            .expect_create_pr_comment()
            .withf(|installation_id, _, _, number, body| {
                *installation_id == 42
                    && *number == 3
                    && body.contains("| default | 📭 Waiting for screenshots |")
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(555));
        github.expect_update_pr_comment().never();

        let outcome = process_build_notification(
            &state,
            &providers(github, MockGitlabClient::new()),
            queued.id,
        )
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_unknown_commit_is_ignored() {
        let account = account();
        let repository = github_repository(Some(42));
        let mut project = project(&account);
        project.github_repository = Some(repository.id);
        let build = build(&project, "default", BuildType::Check);
        let progress = notification(&build, NotificationType::Progress, 0);

        let state = create_mock_state(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![progress.clone()]])
                .append_query_results([vec![progress.clone()]])
                .append_query_results([vec![build]])
                .append_query_results([vec![project]])
                .append_query_results([vec![account]])
                .append_query_results([vec![repository]])
                .append_exec_results([exec_ok()]),
        );

        let mut github = MockGithubClient::new();
        github
            .expect_create_commit_status()
            .times(1)
            .returning(|_, _| Err(ProviderError::CommitNotFound));

        let outcome = process_build_notification(
            &state,
            &providers(github, MockGitlabClient::new()),
            progress.id,
        )
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_provider_failure_is_retryable() {
        let account = account();
        let repository = github_repository(Some(42));
        let mut project = project(&account);
        project.github_repository = Some(repository.id);
        let build = build(&project, "default", BuildType::Check);
        let progress = notification(&build, NotificationType::Progress, 0);

        let state = create_mock_state(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![progress.clone()]])
                .append_query_results([vec![progress.clone()]])
                .append_query_results([vec![build]])
                .append_query_results([vec![project]])
                .append_query_results([vec![account]])
                .append_query_results([vec![repository]]),
        );

        let mut github = MockGithubClient::new();
        github.expect_create_commit_status().returning(|_, _| {
            Err(ProviderError::Api {
                status: 502,
                message: "Bad Gateway".to_string(),
            })
        });

        let err = process_build_notification(
            &state,
            &providers(github, MockGitlabClient::new()),
            progress.id,
        )
        .await
        .unwrap_err();

        assert!(err.is_retryable());
        assert!(state.locks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_build_is_unretryable() {
        let account = account();
        let project = project(&account);
        let build = build(&project, "default", BuildType::Check);
        let queued = notification(&build, NotificationType::Queued, 0);

        let state = create_mock_state(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![queued.clone()]])
                .append_query_results([vec![queued.clone()]])
                .append_query_results([Vec::<build::Model>::new()]),
        );

        let err = process_build_notification(
            &state,
            &providers(MockGithubClient::new(), MockGitlabClient::new()),
            queued.id,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, JobError::Unretryable(_)));
    }

    #[tokio::test]
    async fn test_gitlab_status_uses_access_token() {
        let mut account = account();
        account.gitlab_access_token = Some("glpat-secret".to_string());
        let gitlab_project = gitlab_project::Model {
            id: Uuid::new_v4(),
            gitlab_id: 99,
            path: "acme/web".to_string(),
        };
        let mut project = project(&account);
        project.gitlab_project = Some(gitlab_project.id);
        let build = build(&project, "mobile", BuildType::Check);
        let progress = notification(&build, NotificationType::Progress, 0);

        let state = create_mock_state(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![progress.clone()]])
                .append_query_results([vec![progress.clone()]])
                .append_query_results([vec![build]])
                .append_query_results([vec![project]])
                .append_query_results([vec![account]])
                .append_query_results([vec![gitlab_project]])
                .append_exec_results([exec_ok()]),
        );

        let mut gitlab = MockGitlabClient::new();
        gitlab
            .expect_edit_commit_status()
            .withf(|token, status| {
                token.to_string() == "glpat-secret"
                    && status.project_id == 99
                    && status.sha == HEAD
                    && status.state == GitlabState::Running
                    && status.context == "argos/mobile"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let providers = Providers {
            github: None,
            gitlab: Arc::new(gitlab),
        };

        let outcome = process_build_notification(&state, &providers, progress.id)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_stats_are_loaded_for_concluded_builds() {
        let build_id = Uuid::new_v4();
        let changed = screenshot("home.png");
        let diffs = vec![diff(build_id, true, changed.id, Some(0.3))];

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([diffs])
            .append_query_results([vec![changed]])
            .into_connection();

        let stats = load_build_stats(&db, build_id).await.unwrap();

        assert_eq!(stats.message(), "1 changed");
    }
}
