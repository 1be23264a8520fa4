use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset};
use reltrain_core::ReleaseConfig;
use reltrain_gateway::{BuildGateway, RepositoryGateway};
use serde::Serialize;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::error::ConductorError;
use crate::phase::branch::ReleaseBranchResolver;
use crate::phase::build::{BuildOutcome, BuildTrigger};
use crate::phase::merge::MasterMergeCoordinator;
use crate::phase::onboard::BuildDefinitionOnboarder;
use crate::phase::version::{ResetOutcome, VersionStateMachine};
use crate::runner::notify::Notifier;
use crate::runner::report::{Phase, PhaseReport};

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub branch: String,
    pub version: String,
    pub expected_build: u64,
    pub reports: Vec<PhaseReport>,
    /// Both concurrent phases passed.
    pub success: bool,
}

pub struct Orchestrator {
    config: Arc<ReleaseConfig>,
    repo: Arc<dyn RepositoryGateway>,
    builds: Arc<dyn BuildGateway>,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<ReleaseConfig>,
        repo: Arc<dyn RepositoryGateway>,
        builds: Arc<dyn BuildGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            repo,
            builds,
            notifier,
        }
    }

    /// Branch then version, in order; then build and merge side by side.
    /// Errors from the first two phases end the run. The last two always
    /// both run to completion.
    pub async fn run(&self, now: DateTime<FixedOffset>) -> Result<RunSummary, ConductorError> {
        let mut reports = Vec::with_capacity(4);

        let started = Instant::now();
        let resolver = ReleaseBranchResolver::new(self.config.clone(), self.repo.clone());
        let branch = match resolver.resolve(now).await {
            Ok(branch) => branch,
            Err(e) => {
                self.fail(Phase::Branch, &e, started).await;
                return Err(e);
            }
        };
        reports.push(
            emit(
                self.notifier.as_ref(),
                PhaseReport::passed(
                    Phase::Branch,
                    format!("{} at {}", branch.name, branch.head_commit_id),
                    started.elapsed(),
                ),
            )
            .await,
        );

        let started = Instant::now();
        let machine = VersionStateMachine::new(self.config.clone(), self.repo.clone());
        let reset = match machine.ensure_reset(&branch, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(Phase::Version, &e, started).await;
                return Err(e);
            }
        };
        let report = match &reset {
            // Non-fatal: downstream phases still run against the current build.
            ResetOutcome::Aborted { .. } => {
                PhaseReport::failed(Phase::Version, reset.describe(), started.elapsed())
            }
            _ => PhaseReport::passed(Phase::Version, reset.describe(), started.elapsed()),
        };
        reports.push(emit(self.notifier.as_ref(), report).await);

        let expected_build = reset.expected_build();
        info!(branch = %branch.name, expected_build, "starting build and merge phases");

        let build_task = tokio::spawn(build_phase(
            self.config.clone(),
            self.builds.clone(),
            self.notifier.clone(),
            branch.name.clone(),
        ));
        let merge_task = tokio::spawn(merge_phase(
            self.config.clone(),
            self.repo.clone(),
            self.notifier.clone(),
            branch.name.clone(),
            expected_build,
        ));
        let (build, merge) = tokio::join!(build_task, merge_task);

        let build = self.joined(Phase::Build, build).await;
        let merge = self.joined(Phase::Merge, merge).await;
        let success = build.passed && merge.passed;
        reports.push(build);
        reports.push(merge);

        info!(branch = %branch.name, success, "run finished");
        Ok(RunSummary {
            branch: branch.name,
            version: reset.version().to_string(),
            expected_build,
            reports,
            success,
        })
    }

    async fn fail(&self, phase: Phase, err: &ConductorError, started: Instant) {
        error!(%phase, error = %err, fatal = err.is_fatal(), "phase failed");
        emit(
            self.notifier.as_ref(),
            PhaseReport::failed(phase, err.report_detail(), started.elapsed()),
        )
        .await;
    }

    async fn joined(&self, phase: Phase, result: Result<PhaseReport, JoinError>) -> PhaseReport {
        match result {
            Ok(report) => report,
            Err(e) => {
                let err = ConductorError::TaskFailed {
                    phase: phase.as_str(),
                    message: e.to_string(),
                };
                error!(%phase, error = %err, "task did not complete");
                emit(
                    self.notifier.as_ref(),
                    PhaseReport::failed(phase, err.to_string(), std::time::Duration::ZERO),
                )
                .await
            }
        }
    }
}

async fn emit(notifier: &dyn Notifier, report: PhaseReport) -> PhaseReport {
    notifier.notify(&report).await;
    report
}

async fn build_phase(
    config: Arc<ReleaseConfig>,
    builds: Arc<dyn BuildGateway>,
    notifier: Arc<dyn Notifier>,
    branch: String,
) -> PhaseReport {
    let started = Instant::now();
    let onboarder = BuildDefinitionOnboarder::new(config, builds.clone());
    let result = async {
        let definition = onboarder.ensure(&branch).await?;
        let outcome = BuildTrigger::new(builds).ensure(&branch, definition).await?;
        Ok::<_, ConductorError>((definition, outcome))
    }
    .await;

    let report = match result {
        Ok((definition, BuildOutcome::Triggered)) => PhaseReport::passed(
            Phase::Build,
            format!("definition {definition}: build triggered"),
            started.elapsed(),
        ),
        Ok((definition, BuildOutcome::Existing { runs })) => PhaseReport::passed(
            Phase::Build,
            format!("definition {definition}: {runs} build(s) already queued"),
            started.elapsed(),
        ),
        Err(e) => {
            error!(branch = %branch, error = %e, "build phase failed");
            PhaseReport::failed(Phase::Build, e.report_detail(), started.elapsed())
        }
    };
    emit(notifier.as_ref(), report).await
}

async fn merge_phase(
    config: Arc<ReleaseConfig>,
    repo: Arc<dyn RepositoryGateway>,
    notifier: Arc<dyn Notifier>,
    branch: String,
    expected_build: u64,
) -> PhaseReport {
    let started = Instant::now();
    let trunk = config.trunk_branch.clone();
    let coordinator = MasterMergeCoordinator::new(config, repo);

    let report = match coordinator.ensure(&trunk, &branch, expected_build).await {
        Ok(outcome) if outcome.is_success() => {
            PhaseReport::passed(Phase::Merge, outcome.describe(), started.elapsed())
        }
        Ok(outcome) => PhaseReport::failed(Phase::Merge, outcome.describe(), started.elapsed()),
        Err(e) => {
            error!(branch = %branch, error = %e, "merge phase failed");
            PhaseReport::failed(Phase::Merge, e.report_detail(), started.elapsed())
        }
    };
    emit(notifier.as_ref(), report).await
}
