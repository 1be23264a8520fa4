use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use reltrain_core::cycle::{lookback_days, lookback_window};
use reltrain_core::{ReleaseBranch, ReleaseConfig, RevisionKind, VersionDescriptor};
use reltrain_gateway::RepositoryGateway;
use tracing::{debug, info, warn};

use crate::error::ConductorError;
use crate::phase::read_version;

/// Commit message of the reset push.
pub const RESET_COMMENT: &str = "Reset version for release";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetAbort {
    /// A commit in the lookback window carries a different build: someone
    /// already advanced the version this cycle.
    FoundPriorVersion { commit_id: String, found: String },
}

impl fmt::Display for ResetAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetAbort::FoundPriorVersion { commit_id, found } => {
                write!(f, "commit {commit_id} already carries version {found}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    AlreadyReset {
        version: VersionDescriptor,
    },
    Reset {
        previous: VersionDescriptor,
        version: VersionDescriptor,
    },
    Aborted {
        version: VersionDescriptor,
        reason: ResetAbort,
    },
}

impl ResetOutcome {
    /// Branch version after this step.
    pub fn version(&self) -> &VersionDescriptor {
        match self {
            ResetOutcome::AlreadyReset { version }
            | ResetOutcome::Reset { version, .. }
            | ResetOutcome::Aborted { version, .. } => version,
        }
    }

    /// Build number trunk must end up carrying.
    pub fn expected_build(&self) -> u64 {
        self.version().build()
    }

    pub fn describe(&self) -> String {
        match self {
            ResetOutcome::AlreadyReset { version } => format!("already reset at {version}"),
            ResetOutcome::Reset { previous, version } => format!("reset {previous} -> {version}"),
            ResetOutcome::Aborted { version, reason } => {
                format!("left at {version}: {reason}")
            }
        }
    }
}

/// Applies the once-per-cycle version reset on the release branch.
pub struct VersionStateMachine {
    config: Arc<ReleaseConfig>,
    repo: Arc<dyn RepositoryGateway>,
}

impl VersionStateMachine {
    pub fn new(config: Arc<ReleaseConfig>, repo: Arc<dyn RepositoryGateway>) -> Self {
        Self { config, repo }
    }

    /// Reset `build += 1; revision = 0` unless it is already done. The commit
    /// history scan before the push is what makes concurrent and repeated runs safe.
    pub async fn ensure_reset(
        &self,
        branch: &ReleaseBranch,
        now: DateTime<FixedOffset>,
    ) -> Result<ResetOutcome, ConductorError> {
        let path = &self.config.version_path;
        let doc = read_version(self.repo.as_ref(), RevisionKind::Branch, &branch.name, path).await?;
        let current = doc.descriptor().clone();

        if !current.needs_reset() {
            info!(branch = %branch.name, version = %current, "version already reset");
            return Ok(ResetOutcome::AlreadyReset { version: current });
        }

        let (from, to) = lookback_window(now);
        let commits = self.repo.list_commits(&branch.name, path, from, to).await?;
        info!(
            branch = %branch.name,
            version = %current,
            commits = commits.len(),
            days = lookback_days(now.date_naive()),
            "reset pending, scanning lookback window"
        );

        for commit in &commits {
            let prior =
                read_version(self.repo.as_ref(), RevisionKind::Commit, &commit.commit_id, path)
                    .await?;
            let prior = prior.descriptor();
            debug!(commit = %commit.commit_id, version = %prior, "lookback commit");
            if prior.build() != current.build() {
                warn!(commit = %commit.commit_id, found = %prior, "version already advanced this cycle");
                return Ok(ResetOutcome::Aborted {
                    reason: ResetAbort::FoundPriorVersion {
                        commit_id: commit.commit_id.clone(),
                        found: prior.to_string(),
                    },
                    version: current,
                });
            }
        }

        let as_version_error = |source| ConductorError::Version {
            revision: format!("branch {}", branch.name),
            path: path.clone(),
            source,
        };
        let next = current.reset().map_err(as_version_error)?;
        let content = doc.render_with(&next).map_err(as_version_error)?;
        self.repo
            .push(&branch.name, &branch.head_commit_id, RESET_COMMENT, path, &content)
            .await?;
        info!(branch = %branch.name, from = %current, to = %next, "version reset pushed");

        Ok(ResetOutcome::Reset {
            previous: current,
            version: next,
        })
    }
}
