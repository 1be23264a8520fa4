use std::fmt;
use std::sync::Arc;

use reltrain_core::{path_is_under, PullRequestRecord, ReleaseConfig, RevisionKind};
use reltrain_gateway::{CompletePullRequest, RepositoryGateway};
use tracing::{info, warn};

use crate::error::ConductorError;
use crate::phase::read_version;

pub const PR_TITLE: &str = "Merge release version bump";
pub const PR_DESCRIPTION: &str =
    "Carries the weekly version reset from the release branch back to trunk.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAbort {
    NoPrAfterSubmit,
    AmbiguousPrs { count: usize },
    UnsafeDiff { ahead: u32, behind: u32 },
    UnexpectedChange { path: String },
}

impl fmt::Display for MergeAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeAbort::NoPrAfterSubmit => write!(f, "no active pull request after submission"),
            MergeAbort::AmbiguousPrs { count } => {
                write!(f, "{count} active pull requests for the same branches")
            }
            MergeAbort::UnsafeDiff { ahead, behind } => {
                write!(f, "release branch is {ahead} ahead and {behind} behind trunk, expected 1 and 0")
            }
            MergeAbort::UnexpectedChange { path } => {
                write!(f, "diff touches {path} outside the version file")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    NotNeeded { trunk_build: u64 },
    Merged { pull_request_id: u64 },
    Aborted(MergeAbort),
}

impl MergeOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, MergeOutcome::Aborted(_))
    }

    pub fn describe(&self) -> String {
        match self {
            MergeOutcome::NotNeeded { trunk_build } => {
                format!("trunk already at build {trunk_build}")
            }
            MergeOutcome::Merged { pull_request_id } => {
                format!("pull request {pull_request_id} completed")
            }
            MergeOutcome::Aborted(reason) => format!("aborted: {reason}"),
        }
    }
}

/// Squash-merges the version bump back to trunk when every safety gate holds.
pub struct MasterMergeCoordinator {
    config: Arc<ReleaseConfig>,
    repo: Arc<dyn RepositoryGateway>,
}

impl MasterMergeCoordinator {
    pub fn new(config: Arc<ReleaseConfig>, repo: Arc<dyn RepositoryGateway>) -> Self {
        Self { config, repo }
    }

    /// Build component trunk carries right now.
    pub async fn trunk_build(&self, trunk: &str) -> Result<u64, ConductorError> {
        let doc = read_version(
            self.repo.as_ref(),
            RevisionKind::Branch,
            trunk,
            &self.config.version_path,
        )
        .await?;
        Ok(doc.descriptor().build())
    }

    pub async fn ensure(
        &self,
        trunk: &str,
        release: &str,
        expected_build: u64,
    ) -> Result<MergeOutcome, ConductorError> {
        let trunk_build = self.trunk_build(trunk).await?;
        if trunk_build == expected_build {
            info!(trunk, build = trunk_build, "trunk already carries the release build");
            return Ok(MergeOutcome::NotNeeded { trunk_build });
        }

        let pr = match self.locate_pull_request(trunk, release).await? {
            Ok(pr) => pr,
            Err(abort) => {
                warn!(trunk, release, %abort, "merge aborted");
                return Ok(MergeOutcome::Aborted(abort));
            }
        };

        let diff = self.repo.diff(trunk, release).await?;
        if diff.behind_count != 0 || diff.ahead_count != 1 {
            let abort = MergeAbort::UnsafeDiff {
                ahead: diff.ahead_count,
                behind: diff.behind_count,
            };
            warn!(pr = pr.id, %abort, "merge aborted");
            return Ok(MergeOutcome::Aborted(abort));
        }
        let version_path = &self.config.version_path;
        if let Some(path) = diff
            .changed_paths
            .iter()
            .find(|p| !path_is_under(p, version_path))
        {
            let abort = MergeAbort::UnexpectedChange { path: path.clone() };
            warn!(pr = pr.id, %abort, "merge aborted");
            return Ok(MergeOutcome::Aborted(abort));
        }

        let request = CompletePullRequest {
            id: pr.id,
            last_merge_source_commit: diff.target_commit,
            merge_message: format!("{PR_TITLE} ({release})"),
            squash: true,
            bypass_policy: self.config.bypass_policy,
            delete_source_branch: false,
        };
        self.repo.complete_pull_request(&request).await?;
        info!(pr = pr.id, trunk, release, expected_build, "pull request completed");
        Ok(MergeOutcome::Merged {
            pull_request_id: pr.id,
        })
    }

    /// The single active pull request from `release` into `trunk`, submitting
    /// one when none exists.
    async fn locate_pull_request(
        &self,
        trunk: &str,
        release: &str,
    ) -> Result<Result<PullRequestRecord, MergeAbort>, ConductorError> {
        let mut prs = self.repo.list_pull_requests(trunk, release).await?;
        if prs.is_empty() {
            info!(trunk, release, "no pull request, submitting one");
            self.repo
                .submit_pull_request(release, trunk, PR_TITLE, PR_DESCRIPTION)
                .await?;
            tokio::time::sleep(self.config.timing.pr_settle()).await;
            prs = self.repo.list_pull_requests(trunk, release).await?;
        }

        Ok(match prs.as_slice() {
            [] => Err(MergeAbort::NoPrAfterSubmit),
            [pr] => Ok(pr.clone()),
            many => Err(MergeAbort::AmbiguousPrs { count: many.len() }),
        })
    }
}
