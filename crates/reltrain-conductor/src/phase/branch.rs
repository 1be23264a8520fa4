use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use reltrain_core::cycle::release_branch_name;
use reltrain_core::{BranchRef, ReleaseBranch, ReleaseConfig, WriteStatus, ZERO_OBJECT_ID};
use reltrain_gateway::RepositoryGateway;
use tracing::{info, warn};

use crate::error::ConductorError;

/// Finds this cycle's release branch, forking it from trunk when absent.
pub struct ReleaseBranchResolver {
    config: Arc<ReleaseConfig>,
    repo: Arc<dyn RepositoryGateway>,
}

impl ReleaseBranchResolver {
    pub fn new(config: Arc<ReleaseConfig>, repo: Arc<dyn RepositoryGateway>) -> Self {
        Self { config, repo }
    }

    pub fn branch_name(&self, now: DateTime<FixedOffset>) -> String {
        release_branch_name(&self.config.release_branch_prefix, now.date_naive())
    }

    pub async fn resolve(&self, now: DateTime<FixedOffset>) -> Result<ReleaseBranch, ConductorError> {
        let name = self.branch_name(now);

        if let Some(existing) = self.find(&name).await? {
            info!(branch = %name, head = %existing.object_id, "release branch exists");
            return Ok(ReleaseBranch {
                name,
                head_commit_id: existing.object_id,
            });
        }

        let trunk = self.trunk_head().await?;
        info!(branch = %name, from = %trunk.name, head = %trunk.object_id, "forking release branch");

        // Create-only precondition: loses cleanly to a concurrent run.
        let failure = match self
            .repo
            .create_branch(&name, ZERO_OBJECT_ID, &trunk.object_id)
            .await
        {
            Ok(WriteStatus::Applied) => {
                return Ok(ReleaseBranch {
                    name,
                    head_commit_id: trunk.object_id,
                });
            }
            Ok(WriteStatus::Rejected(reason)) => reason,
            Err(e) => e.to_string(),
        };

        warn!(branch = %name, %failure, "branch create refused, re-resolving");
        match self.find(&name).await? {
            Some(existing) => Ok(ReleaseBranch {
                name,
                head_commit_id: existing.object_id,
            }),
            None => Err(ConductorError::BranchCreate {
                branch: name,
                reason: failure,
            }),
        }
    }

    /// Branch lookup; an exact name match wins over other prefix matches.
    pub async fn find(&self, name: &str) -> Result<Option<BranchRef>, ConductorError> {
        let mut refs = self.repo.list_branches(name).await?;
        let exact = refs.iter().position(|r| r.is_named(name));
        Ok(match exact {
            Some(i) => Some(refs.swap_remove(i)),
            None => refs.into_iter().next(),
        })
    }

    /// Trunk is a configured precondition, never guessed from a prefix match.
    pub async fn trunk_head(&self) -> Result<BranchRef, ConductorError> {
        let trunk = &self.config.trunk_branch;
        self.repo
            .list_branches(trunk)
            .await?
            .into_iter()
            .find(|r| r.is_named(trunk))
            .ok_or_else(|| ConductorError::TrunkNotFound(trunk.clone()))
    }
}
