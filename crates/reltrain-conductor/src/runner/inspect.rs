use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use reltrain_core::{ReleaseConfig, RevisionKind};
use reltrain_gateway::{BuildGateway, RepositoryGateway};
use serde::Serialize;
use tracing::debug;

use crate::error::ConductorError;
use crate::phase::branch::ReleaseBranchResolver;
use crate::phase::merge::MasterMergeCoordinator;
use crate::phase::onboard::BuildDefinitionOnboarder;
use crate::phase::read_version;

/// What a run would find right now.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub branch: String,
    pub branch_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_commit_id: Option<String>,
    /// Release branch version, or trunk's when the branch is not forked yet.
    pub version: String,
    pub reset_pending: bool,
    pub expected_build: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_id: Option<u64>,
    pub build_runs: usize,
    pub trunk_build: u64,
    pub merge_pending: bool,
}

/// Read-only view of the cycle. Issues no writes.
pub async fn inspect(
    config: Arc<ReleaseConfig>,
    repo: Arc<dyn RepositoryGateway>,
    builds: Arc<dyn BuildGateway>,
    now: DateTime<FixedOffset>,
) -> Result<Inspection, ConductorError> {
    let resolver = ReleaseBranchResolver::new(config.clone(), repo.clone());
    let branch = resolver.branch_name(now);
    let trunk = resolver.trunk_head().await?;
    let existing = resolver.find(&branch).await?;

    // An unforked branch will start from trunk's file.
    let revision = match &existing {
        Some(_) => branch.as_str(),
        None => config.trunk_branch.as_str(),
    };
    let doc =
        read_version(repo.as_ref(), RevisionKind::Branch, revision, &config.version_path).await?;
    let version = doc.descriptor();
    let reset_pending = version.needs_reset();
    let expected_build = if reset_pending {
        version
            .reset()
            .map_err(|source| ConductorError::Version {
                revision: format!("branch {revision}"),
                path: config.version_path.clone(),
                source,
            })?
            .build()
    } else {
        version.build()
    };

    let definition_id = BuildDefinitionOnboarder::new(config.clone(), builds.clone())
        .lookup(&branch)
        .await?;
    let build_runs = match definition_id {
        Some(id) => builds.list_builds(id).await?.len(),
        None => 0,
    };

    let trunk_build = MasterMergeCoordinator::new(config.clone(), repo)
        .trunk_build(&config.trunk_branch)
        .await?;
    debug!(branch = %branch, trunk = %trunk.object_id, "inspection complete");

    Ok(Inspection {
        branch_exists: existing.is_some(),
        head_commit_id: existing.map(|b| b.object_id),
        branch,
        version: version.to_string(),
        reset_pending,
        expected_build,
        definition_id,
        build_runs,
        trunk_build,
        merge_pending: trunk_build != expected_build,
    })
}
