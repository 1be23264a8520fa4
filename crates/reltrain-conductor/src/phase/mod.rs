//! The five remote-state reconcilers. Each one reads what exists, decides what
//! is still pending, and performs at most that.

pub mod branch;
pub mod build;
pub mod merge;
pub mod onboard;
pub mod version;

use reltrain_core::{RevisionKind, VersionDocument};
use reltrain_gateway::RepositoryGateway;

use crate::error::ConductorError;

/// Fetch and parse the version file at a branch or commit.
pub(crate) async fn read_version(
    repo: &dyn RepositoryGateway,
    kind: RevisionKind,
    revision: &str,
    path: &str,
) -> Result<VersionDocument, ConductorError> {
    let text = repo.get_file_at(kind, revision, path).await?;
    VersionDocument::parse(&text).map_err(|source| ConductorError::Version {
        revision: format!("{} {revision}", kind.as_str()),
        path: path.to_string(),
        source,
    })
}
