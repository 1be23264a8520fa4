//! Remote collaborators of the release train.
//!
//! The conductor only talks to the repository and build services through the
//! [`RepositoryGateway`] and [`BuildGateway`] traits. [`azure::AzureDevOps`]
//! implements both over the Azure DevOps REST API.

pub mod azure;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reltrain_core::{
    BranchRef, BuildDefinition, BuildRun, CommitRecord, DiffSummary, PullRequestRecord,
    RevisionKind, WriteStatus,
};

pub use azure::AzureDevOps;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },
    #[error("decoding response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

impl GatewayError {
    /// A precondition (expected old object id / merge source) did not hold.
    pub fn is_conflict(&self) -> bool {
        match self {
            GatewayError::Status { status, .. } => *status == 409 || *status == 412,
            GatewayError::Rejected { .. } => true,
            _ => false,
        }
    }
}

/// Squash-completion request for an active pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletePullRequest {
    pub id: u64,
    /// Expected head of the source branch; the server refuses the merge if it moved.
    pub last_merge_source_commit: String,
    pub merge_message: String,
    pub squash: bool,
    pub bypass_policy: bool,
    pub delete_source_branch: bool,
}

/// Git repository operations.
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Refs whose name matches `name` (the service filters by prefix).
    async fn list_branches(&self, name: &str) -> Result<Vec<BranchRef>, GatewayError>;

    /// Create `name` pointing at `new_object_id`, provided it currently points at
    /// `old_object_id` (all zeros: must not exist).
    async fn create_branch(
        &self,
        name: &str,
        old_object_id: &str,
        new_object_id: &str,
    ) -> Result<WriteStatus, GatewayError>;

    async fn get_file_at(
        &self,
        kind: RevisionKind,
        revision: &str,
        path: &str,
    ) -> Result<String, GatewayError>;

    /// Commits on `branch` touching `path` within `[from, to]`.
    async fn list_commits(
        &self,
        branch: &str,
        path: &str,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<Vec<CommitRecord>, GatewayError>;

    /// Push a single-file edit. Fails if `branch` no longer points at `old_object_id`.
    async fn push(
        &self,
        branch: &str,
        old_object_id: &str,
        comment: &str,
        path: &str,
        content: &str,
    ) -> Result<(), GatewayError>;

    /// Active pull requests from `source` into `target`.
    async fn list_pull_requests(
        &self,
        target: &str,
        source: &str,
    ) -> Result<Vec<PullRequestRecord>, GatewayError>;

    async fn submit_pull_request(
        &self,
        source: &str,
        target: &str,
        title: &str,
        description: &str,
    ) -> Result<(), GatewayError>;

    /// Compare `target` against `base`.
    async fn diff(&self, base: &str, target: &str) -> Result<DiffSummary, GatewayError>;

    async fn complete_pull_request(&self, request: &CompletePullRequest)
        -> Result<(), GatewayError>;
}

/// Build service operations.
#[async_trait]
pub trait BuildGateway: Send + Sync {
    async fn list_definitions(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Vec<BuildDefinition>, GatewayError>;

    /// Queue the onboarding definition; `parameters` is its JSON parameter string.
    async fn trigger_onboarding_build(
        &self,
        definition_id: u64,
        source_branch: &str,
        parameters: &str,
    ) -> Result<(), GatewayError>;

    async fn list_builds(&self, definition_id: u64) -> Result<Vec<BuildRun>, GatewayError>;

    async fn trigger_build(&self, definition_id: u64, source_branch: &str)
        -> Result<(), GatewayError>;
}
