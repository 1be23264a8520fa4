use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Object id used as the `oldObjectId` precondition when a ref must not exist yet.
pub const ZERO_OBJECT_ID: &str = "0000000000000000000000000000000000000000";

/// Prefix of fully qualified branch refs.
pub const HEADS_PREFIX: &str = "refs/heads/";

/// `feature/x` → `refs/heads/feature/x`. Already-qualified names pass through.
pub fn head_ref(branch: &str) -> String {
    if branch.starts_with(HEADS_PREFIX) {
        branch.to_string()
    } else {
        format!("{HEADS_PREFIX}{branch}")
    }
}

/// `refs/heads/feature/x` → `feature/x`.
pub fn short_branch(name: &str) -> &str {
    name.strip_prefix(HEADS_PREFIX).unwrap_or(name)
}

/// The cycle's release branch and the head it was resolved at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseBranch {
    pub name: String,
    pub head_commit_id: String,
}

/// A ref as returned by a branch lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub object_id: String,
}

impl BranchRef {
    /// Exact match on the branch name, qualified or not.
    pub fn is_named(&self, branch: &str) -> bool {
        self.name == branch || short_branch(&self.name) == short_branch(branch)
    }
}

/// How a file revision is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
    Branch,
    Commit,
}

impl RevisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RevisionKind::Branch => "branch",
            RevisionKind::Commit => "commit",
        }
    }
}

/// Read-only snapshot of a commit that touched the version file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit_id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub change_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDefinition {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRun {
    pub id: u64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub id: u64,
    pub status: String,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub merge_status: String,
}

/// Comparison of a target branch against a base branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Commits on the target that the base lacks.
    pub ahead_count: u32,
    /// Commits on the base that the target lacks.
    pub behind_count: u32,
    pub changed_paths: Vec<String>,
    /// Head commit of the target side when the diff was computed.
    pub target_commit: String,
}

/// Result of a conditional write on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum WriteStatus {
    Applied,
    Rejected(String),
}

impl WriteStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteStatus::Applied)
    }
}

/// Whether `path` is the version file itself or lies beneath it.
pub fn path_is_under(path: &str, root: &str) -> bool {
    let norm = |p: &str| p.trim_end_matches('/').to_ascii_lowercase();
    let path = norm(path);
    let root = norm(root);
    path == root || path.starts_with(&format!("{root}/"))
}
