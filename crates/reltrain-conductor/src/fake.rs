//! In-memory gateways that record every call.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reltrain_core::{
    head_ref, short_branch, BranchRef, BuildDefinition, BuildRun, CommitRecord, DiffSummary,
    PullRequestRecord, ReleaseConfig, RevisionKind, Timing, WriteStatus,
};
use reltrain_gateway::{BuildGateway, CompletePullRequest, GatewayError, RepositoryGateway};

pub const VERSION_PATH: &str = "/src/version.xml";

pub fn config() -> ReleaseConfig {
    let mut config: ReleaseConfig = serde_json::from_value(serde_json::json!({
        "instance": "example.invalid",
        "project": "Shell",
        "repo": "Shell-Repo",
        "masterBranch": "master",
        "releaseBranchPrefix": "rel",
        "versionPath": VERSION_PATH,
        "definitionPathPrefix": "\\Release",
        "definitionName": "Shell-Official",
        "onboardBuildDefinitionId": 7
    }))
    .unwrap();
    config.timing = Timing::immediate();
    config
}

pub fn version_xml(value: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<root>\n  <versions>\n    <version name=\"Product\" value=\"{value}\" />\n  </versions>\n</root>\n"
    )
}

pub fn now(rfc3339: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap()
}

#[derive(Debug, Clone)]
pub struct PushRecord {
    pub branch: String,
    pub old_object_id: String,
    pub content: String,
}

#[derive(Default)]
pub struct RepoState {
    /// short branch name → head
    pub branches: HashMap<String, String>,
    /// (kind, revision) → version file text
    pub files: HashMap<(RevisionKind, String), String>,
    pub commits: Vec<CommitRecord>,
    pub pull_requests: Vec<PullRequestRecord>,
    /// Pull requests that appear once a submission is made.
    pub pull_requests_after_submit: Vec<PullRequestRecord>,
    pub diff: Option<DiffSummary>,
    /// Another writer creates the branch (at this head) just before our create lands.
    pub racing_create: Option<String>,
    /// Another writer moves the branch (to this head) just before our push lands.
    pub racing_push: Option<String>,
    pub calls: Vec<String>,
    /// `(from, to)` of every commit history query.
    pub commit_windows: Vec<(DateTime<FixedOffset>, DateTime<FixedOffset>)>,
    pub pushes: Vec<PushRecord>,
    pub completions: Vec<CompletePullRequest>,
    next_commit: u32,
}

#[derive(Default)]
pub struct FakeRepo {
    pub state: Mutex<RepoState>,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, f: impl FnOnce(&mut RepoState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn calls(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn pushes(&self) -> Vec<PushRecord> {
        self.state.lock().unwrap().pushes.clone()
    }
}

impl RepoState {
    pub fn branch(&mut self, name: &str, head: &str, version: Option<&str>) {
        self.branches.insert(name.to_string(), head.to_string());
        if let Some(v) = version {
            self.files
                .insert((RevisionKind::Branch, name.to_string()), version_xml(v));
        }
    }

    pub fn commit(&mut self, id: &str, version: &str) {
        self.commits.push(CommitRecord {
            commit_id: id.to_string(),
            comment: format!("bump to {version}"),
            change_count: 1,
            timestamp: None,
        });
        self.files
            .insert((RevisionKind::Commit, id.to_string()), version_xml(version));
    }

    pub fn pull_request(id: u64, source: &str, target: &str) -> PullRequestRecord {
        PullRequestRecord {
            id,
            status: "active".into(),
            source_branch: head_ref(source),
            target_branch: head_ref(target),
            merge_status: "succeeded".into(),
        }
    }
}

#[async_trait]
impl RepositoryGateway for FakeRepo {
    async fn list_branches(&self, name: &str) -> Result<Vec<BranchRef>, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("list_branches {name}"));
        let mut refs: Vec<BranchRef> = s
            .branches
            .iter()
            .filter(|(b, _)| b.starts_with(short_branch(name)))
            .map(|(b, head)| BranchRef {
                name: head_ref(b),
                object_id: head.clone(),
            })
            .collect();
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(refs)
    }

    async fn create_branch(
        &self,
        name: &str,
        old_object_id: &str,
        new_object_id: &str,
    ) -> Result<WriteStatus, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("create_branch {name}"));
        if let Some(head) = s.racing_create.take() {
            s.branches.insert(name.to_string(), head);
        }
        let current = s.branches.get(name).cloned();
        match current {
            Some(_) if old_object_id == reltrain_core::ZERO_OBJECT_ID => {
                Ok(WriteStatus::Rejected("staleOldObjectId".into()))
            }
            Some(head) if head != old_object_id => {
                Ok(WriteStatus::Rejected("staleOldObjectId".into()))
            }
            _ => {
                s.branches.insert(name.to_string(), new_object_id.to_string());
                if let Some(text) = s.files.get(&(RevisionKind::Branch, "master".to_string())).cloned() {
                    s.files.insert((RevisionKind::Branch, name.to_string()), text);
                }
                Ok(WriteStatus::Applied)
            }
        }
    }

    async fn get_file_at(
        &self,
        kind: RevisionKind,
        revision: &str,
        path: &str,
    ) -> Result<String, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("get_file_at {} {revision}", kind.as_str()));
        if path != VERSION_PATH {
            return Err(not_found(path));
        }
        s.files
            .get(&(kind, short_branch(revision).to_string()))
            .cloned()
            .ok_or_else(|| not_found(revision))
    }

    async fn list_commits(
        &self,
        branch: &str,
        path: &str,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<Vec<CommitRecord>, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("list_commits {branch} {path}"));
        s.commit_windows.push((from, to));
        Ok(s.commits.clone())
    }

    async fn push(
        &self,
        branch: &str,
        old_object_id: &str,
        _comment: &str,
        path: &str,
        content: &str,
    ) -> Result<(), GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("push {branch}"));
        if let Some(head) = s.racing_push.take() {
            s.branches.insert(branch.to_string(), head);
        }
        let head = s.branches.get(branch).cloned();
        if head.as_deref() != Some(old_object_id) {
            return Err(GatewayError::Rejected {
                operation: "push",
                reason: format!("{branch} is not at {old_object_id}"),
            });
        }
        s.pushes.push(PushRecord {
            branch: branch.to_string(),
            old_object_id: old_object_id.to_string(),
            content: content.to_string(),
        });
        s.next_commit += 1;
        let new_head = format!("pushed{}", s.next_commit);
        s.branches.insert(branch.to_string(), new_head);
        if path == VERSION_PATH {
            s.files
                .insert((RevisionKind::Branch, branch.to_string()), content.to_string());
        }
        Ok(())
    }

    async fn list_pull_requests(
        &self,
        target: &str,
        source: &str,
    ) -> Result<Vec<PullRequestRecord>, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("list_pull_requests {source} {target}"));
        Ok(s.pull_requests.clone())
    }

    async fn submit_pull_request(
        &self,
        _source: &str,
        _target: &str,
        _title: &str,
        _description: &str,
    ) -> Result<(), GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push("submit_pull_request".into());
        let appeared = std::mem::take(&mut s.pull_requests_after_submit);
        s.pull_requests.extend(appeared);
        Ok(())
    }

    async fn diff(&self, base: &str, target: &str) -> Result<DiffSummary, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("diff {base} {target}"));
        s.diff.clone().ok_or_else(|| not_found("diff"))
    }

    async fn complete_pull_request(
        &self,
        request: &CompletePullRequest,
    ) -> Result<(), GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("complete_pull_request {}", request.id));
        s.completions.push(request.clone());
        Ok(())
    }
}

fn not_found(what: &str) -> GatewayError {
    GatewayError::Status {
        method: "GET".into(),
        url: format!("fake://{what}"),
        status: 404,
        body: "not found".into(),
    }
}

#[derive(Default)]
pub struct BuildState {
    pub definitions: Vec<BuildDefinition>,
    /// Definition created by the onboarding build, visible after this many lookups.
    pub provisions: Option<(BuildDefinition, u32)>,
    pub builds: HashMap<u64, Vec<BuildRun>>,
    pub onboarded: Vec<(u64, String, String)>,
    pub triggered: Vec<(u64, String)>,
    pub definition_lookups: u32,
}

#[derive(Default)]
pub struct FakeBuilds {
    pub state: Mutex<BuildState>,
}

impl FakeBuilds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, f: impl FnOnce(&mut BuildState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }
}

pub fn definition(id: u64, name: &str, path: &str) -> BuildDefinition {
    BuildDefinition {
        id,
        name: name.to_string(),
        path: path.to_string(),
    }
}

#[async_trait]
impl BuildGateway for FakeBuilds {
    async fn list_definitions(
        &self,
        path: &str,
        _name: &str,
    ) -> Result<Vec<BuildDefinition>, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.definition_lookups += 1;
        if !s.onboarded.is_empty() {
            if let Some((def, remaining)) = s.provisions.take() {
                if remaining <= 1 {
                    s.definitions.push(def);
                } else {
                    s.provisions = Some((def, remaining - 1));
                }
            }
        }
        Ok(s.definitions.iter().filter(|d| d.path == path).cloned().collect())
    }

    async fn trigger_onboarding_build(
        &self,
        definition_id: u64,
        source_branch: &str,
        parameters: &str,
    ) -> Result<(), GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.onboarded.push((
            definition_id,
            source_branch.to_string(),
            parameters.to_string(),
        ));
        Ok(())
    }

    async fn list_builds(&self, definition_id: u64) -> Result<Vec<BuildRun>, GatewayError> {
        let s = self.state.lock().unwrap();
        Ok(s.builds.get(&definition_id).cloned().unwrap_or_default())
    }

    async fn trigger_build(
        &self,
        definition_id: u64,
        source_branch: &str,
    ) -> Result<(), GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.triggered.push((definition_id, source_branch.to_string()));
        s.builds.entry(definition_id).or_default().push(BuildRun {
            id: 1000 + definition_id,
            status: "notStarted".into(),
        });
        Ok(())
    }
}
