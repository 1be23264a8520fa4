use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use reltrain_core::{
    head_ref, short_branch, BranchRef, BuildDefinition, BuildRun, CommitRecord, DiffSummary,
    PullRequestRecord, ReleaseConfig, RevisionKind, WriteStatus,
};

use crate::{BuildGateway, CompletePullRequest, GatewayError, RepositoryGateway};

const API_GIT: &str = "1.0";
const API_PUSHES: &str = "2.0-preview";
const API_PULL_REQUESTS: &str = "3.0";
const API_DEFINITIONS: &str = "3.0-preview.2";
const API_BUILDS: &str = "2.0";

/// Longest slice of an error body kept in a [`GatewayError::Status`].
const BODY_EXCERPT: usize = 512;

/// Azure DevOps REST client. Cloning shares the connection pool; each clone is
/// an independent handle.
#[derive(Clone)]
pub struct AzureDevOps {
    client: Client,
    base_url: String,
    repo: String,
    username: String,
    password: String,
}

impl fmt::Debug for AzureDevOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureDevOps")
            .field("base_url", &self.base_url)
            .field("repo", &self.repo)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl AzureDevOps {
    /// `https://{instance}/{collection}/{project}/_apis`
    pub fn new(config: &ReleaseConfig) -> Self {
        let base = format!(
            "https://{}/{}/{}/_apis",
            config.instance, config.collection, config.project
        );
        Self::with_base_url(config, &base)
    }

    pub fn with_base_url(config: &ReleaseConfig, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    fn git_url(&self, tail: &str) -> String {
        format!("{}/git/repositories/{}/{}", self.base_url, self.repo, tail)
    }

    fn build_url(&self, tail: &str) -> String {
        format!("{}/build/{}", self.base_url, tail)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Send and map non-2xx responses to [`GatewayError::Status`].
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        let request = builder.build().map_err(|e| GatewayError::Transport {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;
        let method = request.method().to_string();
        let url = request.url().to_string();
        debug!(%method, %url, "gateway request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| GatewayError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            method,
            url,
            status: status.as_u16(),
            body: excerpt(&body),
        })
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GatewayError> {
        let response = self.execute(builder).await?;
        let url = response.url().to_string();
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode {
                url,
                message: e.to_string(),
            })
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

fn rfc3339(t: DateTime<FixedOffset>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── Wire types ──

#[derive(Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefDto {
    name: String,
    object_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefUpdateDto {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    update_status: Option<String>,
    #[serde(default)]
    custom_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitDto {
    commit_id: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    change_counts: HashMap<String, u32>,
    #[serde(default)]
    committer: Option<SignatureDto>,
}

#[derive(Deserialize)]
struct SignatureDto {
    #[serde(default)]
    date: Option<DateTime<FixedOffset>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestDto {
    pull_request_id: u64,
    status: String,
    source_ref_name: String,
    target_ref_name: String,
    #[serde(default)]
    merge_status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiffDto {
    ahead_count: u32,
    behind_count: u32,
    #[serde(default)]
    changes: Vec<DiffChangeDto>,
    #[serde(default)]
    target_commit: String,
}

#[derive(Deserialize)]
struct DiffChangeDto {
    item: DiffItemDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiffItemDto {
    path: String,
    #[serde(default)]
    is_folder: bool,
    #[serde(default)]
    git_object_type: Option<String>,
}

impl DiffItemDto {
    fn is_folder(&self) -> bool {
        self.is_folder || self.git_object_type.as_deref() == Some("tree")
    }
}

#[derive(Deserialize)]
struct DefinitionDto {
    id: u64,
    name: String,
    #[serde(default)]
    path: String,
}

#[derive(Deserialize)]
struct BuildDto {
    id: u64,
    #[serde(default)]
    status: String,
}

// ── Repository ──

#[async_trait]
impl RepositoryGateway for AzureDevOps {
    async fn list_branches(&self, name: &str) -> Result<Vec<BranchRef>, GatewayError> {
        let url = self.git_url(&format!("refs/heads/{}", short_branch(name)));
        let refs: List<RefDto> = self
            .json(self.request(Method::GET, url).query(&[("api-version", API_GIT)]))
            .await?;
        Ok(refs
            .value
            .into_iter()
            .map(|r| BranchRef {
                name: r.name,
                object_id: r.object_id,
            })
            .collect())
    }

    async fn create_branch(
        &self,
        name: &str,
        old_object_id: &str,
        new_object_id: &str,
    ) -> Result<WriteStatus, GatewayError> {
        let body = json!([{
            "name": head_ref(name),
            "oldObjectId": old_object_id,
            "newObjectId": new_object_id,
        }]);
        let results: List<RefUpdateDto> = self
            .json(
                self.request(Method::POST, self.git_url("refs"))
                    .query(&[("api-version", API_GIT)])
                    .json(&body),
            )
            .await?;
        match results.value.first() {
            Some(r) if r.success => Ok(WriteStatus::Applied),
            Some(r) => Ok(WriteStatus::Rejected(
                r.custom_message
                    .clone()
                    .or_else(|| r.update_status.clone())
                    .unwrap_or_else(|| "ref update failed".to_string()),
            )),
            None => Ok(WriteStatus::Rejected("empty ref update response".to_string())),
        }
    }

    async fn get_file_at(
        &self,
        kind: RevisionKind,
        revision: &str,
        path: &str,
    ) -> Result<String, GatewayError> {
        let response = self
            .execute(self.request(Method::GET, self.git_url("items")).query(&[
                ("api-version", API_GIT),
                ("versionType", kind.as_str()),
                ("version", revision),
                ("scopePath", path),
                ("lastProcessedChange", "true"),
            ]))
            .await?;
        let url = response.url().to_string();
        response.text().await.map_err(|e| GatewayError::Decode {
            url,
            message: e.to_string(),
        })
    }

    async fn list_commits(
        &self,
        branch: &str,
        path: &str,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<Vec<CommitRecord>, GatewayError> {
        let from = rfc3339(from);
        let to = rfc3339(to);
        let commits: List<CommitDto> = self
            .json(self.request(Method::GET, self.git_url("commits")).query(&[
                ("api-version", API_GIT),
                ("branch", short_branch(branch)),
                ("itemPath", path),
                ("fromDate", from.as_str()),
                ("toDate", to.as_str()),
            ]))
            .await?;
        Ok(commits
            .value
            .into_iter()
            .map(|c| CommitRecord {
                commit_id: c.commit_id,
                comment: c.comment,
                change_count: c.change_counts.values().sum(),
                timestamp: c.committer.and_then(|s| s.date),
            })
            .collect())
    }

    async fn push(
        &self,
        branch: &str,
        old_object_id: &str,
        comment: &str,
        path: &str,
        content: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "refUpdates": [{ "name": head_ref(branch), "oldObjectId": old_object_id }],
            "commits": [{
                "comment": comment,
                "changes": [{
                    "changeType": "edit",
                    "item": { "path": path },
                    "newContent": { "content": content, "contentType": "rawtext" },
                }],
            }],
        });
        self.execute(
            self.request(Method::POST, self.git_url("pushes"))
                .query(&[("api-version", API_PUSHES)])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn list_pull_requests(
        &self,
        target: &str,
        source: &str,
    ) -> Result<Vec<PullRequestRecord>, GatewayError> {
        let source_ref = head_ref(source);
        let target_ref = head_ref(target);
        let prs: List<PullRequestDto> = self
            .json(self.request(Method::GET, self.git_url("pullrequests")).query(&[
                ("api-version", API_PULL_REQUESTS),
                ("searchCriteria.status", "active"),
                ("searchCriteria.sourceRefName", source_ref.as_str()),
                ("searchCriteria.targetRefName", target_ref.as_str()),
            ]))
            .await?;
        Ok(prs
            .value
            .into_iter()
            .filter(|pr| pr.status.eq_ignore_ascii_case("active"))
            .map(|pr| PullRequestRecord {
                id: pr.pull_request_id,
                status: pr.status,
                source_branch: pr.source_ref_name,
                target_branch: pr.target_ref_name,
                merge_status: pr.merge_status.unwrap_or_default(),
            })
            .collect())
    }

    async fn submit_pull_request(
        &self,
        source: &str,
        target: &str,
        title: &str,
        description: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "sourceRefName": head_ref(source),
            "targetRefName": head_ref(target),
            "title": title,
            "description": description,
        });
        self.execute(
            self.request(Method::POST, self.git_url("pullrequests"))
                .query(&[("api-version", API_PULL_REQUESTS)])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn diff(&self, base: &str, target: &str) -> Result<DiffSummary, GatewayError> {
        let diff: DiffDto = self
            .json(self.request(Method::GET, self.git_url("diffs/commits")).query(&[
                ("api-version", API_GIT),
                ("baseVersion", short_branch(base)),
                ("baseVersionType", "branch"),
                ("targetVersion", short_branch(target)),
                ("targetVersionType", "branch"),
            ]))
            .await?;
        Ok(DiffSummary {
            ahead_count: diff.ahead_count,
            behind_count: diff.behind_count,
            changed_paths: diff
                .changes
                .into_iter()
                .filter(|c| !c.item.is_folder())
                .map(|c| c.item.path)
                .collect(),
            target_commit: diff.target_commit,
        })
    }

    async fn complete_pull_request(
        &self,
        request: &CompletePullRequest,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "status": "completed",
            "lastMergeSourceCommit": { "commitId": request.last_merge_source_commit },
            "completionOptions": {
                "mergeCommitMessage": request.merge_message,
                "squashMerge": request.squash,
                "bypassPolicy": request.bypass_policy,
                "deleteSourceBranch": request.delete_source_branch,
            },
        });
        let url = self.git_url(&format!("pullrequests/{}", request.id));
        self.execute(
            self.request(Method::PATCH, url)
                .query(&[("api-version", API_PULL_REQUESTS)])
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

// ── Build ──

#[async_trait]
impl BuildGateway for AzureDevOps {
    async fn list_definitions(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Vec<BuildDefinition>, GatewayError> {
        let defs: List<DefinitionDto> = self
            .json(
                self.request(Method::GET, self.build_url("definitions"))
                    .query(&[("api-version", API_DEFINITIONS), ("path", path), ("name", name)]),
            )
            .await?;
        Ok(defs
            .value
            .into_iter()
            .map(|d| BuildDefinition {
                id: d.id,
                name: d.name,
                path: d.path,
            })
            .collect())
    }

    async fn trigger_onboarding_build(
        &self,
        definition_id: u64,
        source_branch: &str,
        parameters: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "definition": { "id": definition_id },
            "sourceBranch": head_ref(source_branch),
            "parameters": parameters,
        });
        self.execute(
            self.request(Method::POST, self.build_url("builds"))
                .query(&[("api-version", API_BUILDS)])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn list_builds(&self, definition_id: u64) -> Result<Vec<BuildRun>, GatewayError> {
        let id = definition_id.to_string();
        let builds: List<BuildDto> = self
            .json(
                self.request(Method::GET, self.build_url("builds"))
                    .query(&[("api-version", API_BUILDS), ("definitions", id.as_str())]),
            )
            .await?;
        Ok(builds
            .value
            .into_iter()
            .map(|b| BuildRun {
                id: b.id,
                status: b.status,
            })
            .collect())
    }

    async fn trigger_build(
        &self,
        definition_id: u64,
        source_branch: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "definition": { "id": definition_id },
            "sourceBranch": head_ref(source_branch),
        });
        self.execute(
            self.request(Method::POST, self.build_url("builds"))
                .query(&[("api-version", API_BUILDS)])
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
