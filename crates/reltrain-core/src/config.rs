use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Environment variables that override the file's credentials.
pub const ENV_USERNAME: &str = "RELTRAIN_USERNAME";
pub const ENV_PASSWORD: &str = "RELTRAIN_PASSWORD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("config field `{0}` must not be empty")]
    Missing(&'static str),
}

/// Polling and settle delays used by the conductor.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Timing {
    pub onboard_attempts: u32,
    pub onboard_interval_secs: u64,
    pub pr_settle_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            onboard_attempts: 10,
            onboard_interval_secs: 30,
            pr_settle_secs: 10,
        }
    }
}

impl Timing {
    /// Zero delays, for tests.
    pub fn immediate() -> Self {
        Self {
            onboard_attempts: 10,
            onboard_interval_secs: 0,
            pr_settle_secs: 0,
        }
    }

    pub fn onboard_interval(&self) -> Duration {
        Duration::from_secs(self.onboard_interval_secs)
    }

    pub fn pr_settle(&self) -> Duration {
        Duration::from_secs(self.pr_settle_secs)
    }
}

/// Everything a run needs, built once and handed to each component.
/// Field names follow the legacy `secrets.json` layout.
#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub instance: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    pub project: String,
    pub repo: String,
    #[serde(rename = "masterBranch", alias = "trunkBranch")]
    pub trunk_branch: String,
    pub release_branch_prefix: String,
    pub version_path: String,
    pub definition_path_prefix: String,
    pub definition_name: String,
    #[serde(alias = "OnboardBuildDefinitionId")]
    pub onboard_build_definition_id: u64,
    /// Repository name handed to the onboarding build. Defaults to `repo`.
    #[serde(default)]
    pub onboard_repository_name: Option<String>,
    #[serde(default = "default_true")]
    pub bypass_policy: bool,
    #[serde(default)]
    pub timing: Timing,
}

fn default_collection() -> String {
    "DefaultCollection".to_string()
}

fn default_true() -> bool {
    true
}

impl ReleaseConfig {
    /// Load from a JSON file, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Replace credentials with values from `lookup` when present and non-empty.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_USERNAME).filter(|v| !v.is_empty()) {
            self.username = v;
        }
        if let Some(v) = lookup(ENV_PASSWORD).filter(|v| !v.is_empty()) {
            self.password = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("instance", &self.instance),
            ("project", &self.project),
            ("repo", &self.repo),
            ("masterBranch", &self.trunk_branch),
            ("releaseBranchPrefix", &self.release_branch_prefix),
            ("versionPath", &self.version_path),
            ("definitionName", &self.definition_name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }

    pub fn onboard_repository(&self) -> &str {
        self.onboard_repository_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.repo)
    }

    /// Build-definition folder for a release branch: `{prefix}\{branch}`.
    pub fn definition_path(&self, branch: &str) -> String {
        format!("{}\\{}", self.definition_path_prefix, branch)
    }
}

impl fmt::Debug for ReleaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseConfig")
            .field("username", &self.username)
            .field("password", &"[MASKED]")
            .field("instance", &self.instance)
            .field("collection", &self.collection)
            .field("project", &self.project)
            .field("repo", &self.repo)
            .field("trunk_branch", &self.trunk_branch)
            .field("release_branch_prefix", &self.release_branch_prefix)
            .field("version_path", &self.version_path)
            .field("definition_path_prefix", &self.definition_path_prefix)
            .field("definition_name", &self.definition_name)
            .field("onboard_build_definition_id", &self.onboard_build_definition_id)
            .field("onboard_repository_name", &self.onboard_repository_name)
            .field("bypass_policy", &self.bypass_policy)
            .field("timing", &self.timing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "username": "svc",
        "password": "hunter2",
        "instance": "contoso.visualstudio.com",
        "project": "Shell",
        "repo": "Shell-Repo",
        "masterBranch": "master",
        "releaseBranchPrefix": "releases/rel",
        "versionPath": "/src/version.xml",
        "definitionPathPrefix": "\\Release",
        "definitionName": "Shell-Official",
        "OnboardBuildDefinitionId": 42
    }"#;

    #[test]
    fn parse_legacy_layout() {
        let c: ReleaseConfig = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(c.trunk_branch, "master");
        assert_eq!(c.collection, "DefaultCollection");
        assert_eq!(c.onboard_build_definition_id, 42);
        assert_eq!(c.onboard_repository(), "Shell-Repo");
        assert!(c.bypass_policy);
        assert_eq!(c.timing, Timing::default());
        assert_eq!(c.definition_path("releases/rel20240304"), "\\Release\\releases/rel20240304");
    }

    #[test]
    fn timing_partial_override() {
        let json = SAMPLE.replace(
            "\"OnboardBuildDefinitionId\": 42",
            "\"OnboardBuildDefinitionId\": 42, \"timing\": {\"prSettleSecs\": 1}",
        );
        let c: ReleaseConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.timing.pr_settle_secs, 1);
        assert_eq!(c.timing.onboard_attempts, 10);
        assert_eq!(c.timing.onboard_interval_secs, 30);
    }

    #[test]
    fn env_overrides_credentials() {
        let mut c: ReleaseConfig = serde_json::from_str(SAMPLE).unwrap();
        c.apply_overrides(|key| match key {
            ENV_PASSWORD => Some("from-env".into()),
            ENV_USERNAME => Some(String::new()),
            _ => None,
        });
        assert_eq!(c.password, "from-env");
        assert_eq!(c.username, "svc");
    }

    #[test]
    fn debug_masks_password() {
        let c: ReleaseConfig = serde_json::from_str(SAMPLE).unwrap();
        let shown = format!("{c:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("[MASKED]"));
    }

    #[test]
    fn validate_rejects_blank_trunk() {
        let mut c: ReleaseConfig = serde_json::from_str(SAMPLE).unwrap();
        c.trunk_branch = "  ".into();
        assert!(matches!(c.validate(), Err(ConfigError::Missing("masterBranch"))));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let c = ReleaseConfig::load(&path).unwrap();
        assert_eq!(c.repo, "Shell-Repo");
    }

    #[test]
    fn load_missing_file() {
        let err = ReleaseConfig::load(Path::new("/nonexistent/secrets.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ReleaseConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
