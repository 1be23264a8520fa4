use std::sync::Arc;

use reltrain_core::{BuildDefinition, ReleaseConfig};
use reltrain_gateway::BuildGateway;
use tracing::{debug, info, warn};

use crate::error::ConductorError;

/// Makes sure the release branch has its build definition.
pub struct BuildDefinitionOnboarder {
    config: Arc<ReleaseConfig>,
    builds: Arc<dyn BuildGateway>,
}

impl BuildDefinitionOnboarder {
    pub fn new(config: Arc<ReleaseConfig>, builds: Arc<dyn BuildGateway>) -> Self {
        Self { config, builds }
    }

    /// Existing definition id for `branch`, if any.
    pub async fn lookup(&self, branch: &str) -> Result<Option<u64>, ConductorError> {
        let path = self.config.definition_path(branch);
        let defs = self
            .builds
            .list_definitions(&path, &self.config.definition_name)
            .await?;
        Ok(pick(&defs, &self.config.definition_name))
    }

    /// Return the definition id, onboarding one first when missing.
    pub async fn ensure(&self, branch: &str) -> Result<u64, ConductorError> {
        if let Some(id) = self.lookup(branch).await? {
            info!(branch, definition = id, "build definition exists");
            return Ok(id);
        }

        let parameters = serde_json::json!({
            "GitRepositoryName": self.config.onboard_repository(),
            "GitBranchName": branch,
        })
        .to_string();
        info!(
            branch,
            onboarding = self.config.onboard_build_definition_id,
            "no build definition, queueing onboarding build"
        );
        self.builds
            .trigger_onboarding_build(
                self.config.onboard_build_definition_id,
                &self.config.trunk_branch,
                &parameters,
            )
            .await?;

        let timing = &self.config.timing;
        let interval = timing.onboard_interval();
        for attempt in 1..=timing.onboard_attempts {
            tokio::time::sleep(interval).await;
            match self.lookup(branch).await? {
                Some(id) => {
                    info!(branch, definition = id, attempt, "build definition onboarded");
                    return Ok(id);
                }
                None => debug!(branch, attempt, "build definition not visible yet"),
            }
        }

        let waited_secs = interval.as_secs() * u64::from(timing.onboard_attempts);
        warn!(branch, attempts = timing.onboard_attempts, waited_secs, "onboarding timed out");
        Err(ConductorError::OnboardingTimeout {
            branch: branch.to_string(),
            attempts: timing.onboard_attempts,
            waited_secs,
        })
    }
}

/// Exact name match, else the first result.
fn pick(defs: &[BuildDefinition], name: &str) -> Option<u64> {
    defs.iter()
        .find(|d| d.name == name)
        .or_else(|| defs.first())
        .map(|d| d.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{self, definition, FakeBuilds};

    const PATH: &str = "\\Release\\rel20240304";

    fn onboarder(builds: &Arc<FakeBuilds>) -> BuildDefinitionOnboarder {
        BuildDefinitionOnboarder::new(Arc::new(fake::config()), builds.clone())
    }

    #[test]
    fn pick_prefers_exact_name() {
        let defs = vec![
            definition(1, "Shell-Nightly", PATH),
            definition(2, "Shell-Official", PATH),
        ];
        assert_eq!(pick(&defs, "Shell-Official"), Some(2));
        assert_eq!(pick(&defs, "Other"), Some(1));
        assert_eq!(pick(&[], "Other"), None);
    }

    #[tokio::test]
    async fn existing_definition_skips_onboarding() {
        let builds = Arc::new(
            FakeBuilds::new().with(|s| s.definitions.push(definition(311, "Shell-Official", PATH))),
        );
        let id = onboarder(&builds).ensure("rel20240304").await.unwrap();
        assert_eq!(id, 311);
        assert!(builds.state.lock().unwrap().onboarded.is_empty());
    }

    #[tokio::test]
    async fn onboarding_then_poll_until_visible() {
        let builds = Arc::new(FakeBuilds::new().with(|s| {
            s.provisions = Some((definition(400, "Shell-Official", PATH), 3));
        }));
        let id = onboarder(&builds).ensure("rel20240304").await.unwrap();
        assert_eq!(id, 400);

        let s = builds.state.lock().unwrap();
        assert_eq!(s.onboarded.len(), 1);
        let (def_id, source, params) = &s.onboarded[0];
        assert_eq!(*def_id, 7);
        assert_eq!(source, "master");
        let params: serde_json::Value = serde_json::from_str(params).unwrap();
        assert_eq!(params["GitRepositoryName"], "Shell-Repo");
        assert_eq!(params["GitBranchName"], "rel20240304");
        // initial lookup + three polls
        assert_eq!(s.definition_lookups, 4);
    }

    #[tokio::test]
    async fn exhausted_poll_is_a_timeout() {
        let builds = Arc::new(FakeBuilds::new());
        let err = onboarder(&builds).ensure("rel20240304").await.unwrap_err();
        assert!(matches!(
            err,
            ConductorError::OnboardingTimeout { attempts: 10, .. }
        ));
        assert!(!err.is_fatal());
        assert_eq!(builds.state.lock().unwrap().definition_lookups, 11);
    }
}
