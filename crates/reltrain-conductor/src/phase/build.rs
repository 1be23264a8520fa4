use std::sync::Arc;

use reltrain_gateway::BuildGateway;
use tracing::info;

use crate::error::ConductorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// At least one run exists; its status does not matter.
    Existing { runs: usize },
    Triggered,
}

/// At most one build per definition per cycle. Not a retry policy.
pub struct BuildTrigger {
    builds: Arc<dyn BuildGateway>,
}

impl BuildTrigger {
    pub fn new(builds: Arc<dyn BuildGateway>) -> Self {
        Self { builds }
    }

    pub async fn ensure(
        &self,
        branch: &str,
        definition_id: u64,
    ) -> Result<BuildOutcome, ConductorError> {
        let runs = self.builds.list_builds(definition_id).await?;
        if !runs.is_empty() {
            info!(branch, definition = definition_id, runs = runs.len(), "build already queued");
            return Ok(BuildOutcome::Existing { runs: runs.len() });
        }
        self.builds.trigger_build(definition_id, branch).await?;
        info!(branch, definition = definition_id, "build triggered");
        Ok(BuildOutcome::Triggered)
    }
}
