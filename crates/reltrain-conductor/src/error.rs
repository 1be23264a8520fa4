use reltrain_core::VersionError;
use reltrain_gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    #[error("trunk branch `{0}` not found")]
    TrunkNotFound(String),
    #[error("version file {path} at {revision}: {source}")]
    Version {
        revision: String,
        path: String,
        #[source]
        source: VersionError,
    },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("release branch `{branch}` could not be created: {reason}")]
    BranchCreate { branch: String, reason: String },
    #[error("no build definition for `{branch}` after {attempts} attempts ({waited_secs}s)")]
    OnboardingTimeout {
        branch: String,
        attempts: u32,
        waited_secs: u64,
    },
    #[error("{phase} task ended abnormally: {message}")]
    TaskFailed { phase: &'static str, message: String },
}

impl ConductorError {
    /// Environment preconditions that abort the whole run. Everything else only
    /// ends the phase that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConductorError::TrunkNotFound(_) | ConductorError::Version { .. }
        )
    }

    /// A write lost its optimistic precondition; the next run re-resolves.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConductorError::Gateway(g) if g.is_conflict())
    }

    /// Reason text for a phase report.
    pub fn report_detail(&self) -> String {
        if self.is_conflict() {
            format!("precondition conflict, retry on next run: {self}")
        } else {
            self.to_string()
        }
    }
}
