pub mod error;
pub mod phase;
pub mod runner;

#[cfg(test)]
mod fake;

pub use error::ConductorError;
pub use phase::branch::ReleaseBranchResolver;
pub use phase::build::{BuildOutcome, BuildTrigger};
pub use phase::merge::{MasterMergeCoordinator, MergeAbort, MergeOutcome};
pub use phase::onboard::BuildDefinitionOnboarder;
pub use phase::version::{ResetAbort, ResetOutcome, VersionStateMachine};
pub use runner::inspect::{inspect, Inspection};
pub use runner::notify::{CollectNotifier, Notifier, SilentNotifier, StdoutNotifier};
pub use runner::orchestrator::{Orchestrator, RunSummary};
pub use runner::report::{Phase, PhaseReport};
