use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use reltrain_conductor::{Notifier, Orchestrator, RunSummary, SilentNotifier, StdoutNotifier};
use reltrain_core::ReleaseConfig;
use reltrain_gateway::AzureDevOps;

/// Execute `reltrain run`. Returns whether both concurrent phases passed.
pub fn execute(config: ReleaseConfig, json: bool) -> Result<bool> {
    tracing::debug!(?config, "loaded config");
    let config = Arc::new(config);
    let repo = Arc::new(AzureDevOps::new(&config));
    // The build task gets its own handle; the connection pool is shared.
    let builds = Arc::new(repo.as_ref().clone());
    let notifier: Arc<dyn Notifier> = if json {
        Arc::new(SilentNotifier)
    } else {
        Arc::new(StdoutNotifier)
    };
    let orchestrator = Orchestrator::new(config, repo, builds, notifier);

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(orchestrator.run(Local::now().fixed_offset()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(summary.success)
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Release branch: {}", summary.branch);
    println!("Version:        {}", summary.version);
    println!("Expected build: {}", summary.expected_build);
    let failed: Vec<_> = summary.reports.iter().filter(|r| !r.passed).collect();
    if summary.success {
        println!("Result:         ok");
    } else {
        println!("Result:         FAILED ({} phase(s))", failed.len());
        for report in failed {
            println!("  {}: {}", report.phase, report.detail);
        }
    }
}
