use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use reltrain_conductor::{inspect, Inspection};
use reltrain_core::ReleaseConfig;
use reltrain_gateway::AzureDevOps;

/// Execute `reltrain plan`.
pub fn execute(config: ReleaseConfig, json: bool) -> Result<()> {
    let config = Arc::new(config);
    let gateway = Arc::new(AzureDevOps::new(&config));

    let rt = tokio::runtime::Runtime::new()?;
    let view = rt.block_on(inspect(
        config,
        gateway.clone(),
        gateway,
        Local::now().fixed_offset(),
    ))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", render(&view));
    }
    Ok(())
}

fn render(view: &Inspection) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut out = String::new();
    out.push_str(&format!("Release branch:   {}", view.branch));
    match &view.head_commit_id {
        Some(head) => out.push_str(&format!(" (at {head})\n")),
        None => out.push_str(" (not created yet)\n"),
    }
    out.push_str(&format!("Version:          {}\n", view.version));
    out.push_str(&format!("Reset pending:    {}\n", yes_no(view.reset_pending)));
    out.push_str(&format!("Expected build:   {}\n", view.expected_build));
    match view.definition_id {
        Some(id) => out.push_str(&format!(
            "Build definition: {id} ({} run(s))\n",
            view.build_runs
        )),
        None => out.push_str("Build definition: missing, onboarding needed\n"),
    }
    out.push_str(&format!("Trunk build:      {}\n", view.trunk_build));
    out.push_str(&format!("Merge pending:    {}\n", yes_no(view.merge_pending)));
    out
}
