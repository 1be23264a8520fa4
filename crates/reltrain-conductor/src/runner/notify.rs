use crate::runner::report::PhaseReport;

/// Receives each phase report as soon as the phase finishes.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &PhaseReport);
}

/// Prints to stdout.
pub struct StdoutNotifier;

#[async_trait::async_trait]
impl Notifier for StdoutNotifier {
    async fn notify(&self, report: &PhaseReport) {
        println!("[reltrain] {report}");
    }
}

/// Drops every report. Used when the caller renders the summary itself.
pub struct SilentNotifier;

#[async_trait::async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _report: &PhaseReport) {}
}

/// Collects reports in memory (for testing).
#[derive(Default)]
pub struct CollectNotifier {
    reports: std::sync::Mutex<Vec<PhaseReport>>,
}

impl CollectNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<PhaseReport> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Notifier for CollectNotifier {
    async fn notify(&self, report: &PhaseReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }
}
