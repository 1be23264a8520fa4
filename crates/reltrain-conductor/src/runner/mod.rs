pub mod inspect;
pub mod notify;
pub mod orchestrator;
pub mod report;
