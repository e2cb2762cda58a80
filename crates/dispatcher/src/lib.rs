pub mod controller;
pub mod run_registry;
pub mod scheduler;
pub mod target_resolver;
pub mod trigger;
pub mod workflow_engine;

pub use controller::RunController;
pub use run_registry::RunRegistry;
pub use scheduler::{Dispatch, RunLauncher, Scheduler};
pub use target_resolver::TargetResolver;
pub use trigger::TriggerSchedule;
pub use workflow_engine::WorkflowEngine;
