pub mod device;
pub mod events;
pub mod job;
pub mod pool;
pub mod run;
pub mod task;

pub use device::{Device, DeviceStatus, DeviceStatusUpdate};
pub use events::{DeviceOutcomeEvent, NodeTransition, WorkflowTransitionEvent};
pub use job::{EdgeSubtype, Job, JobKind, ServiceSpec, WorkflowEdge, WorkflowSpec};
pub use pool::{Pool, PropertyFilter};
pub use run::{
    JobRun, NodeResult, NodeState, RunKind, RunOutcome, RunResult, RunSnapshot, RunStatus,
    WorkflowRun,
};
pub use task::Task;
