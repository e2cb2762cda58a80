use crate::models::{DeviceOutcomeEvent, WorkflowTransitionEvent};

/// 运行事件的日志出口
///
/// 作业运行器每个设备结果发送一条事件，工作流引擎每次节点进入/退出发送一条事件。
pub trait RunEventSink: Send + Sync {
    fn device_outcome(&self, event: &DeviceOutcomeEvent);

    fn workflow_transition(&self, event: &WorkflowTransitionEvent);
}
