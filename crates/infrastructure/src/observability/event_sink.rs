use std::sync::Arc;

use orchestrator_core::models::{DeviceOutcomeEvent, WorkflowTransitionEvent};
use orchestrator_core::traits::RunEventSink;

use super::StructuredLogger;

/// 将运行事件输出为结构化日志
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl RunEventSink for TracingEventSink {
    fn device_outcome(&self, event: &DeviceOutcomeEvent) {
        StructuredLogger::log_device_outcome(event);
    }

    fn workflow_transition(&self, event: &WorkflowTransitionEvent) {
        StructuredLogger::log_workflow_transition(event);
    }
}

/// 按注册顺序把事件转发给多个出口
#[derive(Clone, Default)]
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn RunEventSink>>,
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn RunEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl RunEventSink for CompositeEventSink {
    fn device_outcome(&self, event: &DeviceOutcomeEvent) {
        for sink in &self.sinks {
            sink.device_outcome(event);
        }
    }

    fn workflow_transition(&self, event: &WorkflowTransitionEvent) {
        for sink in &self.sinks {
            sink.workflow_transition(event);
        }
    }
}
