//! 可观测性：结构化日志、运行事件出口与指标

pub mod event_sink;
pub mod metrics_collector;
pub mod structured_logger;

pub use event_sink::{CompositeEventSink, TracingEventSink};
pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
