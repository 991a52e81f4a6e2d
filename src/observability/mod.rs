// Observability: metrics and the event sink the orchestrator reports to

pub mod metrics;
pub mod observer;

pub use metrics::{init_metrics, write_snapshot, MetricName};
pub use observer::TracingObserver;
