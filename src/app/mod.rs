pub mod ports;

pub use ports::{
    NoopObserver, PipelineEvent, PipelineObserver, PublishPort, SourceInfo, SourcePort,
    SourceQuery,
};
