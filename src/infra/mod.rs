pub mod demo_seed;
pub mod file_publish_adapter;
pub mod in_memory;
pub mod ndjson_source_adapter;
pub mod sqlite_source_adapter;

pub use file_publish_adapter::FilePublishAdapter;
pub use in_memory::{InMemoryPublisher, InMemorySource};
pub use ndjson_source_adapter::NdjsonSourceAdapter;
pub use sqlite_source_adapter::SqliteSourceAdapter;
