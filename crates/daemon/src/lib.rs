pub mod catalog;
pub mod config;
pub mod convert;
pub mod ffmpeg;
pub mod ffprobe;
pub mod notify;
pub mod quality;
pub mod record;
pub mod scan;
pub mod schedule;
pub mod store;

pub use config::ConvertConfig;
pub use convert::{ConvertOutcome, Converter};
pub use notify::Notifier;
pub use record::{FileRecord, StreamCounts};
pub use schedule::Scheduler;
pub use store::{CatalogStore, MemoryStore, SqliteStore, StoreError};
