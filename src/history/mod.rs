pub mod meta;
pub mod monitor;

pub use meta::{EpisodeSummary, MetaHistory};
pub use monitor::{write_records, Monitor, MonitorRecord};
