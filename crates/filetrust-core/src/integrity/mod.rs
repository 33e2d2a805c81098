//! File integrity monitoring: baselines of content digests and verification
//! passes against them.

pub mod models;
pub mod monitor;
pub mod progress;
pub mod store;

pub use models::{
    Baseline, EnableReport, FileDigestRecord, FileWarning, IntegrityReport, ModificationRecord,
    ModificationStatus, MonitorState,
};
pub use monitor::IntegrityMonitor;
pub use progress::{NoProgress, ProgressSink};
pub use store::{BaselineStore, FsBaselineStore, MemoryBaselineStore};
