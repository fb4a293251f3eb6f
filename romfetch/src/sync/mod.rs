pub mod engine;
pub mod local;
pub mod paths;
pub mod reconcile;
pub mod remote;
pub mod report;
pub mod retry;
pub mod transfer;

pub use engine::{SyncEngine, SyncError, SyncOptions};
pub use report::{FileFailure, FolderReport, SkipReason, SkippedFolder, SyncReport};

#[cfg(test)]
pub(crate) mod test_support;
