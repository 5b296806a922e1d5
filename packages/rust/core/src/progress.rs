//! Progress callbacks for long-running operations.

/// Progress callback for reporting crawl and pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase or stage.
    fn phase(&self, name: &str);
    /// Called after a discovery batch has been persisted.
    fn batch_persisted(&self, persisted_total: u64, marker: Option<&str>);
    /// Called after each item of a stage (download, upload, text fetch).
    fn item_done(&self, id: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_persisted(&self, _persisted_total: u64, _marker: Option<&str>) {}
    fn item_done(&self, _id: &str, _current: usize, _total: usize) {}
}
