use std::path::PathBuf;

/// What one janitor sweep removed.
#[derive(Clone, Debug, Default)]
pub struct CleanupReport {
    pub deleted_files: Vec<PathBuf>,

    /// Files that were due for deletion but could not be removed.
    pub failures: usize,
}

impl CleanupReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted_files.len()
    }
}
