use std::io;

/// Errors surfaced while scanning columnar data.
///
/// Exhaustion is never an error: iterators signal the end of their data by
/// returning `Ok(None)`. Errors returned here terminate the scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("storage i/o: {0}")]
    Io(#[from] io::Error),

    /// Backend-specific failure that is not plain i/o (decode errors,
    /// missing columns, corrupt page headers).
    #[error("{0}")]
    Backend(String),

    /// The query's cancellation token fired. Observed by leaf iterators at
    /// page transitions; compositional iterators just propagate it.
    #[error("scan cancelled")]
    Cancelled,

    /// Iterator tree construction was handed an impossible shape.
    #[error("{0}")]
    InvalidIterator(String),
}

impl ScanError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }
}
