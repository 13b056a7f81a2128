use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("cannot resolve the newrelic import in {}: {reason}", path.display())]
    ImportResolution { path: PathBuf, reason: String },

    /// The mutated tree could not be printed. This is a bug in statement
    /// construction, never a property of the input.
    #[error("failed to print {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("failed to reconcile imports in {}: {reason}", path.display())]
    ImportReconcile { path: PathBuf, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{count} function(s) have no segment")]
    MissingSegments { count: usize },

    #[error("{0}")]
    Walk(#[from] ignore::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
