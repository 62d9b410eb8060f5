//! Error types for the execution seam and the notebook document.

/// The execution channel refused a request.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Execution channel closed")]
    Closed,

    #[error("Failed to send execute request: {0}")]
    Send(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to dispatch execution of cell {cell_id}: {source}")]
    Dispatch {
        cell_id: String,
        #[source]
        source: ChannelError,
    },

    #[error("Invalid notebook record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("Unsupported notebook format {major}.{minor}")]
    UnsupportedFormat { major: u32, minor: u32 },
}
