use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecapError>;

#[derive(Error, Debug)]
pub enum RecapError {
    /// Bad year/month/day or a missing identifier. Raised before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Non-success answer from GitHub, carried verbatim.
    #[error("Upstream error {status}: {body}")]
    UpstreamFetch { status: u16, body: String },
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// A sync batch failed and was rolled back as a whole.
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("{operation} failed: {source}")]
    Aggregation {
        operation: &'static str,
        #[source]
        source: Box<RecapError>,
    },
    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Summary error: {0}")]
    Summary(String),
}

impl RecapError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn aggregation(operation: &'static str) -> impl FnOnce(RecapError) -> RecapError {
        move |source| RecapError::Aggregation {
            operation,
            source: Box::new(source),
        }
    }
}
