use dashboard_client::{ApiError, ClientError};
use thiserror::Error;

/// A resource the aggregation depended on could not be fetched. No partial
/// result is produced.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to load {resource}: {source}")]
pub struct AggregationError {
    pub resource: &'static str,
    pub source: ClientError,
}

impl AggregationError {
    pub fn new(resource: &'static str, source: ClientError) -> Self {
        Self { resource, source }
    }

    pub fn api_error(&self) -> &ApiError {
        self.source.api_error()
    }
}

pub type AggregationResult<T> = Result<T, AggregationError>;
