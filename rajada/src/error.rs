use std::time::Duration;

use thiserror::Error;

/// Top-level error of a simulation run.
///
/// Everything that can go wrong inside a single execution is reported through its
/// [`ExecutionMetric`](crate::metric::ExecutionMetric) instead; none of those errors
/// ever reach this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("aggregator task failed: {0}")]
    Aggregator(#[from] tokio::task::JoinError),
    #[error("dispatcher task failed: {0}")]
    Dispatcher(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeederError {
    #[error("feeder is exhausted")]
    Exhausted,
    #[error("record generation failed: {0}")]
    Generation(String),
    #[error("record is missing required field `{0}`")]
    MissingField(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("session has no variable `{0}`")]
    MissingVariable(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Why an execution left the `Running` state early.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("request `{request}` was rejected with status {status}")]
    Rejected { request: String, status: u16 },
    #[error("request `{request}` failed: {source}")]
    Transport {
        request: String,
        #[source]
        source: TransportError,
    },
    #[error("request `{request}` found nothing to save into `{key}`")]
    Extraction { request: String, key: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Feeder(#[from] FeederError),
}
