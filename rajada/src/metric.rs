use std::{fmt::Debug, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{client::Outcome, execution::ExecutionState};

/// A single sample handed from an execution to the aggregator.
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Rejected,
    TransportFailure,
}

impl From<&Outcome> for OutcomeKind {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::Rejected(_) => OutcomeKind::Rejected,
            Outcome::TransportFailure(_) => OutcomeKind::TransportFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RequestSample {
    pub name: String,
    pub status: Option<u16>,
    pub outcome: OutcomeKind,
    pub latency: Duration,
}

/// Everything one finished execution reports.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ExecutionMetric {
    pub state: ExecutionState,
    pub duration: Duration,
    /// One sample per issued request, in issue order.
    pub requests: Vec<RequestSample>,
    pub failure: Option<String>,
}

impl Metric for ExecutionMetric {}
