use std::{collections::BTreeMap, fmt::Debug, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::mpsc;

use crate::{
    Metric,
    execution::ExecutionState,
    metric::{ExecutionMetric, OutcomeKind},
};

/// Folds [`Metric`]s into a compact, mergeable summary.
///
/// Aggregates keep raw counters and sums only. Anything derived (averages, ratios)
/// is left to whoever reads the final aggregate, so merging worker-local or
/// run-local aggregates never loses information.
///
/// # Example
/// ```rust
/// use rajada::{Aggregate, metric::ExecutionMetric, execution::ExecutionState, macros::aggregate};
///
/// #[aggregate]
/// struct Failures {
///     failed: u64,
/// }
///
/// impl Aggregate for Failures {
///     type Metric = ExecutionMetric;
///
///     fn new() -> Self {
///         Self { failed: 0 }
///     }
///
///     fn consume(&mut self, metric: &Self::Metric) {
///         if metric.state == ExecutionState::Failed {
///             self.failed += 1;
///         }
///     }
///
///     fn merge(&mut self, other: Self) {
///         self.failed += other.failed;
///     }
/// }
/// ```
///
/// # Implementor notes
/// - `merge` must be associative and commutative.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
    type Metric: Metric;

    fn new() -> Self;

    /// Calls [`Aggregate::consume`] for each metric.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    fn consume(&mut self, metric: &Self::Metric);

    fn merge(&mut self, other: Self);
}

/// Built-in aggregate over [`ExecutionMetric`]s.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RunSummary {
    pub executions: usize,
    pub completed: usize,
    pub aborted: usize,
    pub failed: usize,
    pub requests: usize,
    pub successes: usize,
    pub rejected: usize,
    pub transport_failures: usize,
    /// Responses per HTTP status, whether accepted or not.
    pub statuses: BTreeMap<u16, usize>,
    pub total_latency: Duration,
}

impl Aggregate for RunSummary {
    type Metric = ExecutionMetric;

    fn new() -> Self {
        RunSummary::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        self.executions += 1;
        match metric.state {
            ExecutionState::Completed => self.completed += 1,
            ExecutionState::Aborted => self.aborted += 1,
            ExecutionState::Failed => self.failed += 1,
            ExecutionState::Pending | ExecutionState::Running => {
                tracing::warn!("Execution reported in non-terminal state {:?}", metric.state)
            }
        }
        for sample in &metric.requests {
            self.requests += 1;
            self.total_latency += sample.latency;
            match sample.outcome {
                OutcomeKind::Success => self.successes += 1,
                OutcomeKind::Rejected => self.rejected += 1,
                OutcomeKind::TransportFailure => self.transport_failures += 1,
            }
            if let Some(status) = sample.status {
                *self.statuses.entry(status).or_default() += 1;
            }
        }
    }

    fn merge(&mut self, other: Self) {
        self.executions += other.executions;
        self.completed += other.completed;
        self.aborted += other.aborted;
        self.failed += other.failed;
        self.requests += other.requests;
        self.successes += other.successes;
        self.rejected += other.rejected;
        self.transport_failures += other.transport_failures;
        for (status, count) in other.statuses {
            *self.statuses.entry(status).or_default() += count;
        }
        self.total_latency += other.total_latency;
    }
}

/// Drains `rx` into a fresh aggregate, consuming up to `batch_size` metrics per wakeup.
///
/// Ends when every sender has been dropped.
pub async fn aggregator_task<A: Aggregate>(
    mut rx: mpsc::Receiver<A::Metric>,
    batch_size: usize,
) -> A {
    let mut agg = A::new();
    let mut batch = Vec::with_capacity(batch_size);

    while let Some(metric) = rx.recv().await {
        batch.push(metric);

        // Take whatever else is already queued
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(metric) => batch.push(metric),
                Err(_) => break,
            }
        }

        agg.aggregate(&batch);
        batch.clear();
    }
    agg
}
